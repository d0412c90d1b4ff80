//! Aggregation of dependency upgrade candidates from normalised records

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::pipeline::EventKind;
use crate::transport::NormalizedRecord;

const UNKNOWN: &str = "unknown";

static UPGRADE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Upgrading dependency `?([^\s`]+)`? from `?([^\s`]+)`? to `?([^\s`]+)`?")
        .expect("Valid regex pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyStatus {
    /// Repository not onboarded yet; no pull request exists.
    Discovered,
    UpdateAvailable,
}

impl DependencyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyStatus::Discovered => "discovered",
            DependencyStatus::UpdateAvailable => "update-available",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyRecord {
    pub ecosystem: String,
    pub name: String,
    pub current_version: String,
    pub new_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manager: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dep_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DependencyStatus>,
}

impl DependencyRecord {
    pub fn key(&self) -> (&str, &str, &str) {
        (
            self.name.as_str(),
            self.current_version.as_str(),
            self.new_version.as_str(),
        )
    }

    /// Overwrite non-key fields with those present on `other`.
    fn merge(&mut self, other: DependencyRecord) {
        self.ecosystem = other.ecosystem;
        if other.manager.is_some() {
            self.manager = other.manager;
        }
        if other.dep_type.is_some() {
            self.dep_type = other.dep_type;
        }
        if other.status.is_some() {
            self.status = other.status;
        }
    }
}

/// Upgrade candidates seen during one run, in first-sighting order.
#[derive(Debug, Default, Clone)]
pub struct DependencyTable {
    records: Vec<DependencyRecord>,
}

impl DependencyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[DependencyRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop every record. Called when a new run starts.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn upsert(&mut self, record: DependencyRecord) {
        match self.records.iter_mut().find(|r| r.key() == record.key()) {
            Some(existing) => existing.merge(record),
            None => self.records.push(record),
        }
    }

    /// Extract upgrade candidates from one record. Returns how many records
    /// were upserted.
    pub fn ingest(&mut self, record: &NormalizedRecord) -> usize {
        let found = match (record.kind, structured_payload(record)) {
            (EventKind::PackageFilesWithUpdates, Some(config)) => from_package_files_with_updates(config),
            (EventKind::PackageFiles, Some(files)) => from_package_files(files),
            (EventKind::BranchesInfoExtended, Some(branches)) => from_branches_info(branches),
            _ => from_text(&record.msg).into_iter().collect(),
        };

        let count = found.len();
        for dependency in found {
            self.upsert(dependency);
        }
        if count > 0 {
            tracing::debug!(kind = %record.kind, "Aggregated {} dependency records", count);
        }
        count
    }
}

fn structured_payload(record: &NormalizedRecord) -> Option<&Value> {
    match record.kind {
        EventKind::PackageFilesWithUpdates => record.config.as_ref(),
        EventKind::PackageFiles => record.package_files.as_ref(),
        EventKind::BranchesInfoExtended => record.branches_information.as_ref(),
        _ => None,
    }
}

fn str_field<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_str).filter(|s| !s.is_empty()))
}

fn field_or_unknown(obj: &Map<String, Value>, keys: &[&str]) -> String {
    str_field(obj, keys).unwrap_or(UNKNOWN).to_string()
}

fn objects(value: Option<&Value>) -> impl Iterator<Item = &Map<String, Value>> {
    value
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}

/// `packageFiles`: map of manager to package files, or an array of package
/// files carrying their own `manager`. Only the last update of each
/// dependency is a candidate.
fn from_package_files(files: &Value) -> Vec<DependencyRecord> {
    let mut found = Vec::new();
    match files {
        Value::Object(by_manager) => {
            for (manager, list) in by_manager {
                for file in objects(Some(list)) {
                    package_file_deps(file, Some(manager.as_str()), &mut found);
                }
            }
        }
        Value::Array(_) => {
            for file in objects(Some(files)) {
                package_file_deps(file, None, &mut found);
            }
        }
        _ => {}
    }
    found
}

fn package_file_deps<'a>(
    file: &'a Map<String, Value>,
    manager: Option<&'a str>,
    found: &mut Vec<DependencyRecord>,
) {
    let manager = manager.or_else(|| str_field(file, &["manager"]));
    let ecosystem = manager.unwrap_or("npm").to_string();

    let deps: Vec<(String, &Map<String, Value>)> = match file.get("deps") {
        Some(Value::Array(list)) => list
            .iter()
            .filter_map(Value::as_object)
            .map(|dep| (field_or_unknown(dep, &["depName", "packageName"]), dep))
            .collect(),
        Some(Value::Object(map)) => map
            .iter()
            .filter_map(|(name, dep)| dep.as_object().map(|d| (name.clone(), d)))
            .collect(),
        _ => return,
    };

    for (name, dep) in deps {
        let Some(update) = objects(dep.get("updates")).last() else {
            continue;
        };
        found.push(DependencyRecord {
            ecosystem: ecosystem.clone(),
            name,
            current_version: field_or_unknown(dep, &["currentVersion", "currentValue"]),
            new_version: field_or_unknown(update, &["newVersion", "newValue"]),
            manager: manager.map(str::to_string),
            dep_type: str_field(dep, &["depType"]).map(str::to_string),
            status: None,
        });
    }
}

/// `packageFilesWithUpdates`: map of manager to package files. Every update
/// of every dependency is a candidate.
fn from_package_files_with_updates(config: &Value) -> Vec<DependencyRecord> {
    let mut found = Vec::new();
    let Some(by_manager) = config.as_object() else {
        return found;
    };

    for (manager, files) in by_manager {
        for file in objects(Some(files)) {
            for dep in objects(file.get("deps")) {
                for update in objects(dep.get("updates")) {
                    found.push(DependencyRecord {
                        ecosystem: field_or_unknown(dep, &["datasource"]),
                        name: field_or_unknown(dep, &["packageName", "depName"]),
                        current_version: field_or_unknown(dep, &["currentVersion", "currentValue"]),
                        new_version: field_or_unknown(update, &["newVersion", "newValue"]),
                        manager: Some(manager.clone()),
                        dep_type: str_field(dep, &["depType"])
                            .or_else(|| str_field(update, &["updateType"]))
                            .map(str::to_string),
                        status: None,
                    });
                }
            }
        }
    }
    found
}

fn from_branches_info(branches: &Value) -> Vec<DependencyRecord> {
    let mut found = Vec::new();
    for branch in objects(Some(branches)) {
        let status = match branch.get("prNo") {
            None | Some(Value::Null) => DependencyStatus::Discovered,
            Some(_) => DependencyStatus::UpdateAvailable,
        };
        for upgrade in objects(branch.get("upgrades")) {
            let datasource = str_field(upgrade, &["datasource"]);
            found.push(DependencyRecord {
                ecosystem: datasource.unwrap_or(UNKNOWN).to_string(),
                name: field_or_unknown(upgrade, &["depName", "packageName"]),
                current_version: field_or_unknown(upgrade, &["currentVersion", "fixedVersion"]),
                new_version: field_or_unknown(upgrade, &["newVersion"]),
                manager: datasource.map(str::to_string),
                dep_type: str_field(upgrade, &["updateType"]).map(str::to_string),
                status: Some(status),
            });
        }
    }
    found
}

fn from_text(msg: &str) -> Option<DependencyRecord> {
    let caps = UPGRADE_LINE.captures(msg)?;
    Some(DependencyRecord {
        ecosystem: "npm".to_string(),
        name: caps[1].to_string(),
        current_version: caps[2].to_string(),
        new_version: caps[3].to_string(),
        manager: None,
        dep_type: None,
        status: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(kind: EventKind, msg: &str) -> NormalizedRecord {
        NormalizedRecord {
            time: "2024-05-01T10:00:00.000Z".to_string(),
            msg: msg.to_string(),
            level: "debug".to_string(),
            kind,
            config: None,
            package_files: None,
            branches_information: None,
        }
    }

    fn dep(name: &str, status: Option<DependencyStatus>) -> DependencyRecord {
        DependencyRecord {
            ecosystem: "npm".to_string(),
            name: name.to_string(),
            current_version: "1.0.0".to_string(),
            new_version: "2.0.0".to_string(),
            manager: None,
            dep_type: None,
            status,
        }
    }

    #[test]
    fn test_upsert_updates_status_in_place() {
        let mut table = DependencyTable::new();
        table.upsert(dep("lodash", Some(DependencyStatus::Discovered)));
        table.upsert(dep("lodash", Some(DependencyStatus::UpdateAvailable)));

        assert_eq!(table.len(), 1);
        assert_eq!(
            table.records()[0].status,
            Some(DependencyStatus::UpdateAvailable)
        );
    }

    #[test]
    fn test_upsert_keeps_fields_missing_from_later_sighting() {
        let mut table = DependencyTable::new();
        let mut first = dep("lodash", Some(DependencyStatus::Discovered));
        first.dep_type = Some("dependencies".to_string());
        table.upsert(first);
        table.upsert(dep("lodash", None));

        let stored = &table.records()[0];
        assert_eq!(stored.status, Some(DependencyStatus::Discovered));
        assert_eq!(stored.dep_type.as_deref(), Some("dependencies"));
    }

    #[test]
    fn test_distinct_versions_are_distinct_records() {
        let mut table = DependencyTable::new();
        table.upsert(dep("lodash", None));
        let mut other = dep("lodash", None);
        other.new_version = "3.0.0".to_string();
        table.upsert(other);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_package_files_map_form() {
        let mut rec = record(EventKind::PackageFiles, "packageFiles");
        rec.package_files = Some(json!({
            "npm": [{
                "packageFile": "package.json",
                "deps": [
                    {
                        "depName": "express",
                        "currentValue": "^4.17.0",
                        "depType": "dependencies",
                        "updates": [{"newValue": "^4.18.0"}, {"newValue": "^5.0.0"}]
                    },
                    {"depName": "left-pad", "currentValue": "1.0.0", "updates": []}
                ]
            }]
        }));

        let mut table = DependencyTable::new();
        assert_eq!(table.ingest(&rec), 1);
        let stored = &table.records()[0];
        assert_eq!(stored.ecosystem, "npm");
        assert_eq!(stored.name, "express");
        assert_eq!(stored.current_version, "^4.17.0");
        assert_eq!(stored.new_version, "^5.0.0");
        assert_eq!(stored.manager.as_deref(), Some("npm"));
        assert_eq!(stored.dep_type.as_deref(), Some("dependencies"));
    }

    #[test]
    fn test_package_files_array_form_with_keyed_deps() {
        let mut rec = record(EventKind::PackageFiles, "packageFiles");
        rec.package_files = Some(json!([{
            "manager": "cargo",
            "deps": {
                "serde": {"currentVersion": "1.0.100", "updates": [{"newVersion": "1.0.200"}]}
            }
        }]));

        let mut table = DependencyTable::new();
        table.ingest(&rec);
        let stored = &table.records()[0];
        assert_eq!(stored.ecosystem, "cargo");
        assert_eq!(stored.name, "serde");
        assert_eq!(stored.new_version, "1.0.200");
    }

    #[test]
    fn test_package_files_with_updates_yields_every_update() {
        let mut rec = record(EventKind::PackageFilesWithUpdates, "packageFiles with updates");
        rec.config = Some(json!({
            "regex": [{
                "packageFile": "Dockerfile",
                "deps": [{
                    "depName": "node",
                    "packageName": "library/node",
                    "datasource": "docker",
                    "currentValue": "18",
                    "updates": [
                        {"newValue": "20", "updateType": "major"},
                        {"newValue": "18.20", "updateType": "minor"}
                    ]
                }]
            }]
        }));

        let mut table = DependencyTable::new();
        assert_eq!(table.ingest(&rec), 2);
        let first = &table.records()[0];
        assert_eq!(first.ecosystem, "docker");
        assert_eq!(first.name, "library/node");
        assert_eq!(first.current_version, "18");
        assert_eq!(first.new_version, "20");
        assert_eq!(first.manager.as_deref(), Some("regex"));
        assert_eq!(first.dep_type.as_deref(), Some("major"));
    }

    #[test]
    fn test_branches_info_status_follows_pr_number() {
        let mut rec = record(EventKind::BranchesInfoExtended, "branches info extended");
        rec.branches_information = Some(json!([
            {
                "prNo": null,
                "upgrades": [{"depName": "react", "currentVersion": "17.0.2", "newVersion": "18.2.0", "datasource": "npm"}]
            },
            {
                "prNo": 42,
                "upgrades": [{"packageName": "vue", "fixedVersion": "3.3.0", "newVersion": "3.4.0"}]
            }
        ]));

        let mut table = DependencyTable::new();
        assert_eq!(table.ingest(&rec), 2);
        assert_eq!(table.records()[0].status, Some(DependencyStatus::Discovered));
        assert_eq!(table.records()[0].ecosystem, "npm");
        assert_eq!(
            table.records()[1].status,
            Some(DependencyStatus::UpdateAvailable)
        );
        assert_eq!(table.records()[1].ecosystem, "unknown");
        assert_eq!(table.records()[1].current_version, "3.3.0");
    }

    #[test]
    fn test_text_fallback() {
        let mut table = DependencyTable::new();
        table.ingest(&record(
            EventKind::Log,
            "Upgrading dependency `lodash` from `4.17.20` to `4.17.21`",
        ));
        table.ingest(&record(EventKind::Stdout, "Upgrading dependency chalk from 4.1.0 to 5.3.0"));
        table.ingest(&record(EventKind::Log, "Nothing to see here"));

        assert_eq!(table.len(), 2);
        assert_eq!(table.records()[0].name, "lodash");
        assert_eq!(table.records()[0].current_version, "4.17.20");
        assert_eq!(table.records()[0].new_version, "4.17.21");
        assert_eq!(table.records()[1].ecosystem, "npm");
    }

    #[test]
    fn test_missing_strings_default_to_unknown() {
        let mut rec = record(EventKind::BranchesInfoExtended, "branches info extended");
        rec.branches_information = Some(json!([{"prNo": 1, "upgrades": [{}]}]));
        let mut table = DependencyTable::new();
        table.ingest(&rec);
        let stored = &table.records()[0];
        assert_eq!(stored.name, "unknown");
        assert_eq!(stored.current_version, "unknown");
        assert_eq!(stored.new_version, "unknown");
    }

    #[test]
    fn test_clear_empties_table() {
        let mut table = DependencyTable::new();
        table.upsert(dep("lodash", None));
        table.clear();
        assert!(table.is_empty());
    }

    #[test]
    fn test_status_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_string(&DependencyStatus::UpdateAvailable).unwrap(),
            "\"update-available\""
        );
    }
}
