//! End-to-end tests: the HTTP server on an ephemeral port, consumed by the
//! crate's own client and dependency aggregator.

#![cfg(unix)]

mod common;

use common::*;
use futures::StreamExt;
use renovate_playground::deps::{DependencyStatus, DependencyTable};
use renovate_playground::pipeline::EventKind;
use renovate_playground::run::{RunController, RunRequestBody};
use renovate_playground::server::{build_router, serve_with_shutdown};
use renovate_playground::transport::{ClientError, NormalizedRecord, PlaygroundClient, CONNECTED_MESSAGE};
use serde_json::json;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

const ORIGIN: &str = "http://localhost:4200";

struct TestServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    async fn start(controller: RunController) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = build_router(controller, ORIGIN).unwrap();
        let (tx, rx) = oneshot::channel::<()>();

        tokio::spawn(serve_with_shutdown(listener, router, async {
            let _ = rx.await;
        }));

        Self {
            addr,
            shutdown: Some(tx),
        }
    }

    fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    fn client(&self) -> PlaygroundClient {
        PlaygroundClient::new(self.url())
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

fn body() -> RunRequestBody {
    RunRequestBody {
        token: Some("ghp_test_token".to_string()),
        repository: Some(REPOSITORY.to_string()),
        config: Some(json!({"extends": ["config:recommended"]})),
    }
}

async fn run_to_end(client: &PlaygroundClient, body: &RunRequestBody) -> Vec<NormalizedRecord> {
    let stream = client.run(body).await.unwrap();
    tokio::time::timeout(Duration::from_secs(10), stream.collect::<Vec<_>>())
        .await
        .expect("client stream did not end")
        .into_iter()
        .map(Result::unwrap)
        .collect()
}

const DEPENDENCY_SCRIPT: &str = r#"
echo '{"msg":"packageFiles with updates","level":20,"config":{"npm":[{"packageFile":"package.json","deps":[{"depName":"lodash","datasource":"npm","currentValue":"4.17.20","updates":[{"newValue":"4.17.21","updateType":"patch"}]}]}]}}' >&2
echo '{"msg":"branches info extended","level":20,"branchesInformation":[{"prNo":null,"upgrades":[{"depName":"react","datasource":"npm","currentVersion":"17.0.2","newVersion":"18.2.0"}]}]}' >&2
echo 'Upgrading dependency `chalk` from `4.1.0` to `5.3.0`'
exit 0
"#;

#[tokio::test]
async fn test_health_reports_idle_server() {
    let server = TestServer::start(controller_for("exit 0")).await;
    let health = server.client().health().await.unwrap();
    assert_eq!(health.status, "ok");
    assert!(!health.running);
}

#[tokio::test]
async fn test_run_streams_records_and_aggregates_dependencies() {
    let server = TestServer::start(controller_for(DEPENDENCY_SCRIPT)).await;
    let records = run_to_end(&server.client(), &body()).await;

    assert_eq!(records[0].kind, EventKind::Info);
    assert_eq!(records[0].msg, CONNECTED_MESSAGE);
    assert_eq!(records[1].msg, "Starting Renovate for acme/widgets");
    assert_eq!(records.last().unwrap().kind, EventKind::Success);

    let with_updates = records
        .iter()
        .find(|r| r.kind == EventKind::PackageFilesWithUpdates)
        .unwrap();
    assert_eq!(with_updates.level, "debug");
    assert!(with_updates.config.is_some());

    let mut table = DependencyTable::new();
    for record in &records {
        table.ingest(record);
    }

    // stdout and stderr are not ordered relative to each other
    let mut names: Vec<&str> = table.records().iter().map(|r| r.name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["chalk", "lodash", "react"]);

    let find = |name: &str| table.records().iter().find(|r| r.name == name).unwrap();

    let react = find("react");
    assert_eq!(react.status, Some(DependencyStatus::Discovered));
    assert_eq!(react.new_version, "18.2.0");

    let lodash = find("lodash");
    assert_eq!(lodash.ecosystem, "npm");
    assert_eq!(lodash.dep_type.as_deref(), Some("patch"));
}

#[tokio::test]
async fn test_fatal_exit_stops_client_at_warning() {
    let server = TestServer::start(controller_for("exit 7")).await;
    let records = run_to_end(&server.client(), &body()).await;
    let last = records.last().unwrap();
    assert_eq!(last.kind, EventKind::Warning);
    assert_eq!(last.msg, "Renovate process completed with exit code 7");
}

#[tokio::test]
async fn test_spawn_failure_is_an_error_frame() {
    let settings = renovate_playground::run::ToolSettings {
        program: "renovate-playground-missing-tool-xyz".to_string(),
        ..Default::default()
    };
    let controller = RunController::new(settings, Default::default());
    let server = TestServer::start(controller).await;

    let records = run_to_end(&server.client(), &body()).await;
    let error = records.last().unwrap();
    assert_eq!(error.kind, EventKind::Error);
    assert_eq!(error.level, "error");
    assert!(error.msg.starts_with("Error: "));
}

#[tokio::test]
async fn test_validation_errors_are_bad_requests() {
    let server = TestServer::start(controller_for("exit 0")).await;
    let client = server.client();

    let cases = [
        (
            RunRequestBody {
                token: None,
                ..body()
            },
            "GitHub token is required",
        ),
        (
            RunRequestBody {
                config: None,
                ..body()
            },
            "Configuration is required",
        ),
        (
            RunRequestBody {
                repository: Some(String::new()),
                ..body()
            },
            "Repository URL is required",
        ),
        (
            RunRequestBody {
                config: Some(json!("{not json")),
                ..body()
            },
            "Invalid JSON configuration provided",
        ),
    ];

    for (body, expected) in cases {
        match client.run(&body).await {
            Err(ClientError::Status { status, message }) => {
                assert_eq!(status, 400);
                assert_eq!(message, expected);
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("request should have been rejected: {expected}"),
        }
    }

    let health = client.health().await.unwrap();
    assert!(!health.running);
}

#[tokio::test]
async fn test_config_may_be_a_json_string() {
    let server = TestServer::start(controller_for(
        r#"grep -q '"labels"' "$RENOVATE_CONFIG_FILE" && echo labels-ok; exit 0"#,
    ))
    .await;
    let body = RunRequestBody {
        config: Some(json!("{\"labels\": [\"dependencies\"]}")),
        ..body()
    };

    let records = run_to_end(&server.client(), &body).await;
    assert!(records.iter().any(|r| r.msg == "labels-ok"));
}

#[tokio::test]
async fn test_response_headers() {
    let server = TestServer::start(controller_for("exit 0")).await;
    let http = reqwest::Client::new();

    let response = http
        .post(format!("{}/api/playground/run", server.url()))
        .header("Origin", ORIGIN)
        .json(&body())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let headers = response.headers();
    assert!(headers["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));
    assert_eq!(headers["access-control-allow-origin"], ORIGIN);
    assert_eq!(headers["access-control-allow-credentials"], "true");

    let body = tokio::time::timeout(Duration::from_secs(10), response.text())
        .await
        .unwrap()
        .unwrap();
    assert!(body.starts_with("data: "));
    assert!(body.contains(CONNECTED_MESSAGE));
    assert!(body.contains("\"type\":\"complete\""));
}

#[tokio::test]
async fn test_client_disconnect_cancels_run() {
    let controller = controller_for("while true; do echo tick; sleep 0.1; done");
    let server = TestServer::start(controller.clone()).await;
    let client = server.client();

    let mut stream = client.run(&body()).await.unwrap();
    let _connected = stream.next().await.unwrap().unwrap();
    let _started = stream.next().await.unwrap().unwrap();
    let tick = stream.next().await.unwrap().unwrap();
    assert_eq!(tick.msg, "tick");
    assert!(controller.is_running());

    drop(stream);

    assert!(wait_for(Duration::from_secs(10), || !controller.is_running()).await);
    assert!(!client.health().await.unwrap().running);
}

#[tokio::test]
async fn test_concurrent_request_is_told_to_wait() {
    let controller = controller_for("while true; do echo tick; sleep 0.1; done");
    let server = TestServer::start(controller.clone()).await;
    let client = server.client();

    let mut first = client.run(&body()).await.unwrap();
    let _connected = first.next().await.unwrap().unwrap();
    let _started = first.next().await.unwrap().unwrap();

    let second = run_to_end(&client, &body()).await;
    let kinds: Vec<EventKind> = second.iter().map(|r| r.kind).collect();
    assert_eq!(
        kinds,
        vec![EventKind::Info, EventKind::Info, EventKind::Complete]
    );
    assert_eq!(
        second[1].msg,
        "Renovate process already running, please wait for it to complete"
    );

    assert!(controller.is_running());
    drop(first);
    assert!(wait_for(Duration::from_secs(10), || !controller.is_running()).await);
}
