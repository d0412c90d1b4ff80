use anyhow::Context;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tracing::debug;

use renovate_playground::app::{handle_fatal_error, init_tracing, AppConfig};
use renovate_playground::deps::{DependencyRecord, DependencyTable};
use renovate_playground::run::RunRequestBody;
use renovate_playground::transport::{NormalizedRecord, PlaygroundClient};

/// Dry-run Renovate against a repository and stream what it would do
#[derive(Parser)]
#[command(name = "renovate-playground", version)]
#[command(about = "Stream dry-run Renovate results over server-sent events", long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace, -vvv for all)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the playground HTTP server
    Serve {
        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Update tool executable
        #[arg(long)]
        tool: Option<String>,

        /// Path to a TOML configuration file
        #[arg(short = 'c', long)]
        config: Option<PathBuf>,
    },
    /// Run a playground session against a server and print the results
    Run {
        /// Base URL of the playground server
        #[arg(long, default_value = "http://localhost:3333")]
        server: String,

        /// Repository to analyse, e.g. https://github.com/owner/name
        #[arg(short, long)]
        repository: String,

        /// JSON file holding the Renovate configuration
        #[arg(long)]
        config_file: PathBuf,

        /// GitHub token
        #[arg(long, env = "RENOVATE_TOKEN", hide_env_values = true)]
        token: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let verbose = cli.verbose;

    let result = match cli.command {
        Commands::Serve {
            host,
            port,
            tool,
            config,
        } => run_serve(verbose, host, port, tool, config).await,
        Commands::Run {
            server,
            repository,
            config_file,
            token,
        } => {
            init_tracing(verbose);
            run_client(&server, repository, &config_file, token).await
        }
    };

    if let Err(e) = result {
        handle_fatal_error(e, verbose);
    }
}

async fn run_serve(
    verbose: u8,
    host: Option<String>,
    port: Option<u16>,
    tool: Option<String>,
    config_path: Option<PathBuf>,
) -> anyhow::Result<()> {
    // Subscriber first, so warnings about ignored env values are visible.
    init_tracing(verbose);

    let mut config = AppConfig::load(config_path.as_deref())?;
    config.verbose = verbose;
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(tool) = tool {
        config.tool.program = tool;
    }

    debug!("Effective configuration: {:?}", config);

    renovate_playground::server::serve(&config).await?;
    Ok(())
}

async fn run_client(
    server: &str,
    repository: String,
    config_file: &Path,
    token: String,
) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(config_file)
        .with_context(|| format!("Failed to read {}", config_file.display()))?;
    let config: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("{} is not valid JSON", config_file.display()))?;

    let client = PlaygroundClient::new(server);
    let body = RunRequestBody {
        token: Some(token),
        repository: Some(repository),
        config: Some(config),
    };

    let mut records = client
        .run(&body)
        .await
        .map_err(renovate_playground::Error::from)?;
    let mut table = DependencyTable::new();

    while let Some(record) = records.next().await {
        let record = record.map_err(renovate_playground::Error::from)?;
        print_record(&record);
        table.ingest(&record);
    }

    print_table(table.records());
    Ok(())
}

fn print_record(record: &NormalizedRecord) {
    println!(
        "{} {:>5} [{}] {}",
        record.time,
        record.level.to_uppercase(),
        record.kind,
        record.msg
    );
}

fn print_table(records: &[DependencyRecord]) {
    if records.is_empty() {
        println!("\nNo dependency updates found.");
        return;
    }

    println!("\n{} dependency update(s):", records.len());
    println!(
        "{:<12} {:<40} {:<16} {:<16} {}",
        "ECOSYSTEM", "NAME", "CURRENT", "NEW", "STATUS"
    );
    for dep in records {
        println!(
            "{:<12} {:<40} {:<16} {:<16} {}",
            dep.ecosystem,
            dep.name,
            dep.current_version,
            dep.new_version,
            dep.status.map(|s| s.as_str()).unwrap_or("-")
        );
    }
}
