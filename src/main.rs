use anyhow::Context;
use clap::{Parser, Subcommand};
use prstats::config::{AppConfig, LogFormat, OutputConfig};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Pull request activity statistics for a GitHub repository.
///
/// Repository, recency window and token are read from the environment
/// (GITHUB_REPO, PR_FETCH_DAYS, GITHUB_TOKEN, ...), optionally via a .env file.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Snapshot file to write or read (overrides SNAPSHOT_PATH)
    #[arg(long, global = true, value_name = "FILE")]
    snapshot: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch recent pull requests with their comments and reviews into the snapshot
    Collect,
    /// Print merge statistics computed from the snapshot
    Analyze {
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    dotenvy::dotenv().ok();

    let output = match OutputConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_tracing(output.log_format);

    let snapshot_path = args.snapshot.unwrap_or(output.snapshot_path);

    let result = match args.command {
        Command::Collect => collect(snapshot_path).await,
        Command::Analyze { json } => prstats::run_analyze(&snapshot_path).and_then(|summary| {
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("{}", summary);
            }
            Ok(())
        }),
    };

    if let Err(e) = result {
        tracing::error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn collect(snapshot_path: PathBuf) -> anyhow::Result<()> {
    let mut config = AppConfig::from_env().context("Invalid configuration")?;
    config.snapshot_path = snapshot_path;

    let report = prstats::run_collect(&config).await?;
    tracing::info!(
        pull_requests = report.pull_requests,
        incomplete = report.incomplete,
        "Collection finished"
    );
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "prstats=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}
