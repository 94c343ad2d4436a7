use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::Instrument;
use uuid::Uuid;

mod analysis;
mod config;
mod error;
mod notion;
mod pipeline;
mod report;
mod state;
mod storage;

use crate::config::AppConfig;
use crate::notion::NotionClient;
use crate::state::AppState;

#[derive(Parser)]
#[command(name = "foodinsight")]
#[command(about = "Analyzes pending meal photos and writes nutrition estimates back to the meal log", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Process one batch of pending records (default).
    Run {
        /// Overrides MAX_ENTRIES_PER_RUN.
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Verify the meal database is reachable with the configured credentials.
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter =
        std::env::var("RUST_LOG").unwrap_or_else(|_| "foodinsight=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let cli = Cli::parse();
    let config = AppConfig::from_env().context("configuration is incomplete; refusing to run")?;

    match cli.command.unwrap_or(Command::Run { limit: None }) {
        Command::Check => {
            let client = NotionClient::new(
                state::http_client()?,
                config.notion.clone(),
                config.run.image_download_timeout,
            );
            let title = client
                .check_database()
                .await
                .context("meal database is not reachable")?;
            println!("connected to {title:?}");
        }
        Command::Run { limit } => {
            let limit = limit.unwrap_or(config.run.max_entries);
            let run_id = Uuid::new_v4();
            let span = tracing::info_span!("run", %run_id);

            async move {
                let state = AppState::init(config).await?;
                tracing::info!(limit, "run started");
                let summary = pipeline::run(&state, limit).await;
                tracing::info!(
                    fetched = summary.fetched,
                    attempted = summary.attempted,
                    succeeded = summary.succeeded,
                    skipped = summary.skipped,
                    failed = summary.failed,
                    "run finished: {}/{} succeeded",
                    summary.succeeded,
                    summary.attempted
                );
                anyhow::Ok(())
            }
            .instrument(span)
            .await?;
        }
    }

    Ok(())
}
