//! Shared helper functions for CLI commands.

use std::sync::Arc;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

use harvester::checkpoint_store::{open_store, CheckpointStore};
use harvester::http_client::RequestStats;
use harvester::HarvestConfig;

/// Spinner used while talking to the upstream.
pub fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(std::time::Duration::from_millis(120));
    pb.set_message(message.to_string());
    pb
}

/// Cancel `token` on the first Ctrl-C.
pub fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, stopping after the current request");
            token.cancel();
        }
    });
}

/// The configured checkpoint store, if any.
pub fn checkpoint_store(config: &HarvestConfig) -> anyhow::Result<Option<Arc<dyn CheckpointStore>>> {
    match config.resolved_checkpoint_path() {
        Some(path) => Ok(Some(open_store(&path)?)),
        None => Ok(None),
    }
}

/// Key checkpoints are stored under.
pub fn checkpoint_key(config: &HarvestConfig) -> &str {
    &config.collection_path
}

pub fn print_request_stats(stats: &RequestStats) {
    println!("\n{}", style("Requests").bold());
    println!("{}", "-".repeat(40));
    println!("{:<16} {}", "Total:", stats.total_requests);
    println!("{:<16} {}", "Succeeded:", style(stats.successes).green());
    if stats.failures > 0 {
        println!("{:<16} {}", "Failed:", style(stats.failures).red());
    } else {
        println!("{:<16} {}", "Failed:", stats.failures);
    }
    println!("{:<16} {}", "Retries:", stats.retries);
    println!("{:<16} {:.0} ms", "Avg duration:", stats.avg_duration_ms);
}
