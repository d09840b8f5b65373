//! `harvest checkpoint`: inspect or remove stored progress.

use anyhow::bail;
use console::style;

use harvester::HarvestConfig;

use super::helpers::{checkpoint_key, checkpoint_store};

pub async fn cmd_checkpoint_show(config: &HarvestConfig) -> anyhow::Result<()> {
    let Some(store) = checkpoint_store(config)? else {
        bail!("No checkpoint_path configured");
    };

    let Some(checkpoint) = store.load(checkpoint_key(config)).await? else {
        println!("{} No checkpoint stored", style("!").yellow());
        return Ok(());
    };

    let state = &checkpoint.state;
    println!(
        "\n{}",
        style(format!("Checkpoint: {}", checkpoint_key(config))).bold()
    );
    println!("{}", "-".repeat(40));
    println!(
        "{:<16} {}",
        "Taken:",
        checkpoint.taken_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!("{:<16} {}", "Pages:", state.iteration_count);
    println!("{:<16} {}", "Items seen:", state.total_items_seen);
    println!("{:<16} {}", "Discovered:", checkpoint.discovered.len());
    println!("{:<16} {}", "Next:", state.cursor);
    if let Some(endpoint) = &state.next_endpoint {
        println!("{:<16} {}", "Next endpoint:", endpoint);
    }
    let status = if state.complete {
        style("Complete").green().to_string()
    } else {
        style("Resumable").yellow().to_string()
    };
    println!("{:<16} {}", "Status:", status);
    if let Some(last) = state.last_timestamp {
        println!(
            "{:<16} {}",
            "Last page:",
            last.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    Ok(())
}

pub async fn cmd_checkpoint_clear(config: &HarvestConfig) -> anyhow::Result<()> {
    let Some(store) = checkpoint_store(config)? else {
        bail!("No checkpoint_path configured");
    };

    if store.clear(checkpoint_key(config)).await? {
        println!("{} Checkpoint cleared", style("✓").green());
    } else {
        println!("{} No checkpoint stored", style("!").yellow());
    }
    Ok(())
}
