//! `harvest crawl`: drive a crawl session page by page.

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::{bail, Context};
use console::style;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use harvester::crawl::{CrawlError, CrawlSession};
use harvester::HarvestConfig;

use super::helpers::{
    cancel_on_ctrl_c, checkpoint_key, checkpoint_store, print_request_stats, spinner,
};

pub struct CrawlArgs {
    pub resume: bool,
    pub fresh: bool,
    pub max_pages: Option<u64>,
    pub output: Option<PathBuf>,
    pub stats: bool,
}

pub async fn cmd_crawl(config: &HarvestConfig, args: CrawlArgs) -> anyhow::Result<()> {
    let client = config.build_client()?;
    let extractor = config.build_extractor();
    let max_pages = args.max_pages.or(config.max_pages);
    let mut session = CrawlSession::new(client.clone(), extractor, &config.collection_path);

    let store = checkpoint_store(config)?;
    let key = checkpoint_key(config);

    if args.fresh {
        if let Some(store) = &store {
            if store.clear(key).await? {
                println!("{} Discarded stored checkpoint", style("!").yellow());
            }
        }
    } else if args.resume {
        let Some(store) = &store else {
            bail!("--resume needs checkpoint_path in the config");
        };
        match store.load(key).await? {
            Some(checkpoint) => {
                session.restore_checkpoint(&checkpoint);
                println!(
                    "{} Resuming after page {} ({} items discovered)",
                    style("→").cyan(),
                    checkpoint.state.iteration_count,
                    checkpoint.discovered.len()
                );
            }
            None => println!("{} No checkpoint found, starting fresh", style("!").yellow()),
        }
    }

    session.set_max_pages(max_pages);
    if session.is_complete() {
        println!(
            "{} Checkpointed crawl is already complete (use --fresh to start over)",
            style("✓").green()
        );
        return Ok(());
    }

    let mut output = match &args.output {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .append(args.resume)
                .truncate(!args.resume)
                .open(path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            Some(BufWriter::new(file))
        }
        None => None,
    };

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let pb = spinner(&format!("Crawling {}...", config.collection_path));
    let mut harvested = 0usize;
    let mut interrupted = false;
    let mut failure: Option<CrawlError> = None;

    while !session.is_complete() {
        match session.step(&cancel).await {
            Ok(report) => {
                for item in session.take_harvested() {
                    if let Some(out) = output.as_mut() {
                        serde_json::to_writer(&mut *out, &item)?;
                        writeln!(out)?;
                    }
                    harvested += 1;
                }
                pb.set_message(format!(
                    "Page {}: {} new items, {} unique so far",
                    report.page,
                    report.new_items,
                    session.discovered().len()
                ));

                if let Some(store) = &store {
                    if let Err(e) = store.save(key, &session.create_checkpoint()).await {
                        warn!("Failed to save checkpoint: {}", e);
                    }
                }
            }
            Err(CrawlError::Cancelled) => {
                interrupted = true;
                break;
            }
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }
    pb.finish_and_clear();

    if let Some(out) = output.as_mut() {
        out.flush()?;
    }

    let state = session.state();
    println!("\n{}", style(format!("Crawl: {}", config.collection_path)).bold());
    println!("{}", "-".repeat(40));
    println!("{:<16} {}", "Pages:", state.iteration_count);
    println!("{:<16} {}", "Items seen:", state.total_items_seen);
    println!("{:<16} {}", "Unique items:", session.discovered().len());
    println!("{:<16} {}", "New this run:", harvested);
    let status = if state.complete && !state.has_more_data {
        style("Complete").green().to_string()
    } else if state.complete {
        style("Page limit reached").yellow().to_string()
    } else {
        style("Incomplete").yellow().to_string()
    };
    println!("{:<16} {}", "Status:", status);

    if args.stats {
        print_request_stats(&client.stats());
    }

    if interrupted {
        println!(
            "\n{} Interrupted. Resume with {}",
            style("!").yellow(),
            style("harvest crawl --resume").cyan()
        );
    }

    if let Some(e) = failure {
        error!("Crawl stopped: {}", e);
        if store.is_some() {
            println!(
                "\n{} Progress is checkpointed. Resume with {}",
                style("!").yellow(),
                style("harvest crawl --resume").cyan()
            );
        }
        return Err(anyhow::Error::new(e).context("crawl stopped before completion"));
    }

    Ok(())
}
