//! CLI parser and command dispatch.

mod catalog;
mod checkpoint;
mod crawl;
mod helpers;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use harvester::config::{load_config, LoadOptions};

#[derive(Parser)]
#[command(name = "harvest")]
#[command(about = "Resilient paginated catalog harvester")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl the collection page by page, checkpointing as it goes
    Crawl {
        /// Continue from the stored checkpoint
        #[arg(long, conflicts_with = "fresh")]
        resume: bool,
        /// Discard the stored checkpoint and start from the first page
        #[arg(long)]
        fresh: bool,
        /// Stop after this many pages in total (overrides config)
        #[arg(long)]
        max_pages: Option<u64>,
        /// Append harvested items to this file as JSON lines
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Print request statistics when done
        #[arg(long)]
        stats: bool,
    },

    /// List the catalog (cached, refreshed when stale)
    List {
        /// Ignore the cache and refresh from upstream
        #[arg(long)]
        refresh: bool,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show one catalog item
    Get {
        /// Item identifier
        id: String,
        /// Ignore the cache and refresh from upstream
        #[arg(long)]
        refresh: bool,
    },

    /// Inspect or remove the stored crawl checkpoint
    Checkpoint {
        #[command(subcommand)]
        command: CheckpointCommands,
    },
}

#[derive(Subcommand)]
enum CheckpointCommands {
    /// Show the stored checkpoint
    Show,
    /// Remove the stored checkpoint
    Clear,
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
        ignore_env: false,
    };
    let config = load_config(&options).await?;

    match cli.command {
        Commands::Crawl {
            resume,
            fresh,
            max_pages,
            output,
            stats,
        } => {
            crawl::cmd_crawl(
                &config,
                crawl::CrawlArgs {
                    resume,
                    fresh,
                    max_pages,
                    output,
                    stats,
                },
            )
            .await
        }
        Commands::List { refresh, json } => catalog::cmd_list(&config, refresh, json).await,
        Commands::Get { id, refresh } => catalog::cmd_get(&config, &id, refresh).await,
        Commands::Checkpoint { command } => match command {
            CheckpointCommands::Show => checkpoint::cmd_checkpoint_show(&config).await,
            CheckpointCommands::Clear => checkpoint::cmd_checkpoint_clear(&config).await,
        },
    }
}
