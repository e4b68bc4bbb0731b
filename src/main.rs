use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use snapsort::config::{Config, StrategyKind};
use snapsort::core::history::HistoryJournal;
use snapsort::core::{AlbumIndex, DirectorySource, MetadataStore};
use snapsort::pipeline::{self, Pipeline, RunOutcome};
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "snapsort", version, about = "Caption screenshots and sort them into albums")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Debug)]
struct Location {
    /// Config file (default: `<root>/snapsort.toml`, then the user config dir)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Folder holding Screenshots/, TXTs/ and Albums/
    #[arg(short, long, value_name = "DIR")]
    root: Option<PathBuf>,
}

impl Location {
    fn load(&self) -> Result<Config> {
        Config::load(self.config.as_deref(), self.root.as_deref())
            .context("Failed to load configuration")
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Caption new screenshots and file them into albums
    Run {
        #[command(flatten)]
        location: Location,
        /// Grouping strategy
        #[arg(long, value_enum)]
        strategy: Option<StrategyKind>,
        /// Cosine similarity needed to join a cluster
        #[arg(long)]
        threshold: Option<f64>,
        /// Parallel caption requests
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Show what the next run would caption and cluster
    Status {
        #[command(flatten)]
        location: Location,
    },

    /// Work with album history
    History {
        #[command(subcommand)]
        command: HistoryCmd,
    },

    /// List albums and their sizes
    Albums {
        #[command(flatten)]
        location: Location,
    },
}

#[derive(Subcommand, Debug)]
enum HistoryCmd {
    /// List all album history records
    List {
        #[command(flatten)]
        location: Location,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("snapsort=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            location,
            strategy,
            threshold,
            workers,
        } => {
            let mut config = location.load()?;
            if let Some(strategy) = strategy {
                config.grouping.strategy = strategy;
            }
            if let Some(threshold) = threshold {
                config.grouping.threshold = threshold;
            }
            if let Some(workers) = workers {
                config.workers = workers;
            }

            println!(
                "▶ Sorting screenshots in: {}",
                config.paths.screenshots_dir().display()
            );
            let pipeline = Pipeline::from_config(&config)
                .context("Failed to set up the pipeline")?
                .with_progress(true);
            println!("   strategy: {}", pipeline.strategy_name());

            let outcome = benchmark("run", || pipeline.run())
                .with_context(|| format!("Run failed under {}", config.paths.root.display()))?;
            match outcome {
                RunOutcome::AlreadyOrganized(summary) => {
                    if summary.repaired > 0 {
                        println!("🔧 Repaired album field on {} item(s)", summary.repaired);
                    }
                    println!("✅ Everything is already organized.");
                }
                RunOutcome::Completed(summary) => {
                    println!("\n{summary}");
                    if summary.skipped() > 0 {
                        println!("\n⚠️  Skipped items stay eligible for the next run.");
                    } else {
                        println!("\n✅ Done.");
                    }
                }
            }
        }

        Commands::Status { location } => {
            let config = location.load()?;
            let store = MetadataStore::open(config.paths.sidecars_dir())
                .context("Failed to open the metadata store")?;
            let source = DirectorySource::new(config.paths.screenshots_dir());
            let reconciliation = pipeline::scan(&source, &store, &config.paths.albums_dir())
                .context("Failed to scan screenshots")?;

            println!("🗂️  Status:");
            println!("   organized: {}", reconciliation.terminal);
            println!("   to caption: {}", reconciliation.to_caption.len());
            for item in &reconciliation.to_caption {
                println!("     ▶ {}", item.id);
            }
            println!("   awaiting album: {}", reconciliation.pending.len());
            for item in &reconciliation.pending {
                println!("     ▶ {} ({})", item.id, item.title);
            }
            if !reconciliation.repairs.is_empty() {
                println!("   album field to repair: {}", reconciliation.repairs.len());
            }
        }

        Commands::History { command } => match command {
            HistoryCmd::List { location } => {
                let config = location.load()?;
                let journal = HistoryJournal::new(&config.paths.root);
                let records = journal.read().with_context(|| {
                    format!("Could not read history file {:?}", journal.path())
                })?;

                println!("🗂️  Album History:");
                for (i, rec) in records.iter().enumerate() {
                    println!(
                        "[{}] {}\n     album: {}\n     members: {:?}\n     action: {}\n",
                        i, rec.timestamp, rec.album, rec.members, rec.action
                    );
                }
            }
        },

        Commands::Albums { location } => {
            let config = location.load()?;
            let albums_dir = config.paths.albums_dir();
            let albums = AlbumIndex::load(&albums_dir)
                .with_context(|| format!("Could not read albums in {:?}", albums_dir))?;

            if albums.is_empty() {
                println!("No albums yet.");
            } else {
                println!("Found {} album(s):", albums.len());
                for (name, members) in albums.iter() {
                    println!("   📁 {} ({})", name, members.len());
                }
            }
        }
    }

    Ok(())
}

/// Run `f()`, print how long it took (with `label`), and return its result.
fn benchmark<T, F: FnOnce() -> T>(label: &str, f: F) -> T {
    let start = Instant::now();
    let result = f();
    println!("⏱ {} took {:.2?}", label, start.elapsed());
    result
}
