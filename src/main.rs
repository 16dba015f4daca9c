use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use docshard::Error;
use docshard::index::{IndexBuilder, PlainTextExtractor, compact_root, stats};
use docshard::output;
use docshard::query::{SearchEngine, SearchOptions};
use docshard::utils::progress::{ProgressBar, ProgressStyle};
use docshard::utils::{AppConfig, CancelToken, IndexLocator};
use std::path::{Path, PathBuf};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "docshard")]
#[command(about = "Incremental, sharded full-text search for large document trees")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build or update the index of a folder
    Index {
        /// Folder to index
        #[arg(default_value = ".")]
        path: PathBuf,
    },
    /// Search an indexed folder
    Search {
        /// Search query
        query: String,

        /// Indexed folder to search
        #[arg(short, long, default_value = ".")]
        path: PathBuf,

        /// Match the query as a whole-word phrase
        #[arg(short = 'w', long)]
        whole_word: bool,

        /// Case-sensitive matching
        #[arg(short = 'c', long)]
        match_case: bool,

        /// Only show results whose path starts with this prefix
        #[arg(long)]
        filter: Option<String>,

        /// Maximum number of results to print
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,

        /// Print results as JSON
        #[arg(long)]
        json: bool,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },
    /// Rewrite shards without superseded or removed pages
    Compact {
        /// Indexed folder
        #[arg(default_value = ".")]
        path: PathBuf,
    },
    /// Show index statistics
    Stats {
        /// Indexed folder
        #[arg(default_value = ".")]
        path: PathBuf,
    },
    /// List all indexed folders
    List,
    /// Remove every index
    Clear,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load().context("failed to load configuration")?;
    let locator = IndexLocator::from_config(&config)?;

    match cli.command {
        Commands::Index { path } => {
            let root = resolve_root(&path)?;
            run_index(&config, &locator, &root)?;
        }
        Commands::Search {
            query,
            path,
            whole_word,
            match_case,
            filter,
            limit,
            json,
            no_color,
        } => {
            let root = resolve_root(&path)?;
            let group = locator.locate(&root);
            let engine = SearchEngine::new(config.search.clone());
            let options = SearchOptions {
                whole_word,
                match_case,
                path_filter: filter,
            };

            let mut results = engine
                .search(&group, &query, &options)
                .with_context(|| format!("search failed for {}", root.display()))?;
            results.truncate(limit);

            if json {
                output::print_json(&results)?;
            } else if results.is_empty() {
                println!("No results.");
            } else {
                output::print_results(&results, !no_color, false)?;
            }
        }
        Commands::Compact { path } => {
            let root = resolve_root(&path)?;
            let report = compact_root(&locator.locate(&root), &config.index)
                .with_context(|| format!("compaction failed for {}", root.display()))?;
            println!(
                "Compacted {} shards: {} pages kept, {} removed",
                report.shards, report.pages_kept, report.pages_removed
            );
        }
        Commands::Stats { path } => {
            let root = resolve_root(&path)?;
            stats::show_stats(&locator.locate(&root))?;
        }
        Commands::List => {
            stats::list_indexes(&locator)?;
        }
        Commands::Clear => {
            locator.clear_all()?;
            println!("Removed all indexes under {}", locator.base_dir().display());
        }
    }

    Ok(())
}

fn resolve_root(path: &Path) -> Result<PathBuf> {
    let root = path
        .canonicalize()
        .with_context(|| format!("cannot access {}", path.display()))?;
    if !root.is_dir() {
        bail!("{} is not a directory", root.display());
    }
    Ok(root)
}

fn run_index(config: &AppConfig, locator: &IndexLocator, root: &Path) -> Result<()> {
    let group = locator.locate(root);
    let extractor = PlainTextExtractor;

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} documents")?
            .progress_chars("#>-"),
    );
    let progress = |done: usize, total: usize| {
        pb.set_length(total as u64);
        pb.set_position(done as u64);
    };

    let cancel = CancelToken::new();
    cancel_on_interrupt(&cancel)?;

    let builder = IndexBuilder::new(config.index.clone(), &extractor).with_progress(&progress);
    match builder.index_root(&group, &cancel) {
        Ok(report) => {
            pb.finish_with_message("done");
            println!(
                "Indexed {} documents ({} pages) in {} shards; {} unchanged, {} failed",
                report.indexed,
                report.pages,
                report.shards,
                report.documents - report.changed,
                report.failed
            );
            if report.resumed > 0 {
                println!("Resumed {} documents from an interrupted run", report.resumed);
            }
            if report.removed > 0 || report.reclaimed_pages > 0 {
                println!(
                    "Dropped {} removed documents, reclaimed {} pages",
                    report.removed, report.reclaimed_pages
                );
            }
            Ok(())
        }
        Err(Error::Cancelled) => {
            pb.abandon_with_message("interrupted");
            bail!(
                "indexing of {} interrupted; completed documents are saved, run again to resume",
                root.display()
            )
        }
        Err(e) => {
            pb.abandon_with_message("failed");
            Err(e).with_context(|| format!("indexing failed for {}", root.display()))
        }
    }
}

/// Cancel `token` on the first Ctrl-C so the run commits and checkpoints
/// what it finished. A second Ctrl-C exits at once.
fn cancel_on_interrupt(token: &CancelToken) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start signal handler")?;
    let token = token.clone();

    std::thread::Builder::new()
        .name("docshard-signal".to_string())
        .spawn(move || {
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, stopping after committed work");
                    token.cancel();
                }
                if tokio::signal::ctrl_c().await.is_ok() {
                    std::process::exit(130);
                }
            });
        })
        .context("failed to start signal handler")?;
    Ok(())
}
