//! dirscope - directory size, duplicate and extension analyzer.
//!
//! Usage:
//!   dirscope scan [PATH]         Scan and print the directory tree
//!   dirscope duplicates [PATH]   Find duplicate files
//!   dirscope largest [PATH]      List the largest files
//!   dirscope extensions [PATH]   Bytes per file extension
//!   dirscope stats [PATH]        Size share of top-level directories
//!   dirscope search PATTERN      Find files by wildcard name
//!   dirscope export [PATH]       Export scan to JSON
//!
//! Ctrl-C stops a scan or a duplicate search and prints partial results.

mod settings;

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result, bail, eyre};
use serde_json::json;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use dirscope_analyze::{
    DuplicateConfig, DuplicateFinder, DuplicateReport, HashEvent,
    extension_statistics, find_by_pattern, largest_files, size_statistics,
};
use dirscope_core::{DirId, FileTree, ScanConfig, format_size, shorten_path};
use dirscope_scan::{ScanEvent, Scanner};

use crate::settings::Settings;

#[derive(Parser)]
#[command(
    name = "dirscope",
    version,
    about = "Find where disk space goes",
    long_about = "dirscope scans a directory tree, rolls sizes up to every \
                  directory, and reports duplicates, large files and \
                  per-extension usage."
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Settings file (defaults to <config dir>/dirscope/settings.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Do not print progress to stderr
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Clone)]
struct ScanArgs {
    /// Path to scan
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Glob patterns of entry names to skip (repeatable)
    #[arg(short, long = "ignore")]
    ignore: Vec<String>,

    /// Maximum depth to descend
    #[arg(long)]
    max_depth: Option<u32>,

    /// Follow symbolic links
    #[arg(short = 'L', long)]
    follow_symlinks: bool,

    /// Skip entries whose name starts with a dot
    #[arg(long)]
    no_hidden: bool,

    /// Worker threads (0 = one per core, 1 = serial)
    #[arg(short = 'j', long)]
    threads: Option<usize>,
}

#[derive(Subcommand)]
enum Command {
    /// Scan and print the directory tree with rolled-up sizes
    Scan {
        #[command(flatten)]
        scan: ScanArgs,

        /// Depth of the printed tree
        #[arg(short, long, default_value = "2")]
        depth: u32,
    },

    /// Find files with identical contents
    Duplicates {
        #[command(flatten)]
        scan: ScanArgs,

        /// Minimum file size to consider (e.g., "1KB", "1MB")
        #[arg(short, long)]
        min_size: Option<String>,

        /// Compare group members byte for byte before reporting them
        #[arg(long)]
        verify: bool,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// List the largest files
    Largest {
        #[command(flatten)]
        scan: ScanArgs,

        /// Number of files to show
        #[arg(short = 'n', long)]
        top: Option<usize>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Total bytes per file extension
    Extensions {
        #[command(flatten)]
        scan: ScanArgs,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Size share of the root and its top-level directories
    Stats {
        #[command(flatten)]
        scan: ScanArgs,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Find files whose name matches a wildcard pattern (`*`, `?`)
    Search {
        /// Pattern matched against file names
        pattern: String,

        #[command(flatten)]
        scan: ScanArgs,

        /// Match case exactly
        #[arg(short, long)]
        case_sensitive: bool,
    },

    /// Export scan results to JSON
    Export {
        #[command(flatten)]
        scan: ScanArgs,

        /// Also hash files and mark duplicates before exporting
        #[arg(long)]
        hashes: bool,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Shared state for one invocation.
struct Session {
    settings: Settings,
    cancel: CancellationToken,
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = Settings::load(cli.config.as_deref())?;
    debug!(?settings, "loaded settings");

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let ctx = Session {
        settings,
        cancel,
        quiet: cli.quiet,
    };

    match cli.command {
        Command::Scan { scan, depth } => run_scan(&ctx, &scan, depth).await,
        Command::Duplicates {
            scan,
            min_size,
            verify,
            format,
        } => run_duplicates(&ctx, &scan, min_size, verify, format).await,
        Command::Largest { scan, top, format } => run_largest(&ctx, &scan, top, format).await,
        Command::Extensions { scan, format } => run_extensions(&ctx, &scan, format).await,
        Command::Stats { scan, format } => run_stats(&ctx, &scan, format).await,
        Command::Search {
            pattern,
            scan,
            case_sensitive,
        } => run_search(&ctx, &scan, &pattern, case_sensitive).await,
        Command::Export {
            scan,
            hashes,
            output,
        } => run_export(&ctx, &scan, hashes, output).await,
    }
}

/// Install the tracing subscriber. `RUST_LOG` wins over `-v`.
fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping");
            cancel.cancel();
        }
    });
}

/// Merge command-line flags over the settings file.
fn scan_config(ctx: &Session, args: &ScanArgs) -> Result<ScanConfig> {
    let defaults = &ctx.settings.scan;
    let mut ignore = defaults.ignore_patterns.clone();
    ignore.extend(args.ignore.iter().cloned());

    ScanConfig::builder()
        .root(args.path.clone())
        .follow_symlinks(args.follow_symlinks || defaults.follow_symlinks)
        .include_hidden(defaults.include_hidden && !args.no_hidden)
        .max_depth(args.max_depth)
        .ignore_patterns(ignore)
        .threads(args.threads.unwrap_or(defaults.threads))
        .build()
        .map_err(|e| eyre!("Invalid scan options: {e}"))
}

/// Next event, skipping over gaps left by a lagging receiver. `None` once
/// the sender is gone.
async fn next_event<T: Clone>(events: &mut broadcast::Receiver<T>) -> Option<T> {
    loop {
        match events.recv().await {
            Ok(event) => return Some(event),
            Err(RecvError::Lagged(missed)) => {
                tracing::trace!(missed, "progress receiver lagged");
            }
            Err(RecvError::Closed) => return None,
        }
    }
}

/// Scan on a blocking thread while progress is drawn from the event stream.
async fn scan_tree(ctx: &Session, args: &ScanArgs) -> Result<FileTree> {
    let config = scan_config(ctx, args)?;
    let scanner = Scanner::new();

    let progress = if ctx.quiet {
        None
    } else {
        let mut events = scanner.subscribe();
        let width = ctx.settings.report.path_width;
        Some(tokio::spawn(async move {
            let mut files = 0u64;
            while let Some(event) = next_event(&mut events).await {
                match event {
                    ScanEvent::FileVisited(_) => files += 1,
                    ScanEvent::DirectoryVisited(path) if files % 64 == 0 => {
                        eprint!("\r\x1b[2K{files} files  {}", shorten_path(&path, width));
                    }
                    ScanEvent::LevelProgress { parent, percent } => {
                        tracing::trace!(parent = %parent.display(), percent, "level progress");
                    }
                    ScanEvent::Finished(_) => break,
                    _ => {}
                }
            }
            eprint!("\r\x1b[2K");
        }))
    };

    let cancel = ctx.cancel.clone();
    let tree = task::spawn_blocking(move || scanner.scan_with_cancel(&config, cancel))
        .await
        .context("Scan task panicked")?
        .context("Scan failed")?;

    if let Some(handle) = progress {
        let _ = handle.await;
    }

    if tree.cancelled {
        eprintln!("Scan cancelled; results are partial.");
    }
    if tree.has_warnings() {
        eprintln!("{} entries skipped (run with -v for details)", tree.warnings.len());
        for warning in &tree.warnings {
            info!(path = %warning.path.display(), kind = ?warning.kind, "{}", warning.message);
        }
    }
    Ok(tree)
}

/// Hash files and flag duplicates on a blocking thread.
async fn hash_tree(ctx: &Session, tree: FileTree, config: DuplicateConfig) -> Result<(FileTree, DuplicateReport)> {
    let finder = DuplicateFinder::with_config(config);

    let progress = if ctx.quiet {
        None
    } else {
        let mut events = finder.subscribe();
        Some(tokio::spawn(async move {
            let mut last = 0;
            while let Some(event) = next_event(&mut events).await {
                if let HashEvent::Progress { percent } = event {
                    if percent != last {
                        last = percent;
                        eprint!("\r\x1b[2KHashing {percent}%");
                    }
                }
            }
            eprint!("\r\x1b[2K");
        }))
    };

    let cancel = ctx.cancel.clone();
    let (tree, report) = task::spawn_blocking(move || {
        let mut tree = tree;
        let report = finder.find_duplicates_with_cancel(&mut tree, cancel);
        (tree, report)
    })
    .await
    .context("Hash task panicked")?;

    // The finder was dropped with the task, which closes the channel.
    if let Some(handle) = progress {
        let _ = handle.await;
    }

    if report.cancelled {
        eprintln!("Duplicate search cancelled; results are partial.");
    }
    for warning in &report.warnings {
        warn!(path = %warning.path.display(), "{}", warning.message);
    }
    Ok((tree, report))
}

/// Run a scan and print the tree.
async fn run_scan(ctx: &Session, args: &ScanArgs, depth: u32) -> Result<()> {
    let tree = scan_tree(ctx, args).await?;

    println!();
    println!("{}", "─".repeat(60));
    println!(" {}", tree.root());
    println!(" Scanned in {:.2}s", tree.scan_duration.as_secs_f64());
    println!("{}", "─".repeat(60));
    println!();

    print_dir(&tree, tree.root_id(), 0, depth, tree.root().size());
    Ok(())
}

fn print_dir(tree: &FileTree, id: DirId, level: u32, max_level: u32, root_size: u64) {
    let dir = tree.dir(id);
    let indent = "  ".repeat(level as usize);
    let ratio = if root_size > 0 {
        dir.size() as f64 / root_size as f64
    } else {
        0.0
    };
    println!("{indent}{:<50} {:>5.1}% {}", dir.to_string(), ratio * 100.0, make_bar(ratio, 10));

    if level >= max_level {
        return;
    }
    for file in dir.files() {
        println!("{indent}  {}", tree.file(*file));
    }
    for sub in dir.subdirectories() {
        print_dir(tree, *sub, level + 1, max_level, root_size);
    }
}

/// Create a simple ASCII bar.
fn make_bar(ratio: f64, width: usize) -> String {
    let filled = (ratio * width as f64).round() as usize;
    let empty = width.saturating_sub(filled);
    format!("[{}{}]", "█".repeat(filled), "░".repeat(empty))
}

/// Run duplicate detection.
async fn run_duplicates(
    ctx: &Session,
    args: &ScanArgs,
    min_size: Option<String>,
    verify: bool,
    format: OutputFormat,
) -> Result<()> {
    let defaults = &ctx.settings.duplicates;
    let min_size = match min_size.or_else(|| defaults.min_size.clone()) {
        Some(s) => parse_size(&s)?,
        None => 0,
    };
    let config = DuplicateConfig::builder()
        .min_size(min_size)
        .verify_contents(verify || defaults.verify_contents)
        .build()
        .map_err(|e| eyre!("Invalid duplicate options: {e}"))?;

    let tree = scan_tree(ctx, args).await?;
    let (tree, report) = hash_tree(ctx, tree, config).await?;

    match format {
        OutputFormat::Text => {
            println!();
            if !report.has_duplicates() {
                println!(" No duplicate files found.");
                return Ok(());
            }
            println!(
                " Found {} duplicate groups ({} files), {} wasted",
                report.group_count(),
                report.files_with_duplicates(),
                format_size(report.total_wasted_space())
            );
            println!();
            for (i, group) in report.groups.values().enumerate() {
                println!(
                    " Group {} ({} files, {} each)",
                    i + 1,
                    group.count(),
                    format_size(group.size)
                );
                println!("   {}", tree.file(group.original()).path().display());
                for id in group.duplicates() {
                    println!("   {} [Duplicate]", tree.file(*id).path().display());
                }
                println!();
            }
        }
        OutputFormat::Json => {
            let groups: Vec<_> = report
                .groups
                .values()
                .map(|group| {
                    json!({
                        "hash": group.hash.to_hex(),
                        "size": group.size,
                        "original": tree.file(group.original()).path(),
                        "duplicates": group
                            .duplicates()
                            .iter()
                            .map(|id| tree.file(*id).path())
                            .collect::<Vec<_>>(),
                    })
                })
                .collect();
            let out = json!({
                "groups": groups,
                "wasted_bytes": report.total_wasted_space(),
                "files_analyzed": report.files_analyzed,
                "warnings": report.warnings,
                "cancelled": report.cancelled,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }
    Ok(())
}

async fn run_largest(
    ctx: &Session,
    args: &ScanArgs,
    top: Option<usize>,
    format: OutputFormat,
) -> Result<()> {
    let top = top.unwrap_or(ctx.settings.report.top);
    let tree = scan_tree(ctx, args).await?;
    let files = largest_files(&tree, top);

    match format {
        OutputFormat::Text => {
            let width = ctx.settings.report.path_width;
            for id in files {
                let file = tree.file(id);
                println!("{:>12}  {}", format_size(file.size()), shorten_path(file.path(), width));
            }
        }
        OutputFormat::Json => {
            let out: Vec<_> = files
                .into_iter()
                .map(|id| {
                    let file = tree.file(id);
                    json!({ "path": file.path(), "size": file.size() })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }
    Ok(())
}

async fn run_extensions(ctx: &Session, args: &ScanArgs, format: OutputFormat) -> Result<()> {
    let tree = scan_tree(ctx, args).await?;
    let stats = extension_statistics(&tree);

    match format {
        OutputFormat::Text => {
            let total = stats.total_bytes().max(1) as f64;
            for (key, bytes) in stats.sorted() {
                println!(
                    "{:<20} {:>12} {:>6.2}%",
                    key.to_string(),
                    format_size(bytes),
                    bytes as f64 / total * 100.0
                );
            }
        }
        OutputFormat::Json => {
            let out: serde_json::Map<String, serde_json::Value> = stats
                .sorted()
                .into_iter()
                .map(|(key, bytes)| (key.to_string(), json!(bytes)))
                .collect();
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }
    Ok(())
}

async fn run_stats(ctx: &Session, args: &ScanArgs, format: OutputFormat) -> Result<()> {
    let tree = scan_tree(ctx, args).await?;
    let entries = size_statistics(&tree);

    match format {
        OutputFormat::Text => {
            if entries.is_empty() {
                println!(" Nothing to report: the directory holds no data.");
            }
            for entry in &entries {
                println!(
                    "{:<40} {:>12} {:>7.2}% {}",
                    entry.name,
                    format_size(entry.size),
                    entry.percentage,
                    make_bar(entry.percentage / 100.0, 20)
                );
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
    }
    Ok(())
}

async fn run_search(ctx: &Session, args: &ScanArgs, pattern: &str, case_sensitive: bool) -> Result<()> {
    let tree = scan_tree(ctx, args).await?;
    for id in find_by_pattern(&tree, pattern, case_sensitive)? {
        println!("{}", tree.file(id).path().display());
    }
    Ok(())
}

/// Export scan results to JSON.
async fn run_export(ctx: &Session, args: &ScanArgs, hashes: bool, output: Option<PathBuf>) -> Result<()> {
    let mut tree = scan_tree(ctx, args).await?;
    if hashes {
        tree = hash_tree(ctx, tree, DuplicateConfig::default()).await?.0;
    }

    let json = serde_json::to_string_pretty(&tree)?;
    match output {
        Some(path) => write_output(&path, &json)?,
        None => println!("{json}"),
    }
    Ok(())
}

fn write_output(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents).with_context(|| format!("Cannot write {}", path.display()))?;
    eprintln!("Exported to {}", path.display());
    Ok(())
}

/// Parse a size string (e.g., "512", "1KB", "10M", "1.5GB").
fn parse_size(s: &str) -> Result<u64> {
    let s = s.trim().to_uppercase();
    let digits_end = s
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(s.len());
    let (num, unit) = s.split_at(digits_end);
    let num: f64 = num
        .parse()
        .with_context(|| format!("Invalid size {s:?}"))?;

    let multiplier: u64 = match unit.trim() {
        "" | "B" => 1,
        "K" | "KB" | "KIB" => 1024,
        "M" | "MB" | "MIB" => 1024 * 1024,
        "G" | "GB" | "GIB" => 1024 * 1024 * 1024,
        other => bail!("Unknown size unit {other:?}"),
    };
    Ok((num * multiplier as f64) as u64)
}
