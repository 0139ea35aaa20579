//! ddff - find duplicate and fuzzily duplicate files and directories.
//!
//! Usage:
//!   ddff [PATH]...                   Search the given directories (default: .)
//!   ddff -o - [PATH]...              Print the report instead of writing a file
//!   ddff --format json [PATH]...     Write the report as JSON
//!   ddff --help                      Show help

mod progress;
mod settings;

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::{ArgAction, Parser, ValueEnum};
use color_eyre::eyre::{Context, Result};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use ddff_analyze::{
    AnalyzeConfig, ContentHasher, DEFAULT_PARTIAL_WINDOW, DuplicateFinder, DuplicateReport,
    HashAlgorithm, JsonHashCache,
};
use ddff_scan::{ScanConfig, TreeBuilder};

use crate::progress::ProgressDisplay;
use crate::settings::Settings;

/// Report file written when no output is given.
const DEFAULT_RESULT_FILE: &str = "ddff_results.txt";

/// Exit status after Ctrl-C.
const EXIT_INTERRUPTED: i32 = 130;

#[derive(Parser)]
#[command(
    name = "ddff",
    version,
    about = "Find duplicate files and directories",
    long_about = "ddff finds identical files and directory trees, as well as directories \
                  sharing several identical files.\n\n\
                  File content is only read when size and a cheap partial hash cannot \
                  rule a file out."
)]
struct Cli {
    /// Directories to search (defaults to the current directory)
    paths: Vec<PathBuf>,

    /// Result file, or "-" for standard output [default: ddff_results.txt]
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t)]
    format: OutputFormat,

    /// Digest algorithm (sha512 or blake3)
    #[arg(short, long)]
    algorithm: Option<HashAlgorithm>,

    /// Hashing threads (0 = all cores, 1 = sequential)
    #[arg(short = 'j', long)]
    threads: Option<usize>,

    /// Hash cache file
    #[arg(long, conflicts_with = "no_cache")]
    cache: Option<PathBuf>,

    /// Do not read or write the hash cache
    #[arg(long)]
    no_cache: bool,

    /// Settings file [default: <config dir>/ddff/config.toml]
    #[arg(long)]
    config: Option<PathBuf>,

    /// Leave out entries whose name matches this glob (repeatable)
    #[arg(short = 'x', long = "exclude")]
    exclude: Vec<String>,

    /// Leave out hidden entries (names starting with '.')
    #[arg(long)]
    skip_hidden: bool,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// No progress bars or summary on stderr
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Where the report goes.
#[derive(Debug, PartialEq, Eq)]
enum Destination {
    Stdout,
    File(PathBuf),
}

impl Destination {
    fn resolve(cli: Option<&Path>, settings: Option<&Path>) -> Self {
        match cli.or(settings) {
            Some(path) if path == Path::new("-") => Destination::Stdout,
            Some(path) => Destination::File(path.to_path_buf()),
            None => Destination::File(PathBuf::from(DEFAULT_RESULT_FILE)),
        }
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let settings = Settings::load(cli.config.as_deref())?;
    let interrupt = install_interrupt_handler();

    match run(&cli, &settings, &interrupt) {
        Err(_) if interrupt.load(Ordering::SeqCst) => {
            eprintln!("Interrupted.");
            std::process::exit(EXIT_INTERRUPTED);
        }
        other => other,
    }
}

/// stderr logging; `RUST_LOG` wins over `-v`.
fn init_logging(verbosity: u8) {
    let default = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

/// Flag raised by Ctrl-C. Scanning and hashing stop at the next entry.
fn install_interrupt_handler() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&flag);

    if let Err(err) = ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %err, "cannot install Ctrl-C handler");
    }
    flag
}

fn scan_config(cli: &Cli, settings: &Settings) -> Result<ScanConfig> {
    let roots = if cli.paths.is_empty() {
        vec![std::env::current_dir().wrap_err("Cannot determine current directory")?]
    } else {
        cli.paths.clone()
    };

    let mut patterns = settings.ignore_patterns.clone();
    patterns.extend(cli.exclude.iter().cloned());

    let include_hidden = !cli.skip_hidden && settings.include_hidden.unwrap_or(true);

    ScanConfig::builder()
        .roots(roots)
        .include_hidden(include_hidden)
        .ignore_patterns(patterns)
        .build()
        .wrap_err("Invalid scan configuration")
}

fn analyze_config(cli: &Cli, settings: &Settings) -> AnalyzeConfig {
    let defaults = AnalyzeConfig::default();
    AnalyzeConfig {
        algorithm: cli.algorithm.or(settings.algorithm).unwrap_or(defaults.algorithm),
        threads: cli.threads.or(settings.threads).unwrap_or(defaults.threads),
        partial_window: settings.partial_window.unwrap_or(DEFAULT_PARTIAL_WINDOW),
        fuzzy_min_shared_files: settings
            .fuzzy_min_shared_files
            .unwrap_or(defaults.fuzzy_min_shared_files),
    }
}

/// The persisted cache, unless disabled.
fn open_cache(cli: &Cli, settings: &Settings) -> Option<Arc<JsonHashCache>> {
    if cli.no_cache || (cli.cache.is_none() && !settings.cache_enabled()) {
        return None;
    }
    let path = cli
        .cache
        .clone()
        .or_else(|| settings.cache_path.clone())
        .or_else(Settings::default_cache_path)?;
    Some(Arc::new(JsonHashCache::load(path)))
}

fn run(cli: &Cli, settings: &Settings, interrupt: &Arc<AtomicBool>) -> Result<()> {
    let scan_config = scan_config(cli, settings)?;
    let config = analyze_config(cli, settings);

    if !cli.quiet {
        for root in &scan_config.roots {
            eprintln!("Scanning {}...", root.display());
        }
    }

    let builder = TreeBuilder::new().with_interrupt(Arc::clone(interrupt));
    let display = (!cli.quiet).then(|| ProgressDisplay::scan(builder.subscribe()));
    let scanned = builder.build(&scan_config);
    drop(builder);
    if let Some(display) = display {
        display.finish();
    }
    let mut tree = scanned.wrap_err("Scan failed")?;

    if !cli.quiet {
        eprintln!(
            "Found {} files in {} directories ({}), scanned in {:.2}s",
            tree.stats.total_files,
            tree.stats.total_dirs,
            format_size(tree.total_size()),
            tree.scan_duration.as_secs_f64()
        );
        if tree.has_warnings() {
            eprintln!("{} entries could not be read and were skipped", tree.warnings.len());
        }
        eprintln!("Hashing with {}", config.algorithm);
    }

    let cache = open_cache(cli, settings);
    let mut hasher = ContentHasher::new(config.algorithm, config.partial_window);
    if let Some(cache) = &cache {
        hasher = hasher.with_cache(cache.clone());
    }

    let finder = DuplicateFinder::with_hasher(config, Arc::new(hasher))
        .with_interrupt(Arc::clone(interrupt));
    let display = (!cli.quiet).then(|| ProgressDisplay::hashing(finder.subscribe()));
    let result = finder.find_duplicates(&mut tree);
    drop(finder);
    if let Some(display) = display {
        display.finish();
    }

    // Digests computed before an interrupt are still worth keeping.
    if let Some(cache) = &cache {
        if let Err(err) = cache.save() {
            warn!(error = %err, "cannot save hash cache");
        }
    }
    let report = result.wrap_err("Duplicate analysis failed")?;

    let destination = Destination::resolve(cli.output.as_deref(), settings.output.as_deref());
    write_report(&report, cli.format, &destination)?;

    if !cli.quiet {
        eprintln!(
            "{} equal groups, {} fuzzy directory groups, {} reclaimable",
            report.exact_count(),
            report.fuzzy_count(),
            format_size(report.reclaimable_bytes())
        );
        if let Destination::File(path) = &destination {
            eprintln!("Results saved into {}", path.display());
        }
    }
    Ok(())
}

fn write_report(report: &DuplicateReport, format: OutputFormat, destination: &Destination) -> Result<()> {
    let mut out: Box<dyn Write> = match destination {
        Destination::Stdout => Box::new(io::stdout().lock()),
        Destination::File(path) => Box::new(BufWriter::new(
            File::create(path).wrap_err_with(|| format!("Cannot create {}", path.display()))?,
        )),
    };

    match format {
        OutputFormat::Text => report.write_text(&mut out),
        OutputFormat::Json => report.write_json(&mut out),
    }
    .wrap_err("Cannot write report")?;

    out.flush().wrap_err("Cannot write report")
}

/// Format bytes as human-readable size.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}
