use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use clap::{Args, Parser, Subcommand, ValueEnum};
use dircmp_common::{ensure_config, load_config, CompareSettings, EntrySnapshot, ItemDecision, Side, Vfs};
use dircmp_core::vfs::overlay::compare_names;
use dircmp_core::{ComparisonSession, FolderSummary, LocalVfs, OverlayVfs, ScanPhase, ScanProgress};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Exit code when both trees compare equal
const EXIT_IDENTICAL: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_DIFFERENT: i32 = 2;

#[derive(Parser)]
#[command(name = "dircmp")]
#[command(author = "DirCmp Contributors")]
#[command(version)]
#[command(about = "Compare two directory trees", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare two directories and report every entry
    Compare {
        /// Left directory path
        left: PathBuf,

        /// Right directory path
        right: PathBuf,

        #[command(flatten)]
        flags: CompareFlags,

        /// Show only differences (hide identical entries)
        #[arg(short = 'd', long)]
        diff_only: bool,

        /// Output results as JSON
        #[arg(long)]
        json: bool,

        /// Disable ANSI colors in output
        #[arg(long)]
        no_color: bool,
    },

    /// List one side of a folder as the comparison sees it
    List {
        /// Left directory path
        left: PathBuf,

        /// Right directory path
        right: PathBuf,

        /// Which side to list
        #[arg(long, value_enum, default_value_t = SideArg::Left)]
        side: SideArg,

        /// Folder to list, relative to the chosen root
        path: Option<PathBuf>,

        #[command(flatten)]
        flags: CompareFlags,

        /// Show only differences (hide identical entries)
        #[arg(short = 'd', long)]
        diff_only: bool,
    },

    /// Write the default configuration file if none exists and print its path
    Config {
        /// Use the configuration file next to the executable
        #[arg(long)]
        portable: bool,
    },
}

#[derive(Args, Debug, Default, Clone)]
struct CompareFlags {
    /// Compare file sizes
    #[arg(long, conflicts_with = "no_size")]
    size: bool,

    /// Do not compare file sizes
    #[arg(long)]
    no_size: bool,

    /// Compare modification times
    #[arg(long, conflicts_with = "no_time")]
    time: bool,

    /// Do not compare modification times
    #[arg(long)]
    no_time: bool,

    /// Compare file attributes
    #[arg(long)]
    attributes: bool,

    /// Compare file contents byte by byte
    #[arg(long)]
    content: bool,

    /// Do not descend into subdirectories
    #[arg(long)]
    no_subdirs: bool,

    /// Compare directory attributes
    #[arg(long)]
    subdir_attributes: bool,

    /// Semicolon-separated file patterns to ignore, e.g. "*.log;*.tmp"
    #[arg(long, value_name = "PATTERNS")]
    ignore_files: Option<String>,

    /// Semicolon-separated directory patterns to ignore, e.g. "target;.git"
    #[arg(long, value_name = "PATTERNS")]
    ignore_dirs: Option<String>,

    /// Read the configuration file next to the executable
    #[arg(long)]
    portable: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SideArg {
    Left,
    Right,
}

impl From<SideArg> for Side {
    fn from(side: SideArg) -> Self {
        match side {
            SideArg::Left => Side::Left,
            SideArg::Right => Side::Right,
        }
    }
}

fn main() {
    // Logs go to stderr so JSON output stays clean on stdout
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Compare {
            left,
            right,
            flags,
            diff_only,
            json,
            no_color,
        } => run_compare(&left, &right, &flags, diff_only, json, no_color),
        Commands::List {
            left,
            right,
            side,
            path,
            flags,
            diff_only,
        } => run_list(&left, &right, side.into(), path.as_deref(), &flags, diff_only)
            .map(|()| EXIT_IDENTICAL),
        Commands::Config { portable } => run_config(portable).map(|()| EXIT_IDENTICAL),
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(EXIT_ERROR);
        }
    }
}

/// Configured defaults with command-line flags layered on top
fn resolve_settings(flags: &CompareFlags, diff_only: bool) -> Result<CompareSettings> {
    let loaded = load_config(flags.portable).context("Failed to load configuration")?;
    info!(
        "Using configuration {} (exists: {})",
        loaded.path.display(),
        loaded.exists
    );
    let mut settings = loaded.config.settings;
    apply_flags(&mut settings, flags);
    if diff_only {
        settings.show_identical = false;
    }
    Ok(settings)
}

fn apply_flags(settings: &mut CompareSettings, flags: &CompareFlags) {
    if flags.size {
        settings.compare_size = true;
    }
    if flags.no_size {
        settings.compare_size = false;
    }
    if flags.time {
        settings.compare_time = true;
    }
    if flags.no_time {
        settings.compare_time = false;
    }
    if flags.attributes {
        settings.compare_attributes = true;
    }
    if flags.content {
        settings.compare_content = true;
    }
    if flags.no_subdirs {
        settings.compare_subdirs = false;
    }
    if flags.subdir_attributes {
        settings.compare_subdir_attributes = true;
    }
    if let Some(patterns) = &flags.ignore_files {
        settings.ignore_files_enabled = true;
        settings.ignore_files = patterns.clone();
    }
    if let Some(patterns) = &flags.ignore_dirs {
        settings.ignore_dirs_enabled = true;
        settings.ignore_dirs = patterns.clone();
    }
}

fn open_session(left: &Path, right: &Path, settings: CompareSettings) -> Result<Arc<ComparisonSession>> {
    for (label, path) in [("Left", left), ("Right", right)] {
        if !path.is_dir() {
            bail!("{} path is not a directory: {}", label, path.display());
        }
    }
    Ok(Arc::new(ComparisonSession::new(
        Arc::new(LocalVfs::new()),
        left,
        right,
        settings,
    )))
}

fn run_compare(
    left: &Path,
    right: &Path,
    flags: &CompareFlags,
    diff_only: bool,
    json: bool,
    no_color: bool,
) -> Result<i32> {
    let settings = resolve_settings(flags, diff_only)?;
    let session = open_session(left, right, settings)?;
    info!("Session {} started", session.id());

    let spinner = if !json && std::io::stderr().is_terminal() {
        Some(attach_spinner(&session))
    } else {
        None
    };
    let walked = walk_tree(&session);
    session.set_progress_callback(None);
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    let WalkedTree { rows, summary } = walked?;

    if json {
        let report = build_json_report(left, right, &rows, &summary, session.show_identical());
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let use_color = !no_color && std::io::stdout().is_terminal();
        print_report(&rows, &summary, session.show_identical(), use_color);
    }

    Ok(if summary.has_differences() {
        EXIT_DIFFERENT
    } else {
        EXIT_IDENTICAL
    })
}

fn attach_spinner(session: &ComparisonSession) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));

    let handle = spinner.clone();
    session.set_progress_callback(Some(Arc::new(move |progress: &ScanProgress| {
        handle.set_message(progress_message(progress));
    })));
    spinner
}

fn progress_message(progress: &ScanProgress) -> String {
    let phase = match progress.phase {
        ScanPhase::Started => "Scanning",
        ScanPhase::Progress => "Scanning",
        ScanPhase::Finished => "Scanned",
    };
    format!(
        "{} {} folders, {} entries",
        phase, progress.stats.folders_scanned, progress.stats.entries_scanned
    )
}

/// One reported entry with its path relative to the roots
#[derive(Debug, Clone)]
struct ReportRow {
    path: String,
    item: ItemDecision,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
enum EntryStatus {
    Identical,
    Different,
    LeftOnly,
    RightOnly,
}

impl EntryStatus {
    fn of(item: &ItemDecision) -> Self {
        match (item.exists_left(), item.exists_right()) {
            (true, false) => EntryStatus::LeftOnly,
            (false, true) => EntryStatus::RightOnly,
            _ if item.is_different => EntryStatus::Different,
            _ => EntryStatus::Identical,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            EntryStatus::Identical => "==",
            EntryStatus::Different => "!=",
            EntryStatus::LeftOnly => "<<",
            EntryStatus::RightOnly => ">>",
        }
    }

    fn color(self) -> &'static str {
        match self {
            EntryStatus::Identical => "\x1b[32m",
            EntryStatus::Different => "\x1b[31m",
            EntryStatus::LeftOnly => "\x1b[33m",
            EntryStatus::RightOnly => "\x1b[34m",
        }
    }
}

/// Every entry of the decision tree plus counts over the same entries
struct WalkedTree {
    rows: Vec<ReportRow>,
    summary: FolderSummary,
}

/// Rows sorted so each folder precedes its contents
fn walk_tree(session: &ComparisonSession) -> Result<WalkedTree> {
    let mut rows = Vec::new();
    let mut summary = FolderSummary::default();
    let mut failed = None;

    session.walk(Path::new(""), |folder, decision| {
        if let Some(failure) = decision.status.failure() {
            if failed.is_none() {
                failed = Some((folder.to_path_buf(), failure.clone()));
            }
            return;
        }
        let prefix = display_path(folder);
        for item in decision.items.values() {
            summary.record(item);
            let path = if prefix.is_empty() {
                item.name.clone()
            } else {
                format!("{}/{}", prefix, item.name)
            };
            rows.push(ReportRow {
                path,
                item: item.clone(),
            });
        }
    });

    if let Some((folder, failure)) = failed {
        bail!(
            "Failed to compare '{}': {}",
            session.absolute_path(Side::Left, &folder).display(),
            failure
        );
    }

    rows.sort_by(|a, b| compare_paths(&a.path, &b.path));
    Ok(WalkedTree { rows, summary })
}

fn display_path(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn compare_paths(a: &str, b: &str) -> std::cmp::Ordering {
    let mut left = a.split('/');
    let mut right = b.split('/');
    loop {
        match (left.next(), right.next()) {
            (Some(x), Some(y)) => match compare_names(x, y) {
                std::cmp::Ordering::Equal => continue,
                other => return other,
            },
            (None, Some(_)) => return std::cmp::Ordering::Less,
            (Some(_), None) => return std::cmp::Ordering::Greater,
            (None, None) => return std::cmp::Ordering::Equal,
        }
    }
}

fn print_report(rows: &[ReportRow], summary: &FolderSummary, show_identical: bool, use_color: bool) {
    println!("{}", "=".repeat(80));
    println!("Comparison Results");
    println!("{}", "=".repeat(80));

    for row in rows {
        let status = EntryStatus::of(&row.item);
        if !show_identical && status == EntryStatus::Identical {
            continue;
        }
        let (color, reset) = if use_color {
            (status.color(), "\x1b[0m")
        } else {
            ("", "")
        };
        let suffix = if row.item.is_dir() { "/" } else { "" };
        let reasons = if row.item.reasons.is_empty() || status != EntryStatus::Different {
            String::new()
        } else {
            format!("  [{}]", row.item.reasons)
        };
        println!("{}  {}  {} {}{}{}", color, status.symbol(), reset, row.path, suffix, reasons);
    }

    println!("{}", "=".repeat(80));
    println!("Summary:");
    println!("  Total entries:   {}", summary.total());
    println!("  Identical:       {} (==)", summary.identical);
    println!("  Different:       {} (!=)", summary.different);
    println!("  Left only:       {} (<<)", summary.left_only);
    println!("  Right only:      {} (>>)", summary.right_only);
    println!("{}", "=".repeat(80));
}

#[derive(Serialize)]
struct JsonReport {
    left: String,
    right: String,
    summary: JsonSummary,
    entries: Vec<JsonEntry>,
}

#[derive(Serialize)]
struct JsonSummary {
    total: usize,
    identical: usize,
    different: usize,
    left_only: usize,
    right_only: usize,
}

#[derive(Serialize)]
struct JsonEntry {
    path: String,
    status: EntryStatus,
    is_dir: bool,
    reasons: Vec<&'static str>,
    select_left: bool,
    select_right: bool,
    left: Option<JsonFileSide>,
    right: Option<JsonFileSide>,
}

#[derive(Serialize)]
struct JsonFileSide {
    name: String,
    size: u64,
    modified_unix: Option<u64>,
    attributes: u32,
}

fn build_json_report(
    left: &Path,
    right: &Path,
    rows: &[ReportRow],
    summary: &FolderSummary,
    show_identical: bool,
) -> JsonReport {
    let entries = rows
        .iter()
        .filter(|row| show_identical || row.item.is_different)
        .map(|row| JsonEntry {
            path: row.path.clone(),
            status: EntryStatus::of(&row.item),
            is_dir: row.item.is_dir(),
            reasons: row.item.reasons.labels(),
            select_left: row.item.select_left,
            select_right: row.item.select_right,
            left: row.item.left.as_ref().map(json_side),
            right: row.item.right.as_ref().map(json_side),
        })
        .collect();

    JsonReport {
        left: left.to_string_lossy().to_string(),
        right: right.to_string_lossy().to_string(),
        summary: JsonSummary {
            total: summary.total(),
            identical: summary.identical,
            different: summary.different,
            left_only: summary.left_only,
            right_only: summary.right_only,
        },
        entries,
    }
}

fn json_side(snapshot: &EntrySnapshot) -> JsonFileSide {
    JsonFileSide {
        name: snapshot.name.clone(),
        size: snapshot.size,
        modified_unix: system_time_to_unix(snapshot.modified),
        attributes: snapshot.attributes.bits(),
    }
}

fn system_time_to_unix(time: SystemTime) -> Option<u64> {
    time.duration_since(UNIX_EPOCH).ok().map(|d| d.as_secs())
}

fn run_list(
    left: &Path,
    right: &Path,
    side: Side,
    folder: Option<&Path>,
    flags: &CompareFlags,
    diff_only: bool,
) -> Result<()> {
    let settings = resolve_settings(flags, diff_only)?;
    let session = open_session(left, right, settings)?;
    let overlay = OverlayVfs::new(Arc::clone(&session), side);

    let target = session.absolute_path(side, folder.unwrap_or_else(|| Path::new("")));
    let entries = overlay
        .read_dir(&target)
        .with_context(|| format!("Failed to list {}", target.display()))?;

    for entry in &entries {
        println!(
            "{} {:>12} {} {}",
            if entry.is_dir { "d" } else { "-" },
            entry.size,
            format_timestamp(entry.modified),
            entry.name
        );
    }
    Ok(())
}

fn run_config(portable: bool) -> Result<()> {
    let loaded = ensure_config(portable).context("Failed to prepare configuration")?;
    info!("Configuration ready at {}", loaded.path.display());
    println!("{}", loaded.path.display());
    Ok(())
}

fn format_timestamp(time: SystemTime) -> String {
    let local: DateTime<Local> = time.into();
    local.format("%Y-%m-%d %H:%M:%S").to_string()
}
