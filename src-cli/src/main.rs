mod config;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use burst_detection::{scan_folder, CancelToken, TimestampPolicy, Triage, TriageReport};
use clap::{Parser, Subcommand};
use session_db::{Session, SessionDb};
use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::AppConfig;

#[derive(Parser)]
#[command(name = "burstpick", version)]
#[command(about = "Group burst photos by capture time and pick the sharpest frame of each burst")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a folder: group bursts and pick the sharpest frames
    Analyze {
        /// Path to folder containing images
        #[arg(short, long)]
        path: PathBuf,

        /// Maximum time gap between consecutive shots of a burst (seconds)
        #[arg(long)]
        threshold: Option<f64>,

        /// Timestamp source: metadata-first or filesystem-only
        #[arg(long)]
        policy: Option<TimestampPolicy>,

        /// Refine EXIF capture times with SubSecTimeOriginal
        #[arg(long)]
        subsec: bool,

        /// Output the full report to a JSON file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Do not persist the session
        #[arg(long)]
        no_save: bool,
    },

    /// Print the saved session for a folder
    Show {
        #[arg(short, long)]
        path: PathBuf,
    },

    /// Merge a group into the one before it
    Merge {
        #[arg(short, long)]
        path: PathBuf,

        /// Group number as printed by `show`
        #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
        group: u64,
    },

    /// Move the selected photos of a group into a new group after it
    Split {
        #[arg(short, long)]
        path: PathBuf,

        /// Group number as printed by `show`
        #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
        group: u64,
    },

    /// Add a photo to the export selection, or remove it
    Toggle {
        #[arg(short, long)]
        path: PathBuf,

        /// Full path or file name of the photo
        #[arg(long)]
        photo: String,
    },

    /// Copy the selected photos to a folder
    Export {
        #[arg(short, long)]
        path: PathBuf,

        /// Destination folder, created if missing
        #[arg(long)]
        to: PathBuf,
    },
}

fn init_tracing(verbosity: u8) -> Result<()> {
    // map -v to log level
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let mut filter = EnvFilter::from_default_env();
    for target in ["burstpick", "burst_detection", "session_db"] {
        filter = filter.add_directive(format!("{}={}", target, level).parse()?);
    }
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let config = match &cli.config {
        Some(path) => AppConfig::from_toml_file(path)?,
        None => AppConfig::default(),
    };

    match cli.command {
        Commands::Analyze {
            path,
            threshold,
            policy,
            subsec,
            output,
            no_save,
        } => {
            let mut config = config;
            if let Some(threshold) = threshold {
                config.burst.threshold_secs = threshold;
            }
            if let Some(policy) = policy {
                config.burst.policy = policy;
            }
            config.burst.subsec_precision |= subsec;
            config.validate().context("validating configuration")?;

            analyze_folder(&path, &config, output, !no_save)
        }
        Commands::Show { path } => {
            let (_, session) = load_session(&path)?;
            print_session(&session);
            Ok(())
        }
        Commands::Merge { path, group } => {
            let (db, mut session) = load_session(&path)?;
            let merged = session.merge_with_previous(group_index(group))?;
            db.save_session(&session)?;
            println!("🔗 Merged group {} into group {}", group, merged + 1);
            print_session(&session);
            Ok(())
        }
        Commands::Split { path, group } => {
            let (db, mut session) = load_session(&path)?;
            match session.split_selected(group_index(group))? {
                Some(created) => {
                    db.save_session(&session)?;
                    println!("✂️  Split selected photos into group {}", created + 1);
                    print_session(&session);
                }
                None => println!("⚠️  Nothing to split: select some, but not all, photos of group {}", group),
            }
            Ok(())
        }
        Commands::Toggle { path, photo } => {
            let (db, mut session) = load_session(&path)?;
            let photo = resolve_photo(&session, &photo)?;
            let selected = session.toggle(&photo)?;
            db.save_session(&session)?;
            println!("{} {}", if selected { "✅ Selected" } else { "⬜ Deselected" }, photo);
            Ok(())
        }
        Commands::Export { path, to } => {
            let (_, session) = load_session(&path)?;
            std::fs::create_dir_all(&to)
                .with_context(|| format!("Failed to create export folder: {}", to.display()))?;
            let summary = session.export_selected(&to)?;
            println!("💾 Exported {} photos to {}", summary.copied.len(), summary.destination.display());
            Ok(())
        }
    }
}

fn group_index(group: u64) -> usize {
    group.saturating_sub(1) as usize
}

fn canonical_folder(path: &Path) -> Result<PathBuf> {
    path.canonicalize()
        .with_context(|| format!("Path is not accessible: {}", path.display()))
}

fn load_session(path: &Path) -> Result<(SessionDb, Session)> {
    let folder = canonical_folder(path)?;
    if !SessionDb::exists(&folder) {
        bail!("No saved session for {}; run `burstpick analyze` first", folder.display());
    }
    let db = SessionDb::open(&folder)?;
    let session = db
        .load_session()?
        .with_context(|| format!("Session database for {} is empty", folder.display()))?;
    Ok((db, session))
}

/// Match `photo` against session paths, first exactly, then by file name.
fn resolve_photo(session: &Session, photo: &str) -> Result<String> {
    if session.contains(photo) {
        return Ok(photo.to_string());
    }

    let matches: Vec<&str> = session
        .groups
        .iter()
        .flat_map(|g| &g.photos)
        .map(|p| p.path.as_str())
        .filter(|p| Path::new(p).file_name().is_some_and(|name| name == photo))
        .collect();

    match matches.as_slice() {
        [only] => Ok(only.to_string()),
        [] => bail!("{} is not part of this session", photo),
        _ => bail!("{} matches {} photos; pass the full path", photo, matches.len()),
    }
}

fn analyze_folder(folder: &Path, config: &AppConfig, output_path: Option<PathBuf>, save: bool) -> Result<()> {
    let folder = canonical_folder(folder)?;
    println!("🔍 Analyzing images in: {}", folder.display());

    let photos = scan_folder(&folder, &config.scan)?;
    if photos.is_empty() {
        println!("⚠️  No supported image files found in {}", folder.display());
        // Replace any earlier session for this folder
        if save {
            let db = SessionDb::open(&folder)?;
            save_report(&db, &folder, config, &TriageReport::default())?;
            println!("🗂️  Cleared saved session: {}", db.path().display());
        }
        return Ok(());
    }
    println!("📸 Found {} image files", photos.len());

    let cancel = CancelToken::new();
    let handle = cancel.clone();
    ctrlc::set_handler(move || handle.cancel()).context("Failed to install Ctrl-C handler")?;

    println!(
        "🎯 Grouping with a {:.2}s threshold ({})...",
        config.burst.threshold_secs, config.burst.policy
    );
    let report = match Triage::new(config.burst.clone()).run(&photos, &cancel) {
        Ok(report) => report,
        Err(burst_detection::Error::Cancelled) => {
            println!("⏹️  Analysis cancelled");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    print_analysis_results(&report);

    if save {
        let db = SessionDb::open(&folder)?;
        save_report(&db, &folder, config, &report)?;
        println!("🗂️  Session saved to: {}", db.path().display());
    }

    if let Some(output_path) = output_path {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize triage report to JSON")?;
        std::fs::write(&output_path, json)
            .with_context(|| format!("Failed to write output to {}", output_path.display()))?;
        println!("💾 Results saved to: {}", output_path.display());
    }

    Ok(())
}

fn save_report(db: &SessionDb, folder: &Path, config: &AppConfig, report: &TriageReport) -> Result<()> {
    let session = Session::from_report(folder, report)?;
    db.save_session(&session)?;
    db.set_meta("threshold_secs", &config.burst.threshold_secs.to_string())?;
    db.set_meta("policy", &config.burst.policy.to_string())?;
    Ok(())
}

fn print_analysis_results(report: &TriageReport) {
    println!("\n📈 ANALYSIS RESULTS");
    println!("==================");
    println!("Grouped images: {}", report.total_photos());
    println!("Groups: {}", report.groups.len());
    println!("Skipped (no timestamp): {}", report.skipped.len());

    for (i, triaged) in report.groups.iter().enumerate() {
        let group = &triaged.group;
        println!("\nGroup {} ({})", i + 1, group.id);
        println!("  📸 Images: {}", group.len());
        if group.len() > 1 {
            println!("  ⏱️  Duration: {:.2}s ({:.1} fps)", group.duration_secs, group.estimated_fps);
            println!("  ⚡ Avg gap: {:.0}ms", group.avg_gap_secs * 1000.0);
        }
        for scored in &triaged.scores {
            let marker = if scored.photo == triaged.pick { "⭐" } else { "  " };
            let note = if scored.failure.is_some() { " (unreadable)" } else { "" };
            println!("  {} {} {:>10.1}{}", marker, scored.photo.file_name(), scored.score, note);
        }
    }

    for photo in &report.skipped {
        println!("⚠️  Skipped {}", photo);
    }
}

fn print_session(session: &Session) {
    println!("\n🗂️  SESSION: {}", session.root);
    println!("==================");
    for (i, group) in session.groups.iter().enumerate() {
        println!("\nGroup {} ({} photos)", i + 1, group.photos.len());
        for photo in &group.photos {
            let pick = if group.pick.as_deref() == Some(photo.path.as_str()) { "⭐" } else { "  " };
            let selected = if session.selected.contains(&photo.path) { "✅" } else { "⬜" };
            let name = Path::new(&photo.path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| photo.path.clone());
            println!("  {} {} {} {:>10.1}", selected, pick, name, photo.sharpness);
        }
    }
    println!("\nSelected for export: {}", session.selected.len());
}
