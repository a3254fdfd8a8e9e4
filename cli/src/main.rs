use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use tsm_core::config::{ExporterConfig, FieldMapping};
use tsm_core::database::Database;
use tsm_core::models::{ExportOutcome, Snapshot};
use tsm_core::{export_snapshot, parse_snapshot_file, read_snapshot_file};

#[derive(Parser)]
#[command(
    name = "tsm-exporter",
    version = "0.1.0",
    about = "Extract TSM AuctionDB price snapshots and load them into a price history database",
    long_about = None
)]
struct Cli {
    /// Path to SQLite database file (overrides the config file)
    #[arg(long, global = true, env = "TSM_DATABASE")]
    database: Option<PathBuf>,

    /// Path to TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to log file
    #[arg(long, global = true, default_value = "/tmp/tsm-exporter.log")]
    log_file: PathBuf,

    /// Verbosity level (repeat for more verbose output)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract a realm's snapshot from a TSM dump, export it as JSON and load it
    Extract {
        /// TSM dump file (AppData.lua)
        #[arg(long)]
        dump: PathBuf,
        /// Realm to extract (case-insensitive)
        #[arg(long)]
        realm: String,
        /// Directory for the exported JSON file
        #[arg(long)]
        output_dir: PathBuf,
        /// Only export JSON, do not touch the database
        #[arg(long, default_value_t = false)]
        skip_load: bool,
    },

    /// Load a previously exported JSON snapshot into the database
    Load {
        /// Exported snapshot file
        #[arg(long)]
        json: PathBuf,
        /// Realm the rows are tagged with
        #[arg(long)]
        realm: String,
    },
}

fn setup_logging(verbose: u8, log_file: &Path) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let filter_level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    let filter = EnvFilter::from_default_env().add_directive(filter_level.into());

    let file_appender = tracing_appender::rolling::never(
        log_file.parent().unwrap_or(Path::new(".")),
        log_file.file_name().unwrap_or(std::ffi::OsStr::new("tsm-exporter.log")),
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::Layer::new().with_writer(std::io::stderr).with_ansi(true))
        .with(fmt::Layer::new().with_writer(non_blocking).with_ansi(false));

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(guard)
}

fn load_config(path: Option<&Path>) -> Result<ExporterConfig> {
    match path {
        Some(path) => ExporterConfig::from_file(path)
            .with_context(|| format!("Failed to load config {:?}", path)),
        None => Ok(ExporterConfig::default()),
    }
}

fn load_into_database(
    db_path: &Path,
    snapshot: &Snapshot,
    realm: &str,
    mapping: &FieldMapping,
) -> Result<()> {
    let db = Database::new(db_path)
        .with_context(|| format!("Failed to open database {:?}", db_path))?;
    let summary = db
        .load_snapshot(snapshot, realm, mapping)
        .with_context(|| format!("Failed to load snapshot for {}", realm))?;

    if summary.failed > 0 {
        tracing::warn!("{} of {} rows failed to insert", summary.failed, summary.total());
    }
    info!(
        "Inserted {} rows into {:?} ({} already present)",
        summary.inserted, db_path, summary.duplicates
    );

    let stored = db
        .count_rows(realm)
        .with_context(|| format!("Failed to count stored rows for {}", realm))?;
    info!("{} now has {} stored price rows", realm, stored);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let _guard = setup_logging(cli.verbose, &cli.log_file)?;

    info!("Starting tsm-exporter");

    let config = load_config(cli.config.as_deref())?;
    let mapping = config.field_mapping().context("Invalid field mapping")?;
    for (field, column) in mapping.pairs() {
        tracing::debug!("Field {} -> column {}", field, column);
    }
    let db_path = cli
        .database
        .or_else(|| config.database.clone())
        .unwrap_or_else(|| PathBuf::from("./tsm.sqlite"));

    match cli.command {
        Commands::Extract { dump, realm, output_dir, skip_load } => {
            if !output_dir.is_dir() {
                anyhow::bail!("Output dir {:?} does not exist", output_dir);
            }

            let snapshot = parse_snapshot_file(&dump, &realm)
                .with_context(|| format!("Failed to extract {} from {:?}", realm, dump))?;

            if let Some(downloaded) = snapshot.download_datetime() {
                info!("Snapshot for {} was downloaded at {}", realm, downloaded.to_rfc3339());
            }

            let outcome = export_snapshot(&snapshot, &realm, &output_dir)
                .context("Failed to export snapshot")?;

            match outcome {
                ExportOutcome::Written(path) => {
                    info!("Exported {} to {:?}", realm, path);
                    if skip_load {
                        info!("Skipping database load");
                    } else {
                        load_into_database(&db_path, &snapshot, &realm, &mapping)?;
                    }
                }
                ExportOutcome::AlreadyExported(path) => {
                    info!("Nothing to do, {:?} already exists", path);
                }
            }
        }
        Commands::Load { json, realm } => {
            let snapshot = read_snapshot_file(&json)
                .with_context(|| format!("Failed to read snapshot file {:?}", json))?;
            info!(
                "Loading {} rows for {} from {:?}",
                snapshot.data.len(),
                realm,
                json
            );
            load_into_database(&db_path, &snapshot, &realm, &mapping)?;
        }
    }

    info!("tsm-exporter finished");
    Ok(())
}
