//! pg-upgrade-check CLI - data checks around a PostgreSQL upgrade.

use clap::{Parser, Subcommand};
use pg_upgrade_check::snapshot::{ensure_absent, ensure_present};
use pg_upgrade_check::{
    CheckError, Collector, Comparator, CompareMode, CompareSummary, Config, Database, PgDatabase,
    SnapshotMap, TableStatus, TracingReporter,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

const DEFAULT_BEFORE_OUTPUT: &str = "data/before_ids.json";
const DEFAULT_AFTER_OUTPUT: &str = "data/after_ids.json";

#[derive(Parser)]
#[command(name = "pg-upgrade-check")]
#[command(about = "Check row data across a PostgreSQL upgrade")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml", global = true)]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long, global = true)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text", global = true)]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info", global = true)]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record start ids from the source database
    #[command(alias = "collect-before")]
    Before {
        /// Output destination for before replication IDs
        #[arg(short = 'b', long, default_value = DEFAULT_BEFORE_OUTPUT)]
        before_replication_output: PathBuf,

        /// Source database URL
        #[arg(long, default_value = "postgres://postgres@localhost:6001/postgres")]
        source_url: String,
    },

    /// Record stop ids from the source database
    #[command(alias = "collect-after")]
    After {
        /// Before replication IDs written by the before stage
        #[arg(short = 'b', long, default_value = DEFAULT_BEFORE_OUTPUT)]
        before_replication_output: PathBuf,

        /// Output destination for after replication IDs
        #[arg(short = 'a', long, default_value = DEFAULT_AFTER_OUTPUT)]
        after_replication_output: PathBuf,

        /// Source database URL
        #[arg(long, default_value = "postgres://postgres@localhost:6001/postgres")]
        source_url: String,
    },

    /// Compare rows between start and stop ids in source and target databases
    Compare {
        /// After replication IDs written by the after stage
        #[arg(short = 'a', long, default_value = DEFAULT_AFTER_OUTPUT)]
        after_replication_output: PathBuf,

        /// Source database URL
        #[arg(long, default_value = "postgres://postgres@localhost:6000/postgres")]
        source_url: String,

        /// Target database URL
        #[arg(long, default_value = "postgres://postgres@localhost:6001/postgres")]
        target_url: String,

        /// Report every mismatch in a window instead of only the first
        #[arg(long)]
        strict: bool,

        /// Exit with a non-zero code when any mismatch is found
        #[arg(long)]
        fail_on_mismatch: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("The application has failed");
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), CheckError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let config = Config::load(&cli.config).map_err(|e| match e {
        CheckError::Io(io) => CheckError::Config(format!(
            "unable to read config {}: {}",
            cli.config.display(),
            io
        )),
        other => other,
    })?;
    info!("Loaded configuration from {:?}", cli.config);

    let cancel_token = setup_signal_handler();

    match cli.command {
        Commands::Before {
            before_replication_output,
            source_url,
        } => {
            ensure_absent(&before_replication_output)?;

            let source = PgDatabase::connect("source", &source_url).await?;
            let result = Collector::new(&config, &source)
                .with_cancel(cancel_token)
                .run_before(&before_replication_output)
                .await;
            source.close().await;

            print_snapshot(&result?, &before_replication_output, cli.output_json)?;
        }

        Commands::After {
            before_replication_output,
            after_replication_output,
            source_url,
        } => {
            ensure_absent(&after_replication_output)?;
            ensure_present(&before_replication_output)?;

            let source = PgDatabase::connect("source", &source_url).await?;
            let result = Collector::new(&config, &source)
                .with_cancel(cancel_token)
                .run_after(&before_replication_output, &after_replication_output)
                .await;
            source.close().await;

            print_snapshot(&result?, &after_replication_output, cli.output_json)?;
        }

        Commands::Compare {
            after_replication_output,
            source_url,
            target_url,
            strict,
            fail_on_mismatch,
        } => {
            let snapshot = SnapshotMap::load(&after_replication_output)?;
            let mode = if strict {
                CompareMode::Strict
            } else {
                config.compare.mode
            };

            let source = PgDatabase::connect("source", &source_url).await?;
            let target = match PgDatabase::connect("target", &target_url).await {
                Ok(target) => target,
                Err(e) => {
                    source.close().await;
                    return Err(e);
                }
            };

            let result = Comparator::new(&config, &source, &target, &TracingReporter)
                .with_mode(mode)
                .with_cancel(cancel_token)
                .run(&snapshot)
                .await;
            source.close().await;
            target.close().await;
            let summary = result?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_summary(&summary);
            }

            if fail_on_mismatch && summary.has_issues() {
                return Err(CheckError::MismatchesFound {
                    issues: summary.total_issues,
                    tables: summary.tables_with_issues,
                });
            }
        }
    }

    Ok(())
}

fn print_snapshot(snapshot: &SnapshotMap, path: &Path, json: bool) -> Result<(), CheckError> {
    if json {
        println!("{}", serde_json::to_string_pretty(snapshot)?);
        return Ok(());
    }

    println!("\nWrote {} table(s) to {}", snapshot.len(), path.display());
    for (table, checkpoint) in snapshot.iter() {
        println!(
            "  {}: startId {}, stopId {}",
            table, checkpoint.start_id, checkpoint.stop_id
        );
    }
    Ok(())
}

fn print_summary(summary: &CompareSummary) {
    println!("\nComparison Summary ({}):", summary.mode);
    for table in &summary.tables {
        let status = match table.status {
            TableStatus::Skipped => "- Skipped",
            TableStatus::Passed => "✓ OK",
            TableStatus::Failed => "✗ Differs",
        };
        println!(
            "  {} {} (ids {}..{}, windows: {}, rows: {}, issues: {})",
            status,
            table.table,
            table.start_id,
            table.stop_id,
            table.windows,
            table.rows_compared,
            table.issues
        );
    }
    println!("  Tables checked: {}", summary.tables_checked);
    println!("  Tables skipped: {}", summary.tables_skipped);
    println!("  Tables with issues: {}", summary.tables_with_issues);
    println!("  Rows compared: {}", summary.total_rows);
    println!("  Issues: {}", summary.total_issues);
    println!("  Duration: {:.2}s", summary.duration_ms as f64 / 1000.0);
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr so --output-json stays parseable.
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM.
/// Returns a CancellationToken that will be cancelled when a signal is received.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, name) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        match signal(kind) {
            Ok(mut stream) => {
                tokio::spawn(async move {
                    stream.recv().await;
                    eprintln!("\nReceived {}. Cancelling in-flight queries...", name);
                    token.cancel();
                });
            }
            Err(e) => warn!("Failed to set up {} handler: {}", name, e),
        }
    }

    cancel_token
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Cancelling in-flight queries...");
            token.cancel();
        }
    });

    cancel_token
}
