use clap::{Parser, Subcommand, builder::styling};
use eyre::{Context, Result};
use owo_colors::OwoColorize;
use shopping_etl::{
    cli,
    config::{RunConfig, StagingBackend},
    error::RunError,
    storage::ObjectPath,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// CLI Styling
const STYLES: styling::Styles = styling::Styles::styled()
    .header(styling::AnsiColor::BrightWhite.on_default())
    .usage(styling::AnsiColor::BrightWhite.on_default())
    .literal(styling::AnsiColor::Green.on_default())
    .placeholder(styling::AnsiColor::Cyan.on_default());

/// Shopping ETL: load a CSV into a staging table, export it, clean it, and land it in the warehouse
#[derive(Parser)]
#[command(name = "shopetl", version, styles = STYLES)]
struct Cli {
    /// The dotenv file to source settings from (skipped if missing)
    #[arg(short, long, global = true, default_value = ".env")]
    env: String,

    /// More verbose logging
    #[arg(long, global = true)]
    debug: bool,

    /// Command to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all four stages in order
    Run {
        /// Whole-run retries after a failure [env: RUN_RETRIES]
        #[arg(long)]
        retries: Option<u32>,

        /// Seconds to wait before retrying [env: RUN_RETRY_DELAY_SECS]
        #[arg(long)]
        retry_delay_secs: Option<u64>,
    },

    /// Load a CSV file into the staging table
    Load {
        /// CSV file to load [env: CSV_FILE_PATH]
        #[arg(short, long)]
        source: Option<PathBuf>,
    },

    /// Export the staging table to <bucket>/<schema>_<table>.csv
    Extract,

    /// Clean a CSV object and write it as Parquet
    Transform {
        /// CSV object to read, as bucket/key or gs://bucket/key (default: the staging export)
        #[arg(short, long)]
        source: Option<ObjectPath>,

        /// Parquet object to write [env: GCS_CLEANED_PATH]
        #[arg(short, long)]
        dest: Option<ObjectPath>,
    },

    /// Load a Parquet object into the warehouse table
    Warehouse {
        /// Parquet object to load [env: GCS_CLEANED_PATH]
        #[arg(short, long)]
        source: Option<ObjectPath>,
    },

    /// Print the staging table DDL
    Schema {
        /// SQL dialect to render [env: STAGING_BACKEND]
        #[arg(short, long, value_enum)]
        backend: Option<StagingBackend>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let env_loaded = match dotenvy::from_filename(&cli.env) {
        Ok(_) => true,
        Err(e) if e.not_found() => false,
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", cli.env)),
    };

    let log_level = match cli.debug {
        true => "debug",
        false => "info",
    };
    let env = env_logger::Env::default().filter_or("LOG_LEVEL", log_level);
    env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .init();

    if env_loaded {
        log::debug!("Loaded settings from {}", cli.env.bright_black());
    }

    let mut config = RunConfig::from_env().context("Invalid configuration")?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, stopping");
            on_interrupt.cancel();
        }
    });

    match cli.command {
        Commands::Run {
            retries,
            retry_delay_secs,
        } => {
            if let Some(retries) = retries {
                config.retries = retries;
            }
            if let Some(secs) = retry_delay_secs {
                config.retry_delay = Duration::from_secs(secs);
            }
            log::info!(
                "Running pipeline {} -> {}.{}",
                config.csv_file_path.display().bright_black(),
                config.project_id.bright_black(),
                config.destination.bright_black()
            );
            let summary = match cli::run_pipeline(&config, &cancel).await? {
                Ok(summary) => summary,
                Err(e) => return Ok(report(&e)),
            };
            log::info!(
                "Run complete: {} rows loaded, {} rows cleaned, load job {}",
                summary.rows_loaded.cyan(),
                summary.rows_cleaned.cyan(),
                summary.job_id.bright_black()
            );
        }
        Commands::Load { source } => {
            let source = source.unwrap_or_else(|| config.csv_file_path.clone());
            log::info!(
                "Loading {} into {}",
                source.display().bright_black(),
                config.table.bright_black()
            );
            match cli::load_stage(&config, &source).await? {
                Ok(rows) => log::info!("Loaded {} rows", rows.cyan()),
                Err(e) => return Ok(report(&e)),
            }
        }
        Commands::Extract => {
            log::info!("Extracting {}", config.table.bright_black());
            match cli::extract_stage(&config).await? {
                Ok(path) => log::info!("Exported to {}", path.uri().bright_black()),
                Err(e) => return Ok(report(&e)),
            }
        }
        Commands::Transform { source, dest } => {
            let source = source.unwrap_or_else(|| {
                ObjectPath::staging_export(&config.bucket, config.table.schema(), config.table.table())
            });
            let dest = dest.unwrap_or_else(|| config.cleaned_path.clone());
            log::info!(
                "Cleaning {} into {}",
                source.uri().bright_black(),
                dest.uri().bright_black()
            );
            match cli::transform_stage(&config, &source, &dest).await? {
                Ok(rows) => log::info!("Wrote {} cleaned rows", rows.cyan()),
                Err(e) => return Ok(report(&e)),
            }
        }
        Commands::Warehouse { source } => {
            let source = source.unwrap_or_else(|| config.cleaned_path.clone());
            log::info!(
                "Loading {} into {}.{}",
                source.uri().bright_black(),
                config.project_id.bright_black(),
                config.destination.bright_black()
            );
            match cli::warehouse_stage(&config, &source, &cancel).await? {
                Ok(job_id) => log::info!("Load job {} complete", job_id.bright_black()),
                Err(e) => return Ok(report(&e)),
            }
        }
        Commands::Schema { backend } => {
            println!("{}", cli::schema_ddl(&config, backend));
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Print a failed stage and its error code
fn report(error: &RunError) -> ExitCode {
    log::error!(
        "Stage {} failed [{}]: {}",
        error.stage.red(),
        error.code().yellow(),
        error.error
    );
    ExitCode::FAILURE
}
