mod batch_io;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use scout_client::{Settings, build_orchestrator};
use scout_core::{BatchConfig, BatchRunner, ProductInput};

#[derive(Parser)]
#[command(name = "scout", version, about = "Find validated product images by barcode, SKU or title")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Research a single product and print the result as JSON
    Research {
        /// Product barcode (UPC/EAN)
        #[arg(short, long)]
        barcode: Option<String>,

        /// Product SKU or part number
        #[arg(short, long)]
        sku: Option<String>,

        /// Product title
        #[arg(short, long)]
        title: Option<String>,

        /// Retries per search config for transient provider errors
        #[arg(long, env = "SCOUT_MAX_RETRIES")]
        max_retries: Option<u32>,

        /// Maximum state transitions per run
        #[arg(long, env = "SCOUT_STEP_CEILING")]
        step_ceiling: Option<u32>,
    },

    /// Research every row of a CSV file (columns: barcode, sku, title)
    Batch {
        /// Input CSV path
        #[arg(short, long)]
        input: PathBuf,

        /// Output CSV path (defaults to batch_results_<timestamp>.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Products researched at the same time
        #[arg(short, long, default_value_t = 3)]
        concurrency: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("scout=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut settings = Settings::from_env().context("Invalid configuration")?;

    match cli.command {
        Commands::Research {
            barcode,
            sku,
            title,
            max_retries,
            step_ceiling,
        } => {
            if let Some(n) = max_retries {
                settings.max_retries = n;
            }
            if let Some(n) = step_ceiling {
                settings.step_ceiling = n;
            }
            cmd_research(&settings, barcode, sku, title).await?;
        }
        Commands::Batch {
            input,
            output,
            concurrency,
        } => {
            let output = output.unwrap_or_else(|| batch_io::default_output_path(chrono::Local::now()));
            cmd_batch(&settings, &input, &output, concurrency).await?;
        }
    }

    Ok(())
}

async fn cmd_research(
    settings: &Settings,
    barcode: Option<String>,
    sku: Option<String>,
    title: Option<String>,
) -> Result<()> {
    let product = ProductInput::new(
        barcode.unwrap_or_default(),
        sku.unwrap_or_default(),
        title.unwrap_or_default(),
    )?;
    let orchestrator = build_orchestrator(settings).context("Failed to set up providers")?;

    let result = orchestrator.run(product).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    match result.abort_error() {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

async fn cmd_batch(
    settings: &Settings,
    input: &Path,
    output: &Path,
    concurrency: usize,
) -> Result<()> {
    let rows = batch_io::read_rows(input)?;
    tracing::info!(rows = rows.len(), input = %input.display(), "Loaded batch input");

    let orchestrator = Arc::new(build_orchestrator(settings).context("Failed to set up providers")?);
    let runner = BatchRunner::new(
        orchestrator,
        BatchConfig::default().with_concurrency(concurrency),
    );

    // Ctrl-C stops launching new rows; rows already running finish.
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling remaining rows");
            on_signal.cancel();
        }
    });

    let report = runner.run_until_cancelled(rows.clone(), cancel).await;
    batch_io::write_results(output, &rows, &report)?;

    println!(
        "Processed {} products: {} successful, {} failed",
        report.total, report.successful, report.failed
    );
    println!("Results written to {}", output.display());

    Ok(())
}
