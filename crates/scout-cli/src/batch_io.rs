//! CSV input and output for batch runs.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local};
use scout_core::{BatchOutcome, BatchReport, ProductFields};

const REQUIRED_COLUMNS: [&str; 3] = ["barcode", "sku", "title"];

/// Read product rows from a CSV with `barcode`, `sku` and `title` columns.
///
/// Header names are matched case-insensitively. Values are kept as text so
/// leading zeros in barcodes survive; blank cells become `None`.
pub fn read_rows(path: &Path) -> Result<Vec<ProductFields>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open input CSV: {}", path.display()))?;

    let headers = reader
        .headers()
        .context("Failed to read CSV headers")?
        .clone();
    let position = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
    };

    let missing: Vec<&str> = REQUIRED_COLUMNS
        .into_iter()
        .filter(|&c| position(c).is_none())
        .collect();
    if !missing.is_empty() {
        bail!(
            "Input CSV is missing required column(s): {}",
            missing.join(", ")
        );
    }
    let [barcode, sku, title] = REQUIRED_COLUMNS.map(|c| position(c).unwrap_or_default());

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Invalid CSV record at row {}", i + 1))?;
        let cell = |idx: usize| {
            record
                .get(idx)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        rows.push(ProductFields {
            barcode: cell(barcode),
            sku: cell(sku),
            title: cell(title),
        });
    }
    Ok(rows)
}

/// `batch_results_YYYYMMDD_HHMMSS.csv` in the current directory.
pub fn default_output_path(now: DateTime<Local>) -> PathBuf {
    PathBuf::from(format!("batch_results_{}.csv", now.format("%Y%m%d_%H%M%S")))
}

fn result_cell(outcome: &BatchOutcome) -> Result<String> {
    let value = match outcome {
        BatchOutcome::Completed(result) => serde_json::to_value(result)?,
        BatchOutcome::Failed(record) => serde_json::json!({
            "error": record.error,
            "status": "failed",
        }),
    };
    Ok(value.to_string())
}

/// Write one output row per input row: the identifiers plus the result JSON.
pub fn write_results(path: &Path, rows: &[ProductFields], report: &BatchReport) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create output CSV: {}", path.display()))?;

    writer.write_record(["barcode", "sku", "title", "result"])?;
    for (row, outcome) in rows.iter().zip(&report.items) {
        let result = result_cell(outcome)?;
        writer.write_record([
            row.barcode.as_deref().unwrap_or_default(),
            row.sku.as_deref().unwrap_or_default(),
            row.title.as_deref().unwrap_or_default(),
            result.as_str(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
