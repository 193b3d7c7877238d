use crate::models::{ProductIdentifier, ProductPriceRecord, SourceId};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// Failing to load the input list aborts the run before any network
/// traffic; there is nothing sensible to resolve without it.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("could not read input file: {0}")]
    Io(#[from] std::io::Error),
    #[error("input file contains no identifiers")]
    Empty,
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("could not write output file: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not encode output: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Reads identifiers from a delimited text file, one row per product.
/// Only the first column is consulted; blank rows are skipped.
pub fn load_identifiers(path: &Path) -> Result<Vec<ProductIdentifier>, LoadError> {
    let contents = fs::read_to_string(path)?;
    let identifiers: Vec<ProductIdentifier> = contents
        .lines()
        .filter_map(|line| {
            let first = line.split([',', ';', '\t']).next().unwrap_or("");
            ProductIdentifier::new(first)
        })
        .collect();
    if identifiers.is_empty() {
        return Err(LoadError::Empty);
    }
    info!(
        target = "pricescan.sink",
        count = identifiers.len(),
        path = %path.display(),
        "loaded identifiers"
    );
    Ok(identifiers)
}

/// One row per input identifier, in input order, with a price/url/tier/
/// error column group per queried source.
pub fn write_csv(
    path: &Path,
    records: &[ProductPriceRecord],
    sources: &[SourceId],
) -> Result<(), SinkError> {
    let mut out = String::new();
    out.push_str("identifier");
    for source in sources {
        for column in ["price", "url", "tier", "error"] {
            out.push(',');
            out.push_str(&format!("{source}_{column}"));
        }
    }
    out.push('\n');

    for record in records {
        out.push_str(&csv_field(record.identifier.as_str()));
        for source in sources {
            let result = record.by_source.get(source);
            let price = result
                .and_then(|r| r.price)
                .map(|p| p.to_string())
                .unwrap_or_default();
            let url = result.and_then(|r| r.url.clone()).unwrap_or_default();
            let tier = result
                .and_then(|r| r.tier_used)
                .map(|t| t.as_str().to_string())
                .unwrap_or_default();
            let error = result
                .and_then(|r| r.error)
                .map(|e| e.as_str().to_string())
                .unwrap_or_default();
            for field in [price, url, tier, error] {
                out.push(',');
                out.push_str(&csv_field(&field));
            }
        }
        out.push('\n');
    }

    fs::write(path, out)?;
    info!(
        target = "pricescan.sink",
        rows = records.len(),
        path = %path.display(),
        "wrote csv report"
    );
    Ok(())
}

pub fn write_json(path: &Path, records: &[ProductPriceRecord]) -> Result<(), SinkError> {
    let body = serde_json::to_string_pretty(records)?;
    fs::write(path, body)?;
    info!(
        target = "pricescan.sink",
        rows = records.len(),
        path = %path.display(),
        "wrote json report"
    );
    Ok(())
}

fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}
