//! CSV ingestion: files on disk to engine tables.

use std::path::Path;

use payout_recon::{ReconError, Table};

/// Parse CSV text into a named table. Ragged rows are accepted; missing
/// trailing cells read as empty.
pub fn parse_csv(name: &str, csv_data: &str) -> Result<Table, ReconError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(csv_data.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ReconError::Io(format!("{name}: {e}")))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut table = Table::new(name, headers);
    for (i, record) in reader.records().enumerate() {
        let record = record.map_err(|e| ReconError::Io(format!("{name}: row {}: {e}", i + 1)))?;
        table.push_row(record.iter().map(|c| c.to_string()).collect());
    }
    log::debug!("{name}: loaded {} rows, {} columns", table.len(), table.columns.len());
    Ok(table)
}

/// Read and parse a CSV file, resolving `file` against `base_dir`.
pub fn load_table(name: &str, base_dir: &Path, file: &str) -> Result<Table, ReconError> {
    let path = base_dir.join(file);
    let data = std::fs::read_to_string(&path)
        .map_err(|e| ReconError::Io(format!("cannot read {}: {e}", path.display())))?;
    parse_csv(name, &data)
}
