//! Report export: multi-sheet `.xlsx` workbook and JSON file.

use std::path::Path;

use rust_xlsxwriter::{Format, Workbook as XlsxWorkbook, Worksheet, XlsxError};
use serde_json::Value;

use payout_recon::model::sheet_name;
use payout_recon::{OutputTable, ReconReport};

/// Write every report table to its own sheet, in report order.
/// Returns the number of sheets written.
pub fn write_workbook(report: &ReconReport, path: &Path) -> Result<usize, String> {
    let tables = report.tables();
    let mut xlsx_workbook = XlsxWorkbook::new();
    let header_format = Format::new().set_bold();

    for table in &tables {
        let name = sheet_name(&table.name);
        let worksheet = xlsx_workbook
            .add_worksheet()
            .set_name(&name)
            .map_err(|e| format!("Failed to create sheet '{name}': {e}"))?;
        write_table(worksheet, table, &header_format)
            .map_err(|e| format!("Failed to write sheet '{name}': {e}"))?;
    }

    xlsx_workbook
        .save(path)
        .map_err(|e| format!("Failed to save XLSX file: {e}"))?;
    Ok(tables.len())
}

fn write_table(worksheet: &mut Worksheet, table: &OutputTable, header_format: &Format) -> Result<(), XlsxError> {
    for (col, name) in table.columns.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, name, header_format)?;
    }
    for (r, row) in table.rows.iter().enumerate() {
        // rust_xlsxwriter uses 0-based row/col as u32/u16
        let row32 = (r + 1) as u32;
        for (c, value) in row.iter().enumerate() {
            let col16 = c as u16;
            match value {
                Value::Null => {}
                Value::Bool(b) => {
                    worksheet.write_boolean(row32, col16, *b)?;
                }
                Value::Number(n) => {
                    if let Some(f) = n.as_f64() {
                        worksheet.write_number(row32, col16, f)?;
                    }
                }
                Value::String(s) => {
                    worksheet.write_string(row32, col16, s)?;
                }
                other => {
                    worksheet.write_string(row32, col16, other.to_string())?;
                }
            }
        }
    }
    if !table.columns.is_empty() {
        worksheet.set_freeze_panes(1, 0)?;
    }
    Ok(())
}

pub fn write_json(report: &ReconReport, path: &Path) -> Result<(), String> {
    let json_str = serde_json::to_string_pretty(report)
        .map_err(|e| format!("JSON serialization error: {e}"))?;
    std::fs::write(path, json_str).map_err(|e| format!("cannot write output: {e}"))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use payout_recon::{ReconConfig, Table};

    use super::*;

    const CONFIG: &str = r#"
name = "export"
[report]
timezone = "UTC"
date = "2024-01-01"
[backend]
timezone = "UTC"
[channels.crypto]
label = "Crypto"
timezone = "UTC"
payment_methods = ["usdt"]
[channels.rise]
label = "Rise payroll: contractors"
timezone = "UTC"
payment_methods = ["risework"]
strategy = "substring"
"#;

    fn report() -> ReconReport {
        let config = ReconConfig::from_toml(CONFIG).unwrap();
        let settings = config.run_settings(None, None).unwrap();
        let backend = Table::from_rows(
            "backend",
            &["Transaction ID", "Payment method ID", "Disbursed Time", "Disbursement Amount", "Payment Method"],
            &[
                &["t1", "", "2024-01-01 10:00:00", "100", "usdt"],
                &["", "w-1", "2024-01-01 11:00:00", "50", "risework"],
            ],
        );
        let mut cps = BTreeMap::new();
        cps.insert(
            "crypto".to_string(),
            Table::from_rows("crypto", &["Tracking ID", "Created", "Amount"], &[&["T1", "2024-01-01 10:05:00", "100"]]),
        );
        cps.insert("rise".to_string(), Table::from_rows("rise", &["Date", "Description", "Amount"], &[]));
        payout_recon::run(&config, &settings, &backend, &cps).unwrap()
    }

    #[test]
    fn workbook_gets_one_sheet_per_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.xlsx");
        let sheets = write_workbook(&report(), &path).unwrap();
        assert_eq!(sheets, 11);
        assert_eq!(&std::fs::read(&path).unwrap()[..2], b"PK");
    }

    #[test]
    fn json_file_round_trips_meta() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        write_json(&report(), &path).unwrap();
        let val: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(val["meta"]["name"], "export");
        assert_eq!(val["channels"].as_array().unwrap().len(), 2);
    }
}
