//! Column-name resolution.
//!
//! Input files come from several exporters whose headers drift between
//! versions ("Tracking ID" vs "TrackingId", trailing spaces, case). Each
//! canonical column has a list of accepted names; one resolver matches them
//! case- and whitespace-insensitively.

use serde::Deserialize;

use crate::error::ReconError;
use crate::table::Table;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    DisbursedTime,
    DisbursementAmount,
    PaymentMethod,
    Plan,
    InternalStatus,
    TransactionId,
    PaymentMethodId,
    BackendEmail,
    CounterpartyTime,
    TrackingId,
    Description,
    CounterpartyAmount,
}

const SYNONYMS: &[(Column, &[&str])] = &[
    (Column::DisbursedTime, &["Disbursed Time", "Disbursed At", "Disbursement Time", "Disbursed Date"]),
    (Column::DisbursementAmount, &["Disbursement Amount", "Disbursed Amount", "Amount"]),
    (Column::PaymentMethod, &["Payment Method", "Payment Type", "Method"]),
    (Column::Plan, &["Plan", "Plan Name", "Account Plan"]),
    (Column::InternalStatus, &["Internal Status", "Status"]),
    (Column::TransactionId, &["Transaction ID", "Txn ID", "Transaction Id"]),
    (Column::PaymentMethodId, &["Payment method ID", "Payment Method Identifier", "Wallet ID"]),
    (Column::BackendEmail, &["Email", "User Email", "Customer Email", "Email Address"]),
    (Column::CounterpartyTime, &["Created", "Created At", "Date", "Timestamp", "Time"]),
    (Column::TrackingId, &["Tracking ID", "Reference", "Reference ID", "External ID"]),
    (Column::Description, &["Description", "Memo", "Details", "Note"]),
    (Column::CounterpartyAmount, &["Amount", "Net Amount", "Value"]),
];

impl Column {
    pub fn synonyms(self) -> &'static [&'static str] {
        SYNONYMS
            .iter()
            .find(|(c, _)| *c == self)
            .map(|(_, names)| *names)
            .unwrap_or(&[])
    }
}

/// Accepted names for one column, as written in config.
///
/// Deserializes from either a single string or a list of strings. An empty
/// spec falls back to the synonyms of the column's canonical role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "NamesRepr")]
pub struct ColumnSpec {
    pub names: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NamesRepr {
    One(String),
    Many(Vec<String>),
}

impl From<NamesRepr> for ColumnSpec {
    fn from(repr: NamesRepr) -> Self {
        match repr {
            NamesRepr::One(name) => Self { names: vec![name] },
            NamesRepr::Many(names) => Self { names },
        }
    }
}

impl ColumnSpec {
    pub fn named(names: &[&str]) -> Self {
        Self {
            names: names.iter().map(|n| n.to_string()).collect(),
        }
    }

    pub fn for_role(column: Column) -> Self {
        Self::named(column.synonyms())
    }

    /// Explicit names if present, else the role's synonyms.
    pub fn or_role(spec: Option<&ColumnSpec>, column: Column) -> Self {
        match spec {
            Some(s) if !s.names.is_empty() => s.clone(),
            _ => Self::for_role(column),
        }
    }
}

fn normalize_header(name: &str) -> String {
    name.trim_start_matches('\u{feff}')
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Index of the first accepted name present in the table, if any.
///
/// Accepted names are tried in order, so the first synonym wins when a table
/// carries several.
pub fn find(table: &Table, spec: &ColumnSpec) -> Option<usize> {
    let headers: Vec<String> = table.columns.iter().map(|h| normalize_header(h)).collect();
    spec.names.iter().find_map(|name| {
        let want = normalize_header(name);
        headers.iter().position(|h| *h == want)
    })
}

/// Resolve a required column or fail with the attempted and available names.
pub fn resolve(table: &Table, column: &str, spec: &ColumnSpec) -> Result<usize, ReconError> {
    find(table, spec).ok_or_else(|| ReconError::ColumnNotFound {
        table: table.name.clone(),
        column: column.to_string(),
        attempted: spec.names.clone(),
        available: table.columns.clone(),
    })
}
