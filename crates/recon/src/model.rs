use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::config::MatchStrategy;
use crate::normalize::PayoutType;

// ---------------------------------------------------------------------------
// Input records
// ---------------------------------------------------------------------------

/// One disbursement from the backend ledger, normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendRecord {
    /// 0-based data row in the source table.
    pub row: usize,
    /// Match key: uppercase identifier, or lowercase email for the email strategy.
    pub key: String,
    pub ts_utc: Option<DateTime<Utc>>,
    pub amount: Option<f64>,
    pub payout_type: PayoutType,
    pub is_automation: bool,
    /// Original cells in source column order.
    pub fields: Vec<String>,
}

/// One settlement row from a channel report, normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct CounterpartyRecord {
    pub row: usize,
    /// Raw key cell: an identifier or a free-text description.
    pub text: String,
    pub ts_utc: Option<DateTime<Utc>>,
    pub amount: Option<f64>,
}

/// A backend record and the counterparty chosen for it, if any.
#[derive(Debug, Clone, Copy)]
pub struct MatchCandidate<'a> {
    pub backend: &'a BackendRecord,
    pub counterparty: Option<&'a CounterpartyRecord>,
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchState {
    Matched,
    LateSync,
    MissingTrue,
}

impl MatchState {
    pub const ALL: [MatchState; 3] = [Self::Matched, Self::LateSync, Self::MissingTrue];

    /// Suffix used for per-state sheet names.
    pub fn sheet_suffix(self) -> &'static str {
        match self {
            Self::Matched => "Matched",
            Self::LateSync => "LateSync",
            Self::MissingTrue => "Missing",
        }
    }
}

impl std::fmt::Display for MatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Matched => write!(f, "matched"),
            Self::LateSync => write!(f, "late_sync"),
            Self::MissingTrue => write!(f, "missing_true"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedRecord {
    pub state: MatchState,
    pub txn_id: String,
    pub ts_report_backend: String,
    pub ts_report_wallet: Option<String>,
    pub amount_backend: Option<f64>,
    pub amount_wallet: Option<f64>,
    pub delay_min: Option<f64>,
    pub amount_diff: Option<f64>,
    pub bucket_3h: String,
    pub payout_type: PayoutType,
    pub is_automation: bool,
    pub fields: Vec<String>,
    #[serde(skip)]
    pub bucket_start: DateTime<Utc>,
}

/// Computed columns appended after the original backend columns.
pub const COMPUTED_COLUMNS: [&str; 8] = [
    "txn_id",
    "ts_report_backend",
    "ts_report_wallet",
    "amount_backend",
    "amount_wallet",
    "delay_min",
    "amount_diff",
    "bucket_3h",
];

impl ClassifiedRecord {
    fn computed_values(&self) -> [Value; 8] {
        [
            Value::from(self.txn_id.clone()),
            Value::from(self.ts_report_backend.clone()),
            opt_value(self.ts_report_wallet.clone()),
            opt_value(self.amount_backend),
            opt_value(self.amount_wallet),
            opt_value(self.delay_min),
            opt_value(self.amount_diff),
            Value::from(self.bucket_3h.clone()),
        ]
    }
}

fn opt_value<T: Into<Value>>(v: Option<T>) -> Value {
    v.map(Into::into).unwrap_or(Value::Null)
}

// ---------------------------------------------------------------------------
// Aggregates
// ---------------------------------------------------------------------------

/// Aggregates for one 3-hour window of one channel. Sums cover matched
/// records only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketSummary {
    pub bucket_3h: String,
    pub matched_count: usize,
    pub late_sync_count: usize,
    pub missing_count: usize,
    pub backend_total: f64,
    pub wallet_total: f64,
    pub diff_total: f64,
    pub abs_diff_total: f64,
    #[serde(skip)]
    pub bucket_start: DateTime<Utc>,
}

impl BucketSummary {
    pub fn empty(bucket_start: DateTime<Utc>, bucket_3h: String) -> Self {
        Self {
            bucket_3h,
            matched_count: 0,
            late_sync_count: 0,
            missing_count: 0,
            backend_total: 0.0,
            wallet_total: 0.0,
            diff_total: 0.0,
            abs_diff_total: 0.0,
            bucket_start,
        }
    }

    /// Backend rows that fell in this window, whatever their outcome.
    pub fn volume(&self) -> usize {
        self.matched_count + self.late_sync_count + self.missing_count
    }
}

pub const SUMMARY_COLUMNS: [&str; 8] = [
    "bucket_3h",
    "matched_count",
    "late_sync_count",
    "missing_count",
    "backend_total",
    "wallet_total",
    "diff_total",
    "abs_diff_total",
];

/// Backend volume for one window across channels, with display labels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolumeRow {
    pub bucket_3h: String,
    /// `%Y-%m-%d` of the window start in the report zone.
    pub date: String,
    /// e.g. `03:00 AM - 06:00 AM`.
    pub time_range: String,
    /// Channel name -> windowed backend rows.
    pub counts: BTreeMap<String, usize>,
}

// ---------------------------------------------------------------------------
// Channel result
// ---------------------------------------------------------------------------

/// Row counts observed while building one channel's records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChannelStats {
    pub backend_rows: usize,
    pub counterparty_rows: usize,
    pub out_of_window: usize,
    pub backend_ts_unparsed: usize,
    pub counterparty_ts_unparsed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelResult {
    pub name: String,
    pub label: String,
    pub strategy: MatchStrategy,
    pub backend_columns: Vec<String>,
    pub matched: Vec<ClassifiedRecord>,
    pub late_sync: Vec<ClassifiedRecord>,
    pub missing_true: Vec<ClassifiedRecord>,
    pub summary_3h: Vec<BucketSummary>,
    pub stats: ChannelStats,
}

// ---------------------------------------------------------------------------
// Sheet names
// ---------------------------------------------------------------------------

/// Excel's sheet-name limit.
pub const MAX_SHEET_NAME: usize = 31;

/// Cross-channel sheets, in workbook order.
pub const SEGMENT_SHEET: &str = "Segment_Summary";
pub const COUNTS_SHEET: &str = "Counts_3H";
pub const README_SHEET: &str = "README";

/// Sheet names may not contain `[]:*?/\`, may not start or end with `'`, and
/// are capped at 31 characters.
pub fn sheet_name(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| if matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\') { '_' } else { c })
        .collect();
    let name: String = cleaned.trim_matches('\'').chars().take(MAX_SHEET_NAME).collect();
    if name.is_empty() {
        "Sheet".to_string()
    } else {
        name
    }
}

pub fn summary_sheet(label: &str) -> String {
    format!("{label}_3H")
}

pub fn state_sheet(label: &str, state: MatchState) -> String {
    format!("{label}_{}", state.sheet_suffix())
}

/// Every sheet a channel contributes, before sanitizing.
pub fn channel_sheets(label: &str) -> Vec<String> {
    std::iter::once(summary_sheet(label))
        .chain(MatchState::ALL.iter().map(|s| state_sheet(label, *s)))
        .collect()
}

/// A rendered output table: header plus JSON-valued cells.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputTable {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ChannelResult {
    pub fn records(&self, state: MatchState) -> &[ClassifiedRecord] {
        match state {
            MatchState::Matched => &self.matched,
            MatchState::LateSync => &self.late_sync,
            MatchState::MissingTrue => &self.missing_true,
        }
    }

    /// Records in the report window, across all three states.
    pub fn windowed_count(&self) -> usize {
        self.matched.len() + self.late_sync.len() + self.missing_true.len()
    }

    /// Original backend columns followed by the computed columns.
    pub fn state_table(&self, state: MatchState) -> OutputTable {
        let mut columns = self.backend_columns.clone();
        columns.extend(COMPUTED_COLUMNS.iter().map(|c| c.to_string()));

        let width = self.backend_columns.len();
        let rows = self
            .records(state)
            .iter()
            .map(|r| {
                let mut row: Vec<Value> = (0..width)
                    .map(|i| Value::from(r.fields.get(i).cloned().unwrap_or_default()))
                    .collect();
                row.extend(r.computed_values());
                row
            })
            .collect();

        OutputTable {
            name: state_sheet(&self.label, state),
            columns,
            rows,
        }
    }

    pub fn summary_table(&self) -> OutputTable {
        OutputTable {
            name: summary_sheet(&self.label),
            columns: SUMMARY_COLUMNS.iter().map(|c| c.to_string()).collect(),
            rows: self
                .summary_3h
                .iter()
                .map(|s| {
                    vec![
                        Value::from(s.bucket_3h.clone()),
                        Value::from(s.matched_count),
                        Value::from(s.late_sync_count),
                        Value::from(s.missing_count),
                        Value::from(s.backend_total),
                        Value::from(s.wallet_total),
                        Value::from(s.diff_total),
                        Value::from(s.abs_diff_total),
                    ]
                })
                .collect(),
        }
    }
}
