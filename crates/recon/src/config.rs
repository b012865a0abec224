use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::columns::{Column, ColumnSpec};
use crate::error::ReconError;
use crate::model::{channel_sheets, sheet_name, COUNTS_SHEET, README_SHEET, SEGMENT_SHEET};
use crate::normalize::{parse_instant, Zone};

pub const DEFAULT_TOLERANCE_MINUTES: u32 = 15;
pub const MAX_TOLERANCE_MINUTES: u32 = 120;
/// Counterparty rows further than this outside the report window are
/// invisible to the substring and email strategies.
pub const MATCH_MARGIN_HOURS: i64 = 6;
pub const BUCKET_HOURS: i64 = 3;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ReconConfig {
    pub name: String,
    pub report: ReportConfig,
    pub backend: BackendConfig,
    pub channels: BTreeMap<String, ChannelConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    pub timezone: String,
    /// Whole report-zone day. Mutually exclusive with `start`/`end`.
    #[serde(default)]
    pub date: Option<NaiveDate>,
    /// RFC 3339, or naive wall-clock time in the report zone.
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default = "default_tolerance")]
    pub tolerance_minutes: u32,
}

fn default_tolerance() -> u32 {
    DEFAULT_TOLERANCE_MINUTES
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub file: Option<String>,
    pub timezone: String,
    #[serde(default)]
    pub columns: BackendColumns,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackendColumns {
    #[serde(default)]
    pub timestamp: Option<ColumnSpec>,
    #[serde(default)]
    pub amount: Option<ColumnSpec>,
    #[serde(default)]
    pub payment_method: Option<ColumnSpec>,
    #[serde(default)]
    pub plan: Option<ColumnSpec>,
    #[serde(default)]
    pub status: Option<ColumnSpec>,
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
    pub timezone: String,
    /// Backend `payment_method` values routed to this channel (case-insensitive).
    pub payment_methods: Vec<String>,
    #[serde(default)]
    pub strategy: MatchStrategy,
    /// Backend column holding the match key (identifier or email).
    #[serde(default)]
    pub backend_key: Option<ColumnSpec>,
    /// Regex with one capture group, applied to the counterparty key column
    /// (exact_key only).
    #[serde(default)]
    pub key_pattern: Option<String>,
    #[serde(default)]
    pub duplicate_keys: DuplicateKeyPolicy,
    /// Report amounts as absolute values (channels that export debits).
    #[serde(default)]
    pub amount_abs: bool,
    #[serde(default)]
    pub columns: CounterpartyColumns,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CounterpartyColumns {
    #[serde(default)]
    pub timestamp: Option<ColumnSpec>,
    #[serde(default)]
    pub key: Option<ColumnSpec>,
    #[serde(default)]
    pub amount: Option<ColumnSpec>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    #[default]
    ExactKey,
    Substring,
    Email,
}

impl std::fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExactKey => write!(f, "exact_key"),
            Self::Substring => write!(f, "substring"),
            Self::Email => write!(f, "email"),
        }
    }
}

/// Which counterparty row wins when an exact key repeats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateKeyPolicy {
    /// First occurrence in input order.
    #[default]
    FirstSeen,
    /// Closest timestamp to the backend record; ties to input order.
    NearestTimestamp,
}

// ---------------------------------------------------------------------------
// Resolved settings
// ---------------------------------------------------------------------------

/// Immutable run-wide settings: report zone, window, tolerance, margin.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub report_zone: Zone,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub tolerance_minutes: u32,
    pub margin: Duration,
}

impl RunSettings {
    pub fn new(
        report_zone: Zone,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        tolerance_minutes: u32,
    ) -> Result<Self, ReconError> {
        if start >= end {
            return Err(ReconError::ConfigValidation(format!(
                "report window is empty: start {start} is not before end {end}"
            )));
        }
        if tolerance_minutes > MAX_TOLERANCE_MINUTES {
            return Err(ReconError::ConfigValidation(format!(
                "tolerance_minutes must be between 0 and {MAX_TOLERANCE_MINUTES}, got {tolerance_minutes}"
            )));
        }
        Ok(Self {
            report_zone,
            start,
            end,
            tolerance_minutes,
            margin: Duration::hours(MATCH_MARGIN_HOURS),
        })
    }

    /// `[00:00, next 00:00)` of `day` on the report-zone wall clock.
    pub fn for_day(report_zone: Zone, day: NaiveDate, tolerance_minutes: u32) -> Result<Self, ReconError> {
        let day_start = |d: NaiveDate| {
            d.and_hms_opt(0, 0, 0)
                .and_then(|n| report_zone.localize(n))
                .ok_or_else(|| {
                    ReconError::ConfigValidation(format!("{d} has no midnight in {report_zone}"))
                })
        };
        let next = day
            .succ_opt()
            .ok_or_else(|| ReconError::ConfigValidation(format!("no day after {day}")))?;
        Self::new(report_zone, day_start(day)?, day_start(next)?, tolerance_minutes)
    }

    /// Half-open report window membership.
    pub fn contains(&self, ts: &DateTime<Utc>) -> bool {
        *ts >= self.start && *ts < self.end
    }

    /// Report window widened by the match margin on both sides.
    pub fn within_margin(&self, ts: &DateTime<Utc>) -> bool {
        *ts >= self.start - self.margin && *ts <= self.end + self.margin
    }

    pub fn bucket_width(&self) -> Duration {
        Duration::hours(BUCKET_HOURS)
    }
}

#[derive(Debug, Clone)]
pub struct BackendSpec {
    pub zone: Zone,
    pub timestamp: ColumnSpec,
    pub amount: ColumnSpec,
    pub payment_method: ColumnSpec,
    pub plan: ColumnSpec,
    pub status: ColumnSpec,
}

#[derive(Debug, Clone)]
pub enum Strategy {
    ExactKey {
        pattern: Option<Regex>,
        duplicates: DuplicateKeyPolicy,
    },
    Substring,
    Email,
}

impl Strategy {
    pub fn kind(&self) -> MatchStrategy {
        match self {
            Self::ExactKey { .. } => MatchStrategy::ExactKey,
            Self::Substring => MatchStrategy::Substring,
            Self::Email => MatchStrategy::Email,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChannelSpec {
    pub name: String,
    pub label: String,
    pub zone: Zone,
    /// Lowercased, trimmed.
    pub payment_methods: Vec<String>,
    pub strategy: Strategy,
    pub backend_key: ColumnSpec,
    pub timestamp: ColumnSpec,
    pub key: ColumnSpec,
    pub amount: ColumnSpec,
    pub amount_abs: bool,
}

impl ChannelSpec {
    /// Whether a backend payment-method cell routes to this channel.
    pub fn accepts_method(&self, method: &str) -> bool {
        let m = method.trim().to_lowercase();
        self.payment_methods.iter().any(|p| *p == m)
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ReconConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: ReconConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        if self.channels.is_empty() {
            return Err(ReconError::ConfigValidation(
                "at least one channel is required".into(),
            ));
        }

        self.run_settings(None, None)?;
        self.backend_spec()?;

        // Every backend row belongs to at most one channel.
        let mut seen: BTreeMap<String, &str> = BTreeMap::new();
        for (name, channel) in &self.channels {
            if channel.payment_methods.is_empty() {
                return Err(ReconError::ConfigValidation(format!(
                    "channel '{name}': payment_methods must not be empty"
                )));
            }
            let methods: BTreeSet<String> = channel
                .payment_methods
                .iter()
                .map(|m| m.trim().to_lowercase())
                .collect();
            for method in methods {
                if let Some(other) = seen.insert(method.clone(), name) {
                    return Err(ReconError::ConfigValidation(format!(
                        "payment method '{method}' is claimed by both '{other}' and '{name}'"
                    )));
                }
            }
        }

        let specs = self.channel_specs()?;
        check_sheet_names(&specs)?;
        Ok(())
    }

    /// Resolve the run window. `date` and `tolerance` override the file.
    pub fn run_settings(
        &self,
        date: Option<NaiveDate>,
        tolerance: Option<u32>,
    ) -> Result<RunSettings, ReconError> {
        let report = &self.report;
        let zone = Zone::parse(&report.timezone)?;
        let tolerance = tolerance.unwrap_or(report.tolerance_minutes);

        if let Some(day) = date {
            return RunSettings::for_day(zone, day, tolerance);
        }

        match (report.date, &report.start, &report.end) {
            (Some(day), None, None) => RunSettings::for_day(zone, day, tolerance),
            (None, Some(start), Some(end)) => {
                let parse = |field: &str, raw: &str| {
                    parse_instant(raw, &zone).ok_or_else(|| {
                        ReconError::ConfigValidation(format!("report.{field}: cannot parse '{raw}'"))
                    })
                };
                RunSettings::new(zone, parse("start", start)?, parse("end", end)?, tolerance)
            }
            (None, None, None) => Err(ReconError::ConfigValidation(
                "report needs either `date` or both `start` and `end`".into(),
            )),
            _ => Err(ReconError::ConfigValidation(
                "report.date cannot be combined with start/end, and start/end go together".into(),
            )),
        }
    }

    pub fn backend_spec(&self) -> Result<BackendSpec, ReconError> {
        let cols = &self.backend.columns;
        Ok(BackendSpec {
            zone: Zone::parse(&self.backend.timezone)?,
            timestamp: ColumnSpec::or_role(cols.timestamp.as_ref(), Column::DisbursedTime),
            amount: ColumnSpec::or_role(cols.amount.as_ref(), Column::DisbursementAmount),
            payment_method: ColumnSpec::or_role(cols.payment_method.as_ref(), Column::PaymentMethod),
            plan: ColumnSpec::or_role(cols.plan.as_ref(), Column::Plan),
            status: ColumnSpec::or_role(cols.status.as_ref(), Column::InternalStatus),
        })
    }

    /// Channel specs in name order.
    pub fn channel_specs(&self) -> Result<Vec<ChannelSpec>, ReconError> {
        self.channels
            .iter()
            .map(|(name, c)| channel_spec(name, c))
            .collect()
    }
}

fn channel_spec(name: &str, c: &ChannelConfig) -> Result<ChannelSpec, ReconError> {
    if c.key_pattern.is_some() && c.strategy != MatchStrategy::ExactKey {
        return Err(ReconError::ConfigValidation(format!(
            "channel '{name}': key_pattern is only valid with strategy = \"exact_key\""
        )));
    }

    let pattern = match &c.key_pattern {
        Some(p) => {
            let re = Regex::new(p).map_err(|e| ReconError::InvalidPattern {
                channel: name.to_string(),
                message: e.to_string(),
            })?;
            if re.captures_len() != 2 {
                return Err(ReconError::InvalidPattern {
                    channel: name.to_string(),
                    message: format!("expected exactly one capture group, found {}", re.captures_len() - 1),
                });
            }
            Some(re)
        }
        None => None,
    };

    let (backend_role, key_role) = match c.strategy {
        MatchStrategy::ExactKey if pattern.is_some() => (Column::PaymentMethodId, Column::Description),
        MatchStrategy::ExactKey => (Column::TransactionId, Column::TrackingId),
        MatchStrategy::Substring => (Column::PaymentMethodId, Column::Description),
        MatchStrategy::Email => (Column::BackendEmail, Column::Description),
    };

    let strategy = match c.strategy {
        MatchStrategy::ExactKey => Strategy::ExactKey {
            pattern,
            duplicates: c.duplicate_keys,
        },
        MatchStrategy::Substring => Strategy::Substring,
        MatchStrategy::Email => Strategy::Email,
    };

    Ok(ChannelSpec {
        name: name.to_string(),
        label: c.label.clone().unwrap_or_else(|| name.to_string()),
        zone: Zone::parse(&c.timezone)?,
        payment_methods: c.payment_methods.iter().map(|m| m.trim().to_lowercase()).collect(),
        strategy,
        backend_key: ColumnSpec::or_role(c.backend_key.as_ref(), backend_role),
        timestamp: ColumnSpec::or_role(c.columns.timestamp.as_ref(), Column::CounterpartyTime),
        key: ColumnSpec::or_role(c.columns.key.as_ref(), key_role),
        amount: ColumnSpec::or_role(c.columns.amount.as_ref(), Column::CounterpartyAmount),
        amount_abs: c.amount_abs,
    })
}

/// Labels become sheet names, which must stay distinct (case-insensitively)
/// after sanitizing and the 31-character cut.
fn check_sheet_names(specs: &[ChannelSpec]) -> Result<(), ReconError> {
    let mut taken: BTreeMap<String, String> = [SEGMENT_SHEET, COUNTS_SHEET, README_SHEET]
        .iter()
        .map(|s| (s.to_lowercase(), "the report".to_string()))
        .collect();
    for spec in specs {
        for raw in channel_sheets(&spec.label) {
            let sheet = sheet_name(&raw);
            let owner = format!("channel '{}'", spec.name);
            if let Some(other) = taken.insert(sheet.to_lowercase(), owner) {
                return Err(ReconError::ConfigValidation(format!(
                    "channel '{}': label '{}' gives sheet name '{sheet}', already used by {other}",
                    spec.name, spec.label
                )));
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
