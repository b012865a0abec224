//! Cross-channel assembly: segment breakdown, headline totals, volume table
//! and the README rows that document the rules in effect.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::aggregate::counts_by_bucket;
use crate::columns::ColumnSpec;
use crate::config::{BackendSpec, ChannelSpec, RunSettings, Strategy, MATCH_MARGIN_HOURS};
use crate::model::{
    ChannelResult, ClassifiedRecord, MatchState, OutputTable, VolumeRow, COUNTS_SHEET, README_SHEET,
    SEGMENT_SHEET,
};
use crate::normalize::PayoutType;

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

// ---------------------------------------------------------------------------
// Segments + totals
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentRow {
    pub payout_type: PayoutType,
    pub channel: String,
    pub count: usize,
    pub total_amount: f64,
    pub automation_count: usize,
    pub automation_total: f64,
}

/// Matched and late-sync rows of every channel.
fn reconciled<'a>(channels: &'a [ChannelResult]) -> impl Iterator<Item = (&'a ChannelResult, &'a ClassifiedRecord)> {
    channels
        .iter()
        .flat_map(|ch| ch.matched.iter().chain(ch.late_sync.iter()).map(move |r| (ch, r)))
}

/// Group reconciled rows by (payout type, channel), sorted by that key.
/// Channels are keyed by name and displayed by label.
pub fn segment_summary(channels: &[ChannelResult]) -> Vec<SegmentRow> {
    let mut groups: BTreeMap<(PayoutType, &str), SegmentRow> = BTreeMap::new();
    for (ch, rec) in reconciled(channels) {
        let row = groups
            .entry((rec.payout_type, ch.name.as_str()))
            .or_insert_with(|| SegmentRow {
                payout_type: rec.payout_type,
                channel: ch.label.clone(),
                count: 0,
                total_amount: 0.0,
                automation_count: 0,
                automation_total: 0.0,
            });
        let amount = rec.amount_backend.unwrap_or(0.0);
        row.count += 1;
        row.total_amount += amount;
        if rec.is_automation {
            row.automation_count += 1;
            row.automation_total += amount;
        }
    }
    groups.into_values().collect()
}

/// Headline figures over reconciled (matched + late-sync) backend amounts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconciledTotals {
    pub total: f64,
    pub futures_total: f64,
    pub cfd_total: f64,
    pub automation_total: f64,
}

pub fn reconciled_totals(channels: &[ChannelResult]) -> ReconciledTotals {
    let mut totals = ReconciledTotals::default();
    for (_, rec) in reconciled(channels) {
        let Some(amount) = rec.amount_backend else {
            continue;
        };
        totals.total += amount;
        match rec.payout_type {
            PayoutType::Futures => totals.futures_total += amount,
            PayoutType::Cfd => totals.cfd_total += amount,
        }
        if rec.is_automation {
            totals.automation_total += amount;
        }
    }
    totals
}

// ---------------------------------------------------------------------------
// README
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadmeRow {
    pub key: String,
    pub value: String,
}

impl ReadmeRow {
    fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

fn first_name(spec: &ColumnSpec) -> &str {
    spec.names.first().map(String::as_str).unwrap_or("?")
}

fn describe_channel(channel: &ChannelSpec) -> String {
    let backend_key = first_name(&channel.backend_key);
    let key = first_name(&channel.key);
    let label = &channel.label;
    match &channel.strategy {
        Strategy::ExactKey { pattern: None, .. } => {
            format!("Backend {backend_key} == {label} report {key}")
        }
        Strategy::ExactKey { pattern: Some(re), .. } => {
            format!("Backend {backend_key} == value extracted from {label} report {key} by `{re}`")
        }
        Strategy::Substring => format!(
            "{label} report {key} contains Backend {backend_key}; nearest timestamp wins \
             (rows within {MATCH_MARGIN_HOURS}h of the window)"
        ),
        Strategy::Email => format!(
            "Backend {backend_key} equals an email found in {label} report {key}; nearest timestamp wins \
             (rows within {MATCH_MARGIN_HOURS}h of the window)"
        ),
    }
}

/// Fixed key/value table documenting the matching rules of this run.
pub fn readme_rows(backend: &BackendSpec, channels: &[ChannelSpec], run: &RunSettings) -> Vec<ReadmeRow> {
    let mut rows = vec![ReadmeRow::new(
        "Tolerance",
        format!("{} minutes", run.tolerance_minutes),
    )];
    for channel in channels {
        rows.push(ReadmeRow::new(format!("{} match", channel.label), describe_channel(channel)));
    }
    rows.push(ReadmeRow::new(
        "Futures vs CFD",
        format!("Backend {} contains 'futures' => Futures else CFD", first_name(&backend.plan)),
    ));
    rows.push(ReadmeRow::new(
        "Payout automation",
        format!("Backend {} contains 'automation'", first_name(&backend.status)),
    ));
    rows
}

// ---------------------------------------------------------------------------
// Report bundle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportMeta {
    pub name: String,
    pub report_zone: String,
    pub window_start: String,
    pub window_end: String,
    pub tolerance_minutes: u32,
    pub engine_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconReport {
    pub meta: ReportMeta,
    pub channels: Vec<ChannelResult>,
    pub segments: Vec<SegmentRow>,
    pub totals: ReconciledTotals,
    pub counts_3h: Vec<VolumeRow>,
    pub readme: Vec<ReadmeRow>,
}

impl ReconReport {
    pub fn assemble(
        name: &str,
        backend: &BackendSpec,
        specs: &[ChannelSpec],
        channels: Vec<ChannelResult>,
        run: &RunSettings,
    ) -> Self {
        Self {
            meta: ReportMeta {
                name: name.to_string(),
                report_zone: run.report_zone.to_string(),
                window_start: run.report_zone.render(&run.start),
                window_end: run.report_zone.render(&run.end),
                tolerance_minutes: run.tolerance_minutes,
                engine_version: ENGINE_VERSION.to_string(),
            },
            segments: segment_summary(&channels),
            totals: reconciled_totals(&channels),
            counts_3h: counts_by_bucket(&channels, run),
            readme: readme_rows(backend, specs, run),
            channels,
        }
    }

    /// Any late-sync or missing-true record in any channel.
    pub fn has_findings(&self) -> bool {
        self.channels
            .iter()
            .any(|ch| !ch.late_sync.is_empty() || !ch.missing_true.is_empty())
    }

    pub fn channel(&self, name: &str) -> Option<&ChannelResult> {
        self.channels.iter().find(|c| c.name == name)
    }

    pub fn segment_table(&self) -> OutputTable {
        OutputTable {
            name: SEGMENT_SHEET.into(),
            columns: [
                "Payout Type",
                "Channel",
                "Count",
                "Total Amount",
                "Automation Count",
                "Automation Total",
            ]
            .iter()
            .map(|c| c.to_string())
            .collect(),
            rows: self
                .segments
                .iter()
                .map(|s| {
                    vec![
                        Value::from(s.payout_type.to_string()),
                        Value::from(s.channel.clone()),
                        Value::from(s.count),
                        Value::from(s.total_amount),
                        Value::from(s.automation_count),
                        Value::from(s.automation_total),
                    ]
                })
                .collect(),
        }
    }

    /// Volume table: bucket, labels, then one count column per channel.
    pub fn counts_table(&self) -> OutputTable {
        let mut columns: Vec<String> = vec!["bucket_3h".into(), "Date".into(), "Time Range".into()];
        columns.extend(self.channels.iter().map(|c| format!("{}_count", c.name)));
        let rows = self
            .counts_3h
            .iter()
            .map(|v| {
                let mut row = vec![
                    Value::from(v.bucket_3h.clone()),
                    Value::from(v.date.clone()),
                    Value::from(v.time_range.clone()),
                ];
                row.extend(
                    self.channels
                        .iter()
                        .map(|c| Value::from(v.counts.get(&c.name).copied().unwrap_or(0))),
                );
                row
            })
            .collect();
        OutputTable {
            name: COUNTS_SHEET.into(),
            columns,
            rows,
        }
    }

    pub fn readme_table(&self) -> OutputTable {
        OutputTable {
            name: README_SHEET.into(),
            columns: vec!["Key".into(), "Value".into()],
            rows: self
                .readme
                .iter()
                .map(|r| vec![Value::from(r.key.clone()), Value::from(r.value.clone())])
                .collect(),
        }
    }

    /// Every output table in workbook order: per-channel summaries, per-channel
    /// state tables, then the cross-channel tables.
    pub fn tables(&self) -> Vec<OutputTable> {
        let mut out: Vec<OutputTable> = self.channels.iter().map(ChannelResult::summary_table).collect();
        for ch in &self.channels {
            out.extend(MatchState::ALL.iter().map(|s| ch.state_table(*s)));
        }
        out.push(self.segment_table());
        out.push(self.counts_table());
        out.push(self.readme_table());
        out
    }
}
