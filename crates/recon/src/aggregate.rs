use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use crate::config::RunSettings;
use crate::model::{BucketSummary, ChannelResult, ClassifiedRecord, VolumeRow};

/// Start of every 3-hour window in `[start, end)`, anchored at `start`.
/// The last window may run past `end` when the range is not a multiple of 3h.
pub fn window_starts(run: &RunSettings) -> Vec<DateTime<Utc>> {
    let width = run.bucket_width();
    let mut out = Vec::new();
    let mut at = run.start;
    while at < run.end {
        out.push(at);
        at += width;
    }
    out
}

/// Floor of `ts` to the window grid.
pub fn bucket_of(ts: &DateTime<Utc>, run: &RunSettings) -> DateTime<Utc> {
    let width_ms = run.bucket_width().num_milliseconds();
    let offset_ms = (*ts - run.start).num_milliseconds();
    run.start + Duration::milliseconds(offset_ms.div_euclid(width_ms) * width_ms)
}

/// Per-window counts and matched-only sums, one row per window in the range.
pub fn summarize_buckets(
    matched: &[ClassifiedRecord],
    late_sync: &[ClassifiedRecord],
    missing_true: &[ClassifiedRecord],
    run: &RunSettings,
) -> Vec<BucketSummary> {
    let mut rows: BTreeMap<DateTime<Utc>, BucketSummary> = window_starts(run)
        .into_iter()
        .map(|start| (start, BucketSummary::empty(start, run.report_zone.render(&start))))
        .collect();

    for rec in matched {
        if let Some(row) = rows.get_mut(&rec.bucket_start) {
            row.matched_count += 1;
            row.backend_total += rec.amount_backend.unwrap_or(0.0);
            row.wallet_total += rec.amount_wallet.unwrap_or(0.0);
            if let Some(diff) = rec.amount_diff {
                row.diff_total += diff;
                row.abs_diff_total += diff.abs();
            }
        }
    }
    for rec in late_sync {
        if let Some(row) = rows.get_mut(&rec.bucket_start) {
            row.late_sync_count += 1;
        }
    }
    for rec in missing_true {
        if let Some(row) = rows.get_mut(&rec.bucket_start) {
            row.missing_count += 1;
        }
    }

    rows.into_values().collect()
}

/// Windowed backend volume per channel, zero-filled across the range.
pub fn counts_by_bucket(channels: &[ChannelResult], run: &RunSettings) -> Vec<VolumeRow> {
    let width = run.bucket_width();
    window_starts(run)
        .into_iter()
        .map(|start| {
            let from = run.report_zone.to_local(&start);
            let to = run.report_zone.to_local(&(start + width));
            let counts = channels
                .iter()
                .map(|ch| {
                    let n = ch
                        .summary_3h
                        .iter()
                        .find(|s| s.bucket_start == start)
                        .map(BucketSummary::volume)
                        .unwrap_or(0);
                    (ch.name.clone(), n)
                })
                .collect();
            VolumeRow {
                bucket_3h: run.report_zone.render(&start),
                date: from.format("%Y-%m-%d").to_string(),
                time_range: format!("{} - {}", from.format("%I:%M %p"), to.format("%I:%M %p")),
                counts,
            }
        })
        .collect()
}
