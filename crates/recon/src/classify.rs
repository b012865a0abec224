use chrono::{DateTime, Utc};

use crate::aggregate::bucket_of;
use crate::config::RunSettings;
use crate::model::{ClassifiedRecord, MatchCandidate, MatchState};

/// Candidates split by terminal state, each list in backend input order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classified {
    pub matched: Vec<ClassifiedRecord>,
    pub late_sync: Vec<ClassifiedRecord>,
    pub missing_true: Vec<ClassifiedRecord>,
    /// Backend records outside `[start, end)` or without a timestamp.
    pub out_of_window: usize,
}

/// Classify every candidate whose backend timestamp is inside the report window.
pub fn classify(candidates: &[MatchCandidate<'_>], run: &RunSettings) -> Classified {
    let mut out = Classified::default();
    for candidate in candidates {
        match classify_one(candidate, run) {
            Some(rec) => match rec.state {
                MatchState::Matched => out.matched.push(rec),
                MatchState::LateSync => out.late_sync.push(rec),
                MatchState::MissingTrue => out.missing_true.push(rec),
            },
            None => out.out_of_window += 1,
        }
    }
    out
}

/// `None` when the backend record is outside the report window.
pub fn classify_one(candidate: &MatchCandidate<'_>, run: &RunSettings) -> Option<ClassifiedRecord> {
    let b = candidate.backend;
    let ts = b.ts_utc.filter(|ts| run.contains(ts))?;

    // A counterparty without a timestamp cannot be told apart from no counterparty.
    let found = candidate
        .counterparty
        .and_then(|c| c.ts_utc.map(|w| (c, w)));

    let (state, wallet_ts, amount_wallet, delay_min) = match found {
        Some((c, w)) => {
            let delay = delay_minutes(&ts, &w);
            (state_for(delay, run.tolerance_minutes), Some(w), c.amount, Some(delay))
        }
        None => (MatchState::MissingTrue, None, None, None),
    };

    let bucket = bucket_of(&ts, run);
    Some(ClassifiedRecord {
        state,
        txn_id: b.key.clone(),
        ts_report_backend: run.report_zone.render(&ts),
        ts_report_wallet: wallet_ts.map(|w| run.report_zone.render(&w)),
        amount_backend: b.amount,
        amount_wallet,
        delay_min,
        amount_diff: b.amount.zip(amount_wallet).map(|(x, y)| x - y),
        bucket_3h: run.report_zone.render(&bucket),
        payout_type: b.payout_type,
        is_automation: b.is_automation,
        fields: b.fields.clone(),
        bucket_start: bucket,
    })
}

/// Backend minus counterparty, in minutes.
pub fn delay_minutes(backend: &DateTime<Utc>, counterparty: &DateTime<Utc>) -> f64 {
    (*backend - *counterparty).num_milliseconds() as f64 / 60_000.0
}

pub fn state_for(delay_min: f64, tolerance_minutes: u32) -> MatchState {
    if delay_min.abs() <= f64::from(tolerance_minutes) {
        MatchState::Matched
    } else {
        MatchState::LateSync
    }
}
