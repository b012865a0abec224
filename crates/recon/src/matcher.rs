//! Matching strategies.
//!
//! All three produce one [`MatchCandidate`] per backend record, in backend
//! input order. A backend record with no counterparty gets `None`, never an
//! error.
//!
//! Tie-break rule shared by every "nearest" choice: the smallest absolute
//! distance between backend and counterparty timestamps wins; equal distances
//! go to the counterparty that comes first in input order; a counterparty
//! without a timestamp loses to any that has one.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::config::{DuplicateKeyPolicy, RunSettings, Strategy};
use crate::model::{BackendRecord, CounterpartyRecord, MatchCandidate};
use crate::normalize::{extract_emails, extract_key, normalize_id};

/// Dispatch to the configured strategy.
pub fn match_records<'a>(
    backend: &'a [BackendRecord],
    counterparty: &'a [CounterpartyRecord],
    strategy: &Strategy,
    run: &RunSettings,
) -> Vec<MatchCandidate<'a>> {
    match strategy {
        Strategy::ExactKey { pattern, duplicates } => {
            match_exact_key(backend, counterparty, pattern.as_ref(), *duplicates)
        }
        Strategy::Substring => match_substring(backend, counterparty, run),
        Strategy::Email => match_email(backend, counterparty, run),
    }
}

// ---------------------------------------------------------------------------
// Key groups
// ---------------------------------------------------------------------------

/// Counterparty rows grouped by normalized key. Each group keeps input order.
struct KeyIndex<'a> {
    groups: HashMap<String, Vec<&'a CounterpartyRecord>>,
}

impl<'a> KeyIndex<'a> {
    fn build<I, F>(rows: I, keys_of: F) -> Self
    where
        I: IntoIterator<Item = &'a CounterpartyRecord>,
        F: Fn(&CounterpartyRecord) -> Vec<String>,
    {
        let mut groups: HashMap<String, Vec<&'a CounterpartyRecord>> = HashMap::new();
        for row in rows {
            for key in keys_of(row) {
                if !key.is_empty() {
                    groups.entry(key).or_default().push(row);
                }
            }
        }
        Self { groups }
    }

    fn get(&self, key: &str) -> &[&'a CounterpartyRecord] {
        if key.is_empty() {
            return &[];
        }
        self.groups.get(key).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Closest candidate in time to `ts`. See the module docs for tie-breaks.
pub fn nearest<'a>(
    ts: Option<DateTime<Utc>>,
    candidates: impl IntoIterator<Item = &'a CounterpartyRecord>,
) -> Option<&'a CounterpartyRecord> {
    candidates.into_iter().min_by_key(|c| match (ts, c.ts_utc) {
        (Some(b), Some(w)) => (0u8, (b - w).num_milliseconds().unsigned_abs()),
        _ => (1u8, 0),
    })
}

// ---------------------------------------------------------------------------
// Strategy 1: exact key
// ---------------------------------------------------------------------------

/// Exact join on the normalized identifier. With `pattern`, the counterparty
/// key is its first capture group in the raw cell.
pub fn match_exact_key<'a>(
    backend: &'a [BackendRecord],
    counterparty: &'a [CounterpartyRecord],
    pattern: Option<&Regex>,
    duplicates: DuplicateKeyPolicy,
) -> Vec<MatchCandidate<'a>> {
    let index = KeyIndex::build(counterparty, |c| {
        let key = match pattern {
            Some(re) => extract_key(&c.text, re),
            None => normalize_id(&c.text),
        };
        vec![key]
    });

    backend
        .iter()
        .map(|b| {
            let group = index.get(&b.key);
            let chosen = match duplicates {
                DuplicateKeyPolicy::FirstSeen => group.first().copied(),
                DuplicateKeyPolicy::NearestTimestamp => nearest(b.ts_utc, group.iter().copied()),
            };
            MatchCandidate {
                backend: b,
                counterparty: chosen,
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Strategy 2: substring containment
// ---------------------------------------------------------------------------

/// Backend key as a literal substring of the counterparty text, restricted to
/// counterparty rows inside the match margin.
pub fn match_substring<'a>(
    backend: &'a [BackendRecord],
    counterparty: &'a [CounterpartyRecord],
    run: &RunSettings,
) -> Vec<MatchCandidate<'a>> {
    let visible: Vec<(String, &'a CounterpartyRecord)> = counterparty
        .iter()
        .filter(|c| in_margin(c, run))
        .map(|c| (c.text.to_uppercase(), c))
        .collect();

    backend
        .iter()
        .map(|b| {
            let chosen = if b.key.is_empty() {
                None
            } else {
                nearest(
                    b.ts_utc,
                    visible
                        .iter()
                        .filter(|(text, _)| text.contains(b.key.as_str()))
                        .map(|(_, c)| *c),
                )
            };
            MatchCandidate {
                backend: b,
                counterparty: chosen,
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Strategy 3: email containment
// ---------------------------------------------------------------------------

/// Backend email equal to any email mentioned in the counterparty text,
/// restricted to counterparty rows inside the match margin.
pub fn match_email<'a>(
    backend: &'a [BackendRecord],
    counterparty: &'a [CounterpartyRecord],
    run: &RunSettings,
) -> Vec<MatchCandidate<'a>> {
    let index = KeyIndex::build(
        counterparty.iter().filter(|c| in_margin(c, run)),
        |c| extract_emails(&c.text),
    );

    backend
        .iter()
        .map(|b| MatchCandidate {
            backend: b,
            counterparty: nearest(b.ts_utc, index.get(&b.key).iter().copied()),
        })
        .collect()
}

fn in_margin(c: &CounterpartyRecord, run: &RunSettings) -> bool {
    c.ts_utc.map_or(false, |ts| run.within_margin(&ts))
}
