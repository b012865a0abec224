// Property-based tests for windowing, partitioning and determinism.
// CI: 256 cases (default). Soak: PROPTEST_CASES=10000 cargo test --release

use std::collections::BTreeSet;

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use proptest::prelude::*;

use payout_recon::aggregate::{summarize_buckets, window_starts};
use payout_recon::config::{ReconConfig, RunSettings};
use payout_recon::engine::reconcile_channel;
use payout_recon::normalize::Zone;
use payout_recon::{ChannelResult, Table};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

fn config_256() -> ProptestConfig {
    ProptestConfig {
        cases: std::env::var("PROPTEST_CASES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(256),
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

fn channel_toml(strategy: &str, tolerance: u32) -> String {
    format!(
        r#"
name = "prop"
[report]
timezone = "UTC"
date = "2024-01-01"
tolerance_minutes = {tolerance}
[backend]
timezone = "UTC"
[backend.columns]
timestamp = "Disbursed Time"
amount = "Disbursement Amount"
[channels.wallet]
timezone = "UTC"
payment_methods = ["usdt"]
strategy = "{strategy}"
backend_key = "Transaction ID"
[channels.wallet.columns]
timestamp = "Created"
key = "Tracking ID"
amount = "Amount"
"#
    )
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

fn stamp(offset_min: i64) -> String {
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    (base + Duration::minutes(offset_min)).format("%Y-%m-%d %H:%M:%S").to_string()
}

/// (key, minute offset from the report day start, amount). Offsets straddle the window.
fn arb_row() -> impl Strategy<Value = (String, i64, String)> {
    (
        prop_oneof![Just("K1"), Just("k2"), Just("K3"), Just("K4"), Just("")].prop_map(String::from),
        -600i64..2000,
        prop_oneof![
            3 => r"[0-9]{1,4}\.[0-9]{2}",
            1 => Just("".to_string()),
            1 => Just("n/a".to_string()),
        ],
    )
}

fn arb_strategy() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("exact_key"), Just("substring"), Just("email")]
}

/// Email channels key on addresses; the same generated key becomes one.
fn key_cell(strategy: &str, key: &str) -> String {
    if strategy == "email" && !key.is_empty() {
        format!("{key}@payouts.example")
    } else {
        key.to_string()
    }
}

fn backend_table(strategy: &str, rows: &[(String, i64, String)]) -> Table {
    let mut t = Table::new(
        "backend",
        vec![
            "Row".into(),
            "Transaction ID".into(),
            "Disbursed Time".into(),
            "Disbursement Amount".into(),
        ],
    );
    for (i, (key, offset, amount)) in rows.iter().enumerate() {
        t.push_row(vec![i.to_string(), key_cell(strategy, key), stamp(*offset), amount.clone()]);
    }
    t
}

fn counterparty_table(strategy: &str, rows: &[(String, i64, String)]) -> Table {
    let mut t = Table::new(
        "wallet",
        vec!["Tracking ID".into(), "Created".into(), "Amount".into()],
    );
    for (key, offset, amount) in rows {
        t.push_row(vec![key_cell(strategy, key), stamp(*offset), amount.clone()]);
    }
    t
}

fn reconcile(
    strategy: &str,
    tolerance: u32,
    backend: &[(String, i64, String)],
    counterparty: &[(String, i64, String)],
) -> ChannelResult {
    let config = ReconConfig::from_toml(&channel_toml(strategy, tolerance)).unwrap();
    let settings = config.run_settings(None, None).unwrap();
    let specs = config.channel_specs().unwrap();
    reconcile_channel(
        &backend_table(strategy, backend),
        &counterparty_table(strategy, counterparty),
        &config.backend_spec().unwrap(),
        &specs[0],
        &settings,
    )
    .unwrap()
}

// ---------------------------------------------------------------------------
// Window completeness
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(config_256())]
    #[test]
    fn window_count_is_ceiling(start_min in -10_000i64..10_000, len_min in 1i64..5_000) {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + Duration::minutes(start_min);
        let end = start + Duration::minutes(len_min);
        let run = RunSettings::new(Zone::parse("Asia/Dhaka").unwrap(), start, end, 15).unwrap();

        let expected = ((len_min + 179) / 180) as usize;
        prop_assert_eq!(window_starts(&run).len(), expected);
        prop_assert_eq!(summarize_buckets(&[], &[], &[], &run).len(), expected);
    }
}

proptest! {
    #![proptest_config(config_256())]
    #[test]
    fn every_day_has_eight_windows(days in 0u32..800) {
        let day = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap() + Duration::days(i64::from(days));
        let run = RunSettings::for_day(Zone::parse("Asia/Dhaka").unwrap(), day, 15).unwrap();
        prop_assert_eq!(window_starts(&run).len(), 8);
    }
}

// ---------------------------------------------------------------------------
// Partition completeness
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(config_256())]
    #[test]
    fn states_partition_windowed_rows(
        backend in prop::collection::vec(arb_row(), 0..25),
        counterparty in prop::collection::vec(arb_row(), 0..25),
        strategy in arb_strategy(),
        tolerance in 0u32..=120,
    ) {
        let result = reconcile(strategy, tolerance, &backend, &counterparty);

        let expected: BTreeSet<String> = backend
            .iter()
            .enumerate()
            .filter(|(_, (_, offset, _))| (0..1440).contains(offset))
            .map(|(i, _)| i.to_string())
            .collect();

        let mut seen = BTreeSet::new();
        for rec in result.matched.iter().chain(&result.late_sync).chain(&result.missing_true) {
            // Row ids are unique, so a repeat means a record landed in two states.
            prop_assert!(seen.insert(rec.fields[0].clone()));
        }
        prop_assert_eq!(seen, expected);
        prop_assert_eq!(result.windowed_count() + result.stats.out_of_window, backend.len());

        let bucketed: usize = result.summary_3h.iter().map(|s| s.volume()).sum();
        prop_assert_eq!(bucketed, result.windowed_count());
        prop_assert_eq!(result.summary_3h.len(), 8);

        for rec in &result.matched {
            prop_assert!(rec.delay_min.unwrap().abs() <= f64::from(tolerance));
        }
        for rec in &result.late_sync {
            prop_assert!(rec.delay_min.unwrap().abs() > f64::from(tolerance));
        }
        for rec in &result.missing_true {
            prop_assert!(rec.amount_diff.is_none());
            prop_assert!(rec.amount_wallet.is_none());
        }
    }
}

proptest! {
    #![proptest_config(config_256())]
    #[test]
    fn wider_tolerance_never_loses_matches(
        backend in prop::collection::vec(arb_row(), 0..20),
        counterparty in prop::collection::vec(arb_row(), 0..20),
        strategy in arb_strategy(),
        t1 in 0u32..60,
        gap in 1u32..60,
    ) {
        let narrow = reconcile(strategy, t1, &backend, &counterparty);
        let wide = reconcile(strategy, t1 + gap, &backend, &counterparty);

        prop_assert!(wide.matched.len() >= narrow.matched.len());
        prop_assert_eq!(wide.missing_true.len(), narrow.missing_true.len());
        prop_assert_eq!(
            wide.matched.len() + wide.late_sync.len(),
            narrow.matched.len() + narrow.late_sync.len()
        );
    }
}

// ---------------------------------------------------------------------------
// Idempotence
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(config_256())]
    #[test]
    fn identical_inputs_identical_output(
        backend in prop::collection::vec(arb_row(), 0..20),
        counterparty in prop::collection::vec(arb_row(), 0..20),
        strategy in arb_strategy(),
    ) {
        let a = serde_json::to_string(&reconcile(strategy, 15, &backend, &counterparty)).unwrap();
        let b = serde_json::to_string(&reconcile(strategy, 15, &backend, &counterparty)).unwrap();
        prop_assert_eq!(a, b);
    }
}
