use std::collections::BTreeMap;

use crate::aggregate::summarize_buckets;
use crate::classify::classify;
use crate::columns::{find, resolve};
use crate::config::{BackendSpec, ChannelSpec, MatchStrategy, ReconConfig, RunSettings};
use crate::error::ReconError;
use crate::matcher::match_records;
use crate::model::{BackendRecord, ChannelResult, ChannelStats, CounterpartyRecord};
use crate::normalize::{
    is_automation, normalize_email, normalize_id, parse_amount, parse_instants, payout_type,
};
use crate::report::ReconReport;
use crate::table::Table;

/// Reconcile every configured channel and assemble the cross-channel report.
///
/// `counterparties` maps channel name to its loaded report. Backend rows are
/// routed to channels by payment method; rows no channel claims are ignored.
pub fn run(
    config: &ReconConfig,
    run: &RunSettings,
    backend: &Table,
    counterparties: &BTreeMap<String, Table>,
) -> Result<ReconReport, ReconError> {
    let backend_spec = config.backend_spec()?;
    let specs = config.channel_specs()?;
    let partitions = partition_backend(backend, &backend_spec, &specs)?;

    let mut results = Vec::with_capacity(specs.len());
    for (spec, part) in specs.iter().zip(partitions.iter()) {
        let counterparty = counterparties.get(&spec.name).ok_or_else(|| {
            ReconError::ConfigValidation(format!("channel '{}': no counterparty table loaded", spec.name))
        })?;
        results.push(reconcile_channel(part, counterparty, &backend_spec, spec, run)?);
    }

    Ok(ReconReport::assemble(&config.name, &backend_spec, &specs, results, run))
}

/// Split backend rows by payment method, one table per channel in `specs` order.
pub fn partition_backend(
    backend: &Table,
    spec: &BackendSpec,
    channels: &[ChannelSpec],
) -> Result<Vec<Table>, ReconError> {
    let method_col = resolve(backend, "payment_method", &spec.payment_method)?;
    let parts: Vec<Table> = channels
        .iter()
        .map(|ch| {
            backend.filter_rows(&backend.name, |row| {
                row.get(method_col).map_or(false, |m| ch.accepts_method(m))
            })
        })
        .collect();

    let routed: usize = parts.iter().map(Table::len).sum();
    if routed < backend.len() {
        log::debug!(
            "{}: {} rows carry a payment method no channel claims",
            backend.name,
            backend.len() - routed
        );
    }
    Ok(parts)
}

/// Reconcile one channel: build records, match, classify, bucket.
pub fn reconcile_channel(
    backend: &Table,
    counterparty: &Table,
    backend_spec: &BackendSpec,
    channel: &ChannelSpec,
    run: &RunSettings,
) -> Result<ChannelResult, ReconError> {
    let (backend_records, backend_ts_unparsed) = backend_records(backend, backend_spec, channel)?;
    let (counterparty_records, counterparty_ts_unparsed) = counterparty_records(counterparty, channel)?;

    let candidates = match_records(&backend_records, &counterparty_records, &channel.strategy, run);
    let classified = classify(&candidates, run);
    let summary_3h = summarize_buckets(
        &classified.matched,
        &classified.late_sync,
        &classified.missing_true,
        run,
    );

    log::info!(
        "{}: {} matched, {} late sync, {} missing ({} backend rows outside window)",
        channel.label,
        classified.matched.len(),
        classified.late_sync.len(),
        classified.missing_true.len(),
        classified.out_of_window,
    );

    Ok(ChannelResult {
        name: channel.name.clone(),
        label: channel.label.clone(),
        strategy: channel.strategy.kind(),
        backend_columns: backend.columns.clone(),
        matched: classified.matched,
        late_sync: classified.late_sync,
        missing_true: classified.missing_true,
        summary_3h,
        stats: ChannelStats {
            backend_rows: backend_records.len(),
            counterparty_rows: counterparty_records.len(),
            out_of_window: classified.out_of_window,
            backend_ts_unparsed,
            counterparty_ts_unparsed,
        },
    })
}

// ---------------------------------------------------------------------------
// Record builders
// ---------------------------------------------------------------------------

/// Normalized backend records plus the count of unreadable timestamps.
pub fn backend_records(
    table: &Table,
    spec: &BackendSpec,
    channel: &ChannelSpec,
) -> Result<(Vec<BackendRecord>, usize), ReconError> {
    let ts_col = resolve(table, "timestamp", &spec.timestamp)?;
    let amount_col = resolve(table, "amount", &spec.amount)?;
    let key_col = resolve(table, "key", &channel.backend_key)?;
    let plan_col = find(table, &spec.plan);
    let status_col = find(table, &spec.status);

    let (timestamps, ts_failed) =
        parse_instants((0..table.len()).map(|r| table.cell(r, ts_col)), &spec.zone);
    warn_unparsed(table, &table.columns[ts_col], ts_failed);

    let mut amount_failed = 0;
    let records = timestamps
        .into_iter()
        .enumerate()
        .map(|(row, ts_utc)| {
            let raw_key = table.cell(row, key_col);
            let key = match channel.strategy.kind() {
                MatchStrategy::Email => normalize_email(raw_key),
                _ => normalize_id(raw_key),
            };
            let amount = parse_amount(table.cell(row, amount_col));
            if amount.is_none() && !table.cell(row, amount_col).trim().is_empty() {
                amount_failed += 1;
            }
            BackendRecord {
                row,
                key,
                ts_utc,
                amount,
                payout_type: payout_type(table.cell_opt(row, plan_col)),
                is_automation: is_automation(table.cell_opt(row, status_col)),
                fields: table.row_fields(row),
            }
        })
        .collect();
    warn_unparsed(table, &table.columns[amount_col], amount_failed);

    Ok((records, ts_failed))
}

/// Normalized counterparty records plus the count of unreadable timestamps.
pub fn counterparty_records(
    table: &Table,
    channel: &ChannelSpec,
) -> Result<(Vec<CounterpartyRecord>, usize), ReconError> {
    let ts_col = resolve(table, "timestamp", &channel.timestamp)?;
    let key_col = resolve(table, "key", &channel.key)?;
    let amount_col = resolve(table, "amount", &channel.amount)?;

    let (timestamps, ts_failed) =
        parse_instants((0..table.len()).map(|r| table.cell(r, ts_col)), &channel.zone);
    warn_unparsed(table, &table.columns[ts_col], ts_failed);

    let mut amount_failed = 0;
    let records = timestamps
        .into_iter()
        .enumerate()
        .map(|(row, ts_utc)| {
            let raw_amount = table.cell(row, amount_col);
            let mut amount = parse_amount(raw_amount);
            if amount.is_none() && !raw_amount.trim().is_empty() {
                amount_failed += 1;
            }
            if channel.amount_abs {
                amount = amount.map(f64::abs);
            }
            CounterpartyRecord {
                row,
                text: table.cell(row, key_col).to_string(),
                ts_utc,
                amount,
            }
        })
        .collect();
    warn_unparsed(table, &table.columns[amount_col], amount_failed);

    Ok((records, ts_failed))
}

fn warn_unparsed(table: &Table, column: &str, failed: usize) {
    if failed > 0 {
        log::warn!(
            "{}: {failed} of {} values in column '{column}' could not be parsed and are treated as empty",
            table.name,
            table.len()
        );
    }
}
