//! `precon run` / `precon validate`: config-driven payout reconciliation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use clap::Subcommand;

use payout_recon::{ReconConfig, ReconError, ReconReport, Table};

use crate::exit_codes::{
    recon_exit_code, EXIT_RECON_FINDINGS, EXIT_RECON_INVALID_CONFIG, EXIT_RECON_RUNTIME,
};
use crate::export::{write_json, write_workbook};
use crate::load::load_table;
use crate::CliError;

#[derive(Subcommand)]
pub enum ReconCommands {
    /// Reconcile the backend ledger against every configured channel
    #[command(after_help = "\
Examples:
  precon run daily.recon.toml
  precon run daily.recon.toml --date 2024-01-02 --json
  precon run daily.recon.toml --tolerance 30 --xlsx payouts.xlsx
  precon run daily.recon.toml --output report.json --strict")]
    Run {
        /// Path to the .recon.toml config file
        config: PathBuf,

        /// Report day in the report timezone (overrides the config window)
        #[arg(long, value_name = "YYYY-MM-DD")]
        date: Option<NaiveDate>,

        /// Sync tolerance in minutes, 0-120 (overrides the config)
        #[arg(long, value_name = "MINUTES", value_parser = clap::value_parser!(u32).range(0..=120))]
        tolerance: Option<u32>,

        /// Output JSON to stdout instead of human summary
        #[arg(long)]
        json: bool,

        /// Write JSON output to file
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Write the report workbook (.xlsx)
        #[arg(long, value_name = "FILE")]
        xlsx: Option<PathBuf>,

        /// Exit 62 when any payout is late-sync or missing
        #[arg(long)]
        strict: bool,
    },

    /// Validate a recon config without running
    #[command(after_help = "\
Examples:
  precon validate daily.recon.toml")]
    Validate {
        /// Path to the .recon.toml config file
        config: PathBuf,
    },
}

pub fn cmd_recon(cmd: ReconCommands) -> Result<(), CliError> {
    match cmd {
        ReconCommands::Run { config, date, tolerance, json, output, xlsx, strict } => {
            cmd_recon_run(config, date, tolerance, json, output, xlsx, strict)
        }
        ReconCommands::Validate { config } => cmd_recon_validate(config),
    }
}

fn recon_err(code: u8, msg: impl Into<String>) -> CliError {
    CliError { code, message: msg.into(), hint: None }
}

fn engine_err(err: ReconError) -> CliError {
    let hint = match &err {
        ReconError::ColumnNotFound { column, available, .. } if !available.is_empty() => Some(format!(
            "set the '{column}' column explicitly in the config; the file has: {}",
            available.join(", ")
        )),
        ReconError::UnknownTimezone(_) => {
            Some("use an IANA name (Asia/Dhaka) or a fixed offset (+06:00)".to_string())
        }
        _ => None,
    };
    CliError { code: recon_exit_code(&err), message: err.to_string(), hint }
}

fn load_config(config_path: &Path) -> Result<ReconConfig, CliError> {
    let config_str = std::fs::read_to_string(config_path)
        .map_err(|e| recon_err(EXIT_RECON_RUNTIME, format!("cannot read config: {e}")))?;
    ReconConfig::from_toml(&config_str).map_err(engine_err)
}

fn require_file<'a>(file: Option<&'a String>, owner: &str) -> Result<&'a str, CliError> {
    file.map(String::as_str).ok_or_else(|| {
        recon_err(EXIT_RECON_INVALID_CONFIG, format!("{owner}: `file` is required to run"))
            .with_hint("paths are resolved relative to the config file's directory")
    })
}

#[allow(clippy::too_many_arguments)]
fn cmd_recon_run(
    config_path: PathBuf,
    date: Option<NaiveDate>,
    tolerance: Option<u32>,
    json_output: bool,
    output_file: Option<PathBuf>,
    xlsx_file: Option<PathBuf>,
    strict: bool,
) -> Result<(), CliError> {
    let config = load_config(&config_path)?;
    let settings = config.run_settings(date, tolerance).map_err(engine_err)?;

    // Resolve file paths relative to config file's directory
    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));

    let backend_file = require_file(config.backend.file.as_ref(), "backend")?;
    let backend = load_table("backend", base_dir, backend_file).map_err(engine_err)?;

    let mut counterparties: BTreeMap<String, Table> = BTreeMap::new();
    for (name, channel) in &config.channels {
        let file = require_file(channel.file.as_ref(), &format!("channel '{name}'"))?;
        let table = load_table(name, base_dir, file).map_err(engine_err)?;
        counterparties.insert(name.clone(), table);
    }

    log::info!(
        "{}: window {} .. {} ({}), tolerance {} min",
        config.name,
        settings.report_zone.render(&settings.start),
        settings.report_zone.render(&settings.end),
        settings.report_zone,
        settings.tolerance_minutes,
    );

    // Run engine
    let report = payout_recon::run(&config, &settings, &backend, &counterparties).map_err(engine_err)?;

    // Output
    if let Some(ref path) = output_file {
        write_json(&report, path).map_err(|e| recon_err(EXIT_RECON_RUNTIME, e))?;
        eprintln!("wrote {}", path.display());
    }

    if let Some(ref path) = xlsx_file {
        let sheets = write_workbook(&report, path).map_err(|e| recon_err(EXIT_RECON_RUNTIME, e))?;
        eprintln!("wrote {} ({sheets} sheets)", path.display());
    }

    if json_output {
        let json_str = serde_json::to_string_pretty(&report)
            .map_err(|e| recon_err(EXIT_RECON_RUNTIME, format!("JSON serialization error: {e}")))?;
        println!("{json_str}");
    }

    // Human summary to stderr
    print_summary(&report);

    if strict && report.has_findings() {
        return Err(recon_err(EXIT_RECON_FINDINGS, "late-sync or missing payouts found (--strict)"));
    }

    Ok(())
}

fn print_summary(report: &ReconReport) {
    eprintln!(
        "{}: {} .. {} ({}), tolerance {} min",
        report.meta.name,
        report.meta.window_start,
        report.meta.window_end,
        report.meta.report_zone,
        report.meta.tolerance_minutes,
    );
    for ch in &report.channels {
        eprintln!(
            "  {:<12} {} payouts: {} matched, {} late sync, {} missing ({} outside window)",
            ch.label,
            ch.windowed_count(),
            ch.matched.len(),
            ch.late_sync.len(),
            ch.missing_true.len(),
            ch.stats.out_of_window,
        );
    }
    let t = &report.totals;
    eprintln!(
        "reconciled: {:.2} total, {:.2} futures, {:.2} CFD, {:.2} via automation",
        t.total, t.futures_total, t.cfd_total, t.automation_total,
    );
}

fn cmd_recon_validate(config_path: PathBuf) -> Result<(), CliError> {
    let config = load_config(&config_path)?;
    let settings = config.run_settings(None, None).map_err(engine_err)?;
    let specs = config.channel_specs().map_err(engine_err)?;

    eprintln!(
        "config ok: {} ({} channel{}, window {} .. {})",
        config.name,
        specs.len(),
        if specs.len() == 1 { "" } else { "s" },
        settings.report_zone.render(&settings.start),
        settings.report_zone.render(&settings.end),
    );
    for spec in &specs {
        eprintln!(
            "  {:<12} {} on [{}]",
            spec.label,
            spec.strategy.kind(),
            spec.payment_methods.join(", "),
        );
    }
    Ok(())
}
