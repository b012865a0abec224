//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! # Exit Code Ranges
//!
//! | Code | Domain    | Description                                          |
//! |------|-----------|------------------------------------------------------|
//! | 0    | Universal | Success (late or missing payouts are findings, not failures) |
//! | 1    | Universal | General error (unspecified)                          |
//! | 2    | Universal | CLI usage error (bad args)                           |
//! | 60   | recon     | Invalid config (parse, validation, timezone, pattern) |
//! | 61   | recon     | Runtime error (IO, missing column, export)           |
//! | 62   | recon     | `--strict` run with late-sync or missing records     |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into the relevant command's error handling

use payout_recon::ReconError;

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
#[allow(dead_code)]
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options.
/// Raised by clap on argument parse failure.
#[allow(dead_code)]
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Recon (60-69)
// =============================================================================

/// Config could not be parsed or failed validation.
pub const EXIT_RECON_INVALID_CONFIG: u8 = 60;

/// Run failed: unreadable input, unresolvable column, failed export.
pub const EXIT_RECON_RUNTIME: u8 = 61;

/// `--strict` run that reported late-sync or missing-true records.
pub const EXIT_RECON_FINDINGS: u8 = 62;

/// Map an engine error to its exit code.
pub fn recon_exit_code(err: &ReconError) -> u8 {
    match err {
        ReconError::ConfigParse(_)
        | ReconError::ConfigValidation(_)
        | ReconError::UnknownTimezone(_)
        | ReconError::InvalidPattern { .. } => EXIT_RECON_INVALID_CONFIG,
        ReconError::ColumnNotFound { .. } | ReconError::Io(_) => EXIT_RECON_RUNTIME,
    }
}
