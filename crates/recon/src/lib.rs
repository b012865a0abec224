//! `payout-recon`: Payout reconciliation engine.
//!
//! Pure engine crate: receives pre-loaded backend and channel tables, returns
//! per-channel classified results, 3-hour summaries and cross-channel
//! breakdowns. No CLI or IO dependencies.

pub mod aggregate;
pub mod classify;
pub mod columns;
pub mod config;
pub mod engine;
pub mod error;
pub mod matcher;
pub mod model;
pub mod normalize;
pub mod report;
pub mod table;

pub use config::{ReconConfig, RunSettings};
pub use engine::{reconcile_channel, run};
pub use error::ReconError;
pub use model::{ChannelResult, ClassifiedRecord, MatchState, OutputTable};
pub use report::ReconReport;
pub use table::Table;
