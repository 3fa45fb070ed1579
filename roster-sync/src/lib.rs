//! # roster-sync
//!
//! Roster reconciliation engine.
//!
//! Call [`pipeline::run`] to mirror the client store into the dashboard sheet
//! once. The engine only sees the [`RosterSource`] and [`SheetSink`] traits;
//! `roster-remote` provides the Postgres and Google Sheets implementations.
//! In-memory doubles live in `memory`, behind the `test-support` feature.

pub mod error;
pub mod materialize;
#[cfg(any(test, feature = "test-support"))]
pub mod memory;
pub mod pipeline;
pub mod plan;
pub mod report_store;
pub mod roster;
pub mod sheet;
pub mod snapshot;
pub mod source;
pub mod writer;

pub use error::{SinkError, SourceError, SyncError};
pub use pipeline::{run, run_cycle, CycleReport, SyncContext};
pub use plan::ReconciliationPlan;
pub use sheet::{CellRange, CellValue, RangeWrite, SheetSink, SparseRow};
pub use source::RosterSource;
pub use writer::{WriteLimits, WriteOutcome};
