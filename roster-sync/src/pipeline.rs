//! Shared cycle entrypoint used by CLI and daemon.
//!
//! One cycle: load the roster and read the sheet snapshot concurrently,
//! plan, then apply. Any error aborts the rest of the cycle; the caller
//! decides what to do about it (the daemon logs and waits for the next tick).

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use roster_core::{RosterConfig, SheetSchema};

use crate::error::SyncError;
use crate::plan::ReconciliationPlan;
use crate::report_store;
use crate::roster::{load_roster, Roster};
use crate::sheet::SheetSink;
use crate::snapshot::read_snapshot;
use crate::source::RosterSource;
use crate::writer::{apply_plan, WriteLimits, WriteOutcome};

/// Everything a cycle needs, built once per process.
#[derive(Clone)]
pub struct SyncContext {
    pub config: Arc<RosterConfig>,
    pub schema: Arc<SheetSchema>,
    pub source: Arc<dyn RosterSource>,
    pub sink: Arc<dyn SheetSink>,
}

impl SyncContext {
    pub fn new(
        config: RosterConfig,
        source: Arc<dyn RosterSource>,
        sink: Arc<dyn SheetSink>,
    ) -> Self {
        let schema = SheetSchema::from_config(&config);
        Self {
            config: Arc::new(config),
            schema: Arc::new(schema),
            source,
            sink,
        }
    }

    pub fn limits(&self) -> WriteLimits {
        WriteLimits {
            max_ranges_per_request: self.config.max_ranges_per_request,
            capacity_margin_rows: self.config.capacity_margin_rows,
        }
    }
}

/// Summary of one cycle, persisted after every applied run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub dry_run: bool,
    /// Records returned by the store.
    pub fetched: usize,
    pub roster_entries: usize,
    pub merged_records: usize,
    pub skipped_records: usize,
    pub sheet_last_row: u32,
    pub duplicated_phones: usize,
    pub header_written: bool,
    pub appended: usize,
    pub updated: usize,
    pub cleared: usize,
    pub unchanged: usize,
    pub grown_by: u32,
    pub requests: usize,
}

/// A computed but not yet applied cycle.
#[derive(Debug, Clone)]
pub struct PreparedCycle {
    pub roster: Roster,
    pub duplicated_phones: usize,
    pub plan: ReconciliationPlan,
}

/// Load, snapshot and plan without writing anything.
pub async fn prepare(ctx: &SyncContext) -> Result<PreparedCycle, SyncError> {
    let (roster, snapshot) = tokio::try_join!(
        load_roster(ctx.source.as_ref()),
        read_snapshot(ctx.sink.as_ref(), &ctx.schema),
    )?;
    let plan = crate::plan::plan(&roster.entries, &snapshot, &ctx.schema);
    Ok(PreparedCycle {
        roster,
        duplicated_phones: snapshot.duplicated_phones(),
        plan,
    })
}

/// Run one reconciliation cycle. With `dry_run` the plan is computed and
/// reported but nothing is written.
pub async fn run_cycle(ctx: &SyncContext, dry_run: bool) -> Result<CycleReport, SyncError> {
    let started_at = Utc::now();
    let clock = Instant::now();
    tracing::info!(dry_run, "cycle started");

    let prepared = prepare(ctx).await?;
    let plan = &prepared.plan;

    let outcome = if dry_run {
        tracing::info!("[dry-run] plan not applied");
        WriteOutcome {
            header_written: plan.header.is_some(),
            cleared: plan.duplicate_clears.len(),
            appended: plan.appends.len(),
            updated: plan.updates.len(),
            grown_by: 0,
            requests: 0,
        }
    } else if plan.is_empty() {
        tracing::info!("sheet already up to date");
        WriteOutcome::default()
    } else {
        apply_plan(ctx.sink.as_ref(), plan, &ctx.limits()).await?
    };

    let duration_ms = u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX);
    let report = CycleReport {
        started_at,
        finished_at: Utc::now(),
        duration_ms,
        dry_run,
        fetched: prepared.roster.fetched,
        roster_entries: prepared.roster.entries.len(),
        merged_records: prepared.roster.merged(),
        skipped_records: prepared.roster.skipped,
        sheet_last_row: plan.last_row,
        duplicated_phones: prepared.duplicated_phones,
        header_written: outcome.header_written,
        appended: outcome.appended,
        updated: outcome.updated,
        cleared: outcome.cleared,
        unchanged: plan.unchanged,
        grown_by: outcome.grown_by,
        requests: outcome.requests,
    };
    tracing::info!(
        appended = report.appended,
        updated = report.updated,
        cleared = report.cleared,
        duration_ms,
        "cycle finished"
    );
    Ok(report)
}

/// Run one cycle and, unless `dry_run`, persist its report under `home`.
///
/// This is the canonical cycle entrypoint for both `roster sync` and the
/// daemon processor.
pub async fn run(ctx: &SyncContext, home: &Path, dry_run: bool) -> Result<CycleReport, SyncError> {
    let report = run_cycle(ctx, dry_run).await?;
    if !dry_run {
        report_store::save_at(home, &report)?;
    }
    Ok(report)
}
