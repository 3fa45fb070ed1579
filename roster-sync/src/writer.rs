//! Batch writer.
//!
//! Applies a [`ReconciliationPlan`] in a fixed order:
//!
//! 1. header row (only when it was blank),
//! 2. duplicate clears, chunked to the per-request range limit,
//! 3. capacity check, growing the grid by the deficit plus a margin,
//! 4. all appends as one contiguous block,
//! 5. updates, chunked like the clears.
//!
//! Errors propagate unchanged; there is no rollback and no retry here.

use crate::error::SyncError;
use crate::plan::ReconciliationPlan;
use crate::sheet::{RangeWrite, SheetSink};

/// Request-shaping limits for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteLimits {
    pub max_ranges_per_request: usize,
    pub capacity_margin_rows: u32,
}

impl Default for WriteLimits {
    fn default() -> Self {
        Self {
            max_ranges_per_request: 100,
            capacity_margin_rows: 100,
        }
    }
}

/// What the writer actually sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    pub header_written: bool,
    pub cleared: usize,
    pub appended: usize,
    pub updated: usize,
    /// Rows added to the grid before the append block.
    pub grown_by: u32,
    /// Mutating requests issued.
    pub requests: usize,
}

/// Apply `plan` to `sink`.
pub async fn apply_plan(
    sink: &dyn SheetSink,
    plan: &ReconciliationPlan,
    limits: &WriteLimits,
) -> Result<WriteOutcome, SyncError> {
    let mut outcome = WriteOutcome::default();

    if let Some(header) = &plan.header {
        sink.batch_write(std::slice::from_ref(header)).await?;
        outcome.header_written = true;
        outcome.requests += 1;
        tracing::info!(row = header.range.first_row, "header row written");
    }

    let clears: Vec<RangeWrite> = plan
        .duplicate_clears
        .iter()
        .map(|clear| clear.write.clone())
        .collect();
    outcome.requests += write_chunked(sink, &clears, limits.max_ranges_per_request).await?;
    outcome.cleared = clears.len();
    if !clears.is_empty() {
        tracing::info!(rows = clears.len(), "duplicate rows cleared");
    }

    if let Some(block) = plan.append_block() {
        let required = plan.rows_required();
        let capacity = sink.row_capacity().await?;
        if required > capacity {
            let grow_by = required - capacity + limits.capacity_margin_rows;
            tracing::info!(required, capacity, grow_by, "growing sheet before append");
            sink.grow_rows(grow_by).await?;
            outcome.grown_by = grow_by;
            outcome.requests += 1;
        }
        sink.write_block(&block).await?;
        outcome.appended = plan.appends.len();
        outcome.requests += 1;
        tracing::info!(
            rows = outcome.appended,
            first_row = block.range.first_row,
            "new rows appended"
        );
    }

    let updates: Vec<RangeWrite> = plan.updates.iter().map(|u| u.write.clone()).collect();
    outcome.requests += write_chunked(sink, &updates, limits.max_ranges_per_request).await?;
    outcome.updated = updates.len();
    if !updates.is_empty() {
        tracing::info!(rows = updates.len(), "existing rows updated");
    }

    Ok(outcome)
}

/// Write `writes` in chunks of at most `max_ranges`; returns the request count.
async fn write_chunked(
    sink: &dyn SheetSink,
    writes: &[RangeWrite],
    max_ranges: usize,
) -> Result<usize, SyncError> {
    let mut requests = 0;
    for chunk in writes.chunks(max_ranges.max(1)) {
        sink.batch_write(chunk).await?;
        requests += 1;
    }
    Ok(requests)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemorySheet, SinkOp};
    use crate::sheet::CellValue;

    #[tokio::test]
    async fn empty_plan_sends_nothing() {
        let sheet = InMemorySheet::new(5);
        let outcome = apply_plan(&sheet, &ReconciliationPlan::default(), &WriteLimits::default())
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::default());
        assert!(sheet.ops().is_empty());
    }

    #[tokio::test]
    async fn header_is_written_before_anything_else() {
        let sheet = InMemorySheet::new(5);
        let plan = ReconciliationPlan {
            header: Some(RangeWrite::row(1, 0, vec![CellValue::text("Date")])),
            last_row: 1,
            ..ReconciliationPlan::default()
        };
        let outcome = apply_plan(&sheet, &plan, &WriteLimits::default()).await.unwrap();
        assert!(outcome.header_written);
        assert_eq!(outcome.requests, 1);
        assert!(matches!(sheet.ops()[0], SinkOp::Batch(_)));
    }

    #[tokio::test]
    async fn zero_range_limit_still_makes_progress() {
        let sheet = InMemorySheet::new(5).with_max_ranges(1);
        let writes = vec![RangeWrite::row(1, 0, vec![CellValue::text("x")]); 2];
        assert_eq!(write_chunked(&sheet, &writes, 0).await.unwrap(), 2);
    }
}
