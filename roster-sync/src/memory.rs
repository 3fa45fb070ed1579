//! In-memory sink and source.
//!
//! Test doubles shared across the workspace; compiled for this crate's tests
//! and for dependents enabling `test-support`. [`InMemorySheet`] enforces the same
//! limits as the real API: writes past the grid capacity fail, and batch
//! requests carrying more ranges than allowed are rejected.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use roster_core::ClientRecord;

use crate::error::{SinkError, SourceError};
use crate::sheet::{CellRange, CellValue, RangeWrite, SheetSink, SparseRow};
use crate::source::RosterSource;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Sheet
// ---------------------------------------------------------------------------

/// One call made against an [`InMemorySheet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkOp {
    Read,
    Capacity,
    Grow(u32),
    Batch(Vec<CellRange>),
    Block(CellRange),
}

impl SinkOp {
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Grow(_) | Self::Batch(_) | Self::Block(_))
    }
}

#[derive(Debug)]
struct SheetState {
    grid: Vec<Vec<CellValue>>,
    capacity: u32,
    max_ranges: usize,
    ops: Vec<SinkOp>,
    writes: usize,
    fail_on_write: Option<usize>,
}

/// A worksheet held in memory.
#[derive(Debug)]
pub struct InMemorySheet {
    state: Mutex<SheetState>,
}

impl InMemorySheet {
    /// Empty sheet with `capacity` grid rows.
    pub fn new(capacity: u32) -> Self {
        Self::with_rows(Vec::new(), capacity)
    }

    /// Sheet pre-filled with `rows` (row 1 first), stored verbatim.
    pub fn with_rows(rows: Vec<Vec<CellValue>>, capacity: u32) -> Self {
        let capacity = capacity.max(rows.len() as u32);
        Self {
            state: Mutex::new(SheetState {
                grid: rows,
                capacity,
                max_ranges: 100,
                ops: Vec::new(),
                writes: 0,
                fail_on_write: None,
            }),
        }
    }

    pub fn with_max_ranges(self, max_ranges: usize) -> Self {
        lock(&self.state).max_ranges = max_ranges;
        self
    }

    /// Make the `n`-th mutating call from now (1-based) fail.
    pub fn fail_write_number(&self, n: usize) {
        let mut state = lock(&self.state);
        state.fail_on_write = Some(state.writes + n);
    }

    pub fn capacity(&self) -> u32 {
        lock(&self.state).capacity
    }

    /// Cell at 1-based `row`, 0-based `col`.
    pub fn cell(&self, row: u32, col: usize) -> CellValue {
        let state = lock(&self.state);
        row.checked_sub(1)
            .and_then(|r| state.grid.get(r as usize))
            .and_then(|cells| cells.get(col))
            .cloned()
            .unwrap_or_default()
    }

    /// Overwrite one cell verbatim, as a person editing the sheet would.
    pub fn set_cell(&self, row: u32, col: usize, value: CellValue) {
        let mut state = lock(&self.state);
        put(&mut state.grid, row, col, value);
    }

    /// Highest row holding any non-blank cell.
    pub fn occupied_rows(&self) -> u32 {
        let state = lock(&self.state);
        state
            .grid
            .iter()
            .rposition(|cells| cells.iter().any(|c| !c.is_blank()))
            .map_or(0, |i| i as u32 + 1)
    }

    pub fn ops(&self) -> Vec<SinkOp> {
        lock(&self.state).ops.clone()
    }

    /// Return and forget the recorded calls.
    pub fn take_ops(&self) -> Vec<SinkOp> {
        std::mem::take(&mut lock(&self.state).ops)
    }

    fn begin_write(state: &mut SheetState, op: SinkOp) -> Result<(), SinkError> {
        state.ops.push(op);
        state.writes += 1;
        if state.fail_on_write == Some(state.writes) {
            state.fail_on_write = None;
            return Err(SinkError::Api {
                status: 503,
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn apply(state: &mut SheetState, write: &RangeWrite) -> Result<(), SinkError> {
        if write.range.last_row > state.capacity {
            return Err(SinkError::Api {
                status: 400,
                message: format!(
                    "range exceeds grid limits: row {} > {} rows",
                    write.range.last_row, state.capacity
                ),
            });
        }
        for (dr, values) in write.values.iter().enumerate() {
            for (dc, value) in values.iter().enumerate() {
                put(
                    &mut state.grid,
                    write.range.first_row + dr as u32,
                    write.range.first_col + dc,
                    user_entered(value),
                );
            }
        }
        Ok(())
    }
}

fn put(grid: &mut Vec<Vec<CellValue>>, row: u32, col: usize, value: CellValue) {
    let r = row.saturating_sub(1) as usize;
    if grid.len() <= r {
        grid.resize_with(r + 1, Vec::new);
    }
    let cells = &mut grid[r];
    if cells.len() <= col {
        cells.resize(col + 1, CellValue::Empty);
    }
    cells[col] = value;
}

/// How the sheet stores a value typed in by a user.
fn user_entered(value: &CellValue) -> CellValue {
    let text = match value {
        CellValue::Text(text) => text,
        CellValue::Literal(text) => return CellValue::text(text.as_str()),
        other => return other.clone(),
    };
    if let Some(literal) = text.strip_prefix('\'') {
        return CellValue::text(literal);
    }
    let trimmed = text.trim();
    if trimmed.eq_ignore_ascii_case("true") {
        return CellValue::Bool(true);
    }
    if trimmed.eq_ignore_ascii_case("false") {
        return CellValue::Bool(false);
    }
    if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(n) = trimmed.parse::<f64>() {
            return CellValue::Number(n);
        }
    }
    value.clone()
}

#[async_trait]
impl SheetSink for InMemorySheet {
    async fn read_rows(&self, width: usize) -> Result<Vec<SparseRow>, SinkError> {
        let mut state = lock(&self.state);
        state.ops.push(SinkOp::Read);
        let mut rows: Vec<SparseRow> = state
            .grid
            .iter()
            .map(|cells| {
                let mut owned: Vec<CellValue> = cells.iter().take(width).cloned().collect();
                while owned.last().is_some_and(CellValue::is_blank) {
                    owned.pop();
                }
                SparseRow::new(owned)
            })
            .collect();
        while rows.last().is_some_and(SparseRow::is_empty) {
            rows.pop();
        }
        Ok(rows)
    }

    async fn row_capacity(&self) -> Result<u32, SinkError> {
        let mut state = lock(&self.state);
        state.ops.push(SinkOp::Capacity);
        Ok(state.capacity)
    }

    async fn grow_rows(&self, additional: u32) -> Result<(), SinkError> {
        let mut state = lock(&self.state);
        Self::begin_write(&mut state, SinkOp::Grow(additional))?;
        state.capacity += additional;
        Ok(())
    }

    async fn batch_write(&self, writes: &[RangeWrite]) -> Result<(), SinkError> {
        let mut state = lock(&self.state);
        let ranges = writes.iter().map(|w| w.range).collect();
        Self::begin_write(&mut state, SinkOp::Batch(ranges))?;
        if writes.len() > state.max_ranges {
            return Err(SinkError::Api {
                status: 400,
                message: format!("{} ranges exceed the limit of {}", writes.len(), state.max_ranges),
            });
        }
        for write in writes {
            Self::apply(&mut state, write)?;
        }
        Ok(())
    }

    async fn write_block(&self, block: &RangeWrite) -> Result<(), SinkError> {
        let mut state = lock(&self.state);
        Self::begin_write(&mut state, SinkOp::Block(block.range))?;
        Self::apply(&mut state, block)
    }
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// A client store backed by a vector.
#[derive(Debug, Default)]
pub struct StaticRoster {
    records: Mutex<Vec<ClientRecord>>,
    failure: Mutex<Option<String>>,
    calls: AtomicUsize,
}

impl StaticRoster {
    pub fn new(records: Vec<ClientRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            ..Self::default()
        }
    }

    pub fn set_records(&self, records: Vec<ClientRecord>) {
        *lock(&self.records) = records;
    }

    /// Make every fetch fail with `message` until [`StaticRoster::recover`].
    pub fn fail_with(&self, message: impl Into<String>) {
        *lock(&self.failure) = Some(message.into());
    }

    pub fn recover(&self) {
        *lock(&self.failure) = None;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RosterSource for StaticRoster {
    async fn fetch_clients(&self) -> Result<Vec<ClientRecord>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = lock(&self.failure).clone() {
            return Err(SourceError::Unavailable(message));
        }
        Ok(lock(&self.records).clone())
    }
}
