//! Diff planner.
//!
//! Compares the roster with a fresh [`SinkSnapshot`] and produces the
//! [`ReconciliationPlan`] for one cycle:
//!
//! | sheet rows for a phone | action                                           |
//! |------------------------|--------------------------------------------------|
//! | none                   | append after the last occupied row, roster order |
//! | one                    | update its mutable columns if any cell differs   |
//! | several                | update the first, blank out every other one      |
//!
//! Phones on the sheet with no roster entry are left alone.

use std::fmt;

use roster_core::{ClientId, NormalizedPhone, RosterEntry, SheetSchema};

use crate::materialize::{materialize, row_payload, AppendRow};
use crate::sheet::{CellValue, RangeWrite};
use crate::snapshot::SinkSnapshot;

// ---------------------------------------------------------------------------
// Plan types
// ---------------------------------------------------------------------------

/// Refresh of an existing canonical row.
#[derive(Debug, Clone, PartialEq)]
pub struct RowUpdate {
    pub row: u32,
    pub client: ClientId,
    pub phone: NormalizedPhone,
    pub full_name: String,
    /// 0-based columns whose rendered value changes.
    pub changed_cols: Vec<usize>,
    pub write: RangeWrite,
}

/// Blank-out of a non-canonical duplicate row.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateClear {
    pub row: u32,
    pub phone: NormalizedPhone,
    pub canonical_row: u32,
    pub write: RangeWrite,
}

/// Mutations needed to make the sheet match the roster.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReconciliationPlan {
    /// Column headers, when the header row is entirely blank.
    pub header: Option<RangeWrite>,
    pub duplicate_clears: Vec<DuplicateClear>,
    pub appends: Vec<AppendRow>,
    pub updates: Vec<RowUpdate>,
    /// Last occupied row at snapshot time; appends start right below it.
    pub last_row: u32,
    /// Roster entries whose canonical row already matches.
    pub unchanged: usize,
}

impl ReconciliationPlan {
    pub fn is_empty(&self) -> bool {
        self.header.is_none()
            && self.duplicate_clears.is_empty()
            && self.appends.is_empty()
            && self.updates.is_empty()
    }

    /// Rows the grid must have once the appends are written.
    pub fn rows_required(&self) -> u32 {
        self.last_row + self.appends.len() as u32
    }

    /// All appends as one contiguous block starting at `last_row + 1`.
    pub fn append_block(&self) -> Option<RangeWrite> {
        let first = self.appends.first()?;
        let rows = self
            .appends
            .iter()
            .map(|append| append.payload.cells().to_vec())
            .collect();
        Some(RangeWrite::block(first.row, 0, rows))
    }

    /// Flat listing in application order, for display.
    pub fn mutations(&self) -> Vec<PlannedMutation> {
        let mut out = Vec::new();
        if let Some(header) = &self.header {
            out.push(PlannedMutation {
                kind: MutationKind::Header,
                row: header.range.first_row,
                phone: None,
                name: None,
            });
        }
        out.extend(self.duplicate_clears.iter().map(|clear| PlannedMutation {
            kind: MutationKind::ClearDuplicate,
            row: clear.row,
            phone: Some(clear.phone.clone()),
            name: None,
        }));
        out.extend(self.appends.iter().map(|append| PlannedMutation {
            kind: MutationKind::Append,
            row: append.row,
            phone: Some(append.phone.clone()),
            name: Some(append.full_name.clone()),
        }));
        out.extend(self.updates.iter().map(|update| PlannedMutation {
            kind: MutationKind::Update,
            row: update.row,
            phone: Some(update.phone.clone()),
            name: Some(update.full_name.clone()),
        }));
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Header,
    ClearDuplicate,
    Append,
    Update,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Header => "header",
            Self::ClearDuplicate => "clear",
            Self::Append => "append",
            Self::Update => "update",
        };
        f.write_str(label)
    }
}

/// One line of a rendered plan.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedMutation {
    pub kind: MutationKind,
    pub row: u32,
    pub phone: Option<NormalizedPhone>,
    pub name: Option<String>,
}

// ---------------------------------------------------------------------------
// Planner
// ---------------------------------------------------------------------------

/// Build the plan for `roster` against `snapshot`. Pure.
pub fn plan(
    roster: &[RosterEntry],
    snapshot: &SinkSnapshot,
    schema: &SheetSchema,
) -> ReconciliationPlan {
    let width = schema.width();
    let mutable = schema.mutable_cols();

    let header = schema
        .header_row()
        .filter(|&row| snapshot.row_is_blank(row, width))
        .map(|row| {
            let cells = schema.headers().into_iter().map(CellValue::text).collect();
            RangeWrite::row(row, 0, cells)
        });

    let mut plan = ReconciliationPlan {
        header,
        last_row: snapshot.last_row(),
        ..ReconciliationPlan::default()
    };
    let mut next_row = snapshot.last_row() + 1;

    for entry in roster {
        let (canonical, duplicates) = match snapshot.locations(&entry.phone) {
            [] => {
                plan.appends.push(materialize(entry, next_row, schema));
                next_row += 1;
                continue;
            }
            [canonical, duplicates @ ..] => (*canonical, duplicates),
        };

        for &row in duplicates {
            plan.duplicate_clears.push(DuplicateClear {
                row,
                phone: entry.phone.clone(),
                canonical_row: canonical,
                write: RangeWrite::row(row, 0, vec![CellValue::Empty; width]),
            });
        }

        let payload = row_payload(entry, schema);
        let existing = snapshot.row(canonical);
        let changed_cols: Vec<usize> = mutable
            .clone()
            .filter(|&col| !payload.get(col).same_as(existing.get(col)))
            .collect();
        if changed_cols.is_empty() {
            plan.unchanged += 1;
            continue;
        }
        plan.updates.push(RowUpdate {
            row: canonical,
            client: entry.id,
            phone: entry.phone.clone(),
            full_name: entry.full_name.clone(),
            changed_cols,
            write: RangeWrite::row(
                canonical,
                *mutable.start(),
                payload.cells()[mutable.clone()].to_vec(),
            ),
        });
    }

    tracing::info!(
        header = plan.header.is_some(),
        clears = plan.duplicate_clears.len(),
        appends = plan.appends.len(),
        updates = plan.updates.len(),
        unchanged = plan.unchanged,
        "plan computed"
    );
    plan
}
