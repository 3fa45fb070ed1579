//! `roster plan` — what the next cycle would change.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use roster_sync::plan::PlannedMutation;

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize, Tabled)]
struct MutationRow {
    #[tabled(rename = "kind")]
    kind: String,
    #[tabled(rename = "row")]
    row: u32,
    #[tabled(rename = "phone")]
    phone: String,
    #[tabled(rename = "name")]
    name: String,
}

impl From<PlannedMutation> for MutationRow {
    fn from(mutation: PlannedMutation) -> Self {
        Self {
            kind: mutation.kind.to_string(),
            row: mutation.row,
            phone: mutation.phone.map(|p| p.to_string()).unwrap_or_default(),
            name: mutation.name.unwrap_or_default(),
        }
    }
}

impl PlanArgs {
    pub fn run(self) -> Result<()> {
        let home = dirs::home_dir().context("could not determine home directory")?;
        roster_daemon::init_tracing();

        let prepared = roster_daemon::prepare_blocking(&home).context("failed to compute plan")?;
        let plan = &prepared.plan;
        let rows: Vec<MutationRow> = plan.mutations().into_iter().map(MutationRow::from).collect();

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&rows).context("failed to serialize plan JSON")?
            );
            return Ok(());
        }

        println!(
            "{} clients | sheet ends at row {} | {} duplicated phones",
            prepared.roster.entries.len(),
            plan.last_row,
            prepared.duplicated_phones,
        );
        if rows.is_empty() {
            println!(
                "{} sheet is up to date ({} rows unchanged)",
                "✓".green().bold(),
                plan.unchanged
            );
            return Ok(());
        }

        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        println!(
            "{} to clear, {} to append, {} to update, {} unchanged",
            plan.duplicate_clears.len(),
            plan.appends.len(),
            plan.updates.len(),
            plan.unchanged,
        );
        println!("Run 'roster sync' to apply.");
        Ok(())
    }
}
