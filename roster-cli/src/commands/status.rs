//! `roster status` — the last persisted cycle report.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use roster_sync::{report_store, CycleReport};

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct CountRow {
    #[tabled(rename = "")]
    label: &'static str,
    #[tabled(rename = "count")]
    count: String,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let home = dirs::home_dir().context("could not determine home directory")?;
        let report = report_store::load_at(&home).context("failed to read last cycle report")?;

        if self.json {
            let payload = serde_json::json!({ "last_cycle": report });
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
            );
            return Ok(());
        }

        match report {
            Some(report) => {
                println!(
                    "Roster v{} | last cycle {} ago",
                    env!("CARGO_PKG_VERSION"),
                    format_age(report.finished_at, Utc::now()),
                );
                print_report(&report);
            }
            None => println!("No cycle has run yet. Run 'roster sync' first."),
        }
        Ok(())
    }
}

/// Human summary of one cycle, shared with `roster sync`.
pub fn print_report(report: &CycleReport) {
    let prefix = if report.dry_run { "[dry-run] " } else { "" };
    let nothing_to_do = report.appended == 0
        && report.updated == 0
        && report.cleared == 0
        && !report.header_written;

    if nothing_to_do {
        println!(
            "{prefix}{} sheet up to date ({} rows checked in {} ms)",
            "✓".green().bold(),
            report.unchanged,
            report.duration_ms
        );
    } else {
        println!(
            "{prefix}{} cycle finished at {} in {} ms",
            "✓".green().bold(),
            report.finished_at.format("%Y-%m-%d %H:%M:%S UTC"),
            report.duration_ms
        );
    }

    let mut rows = vec![
        count("store records", report.fetched),
        count("clients", report.roster_entries),
        count("merged records", report.merged_records),
        count("skipped (no phone)", report.skipped_records),
        count("sheet last row", report.sheet_last_row),
        count("appended", report.appended),
        count("updated", report.updated),
        count("duplicates cleared", report.cleared),
        count("unchanged", report.unchanged),
    ];
    if report.grown_by > 0 {
        rows.push(count("rows added to grid", report.grown_by));
    }
    if !report.dry_run {
        rows.push(count("write requests", report.requests));
    }

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    if report.duplicated_phones > 0 {
        println!(
            "{} {} phone(s) were duplicated on the sheet",
            "!".yellow().bold(),
            report.duplicated_phones
        );
    }
}

fn count(label: &'static str, value: impl ToString) -> CountRow {
    CountRow {
        label,
        count: value.to_string(),
    }
}

fn format_age(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = now.signed_duration_since(then).num_seconds().max(0);
    match seconds {
        s if s < 60 => format!("{s}s"),
        s if s < 60 * 60 => format!("{}m", s / 60),
        s if s < 60 * 60 * 24 => format!("{}h", s / (60 * 60)),
        s => format!("{}d", s / (60 * 60 * 24)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn age_uses_largest_whole_unit() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let ago = |secs| now - chrono::Duration::seconds(secs);
        assert_eq!(format_age(ago(42), now), "42s");
        assert_eq!(format_age(ago(125), now), "2m");
        assert_eq!(format_age(ago(3 * 3600 + 5), now), "3h");
        assert_eq!(format_age(ago(2 * 86_400), now), "2d");
        assert_eq!(format_age(now + chrono::Duration::seconds(10), now), "0s");
    }
}
