//! `roster sync` — the manual one-shot trigger.

use anyhow::{Context, Result};
use clap::Args;

use super::status::print_report;

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Compute and report the plan without writing to the sheet.
    #[arg(long)]
    pub dry_run: bool,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let home = dirs::home_dir().context("could not determine home directory")?;
        roster_daemon::init_tracing();

        let report = roster_daemon::run_once_blocking(&home, self.dry_run).context("sync failed")?;
        print_report(&report);
        Ok(())
    }
}
