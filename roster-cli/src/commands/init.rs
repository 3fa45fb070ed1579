//! `roster init [--force]`

use anyhow::{Context, Result};
use clap::Args;

use roster_core::config;

/// Write the default config file.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing config.
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let home = dirs::home_dir().context("could not determine home directory")?;
        let (path, written) =
            config::init_at(&home, self.force).context("failed to write default config")?;

        if !written {
            println!(
                "Config already exists at {} (use --force to overwrite).",
                path.display()
            );
            return Ok(());
        }

        println!("✓ Wrote default config to {}", path.display());
        println!("  Set spreadsheet_id, then export DATABASE_URL and GOOGLE_OAUTH_TOKEN");
        println!("  (or GOOGLE_ACCESS_TOKEN) before running `roster sync`.");
        Ok(())
    }
}
