//! Roster — keep the client dashboard sheet in step with the client store.
//!
//! # Usage
//!
//! ```text
//! roster init [--force]
//! roster sync [--dry-run]
//! roster plan [--json]
//! roster status [--json]
//! roster daemon start|stop|status|sync [--dry-run]|logs [--lines N] [--stderr-only]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    daemon::DaemonCommand, init::InitArgs, plan::PlanArgs, status::StatusArgs, sync::SyncArgs,
};

#[derive(Parser, Debug)]
#[command(
    name = "roster",
    version,
    about = "Mirror the client roster into the shared dashboard sheet",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write the default config to ~/.roster/config.yaml.
    Init(InitArgs),

    /// Run one reconciliation cycle now.
    Sync(SyncArgs),

    /// Show the mutations the next cycle would make, without writing.
    Plan(PlanArgs),

    /// Show the last persisted cycle report.
    Status(StatusArgs),

    /// Run or control the background scheduler.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Init(args) => args.run(),
        Commands::Sync(args) => args.run(),
        Commands::Plan(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::Daemon { command } => commands::daemon::run(command),
    }
}
