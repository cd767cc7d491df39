//! Rollsheet: keep spreadsheet mirrors of roster lists in sync.
//!
//! # Usage
//!
//! ```text
//! rollsheet init [--force]
//! rollsheet binding add <list> <mirror> --owner <credential> [--tab <id>]
//! rollsheet binding list [--list <list>] [--json]
//! rollsheet binding remove <binding>
//! rollsheet notify added|updated <list> <member.json>
//! rollsheet notify removed <list> <member-id>
//! rollsheet notify changed <member.json>
//! rollsheet resync <list> <binding>
//! rollsheet daemon status|stop
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    binding::BindingCommand, daemon::DaemonCommand, init::InitArgs, notify::NotifyCommand,
    notify::ResyncArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "rollsheet",
    version,
    about = "Mirror roster lists into spreadsheets",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write the default configuration to ~/.rollsheet/config.yaml.
    Init(InitArgs),

    /// Manage list-to-mirror bindings.
    Binding {
        #[command(subcommand)]
        command: BindingCommand,
    },

    /// Deliver a roster event to the running daemon.
    Notify {
        #[command(subcommand)]
        command: NotifyCommand,
    },

    /// Rewrite one binding's mirror from the roster.
    Resync(ResyncArgs),

    /// Query or stop the running daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Init(args) => args.run(),
        Commands::Binding { command } => commands::binding::run(command),
        Commands::Notify { command } => commands::notify::run(command),
        Commands::Resync(args) => args.run(),
        Commands::Daemon { command } => commands::daemon::run(command),
    }
}
