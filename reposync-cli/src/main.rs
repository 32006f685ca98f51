//! reposync: keep a Gitea instance mirroring every GitHub repository.
//!
//! # Usage
//!
//! ```text
//! reposync daemon start|stop|status
//! reposync sync [--json]
//! reposync mirror <name> <clone_url>
//! reposync ledger [--json]
//! reposync config
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    config::ConfigArgs, daemon::DaemonCommand, ledger::LedgerArgs, mirror::MirrorArgs,
    sync::SyncArgs,
};

#[derive(Parser, Debug)]
#[command(
    name = "reposync",
    version,
    about = "Mirror GitHub repositories into Gitea",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run or control the mirror daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },

    /// Ask the running daemon for one reconciliation pass now.
    Sync(SyncArgs),

    /// Ask the running daemon to mirror a single repository.
    Mirror(MirrorArgs),

    /// List repositories recorded as mirrored.
    Ledger(LedgerArgs),

    /// Validate and print the effective configuration.
    Config(ConfigArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Daemon { command } => commands::daemon::run(command),
        Commands::Sync(args) => args.run(),
        Commands::Mirror(args) => args.run(),
        Commands::Ledger(args) => args.run(),
        Commands::Config(args) => args.run(),
    }
}
