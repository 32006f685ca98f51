//! `reposync mirror`: hand one repository to the daemon's event intake.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use reposync_daemon::{request_mirror, DaemonError};

#[derive(Args, Debug)]
pub struct MirrorArgs {
    /// Repository name on the source account.
    pub name: String,

    /// URL the destination clones from.
    pub clone_url: String,
}

impl MirrorArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home()?;
        let result = match request_mirror(&home, &self.name, &self.clone_url) {
            Ok(result) => result,
            Err(DaemonError::DaemonNotRunning { .. }) => {
                anyhow::bail!("daemon is not running; start it with `reposync daemon start`")
            }
            Err(err) => {
                return Err(err).with_context(|| format!("failed to mirror '{}'", self.name))
            }
        };

        match result["outcome"].as_str() {
            Some("already_mirrored") => {
                println!("{} '{}' is already mirrored", "·".dimmed(), self.name)
            }
            _ => println!("{} '{}' mirrored", "✓".green(), self.name),
        }
        Ok(())
    }
}
