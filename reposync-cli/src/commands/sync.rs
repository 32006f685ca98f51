//! `reposync sync`: one reconciliation pass in the running daemon.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde_json::Value;

use reposync_daemon::{request_sync, DaemonError};

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Emit the run summary as JSON.
    #[arg(long)]
    pub json: bool,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home()?;
        let summary = match request_sync(&home) {
            Ok(summary) => summary,
            Err(DaemonError::DaemonNotRunning { .. }) => {
                anyhow::bail!("daemon is not running; start it with `reposync daemon start`")
            }
            Err(err) => return Err(err).context("sync request failed"),
        };

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).context("failed to render summary JSON")?
            );
            return Ok(());
        }

        print_summary(&summary);
        Ok(())
    }
}

fn count(summary: &Value, key: &str) -> u64 {
    summary[key].as_u64().unwrap_or(0)
}

fn print_summary(summary: &Value) {
    if let Some(err) = summary["fetch_error"].as_str() {
        println!("{} source listing failed: {err}", "✗".red());
        return;
    }

    let failed: Vec<&str> = summary["failed"]
        .as_array()
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    println!(
        "{} {} fetched: {} created, {} absorbed, {} skipped, {} failed",
        if failed.is_empty() { "✓".green() } else { "!".yellow() },
        count(summary, "fetched"),
        count(summary, "created"),
        count(summary, "absorbed"),
        count(summary, "skipped"),
        failed.len(),
    );
    for name in failed {
        println!("  {} {name}", "✗".red());
    }
    println!("  {} repositories mirrored", count(summary, "mirrored_total"));
}
