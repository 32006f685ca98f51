//! `reposync config`: validate and show the effective configuration.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use reposync_core::config;

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Emit JSON instead of YAML.
    #[arg(long)]
    pub json: bool,
}

impl ConfigArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home()?;
        let effective = config::load_at(&home).context("invalid configuration")?;
        let shown = effective.redacted();

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&shown).context("failed to render config JSON")?
            );
        } else {
            print!(
                "{}",
                serde_yaml::to_string(&shown).context("failed to render config YAML")?
            );
            eprintln!("{} configuration is valid", "✓".green());
        }
        Ok(())
    }
}
