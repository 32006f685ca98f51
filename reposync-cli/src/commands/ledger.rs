//! `reposync ledger`: read the mirrored-repository document directly.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use reposync_ledger::Ledger;

#[derive(Args, Debug)]
pub struct LedgerArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct LedgerJson {
    path: String,
    count: usize,
    repositories: Vec<String>,
}

#[derive(Tabled)]
struct LedgerRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "repository")]
    name: String,
}

impl LedgerArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home()?;
        let config = reposync_core::config::resolve_at(&home).context("failed to load config")?;
        let path = config.ledger_path_at(&home);

        let names: Vec<String> = Ledger::read(&path)
            .with_context(|| format!("failed to read ledger at {}", path.display()))?
            .map(|record| record.into_keys().collect())
            .unwrap_or_default();

        if self.json {
            let payload = LedgerJson {
                path: path.display().to_string(),
                count: names.len(),
                repositories: names,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to render ledger JSON")?
            );
            return Ok(());
        }

        if names.is_empty() {
            println!("No repositories mirrored yet ({}).", path.display());
            return Ok(());
        }

        let rows: Vec<LedgerRow> = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| LedgerRow {
                index: i + 1,
                name,
            })
            .collect();
        let count = rows.len();
        println!("{}", Table::new(rows).with(Style::rounded()));
        println!("{count} repositories mirrored");
        Ok(())
    }
}
