//! Domain types shared across reposync crates.
//!
//! All types are serializable/deserializable via serde; the source API wire
//! format (`name`, `clone_url`) is read directly into [`RepositoryRef`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Name of a source repository. Unique across the whole system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepoName(pub String);

impl RepoName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RepoName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for RepoName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RepoName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Repository reference
// ---------------------------------------------------------------------------

/// A repository on the source account: its name and the URL the destination
/// clones from. Any other fields the source API returns are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRef {
    pub name: RepoName,
    pub clone_url: String,
}

impl RepositoryRef {
    pub fn new(name: impl Into<RepoName>, clone_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            clone_url: clone_url.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Which intake paths the daemon wires up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrateMode {
    /// Interval-polled reconciliation only.
    #[default]
    Poll,
    /// Event-triggered mirroring only.
    Webhook,
    /// Both paths.
    Both,
}

impl MigrateMode {
    /// Whether the periodic scheduler runs in this mode.
    pub fn polls(self) -> bool {
        matches!(self, MigrateMode::Poll | MigrateMode::Both)
    }

    /// Whether the webhook endpoint is exposed in this mode.
    pub fn accepts_webhooks(self) -> bool {
        matches!(self, MigrateMode::Webhook | MigrateMode::Both)
    }
}

impl fmt::Display for MigrateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MigrateMode::Poll => "poll",
            MigrateMode::Webhook => "webhook",
            MigrateMode::Both => "both",
        };
        f.write_str(s)
    }
}

impl FromStr for MigrateMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "poll" => Ok(MigrateMode::Poll),
            "webhook" => Ok(MigrateMode::Webhook),
            "both" => Ok(MigrateMode::Both),
            other => Err(format!(
                "unknown migrate mode '{other}'; expected: poll, webhook, both"
            )),
        }
    }
}

/// Output format for daemon logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}'; expected: text, json")),
        }
    }
}
