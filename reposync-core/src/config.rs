//! Service configuration.
//!
//! # Resolution order
//!
//! 1. `<home>/.reposync/config.yaml` (or the file named by `REPOSYNC_CONFIG`);
//!    a missing file means "all defaults".
//! 2. Environment variables, which override individual file values:
//!    `GITEA_API_URL`, `GITEA_USER`, `GITEA_TOKEN`, `GITHUB_API_URL`,
//!    `GITHUB_USER`, `GITHUB_TOKEN`, `GH_RATE_LIMIT`, `PORT`,
//!    `POLLING_INTERVAL_MINUTES`, `MIGRATE_MODE`, `ENABLE_MIRROR`,
//!    `WEBHOOK_SECRET`, `LEDGER_PATH`, `REQUEST_TIMEOUT_SECS`, `LOG_FORMAT`.
//!    Numeric and boolean values that fail to parse are ignored.
//! 3. Validation. A config that fails validation is fatal at startup.
//!
//! # API pattern
//!
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! Tests use [`load_with`] to supply environment values without touching the
//! process environment.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};
use crate::types::{LogFormat, MigrateMode};

pub const DEFAULT_SOURCE_API_URL: &str = "https://api.github.com";
pub const DEFAULT_RATE_LIMIT_PER_HOUR: u32 = 4990;
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_POLLING_INTERVAL_MINUTES: u64 = 60;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const LEDGER_FILE: &str = "mirrored_repos.json";
pub const CONFIG_FILE: &str = "config.yaml";
pub const CONFIG_PATH_ENV: &str = "REPOSYNC_CONFIG";

const REDACTED: &str = "********";

// ---------------------------------------------------------------------------
// 1. Types
// ---------------------------------------------------------------------------

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub destination: DestinationConfig,
    pub source: SourceConfig,
    pub sync: SyncConfig,
    pub server: ServerConfig,
    pub log_format: LogFormat,
}

/// Destination (Gitea) account the mirrors are created under.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DestinationConfig {
    /// API base URL, e.g. `https://git.example.com/api/v1`.
    pub api_url: String,
    pub user: String,
    pub token: String,
}

/// Source (GitHub) account whose repositories are mirrored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub api_url: String,
    pub user: String,
    pub token: String,
    /// Outbound request quota against the source API.
    pub rate_limit_per_hour: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_SOURCE_API_URL.to_string(),
            user: String::new(),
            token: String::new(),
            rate_limit_per_hour: DEFAULT_RATE_LIMIT_PER_HOUR,
        }
    }
}

/// Reconciliation behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub mode: MigrateMode,
    pub polling_interval_minutes: u64,
    /// `true` keeps the destination syncing from the source after creation;
    /// `false` performs a one-shot import.
    pub enable_mirror: bool,
    pub request_timeout_secs: u64,
    /// Ledger document location. Defaults to `<home>/.reposync/mirrored_repos.json`.
    pub ledger_path: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            mode: MigrateMode::default(),
            polling_interval_minutes: DEFAULT_POLLING_INTERVAL_MINUTES,
            enable_mirror: true,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            ledger_path: None,
        }
    }
}

/// Webhook HTTP listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    /// Shared secret for `X-Hub-Signature-256` verification. Unset disables it.
    pub webhook_secret: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            webhook_secret: None,
        }
    }
}

impl Config {
    pub fn polling_interval(&self) -> Duration {
        Duration::from_secs(self.sync.polling_interval_minutes.saturating_mul(60))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.sync.request_timeout_secs)
    }

    /// Resolved ledger document path.
    pub fn ledger_path_at(&self, home: &Path) -> PathBuf {
        self.sync
            .ledger_path
            .clone()
            .unwrap_or_else(|| reposync_root(home).join(LEDGER_FILE))
    }

    /// Check every startup invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.destination.api_url.trim().is_empty() {
            return Err(ConfigError::Missing("GITEA_API_URL"));
        }
        if self.destination.user.trim().is_empty() {
            return Err(ConfigError::Missing("GITEA_USER"));
        }
        if self.destination.token.trim().is_empty() {
            return Err(ConfigError::Missing("GITEA_TOKEN"));
        }
        if self.source.user.trim().is_empty() {
            return Err(ConfigError::Missing("GITHUB_USER"));
        }
        if self.source.token.trim().is_empty() {
            return Err(ConfigError::Missing("GITHUB_TOKEN"));
        }
        if self.source.rate_limit_per_hour == 0 {
            return Err(ConfigError::Invalid {
                field: "GH_RATE_LIMIT",
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.sync.polling_interval_minutes == 0 {
            return Err(ConfigError::Invalid {
                field: "POLLING_INTERVAL_MINUTES",
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.sync.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "REQUEST_TIMEOUT_SECS",
                reason: "must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    /// Copy of this config with every credential replaced, for display.
    pub fn redacted(&self) -> Config {
        let mut copy = self.clone();
        if !copy.destination.token.is_empty() {
            copy.destination.token = REDACTED.to_string();
        }
        if !copy.source.token.is_empty() {
            copy.source.token = REDACTED.to_string();
        }
        if copy.server.webhook_secret.is_some() {
            copy.server.webhook_secret = Some(REDACTED.to_string());
        }
        copy
    }

    /// Apply environment overrides from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        override_string(&lookup, "GITEA_API_URL", &mut self.destination.api_url);
        override_string(&lookup, "GITEA_USER", &mut self.destination.user);
        override_string(&lookup, "GITEA_TOKEN", &mut self.destination.token);
        override_string(&lookup, "GITHUB_API_URL", &mut self.source.api_url);
        override_string(&lookup, "GITHUB_USER", &mut self.source.user);
        override_string(&lookup, "GITHUB_TOKEN", &mut self.source.token);
        override_parsed(&lookup, "GH_RATE_LIMIT", &mut self.source.rate_limit_per_hour);
        override_parsed(&lookup, "PORT", &mut self.server.port);
        override_parsed(
            &lookup,
            "POLLING_INTERVAL_MINUTES",
            &mut self.sync.polling_interval_minutes,
        );
        override_parsed(&lookup, "REQUEST_TIMEOUT_SECS", &mut self.sync.request_timeout_secs);
        if let Some(raw) = lookup("ENABLE_MIRROR") {
            if let Some(flag) = parse_bool(&raw) {
                self.sync.enable_mirror = flag;
            }
        }
        if let Some(raw) = lookup("MIGRATE_MODE") {
            self.sync.mode = MigrateMode::from_str(&raw).map_err(|reason| {
                ConfigError::Invalid {
                    field: "MIGRATE_MODE",
                    reason,
                }
            })?;
        }
        if let Some(raw) = lookup("LOG_FORMAT") {
            if let Ok(format) = LogFormat::from_str(&raw) {
                self.log_format = format;
            }
        }
        if let Some(secret) = lookup("WEBHOOK_SECRET").filter(|s| !s.is_empty()) {
            self.server.webhook_secret = Some(secret);
        }
        if let Some(path) = lookup("LEDGER_PATH").filter(|s| !s.is_empty()) {
            self.sync.ledger_path = Some(PathBuf::from(path));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// 2. Paths
// ---------------------------------------------------------------------------

/// `<home>/.reposync/`
pub fn reposync_root(home: &Path) -> PathBuf {
    home.join(".reposync")
}

/// `<home>/.reposync/config.yaml`: pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    reposync_root(home).join(CONFIG_FILE)
}

// ---------------------------------------------------------------------------
// 3. Load
// ---------------------------------------------------------------------------

/// Parse a config file without overrides or validation.
///
/// Returns defaults if the file does not exist.
pub fn read_file(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Config file location: `REPOSYNC_CONFIG` if set, else the default path.
pub fn resolve_path_with<F>(home: &Path, lookup: &F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    lookup(CONFIG_PATH_ENV)
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| config_path_at(home))
}

/// Read and override without validating. For read-only tooling that does
/// not need credentials.
pub fn resolve_with<F>(home: &Path, lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = read_file(&resolve_path_with(home, &lookup))?;
    config.apply_overrides(&lookup)?;
    Ok(config)
}

/// Load, override, and validate using `lookup` as the environment.
pub fn load_with<F>(home: &Path, lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let config = resolve_with(home, lookup)?;
    config.validate()?;
    Ok(config)
}

/// Load, override from the process environment, and validate.
pub fn load_at(home: &Path) -> Result<Config, ConfigError> {
    load_with(home, |key| std::env::var(key).ok())
}

/// `resolve_with` over the process environment.
pub fn resolve_at(home: &Path) -> Result<Config, ConfigError> {
    resolve_with(home, |key| std::env::var(key).ok())
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<Config, ConfigError> {
    load_at(&home()?)
}

/// Home directory used by the convenience wrappers.
pub fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

// ---------------------------------------------------------------------------
// 4. Helpers
// ---------------------------------------------------------------------------

fn override_string<F>(lookup: &F, key: &str, target: &mut String)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup(key) {
        *target = value;
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(value) = lookup(key).and_then(|raw| raw.trim().parse::<T>().ok()) {
        *target = value;
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "yes" | "on" => Some(true),
        "0" | "f" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
