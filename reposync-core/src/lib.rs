//! reposync core library: domain types, configuration, errors.
//!
//! - [`types`]: repository references and mode enums
//! - [`config`]: YAML + environment configuration with validation
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::ConfigError;
pub use types::{LogFormat, MigrateMode, RepoName, RepositoryRef};
