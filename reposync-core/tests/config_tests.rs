//! Config file + environment override + validation integration tests.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use assert_fs::prelude::*;
use reposync_core::{config, ConfigError, LogFormat, MigrateMode};
use rstest::rstest;

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

fn required_env() -> Vec<(&'static str, &'static str)> {
    vec![
        ("GITEA_API_URL", "https://git.example.com/api/v1"),
        ("GITEA_USER", "mirror-bot"),
        ("GITEA_TOKEN", "gitea-token"),
        ("GITHUB_USER", "octocat"),
        ("GITHUB_TOKEN", "ghp_token"),
    ]
}

fn write_config(home: &assert_fs::TempDir, yaml: &str) {
    let dir = home.path().join(".reposync");
    fs::create_dir_all(&dir).expect("mkdir");
    fs::write(dir.join("config.yaml"), yaml).expect("write config");
}

// ---------------------------------------------------------------------------
// 1. Defaults and env-only configuration
// ---------------------------------------------------------------------------

#[test]
fn env_only_config_uses_defaults_for_everything_else() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let cfg = config::load_with(home.path(), env(&required_env())).expect("load");

    assert_eq!(cfg.destination.user, "mirror-bot");
    assert_eq!(cfg.source.api_url, "https://api.github.com");
    assert_eq!(cfg.source.rate_limit_per_hour, 4990);
    assert_eq!(cfg.server.port, 8080);
    assert_eq!(cfg.sync.polling_interval_minutes, 60);
    assert_eq!(cfg.sync.mode, MigrateMode::Poll);
    assert!(cfg.sync.enable_mirror);
    assert_eq!(cfg.log_format, LogFormat::Text);
    assert_eq!(
        cfg.ledger_path_at(home.path()),
        home.path().join(".reposync").join("mirrored_repos.json")
    );
}

#[test]
fn file_values_are_loaded() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    write_config(
        &home,
        r#"
destination:
  api_url: https://git.example.com/api/v1
  user: mirror-bot
  token: from-file
source:
  user: octocat
  token: ghp_file
  rate_limit_per_hour: 1200
sync:
  mode: both
  polling_interval_minutes: 15
  enable_mirror: false
  ledger_path: /var/lib/reposync/ledger.json
server:
  port: 9000
log_format: json
"#,
    );

    let cfg = config::load_with(home.path(), env(&[])).expect("load");
    assert_eq!(cfg.destination.token, "from-file");
    assert_eq!(cfg.source.rate_limit_per_hour, 1200);
    assert_eq!(cfg.sync.mode, MigrateMode::Both);
    assert_eq!(cfg.sync.polling_interval_minutes, 15);
    assert!(!cfg.sync.enable_mirror);
    assert_eq!(cfg.server.port, 9000);
    assert_eq!(cfg.log_format, LogFormat::Json);
    assert_eq!(
        cfg.ledger_path_at(home.path()),
        PathBuf::from("/var/lib/reposync/ledger.json")
    );
}

#[test]
fn env_overrides_file_values() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    write_config(
        &home,
        "destination:\n  api_url: https://file.example.com\n  user: u\n  token: t\nsource:\n  user: s\n  token: st\n",
    );

    let mut vars = vec![("GITEA_API_URL", "https://env.example.com"), ("PORT", "7070")];
    vars.push(("ENABLE_MIRROR", "false"));
    let cfg = config::load_with(home.path(), env(&vars)).expect("load");
    assert_eq!(cfg.destination.api_url, "https://env.example.com");
    assert_eq!(cfg.server.port, 7070);
    assert!(!cfg.sync.enable_mirror);
}

#[test]
fn unparseable_numbers_fall_back_to_previous_value() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let mut vars = required_env();
    vars.push(("GH_RATE_LIMIT", "lots"));
    vars.push(("PORT", "-1"));
    let cfg = config::load_with(home.path(), env(&vars)).expect("load");
    assert_eq!(cfg.source.rate_limit_per_hour, 4990);
    assert_eq!(cfg.server.port, 8080);
}

#[test]
fn config_path_env_points_at_alternate_file() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let alt = home.child("elsewhere.yaml");
    alt.write_str("server:\n  port: 9443\n").expect("write");

    let mut vars: Vec<(&str, &str)> = required_env();
    let alt_path = alt.path().display().to_string();
    vars.push(("REPOSYNC_CONFIG", alt_path.as_str()));
    let cfg = config::load_with(home.path(), env(&vars)).expect("load");
    assert_eq!(cfg.server.port, 9443);
}

// ---------------------------------------------------------------------------
// 2. Validation
// ---------------------------------------------------------------------------

#[rstest]
#[case("GITEA_API_URL")]
#[case("GITEA_USER")]
#[case("GITEA_TOKEN")]
#[case("GITHUB_USER")]
#[case("GITHUB_TOKEN")]
fn missing_required_value_is_reported_by_name(#[case] missing: &str) {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let vars: Vec<_> = required_env()
        .into_iter()
        .filter(|(k, _)| *k != missing)
        .collect();

    let err = config::load_with(home.path(), env(&vars)).unwrap_err();
    assert!(matches!(err, ConfigError::Missing(name) if name == missing), "got: {err}");
    assert_eq!(err.to_string(), format!("{missing} is required"));
}

#[rstest]
#[case("GH_RATE_LIMIT")]
#[case("POLLING_INTERVAL_MINUTES")]
#[case("REQUEST_TIMEOUT_SECS")]
fn zero_quantities_are_rejected(#[case] key: &str) {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let mut vars: Vec<(&str, &str)> = required_env();
    vars.push((key, "0"));

    let err = config::load_with(home.path(), env(&vars)).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { field, .. } if field == key), "got: {err}");
}

#[test]
fn unknown_migrate_mode_is_rejected() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let mut vars = required_env();
    vars.push(("MIGRATE_MODE", "hourly"));

    let err = config::load_with(home.path(), env(&vars)).unwrap_err();
    assert!(err.to_string().contains("MIGRATE_MODE"), "got: {err}");
}

#[test]
fn corrupt_yaml_returns_parse_error_with_path() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    write_config(&home, "destination: [unclosed\n  - broken: {");

    let err = config::load_with(home.path(), env(&required_env())).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("config.yaml"));
}

#[test]
fn resolve_skips_validation_but_applies_overrides() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let custom = home.path().join("ledger.json");
    let custom_str = custom.to_str().expect("utf8 path").to_string();

    let cfg = config::resolve_with(home.path(), env(&[("LEDGER_PATH", custom_str.as_str())]))
        .expect("resolve without credentials");
    assert!(cfg.validate().is_err());
    assert_eq!(cfg.ledger_path_at(home.path()), custom);
}
