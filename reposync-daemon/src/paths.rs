use std::path::{Path, PathBuf};
use std::time::Duration;

pub use reposync_core::config::reposync_root;

pub const DAEMON_SOCKET: &str = "daemon.sock";

/// How long shutdown waits for in-flight webhook requests before cancelling
/// their remote calls. Reconciliation passes are never cut short.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(15);

pub fn run_dir(home: &Path) -> PathBuf {
    reposync_root(home).join("run")
}

pub fn socket_path(home: &Path) -> PathBuf {
    run_dir(home).join(DAEMON_SOCKET)
}
