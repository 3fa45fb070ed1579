use std::path::{Path, PathBuf};

pub use roster_core::config::roster_root;

pub const DAEMON_STDOUT_LOG: &str = "daemon.log";
pub const DAEMON_STDERR_LOG: &str = "daemon-err.log";
pub const DAEMON_SOCKET: &str = "daemon.sock";
pub const CYCLE_LOCK: &str = "cycle.lock";

pub fn run_dir(home: &Path) -> PathBuf {
    roster_root(home).join("run")
}

pub fn socket_path(home: &Path) -> PathBuf {
    roster_root(home).join(DAEMON_SOCKET)
}

/// Advisory lock file held for the duration of one applied cycle.
pub fn lease_path(home: &Path) -> PathBuf {
    run_dir(home).join(CYCLE_LOCK)
}

pub fn logs_dir(home: &Path) -> PathBuf {
    roster_root(home).join("logs")
}

pub fn stdout_log_path(home: &Path) -> PathBuf {
    logs_dir(home).join(DAEMON_STDOUT_LOG)
}

pub fn stderr_log_path(home: &Path) -> PathBuf {
    logs_dir(home).join(DAEMON_STDERR_LOG)
}
