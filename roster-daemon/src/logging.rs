//! Tracing subscriber setup for one-shot runs and the daemon.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use tracing_subscriber::fmt::writer::{MakeWriter, MakeWriterExt};
use tracing_subscriber::{fmt, EnvFilter};

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Human-readable logs on stderr; `RUST_LOG` overrides the `info` default.
pub fn init_tracing() {
    let _ = fmt()
        .with_env_filter(env_filter())
        .with_target(false)
        .try_init();
}

/// Daemon logging: stderr plus `daemon.log`, with warnings and errors also
/// copied to `daemon-err.log`.
pub fn init_daemon_tracing(home: &Path) {
    let writer = io::stderr
        .and(LogFile::new(crate::paths::stdout_log_path(home)))
        .and(LogFile::new(crate::paths::stderr_log_path(home)).with_max_level(tracing::Level::WARN));
    let _ = fmt()
        .with_env_filter(env_filter())
        .with_target(false)
        .with_ansi(false)
        .with_writer(writer)
        .try_init();
}

/// Appends each event to a file opened by path, so rotation never leaves the
/// subscriber writing into a renamed file.
#[derive(Debug, Clone)]
pub struct LogFile {
    path: PathBuf,
}

impl LogFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl<'a> MakeWriter<'a> for LogFile {
    type Writer = LogFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogFileWriter(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .ok(),
        )
    }
}

/// Writer for one event; discards output when the file could not be opened.
pub struct LogFileWriter(Option<File>);

impl io::Write for LogFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.0 {
            Some(file) => file.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.0 {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}
