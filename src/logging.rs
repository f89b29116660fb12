//! Tracing configuration and log routing.
//!
//! Logs always go to stdout. A second, ANSI-free copy goes to a file chosen by
//! [`LogOutput::from_env`]; the file writer is non-blocking so extraction runs never wait on disk.
use std::path::PathBuf;
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_LOG_PREFIX: &str = "inkread.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Where the file copy of the logs is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    /// Append to a fixed file (`INKREAD_LOG_FILE`).
    File(PathBuf),
    /// Daily-rotated files under a directory.
    Daily(PathBuf),
    /// Stdout only (`INKREAD_LOG_FILE=off`).
    StdoutOnly,
}

impl LogOutput {
    /// Resolve the file target from `INKREAD_LOG_FILE`.
    pub fn from_env() -> Self {
        Self::from_value(std::env::var("INKREAD_LOG_FILE").ok().as_deref())
    }

    fn from_value(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") => Self::Daily(PathBuf::from(DEFAULT_LOG_DIR)),
            Some(off) if off.eq_ignore_ascii_case("off") => Self::StdoutOnly,
            Some(path) => Self::File(PathBuf::from(path)),
        }
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` controls filtering and defaults to `info`. Calling this twice is harmless; the
/// second call keeps the first subscriber.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(false).compact();
    let file_layer = file_writer(&LogOutput::from_env()).map(|writer| {
        fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_ansi(false)
            .compact()
    });

    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init();
    if installed.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

fn file_writer(output: &LogOutput) -> Option<NonBlocking> {
    let (writer, guard) = match output {
        LogOutput::StdoutOnly => return None,
        LogOutput::File(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .inspect_err(|err| eprintln!("Failed to open log file {}: {err}", path.display()))
                .ok()?;
            tracing_appender::non_blocking(file)
        }
        LogOutput::Daily(dir) => {
            std::fs::create_dir_all(dir)
                .inspect_err(|err| {
                    eprintln!("Failed to create log directory {}: {err}", dir.display())
                })
                .ok()?;
            tracing_appender::non_blocking(tracing_appender::rolling::daily(
                dir,
                DEFAULT_LOG_PREFIX,
            ))
        }
    };
    let _ = LOG_GUARD.set(guard);
    Some(writer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_log_targets() {
        assert_eq!(
            LogOutput::from_value(None),
            LogOutput::Daily(PathBuf::from("logs"))
        );
        assert_eq!(
            LogOutput::from_value(Some("  ")),
            LogOutput::Daily(PathBuf::from("logs"))
        );
        assert_eq!(LogOutput::from_value(Some("OFF")), LogOutput::StdoutOnly);
        assert_eq!(
            LogOutput::from_value(Some("/tmp/inkread.log")),
            LogOutput::File(PathBuf::from("/tmp/inkread.log"))
        );
    }
}
