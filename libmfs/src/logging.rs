//! Log setup for processes embedding the handler.
//!
//! Everything goes to stderr. A [`LogSink`] obtained from
//! [`MfsHandler::log_sink`](crate::MfsHandler::log_sink) adds a rotating
//! file inside the MooseFS mount, so logs of all driver instances end up
//! in one place.

use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::config::{LogRotation, LoggingConfig};
use crate::error::MfsError;

const LOG_FILE_SUFFIX: &str = "log";

/// Non-blocking writer into a rotating log file.
///
/// The guard flushes pending lines when dropped; keep it alive for the
/// lifetime of the process.
pub struct LogSink {
    writer: NonBlocking,
    guard: WorkerGuard,
}

impl LogSink {
    pub fn into_parts(self) -> (NonBlocking, WorkerGuard) {
        (self.writer, self.guard)
    }
}

/// Opens `<dir>/<name>.log` with the rotation policy of `config`.
pub fn rolling_sink(dir: &Path, name: &str, config: &LoggingConfig) -> crate::Result<LogSink> {
    let appender = RollingFileAppender::builder()
        .rotation(rotation(config.rotation))
        .filename_prefix(name)
        .filename_suffix(LOG_FILE_SUFFIX)
        // the active file counts as one
        .max_log_files(config.max_files + 1)
        .build(dir)
        .map_err(|source| MfsError::LogSink {
            dir: dir.to_path_buf(),
            source,
        })?;
    let (writer, guard) = tracing_appender::non_blocking(appender);
    Ok(LogSink { writer, guard })
}

/// Installs the global subscriber. `RUST_LOG` overrides `config.level`.
pub fn init(config: &LoggingConfig, sink: Option<LogSink>) -> Result<Option<WorkerGuard>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .with_context(|| format!("Invalid log level {}", config.level))?,
    };

    let mut layers = vec![fmt_layer(config.json, std::io::stderr, true)];
    let guard = match sink {
        Some(sink) => {
            let (writer, guard) = sink.into_parts();
            layers.push(fmt_layer(config.json, writer, false));
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .context("Failed to install tracing subscriber")?;
    Ok(guard)
}

fn fmt_layer<W>(json: bool, writer: W, ansi: bool) -> Box<dyn Layer<Registry> + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer().with_writer(writer).with_ansi(ansi);
    if json {
        layer.json().boxed()
    } else {
        layer.boxed()
    }
}

fn rotation(rotation: LogRotation) -> Rotation {
    match rotation {
        LogRotation::Hourly => Rotation::HOURLY,
        LogRotation::Daily => Rotation::DAILY,
        LogRotation::Never => Rotation::NEVER,
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io::Write;

    use super::*;

    #[test]
    fn test_rolling_sink_writes_named_file() {
        let tmp = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            rotation: LogRotation::Never,
            ..Default::default()
        };

        let sink = rolling_sink(tmp.path(), "pvc1", &config).unwrap();
        let (mut writer, guard) = sink.into_parts();
        writer.write_all(b"hello from mfs\n").unwrap();
        drop(writer);
        drop(guard);

        let content = fs::read_to_string(tmp.path().join("pvc1.log")).unwrap();
        assert_eq!(content, "hello from mfs\n");
    }

    #[test]
    fn test_rotation_mapping() {
        assert_eq!(rotation(LogRotation::Hourly), Rotation::HOURLY);
        assert_eq!(rotation(LogRotation::Daily), Rotation::DAILY);
        assert_eq!(rotation(LogRotation::Never), Rotation::NEVER);
    }
}
