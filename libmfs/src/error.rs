use std::io;
use std::num::ParseIntError;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MfsError>;

#[derive(Debug, Error)]
pub enum MfsError {
    #[error("quota size must be positive, got {0}")]
    InvalidQuota(i64),

    #[error("invalid volume id {id:?}: {reason}")]
    InvalidVolumeId { id: String, reason: &'static str },

    #[error("failed to {op} {}: {source}", .path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to execute {command} {args:?}: {source}")]
    ToolSpawn {
        command: String,
        args: Vec<String>,
        #[source]
        source: io::Error,
    },

    #[error("command {command} {args:?} exited with {status}; output: {output}")]
    ToolExit {
        command: String,
        args: Vec<String>,
        status: String,
        output: String,
    },

    #[error(transparent)]
    QuotaParse(#[from] QuotaParseError),

    #[error("quota for volume {volume_id} is not set or {command} output is incorrect; output: {output}")]
    QuotaNotSet {
        volume_id: String,
        command: String,
        output: String,
    },

    #[error("failed to read mount table: {0}")]
    MountTable(#[from] procfs::ProcError),

    #[error("failed to set up log file in {}: {source}", .dir.display())]
    LogSink {
        dir: PathBuf,
        #[source]
        source: tracing_appender::rolling::InitError,
    },

    #[error("failed to unmount {}: {source}", .target.display())]
    Umount {
        target: PathBuf,
        #[source]
        source: nix::errno::Errno,
    },
}

impl MfsError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        MfsError::Io {
            op,
            path: path.into(),
            source,
        }
    }
}

/// Ways the tabular report of the quota tools can fail to parse.
#[derive(Debug, Error)]
pub enum QuotaParseError {
    #[error("quota tool output has {found} rows, expected more than {row}; output: {output}")]
    TooFewRows {
        row: usize,
        found: usize,
        output: String,
    },

    #[error("quota tool output row has {found} columns, expected at least {expected}; output: {output}")]
    TooFewColumns {
        expected: usize,
        found: usize,
        output: String,
    },

    #[error("quota limit {value:?} is not a number: {source}; output: {output}")]
    InvalidLimit {
        value: String,
        #[source]
        source: ParseIntError,
        output: String,
    },
}
