use std::fmt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::ToolsConfig;
use crate::error::{MfsError, QuotaParseError, Result};
use crate::exec::{CommandRunner, run_tool};

const QUOTA_LIMIT_FLAG: &str = "-L";
const QUOTA_LIMIT_ROW: usize = 2;
const QUOTA_LIMIT_COL: usize = 3;
const QUOTA_MIN_COLS: usize = 5;
const NO_LIMIT_TOKEN: &str = "-";

/// Hard size limit reported by the quota tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaLimit {
    /// The tools print `-` when no limit is configured.
    Unlimited,
    Bytes(i64),
}

impl QuotaLimit {
    pub fn bytes(self) -> Option<i64> {
        match self {
            QuotaLimit::Unlimited => None,
            QuotaLimit::Bytes(n) => Some(n),
        }
    }

    /// Legacy encoding where `-1` stands for "no limit".
    pub fn as_raw(self) -> i64 {
        self.bytes().unwrap_or(-1)
    }
}

impl fmt::Display for QuotaLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuotaLimit::Unlimited => f.write_str(NO_LIMIT_TOKEN),
            QuotaLimit::Bytes(n) => write!(f, "{n}"),
        }
    }
}

/// Reads the hard limit out of an `mfsgetquota`/`mfssetquota` report.
///
/// The report is a fixed-format table; the limit sits in the third line,
/// fourth `|`-separated field:
///
/// ```text
/// plugin/volumes/v1: (current values | soft quota | hard quota) ; ...
///  inodes   |       1 |       - |       - |       - |
///  length   |       0 |       - | 1073741824 |     - |
/// ```
pub fn parse_quota_output(output: &str) -> std::result::Result<QuotaLimit, QuotaParseError> {
    let lines: Vec<&str> = output.split('\n').collect();
    if lines.len() <= QUOTA_LIMIT_ROW {
        return Err(QuotaParseError::TooFewRows {
            row: QUOTA_LIMIT_ROW,
            found: lines.len(),
            output: output.to_string(),
        });
    }

    let cols: Vec<&str> = lines[QUOTA_LIMIT_ROW].split('|').collect();
    if cols.len() < QUOTA_MIN_COLS {
        return Err(QuotaParseError::TooFewColumns {
            expected: QUOTA_MIN_COLS,
            found: cols.len(),
            output: output.to_string(),
        });
    }

    let value = cols[QUOTA_LIMIT_COL].trim();
    if value == NO_LIMIT_TOKEN {
        return Ok(QuotaLimit::Unlimited);
    }
    value
        .parse::<i64>()
        .map(QuotaLimit::Bytes)
        .map_err(|source| QuotaParseError::InvalidLimit {
            value: value.to_string(),
            source,
            output: output.to_string(),
        })
}

/// Result of a quota tool run: the parsed limit and the raw report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaReport {
    pub limit: QuotaLimit,
    pub output: String,
}

/// Drives the MooseFS quota tools from inside the host mount path.
#[derive(Debug, Clone)]
pub struct QuotaTool {
    get_cmd: String,
    set_cmd: String,
    work_dir: PathBuf,
}

impl QuotaTool {
    pub fn new(tools: &ToolsConfig, work_dir: impl Into<PathBuf>) -> Self {
        QuotaTool {
            get_cmd: tools.get_quota.clone(),
            set_cmd: tools.set_quota.clone(),
            work_dir: work_dir.into(),
        }
    }

    pub fn get_cmd(&self) -> &str {
        &self.get_cmd
    }

    pub fn set_cmd(&self) -> &str {
        &self.set_cmd
    }

    pub fn get<R: CommandRunner + ?Sized>(&self, runner: &R, path: &Path) -> Result<QuotaReport> {
        let args = vec![path_arg(path)];
        self.invoke(runner, &self.get_cmd, &args)
    }

    /// Sets the hard limit. Non-positive limits are rejected before any
    /// process is started.
    pub fn set<R: CommandRunner + ?Sized>(
        &self,
        runner: &R,
        path: &Path,
        limit: i64,
    ) -> Result<QuotaReport> {
        if limit <= 0 {
            return Err(MfsError::InvalidQuota(limit));
        }
        let args = vec![
            QUOTA_LIMIT_FLAG.to_string(),
            limit.to_string(),
            path_arg(path),
        ];
        self.invoke(runner, &self.set_cmd, &args)
    }

    fn invoke<R: CommandRunner + ?Sized>(
        &self,
        runner: &R,
        program: &str,
        args: &[String],
    ) -> Result<QuotaReport> {
        let output = run_tool(runner, program, args, &self.work_dir)?;
        let limit = parse_quota_output(&output)?;
        debug!("{program} {args:?} reported limit {limit}");
        Ok(QuotaReport { limit, output })
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
