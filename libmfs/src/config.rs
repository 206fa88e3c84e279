use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MASTER_PORT: u16 = 9421;
pub const DEFAULT_MOUNT_DIR: &str = "/mnt";

/// Identity of one MooseFS handler. Fixed for the lifetime of the process.
///
/// ```yaml
/// master: mfsmaster.storage.svc
/// master_port: 9421
/// root_path: /
/// plugin_data_path: plugin-data
/// name: moosefs-csi
/// replica: { index: 3, count: 5 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MfsConfig {
    /// Address of the mfsmaster.
    pub master: String,
    #[serde(default = "default_master_port")]
    pub master_port: u16,
    /// Directory of the MooseFS namespace that gets mounted.
    #[serde(default = "default_root_path")]
    pub root_path: String,
    /// Plugin data directory, relative to `root_path`.
    #[serde(default)]
    pub plugin_data_path: String,
    pub name: String,
    /// Set when this handler is one of several homogeneous instances.
    #[serde(default)]
    pub replica: Option<Replica>,
    /// Parent directory of the host mount path.
    #[serde(default = "default_mount_dir")]
    pub mount_dir: PathBuf,
    #[serde(default = "default_true")]
    pub validate_volume_ids: bool,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl MfsConfig {
    pub fn new(master: impl Into<String>, name: impl Into<String>) -> Self {
        MfsConfig {
            master: master.into(),
            master_port: DEFAULT_MASTER_PORT,
            root_path: default_root_path(),
            plugin_data_path: String::new(),
            name: name.into(),
            replica: None,
            mount_dir: default_mount_dir(),
            validate_volume_ids: true,
            tools: ToolsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Mount source understood by mfsmount: `<master>:<port>:<root>`.
    pub fn mount_source(&self) -> String {
        format!("{}:{}:{}", self.master, self.master_port, self.root_path)
    }
}

/// Position of an instance among `count` replicas sharing the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replica {
    pub index: u32,
    pub count: u32,
}

impl Replica {
    pub fn new(index: u32, count: u32) -> Self {
        Replica { index, count }
    }

    /// Suffix appended to the handler name in the host mount path.
    /// The sole instance of a single-replica set keeps the bare name.
    pub fn mount_suffix(&self) -> String {
        if self.index == 0 && self.count == 1 {
            String::new()
        } else {
            format!("_{:02}", self.index)
        }
    }
}

/// Names (or paths) of the MooseFS client tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub get_quota: String,
    pub set_quota: String,
    pub make_snapshot: String,
    pub remove_snapshot: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        ToolsConfig {
            get_quota: "mfsgetquota".to_string(),
            set_quota: "mfssetquota".to_string(),
            make_snapshot: "mfsmakesnapshot".to_string(),
            remove_snapshot: "mfsrmsnapshot".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Hourly,
    #[default]
    Daily,
    Never,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    pub json: bool,
    pub rotation: LogRotation,
    /// Rotated files kept next to the active one.
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            json: false,
            rotation: LogRotation::Daily,
            max_files: 3,
        }
    }
}

pub fn load_config(path: impl AsRef<Path>) -> Result<MfsConfig> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    let cfg: MfsConfig = serde_yaml::from_str(&content).context("Failed to parse YAML config")?;
    Ok(cfg)
}

fn default_master_port() -> u16 {
    DEFAULT_MASTER_PORT
}

fn default_root_path() -> String {
    "/".to_string()
}

fn default_mount_dir() -> PathBuf {
    PathBuf::from(DEFAULT_MOUNT_DIR)
}

fn default_true() -> bool {
    true
}
