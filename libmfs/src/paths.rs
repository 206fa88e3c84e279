// MfsPaths maps volume ids to locations on the host mount and inside the
// MooseFS namespace.
//
// The layout under the host mount path is roughly as follows:
//
//	<mount_dir>/<name>[_NN]
//	└── <plugin_data_path>
//	    ├── volumes
//	    │   └── <volume id>
//	    ├── mount_volumes
//	    │   └── <volume id>
//	    └── logs
//	        └── <name>.log
//
// The quota tools are run from inside the host mount path and take paths
// relative to it, so `mfs_volume` omits the host prefix.

use std::path::{Path, PathBuf};

use crate::config::{MfsConfig, Replica};

const VOLUMES_DIR: &str = "volumes";
const MOUNT_VOLUMES_DIR: &str = "mount_volumes";
const LOGS_DIR: &str = "logs";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MfsPaths {
    host_mount_path: PathBuf,
    plugin_data_path: PathBuf,
}

impl MfsPaths {
    pub fn new(host_mount_path: PathBuf, plugin_data_path: &str) -> Self {
        MfsPaths {
            host_mount_path,
            plugin_data_path: join_segments(PathBuf::new(), [plugin_data_path]),
        }
    }

    pub fn from_config(config: &MfsConfig) -> Self {
        let host = host_mount_path(&config.mount_dir, &config.name, config.replica);
        MfsPaths::new(host, &config.plugin_data_path)
    }

    /// Where the MooseFS namespace is mounted on this host.
    pub fn host_mount_path(&self) -> &Path {
        &self.host_mount_path
    }

    /// Returns `<host mount>/<plugin data>`.
    pub fn host_plugin_data(&self) -> PathBuf {
        join_segments(self.host_mount_path.clone(), [self.plugin_data_str()])
    }

    /// Returns `<host mount>/<plugin data>/volumes/<id>`.
    pub fn host_volume(&self, volume_id: &str) -> PathBuf {
        join_segments(self.host_plugin_data(), [VOLUMES_DIR, volume_id])
    }

    /// Returns `<host mount>/<plugin data>/mount_volumes/<id>`.
    pub fn host_mount_volume(&self, volume_id: &str) -> PathBuf {
        join_segments(self.host_plugin_data(), [MOUNT_VOLUMES_DIR, volume_id])
    }

    /// Returns `<plugin data>/volumes/<id>`, relative to the host mount.
    pub fn mfs_volume(&self, volume_id: &str) -> PathBuf {
        join_segments(self.plugin_data_path.clone(), [VOLUMES_DIR, volume_id])
    }

    /// Returns `<host mount>/<plugin data>/logs`.
    pub fn host_logs(&self) -> PathBuf {
        join_segments(self.host_plugin_data(), [LOGS_DIR])
    }

    /// Returns `<host mount>/<relative>`.
    pub fn host_path_to(&self, relative: &str) -> PathBuf {
        join_segments(self.host_mount_path.clone(), [relative])
    }

    fn plugin_data_str(&self) -> &str {
        self.plugin_data_path.to_str().unwrap_or_default()
    }
}

/// `<mount_dir>/<name>` or `<mount_dir>/<name>_<NN>` for replicated handlers.
pub fn host_mount_path(mount_dir: &Path, name: &str, replica: Option<Replica>) -> PathBuf {
    let suffix = replica.map(|r| r.mount_suffix()).unwrap_or_default();
    join_segments(mount_dir.to_path_buf(), [format!("{name}{suffix}").as_str()])
}

// PathBuf::join replaces the whole path when handed an absolute segment, so
// leading and trailing separators are stripped first. `..` is kept as is.
fn join_segments<'a>(mut base: PathBuf, segments: impl IntoIterator<Item = &'a str>) -> PathBuf {
    for segment in segments {
        for part in segment.split('/').filter(|p| !p.is_empty()) {
            base.push(part);
        }
    }
    base
}
