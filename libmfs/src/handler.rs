//! Volume lifecycle on top of a MooseFS mount.
//!
//! [`MfsHandler`] owns the identity of one MooseFS client mount and exposes
//! the operations a storage driver needs: volume directories with quotas,
//! snapshots, and the mount / bind-mount reconciliation. It keeps no mount
//! state of its own; the host mount table is consulted before every change.

use std::fs::{self, DirBuilder};
use std::io::ErrorKind;
use std::os::unix::fs::DirBuilderExt;
use std::path::Path;

use tracing::{error, info, warn};

use crate::config::{LoggingConfig, MfsConfig, ToolsConfig};
use crate::error::{MfsError, Result};
use crate::exec::{CommandRunner, SystemRunner, run_tool};
use crate::logging::{self, LogSink};
use crate::mount::{BIND_OPTION, MFS_FS_TYPE, MountState, Mounter, SystemMounter};
use crate::paths::MfsPaths;
use crate::quota::{QuotaLimit, QuotaReport, QuotaTool};

const NEW_VOLUME_MODE: u32 = 0o755;

pub struct MfsHandler<R = SystemRunner, M = SystemMounter> {
    config: MfsConfig,
    paths: MfsPaths,
    quota: QuotaTool,
    runner: R,
    mounter: M,
}

impl MfsHandler {
    /// Handler backed by the real MooseFS tools and the host mount table.
    pub fn new(config: MfsConfig) -> Self {
        MfsHandler::with_parts(config, SystemRunner, SystemMounter::new())
    }
}

impl<R: CommandRunner, M: Mounter> MfsHandler<R, M> {
    pub fn with_parts(config: MfsConfig, runner: R, mounter: M) -> Self {
        let paths = MfsPaths::from_config(&config);
        let quota = QuotaTool::new(&config.tools, paths.host_mount_path());
        MfsHandler {
            config,
            paths,
            quota,
            runner,
            mounter,
        }
    }

    pub fn config(&self) -> &MfsConfig {
        &self.config
    }

    pub fn paths(&self) -> &MfsPaths {
        &self.paths
    }

    pub fn host_mount_path(&self) -> &Path {
        self.paths.host_mount_path()
    }

    fn tools(&self) -> &ToolsConfig {
        &self.config.tools
    }

    /// Rotating file sink for `<logs>/<name>.log` inside the mount.
    pub fn log_sink(&self, config: &LoggingConfig) -> Result<LogSink> {
        let dir = self.paths.host_logs();
        info!("Setting up mfs logging in {}", dir.display());
        create_dir_all(&dir)?;
        logging::rolling_sink(&dir, &self.config.name, config)
    }

    pub fn volume_exists(&self, volume_id: &str) -> Result<bool> {
        self.check_volume_id(volume_id)?;
        path_exists(&self.paths.host_volume(volume_id))
    }

    pub fn mount_volume_exists(&self, volume_id: &str) -> Result<bool> {
        self.check_volume_id(volume_id)?;
        path_exists(&self.paths.host_mount_volume(volume_id))
    }

    pub fn create_mount_volume(&self, volume_id: &str) -> Result<()> {
        self.check_volume_id(volume_id)?;
        create_dir_all(&self.paths.host_mount_volume(volume_id))
    }

    /// Creates the volume directory and applies `size` as its quota.
    ///
    /// A size of 0 leaves the volume unlimited and returns 0. Otherwise the
    /// limit confirmed by the quota tool is returned, which is not always
    /// the requested size.
    pub fn create_volume(&self, volume_id: &str, size: i64) -> Result<i64> {
        self.check_volume_id(volume_id)?;
        info!("CreateVolume - volumeId: {volume_id}, size: {size}");
        create_dir_all(&self.paths.host_volume(volume_id))?;
        if size == 0 {
            return Ok(0);
        }
        self.set_quota(volume_id, size)
    }

    pub fn delete_volume(&self, volume_id: &str) -> Result<()> {
        self.check_volume_id(volume_id)?;
        let path = self.paths.host_volume(volume_id);
        remove_all(&path).inspect_err(|e| {
            error!(
                "DeleteVolume - couldn't remove volume {volume_id} in directory {}: {e}",
                path.display()
            )
        })
    }

    pub fn get_quota(&self, volume_id: &str) -> Result<i64> {
        self.check_volume_id(volume_id)?;
        info!("GetQuota - volumeId: {volume_id}");
        let report = self.quota.get(&self.runner, &self.paths.mfs_volume(volume_id))?;
        self.require_limit(volume_id, self.quota.get_cmd(), report)
    }

    pub fn set_quota(&self, volume_id: &str, size: i64) -> Result<i64> {
        self.check_volume_id(volume_id)?;
        info!("SetQuota - volumeId: {volume_id}, size: {size}");
        let report = self
            .quota
            .set(&self.runner, &self.paths.mfs_volume(volume_id), size)?;
        self.require_limit(volume_id, self.quota.set_cmd(), report)
    }

    /// Clones `volume_id` into `snapshot_id` and returns the snapshot's quota.
    /// A failed snapshot is not cleaned up.
    pub fn create_snapshot(&self, volume_id: &str, snapshot_id: &str) -> Result<i64> {
        self.check_volume_id(volume_id)?;
        self.check_volume_id(snapshot_id)?;
        info!("CreateSnapshot - volumeId: {volume_id}, snapshotId: {snapshot_id}");
        let args = vec![
            path_arg(&self.paths.host_volume(volume_id)),
            path_arg(&self.paths.host_volume(snapshot_id)),
        ];
        run_tool(
            &self.runner,
            &self.tools().make_snapshot,
            &args,
            self.host_mount_path(),
        )?;
        self.get_quota(snapshot_id)
    }

    pub fn remove_snapshot(&self, snapshot_id: &str) -> Result<()> {
        self.check_volume_id(snapshot_id)?;
        info!("RemoveSnapshot - snapshotId: {snapshot_id}");
        let path = self.paths.host_volume(snapshot_id);
        if !path_exists(&path)? {
            info!("RemoveSnapshot - snapshot {snapshot_id} does not exist");
            return Ok(());
        }
        run_tool(
            &self.runner,
            &self.tools().remove_snapshot,
            &[path_arg(&path)],
            self.host_mount_path(),
        )?;
        Ok(())
    }

    pub fn mount_state(&self, target: &Path) -> Result<MountState> {
        self.mounter.is_mounted(target).map(MountState::from)
    }

    /// Mounts MooseFS at the host mount path.
    ///
    /// Whatever is mounted there is unmounted first and the directory is
    /// wiped, so every call ends with a fresh mount.
    pub fn mount_mfs(&self) -> Result<()> {
        let source = self.config.mount_source();
        let target = self.host_mount_path();
        let options: Vec<String> = Vec::new();
        info!(
            "MountMfs - source: {source}, target: {}, options: {options:?}",
            target.display()
        );

        if self.mount_state(target)? == MountState::Mounted {
            warn!("MountMfs - mount found in {}. Unmounting...", target.display());
            self.mounter.umount(target)?;
        }
        remove_all(target)?;
        self.mounter.mount(&source, target, MFS_FS_TYPE, &options)?;
        info!("MountMfs - successfully mounted {source} to {}", target.display());
        Ok(())
    }

    /// Bind mounts `<host mount>/<source>` onto `target` unless `target` is
    /// already a mount point.
    pub fn bind_mount(&self, source: &str, target: &Path, options: &[String]) -> Result<()> {
        let host_source = self.paths.host_path_to(source);
        info!(
            "BindMount - source: {}, target: {}, options: {options:?}",
            host_source.display(),
            target.display()
        );
        if self.mount_state(target)? == MountState::Mounted {
            info!("BindMount - target {} is already mounted", target.display());
            return Ok(());
        }
        let mut options = options.to_vec();
        options.push(BIND_OPTION.to_string());
        self.mounter
            .mount(&path_arg(&host_source), target, MFS_FS_TYPE, &options)
    }

    pub fn bind_umount(&self, target: &Path) -> Result<()> {
        info!("BindUMount - target: {}", target.display());
        if self.mount_state(target)? == MountState::NotMounted {
            info!("BindUMount - target {} was already unmounted", target.display());
            return Ok(());
        }
        self.mounter.umount(target)
    }

    fn require_limit(&self, volume_id: &str, command: &str, report: QuotaReport) -> Result<i64> {
        match report.limit {
            QuotaLimit::Bytes(n) => Ok(n),
            QuotaLimit::Unlimited => Err(MfsError::QuotaNotSet {
                volume_id: volume_id.to_string(),
                command: command.to_string(),
                output: report.output,
            }),
        }
    }

    fn check_volume_id(&self, volume_id: &str) -> Result<()> {
        if self.config.validate_volume_ids {
            validate_volume_id(volume_id)?;
        }
        Ok(())
    }
}

/// Rejects ids that would not stay a single entry of the volumes directory.
pub fn validate_volume_id(volume_id: &str) -> Result<()> {
    let reason = if volume_id.is_empty() {
        "empty"
    } else if volume_id == "." || volume_id == ".." {
        "refers to a parent or current directory"
    } else if volume_id.contains('/') {
        "contains a path separator"
    } else if volume_id.contains('\0') {
        "contains a NUL byte"
    } else {
        return Ok(());
    };
    Err(MfsError::InvalidVolumeId {
        id: volume_id.to_string(),
        reason,
    })
}

fn path_exists(path: &Path) -> Result<bool> {
    match fs::metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(MfsError::io("stat", path, e)),
    }
}

fn create_dir_all(path: &Path) -> Result<()> {
    DirBuilder::new()
        .recursive(true)
        .mode(NEW_VOLUME_MODE)
        .create(path)
        .map_err(|e| MfsError::io("create directory", path, e))
}

/// Removes `path` and everything below it. A missing path is not an error.
fn remove_all(path: &Path) -> Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(MfsError::io("stat", path, e)),
    };
    let removed = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match removed {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(MfsError::io("remove", path, e)),
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_volume_id() {
        for ok in ["pvc-1a2b", "v1", "a..b", ".hidden"] {
            assert!(validate_volume_id(ok).is_ok(), "{ok} should be accepted");
        }
        for bad in ["", ".", "..", "a/b", "../x", "/abs", "nul\0byte"] {
            assert!(
                matches!(
                    validate_volume_id(bad),
                    Err(MfsError::InvalidVolumeId { .. })
                ),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_remove_all() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("a");
        fs::create_dir_all(dir.join("b/c")).unwrap();
        fs::write(dir.join("b/file"), "x").unwrap();
        remove_all(&dir).unwrap();
        assert!(!dir.exists());
        remove_all(&dir).unwrap();

        let file = tmp.path().join("file");
        fs::write(&file, "x").unwrap();
        remove_all(&file).unwrap();
        assert!(!file.exists());
    }

    #[test]
    fn test_create_dir_all_mode() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("x/y");
        create_dir_all(&dir).unwrap();
        create_dir_all(&dir).unwrap();
        let mode = fs::metadata(&dir).unwrap().permissions().mode() & 0o777;
        // umask may only clear bits
        assert_eq!(mode & !NEW_VOLUME_MODE, 0);
        assert!(dir.is_dir());
    }
}
