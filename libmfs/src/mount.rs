use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::{Path, PathBuf};

use nix::mount::umount;
use procfs::process::Process;
use tracing::debug;

use crate::error::{MfsError, Result};
use crate::exec::{CommandRunner, SystemRunner, run_tool};

/// Filesystem type passed to mount(8) for MooseFS and its bind mounts.
pub const MFS_FS_TYPE: &str = "moosefs";
pub const BIND_OPTION: &str = "bind";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountState {
    Mounted,
    NotMounted,
}

impl From<bool> for MountState {
    fn from(mounted: bool) -> Self {
        if mounted {
            MountState::Mounted
        } else {
            MountState::NotMounted
        }
    }
}

/// Access to the host mount table.
pub trait Mounter {
    fn is_mounted(&self, target: &Path) -> Result<bool>;

    fn mount(&self, source: &str, target: &Path, fs_type: &str, options: &[String]) -> Result<()>;

    fn umount(&self, target: &Path) -> Result<()>;
}

impl<T: Mounter + ?Sized> Mounter for &T {
    fn is_mounted(&self, target: &Path) -> Result<bool> {
        (**self).is_mounted(target)
    }

    fn mount(&self, source: &str, target: &Path, fs_type: &str, options: &[String]) -> Result<()> {
        (**self).mount(source, target, fs_type, options)
    }

    fn umount(&self, target: &Path) -> Result<()> {
        (**self).umount(target)
    }
}

/// Linux mounter: reads `/proc/self/mountinfo` and mounts through mount(8)
/// so the `mount.moosefs` helper gets involved.
#[derive(Debug, Clone, Default)]
pub struct SystemMounter<R = SystemRunner> {
    runner: R,
}

impl SystemMounter {
    pub fn new() -> Self {
        SystemMounter {
            runner: SystemRunner,
        }
    }
}

impl<R: CommandRunner> SystemMounter<R> {
    pub fn with_runner(runner: R) -> Self {
        SystemMounter { runner }
    }
}

impl<R: CommandRunner> Mounter for SystemMounter<R> {
    fn is_mounted(&self, target: &Path) -> Result<bool> {
        // mountinfo lists resolved paths; a target that does not exist
        // cannot be a mount point.
        let target = match fs::canonicalize(target) {
            Ok(path) => path,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(MfsError::io("resolve mount target", target, e)),
        };
        let mounts = Process::myself()?.mountinfo()?;
        Ok(mounts
            .into_iter()
            .any(|info| unescape_mount_point(&info.mount_point) == target))
    }

    fn mount(&self, source: &str, target: &Path, fs_type: &str, options: &[String]) -> Result<()> {
        fs::create_dir_all(target).map_err(|e| MfsError::io("create mount target", target, e))?;
        let args = mount_args(source, target, fs_type, options);
        debug!("mount {args:?}");
        run_tool(&self.runner, "mount", &args, Path::new("/"))?;
        Ok(())
    }

    fn umount(&self, target: &Path) -> Result<()> {
        umount(target).map_err(|source| MfsError::Umount {
            target: target.to_path_buf(),
            source,
        })
    }
}

/// Decodes the octal escapes (`\040`, `\011`, `\012`, `\134`) the kernel
/// writes for whitespace and backslashes in mountinfo paths.
fn unescape_mount_point(raw: &Path) -> PathBuf {
    let bytes = raw.as_os_str().as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            if let Some(value) = bytes.get(i + 1..i + 4).and_then(octal_byte) {
                out.push(value);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    PathBuf::from(OsString::from_vec(out))
}

fn octal_byte(digits: &[u8]) -> Option<u8> {
    digits.iter().try_fold(0u8, |acc, &d| match d {
        b'0'..=b'7' => acc.checked_mul(8)?.checked_add(d - b'0'),
        _ => None,
    })
}

fn mount_args(source: &str, target: &Path, fs_type: &str, options: &[String]) -> Vec<String> {
    let mut args = vec!["-t".to_string(), fs_type.to_string()];
    if !options.is_empty() {
        args.push("-o".to_string());
        args.push(options.join(","));
    }
    args.push(source.to_string());
    args.push(target.to_string_lossy().into_owned());
    args
}
