#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use libmfs::exec::{CommandOutput, CommandRunner};
use libmfs::{MfsConfig, MfsError, MfsHandler, Mounter};
use nix::errno::Errno;

pub const QUOTA_BLOCK: i64 = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    pub program: String,
    pub args: Vec<String>,
    pub work_dir: PathBuf,
}

/// Stand-in for the MooseFS client tools. Quotas live in memory keyed by
/// absolute path; set limits are rounded up to `QUOTA_BLOCK`.
#[derive(Default)]
pub struct FakeMfsTools {
    pub calls: RefCell<Vec<ToolCall>>,
    quotas: RefCell<HashMap<PathBuf, i64>>,
    overrides: RefCell<HashMap<String, CommandOutput>>,
    unspawnable: RefCell<HashSet<String>>,
}

impl FakeMfsTools {
    /// Makes every later run of `program` return `output` as is.
    pub fn respond(&self, program: &str, output: CommandOutput) {
        self.overrides
            .borrow_mut()
            .insert(program.to_string(), output);
    }

    pub fn fail_to_spawn(&self, program: &str) {
        self.unspawnable.borrow_mut().insert(program.to_string());
    }

    pub fn calls_to(&self, program: &str) -> Vec<ToolCall> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.program == program)
            .cloned()
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }

    fn report(path: &str, limit: Option<i64>) -> String {
        let limit = limit.map_or("-".to_string(), |l| l.to_string());
        format!(
            "{path}: (current values | soft quota | hard quota) ; (current values | soft quota | hard quota)\n \
             inodes   |        1 |        - |        - |        - |        - |        - |\n \
             length   |        0 |        - | {limit} |        - |        - |        - |\n \
             size     |        0 |        - |        - |        - |        - |        - |\n"
        )
    }

    fn simulate(&self, program: &str, args: &[String], work_dir: &Path) -> CommandOutput {
        match program {
            "mfsgetquota" => {
                let key = work_dir.join(&args[0]);
                let limit = self.quotas.borrow().get(&key).copied();
                CommandOutput::success(Self::report(&args[0], limit))
            }
            "mfssetquota" => {
                let limit: i64 = args[1].parse().unwrap();
                let rounded = (limit + QUOTA_BLOCK - 1) / QUOTA_BLOCK * QUOTA_BLOCK;
                let key = work_dir.join(&args[2]);
                if !key.exists() {
                    return CommandOutput::failure(
                        1,
                        format!("{}: no such file or directory\n", args[2]),
                    );
                }
                self.quotas.borrow_mut().insert(key, rounded);
                CommandOutput::success(Self::report(&args[2], Some(rounded)))
            }
            "mfsmakesnapshot" => {
                let (src, dst) = (PathBuf::from(&args[0]), PathBuf::from(&args[1]));
                if !src.is_dir() {
                    return CommandOutput::failure(
                        1,
                        format!("{}: no such file or directory\n", args[0]),
                    );
                }
                fs::create_dir_all(&dst).unwrap();
                let limit = self.quotas.borrow().get(&src).copied();
                if let Some(limit) = limit {
                    self.quotas.borrow_mut().insert(dst, limit);
                }
                CommandOutput::success("")
            }
            "mfsrmsnapshot" => {
                let path = PathBuf::from(&args[0]);
                fs::remove_dir_all(&path).unwrap();
                self.quotas.borrow_mut().remove(&path);
                CommandOutput::success("")
            }
            // mount(8) as driven by `SystemMounter`
            "mount" => CommandOutput::success(""),
            other => CommandOutput::failure(127, format!("{other}: command not found\n")),
        }
    }
}

impl CommandRunner for FakeMfsTools {
    fn run(&self, program: &str, args: &[String], work_dir: &Path) -> io::Result<CommandOutput> {
        self.calls.borrow_mut().push(ToolCall {
            program: program.to_string(),
            args: args.to_vec(),
            work_dir: work_dir.to_path_buf(),
        });
        if self.unspawnable.borrow().contains(program) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such executable"));
        }
        if let Some(output) = self.overrides.borrow().get(program) {
            return Ok(output.clone());
        }
        Ok(self.simulate(program, args, work_dir))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountCall {
    IsMounted(PathBuf),
    Mount {
        source: String,
        target: PathBuf,
        fs_type: String,
        options: Vec<String>,
        /// Whether anything existed at `target` when the mount was issued.
        target_existed: bool,
    },
    Umount(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MountOp {
    IsMounted,
    Mount,
    Umount,
}

/// In-memory mount table. Mounting creates the target directory the way
/// the system mounter does.
#[derive(Default)]
pub struct FakeMounter {
    pub calls: RefCell<Vec<MountCall>>,
    mounted: RefCell<HashSet<PathBuf>>,
    failing: RefCell<HashSet<MountOp>>,
}

impl FakeMounter {
    /// Makes every later call of `op` fail without touching the table.
    pub fn fail(&self, op: MountOp) {
        self.failing.borrow_mut().insert(op);
    }

    fn check(&self, op: MountOp, target: &Path) -> libmfs::Result<()> {
        if !self.failing.borrow().contains(&op) {
            return Ok(());
        }
        Err(match op {
            MountOp::Umount => MfsError::Umount {
                target: target.to_path_buf(),
                source: Errno::EBUSY,
            },
            _ => MfsError::Io {
                op: "fake mount",
                path: target.to_path_buf(),
                source: io::Error::from_raw_os_error(Errno::EIO as i32),
            },
        })
    }

    pub fn preload(&self, target: &Path) {
        self.mounted.borrow_mut().insert(target.to_path_buf());
    }

    pub fn is_mounted_now(&self, target: &Path) -> bool {
        self.mounted.borrow().contains(target)
    }

    pub fn mutations(&self) -> Vec<MountCall> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| !matches!(c, MountCall::IsMounted(_)))
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }
}

impl Mounter for FakeMounter {
    fn is_mounted(&self, target: &Path) -> libmfs::Result<bool> {
        self.calls
            .borrow_mut()
            .push(MountCall::IsMounted(target.to_path_buf()));
        self.check(MountOp::IsMounted, target)?;
        Ok(self.mounted.borrow().contains(target))
    }

    fn mount(
        &self,
        source: &str,
        target: &Path,
        fs_type: &str,
        options: &[String],
    ) -> libmfs::Result<()> {
        let target_existed = target.symlink_metadata().is_ok();
        self.calls.borrow_mut().push(MountCall::Mount {
            source: source.to_string(),
            target: target.to_path_buf(),
            fs_type: fs_type.to_string(),
            options: options.to_vec(),
            target_existed,
        });
        self.check(MountOp::Mount, target)?;
        fs::create_dir_all(target).unwrap();
        self.mounted.borrow_mut().insert(target.to_path_buf());
        Ok(())
    }

    fn umount(&self, target: &Path) -> libmfs::Result<()> {
        self.calls
            .borrow_mut()
            .push(MountCall::Umount(target.to_path_buf()));
        self.check(MountOp::Umount, target)?;
        self.mounted.borrow_mut().remove(target);
        Ok(())
    }
}

pub fn test_config(mount_dir: &Path) -> MfsConfig {
    let mut config = MfsConfig::new("mfsmaster", "pvc1");
    config.plugin_data_path = "plugin".to_string();
    config.mount_dir = mount_dir.to_path_buf();
    config
}

pub fn handler<'a>(
    mount_dir: &Path,
    tools: &'a FakeMfsTools,
    mounter: &'a FakeMounter,
) -> MfsHandler<&'a FakeMfsTools, &'a FakeMounter> {
    MfsHandler::with_parts(test_config(mount_dir), tools, mounter)
}
