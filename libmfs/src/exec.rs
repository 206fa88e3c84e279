use std::io;
use std::path::Path;
use std::process::Command;

use tracing::{debug, trace};

use crate::error::{MfsError, Result};

/// Exit code and combined stdout/stderr of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub output: String,
}

impl CommandOutput {
    pub fn success(output: impl Into<String>) -> Self {
        CommandOutput {
            code: Some(0),
            output: output.into(),
        }
    }

    pub fn failure(code: i32, output: impl Into<String>) -> Self {
        CommandOutput {
            code: Some(code),
            output: output.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }

    fn status(&self) -> String {
        match self.code {
            Some(code) => format!("exit status {code}"),
            None => "termination by signal".to_string(),
        }
    }
}

/// Runs external programs to completion.
pub trait CommandRunner {
    /// Runs `program` with `args` from `work_dir`. An `Err` means the
    /// process could not be started at all.
    fn run(&self, program: &str, args: &[String], work_dir: &Path) -> io::Result<CommandOutput>;
}

impl<T: CommandRunner + ?Sized> CommandRunner for &T {
    fn run(&self, program: &str, args: &[String], work_dir: &Path) -> io::Result<CommandOutput> {
        (**self).run(program, args, work_dir)
    }
}

/// Spawns real processes. Stdout comes first in the captured output,
/// followed by stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String], work_dir: &Path) -> io::Result<CommandOutput> {
        debug!("Executing {program} {args:?} in {}", work_dir.display());
        let out = Command::new(program)
            .args(args)
            .current_dir(work_dir)
            .output()?;

        let mut output = String::from_utf8_lossy(&out.stdout).into_owned();
        output.push_str(&String::from_utf8_lossy(&out.stderr));
        trace!("{program} finished with {:?}: {output}", out.status);

        Ok(CommandOutput {
            code: out.status.code(),
            output,
        })
    }
}

/// Runs a tool and returns its output, turning spawn failures and non-zero
/// exits into errors that carry the whole invocation.
pub fn run_tool<R: CommandRunner + ?Sized>(
    runner: &R,
    program: &str,
    args: &[String],
    work_dir: &Path,
) -> Result<String> {
    let out = runner
        .run(program, args, work_dir)
        .map_err(|source| MfsError::ToolSpawn {
            command: program.to_string(),
            args: args.to_vec(),
            source,
        })?;

    if !out.is_success() {
        return Err(MfsError::ToolExit {
            command: program.to_string(),
            args: args.to_vec(),
            status: out.status(),
            output: out.output,
        });
    }
    Ok(out.output)
}
