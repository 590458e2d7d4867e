use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use crate::check::bin_in_path;
use crate::error::{BummrError, BummrResult};
use crate::process::{ProcessError, run_command_status};
use crate::types::Verdict;

/// Pass/fail predicate over the current work tree.
pub trait Oracle {
    fn run(&self) -> BummrResult<Verdict>;

    /// Command line handed to `git bisect run`.
    fn argv(&self) -> &[String];

    /// Whether the command's program can be started at all.
    fn probe(&self) -> Result<(), String>;
}

/// Runs the project's test command with inherited stdout/stderr.
#[derive(Debug, Clone)]
pub struct TestCommand {
    argv: Vec<String>,
    workdir: PathBuf,
    timeout: Option<Duration>,
}

impl TestCommand {
    pub fn new(argv: Vec<String>, workdir: impl Into<PathBuf>, timeout: Option<Duration>) -> Self {
        Self {
            argv,
            workdir: workdir.into(),
            timeout,
        }
    }

    fn display(&self) -> String {
        self.argv.join(" ")
    }
}

impl Oracle for TestCommand {
    fn run(&self) -> BummrResult<Verdict> {
        let Some((program, args)) = self.argv.split_first() else {
            return Err(BummrError::invalid("test command is empty"));
        };
        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(&self.workdir);
        match run_command_status(cmd, &self.display(), self.timeout) {
            Ok(status) if status.success() => Ok(Verdict::Pass),
            Ok(_) => Ok(Verdict::Fail),
            Err(ProcessError::Spawn(source)) => Err(BummrError::OracleUnavailable {
                command: self.display(),
                source,
            }),
            Err(ProcessError::Timeout(info)) => {
                eprintln!(
                    "bummr: test command timed out after {}s, counting it as a failure",
                    info.timeout_secs
                );
                Ok(Verdict::Fail)
            }
            Err(e) => Err(BummrError::process(self.display(), e)),
        }
    }

    fn argv(&self) -> &[String] {
        &self.argv
    }

    fn probe(&self) -> Result<(), String> {
        let Some(program) = self.argv.first() else {
            return Err("test command is empty".to_string());
        };
        let found = if program.contains('/') {
            let p = Path::new(program);
            let p = if p.is_absolute() {
                p.to_path_buf()
            } else {
                self.workdir.join(p)
            };
            p.is_file()
        } else {
            bin_in_path(program)
        };
        if found {
            Ok(())
        } else {
            Err(format!("'{program}' not found"))
        }
    }
}
