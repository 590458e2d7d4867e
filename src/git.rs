use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use crate::error::{BummrError, BummrResult};
use crate::process::{ProcessError, run_command_output_with_timeout};
use crate::types::CommitRef;

/// Thin wrapper over the `git` CLI, pinned to one work tree with `-C`.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

fn stderr_text(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).trim().to_string()
}

fn stdout_text(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn command(&self) -> Command {
        let mut cmd = Command::new("git");
        cmd.arg("-C").arg(&self.workdir);
        cmd
    }

    fn label(args: &[&str]) -> String {
        format!("git {}", args.join(" "))
    }

    pub fn output(&self, args: &[&str]) -> BummrResult<Output> {
        let label = Self::label(args);
        let mut cmd = self.command();
        cmd.args(args);
        run_command_output_with_timeout(cmd, &label).map_err(|e| BummrError::process(label, e))
    }

    /// Runs and requires exit 0; stderr becomes the error message otherwise.
    pub fn run_ok(&self, args: &[&str]) -> BummrResult<()> {
        let out = self.output(args)?;
        if out.status.success() {
            return Ok(());
        }
        Err(BummrError::process(
            Self::label(args),
            ProcessError::Message(format!(
                "exit {}: {}",
                out.status.code().unwrap_or(-1),
                stderr_text(&out)
            )),
        ))
    }

    pub fn stdout(&self, args: &[&str]) -> BummrResult<String> {
        let out = self.output(args)?;
        if !out.status.success() {
            return Err(BummrError::process(
                Self::label(args),
                ProcessError::Message(stderr_text(&out)),
            ));
        }
        Ok(stdout_text(&out))
    }

    pub fn is_inside_work_tree(&self) -> bool {
        self.stdout(&["rev-parse", "--is-inside-work-tree"])
            .map(|s| s == "true")
            .unwrap_or(false)
    }

    pub fn git_dir(&self) -> BummrResult<PathBuf> {
        self.stdout(&["rev-parse", "--absolute-git-dir"])
            .map(PathBuf::from)
    }

    pub fn rev_parse(&self, rev: &str) -> BummrResult<CommitRef> {
        let spec = format!("{rev}^{{commit}}");
        let sha = self.stdout(&["rev-parse", "--verify", "--quiet", &spec])?;
        if sha.is_empty() {
            return Err(BummrError::invalid(format!("unknown revision '{rev}'")));
        }
        Ok(CommitRef::new(sha))
    }

    pub fn is_ancestor(&self, ancestor: &CommitRef, descendant: &CommitRef) -> BummrResult<bool> {
        let args = [
            "merge-base",
            "--is-ancestor",
            ancestor.as_str(),
            descendant.as_str(),
        ];
        let out = self.output(&args)?;
        match out.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(BummrError::process(
                Self::label(&args),
                ProcessError::Message(stderr_text(&out)),
            )),
        }
    }

    pub fn current_branch(&self) -> Option<String> {
        self.stdout(&["rev-parse", "--abbrev-ref", "HEAD"])
            .ok()
            .filter(|b| !b.is_empty() && b != "HEAD")
    }

    /// Tracked files only; untracked files do not block a rebase.
    pub fn is_clean(&self) -> BummrResult<bool> {
        self.stdout(&["status", "--porcelain", "--untracked-files=no"])
            .map(|s| s.is_empty())
    }

    pub fn rebase_in_progress(&self) -> bool {
        let Ok(dir) = self.git_dir() else {
            return false;
        };
        dir.join("rebase-merge").exists() || dir.join("rebase-apply").exists()
    }

    pub fn bisect_in_progress(&self) -> bool {
        self.git_dir()
            .map(|dir| dir.join("BISECT_START").exists())
            .unwrap_or(false)
    }

    pub fn subject(&self, commit: &CommitRef) -> BummrResult<String> {
        self.stdout(&["log", "-1", "--format=%s", commit.as_str()])
    }

    pub fn log_oneline(&self, n: usize) -> BummrResult<String> {
        let n = format!("-{n}");
        self.stdout(&["log", "--oneline", &n])
    }

    pub fn has_staged_changes(&self) -> BummrResult<bool> {
        let args = ["diff", "--cached", "--quiet"];
        let out = self.output(&args)?;
        match out.status.code() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(BummrError::process(
                Self::label(&args),
                ProcessError::Message(stderr_text(&out)),
            )),
        }
    }

    pub fn commit(&self, message: &str) -> BummrResult<()> {
        self.run_ok(&["commit", "--quiet", "--no-verify", "-m", message])
    }
}
