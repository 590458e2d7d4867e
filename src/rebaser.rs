use std::process::Command;
use std::time::Duration;

use crate::error::{BummrError, BummrResult};
use crate::git::Git;
use crate::process::{ProcessError, run_command_status, timeout_secs_for_label};
use crate::types::{CommitRef, RebaseResult, RemovalResult};

/// Rewrites the commit graph on the upgrade branch.
pub trait HistoryEditor {
    fn resolve(&self, rev: &str) -> BummrResult<CommitRef>;

    /// Replays every commit after `culprit` onto its parent, favouring the
    /// surrounding history on conflicting hunks.
    fn remove(&self, culprit: &CommitRef) -> BummrResult<RemovalResult>;

    fn rebase_onto(&self, base: &str, interactive: bool) -> BummrResult<RebaseResult>;
}

#[derive(Debug, Clone)]
pub struct Rebaser {
    git: Git,
}

impl Rebaser {
    pub fn new(git: Git) -> Self {
        Self { git }
    }

    fn ensure_not_paused(&self) -> BummrResult<()> {
        if self.git.rebase_in_progress() {
            return Err(BummrError::RewriteConflict {
                context: "a rebase is already paused; resolve it with 'git rebase --continue' or 'git rebase --abort' first".to_string(),
            });
        }
        Ok(())
    }

    /// Non-zero exit means conflict only when git left a paused rebase behind.
    fn classify_exit(&self, label: &str, success: bool, code: Option<i32>) -> BummrResult<bool> {
        if success {
            return Ok(true);
        }
        if self.git.rebase_in_progress() {
            return Ok(false);
        }
        Err(BummrError::process(
            label.to_string(),
            ProcessError::Message(format!("exit {}", code.unwrap_or(-1))),
        ))
    }

    fn rebase(&self, args: &[&str], label: &str, interactive: bool) -> BummrResult<bool> {
        self.ensure_not_paused()?;
        let mut cmd: Command = self.git.command();
        cmd.args(args);
        // An interactive rebase waits on the operator's editor.
        let timeout = if interactive {
            None
        } else {
            Some(Duration::from_secs(timeout_secs_for_label(label)))
        };
        let status = run_command_status(cmd, label, timeout)
            .map_err(|e| BummrError::process(label.to_string(), e))?;
        self.classify_exit(label, status.success(), status.code())
    }
}

impl HistoryEditor for Rebaser {
    fn resolve(&self, rev: &str) -> BummrResult<CommitRef> {
        self.git.rev_parse(rev)
    }

    fn remove(&self, culprit: &CommitRef) -> BummrResult<RemovalResult> {
        let parent = format!("{}^", culprit.as_str());
        let label = format!("git rebase -X ours --onto {parent} {culprit}");
        let clean = self.rebase(
            &["rebase", "-X", "ours", "--onto", &parent, culprit.as_str()],
            &label,
            false,
        )?;
        Ok(if clean {
            RemovalResult::Removed
        } else {
            RemovalResult::Conflict
        })
    }

    fn rebase_onto(&self, base: &str, interactive: bool) -> BummrResult<RebaseResult> {
        let (args, label): (Vec<&str>, String) = if interactive {
            (vec!["rebase", "-i", base], format!("git rebase -i {base}"))
        } else {
            (vec!["rebase", base], format!("git rebase {base}"))
        };
        let clean = self.rebase(&args, &label, interactive)?;
        Ok(if clean {
            RebaseResult::Rebased
        } else {
            RebaseResult::Conflict
        })
    }
}
