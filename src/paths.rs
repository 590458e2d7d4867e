use std::path::{Path, PathBuf};

use crate::config::AppConfig;
use crate::git::Git;

/// `BUMMR_LOG_FILE` (relative to the work tree) or `<git-dir>/bummr/runs.jsonl`.
///
/// Living under the git dir keeps the log out of the working tree that
/// bisect and rebase rewrite.
pub fn resolve_log_file(config: &AppConfig, git: &Git) -> Option<PathBuf> {
    if let Some(custom) = &config.log_file {
        let p = PathBuf::from(custom);
        return Some(if p.is_absolute() {
            p
        } else {
            git.workdir().join(p)
        });
    }
    git.git_dir()
        .ok()
        .map(|dir| dir.join("bummr").join("runs.jsonl"))
}

pub fn ensure_parent_dir(path: &Path) -> Result<(), String> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    std::fs::create_dir_all(parent)
        .map_err(|e| format!("failed to create {}: {e}", parent.display()))
}
