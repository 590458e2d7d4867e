use serde::Serialize;
use std::env;

use crate::error::{BummrError, BummrResult};
use crate::git::Git;

const REQUIRED_TOOLS: [&str; 2] = ["git", "bundle"];

/// Preconditions verified before the loop touches the tree.
pub trait Preflight {
    /// `full` adds the checks only meaningful before starting an update.
    fn verify(&self, full: bool) -> BummrResult<()>;
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CheckItem {
    pub name: String,
    pub ok: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckReport {
    pub items: Vec<CheckItem>,
    pub missing_tools: Vec<String>,
}

impl CheckReport {
    fn push(&mut self, name: &str, ok: bool, detail: impl Into<String>) {
        self.items.push(CheckItem {
            name: name.to_string(),
            ok,
            detail: detail.into(),
        });
    }

    pub fn passed(&self) -> bool {
        self.missing_tools.is_empty() && self.items.iter().all(|i| i.ok)
    }

    pub fn failures(&self) -> Vec<String> {
        self.items
            .iter()
            .filter(|i| !i.ok)
            .map(|i| format!("{}: {}", i.name, i.detail))
            .collect()
    }

    pub fn into_result(self) -> BummrResult<()> {
        if !self.missing_tools.is_empty() {
            return Err(BummrError::ToolMissing {
                tools: self.missing_tools,
            });
        }
        let failures = self.failures();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(BummrError::Precondition { failures })
        }
    }

    pub fn print(&self) {
        println!("== bummr check ==");
        for item in &self.items {
            let tag = if item.ok { "OK" } else { "FAIL" };
            println!("{tag}: {} ({})", item.name, item.detail);
        }
    }
}

pub fn bin_in_path(bin: &str) -> bool {
    let Some(path) = env::var_os("PATH") else {
        return false;
    };
    env::split_paths(&path).any(|dir| dir.join(bin).is_file())
}

/// Repository checks against the configured base branch.
#[derive(Debug, Clone)]
pub struct RepoCheck {
    git: Git,
    base_branch: String,
}

impl RepoCheck {
    pub fn new(git: Git, base_branch: impl Into<String>) -> Self {
        Self {
            git,
            base_branch: base_branch.into(),
        }
    }

    pub fn report(&self, full: bool) -> CheckReport {
        let mut report = CheckReport::default();
        for tool in REQUIRED_TOOLS {
            let ok = bin_in_path(tool);
            report.push(tool, ok, if ok { "found on PATH" } else { "not found on PATH" });
            if !ok {
                report.missing_tools.push(tool.to_string());
            }
        }
        if report.missing_tools.iter().any(|t| t == "git") {
            return report;
        }
        if !self.git.is_inside_work_tree() {
            report.push("git repository", false, "not inside a git work tree");
            return report;
        }
        report.push("git repository", true, self.git.workdir().display().to_string());

        let bisecting = self.git.bisect_in_progress();
        report.push(
            "no bisect in progress",
            !bisecting,
            if bisecting { "run 'git bisect reset'" } else { "none" },
        );
        let rebasing = self.git.rebase_in_progress();
        report.push(
            "no rebase in progress",
            !rebasing,
            if rebasing {
                "finish with 'git rebase --continue' or 'git rebase --abort'"
            } else {
                "none"
            },
        );
        match self.git.is_clean() {
            Ok(true) => report.push("clean working tree", true, "no uncommitted changes"),
            Ok(false) => report.push("clean working tree", false, "commit or stash your changes"),
            Err(e) => report.push("clean working tree", false, e.to_string()),
        }

        if full {
            match self.git.current_branch() {
                Some(branch) if branch == self.base_branch => report.push(
                    "feature branch",
                    false,
                    format!("on {branch}; create a branch for the updates first"),
                ),
                Some(branch) => report.push("feature branch", true, branch),
                None => report.push("feature branch", false, "detached HEAD"),
            }
            let base_ok = self.git.rev_parse(&self.base_branch).is_ok();
            report.push(
                "base branch",
                base_ok,
                if base_ok {
                    format!("{} resolves", self.base_branch)
                } else {
                    format!("{} does not resolve; set BASE_BRANCH", self.base_branch)
                },
            );
        }
        report
    }
}

impl Preflight for RepoCheck {
    fn verify(&self, full: bool) -> BummrResult<()> {
        let report = self.report(full);
        if !report.passed() {
            for failure in report.failures() {
                eprintln!("bummr: check failed: {failure}");
            }
        }
        report.into_result()
    }
}
