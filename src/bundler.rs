use std::fs;
use std::path::PathBuf;
use std::process::Command;

use crate::error::{BummrError, BummrResult};
use crate::git::Git;
use crate::process::{ProcessError, run_command_output_with_timeout};
use crate::types::{CommitRef, ExclusionSet, UpgradeCandidate};
use crate::upgrade::{UpgradeSource, commit_message, identifier_from_subject};

const MANIFEST_FILES: [&str; 3] = ["Gemfile", "Gemfile.lock", "vendor/cache"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutdatedOptions {
    pub all_gems: bool,
    pub group: Option<String>,
}

impl OutdatedOptions {
    pub fn bundle_args(&self) -> Vec<String> {
        let mut args = vec!["outdated".to_string()];
        if !self.all_gems {
            args.push("--strict".to_string());
        }
        if let Some(group) = &self.group {
            args.push("--group".to_string());
            args.push(group.clone());
        }
        args
    }
}

/// `\d[\d.]*` ending in a digit; returns the version and what follows it.
fn take_version(s: &str) -> Option<(&str, &str)> {
    let end = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let version = s[..end].trim_end_matches('.');
    if version.is_empty() || !version.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    if version.len() != end {
        return None;
    }
    Some((version, &s[end..]))
}

fn strip_delimiter(s: &str) -> Option<&str> {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c == ',' || c.is_whitespace() => Some(chars.as_str()),
        _ => None,
    }
}

/// Parses a bullet line such as
/// `  * rake (newest 13.0.1, installed 12.3.3, requested ~> 12.0)`.
pub fn parse_gem_from(line: &str) -> Option<UpgradeCandidate> {
    let (_, rest) = line.split_once(" * ")?;
    let (name, rest) = rest.split_once(" (newest ")?;
    let (newest, rest) = take_version(rest)?;
    let rest = strip_delimiter(rest)?.strip_prefix(" installed ")?;
    let (installed, rest) = take_version(rest)?;
    if !rest.starts_with([')', ',']) && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some(UpgradeCandidate {
        name: name.to_string(),
        installed: installed.to_string(),
        newest: newest.to_string(),
    })
}

fn is_table_header(line: &str) -> bool {
    let mut cols = line.split_whitespace();
    cols.next() == Some("Gem") && cols.next() == Some("Current") && cols.next() == Some("Latest")
}

/// Handles both the bullet output and the tabular output of newer Bundler.
pub fn parse_outdated(output: &str) -> Vec<UpgradeCandidate> {
    let mut in_table = false;
    let mut out = Vec::new();
    for line in output.lines() {
        if let Some(gem) = parse_gem_from(line) {
            out.push(gem);
            continue;
        }
        if is_table_header(line) {
            in_table = true;
            continue;
        }
        if !in_table {
            continue;
        }
        let cols: Vec<&str> = line.split_whitespace().collect();
        if cols.len() < 3 {
            continue;
        }
        let (Some((current, "")), Some((latest, ""))) = (take_version(cols[1]), take_version(cols[2]))
        else {
            continue;
        };
        out.push(UpgradeCandidate {
            name: cols[0].to_string(),
            installed: current.to_string(),
            newest: latest.to_string(),
        });
    }
    out
}

/// True when the Gemfile declares `gem 'name'` or `gem "name"`.
pub fn gemfile_contains(gemfile: &str, name: &str) -> bool {
    let single = format!("gem '{name}'");
    let double = format!("gem \"{name}\"");
    gemfile
        .lines()
        .map(str::trim_start)
        .filter(|l| !l.starts_with('#'))
        .any(|l| l.contains(&single) || l.contains(&double))
}

pub fn select_candidates(
    outdated: &str,
    gemfile: &str,
    options: &OutdatedOptions,
    excluding: &ExclusionSet,
) -> Vec<UpgradeCandidate> {
    parse_outdated(outdated)
        .into_iter()
        .filter(|gem| {
            let keep =
                !excluding.contains(&gem.name) && (options.all_gems || gemfile_contains(gemfile, &gem.name));
            if !keep {
                println!("bummr: skipping {}", gem.name);
            }
            keep
        })
        .collect()
}

/// Version recorded for `name` in the lockfile's specs section.
pub fn locked_version(lockfile: &str, name: &str) -> Option<String> {
    let prefix = format!("{name} (");
    lockfile.lines().find_map(|line| {
        let indent = line.len() - line.trim_start().len();
        if indent != 4 {
            return None;
        }
        let rest = line.trim_start().strip_prefix(&prefix)?;
        let version = rest.strip_suffix(')')?;
        Some(version.split('-').next().unwrap_or(version).to_string())
    })
}

/// `bundle outdated` exits 1 when it lists outdated gems; any other
/// non-zero status is a Bundler error, not an empty list.
pub fn check_outdated_status(code: Option<i32>, stderr: &[u8]) -> BummrResult<()> {
    match code {
        Some(0) | Some(1) => Ok(()),
        code => Err(BummrError::process(
            "bundle outdated",
            ProcessError::Message(format!(
                "exited with {}: {}",
                code.map_or_else(|| "a signal".to_string(), |c| c.to_string()),
                String::from_utf8_lossy(stderr).trim()
            )),
        )),
    }
}

/// Bundler-backed upgrade source for the work tree `git` points at.
#[derive(Debug, Clone)]
pub struct Bundler {
    git: Git,
    options: OutdatedOptions,
}

impl Bundler {
    pub fn new(git: Git, options: OutdatedOptions) -> Self {
        Self { git, options }
    }

    fn root(&self) -> PathBuf {
        self.git.workdir().to_path_buf()
    }

    fn bundle(&self, args: &[String]) -> BummrResult<std::process::Output> {
        let label = format!("bundle {}", args.join(" "));
        let mut cmd = Command::new("bundle");
        cmd.args(args).current_dir(self.root());
        run_command_output_with_timeout(cmd, &label).map_err(|e| match e {
            ProcessError::Spawn(_) => BummrError::ToolMissing {
                tools: vec!["bundle".to_string()],
            },
            other => BummrError::process(label, other),
        })
    }

    fn read_root_file(&self, name: &str) -> String {
        fs::read_to_string(self.root().join(name)).unwrap_or_default()
    }

    fn manifest_paths(&self) -> Vec<&'static str> {
        MANIFEST_FILES
            .into_iter()
            .filter(|p| self.root().join(p).exists())
            .collect()
    }

    fn apply_one(&self, gem: &UpgradeCandidate) -> BummrResult<()> {
        println!(
            "bummr: updating {} from {} to {}",
            gem.name, gem.installed, gem.newest
        );
        let out = self.bundle(&["update".to_string(), gem.name.clone()])?;
        let paths = self.manifest_paths();
        if !out.status.success() {
            eprintln!(
                "bummr: bundle update {} failed: {}",
                gem.name,
                String::from_utf8_lossy(&out.stderr).trim()
            );
            if !paths.is_empty() {
                let mut args = vec!["checkout", "--"];
                args.extend(paths.iter().copied());
                self.git.run_ok(&args)?;
            }
            return Ok(());
        }
        if paths.is_empty() {
            return Ok(());
        }
        let mut args = vec!["add", "--all", "--"];
        args.extend(paths.iter().copied());
        self.git.run_ok(&args)?;
        if !self.git.has_staged_changes()? {
            println!("bummr: {} was not updated", gem.name);
            return Ok(());
        }
        let to = locked_version(&self.read_root_file("Gemfile.lock"), &gem.name)
            .unwrap_or_else(|| gem.newest.clone());
        self.git.commit(&commit_message(&gem.name, &gem.installed, &to))
    }
}

impl UpgradeSource for Bundler {
    fn prepare(&self) -> BummrResult<Option<String>> {
        let out = self.bundle(&["install".to_string(), "--quiet".to_string()])?;
        if out.status.success() {
            return Ok(None);
        }
        Ok(Some(format!(
            "bundle install exited with {}: {}",
            out.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&out.stderr).trim()
        )))
    }

    fn list_candidates(&self, excluding: &ExclusionSet) -> BummrResult<Vec<UpgradeCandidate>> {
        let out = self.bundle(&self.options.bundle_args())?;
        check_outdated_status(out.status.code(), &out.stderr)?;
        let stdout = String::from_utf8_lossy(&out.stdout);
        print!("{stdout}");
        Ok(select_candidates(
            &stdout,
            &self.read_root_file("Gemfile"),
            &self.options,
            excluding,
        ))
    }

    fn apply(&self, candidates: &[UpgradeCandidate]) -> BummrResult<()> {
        for gem in candidates {
            self.apply_one(gem)?;
        }
        Ok(())
    }

    fn identify(&self, commit: &CommitRef) -> BummrResult<Option<String>> {
        self.git
            .subject(commit)
            .map(|subject| identifier_from_subject(&subject))
    }
}
