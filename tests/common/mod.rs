#![allow(dead_code)]

use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::thread::sleep;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const BASE_GEMFILE: &str = "source 'https://rubygems.org'\n\ngem 'rack'\ngem 'badgem'\n";
pub const BASE_LOCKFILE: &str = "\
GEM
  remote: https://rubygems.org/
  specs:
    badgem (1.0)
    rack (1.0)

PLATFORMS
  ruby

DEPENDENCIES
  badgem
  rack
";

const BUMMR_ENV: [&str; 10] = [
    "BUMMR_TEST",
    "BASE_BRANCH",
    "BUMMR_HEADLESS",
    "BUMMR_TEST_TIMEOUT_SECS",
    "BUMMR_BISECT_TIMEOUT_SECS",
    "BUMMR_CMD_TIMEOUT_SECS",
    "BUMMR_LOG_ENABLED",
    "BUMMR_LOG_FILE",
    "BUMMR_TIMEOUT_GIT_SECS",
    "BUMMR_TIMEOUT_BUNDLE_SECS",
];

fn git_bin() -> String {
    if let Ok(v) = std::env::var("GIT_BIN")
        && !v.trim().is_empty()
    {
        return v;
    }
    for c in ["git", "/opt/homebrew/bin/git", "/usr/bin/git"] {
        if Command::new(c).arg("--version").output().is_ok() {
            return c.to_string();
        }
    }
    "git".to_string()
}

fn init_git_repo_with_retry(root: &Path) {
    let mut last = None;
    for _ in 0..5 {
        let out = Command::new(git_bin())
            .args(["init", "-q"])
            .current_dir(root)
            .output()
            .expect("run git init");
        if out.status.success() {
            return;
        }
        last = Some(out);
        sleep(Duration::from_millis(50));
    }
    panic!("git init failed after retries: {:?}", last);
}

/// Throwaway repository on a `bummr-updates` branch cut from `master`,
/// with a mock bin dir prepended to PATH.
pub struct TempRepo {
    pub root: PathBuf,
    pub home: PathBuf,
    pub mock_bin: PathBuf,
    original_path: String,
}

impl TempRepo {
    pub fn new(prefix: &str) -> Self {
        let base = std::env::temp_dir();
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before unix epoch")
            .as_nanos();
        let root = base.join(format!("{prefix}-repo-{}-{ts}", std::process::id()));
        let home = base.join(format!("{prefix}-home-{}-{ts}", std::process::id()));
        let mock_bin = base.join(format!("{prefix}-mockbin-{}-{ts}", std::process::id()));

        fs::create_dir_all(&root).expect("create temp repo dir");
        fs::create_dir_all(&home).expect("create temp home dir");
        fs::create_dir_all(&mock_bin).expect("create mock bin dir");
        init_git_repo_with_retry(&root);

        let me = Self {
            root,
            home,
            mock_bin,
            original_path: std::env::var("PATH").unwrap_or_default(),
        };
        me.git(&["symbolic-ref", "HEAD", "refs/heads/master"]);
        me.git(&["config", "user.name", "Bummr Test"]);
        me.git(&["config", "user.email", "bummr@example.com"]);
        me.git(&["config", "commit.gpgsign", "false"]);
        me.write_file("Gemfile", BASE_GEMFILE);
        me.write_file("Gemfile.lock", BASE_LOCKFILE);
        me.git(&["add", "Gemfile", "Gemfile.lock"]);
        me.git(&["commit", "-q", "-m", "Initial commit"]);
        me.git(&["checkout", "-q", "-b", "bummr-updates"]);
        me.write_mock("bundle", "#!/bin/sh\nexit 0\n");
        me
    }

    pub fn git(&self, args: &[&str]) -> String {
        let out = Command::new(git_bin())
            .arg("-C")
            .arg(&self.root)
            .args(args)
            .env("HOME", &self.home)
            .env("GIT_CONFIG_NOSYSTEM", "1")
            .output()
            .expect("run git");
        assert!(
            out.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&out.stderr)
        );
        String::from_utf8_lossy(&out.stdout).trim().to_string()
    }

    pub fn write_file(&self, name: &str, body: &str) {
        fs::write(self.root.join(name), body).expect("write repo file");
    }

    /// Commits `name` with `body` and returns the new HEAD hash.
    pub fn commit_file(&self, name: &str, body: &str, message: &str) -> String {
        self.write_file(name, body);
        self.git(&["add", name]);
        self.git(&["commit", "-q", "-m", message]);
        self.git(&["rev-parse", "HEAD"])
    }

    /// Subjects of the commits on the branch that are not on master, oldest first.
    pub fn branch_subjects(&self) -> Vec<String> {
        self.git(&["log", "--reverse", "--format=%s", "master..HEAD"])
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub fn write_mock(&self, name: &str, body: &str) {
        let p = self.mock_bin.join(name);
        fs::write(&p, body).expect("write mock");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(&p).expect("mock metadata").permissions();
            perms.set_mode(0o755);
            fs::set_permissions(&p, perms).expect("set mock executable");
        }
    }

    pub fn remove_mock(&self, name: &str) {
        let _ = fs::remove_file(self.mock_bin.join(name));
    }

    /// Links a real tool from the original PATH into the mock bin dir.
    #[cfg(unix)]
    pub fn link_tool(&self, name: &str) {
        let found = std::env::split_paths(&self.original_path)
            .map(|dir| dir.join(name))
            .find(|p| p.is_file())
            .unwrap_or_else(|| panic!("{name} not found on PATH"));
        std::os::unix::fs::symlink(found, self.mock_bin.join(name)).expect("link tool");
    }

    fn command(&self, args: &[&str], path: String) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_bummr"));
        cmd.args(args)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .env("HOME", &self.home)
            .env("GIT_CONFIG_NOSYSTEM", "1")
            .env("PATH", path);
        for key in BUMMR_ENV {
            cmd.env_remove(key);
        }
        cmd
    }

    pub fn run(&self, args: &[&str]) -> Output {
        self.run_with_env(args, &[])
    }

    pub fn run_with_env(&self, args: &[&str], envs: &[(&str, &str)]) -> Output {
        let path = format!("{}:{}", self.mock_bin.display(), self.original_path);
        let mut cmd = self.command(args, path);
        for (k, v) in envs {
            cmd.env(k, v);
        }
        cmd.output().expect("run bummr command")
    }

    /// Runs with PATH reduced to the mock bin dir.
    pub fn run_isolated(&self, args: &[&str]) -> Output {
        let path = self.mock_bin.display().to_string();
        self.command(args, path)
            .output()
            .expect("run bummr command")
    }

    pub fn runs_log(&self) -> PathBuf {
        self.root.join(".git").join("bummr").join("runs.jsonl")
    }
}

impl Drop for TempRepo {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.root);
        let _ = fs::remove_dir_all(&self.home);
        let _ = fs::remove_dir_all(&self.mock_bin);
    }
}

pub fn stdout_str(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).to_string()
}

pub fn stderr_str(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).to_string()
}

pub fn parse_jsonl(path: &Path) -> Vec<Value> {
    let text = fs::read_to_string(path).unwrap_or_else(|_| panic!("read jsonl: {}", path.display()));
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|line| serde_json::from_str::<Value>(line).expect("valid json line"))
        .collect()
}
