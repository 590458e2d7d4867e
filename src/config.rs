use std::env;
use std::time::Duration;

/// Canonical application identity (used by help/version surfaces).
pub const APP_NAME: &str = "bummr";
pub const APP_DESC: &str = "Update outdated gems, test, and bisect away the ones that break the build";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Canonical runtime defaults.
pub const DEFAULT_TEST_COMMAND: &str = "bundle exec rake";
pub const DEFAULT_BASE_BRANCH: &str = "master";
pub const DEFAULT_CMD_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_LOG_WINDOW: usize = 20;

/// Process-level configuration snapshot.
///
/// Built once in `app::run` and handed down by reference; CLI flags are
/// layered on top with `with_*` helpers.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub test_command: String,
    pub base_branch: String,
    pub headless: bool,
    pub all_gems: bool,
    pub group: Option<String>,
    pub test_timeout: Option<Duration>,
    pub bisect_timeout: Option<Duration>,
    pub log_enabled: bool,
    pub log_file: Option<String>,
}

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .and_then(|v| match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Some(true),
            "0" | "false" | "no" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

fn env_str(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn env_secs(name: &str) -> Option<u64> {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|v| v.max(1))
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            test_command: env_str("BUMMR_TEST").unwrap_or_else(|| DEFAULT_TEST_COMMAND.to_string()),
            base_branch: env_str("BASE_BRANCH").unwrap_or_else(|| DEFAULT_BASE_BRANCH.to_string()),
            headless: env_bool("BUMMR_HEADLESS", false),
            all_gems: false,
            group: None,
            test_timeout: env_secs("BUMMR_TEST_TIMEOUT_SECS").map(Duration::from_secs),
            bisect_timeout: env_secs("BUMMR_BISECT_TIMEOUT_SECS").map(Duration::from_secs),
            log_enabled: env_bool("BUMMR_LOG_ENABLED", true),
            log_file: env_str("BUMMR_LOG_FILE"),
        }
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = self.headless || headless;
        self
    }

    pub fn with_all_gems(mut self, all: bool) -> Self {
        self.all_gems = all;
        self
    }

    pub fn with_group(mut self, group: Option<String>) -> Self {
        self.group = group.filter(|g| !g.trim().is_empty());
        self
    }

    /// Test command split into argv using shell quoting rules.
    pub fn test_argv(&self) -> Result<Vec<String>, String> {
        let words = shell_words::split(&self.test_command)
            .map_err(|e| format!("cannot parse test command '{}': {e}", self.test_command))?;
        if words.is_empty() {
            return Err("test command is empty".to_string());
        }
        Ok(words)
    }
}
