use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cell::Cell;
use std::path::{Path, PathBuf};

use crate::error::{BummrError, BummrResult};
use crate::logs::{append_jsonl, tail_values};

/// One row of `runs.jsonl`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunEvent {
    pub run_id: String,
    pub ts: String,
    pub event: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub cycle: u32,
    #[serde(default)]
    pub base_branch: String,
    #[serde(default)]
    pub test_command_sha256: String,
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub commit: Option<String>,
    #[serde(default)]
    pub excluded: Vec<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

/// Fields a caller fills in for one event; the journal supplies the rest.
#[derive(Debug, Clone, Default)]
pub struct EventInput<'a> {
    pub state: Option<&'a str>,
    pub cycle: u32,
    pub identifier: Option<&'a str>,
    pub commit: Option<&'a str>,
    pub excluded: Vec<String>,
    pub detail: Option<String>,
}

pub fn utc_now_iso() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

pub fn make_run_id(command: &str) -> String {
    format!(
        "{}_{}_{}",
        Utc::now().format("%Y%m%dT%H%M%SZ"),
        command.replace(
            |c: char| !c.is_ascii_alphanumeric() && c != '_' && c != '-',
            "_"
        ),
        std::process::id()
    )
}

pub fn sha256_hex(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn validate_run_event(row: &RunEvent) -> Result<(), String> {
    if row.run_id.trim().is_empty() {
        return Err("run event missing run_id".to_string());
    }
    if row.ts.trim().is_empty() {
        return Err("run event missing ts".to_string());
    }
    if row.event.trim().is_empty() {
        return Err("run event missing event".to_string());
    }
    if row.test_command_sha256.len() != 64 {
        return Err("run event has malformed test_command_sha256".to_string());
    }
    Ok(())
}

/// Append-only record of one bummr invocation.
///
/// Write failures are reported once and never stop the run.
#[derive(Debug)]
pub struct Journal {
    path: Option<PathBuf>,
    run_id: String,
    base_branch: String,
    test_command_sha256: String,
    warned: Cell<bool>,
}

impl Journal {
    pub fn new(
        path: Option<PathBuf>,
        command: &str,
        base_branch: &str,
        test_command: &str,
    ) -> Self {
        Self {
            path,
            run_id: make_run_id(command),
            base_branch: base_branch.to_string(),
            test_command_sha256: sha256_hex(test_command),
            warned: Cell::new(false),
        }
    }

    pub fn disabled() -> Self {
        Self::new(None, "disabled", "", "")
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn event(&self, event: &str, input: EventInput<'_>) -> RunEvent {
        RunEvent {
            run_id: self.run_id.clone(),
            ts: utc_now_iso(),
            event: event.to_string(),
            state: input.state.map(str::to_string),
            cycle: input.cycle,
            base_branch: self.base_branch.clone(),
            test_command_sha256: self.test_command_sha256.clone(),
            identifier: input.identifier.map(str::to_string),
            commit: input.commit.map(str::to_string),
            excluded: input.excluded,
            detail: input.detail,
        }
    }

    pub fn record(&self, event: &str, input: EventInput<'_>) {
        let Some(path) = &self.path else {
            return;
        };
        let row = self.event(event, input);
        if let Err(e) = self.append(path, &row) {
            if !self.warned.replace(true) {
                eprintln!("bummr: warning: run log disabled for this run: {e}");
            }
        }
    }

    fn append(&self, path: &Path, row: &RunEvent) -> BummrResult<()> {
        validate_run_event(row).map_err(BummrError::invalid)?;
        let value =
            serde_json::to_value(row).map_err(|e| BummrError::json("run event serialize", e))?;
        append_jsonl(path, &value)
    }
}

/// Last `n` well-formed events, oldest first.
pub fn recent_events(path: &Path, n: usize) -> BummrResult<Vec<RunEvent>> {
    let rows = tail_values(path, n)?;
    Ok(rows
        .into_iter()
        .filter_map(|v| serde_json::from_value::<RunEvent>(v).ok())
        .collect())
}

pub fn format_event(row: &RunEvent) -> String {
    let mut line = format!("{} {:<10} {}", row.ts, row.event, row.state.as_deref().unwrap_or("-"));
    if row.cycle > 0 {
        line.push_str(&format!(" cycle={}", row.cycle));
    }
    if let Some(id) = &row.identifier {
        line.push_str(&format!(" gem={id}"));
    }
    if let Some(commit) = &row.commit {
        line.push_str(&format!(" commit={}", commit.chars().take(12).collect::<String>()));
    }
    if !row.excluded.is_empty() {
        line.push_str(&format!(" excluded={}", row.excluded.join(",")));
    }
    if let Some(detail) = &row.detail {
        line.push_str(&format!(" ({detail})"));
    }
    line
}
