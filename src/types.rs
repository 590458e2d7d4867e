use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// Opaque identifier for a point in history (a commit hash).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CommitRef(String);

impl CommitRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Search interval for bisection. `good` must be an ancestor of `bad`;
/// the bisector checks this before opening a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Range {
    pub good: CommitRef,
    pub bad: CommitRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BisectOutcome {
    Found(CommitRef),
    Inconclusive,
    OracleError(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalResult {
    Removed,
    Conflict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebaseResult {
    Rebased,
    Conflict,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpgradeCandidate {
    pub name: String,
    pub installed: String,
    pub newest: String,
}

/// Upgrade identifiers known to break the build during this run.
///
/// Only grows: there is no removal API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ExclusionSet(BTreeSet<String>);

impl ExclusionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the identifier was already excluded.
    pub fn insert(&mut self, identifier: impl Into<String>) -> bool {
        self.0.insert(identifier.into())
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.0.contains(identifier)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }
}
