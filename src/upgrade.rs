use crate::error::BummrResult;
use crate::types::{CommitRef, ExclusionSet, UpgradeCandidate};

const SUBJECT_PREFIX: &str = "Update ";

/// The dependency manager as seen by the retry loop.
pub trait UpgradeSource {
    /// Brings installed dependencies in line with the lockfile.
    ///
    /// A failed install does not stop the run; it comes back as a warning
    /// so the caller can log why the tests that follow may fail.
    fn prepare(&self) -> BummrResult<Option<String>>;

    fn list_candidates(&self, excluding: &ExclusionSet) -> BummrResult<Vec<UpgradeCandidate>>;

    /// Applies each candidate as its own commit.
    fn apply(&self, candidates: &[UpgradeCandidate]) -> BummrResult<()>;

    /// Maps a commit back to the upgrade identifier it introduced, if any.
    fn identify(&self, commit: &CommitRef) -> BummrResult<Option<String>>;
}

pub fn commit_message(name: &str, from: &str, to: &str) -> String {
    format!("{SUBJECT_PREFIX}{name} from {from} to {to}")
}

/// Inverse of [`commit_message`].
pub fn identifier_from_subject(subject: &str) -> Option<String> {
    let rest = subject.trim().strip_prefix(SUBJECT_PREFIX)?;
    let (name, tail) = rest.split_once(" from ")?;
    if name.is_empty() || name.contains(char::is_whitespace) || !tail.contains(" to ") {
        return None;
    }
    Some(name.to_string())
}
