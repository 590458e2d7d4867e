//! The upgrade, test, bisect and remove retry loop.
//!
//! A [`Workflow`] owns the exclusion set for one invocation and moves
//! through [`State`]s until it reaches `Done` or `Blocked`. Every external
//! effect goes through the collaborator traits, so the loop itself only
//! does bookkeeping.

use serde::Serialize;

use crate::bisect::Bisector;
use crate::check::Preflight;
use crate::error::{BummrError, BummrResult};
use crate::oracle::Oracle;
use crate::rebaser::HistoryEditor;
use crate::runlog::{EventInput, Journal};
use crate::types::{
    BisectOutcome, CommitRef, ExclusionSet, Range, RebaseResult, RemovalResult, UpgradeCandidate,
    Verdict,
};
use crate::upgrade::UpgradeSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DoneReason {
    Passed,
    NothingToUpdate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum BlockReason {
    Inconclusive,
    OracleError { reason: String },
    /// Removing this commit stopped on conflicts.
    RewriteConflict { commit: CommitRef },
    RebaseConflict { base: String },
    /// The suite fails with no commits on top of the base.
    BaseFails { base: String },
    /// Bisection blamed an identifier that was already excluded.
    RepeatedCulprit { identifier: String, commit: CommitRef },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    Idle,
    Checking,
    Updating,
    Testing,
    Bisecting,
    Removing(CommitRef),
    Retesting,
    Done(DoneReason),
    Blocked(BlockReason),
}

impl State {
    pub fn name(&self) -> &'static str {
        match self {
            State::Idle => "idle",
            State::Checking => "checking",
            State::Updating => "updating",
            State::Testing => "testing",
            State::Bisecting => "bisecting",
            State::Removing(_) => "removing",
            State::Retesting => "retesting",
            State::Done(_) => "done",
            State::Blocked(_) => "blocked",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Done(_) | State::Blocked(_))
    }
}

/// Services the loop drives. None of them keep state between calls.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub preflight: &'a dyn Preflight,
    pub source: &'a dyn UpgradeSource,
    pub oracle: &'a dyn Oracle,
    pub bisector: &'a dyn Bisector,
    pub history: &'a dyn HistoryEditor,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum Outcome {
    Done { reason: DoneReason },
    Blocked { reason: BlockReason },
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub outcome: Outcome,
    pub cycles: u32,
    pub trace: Vec<String>,
    pub excluded: ExclusionSet,
    pub removed: Vec<CommitRef>,
}

impl RunReport {
    /// The error an operator sees for a blocked run.
    pub fn blocked_error(&self) -> Option<BummrError> {
        let Outcome::Blocked { reason } = &self.outcome else {
            return None;
        };
        Some(match reason {
            BlockReason::Inconclusive => BummrError::BisectionInconclusive {
                context: "git bisect did not isolate a single commit".to_string(),
            },
            BlockReason::OracleError { reason } => BummrError::BisectionInconclusive {
                context: format!("the test command failed to run during bisection: {reason}"),
            },
            BlockReason::RepeatedCulprit { identifier, commit } => {
                BummrError::BisectionInconclusive {
                    context: format!(
                        "{commit} was blamed but {identifier} is already excluded; the failure is not caused by an update"
                    ),
                }
            }
            BlockReason::BaseFails { base } => BummrError::BisectionInconclusive {
                context: format!("the tests fail on {base} itself; there is nothing to bisect"),
            },
            BlockReason::RewriteConflict { commit } => BummrError::RewriteConflict {
                context: format!("removing {commit} stopped on conflicts"),
            },
            BlockReason::RebaseConflict { base } => BummrError::RewriteConflict {
                context: format!("rebasing onto {base} stopped on conflicts"),
            },
        })
    }
}

pub struct Workflow<'a> {
    services: Collaborators<'a>,
    journal: &'a Journal,
    base: String,
    interactive: bool,
    state: State,
    exclusions: ExclusionSet,
    removed: Vec<CommitRef>,
    // A commit was removed since the oracle last ran; the tree is untested.
    untested_removal: bool,
    cycles: u32,
    trace: Vec<String>,
}

impl<'a> Workflow<'a> {
    pub fn new(services: Collaborators<'a>, journal: &'a Journal, base: impl Into<String>) -> Self {
        Self {
            services,
            journal,
            base: base.into(),
            interactive: false,
            state: State::Idle,
            exclusions: ExclusionSet::new(),
            removed: Vec::new(),
            untested_removal: false,
            cycles: 0,
            trace: Vec::new(),
        }
    }

    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    /// Runs from `Idle` to a terminal state.
    pub fn run(self) -> BummrResult<RunReport> {
        self.run_from(State::Idle)
    }

    /// Runs from `entry`; `bummr test` enters at `Testing`, `bummr bisect`
    /// at `Bisecting`.
    pub fn run_from(mut self, entry: State) -> BummrResult<RunReport> {
        let skips_checking = matches!(entry, State::Testing | State::Bisecting);
        self.enter(entry);
        if skips_checking {
            self.prepare()?;
        }
        while !self.state.is_terminal() {
            let next = self.step()?;
            self.enter(next);
        }
        Ok(self.into_report())
    }

    fn enter(&mut self, state: State) {
        self.trace.push(state.name().to_string());
        let (identifier, commit, detail) = match &state {
            State::Removing(c) => (None, Some(c.as_str()), None),
            State::Done(reason) => (None, None, Some(format!("{reason:?}"))),
            State::Blocked(BlockReason::RepeatedCulprit { identifier, commit }) => (
                Some(identifier.as_str()),
                Some(commit.as_str()),
                Some("repeated culprit".to_string()),
            ),
            State::Blocked(reason) => (None, None, Some(format!("{reason:?}"))),
            _ => (None, None, None),
        };
        self.journal.record(
            "state",
            EventInput {
                state: Some(state.name()),
                cycle: self.cycles,
                identifier,
                commit,
                excluded: self.exclusions.to_vec(),
                detail,
            },
        );
        self.state = state;
    }

    /// Performs the work of the current state and returns the next one.
    pub fn step(&mut self) -> BummrResult<State> {
        match self.state.clone() {
            State::Idle => Ok(State::Checking),
            State::Checking => self.check(),
            State::Updating => self.update(),
            State::Testing | State::Retesting => self.test(),
            State::Bisecting => self.bisect(),
            State::Removing(culprit) => self.remove(&culprit),
            terminal => Ok(terminal),
        }
    }

    fn check(&mut self) -> BummrResult<State> {
        self.services.preflight.verify(false)?;
        self.prepare()?;
        Ok(State::Updating)
    }

    // Installs the locked dependencies before the oracle can run against them.
    fn prepare(&self) -> BummrResult<()> {
        let Some(warning) = self.services.source.prepare()? else {
            return Ok(());
        };
        eprintln!("bummr: {warning}; continuing");
        self.journal.record(
            "prepare_failed",
            EventInput {
                state: Some(self.state.name()),
                cycle: self.cycles,
                excluded: self.exclusions.to_vec(),
                detail: Some(warning),
                ..EventInput::default()
            },
        );
        Ok(())
    }

    fn candidates(&self) -> BummrResult<Vec<UpgradeCandidate>> {
        let listed = self.services.source.list_candidates(&self.exclusions)?;
        Ok(listed
            .into_iter()
            .filter(|c| !self.exclusions.contains(&c.name))
            .collect())
    }

    fn update(&mut self) -> BummrResult<State> {
        self.cycles += 1;
        let candidates = self.candidates()?;
        if candidates.is_empty() {
            if self.untested_removal {
                println!("bummr: no further updates; retesting after removal");
                return Ok(State::Retesting);
            }
            println!("bummr: no outdated gems to update");
            return Ok(State::Done(DoneReason::NothingToUpdate));
        }
        println!(
            "bummr: cycle {}: updating {} gem(s), {} excluded",
            self.cycles,
            candidates.len(),
            self.exclusions.len()
        );
        self.services.source.apply(&candidates)?;
        match self
            .services
            .history
            .rebase_onto(&self.base, self.interactive)?
        {
            RebaseResult::Rebased => Ok(State::Testing),
            RebaseResult::Conflict => Ok(State::Blocked(BlockReason::RebaseConflict {
                base: self.base.clone(),
            })),
        }
    }

    fn test(&mut self) -> BummrResult<State> {
        self.untested_removal = false;
        println!("bummr: running the test suite");
        match self.services.oracle.run()? {
            Verdict::Pass => {
                println!("bummr: passed");
                Ok(State::Done(DoneReason::Passed))
            }
            Verdict::Fail => {
                println!("bummr: failed; bisecting against {}", self.base);
                Ok(State::Bisecting)
            }
        }
    }

    fn bisect(&mut self) -> BummrResult<State> {
        let range = Range {
            good: self.services.history.resolve(&self.base)?,
            bad: self.services.history.resolve("HEAD")?,
        };
        if range.good == range.bad {
            return Ok(State::Blocked(BlockReason::BaseFails {
                base: self.base.clone(),
            }));
        }
        let outcome = self
            .services
            .bisector
            .bisect(&range, self.services.oracle)?;
        let culprit = match outcome {
            BisectOutcome::Found(culprit) => culprit,
            BisectOutcome::Inconclusive => return Ok(State::Blocked(BlockReason::Inconclusive)),
            BisectOutcome::OracleError(reason) => {
                return Ok(State::Blocked(BlockReason::OracleError { reason }));
            }
        };
        let identifier = self
            .services
            .source
            .identify(&culprit)?
            .unwrap_or_else(|| culprit.to_string());
        if !self.exclusions.insert(identifier.clone()) {
            return Ok(State::Blocked(BlockReason::RepeatedCulprit {
                identifier,
                commit: culprit,
            }));
        }
        println!("bummr: {culprit} breaks the build; excluding {identifier}");
        self.journal.record(
            "excluded",
            EventInput {
                state: Some(self.state.name()),
                cycle: self.cycles,
                identifier: Some(&identifier),
                commit: Some(culprit.as_str()),
                excluded: self.exclusions.to_vec(),
                detail: None,
            },
        );
        Ok(State::Removing(culprit))
    }

    fn remove(&mut self, culprit: &CommitRef) -> BummrResult<State> {
        match self.services.history.remove(culprit)? {
            RemovalResult::Removed => {
                println!("bummr: removed {culprit}");
                self.removed.push(culprit.clone());
                self.untested_removal = true;
                Ok(State::Checking)
            }
            RemovalResult::Conflict => Ok(State::Blocked(BlockReason::RewriteConflict {
                commit: culprit.clone(),
            })),
        }
    }

    fn into_report(self) -> RunReport {
        let outcome = match self.state {
            State::Blocked(reason) => Outcome::Blocked { reason },
            State::Done(reason) => Outcome::Done { reason },
            // run_from only returns once the state is terminal
            _ => Outcome::Done {
                reason: DoneReason::NothingToUpdate,
            },
        };
        RunReport {
            outcome,
            cycles: self.cycles,
            trace: self.trace,
            excluded: self.exclusions,
            removed: self.removed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runlog::{RunEvent, recent_events};
    use std::cell::{Cell, RefCell};
    use std::collections::BTreeSet;

    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Removal {
        Real,
        Ignored,
        Conflict,
    }

    /// A branch of one-gem commits; a gem in `bad` breaks the suite while
    /// its commit is on the branch.
    struct Sim {
        outdated: Vec<&'static str>,
        bad: BTreeSet<&'static str>,
        branch: RefCell<Vec<String>>,
        applied: RefCell<Vec<String>>,
        offered_while_excluded: Cell<bool>,
        oracle_runs: Cell<u32>,
        prepare_runs: Cell<u32>,
        install_warning: Option<String>,
        removal: Removal,
        bisect_override: Option<BisectOutcome>,
        rebase_conflict: bool,
        head_on_base: bool,
    }

    impl Sim {
        fn new(outdated: &[&'static str], bad: &[&'static str]) -> Self {
            Sim {
                outdated: outdated.to_vec(),
                bad: bad.iter().copied().collect(),
                branch: RefCell::new(Vec::new()),
                applied: RefCell::new(Vec::new()),
                offered_while_excluded: Cell::new(false),
                oracle_runs: Cell::new(0),
                prepare_runs: Cell::new(0),
                install_warning: None,
                removal: Removal::Real,
                bisect_override: None,
                rebase_conflict: false,
                head_on_base: false,
            }
        }

        fn services(&self) -> Collaborators<'_> {
            Collaborators {
                preflight: self,
                source: self,
                oracle: self,
                bisector: self,
                history: self,
            }
        }

        fn first_bad(&self) -> Option<String> {
            self.branch
                .borrow()
                .iter()
                .find(|g| self.bad.contains(g.as_str()))
                .cloned()
        }
    }

    impl Preflight for Sim {
        fn verify(&self, _full: bool) -> BummrResult<()> {
            Ok(())
        }
    }

    impl UpgradeSource for Sim {
        fn prepare(&self) -> BummrResult<Option<String>> {
            self.prepare_runs.set(self.prepare_runs.get() + 1);
            Ok(self.install_warning.clone())
        }

        fn list_candidates(&self, excluding: &ExclusionSet) -> BummrResult<Vec<UpgradeCandidate>> {
            let branch = self.branch.borrow();
            Ok(self
                .outdated
                .iter()
                .filter(|g| !excluding.contains(g))
                .filter(|g| !branch.iter().any(|b| b == *g))
                .map(|g| UpgradeCandidate {
                    name: g.to_string(),
                    installed: "1.0".to_string(),
                    newest: "2.0".to_string(),
                })
                .collect())
        }

        fn apply(&self, candidates: &[UpgradeCandidate]) -> BummrResult<()> {
            for c in candidates {
                self.branch.borrow_mut().push(c.name.clone());
                self.applied.borrow_mut().push(c.name.clone());
            }
            Ok(())
        }

        fn identify(&self, commit: &CommitRef) -> BummrResult<Option<String>> {
            Ok(commit.as_str().strip_prefix("c-").map(str::to_string))
        }
    }

    impl Oracle for Sim {
        fn run(&self) -> BummrResult<Verdict> {
            self.oracle_runs.set(self.oracle_runs.get() + 1);
            Ok(if self.first_bad().is_some() {
                Verdict::Fail
            } else {
                Verdict::Pass
            })
        }

        fn argv(&self) -> &[String] {
            &[]
        }

        fn probe(&self) -> Result<(), String> {
            Ok(())
        }
    }

    impl Bisector for Sim {
        fn bisect(&self, range: &Range, _oracle: &dyn Oracle) -> BummrResult<BisectOutcome> {
            assert_eq!(range.good.as_str(), "master");
            assert_eq!(range.bad.as_str(), "HEAD");
            if let Some(outcome) = &self.bisect_override {
                return Ok(outcome.clone());
            }
            Ok(match self.first_bad() {
                Some(gem) => BisectOutcome::Found(CommitRef::new(format!("c-{gem}"))),
                None => BisectOutcome::Inconclusive,
            })
        }
    }

    impl HistoryEditor for Sim {
        fn resolve(&self, rev: &str) -> BummrResult<CommitRef> {
            if self.head_on_base && rev == "HEAD" {
                return Ok(CommitRef::new("master"));
            }
            Ok(CommitRef::new(rev))
        }

        fn remove(&self, culprit: &CommitRef) -> BummrResult<RemovalResult> {
            match self.removal {
                Removal::Conflict => return Ok(RemovalResult::Conflict),
                Removal::Ignored => {}
                Removal::Real => {
                    let gem = culprit.as_str().trim_start_matches("c-");
                    self.branch.borrow_mut().retain(|g| g != gem);
                }
            }
            Ok(RemovalResult::Removed)
        }

        fn rebase_onto(&self, base: &str, interactive: bool) -> BummrResult<RebaseResult> {
            assert_eq!(base, "master");
            assert!(!interactive);
            Ok(if self.rebase_conflict {
                RebaseResult::Conflict
            } else {
                RebaseResult::Rebased
            })
        }
    }

    // Wraps list_candidates to catch a selection of an excluded gem.
    struct Watch<'s>(&'s Sim);

    impl UpgradeSource for Watch<'_> {
        fn prepare(&self) -> BummrResult<Option<String>> {
            self.0.prepare()
        }

        fn list_candidates(&self, excluding: &ExclusionSet) -> BummrResult<Vec<UpgradeCandidate>> {
            self.0.list_candidates(excluding)
        }

        fn apply(&self, candidates: &[UpgradeCandidate]) -> BummrResult<()> {
            let applied = self.0.applied.borrow().clone();
            for c in candidates {
                if self.0.bad.contains(c.name.as_str()) && applied.contains(&c.name) {
                    self.0.offered_while_excluded.set(true);
                }
            }
            self.0.apply(candidates)
        }

        fn identify(&self, commit: &CommitRef) -> BummrResult<Option<String>> {
            self.0.identify(commit)
        }
    }

    fn run(sim: &Sim) -> RunReport {
        let journal = Journal::disabled();
        Workflow::new(sim.services(), &journal, "master")
            .run()
            .expect("workflow run")
    }

    #[test]
    fn clean_upgrade_passes_in_one_cycle() {
        let sim = Sim::new(&["rack", "rake"], &[]);
        let report = run(&sim);
        assert!(matches!(
            report.outcome,
            Outcome::Done {
                reason: DoneReason::Passed
            }
        ));
        assert_eq!(report.cycles, 1);
        assert_eq!(
            report.trace,
            vec!["idle", "checking", "updating", "testing", "done"]
        );
        assert!(report.excluded.is_empty());
    }

    #[test]
    fn empty_candidate_set_finishes_without_the_oracle() {
        let sim = Sim::new(&[], &[]);
        let report = run(&sim);
        assert!(matches!(
            report.outcome,
            Outcome::Done {
                reason: DoneReason::NothingToUpdate
            }
        ));
        assert_eq!(sim.oracle_runs.get(), 0);
    }

    #[test]
    fn culprits_are_excluded_and_removed_until_green() {
        let sim = Sim::new(&["a", "b", "c", "d", "e"], &["b", "d"]);
        let report = run(&sim);
        assert!(matches!(
            report.outcome,
            Outcome::Done {
                reason: DoneReason::Passed
            }
        ));
        assert_eq!(report.excluded.to_vec(), vec!["b", "d"]);
        assert_eq!(
            report.removed,
            vec![CommitRef::new("c-b"), CommitRef::new("c-d")]
        );
        assert_eq!(*sim.branch.borrow(), vec!["a", "c", "e"]);
        assert!(report.cycles <= 6, "took {} cycles", report.cycles);
        assert!(report.trace.contains(&"retesting".to_string()));
    }

    #[test]
    fn excluded_identifiers_are_never_reapplied() {
        let sim = Sim::new(&["a", "b", "c"], &["a", "c"]);
        let watch = Watch(&sim);
        let journal = Journal::disabled();
        let services = Collaborators {
            source: &watch,
            ..sim.services()
        };
        let report = Workflow::new(services, &journal, "master")
            .run()
            .expect("run");
        assert!(matches!(report.outcome, Outcome::Done { .. }));
        assert!(!sim.offered_while_excluded.get());
        let applied = sim.applied.borrow();
        assert_eq!(applied.iter().filter(|g| *g == "a").count(), 1);
        assert_eq!(applied.iter().filter(|g| *g == "c").count(), 1);
    }

    #[test]
    fn termination_is_bounded_when_every_candidate_is_bad() {
        let gems = ["a", "b", "c", "d"];
        let sim = Sim::new(&gems, &gems);
        let report = run(&sim);
        assert!(matches!(report.outcome, Outcome::Done { .. }));
        assert_eq!(report.excluded.len(), gems.len());
        assert!(report.cycles as usize <= gems.len() + 1);
    }

    #[test]
    fn inconclusive_bisection_blocks() {
        let mut sim = Sim::new(&["a"], &["a"]);
        sim.bisect_override = Some(BisectOutcome::Inconclusive);
        let report = run(&sim);
        assert!(matches!(
            report.outcome,
            Outcome::Blocked {
                reason: BlockReason::Inconclusive
            }
        ));
        assert!(report.excluded.is_empty());
        assert_eq!(report.blocked_error().map(|e| e.exit_code()), Some(3));
    }

    #[test]
    fn oracle_error_during_bisection_blocks() {
        let mut sim = Sim::new(&["a"], &["a"]);
        sim.bisect_override = Some(BisectOutcome::OracleError("'rake' not found".to_string()));
        let report = run(&sim);
        match report.outcome {
            Outcome::Blocked {
                reason: BlockReason::OracleError { reason },
            } => assert!(reason.contains("rake")),
            other => panic!("expected oracle error, got {other:?}"),
        }
    }

    #[test]
    fn removal_conflict_blocks() {
        let mut sim = Sim::new(&["a", "b"], &["b"]);
        sim.removal = Removal::Conflict;
        let report = run(&sim);
        match &report.outcome {
            Outcome::Blocked {
                reason: BlockReason::RewriteConflict { commit },
            } => assert_eq!(commit.as_str(), "c-b"),
            other => panic!("expected rewrite conflict, got {other:?}"),
        }
        assert!(report.excluded.contains("b"));
        assert!(report.removed.is_empty());
    }

    #[test]
    fn rebase_conflict_blocks_before_testing() {
        let mut sim = Sim::new(&["a"], &[]);
        sim.rebase_conflict = true;
        let report = run(&sim);
        assert!(matches!(
            report.outcome,
            Outcome::Blocked {
                reason: BlockReason::RebaseConflict { .. }
            }
        ));
        assert_eq!(sim.oracle_runs.get(), 0);
    }

    #[test]
    fn repeated_culprit_blocks_instead_of_looping() {
        let mut sim = Sim::new(&["a"], &["a"]);
        sim.removal = Removal::Ignored;
        let report = run(&sim);
        match &report.outcome {
            Outcome::Blocked {
                reason: BlockReason::RepeatedCulprit { identifier, .. },
            } => assert_eq!(identifier, "a"),
            other => panic!("expected repeated culprit, got {other:?}"),
        }
        assert_eq!(report.excluded.len(), 1);
    }

    #[test]
    fn entering_at_testing_skips_the_update() {
        let sim = Sim::new(&["a"], &[]);
        let journal = Journal::disabled();
        let report = Workflow::new(sim.services(), &journal, "master")
            .run_from(State::Testing)
            .expect("run");
        assert_eq!(report.trace, vec!["testing", "done"]);
        assert!(sim.applied.borrow().is_empty());
    }

    #[test]
    fn dependencies_are_installed_before_testing_or_bisecting() {
        for entry in [State::Testing, State::Bisecting] {
            let sim = Sim::new(&[], &[]);
            let journal = Journal::disabled();
            let name = entry.name();
            Workflow::new(sim.services(), &journal, "master")
                .run_from(entry)
                .expect("run");
            assert_eq!(sim.prepare_runs.get(), 1, "entering at {name}");
        }
    }

    #[test]
    fn failed_install_is_journaled_and_the_run_continues() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("runs.jsonl");
        let mut sim = Sim::new(&["a"], &[]);
        sim.install_warning = Some("bundle install exited with 5: no network".to_string());
        let journal = Journal::new(Some(path.clone()), "update", "master", "rake");
        let report = Workflow::new(sim.services(), &journal, "master")
            .run()
            .expect("run");
        assert!(matches!(
            report.outcome,
            Outcome::Done {
                reason: DoneReason::Passed
            }
        ));
        let rows = recent_events(&path, 50).expect("events");
        let failed: Vec<&RunEvent> = rows.iter().filter(|r| r.event == "prepare_failed").collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].state.as_deref(), Some("checking"));
        assert!(
            failed[0]
                .detail
                .as_deref()
                .is_some_and(|d| d.contains("no network"))
        );
    }

    #[test]
    fn failing_suite_on_the_base_blocks_without_bisecting() {
        let mut sim = Sim::new(&[], &["x"]);
        sim.branch.borrow_mut().push("x".to_string());
        sim.head_on_base = true;
        let journal = Journal::disabled();
        let report = Workflow::new(sim.services(), &journal, "master")
            .run_from(State::Testing)
            .expect("run");
        match &report.outcome {
            Outcome::Blocked {
                reason: BlockReason::BaseFails { base },
            } => assert_eq!(base, "master"),
            other => panic!("expected base failure, got {other:?}"),
        }
        assert_eq!(report.trace, vec!["testing", "bisecting", "blocked"]);
        let err = report.blocked_error().expect("blocked error");
        assert_eq!(err.exit_code(), 3);
        assert!(err.to_string().contains("fail on master itself"));
    }

    #[test]
    fn entering_at_bisecting_removes_an_existing_bad_commit() {
        let sim = Sim::new(&[], &["x"]);
        sim.branch.borrow_mut().extend(["ok".to_string(), "x".to_string()]);
        let journal = Journal::disabled();
        let report = Workflow::new(sim.services(), &journal, "master")
            .run_from(State::Bisecting)
            .expect("run");
        assert!(matches!(
            report.outcome,
            Outcome::Done {
                reason: DoneReason::Passed
            }
        ));
        assert_eq!(
            report.trace,
            vec![
                "bisecting",
                "removing",
                "checking",
                "updating",
                "retesting",
                "done"
            ]
        );
        assert_eq!(*sim.branch.borrow(), vec!["ok"]);
    }

    #[test]
    fn foreign_culprits_are_excluded_by_hash() {
        let mut sim = Sim::new(&[], &[]);
        sim.bisect_override = Some(BisectOutcome::Found(CommitRef::new("deadbeef")));
        sim.removal = Removal::Ignored;
        let journal = Journal::disabled();
        let report = Workflow::new(sim.services(), &journal, "master")
            .run_from(State::Bisecting)
            .expect("run");
        assert!(report.excluded.contains("deadbeef"));
        assert_eq!(report.removed, vec![CommitRef::new("deadbeef")]);
    }
}
