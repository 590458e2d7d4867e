//! Bisection engine.
//!
//! `git bisect run` owns the stepping; this module opens the session, feeds
//! the tool's line stream through [`CulpritParser`] and always resets the
//! session before returning.

use std::time::Duration;

use crate::error::{BummrError, BummrResult};
use crate::git::Git;
use crate::oracle::Oracle;
use crate::process::{ProcessError, run_command_streaming};
use crate::types::{BisectOutcome, CommitRef, Range};

const CULPRIT_SUFFIX: &str = " is the first bad commit";
const SUCCESS_LINES: [&str; 2] = ["bisect run success", "bisect found first bad commit"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind<'a> {
    Culprit(&'a str),
    Success,
    Passthrough,
}

pub fn classify(line: &str) -> LineKind<'_> {
    let line = line.trim_end_matches(['\n', '\r']);
    if SUCCESS_LINES.contains(&line) {
        return LineKind::Success;
    }
    match line.strip_suffix(CULPRIT_SUFFIX).map(str::trim) {
        Some(id) if !id.is_empty() && !id.contains(char::is_whitespace) => LineKind::Culprit(id),
        _ => LineKind::Passthrough,
    }
}

/// Line-by-line state over the bisect output.
///
/// The latest culprit line seen before the success line wins; anything after
/// the success line no longer changes the result.
#[derive(Debug, Default)]
pub struct CulpritParser {
    provisional: Option<CommitRef>,
    converged: Option<Option<CommitRef>>,
}

impl CulpritParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed<'a>(&mut self, line: &'a str) -> LineKind<'a> {
        let kind = classify(line);
        if self.converged.is_some() {
            return kind;
        }
        match kind {
            LineKind::Culprit(id) => self.provisional = Some(CommitRef::new(id)),
            LineKind::Success => self.converged = Some(self.provisional.clone()),
            LineKind::Passthrough => {}
        }
        kind
    }

    pub fn outcome(&self) -> BisectOutcome {
        match &self.converged {
            Some(Some(culprit)) => BisectOutcome::Found(culprit.clone()),
            _ => BisectOutcome::Inconclusive,
        }
    }
}

/// Exit of one `bisect run` invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunExit {
    pub timed_out: bool,
}

/// The version-control bisection primitive.
pub trait BisectTool {
    fn is_ancestor(&self, good: &CommitRef, bad: &CommitRef) -> BummrResult<bool>;
    fn start(&self, range: &Range) -> BummrResult<()>;
    fn run(&self, argv: &[String], on_line: &mut dyn FnMut(&str)) -> BummrResult<RunExit>;
    fn reset(&self) -> BummrResult<()>;
}

pub trait Bisector {
    fn bisect(&self, range: &Range, oracle: &dyn Oracle) -> BummrResult<BisectOutcome>;
}

/// An open bisect session; dropping it without `close` still resets.
struct Session<'a> {
    tool: &'a dyn BisectTool,
    open: bool,
}

impl<'a> Session<'a> {
    fn open(tool: &'a dyn BisectTool, range: &Range) -> BummrResult<Self> {
        let session = Session { tool, open: true };
        tool.start(range)?;
        Ok(session)
    }

    fn close(mut self) -> BummrResult<()> {
        self.open = false;
        self.tool.reset()
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        if !self.open {
            return;
        }
        if let Err(e) = self.tool.reset() {
            eprintln!("bummr: git bisect reset failed: {e}");
            eprintln!("bummr: run 'git bisect reset' manually before retrying");
        }
    }
}

pub struct BisectEngine<T> {
    tool: T,
}

impl<T: BisectTool> BisectEngine<T> {
    pub fn new(tool: T) -> Self {
        Self { tool }
    }

    fn drive(&self, oracle: &dyn Oracle) -> BummrResult<BisectOutcome> {
        if let Err(reason) = oracle.probe() {
            return Ok(BisectOutcome::OracleError(reason));
        }
        let mut parser = CulpritParser::new();
        let run = self.tool.run(oracle.argv(), &mut |line| {
            println!("{line}");
            parser.feed(line);
        });
        match run {
            Ok(exit) if exit.timed_out => {
                eprintln!("bummr: bisect run timed out before converging");
                Ok(BisectOutcome::Inconclusive)
            }
            Ok(_) => Ok(parser.outcome()),
            Err(BummrError::Process {
                source: ProcessError::Spawn(e),
                ..
            }) => Ok(BisectOutcome::OracleError(format!(
                "bisect run could not start: {e}"
            ))),
            Err(BummrError::OracleUnavailable { command, source }) => Ok(
                BisectOutcome::OracleError(format!("'{command}' could not run: {source}")),
            ),
            Err(e) => Err(e),
        }
    }
}

impl<T: BisectTool> Bisector for BisectEngine<T> {
    fn bisect(&self, range: &Range, oracle: &dyn Oracle) -> BummrResult<BisectOutcome> {
        if range.good == range.bad || !self.tool.is_ancestor(&range.good, &range.bad)? {
            return Err(BummrError::InvalidRange {
                good: range.good.to_string(),
                bad: range.bad.to_string(),
            });
        }
        let session = Session::open(&self.tool, range)?;
        let outcome = self.drive(oracle);
        let closed = session.close();
        let outcome = outcome?;
        closed?;
        Ok(outcome)
    }
}

/// `git bisect` driven through the CLI.
#[derive(Debug, Clone)]
pub struct GitBisect {
    git: Git,
    timeout: Option<Duration>,
}

impl GitBisect {
    pub fn new(git: Git, timeout: Option<Duration>) -> Self {
        Self { git, timeout }
    }
}

impl BisectTool for GitBisect {
    fn is_ancestor(&self, good: &CommitRef, bad: &CommitRef) -> BummrResult<bool> {
        self.git.is_ancestor(good, bad)
    }

    fn start(&self, range: &Range) -> BummrResult<()> {
        self.git.run_ok(&["bisect", "start"])?;
        self.git.run_ok(&["bisect", "bad", range.bad.as_str()])?;
        self.git.run_ok(&["bisect", "good", range.good.as_str()])
    }

    fn run(&self, argv: &[String], on_line: &mut dyn FnMut(&str)) -> BummrResult<RunExit> {
        let mut cmd = self.git.command();
        cmd.args(["bisect", "run"]).args(argv);
        let exit = run_command_streaming(cmd, "git bisect run", self.timeout, on_line)
            .map_err(|e| BummrError::process("git bisect run", e))?;
        if let Some(status) = exit.status
            && !status.success()
        {
            eprintln!(
                "bummr: git bisect run exited with {}",
                status.code().unwrap_or(-1)
            );
        }
        Ok(RunExit {
            timed_out: exit.timed_out,
        })
    }

    fn reset(&self) -> BummrResult<()> {
        self.git.run_ok(&["bisect", "reset"])
    }
}
