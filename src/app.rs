use std::env;
use std::io::{self, IsTerminal, Write};

use crate::bisect::{BisectEngine, GitBisect};
use crate::bundler::{Bundler, OutdatedOptions};
use crate::check::{Preflight, RepoCheck};
use crate::config::{APP_DESC, APP_NAME, APP_VERSION, AppConfig, DEFAULT_LOG_WINDOW};
use crate::error::{
    BummrError, BummrResult, EXIT_BLOCKED, EXIT_DECLINED, EXIT_OK, EXIT_RUNTIME, EXIT_USAGE,
    format_error, print_usage_error,
};
use crate::git::Git;
use crate::oracle::TestCommand;
use crate::paths::resolve_log_file;
use crate::rebaser::{HistoryEditor, Rebaser};
use crate::runlog::{EventInput, Journal, format_event, recent_events};
use crate::types::RemovalResult;
use crate::workflow::{BlockReason, Collaborators, DoneReason, Outcome, RunReport, State, Workflow};

fn print_help() {
    println!("{APP_NAME} - {APP_DESC}");
    println!();
    println!("Usage:");
    println!("  {APP_NAME} <command> [args]");
    println!();
    println!("Commands:");
    println!("  check [--json]                 Verify tools and repository state");
    println!("  update [--all] [--group G] [--headless]");
    println!("                                 Update outdated gems, test, bisect away failures");
    println!("  test [--headless]              Run the tests; bisect and remove the culprit on failure");
    println!("  bisect [--headless]            Bisect from the base branch to HEAD and remove the culprit");
    println!("  remove-commit <sha>            Drop one commit from the current branch");
    println!("  log [N]                        Show the last N run log events (default {DEFAULT_LOG_WINDOW})");
    println!("  version                        Print tool version");
    println!("  help                           Show this help");
    println!();
    println!("Environment:");
    println!("  BUMMR_TEST                     Test command (default: bundle exec rake)");
    println!("  BASE_BRANCH                    Branch the updates are based on (default: master)");
    println!("  BUMMR_HEADLESS=1               Never prompt; rebase non-interactively");
    println!("  BUMMR_TEST_TIMEOUT_SECS        Kill and fail a test run after N seconds");
    println!("  BUMMR_BISECT_TIMEOUT_SECS      Give up on a bisect run after N seconds");
    println!("  BUMMR_LOG_ENABLED=0            Disable the JSONL run log");
    println!("  BUMMR_LOG_FILE                 Run log path (default: <git-dir>/bummr/runs.jsonl)");
}

fn print_version() {
    println!("{APP_NAME} {APP_VERSION}");
}

/// Resolved once per command: configuration, repository, run journal.
struct Runtime {
    config: AppConfig,
    git: Git,
    journal: Journal,
}

impl Runtime {
    fn new(config: AppConfig, command: &str) -> BummrResult<Self> {
        let cwd = env::current_dir().map_err(|e| BummrError::io("cannot read current dir", e))?;
        let git = Git::new(cwd);
        let path = if config.log_enabled {
            resolve_log_file(&config, &git)
        } else {
            None
        };
        let journal = Journal::new(path, command, &config.base_branch, &config.test_command);
        Ok(Self {
            config,
            git,
            journal,
        })
    }

    fn interactive(&self) -> bool {
        !self.config.headless && io::stdin().is_terminal()
    }

    fn preflight(&self) -> RepoCheck {
        RepoCheck::new(self.git.clone(), &self.config.base_branch)
    }

    fn drive(&self, entry: State, interactive: bool) -> BummrResult<RunReport> {
        let argv = self.config.test_argv().map_err(BummrError::invalid)?;
        let preflight = self.preflight();
        let source = Bundler::new(
            self.git.clone(),
            OutdatedOptions {
                all_gems: self.config.all_gems,
                group: self.config.group.clone(),
            },
        );
        let oracle = TestCommand::new(argv, self.git.workdir(), self.config.test_timeout);
        let bisector = BisectEngine::new(GitBisect::new(self.git.clone(), self.config.bisect_timeout));
        let history = Rebaser::new(self.git.clone());
        let services = Collaborators {
            preflight: &preflight,
            source: &source,
            oracle: &oracle,
            bisector: &bisector,
            history: &history,
        };
        Workflow::new(services, &self.journal, self.config.base_branch.as_str())
            .interactive(interactive)
            .run_from(entry)
    }

    fn record_failure(&self, scope: &str, err: &BummrError) {
        self.journal.record(
            "error",
            EventInput {
                state: Some(scope),
                detail: Some(err.to_string()),
                ..EventInput::default()
            },
        );
    }
}

fn fail(scope: &str, err: &BummrError) -> i32 {
    eprintln!("{}", format_error(scope, &err.to_string()));
    match err {
        BummrError::ToolMissing { .. } => {
            eprintln!("{APP_NAME}: install the missing tools and make sure they are on PATH");
        }
        BummrError::Process { source, .. } => {
            if let Some(info) = source.timeout_info() {
                eprintln!(
                    "{APP_NAME}: '{}' was stopped after {}s; raise BUMMR_CMD_TIMEOUT_SECS to allow more time",
                    info.label, info.timeout_secs
                );
            }
        }
        _ => {}
    }
    err.exit_code()
}

fn confirm(question: &str) -> bool {
    print!("{question} (y/n) ");
    let _ = io::stdout().flush();
    let mut answer = String::new();
    if io::stdin().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn print_resume_hint(reason: &BlockReason, base: &str) {
    match reason {
        BlockReason::RewriteConflict { .. } | BlockReason::RebaseConflict { .. } => {
            println!("{APP_NAME}: a rebase is paused with conflicts.");
            println!("  resolve them, 'git add' the files and run 'git rebase --continue'");
            println!("  (or 'git rebase --abort' to return to the previous history)");
            println!("  then run '{APP_NAME} test' to continue");
        }
        BlockReason::BaseFails { .. } => {
            println!("{APP_NAME}: no commit on this branch is to blame.");
            println!("  make the test suite pass on {base} first, then run '{APP_NAME} update'");
        }
        BlockReason::Inconclusive
        | BlockReason::OracleError { .. }
        | BlockReason::RepeatedCulprit { .. } => {
            println!("{APP_NAME}: the bisect session was reset; the branch is unchanged since the last removal.");
            println!("  inspect the failure against {base}, fix or drop the offending commit,");
            println!("  then run '{APP_NAME} test' to continue");
        }
    }
}

fn finish(rt: &Runtime, scope: &str, result: BummrResult<RunReport>) -> i32 {
    if let Some(path) = rt.journal.path() {
        println!(
            "{APP_NAME}: run {} logged to {}",
            rt.journal.run_id(),
            path.display()
        );
    }
    let report = match result {
        Ok(report) => report,
        Err(e) => {
            rt.record_failure(scope, &e);
            return fail(scope, &e);
        }
    };
    let state = match &report.outcome {
        Outcome::Done { .. } => "done",
        Outcome::Blocked { .. } => "blocked",
    };
    rt.journal.record(
        "finished",
        EventInput {
            state: Some(state),
            cycle: report.cycles,
            excluded: report.excluded.to_vec(),
            detail: serde_json::to_string(&report).ok(),
            ..EventInput::default()
        },
    );
    if !report.removed.is_empty() {
        println!("{APP_NAME}: removed commits:");
        for commit in &report.removed {
            println!("  {commit}");
        }
    }
    if !report.excluded.is_empty() {
        let names: Vec<&str> = report.excluded.iter().collect();
        println!("{APP_NAME}: excluded: {}", names.join(", "));
    }
    match &report.outcome {
        Outcome::Done { reason } => {
            match reason {
                DoneReason::Passed => println!("{APP_NAME}: done; the test suite passes"),
                DoneReason::NothingToUpdate => println!("{APP_NAME}: done; nothing left to update"),
            }
            if let Ok(log) = rt.git.log_oneline(10) {
                println!("{log}");
            }
            EXIT_OK
        }
        Outcome::Blocked { reason } => {
            if let Some(err) = report.blocked_error() {
                eprintln!("{}", format_error(scope, &err.to_string()));
            }
            print_resume_hint(reason, &rt.config.base_branch);
            EXIT_BLOCKED
        }
    }
}

fn runtime_or_exit(config: AppConfig, scope: &str) -> Result<Runtime, i32> {
    Runtime::new(config, scope).map_err(|e| fail(scope, &e))
}

fn cmd_check(args: &[String]) -> i32 {
    let mut json = false;
    for arg in args {
        match arg.as_str() {
            "--json" => json = true,
            _ => return print_usage_error("check", &format!("{APP_NAME} check [--json]")),
        }
    }
    let rt = match runtime_or_exit(AppConfig::from_env(), "check") {
        Ok(rt) => rt,
        Err(code) => return code,
    };
    let report = rt.preflight().report(true);
    if json {
        match serde_json::to_string_pretty(&report) {
            Ok(s) => println!("{s}"),
            Err(e) => {
                return fail("check", &BummrError::json("check report serialize", e));
            }
        }
    } else {
        report.print();
    }
    match report.into_result() {
        Ok(()) => EXIT_OK,
        Err(e) if json => e.exit_code(),
        Err(e) => fail("check", &e),
    }
}

fn cmd_update(args: &[String]) -> i32 {
    let usage = format!("{APP_NAME} update [--all] [--group <group>] [--headless]");
    let mut all = false;
    let mut headless = false;
    let mut group = None;
    let mut i = 0usize;
    while i < args.len() {
        match args[i].as_str() {
            "--all" => all = true,
            "--headless" => headless = true,
            "--group" => {
                let Some(g) = args.get(i + 1) else {
                    return print_usage_error("update", &usage);
                };
                group = Some(g.clone());
                i += 1;
            }
            _ => return print_usage_error("update", &usage),
        }
        i += 1;
    }
    let config = AppConfig::from_env()
        .with_headless(headless)
        .with_all_gems(all)
        .with_group(group);
    let rt = match runtime_or_exit(config, "update") {
        Ok(rt) => rt,
        Err(code) => return code,
    };
    if let Err(e) = rt.preflight().verify(true) {
        rt.record_failure("update", &e);
        return fail("update", &e);
    }
    let interactive = rt.interactive();
    if interactive {
        println!("{APP_NAME} will update each outdated gem in its own commit, rebase onto");
        println!(
            "{} and run '{}'. Failing updates are bisected and removed.",
            rt.config.base_branch, rt.config.test_command
        );
        if !confirm("Continue?") {
            println!("{APP_NAME}: aborted");
            return EXIT_DECLINED;
        }
    }
    finish(&rt, "update", rt.drive(State::Idle, interactive))
}

fn parse_headless(scope: &str, args: &[String]) -> Result<bool, i32> {
    let mut headless = false;
    for arg in args {
        match arg.as_str() {
            "--headless" => headless = true,
            _ => {
                return Err(print_usage_error(
                    scope,
                    &format!("{APP_NAME} {scope} [--headless]"),
                ));
            }
        }
    }
    Ok(headless)
}

fn cmd_test(args: &[String]) -> i32 {
    let headless = match parse_headless("test", args) {
        Ok(h) => h,
        Err(code) => return code,
    };
    let rt = match runtime_or_exit(AppConfig::from_env().with_headless(headless), "test") {
        Ok(rt) => rt,
        Err(code) => return code,
    };
    if let Err(e) = rt.preflight().verify(false) {
        rt.record_failure("test", &e);
        return fail("test", &e);
    }
    let interactive = rt.interactive();
    finish(&rt, "test", rt.drive(State::Testing, interactive))
}

fn cmd_bisect(args: &[String]) -> i32 {
    let headless = match parse_headless("bisect", args) {
        Ok(h) => h,
        Err(code) => return code,
    };
    let rt = match runtime_or_exit(AppConfig::from_env().with_headless(headless), "bisect") {
        Ok(rt) => rt,
        Err(code) => return code,
    };
    if let Err(e) = rt.preflight().verify(false) {
        rt.record_failure("bisect", &e);
        return fail("bisect", &e);
    }
    let interactive = rt.interactive();
    if interactive {
        println!(
            "{APP_NAME} will bisect {}..HEAD with '{}' and remove the first bad commit.",
            rt.config.base_branch, rt.config.test_command
        );
        if !confirm("Continue?") {
            println!("{APP_NAME}: aborted");
            return EXIT_DECLINED;
        }
    }
    finish(&rt, "bisect", rt.drive(State::Bisecting, interactive))
}

fn cmd_remove_commit(args: &[String]) -> i32 {
    let usage = format!("{APP_NAME} remove-commit <sha>");
    let [sha] = args else {
        return print_usage_error("remove-commit", &usage);
    };
    let rt = match runtime_or_exit(AppConfig::from_env(), "remove-commit") {
        Ok(rt) => rt,
        Err(code) => return code,
    };
    let rebaser = Rebaser::new(rt.git.clone());
    let result = rt
        .preflight()
        .verify(false)
        .and_then(|()| rebaser.resolve(sha))
        .and_then(|commit| rebaser.remove(&commit).map(|r| (commit, r)));
    match result {
        Ok((commit, RemovalResult::Removed)) => {
            rt.journal.record(
                "removed",
                EventInput {
                    state: Some("removing"),
                    commit: Some(commit.as_str()),
                    ..EventInput::default()
                },
            );
            println!("{APP_NAME}: removed {commit}");
            EXIT_OK
        }
        Ok((commit, RemovalResult::Conflict)) => {
            rt.journal.record(
                "conflict",
                EventInput {
                    state: Some("removing"),
                    commit: Some(commit.as_str()),
                    ..EventInput::default()
                },
            );
            print_resume_hint(
                &BlockReason::RewriteConflict { commit },
                &rt.config.base_branch,
            );
            EXIT_BLOCKED
        }
        Err(e) => {
            rt.record_failure("remove-commit", &e);
            fail("remove-commit", &e)
        }
    }
}

fn cmd_log(args: &[String]) -> i32 {
    let usage = format!("{APP_NAME} log [N]");
    let n = match args {
        [] => DEFAULT_LOG_WINDOW,
        [n] => match n.parse::<usize>() {
            Ok(n) if n > 0 => n,
            _ => return print_usage_error("log", &usage),
        },
        _ => return print_usage_error("log", &usage),
    };
    let rt = match runtime_or_exit(AppConfig::from_env(), "log") {
        Ok(rt) => rt,
        Err(code) => return code,
    };
    let Some(path) = resolve_log_file(&rt.config, &rt.git) else {
        eprintln!(
            "{}",
            format_error("log", "no run log: not inside a git repository")
        );
        return EXIT_RUNTIME;
    };
    match recent_events(&path, n) {
        Ok(rows) if rows.is_empty() => {
            println!("{APP_NAME}: no runs recorded in {}", path.display());
            EXIT_OK
        }
        Ok(rows) => {
            for row in &rows {
                println!("{}", format_event(row));
            }
            EXIT_OK
        }
        Err(e) => fail("log", &e),
    }
}

pub fn run() -> i32 {
    let args: Vec<String> = env::args().collect();
    let cmd = args.get(1).map(String::as_str).unwrap_or("help");
    let rest = args.get(2..).unwrap_or(&[]);
    match cmd {
        "help" | "-h" | "--help" => {
            print_help();
            EXIT_OK
        }
        "version" | "-V" | "--version" => {
            print_version();
            EXIT_OK
        }
        "check" => cmd_check(rest),
        "update" => cmd_update(rest),
        "test" => cmd_test(rest),
        "bisect" => cmd_bisect(rest),
        "remove-commit" => cmd_remove_commit(rest),
        "log" => cmd_log(rest),
        other => {
            eprintln!("{APP_NAME}: unknown command '{other}'");
            eprintln!("Run '{APP_NAME} help' for usage.");
            EXIT_USAGE
        }
    }
}
