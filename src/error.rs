use std::fmt;

use crate::process::ProcessError;

pub type BummrResult<T> = Result<T, BummrError>;

pub const EXIT_OK: i32 = 0;
pub const EXIT_RUNTIME: i32 = 1;
pub const EXIT_USAGE: i32 = 2;
pub const EXIT_BLOCKED: i32 = 3;
pub const EXIT_TOOL_MISSING: i32 = 4;
pub const EXIT_PRECONDITION: i32 = 5;
pub const EXIT_DECLINED: i32 = 6;

#[derive(Debug)]
pub enum BummrError {
    /// The test command could not be executed at all.
    OracleUnavailable {
        command: String,
        source: std::io::Error,
    },
    BisectionInconclusive {
        context: String,
    },
    /// A rewrite stopped on conflicts and left a paused rebase behind.
    RewriteConflict {
        context: String,
    },
    ToolMissing {
        tools: Vec<String>,
    },
    Precondition {
        failures: Vec<String>,
    },
    InvalidRange {
        good: String,
        bad: String,
    },
    Process {
        context: String,
        source: ProcessError,
    },
    Io {
        context: String,
        source: std::io::Error,
    },
    Json {
        context: String,
        source: serde_json::Error,
    },
    Invalid {
        context: String,
    },
}

impl BummrError {
    pub fn invalid(context: impl Into<String>) -> Self {
        BummrError::Invalid {
            context: context.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        BummrError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        BummrError::Json {
            context: context.into(),
            source,
        }
    }

    pub fn process(context: impl Into<String>, source: ProcessError) -> Self {
        BummrError::Process {
            context: context.into(),
            source,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            BummrError::ToolMissing { .. } => EXIT_TOOL_MISSING,
            BummrError::Precondition { .. } => EXIT_PRECONDITION,
            BummrError::BisectionInconclusive { .. } | BummrError::RewriteConflict { .. } => {
                EXIT_BLOCKED
            }
            _ => EXIT_RUNTIME,
        }
    }
}

impl fmt::Display for BummrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BummrError::OracleUnavailable { command, source } => {
                write!(f, "test command '{command}' could not be run: {source}")
            }
            BummrError::BisectionInconclusive { context } => {
                write!(f, "bisection inconclusive: {context}")
            }
            BummrError::RewriteConflict { context } => write!(f, "rewrite conflict: {context}"),
            BummrError::ToolMissing { tools } => {
                write!(f, "required tools missing: {}", tools.join(", "))
            }
            BummrError::Precondition { failures } => {
                write!(f, "preconditions failed: {}", failures.join("; "))
            }
            BummrError::InvalidRange { good, bad } if good == bad => {
                write!(f, "invalid bisect range: {good} is both the good and the bad commit")
            }
            BummrError::InvalidRange { good, bad } => {
                write!(f, "invalid bisect range: {good} is not an ancestor of {bad}")
            }
            BummrError::Process { context, source } => write!(f, "{context}: {source}"),
            BummrError::Io { context, source } => write!(f, "{context}: {source}"),
            BummrError::Json { context, source } => write!(f, "{context}: {source}"),
            BummrError::Invalid { context } => write!(f, "{context}"),
        }
    }
}

impl std::error::Error for BummrError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BummrError::OracleUnavailable { source, .. } => Some(source),
            BummrError::Process { source, .. } => Some(source),
            BummrError::Io { source, .. } => Some(source),
            BummrError::Json { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub fn format_error(scope: &str, msg: &str) -> String {
    format!("bummr {scope}: {msg}")
}

pub fn print_usage_error(scope: &str, usage: &str) -> i32 {
    eprintln!("{}", format_error(scope, "invalid arguments"));
    eprintln!("Usage: {usage}");
    EXIT_USAGE
}
