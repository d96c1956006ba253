//! Error kinds raised by the pipeline and the exit code each one maps to.

use thiserror::Error;

/// Failures that abort a run.
///
/// The driver propagates these through `anyhow`, so callers that need the
/// exit code should downcast with [`exit_code_for`].
#[derive(Debug, Error)]
pub enum Error {
    /// Bad command line: missing command or an unknown flag.
    #[error("usage: {0}")]
    Usage(String),

    /// Malformed URI, missing remote object, or unresolved variable reference.
    #[error("{0}")]
    Validation(String),

    /// A transfer tool invocation exited non-zero.
    #[error("`{command}` failed{}", exit_suffix(.code))]
    ExternalTool {
        /// Rendered command line of the failing invocation.
        command: String,
        /// Exit code, if the process ran to completion.
        code: Option<i32>,
    },

    /// A transfer tool invocation could not be started at all.
    #[error("failed to start `{program}` (running `{command}`)")]
    Spawn {
        program: String,
        command: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Usage(_) => 2,
            Error::Validation(_) | Error::Spawn { .. } => 1,
            Error::ExternalTool { code, .. } => match code {
                Some(c) if *c != 0 => *c,
                _ => 1,
            },
        }
    }
}

fn exit_suffix(code: &Option<i32>) -> String {
    code.map(|c| format!(" with exit code {c}"))
        .unwrap_or_default()
}

/// Exit status for an arbitrary error chain; anything untyped is a plain failure.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|e| e.downcast_ref::<Error>())
        .map(Error::exit_code)
        .unwrap_or(1)
}
