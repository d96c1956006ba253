//! External process execution. Every side-effecting call in the pipeline
//! goes through an [`Executor`], so dry runs and tests swap the implementation.

use std::fmt;
use std::io;
use std::process::{Command, ExitStatus, Stdio};

/// Exit code reported when the program could not be found.
pub const EXIT_NOT_FOUND: i32 = 127;
/// Exit code reported when the program exists but could not be executed.
pub const EXIT_NOT_EXECUTABLE: i32 = 126;

/// A program plus its arguments, not yet run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// Discard the child's stdout instead of passing it through.
    pub quiet: bool,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            quiet: false,
        }
    }

    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Split a token list into program and arguments. `None` if empty.
    pub fn from_tokens(tokens: &[String]) -> Option<Self> {
        let (program, args) = tokens.split_first()?;
        Some(Self::new(program.clone()).args(args.iter().cloned()))
    }
}

impl fmt::Display for Invocation {
    /// Shell-quoted rendering, suitable for copy-pasting into a terminal.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&shell_quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", shell_quote(arg))?;
        }
        Ok(())
    }
}

/// Quote `s` for a POSIX shell only when it needs it.
fn shell_quote(s: &str) -> String {
    let plain = !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c));
    if plain {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

/// Runs invocations to completion and reports their exit code.
pub trait Executor {
    /// Run `inv` and block until it exits. `Err` means it never started.
    fn execute(&mut self, inv: &Invocation) -> io::Result<i32>;
}

/// Spawns real child processes with inherited stdio and environment.
/// Quiet invocations get a null stdout.
#[derive(Debug, Default)]
pub struct ProcessExecutor;

impl Executor for ProcessExecutor {
    fn execute(&mut self, inv: &Invocation) -> io::Result<i32> {
        let status = Command::new(&inv.program)
            .args(&inv.args)
            .stdin(Stdio::inherit())
            .stdout(if inv.quiet {
                Stdio::null()
            } else {
                Stdio::inherit()
            })
            .stderr(Stdio::inherit())
            .status()?;
        Ok(exit_code(status))
    }
}

/// Runs nothing; every invocation succeeds.
#[derive(Debug, Default)]
pub struct DryRunExecutor;

impl Executor for DryRunExecutor {
    fn execute(&mut self, _inv: &Invocation) -> io::Result<i32> {
        Ok(0)
    }
}

/// Shell convention: a signal-terminated child reports `128 + signal`.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return 128 + sig;
        }
    }
    1
}

/// Exit code a shell would report for a command that failed to start.
pub fn spawn_failure_code(err: &io::Error) -> i32 {
    match err.kind() {
        io::ErrorKind::NotFound => EXIT_NOT_FOUND,
        _ => EXIT_NOT_EXECUTABLE,
    }
}
