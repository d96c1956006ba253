//! AWS CLI invocations for listing, directory sync, and single-file upload.

use anyhow::Result;
use std::path::Path;

use crate::error::Error;
use crate::log::RunLog;
use crate::runner::{Executor, Invocation};
use crate::validate::S3Uri;

/// The object-storage transfer tool (`aws` unless overridden).
#[derive(Debug, Clone)]
pub struct Transfer {
    program: String,
}

impl Transfer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn s3(&self, subcommand: &str) -> Invocation {
        Invocation::new(self.program.clone()).args(["s3", subcommand])
    }

    /// `aws s3 ls <uri>`; exits non-zero when nothing matches. The listing
    /// itself is discarded.
    pub fn exists(&self, uri: &S3Uri) -> Invocation {
        self.s3("ls").arg(uri.as_str()).quiet()
    }

    /// `aws s3 sync <uri> <dir> [options]`
    pub fn sync_down(&self, uri: &S3Uri, dir: &Path, options: &[String]) -> Invocation {
        self.s3("sync")
            .arg(uri.as_str())
            .arg(dir.display().to_string())
            .args(options.iter().cloned())
    }

    /// `aws s3 sync <dir> <uri> [options]`
    pub fn sync_up(&self, dir: &Path, uri: &S3Uri, options: &[String]) -> Invocation {
        self.s3("sync")
            .arg(dir.display().to_string())
            .arg(uri.as_str())
            .args(options.iter().cloned())
    }

    /// `aws s3 cp <file> <uri>`
    pub fn upload_file(&self, file: &Path, uri: &S3Uri) -> Invocation {
        self.s3("cp")
            .arg(file.display().to_string())
            .arg(uri.as_str())
    }
}

/// Log and run a transfer invocation; any non-zero exit is an error.
pub fn run_checked(inv: &Invocation, exec: &mut dyn Executor, log: &mut RunLog) -> Result<()> {
    log.field("EXEC", inv)?;
    match exec.execute(inv) {
        Ok(0) => Ok(()),
        Ok(code) => Err(Error::ExternalTool {
            command: inv.to_string(),
            code: Some(code),
        }
        .into()),
        Err(source) => {
            tracing::debug!(program = %inv.program, error = %source, "transfer tool failed to start");
            Err(Error::Spawn {
                program: inv.program.clone(),
                command: inv.to_string(),
                source,
            }
            .into())
        }
    }
}
