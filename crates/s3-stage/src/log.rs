//! Run log: status lines go to stdout and, when a log upload is requested,
//! to a local file that is uploaded at the end of the run.

use anyhow::{Context, Result};
use chrono::Local;
use console::style;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

const TIMESTAMP: &str = "%Y-%m-%d %H:%M:%S";

/// Tee of status lines to stdout and an optional log file.
#[derive(Debug)]
pub struct RunLog {
    file: Option<(PathBuf, File)>,
}

impl RunLog {
    /// Stdout only.
    pub fn stdout() -> Self {
        Self { file: None }
    }

    /// Stdout plus `path`, truncated if it already exists.
    pub fn with_file(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let file = File::create(path)
            .with_context(|| format!("failed to create log file {}", path.display()))?;
        Ok(Self {
            file: Some((path.to_path_buf(), file)),
        })
    }

    /// Write one timestamped line.
    pub fn line(&mut self, msg: impl AsRef<str>) -> Result<()> {
        let msg = msg.as_ref();
        let now = Local::now().format(TIMESTAMP).to_string();
        println!("{} {}", style(format!("[{now}]")).dim(), msg);
        if let Some((path, file)) = &mut self.file {
            writeln!(file, "[{now}] {msg}")
                .with_context(|| format!("failed to write log file {}", path.display()))?;
        }
        Ok(())
    }

    /// Write a `KEY: value` line.
    pub fn field(&mut self, key: &str, value: impl std::fmt::Display) -> Result<()> {
        self.line(format!("{key}: {value}"))
    }

    /// Flush buffered lines so the file is complete before it is uploaded.
    pub fn flush(&mut self) -> Result<()> {
        if let Some((path, file)) = &mut self.file {
            file.flush()
                .and_then(|_| file.sync_all())
                .with_context(|| format!("failed to flush log file {}", path.display()))?;
        }
        Ok(())
    }
}
