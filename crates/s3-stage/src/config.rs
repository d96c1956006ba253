//! Builds the immutable run settings from parsed arguments, an environment
//! snapshot, and the working directory. Interpolation and URI syntax checks
//! happen here, so a `Settings` value is always well-formed.

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::cli::Cli;
use crate::error::Error;
use crate::interpolate::{Env, interpolate, interpolate_all};
use crate::validate::S3Uri;

/// Log file name used when neither `--log-file` nor `S3_STAGE_LOG_FILE` is given.
pub const DEFAULT_LOG_FILE: &str = "s3-stage.log";

/// Everything one run needs, resolved up front.
#[derive(Debug, Clone)]
pub struct Settings {
    pub dry_run: bool,
    pub skip_output_on_failure: bool,
    pub disable_lookup: bool,
    pub input_uris: Vec<S3Uri>,
    pub intermediate_uri: Option<S3Uri>,
    pub output_uri: Option<S3Uri>,
    pub log_upload_uri: Option<S3Uri>,
    pub inbound_sync_options: Vec<String>,
    pub outbound_sync_options: Vec<String>,
    pub input_data_dir: PathBuf,
    pub output_data_dir: PathBuf,
    /// Defaults to `output_data_dir`, so intermediate results land beside
    /// the command's output.
    pub intermediate_data_dir: PathBuf,
    pub log_file: PathBuf,
    pub aws_cli: String,
    pub command: Vec<String>,
}

impl Settings {
    /// Resolve `cli` against `env` and `cwd`.
    pub fn from_cli(cli: &Cli, env: &Env, cwd: &Path) -> Result<Self> {
        let lookup = !cli.disable_lookup;
        let expand = |v: &str| interpolate(v, lookup, env);
        let uri = |v: &str| -> Result<S3Uri, Error> { S3Uri::parse(&expand(v)?) };
        let dir = |v: &Path| -> Result<PathBuf, Error> {
            Ok(cwd.join(expand(v.to_string_lossy().as_ref())?))
        };

        if cli.command.is_empty() {
            return Err(Error::Usage("no command given".into()).into());
        }

        let input_uris = cli
            .input_s3
            .iter()
            .map(|v| uri(v.as_str()))
            .collect::<Result<Vec<_>, _>>()?;
        let intermediate_uri = cli.intermediate_s3.as_deref().map(&uri).transpose()?;
        let output_uri = cli.output_s3.as_deref().map(&uri).transpose()?;
        let log_upload_uri = cli.log_upload_s3.as_deref().map(&uri).transpose()?;

        let input_data_dir = match &cli.input_data_dir {
            Some(p) => dir(p.as_path())?,
            None => cwd.to_path_buf(),
        };
        let output_data_dir = match &cli.output_data_dir {
            Some(p) => dir(p.as_path())?,
            None => cwd.to_path_buf(),
        };
        let intermediate_data_dir = match &cli.intermediate_data_dir {
            Some(p) => dir(p.as_path())?,
            None => output_data_dir.clone(),
        };
        let log_file = match &cli.log_file {
            Some(p) => dir(p.as_path())?,
            None => std::env::temp_dir().join(DEFAULT_LOG_FILE),
        };

        Ok(Self {
            dry_run: cli.dry_run,
            skip_output_on_failure: cli.skip_output_on_failure,
            disable_lookup: cli.disable_lookup,
            input_uris,
            intermediate_uri,
            output_uri,
            log_upload_uri,
            inbound_sync_options: interpolate_all(&cli.inbound_sync_option, lookup, env)?,
            outbound_sync_options: interpolate_all(&cli.outbound_sync_option, lookup, env)?,
            input_data_dir,
            output_data_dir,
            intermediate_data_dir,
            log_file,
            aws_cli: expand(cli.aws_cli.as_str())?,
            command: interpolate_all(&cli.command, lookup, env)?,
        })
    }

    /// Sources that must exist remotely before anything is synced.
    pub fn read_sources(&self) -> impl Iterator<Item = &S3Uri> {
        self.input_uris.iter().chain(self.intermediate_uri.as_ref())
    }

    /// Local directories created before syncing.
    pub fn local_dirs(&self) -> Vec<&Path> {
        let mut dirs = vec![self.input_data_dir.as_path(), self.output_data_dir.as_path()];
        if self.intermediate_uri.is_some() {
            dirs.push(self.intermediate_data_dir.as_path());
        }
        dirs.dedup();
        dirs
    }
}
