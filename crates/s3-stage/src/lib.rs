//! s3-stage: stage S3 data around a command.
//! Re-exports all modules and contains the run pipeline: validate, sync in, run, gate, sync out, upload log.

pub mod cli;
pub mod config;
pub mod error;
pub mod interpolate;
pub mod log;
pub mod runner;
pub mod transfer;
pub mod validate;

use anyhow::{Context, Result};
use clap::CommandFactory;
use console::style;
use std::time::{Duration, Instant};

use cli::Cli;
use config::Settings;
use interpolate::Env;
use log::RunLog;
use runner::{DryRunExecutor, Executor, Invocation, ProcessExecutor};
use transfer::Transfer;

/// Whether output sync and log upload happen after the command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundGate {
    Run,
    Skip,
}

impl OutboundGate {
    pub fn decide(skip_output_on_failure: bool, exit_code: i32) -> Self {
        if skip_output_on_failure && exit_code != 0 {
            OutboundGate::Skip
        } else {
            OutboundGate::Run
        }
    }
}

/// Run the CLI with parsed arguments against the process environment.
/// Returns the exit code the process should end with.
pub fn run(cli: Cli) -> Result<i32> {
    if let Some(shell) = cli.completions {
        clap_complete::generate(shell, &mut Cli::command(), "s3-stage", &mut std::io::stdout());
        return Ok(0);
    }

    let env: Env = std::env::vars().collect();
    let cwd = std::env::current_dir().context("could not determine current directory")?;
    let settings = Settings::from_cli(&cli, &env, &cwd)?;
    tracing::debug!(?settings, "resolved settings");

    let mut log = match &settings.log_upload_uri {
        Some(_) => RunLog::with_file(&settings.log_file)?,
        None => RunLog::stdout(),
    };

    let mut exec: Box<dyn Executor> = if settings.dry_run {
        Box::new(DryRunExecutor)
    } else {
        Box::new(ProcessExecutor)
    };

    execute(&settings, exec.as_mut(), &mut log)
}

/// The pipeline proper. Every external call goes through `exec`.
///
/// Errors before the command runs abort the run. After it runs, its exit code
/// is the result unless the outbound sync or the log upload fails, in which
/// case that failure is returned instead.
pub fn execute(settings: &Settings, exec: &mut dyn Executor, log: &mut RunLog) -> Result<i32> {
    let started = Instant::now();
    let tool = Transfer::new(&settings.aws_cli);

    if settings.dry_run {
        eprintln!(
            "{}",
            style("[dryrun] Commands are printed, not executed").yellow().bold()
        );
        log.line("DRYRUN: true")?;
    }
    echo_settings(settings, log)?;

    // 1. Validate read sources before touching anything
    validate::validate_remote_objects_exist(settings.read_sources(), &tool, exec, log)?;

    // 2. Local directories
    for dir in settings.local_dirs() {
        if settings.dry_run {
            log.field("MKDIR", dir.display())?;
        } else {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
    }

    // 3. Inbound syncs: inputs, then intermediate
    for uri in &settings.input_uris {
        let inv = tool.sync_down(uri, &settings.input_data_dir, &settings.inbound_sync_options);
        transfer::run_checked(&inv, exec, log)?;
    }
    if let Some(uri) = &settings.intermediate_uri {
        let inv = tool.sync_down(
            uri,
            &settings.intermediate_data_dir,
            &settings.inbound_sync_options,
        );
        transfer::run_checked(&inv, exec, log)?;
    }

    // 4. The command itself; its failure is data, not an error
    let exit_code = run_command(&settings.command, exec, log)?;
    log.field("EXIT CODE", exit_code)?;

    let gate = OutboundGate::decide(settings.skip_output_on_failure, exit_code);
    tracing::debug!(?gate, exit_code, "outbound gate");

    // 5. Outbound sync
    if let Some(uri) = &settings.output_uri {
        match gate {
            OutboundGate::Run => {
                let inv =
                    tool.sync_up(&settings.output_data_dir, uri, &settings.outbound_sync_options);
                transfer::run_checked(&inv, exec, log)?;
                validate::validate_uri_syntax([uri.as_str()])?;
            }
            OutboundGate::Skip => log.line(format!(
                "Command failed with exit code {exit_code}; skipping output sync to {uri}"
            ))?,
        }
    }

    log.field("ELAPSED", format_elapsed(started.elapsed()))?;

    // 6. Log upload
    if let Some(uri) = &settings.log_upload_uri {
        match gate {
            OutboundGate::Run => {
                let inv = tool.upload_file(&settings.log_file, uri);
                log.flush()?;
                transfer::run_checked(&inv, exec, log)?;
                validate::validate_uri_syntax([uri.as_str()])?;
            }
            OutboundGate::Skip => log.line(format!(
                "Command failed with exit code {exit_code}; skipping log upload to {uri}"
            ))?,
        }
    }

    Ok(exit_code)
}

/// Log the resolved configuration, one line per field that is set.
fn echo_settings(settings: &Settings, log: &mut RunLog) -> Result<()> {
    for uri in &settings.input_uris {
        log.field("INPUT_S3", uri)?;
    }
    if let Some(uri) = &settings.intermediate_uri {
        log.field("INTERMEDIATE_S3", uri)?;
    }
    if let Some(uri) = &settings.output_uri {
        log.field("OUTPUT_S3", uri)?;
    }
    if let Some(uri) = &settings.log_upload_uri {
        log.field("LOG_UPLOAD_S3", uri)?;
    }
    if !settings.inbound_sync_options.is_empty() {
        log.field("INBOUND_SYNC_OPTIONS", settings.inbound_sync_options.join(" "))?;
    }
    if !settings.outbound_sync_options.is_empty() {
        log.field("OUTBOUND_SYNC_OPTIONS", settings.outbound_sync_options.join(" "))?;
    }
    log.field("INPUT_DATA_DIR", settings.input_data_dir.display())?;
    log.field("OUTPUT_DATA_DIR", settings.output_data_dir.display())?;
    if settings.intermediate_uri.is_some() {
        log.field("INTERMEDIATE_DATA_DIR", settings.intermediate_data_dir.display())?;
    }
    if settings.skip_output_on_failure {
        log.line("SKIP_OUTPUT_ON_FAILURE: true")?;
    }
    if settings.disable_lookup {
        log.line("DISABLE_LOOKUP: true")?;
    }
    Ok(())
}

/// Run the wrapped command and return its exit code, whatever it is.
fn run_command(command: &[String], exec: &mut dyn Executor, log: &mut RunLog) -> Result<i32> {
    let inv = Invocation::from_tokens(command)
        .ok_or_else(|| error::Error::Usage("no command given".into()))?;
    log.field("COMMAND", &inv)?;
    match exec.execute(&inv) {
        Ok(code) => Ok(code),
        Err(e) => {
            let code = runner::spawn_failure_code(&e);
            log.line(format!("{}: {e}", inv.program))?;
            Ok(code)
        }
    }
}

fn format_elapsed(d: Duration) -> String {
    let secs = d.as_secs();
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        secs / 3600,
        (secs / 60) % 60,
        secs % 60,
        d.subsec_millis()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io;
    use std::path::Path;

    /// Records every invocation and answers from a script keyed on the program
    /// name and first arguments.
    #[derive(Default)]
    struct Recorder {
        calls: Vec<Invocation>,
        command_exit: i32,
        fail_sync_up: Option<i32>,
        fail_ls: bool,
        fail_cp: Option<i32>,
    }

    impl Recorder {
        fn rendered(&self) -> Vec<String> {
            self.calls.iter().map(ToString::to_string).collect()
        }

        fn count(&self, needle: &str) -> usize {
            self.rendered().iter().filter(|c| c.contains(needle)).count()
        }
    }

    impl Executor for Recorder {
        fn execute(&mut self, inv: &Invocation) -> io::Result<i32> {
            self.calls.push(inv.clone());
            if inv.program != "aws" {
                return Ok(self.command_exit);
            }
            let code = match inv.args.get(1).map(String::as_str) {
                Some("ls") if self.fail_ls => 1,
                Some("sync") if inv.args[3].starts_with("s3://") => self.fail_sync_up.unwrap_or(0),
                Some("cp") => self.fail_cp.unwrap_or(0),
                _ => 0,
            };
            Ok(code)
        }
    }

    fn settings(args: &[&str]) -> Settings {
        let mut cli = Cli::try_parse_from(std::iter::once("s3-stage").chain(args.iter().copied()))
            .unwrap();
        cli.aws_cli = "aws".into();
        cli.input_data_dir = Some("in".into());
        cli.output_data_dir = Some("out".into());
        cli.intermediate_data_dir = None;
        cli.log_file = None;
        Settings::from_cli(&cli, &Env::new(), Path::new("/work")).unwrap()
    }

    fn dry(args: &[&str]) -> Settings {
        // Dry settings keep directory creation off the real filesystem.
        let mut s = settings(args);
        s.dry_run = true;
        s
    }

    #[test]
    fn gate_only_skips_on_failure_with_policy() {
        assert_eq!(OutboundGate::decide(true, 1), OutboundGate::Skip);
        assert_eq!(OutboundGate::decide(true, 0), OutboundGate::Run);
        assert_eq!(OutboundGate::decide(false, 1), OutboundGate::Run);
        assert_eq!(OutboundGate::decide(false, 0), OutboundGate::Run);
    }

    #[test]
    fn no_sources_means_only_the_command_runs() {
        let mut rec = Recorder::default();
        let code = execute(&dry(&["echo", "hi"]), &mut rec, &mut RunLog::stdout()).unwrap();
        assert_eq!(code, 0);
        assert_eq!(rec.rendered(), ["echo hi"]);
    }

    #[test]
    fn inputs_are_checked_then_synced_in_order() {
        let mut rec = Recorder::default();
        let s = dry(&[
            "--input-s3=s3://b/a",
            "--input-s3=s3://b/c",
            "--intermediate-s3=s3://b/mid",
            "--inbound-sync-option=--delete",
            "mytool",
        ]);
        execute(&s, &mut rec, &mut RunLog::stdout()).unwrap();
        assert_eq!(
            rec.rendered(),
            [
                "aws s3 ls s3://b/a",
                "aws s3 ls s3://b/c",
                "aws s3 ls s3://b/mid",
                "aws s3 sync s3://b/a /work/in --delete",
                "aws s3 sync s3://b/c /work/in --delete",
                "aws s3 sync s3://b/mid /work/out --delete",
                "mytool",
            ]
        );
    }

    #[test]
    fn missing_input_aborts_before_sync_or_command() {
        let mut rec = Recorder {
            fail_ls: true,
            ..Default::default()
        };
        let s = dry(&["--input-s3=s3://b/missing", "mytool"]);
        let err = execute(&s, &mut rec, &mut RunLog::stdout()).unwrap_err();
        assert!(err.to_string().contains("s3://b/missing"), "{err}");
        assert_eq!(error::exit_code_for(&err), 1);
        assert_eq!(rec.rendered(), ["aws s3 ls s3://b/missing"]);
    }

    #[test]
    fn exit_code_is_the_commands() {
        let mut rec = Recorder {
            command_exit: 3,
            ..Default::default()
        };
        let s = dry(&["--output-s3=s3://b/out", "mytool"]);
        let code = execute(&s, &mut rec, &mut RunLog::stdout()).unwrap();
        assert_eq!(code, 3);
        // default policy still syncs the output
        assert_eq!(rec.count("aws s3 sync /work/out s3://b/out"), 1);
    }

    #[test]
    fn skip_policy_suppresses_output_and_log_upload() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut s = dry(&[
            "--skip-output-on-failure",
            "--output-s3=s3://b/out",
            "--log-upload-s3=s3://b/run.log",
            "mytool",
        ]);
        s.log_file = dir.path().join("run.log");
        let mut log = RunLog::with_file(&s.log_file).unwrap();
        let mut rec = Recorder {
            command_exit: 9,
            ..Default::default()
        };
        let code = execute(&s, &mut rec, &mut log).unwrap();
        assert_eq!(code, 9);
        assert_eq!(rec.rendered(), ["mytool"]);

        let content = std::fs::read_to_string(&s.log_file).unwrap();
        assert!(content.contains("skipping output sync"));
        assert!(content.contains("skipping log upload"));
    }

    #[test]
    fn skip_policy_with_success_still_uploads() {
        let mut rec = Recorder::default();
        let s = dry(&["--skip-output-on-failure", "--output-s3=s3://b/out", "mytool"]);
        assert_eq!(execute(&s, &mut rec, &mut RunLog::stdout()).unwrap(), 0);
        assert_eq!(rec.count("s3://b/out"), 1);
    }

    #[test]
    fn failing_output_sync_overrides_exit_code() {
        let mut rec = Recorder {
            fail_sync_up: Some(2),
            ..Default::default()
        };
        let s = dry(&[
            "--output-s3=s3://b/out",
            "--log-upload-s3=s3://b/run.log",
            "mytool",
        ]);
        let err = execute(&s, &mut rec, &mut RunLog::stdout()).unwrap_err();
        assert_eq!(error::exit_code_for(&err), 2);
        // aborted before the log upload
        assert_eq!(rec.count(" cp "), 0);
    }

    #[test]
    fn failing_log_upload_overrides_exit_code() {
        let mut rec = Recorder {
            fail_cp: Some(5),
            ..Default::default()
        };
        let s = dry(&["--log-upload-s3=s3://b/run.log", "mytool"]);
        let err = execute(&s, &mut rec, &mut RunLog::stdout()).unwrap_err();
        assert_eq!(error::exit_code_for(&err), 5);
    }

    #[test]
    fn log_upload_comes_last() {
        let mut rec = Recorder::default();
        let s = dry(&[
            "--output-s3=s3://b/out",
            "--outbound-sync-option=--acl=bucket-owner-full-control",
            "--log-upload-s3=s3://b/logs/run.log",
            "mytool",
        ]);
        execute(&s, &mut rec, &mut RunLog::stdout()).unwrap();
        let calls = rec.rendered();
        assert_eq!(
            calls[1],
            "aws s3 sync /work/out s3://b/out --acl=bucket-owner-full-control"
        );
        assert_eq!(
            calls.last().unwrap(),
            &format!("aws s3 cp {} s3://b/logs/run.log", s.log_file.display())
        );
    }

    #[test]
    fn unstartable_command_is_captured_as_127() {
        struct NoSuchProgram;
        impl Executor for NoSuchProgram {
            fn execute(&mut self, _inv: &Invocation) -> io::Result<i32> {
                Err(io::Error::from(io::ErrorKind::NotFound))
            }
        }
        let s = dry(&["no-such-tool"]);
        let code = execute(&s, &mut NoSuchProgram, &mut RunLog::stdout()).unwrap();
        assert_eq!(code, runner::EXIT_NOT_FOUND);
    }

    #[test]
    fn real_run_creates_local_dirs() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut s = settings(&["true"]);
        s.input_data_dir = dir.path().join("a/in");
        s.output_data_dir = dir.path().join("b/out");
        let mut rec = Recorder::default();
        execute(&s, &mut rec, &mut RunLog::stdout()).unwrap();
        assert!(s.input_data_dir.is_dir());
        assert!(s.output_data_dir.is_dir());
    }

    #[test]
    fn elapsed_is_formatted_as_clock_time() {
        assert_eq!(format_elapsed(Duration::from_millis(3_723_045)), "01:02:03.045");
    }
}
