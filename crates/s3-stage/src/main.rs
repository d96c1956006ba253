//! Thin binary entry point — parses CLI args, sets up tracing, and delegates to `s3_stage::run()`.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = s3_stage::cli::Cli::parse();
    init_tracing(cli.debug);

    match s3_stage::run(cli) {
        Ok(code) => exit_code(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            exit_code(s3_stage::error::exit_code_for(&e))
        }
    }
}

/// `--debug` forces debug level; otherwise `RUST_LOG` decides, defaulting to warnings.
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("s3_stage=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code & 0xff).unwrap_or(1))
}
