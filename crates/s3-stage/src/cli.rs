//! CLI argument parsing with clap. Flags come first; the first token clap
//! doesn't recognize as a flag starts the wrapped command.

use clap::Parser;
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "s3-stage",
    version,
    about = "Stage S3 data around a command: sync inputs down, run it, sync outputs back up",
    after_help = "Examples:\n  s3-stage --input-s3 s3://bucket/in --output-s3 s3://bucket/out -- ./process.sh\n  s3-stage --dryrun --input-s3=s3://bucket/in python train.py --epochs 3\n  s3-stage --skip-output-on-failure --log-upload-s3 s3://bucket/logs/run.log make all"
)]
pub struct Cli {
    /// Print every external command instead of running it
    #[arg(long = "dryrun", visible_alias = "dry-run")]
    pub dry_run: bool,

    /// Skip the output sync and log upload when the command exits non-zero
    #[arg(long)]
    pub skip_output_on_failure: bool,

    /// Take flag and command values literally (no $VAR expansion)
    #[arg(long)]
    pub disable_lookup: bool,

    /// Verbose diagnostic tracing on stderr
    #[arg(long)]
    pub debug: bool,

    /// S3 prefix to sync into the input directory (repeatable)
    #[arg(long = "input-s3", value_name = "URI")]
    pub input_s3: Vec<String>,

    /// S3 prefix to sync into the intermediate directory
    #[arg(long = "intermediate-s3", value_name = "URI")]
    pub intermediate_s3: Option<String>,

    /// S3 prefix the output directory is synced to after the command
    #[arg(long = "output-s3", value_name = "URI")]
    pub output_s3: Option<String>,

    /// S3 object the run log is uploaded to at the end
    #[arg(long = "log-upload-s3", value_name = "URI")]
    pub log_upload_s3: Option<String>,

    /// Extra option passed to every inbound `aws s3 sync` (repeatable)
    #[arg(long, value_name = "OPT", allow_hyphen_values = true)]
    pub inbound_sync_option: Vec<String>,

    /// Extra option passed to the outbound `aws s3 sync` (repeatable)
    #[arg(long, value_name = "OPT", allow_hyphen_values = true)]
    pub outbound_sync_option: Vec<String>,

    /// Local directory inputs are synced into [default: current directory]
    #[arg(long, env = "INPUT_DATA_DIR", value_name = "DIR")]
    pub input_data_dir: Option<PathBuf>,

    /// Local directory synced to --output-s3 [default: current directory]
    #[arg(long, env = "OUTPUT_DATA_DIR", value_name = "DIR")]
    pub output_data_dir: Option<PathBuf>,

    /// Local directory the intermediate prefix is synced into [default: output directory]
    #[arg(long, env = "INTERMEDIATE_DATA_DIR", value_name = "DIR")]
    pub intermediate_data_dir: Option<PathBuf>,

    /// Local path of the run log [default: <tmp>/s3-stage.log]
    #[arg(long, env = "S3_STAGE_LOG_FILE", value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Transfer tool executable
    #[arg(long, env = "S3_STAGE_AWS_CLI", default_value = "aws", value_name = "PROGRAM")]
    pub aws_cli: String,

    /// Print a shell completion script and exit
    #[arg(long, value_name = "SHELL")]
    pub completions: Option<Shell>,

    /// Command to run, with its arguments
    #[arg(
        value_name = "COMMAND",
        trailing_var_arg = true,
        required_unless_present = "completions"
    )]
    pub command: Vec<String>,
}
