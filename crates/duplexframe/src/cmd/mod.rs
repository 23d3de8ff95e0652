use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use duplexframe_frame::FrameConfig;

use crate::exit::{CliError, CliResult, INTERNAL, SUCCESS, USAGE};
use crate::output::OutputFormat;

pub mod echo;
pub mod exec;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Echo every received frame back to its sender.
    Echo(EchoArgs),
    /// Send one frame to a listening socket.
    Send(SendArgs),
    /// Listen on a socket and print received frames.
    Listen(ListenArgs),
    /// Spawn a program and exchange frames over its stdin/stdout.
    Exec(ExecArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Echo(args) => echo::run(args),
        Command::Send(args) => send::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Exec(args) => exec::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Framing limits shared by every command that moves frames.
#[derive(Args, Debug, Clone, Default)]
pub struct FrameOpts {
    /// Largest payload accepted or sent, in bytes. Default: the 4-byte prefix limit.
    #[arg(long, value_name = "BYTES", env = "DUPLEXFRAME_MAX_PAYLOAD")]
    pub max_payload: Option<usize>,
}

impl FrameOpts {
    pub fn config(&self, read_timeout: Option<Duration>) -> FrameConfig {
        let mut config = FrameConfig {
            read_timeout,
            write_timeout: read_timeout,
            ..FrameConfig::default()
        };
        if let Some(max) = self.max_payload {
            config.max_payload_size = max;
        }
        config
    }
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    /// Socket path to bind.
    #[arg(required_unless_present = "stdio", conflicts_with = "stdio")]
    pub path: Option<PathBuf>,
    /// Echo frames arriving on stdin back out on stdout instead of binding a socket.
    #[arg(long)]
    pub stdio: bool,
    #[command(flatten)]
    pub frame: FrameOpts,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Socket path to connect to.
    pub path: PathBuf,
    /// JSON payload.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub json: Option<String>,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["json", "file"])]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["json", "data"])]
    pub file: Option<PathBuf>,
    /// Wait for one response frame and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for the response when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
    #[command(flatten)]
    pub frame: FrameOpts,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Exit after receiving N frames.
    #[arg(long)]
    pub count: Option<u64>,
    #[command(flatten)]
    pub frame: FrameOpts,
}

#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Payload to send; repeat for several frames.
    #[arg(long, conflicts_with = "file")]
    pub data: Vec<String>,
    /// Read a single payload from file.
    #[arg(long)]
    pub file: Option<PathBuf>,
    /// Replies to wait for before closing the child's stdin. Default: one per payload.
    #[arg(long)]
    pub count: Option<u64>,
    #[command(flatten)]
    pub frame: FrameOpts,
    /// Program to spawn.
    pub program: String,
    /// Arguments passed to the program.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

/// Exit cleanly on Ctrl-C. Blocking accepts and reads cannot observe a flag.
pub(crate) fn install_ctrlc_handler() -> CliResult<()> {
    ctrlc::set_handler(|| {
        tracing::info!("interrupted");
        std::process::exit(SUCCESS);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
