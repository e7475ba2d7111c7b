use clap::{Args, Subcommand};
use spear_agent::{CodecKind, HostSecret, DEFAULT_MAX_INFLIGHT, ENV_SECRET, ENV_SERVICE_ADDR};

use crate::exit::CliResult;

pub mod run;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Connect to the host and serve the demo handlers until terminated.
    Run(RunArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command) -> CliResult<i32> {
    match command {
        Command::Run(args) => run::run(args),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Host address (`host:port`).
    #[arg(long, env = ENV_SERVICE_ADDR)]
    pub addr: String,
    /// Decimal handshake secret issued by the host.
    #[arg(long, env = ENV_SECRET, hide_env_values = true)]
    pub secret: HostSecret,
    /// Wire codec: json or binary.
    #[arg(long, default_value = "json")]
    pub codec: CodecKind,
    /// Maximum concurrently executing handler requests.
    #[arg(long, default_value_t = DEFAULT_MAX_INFLIGHT)]
    pub max_inflight: usize,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
