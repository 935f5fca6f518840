use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod decode;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Decode captured DCP datagrams.
    Decode(DecodeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Decode(args) => decode::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// How datagrams are stored in the input files.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum InputFormat {
    /// One datagram per file.
    #[default]
    Raw,
    /// One hex-encoded datagram per line; blank lines and `#` comments are skipped.
    Hex,
}

/// What to do when FEC correction fails before every fragment is in.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum FecRetry {
    Retry,
    Fail,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Input files, decoded in order through one decoder.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
    /// Input encoding.
    #[arg(long, value_enum, default_value = "raw")]
    pub input: InputFormat,
    /// Largest fragment count a PFT message may declare.
    #[arg(long, value_name = "N")]
    pub max_fragments: Option<usize>,
    /// PFT messages reassembled at once.
    #[arg(long, value_name = "N")]
    pub max_in_flight: Option<usize>,
    /// Largest FEC-protected block accepted, in bytes.
    #[arg(long, value_name = "BYTES")]
    pub max_message_bytes: Option<usize>,
    /// Behaviour after a failed FEC correction.
    #[arg(long, value_enum, default_value = "retry")]
    pub fec_retry: FecRetry,
    /// Only attempt FEC correction once every fragment has arrived.
    #[arg(long)]
    pub no_fec_gaps: bool,
    /// Exit with a data error if any datagram fails to decode cleanly.
    #[arg(long)]
    pub strict: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
