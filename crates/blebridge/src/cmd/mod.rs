use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::exit::CliResult;

pub mod run;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the bridge with an in-process loopback peer echoing frames.
    Run(RunArgs),
    /// Show version information.
    Version,
}

pub fn run(command: Command) -> CliResult<i32> {
    match command {
        Command::Run(args) => run::run(args),
        Command::Version => {
            println!("blebridge {}", env!("CARGO_PKG_VERSION"));
            Ok(crate::exit::SUCCESS)
        }
    }
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Endpoint the engine listens on for data we forward to it.
    #[arg(long, value_name = "PATH")]
    pub writer_socket: Option<PathBuf>,

    /// Endpoint we bind; the engine connects and writes outbound data.
    #[arg(long, value_name = "PATH")]
    pub reader_socket: Option<PathBuf>,

    /// Endpoint the engine listens on for control messages.
    #[arg(long, value_name = "PATH")]
    pub control_socket: Option<PathBuf>,

    /// MTU for the loopback link.
    #[arg(long, default_value = "185")]
    pub mtu: usize,

    /// Read-loop buffer size.
    #[arg(long)]
    pub buffer_size: Option<usize>,
}
