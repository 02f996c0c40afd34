//! Entry point: parses argv, resolves it into a `RunConfig`, opens the
//! archive, drives the `Controller` through the full pipeline, and maps
//! the result onto the process exit codes of spec §6.

mod archive;
mod cli;
mod concat;
mod config;
mod controller;
mod error;
mod join;
mod logging;
mod lookup;
mod multi_writer;
mod preflight;
mod printer;
mod progress;
mod quit;
mod stats;
mod temp_registry;

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use log::error;

use crate::archive::ArchiveReader;
use crate::cli::Cli;
use crate::config::RunConfig;
use crate::controller::Controller;
use crate::error::FqError;
use crate::quit::QuitFlag;

/// "accession not found / invalid", spec §6.
const EXIT_ACCESSION_NOT_FOUND: u8 = 3;

fn main() -> ExitCode {
    logging::init();

    let cli = Cli::parse();
    let stdout_requested = cli.stdout;

    match run(cli) {
        Ok(stats) => {
            if !stdout_requested {
                println!("{stats}");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            let code = match e {
                FqError::AccessionNotFound(_) => EXIT_ACCESSION_NOT_FOUND,
                _ => 1,
            };
            ExitCode::from(code)
        }
    }
}

fn run(cli: Cli) -> Result<stats::JoinStats, FqError> {
    let quit = QuitFlag::new();
    quit.install_ctrlc_handler()
        .map_err(|e| FqError::Resource(format!("cannot install Ctrl-C handler: {e}")))?;

    let accession_path = Path::new(&cli.accession).to_path_buf();
    let config = RunConfig::from_cli(cli)?;
    let archive = ArchiveReader::open(&accession_path)?;

    let controller = Controller::new(config, quit);
    controller.run(&archive)
}
