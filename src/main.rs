//! fvflash - SPI flash access through the Fernvale serial bridge
//!
//! The Fernvale board's firmware console can act as a raw SPI bridge. This
//! tool drives it from the host: every command is expressed as single SPI
//! transactions, which the `fernvale_spi` programmer frames over the serial
//! line. The `dummy` programmer runs the same commands against an in-memory
//! chip.

mod cli;
mod commands;
mod programmers;

use clap::Parser;
use cli::{Cli, Commands};
use programmers::with_programmer;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logger; -v/-vv override RUST_LOG
    let mut logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(level) = cli.log_level() {
        logger.filter_level(level);
    }
    logger.init();

    let result = match cli.command {
        Commands::Probe { programmer } => with_programmer(&programmer, commands::run_probe),
        Commands::Read {
            programmer,
            output,
            start,
            length,
        } => with_programmer(&programmer, |master| {
            commands::run_read(master, &output, start, length)
        }),
        Commands::Raw {
            programmer,
            write,
            read,
        } => with_programmer(&programmer, |master| {
            commands::run_raw(master, &write.0, read)
        }),
        Commands::ListProgrammers => {
            commands::list_programmers();
            Ok(())
        }
    };

    result
}
