//! CLI argument parsing

use crate::programmers;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
pub fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Bytes given on the command line in hex
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexBytes(pub Vec<u8>);

/// Parse a hex byte string such as "9f", "0x9F" or "03 00 10 00"
pub fn parse_hex_bytes(s: &str) -> Result<HexBytes, String> {
    let digits: String = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();

    if digits.is_empty() {
        return Err("No bytes given".to_string());
    }
    if !digits.is_ascii() {
        return Err(format!("Invalid hex string: {}", s));
    }
    if digits.len() % 2 != 0 {
        return Err(format!("Odd number of hex digits: {}", digits));
    }

    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|e| format!("Invalid hex byte '{}': {}", &digits[i..i + 2], e))
        })
        .collect::<Result<Vec<u8>, String>>()
        .map(HexBytes)
}

/// Generate dynamic help text for the programmer argument
fn programmer_help() -> String {
    format!(
        "Programmer to use, as name[:key=value,...] [available: {}]",
        programmers::programmer_names_short()
    )
}

#[derive(Parser)]
#[command(name = "fvflash")]
#[command(author, version, about = "SPI flash access through the Fernvale serial bridge", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v debug, -vv wire trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Log level requested on the command line, if any
    ///
    /// `None` leaves the environment (`RUST_LOG`, default `info`) in charge.
    pub fn log_level(&self) -> Option<log::LevelFilter> {
        match self.verbose {
            0 => None,
            1 => Some(log::LevelFilter::Debug),
            _ => Some(log::LevelFilter::Trace),
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Probe for flash chip
    Probe {
        /// Programmer to use
        #[arg(short, long, help = programmer_help())]
        programmer: String,
    },

    /// Read flash contents to file
    Read {
        /// Programmer to use
        #[arg(short, long, help = programmer_help())]
        programmer: String,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Start address (hex or decimal)
        #[arg(long, value_parser = parse_hex_u32, default_value = "0")]
        start: u32,

        /// Number of bytes to read (hex or decimal)
        #[arg(long, value_parser = parse_hex_u32)]
        length: u32,
    },

    /// Send one raw SPI transaction
    Raw {
        /// Programmer to use
        #[arg(short, long, help = programmer_help())]
        programmer: String,

        /// Bytes to clock out, opcode first (hex, e.g. "9f" or "03 00 10 00")
        #[arg(short, long, value_parser = parse_hex_bytes)]
        write: HexBytes,

        /// Number of bytes to clock in afterwards
        #[arg(short, long, default_value_t = 0)]
        read: usize,
    },

    /// List supported programmers
    ListProgrammers,
}
