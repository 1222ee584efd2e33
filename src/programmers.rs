//! Programmer registration and dispatch
//!
//! This module provides a centralized registry for all programmers, with support
//! for feature-gated inclusion and dynamic help text generation.

use fvflash_core::programmer::{ProgrammerInfo, ShutdownRegistry, SpiMaster};
use thiserror::Error;

/// Errors from selecting or opening a programmer
#[derive(Debug, Error)]
pub enum ProgrammerError {
    /// No programmer with this name is compiled in
    #[error("Unknown programmer: {name}\n\n{help}\nUse 'fvflash list-programmers' for more details")]
    Unknown { name: String, help: String },

    /// A programmer parameter could not be used
    #[error("Invalid {programmer} parameter: {message}")]
    InvalidParameter {
        programmer: &'static str,
        message: String,
    },
}

/// Get information about all available programmers (enabled at compile time)
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_programmers() -> Vec<ProgrammerInfo> {
    let mut programmers = Vec::new();

    #[cfg(feature = "fernvale")]
    programmers.push(ProgrammerInfo {
        name: "fernvale_spi",
        aliases: &["fernvale"],
        description: "Fernvale serial SPI bridge (dev=<tty>,baud=<bps>,timeout=<ms>,sync_timeout=<ms>)",
    });

    #[cfg(feature = "dummy")]
    programmers.push(ProgrammerInfo {
        name: "dummy",
        aliases: &[],
        description: "In-memory flash emulator for testing (chip=w25q128fv|sst25vf016b)",
    });

    programmers
}

/// Generate help text listing all available programmers
pub fn programmer_help() -> String {
    let programmers = available_programmers();

    if programmers.is_empty() {
        return "No programmers available (recompile with programmer features enabled)".to_string();
    }

    let mut help = String::from("Available programmers:\n");
    for p in &programmers {
        help.push_str(&format!("  {:14} - {}\n", p.name, p.description));
    }
    help
}

/// Generate a short list of programmer names for CLI help
pub fn programmer_names_short() -> String {
    let programmers = available_programmers();
    let names: Vec<&str> = programmers.iter().map(|p| p.name).collect();
    names.join(", ")
}

/// Resolve a programmer name or alias to its canonical name
pub fn find_programmer(name: &str) -> Option<&'static str> {
    available_programmers()
        .into_iter()
        .find(|p| p.name == name || p.aliases.contains(&name))
        .map(|p| p.name)
}

/// Parse a programmer string into name and options
///
/// Format: "name" or "name:option1=value1,option2=value2"
pub fn parse_programmer_string(s: &str) -> (&str, Vec<(&str, &str)>) {
    if let Some((name, opts)) = s.split_once(':') {
        let options: Vec<_> = opts
            .split(',')
            .filter_map(|opt| opt.split_once('='))
            .collect();
        (name, options)
    } else {
        (s, Vec::new())
    }
}

/// An open programmer together with the teardown it registered
///
/// The registry runs when the handle is finished or dropped, whichever
/// comes first, and never twice.
pub struct ProgrammerHandle<M: SpiMaster> {
    master: M,
    shutdown: ShutdownRegistry<M>,
}

impl<M: SpiMaster> ProgrammerHandle<M> {
    /// Wrap a master and the hooks registered while opening it
    pub fn new(master: M, shutdown: ShutdownRegistry<M>) -> Self {
        Self { master, shutdown }
    }

    /// Access the master
    pub fn master_mut(&mut self) -> &mut M {
        &mut self.master
    }

    /// Run the shutdown hooks, returning how many failed
    pub fn finish(&mut self) -> usize {
        self.shutdown.run(&mut self.master)
    }
}

impl<M: SpiMaster> Drop for ProgrammerHandle<M> {
    fn drop(&mut self) {
        self.finish();
    }
}

fn run_with_handle<M, F>(mut handle: ProgrammerHandle<M>, f: F) -> Result<(), Box<dyn std::error::Error>>
where
    M: SpiMaster,
    F: FnOnce(&mut dyn SpiMaster) -> Result<(), Box<dyn std::error::Error>>,
{
    let result = f(handle.master_mut());
    let failures = handle.finish();
    if failures > 0 {
        log::warn!("{} shutdown hook(s) failed", failures);
    }
    result
}

/// Execute a function with the specified programmer
///
/// The programmer string can be just the name (e.g., "fernvale_spi") or
/// include parameters (e.g., "fernvale_spi:dev=/dev/ttyUSB0").
#[allow(unused_variables)]
pub fn with_programmer<F>(programmer: &str, f: F) -> Result<(), Box<dyn std::error::Error>>
where
    F: FnOnce(&mut dyn SpiMaster) -> Result<(), Box<dyn std::error::Error>>,
{
    let (name, options) = parse_programmer_string(programmer);

    let canonical_name = find_programmer(name).ok_or_else(|| ProgrammerError::Unknown {
        name: name.to_string(),
        help: programmer_help(),
    })?;

    match canonical_name {
        #[cfg(feature = "fernvale")]
        "fernvale_spi" => {
            log::info!("Opening Fernvale SPI bridge...");

            let mut registry = ShutdownRegistry::new();
            let master = fvflash_fernvale::open_fernvale_spi(&options, &mut registry)
                .map_err(|e| format!("Failed to initialize fernvale_spi: {}", e))?;

            run_with_handle(ProgrammerHandle::new(master, registry), f)
        }

        #[cfg(feature = "dummy")]
        "dummy" => {
            let config = parse_dummy_options(&options)?;
            let master = fvflash_dummy::DummyFlash::new(config);
            run_with_handle(ProgrammerHandle::new(master, ShutdownRegistry::new()), f)
        }

        _ => Err(ProgrammerError::Unknown {
            name: name.to_string(),
            help: programmer_help(),
        }
        .into()),
    }
}

#[cfg(feature = "dummy")]
fn parse_dummy_options(
    options: &[(&str, &str)],
) -> Result<fvflash_dummy::DummyConfig, ProgrammerError> {
    use fvflash_dummy::DummyConfig;

    let mut config = DummyConfig::default();
    for (key, value) in options {
        match *key {
            "chip" => {
                config = match value.to_ascii_lowercase().as_str() {
                    "w25q128fv" => DummyConfig::default(),
                    "sst25vf016b" => DummyConfig::sst25vf016b(),
                    _ => {
                        return Err(ProgrammerError::InvalidParameter {
                            programmer: "dummy",
                            message: format!("unknown chip '{}'", value),
                        })
                    }
                };
            }
            _ => log::warn!("dummy: Unknown option: {}={}", key, value),
        }
    }
    Ok(config)
}
