//! fvflash-fernvale - Fernvale serial SPI bridge support
//!
//! The Fernvale board exposes its SPI flash through a small firmware console
//! on a serial line. Sending `spi flashrom\n` switches the console into a
//! binary mode in which the host drives raw SPI transactions.
//!
//! # Protocol Overview
//!
//! 1. The host opens the tty and puts it into raw mode (921600 baud on
//!    Linux, 230400 elsewhere).
//! 2. The host sends the greeting and discards everything up to and
//!    including the ready byte `0x05`.
//! 3. Each SPI transaction is one frame, `[out_len] [in_len] [payload]`,
//!    answered by exactly `in_len` bytes.
//! 4. The frame `[0, 0]` makes the bridge leave SPI mode.
//!
//! # Example
//!
//! ```no_run
//! use fvflash_fernvale::{Fernvale, FernvaleConfig};
//! use fvflash_core::protocol::spi25;
//!
//! let config = FernvaleConfig::new("/dev/ttyUSB0");
//! let mut bridge = Fernvale::open(&config)?;
//!
//! let (mfr, dev) = spi25::read_jedec_id(&mut bridge)?;
//! println!("JEDEC ID: {:02X} {:04X}", mfr, dev);
//!
//! bridge.shutdown()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Usage with fvflash CLI
//!
//! ```bash
//! # Probe using the default device (/dev/fernvale)
//! fvflash probe -p fernvale_spi
//!
//! # Another device, slower line
//! fvflash read -p fernvale_spi:dev=/dev/ttyUSB0,baud=230400 -o flash.bin
//! ```

pub mod channel;
pub mod device;
pub mod error;
pub mod protocol;
pub mod serial;

#[cfg(test)]
mod mock;

// Re-exports
pub use channel::{Channel, ChannelError, Link};
pub use device::{parse_options, Fernvale, FernvaleConfig, SessionState, CAPABILITIES};
pub use error::{FernvaleError, Result};
pub use protocol::Phase;
pub use serial::{BaudRate, SerialLink};

use fvflash_core::programmer::ShutdownRegistry;

/// Name the shutdown hook is registered under
pub const SHUTDOWN_HOOK: &str = "fernvale_spi";

/// Register the session's shutdown with the host's registry
pub fn register_shutdown<L: Link + 'static>(registry: &mut ShutdownRegistry<Fernvale<L>>) {
    registry.register(SHUTDOWN_HOOK, |bridge: &mut Fernvale<L>| {
        bridge.shutdown().map_err(Into::into)
    });
}

/// Open a Fernvale bridge for use in the CLI programmer dispatch
///
/// The session's shutdown is registered with `registry` exactly once.
///
/// # Example Options
///
/// - `dev=/dev/ttyUSB0` - Optional: device path (default: /dev/fernvale)
/// - `baud=230400` - Optional: line speed
/// - `timeout=5000` - Optional: reply timeout in ms, 0 to wait forever
/// - `sync_timeout=10000` - Optional: handshake timeout in ms
pub fn open_fernvale_spi(
    options: &[(&str, &str)],
    registry: &mut ShutdownRegistry<Fernvale<SerialLink>>,
) -> Result<Fernvale<SerialLink>> {
    let config = parse_options(options)?;
    let bridge = Fernvale::open(&config)?;
    register_shutdown(registry);
    Ok(bridge)
}
