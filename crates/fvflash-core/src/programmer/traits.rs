//! Programmer trait definitions
//!
//! A transport only has to move single SPI commands. Everything built on top
//! of that (batches, chunked reads, page and AAI writes) has a generic
//! implementation in [`crate::protocol::spi25`] which the trait uses by
//! default. Transports with native bulk support may override those methods.

use crate::error::Result;
use crate::protocol::spi25;
use crate::spi::SpiCommand;
use bitflags::bitflags;

bitflags! {
    /// SPI master feature flags
    ///
    /// These flags indicate what capabilities a programmer supports.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SpiFeatures: u32 {
        /// Can carry 4-byte addressing commands
        const FOUR_BYTE_ADDR = 1 << 0;
    }
}

impl Default for SpiFeatures {
    fn default() -> Self {
        SpiFeatures::empty()
    }
}

/// Capability descriptor a transport advertises to the host
///
/// The data limits count payload bytes only: the opcode and address header
/// of a command are not included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Transport identifier
    pub name: &'static str,
    /// Maximum number of bytes read back by a single command
    pub max_data_read: usize,
    /// Maximum number of data bytes written by a single command
    pub max_data_write: usize,
    /// Feature flags
    pub features: SpiFeatures,
}

/// SPI Master trait
///
/// This trait represents a programmer that can execute SPI commands.
/// Implementations are blocking: a call returns once the command has been
/// executed on the chip or has failed.
///
/// Only [`execute`](SpiMaster::execute) is transport specific. The bulk
/// operations default to generic implementations expressed as repeated
/// `execute` calls bounded by [`capabilities`](SpiMaster::capabilities).
pub trait SpiMaster {
    /// Get the capability descriptor of this programmer
    fn capabilities(&self) -> Capabilities;

    /// Execute a single SPI command
    ///
    /// The command's write phase (opcode, address, `write_data`) is clocked
    /// out first, then `read_buf.len()` bytes are clocked in.
    fn execute(&mut self, cmd: &mut SpiCommand<'_>) -> Result<()>;

    /// Delay for the specified number of microseconds
    fn delay_us(&mut self, us: u32);

    /// Get the features supported by this programmer
    fn features(&self) -> SpiFeatures {
        self.capabilities().features
    }

    /// Get the maximum number of bytes that can be read in a single command
    fn max_read_len(&self) -> usize {
        self.capabilities().max_data_read
    }

    /// Get the maximum number of data bytes that can be written in a single command
    fn max_write_len(&self) -> usize {
        self.capabilities().max_data_write
    }

    /// Execute several commands back to back, stopping at the first failure
    fn send_multicommand(&mut self, cmds: &mut [SpiCommand<'_>]) -> Result<()> {
        spi25::send_multicommand(self, cmds)
    }

    /// Read `buf.len()` bytes of flash starting at `addr`
    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        spi25::read(self, addr, buf)
    }

    /// Program `data` at `addr` using page program commands
    fn write_256(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        spi25::write_256(self, addr, data)
    }

    /// Program `data` at `addr` using SST auto address increment
    fn write_aai(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        spi25::write_aai(self, addr, data)
    }
}

// Forward through boxes so hosts can hold type-erased masters
impl<M: SpiMaster + ?Sized> SpiMaster for alloc::boxed::Box<M> {
    fn capabilities(&self) -> Capabilities {
        (**self).capabilities()
    }

    fn execute(&mut self, cmd: &mut SpiCommand<'_>) -> Result<()> {
        (**self).execute(cmd)
    }

    fn delay_us(&mut self, us: u32) {
        (**self).delay_us(us)
    }

    fn send_multicommand(&mut self, cmds: &mut [SpiCommand<'_>]) -> Result<()> {
        (**self).send_multicommand(cmds)
    }

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        (**self).read(addr, buf)
    }

    fn write_256(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        (**self).write_256(addr, data)
    }

    fn write_aai(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        (**self).write_aai(addr, data)
    }
}

/// Information about a programmer
#[derive(Debug, Clone)]
pub struct ProgrammerInfo {
    /// Name of the programmer
    pub name: &'static str,
    /// Alternative names/aliases
    pub aliases: &'static [&'static str],
    /// Description
    pub description: &'static str,
}
