//! fvflash-dummy - In-memory flash emulator for testing
//!
//! This crate emulates a JEDEC SPI NOR flash chip in memory. The emulation
//! works on raw SPI transactions (bytes clocked out, bytes clocked in) the
//! same way a real chip sees them, so it can sit behind any transport: used
//! directly as an [`SpiMaster`], or as the far end of a simulated serial
//! bridge in transport tests.

#![no_std]

extern crate alloc;

use alloc::vec;
use alloc::vec::Vec;

use fvflash_core::error::{Error, Result};
use fvflash_core::programmer::{Capabilities, SpiFeatures, SpiMaster};
use fvflash_core::spi::{opcodes, AddressWidth, SpiCommand};

/// Configuration for the dummy flash
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// JEDEC manufacturer ID
    pub manufacturer_id: u8,
    /// JEDEC device ID
    pub device_id: u16,
    /// Flash size in bytes
    pub size: usize,
    /// Page size for programming
    pub page_size: usize,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            manufacturer_id: 0xEF, // Winbond
            device_id: 0x4018,     // W25Q128FV
            size: 16 * 1024 * 1024,
            page_size: 256,
        }
    }
}

impl DummyConfig {
    /// SST25VF016B: 2 MiB chip programmed with AAI word writes
    pub fn sst25vf016b() -> Self {
        Self {
            manufacturer_id: 0xBF,
            device_id: 0x2541,
            size: 2 * 1024 * 1024,
            page_size: 256,
        }
    }
}

/// Dummy flash chip
///
/// Emulates a flash chip in memory for testing purposes.
pub struct DummyFlash {
    config: DummyConfig,
    data: Vec<u8>,
    status_reg1: u8,
    write_enabled: bool,
    /// Next AAI word address while an AAI sequence is active
    aai_addr: Option<u32>,
    transactions: usize,
}

impl DummyFlash {
    /// Create a new dummy flash with the given configuration
    pub fn new(config: DummyConfig) -> Self {
        let data = vec![0xFF; config.size];
        Self {
            config,
            data,
            status_reg1: 0,
            write_enabled: false,
            aai_addr: None,
            transactions: 0,
        }
    }

    /// Create a new dummy flash with default configuration (W25Q128FV)
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Create a dummy flash with pre-filled data
    pub fn with_data(config: DummyConfig, initial_data: &[u8]) -> Self {
        let mut flash = Self::new(config);
        let len = core::cmp::min(initial_data.len(), flash.data.len());
        flash.data[..len].copy_from_slice(&initial_data[..len]);
        flash
    }

    /// Get a reference to the flash data
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Number of raw transactions executed so far
    pub fn transactions(&self) -> usize {
        self.transactions
    }

    /// Execute one raw SPI transaction
    ///
    /// `write` holds every byte clocked out (opcode first), `read` is filled
    /// with the bytes the chip clocks back afterwards.
    pub fn transfer(&mut self, write: &[u8], read: &mut [u8]) -> Result<()> {
        self.transactions += 1;
        let (&opcode, rest) = write.split_first().ok_or(Error::SpiTransferFailed)?;
        log::trace!(
            "dummy: opcode 0x{:02X}, {} bytes out, {} bytes in",
            opcode,
            write.len(),
            read.len()
        );

        // Only AAI continuation, status reads and WRDI are legal inside AAI
        if self.aai_addr.is_some()
            && !matches!(opcode, opcodes::AAI_WP | opcodes::RDSR | opcodes::WRDI)
        {
            return Err(Error::OpcodeNotSupported);
        }

        match opcode {
            opcodes::RDID => {
                let id = [
                    self.config.manufacturer_id,
                    (self.config.device_id >> 8) as u8,
                    self.config.device_id as u8,
                ];
                fill_repeating(read, &id);
                Ok(())
            }

            opcodes::RDSR => {
                read.fill(self.status());
                Ok(())
            }

            opcodes::WRSR => {
                if self.write_enabled {
                    if let Some(&value) = rest.first() {
                        self.status_reg1 = value & !(opcodes::SR1_WIP | opcodes::SR1_WEL);
                    }
                    self.write_enabled = false;
                }
                Ok(())
            }

            opcodes::WREN => {
                self.write_enabled = true;
                Ok(())
            }
            opcodes::WRDI => {
                self.write_enabled = false;
                self.aai_addr = None;
                Ok(())
            }

            opcodes::READ => self.handle_read(AddressWidth::ThreeByte, 0, rest, read),
            opcodes::FAST_READ => self.handle_read(AddressWidth::ThreeByte, 1, rest, read),
            opcodes::READ_4B => self.handle_read(AddressWidth::FourByte, 0, rest, read),

            opcodes::PP => self.handle_page_program(AddressWidth::ThreeByte, rest),
            opcodes::PP_4B => self.handle_page_program(AddressWidth::FourByte, rest),
            opcodes::AAI_WP => self.handle_aai(rest),

            opcodes::SE_20 => self.handle_erase(rest, 4 * 1024),
            opcodes::BE_52 => self.handle_erase(rest, 32 * 1024),
            opcodes::BE_D8 => self.handle_erase(rest, 64 * 1024),
            opcodes::CE_60 | opcodes::CE_C7 => self.handle_chip_erase(),

            opcodes::EN4B | opcodes::EX4B => Ok(()),

            _ => Err(Error::OpcodeNotSupported),
        }
    }

    fn status(&self) -> u8 {
        let mut status = self.status_reg1;
        if self.write_enabled {
            status |= opcodes::SR1_WEL;
        }
        if self.aai_addr.is_some() {
            status |= opcodes::SR1_AAI;
        }
        status
    }

    fn decode_addr(&self, width: AddressWidth, rest: &[u8]) -> Result<usize> {
        width
            .decode(rest)
            .map(|addr| addr as usize)
            .ok_or(Error::SpiTransferFailed)
    }

    fn handle_read(
        &mut self,
        width: AddressWidth,
        dummy_bytes: usize,
        rest: &[u8],
        read: &mut [u8],
    ) -> Result<()> {
        let addr = self.decode_addr(width, rest)?;
        let len = read.len();
        if rest.len() < width.bytes() as usize + dummy_bytes {
            return Err(Error::SpiTransferFailed);
        }

        if addr + len > self.data.len() {
            return Err(Error::AddressOutOfBounds);
        }

        read.copy_from_slice(&self.data[addr..addr + len]);
        Ok(())
    }

    fn program(&mut self, addr: usize, data: &[u8]) -> Result<()> {
        if addr + data.len() > self.data.len() {
            return Err(Error::AddressOutOfBounds);
        }

        // Flash programming: can only change 1 -> 0
        for (cell, &byte) in self.data[addr..addr + data.len()].iter_mut().zip(data) {
            *cell &= byte;
        }
        Ok(())
    }

    fn handle_page_program(&mut self, width: AddressWidth, rest: &[u8]) -> Result<()> {
        if !self.write_enabled {
            return Err(Error::WriteProtected);
        }

        let addr = self.decode_addr(width, rest)?;
        let data = &rest[width.bytes() as usize..];
        let page_size = self.config.page_size;

        if data.len() > page_size {
            return Err(Error::WriteError);
        }

        // Page program wraps within the page like real chips do
        let page_base = addr & !(page_size - 1);
        for (i, &byte) in data.iter().enumerate() {
            let target = page_base + (addr - page_base + i) % page_size;
            self.program(target, &[byte])?;
        }

        self.write_enabled = false;
        Ok(())
    }

    fn handle_aai(&mut self, rest: &[u8]) -> Result<()> {
        let (addr, word) = match self.aai_addr {
            Some(addr) => (addr as usize, rest),
            None => {
                if !self.write_enabled {
                    return Err(Error::WriteProtected);
                }
                let addr = self.decode_addr(AddressWidth::ThreeByte, rest)?;
                (addr, &rest[AddressWidth::ThreeByte.bytes() as usize..])
            }
        };

        if word.len() != 2 || addr % 2 != 0 {
            return Err(Error::WriteError);
        }

        self.program(addr, word)?;
        self.aai_addr = Some((addr + 2) as u32);
        Ok(())
    }

    fn handle_erase(&mut self, rest: &[u8], erase_size: usize) -> Result<()> {
        if !self.write_enabled {
            return Err(Error::WriteProtected);
        }

        let addr = self.decode_addr(AddressWidth::ThreeByte, rest)?;

        // Align address to erase boundary
        let aligned_addr = addr & !(erase_size - 1);

        if aligned_addr + erase_size > self.data.len() {
            return Err(Error::AddressOutOfBounds);
        }

        self.data[aligned_addr..aligned_addr + erase_size].fill(0xFF);

        self.write_enabled = false;
        Ok(())
    }

    fn handle_chip_erase(&mut self) -> Result<()> {
        if !self.write_enabled {
            return Err(Error::WriteProtected);
        }

        self.data.fill(0xFF);
        self.write_enabled = false;
        Ok(())
    }
}

/// Fill `buf` by repeating `pattern`, as chips do when clocked past an ID
fn fill_repeating(buf: &mut [u8], pattern: &[u8]) {
    for (b, p) in buf.iter_mut().zip(pattern.iter().cycle()) {
        *b = *p;
    }
}

impl SpiMaster for DummyFlash {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            name: "dummy",
            max_data_read: 4096,
            max_data_write: self.config.page_size,
            features: SpiFeatures::FOUR_BYTE_ADDR,
        }
    }

    fn execute(&mut self, cmd: &mut SpiCommand<'_>) -> Result<()> {
        let write = cmd.to_bytes();
        self.transfer(&write, cmd.read_buf)
    }

    fn delay_us(&mut self, _us: u32) {
        // No delay needed for in-memory operations
    }
}
