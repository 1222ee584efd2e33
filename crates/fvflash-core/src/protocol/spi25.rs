//! SPI25 protocol implementation
//!
//! This module implements the common SPI flash command sequences as defined
//! by JEDEC, plus the generic bulk operations a transport gets for free when
//! it only supplies single command execution:
//!
//! - [`send_multicommand`]: run a batch of commands in order
//! - [`read`]: chunked reads bounded by the master's read limit
//! - [`write_256`]: page program, never crossing a page boundary
//! - [`write_aai`]: SST auto address increment word program

use crate::error::{Error, Result};
use crate::programmer::{SpiFeatures, SpiMaster};
use crate::spi::{opcodes, AddressWidth, SpiCommand};
use core::cmp::min;

/// Page program typically takes 0.7-5ms
const PROGRAM_POLL_DELAY_US: u32 = 10;
const PROGRAM_TIMEOUT_US: u32 = 10_000;

/// Read the JEDEC ID from a flash chip
///
/// Returns (manufacturer_id, device_id) on success.
pub fn read_jedec_id<M: SpiMaster + ?Sized>(master: &mut M) -> Result<(u8, u16)> {
    let mut buf = [0u8; 3];
    let mut cmd = SpiCommand::read_reg(opcodes::RDID, &mut buf);
    master.execute(&mut cmd)?;

    let manufacturer = buf[0];
    let device = ((buf[1] as u16) << 8) | (buf[2] as u16);

    Ok((manufacturer, device))
}

/// Read the status register 1
pub fn read_status1<M: SpiMaster + ?Sized>(master: &mut M) -> Result<u8> {
    let mut buf = [0u8; 1];
    let mut cmd = SpiCommand::read_reg(opcodes::RDSR, &mut buf);
    master.execute(&mut cmd)?;
    Ok(buf[0])
}

/// Send the Write Enable command
pub fn write_enable<M: SpiMaster + ?Sized>(master: &mut M) -> Result<()> {
    let mut cmd = SpiCommand::simple(opcodes::WREN);
    master.execute(&mut cmd)
}

/// Send the Write Disable command
pub fn write_disable<M: SpiMaster + ?Sized>(master: &mut M) -> Result<()> {
    let mut cmd = SpiCommand::simple(opcodes::WRDI);
    master.execute(&mut cmd)
}

/// Wait for the WIP (Write In Progress) bit to clear
///
/// Polls the status register every `poll_delay_us` microseconds and gives up
/// with [`Error::Timeout`] after roughly `timeout_us`.
pub fn wait_ready<M: SpiMaster + ?Sized>(
    master: &mut M,
    poll_delay_us: u32,
    timeout_us: u32,
) -> Result<()> {
    let max_polls = if poll_delay_us > 0 {
        (timeout_us / poll_delay_us).max(1)
    } else {
        timeout_us.max(1)
    };

    for _ in 0..max_polls {
        let status = read_status1(master)?;
        if status & opcodes::SR1_WIP == 0 {
            return Ok(());
        }
        if poll_delay_us > 0 {
            master.delay_us(poll_delay_us);
        }
    }

    Err(Error::Timeout)
}

/// Execute a batch of commands in order, stopping at the first failure
pub fn send_multicommand<M: SpiMaster + ?Sized>(
    master: &mut M,
    cmds: &mut [SpiCommand<'_>],
) -> Result<()> {
    for cmd in cmds.iter_mut() {
        master.execute(cmd)?;
    }
    Ok(())
}

/// Pick the address width for an access to `[addr, addr + len)`
fn address_width_for<M: SpiMaster + ?Sized>(
    master: &M,
    addr: u32,
    len: usize,
) -> Result<AddressWidth> {
    let end = addr as u64 + len as u64;
    if end <= AddressWidth::ThreeByte.max_size() as u64 {
        Ok(AddressWidth::ThreeByte)
    } else if master.features().contains(SpiFeatures::FOUR_BYTE_ADDR)
        && end <= AddressWidth::FourByte.max_size() as u64 + 1
    {
        Ok(AddressWidth::FourByte)
    } else {
        Err(Error::AddressOutOfBounds)
    }
}

/// Read flash contents in chunks no larger than the master's read limit
pub fn read<M: SpiMaster + ?Sized>(master: &mut M, addr: u32, buf: &mut [u8]) -> Result<()> {
    let max_len = master.max_read_len();
    if max_len == 0 {
        return Err(Error::TransferTooLarge);
    }

    let mut offset = 0;
    while offset < buf.len() {
        let chunk_len = min(max_len, buf.len() - offset);
        let chunk_addr = addr + offset as u32;
        let width = address_width_for(master, chunk_addr, chunk_len)?;
        let chunk = &mut buf[offset..offset + chunk_len];
        let mut cmd = match width {
            AddressWidth::FourByte => SpiCommand::read_4b(opcodes::READ_4B, chunk_addr, chunk),
            _ => SpiCommand::read_3b(opcodes::READ, chunk_addr, chunk),
        };
        master.execute(&mut cmd)?;
        offset += chunk_len;
    }

    Ok(())
}

/// Program a chunk that lies within a single page
fn program_chunk<M: SpiMaster + ?Sized>(master: &mut M, addr: u32, data: &[u8]) -> Result<()> {
    let width = address_width_for(master, addr, data.len())?;
    write_enable(master)?;
    let mut cmd = match width {
        AddressWidth::FourByte => SpiCommand::write_4b(opcodes::PP_4B, addr, data),
        _ => SpiCommand::write_3b(opcodes::PP, addr, data),
    };
    master.execute(&mut cmd)?;
    wait_ready(master, PROGRAM_POLL_DELAY_US, PROGRAM_TIMEOUT_US)
}

/// Program data with page program commands
///
/// Chunks never cross a 256-byte page boundary and never exceed the master's
/// write limit. The target region must already be erased.
pub fn write_256<M: SpiMaster + ?Sized>(master: &mut M, addr: u32, data: &[u8]) -> Result<()> {
    let max_len = min(master.max_write_len(), opcodes::PAGE_SIZE);
    if max_len == 0 {
        return Err(Error::TransferTooLarge);
    }

    let mut offset = 0;
    while offset < data.len() {
        let chunk_addr = addr + offset as u32;
        let page_remaining = opcodes::PAGE_SIZE - (chunk_addr as usize % opcodes::PAGE_SIZE);
        let chunk_len = min(min(max_len, page_remaining), data.len() - offset);
        program_chunk(master, chunk_addr, &data[offset..offset + chunk_len])?;
        offset += chunk_len;
    }

    Ok(())
}

/// Program data with SST auto address increment (AAI) word programming
///
/// AAI writes 16-bit words at even addresses. A leading byte at an odd
/// address and a trailing odd byte are written with single byte programs.
pub fn write_aai<M: SpiMaster + ?Sized>(master: &mut M, addr: u32, data: &[u8]) -> Result<()> {
    if data.is_empty() {
        return Ok(());
    }
    if addr as u64 + data.len() as u64 > AddressWidth::ThreeByte.max_size() as u64 {
        return Err(Error::AddressOutOfBounds);
    }

    let mut pos = 0;
    if addr % 2 == 1 {
        program_chunk(master, addr, &data[..1])?;
        pos = 1;
    }

    let words_len = (data.len() - pos) & !1;
    if words_len > 0 {
        let start = addr + pos as u32;
        if let Err(e) = aai_words(master, start, &data[pos..pos + words_len]) {
            // Leave AAI mode so the chip accepts regular commands again
            let _ = write_disable(master);
            return Err(e);
        }
        pos += words_len;
    }

    if pos < data.len() {
        program_chunk(master, addr + pos as u32, &data[pos..])?;
    }

    Ok(())
}

/// Run one AAI sequence over an even number of bytes starting at an even address
fn aai_words<M: SpiMaster + ?Sized>(master: &mut M, addr: u32, words: &[u8]) -> Result<()> {
    let mut pairs = words.chunks_exact(2);

    write_enable(master)?;
    if let Some(first) = pairs.next() {
        let mut cmd = SpiCommand::write_3b(opcodes::AAI_WP, addr, first);
        master.execute(&mut cmd)?;
        wait_ready(master, PROGRAM_POLL_DELAY_US, PROGRAM_TIMEOUT_US)?;
    }

    for pair in pairs {
        let mut cmd = SpiCommand::write_reg(opcodes::AAI_WP, pair);
        master.execute(&mut cmd)?;
        wait_ready(master, PROGRAM_POLL_DELAY_US, PROGRAM_TIMEOUT_US)?;
    }

    write_disable(master)?;
    wait_ready(master, PROGRAM_POLL_DELAY_US, PROGRAM_TIMEOUT_US)
}
