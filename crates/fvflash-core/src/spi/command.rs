//! SPI command structure

use super::AddressWidth;
use alloc::vec::Vec;

/// A single SPI transaction
///
/// Designed to avoid allocation - uses slices for data.
/// The lifetime parameter `'a` ties the command to the buffers it references.
///
/// On the wire a command is a write phase (opcode, address, `write_data`)
/// immediately followed by a read phase filling `read_buf`.
pub struct SpiCommand<'a> {
    /// The opcode byte
    pub opcode: u8,

    /// Address (if any)
    pub address: Option<u32>,

    /// Address width
    pub address_width: AddressWidth,

    /// Data to write after opcode/address
    pub write_data: &'a [u8],

    /// Buffer to read into (mutable)
    pub read_buf: &'a mut [u8],
}

impl<'a> SpiCommand<'a> {
    /// Create a simple command with no address or data (e.g., WREN, WRDI)
    pub fn simple(opcode: u8) -> Self {
        Self {
            opcode,
            address: None,
            address_width: AddressWidth::None,
            write_data: &[],
            read_buf: &mut [],
        }
    }

    /// Create a read register command with no address (e.g., RDSR)
    pub fn read_reg(opcode: u8, buf: &'a mut [u8]) -> Self {
        Self {
            read_buf: buf,
            ..Self::simple(opcode)
        }
    }

    /// Create a write register command with no address (e.g., WRSR, AAI continuation)
    pub fn write_reg(opcode: u8, data: &'a [u8]) -> Self {
        Self {
            write_data: data,
            ..Self::simple(opcode)
        }
    }

    /// Create a read command with 3-byte address (e.g., READ)
    pub fn read_3b(opcode: u8, addr: u32, buf: &'a mut [u8]) -> Self {
        Self {
            opcode,
            address: Some(addr),
            address_width: AddressWidth::ThreeByte,
            write_data: &[],
            read_buf: buf,
        }
    }

    /// Create a read command with 4-byte address
    pub fn read_4b(opcode: u8, addr: u32, buf: &'a mut [u8]) -> Self {
        Self {
            address_width: AddressWidth::FourByte,
            ..Self::read_3b(opcode, addr, buf)
        }
    }

    /// Create a write command with 3-byte address (e.g., PP)
    pub fn write_3b(opcode: u8, addr: u32, data: &'a [u8]) -> Self {
        Self {
            opcode,
            address: Some(addr),
            address_width: AddressWidth::ThreeByte,
            write_data: data,
            read_buf: &mut [],
        }
    }

    /// Create a write command with 4-byte address
    pub fn write_4b(opcode: u8, addr: u32, data: &'a [u8]) -> Self {
        Self {
            address_width: AddressWidth::FourByte,
            ..Self::write_3b(opcode, addr, data)
        }
    }

    /// Create an erase command with 3-byte address
    pub fn erase_3b(opcode: u8, addr: u32) -> Self {
        Self::write_3b(opcode, addr, &[])
    }

    /// Returns true if this command has a read phase
    pub fn has_read(&self) -> bool {
        !self.read_buf.is_empty()
    }

    /// Returns true if this command has a data write phase
    pub fn has_write(&self) -> bool {
        !self.write_data.is_empty()
    }

    /// Number of bytes preceding `write_data`: opcode plus address
    pub fn header_len(&self) -> usize {
        1 + if self.address.is_some() {
            self.address_width.bytes() as usize
        } else {
            0
        }
    }

    /// Encode opcode and address into the front of `buf`
    ///
    /// `buf` must be at least `header_len()` bytes long.
    pub fn encode_header(&self, buf: &mut [u8]) {
        buf[0] = self.opcode;
        if let Some(addr) = self.address {
            self.address_width.encode(addr, &mut buf[1..]);
        }
    }

    /// Total bytes clocked out during the write phase
    pub fn write_len(&self) -> usize {
        self.header_len() + self.write_data.len()
    }

    /// Raw bytes of the write phase: opcode, big-endian address, data
    pub fn to_bytes(&self) -> Vec<u8> {
        let header_len = self.header_len();
        let mut bytes = alloc::vec![0u8; header_len + self.write_data.len()];
        self.encode_header(&mut bytes);
        bytes[header_len..].copy_from_slice(self.write_data);
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spi::opcodes;

    #[test]
    fn test_read_command_bytes() {
        let mut buf = [0u8; 16];
        let cmd = SpiCommand::read_3b(opcodes::READ, 0x01_0203, &mut buf);
        assert_eq!(cmd.header_len(), 4);
        assert_eq!(cmd.to_bytes(), [opcodes::READ, 0x01, 0x02, 0x03]);
        assert!(cmd.has_read());
        assert!(!cmd.has_write());
    }

    #[test]
    fn test_write_command_bytes() {
        let data = [0xAA, 0x55];
        let cmd = SpiCommand::write_4b(opcodes::PP_4B, 0x0100_0000, &data);
        assert_eq!(cmd.write_len(), 7);
        assert_eq!(
            cmd.to_bytes(),
            [opcodes::PP_4B, 0x01, 0x00, 0x00, 0x00, 0xAA, 0x55]
        );
    }

    #[test]
    fn test_simple_command_is_opcode_only() {
        let cmd = SpiCommand::simple(opcodes::WREN);
        assert_eq!(cmd.to_bytes(), [opcodes::WREN]);
        assert_eq!(cmd.header_len(), 1);
    }
}
