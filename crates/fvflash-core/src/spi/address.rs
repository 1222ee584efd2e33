//! Address width types

/// Address width for SPI commands
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AddressWidth {
    /// No address phase
    #[default]
    None,
    /// 3-byte (24-bit) address - supports up to 16 MiB
    ThreeByte,
    /// 4-byte (32-bit) address - supports up to 4 GiB
    FourByte,
}

impl AddressWidth {
    /// Returns the number of address bytes
    pub const fn bytes(&self) -> u8 {
        match self {
            Self::None => 0,
            Self::ThreeByte => 3,
            Self::FourByte => 4,
        }
    }

    /// Returns the maximum addressable size in bytes
    pub const fn max_size(&self) -> u32 {
        match self {
            Self::None => 0,
            Self::ThreeByte => 16 * 1024 * 1024,
            Self::FourByte => u32::MAX,
        }
    }

    /// Encode an address into bytes, most significant byte first
    pub fn encode(&self, address: u32, buf: &mut [u8]) {
        let width = self.bytes() as usize;
        let be = address.to_be_bytes();
        buf[..width].copy_from_slice(&be[4 - width..]);
    }

    /// Decode a big-endian address from the front of `buf`
    ///
    /// Returns `None` if `buf` is shorter than the address width.
    pub fn decode(&self, buf: &[u8]) -> Option<u32> {
        let width = self.bytes() as usize;
        let bytes = buf.get(..width)?;
        Some(bytes.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32))
    }
}
