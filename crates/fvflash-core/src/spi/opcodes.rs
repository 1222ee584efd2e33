//! Standard JEDEC SPI flash opcodes
//!
//! Only the opcodes the generic bulk operations and the emulated chip use
//! are listed here. Chip-specific command sets live with the front end.

// ============================================================================
// Write control
// ============================================================================

/// Write Enable - required before any write/erase operation
pub const WREN: u8 = 0x06;
/// Write Disable - clears WEL bit, also terminates SST AAI programming
pub const WRDI: u8 = 0x04;

// ============================================================================
// Status register operations
// ============================================================================

/// Read Status Register 1
pub const RDSR: u8 = 0x05;
/// Write Status Register 1
pub const WRSR: u8 = 0x01;

// ============================================================================
// Identification
// ============================================================================

/// Read JEDEC ID (manufacturer + device ID)
pub const RDID: u8 = 0x9F;

// ============================================================================
// Read commands
// ============================================================================

/// Read Data (3-byte address)
pub const READ: u8 = 0x03;
/// Fast Read (3-byte address, one dummy byte)
pub const FAST_READ: u8 = 0x0B;
/// Read Data with 4-byte address
pub const READ_4B: u8 = 0x13;

// ============================================================================
// Program commands
// ============================================================================

/// Page Program (3-byte address), also used as single byte program
pub const PP: u8 = 0x02;
/// Page Program with 4-byte address
pub const PP_4B: u8 = 0x12;
/// SST Auto Address Increment word program
pub const AAI_WP: u8 = 0xAD;

// ============================================================================
// Erase commands
// ============================================================================

/// Sector Erase 4 KiB
pub const SE_20: u8 = 0x20;
/// Block Erase 32 KiB
pub const BE_52: u8 = 0x52;
/// Block Erase 64 KiB
pub const BE_D8: u8 = 0xD8;
/// Chip Erase
pub const CE_60: u8 = 0x60;
/// Chip Erase (alternate opcode)
pub const CE_C7: u8 = 0xC7;

// ============================================================================
// 4-byte address mode
// ============================================================================

/// Enter 4-byte address mode
pub const EN4B: u8 = 0xB7;
/// Exit 4-byte address mode
pub const EX4B: u8 = 0xE9;

// ============================================================================
// Status register bits
// ============================================================================

/// Status Register 1: Write In Progress
pub const SR1_WIP: u8 = 0x01;
/// Status Register 1: Write Enable Latch
pub const SR1_WEL: u8 = 0x02;
/// Status Register 1: SST AAI programming mode active
pub const SR1_AAI: u8 = 0x40;

/// Page size assumed by `write_256`
pub const PAGE_SIZE: usize = 256;
