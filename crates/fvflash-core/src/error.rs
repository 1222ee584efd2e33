//! Error types for fvflash-core
//!
//! This module provides a no_std compatible error type shared by every
//! programmer implementation. Transports keep their own detailed error types
//! and map them onto this one at the `SpiMaster` boundary.

use core::fmt;

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    // SPI errors
    /// SPI transfer failed
    SpiTransferFailed,
    /// SPI transfer did not complete before its deadline
    SpiTimeout,
    /// Opcode is not supported by the programmer (or emulated chip)
    OpcodeNotSupported,
    /// Transaction exceeds the limits advertised by the programmer
    TransferTooLarge,

    // Operation errors
    /// Write/program operation failed
    WriteError,
    /// Operation timed out
    Timeout,

    // Address/size errors
    /// Address is beyond flash chip size
    AddressOutOfBounds,

    // Protection errors
    /// Flash chip is write protected (WEL not set)
    WriteProtected,

    // Programmer errors
    /// Programmer is not ready (not initialized, faulted or shut down)
    ProgrammerNotReady,
    /// General programmer error
    ProgrammerError,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SpiTransferFailed => write!(f, "SPI transfer failed"),
            Self::SpiTimeout => write!(f, "SPI transfer timed out"),
            Self::OpcodeNotSupported => write!(f, "SPI opcode not supported"),
            Self::TransferTooLarge => write!(f, "SPI transfer exceeds programmer limits"),
            Self::WriteError => write!(f, "write operation failed"),
            Self::Timeout => write!(f, "operation timed out"),
            Self::AddressOutOfBounds => write!(f, "address out of bounds"),
            Self::WriteProtected => write!(f, "flash chip is write protected"),
            Self::ProgrammerNotReady => write!(f, "programmer not ready"),
            Self::ProgrammerError => write!(f, "programmer error"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
