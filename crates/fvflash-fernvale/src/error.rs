//! Error types for Fernvale transport operations

use crate::device::SessionState;
use crate::protocol::Phase;
use std::time::Duration;
use thiserror::Error;

/// Fernvale-specific errors
#[derive(Debug, Error)]
pub enum FernvaleError {
    /// The serial device could not be opened
    #[error("Failed to open {path}: {source}. Use fernvale_spi:dev=/dev/ttyUSB0")]
    OpenFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Line discipline setup failed
    #[error("Failed to {step} on serial device: {source}")]
    ConfigureFailed {
        step: &'static str,
        #[source]
        source: nix::Error,
    },

    /// The ready sentinel never arrived
    #[error("No ready signal within {timeout:?} ({discarded} bytes discarded)")]
    SyncTimeout { timeout: Duration, discarded: usize },

    /// The peer closed the link before a phase moved any byte
    #[error("Serial link closed by peer during {0}")]
    ChannelClosed(Phase),

    /// Any other I/O failure on the link
    #[error("I/O error during {phase}: {source}")]
    Io {
        phase: Phase,
        #[source]
        source: std::io::Error,
    },

    /// A phase moved some, but not all, of its bytes
    #[error("Short transfer during {phase}: wanted {expected} bytes, got {actual}")]
    ShortTransfer {
        phase: Phase,
        expected: usize,
        actual: usize,
    },

    /// A phase did not complete before its deadline
    #[error("Timed out during {phase}: wanted {expected} bytes, got {actual}")]
    Timeout {
        phase: Phase,
        expected: usize,
        actual: usize,
    },

    /// Transaction larger than a frame or the advertised limits can carry
    #[error("Transfer too large: {write} bytes out, {read} bytes in (limit {max_write}/{max_read})")]
    TransferTooLarge {
        write: usize,
        read: usize,
        max_write: usize,
        max_read: usize,
    },

    /// A transaction that moves no bytes would go out as the shutdown frame
    #[error("Empty transaction: a [0, 0] frame is reserved for shutdown")]
    EmptyTransaction,

    /// Operation attempted outside the active state
    #[error("Session is {0}, not active")]
    NotActive(SessionState),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Result type for Fernvale operations
pub type Result<T> = std::result::Result<T, FernvaleError>;

impl FernvaleError {
    /// Returns true if the error left the frame stream in an unknown position
    ///
    /// After such an error the remote bridge and the host no longer agree on
    /// frame boundaries and the session cannot be used again.
    pub fn breaks_framing(&self) -> bool {
        matches!(
            self,
            FernvaleError::ChannelClosed(_)
                | FernvaleError::Io { .. }
                | FernvaleError::ShortTransfer { .. }
                | FernvaleError::Timeout { .. }
        )
    }
}

impl From<FernvaleError> for fvflash_core::Error {
    fn from(e: FernvaleError) -> Self {
        use fvflash_core::Error as CoreError;

        match e {
            FernvaleError::Timeout { .. } | FernvaleError::SyncTimeout { .. } => {
                CoreError::SpiTimeout
            }
            FernvaleError::TransferTooLarge { .. } => CoreError::TransferTooLarge,
            FernvaleError::NotActive(_) => CoreError::ProgrammerNotReady,
            FernvaleError::InvalidParameter(_)
            | FernvaleError::EmptyTransaction
            | FernvaleError::OpenFailed { .. }
            | FernvaleError::ConfigureFailed { .. } => CoreError::ProgrammerError,
            FernvaleError::ChannelClosed(_)
            | FernvaleError::Io { .. }
            | FernvaleError::ShortTransfer { .. } => CoreError::SpiTransferFailed,
        }
    }
}
