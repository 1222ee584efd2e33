//! Reliable byte channel
//!
//! Wraps a [`Link`] (a raw, possibly non-blocking byte pipe) and guarantees
//! that a request either moves every byte or fails. Transient conditions
//! (`WouldBlock`, `Interrupted`) are retried; a zero-length transfer means
//! the peer closed the link.
//!
//! Reads are deliberately issued one byte at a time: replies from the bridge
//! carry no framing of their own, so reading ahead could swallow bytes that
//! belong to the next frame.

use crate::error::{FernvaleError, Result};
use crate::protocol::Phase;
use crate::serial::BaudRate;
use std::io;
use std::time::{Duration, Instant};
use thiserror::Error;

/// A raw byte pipe to the bridge
///
/// Each method maps to a single underlying system call; retry and
/// all-or-nothing semantics are layered on top by [`Channel`].
pub trait Link {
    /// Put the line into raw 8-bit mode at the given speed
    fn configure(&mut self, baud: BaudRate) -> Result<()>;

    /// Write some of `data`, returning how many bytes were accepted
    fn write_some(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Read up to `buf.len()` bytes, returning how many were received
    fn read_some(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Wait up to `timeout` for data to become readable
    ///
    /// Returns `Ok(false)` if nothing arrived in time. Spurious early returns
    /// are allowed; callers re-check their own deadline.
    fn wait_readable(&mut self, timeout: Duration) -> io::Result<bool>;
}

/// Failure of a single all-or-nothing channel request
#[derive(Debug, Error)]
pub enum ChannelError {
    /// A transfer call reported zero bytes
    #[error("link closed after {transferred} of {expected} bytes")]
    Closed { transferred: usize, expected: usize },

    /// The read deadline passed
    #[error("deadline passed after {transferred} of {expected} bytes")]
    TimedOut { transferred: usize, expected: usize },

    /// Any non-transient I/O error
    #[error("I/O error after {transferred} of {expected} bytes: {source}")]
    Io {
        transferred: usize,
        expected: usize,
        #[source]
        source: io::Error,
    },
}

impl ChannelError {
    /// Classify this failure for the protocol phase it interrupted
    pub fn into_fernvale(self, phase: Phase) -> FernvaleError {
        match self {
            ChannelError::Closed { transferred: 0, .. } => FernvaleError::ChannelClosed(phase),
            ChannelError::Closed {
                transferred,
                expected,
            } => FernvaleError::ShortTransfer {
                phase,
                expected,
                actual: transferred,
            },
            ChannelError::TimedOut {
                transferred,
                expected,
            } => FernvaleError::Timeout {
                phase,
                expected,
                actual: transferred,
            },
            ChannelError::Io { source, .. } => FernvaleError::Io { phase, source },
        }
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// All-or-nothing reads and writes over a [`Link`]
pub struct Channel<L: Link> {
    link: L,
}

impl<L: Link> Channel<L> {
    /// Wrap a link
    pub fn new(link: L) -> Self {
        Self { link }
    }

    /// Get a mutable reference to the underlying link
    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Write every byte of `data`
    ///
    /// Retries indefinitely while the link reports a transient condition.
    pub fn write_all(&mut self, data: &[u8]) -> std::result::Result<usize, ChannelError> {
        let expected = data.len();
        let mut written = 0;

        while written < expected {
            match self.link.write_some(&data[written..]) {
                Ok(0) => {
                    return Err(ChannelError::Closed {
                        transferred: written,
                        expected,
                    })
                }
                Ok(n) => written += n,
                Err(e) if is_transient(&e) => continue,
                Err(source) => {
                    return Err(ChannelError::Io {
                        transferred: written,
                        expected,
                        source,
                    })
                }
            }
        }

        Ok(written)
    }

    /// Fill `buf` completely, one byte per read
    ///
    /// With a deadline, fails with [`ChannelError::TimedOut`] once it passes.
    /// Without one, blocks until the bytes arrive or the link fails.
    pub fn read_all(
        &mut self,
        buf: &mut [u8],
        deadline: Option<Instant>,
    ) -> std::result::Result<usize, ChannelError> {
        let expected = buf.len();
        let mut received = 0;

        while received < expected {
            self.wait_for_data(deadline, received, expected)?;

            match self.link.read_some(&mut buf[received..received + 1]) {
                Ok(0) => {
                    return Err(ChannelError::Closed {
                        transferred: received,
                        expected,
                    })
                }
                Ok(n) => {
                    log::trace!("fernvale: rx 0x{:02x}", buf[received]);
                    received += n;
                }
                Err(e) if is_transient(&e) => continue,
                Err(source) => {
                    return Err(ChannelError::Io {
                        transferred: received,
                        expected,
                        source,
                    })
                }
            }
        }

        Ok(received)
    }

    /// Read exactly one byte
    pub fn read_byte(&mut self, deadline: Option<Instant>) -> std::result::Result<u8, ChannelError> {
        let mut byte = [0u8];
        self.read_all(&mut byte, deadline)?;
        Ok(byte[0])
    }

    fn wait_for_data(
        &mut self,
        deadline: Option<Instant>,
        transferred: usize,
        expected: usize,
    ) -> std::result::Result<(), ChannelError> {
        let Some(deadline) = deadline else {
            return Ok(());
        };

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ChannelError::TimedOut {
                    transferred,
                    expected,
                });
            }

            match self.link.wait_readable(remaining) {
                Ok(true) => return Ok(()),
                Ok(false) => continue,
                Err(e) if is_transient(&e) => continue,
                Err(source) => {
                    return Err(ChannelError::Io {
                        transferred,
                        expected,
                        source,
                    })
                }
            }
        }
    }
}
