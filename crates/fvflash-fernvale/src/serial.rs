//! Serial device access
//!
//! Opens the bridge's tty with plain `std::fs` and configures the line
//! discipline with `nix::sys::termios`: raw 8-bit mode, no echo, no
//! canonical processing, no flow control.

use crate::channel::Link;
use crate::error::{FernvaleError, Result};

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::termios::{self, ControlFlags, SetArg};

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::AsFd;
use std::os::unix::fs::OpenOptionsExt;
use std::time::Duration;

/// Line speeds the bridge is known to run at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaudRate {
    /// 115200 bps
    B115200,
    /// 230400 bps
    B230400,
    /// 460800 bps
    #[cfg(any(target_os = "linux", target_os = "android"))]
    B460800,
    /// 921600 bps
    #[cfg(any(target_os = "linux", target_os = "android"))]
    B921600,
}

impl BaudRate {
    /// Platform default line speed
    #[cfg(any(target_os = "linux", target_os = "android"))]
    pub const DEFAULT: BaudRate = BaudRate::B921600;

    /// Platform default line speed
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    pub const DEFAULT: BaudRate = BaudRate::B230400;

    /// Look up a supported rate by its numeric value
    pub fn from_bps(bps: u32) -> Option<Self> {
        match bps {
            115_200 => Some(BaudRate::B115200),
            230_400 => Some(BaudRate::B230400),
            #[cfg(any(target_os = "linux", target_os = "android"))]
            460_800 => Some(BaudRate::B460800),
            #[cfg(any(target_os = "linux", target_os = "android"))]
            921_600 => Some(BaudRate::B921600),
            _ => None,
        }
    }

    /// Numeric rate in bits per second
    pub fn bps(self) -> u32 {
        match self {
            BaudRate::B115200 => 115_200,
            BaudRate::B230400 => 230_400,
            #[cfg(any(target_os = "linux", target_os = "android"))]
            BaudRate::B460800 => 460_800,
            #[cfg(any(target_os = "linux", target_os = "android"))]
            BaudRate::B921600 => 921_600,
        }
    }

    fn to_termios(self) -> termios::BaudRate {
        match self {
            BaudRate::B115200 => termios::BaudRate::B115200,
            BaudRate::B230400 => termios::BaudRate::B230400,
            #[cfg(any(target_os = "linux", target_os = "android"))]
            BaudRate::B460800 => termios::BaudRate::B460800,
            #[cfg(any(target_os = "linux", target_os = "android"))]
            BaudRate::B921600 => termios::BaudRate::B921600,
        }
    }
}

impl Default for BaudRate {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl std::fmt::Display for BaudRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.bps())
    }
}

/// The bridge's serial device
pub struct SerialLink {
    file: File,
    path: String,
}

impl SerialLink {
    /// Open the device for reading and writing
    ///
    /// The line is left untouched until [`Link::configure`] is called.
    pub fn open(path: &str) -> Result<Self> {
        log::debug!("fernvale: Opening serial device {}", path);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(nix::libc::O_NOCTTY)
            .open(path)
            .map_err(|e| FernvaleError::OpenFailed {
                path: path.to_string(),
                source: e,
            })?;

        Ok(Self {
            file,
            path: path.to_string(),
        })
    }
}

impl Link for SerialLink {
    fn configure(&mut self, baud: BaudRate) -> Result<()> {
        let mut tio =
            termios::tcgetattr(self.file.as_fd()).map_err(|e| FernvaleError::ConfigureFailed {
                step: "get attributes",
                source: e,
            })?;

        termios::cfsetispeed(&mut tio, baud.to_termios()).map_err(|e| {
            FernvaleError::ConfigureFailed {
                step: "set input speed",
                source: e,
            }
        })?;
        termios::cfsetospeed(&mut tio, baud.to_termios()).map_err(|e| {
            FernvaleError::ConfigureFailed {
                step: "set output speed",
                source: e,
            }
        })?;
        termios::cfmakeraw(&mut tio);
        tio.control_flags |= ControlFlags::CLOCAL | ControlFlags::CREAD;

        termios::tcsetattr(self.file.as_fd(), SetArg::TCSANOW, &tio).map_err(|e| {
            FernvaleError::ConfigureFailed {
                step: "set attributes",
                source: e,
            }
        })?;

        log::info!("fernvale: Opened {} at {} baud", self.path, baud);
        Ok(())
    }

    fn write_some(&mut self, data: &[u8]) -> io::Result<usize> {
        self.file.write(data)
    }

    fn read_some(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }

    fn wait_readable(&mut self, timeout: Duration) -> io::Result<bool> {
        let mut fds = [PollFd::new(self.file.as_fd(), PollFlags::POLLIN)];
        let n = poll(&mut fds, poll_timeout(timeout)).map_err(io::Error::from)?;
        Ok(n > 0)
    }
}

/// Round a duration up to whole milliseconds, clamped to what poll accepts
fn poll_timeout(timeout: Duration) -> PollTimeout {
    let ms = timeout.as_micros().div_ceil(1000);
    PollTimeout::from(u16::try_from(ms).unwrap_or(u16::MAX))
}
