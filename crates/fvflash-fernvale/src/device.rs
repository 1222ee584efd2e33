//! Fernvale session
//!
//! This module provides the `Fernvale` struct that owns the link to the
//! bridge, tracks where it is in its lifecycle and implements the
//! `SpiMaster` trait on top of the framed protocol.

use crate::channel::{Channel, Link};
use crate::error::{FernvaleError, Result};
use crate::protocol::{self, DEFAULT_DEVICE, DEFAULT_REPLY_TIMEOUT, DEFAULT_SYNC_TIMEOUT};
use crate::protocol::{MAX_DATA_READ, MAX_DATA_WRITE};
use crate::serial::{BaudRate, SerialLink};

use fvflash_core::error::{Error as CoreError, Result as CoreResult};
use fvflash_core::programmer::{Capabilities, SpiFeatures, SpiMaster};
use fvflash_core::spi::SpiCommand;

use std::fmt;
use std::time::Duration;

/// What the session advertises to the host
pub const CAPABILITIES: Capabilities = Capabilities {
    name: "fernvale_spi",
    max_data_read: MAX_DATA_READ,
    max_data_write: MAX_DATA_WRITE,
    features: SpiFeatures::FOUR_BYTE_ADDR,
};

/// Configuration for opening a Fernvale bridge
#[derive(Debug, Clone)]
pub struct FernvaleConfig {
    /// Serial device path
    pub device: String,
    /// Line speed
    pub baud: BaudRate,
    /// How long to wait for the ready byte after the greeting
    pub sync_timeout: Duration,
    /// How long to wait for a complete reply (`None` waits forever)
    pub reply_timeout: Option<Duration>,
}

impl Default for FernvaleConfig {
    fn default() -> Self {
        Self {
            device: DEFAULT_DEVICE.to_string(),
            baud: BaudRate::default(),
            sync_timeout: DEFAULT_SYNC_TIMEOUT,
            reply_timeout: Some(DEFAULT_REPLY_TIMEOUT),
        }
    }
}

impl FernvaleConfig {
    /// Create a configuration for the given device path
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            ..Default::default()
        }
    }

    /// Set the line speed
    pub fn with_baud(mut self, baud: BaudRate) -> Self {
        self.baud = baud;
        self
    }

    /// Set the handshake timeout
    pub fn with_sync_timeout(mut self, timeout: Duration) -> Self {
        self.sync_timeout = timeout;
        self
    }

    /// Set the reply timeout
    pub fn with_reply_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.reply_timeout = timeout;
        self
    }
}

/// Parse programmer options from a list of key-value pairs
///
/// Recognized keys: `dev`, `baud`, `timeout` (reply timeout in ms, 0 to
/// disable) and `sync_timeout` (ms). An empty `dev` selects the default
/// device.
pub fn parse_options(options: &[(&str, &str)]) -> Result<FernvaleConfig> {
    let mut config = FernvaleConfig::default();

    for (key, value) in options {
        match *key {
            "dev" => {
                if value.is_empty() {
                    log::debug!("fernvale: Empty dev, using {}", DEFAULT_DEVICE);
                } else {
                    config.device = value.to_string();
                }
            }
            "baud" => {
                let bps: u32 = value.parse().map_err(|_| {
                    FernvaleError::InvalidParameter(format!("Invalid baud value: {}", value))
                })?;
                config.baud = BaudRate::from_bps(bps).ok_or_else(|| {
                    FernvaleError::InvalidParameter(format!(
                        "Unsupported baud rate {} on this platform",
                        bps
                    ))
                })?;
            }
            "timeout" => {
                let ms = parse_ms(key, value)?;
                config.reply_timeout = (ms > 0).then(|| Duration::from_millis(ms));
            }
            "sync_timeout" => {
                let ms = parse_ms(key, value)?;
                if ms == 0 {
                    return Err(FernvaleError::InvalidParameter(
                        "sync_timeout must be greater than 0".to_string(),
                    ));
                }
                config.sync_timeout = Duration::from_millis(ms);
            }
            _ => {
                log::warn!("fernvale: Unknown option: {}={}", key, value);
            }
        }
    }

    Ok(config)
}

fn parse_ms(key: &str, value: &str) -> Result<u64> {
    value
        .parse()
        .map_err(|_| FernvaleError::InvalidParameter(format!("Invalid {} value: {}", key, value)))
}

/// Lifecycle of a session
///
/// ```text
/// Opened -> Configured -> Synced -> Active -> ShutDown
///                                     |
///                                     v
///                                  Faulted -> ShutDown
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Device open, line not yet configured
    Opened,
    /// Line set up, greeting not yet acknowledged
    Configured,
    /// Ready byte seen
    Synced,
    /// Accepting transactions
    Active,
    /// Frame boundaries lost; only shutdown is allowed
    Faulted,
    /// Shutdown frame sent (or skipped); nothing more is allowed
    ShutDown,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Opened => "opened",
            SessionState::Configured => "configured",
            SessionState::Synced => "synced",
            SessionState::Active => "active",
            SessionState::Faulted => "faulted",
            SessionState::ShutDown => "shut down",
        };
        f.write_str(name)
    }
}

/// Fernvale SPI bridge session
///
/// Owns the link exclusively. All operations take `&mut self`, so at most
/// one transaction is ever in flight.
pub struct Fernvale<L: Link> {
    channel: Channel<L>,
    state: SessionState,
    reply_timeout: Option<Duration>,
}

impl Fernvale<SerialLink> {
    /// Open the serial device and bring the bridge into SPI mode
    pub fn open(config: &FernvaleConfig) -> Result<Self> {
        let link = SerialLink::open(&config.device)?;
        Self::connect(link, config)
    }
}

impl<L: Link> Fernvale<L> {
    /// Configure the link and run the greeting handshake
    ///
    /// On return the session is active. The device path in `config` is not
    /// used; the link is already open.
    pub fn connect(link: L, config: &FernvaleConfig) -> Result<Self> {
        let mut session = Self {
            channel: Channel::new(link),
            state: SessionState::Opened,
            reply_timeout: config.reply_timeout,
        };

        session.channel.link_mut().configure(config.baud)?;
        session.set_state(SessionState::Configured);

        protocol::greet(&mut session.channel)?;
        let discarded = protocol::synchronize(&mut session.channel, config.sync_timeout)?;
        session.set_state(SessionState::Synced);

        if discarded > 0 {
            log::debug!("fernvale: Skipped {} bytes of console output", discarded);
        }
        session.set_state(SessionState::Active);
        log::info!("fernvale: Bridge ready");

        Ok(session)
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    fn set_state(&mut self, state: SessionState) {
        log::trace!("fernvale: {} -> {}", self.state, state);
        self.state = state;
    }

    /// Run one raw transaction: clock out `write`, then clock in `read.len()` bytes
    ///
    /// Counts are limited only by the one-byte frame header here; the
    /// tighter advertised data limits are enforced by [`SpiMaster::execute`].
    /// A failure that leaves the frame stream out of step faults the session.
    pub fn transfer(&mut self, write: &[u8], read: &mut [u8]) -> Result<()> {
        if self.state != SessionState::Active {
            return Err(FernvaleError::NotActive(self.state));
        }

        match protocol::transact(&mut self.channel, write, read, self.reply_timeout) {
            Ok(()) => Ok(()),
            Err(e) => {
                if e.breaks_framing() {
                    log::error!("fernvale: {}; bridge must be re-initialized", e);
                    self.set_state(SessionState::Faulted);
                }
                Err(e)
            }
        }
    }

    /// Tell the bridge to leave SPI mode
    ///
    /// Sends the shutdown frame once, and only from the active state. Calling
    /// it again, or on a faulted session, does nothing. The session is shut
    /// down afterwards even if the frame could not be sent.
    pub fn shutdown(&mut self) -> Result<()> {
        match self.state {
            SessionState::ShutDown => return Ok(()),
            SessionState::Active => {}
            state => {
                log::debug!("fernvale: Session {}, not sending shutdown frame", state);
                self.set_state(SessionState::ShutDown);
                return Ok(());
            }
        }

        self.set_state(SessionState::ShutDown);
        protocol::send_shutdown(&mut self.channel)?;
        log::debug!("fernvale: Sent shutdown frame");
        Ok(())
    }
}

impl<L: Link> Drop for Fernvale<L> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::warn!("fernvale: Shutdown failed: {}", e);
        }
    }
}

impl<L: Link> SpiMaster for Fernvale<L> {
    fn capabilities(&self) -> Capabilities {
        CAPABILITIES
    }

    fn execute(&mut self, cmd: &mut SpiCommand<'_>) -> CoreResult<()> {
        if cmd.write_data.len() > MAX_DATA_WRITE || cmd.read_buf.len() > MAX_DATA_READ {
            log::error!(
                "fernvale: Command 0x{:02X} moves {}/{} data bytes, limit is {}/{}",
                cmd.opcode,
                cmd.write_data.len(),
                cmd.read_buf.len(),
                MAX_DATA_WRITE,
                MAX_DATA_READ
            );
            return Err(CoreError::TransferTooLarge);
        }

        let write_data = cmd.to_bytes();
        self.transfer(&write_data, cmd.read_buf).map_err(|e| {
            log::error!("fernvale: Command 0x{:02X} failed: {}", cmd.opcode, e);
            CoreError::from(e)
        })
    }

    fn delay_us(&mut self, us: u32) {
        std::thread::sleep(Duration::from_micros(us as u64));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockLink, ReadEvent};
    use crate::protocol::{GREETING, READY, SHUTDOWN_FRAME};
    use fvflash_core::protocol::spi25;
    use fvflash_core::spi::opcodes;

    fn test_config() -> FernvaleConfig {
        FernvaleConfig::default()
            .with_baud(BaudRate::B115200)
            .with_sync_timeout(Duration::from_millis(200))
            .with_reply_timeout(Some(Duration::from_millis(50)))
    }

    fn active_session() -> (MockLink, Fernvale<MockLink>) {
        let link = MockLink::new();
        link.queue_bytes(b"spi flashrom\r\n");
        link.queue_bytes(&[READY]);
        let session = Fernvale::connect(link.clone(), &test_config()).unwrap();
        (link, session)
    }

    /// Bytes written after the greeting
    fn frames(link: &MockLink) -> Vec<u8> {
        link.written()[GREETING.len()..].to_vec()
    }

    #[test]
    fn test_connect() {
        let (link, session) = active_session();
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(link.written(), GREETING.to_vec());
        assert_eq!(link.configured_baud(), Some(BaudRate::B115200));
        assert_eq!(link.pending_reads(), 0);
    }

    #[test]
    fn test_connect_sync_timeout() {
        let link = MockLink::new();
        link.queue_bytes(b"boot\n");
        let result = Fernvale::connect(link.clone(), &test_config());
        assert!(matches!(
            result,
            Err(FernvaleError::SyncTimeout { discarded: 5, .. })
        ));
        // A session that never became active must not send the shutdown frame
        assert_eq!(link.written(), GREETING.to_vec());
    }

    #[test]
    fn test_transfer_and_capabilities() {
        let (link, mut session) = active_session();
        link.queue_bytes(&[0xEF, 0x40, 0x18]);

        let caps = session.capabilities();
        assert_eq!(caps.name, "fernvale_spi");
        assert_eq!(caps.max_data_read, 128);
        assert_eq!(caps.max_data_write, 128);

        let (manufacturer, device) = spi25::read_jedec_id(&mut session).unwrap();
        assert_eq!(manufacturer, 0xEF);
        assert_eq!(device, 0x4018);
        assert_eq!(frames(&link), vec![1, 3, opcodes::RDID]);
    }

    #[test]
    fn test_execute_enforces_data_limits() {
        let (link, mut session) = active_session();

        let data = [0u8; 129];
        let mut cmd = SpiCommand::write_3b(opcodes::PP, 0, &data);
        assert_eq!(session.execute(&mut cmd), Err(CoreError::TransferTooLarge));

        // Nothing was sent and the session is still usable
        assert!(frames(&link).is_empty());
        assert_eq!(session.state(), SessionState::Active);

        // The limit excludes the opcode and address header
        let data = [0xA5u8; 128];
        let mut cmd = SpiCommand::write_3b(opcodes::PP, 0x000100, &data);
        session.execute(&mut cmd).unwrap();
        let sent = frames(&link);
        assert_eq!(sent[0], 132);
        assert_eq!(sent[1], 0);
        assert_eq!(&sent[2..6], &[opcodes::PP, 0x00, 0x01, 0x00]);
        assert_eq!(sent.len(), 2 + 132);
    }

    #[test]
    fn test_raw_transfer_limited_by_frame_header() {
        let (link, mut session) = active_session();
        let big = vec![0u8; 256];

        assert!(matches!(
            session.transfer(&big, &mut []),
            Err(FernvaleError::TransferTooLarge { .. })
        ));
        assert!(frames(&link).is_empty());
        assert_eq!(session.state(), SessionState::Active);
    }

    #[test]
    fn test_reply_timeout_faults_session() {
        let (link, mut session) = active_session();
        let mut status = [0u8; 1];

        assert!(matches!(
            session.transfer(&[opcodes::RDSR], &mut status),
            Err(FernvaleError::Timeout { .. })
        ));
        assert_eq!(session.state(), SessionState::Faulted);

        assert!(matches!(
            session.transfer(&[opcodes::RDSR], &mut status),
            Err(FernvaleError::NotActive(SessionState::Faulted))
        ));

        // No shutdown frame on a faulted session
        session.shutdown().unwrap();
        assert_eq!(session.state(), SessionState::ShutDown);
        assert_eq!(frames(&link), vec![1, 1, opcodes::RDSR]);
    }

    #[test]
    fn test_short_reply_faults_session() {
        let (link, mut session) = active_session();
        link.script_reads([ReadEvent::Data(0x02), ReadEvent::Closed]);

        let mut buf = [0u8; 2];
        assert!(matches!(
            session.transfer(&[opcodes::RDSR], &mut buf),
            Err(FernvaleError::ShortTransfer {
                expected: 2,
                actual: 1,
                ..
            })
        ));
        assert_eq!(session.state(), SessionState::Faulted);
    }

    #[test]
    fn test_shutdown_sends_exactly_one_frame() {
        let (link, mut session) = active_session();
        let reads_before = link.read_calls();

        session.shutdown().unwrap();
        session.shutdown().unwrap();
        drop(session);

        assert_eq!(frames(&link), SHUTDOWN_FRAME.to_vec());
        assert_eq!(link.read_calls(), reads_before);
    }

    #[test]
    fn test_drop_sends_shutdown() {
        let (link, session) = active_session();
        drop(session);
        assert_eq!(frames(&link), SHUTDOWN_FRAME.to_vec());
    }

    #[test]
    fn test_operations_after_shutdown_rejected() {
        let (_link, mut session) = active_session();
        session.shutdown().unwrap();

        let mut cmd = SpiCommand::simple(opcodes::WREN);
        assert_eq!(
            session.execute(&mut cmd),
            Err(CoreError::ProgrammerNotReady)
        );
    }

    #[test]
    fn test_parse_options() {
        let config = parse_options(&[]).unwrap();
        assert_eq!(config.device, DEFAULT_DEVICE);
        assert_eq!(config.baud, BaudRate::default());
        assert_eq!(config.reply_timeout, Some(DEFAULT_REPLY_TIMEOUT));

        let config = parse_options(&[("dev", "")]).unwrap();
        assert_eq!(config.device, DEFAULT_DEVICE);

        let config = parse_options(&[
            ("dev", "/dev/ttyUSB0"),
            ("baud", "115200"),
            ("timeout", "0"),
            ("sync_timeout", "2500"),
            ("bogus", "1"),
        ])
        .unwrap();
        assert_eq!(config.device, "/dev/ttyUSB0");
        assert_eq!(config.baud, BaudRate::B115200);
        assert_eq!(config.reply_timeout, None);
        assert_eq!(config.sync_timeout, Duration::from_millis(2500));

        assert!(parse_options(&[("baud", "9600")]).is_err());
        assert!(parse_options(&[("baud", "fast")]).is_err());
        assert!(parse_options(&[("timeout", "-1")]).is_err());
        assert!(parse_options(&[("sync_timeout", "0")]).is_err());
    }
}
