//! Fernvale bridge wire protocol
//!
//! After the greeting and ready handshake, every SPI transaction is a frame:
//!
//! ```text
//! host -> bridge:  [out_len: u8] [in_len: u8] [payload: out_len bytes]
//! bridge -> host:  [reply: in_len bytes]
//! ```
//!
//! The bridge asserts chip select, clocks out the payload, clocks in the
//! reply and releases chip select. A frame with both lengths zero makes the
//! bridge leave SPI mode.

use crate::channel::{Channel, ChannelError, Link};
use crate::error::{FernvaleError, Result};
use std::fmt;
use std::time::{Duration, Instant};

/// Text that switches the bridge console into SPI mode
pub const GREETING: &[u8] = b"spi flashrom\n";

/// Byte the bridge sends once it is ready for frames
pub const READY: u8 = 0x05;

/// Frame that tells the bridge to leave SPI mode
pub const SHUTDOWN_FRAME: [u8; 2] = [0x00, 0x00];

/// Largest count a frame header can carry
pub const MAX_FRAME_LEN: usize = u8::MAX as usize;

/// Advertised read limit, excluding opcode and address
pub const MAX_DATA_READ: usize = 128;

/// Advertised write limit, excluding opcode and address
pub const MAX_DATA_WRITE: usize = 128;

/// Device opened when no `dev` parameter is given
pub const DEFAULT_DEVICE: &str = "/dev/fernvale";

/// How long to wait for the ready byte
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(10);

/// How long to wait for a complete reply
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// The step of the protocol an error happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Sending the greeting text
    Greeting,
    /// Scanning for the ready byte
    Sync,
    /// Sending the outgoing count
    WriteLength,
    /// Sending the incoming count
    ReadLength,
    /// Sending the outgoing payload
    Payload,
    /// Receiving the reply
    Reply,
    /// Sending the shutdown frame
    Shutdown,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Greeting => "greeting",
            Phase::Sync => "sync",
            Phase::WriteLength => "write length",
            Phase::ReadLength => "read length",
            Phase::Payload => "payload",
            Phase::Reply => "reply",
            Phase::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}

/// The two count bytes that open a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Bytes the host sends after the header
    pub out_len: u8,
    /// Bytes the bridge sends back
    pub in_len: u8,
}

impl FrameHeader {
    /// Build a header, rejecting counts a single byte cannot hold
    pub fn new(write_len: usize, read_len: usize) -> Result<Self> {
        match (u8::try_from(write_len), u8::try_from(read_len)) {
            (Ok(out_len), Ok(in_len)) => Ok(Self { out_len, in_len }),
            _ => Err(FernvaleError::TransferTooLarge {
                write: write_len,
                read: read_len,
                max_write: MAX_FRAME_LEN,
                max_read: MAX_FRAME_LEN,
            }),
        }
    }

    /// Whether this header is the shutdown sentinel
    pub fn is_shutdown(&self) -> bool {
        self.out_len == 0 && self.in_len == 0
    }
}

fn check_len(phase: Phase, expected: usize, actual: usize) -> Result<()> {
    if actual != expected {
        return Err(FernvaleError::ShortTransfer {
            phase,
            expected,
            actual,
        });
    }
    Ok(())
}

fn send<L: Link>(channel: &mut Channel<L>, phase: Phase, data: &[u8]) -> Result<()> {
    let n = channel
        .write_all(data)
        .map_err(|e| e.into_fernvale(phase))?;
    check_len(phase, data.len(), n)
}

/// Send the greeting that switches the bridge into SPI mode
pub fn greet<L: Link>(channel: &mut Channel<L>) -> Result<()> {
    log::debug!("fernvale: Sending greeting");
    send(channel, Phase::Greeting, GREETING)
}

/// Discard bytes until the ready byte arrives
///
/// The bridge echoes the greeting and may print boot noise before it is
/// ready. Every byte before the sentinel is dropped; nothing after it is
/// read. Returns the number of bytes discarded.
pub fn synchronize<L: Link>(channel: &mut Channel<L>, timeout: Duration) -> Result<usize> {
    let deadline = Instant::now() + timeout;
    let mut discarded = 0;

    loop {
        match channel.read_byte(Some(deadline)) {
            Ok(READY) => {
                log::debug!(
                    "fernvale: Found ready signal after {} bytes",
                    discarded + 1
                );
                return Ok(discarded);
            }
            Ok(_) => discarded += 1,
            Err(ChannelError::TimedOut { .. }) => {
                return Err(FernvaleError::SyncTimeout { timeout, discarded })
            }
            Err(e) => return Err(e.into_fernvale(Phase::Sync)),
        }
    }
}

/// Run one framed transaction
///
/// Sends the header and payload, then reads exactly `read.len()` reply
/// bytes. With `reply_timeout` set, the whole reply must arrive within it.
pub fn transact<L: Link>(
    channel: &mut Channel<L>,
    write: &[u8],
    read: &mut [u8],
    reply_timeout: Option<Duration>,
) -> Result<()> {
    let header = FrameHeader::new(write.len(), read.len())?;
    if header.is_shutdown() {
        return Err(FernvaleError::EmptyTransaction);
    }

    send(channel, Phase::WriteLength, &[header.out_len])?;
    send(channel, Phase::ReadLength, &[header.in_len])?;
    send(channel, Phase::Payload, write)?;
    log::trace!("fernvale: Wrote {} bytes: {:02x?}", write.len(), write);

    let deadline = reply_timeout.map(|t| Instant::now() + t);
    let n = channel
        .read_all(read, deadline)
        .map_err(|e| e.into_fernvale(Phase::Reply))?;
    check_len(Phase::Reply, read.len(), n)?;
    log::trace!("fernvale: Read {} bytes: {:02x?}", read.len(), read);

    Ok(())
}

/// Send the frame that makes the bridge leave SPI mode
pub fn send_shutdown<L: Link>(channel: &mut Channel<L>) -> Result<()> {
    send(channel, Phase::Shutdown, &SHUTDOWN_FRAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockLink, ReadEvent, WriteEvent};

    fn channel_with_reads(bytes: &[u8]) -> (MockLink, Channel<MockLink>) {
        let link = MockLink::new();
        link.queue_bytes(bytes);
        (link.clone(), Channel::new(link))
    }

    #[test]
    fn test_header_limits() {
        let header = FrameHeader::new(255, 0).unwrap();
        assert_eq!(header.out_len, 255);
        assert!(!header.is_shutdown());
        assert!(FrameHeader::new(0, 0).unwrap().is_shutdown());

        assert!(matches!(
            FrameHeader::new(256, 0),
            Err(FernvaleError::TransferTooLarge { write: 256, .. })
        ));
        assert!(matches!(
            FrameHeader::new(0, 300),
            Err(FernvaleError::TransferTooLarge { read: 300, .. })
        ));
    }

    #[test]
    fn test_sync_immediate() {
        let (link, mut channel) = channel_with_reads(&[READY, 0xAA]);
        assert_eq!(synchronize(&mut channel, Duration::from_secs(1)).unwrap(), 0);
        // Nothing past the sentinel is consumed
        assert_eq!(link.pending_reads(), 1);
    }

    #[test]
    fn test_sync_single_junk_byte() {
        let (link, mut channel) = channel_with_reads(&[0x41, READY, 0xAA]);
        assert_eq!(synchronize(&mut channel, Duration::from_secs(1)).unwrap(), 1);
        assert_eq!(link.pending_reads(), 1);
    }

    #[test]
    fn test_sync_skips_echo() {
        let mut noise = GREETING.to_vec();
        noise.push(READY);
        noise.push(0x9F);
        let (link, mut channel) = channel_with_reads(&noise);

        let discarded = synchronize(&mut channel, Duration::from_secs(1)).unwrap();
        assert_eq!(discarded, GREETING.len());
        assert_eq!(link.pending_reads(), 1);
    }

    #[test]
    fn test_sync_skips_long_boot_noise() {
        let mut noise = vec![0x41; 10_000];
        noise.push(READY);
        let (link, mut channel) = channel_with_reads(&noise);

        assert_eq!(
            synchronize(&mut channel, Duration::from_secs(10)).unwrap(),
            10_000
        );
        assert_eq!(link.pending_reads(), 0);
    }

    #[test]
    fn test_sync_timeout() {
        let (_link, mut channel) = channel_with_reads(&[0x01, 0x02]);
        match synchronize(&mut channel, Duration::from_millis(20)) {
            Err(FernvaleError::SyncTimeout { discarded, .. }) => assert_eq!(discarded, 2),
            other => panic!("expected SyncTimeout, got {:?}", other),
        }
    }

    #[test]
    fn test_sync_closed() {
        let link = MockLink::new();
        link.script_reads([ReadEvent::Data(0x01), ReadEvent::Closed]);
        let mut channel = Channel::new(link);

        assert!(matches!(
            synchronize(&mut channel, Duration::from_secs(1)),
            Err(FernvaleError::ChannelClosed(Phase::Sync))
        ));
    }

    #[test]
    fn test_transact_frame_layout() {
        let (link, mut channel) = channel_with_reads(&[0xC2, 0x20]);
        let mut reply = [0u8; 2];

        transact(&mut channel, &[0x9F, 0x00, 0x01], &mut reply, None).unwrap();

        assert_eq!(link.written(), vec![3, 2, 0x9F, 0x00, 0x01]);
        assert_eq!(reply, [0xC2, 0x20]);
        assert_eq!(link.pending_reads(), 0);
    }

    #[test]
    fn test_transact_byte_counts_at_limits() {
        const COUNTS: [usize; 5] = [0, 1, 128, 254, 255];

        for &w in &COUNTS {
            for &r in &COUNTS {
                if w == 0 && r == 0 {
                    continue;
                }
                let payload: Vec<u8> = (0..w).map(|i| i as u8).collect();
                let reply_bytes: Vec<u8> = (0..r).map(|i| !(i as u8)).collect();

                let (link, mut channel) = channel_with_reads(&reply_bytes);
                // Trailing bytes belong to whatever comes next
                link.queue_bytes(&[0xEE, 0xEE]);

                let mut reply = vec![0u8; r];
                transact(&mut channel, &payload, &mut reply, None).unwrap();

                let written = link.written();
                assert_eq!(written.len(), 2 + w, "w={} r={}", w, r);
                assert_eq!(written[0] as usize, w);
                assert_eq!(written[1] as usize, r);
                assert_eq!(&written[2..], &payload[..]);
                assert_eq!(reply, reply_bytes, "w={} r={}", w, r);
                assert_eq!(link.pending_reads(), 2, "w={} r={}", w, r);
            }
        }
    }

    #[test]
    fn test_transact_rejects_empty_frame() {
        let (link, mut channel) = channel_with_reads(&[0x55]);

        assert!(matches!(
            transact(&mut channel, &[], &mut [], None),
            Err(FernvaleError::EmptyTransaction)
        ));
        assert!(link.written().is_empty());
        assert_eq!(link.read_calls(), 0);
    }

    #[test]
    fn test_transact_write_only_reads_nothing() {
        let (link, mut channel) = channel_with_reads(&[0x55]);
        transact(&mut channel, &[0x06], &mut [], None).unwrap();

        assert_eq!(link.written(), vec![1, 0, 0x06]);
        assert_eq!(link.pending_reads(), 1);
    }

    #[test]
    fn test_transact_rejects_oversized_without_sending() {
        let (link, mut channel) = channel_with_reads(&[]);
        let big = vec![0u8; 256];

        assert!(matches!(
            transact(&mut channel, &big, &mut [], None),
            Err(FernvaleError::TransferTooLarge { .. })
        ));
        assert!(link.written().is_empty());
    }

    #[test]
    fn test_transact_reply_closed_midway() {
        let link = MockLink::new();
        link.script_reads([ReadEvent::Data(0xEF), ReadEvent::Closed]);
        let mut channel = Channel::new(link);
        let mut reply = [0u8; 3];

        match transact(&mut channel, &[0x9F], &mut reply, None) {
            Err(FernvaleError::ShortTransfer {
                phase,
                expected,
                actual,
            }) => {
                assert_eq!(phase, Phase::Reply);
                assert_eq!(expected, 3);
                assert_eq!(actual, 1);
            }
            other => panic!("expected ShortTransfer, got {:?}", other),
        }
    }

    #[test]
    fn test_transact_reply_timeout() {
        let (_link, mut channel) = channel_with_reads(&[]);
        let mut reply = [0u8; 1];

        assert!(matches!(
            transact(
                &mut channel,
                &[0x05],
                &mut reply,
                Some(Duration::from_millis(10))
            ),
            Err(FernvaleError::Timeout {
                phase: Phase::Reply,
                expected: 1,
                actual: 0
            })
        ));
    }

    #[test]
    fn test_transact_closed_on_header() {
        let link = MockLink::new();
        link.script_writes([WriteEvent::Closed]);
        let mut channel = Channel::new(link);

        assert!(matches!(
            transact(&mut channel, &[0x06], &mut [], None),
            Err(FernvaleError::ChannelClosed(Phase::WriteLength))
        ));
    }

    #[test]
    fn test_shutdown_frame() {
        let (link, mut channel) = channel_with_reads(&[]);
        send_shutdown(&mut channel).unwrap();
        assert_eq!(link.written(), SHUTDOWN_FRAME.to_vec());
        assert_eq!(link.read_calls(), 0);
    }
}
