//! Scripted in-memory link for tests

use crate::channel::Link;
use crate::error::Result;
use crate::serial::BaudRate;

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub enum ReadEvent {
    Data(u8),
    Fail(io::ErrorKind),
    /// Sticky: every later read also reports end of stream
    Closed,
}

#[derive(Debug, Clone, Copy)]
pub enum WriteEvent {
    /// Accept at most this many bytes
    Accept(usize),
    Fail(io::ErrorKind),
    Closed,
}

#[derive(Default)]
struct State {
    reads: VecDeque<ReadEvent>,
    writes: VecDeque<WriteEvent>,
    written: Vec<u8>,
    read_calls: usize,
    max_read_request: usize,
    baud: Option<BaudRate>,
}

/// Cloning shares the script, so a test can inspect a link it handed away
#[derive(Clone, Default)]
pub struct MockLink {
    state: Rc<RefCell<State>>,
}

impl MockLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_bytes(&self, bytes: &[u8]) {
        self.script_reads(bytes.iter().copied().map(ReadEvent::Data));
    }

    pub fn script_reads(&self, events: impl IntoIterator<Item = ReadEvent>) {
        self.state.borrow_mut().reads.extend(events);
    }

    pub fn script_writes(&self, events: impl IntoIterator<Item = WriteEvent>) {
        self.state.borrow_mut().writes.extend(events);
    }

    pub fn written(&self) -> Vec<u8> {
        self.state.borrow().written.clone()
    }

    pub fn pending_reads(&self) -> usize {
        self.state.borrow().reads.len()
    }

    pub fn read_calls(&self) -> usize {
        self.state.borrow().read_calls
    }

    pub fn max_read_request(&self) -> usize {
        self.state.borrow().max_read_request
    }

    pub fn configured_baud(&self) -> Option<BaudRate> {
        self.state.borrow().baud
    }
}

impl Link for MockLink {
    fn configure(&mut self, baud: BaudRate) -> Result<()> {
        self.state.borrow_mut().baud = Some(baud);
        Ok(())
    }

    fn write_some(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut state = self.state.borrow_mut();
        let n = match state.writes.pop_front() {
            None => data.len(),
            Some(WriteEvent::Accept(limit)) => limit.min(data.len()),
            Some(WriteEvent::Fail(kind)) => return Err(kind.into()),
            Some(WriteEvent::Closed) => return Ok(0),
        };
        state.written.extend_from_slice(&data[..n]);
        Ok(n)
    }

    fn read_some(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.borrow_mut();
        state.read_calls += 1;
        state.max_read_request = state.max_read_request.max(buf.len());

        match state.reads.front().copied() {
            None => Err(io::ErrorKind::WouldBlock.into()),
            Some(ReadEvent::Closed) => Ok(0),
            Some(ReadEvent::Fail(kind)) => {
                state.reads.pop_front();
                Err(kind.into())
            }
            Some(ReadEvent::Data(byte)) => {
                state.reads.pop_front();
                buf[0] = byte;
                Ok(1)
            }
        }
    }

    fn wait_readable(&mut self, timeout: Duration) -> io::Result<bool> {
        if !self.state.borrow().reads.is_empty() {
            return Ok(true);
        }
        std::thread::sleep(timeout.min(Duration::from_millis(1)));
        Ok(false)
    }
}

/// Far end of the link: a bridge in front of an emulated flash chip
///
/// Waits for the greeting, echoes it with some console noise and the ready
/// byte, then decodes frames and runs each one against the chip.
#[derive(Clone)]
pub struct SimulatedBridge {
    inner: Rc<RefCell<Bridge>>,
}

struct Bridge {
    flash: fvflash_dummy::DummyFlash,
    rx: Vec<u8>,
    tx: VecDeque<u8>,
    greeted: bool,
    exited: bool,
}

impl SimulatedBridge {
    pub fn new(flash: fvflash_dummy::DummyFlash) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Bridge {
                flash,
                rx: Vec::new(),
                tx: VecDeque::new(),
                greeted: false,
                exited: false,
            })),
        }
    }

    pub fn data(&self) -> Vec<u8> {
        self.inner.borrow().flash.data().to_vec()
    }

    /// Frames executed, not counting the shutdown frame
    pub fn frames(&self) -> usize {
        self.inner.borrow().flash.transactions()
    }

    pub fn exited(&self) -> bool {
        self.inner.borrow().exited
    }
}

impl Bridge {
    fn process(&mut self) {
        if !self.greeted {
            if self.rx.ends_with(crate::protocol::GREETING) {
                self.greeted = true;
                let echo = std::mem::take(&mut self.rx);
                self.tx.extend(echo);
                self.tx.extend(b"\rfernvale> entering spi mode\r\n");
                self.tx.push_back(crate::protocol::READY);
            }
            return;
        }

        while !self.exited && self.rx.len() >= 2 {
            let out_len = self.rx[0] as usize;
            let in_len = self.rx[1] as usize;
            if out_len == 0 && in_len == 0 {
                self.rx.drain(..2);
                self.exited = true;
                return;
            }
            if self.rx.len() < 2 + out_len {
                return;
            }

            let payload: Vec<u8> = self.rx.drain(..2 + out_len).skip(2).collect();
            let mut reply = vec![0xFF; in_len];
            // A chip that rejects a command leaves the bus floating high
            if self.flash.transfer(&payload, &mut reply).is_err() {
                reply.fill(0xFF);
            }
            self.tx.extend(reply);
        }
    }
}

impl Link for SimulatedBridge {
    fn configure(&mut self, _baud: BaudRate) -> Result<()> {
        Ok(())
    }

    fn write_some(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut bridge = self.inner.borrow_mut();
        if bridge.exited {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        // Accept in small pieces to exercise partial writes
        let n = data.len().min(7);
        bridge.rx.extend_from_slice(&data[..n]);
        bridge.process();
        Ok(n)
    }

    fn read_some(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut bridge = self.inner.borrow_mut();
        match bridge.tx.pop_front() {
            Some(byte) => {
                buf[0] = byte;
                Ok(1)
            }
            None => Err(io::ErrorKind::WouldBlock.into()),
        }
    }

    fn wait_readable(&mut self, _timeout: Duration) -> io::Result<bool> {
        Ok(!self.inner.borrow().tx.is_empty())
    }
}
