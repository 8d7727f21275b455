//! Byte-level framed transport over the half-duplex serial line.

use std::io::{ErrorKind, Read, Write};
use std::thread;
use std::time::Duration;

use log::{trace, warn};

use crate::error::{Error, Result};

/// Required minimum read burst the real hardware's termios setting
/// enforces (`VMIN=5, VTIME=0`); kept here only as documentation, since
/// `serialport`'s read timeout supersedes it operationally.
pub const MIN_READ_BYTES: usize = 5;

const INTERCHARACTER_DELAY: Duration = Duration::from_millis(1);
const DRAIN_BUF_LEN: usize = 255;

/// What the command layer and cut compiler need from the wire: paced
/// byte send, a plain read, and a timed drain-and-discard. Abstracted so
/// tests can substitute `MockTransport` for real hardware.
pub trait Transport {
    /// Write `bytes` one at a time with the mandatory 1 ms intercharacter
    /// delay after every byte, including the last. Returns the number of
    /// bytes actually written; a short write is never an `Err` here —
    /// the caller decides whether that's fatal.
    fn send(&mut self, bytes: &[u8]) -> Result<usize>;

    /// Read up to `buf.len()` bytes, blocking per the transport's
    /// configured timeout. Returns the number of bytes actually read,
    /// which may be less than `buf.len()` on timeout.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Wait up to `timeout_ms`, read and discard whatever arrives (up to
    /// 255 bytes), and return the count discarded.
    fn drain(&mut self, timeout_ms: u64) -> Result<usize>;
}

/// Real transport over a `serialport`-opened handle.
pub struct SerialTransport {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialTransport {
    /// Open `path` at 200 kbaud / 8 data bits / no parity / one stop bit,
    /// non-canonical. The device transmits 8N1 but the host is meant to
    /// transmit 8N2; only one discipline can be configured per port, so
    /// 8N1 is used throughout — this works because the device's
    /// receiver tolerates the one-stop-bit framing from the host.
    pub fn open(path: &str) -> Result<Self> {
        let port = serialport::new(path, 200_000)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(Duration::from_millis(2000))
            .open()
            .map_err(|e| Error::OpenFailure(e.to_string()))?;
        Ok(SerialTransport { port })
    }
}

impl Transport for SerialTransport {
    fn send(&mut self, bytes: &[u8]) -> Result<usize> {
        let mut sent = 0;
        for &b in bytes {
            match self.port.write(&[b]) {
                Ok(1) => sent += 1,
                Ok(n) => warn!("short write: wrote {} of 1 byte", n),
                Err(e) => warn!("write error: {}", e),
            }
            // Mandatory after every byte, including the last — the
            // device's receive path drops back-to-back characters.
            thread::sleep(INTERCHARACTER_DELAY);
        }
        if sent < bytes.len() {
            warn!("short write overall: sent {} of {} bytes", sent, bytes.len());
        }
        Ok(sent)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(Error::ReplyIO(e.to_string())),
        }
    }

    fn drain(&mut self, timeout_ms: u64) -> Result<usize> {
        self.port
            .set_timeout(Duration::from_millis(timeout_ms))
            .map_err(Error::Serial)?;
        let mut buf = [0u8; DRAIN_BUF_LEN];
        let n = match self.port.read(&mut buf) {
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::TimedOut => 0,
            Err(e) => return Err(Error::Io(e)),
        };
        if n > 0 {
            trace!("drained {} bytes: {:02x?}", n, &buf[..n]);
        }
        // Restore the long reply-read timeout used by `read`.
        self.port
            .set_timeout(Duration::from_millis(2000))
            .map_err(Error::Serial)?;
        Ok(n)
    }
}

/// In-memory transport for command-layer and cut-compiler tests.
/// Records every frame `send` was asked to transmit and serves replies
/// from a scripted queue.
#[cfg(test)]
pub struct MockTransport {
    pub sent_frames: Vec<Vec<u8>>,
    reply_queue: std::collections::VecDeque<u8>,
    pub drains: Vec<u64>,
}

#[cfg(test)]
impl MockTransport {
    pub fn new() -> Self {
        MockTransport {
            sent_frames: Vec::new(),
            reply_queue: std::collections::VecDeque::new(),
            drains: Vec::new(),
        }
    }

    /// Queue raw reply bytes (length byte included) to be handed back on
    /// subsequent `read` calls, FIFO.
    pub fn queue_reply(&mut self, bytes: &[u8]) {
        self.reply_queue.extend(bytes.iter().copied());
    }
}

#[cfg(test)]
impl Transport for MockTransport {
    fn send(&mut self, bytes: &[u8]) -> Result<usize> {
        self.sent_frames.push(bytes.to_vec());
        Ok(bytes.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut n = 0;
        while n < buf.len() {
            match self.reply_queue.pop_front() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }

    fn drain(&mut self, timeout_ms: u64) -> Result<usize> {
        self.drains.push(timeout_ms);
        Ok(0)
    }
}
