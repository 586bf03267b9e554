//! Length-prefixed frame transport over a non-blocking TCP stream.
//!
//! Each frame is a 4-byte big-endian length followed by that many bytes.
//! Writes that the kernel cannot take immediately are buffered and flushed on
//! the next send or receive, so neither direction ever blocks the run loop.

use std::io::{self, ErrorKind, Read, Write};
use std::net::Shutdown;
use std::time::Duration;

use mio::net::TcpStream;

use super::Endpoint;
use crate::control::channel::{ChannelError, MessageChannel};

/// Largest frame accepted in either direction.
pub const MAX_FRAME_LEN: usize = 1 << 20;

const LEN_PREFIX: usize = 4;
const READ_CHUNK: usize = 4096;

/// Default bound on the blocking connect.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// A [`MessageChannel`] backed by a TCP connection to the controller.
pub struct TcpChannel {
    endpoint: Endpoint,
    connect_timeout: Duration,
    stream: Option<TcpStream>,
    read_buf: Vec<u8>,
    write_buf: Vec<u8>,
}

impl TcpChannel {
    #[must_use]
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            stream: None,
            read_buf: Vec::with_capacity(READ_CHUNK),
            write_buf: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    /// Writes as much of the pending buffer as the socket accepts.
    fn flush_pending(&mut self) -> Result<(), ChannelError> {
        let stream = self.stream.as_mut().ok_or(ChannelError::NotConnected)?;
        while !self.write_buf.is_empty() {
            match stream.write(&self.write_buf) {
                Ok(0) => return Err(ChannelError::Disconnected),
                Ok(n) => {
                    self.write_buf.drain(..n);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Pulls everything currently readable into `read_buf`.
    fn fill_read_buf(&mut self) -> Result<(), ChannelError> {
        let stream = self.stream.as_mut().ok_or(ChannelError::NotConnected)?;
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match stream.read(&mut chunk) {
                Ok(0) => return Err(ChannelError::Disconnected),
                Ok(n) => self.read_buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Splits one complete frame off the front of `read_buf`.
    fn take_frame(&mut self) -> Result<Option<Vec<u8>>, ChannelError> {
        let Some(prefix) = self.read_buf.get(..LEN_PREFIX) else {
            return Ok(None);
        };
        let mut len_bytes = [0u8; LEN_PREFIX];
        len_bytes.copy_from_slice(prefix);
        let len = u32::from_be_bytes(len_bytes) as usize;
        if len > MAX_FRAME_LEN {
            return Err(ChannelError::FrameTooLarge {
                len,
                max: MAX_FRAME_LEN,
            });
        }
        if self.read_buf.len() < LEN_PREFIX + len {
            return Ok(None);
        }
        let frame = self.read_buf[LEN_PREFIX..LEN_PREFIX + len].to_vec();
        self.read_buf.drain(..LEN_PREFIX + len);
        Ok(Some(frame))
    }
}

impl MessageChannel for TcpChannel {
    fn connect(&mut self) -> Result<(), ChannelError> {
        let addr = self.endpoint.as_socket_addr();
        let std_stream = std::net::TcpStream::connect_timeout(&addr, self.connect_timeout)?;
        std_stream.set_nodelay(true)?;
        std_stream.set_nonblocking(true)?;
        self.stream = Some(TcpStream::from_std(std_stream));
        self.read_buf.clear();
        self.write_buf.clear();
        Ok(())
    }

    fn send(&mut self, frame: &[u8]) -> Result<(), ChannelError> {
        if self.stream.is_none() {
            return Err(ChannelError::NotConnected);
        }
        if frame.len() > MAX_FRAME_LEN {
            return Err(ChannelError::FrameTooLarge {
                len: frame.len(),
                max: MAX_FRAME_LEN,
            });
        }
        // MAX_FRAME_LEN fits in u32.
        let len = frame.len() as u32;
        self.write_buf.extend_from_slice(&len.to_be_bytes());
        self.write_buf.extend_from_slice(frame);
        self.flush_pending()
    }

    fn try_recv(&mut self) -> Result<Option<Vec<u8>>, ChannelError> {
        if let Some(frame) = self.take_frame()? {
            return Ok(Some(frame));
        }
        self.flush_pending()?;
        // Frames that arrived before the peer hung up are still delivered.
        match self.fill_read_buf() {
            Ok(()) => self.take_frame(),
            Err(ChannelError::Disconnected) => match self.take_frame()? {
                Some(frame) => Ok(Some(frame)),
                None => Err(ChannelError::Disconnected),
            },
            Err(e) => Err(e),
        }
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = flush_best_effort(&stream, &self.write_buf);
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.write_buf.clear();
        self.read_buf.clear();
    }
}

/// One non-blocking attempt to push out whatever is still buffered.
fn flush_best_effort(mut stream: &TcpStream, pending: &[u8]) -> io::Result<()> {
    if pending.is_empty() {
        return Ok(());
    }
    stream.write_all(pending)
}
