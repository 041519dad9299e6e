//! Newline-framed TCP transport.
//!
//! One JSON frame per line. The stream runs non-blocking; partial reads and
//! writes are buffered internally and finished on later calls.

use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};

use ptz_traits::Link;

use crate::error::{LinkError, Result};

/// Upper bound on a single inbound frame; protects the reassembly buffer
/// against a peer that never sends a newline.
const MAX_FRAME_BYTES: usize = 64 * 1024;

pub struct TcpLink {
    stream: TcpStream,
    rdbuf: Vec<u8>,
    wrbuf: Vec<u8>,
    open: bool,
}

impl TcpLink {
    /// Connect to a listening peer.
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        Self::from_stream(TcpStream::connect(addr)?)
    }

    /// Wrap an accepted stream. Switches it to non-blocking mode.
    pub fn from_stream(stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true)?;
        stream.set_nonblocking(true)?;
        Ok(Self {
            stream,
            rdbuf: Vec::new(),
            wrbuf: Vec::new(),
            open: true,
        })
    }

    fn flush_pending(&mut self) -> Result<()> {
        while !self.wrbuf.is_empty() {
            match self.stream.write(&self.wrbuf) {
                Ok(0) => {
                    self.open = false;
                    return Err(LinkError::Closed);
                }
                Ok(n) => {
                    self.wrbuf.drain(..n);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) if is_disconnect(&e) => {
                    self.open = false;
                    return Err(LinkError::Closed);
                }
                Err(e) => return Err(LinkError::Io(e)),
            }
        }
        Ok(())
    }

    /// Extract the first complete line from the reassembly buffer.
    fn take_frame(&mut self) -> Option<String> {
        let pos = self.rdbuf.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.rdbuf.drain(..=pos).collect();
        let mut end = line.len() - 1;
        if end > 0 && line[end - 1] == b'\r' {
            end -= 1;
        }
        Some(String::from_utf8_lossy(&line[..end]).into_owned())
    }
}

fn is_disconnect(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::NotConnected
            | ErrorKind::UnexpectedEof
    )
}

impl Link for TcpLink {
    fn send(&mut self, frame: &str) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if !self.open {
            return Err(Box::new(LinkError::Closed));
        }
        self.wrbuf.reserve(frame.len() + 1);
        self.wrbuf.extend_from_slice(frame.as_bytes());
        self.wrbuf.push(b'\n');
        self.flush_pending()
            .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)
    }

    fn poll(&mut self) -> std::result::Result<Option<String>, Box<dyn std::error::Error + Send + Sync>> {
        if !self.open {
            return Err(Box::new(LinkError::Closed));
        }
        self.flush_pending()
            .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)?;
        if let Some(frame) = self.take_frame() {
            return Ok(Some(frame));
        }
        let mut chunk = [0u8; 4096];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    self.open = false;
                    return Err(Box::new(LinkError::Closed));
                }
                Ok(n) => {
                    self.rdbuf.extend_from_slice(&chunk[..n]);
                    if self.rdbuf.len() > MAX_FRAME_BYTES && !self.rdbuf.contains(&b'\n') {
                        self.open = false;
                        return Err(Box::new(LinkError::FrameTooLarge(MAX_FRAME_BYTES)));
                    }
                    if let Some(frame) = self.take_frame() {
                        return Ok(Some(frame));
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(None),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) if is_disconnect(&e) => {
                    self.open = false;
                    return Err(Box::new(LinkError::Closed));
                }
                Err(e) => return Err(Box::new(LinkError::Io(e))),
            }
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
