// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Byte channels to servlet hosts and the connectors that open them.
//!
//! The transport only needs a bidirectional byte stream plus two extra
//! operations: a non-blocking liveness probe used before a retained
//! connection is reused, and an orderly shutdown. Plain TCP lives here;
//! the TLS implementation is in [`crate::tls`].

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::config::DEFAULT_TIMEOUT;
use crate::error::RgmaError;

/// Result of probing an idle connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingStatus {
    /// Nothing pending; the connection can be reused.
    Idle,
    /// The peer has closed its side.
    PeerClosed,
    /// Unsolicited bytes are waiting on an idle connection.
    ProtocolAnomaly,
}

/// Errors that can occur while opening a channel
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("cannot connect to {addr}: {source}")]
    Unreachable {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("connection to {0} timed out")]
    TimedOut(String),

    /// The secure channel could not be negotiated.
    #[error("secure channel to {addr} failed: {reason}")]
    Authentication { addr: String, reason: String },
}

impl From<ConnectError> for RgmaError {
    fn from(err: ConnectError) -> Self {
        match err {
            ConnectError::Unreachable { .. } => {
                RgmaError::temporary("Unable to connect with R-GMA server")
            }
            ConnectError::TimedOut(_) => RgmaError::temporary("Socket timeout"),
            ConnectError::Authentication { .. } => RgmaError::temporary("Authentication problem"),
        }
    }
}

/// An open connection to a servlet host.
pub trait Channel: Read + Write + Send {
    /// Check, without blocking, whether the connection is still usable.
    fn ping(&mut self) -> PingStatus;

    /// Close the connection. Errors are ignored.
    fn shutdown(&mut self);
}

/// Opens channels to servlet hosts.
pub trait Connector: Send + Sync {
    fn connect(&self, host: &str, port: u16) -> Result<Box<dyn Channel>, ConnectError>;
}

/// Opens plain TCP connections with connect and socket timeouts.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
    socket_timeout: Duration,
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT, DEFAULT_TIMEOUT)
    }
}

impl TcpConnector {
    pub fn new(connect_timeout: Duration, socket_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            socket_timeout,
        }
    }

    /// Open a TCP stream, trying every resolved address in turn.
    pub fn open(&self, host: &str, port: u16) -> Result<TcpStream, ConnectError> {
        let addr = format!("{host}:{port}");
        let candidates = (host, port)
            .to_socket_addrs()
            .map_err(|source| ConnectError::Unreachable {
                addr: addr.clone(),
                source,
            })?;

        let mut last_err = io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses");
        for candidate in candidates {
            match TcpStream::connect_timeout(&candidate, self.connect_timeout) {
                Ok(stream) => {
                    let configure = || -> io::Result<()> {
                        stream.set_read_timeout(Some(self.socket_timeout))?;
                        stream.set_write_timeout(Some(self.socket_timeout))?;
                        stream.set_nodelay(true)
                    };
                    configure().map_err(|source| ConnectError::Unreachable {
                        addr: addr.clone(),
                        source,
                    })?;
                    debug!(%candidate, "tcp connection established");
                    return Ok(stream);
                }
                Err(err) if is_timeout(&err) => return Err(ConnectError::TimedOut(addr)),
                Err(err) => last_err = err,
            }
        }
        Err(ConnectError::Unreachable {
            addr,
            source: last_err,
        })
    }
}

impl Connector for TcpConnector {
    fn connect(&self, host: &str, port: u16) -> Result<Box<dyn Channel>, ConnectError> {
        Ok(Box::new(PlainChannel(self.open(host, port)?)))
    }
}

/// An unencrypted TCP channel.
#[derive(Debug)]
pub struct PlainChannel(pub TcpStream);

impl Read for PlainChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl Write for PlainChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl Channel for PlainChannel {
    fn ping(&mut self) -> PingStatus {
        match peek_pending(&self.0) {
            Ok(None) => PingStatus::Idle,
            Ok(Some(0)) | Err(_) => PingStatus::PeerClosed,
            Ok(Some(_)) => PingStatus::ProtocolAnomaly,
        }
    }

    fn shutdown(&mut self) {
        let _ = self.0.shutdown(Shutdown::Both);
    }
}

/// Peek at the socket without blocking.
///
/// `Ok(None)` means nothing is pending, `Ok(Some(0))` means the peer has
/// closed, `Ok(Some(n))` means bytes are waiting.
pub(crate) fn peek_pending(stream: &TcpStream) -> io::Result<Option<usize>> {
    stream.set_nonblocking(true)?;
    let mut byte = [0u8; 1];
    let result = stream.peek(&mut byte);
    stream.set_nonblocking(false)?;
    match result {
        Ok(n) => Ok(Some(n)),
        Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(None),
        Err(err) => Err(err),
    }
}

pub(crate) fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}
