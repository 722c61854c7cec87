// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP/1.1 request and response framing.
//!
//! Body length follows the RFC 2616 precedence: no body for 1xx, 204 and
//! 304; otherwise chunked transfer coding; otherwise `Content-Length`;
//! otherwise everything until the peer closes. Every loop driven by the
//! peer is bounded by a failsafe ceiling.

use std::io::{self, BufRead, Read, Write};

use thiserror::Error;

use crate::channel::is_timeout;
use crate::error::RgmaError;

/// Longest accepted status, header, chunk-size or trailer line in bytes.
pub const MAX_LINE_BYTES: usize = 1_000_000;
/// Most header (or trailer) lines accepted in one response.
pub const MAX_HEADER_LINES: usize = 1_000_000;
/// Most chunks accepted in one chunked body.
pub const MAX_CHUNKS: usize = 1_000_000;

/// Errors that can occur while framing an HTTP exchange
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("connection closed before the response was complete")]
    UnexpectedEof,

    #[error("malformed status line: {0:?}")]
    StatusLine(String),

    #[error("malformed header line: {0:?}")]
    Header(String),

    #[error("malformed chunk size: {0:?}")]
    ChunkSize(String),

    #[error("chunk data not followed by CRLF")]
    ChunkTerminator,

    #[error("{0} exceeds failsafe limit")]
    Failsafe(&'static str),
}

impl From<HttpError> for RgmaError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Io(err) if is_timeout(&err) => RgmaError::temporary("Socket timeout"),
            HttpError::Io(_) | HttpError::UnexpectedEof => RgmaError::temporary("Http problem"),
            other => RgmaError::permanent(format!("Http problem: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    /// Inserts travel as `POST`; everything else is a `GET`.
    pub fn for_operation(operation: &str) -> Self {
        match operation {
            "insert" | "insertList" => Self::Post,
            _ => Self::Get,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// A request whose parameters are already encoded into `target`.
#[derive(Debug, Clone)]
pub struct Request<'a> {
    pub method: Method,
    /// Path plus query, e.g. `/R-GMA/ConsumerServlet/pop?connectionId=1`
    pub target: &'a str,
    pub host: &'a str,
    pub port: u16,
    pub keep_alive: bool,
}

impl Request<'_> {
    /// Render the request head.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut head = format!(
            "{} {} HTTP/1.1\r\nCache-Control: no-cache\r\nHost: {}:{}\r\nAccept: */*\r\n",
            self.method.as_str(),
            self.target,
            self.host,
            self.port
        );
        if self.keep_alive {
            head.push_str("Connection: keep-alive\r\n");
        }
        if self.method == Method::Post {
            head.push_str("Content-Length: 0\r\n");
        }
        head.push_str("\r\n");
        head.into_bytes()
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.to_bytes())?;
        writer.flush()
    }
}

/// How the length of a response body was determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    NoBody,
    Chunked,
    ContentLength(usize),
    UntilClose,
}

/// A fully read response.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub framing: Framing,
    pub body: Vec<u8>,
    /// The connection must not be reused.
    pub close: bool,
}

/// Read one response (head and body) from `reader`.
pub fn read_response<R: BufRead>(reader: &mut R) -> Result<Response, HttpError> {
    let status_line = read_line(reader)?;
    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| HttpError::StatusLine(status_line.clone()))?;

    let mut chunked = false;
    let mut content_length = None;
    let mut close = false;
    let mut lines = 0usize;
    loop {
        let line = read_line(reader)?;
        if line.is_empty() {
            break;
        }
        lines += 1;
        if lines > MAX_HEADER_LINES {
            return Err(HttpError::Failsafe("header line count"));
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| HttpError::Header(line.clone()))?;
        let name = name.trim();
        let value = value.trim();
        if name.eq_ignore_ascii_case("Transfer-Encoding") {
            chunked |= value.to_ascii_lowercase().contains("chunked");
        } else if name.eq_ignore_ascii_case("Content-Length") {
            content_length = Some(
                value
                    .parse::<usize>()
                    .map_err(|_| HttpError::Header(line.clone()))?,
            );
        } else if name.eq_ignore_ascii_case("Connection")
            || name.eq_ignore_ascii_case("Proxy-Connection")
        {
            close |= value
                .split(',')
                .any(|token| token.trim().eq_ignore_ascii_case("close"));
        }
    }

    let framing = if matches!(status, 100..=199 | 204 | 304) {
        Framing::NoBody
    } else if chunked {
        Framing::Chunked
    } else if let Some(length) = content_length {
        Framing::ContentLength(length)
    } else {
        Framing::UntilClose
    };

    let mut body = Vec::new();
    match framing {
        Framing::NoBody => {}
        Framing::Chunked => read_chunked(reader, &mut body)?,
        Framing::ContentLength(length) => read_exactly(reader, length, &mut body)?,
        Framing::UntilClose => {
            reader.read_to_end(&mut body)?;
            close = true;
        }
    }

    Ok(Response {
        status,
        framing,
        body,
        close,
    })
}

fn read_chunked<R: BufRead>(reader: &mut R, body: &mut Vec<u8>) -> Result<(), HttpError> {
    for _ in 0..MAX_CHUNKS {
        let line = read_line(reader)?;
        let token = line
            .trim_start()
            .split(|c: char| c == ';' || c.is_whitespace())
            .next()
            .unwrap_or_default();
        let size =
            usize::from_str_radix(token, 16).map_err(|_| HttpError::ChunkSize(line.clone()))?;
        if size == 0 {
            // Trailer lines up to the blank line are discarded.
            for _ in 0..MAX_HEADER_LINES {
                if read_line(reader)?.is_empty() {
                    return Ok(());
                }
            }
            return Err(HttpError::Failsafe("trailer line count"));
        }
        read_exactly(reader, size, body)?;
        if !read_line(reader)?.is_empty() {
            return Err(HttpError::ChunkTerminator);
        }
    }
    Err(HttpError::Failsafe("chunk count"))
}

/// Append exactly `length` bytes; bytes beyond them stay unread.
fn read_exactly<R: Read>(reader: &mut R, length: usize, body: &mut Vec<u8>) -> Result<(), HttpError> {
    let wanted = length as u64;
    let got = reader.by_ref().take(wanted).read_to_end(body)? as u64;
    if got < wanted {
        return Err(HttpError::UnexpectedEof);
    }
    Ok(())
}

/// Read one line, without its `\r\n` (or bare `\n`) terminator.
fn read_line<R: BufRead>(reader: &mut R) -> Result<String, HttpError> {
    let mut buf = Vec::new();
    let limit = MAX_LINE_BYTES as u64 + 2;
    let read = reader.by_ref().take(limit).read_until(b'\n', &mut buf)?;
    if read == 0 {
        return Err(HttpError::UnexpectedEof);
    }
    if buf.last() != Some(&b'\n') {
        return Err(if buf.len() as u64 >= limit {
            HttpError::Failsafe("line length")
        } else {
            HttpError::UnexpectedEof
        });
    }
    buf.pop();
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
