// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-process servlet host for tests.
//!
//! [`FakeServer`] binds `127.0.0.1:0`, serves each connection on its own
//! thread and answers every request with whatever the handler returns. All
//! requests are recorded, tagged with the connection they arrived on.

use std::io::{BufRead, BufReader, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use percent_encoding::percent_decode_str;

use crate::config::ClientConfig;
use crate::error::CallError;
use crate::response::{encode_error, encode_response};
use crate::tuple::{Tuple, TupleSet};

/// A request as seen by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    /// Index of the connection the request arrived on, from 0.
    pub connection: usize,
    pub method: String,
    pub target: String,
    /// Last path segment, e.g. `pop`.
    pub operation: String,
    /// Decoded query parameters in wire order.
    pub params: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

impl RecordedRequest {
    /// First value of a parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Every value of a repeated parameter.
    pub fn params_named(&self, name: &str) -> Vec<&str> {
        self.params
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

type Handler = dyn Fn(&RecordedRequest) -> String + Send + Sync;

/// A servlet host on the loopback interface.
pub struct FakeServer {
    port: u16,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    stop: Arc<AtomicBool>,
    acceptor: Option<JoinHandle<()>>,
}

impl FakeServer {
    /// Start a server answering with the raw HTTP response `handler` returns.
    pub fn start<F>(handler: F) -> Self
    where
        F: Fn(&RecordedRequest) -> String + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
        let port = listener.local_addr().expect("local addr").port();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let stop = Arc::new(AtomicBool::new(false));
        let handler: Arc<Handler> = Arc::new(handler);

        let acceptor = {
            let requests = requests.clone();
            let stop = stop.clone();
            let connections = AtomicUsize::new(0);
            thread::spawn(move || {
                for stream in listener.incoming() {
                    if stop.load(Ordering::SeqCst) {
                        break;
                    }
                    let Ok(stream) = stream else { continue };
                    let connection = connections.fetch_add(1, Ordering::SeqCst);
                    let requests = requests.clone();
                    let handler = handler.clone();
                    thread::spawn(move || serve(stream, connection, &requests, handler.as_ref()));
                }
            })
        };

        Self {
            port,
            requests,
            stop,
            acceptor: Some(acceptor),
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Plain-HTTP configuration pointing at this server.
    pub fn config(&self) -> ClientConfig {
        ClientConfig::localhost(self.port)
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    /// Number of distinct connections that carried a request.
    pub fn connection_count(&self) -> usize {
        let mut seen: Vec<usize> = self.requests().iter().map(|r| r.connection).collect();
        seen.sort_unstable();
        seen.dedup();
        seen.len()
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        // Wake the acceptor so it sees the flag.
        let _ = TcpStream::connect(("127.0.0.1", self.port));
        if let Some(acceptor) = self.acceptor.take() {
            let _ = acceptor.join();
        }
    }
}

fn serve(stream: TcpStream, connection: usize, requests: &Mutex<Vec<RecordedRequest>>, handler: &Handler) {
    let Ok(write_half) = stream.try_clone() else {
        return;
    };
    let mut writer = write_half;
    let mut reader = BufReader::new(stream);
    while let Some(request) = read_request(&mut reader, connection) {
        let reply = handler(&request);
        requests.lock().expect("requests lock").push(request);
        if writer.write_all(reply.as_bytes()).is_err() || writer.flush().is_err() {
            break;
        }
        if wants_close(&reply) {
            break;
        }
    }
    let _ = writer.shutdown(Shutdown::Both);
}

fn wants_close(reply: &str) -> bool {
    let head = reply
        .split("\r\n\r\n")
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    let delimited = head.contains("content-length") || head.contains("chunked");
    head.lines().any(|line| line == "connection: close") || !delimited
}

fn read_request(reader: &mut BufReader<TcpStream>, connection: usize) -> Option<RecordedRequest> {
    let mut line = String::new();
    if reader.read_line(&mut line).ok()? == 0 {
        return None;
    }
    let mut parts = line.split_whitespace();
    let method = parts.next()?.to_string();
    let target = parts.next()?.to_string();

    let mut headers = Vec::new();
    loop {
        let mut header = String::new();
        if reader.read_line(&mut header).ok()? == 0 {
            return None;
        }
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }

    let (path, query) = target.split_once('?').unwrap_or((target.as_str(), ""));
    let operation = path.rsplit('/').next().unwrap_or_default().to_string();
    let params = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode(name), decode(value))
        })
        .collect();

    Some(RecordedRequest {
        connection,
        method,
        target,
        operation,
        params,
        headers,
    })
}

fn decode(text: &str) -> String {
    percent_decode_str(text).decode_utf8_lossy().into_owned()
}

/// `200 OK` with a `Content-Length` body.
pub fn http_ok(body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/xml\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    )
}

/// `200 OK` with `body` split into chunks of at most `chunk` bytes.
pub fn http_chunked(body: &str, chunk: usize) -> String {
    let mut reply = String::from("HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n");
    for piece in body.as_bytes().chunks(chunk.max(1)) {
        reply.push_str(&format!("{:x}\r\n", piece.len()));
        reply.push_str(&String::from_utf8_lossy(piece));
        reply.push_str("\r\n");
    }
    reply.push_str("0\r\n\r\n");
    reply
}

/// `200 OK` followed by closing the connection.
pub fn http_ok_close(body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nConnection: close\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    )
}

/// Single-cell tuple set, e.g. a connection id or `OK`.
pub fn single(value: &str) -> String {
    encode_response(&TupleSet::from_rows(vec![Tuple::new(vec![Some(value.to_string())])]))
}

/// Tuple set holding `rows` of non-null text cells.
pub fn rows(rows: &[&[&str]]) -> String {
    encode_response(&TupleSet::from_rows(
        rows.iter()
            .map(|row| Tuple::new(row.iter().map(|c| Some(c.to_string())).collect()))
            .collect(),
    ))
}

/// The unknown-resource answer.
pub fn unknown_resource() -> String {
    encode_error(&CallError::UnknownResource)
}
