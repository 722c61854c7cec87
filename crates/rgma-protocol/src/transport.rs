// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Request/response cycles against one servlet over a reusable connection.

use std::io::BufReader;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::channel::{Channel, ConnectError, Connector, PingStatus};
use crate::error::{CallError, Result, RgmaError};
use crate::http::{self, Method, Request};
use crate::params::Params;
use crate::response::decode_response;
use crate::tuple::TupleSet;

/// URL scheme of a servlet endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Http => 80,
            Self::Https => 443,
        }
    }
}

/// A parsed servlet URL such as `https://host:8443/R-GMA/ConsumerServlet`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceUrl {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    /// Path without a trailing slash; empty for the server root.
    pub path: String,
}

impl ServiceUrl {
    pub fn parse(url: &str) -> Result<Self> {
        let invalid = || RgmaError::permanent(format!("Invalid service URL: {url}"));

        let (scheme, rest) = if let Some(rest) = url.strip_prefix("https://") {
            (Scheme::Https, rest)
        } else if let Some(rest) = url.strip_prefix("http://") {
            (Scheme::Http, rest)
        } else {
            return Err(invalid());
        };

        let (authority, path) = match rest.find('/') {
            Some(pos) => rest.split_at(pos),
            None => (rest, ""),
        };
        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => (host, port.parse::<u16>().map_err(|_| invalid())?),
            None => (authority, scheme.default_port()),
        };
        if host.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            scheme,
            host: host.to_string(),
            port,
            path: path.trim_end_matches('/').to_string(),
        })
    }

    /// Request target for an operation: `<path>/<operation><query>`.
    pub fn target(&self, operation: &str, params: &Params) -> String {
        format!("{}/{}{}", self.path, operation, params.encode())
    }
}

/// Executes servlet operations. The seam between a resource proxy and the
/// network.
pub trait Transport: Send {
    /// Run one operation and interpret its answer.
    fn execute(&mut self, operation: &str, params: &Params) -> std::result::Result<TupleSet, CallError>;

    /// URL of the servlet this transport talks to.
    fn url(&self) -> &str;

    /// Drop any open connection.
    fn disconnect(&mut self);
}

/// One servlet endpoint plus, optionally, a retained connection to it.
pub struct TransportChannel {
    url: String,
    target: ServiceUrl,
    connector: Arc<dyn Connector>,
    connection: Option<BufReader<Box<dyn Channel>>>,
    keep_alive: bool,
}

impl std::fmt::Debug for TransportChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportChannel")
            .field("url", &self.url)
            .field("connected", &self.connection.is_some())
            .field("keep_alive", &self.keep_alive)
            .finish()
    }
}

impl TransportChannel {
    /// `keep_alive` retains the connection between requests.
    pub fn new(url: impl Into<String>, connector: Arc<dyn Connector>, keep_alive: bool) -> Result<Self> {
        let url = url.into();
        let target = ServiceUrl::parse(&url)?;
        Ok(Self {
            url,
            target,
            connector,
            connection: None,
            keep_alive,
        })
    }

    pub fn service_url(&self) -> &ServiceUrl {
        &self.target
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Send one request and return the raw response body.
    #[instrument(skip(self, params), fields(url = %self.url))]
    pub fn send(&mut self, operation: &str, params: &Params) -> Result<String> {
        self.discard_if_stale();

        let mut connection = match self.connection.take() {
            Some(connection) => {
                debug!("reusing existing connection");
                connection
            }
            None => BufReader::new(self.connect()?),
        };

        let target = self.target.target(operation, params);
        let request = Request {
            method: Method::for_operation(operation),
            target: &target,
            host: &self.target.host,
            port: self.target.port,
            keep_alive: self.keep_alive,
        };
        debug!(method = request.method.as_str(), %target, "sending request");

        if let Err(err) = request.write_to(connection.get_mut()) {
            connection.get_mut().shutdown();
            return Err(http::HttpError::from(err).into());
        }

        let response = match http::read_response(&mut connection) {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "failed to read response");
                connection.get_mut().shutdown();
                return Err(err.into());
            }
        };
        debug!(
            status = response.status,
            framing = ?response.framing,
            bytes = response.body.len(),
            "response received"
        );

        if response.close || !self.keep_alive {
            connection.get_mut().shutdown();
        } else {
            self.connection = Some(connection);
        }

        String::from_utf8(response.body).map_err(|_| RgmaError::temporary("Http problem"))
    }

    fn connect(&self) -> Result<Box<dyn Channel>> {
        let host = &self.target.host;
        let port = self.target.port;
        info!(%host, port, "connecting to servlet");
        match self.connector.connect(host, port) {
            Ok(channel) => Ok(channel),
            Err(err @ ConnectError::Authentication { .. }) => {
                warn!(error = %err, "secure channel failed, retrying once");
                self.connector.connect(host, port).map_err(|err| {
                    warn!(error = %err, "secure channel failed again");
                    err.into()
                })
            }
            Err(err) => {
                warn!(error = %err, "connection failed");
                Err(err.into())
            }
        }
    }

    /// Drop a retained connection that is closed or has unexpected bytes pending.
    fn discard_if_stale(&mut self) {
        let Some(connection) = self.connection.as_mut() else {
            return;
        };
        let status = if connection.buffer().is_empty() {
            connection.get_mut().ping()
        } else {
            PingStatus::ProtocolAnomaly
        };
        if status != PingStatus::Idle {
            warn!(?status, url = %self.url, "discarding stale connection");
            self.disconnect();
        }
    }
}

impl Transport for TransportChannel {
    fn execute(&mut self, operation: &str, params: &Params) -> std::result::Result<TupleSet, CallError> {
        let body = self.send(operation, params)?;
        decode_response(&body)
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn disconnect(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.get_mut().shutdown();
            debug!(url = %self.url, "connection closed");
        }
    }
}

impl Drop for TransportChannel {
    fn drop(&mut self) {
        self.disconnect();
    }
}
