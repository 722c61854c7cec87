// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Process-wide client state: configuration and connectors.
//!
//! A [`ClientContext`] is cheap to clone and is shared by every resource a
//! program creates. It owns the connector for each URL scheme so the TLS
//! configuration (certificates, trust anchors) is loaded once.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::channel::{Connector, TcpConnector};
use crate::config::{ClientConfig, ConfigError, Credentials};
use crate::error::Result;
use crate::tls::TlsConnector;
use crate::transport::{Scheme, ServiceUrl, TransportChannel};

struct Inner {
    config: ClientConfig,
    http: Arc<dyn Connector>,
    https: Option<Arc<dyn Connector>>,
}

/// Shared configuration and connectors.
#[derive(Clone)]
pub struct ClientContext {
    inner: Arc<Inner>,
}

impl fmt::Debug for ClientContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientContext")
            .field("base_url", &self.inner.config.base_url)
            .field("https", &self.inner.https.is_some())
            .finish()
    }
}

impl ClientContext {
    /// Build the connectors for `config`.
    ///
    /// The TLS connector is built when the base URL is `https` or client
    /// credentials are configured; failing to load them is a permanent error.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let tcp = TcpConnector::new(config.connect_timeout, config.socket_timeout);
        let wants_tls = config.base_url.starts_with("https://")
            || config.tls.credentials != Credentials::None;
        let https: Option<Arc<dyn Connector>> = if wants_tls {
            Some(Arc::new(TlsConnector::new(&config.tls, tcp.clone())?))
        } else {
            None
        };
        debug!(base_url = %config.base_url, tls = https.is_some(), "client context created");

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                http: Arc::new(tcp),
                https,
            }),
        })
    }

    /// [`ClientConfig::from_env`] followed by [`ClientContext::new`].
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Use `connector` for every scheme.
    pub fn with_connector(config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                http: connector.clone(),
                https: Some(connector),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Full URL of a servlet below the configured base URL.
    pub fn service_url(&self, servlet: &str) -> String {
        self.inner.config.service_url(servlet)
    }

    /// A transport to an arbitrary servlet URL.
    pub fn channel(&self, url: &str, keep_alive: bool) -> Result<TransportChannel> {
        let connector = match ServiceUrl::parse(url)?.scheme {
            Scheme::Http => self.inner.http.clone(),
            Scheme::Https => self
                .inner
                .https
                .clone()
                .ok_or(ConfigError::NoCredentials)?,
        };
        TransportChannel::new(url, connector, keep_alive)
    }

    /// A transport to a servlet of the configured service.
    pub fn servlet_channel(&self, servlet: &str, keep_alive: bool) -> Result<TransportChannel> {
        self.channel(&self.service_url(servlet), keep_alive)
    }
}
