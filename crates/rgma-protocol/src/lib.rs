// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! R-GMA Protocol - resource-protocol engine for R-GMA clients
//!
//! Every client object (consumer, producer) is a stateful resource living in
//! a servlet. This crate talks to those servlets: it encodes operations as
//! HTTP requests, decodes the XML answers into [`TupleSet`]s or classified
//! errors, and keeps resources alive across server restarts.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      rgma-protocol                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ResourceProxy: create, setup recipe, restore + retry once  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Transport: request target, keep-alive reuse, decode        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Wire: HTTP/1.1 framing + XML tuple sets / exceptions       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Channel: TCP (plain) or TLS (rustls)                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Errors
//!
//! Callers see [`RgmaError`]: `Temporary` (retry later) or `Permanent`.
//! The "unknown resource" answer is internal ([`CallError`]) and never
//! escapes a [`ResourceProxy`].
//!
//! # Configuration
//!
//! | Variable | Meaning |
//! |----------|---------|
//! | `RGMA_SERVICE_URL` | Base URL of the servlets |
//! | `RGMA_HOME` | Installation root holding `etc/rgma/rgma.conf` |
//! | `RGMA_CONNECT_TIMEOUT_MS` | Connect timeout (default 300000) |
//! | `RGMA_SOCKET_TIMEOUT_MS` | Socket read/write timeout (default 300000) |
//! | `X509_USER_PROXY` | Grid proxy file used as client certificate |
//! | `X509_CERT_DIR` | CA directory used with `X509_USER_PROXY` |
//! | `TRUSTFILE` | Properties file naming certificate, key and CA directory |
//! | `RGMA_SKIP_CERT_VERIFICATION` | Accept any server certificate |
//!
//! # Usage
//!
//! ```ignore
//! use rgma_protocol::{ClientContext, Params, ResourceProxy};
//!
//! let ctx = ClientContext::from_env()?;
//! let transport = ctx.servlet_channel("ConsumerServlet", true)?;
//! let mut consumer = ResourceProxy::create(
//!     Box::new(transport),
//!     "createConsumer",
//!     Params::new()
//!         .with("select", "SELECT * FROM userTable")
//!         .with("queryType", "continuous"),
//! )?;
//! let tuples = consumer.pop(100)?;
//! ```

pub mod channel;
pub mod config;
pub mod context;
pub mod error;
pub mod http;
pub mod params;
pub mod proxy;
pub mod response;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
pub mod tls;
pub mod transport;
pub mod tuple;
pub mod xml;

pub use channel::{Channel, ConnectError, Connector, PingStatus, PlainChannel, TcpConnector};
pub use config::{ClientConfig, ConfigError, Credentials, Properties, TlsSettings};
pub use context::ClientContext;
pub use error::{CallError, Result, RgmaError};
pub use params::{ParamValue, Params};
pub use proxy::{ResourceProxy, ResourceState, SetupCall};
pub use response::{decode_response, encode_error, encode_response};
pub use tls::TlsConnector;
pub use transport::{Scheme, ServiceUrl, Transport, TransportChannel};
pub use tuple::{Tuple, TupleSet};
