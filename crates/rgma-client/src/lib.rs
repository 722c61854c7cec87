// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! R-GMA Client - typed producers, consumers, schema and registry access
//!
//! Built on [`rgma_protocol`]: every producer and consumer here is a
//! server-side resource wrapped in a [`ResourceProxy`](rgma_protocol::ResourceProxy),
//! so it survives the server forgetting it. Schema, registry and service
//! calls address a servlet directly.
//!
//! # Usage
//!
//! ```ignore
//! use rgma_client::{ClientContext, Consumer, PrimaryProducer, QueryType, Storage,
//!                   SupportedQueries, TimeInterval, TimeUnit};
//!
//! let ctx = ClientContext::from_env()?;
//!
//! let mut producer = PrimaryProducer::new(&ctx, Storage::Memory, SupportedQueries::C)?;
//! let hour = TimeInterval::new(1, TimeUnit::Hours)?;
//! producer.declare_table("userTable", "", hour, hour)?;
//! producer.insert("INSERT INTO userTable (userId, aString) VALUES ('me', 'hello')", None)?;
//!
//! let mut consumer = Consumer::new(&ctx, "SELECT * FROM userTable", QueryType::Continuous)?;
//! let tuples = consumer.pop(50)?;
//! for tuple in &tuples {
//!     println!("{}", tuple.get_string(1)?);
//! }
//! consumer.close()?;
//! producer.close()?;
//! ```

pub mod consumer;
pub mod producer;
pub mod registry;
pub mod schema;
pub mod service;
pub mod types;

/// Servlet names below the service base URL.
pub mod servlets {
    pub const CONSUMER: &str = "ConsumerServlet";
    pub const PRIMARY_PRODUCER: &str = "PrimaryProducerServlet";
    pub const SECONDARY_PRODUCER: &str = "SecondaryProducerServlet";
    pub const ON_DEMAND_PRODUCER: &str = "OnDemandProducerServlet";
    pub const SCHEMA: &str = "SchemaServlet";
    pub const REGISTRY: &str = "RegistryServlet";
    pub const SERVICE: &str = "RGMAService";
}

pub use consumer::{Consumer, ConsumerQuery};
pub use producer::{OnDemandProducer, PrimaryProducer, SecondaryProducer};
pub use registry::Registry;
pub use schema::{AlterAction, Schema, TableOrView};
pub use service::RgmaService;
pub use types::{
    ColumnDefinition, Index, ProducerTableEntry, QueryType, QueryTypeWithInterval, ResourceEndpoint,
    RgmaType, Storage, SupportedQueries, TableDefinition, TimeInterval, TimeUnit, TupleStore,
};

// Re-export the engine types callers handle directly
pub use rgma_protocol::{ClientConfig, ClientContext, Result, RgmaError, Tuple, TupleSet};
