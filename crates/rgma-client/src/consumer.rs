// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Consumers: run an SQL query against producers and pop the results.

use rgma_protocol::{ClientContext, Params, ResourceProxy, Result, RgmaError, TupleSet};
use tracing::info;

use crate::servlets;
use crate::service::first_row;
use crate::types::{QueryType, QueryTypeWithInterval, ResourceEndpoint, TimeInterval};

/// What a consumer asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerQuery {
    Plain(QueryType),
    /// Start from tuples published no earlier than `interval` ago.
    WithInterval(QueryTypeWithInterval, TimeInterval),
}

impl ConsumerQuery {
    fn query_type(&self) -> QueryType {
        match self {
            Self::Plain(query_type) => *query_type,
            Self::WithInterval(query_type, _) => (*query_type).into(),
        }
    }

    fn interval(&self) -> Option<TimeInterval> {
        match self {
            Self::Plain(_) => None,
            Self::WithInterval(_, interval) => Some(*interval),
        }
    }
}

impl From<QueryType> for ConsumerQuery {
    fn from(query_type: QueryType) -> Self {
        Self::Plain(query_type)
    }
}

/// Retrieves data from one or more producers with an SQL query.
#[derive(Debug)]
pub struct Consumer {
    proxy: ResourceProxy,
}

impl Consumer {
    /// Create a consumer whose producers are chosen by the mediator.
    pub fn new(ctx: &ClientContext, select: &str, query: impl Into<ConsumerQuery>) -> Result<Self> {
        Self::with_options(ctx, select, query, None, None)
    }

    /// Create a consumer.
    ///
    /// `timeout` aborts the query after that interval. `producers`, when
    /// given, replaces mediation with an explicit list, which may not be
    /// empty.
    pub fn with_options(
        ctx: &ClientContext,
        select: &str,
        query: impl Into<ConsumerQuery>,
        timeout: Option<TimeInterval>,
        producers: Option<&[ResourceEndpoint]>,
    ) -> Result<Self> {
        let query = query.into();
        if producers.is_some_and(|p| p.is_empty()) {
            return Err(RgmaError::permanent(
                "Consumer constructor with list of producer endpoints given an empty list",
            ));
        }

        let params = Params::new()
            .with("select", select)
            .with("queryType", query.query_type().as_str())
            .with_opt("timeIntervalSec", query.interval().map(|i| i.as_secs()))
            .with_opt("timeoutSec", timeout.map(|t| t.as_secs()))
            .with_each(
                "producerConnections",
                producers
                    .unwrap_or_default()
                    .iter()
                    .map(ResourceEndpoint::to_connection_param),
            );

        let transport = ctx.servlet_channel(servlets::CONSUMER, true)?;
        let proxy = ResourceProxy::create(Box::new(transport), "createConsumer", params)?;
        info!(connection_id = ?proxy.connection_id(), query_type = query.query_type().as_str(), "consumer created");
        Ok(Self { proxy })
    }

    /// Retrieve at most `max_count` tuples. An empty set means none are
    /// available yet.
    pub fn pop(&mut self, max_count: i32) -> Result<TupleSet> {
        self.proxy.pop(max_count)
    }

    /// Stop the query; tuples already gathered can still be popped.
    pub fn abort(&mut self) -> Result<()> {
        self.proxy.call("abort", Params::new())?.expect_ok()
    }

    /// Whether the query was aborted by [`abort`](Self::abort) or its timeout.
    pub fn has_aborted(&mut self) -> Result<bool> {
        let set = self.proxy.call("hasAborted", Params::new())?;
        first_row(&set)?.get_bool(0)
    }

    pub fn resource_endpoint(&self) -> ResourceEndpoint {
        ResourceEndpoint::new(self.proxy.url(), self.proxy.connection_id().unwrap_or_default())
    }

    /// Close the consumer. It is not an error if the server has already
    /// forgotten it.
    pub fn close(&mut self) -> Result<()> {
        self.proxy.close()
    }

    /// Close and destroy the consumer.
    pub fn destroy(&mut self) -> Result<()> {
        self.proxy.destroy()
    }
}
