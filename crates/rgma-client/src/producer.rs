// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Producers: publish tuples into R-GMA tables.
//!
//! Every `declare_table` is a setup call: if the server loses the producer,
//! it is re-created and the tables are declared again before the failed
//! operation is retried.

use rgma_protocol::{CallError, ClientContext, Params, ResourceProxy, Result};
use tracing::{debug, info};

use crate::servlets;
use crate::service::{call, raw_call};
use crate::types::{ResourceEndpoint, Storage, SupportedQueries, TimeInterval};

fn storage_params(storage: &Storage, supported: SupportedQueries) -> Params {
    Params::new()
        .with("type", storage.type_name())
        .with_opt("logicalName", storage.logical_name())
        .with("isLatest", supported.is_latest())
        .with("isHistory", supported.is_history())
}

fn endpoint(proxy: &ResourceProxy) -> ResourceEndpoint {
    ResourceEndpoint::new(proxy.url(), proxy.connection_id().unwrap_or_default())
}

/// Publishes tuples inserted by the caller.
#[derive(Debug)]
pub struct PrimaryProducer {
    proxy: ResourceProxy,
}

impl PrimaryProducer {
    pub fn new(ctx: &ClientContext, storage: Storage, supported: SupportedQueries) -> Result<Self> {
        let transport = ctx.servlet_channel(servlets::PRIMARY_PRODUCER, true)?;
        let proxy = ResourceProxy::create(
            Box::new(transport),
            "createPrimaryProducer",
            storage_params(&storage, supported),
        )?;
        info!(connection_id = ?proxy.connection_id(), storage = storage.type_name(), "primary producer created");
        Ok(Self { proxy })
    }

    /// Declare a table to publish into.
    ///
    /// `hrp` is how long tuples are kept for history queries, `lrp` the
    /// default validity of a tuple for latest queries.
    pub fn declare_table(
        &mut self,
        name: &str,
        predicate: &str,
        hrp: TimeInterval,
        lrp: TimeInterval,
    ) -> Result<()> {
        let params = Params::new()
            .with("tableName", name)
            .with("predicate", predicate)
            .with("hrpSec", hrp.as_secs())
            .with("lrpSec", lrp.as_secs());
        self.proxy.setup("declareTable", params)?.expect_ok()
    }

    /// Publish one tuple with an SQL INSERT statement. `lrp` overrides the
    /// table's latest retention period for this tuple.
    pub fn insert(&mut self, statement: &str, lrp: Option<TimeInterval>) -> Result<()> {
        self.insert_list(&[statement], lrp)
    }

    /// Publish several INSERT statements in one request.
    ///
    /// On failure the error's `num_successful_ops` tells how many
    /// statements the server applied.
    pub fn insert_list<S: AsRef<str>>(&mut self, statements: &[S], lrp: Option<TimeInterval>) -> Result<()> {
        let params = Params::new()
            .with_each("insert", statements.iter().map(|s| s.as_ref()))
            .with_opt("lrpSec", lrp.map(|l| l.as_secs()));
        debug!(count = statements.len(), "inserting tuples");
        self.proxy.call("insert", params)?.expect_ok()
    }

    pub fn resource_endpoint(&self) -> ResourceEndpoint {
        endpoint(&self.proxy)
    }

    /// Close the producer; its tuples stay available until they expire.
    pub fn close(&mut self) -> Result<()> {
        self.proxy.close()
    }

    /// Close the producer and discard its tuples.
    pub fn destroy(&mut self) -> Result<()> {
        self.proxy.destroy()
    }
}

/// Republishes tuples gathered from other producers.
#[derive(Debug)]
pub struct SecondaryProducer {
    proxy: ResourceProxy,
}

impl SecondaryProducer {
    pub fn new(ctx: &ClientContext, storage: Storage, supported: SupportedQueries) -> Result<Self> {
        let transport = ctx.servlet_channel(servlets::SECONDARY_PRODUCER, true)?;
        let proxy = ResourceProxy::create(
            Box::new(transport),
            "createSecondaryProducer",
            storage_params(&storage, supported),
        )?;
        info!(connection_id = ?proxy.connection_id(), storage = storage.type_name(), "secondary producer created");
        Ok(Self { proxy })
    }

    /// Declare a table to republish, keeping tuples for `hrp`.
    pub fn declare_table(&mut self, name: &str, predicate: &str, hrp: TimeInterval) -> Result<()> {
        let params = Params::new()
            .with("tableName", name)
            .with("predicate", predicate)
            .with("hrpSec", hrp.as_secs());
        self.proxy.setup("declareTable", params)?.expect_ok()
    }

    /// Keep the producer from being timed out. If the server has lost it,
    /// it is restored instead.
    pub fn show_sign_of_life(&mut self) -> Result<()> {
        match self.proxy.touch("showSignOfLife")? {
            Some(set) => set.expect_ok(),
            None => Ok(()),
        }
    }

    /// Id to pass to [`show_sign_of_life_by_id`](Self::show_sign_of_life_by_id)
    /// and [`close_by_id`](Self::close_by_id).
    pub fn resource_id(&self) -> Option<i64> {
        self.proxy.connection_id()
    }

    /// Keep a producer alive by id. Returns `false` if the server no longer
    /// knows it.
    pub fn show_sign_of_life_by_id(ctx: &ClientContext, resource_id: i64) -> Result<bool> {
        let params = Params::new().with("connectionId", resource_id);
        match raw_call(ctx, servlets::SECONDARY_PRODUCER, "showSignOfLife", &params) {
            Ok(set) => set.expect_ok().map(|()| true),
            Err(CallError::UnknownResource) => Ok(false),
            Err(CallError::Failed(err)) => Err(err),
        }
    }

    /// Close a producer by id.
    pub fn close_by_id(ctx: &ClientContext, resource_id: i64) -> Result<()> {
        let params = Params::new().with("connectionId", resource_id);
        call(ctx, servlets::SECONDARY_PRODUCER, "close", &params)?.expect_ok()
    }

    pub fn resource_endpoint(&self) -> ResourceEndpoint {
        endpoint(&self.proxy)
    }

    pub fn close(&mut self) -> Result<()> {
        self.proxy.close()
    }

    pub fn destroy(&mut self) -> Result<()> {
        self.proxy.destroy()
    }
}

/// Answers queries by calling back into a service at `host_name:port`.
#[derive(Debug)]
pub struct OnDemandProducer {
    proxy: ResourceProxy,
}

impl OnDemandProducer {
    pub fn new(ctx: &ClientContext, host_name: &str, port: u16) -> Result<Self> {
        let transport = ctx.servlet_channel(servlets::ON_DEMAND_PRODUCER, true)?;
        let params = Params::new().with("hostName", host_name).with("port", port);
        let proxy = ResourceProxy::create(Box::new(transport), "createOnDemandProducer", params)?;
        info!(connection_id = ?proxy.connection_id(), host_name, port, "on-demand producer created");
        Ok(Self { proxy })
    }

    pub fn declare_table(&mut self, name: &str, predicate: &str) -> Result<()> {
        let params = Params::new().with("tableName", name).with("predicate", predicate);
        self.proxy.setup("declareTable", params)?.expect_ok()
    }

    pub fn resource_endpoint(&self) -> ResourceEndpoint {
        endpoint(&self.proxy)
    }

    pub fn close(&mut self) -> Result<()> {
        self.proxy.close()
    }

    pub fn destroy(&mut self) -> Result<()> {
        self.proxy.destroy()
    }
}
