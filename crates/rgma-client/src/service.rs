// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Calls that address a servlet rather than a resource, and the
//! server-wide `RGMAService` operations.

use rgma_protocol::{CallError, ClientContext, Params, Result, RgmaError, Transport, Tuple, TupleSet};
use tracing::debug;

use crate::servlets;
use crate::types::{TimeInterval, TupleStore};

/// Run one operation on a fresh, non-persistent connection.
///
/// An unknown-resource answer is passed through so callers can give it
/// their own meaning.
pub(crate) fn raw_call(
    ctx: &ClientContext,
    servlet: &str,
    operation: &str,
    params: &Params,
) -> std::result::Result<TupleSet, CallError> {
    let mut channel = ctx.servlet_channel(servlet, false)?;
    debug!(servlet, operation, "service call");
    channel.execute(operation, params)
}

/// [`raw_call`] with unknown-resource answers reported as temporary errors.
pub(crate) fn call(ctx: &ClientContext, servlet: &str, operation: &str, params: &Params) -> Result<TupleSet> {
    Ok(raw_call(ctx, servlet, operation, params)?)
}

/// Server-wide information and tuple-store administration.
#[derive(Debug, Clone)]
pub struct RgmaService {
    ctx: ClientContext,
}

impl RgmaService {
    pub fn new(ctx: ClientContext) -> Self {
        Self { ctx }
    }

    fn call(&self, operation: &str, params: Params) -> Result<TupleSet> {
        call(&self.ctx, servlets::SERVICE, operation, &params)
    }

    /// Version string of the server.
    pub fn get_version(&self) -> Result<String> {
        let set = self.call("getVersion", Params::new())?;
        single_string(&set)
    }

    /// Tuple stores owned by the caller.
    pub fn list_tuple_stores(&self) -> Result<Vec<TupleStore>> {
        let set = self.call("listTupleStores", Params::new())?;
        set.rows()
            .iter()
            .map(|row| {
                Ok(TupleStore {
                    logical_name: row.get_string(0)?.to_string(),
                    is_history: row.get_bool(1)?,
                    is_latest: row.get_bool(2)?,
                })
            })
            .collect()
    }

    /// Idle time after which the server closes a resource.
    pub fn get_termination_interval(&self) -> Result<TimeInterval> {
        let set = self.call("getTerminationInterval", Params::new())?;
        let secs = first_row(&set)?.get_long(0)?;
        TimeInterval::from_secs(secs.max(0) as u64)
    }

    /// Permanently delete a named tuple store.
    pub fn drop_tuple_store(&self, logical_name: &str) -> Result<()> {
        self.call("dropTupleStore", Params::new().with("logicalName", logical_name))?
            .expect_ok()
    }
}

pub(crate) fn first_row(set: &TupleSet) -> Result<&Tuple> {
    set.rows()
        .first()
        .ok_or_else(|| RgmaError::permanent("Requested value was not returned by the servlet."))
}

pub(crate) fn single_string(set: &TupleSet) -> Result<String> {
    Ok(first_row(set)?.get_string(0)?.to_string())
}
