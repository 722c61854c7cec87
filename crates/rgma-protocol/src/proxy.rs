// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Client-side handle for one server-side resource.
//!
//! The server may forget a resource at any time (restart, expiry). When a
//! call is answered with "unknown resource" the proxy re-creates it,
//! replays every setup call made so far in the original order, and retries
//! the failed call once. A second "unknown resource" is reported as a
//! temporary error.
//!
//! ```text
//!  Uninitialized --open--> Live --close/destroy--> Dead
//!                           |  ^
//!                  unknown  |  | re-create + replay recipe
//!                  resource v  |
//!                          restore
//! ```

use tracing::{debug, info, instrument, warn};

use crate::error::{CallError, Result, RgmaError};
use crate::params::Params;
use crate::transport::Transport;
use crate::tuple::TupleSet;

const NOT_RETURNED: &str = "Requested value was not returned by the servlet.";
const DEAD_RESOURCE: &str = "This resource cannot be reused after you have closed or destroyed it.";
const QUERY_RESTARTED: &str = "The query was restarted - many duplicates may be returned.";
const POP_AFTER_END: &str = "You have called pop again after end of results returned.";

/// Lifecycle of a [`ResourceProxy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    /// Created locally; the creation call has not succeeded yet.
    Uninitialized,
    Live { connection_id: i64 },
    /// Closed or destroyed. Terminal.
    Dead,
}

/// An operation name plus the parameters it was sent with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupCall {
    pub operation: String,
    pub params: Params,
}

impl SetupCall {
    pub fn new(operation: impl Into<String>, params: Params) -> Self {
        Self {
            operation: operation.into(),
            params,
        }
    }
}

/// Restore-and-retry wrapper around one server-side resource.
pub struct ResourceProxy {
    transport: Box<dyn Transport>,
    creation: SetupCall,
    recipe: Vec<SetupCall>,
    state: ResourceState,
    end_of_results_seen: bool,
}

impl std::fmt::Debug for ResourceProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceProxy")
            .field("url", &self.transport.url())
            .field("creation", &self.creation.operation)
            .field("recipe", &self.recipe.len())
            .field("state", &self.state)
            .finish()
    }
}

impl ResourceProxy {
    /// A proxy that will create its resource with `operation` on [`open`](Self::open).
    pub fn new(transport: Box<dyn Transport>, operation: impl Into<String>, params: Params) -> Self {
        Self {
            transport,
            creation: SetupCall::new(operation, params),
            recipe: Vec::new(),
            state: ResourceState::Uninitialized,
            end_of_results_seen: false,
        }
    }

    /// [`new`](Self::new) followed by [`open`](Self::open).
    pub fn create(transport: Box<dyn Transport>, operation: impl Into<String>, params: Params) -> Result<Self> {
        let mut proxy = Self::new(transport, operation, params);
        proxy.open()?;
        Ok(proxy)
    }

    /// Send the creation call and go live with the returned connection id.
    pub fn open(&mut self) -> Result<i64> {
        match self.state {
            ResourceState::Uninitialized => {}
            ResourceState::Live { connection_id } => return Ok(connection_id),
            ResourceState::Dead => return Err(RgmaError::permanent(DEAD_RESOURCE)),
        }
        let connection_id = self.create_remote()?;
        self.state = ResourceState::Live { connection_id };
        Ok(connection_id)
    }

    pub fn state(&self) -> ResourceState {
        self.state
    }

    pub fn connection_id(&self) -> Option<i64> {
        match self.state {
            ResourceState::Live { connection_id } => Some(connection_id),
            _ => None,
        }
    }

    pub fn url(&self) -> &str {
        self.transport.url()
    }

    /// Setup calls replayed on restore, oldest first.
    pub fn recipe(&self) -> &[SetupCall] {
        &self.recipe
    }

    /// Run a configuration call and remember it for future restores.
    pub fn setup(&mut self, operation: &str, params: Params) -> Result<TupleSet> {
        let (set, _) = self.invoke(operation, &params)?;
        self.recipe.push(SetupCall::new(operation, params));
        Ok(set)
    }

    /// Run an ordinary call.
    pub fn call(&mut self, operation: &str, params: Params) -> Result<TupleSet> {
        if operation == "insert" || operation == "insertList" {
            let (set, restored) = self.invoke(operation, &params)?;
            if restored {
                warn!(url = %self.url(), "insert resent after restore; rows may be duplicated");
            }
            return Ok(set);
        }
        self.invoke(operation, &params).map(|(set, _)| set)
    }

    /// Fetch up to `max_count` tuples from a query resource.
    ///
    /// A pop issued after end of results was returned, or one that had to
    /// restart the query, succeeds with a warning on the returned set.
    pub fn pop(&mut self, max_count: i32) -> Result<TupleSet> {
        let already_ended = self.end_of_results_seen;
        let (mut set, restored) = self.invoke("pop", &Params::new().with("maxCount", max_count))?;
        if already_ended {
            set.append_warning(POP_AFTER_END);
        }
        self.end_of_results_seen = set.is_end_of_results();
        if restored {
            set.append_warning(QUERY_RESTARTED);
        }
        Ok(set)
    }

    /// Run a keep-alive style call. If the resource is unknown it is
    /// restored and the call is not repeated; `Ok(None)` reports that case.
    pub fn touch(&mut self, operation: &str) -> Result<Option<TupleSet>> {
        let params = Params::new();
        match self.attempt(operation, &params) {
            Ok(set) => Ok(Some(set)),
            Err(CallError::UnknownResource) => {
                warn!(url = %self.url(), operation, "resource unknown to server, restoring");
                self.restore().map_err(RgmaError::from)?;
                Ok(None)
            }
            Err(CallError::Failed(err)) => Err(err),
        }
    }

    /// Close the server-side resource; data already published stays.
    pub fn close(&mut self) -> Result<()> {
        self.finish("close")
    }

    /// Close the server-side resource and discard its data.
    pub fn destroy(&mut self) -> Result<()> {
        self.finish("destroy")
    }

    fn finish(&mut self, operation: &str) -> Result<()> {
        match self.attempt(operation, &Params::new()) {
            Ok(set) => set.expect_ok()?,
            Err(CallError::UnknownResource) => debug!(operation, "resource already gone"),
            Err(CallError::Failed(err)) => return Err(err),
        }
        info!(url = %self.url(), operation, "resource released");
        self.transport.disconnect();
        self.state = ResourceState::Dead;
        Ok(())
    }

    /// One attempt, plus one restore and retry if the resource is unknown.
    /// The flag reports whether a restore happened.
    #[instrument(skip(self, params), fields(url = %self.transport.url()))]
    fn invoke(&mut self, operation: &str, params: &Params) -> Result<(TupleSet, bool)> {
        match self.attempt(operation, params) {
            Ok(set) => Ok((set, false)),
            Err(CallError::UnknownResource) => {
                warn!("resource unknown to server, restoring");
                self.restore()?;
                let set = self.attempt(operation, params)?;
                Ok((set, true))
            }
            Err(CallError::Failed(err)) => Err(err),
        }
    }

    /// Send `operation` for the current connection id.
    fn attempt(&mut self, operation: &str, params: &Params) -> std::result::Result<TupleSet, CallError> {
        let connection_id = match self.state {
            ResourceState::Live { connection_id } => connection_id,
            ResourceState::Dead => return Err(RgmaError::permanent(DEAD_RESOURCE).into()),
            ResourceState::Uninitialized => {
                return Err(RgmaError::permanent("resource has not been created").into());
            }
        };
        let mut full = Params::new().with("connectionId", connection_id);
        full.extend(params);
        self.transport.execute(operation, &full)
    }

    /// Re-create the resource and replay the recipe.
    fn restore(&mut self) -> std::result::Result<(), CallError> {
        let connection_id = self.create_remote()?;
        self.state = ResourceState::Live { connection_id };
        info!(connection_id, url = %self.url(), "resource re-created");

        for call in self.recipe.clone() {
            debug!(operation = %call.operation, "replaying setup call");
            self.attempt(&call.operation, &call.params)?;
        }
        Ok(())
    }

    fn create_remote(&mut self) -> Result<i64> {
        let set = self
            .transport
            .execute(&self.creation.operation, &self.creation.params)?;
        let connection_id = set
            .first_cell()
            .flatten()
            .and_then(|cell| cell.trim().parse::<i64>().ok())
            .ok_or_else(|| RgmaError::permanent(NOT_RETURNED))?;
        info!(connection_id, url = %self.url(), operation = %self.creation.operation, "resource created");
        Ok(connection_id)
    }
}

impl Drop for ResourceProxy {
    fn drop(&mut self) {
        self.transport.disconnect();
    }
}
