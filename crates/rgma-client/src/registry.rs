// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Producer lookup in the registry of one virtual database.

use rgma_protocol::{ClientContext, Params, Result};

use crate::servlets;
use crate::service::call;
use crate::types::ProducerTableEntry;

/// Registry of one virtual database (VDB).
#[derive(Debug, Clone)]
pub struct Registry {
    ctx: ClientContext,
    vdb_name: String,
}

impl Registry {
    pub fn new(ctx: ClientContext, vdb_name: impl Into<String>) -> Self {
        Self {
            ctx,
            vdb_name: vdb_name.into(),
        }
    }

    /// Every producer registered for `table_name`, with its registration details.
    pub fn get_all_producers_for_table(&self, table_name: &str) -> Result<Vec<ProducerTableEntry>> {
        let params = Params::new()
            .with("vdbName", self.vdb_name.as_str())
            .with("tableName", table_name)
            .with("canForward", true);
        let set = call(&self.ctx, servlets::REGISTRY, "getAllProducersForTable", &params)?;
        set.rows().iter().map(ProducerTableEntry::from_tuple).collect()
    }
}
