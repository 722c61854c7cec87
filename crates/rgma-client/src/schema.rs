// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Table, view and index management for one virtual database.

use rgma_protocol::{ClientContext, Params, Result, RgmaError, TupleSet};

use crate::servlets;
use crate::service::call;
use crate::types::{ColumnDefinition, Index, RgmaType, TableDefinition};

/// Whether an `alter` addresses a table or a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableOrView {
    Table,
    View,
}

impl TableOrView {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::View => "view",
        }
    }
}

/// Column change applied by [`Schema::alter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlterAction {
    /// Add a column with an SQL type such as `VARCHAR(20)`.
    Add { column: String, sql_type: String },
    Drop { column: String },
}

/// Schema of one virtual database (VDB).
#[derive(Debug, Clone)]
pub struct Schema {
    ctx: ClientContext,
    vdb_name: String,
}

impl Schema {
    pub fn new(ctx: ClientContext, vdb_name: impl Into<String>) -> Self {
        Self {
            ctx,
            vdb_name: vdb_name.into(),
        }
    }

    pub fn vdb_name(&self) -> &str {
        &self.vdb_name
    }

    fn call(&self, operation: &str, params: Params) -> Result<TupleSet> {
        let mut full = Params::new()
            .with("vdbName", self.vdb_name.as_str())
            .with("canForward", true);
        full.extend(&params);
        call(&self.ctx, servlets::SCHEMA, operation, &full)
    }

    /// Create a table from an SQL `CREATE TABLE` statement, guarded by
    /// the given authorization rules.
    pub fn create_table<S: AsRef<str>>(&self, statement: &str, authz_rules: &[S]) -> Result<()> {
        let params = Params::new()
            .with("createTableStatement", statement)
            .with_each("tableAuthz", authz_rules.iter().map(|r| r.as_ref()));
        self.call("createTable", params)?.expect_ok()
    }

    pub fn drop_table(&self, table_name: &str) -> Result<()> {
        self.call("dropTable", Params::new().with("tableName", table_name))?
            .expect_ok()
    }

    pub fn create_index(&self, statement: &str) -> Result<()> {
        self.call("createIndex", Params::new().with("createIndexStatement", statement))?
            .expect_ok()
    }

    pub fn drop_index(&self, table_name: &str, index_name: &str) -> Result<()> {
        let params = Params::new()
            .with("tableName", table_name)
            .with("indexName", index_name);
        self.call("dropIndex", params)?.expect_ok()
    }

    pub fn create_view<S: AsRef<str>>(&self, statement: &str, authz_rules: &[S]) -> Result<()> {
        let params = Params::new()
            .with("createViewStatement", statement)
            .with_each("viewAuthz", authz_rules.iter().map(|r| r.as_ref()));
        self.call("createView", params)?.expect_ok()
    }

    pub fn drop_view(&self, view_name: &str) -> Result<()> {
        self.call("dropView", Params::new().with("viewName", view_name))?
            .expect_ok()
    }

    /// Add or drop a column of a table or view.
    pub fn alter(&self, target: TableOrView, table_name: &str, action: &AlterAction) -> Result<()> {
        let params = Params::new()
            .with("tableOrView", target.as_str())
            .with("tableName", table_name);
        let params = match action {
            AlterAction::Add { column, sql_type } => params
                .with("action", "add")
                .with("name", column.as_str())
                .with("type", sql_type.as_str()),
            AlterAction::Drop { column } => params.with("action", "drop").with("name", column.as_str()),
        };
        self.call("alter", params)?.expect_ok()
    }

    /// Names of all tables and views.
    pub fn get_all_tables(&self) -> Result<Vec<String>> {
        let set = self.call("getAllTables", Params::new())?;
        set.rows()
            .iter()
            .map(|row| Ok(row.get_string(0)?.to_string()))
            .collect()
    }

    /// Definition of a table or view.
    ///
    /// One row per column: tableName, columnName, type, size, notNull,
    /// primaryKey, viewFor.
    pub fn get_table_definition(&self, table_name: &str) -> Result<TableDefinition> {
        let set = self.call("getTableDefinition", Params::new().with("tableName", table_name))?;
        let first = set
            .rows()
            .first()
            .ok_or_else(|| RgmaError::permanent(format!("No definition returned for table {table_name}")))?;

        let view_for = match first.is_null(6)? {
            true => None,
            false => Some(first.get_string(6)?.to_string()).filter(|v| !v.is_empty()),
        };
        let columns = set
            .rows()
            .iter()
            .map(|row| {
                Ok(ColumnDefinition {
                    name: row.get_string(1)?.to_string(),
                    column_type: row.get_string(2)?.parse::<RgmaType>()?,
                    size: row.get_int(3)?,
                    not_null: row.get_bool(4)?,
                    primary_key: row.get_bool(5)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(TableDefinition {
            table_name: first.get_string(0)?.to_string(),
            view_for,
            columns,
        })
    }

    /// Indexes of a table, in the order the server lists them.
    pub fn get_table_indexes(&self, table_name: &str) -> Result<Vec<Index>> {
        let set = self.call("getTableIndexes", Params::new().with("tableName", table_name))?;
        let mut indexes: Vec<Index> = Vec::new();
        for row in &set {
            let index_name = row.get_string(0)?;
            let column = row.get_string(1)?.to_string();
            match indexes.iter_mut().find(|i| i.index_name == index_name) {
                Some(index) => index.column_names.push(column),
                None => indexes.push(Index {
                    index_name: index_name.to_string(),
                    column_names: vec![column],
                }),
            }
        }
        Ok(indexes)
    }

    /// Replace the authorization rules of a table or view.
    pub fn set_authorization_rules<S: AsRef<str>>(&self, table_name: &str, authz_rules: &[S]) -> Result<()> {
        let params = Params::new()
            .with("tableName", table_name)
            .with_each("tableAuthz", authz_rules.iter().map(|r| r.as_ref()));
        self.call("setAuthorizationRules", params)?.expect_ok()
    }

    pub fn get_authorization_rules(&self, table_name: &str) -> Result<Vec<String>> {
        let set = self.call("getAuthorizationRules", Params::new().with("tableName", table_name))?;
        set.rows()
            .iter()
            .map(|row| Ok(row.get_string(0)?.to_string()))
            .collect()
    }
}
