// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Value types used by the typed clients.

use std::fmt;
use std::str::FromStr;

use rgma_protocol::{Result, RgmaError, Tuple};
use serde::{Deserialize, Serialize};

/// Largest interval the server accepts, in seconds.
pub const MAX_INTERVAL_SECS: u64 = i32::MAX as u64;

/// Units for [`TimeInterval`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    pub fn seconds(&self) -> u64 {
        match self {
            Self::Seconds => 1,
            Self::Minutes => 60,
            Self::Hours => 60 * 60,
            Self::Days => 24 * 60 * 60,
        }
    }
}

/// A non-negative length of time with one-second resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeInterval {
    secs: u64,
}

impl TimeInterval {
    /// Fails if the interval exceeds [`MAX_INTERVAL_SECS`].
    pub fn new(value: u64, unit: TimeUnit) -> Result<Self> {
        value
            .checked_mul(unit.seconds())
            .filter(|secs| *secs <= MAX_INTERVAL_SECS)
            .map(|secs| Self { secs })
            .ok_or_else(|| {
                RgmaError::permanent(format!("Interval is larger than {MAX_INTERVAL_SECS} seconds"))
            })
    }

    pub fn from_secs(secs: u64) -> Result<Self> {
        Self::new(secs, TimeUnit::Seconds)
    }

    /// Length in `unit`, rounded down.
    pub fn value_as(&self, unit: TimeUnit) -> u64 {
        self.secs / unit.seconds()
    }

    pub fn as_secs(&self) -> i64 {
        self.secs as i64
    }
}

impl fmt::Display for TimeInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.secs)
    }
}

/// Query kinds a consumer can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QueryType {
    /// Tuples as they are published
    Continuous,
    /// All retained tuples
    History,
    /// The most recent tuple per primary key
    Latest,
    /// One-off query against a database-backed store
    Static,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Continuous => "continuous",
            Self::History => "history",
            Self::Latest => "latest",
            Self::Static => "static",
        }
    }
}

/// Query kinds that accept a look-back interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QueryTypeWithInterval {
    Continuous,
    History,
    Latest,
}

impl From<QueryTypeWithInterval> for QueryType {
    fn from(query_type: QueryTypeWithInterval) -> Self {
        match query_type {
            QueryTypeWithInterval::Continuous => Self::Continuous,
            QueryTypeWithInterval::History => Self::History,
            QueryTypeWithInterval::Latest => Self::Latest,
        }
    }
}

/// Where a producer keeps its tuples.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Storage {
    Memory,
    /// Database storage; a logical name makes the store reusable.
    Database { logical_name: Option<String> },
}

impl Storage {
    /// Named database storage. The name may not be empty.
    pub fn database(logical_name: impl Into<String>) -> Result<Self> {
        let logical_name = logical_name.into();
        if logical_name.is_empty() {
            return Err(RgmaError::permanent("Logical name may not be empty string"));
        }
        Ok(Self::Database {
            logical_name: Some(logical_name),
        })
    }

    /// Anonymous database storage.
    pub fn temporary_database() -> Self {
        Self::Database { logical_name: None }
    }

    pub fn is_database(&self) -> bool {
        matches!(self, Self::Database { .. })
    }

    pub fn type_name(&self) -> &'static str {
        if self.is_database() { "database" } else { "memory" }
    }

    pub fn logical_name(&self) -> Option<&str> {
        match self {
            Self::Database { logical_name } => logical_name.as_deref(),
            Self::Memory => None,
        }
    }
}

/// Query kinds a producer answers. Continuous queries are always supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SupportedQueries {
    C,
    CH,
    CL,
    CHL,
}

impl SupportedQueries {
    pub fn is_continuous(&self) -> bool {
        true
    }

    pub fn is_history(&self) -> bool {
        matches!(self, Self::CH | Self::CHL)
    }

    pub fn is_latest(&self) -> bool {
        matches!(self, Self::CL | Self::CHL)
    }
}

/// Address of a resource: servlet URL plus connection id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceEndpoint {
    pub url: String,
    pub resource_id: i64,
}

impl ResourceEndpoint {
    pub fn new(url: impl Into<String>, resource_id: i64) -> Self {
        Self {
            url: url.into(),
            resource_id,
        }
    }

    /// Wire form used by `producerConnections`.
    pub(crate) fn to_connection_param(&self) -> String {
        format!("{} {}", self.resource_id, self.url)
    }
}

impl fmt::Display for ResourceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceEndpoint[{}:{}]", self.url, self.resource_id)
    }
}

/// Registry information about one producer of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducerTableEntry {
    pub endpoint: ResourceEndpoint,
    pub is_secondary: bool,
    pub is_continuous: bool,
    pub is_static: bool,
    pub is_history: bool,
    pub is_latest: bool,
    pub predicate: String,
    pub retention_period_secs: i64,
}

impl ProducerTableEntry {
    /// Row layout: url, id, isSecondary, isContinuous, isStatic, isHistory,
    /// isLatest, predicate, hrpSec.
    pub(crate) fn from_tuple(row: &Tuple) -> Result<Self> {
        Ok(Self {
            endpoint: ResourceEndpoint::new(row.get_string(0)?, row.get_long(1)?),
            is_secondary: row.get_bool(2)?,
            is_continuous: row.get_bool(3)?,
            is_static: row.get_bool(4)?,
            is_history: row.get_bool(5)?,
            is_latest: row.get_bool(6)?,
            predicate: row.get_string(7)?.to_string(),
            retention_period_secs: row.get_long(8)?,
        })
    }
}

/// A named, persistent tuple store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TupleStore {
    pub logical_name: String,
    pub is_history: bool,
    pub is_latest: bool,
}

/// SQL column types known to the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RgmaType {
    Integer,
    Real,
    Double,
    Char,
    Varchar,
    Timestamp,
    Date,
    Time,
}

impl RgmaType {
    /// JDBC type code.
    pub fn code(&self) -> i32 {
        match self {
            Self::Integer => 4,
            Self::Real => 7,
            Self::Double => 8,
            Self::Char => 1,
            Self::Varchar => 12,
            Self::Timestamp => 93,
            Self::Date => 91,
            Self::Time => 92,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
            Self::Double => "DOUBLE",
            Self::Char => "CHAR",
            Self::Varchar => "VARCHAR",
            Self::Timestamp => "TIMESTAMP",
            Self::Date => "DATE",
            Self::Time => "TIME",
        }
    }
}

impl FromStr for RgmaType {
    type Err = RgmaError;

    /// Accepts the type name (any case) or its JDBC code.
    fn from_str(s: &str) -> Result<Self> {
        const ALL: [RgmaType; 8] = [
            RgmaType::Integer,
            RgmaType::Real,
            RgmaType::Double,
            RgmaType::Char,
            RgmaType::Varchar,
            RgmaType::Timestamp,
            RgmaType::Date,
            RgmaType::Time,
        ];
        let s = s.trim();
        let code = s.parse::<i32>().ok();
        ALL.into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s) || Some(t.code()) == code)
            .ok_or_else(|| RgmaError::permanent(format!("Unknown column type '{s}'")))
    }
}

impl fmt::Display for RgmaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One column of a table definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDefinition {
    pub name: String,
    pub column_type: RgmaType,
    /// Declared width, 0 when the type has none.
    pub size: i32,
    pub not_null: bool,
    pub primary_key: bool,
}

/// Definition of a table or view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDefinition {
    pub table_name: String,
    /// Underlying table when this is a view.
    pub view_for: Option<String>,
    pub columns: Vec<ColumnDefinition>,
}

impl TableDefinition {
    pub fn is_view(&self) -> bool {
        self.view_for.is_some()
    }
}

/// An index and the columns it covers, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Index {
    pub index_name: String,
    pub column_names: Vec<String>,
}
