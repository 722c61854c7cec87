// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Operation parameters and their query-string encoding.
//!
//! Values are percent-encoded byte by byte: ASCII letters, digits and `.`
//! pass through, everything else becomes `%XX` with uppercase hex digits.

use std::fmt;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

/// Bytes left unescaped in parameter names and values.
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC.remove(b'.');

/// A single parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Text(String),
    Int(i64),
    Bool(bool),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{}", utf8_percent_encode(s, QUERY_VALUE)),
            Self::Int(n) => write!(f, "{}", n),
            Self::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&String> for ParamValue {
    fn from(value: &String) -> Self {
        Self::Text(value.clone())
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

macro_rules! int_param {
    ($($t:ty),*) => {
        $(impl From<$t> for ParamValue {
            fn from(value: $t) -> Self {
                Self::Int(i64::from(value))
            }
        })*
    };
}

int_param!(i32, i64, u16, u32);

/// Ordered list of operation parameters. Names may repeat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    pairs: Vec<(String, ParamValue)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter (builder style).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.push(name, value);
        self
    }

    /// Append a parameter only when a value is present.
    pub fn with_opt<V: Into<ParamValue>>(mut self, name: impl Into<String>, value: Option<V>) -> Self {
        if let Some(value) = value {
            self.push(name, value);
        }
        self
    }

    /// Append one parameter per value, all under the same name.
    pub fn with_each<I, V>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<ParamValue>,
    {
        for value in values {
            self.push(name, value);
        }
        self
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.pairs.push((name.into(), value.into()));
    }

    /// Append every pair from `other`, preserving order.
    pub fn extend(&mut self, other: &Params) {
        self.pairs.extend(other.pairs.iter().cloned());
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.pairs.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Render the query string: `?` before the first pair, `&` before the rest.
    /// An empty list renders as an empty string.
    pub fn encode(&self) -> String {
        let mut out = String::new();
        for (i, (name, value)) in self.pairs.iter().enumerate() {
            out.push(if i == 0 { '?' } else { '&' });
            out.push_str(&utf8_percent_encode(name, QUERY_VALUE).to_string());
            out.push('=');
            out.push_str(&value.to_string());
        }
        out
    }
}
