// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tabular results returned by servlet operations.

use std::str::FromStr;

use crate::error::{Result, RgmaError};

/// One row of a [`TupleSet`]. Cells are nullable strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tuple {
    cells: Vec<Option<String>>,
}

impl Tuple {
    pub fn new(cells: Vec<Option<String>>) -> Self {
        Self { cells }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cells(&self) -> &[Option<String>] {
        &self.cells
    }

    fn cell(&self, offset: usize) -> Result<Option<&str>> {
        self.cells
            .get(offset)
            .map(Option::as_deref)
            .ok_or_else(|| {
                RgmaError::permanent(format!(
                    "column offset must be between 0 and {}",
                    self.cells.len().saturating_sub(1)
                ))
            })
    }

    fn parse_cell<T: FromStr + Default>(&self, offset: usize, type_name: &str) -> Result<T> {
        match self.cell(offset)? {
            None => Ok(T::default()),
            Some(text) => text.trim().parse().map_err(|_| {
                RgmaError::permanent(format!(
                    "Column {offset} ({text}) is not representable as type '{type_name}'"
                ))
            }),
        }
    }

    /// Text of the cell; a null cell reads as the empty string.
    pub fn get_string(&self, offset: usize) -> Result<&str> {
        Ok(self.cell(offset)?.unwrap_or(""))
    }

    /// A null cell reads as 0.
    pub fn get_int(&self, offset: usize) -> Result<i32> {
        self.parse_cell(offset, "int")
    }

    pub fn get_long(&self, offset: usize) -> Result<i64> {
        self.parse_cell(offset, "long")
    }

    pub fn get_float(&self, offset: usize) -> Result<f32> {
        self.parse_cell(offset, "float")
    }

    pub fn get_double(&self, offset: usize) -> Result<f64> {
        self.parse_cell(offset, "double")
    }

    /// Accepts `true`/`false` in any case; a null cell reads as false.
    pub fn get_bool(&self, offset: usize) -> Result<bool> {
        match self.cell(offset)? {
            None => Ok(false),
            Some(text) if text.eq_ignore_ascii_case("true") => Ok(true),
            Some(text) if text.eq_ignore_ascii_case("false") => Ok(false),
            Some(text) => Err(RgmaError::permanent(format!(
                "Column {offset} ({text}) is not representable as type 'bool'"
            ))),
        }
    }

    pub fn is_null(&self, offset: usize) -> Result<bool> {
        Ok(self.cell(offset)?.is_none())
    }
}

/// Decoded result of one servlet operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TupleSet {
    rows: Vec<Tuple>,
    warning: String,
    end_of_results: bool,
}

impl TupleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: Vec<Tuple>) -> Self {
        Self {
            rows,
            ..Default::default()
        }
    }

    pub fn rows(&self) -> &[Tuple] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Tuple> {
        self.rows
    }

    pub fn push(&mut self, row: Tuple) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column count of the first row, 0 for an empty set.
    pub fn num_cols(&self) -> usize {
        self.rows.first().map_or(0, Tuple::len)
    }

    /// Never absent; empty when the server sent no warning.
    pub fn warning(&self) -> &str {
        &self.warning
    }

    pub fn set_warning(&mut self, warning: impl Into<String>) {
        self.warning = warning.into();
    }

    /// Add to the warning, separated from any existing text by one space.
    pub fn append_warning(&mut self, warning: &str) {
        if self.warning.is_empty() {
            self.warning = warning.to_string();
        } else {
            self.warning.push(' ');
            self.warning.push_str(warning);
        }
    }

    pub fn is_end_of_results(&self) -> bool {
        self.end_of_results
    }

    pub fn set_end_of_results(&mut self, end_of_results: bool) {
        self.end_of_results = end_of_results;
    }

    /// First cell of the first row, if there is one.
    pub fn first_cell(&self) -> Option<Option<&str>> {
        self.rows
            .first()
            .and_then(|row| row.cells.first())
            .map(Option::as_deref)
    }

    /// Succeeds only when the set holds the single status cell `OK`.
    pub fn expect_ok(&self) -> Result<()> {
        match self.first_cell() {
            Some(Some("OK")) => Ok(()),
            _ => Err(RgmaError::permanent("Failed to return status of OK")),
        }
    }
}

impl<'a> IntoIterator for &'a TupleSet {
    type Item = &'a Tuple;
    type IntoIter = std::slice::Iter<'a, Tuple>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[Option<&str>]) -> Tuple {
        Tuple::new(cells.iter().map(|c| c.map(str::to_string)).collect())
    }

    #[test]
    fn test_typed_getters() {
        let t = row(&[Some("alice"), Some("2.5"), Some("42"), Some("TRUE"), Some("false")]);
        assert_eq!(t.get_string(0).unwrap(), "alice");
        assert!((t.get_float(1).unwrap() - 2.5).abs() < 1e-6);
        assert!((t.get_double(1).unwrap() - 2.5).abs() < 1e-12);
        assert_eq!(t.get_int(2).unwrap(), 42);
        assert_eq!(t.get_long(2).unwrap(), 42);
        assert!(t.get_bool(3).unwrap());
        assert!(!t.get_bool(4).unwrap());
    }

    #[test]
    fn test_null_cells_read_as_defaults() {
        let t = row(&[None]);
        assert!(t.is_null(0).unwrap());
        assert_eq!(t.get_string(0).unwrap(), "");
        assert_eq!(t.get_int(0).unwrap(), 0);
        assert_eq!(t.get_double(0).unwrap(), 0.0);
        assert!(!t.get_bool(0).unwrap());
    }

    #[test]
    fn test_unconvertible_cell_is_permanent() {
        let t = row(&[Some("bob")]);
        let err = t.get_int(0).unwrap_err();
        assert!(err.is_permanent());
        assert_eq!(
            err.message(),
            "Column 0 (bob) is not representable as type 'int'"
        );
        assert!(t.get_bool(0).is_err());
    }

    #[test]
    fn test_offset_out_of_range() {
        let t = row(&[Some("a"), Some("b")]);
        let err = t.get_string(2).unwrap_err();
        assert_eq!(err.message(), "column offset must be between 0 and 1");
    }

    #[test]
    fn test_append_warning_joins_with_space() {
        let mut set = TupleSet::new();
        assert_eq!(set.warning(), "");
        set.append_warning("first");
        set.append_warning("second");
        assert_eq!(set.warning(), "first second");
    }

    #[test]
    fn test_expect_ok() {
        let ok = TupleSet::from_rows(vec![row(&[Some("OK")])]);
        assert!(ok.expect_ok().is_ok());

        let not_ok = TupleSet::from_rows(vec![row(&[Some("NO")])]);
        assert_eq!(
            not_ok.expect_ok().unwrap_err().message(),
            "Failed to return status of OK"
        );
        assert!(TupleSet::new().expect_ok().is_err());
    }

    #[test]
    fn test_iteration_and_columns() {
        let set = TupleSet::from_rows(vec![row(&[Some("a"), None]), row(&[None, Some("b")])]);
        assert_eq!(set.num_cols(), 2);
        let nulls: usize = (&set)
            .into_iter()
            .map(|r| r.cells().iter().filter(|c| c.is_none()).count())
            .sum();
        assert_eq!(nulls, 2);
    }
}
