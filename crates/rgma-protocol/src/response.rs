// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Interpretation of decoded servlet responses.
//!
//! A response root is one of:
//!
//! | Tag | Meaning                | Attributes                                   |
//! |-----|------------------------|----------------------------------------------|
//! | `r` | tuple set              | `c` columns (1), `r` rows (1), `m` warning   |
//! | `t` | temporary exception    | `m` message, `o` successful operations (0)   |
//! | `p` | permanent exception    | `m` message, `o` successful operations (0)   |
//! | `u` | unknown resource       |                                              |
//!
//! Tuple set children are `<v>text</v>` (value), `<n/>` (null) and a
//! trailing `<e/>` (end of results).

use tracing::debug;

use crate::error::{CallError, RgmaError};
use crate::tuple::{Tuple, TupleSet};
use crate::xml::{self, Element};

const NO_ROOT: &str = "Bad XML returned by the R-GMA server - no root";
const NOT_A_RESPONSE: &str = "Bad XML returned by the R-GMA server - neither response nor exception";

/// Decode and interpret a raw response body.
pub fn decode_response(body: &str) -> Result<TupleSet, CallError> {
    let root = xml::parse(body).map_err(|err| {
        debug!(error = %err, body_len = body.len(), "undecodable servlet response");
        RgmaError::temporary(NO_ROOT)
    })?;
    interpret(&root)
}

/// Turn a decoded root element into a tuple set or a classified failure.
pub fn interpret(root: &Element) -> Result<TupleSet, CallError> {
    match root.name.as_str() {
        "r" => Ok(interpret_tuple_set(root)?),
        "t" => Err(RgmaError::Temporary {
            message: root.attribute("m").unwrap_or_default().to_string(),
            num_successful_ops: count_attribute(root, "o", 0) as u32,
        }
        .into()),
        "p" => Err(RgmaError::Permanent {
            message: root.attribute("m").unwrap_or_default().to_string(),
            num_successful_ops: count_attribute(root, "o", 0) as u32,
        }
        .into()),
        "u" => Err(CallError::UnknownResource),
        other => {
            debug!(tag = other, "unexpected response root");
            Err(RgmaError::temporary(NOT_A_RESPONSE).into())
        }
    }
}

fn interpret_tuple_set(root: &Element) -> Result<TupleSet, RgmaError> {
    let num_cols = count_attribute(root, "c", 1);
    let num_rows = count_attribute(root, "r", 1);

    let mut set = TupleSet::new();
    set.set_warning(root.attribute("m").unwrap_or_default());

    let mut row: Vec<Option<String>> = Vec::with_capacity(num_cols);
    for child in &root.children {
        let cell = match child.name.as_str() {
            "e" => {
                set.set_end_of_results(true);
                continue;
            }
            "v" => Some(child.data().unwrap_or_default().to_string()),
            "n" => None,
            other => {
                return Err(RgmaError::permanent(format!(
                    "Unexpected element <{other}> in XML tuple set"
                )));
            }
        };
        if row.is_empty() && set.len() == num_rows {
            return Err(RgmaError::permanent(
                "More data returned in XML tuple set than specified in header",
            ));
        }
        row.push(cell);
        if row.len() == num_cols {
            set.push(Tuple::new(std::mem::take(&mut row)));
        }
    }

    if !row.is_empty() {
        return Err(RgmaError::permanent("Incomplete XML tuple set"));
    }
    Ok(set)
}

/// Non-negative integer attribute; unparsable text counts as 0.
fn count_attribute(element: &Element, name: &str, default: usize) -> usize {
    element
        .attribute(name)
        .map_or(default, |v| v.trim().parse().unwrap_or(0))
}

/// Serialize a tuple set in the servlet response format.
pub fn encode_response(set: &TupleSet) -> String {
    let mut out = format!(
        r#"<r c="{}" r="{}" m="{}">"#,
        set.num_cols(),
        set.len(),
        xml::escape(set.warning())
    );
    for row in set {
        for cell in row.cells() {
            match cell {
                Some(text) => {
                    out.push_str("<v>");
                    out.push_str(&xml::escape(text));
                    out.push_str("</v>");
                }
                None => out.push_str("<n/>"),
            }
        }
    }
    if set.is_end_of_results() {
        out.push_str("<e/>");
    }
    out.push_str("</r>");
    out
}

/// Serialize a failure in the servlet response format.
pub fn encode_error(err: &CallError) -> String {
    match err {
        CallError::UnknownResource => "<u/>".to_string(),
        CallError::Failed(err) => format!(
            r#"<{} m="{}" o="{}"/>"#,
            if err.is_temporary() { "t" } else { "p" },
            xml::escape(err.message()),
            err.num_successful_ops()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(s: &str) -> Option<String> {
        Some(s.to_string())
    }

    #[test]
    fn test_single_connection_id() {
        let set = decode_response(r#"<r c="1" r="1"><v>42</v></r>"#).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.rows()[0].get_int(0).unwrap(), 42);
        assert_eq!(set.warning(), "");
        assert!(!set.is_end_of_results());
    }

    #[test]
    fn test_two_rows_with_null_and_end_marker() {
        let body = r#"<r c="4" r="2" m=""><v>alice</v><v>hi</v><v>3.14</v><v>42</v><v>bob</v><n/><v>2.7</v><v>1</v><e/></r>"#;
        let set = decode_response(body).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(
            set.rows()[0].cells(),
            &[cell("alice"), cell("hi"), cell("3.14"), cell("42")]
        );
        assert_eq!(
            set.rows()[1].cells(),
            &[cell("bob"), None, cell("2.7"), cell("1")]
        );
        assert!(set.rows()[1].is_null(1).unwrap());
        assert!(set.is_end_of_results());
    }

    #[test]
    fn test_defaults_for_missing_attributes() {
        let set = decode_response("<r><v>OK</v></r>").unwrap();
        assert_eq!(set.num_cols(), 1);
        assert!(set.expect_ok().is_ok());
    }

    #[test]
    fn test_warning_attribute() {
        let set = decode_response(r#"<r c="1" r="0" m="slow &amp; steady"></r>"#).unwrap();
        assert!(set.is_empty());
        assert_eq!(set.warning(), "slow & steady");
    }

    #[test]
    fn test_more_rows_than_declared_is_permanent() {
        let err = decode_response(r#"<r c="1" r="1"><v>1</v><v>2</v></r>"#).unwrap_err();
        assert_eq!(
            err,
            CallError::Failed(RgmaError::permanent(
                "More data returned in XML tuple set than specified in header"
            ))
        );
    }

    #[test]
    fn test_fewer_rows_than_declared_is_accepted() {
        let set = decode_response(r#"<r c="1" r="5"><v>1</v></r>"#).unwrap();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_unfinished_row_is_permanent() {
        let err = decode_response(r#"<r c="2" r="1"><v>1</v></r>"#).unwrap_err();
        assert_eq!(
            err,
            CallError::Failed(RgmaError::permanent("Incomplete XML tuple set"))
        );
    }

    #[test]
    fn test_unexpected_cell_element_is_permanent() {
        let err: RgmaError = decode_response(r#"<r c="1"><x/></r>"#).unwrap_err().into();
        assert!(err.is_permanent());
    }

    #[test]
    fn test_exceptions() {
        let err = decode_response(r#"<t m="Server busy"/>"#).unwrap_err();
        assert_eq!(err, CallError::Failed(RgmaError::temporary("Server busy")));

        let err = decode_response(r#"<p m="Duplicate key" o="3"/>"#).unwrap_err();
        assert_eq!(
            err,
            CallError::Failed(RgmaError::Permanent {
                message: "Duplicate key".to_string(),
                num_successful_ops: 3,
            })
        );
    }

    #[test]
    fn test_unknown_resource() {
        assert_eq!(
            decode_response("<u/>").unwrap_err(),
            CallError::UnknownResource
        );
    }

    #[test]
    fn test_unrecognized_root_is_temporary() {
        let err: RgmaError = decode_response("<html></html>").unwrap_err().into();
        assert_eq!(err, RgmaError::temporary(NOT_A_RESPONSE));
    }

    #[test]
    fn test_undecodable_body_is_temporary() {
        for body in ["", "<r><v>1</r>", "Internal Server Error"] {
            let err: RgmaError = decode_response(body).unwrap_err().into();
            assert_eq!(err, RgmaError::temporary(NO_ROOT), "body {body:?}");
        }
    }

    #[test]
    fn test_round_trip_preserves_tuple_sets() {
        let mut empty = TupleSet::new();
        empty.set_warning("nothing yet");

        let mut mixed = TupleSet::from_rows(vec![
            Tuple::new(vec![cell("a <b>"), None, cell("")]),
            Tuple::new(vec![None, cell("it's \"quoted\""), cell("  padded  ")]),
        ]);
        mixed.set_warning("partial & late");
        mixed.set_end_of_results(true);

        let single = TupleSet::from_rows(vec![Tuple::new(vec![cell("OK")])]);

        for original in [empty, mixed, single] {
            let decoded = decode_response(&encode_response(&original)).unwrap();
            assert_eq!(decoded, original);
        }
    }

    #[test]
    fn test_encode_error_round_trip() {
        let errors = [
            CallError::UnknownResource,
            CallError::Failed(RgmaError::temporary("try <later>")),
            CallError::Failed(RgmaError::Permanent {
                message: "bad insert".to_string(),
                num_successful_ops: 7,
            }),
        ];
        for err in errors {
            assert_eq!(decode_response(&encode_error(&err)).unwrap_err(), err);
        }
    }
}
