//! String parameter SQL handler.

use crate::search::normalize_string;
use crate::types::{SearchModifier, SearchValue};

use super::super::query_builder::{escape_like, SqlFragment, SqlParam};

/// Handles string parameter SQL generation.
pub struct StringHandler;

impl StringHandler {
    /// Builds SQL for a string parameter value.
    ///
    /// Default behavior is a case- and whitespace-insensitive prefix match.
    pub fn build_sql(
        alias: &str,
        value: &SearchValue,
        modifier: Option<&SearchModifier>,
    ) -> SqlFragment {
        match modifier {
            Some(SearchModifier::Exact) => SqlFragment::with_params(
                format!("{alias}.value_string = ?"),
                vec![SqlParam::string(&value.value)],
            ),
            Some(SearchModifier::Contains) | Some(SearchModifier::Text) => {
                SqlFragment::with_params(
                    format!("{alias}.value_string_norm LIKE ? ESCAPE '\\'"),
                    vec![SqlParam::string(format!(
                        "%{}%",
                        escape_like(&normalize_string(&value.value))
                    ))],
                )
            }
            _ => SqlFragment::with_params(
                format!("{alias}.value_string_norm LIKE ? ESCAPE '\\'"),
                vec![SqlParam::string(format!(
                    "{}%",
                    escape_like(&normalize_string(&value.value))
                ))],
            ),
        }
    }
}
