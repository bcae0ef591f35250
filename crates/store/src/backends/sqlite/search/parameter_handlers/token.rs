//! Token parameter SQL handler.

use crate::search::normalize_string;
use crate::types::{SearchModifier, SearchValue};

use super::super::query_builder::{escape_like, SqlFragment, SqlParam};

/// Handles token parameter SQL generation.
pub struct TokenHandler;

impl TokenHandler {
    /// Builds SQL for a token parameter value.
    ///
    /// Token values can be:
    /// - `code` - matches any system
    /// - `system|code` - matches specific system and code
    /// - `|code` - matches code with no system
    /// - `system|` - matches any code in system
    ///
    /// With `:of-type` (identifiers) the value is `type-system|type-code|value`.
    /// `:not` is applied by the query builder as a complement of this match.
    pub fn build_sql(
        alias: &str,
        value: &SearchValue,
        modifier: Option<&SearchModifier>,
    ) -> SqlFragment {
        match modifier {
            Some(SearchModifier::Text) => SqlFragment::with_params(
                format!("{alias}.token_display LIKE ? ESCAPE '\\'"),
                vec![SqlParam::string(format!(
                    "%{}%",
                    escape_like(&normalize_string(&value.value))
                ))],
            ),
            Some(SearchModifier::OfType) => Self::build_of_type_sql(alias, &value.value),
            _ => Self::build_system_code_sql(alias, &value.value),
        }
    }

    /// Builds the `(system, code)` comparison shared by tokens and
    /// reference `:identifier` searches.
    pub fn build_system_code_sql(alias: &str, token: &str) -> SqlFragment {
        match token.split_once('|') {
            None => SqlFragment::with_params(
                format!("{alias}.token_code = ?"),
                vec![SqlParam::string(token)],
            ),
            Some(("", code)) => SqlFragment::with_params(
                format!("{alias}.token_system IS NULL AND {alias}.token_code = ?"),
                vec![SqlParam::string(code)],
            ),
            Some((system, "")) => SqlFragment::with_params(
                format!("{alias}.token_system = ?"),
                vec![SqlParam::string(system)],
            ),
            Some((system, code)) => SqlFragment::with_params(
                format!("{alias}.token_system = ? AND {alias}.token_code = ?"),
                vec![SqlParam::string(system), SqlParam::string(code)],
            ),
        }
    }

    fn build_of_type_sql(alias: &str, token: &str) -> SqlFragment {
        let mut parts = token.splitn(3, '|');
        let type_system = parts.next().unwrap_or_default();
        let type_code = parts.next().unwrap_or_default();
        let identifier = parts.next().unwrap_or_default();
        SqlFragment::with_params(
            format!(
                "{alias}.token_type_system = ? AND {alias}.token_type_code = ? AND {alias}.token_code = ?"
            ),
            vec![
                SqlParam::string(type_system),
                SqlParam::string(type_code),
                SqlParam::string(identifier),
            ],
        )
    }
}
