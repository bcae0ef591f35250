//! URI parameter SQL handler.

use crate::types::{SearchModifier, SearchValue};

use super::super::query_builder::{escape_like, SqlFragment, SqlParam};

/// Handles URI parameter SQL generation.
pub struct UriHandler;

impl UriHandler {
    /// Builds SQL for a URI parameter value.
    ///
    /// `:below` matches stored URIs that start with the value, `:above`
    /// stored URIs the value starts with.
    pub fn build_sql(
        alias: &str,
        value: &SearchValue,
        modifier: Option<&SearchModifier>,
    ) -> SqlFragment {
        match modifier {
            Some(SearchModifier::Below) => SqlFragment::with_params(
                format!("{alias}.value_uri LIKE ? ESCAPE '\\'"),
                vec![SqlParam::string(format!("{}%", escape_like(&value.value)))],
            ),
            Some(SearchModifier::Above) => SqlFragment::with_params(
                format!("substr(?, 1, length({alias}.value_uri)) = {alias}.value_uri"),
                vec![SqlParam::string(&value.value)],
            ),
            Some(SearchModifier::Contains) => SqlFragment::with_params(
                format!("{alias}.value_uri LIKE ? ESCAPE '\\'"),
                vec![SqlParam::string(format!("%{}%", escape_like(&value.value)))],
            ),
            _ => SqlFragment::with_params(
                format!("{alias}.value_uri = ?"),
                vec![SqlParam::string(&value.value)],
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_exact() {
        let frag = UriHandler::build_sql("si", &SearchValue::eq("http://x.org/fhir/vs"), None);
        assert_eq!(frag.sql, "si.value_uri = ?");
    }

    #[test]
    fn test_uri_below() {
        let frag = UriHandler::build_sql(
            "si",
            &SearchValue::eq("http://x.org/fhir"),
            Some(&SearchModifier::Below),
        );
        assert_eq!(frag.params, vec![SqlParam::string("http://x.org/fhir%")]);
    }

    #[test]
    fn test_uri_above_compares_stored_prefix() {
        let frag = UriHandler::build_sql(
            "si",
            &SearchValue::eq("http://x.org/fhir/vs/1"),
            Some(&SearchModifier::Above),
        );
        assert!(frag.sql.starts_with("substr(?"));
    }
}
