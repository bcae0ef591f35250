//! Quantity parameter SQL handler.

use crate::error::SearchResult;
use crate::types::SearchValue;

use super::super::query_builder::{SqlFragment, SqlParam};
use super::number::{compare_decimal, parse_number};

/// Handles quantity parameter SQL generation.
pub struct QuantityHandler;

impl QuantityHandler {
    /// Builds SQL for a quantity parameter value.
    ///
    /// Accepted forms: `value`, `value|system|code`, `value||code` and
    /// `value|code`. The code matches either the coded unit or the
    /// human-readable one.
    pub fn build_sql(alias: &str, value: &SearchValue) -> SearchResult<SqlFragment> {
        let mut parts = value.value.splitn(3, '|');
        let number = parse_number(parts.next().unwrap_or_default())?;
        let (system, code) = match (parts.next(), parts.next()) {
            (None, _) => (None, None),
            (Some(code), None) => (None, Some(code)),
            (Some(system), Some(code)) => (Some(system).filter(|s| !s.is_empty()), Some(code)),
        };

        let mut fragment = compare_decimal(&format!("{alias}.value_quantity"), value.prefix, number);

        if let Some(system) = system {
            fragment = fragment.and(SqlFragment::with_params(
                format!("{alias}.value_quantity_system = ?"),
                vec![SqlParam::string(system)],
            ));
        }
        if let Some(code) = code.filter(|c| !c.is_empty()) {
            fragment = fragment.and(SqlFragment::with_params(
                format!("{alias}.value_quantity_code = ? OR {alias}.value_quantity_unit = ?"),
                vec![SqlParam::string(code), SqlParam::string(code)],
            ));
        }

        Ok(fragment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_only() {
        let frag = QuantityHandler::build_sql("si", &SearchValue::parse("gt170")).unwrap();
        assert_eq!(frag.sql, "si.value_quantity > ?");
        assert_eq!(frag.params, vec![SqlParam::integer(170_000_000)]);
    }

    #[test]
    fn test_with_system_and_code() {
        let frag = QuantityHandler::build_sql(
            "si",
            &SearchValue::parse("lt5.4|http://unitsofmeasure.org|mg"),
        )
        .unwrap();
        assert!(frag.sql.contains("value_quantity_system = ?"));
        assert!(frag.sql.contains("value_quantity_code = ?"));
        assert_eq!(frag.params.len(), 4);
    }

    #[test]
    fn test_code_without_system() {
        for raw in ["180|mg/dL", "180||mg/dL"] {
            let frag = QuantityHandler::build_sql("si", &SearchValue::parse(raw)).unwrap();
            assert!(!frag.sql.contains("value_quantity_system"), "{raw}");
            assert!(frag.sql.contains("value_quantity_unit = ?"), "{raw}");
        }
    }
}
