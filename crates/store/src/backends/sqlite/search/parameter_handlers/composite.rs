//! Composite parameter SQL handler.
//!
//! Each component of a composite is indexed as its own row, and rows taken
//! from the same element share a `composite_group`. A value matches only
//! when every component matches inside one group.

use crate::error::{SearchError, SearchResult};
use crate::types::SearchValue;

use super::super::query_builder::{value_condition, SqlFragment, SqlParam};

/// Handles composite parameter SQL generation.
pub struct CompositeHandler;

impl CompositeHandler {
    /// Selects the ids of resources with a group matching any of `values`.
    pub fn build_sql(
        resource_type: &str,
        param_name: &str,
        values: &[SearchValue],
    ) -> SearchResult<SqlFragment> {
        let components: Vec<&str> = values
            .first()
            .map(|v| v.components.iter().map(|c| c.code.as_str()).collect())
            .unwrap_or_default();
        if components.is_empty() {
            return Err(SearchError::InvalidComposite {
                message: format!("{param_name} has no component values"),
            });
        }

        let mut sql = String::from("SELECT c0.resource_id FROM search_index c0");
        for i in 1..components.len() {
            sql.push_str(&format!(
                " JOIN search_index c{i} ON c{i}.resource_type = c0.resource_type \
                 AND c{i}.resource_id = c0.resource_id AND c{i}.param_name = c0.param_name \
                 AND c{i}.composite_group = c0.composite_group"
            ));
        }
        sql.push_str(" WHERE c0.resource_type = ? AND c0.param_name = ?");
        let mut params = vec![
            SqlParam::string(resource_type),
            SqlParam::string(param_name),
        ];
        for (i, code) in components.iter().enumerate() {
            sql.push_str(&format!(" AND c{i}.component = ?"));
            params.push(SqlParam::string(*code));
        }

        let mut alternatives = Vec::new();
        for value in values {
            if value.components.len() != components.len() {
                return Err(SearchError::InvalidComposite {
                    message: format!("{param_name} values must all have {} components", components.len()),
                });
            }
            let mut all = SqlFragment::default();
            for (i, component) in value.components.iter().enumerate() {
                let alias = format!("c{i}");
                all = all.and(value_condition(
                    &alias,
                    component.param_type,
                    &component.value,
                    None,
                    None,
                )?);
            }
            alternatives.push(all);
        }

        let mut fragment = SqlFragment::with_params(sql, params);
        if let Some(any) = SqlFragment::any(alternatives) {
            fragment.sql.push_str(&format!(" AND ({})", any.sql));
            fragment.params.extend(any.params);
        }
        Ok(fragment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CompositeValue, SearchParamType};

    fn code_value(code: &str, quantity: &str) -> SearchValue {
        SearchValue {
            components: vec![
                CompositeValue {
                    code: "code".to_string(),
                    param_type: SearchParamType::Token,
                    value: SearchValue::eq(code),
                },
                CompositeValue {
                    code: "value-quantity".to_string(),
                    param_type: SearchParamType::Quantity,
                    value: SearchValue::parse(quantity),
                },
            ],
            ..SearchValue::eq(format!("{code}${quantity}"))
        }
    }

    #[test]
    fn test_components_join_on_group() {
        let frag = CompositeHandler::build_sql(
            "Observation",
            "code-value-quantity",
            &[code_value("http://loinc.org|2339-0", "gt170")],
        )
        .unwrap();
        assert!(frag.sql.contains("c1.composite_group = c0.composite_group"));
        assert!(frag.sql.contains("c0.token_code = ?"));
        assert!(frag.sql.contains("c1.value_quantity > ?"));
        assert_eq!(frag.sql.matches('?').count(), frag.params.len());
    }

    #[test]
    fn test_values_are_ored() {
        let frag = CompositeHandler::build_sql(
            "Observation",
            "code-value-quantity",
            &[code_value("a", "1"), code_value("b", "2")],
        )
        .unwrap();
        assert!(frag.sql.contains(") OR ("));
    }

    #[test]
    fn test_empty_components_rejected() {
        assert!(CompositeHandler::build_sql("Observation", "x", &[SearchValue::eq("a")]).is_err());
    }
}
