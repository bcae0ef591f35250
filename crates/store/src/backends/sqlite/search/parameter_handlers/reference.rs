//! Reference parameter SQL handler.

use crate::search::normalize_reference;
use crate::types::{SearchModifier, SearchValue};

use super::super::query_builder::{SqlFragment, SqlParam};
use super::token::TokenHandler;

/// Handles reference parameter SQL generation.
pub struct ReferenceHandler;

impl ReferenceHandler {
    /// Builds SQL for a reference parameter value.
    ///
    /// `id`, `Type/id` and absolute URLs are normalized the same way the
    /// extractor normalizes stored references. `default_type` is the
    /// parameter's only target, if it has exactly one.
    pub fn build_sql(
        alias: &str,
        value: &SearchValue,
        modifier: Option<&SearchModifier>,
        default_type: Option<&str>,
    ) -> SqlFragment {
        match modifier {
            Some(SearchModifier::Identifier) => {
                TokenHandler::build_system_code_sql(alias, &value.value)
            }
            Some(SearchModifier::Type(target)) => {
                let id = normalize_reference(&value.value, Some(target))
                    .filter(|key| key.resource_type.as_deref() == Some(target.as_str()))
                    .map(|key| key.id)
                    .unwrap_or_else(|| value.value.clone());
                Self::typed(alias, target, &id)
            }
            _ => match normalize_reference(&value.value, default_type) {
                Some(key) => match key.typed() {
                    Some((rt, id)) => Self::typed(alias, rt, id),
                    None => SqlFragment::with_params(
                        format!("{alias}.ref_id = ?"),
                        vec![SqlParam::string(key.id)],
                    ),
                },
                None => SqlFragment::with_params(
                    format!("{alias}.ref_url = ?"),
                    vec![SqlParam::string(&value.value)],
                ),
            },
        }
    }

    fn typed(alias: &str, resource_type: &str, id: &str) -> SqlFragment {
        SqlFragment::with_params(
            format!("{alias}.ref_type = ? AND {alias}.ref_id = ?"),
            vec![SqlParam::string(resource_type), SqlParam::string(id)],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_forms_compare_equal() {
        let expected = ReferenceHandler::build_sql("si", &SearchValue::eq("Patient/123"), None, None);
        for raw in ["http://x/Patient/123", "Patient/123/_history/2"] {
            assert_eq!(
                ReferenceHandler::build_sql("si", &SearchValue::eq(raw), None, None),
                expected,
                "{raw}"
            );
        }
        assert_eq!(
            ReferenceHandler::build_sql("si", &SearchValue::eq("123"), None, Some("Patient")),
            expected
        );
    }

    #[test]
    fn test_bare_id_without_single_target() {
        let frag = ReferenceHandler::build_sql("si", &SearchValue::eq("123"), None, None);
        assert_eq!(frag.sql, "si.ref_id = ?");
    }

    #[test]
    fn test_type_modifier() {
        let frag = ReferenceHandler::build_sql(
            "si",
            &SearchValue::eq("123"),
            Some(&SearchModifier::Type("Patient".to_string())),
            None,
        );
        assert_eq!(
            frag.params,
            vec![SqlParam::string("Patient"), SqlParam::string("123")]
        );
    }

    #[test]
    fn test_identifier_modifier() {
        let frag = ReferenceHandler::build_sql(
            "si",
            &SearchValue::eq("http://hospital.org/mrn|12345"),
            Some(&SearchModifier::Identifier),
            None,
        );
        assert_eq!(frag.sql, "si.token_system = ? AND si.token_code = ?");
    }
}
