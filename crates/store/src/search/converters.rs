//! Value converters for the search index.
//!
//! Turns the JSON nodes reached by a catalog path into typed
//! [`IndexValue`]s. Each FHIR data type maps onto the index columns of one
//! parameter type: a HumanName yields several strings, a CodeableConcept one
//! token per coding, a Period one date range, and so on.

use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{DateRange, SearchParamType};

use super::errors::ExtractionError;
use super::reference::{normalize_reference, ReferenceKey};

/// A value extracted and converted for the search index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IndexValue {
    /// String value; `normalized` is what default and `:contains` searches compare.
    String {
        /// The value as written.
        raw: String,
        /// Case-folded, whitespace-trimmed form.
        normalized: String,
    },

    /// Coded value.
    Token {
        /// Code system (or identifier system, or contact point system).
        system: Option<String>,
        /// Code (or identifier value). `None` for text-only concepts.
        code: Option<String>,
        /// Display text for `:text`.
        display: Option<String>,
        /// Identifier type system for `:of-type`.
        type_system: Option<String>,
        /// Identifier type code for `:of-type`.
        type_code: Option<String>,
    },

    /// Date, dateTime, instant or Period as a covering range.
    Date(DateRange),

    /// Decimal or integer.
    Number(Decimal),

    /// Quantity with its unit.
    Quantity {
        /// Numeric value.
        value: Decimal,
        /// Human-readable unit.
        unit: Option<String>,
        /// Unit system.
        system: Option<String>,
        /// Coded unit.
        code: Option<String>,
    },

    /// Reference to another resource.
    Reference {
        /// The reference as written.
        reference: Option<String>,
        /// The normalized target, when the reference resolves to one.
        target: Option<ReferenceKey>,
        /// `Reference.identifier.system`.
        identifier_system: Option<String>,
        /// `Reference.identifier.value`.
        identifier_value: Option<String>,
    },

    /// URI value.
    Uri(String),
}

impl IndexValue {
    /// Creates a string value, computing its normalized form.
    pub fn string(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let normalized = normalize_string(&raw);
        IndexValue::String { raw, normalized }
    }

    /// Creates a token with system and code.
    pub fn token(system: Option<String>, code: impl Into<String>) -> Self {
        IndexValue::Token {
            system,
            code: Some(code.into()),
            display: None,
            type_system: None,
            type_code: None,
        }
    }

    /// Creates a typed reference value.
    pub fn reference(target: ReferenceKey) -> Self {
        IndexValue::Reference {
            reference: Some(target.to_string()),
            target: Some(target),
            identifier_system: None,
            identifier_value: None,
        }
    }

    /// Returns the parameter type this value indexes.
    pub fn param_type(&self) -> SearchParamType {
        match self {
            IndexValue::String { .. } => SearchParamType::String,
            IndexValue::Token { .. } => SearchParamType::Token,
            IndexValue::Date(_) => SearchParamType::Date,
            IndexValue::Number(_) => SearchParamType::Number,
            IndexValue::Quantity { .. } => SearchParamType::Quantity,
            IndexValue::Reference { .. } => SearchParamType::Reference,
            IndexValue::Uri(_) => SearchParamType::Uri,
        }
    }
}

/// Case-folds and trims a string the way string searches compare it.
pub fn normalize_string(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Fractional digits kept when numbers and quantities are indexed.
pub const FIXED_POINT_SCALE: u32 = 6;

/// Shifts a decimal left by [`FIXED_POINT_SCALE`] digits, or `None` on overflow.
pub fn shift_to_fixed_point(value: Decimal) -> Option<Decimal> {
    value.checked_mul(Decimal::from(10_i64.pow(FIXED_POINT_SCALE)))
}

/// The fixed-point integer a decimal is indexed as.
///
/// Returns `None` when the value does not fit in an `i64` at this scale.
pub fn to_fixed_point(value: Decimal) -> Option<i64> {
    shift_to_fixed_point(value)?.round().to_i64()
}

/// Parses a decimal in plain or scientific notation.
pub fn parse_decimal(s: &str) -> Option<Decimal> {
    let s = s.trim();
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .ok()
}

/// Converter for JSON nodes to index values.
pub struct ValueConverter;

impl ValueConverter {
    /// Converts one node reached by a catalog path.
    ///
    /// `default_target` is the reference type inferred from the parameter
    /// when a reference carries none. Shapes that do not fit the parameter
    /// type produce no values; values of the right shape that cannot be
    /// parsed produce an error.
    pub fn convert(
        value: &Value,
        target_type: SearchParamType,
        param_name: &str,
        default_target: Option<&str>,
    ) -> Result<Vec<IndexValue>, ExtractionError> {
        match value {
            Value::Array(items) => {
                let mut results = Vec::new();
                for item in items {
                    results.extend(Self::convert(item, target_type, param_name, default_target)?);
                }
                Ok(results)
            }
            _ => match target_type {
                SearchParamType::String => Ok(Self::convert_to_string(value)),
                SearchParamType::Token => Ok(Self::convert_to_token(value)),
                SearchParamType::Date => Self::convert_to_date(value, param_name),
                SearchParamType::Number => Self::convert_to_number(value, param_name),
                SearchParamType::Quantity => Self::convert_to_quantity(value, param_name),
                SearchParamType::Reference => Ok(Self::convert_to_reference(value, default_target)),
                SearchParamType::Uri => Ok(Self::convert_to_uri(value)),
                // Composites are assembled from their components by the extractor.
                SearchParamType::Composite => Ok(Vec::new()),
            },
        }
    }

    fn convert_to_string(value: &Value) -> Vec<IndexValue> {
        let mut results = Vec::new();
        match value {
            Value::String(s) if !s.trim().is_empty() => results.push(IndexValue::string(s)),
            Value::Object(obj) => {
                // HumanName
                push_str(&mut results, obj, "family");
                push_str_array(&mut results, obj, "given");
                push_str_array(&mut results, obj, "prefix");
                push_str_array(&mut results, obj, "suffix");
                push_str(&mut results, obj, "text");

                // Address
                push_str_array(&mut results, obj, "line");
                push_str(&mut results, obj, "city");
                push_str(&mut results, obj, "district");
                push_str(&mut results, obj, "state");
                push_str(&mut results, obj, "postalCode");
                push_str(&mut results, obj, "country");
            }
            _ => {}
        }
        results
    }

    fn convert_to_token(value: &Value) -> Vec<IndexValue> {
        let mut results = Vec::new();

        match value {
            Value::String(s) if !s.is_empty() => results.push(IndexValue::token(None, s.clone())),
            Value::Bool(b) => results.push(IndexValue::token(None, b.to_string())),
            Value::Object(obj) => {
                if let Some(codings) = obj.get("coding").and_then(Value::as_array) {
                    // CodeableConcept: one row per coding
                    for coding in codings.iter().filter_map(Value::as_object) {
                        if let Some(token) = coding_token(coding) {
                            results.push(token);
                        }
                    }
                    if let Some(text) = str_field(obj, "text") {
                        results.push(IndexValue::Token {
                            system: None,
                            code: None,
                            display: Some(text),
                            type_system: None,
                            type_code: None,
                        });
                    }
                } else if obj.contains_key("code") {
                    // Coding
                    if let Some(token) = coding_token(obj) {
                        results.push(token);
                    }
                } else if let Some(val) = str_field(obj, "value") {
                    // Identifier or ContactPoint
                    let (type_system, type_code) = obj
                        .get("type")
                        .and_then(|t| t.get("coding"))
                        .and_then(Value::as_array)
                        .and_then(|codings| codings.first())
                        .and_then(Value::as_object)
                        .map(|coding| (str_field(coding, "system"), str_field(coding, "code")))
                        .unwrap_or((None, None));
                    results.push(IndexValue::Token {
                        system: str_field(obj, "system"),
                        code: Some(val),
                        display: None,
                        type_system,
                        type_code,
                    });
                }
            }
            _ => {}
        }

        results
    }

    fn convert_to_date(value: &Value, param_name: &str) -> Result<Vec<IndexValue>, ExtractionError> {
        let parse = |s: &str| {
            DateRange::parse(s).map_err(|_| ExtractionError::conversion(param_name, "date", s))
        };

        match value {
            Value::String(s) => Ok(vec![IndexValue::Date(parse(s)?)]),
            Value::Object(obj) => {
                // Period, or Timing.repeat.boundsPeriod
                let period = obj
                    .get("repeat")
                    .and_then(|r| r.get("boundsPeriod"))
                    .and_then(Value::as_object)
                    .unwrap_or(obj);
                let start = period.get("start").and_then(Value::as_str);
                let end = period.get("end").and_then(Value::as_str);
                if start.is_none() && end.is_none() {
                    if let Some(events) = obj.get("event").and_then(Value::as_array) {
                        return events
                            .iter()
                            .filter_map(Value::as_str)
                            .map(|e| parse(e).map(IndexValue::Date))
                            .collect();
                    }
                    return Ok(Vec::new());
                }
                let range = DateRange::from_period(start, end).map_err(|_| {
                    ExtractionError::conversion(param_name, "period", Value::Object(period.clone()))
                })?;
                Ok(vec![IndexValue::Date(range)])
            }
            _ => Ok(Vec::new()),
        }
    }

    fn convert_to_number(value: &Value, param_name: &str) -> Result<Vec<IndexValue>, ExtractionError> {
        let text = match value {
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.clone(),
            _ => return Ok(Vec::new()),
        };
        parse_decimal(&text)
            .map(|d| vec![IndexValue::Number(d)])
            .ok_or_else(|| ExtractionError::conversion(param_name, "number", text))
    }

    fn convert_to_quantity(
        value: &Value,
        param_name: &str,
    ) -> Result<Vec<IndexValue>, ExtractionError> {
        let Value::Object(obj) = value else {
            return Ok(Vec::new());
        };
        let Some(raw) = obj.get("value") else {
            return Ok(Vec::new());
        };
        let text = match raw {
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let value = parse_decimal(&text)
            .ok_or_else(|| ExtractionError::conversion(param_name, "quantity", &text))?;

        Ok(vec![IndexValue::Quantity {
            value,
            unit: str_field(obj, "unit"),
            system: str_field(obj, "system"),
            code: str_field(obj, "code"),
        }])
    }

    fn convert_to_reference(value: &Value, default_target: Option<&str>) -> Vec<IndexValue> {
        match value {
            Value::String(s) => normalize_reference(s, default_target)
                .map(|target| IndexValue::Reference {
                    reference: Some(s.clone()),
                    target: Some(target),
                    identifier_system: None,
                    identifier_value: None,
                })
                .into_iter()
                .collect(),
            Value::Object(obj) => {
                let reference = str_field(obj, "reference");
                let target = reference.as_deref().and_then(|r| {
                    let inferred = str_field(obj, "type");
                    normalize_reference(r, inferred.as_deref().or(default_target))
                });
                let identifier = obj.get("identifier").and_then(Value::as_object);
                let identifier_value = identifier.and_then(|i| str_field(i, "value"));

                if target.is_none() && identifier_value.is_none() {
                    return Vec::new();
                }
                vec![IndexValue::Reference {
                    reference,
                    target,
                    identifier_system: identifier.and_then(|i| str_field(i, "system")),
                    identifier_value,
                }]
            }
            _ => Vec::new(),
        }
    }

    fn convert_to_uri(value: &Value) -> Vec<IndexValue> {
        match value {
            Value::String(s) if !s.is_empty() => vec![IndexValue::Uri(s.clone())],
            _ => Vec::new(),
        }
    }
}

fn str_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn push_str(results: &mut Vec<IndexValue>, obj: &Map<String, Value>, key: &str) {
    if let Some(s) = str_field(obj, key) {
        results.push(IndexValue::string(s));
    }
}

fn push_str_array(results: &mut Vec<IndexValue>, obj: &Map<String, Value>, key: &str) {
    if let Some(items) = obj.get(key).and_then(Value::as_array) {
        for item in items.iter().filter_map(Value::as_str) {
            if !item.is_empty() {
                results.push(IndexValue::string(item));
            }
        }
    }
}

fn coding_token(coding: &Map<String, Value>) -> Option<IndexValue> {
    let system = str_field(coding, "system");
    let code = str_field(coding, "code");
    if system.is_none() && code.is_none() {
        return None;
    }
    Some(IndexValue::Token {
        system,
        code,
        display: str_field(coding, "display"),
        type_system: None,
        type_code: None,
    })
}
