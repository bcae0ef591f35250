//! Query translator.
//!
//! Converts query-string pairs into a typed [`SearchQuery`], resolving every
//! parameter against the catalog:
//!
//! - `name[:modifier]=value[,value]` with prefixes on number, date and quantity
//! - chains (`subject:Patient.name=x`, up to a fixed depth)
//! - reverse chains (`_has:Observation:patient:code=x`)
//! - composites (`code-value-quantity=http://loinc.org|2339-0$gt170`)
//! - control parameters (`_count`, `_offset`, `_sort`, `_total`, `_summary`,
//!   `_elements`, `_include`, `_revinclude`)
//!
//! Unknown parameters are rejected rather than ignored.

use std::sync::Arc;

use tracing::debug;

use crate::catalog::{ParamCatalog, SearchParamDef};
use crate::error::{SearchError, SearchResult};
use crate::types::{
    CompositeValue, DateRange, IncludeDirective, IncludeType, ReverseChainedParameter,
    SearchModifier, SearchParamType, SearchParameter, SearchPrefix, SearchQuery, SearchValue,
    SortDirective, SummaryMode, TotalMode,
};

use super::converters::parse_decimal;
use super::reference::is_resource_type_name;

/// Default maximum number of `.` hops in a chained parameter.
pub const DEFAULT_MAX_CHAIN_DEPTH: usize = 3;

/// Parameters that are accepted and ignored.
const IGNORED_PARAMS: &[&str] = &["_format", "_pretty"];

/// Translates query parameters into a [`SearchQuery`].
#[derive(Debug, Clone)]
pub struct QueryTranslator {
    catalog: Arc<ParamCatalog>,
    max_chain_depth: usize,
    default_count: u32,
    max_count: u32,
}

impl QueryTranslator {
    /// Creates a translator with default page limits (20, capped at 1000).
    pub fn new(catalog: Arc<ParamCatalog>) -> Self {
        Self {
            catalog,
            max_chain_depth: DEFAULT_MAX_CHAIN_DEPTH,
            default_count: 20,
            max_count: 1000,
        }
    }

    /// Sets the default and maximum page size.
    pub fn with_page_limits(mut self, default_count: u32, max_count: u32) -> Self {
        self.default_count = default_count.min(max_count);
        self.max_count = max_count;
        self
    }

    /// Sets the maximum chain depth.
    pub fn with_max_chain_depth(mut self, depth: usize) -> Self {
        self.max_chain_depth = depth.max(1);
        self
    }

    /// Returns the catalog.
    pub fn catalog(&self) -> &Arc<ParamCatalog> {
        &self.catalog
    }

    /// Translates a raw (URL-encoded) query string.
    pub fn translate_query_string(
        &self,
        resource_type: &str,
        query_string: &str,
    ) -> SearchResult<SearchQuery> {
        let pairs = parse_query_string(query_string);
        self.translate(resource_type, &pairs)
    }

    /// Translates decoded `(name, value)` pairs.
    ///
    /// Repeated names are AND-ed; comma-separated values within one pair are OR-ed.
    pub fn translate(
        &self,
        resource_type: &str,
        params: &[(String, String)],
    ) -> SearchResult<SearchQuery> {
        let mut query = SearchQuery::new(resource_type);

        for (name, value) in params {
            match name.as_str() {
                "_count" => {
                    let count = parse_u32(name, value)?;
                    query.count = Some(count.min(self.max_count));
                }
                "_offset" => query.offset = Some(parse_u32(name, value)?),
                "_sort" => {
                    query.sort = value
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(|key| self.resolve_sort(resource_type, key))
                        .collect::<SearchResult<_>>()?;
                }
                "_total" => {
                    query.total = Some(value.parse::<TotalMode>().map_err(|message| {
                        SearchError::InvalidValue {
                            name: name.clone(),
                            value: value.clone(),
                            message,
                        }
                    })?);
                }
                "_summary" => {
                    query.summary = Some(value.parse::<SummaryMode>().map_err(|message| {
                        SearchError::InvalidValue {
                            name: name.clone(),
                            value: value.clone(),
                            message,
                        }
                    })?);
                }
                "_elements" => {
                    query.elements = value
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect();
                }
                "_include" | "_include:iterate" | "_revinclude" | "_revinclude:iterate" => {
                    let directive = self.parse_include(resource_type, name, value)?;
                    query.includes.push(directive);
                }
                n if IGNORED_PARAMS.contains(&n) => {}
                n if n.starts_with("_has:") => {
                    query
                        .reverse_chains
                        .push(self.parse_has(resource_type, name, value)?);
                }
                _ => {
                    query
                        .parameters
                        .push(self.parse_parameter(resource_type, name, value, 0)?);
                }
            }
        }

        if query.count.is_none() {
            query.count = Some(self.default_count);
        }

        debug!(
            resource_type,
            parameters = query.parameters.len(),
            reverse_chains = query.reverse_chains.len(),
            includes = query.includes.len(),
            "Translated search query"
        );

        Ok(query)
    }

    /// Parses one search parameter, following chains.
    fn parse_parameter(
        &self,
        resource_type: &str,
        key: &str,
        raw_value: &str,
        depth: usize,
    ) -> SearchResult<SearchParameter> {
        if let Some((head, rest)) = key.split_once('.') {
            return self.parse_chain(resource_type, key, head, rest, raw_value, depth);
        }

        let (name, modifier) = split_modifier(key)?;
        let def = self.lookup(resource_type, name)?;
        let modifier = match modifier {
            Some(m) if !m.is_valid_for(def.param_type) => {
                return Err(SearchError::UnsupportedModifier {
                    modifier: m.to_string(),
                    param_type: def.param_type.to_string(),
                });
            }
            Some(SearchModifier::Type(t)) if !def.allows_target(&t) => {
                return Err(SearchError::InvalidValue {
                    name: key.to_string(),
                    value: raw_value.to_string(),
                    message: format!("{t} is not a target of {name}"),
                });
            }
            other => other,
        };

        if modifier == Some(SearchModifier::Missing) {
            return match raw_value {
                "true" | "false" => Ok(SearchParameter {
                    name: name.to_string(),
                    param_type: def.param_type,
                    modifier,
                    values: vec![SearchValue::eq(raw_value)],
                    chain: None,
                }),
                _ => Err(SearchError::InvalidValue {
                    name: key.to_string(),
                    value: raw_value.to_string(),
                    message: ":missing takes true or false".to_string(),
                }),
            };
        }

        // :above/:below on quantities are ge/le comparisons.
        let (modifier, implied_prefix) = match (def.param_type, &modifier) {
            (SearchParamType::Quantity, Some(SearchModifier::Above)) => (None, Some(SearchPrefix::Ge)),
            (SearchParamType::Quantity, Some(SearchModifier::Below)) => (None, Some(SearchPrefix::Le)),
            _ => (modifier, None),
        };

        let mut values = Vec::new();
        for part in split_unescaped(raw_value, ',') {
            let value = if def.param_type == SearchParamType::Composite {
                self.parse_composite_value(def, &part)?
            } else {
                let mut value = parse_value(name, def.param_type, &part)?;
                if let Some(prefix) = implied_prefix {
                    if value.prefix == SearchPrefix::Eq {
                        value.prefix = prefix;
                    }
                }
                value
            };
            if modifier == Some(SearchModifier::OfType) && value.value.split('|').count() != 3 {
                return Err(SearchError::InvalidValue {
                    name: key.to_string(),
                    value: part,
                    message: ":of-type takes system|code|value".to_string(),
                });
            }
            values.push(value);
        }
        if values.is_empty() {
            return Err(SearchError::InvalidValue {
                name: key.to_string(),
                value: raw_value.to_string(),
                message: "no value given".to_string(),
            });
        }

        Ok(SearchParameter {
            name: name.to_string(),
            param_type: def.param_type,
            modifier,
            values,
            chain: None,
        })
    }

    fn parse_chain(
        &self,
        resource_type: &str,
        key: &str,
        head: &str,
        rest: &str,
        raw_value: &str,
        depth: usize,
    ) -> SearchResult<SearchParameter> {
        let invalid = |message: String| SearchError::InvalidChain {
            chain: key.to_string(),
            message,
        };

        if depth + 1 > self.max_chain_depth {
            return Err(invalid(format!(
                "chains are limited to {} levels",
                self.max_chain_depth
            )));
        }

        let (name, modifier) = split_modifier(head)?;
        let def = self.lookup(resource_type, name)?;
        if def.param_type != SearchParamType::Reference {
            return Err(invalid(format!("{name} is not a reference parameter")));
        }

        let inner_name = rest
            .split(['.', ':'])
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| invalid("missing chained parameter".to_string()))?;

        let target_types: Vec<String> = match modifier {
            Some(SearchModifier::Type(t)) => {
                if !def.allows_target(&t) {
                    return Err(invalid(format!("{t} is not a target of {name}")));
                }
                vec![t]
            }
            Some(other) => {
                return Err(invalid(format!("modifier '{other}' cannot be chained")));
            }
            None if def.targets.is_empty() => {
                return Err(invalid(format!(
                    "{name} can point at any type; name one with {name}:[Type]"
                )));
            }
            None => def
                .targets
                .iter()
                .filter(|t| self.catalog.get(t, inner_name).is_some())
                .cloned()
                .collect(),
        };

        let Some(first) = target_types.first() else {
            return Err(invalid(format!(
                "no target of {name} declares parameter '{inner_name}'"
            )));
        };

        let inner = self.parse_parameter(first, rest, raw_value, depth + 1)?;

        // Keep only targets where the inner parameter has the same type.
        let target_types = target_types
            .iter()
            .filter(|t| {
                self.catalog
                    .get(t, &inner.name)
                    .is_some_and(|d| d.param_type == inner.param_type)
            })
            .cloned()
            .collect();

        Ok(SearchParameter {
            name: name.to_string(),
            param_type: SearchParamType::Reference,
            modifier: None,
            values: Vec::new(),
            chain: Some(crate::types::ChainedParameter {
                target_types,
                inner: Box::new(inner),
            }),
        })
    }

    fn parse_has(
        &self,
        resource_type: &str,
        key: &str,
        raw_value: &str,
    ) -> SearchResult<ReverseChainedParameter> {
        let invalid = |message: &str| SearchError::InvalidChain {
            chain: key.to_string(),
            message: message.to_string(),
        };

        let body = key.strip_prefix("_has:").unwrap_or(key);
        let mut parts = body.splitn(3, ':');
        let (Some(source_type), Some(reference_param), Some(inner_key)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid(
                "expected _has:[type]:[reference-param]:[search-param]",
            ));
        };
        if inner_key.starts_with("_has") {
            return Err(invalid("nested _has is not supported"));
        }
        if !is_resource_type_name(source_type) {
            return Err(invalid("source type is not a resource type"));
        }

        let reference = self.lookup(source_type, reference_param)?;
        if reference.param_type != SearchParamType::Reference {
            return Err(invalid("the linking parameter is not a reference"));
        }
        if !reference.allows_target(resource_type) {
            return Err(SearchError::InvalidChain {
                chain: key.to_string(),
                message: format!(
                    "{source_type}.{reference_param} cannot point at {resource_type}"
                ),
            });
        }

        let inner = self.parse_parameter(source_type, inner_key, raw_value, 1)?;
        Ok(ReverseChainedParameter {
            source_type: source_type.to_string(),
            reference_param: reference_param.to_string(),
            inner,
        })
    }

    fn parse_include(
        &self,
        resource_type: &str,
        name: &str,
        value: &str,
    ) -> SearchResult<IncludeDirective> {
        let include_type = if name.starts_with("_revinclude") {
            IncludeType::Revinclude
        } else {
            IncludeType::Include
        };
        let mut iterate = name.ends_with(":iterate");
        let invalid = |message: String| SearchError::InvalidInclude {
            directive: name.to_string(),
            value: value.to_string(),
            message,
        };

        let mut parts: Vec<&str> = value.split(':').collect();
        if parts.last() == Some(&"iterate") {
            parts.pop();
            iterate = true;
        }
        let (source_type, search_param, target_type) = match parts.as_slice() {
            [source, param] => (*source, *param, None),
            [source, param, target] => (*source, *param, Some(*target)),
            _ => {
                return Err(invalid(
                    "expected [source-type]:[search-param][:target-type]".to_string(),
                ));
            }
        };

        if !is_resource_type_name(source_type) {
            return Err(invalid(format!("'{source_type}' is not a resource type")));
        }
        if let Some(target) = target_type {
            if !is_resource_type_name(target) {
                return Err(invalid(format!("'{target}' is not a resource type")));
            }
        }

        if !iterate {
            match include_type {
                IncludeType::Include if source_type != resource_type => {
                    return Err(invalid(format!(
                        "_include source must be {resource_type}; use :iterate for included types"
                    )));
                }
                _ => {}
            }
        }

        if search_param != "*" {
            let def = self
                .catalog
                .get(source_type, search_param)
                .ok_or_else(|| invalid(format!("unknown parameter '{search_param}'")))?;
            if def.param_type != SearchParamType::Reference {
                return Err(invalid(format!(
                    "'{search_param}' is a {} parameter, not a reference",
                    def.param_type
                )));
            }
            if let Some(target) = target_type {
                if !def.allows_target(target) {
                    return Err(invalid(format!("{target} is not a target of {search_param}")));
                }
            }
            if include_type == IncludeType::Revinclude
                && !iterate
                && !def.allows_target(resource_type)
            {
                return Err(invalid(format!(
                    "{source_type}.{search_param} cannot point at {resource_type}"
                )));
            }
        }

        Ok(IncludeDirective {
            include_type,
            source_type: source_type.to_string(),
            search_param: search_param.to_string(),
            target_type: target_type.map(str::to_string),
            iterate,
        })
    }

    fn resolve_sort(&self, resource_type: &str, key: &str) -> SearchResult<SortDirective> {
        let mut directive = SortDirective::parse(key);
        let def = self
            .catalog
            .get(resource_type, &directive.parameter)
            .ok_or_else(|| SearchError::InvalidSort {
                value: key.to_string(),
            })?;
        if def.param_type == SearchParamType::Composite {
            return Err(SearchError::InvalidSort {
                value: key.to_string(),
            });
        }
        directive.param_type = Some(def.param_type);
        Ok(directive)
    }

    fn parse_composite_value(&self, def: &SearchParamDef, raw: &str) -> SearchResult<SearchValue> {
        let parts = split_unescaped(raw, '$');
        if parts.len() != def.components.len() {
            return Err(SearchError::InvalidComposite {
                message: format!(
                    "{} takes {} components separated by '$', got {}",
                    def.code,
                    def.components.len(),
                    parts.len()
                ),
            });
        }

        let components = def
            .components
            .iter()
            .zip(parts)
            .map(|(component, part)| {
                Ok(CompositeValue {
                    code: component.code.clone(),
                    param_type: component.param_type,
                    value: parse_value(&component.code, component.param_type, &part)?,
                })
            })
            .collect::<SearchResult<Vec<_>>>()?;

        Ok(SearchValue {
            prefix: SearchPrefix::Eq,
            value: raw.to_string(),
            components,
        })
    }

    fn lookup(&self, resource_type: &str, name: &str) -> SearchResult<&SearchParamDef> {
        self.catalog
            .get(resource_type, name)
            .ok_or_else(|| SearchError::UnknownParameter {
                resource_type: resource_type.to_string(),
                name: name.to_string(),
            })
    }
}

/// Decodes a URL-encoded query string into ordered pairs.
pub fn parse_query_string(query_string: &str) -> Vec<(String, String)> {
    url::form_urlencoded::parse(query_string.trim_start_matches('?').as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

fn split_modifier(key: &str) -> SearchResult<(&str, Option<SearchModifier>)> {
    match key.split_once(':') {
        None => Ok((key, None)),
        Some((name, raw)) => {
            let modifier = SearchModifier::parse(raw).ok_or_else(|| {
                SearchError::UnsupportedModifier {
                    modifier: raw.to_string(),
                    param_type: "any".to_string(),
                }
            })?;
            Ok((name, Some(modifier)))
        }
    }
}

/// Parses and validates one value for a parameter type.
fn parse_value(name: &str, param_type: SearchParamType, raw: &str) -> SearchResult<SearchValue> {
    let invalid = |message: &str| SearchError::InvalidValue {
        name: name.to_string(),
        value: raw.to_string(),
        message: message.to_string(),
    };

    if !param_type.is_ordered() {
        return Ok(SearchValue::eq(raw));
    }

    let (prefix, rest) = SearchPrefix::extract(raw);
    if !prefix.is_valid_for(param_type) {
        return Err(SearchError::InvalidPrefix {
            prefix: prefix.to_string(),
            param_type: param_type.to_string(),
        });
    }

    match param_type {
        SearchParamType::Date => {
            DateRange::parse(rest).map_err(|_| invalid("not a valid date"))?;
        }
        SearchParamType::Number => {
            parse_decimal(rest).ok_or_else(|| invalid("not a number"))?;
        }
        SearchParamType::Quantity => {
            let number = rest.split('|').next().unwrap_or_default();
            parse_decimal(number).ok_or_else(|| invalid("quantity must start with a number"))?;
        }
        _ => {}
    }

    Ok(SearchValue::new(prefix, rest))
}

fn parse_u32(name: &str, value: &str) -> SearchResult<u32> {
    value.trim().parse().map_err(|_| SearchError::InvalidValue {
        name: name.to_string(),
        value: value.to_string(),
        message: "expected a non-negative integer".to_string(),
    })
}

/// Splits on `sep` unless escaped with a backslash, unescaping `\sep`.
fn split_unescaped(value: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&sep) => {
                current.push(sep);
                chars.next();
            }
            c if c == sep => parts.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    parts.push(current);
    parts.retain(|p| !p.is_empty());
    parts
}
