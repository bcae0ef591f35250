//! FHIR search parameter types.
//!
//! These are the typed predicates produced by the query translator and
//! consumed by the backend's SQL builder. Everything that needs the
//! catalog (parameter types, chain targets, composite components) is
//! resolved before a [`SearchQuery`] is built, so the backend never looks
//! a parameter up again.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// FHIR search parameter types.
///
/// See: https://build.fhir.org/search.html#ptypes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchParamType {
    /// A simple string, like a name or description.
    String,
    /// A search against a URI.
    Uri,
    /// A search for a number.
    Number,
    /// A search for a date, dateTime, instant or period.
    Date,
    /// A quantity, with a number and units.
    Quantity,
    /// A code from a code system.
    Token,
    /// A reference to another resource.
    Reference,
    /// A composite parameter that combines others.
    Composite,
}

impl SearchParamType {
    /// Returns the lowercase name stored in the index.
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchParamType::String => "string",
            SearchParamType::Uri => "uri",
            SearchParamType::Number => "number",
            SearchParamType::Date => "date",
            SearchParamType::Quantity => "quantity",
            SearchParamType::Token => "token",
            SearchParamType::Reference => "reference",
            SearchParamType::Composite => "composite",
        }
    }

    /// Returns `true` for the types that accept comparison prefixes.
    pub fn is_ordered(&self) -> bool {
        matches!(
            self,
            SearchParamType::Number | SearchParamType::Date | SearchParamType::Quantity
        )
    }
}

impl fmt::Display for SearchParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchParamType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "string" => Ok(SearchParamType::String),
            "uri" => Ok(SearchParamType::Uri),
            "number" => Ok(SearchParamType::Number),
            "date" => Ok(SearchParamType::Date),
            "quantity" => Ok(SearchParamType::Quantity),
            "token" => Ok(SearchParamType::Token),
            "reference" => Ok(SearchParamType::Reference),
            "composite" => Ok(SearchParamType::Composite),
            _ => Err(format!("unknown search parameter type: {}", s)),
        }
    }
}

/// Search modifiers.
///
/// See: https://build.fhir.org/search.html#modifiers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchModifier {
    /// Case-sensitive full equality (string).
    Exact,
    /// Substring match (string, uri).
    Contains,
    /// Text match on the display (token) or anywhere in the value (string).
    Text,
    /// Negation (token).
    Not,
    /// Presence test; the value is `true` or `false`.
    Missing,
    /// Hierarchical match (uri prefix; `ge` on quantity).
    Above,
    /// Hierarchical match (uri prefix; `le` on quantity).
    Below,
    /// Match the reference's identifier (reference).
    Identifier,
    /// Identifier of a given type, `system|code|value` (token).
    OfType,
    /// Restrict a reference to one target type (reference).
    Type(String),
}

impl fmt::Display for SearchModifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchModifier::Exact => write!(f, "exact"),
            SearchModifier::Contains => write!(f, "contains"),
            SearchModifier::Text => write!(f, "text"),
            SearchModifier::Not => write!(f, "not"),
            SearchModifier::Missing => write!(f, "missing"),
            SearchModifier::Above => write!(f, "above"),
            SearchModifier::Below => write!(f, "below"),
            SearchModifier::Identifier => write!(f, "identifier"),
            SearchModifier::OfType => write!(f, "of-type"),
            SearchModifier::Type(t) => write!(f, "{}", t),
        }
    }
}

impl SearchModifier {
    /// Parses a modifier, returning `None` for unknown modifiers.
    ///
    /// A capitalized modifier is a resource type (`subject:Patient`).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "exact" => Some(SearchModifier::Exact),
            "contains" => Some(SearchModifier::Contains),
            "text" => Some(SearchModifier::Text),
            "not" => Some(SearchModifier::Not),
            "missing" => Some(SearchModifier::Missing),
            "above" => Some(SearchModifier::Above),
            "below" => Some(SearchModifier::Below),
            "identifier" => Some(SearchModifier::Identifier),
            "of-type" | "ofType" => Some(SearchModifier::OfType),
            _ if s.chars().next().is_some_and(|c| c.is_ascii_uppercase())
                && s.chars().all(|c| c.is_ascii_alphanumeric()) =>
            {
                Some(SearchModifier::Type(s.to_string()))
            }
            _ => None,
        }
    }

    /// Returns `true` if this modifier is supported for the parameter type.
    pub fn is_valid_for(&self, param_type: SearchParamType) -> bool {
        match self {
            SearchModifier::Missing => param_type != SearchParamType::Composite,
            SearchModifier::Exact => param_type == SearchParamType::String,
            SearchModifier::Contains => {
                matches!(param_type, SearchParamType::String | SearchParamType::Uri)
            }
            SearchModifier::Text => {
                matches!(param_type, SearchParamType::String | SearchParamType::Token)
            }
            SearchModifier::Not | SearchModifier::OfType => param_type == SearchParamType::Token,
            SearchModifier::Above | SearchModifier::Below => {
                matches!(param_type, SearchParamType::Uri | SearchParamType::Quantity)
            }
            SearchModifier::Identifier | SearchModifier::Type(_) => {
                param_type == SearchParamType::Reference
            }
        }
    }
}

/// Comparison prefixes for ordered parameter types.
///
/// See: https://build.fhir.org/search.html#prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchPrefix {
    /// Equal (default).
    #[default]
    Eq,
    /// Not equal.
    Ne,
    /// Greater than.
    Gt,
    /// Less than.
    Lt,
    /// Greater than or equal.
    Ge,
    /// Less than or equal.
    Le,
    /// Starts after.
    Sa,
    /// Ends before.
    Eb,
    /// Approximately equal.
    Ap,
}

impl fmt::Display for SearchPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SearchPrefix::Eq => "eq",
            SearchPrefix::Ne => "ne",
            SearchPrefix::Gt => "gt",
            SearchPrefix::Lt => "lt",
            SearchPrefix::Ge => "ge",
            SearchPrefix::Le => "le",
            SearchPrefix::Sa => "sa",
            SearchPrefix::Eb => "eb",
            SearchPrefix::Ap => "ap",
        };
        f.write_str(s)
    }
}

impl FromStr for SearchPrefix {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eq" => Ok(SearchPrefix::Eq),
            "ne" => Ok(SearchPrefix::Ne),
            "gt" => Ok(SearchPrefix::Gt),
            "lt" => Ok(SearchPrefix::Lt),
            "ge" => Ok(SearchPrefix::Ge),
            "le" => Ok(SearchPrefix::Le),
            "sa" => Ok(SearchPrefix::Sa),
            "eb" => Ok(SearchPrefix::Eb),
            "ap" => Ok(SearchPrefix::Ap),
            _ => Err(format!("unknown search prefix: {}", s)),
        }
    }
}

impl SearchPrefix {
    /// Splits a leading two-letter prefix off a value.
    ///
    /// Returns `Eq` and the whole value when there is no prefix.
    pub fn extract(value: &str) -> (Self, &str) {
        if let Some(head) = value.get(..2) {
            if let Ok(prefix) = head.parse() {
                return (prefix, &value[2..]);
            }
        }
        (SearchPrefix::Eq, value)
    }

    /// Returns `true` if this prefix is valid for the parameter type.
    pub fn is_valid_for(&self, param_type: SearchParamType) -> bool {
        match self {
            SearchPrefix::Eq => true,
            _ => param_type.is_ordered(),
        }
    }
}

/// One value of a search parameter, with its comparison prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchValue {
    /// The comparison prefix (`Eq` for unordered types).
    pub prefix: SearchPrefix,
    /// The value with the prefix and escapes removed.
    pub value: String,
    /// Per-component values of a composite parameter, in declaration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<CompositeValue>,
}

impl SearchValue {
    /// Creates a search value with the given prefix.
    pub fn new(prefix: SearchPrefix, value: impl Into<String>) -> Self {
        Self {
            prefix,
            value: value.into(),
            components: Vec::new(),
        }
    }

    /// Creates a search value with the default (`eq`) prefix.
    pub fn eq(value: impl Into<String>) -> Self {
        Self::new(SearchPrefix::Eq, value)
    }

    /// Parses a value string, extracting any prefix.
    pub fn parse(s: &str) -> Self {
        let (prefix, value) = SearchPrefix::extract(s);
        Self::new(prefix, value)
    }
}

/// The value of one component inside a composite search value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeValue {
    /// Component code.
    pub code: String,
    /// Component type.
    pub param_type: SearchParamType,
    /// The component's value.
    pub value: SearchValue,
}

/// A parsed search parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchParameter {
    /// Parameter code (e.g. `name`, `subject`).
    pub name: String,
    /// Parameter type.
    pub param_type: SearchParamType,
    /// Modifier, if any.
    pub modifier: Option<SearchModifier>,
    /// Values; a resource matches if any of them matches.
    pub values: Vec<SearchValue>,
    /// Set when this parameter is a chain through a reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain: Option<ChainedParameter>,
}

impl SearchParameter {
    /// Creates a parameter with a single `eq` value and no modifier.
    pub fn new(
        name: impl Into<String>,
        param_type: SearchParamType,
        value: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type,
            modifier: None,
            values: vec![SearchValue::eq(value)],
            chain: None,
        }
    }

    /// Sets the modifier.
    pub fn with_modifier(mut self, modifier: SearchModifier) -> Self {
        self.modifier = Some(modifier);
        self
    }
}

/// A forward chain: `subject:Patient.name=Smith`.
///
/// Matches sources whose `reference_param` points at a resource of one of
/// `target_types` that matches `inner`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainedParameter {
    /// Target resource types the inner parameter is evaluated against.
    pub target_types: Vec<String>,
    /// The parameter evaluated on the referenced resource (may chain again).
    pub inner: Box<SearchParameter>,
}

/// A reverse chain: `_has:Observation:patient:code=1234-5`.
///
/// Matches resources referenced through `reference_param` by some
/// `source_type` resource that matches `inner`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReverseChainedParameter {
    /// The resource type holding the reference.
    pub source_type: String,
    /// The reference parameter on the source type.
    pub reference_param: String,
    /// The parameter evaluated on the source resource.
    pub inner: SearchParameter,
}

/// Include directive for `_include` and `_revinclude`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncludeDirective {
    /// Forward or reverse.
    pub include_type: IncludeType,
    /// The resource type holding the reference.
    pub source_type: String,
    /// The reference parameter to follow; `*` follows every reference parameter.
    pub search_param: String,
    /// Optional target type filter.
    pub target_type: Option<String>,
    /// Apply the directive again to included resources.
    pub iterate: bool,
}

impl IncludeDirective {
    /// Returns `true` for `Type:*`.
    pub fn is_wildcard(&self) -> bool {
        self.search_param == "*"
    }
}

/// Type of include operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IncludeType {
    /// Forward include (`_include`).
    Include,
    /// Reverse include (`_revinclude`).
    Revinclude,
}

/// Sort direction for `_sort`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SortDirection {
    /// Ascending order.
    #[default]
    Ascending,
    /// Descending order.
    Descending,
}

/// A sort directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortDirective {
    /// The parameter to sort by.
    pub parameter: String,
    /// The sort direction.
    pub direction: SortDirection,
    /// The parameter's type, resolved against the catalog.
    pub param_type: Option<SearchParamType>,
}

impl SortDirective {
    /// Parses one `_sort` key (e.g. `-date` for descending).
    pub fn parse(s: &str) -> Self {
        match s.strip_prefix('-') {
            Some(stripped) => Self {
                parameter: stripped.to_string(),
                direction: SortDirection::Descending,
                param_type: None,
            },
            None => Self {
                parameter: s.to_string(),
                direction: SortDirection::Ascending,
                param_type: None,
            },
        }
    }
}

/// A complete search query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// The resource type being searched.
    pub resource_type: String,
    /// Search parameters; all must match.
    pub parameters: Vec<SearchParameter>,
    /// Reverse chains (`_has`); all must match.
    pub reverse_chains: Vec<ReverseChainedParameter>,
    /// Include directives.
    pub includes: Vec<IncludeDirective>,
    /// Sort directives, in priority order.
    pub sort: Vec<SortDirective>,
    /// Page size (`_count`).
    pub count: Option<u32>,
    /// Page offset (`_offset`).
    pub offset: Option<u32>,
    /// `_total` mode.
    pub total: Option<TotalMode>,
    /// `_summary` mode.
    pub summary: Option<SummaryMode>,
    /// `_elements` list.
    pub elements: Vec<String>,
}

impl SearchQuery {
    /// Creates an empty query for a resource type.
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            ..Default::default()
        }
    }

    /// Adds a search parameter.
    pub fn with_parameter(mut self, param: SearchParameter) -> Self {
        self.parameters.push(param);
        self
    }

    /// Adds an include directive.
    pub fn with_include(mut self, include: IncludeDirective) -> Self {
        self.includes.push(include);
        self
    }

    /// Adds a sort directive.
    pub fn with_sort(mut self, sort: SortDirective) -> Self {
        self.sort.push(sort);
        self
    }

    /// Sets the page size.
    pub fn with_count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }

    /// Sets the page offset.
    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Returns `true` when only the total is wanted.
    pub fn is_count_only(&self) -> bool {
        self.summary == Some(SummaryMode::Count)
    }
}

/// Mode for `_total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TotalMode {
    /// Omit the total.
    None,
    /// An estimate is acceptable.
    Estimate,
    /// An exact total.
    Accurate,
}

impl FromStr for TotalMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(TotalMode::None),
            "estimate" => Ok(TotalMode::Estimate),
            "accurate" => Ok(TotalMode::Accurate),
            _ => Err(format!("unknown _total mode: {}", s)),
        }
    }
}

/// Mode for `_summary`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryMode {
    /// Summary elements only.
    True,
    /// The full resource.
    False,
    /// Narrative and mandatory elements only.
    Text,
    /// Everything except the narrative.
    Data,
    /// Total only, no entries.
    Count,
}

impl FromStr for SummaryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "true" => Ok(SummaryMode::True),
            "false" => Ok(SummaryMode::False),
            "text" => Ok(SummaryMode::Text),
            "data" => Ok(SummaryMode::Data),
            "count" => Ok(SummaryMode::Count),
            _ => Err(format!("unknown _summary mode: {}", s)),
        }
    }
}
