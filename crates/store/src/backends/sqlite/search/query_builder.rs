//! SQL query builder for search.
//!
//! Every search parameter becomes a self-contained subquery that selects
//! the ids of matching resources of one type. The outer query ANDs them
//! (`r.id IN (...)`), so repeated parameters, chains, reverse chains and
//! negations all compose the same way. Placeholders are positional `?`, so
//! fragments can be nested without renumbering.

use rusqlite::types::{ToSql, ToSqlOutput};

use crate::catalog::ParamCatalog;
use crate::error::{SearchError, SearchResult};
use crate::types::{
    ReverseChainedParameter, SearchModifier, SearchParamType, SearchParameter, SearchQuery,
    SearchValue, SortDirection, SortDirective,
};

use super::parameter_handlers::{
    CompositeHandler, DateHandler, NumberHandler, QuantityHandler, ReferenceHandler, StringHandler,
    TokenHandler, UriHandler,
};

/// Columns selected for every resource row, on alias `r`.
pub(crate) const RESOURCE_COLUMNS: &str = "r.resource_type, r.id, r.version_id, r.data, r.last_updated, r.is_deleted, \
     (SELECT h.method FROM resource_history h \
      WHERE h.resource_type = r.resource_type AND h.id = r.id AND h.version_id = r.version_id)";

/// A fragment of SQL with bound parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlFragment {
    /// The SQL clause.
    pub sql: String,
    /// Bound parameter values, in placeholder order.
    pub params: Vec<SqlParam>,
}

/// A bound SQL parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    /// String parameter.
    String(String),
    /// Integer parameter.
    Integer(i64),
}

impl SqlParam {
    /// Creates a string parameter.
    pub fn string(s: impl Into<String>) -> Self {
        SqlParam::String(s.into())
    }

    /// Creates an integer parameter.
    pub fn integer(i: i64) -> Self {
        SqlParam::Integer(i)
    }
}

impl ToSql for SqlParam {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            SqlParam::String(s) => s.to_sql(),
            SqlParam::Integer(i) => i.to_sql(),
        }
    }
}

impl SqlFragment {
    /// Creates a new SQL fragment.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Creates a fragment with parameters.
    pub fn with_params(sql: impl Into<String>, params: Vec<SqlParam>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Combines with another fragment using AND.
    pub fn and(mut self, other: SqlFragment) -> Self {
        if !self.sql.is_empty() && !other.sql.is_empty() {
            self.sql = format!("({}) AND ({})", self.sql, other.sql);
        } else if !other.sql.is_empty() {
            self.sql = other.sql;
        }
        self.params.extend(other.params);
        self
    }

    /// Combines with another fragment using OR.
    pub fn or(mut self, other: SqlFragment) -> Self {
        if !self.sql.is_empty() && !other.sql.is_empty() {
            self.sql = format!("({}) OR ({})", self.sql, other.sql);
        } else if !other.sql.is_empty() {
            self.sql = other.sql;
        }
        self.params.extend(other.params);
        self
    }

    /// ORs a list of fragments; `None` when the list is empty.
    pub fn any(fragments: impl IntoIterator<Item = SqlFragment>) -> Option<Self> {
        fragments.into_iter().reduce(SqlFragment::or)
    }

    /// Returns true if this fragment is empty.
    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }
}

/// A complete, executable search: the page query and its count query.
#[derive(Debug, Clone)]
pub struct BuiltQuery {
    /// Selects [`RESOURCE_COLUMNS`] for one page.
    pub select: SqlFragment,
    /// Counts every match.
    pub count: SqlFragment,
}

/// Builds SQL queries from translated search queries.
pub struct QueryBuilder<'a> {
    catalog: &'a ParamCatalog,
}

impl<'a> QueryBuilder<'a> {
    /// Creates a new query builder.
    pub fn new(catalog: &'a ParamCatalog) -> Self {
        Self { catalog }
    }

    /// Builds the page and count queries for a search.
    pub fn build(&self, query: &SearchQuery, count: u32, offset: u32) -> SearchResult<BuiltQuery> {
        let filter = self.build_filter(query)?;

        let order = self.build_order(&query.resource_type, &query.sort)?;

        let mut select = SqlFragment::new(format!(
            "SELECT {RESOURCE_COLUMNS} FROM resources r WHERE {} ORDER BY {}",
            filter.sql, order.sql
        ));
        select.params.extend(filter.params.iter().cloned());
        select.params.extend(order.params);
        select.sql.push_str(" LIMIT ? OFFSET ?");
        select.params.push(SqlParam::integer(i64::from(count)));
        select.params.push(SqlParam::integer(i64::from(offset)));

        let count = SqlFragment::with_params(
            format!("SELECT COUNT(*) FROM resources r WHERE {}", filter.sql),
            filter.params,
        );

        Ok(BuiltQuery { select, count })
    }

    /// Builds the WHERE clause over alias `r` for a search.
    pub fn build_filter(&self, query: &SearchQuery) -> SearchResult<SqlFragment> {
        let mut filter = SqlFragment::with_params(
            "r.resource_type = ? AND r.is_deleted = 0",
            vec![SqlParam::string(&query.resource_type)],
        );

        for param in &query.parameters {
            let ids = self.matching_ids(&query.resource_type, param)?;
            filter = filter.and(SqlFragment::with_params(
                format!("r.id IN ({})", ids.sql),
                ids.params,
            ));
        }

        for reverse in &query.reverse_chains {
            let ids = self.reverse_chain_ids(&query.resource_type, reverse)?;
            filter = filter.and(SqlFragment::with_params(
                format!("r.id IN ({})", ids.sql),
                ids.params,
            ));
        }

        Ok(filter)
    }

    /// Selects the ids of `resource_type` resources matching one parameter.
    pub fn matching_ids(
        &self,
        resource_type: &str,
        param: &SearchParameter,
    ) -> SearchResult<SqlFragment> {
        if let Some(chain) = &param.chain {
            let mut branches = Vec::new();
            for target in &chain.target_types {
                let inner = self.matching_ids(target, &chain.inner)?;
                let mut branch = SqlFragment::with_params(
                    format!("si.ref_type = ? AND si.ref_id IN ({})", inner.sql),
                    vec![SqlParam::string(target)],
                );
                branch.params.extend(inner.params);
                branches.push(branch);
            }
            let refs = SqlFragment::any(branches).unwrap_or_else(|| SqlFragment::new("0"));
            return Ok(index_subquery(resource_type, &param.name, refs));
        }

        match &param.modifier {
            Some(SearchModifier::Missing) => {
                let present = index_subquery(resource_type, &param.name, SqlFragment::default());
                let missing = param.values.first().is_some_and(|v| v.value == "true");
                Ok(if missing {
                    complement(resource_type, present)
                } else {
                    present
                })
            }
            Some(SearchModifier::Not) => {
                let inner = SearchParameter {
                    modifier: None,
                    ..param.clone()
                };
                Ok(complement(resource_type, self.matching_ids(resource_type, &inner)?))
            }
            _ if param.param_type == SearchParamType::Composite => {
                CompositeHandler::build_sql(resource_type, &param.name, &param.values)
            }
            _ => {
                let default_target = self
                    .catalog
                    .get(resource_type, &param.name)
                    .and_then(|def| def.single_target());
                let conditions = param
                    .values
                    .iter()
                    .map(|value| {
                        value_condition(
                            "si",
                            param.param_type,
                            value,
                            param.modifier.as_ref(),
                            default_target,
                        )
                    })
                    .collect::<SearchResult<Vec<_>>>()?;
                let condition = SqlFragment::any(conditions).unwrap_or_else(|| SqlFragment::new("0"));
                Ok(index_subquery(resource_type, &param.name, condition))
            }
        }
    }

    /// Selects the ids of `resource_type` resources referenced by matching
    /// resources of the reverse chain's source type.
    pub fn reverse_chain_ids(
        &self,
        resource_type: &str,
        reverse: &ReverseChainedParameter,
    ) -> SearchResult<SqlFragment> {
        let sources = self.matching_ids(&reverse.source_type, &reverse.inner)?;
        let mut fragment = SqlFragment::with_params(
            format!(
                "SELECT si.ref_id FROM search_index si \
                 WHERE si.resource_type = ? AND si.param_name = ? AND si.ref_type = ? \
                 AND si.resource_id IN ({})",
                sources.sql
            ),
            vec![
                SqlParam::string(&reverse.source_type),
                SqlParam::string(&reverse.reference_param),
                SqlParam::string(resource_type),
            ],
        );
        fragment.params.extend(sources.params);
        Ok(fragment)
    }

    /// Builds the ORDER BY list.
    ///
    /// Resources without a value for a sort parameter come last in either
    /// direction. The id is always the final tiebreak.
    fn build_order(
        &self,
        resource_type: &str,
        sort: &[SortDirective],
    ) -> SearchResult<SqlFragment> {
        if sort.is_empty() {
            return Ok(SqlFragment::new("r.last_updated DESC, r.id ASC"));
        }

        let mut terms = Vec::new();
        let mut params = Vec::new();
        for directive in sort {
            let param_type = match directive.param_type {
                Some(t) => t,
                None => {
                    self.catalog
                        .get(resource_type, &directive.parameter)
                        .ok_or_else(|| SearchError::InvalidSort {
                            value: directive.parameter.clone(),
                        })?
                        .param_type
                }
            };
            let descending = directive.direction == SortDirection::Descending;
            let (aggregate, column) = sort_column(param_type, descending).ok_or_else(|| {
                SearchError::InvalidSort {
                    value: directive.parameter.clone(),
                }
            })?;
            let key = format!(
                "(SELECT {aggregate}(si.{column}) FROM search_index si \
                 WHERE si.resource_type = r.resource_type AND si.resource_id = r.id \
                 AND si.param_name = ?)"
            );
            terms.push(format!(
                "{key} IS NULL, {key} {}",
                if descending { "DESC" } else { "ASC" }
            ));
            params.push(SqlParam::string(&directive.parameter));
            params.push(SqlParam::string(&directive.parameter));
        }
        terms.push("r.id ASC".to_string());

        Ok(SqlFragment::with_params(terms.join(", "), params))
    }
}

/// `SELECT si.resource_id` for one parameter of one type, filtered by `condition`.
fn index_subquery(resource_type: &str, param_name: &str, condition: SqlFragment) -> SqlFragment {
    let mut fragment = SqlFragment::with_params(
        "SELECT si.resource_id FROM search_index si WHERE si.resource_type = ? AND si.param_name = ?",
        vec![
            SqlParam::string(resource_type),
            SqlParam::string(param_name),
        ],
    );
    if !condition.is_empty() {
        fragment.sql.push_str(&format!(" AND ({})", condition.sql));
        fragment.params.extend(condition.params);
    }
    fragment
}

/// Current resources of a type whose id is not selected by `ids`.
fn complement(resource_type: &str, ids: SqlFragment) -> SqlFragment {
    let mut fragment = SqlFragment::with_params(
        format!(
            "SELECT res.id FROM resources res \
             WHERE res.resource_type = ? AND res.is_deleted = 0 AND res.id NOT IN ({})",
            ids.sql
        ),
        vec![SqlParam::string(resource_type)],
    );
    fragment.params.extend(ids.params);
    fragment
}

/// Condition on index alias `alias` for one value of a non-composite parameter.
pub(crate) fn value_condition(
    alias: &str,
    param_type: SearchParamType,
    value: &SearchValue,
    modifier: Option<&SearchModifier>,
    default_target: Option<&str>,
) -> SearchResult<SqlFragment> {
    match param_type {
        SearchParamType::String => Ok(StringHandler::build_sql(alias, value, modifier)),
        SearchParamType::Token => Ok(TokenHandler::build_sql(alias, value, modifier)),
        SearchParamType::Date => DateHandler::build_sql(alias, value),
        SearchParamType::Number => NumberHandler::build_sql(alias, value),
        SearchParamType::Quantity => QuantityHandler::build_sql(alias, value),
        SearchParamType::Reference => Ok(ReferenceHandler::build_sql(
            alias,
            value,
            modifier,
            default_target,
        )),
        SearchParamType::Uri => Ok(UriHandler::build_sql(alias, value, modifier)),
        SearchParamType::Composite => Err(SearchError::InvalidComposite {
            message: "composite parameters cannot be nested".to_string(),
        }),
    }
}

/// Aggregate and index column a sort key reads.
fn sort_column(param_type: SearchParamType, descending: bool) -> Option<(&'static str, &'static str)> {
    let aggregate = if descending { "MAX" } else { "MIN" };
    let column = match param_type {
        SearchParamType::String => "value_string_norm",
        SearchParamType::Token => "token_code",
        SearchParamType::Date if descending => "value_date_end",
        SearchParamType::Date => "value_date_start",
        SearchParamType::Number => "value_number",
        SearchParamType::Quantity => "value_quantity",
        SearchParamType::Reference => "ref_id",
        SearchParamType::Uri => "value_uri",
        SearchParamType::Composite => return None,
    };
    Some((aggregate, column))
}

/// Escapes `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` pattern.
pub(crate) fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChainedParameter;

    fn placeholders(sql: &str) -> usize {
        sql.matches('?').count()
    }

    #[test]
    fn test_fragment_combinators() {
        let a = SqlFragment::with_params("a = ?", vec![SqlParam::integer(1)]);
        let b = SqlFragment::with_params("b = ?", vec![SqlParam::integer(2)]);
        let both = a.clone().and(b.clone());
        assert_eq!(both.sql, "(a = ?) AND (b = ?)");
        assert_eq!(both.params.len(), 2);
        assert_eq!(SqlFragment::any(vec![a, b]).unwrap().sql, "(a = ?) OR (b = ?)");
        assert!(SqlFragment::any(Vec::new()).is_none());
    }

    #[test]
    fn test_placeholders_match_params() {
        let catalog = ParamCatalog::builtin();
        let builder = QueryBuilder::new(&catalog);
        let query = SearchQuery::new("Observation")
            .with_parameter(
                SearchParameter::new("code", SearchParamType::Token, "http://loinc.org|2339-0"),
            )
            .with_parameter(SearchParameter {
                name: "subject".to_string(),
                param_type: SearchParamType::Reference,
                modifier: None,
                values: Vec::new(),
                chain: Some(ChainedParameter {
                    target_types: vec!["Patient".to_string()],
                    inner: Box::new(SearchParameter::new(
                        "name",
                        SearchParamType::String,
                        "smith",
                    )),
                }),
            })
            .with_sort(SortDirective::parse("-date"));

        let built = builder.build(&query, 10, 0).unwrap();
        assert_eq!(placeholders(&built.select.sql), built.select.params.len());
        assert_eq!(placeholders(&built.count.sql), built.count.params.len());
        assert!(built.select.sql.ends_with("LIMIT ? OFFSET ?"));
        assert!(built.select.sql.contains("IS NULL"));
    }

    #[test]
    fn test_missing_true_is_a_complement() {
        let catalog = ParamCatalog::builtin();
        let builder = QueryBuilder::new(&catalog);
        let param = SearchParameter::new("birthdate", SearchParamType::Date, "true")
            .with_modifier(SearchModifier::Missing);
        let ids = builder.matching_ids("Patient", &param).unwrap();
        assert!(ids.sql.contains("NOT IN"));
        assert_eq!(placeholders(&ids.sql), ids.params.len());
    }

    #[test]
    fn test_unknown_sort_parameter() {
        let catalog = ParamCatalog::builtin();
        let builder = QueryBuilder::new(&catalog);
        let query = SearchQuery::new("Patient").with_sort(SortDirective::parse("nonsense"));
        assert!(matches!(
            builder.build(&query, 10, 0),
            Err(SearchError::InvalidSort { .. })
        ));
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_a\\b"), "50\\%\\_a\\\\b");
    }
}
