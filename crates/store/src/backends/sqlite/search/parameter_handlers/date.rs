//! Date parameter SQL handler.
//!
//! Both sides are ranges: the index row covers `[start, end]` and so does the
//! query value (`2024` covers the whole year). Prefixes compare the ranges.

use chrono::{Duration, Utc};

use crate::error::{SearchError, SearchResult};
use crate::types::{DateRange, SearchPrefix, SearchValue};

use super::super::query_builder::{SqlFragment, SqlParam};

/// Handles date parameter SQL generation.
pub struct DateHandler;

impl DateHandler {
    /// Builds SQL for a date parameter value.
    pub fn build_sql(alias: &str, value: &SearchValue) -> SearchResult<SqlFragment> {
        let range = DateRange::parse(&value.value).map_err(|e| SearchError::InvalidValue {
            name: "date".to_string(),
            value: value.value.clone(),
            message: e.to_string(),
        })?;

        let start = format!("{alias}.value_date_start");
        let end = format!("{alias}.value_date_end");
        let qs = SqlParam::string(range.start_key());
        let qe = SqlParam::string(range.end_key());

        let contained = |qs: SqlParam, qe: SqlParam| {
            SqlFragment::with_params(format!("{start} >= ? AND {end} <= ?"), vec![qs, qe])
        };

        let fragment = match value.prefix {
            SearchPrefix::Eq => contained(qs, qe),
            SearchPrefix::Ne => {
                let inner = contained(qs, qe);
                SqlFragment::with_params(format!("NOT ({})", inner.sql), inner.params)
            }
            SearchPrefix::Gt => SqlFragment::with_params(format!("{end} > ?"), vec![qe]),
            SearchPrefix::Lt => SqlFragment::with_params(format!("{start} < ?"), vec![qs]),
            SearchPrefix::Ge => SqlFragment::with_params(format!("{end} > ?"), vec![qe.clone()])
                .or(contained(qs, qe)),
            SearchPrefix::Le => SqlFragment::with_params(format!("{start} < ?"), vec![qs.clone()])
                .or(contained(qs, qe)),
            SearchPrefix::Sa => SqlFragment::with_params(format!("{start} > ?"), vec![qe]),
            SearchPrefix::Eb => SqlFragment::with_params(format!("{end} < ?"), vec![qs]),
            SearchPrefix::Ap => {
                let window = approximate_range(&range);
                SqlFragment::with_params(
                    format!("{start} <= ? AND {end} >= ?"),
                    vec![
                        SqlParam::string(window.end_key()),
                        SqlParam::string(window.start_key()),
                    ],
                )
            }
        };

        Ok(fragment)
    }
}

/// Widens a range by 10% of its distance from now, and by at least a day.
fn approximate_range(range: &DateRange) -> DateRange {
    let now = Utc::now();
    let distance = if now > range.start {
        now - range.start
    } else {
        range.start - now
    };
    let tolerance = (distance / 10).max(Duration::days(1));
    range.widen(tolerance)
}
