//! Number parameter SQL handler.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::error::{SearchError, SearchResult};
use crate::search::{parse_decimal, shift_to_fixed_point};
use crate::types::{SearchPrefix, SearchValue};

use super::super::query_builder::{SqlFragment, SqlParam};

/// Handles number parameter SQL generation.
pub struct NumberHandler;

impl NumberHandler {
    /// Builds SQL for a number parameter value.
    pub fn build_sql(alias: &str, value: &SearchValue) -> SearchResult<SqlFragment> {
        let number = parse_number(&value.value)?;
        Ok(compare_decimal(
            &format!("{alias}.value_number"),
            value.prefix,
            number,
        ))
    }
}

pub(super) fn parse_number(raw: &str) -> SearchResult<Decimal> {
    parse_decimal(raw).ok_or_else(|| SearchError::InvalidValue {
        name: "number".to_string(),
        value: raw.to_string(),
        message: "not a number".to_string(),
    })
}

/// Compares a fixed-point numeric column with a prefix.
///
/// `eq` and `ne` honour the precision the value was written with: `100`
/// matches `[99.5, 100.5)`, `100.0` matches `[99.95, 100.05)`. `ap` allows
/// 10% either side. Bounds are rounded toward the side the operator
/// includes, so comparisons against the stored integers stay exact.
pub(super) fn compare_decimal(column: &str, prefix: SearchPrefix, number: Decimal) -> SqlFragment {
    let half_unit = Decimal::try_new(5, number.scale() + 1).unwrap_or(Decimal::ZERO);

    match prefix {
        SearchPrefix::Eq => SqlFragment::with_params(
            format!("{column} >= ? AND {column} < ?"),
            vec![ceil(number - half_unit), ceil(number + half_unit)],
        ),
        SearchPrefix::Ne => SqlFragment::with_params(
            format!("({column} < ? OR {column} >= ?)"),
            vec![ceil(number - half_unit), ceil(number + half_unit)],
        ),
        SearchPrefix::Gt | SearchPrefix::Sa => {
            SqlFragment::with_params(format!("{column} > ?"), vec![floor(number)])
        }
        SearchPrefix::Lt | SearchPrefix::Eb => {
            SqlFragment::with_params(format!("{column} < ?"), vec![ceil(number)])
        }
        SearchPrefix::Ge => SqlFragment::with_params(format!("{column} >= ?"), vec![ceil(number)]),
        SearchPrefix::Le => SqlFragment::with_params(format!("{column} <= ?"), vec![floor(number)]),
        SearchPrefix::Ap => {
            let tolerance = (number * Decimal::new(1, 1)).abs();
            SqlFragment::with_params(
                format!("{column} >= ? AND {column} <= ?"),
                vec![ceil(number - tolerance), floor(number + tolerance)],
            )
        }
    }
}

fn floor(value: Decimal) -> SqlParam {
    fixed_bound(value, Decimal::floor)
}

fn ceil(value: Decimal) -> SqlParam {
    fixed_bound(value, Decimal::ceil)
}

/// A query bound in index units; values past the `i64` range saturate.
fn fixed_bound(value: Decimal, round: fn(&Decimal) -> Decimal) -> SqlParam {
    let fixed = shift_to_fixed_point(value)
        .map(|shifted| round(&shifted))
        .and_then(|rounded| rounded.to_i64())
        .unwrap_or(if value.is_sign_negative() {
            i64::MIN
        } else {
            i64::MAX
        });
    SqlParam::integer(fixed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eq_uses_precision() {
        let frag = NumberHandler::build_sql("si", &SearchValue::parse("100")).unwrap();
        assert_eq!(
            frag.params,
            vec![SqlParam::integer(99_500_000), SqlParam::integer(100_500_000)]
        );

        let frag = NumberHandler::build_sql("si", &SearchValue::parse("100.0")).unwrap();
        assert_eq!(
            frag.params,
            vec![SqlParam::integer(99_950_000), SqlParam::integer(100_050_000)]
        );
    }

    #[test]
    fn test_bounds_beyond_index_precision_round_inward() {
        // 0.1234567 has more digits than the index keeps.
        let frag = NumberHandler::build_sql("si", &SearchValue::parse("gt0.1234567")).unwrap();
        assert_eq!(frag.params, vec![SqlParam::integer(123_456)]);
        let frag = NumberHandler::build_sql("si", &SearchValue::parse("ge0.1234567")).unwrap();
        assert_eq!(frag.params, vec![SqlParam::integer(123_457)]);
    }

    #[test]
    fn test_prefixes() {
        let frag = NumberHandler::build_sql("si", &SearchValue::parse("gt5")).unwrap();
        assert_eq!(frag.sql, "si.value_number > ?");
        let frag = NumberHandler::build_sql("si", &SearchValue::parse("le5")).unwrap();
        assert_eq!(frag.sql, "si.value_number <= ?");
        let frag = NumberHandler::build_sql("si", &SearchValue::parse("eb5")).unwrap();
        assert_eq!(frag.sql, "si.value_number < ?");
        assert_eq!(frag.params, vec![SqlParam::integer(5_000_000)]);
    }

    #[test]
    fn test_ap_is_ten_percent() {
        let frag = NumberHandler::build_sql("si", &SearchValue::parse("ap100")).unwrap();
        assert_eq!(
            frag.params,
            vec![SqlParam::integer(90_000_000), SqlParam::integer(110_000_000)]
        );
    }

    #[test]
    fn test_huge_bound_saturates() {
        let frag = NumberHandler::build_sql("si", &SearchValue::parse("lt1e20")).unwrap();
        assert_eq!(frag.params, vec![SqlParam::integer(i64::MAX)]);
    }

    #[test]
    fn test_not_a_number() {
        assert!(NumberHandler::build_sql("si", &SearchValue::parse("abc")).is_err());
    }
}
