//! Index table writer.
//!
//! Index rows, reference edges and compartment memberships are always
//! replaced wholesale: [`clear_index`] then [`write_index`], inside the same
//! transaction as the document write.

use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use tracing::warn;

use crate::error::StorageResult;
use crate::search::{normalize_string, to_fixed_point, ExtractedDocument, IndexRow, IndexValue};

const INSERT_ROW_SQL: &str = "INSERT INTO search_index (
        resource_type, resource_id, param_name, param_type, component, composite_group,
        value_string, value_string_norm, value_number, value_date_start, value_date_end,
        value_quantity, value_quantity_unit, value_quantity_system, value_quantity_code,
        token_system, token_code, token_display, token_type_system, token_type_code,
        ref_type, ref_id, ref_url, value_uri
    ) VALUES (
        ?1, ?2, ?3, ?4, ?5, ?6,
        ?7, ?8, ?9, ?10, ?11,
        ?12, ?13, ?14, ?15,
        ?16, ?17, ?18, ?19, ?20,
        ?21, ?22, ?23, ?24
    )";

fn fixed_point(value: &Decimal) -> Option<i64> {
    let fixed = to_fixed_point(*value);
    if fixed.is_none() {
        warn!(%value, "Numeric value out of indexable range");
    }
    fixed
}

/// Column values of one index row; unset columns stay NULL.
///
/// Numbers and quantities are fixed-point integers at
/// [`FIXED_POINT_SCALE`](crate::search::FIXED_POINT_SCALE) digits.
#[derive(Debug, Default)]
struct IndexColumns {
    value_string: Option<String>,
    value_string_norm: Option<String>,
    value_number: Option<i64>,
    value_date_start: Option<String>,
    value_date_end: Option<String>,
    value_quantity: Option<i64>,
    value_quantity_unit: Option<String>,
    value_quantity_system: Option<String>,
    value_quantity_code: Option<String>,
    token_system: Option<String>,
    token_code: Option<String>,
    token_display: Option<String>,
    token_type_system: Option<String>,
    token_type_code: Option<String>,
    ref_type: Option<String>,
    ref_id: Option<String>,
    ref_url: Option<String>,
    value_uri: Option<String>,
}

impl IndexColumns {
    fn from_value(value: &IndexValue) -> Self {
        match value {
            IndexValue::String { raw, normalized } => Self {
                value_string: Some(raw.clone()),
                value_string_norm: Some(normalized.clone()),
                ..Default::default()
            },
            IndexValue::Token {
                system,
                code,
                display,
                type_system,
                type_code,
            } => Self {
                token_system: system.clone(),
                token_code: code.clone(),
                token_display: display.as_deref().map(normalize_string),
                token_type_system: type_system.clone(),
                token_type_code: type_code.clone(),
                ..Default::default()
            },
            IndexValue::Date(range) => Self {
                value_date_start: Some(range.start_key()),
                value_date_end: Some(range.end_key()),
                ..Default::default()
            },
            IndexValue::Number(n) => Self {
                value_number: fixed_point(n),
                ..Default::default()
            },
            IndexValue::Quantity {
                value,
                unit,
                system,
                code,
            } => Self {
                value_quantity: fixed_point(value),
                value_quantity_unit: unit.clone(),
                value_quantity_system: system.clone(),
                value_quantity_code: code.clone(),
                ..Default::default()
            },
            IndexValue::Reference {
                reference,
                target,
                identifier_system,
                identifier_value,
            } => Self {
                ref_type: target.as_ref().and_then(|t| t.resource_type.clone()),
                ref_id: target.as_ref().map(|t| t.id.clone()),
                ref_url: reference.clone(),
                token_system: identifier_system.clone(),
                token_code: identifier_value.clone(),
                ..Default::default()
            },
            IndexValue::Uri(uri) => Self {
                value_uri: Some(uri.clone()),
                ..Default::default()
            },
        }
    }
}

/// Removes every index row, edge and membership of one resource.
pub(crate) fn clear_index(conn: &Connection, resource_type: &str, id: &str) -> StorageResult<()> {
    conn.execute(
        "DELETE FROM search_index WHERE resource_type = ?1 AND resource_id = ?2",
        params![resource_type, id],
    )?;
    conn.execute(
        "DELETE FROM reference_edges WHERE source_type = ?1 AND source_id = ?2",
        params![resource_type, id],
    )?;
    conn.execute(
        "DELETE FROM compartment_membership WHERE resource_type = ?1 AND resource_id = ?2",
        params![resource_type, id],
    )?;
    Ok(())
}

/// Inserts the extracted rows, edges and memberships of one resource.
pub(crate) fn write_index(
    conn: &Connection,
    resource_type: &str,
    id: &str,
    document: &ExtractedDocument,
) -> StorageResult<()> {
    let mut insert_row = conn.prepare_cached(INSERT_ROW_SQL)?;
    for row in &document.rows {
        insert_index_row(&mut insert_row, resource_type, id, row)?;
    }

    let mut insert_edge = conn.prepare_cached(
        "INSERT INTO reference_edges (source_type, source_id, target_type, target_id, path)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for edge in &document.edges {
        insert_edge.execute(params![
            resource_type,
            id,
            edge.target_type,
            edge.target_id,
            edge.path
        ])?;
    }

    let mut insert_membership = conn.prepare_cached(
        "INSERT OR IGNORE INTO compartment_membership
             (compartment_type, compartment_id, resource_type, resource_id)
         VALUES (?1, ?2, ?3, ?4)",
    )?;
    for membership in &document.memberships {
        insert_membership.execute(params![
            membership.compartment_type,
            membership.compartment_id,
            resource_type,
            id
        ])?;
    }

    Ok(())
}

fn insert_index_row(
    stmt: &mut rusqlite::CachedStatement<'_>,
    resource_type: &str,
    id: &str,
    row: &IndexRow,
) -> StorageResult<()> {
    let c = IndexColumns::from_value(&row.value);
    stmt.execute(params![
        resource_type,
        id,
        row.param_name,
        row.param_type.as_str(),
        row.component,
        row.composite_group,
        c.value_string,
        c.value_string_norm,
        c.value_number,
        c.value_date_start,
        c.value_date_end,
        c.value_quantity,
        c.value_quantity_unit,
        c.value_quantity_system,
        c.value_quantity_code,
        c.token_system,
        c.token_code,
        c.token_display,
        c.token_type_system,
        c.token_type_code,
        c.ref_type,
        c.ref_id,
        c.ref_url,
        c.value_uri,
    ])?;
    Ok(())
}
