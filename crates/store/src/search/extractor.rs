//! Search parameter value extractor.
//!
//! Walks a document with the catalog's path expressions and produces
//! everything the index tables hold for it: typed parameter rows, reference
//! edges and compartment memberships. Extraction is a pure function of the
//! document and the catalog, so re-running it on the same body always
//! yields the same [`ExtractedDocument`].

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::catalog::{ParamCatalog, SearchParamDef};
use crate::types::SearchParamType;

use super::converters::{IndexValue, ValueConverter};
use super::errors::ExtractionError;
use super::reference::normalize_reference;

/// One row of the parameter index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRow {
    /// Parameter code.
    pub param_name: String,
    /// Parameter type (the component's type for composite rows).
    pub param_type: SearchParamType,
    /// Component code, for rows belonging to a composite parameter.
    pub component: Option<String>,
    /// Rows with the same group were extracted from the same element.
    pub composite_group: Option<u32>,
    /// The extracted value.
    pub value: IndexValue,
}

/// A reference from the document to another resource.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReferenceEdge {
    /// Target resource type.
    pub target_type: String,
    /// Target logical id.
    pub target_id: String,
    /// Element path of the reference inside the document (e.g. `subject`).
    pub path: String,
}

/// Membership of the document in a compartment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CompartmentMembership {
    /// Compartment type (e.g. `Patient`).
    pub compartment_type: String,
    /// Logical id of the compartment subject.
    pub compartment_id: String,
}

/// Everything extracted from one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedDocument {
    /// Parameter index rows.
    pub rows: Vec<IndexRow>,
    /// Reference edges, sorted and unique.
    pub edges: Vec<ReferenceEdge>,
    /// Compartment memberships, sorted and unique.
    pub memberships: Vec<CompartmentMembership>,
}

impl ExtractedDocument {
    /// Returns the rows for one parameter.
    pub fn rows_for<'a>(&'a self, param_name: &'a str) -> impl Iterator<Item = &'a IndexRow> + 'a {
        self.rows.iter().filter(move |r| r.param_name == param_name)
    }
}

/// Extracts index data from documents using the parameter catalog.
#[derive(Debug, Clone)]
pub struct SearchParameterExtractor {
    catalog: Arc<ParamCatalog>,
}

impl SearchParameterExtractor {
    /// Creates an extractor over a catalog.
    pub fn new(catalog: Arc<ParamCatalog>) -> Self {
        Self { catalog }
    }

    /// Returns the catalog.
    pub fn catalog(&self) -> &Arc<ParamCatalog> {
        &self.catalog
    }

    /// Extracts index rows, reference edges and compartment memberships.
    ///
    /// Only a non-object body is an error. A value that cannot be converted
    /// is logged and skipped; the rest of the document is still indexed.
    pub fn extract(
        &self,
        resource_type: &str,
        resource: &Value,
    ) -> Result<ExtractedDocument, ExtractionError> {
        if !resource.is_object() {
            return Err(ExtractionError::InvalidResource {
                message: "resource must be a JSON object".to_string(),
            });
        }

        let mut rows = Vec::new();
        let mut group = 0u32;

        for param in self.catalog.params_for(resource_type) {
            if param.param_type == SearchParamType::Composite {
                self.extract_composite(resource_type, resource, param, &mut group, &mut rows);
            } else {
                for value in self.extract_values(resource_type, resource, param) {
                    rows.push(IndexRow {
                        param_name: param.code.clone(),
                        param_type: param.param_type,
                        component: None,
                        composite_group: None,
                        value,
                    });
                }
            }
        }

        let memberships = self.memberships(resource_type, &rows);

        let mut edges = BTreeSet::new();
        collect_edges(resource, "", &mut edges);

        Ok(ExtractedDocument {
            rows,
            edges: edges.into_iter().collect(),
            memberships,
        })
    }

    fn extract_values(
        &self,
        resource_type: &str,
        resource: &Value,
        param: &SearchParamDef,
    ) -> Vec<IndexValue> {
        let mut values = Vec::new();
        for path in &param.paths {
            for node in path.evaluate(resource) {
                convert_node(
                    resource_type,
                    param,
                    param.param_type,
                    &param.code,
                    node,
                    &mut values,
                );
            }
        }
        values
    }

    fn extract_composite(
        &self,
        resource_type: &str,
        resource: &Value,
        param: &SearchParamDef,
        group: &mut u32,
        rows: &mut Vec<IndexRow>,
    ) {
        for context in param.paths.iter().flat_map(|p| p.evaluate(resource)) {
            let mut group_rows = Vec::new();
            let mut complete = true;

            for component in &param.components {
                let mut values = Vec::new();
                for node in component.paths.iter().flat_map(|p| p.evaluate(context)) {
                    convert_node(
                        resource_type,
                        param,
                        component.param_type,
                        &component.code,
                        node,
                        &mut values,
                    );
                }
                if values.is_empty() {
                    complete = false;
                    break;
                }
                group_rows.extend(values.into_iter().map(|value| IndexRow {
                    param_name: param.code.clone(),
                    param_type: component.param_type,
                    component: Some(component.code.clone()),
                    composite_group: Some(*group),
                    value,
                }));
            }

            // A group missing a component can never match.
            if complete {
                rows.extend(group_rows);
                *group += 1;
            }
        }
    }

    fn memberships(&self, resource_type: &str, rows: &[IndexRow]) -> Vec<CompartmentMembership> {
        let mut memberships = BTreeSet::new();
        for (compartment_type, params) in self.catalog.compartments_for(resource_type) {
            for row in rows.iter().filter(|r| params.contains(&r.param_name)) {
                if let IndexValue::Reference {
                    target: Some(target),
                    ..
                } = &row.value
                {
                    if let Some((rt, id)) = target.typed() {
                        if rt == compartment_type {
                            memberships.insert(CompartmentMembership {
                                compartment_type: compartment_type.to_string(),
                                compartment_id: id.to_string(),
                            });
                        }
                    }
                }
            }
        }
        memberships.into_iter().collect()
    }
}

fn convert_node(
    resource_type: &str,
    param: &SearchParamDef,
    param_type: SearchParamType,
    code: &str,
    node: &Value,
    out: &mut Vec<IndexValue>,
) {
    match ValueConverter::convert(node, param_type, code, param.single_target()) {
        Ok(values) => {
            out.extend(values.into_iter().filter(|v| target_allowed(param, v)));
        }
        Err(e) => warn!(
            resource_type,
            param = %param.code,
            error = %e,
            "Skipping search parameter value"
        ),
    }
}

fn target_allowed(param: &SearchParamDef, value: &IndexValue) -> bool {
    match value {
        IndexValue::Reference {
            target: Some(target),
            ..
        } => target
            .resource_type
            .as_deref()
            .is_none_or(|rt| param.allows_target(rt)),
        _ => true,
    }
}

fn collect_edges(value: &Value, path: &str, edges: &mut BTreeSet<ReferenceEdge>) {
    match value {
        Value::Object(obj) => {
            if let Some(reference) = obj.get("reference").and_then(Value::as_str) {
                if let Some(key) = normalize_reference(reference, None) {
                    if let Some((rt, id)) = key.typed() {
                        edges.insert(ReferenceEdge {
                            target_type: rt.to_string(),
                            target_id: id.to_string(),
                            path: path.to_string(),
                        });
                    }
                }
            }
            for (key, child) in obj {
                // References inside contained resources point relative to them.
                if key == "contained" || key == "reference" {
                    continue;
                }
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                collect_edges(child, &child_path, edges);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_edges(item, path, edges);
            }
        }
        _ => {}
    }
}
