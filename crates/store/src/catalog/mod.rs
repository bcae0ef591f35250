//! Search parameter catalog.
//!
//! The catalog is the single description of what can be searched: for each
//! resource type it maps a parameter code to a value type and one or more
//! [`PathExpr`]s into the document. It also carries the compartment
//! definitions used by `$everything` and the elements returned for
//! `_summary=true`.
//!
//! The catalog is immutable once built. It is constructed at startup with
//! [`ParamCatalog::builtin`] and shared behind an `Arc` by everything that
//! needs it.

mod builtin;
pub mod path;

use std::collections::{BTreeMap, HashMap};

use tracing::warn;

pub use path::{PathExpr, PathParseError, PathSegment};

use crate::types::SearchParamType;

/// Elements every projected resource keeps.
pub const ENVELOPE_ELEMENTS: &[&str] = &["resourceType", "id", "meta"];

/// Declaration of one search parameter for a resource type.
#[derive(Debug, Clone)]
pub struct SearchParamDef {
    /// Parameter code as used in query strings (e.g. `birthdate`).
    pub code: String,
    /// Value type of the parameter.
    pub param_type: SearchParamType,
    /// Alternative paths; the union of their leaves is indexed.
    pub paths: Vec<PathExpr>,
    /// Resource types a reference parameter may point at.
    pub targets: Vec<String>,
    /// Components of a composite parameter, evaluated relative to each node
    /// reached by `paths`.
    pub components: Vec<CompositeComponentDef>,
}

impl SearchParamDef {
    /// Returns the single declared target type, when unambiguous.
    pub fn single_target(&self) -> Option<&str> {
        match self.targets.as_slice() {
            [only] => Some(only.as_str()),
            _ => None,
        }
    }

    /// Returns `true` if a reference parameter may point at `resource_type`.
    pub fn allows_target(&self, resource_type: &str) -> bool {
        self.targets.is_empty() || self.targets.iter().any(|t| t == resource_type)
    }
}

/// One component of a composite parameter.
#[derive(Debug, Clone)]
pub struct CompositeComponentDef {
    /// Component code (the code of the equivalent simple parameter).
    pub code: String,
    /// Component value type.
    pub param_type: SearchParamType,
    /// Alternative paths relative to the composite's context node.
    pub paths: Vec<PathExpr>,
}

/// Catalog entry for one resource type.
#[derive(Debug, Clone, Default)]
pub struct ResourceDef {
    /// Parameters declared specifically for this type.
    pub params: BTreeMap<String, SearchParamDef>,
    /// Top-level elements returned for `_summary=true`.
    pub summary_elements: Vec<String>,
}

/// A compartment: which resource types belong to a subject and through
/// which reference parameters.
#[derive(Debug, Clone)]
pub struct CompartmentDef {
    /// Compartment (subject) type, e.g. `Patient`.
    pub compartment_type: String,
    /// Member resource type to the reference parameters linking it to the subject.
    pub members: BTreeMap<String, Vec<String>>,
    /// Types that are bundled with the compartment when referenced by a member,
    /// even though they are not members themselves.
    pub linked_types: Vec<String>,
}

impl CompartmentDef {
    /// Returns the linking parameters for a member type.
    pub fn params_for(&self, resource_type: &str) -> Option<&[String]> {
        self.members.get(resource_type).map(Vec::as_slice)
    }
}

/// The complete, immutable search parameter catalog.
#[derive(Debug, Clone, Default)]
pub struct ParamCatalog {
    resources: HashMap<String, ResourceDef>,
    common: BTreeMap<String, SearchParamDef>,
    compartments: HashMap<String, CompartmentDef>,
    default_summary: Vec<String>,
}

impl ParamCatalog {
    /// Builds the catalog from the bundled parameter table.
    ///
    /// Entries whose path fails to parse are logged and left out; the rest of
    /// the catalog is still usable.
    pub fn builtin() -> Self {
        let mut catalog = ParamCatalog {
            default_summary: builtin::DEFAULT_SUMMARY
                .iter()
                .map(|s| s.to_string())
                .collect(),
            ..Default::default()
        };

        for spec in builtin::COMMON_PARAMS {
            match spec.to_def() {
                Ok(def) => {
                    catalog.common.insert(def.code.clone(), def);
                }
                Err(e) => warn!(param = spec.code, error = %e, "Skipping common search parameter"),
            }
        }

        for spec in builtin::PARAMS {
            match spec.to_def() {
                Ok(def) => catalog.insert(spec.resource, def),
                Err(e) => warn!(
                    resource_type = spec.resource,
                    param = spec.code,
                    error = %e,
                    "Skipping search parameter with invalid path"
                ),
            }
        }

        for spec in builtin::COMPOSITES {
            match spec.to_def() {
                Ok(def) => catalog.insert(spec.resource, def),
                Err(e) => warn!(
                    resource_type = spec.resource,
                    param = spec.code,
                    error = %e,
                    "Skipping composite search parameter"
                ),
            }
        }

        for (resource_type, elements) in builtin::SUMMARY_ELEMENTS {
            catalog
                .resources
                .entry(resource_type.to_string())
                .or_default()
                .summary_elements = elements.iter().map(|s| s.to_string()).collect();
        }

        for (compartment_type, members, linked) in builtin::COMPARTMENTS {
            let def = CompartmentDef {
                compartment_type: compartment_type.to_string(),
                members: members
                    .iter()
                    .map(|(rt, params)| {
                        (
                            rt.to_string(),
                            params.iter().map(|p| p.to_string()).collect(),
                        )
                    })
                    .collect(),
                linked_types: linked.iter().map(|s| s.to_string()).collect(),
            };
            catalog
                .compartments
                .insert(compartment_type.to_string(), def);
        }

        catalog
    }

    /// Adds or replaces a parameter for a resource type.
    pub fn insert(&mut self, resource_type: &str, def: SearchParamDef) {
        self.resources
            .entry(resource_type.to_string())
            .or_default()
            .params
            .insert(def.code.clone(), def);
    }

    /// Adds or replaces a compartment definition.
    pub fn insert_compartment(&mut self, def: CompartmentDef) {
        self.compartments.insert(def.compartment_type.clone(), def);
    }

    /// Looks up a parameter, falling back to the parameters shared by all types.
    pub fn get(&self, resource_type: &str, code: &str) -> Option<&SearchParamDef> {
        self.resources
            .get(resource_type)
            .and_then(|r| r.params.get(code))
            .or_else(|| self.common.get(code))
    }

    /// Iterates over every parameter that applies to a resource type.
    pub fn params_for<'a>(
        &'a self,
        resource_type: &str,
    ) -> impl Iterator<Item = &'a SearchParamDef> + 'a {
        let specific = self.resources.get(resource_type).map(|r| &r.params);
        let common = self
            .common
            .values()
            .filter(move |def| specific.is_none_or(|params| !params.contains_key(&def.code)));
        specific
            .into_iter()
            .flat_map(|params| params.values())
            .chain(common)
    }

    /// Returns `true` if the type has its own catalog entry.
    pub fn knows_type(&self, resource_type: &str) -> bool {
        self.resources.contains_key(resource_type)
    }

    /// Returns every resource type with its own catalog entry, sorted.
    pub fn resource_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.resources.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Returns the `_summary=true` element list for a type.
    pub fn summary_elements(&self, resource_type: &str) -> &[String] {
        self.resources
            .get(resource_type)
            .map(|r| r.summary_elements.as_slice())
            .filter(|elements| !elements.is_empty())
            .unwrap_or(&self.default_summary)
    }

    /// Returns a compartment definition.
    pub fn compartment(&self, compartment_type: &str) -> Option<&CompartmentDef> {
        self.compartments.get(compartment_type)
    }

    /// Iterates over the compartments a resource type can belong to, with the
    /// parameters that link it.
    pub fn compartments_for<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a [String])> + 'a {
        self.compartments.values().filter_map(move |c| {
            c.params_for(resource_type)
                .map(|params| (c.compartment_type.as_str(), params))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_loads_core_types() {
        let catalog = ParamCatalog::builtin();
        for rt in ["Patient", "Observation", "Encounter", "Condition", "Organization"] {
            assert!(catalog.knows_type(rt), "missing {rt}");
        }
    }

    #[test]
    fn test_every_builtin_path_parses() {
        for spec in builtin::PARAMS {
            assert!(spec.to_def().is_ok(), "{}.{}", spec.resource, spec.code);
        }
        for spec in builtin::COMPOSITES {
            assert!(spec.to_def().is_ok(), "{}.{}", spec.resource, spec.code);
        }
    }

    #[test]
    fn test_lookup_falls_back_to_common() {
        let catalog = ParamCatalog::builtin();
        let id = catalog.get("Patient", "_id").unwrap();
        assert_eq!(id.param_type, SearchParamType::Token);
        let last_updated = catalog.get("Basic", "_lastUpdated").unwrap();
        assert_eq!(last_updated.param_type, SearchParamType::Date);
        assert!(catalog.get("Patient", "no-such-param").is_none());
    }

    #[test]
    fn test_reference_targets() {
        let catalog = ParamCatalog::builtin();
        let patient = catalog.get("Observation", "patient").unwrap();
        assert_eq!(patient.single_target(), Some("Patient"));

        let subject = catalog.get("Observation", "subject").unwrap();
        assert!(subject.allows_target("Patient"));
        assert!(subject.allows_target("Group"));
        assert!(!subject.allows_target("Organization"));
    }

    #[test]
    fn test_params_for_includes_common_once() {
        let catalog = ParamCatalog::builtin();
        let codes: Vec<&str> = catalog
            .params_for("Patient")
            .map(|d| d.code.as_str())
            .collect();
        assert!(codes.contains(&"birthdate"));
        assert_eq!(codes.iter().filter(|c| **c == "_id").count(), 1);
    }

    #[test]
    fn test_patient_compartment() {
        let catalog = ParamCatalog::builtin();
        let compartment = catalog.compartment("Patient").unwrap();
        assert_eq!(
            compartment.params_for("Coverage"),
            Some(&["beneficiary".to_string()][..])
        );
        assert!(compartment.params_for("Organization").is_none());
        assert!(compartment.linked_types.iter().any(|t| t == "Encounter"));

        let memberships: Vec<&str> = catalog
            .compartments_for("Observation")
            .map(|(c, _)| c)
            .collect();
        assert!(memberships.contains(&"Patient"));
        assert!(memberships.contains(&"Encounter"));
    }

    #[test]
    fn test_summary_elements() {
        let catalog = ParamCatalog::builtin();
        assert!(catalog
            .summary_elements("Patient")
            .iter()
            .any(|e| e == "birthDate"));
        assert!(!catalog.summary_elements("Unknown").is_empty());
    }
}
