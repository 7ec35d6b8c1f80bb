//! Builds the dependency index used to route node-change events to the
//! computed attributes they affect, and to resolve the filters a `TRANSFORM`
//! descriptor's query targets.
//!
//! Grounded in `ComputedAttributes`/`PythonDefinition` from
//! `original_source/backend/infrahub/core/schema/schema_branch_computed.py`
//! and the `jinja2_target_map`/`python_by_transform` construction inlined in
//! `computed_attribute_setup`/`computed_attribute_setup_python` in
//! `original_source/backend/infrahub/computed_attribute/tasks.py`.

use crate::engine::schema::{Cardinality, ComputedAttributeFlavor, SchemaBranch};
use crate::template::MacroDefinition;
use crate::Error;
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// A fully resolved `TEMPLATE`-flavor descriptor: the owning node kind, the
/// attribute name it computes, and its parsed macro.
#[derive(Clone, Debug)]
pub struct TemplateDescriptor {
    pub node_kind: String,
    pub attribute_name: String,
    pub macro_definition: MacroDefinition,
    /// Maps each variable reference to the node kind whose change should
    /// trigger a re-render through it: the owning node kind for a two-segment
    /// `prop__sub` reference, the relationship's peer kind for a
    /// three-segment `rel__prop__sub` reference.
    variable_source_kinds: HashMap<String, String>,
}

impl TemplateDescriptor {
    pub fn key_name(&self) -> String {
        format!("{}_{}", self.node_kind, self.attribute_name)
    }

    /// Attribute filter names this descriptor's template needs to look up
    /// nodes that changed through a relationship, one per `rel__*`
    /// reference, matching `computed_macro.node_filters` in the original
    /// `process_jinja2` flow.
    pub fn node_filters(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .macro_definition
            .variables()
            .iter()
            .filter_map(|variable| {
                let parts: Vec<&str> = variable.split("__").collect();
                (parts.len() == 3).then(|| format!("{}__ids", parts[0]))
            })
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

/// A fully resolved `TRANSFORM`-flavor descriptor, mirroring the original's
/// `PythonDefinition` plus the query identity a transform needs to run.
#[derive(Clone, Debug)]
pub struct TransformDescriptor {
    pub node_kind: String,
    pub attribute_name: String,
    /// Scalar output type of the computed attribute (e.g. `Text`, `Number`),
    /// burnt in at registration and carried on every workflow run submitted
    /// for this descriptor.
    pub attribute_kind: String,
    pub transform_ref: String,
    pub query_name: String,
    pub query_models: Vec<String>,
    pub repository_id: String,
    pub repository_name: String,
    pub repository_kind: String,
}

impl TransformDescriptor {
    pub fn key_name(&self) -> String {
        format!("{}_{}", self.node_kind, self.attribute_name)
    }
}

/// The dependency index for a single branch schema: maps node changes to the
/// computed attributes that depend on them.
#[derive(Clone, Debug, Default)]
pub struct SchemaIndex {
    /// For `TEMPLATE` descriptors: source node kind -> descriptors that
    /// reference that kind, either directly or through a relationship.
    jinja_target_map: HashMap<String, Vec<TemplateDescriptor>>,
    /// `TRANSFORM` descriptors keyed by `transform_ref`.
    python_by_transform: HashMap<String, Vec<TransformDescriptor>>,
    /// `TRANSFORM` descriptors keyed by the owning node kind.
    python_by_node: HashMap<String, Vec<TransformDescriptor>>,
}

impl SchemaIndex {
    /// Walks every node kind in `branch` and builds the dependency index,
    /// skipping (with a `warn!`) any computed-attribute descriptor that
    /// fails cardinality validation rather than aborting the whole build.
    pub fn build(branch: &SchemaBranch) -> SchemaIndex {
        let mut index = SchemaIndex::default();

        for node in branch.nodes() {
            for attribute in &node.attributes {
                let Some(flavor) = &attribute.computed else {
                    continue;
                };
                match flavor {
                    ComputedAttributeFlavor::Template { template } => {
                        match Self::resolve_template_sources(branch, node.kind.as_str(), template)
                        {
                            Ok(variable_source_kinds) => {
                                let descriptor = TemplateDescriptor {
                                    node_kind: node.kind.clone(),
                                    attribute_name: attribute.name.clone(),
                                    macro_definition: MacroDefinition::new(template),
                                    variable_source_kinds: variable_source_kinds.clone(),
                                };
                                // A template with no relationship/attribute variables still
                                // depends on its own node kind.
                                let mut kinds: HashSet<String> =
                                    variable_source_kinds.into_values().collect();
                                kinds.insert(node.kind.clone());
                                for kind in kinds {
                                    index
                                        .jinja_target_map
                                        .entry(kind)
                                        .or_default()
                                        .push(descriptor.clone());
                                }
                            }
                            Err(e) => {
                                warn!(
                                    "skipping computed attribute {}.{}: {}",
                                    node.kind, attribute.name, e
                                );
                            }
                        }
                    }
                    ComputedAttributeFlavor::Transform {
                        transform_ref,
                        query_name,
                        query_models,
                        repository_id,
                        repository_name,
                        repository_kind,
                    } => {
                        let descriptor = TransformDescriptor {
                            node_kind: node.kind.clone(),
                            attribute_name: attribute.name.clone(),
                            attribute_kind: attribute.kind.clone(),
                            transform_ref: transform_ref.clone(),
                            query_name: query_name.clone(),
                            query_models: query_models.clone(),
                            repository_id: repository_id.clone(),
                            repository_name: repository_name.clone(),
                            repository_kind: repository_kind.clone(),
                        };
                        index
                            .python_by_transform
                            .entry(transform_ref.clone())
                            .or_default()
                            .push(descriptor.clone());
                        index
                            .python_by_node
                            .entry(node.kind.clone())
                            .or_default()
                            .push(descriptor);
                    }
                }
            }
        }

        index
    }

    /// Validates a template's variable references against `node_kind`'s
    /// declared relationships and returns, for each variable, the source node
    /// kind a change to it should flow through: `node_kind` itself for a
    /// two-segment `prop__sub` reference, the relationship's peer kind for a
    /// three-segment `rel__prop__sub` reference.
    ///
    /// A two-segment reference is always valid (it reads the node's own
    /// attribute). A three-segment reference requires `rel` to be a
    /// cardinality-one relationship on `node_kind` — a cardinality-many near
    /// side cannot be bound to a single value, so this returns a
    /// [`Error::SchemaError`].
    fn resolve_template_sources(
        branch: &SchemaBranch,
        node_kind: &str,
        template: &str,
    ) -> Result<HashMap<String, String>, Error> {
        let macro_definition = MacroDefinition::new(template);
        let node = branch.get_node(node_kind)?;
        let mut sources = HashMap::new();

        for variable in macro_definition.variables() {
            let components: Vec<&str> = variable.split("__").collect();
            match components.len() {
                3 => {
                    let relationship_name = components[0];
                    let relationship = node.relationship(relationship_name).ok_or_else(|| {
                        Error::SchemaError {
                            message: format!(
                                "{} references unknown relationship {} on {}",
                                variable, relationship_name, node_kind
                            ),
                        }
                    })?;
                    if relationship.cardinality != Cardinality::One {
                        return Err(Error::SchemaError {
                            message: format!(
                                "{} cannot bind a single value from cardinality-many relationship {}",
                                variable, relationship_name
                            ),
                        });
                    }
                    sources.insert(variable.clone(), relationship.peer_kind.clone());
                }
                2 => {
                    sources.insert(variable.clone(), node_kind.to_string());
                }
                _ => {}
            }
        }

        Ok(sources)
    }

    /// Returns every `TEMPLATE` descriptor impacted by a change to `kind`,
    /// optionally narrowed to only those whose template actually references
    /// one of `updated_fields`. When `updated_fields` is `None`, every
    /// descriptor that depends on `kind` is returned (a full-node refresh).
    pub fn impacted_jinja(
        &self,
        kind: &str,
        updated_fields: Option<&[String]>,
    ) -> Vec<&TemplateDescriptor> {
        let Some(descriptors) = self.jinja_target_map.get(kind) else {
            return Vec::new();
        };
        match updated_fields {
            None => descriptors.iter().collect(),
            Some(fields) => descriptors
                .iter()
                .filter(|d| {
                    d.macro_definition.variables().iter().any(|v| {
                        if d.variable_source_kinds.get(v).map(String::as_str) != Some(kind) {
                            return false;
                        }
                        let parts: Vec<&str> = v.split("__").collect();
                        let changed_field = match parts.as_slice() {
                            // Own-attribute reference: the source field is the
                            // attribute segment itself.
                            [attribute, _sub] => *attribute,
                            // Relationship reference: the source field is the
                            // peer attribute, the middle segment.
                            [_relationship, attribute, _sub] => *attribute,
                            _ => return false,
                        };
                        fields.iter().any(|f| f == changed_field)
                    })
                })
                .collect(),
        }
    }

    /// Returns every `TRANSFORM` descriptor registered for `transform_ref`.
    pub fn python_by_transform(&self, transform_ref: &str) -> &[TransformDescriptor] {
        self.python_by_transform
            .get(transform_ref)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Returns every `TRANSFORM` descriptor owned by `node_kind`.
    pub fn python_by_node(&self, node_kind: &str) -> &[TransformDescriptor] {
        self.python_by_node.get(node_kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Returns every kind that has at least one `TRANSFORM` descriptor.
    pub fn kinds_with_python_attributes(&self) -> Vec<&str> {
        self.python_by_node.keys().map(String::as_str).collect()
    }

    /// Returns every `TEMPLATE` descriptor in the index, used by the
    /// initial-sweep driver.
    pub fn all_template_descriptors(&self) -> Vec<&TemplateDescriptor> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for descriptors in self.jinja_target_map.values() {
            for descriptor in descriptors {
                if seen.insert(descriptor.key_name()) {
                    out.push(descriptor);
                }
            }
        }
        out
    }

    /// Returns every `TRANSFORM` descriptor in the index, used by the
    /// initial-sweep driver.
    pub fn all_transform_descriptors(&self) -> Vec<&TransformDescriptor> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for descriptors in self.python_by_node.values() {
            for descriptor in descriptors {
                if seen.insert(descriptor.key_name()) {
                    out.push(descriptor);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::schema::{AttributeSchema, NodeSchema, RelationshipSchema};

    fn color_and_tshirt_branch() -> SchemaBranch {
        let color = NodeSchema::new("Color")
            .with_attribute(AttributeSchema::plain("name", "Text"))
            .with_attribute(AttributeSchema::plain("description", "Text"));
        let tshirt = NodeSchema::new("TShirt")
            .with_attribute(AttributeSchema::plain("name", "Text"))
            .with_attribute(AttributeSchema::computed_template(
                "display_label",
                "Text",
                "A {{ color__name__value }} {{ name__value }} t-shirt. {{ color__description__value }}",
            ))
            .with_relationship(RelationshipSchema {
                name: "color".to_string(),
                peer_kind: "Color".to_string(),
                cardinality: Cardinality::One,
            });
        SchemaBranch::new("main").with_node(color).with_node(tshirt)
    }

    #[test]
    fn template_descriptor_targets_own_kind_and_peer_kind() {
        let branch = color_and_tshirt_branch();
        let index = SchemaIndex::build(&branch);

        assert_eq!(index.impacted_jinja("TShirt", None).len(), 1);
        assert_eq!(index.impacted_jinja("Color", None).len(), 1);
        assert!(index.impacted_jinja("Unrelated", None).is_empty());
    }

    #[test]
    fn impacted_jinja_narrows_by_updated_fields() {
        let branch = color_and_tshirt_branch();
        let index = SchemaIndex::build(&branch);

        assert!(index
            .impacted_jinja("Color", Some(&["description".to_string()]))
            .len()
            == 1);
        assert!(index
            .impacted_jinja("Color", Some(&["unrelated_field".to_string()]))
            .is_empty());
    }

    #[test]
    fn cardinality_many_relationship_reference_is_rejected() {
        let tshirt = NodeSchema::new("TShirt")
            .with_attribute(AttributeSchema::computed_template(
                "summary",
                "Text",
                "{{ tags__name__value }}",
            ))
            .with_relationship(RelationshipSchema {
                name: "tags".to_string(),
                peer_kind: "Tag".to_string(),
                cardinality: Cardinality::Many,
            });
        let branch = SchemaBranch::new("main").with_node(tshirt);
        let index = SchemaIndex::build(&branch);

        // The offending descriptor is skipped, not propagated as a panic.
        assert!(index.impacted_jinja("TShirt", None).is_empty());
    }

    #[test]
    fn transform_descriptors_indexed_by_transform_ref_and_node() {
        let node = NodeSchema::new("Device").with_attribute(AttributeSchema::computed_transform(
            "interface_count",
            "Number",
            "count_interfaces",
            "device_interfaces",
            vec!["Device".to_string()],
            "repo-1",
            "infrastructure-templates",
            "GitRepository",
        ));
        let branch = SchemaBranch::new("main").with_node(node);
        let index = SchemaIndex::build(&branch);

        assert_eq!(index.python_by_transform("count_interfaces").len(), 1);
        assert_eq!(index.python_by_node("Device").len(), 1);
        assert_eq!(index.kinds_with_python_attributes(), vec!["Device"]);
    }
}
