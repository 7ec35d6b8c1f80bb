//! The branch schema as seen by the reconciliation engine: node kinds,
//! their attributes and relationships, and which attributes are computed.
//!
//! This is a deliberately small model — just enough of Infrahub's schema to
//! drive dependency discovery (component B) and automation registration
//! (component C). The GraphQL schema builder that turns a full Infrahub
//! schema into a GraphQL API is out of scope; this module only needs to
//! answer "which attributes are computed, and what do they depend on".

use crate::Error;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Cardinality of a relationship, as seen from the node that declares it.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Cardinality {
    One,
    Many,
}

/// Scalar kind of an attribute's output. The engine always coerces the
/// computed value to a string for storage, but the declared kind is kept
/// around for descriptor identification in the event contract (the worker
/// automation parameters carry `computed_attribute_kind`).
pub type AttributeKind = String;

/// How a computed attribute's value is produced.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputedAttributeFlavor {
    /// A Jinja2-style string template expanded over node/relationship paths.
    Template { template: String },
    /// An external transform invoked with a GraphQL query result.
    Transform {
        transform_ref: String,
        query_name: String,
        query_models: Vec<String>,
        repository_id: String,
        repository_name: String,
        repository_kind: String,
    },
}

/// One relationship declared on a node kind.
#[derive(Clone, Debug)]
pub struct RelationshipSchema {
    pub name: String,
    pub peer_kind: String,
    pub cardinality: Cardinality,
}

/// One attribute declared on a node kind, computed or not.
#[derive(Clone, Debug)]
pub struct AttributeSchema {
    pub name: String,
    pub kind: AttributeKind,
    pub computed: Option<ComputedAttributeFlavor>,
}

impl AttributeSchema {
    pub fn plain(name: &str, kind: &str) -> AttributeSchema {
        AttributeSchema {
            name: name.to_string(),
            kind: kind.to_string(),
            computed: None,
        }
    }

    pub fn computed_template(name: &str, kind: &str, template: &str) -> AttributeSchema {
        AttributeSchema {
            name: name.to_string(),
            kind: kind.to_string(),
            computed: Some(ComputedAttributeFlavor::Template {
                template: template.to_string(),
            }),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn computed_transform(
        name: &str,
        kind: &str,
        transform_ref: &str,
        query_name: &str,
        query_models: Vec<String>,
        repository_id: &str,
        repository_name: &str,
        repository_kind: &str,
    ) -> AttributeSchema {
        AttributeSchema {
            name: name.to_string(),
            kind: kind.to_string(),
            computed: Some(ComputedAttributeFlavor::Transform {
                transform_ref: transform_ref.to_string(),
                query_name: query_name.to_string(),
                query_models,
                repository_id: repository_id.to_string(),
                repository_name: repository_name.to_string(),
                repository_kind: repository_kind.to_string(),
            }),
        }
    }
}

/// One node kind declared in a branch schema.
#[derive(Clone, Debug)]
pub struct NodeSchema {
    pub kind: String,
    pub attributes: Vec<AttributeSchema>,
    pub relationships: Vec<RelationshipSchema>,
}

impl NodeSchema {
    pub fn new(kind: &str) -> NodeSchema {
        NodeSchema {
            kind: kind.to_string(),
            attributes: Vec::new(),
            relationships: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, attribute: AttributeSchema) -> NodeSchema {
        self.attributes.push(attribute);
        self
    }

    pub fn with_relationship(mut self, relationship: RelationshipSchema) -> NodeSchema {
        self.relationships.push(relationship);
        self
    }

    pub fn relationship(&self, name: &str) -> Option<&RelationshipSchema> {
        self.relationships.iter().find(|r| r.name == name)
    }
}

/// A schema snapshot for one branch: a bag of node kinds. Computed attribute
/// descriptors are derived from this, never stored directly on it.
#[derive(Clone, Debug, Default)]
pub struct SchemaBranch {
    pub branch_name: String,
    nodes: HashMap<String, NodeSchema>,
}

impl SchemaBranch {
    pub fn new(branch_name: &str) -> SchemaBranch {
        SchemaBranch {
            branch_name: branch_name.to_string(),
            nodes: HashMap::new(),
        }
    }

    pub fn with_node(mut self, node: NodeSchema) -> SchemaBranch {
        self.nodes.insert(node.kind.clone(), node);
        self
    }

    pub fn get_node(&self, kind: &str) -> Result<&NodeSchema, Error> {
        self.nodes.get(kind).ok_or_else(|| Error::SchemaError {
            message: format!("no node schema found for kind {}", kind),
        })
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeSchema> {
        self.nodes.values()
    }
}
