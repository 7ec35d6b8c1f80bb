//! Jinja2-flavored macro templates for computed attributes.
//!
//! A template is a string containing `{{ variable }}` placeholders, where each
//! variable is a bare identifier of the shape `prop__sub` or
//! `rel__prop__sub`. [`MacroDefinition`] parses the placeholders once,
//! reports the set of variable names a caller must resolve bindings for, and
//! renders the template against a supplied binding map. Rendering never
//! performs I/O; resolving a variable's value against a node is the caller's
//! job, done through the [`NodeView`] capability interface so that this
//! module never needs to know how a node is represented.

use std::collections::{HashMap, HashSet};

/// A value a node can hand back for a single attribute or relationship-peer
/// property. Computed attributes are always stored as strings, but the
/// underlying scalar can be any of these; the engine coerces at render time.
#[derive(Clone, Debug, PartialEq)]
pub enum AttrValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl AttrValue {
    /// Renders the value the way it would appear interpolated into a template.
    pub fn to_template_string(&self) -> String {
        match self {
            AttrValue::String(s) => s.clone(),
            AttrValue::Int(i) => i.to_string(),
            AttrValue::Float(f) => f.to_string(),
            AttrValue::Bool(b) => b.to_string(),
            AttrValue::Null => String::new(),
        }
    }
}

/// Capability interface a node implementation satisfies so the template
/// engine can resolve `prop__sub` and `rel__prop__sub` variable references
/// without any reflection or dynamic dispatch magic. See the computed
/// attribute spec's design notes on dynamic attribute access.
pub trait NodeView {
    /// Looks up a sub-property (`.value`, `.name`, ...) on one of this node's
    /// own attributes. Returns `None` if the attribute or sub-property does
    /// not exist.
    fn attribute(&self, attribute_name: &str, sub_property: &str) -> Option<AttrValue>;

    /// Follows a cardinality-one relationship to its peer node. Returns
    /// `None` if the relationship is unset or the peer cannot be resolved.
    fn relationship_peer(&self, relationship_name: &str) -> Option<Box<dyn NodeView>>;
}

/// A single parsed variable reference, split on `__`.
#[derive(Clone, Debug, PartialEq)]
enum VariableRef {
    /// `prop__sub` — read `sub` off attribute `prop` on the node itself.
    Attribute { attribute: String, sub_property: String },
    /// `rel__prop__sub` — follow relationship `rel`, then read `sub` off
    /// attribute `prop` on the peer.
    Relationship {
        relationship: String,
        attribute: String,
        sub_property: String,
    },
}

impl VariableRef {
    fn parse(variable: &str) -> Option<VariableRef> {
        let components: Vec<&str> = variable.split("__").collect();
        match components.as_slice() {
            [attribute, sub_property] if !attribute.is_empty() && !sub_property.is_empty() => {
                Some(VariableRef::Attribute {
                    attribute: (*attribute).to_string(),
                    sub_property: (*sub_property).to_string(),
                })
            }
            [relationship, attribute, sub_property]
                if !relationship.is_empty() && !attribute.is_empty() && !sub_property.is_empty() =>
            {
                Some(VariableRef::Relationship {
                    relationship: (*relationship).to_string(),
                    attribute: (*attribute).to_string(),
                    sub_property: (*sub_property).to_string(),
                })
            }
            _ => None,
        }
    }

    fn resolve(&self, node: &dyn NodeView) -> AttrValue {
        match self {
            VariableRef::Attribute { attribute, sub_property } => {
                node.attribute(attribute, sub_property).unwrap_or(AttrValue::Null)
            }
            VariableRef::Relationship {
                relationship,
                attribute,
                sub_property,
            } => node
                .relationship_peer(relationship)
                .and_then(|peer| peer.attribute(attribute, sub_property))
                .unwrap_or(AttrValue::Null),
        }
    }
}

/// One token of a parsed template: either literal text, copied verbatim, or
/// a variable placeholder to be substituted at render time.
#[derive(Clone, Debug, PartialEq)]
enum Token {
    Literal(String),
    Variable(String),
}

/// A template parsed once, ready to report its variables or be rendered
/// repeatedly against different bindings.
///
/// # Examples
///
/// ```rust
/// use infrahub_computed_attributes::template::MacroDefinition;
/// use std::collections::HashMap;
///
/// let macro_def = MacroDefinition::new("{{ foo__bar }} things");
/// assert!(macro_def.variables().contains("foo__bar"));
///
/// let mut bindings = HashMap::new();
/// bindings.insert("foo__bar".to_string(), "1".to_string());
/// assert_eq!(macro_def.render(&bindings), "1 things");
/// ```
#[derive(Clone, Debug)]
pub struct MacroDefinition {
    tokens: Vec<Token>,
    variables: HashSet<String>,
}

impl MacroDefinition {
    /// Parses a template string, extracting the full set of variable
    /// references it contains. A `{{ ... }}` placeholder whose inner name is
    /// not of shape `A__B` or `A__B__C` produces no binding and is rendered
    /// as an empty string, matching the source's "other shape is ignored"
    /// rule.
    pub fn new(template: &str) -> MacroDefinition {
        let mut tokens = Vec::new();
        let mut variables = HashSet::new();

        let mut rest = template;
        while let Some(start) = rest.find("{{") {
            if start > 0 {
                tokens.push(Token::Literal(rest[..start].to_string()));
            }
            let after_open = &rest[start + 2..];
            let Some(end) = after_open.find("}}") else {
                // Unterminated placeholder: treat the remainder as a literal.
                tokens.push(Token::Literal(rest[start..].to_string()));
                rest = "";
                break;
            };
            let name = after_open[..end].trim().to_string();
            if VariableRef::parse(&name).is_some() {
                variables.insert(name.clone());
            }
            tokens.push(Token::Variable(name));
            rest = &after_open[end + 2..];
        }
        if !rest.is_empty() {
            tokens.push(Token::Literal(rest.to_string()));
        }

        MacroDefinition { tokens, variables }
    }

    /// Returns the complete set of variable names this template references,
    /// without evaluating any of them. Callers use this to pre-populate
    /// bindings before calling [`MacroDefinition::render`].
    pub fn variables(&self) -> &HashSet<String> {
        &self.variables
    }

    /// Renders the template against a map of pre-resolved bindings. Missing
    /// bindings and unrecognized placeholder shapes both substitute the
    /// empty string; rendering is pure and deterministic.
    pub fn render(&self, bindings: &HashMap<String, String>) -> String {
        let mut out = String::new();
        for token in &self.tokens {
            match token {
                Token::Literal(text) => out.push_str(text),
                Token::Variable(name) => {
                    if let Some(value) = bindings.get(name) {
                        out.push_str(value);
                    }
                }
            }
        }
        out
    }

    /// Resolves every variable reference against `node` and renders the
    /// result in one step. A broken relationship traversal or a missing
    /// attribute binds the empty string rather than failing the render.
    pub fn render_for_node(&self, node: &dyn NodeView) -> String {
        let mut bindings = HashMap::with_capacity(self.variables.len());
        for variable in &self.variables {
            if let Some(var_ref) = VariableRef::parse(variable) {
                bindings.insert(variable.clone(), var_ref.resolve(node).to_template_string());
            }
        }
        self.render(&bindings)
    }
}
