//! The reconciliation workers (component D): the three flows that actually
//! recompute and write back computed attribute values, invoked by whatever
//! embeds this crate in response to [`NodeEvent`]s.
//!
//! Grounded field-for-field in `process_jinja2`, `process_transform`, and
//! `query_transform_targets` from
//! `original_source/backend/infrahub/computed_attribute/tasks.py`.

use crate::client::HostGraph;
use crate::engine::automation::WorkflowEngine;
use crate::engine::event::NodeEvent;
use crate::engine::index::{SchemaIndex, TemplateDescriptor};
use crate::engine::transform::{RepositoryLocks, RepositoryRef, TransformRunner};
use crate::template::{AttrValue, NodeView};
use crate::Error;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};

/// The workflow submitted by `query_transform_targets` to re-run a
/// `TRANSFORM` descriptor for a newly-subscribing node, matching
/// `UPDATE_COMPUTED_ATTRIBUTE_TRANSFORM` from the original workflow
/// catalogue.
pub const UPDATE_COMPUTED_ATTRIBUTE_TRANSFORM_WORKFLOW: &str = "update_computed_attribute_transform";

/// Everything a reconciliation worker needs: the dependency index, and
/// handles to the three external collaborators (host graph, workflow
/// engine, transform sandbox).
pub struct ReconciliationContext {
    pub host: Arc<dyn HostGraph>,
    pub workflow_engine: Arc<dyn WorkflowEngine>,
    pub transform_runner: Arc<dyn TransformRunner>,
    pub repository_locks: RepositoryLocks,
    pub index: SchemaIndex,
}

impl ReconciliationContext {
    pub fn new(
        host: Arc<dyn HostGraph>,
        workflow_engine: Arc<dyn WorkflowEngine>,
        transform_runner: Arc<dyn TransformRunner>,
        index: SchemaIndex,
    ) -> ReconciliationContext {
        ReconciliationContext {
            host,
            workflow_engine,
            transform_runner,
            repository_locks: RepositoryLocks::new(),
            index,
        }
    }
}

/// A node fetched from the host graph, adapted to the template engine's
/// [`NodeView`] capability interface. Attributes are expected in Infrahub's
/// usual `{ value: ... }` shape; relationships in `{ node: { ... } }` shape.
struct JsonNodeView(Value);

impl NodeView for JsonNodeView {
    fn attribute(&self, attribute_name: &str, sub_property: &str) -> Option<AttrValue> {
        json_to_attr_value(self.0.get(attribute_name)?.get(sub_property)?)
    }

    fn relationship_peer(&self, relationship_name: &str) -> Option<Box<dyn NodeView>> {
        let peer = self.0.get(relationship_name)?.get("node")?;
        if peer.is_null() {
            return None;
        }
        Some(Box::new(JsonNodeView(peer.clone())))
    }
}

fn json_to_attr_value(value: &Value) -> Option<AttrValue> {
    match value {
        Value::String(s) => Some(AttrValue::String(s.clone())),
        Value::Number(n) => n.as_i64().map(AttrValue::Int).or_else(|| n.as_f64().map(AttrValue::Float)),
        Value::Bool(b) => Some(AttrValue::Bool(*b)),
        Value::Null => Some(AttrValue::Null),
        _ => None,
    }
}

/// Builds the GraphQL selection set needed to render `descriptor`'s
/// template: the computed attribute's own stored value (for the equality
/// guard), every own-attribute variable, and every relationship variable's
/// peer attribute, nested as `rel { node { attr { sub } } }`.
fn build_shape(descriptor: &TemplateDescriptor) -> String {
    let mut own_attrs: BTreeSet<(String, String)> = BTreeSet::new();
    let mut rel_attrs: BTreeMap<String, BTreeSet<(String, String)>> = BTreeMap::new();

    own_attrs.insert((descriptor.attribute_name.clone(), "value".to_string()));

    for variable in descriptor.macro_definition.variables() {
        let parts: Vec<&str> = variable.split("__").collect();
        match parts.as_slice() {
            [attribute, sub] => {
                own_attrs.insert(((*attribute).to_string(), (*sub).to_string()));
            }
            [relationship, attribute, sub] => {
                rel_attrs
                    .entry((*relationship).to_string())
                    .or_default()
                    .insert(((*attribute).to_string(), (*sub).to_string()));
            }
            _ => {}
        }
    }

    let mut shape = String::from("id ");
    for (attribute, sub) in &own_attrs {
        shape.push_str(&format!("{attribute} {{ {sub} }} "));
    }
    for (relationship, attrs) in &rel_attrs {
        shape.push_str(&format!("{relationship} {{ node {{ "));
        for (attribute, sub) in attrs {
            shape.push_str(&format!("{attribute} {{ {sub} }} "));
        }
        shape.push_str("} } ");
    }
    shape
}

/// Recomputes every `TEMPLATE` descriptor impacted by `event`, restricted to
/// `computed_attribute_name`, and writes back any value that changed.
/// Matches `process_jinja2`.
pub async fn process_jinja2(
    ctx: &ReconciliationContext,
    event: &NodeEvent,
    computed_attribute_name: &str,
) -> Result<(), Error> {
    let descriptors: Vec<&TemplateDescriptor> = ctx
        .index
        .impacted_jinja(&event.kind, event.updated_fields.as_deref())
        .into_iter()
        .filter(|d| d.attribute_name == computed_attribute_name)
        .collect();

    for descriptor in descriptors {
        let shape = build_shape(descriptor);

        let targets = if descriptor.node_kind == event.kind {
            ctx.host
                .query_nodes_with_shape(&descriptor.node_kind, &json!({ "ids": [event.id.clone()] }), &shape)
                .await?
        } else {
            let mut found = Vec::new();
            for filter_name in descriptor.node_filters() {
                let filters = json!({ filter_name: event.id });
                found.extend(
                    ctx.host
                        .query_nodes_with_shape(&descriptor.node_kind, &filters, &shape)
                        .await?,
                );
            }
            found
        };

        if targets.is_empty() {
            debug!("no nodes found that require updates for {}", descriptor.key_name());
        }

        for node in targets {
            let view = JsonNodeView(node.clone());
            let rendered = descriptor.macro_definition.render_for_node(&view);
            let existing_value = node
                .get(computed_attribute_name)
                .and_then(|a| a.get("value"))
                .and_then(|v| v.as_str())
                .unwrap_or("");

            if rendered == existing_value {
                debug!(
                    "ignoring update to {} with existing value on {}={}",
                    descriptor.key_name(),
                    computed_attribute_name,
                    rendered
                );
                continue;
            }

            let id = node.get("id").and_then(|v| v.as_str()).unwrap_or_default();
            ctx.host
                .update_computed_attribute(id, &descriptor.node_kind, computed_attribute_name, &rendered)
                .await?;
            info!(
                "updating computed attribute {}.{}='{}' ({})",
                descriptor.node_kind, computed_attribute_name, rendered, id
            );
        }
    }

    Ok(())
}

/// Recomputes every `TRANSFORM` descriptor owned by `event.kind`, running
/// each one's external transform against the host query's result and
/// writing back the rendered value. Matches `process_transform`.
pub async fn process_transform(ctx: &ReconciliationContext, event: &NodeEvent) -> Result<(), Error> {
    let descriptors = ctx.index.python_by_node(&event.kind).to_vec();
    if descriptors.is_empty() {
        return Ok(());
    }

    for descriptor in descriptors {
        let variables = json!({ "id": event.id });
        let query_result = ctx
            .host
            .run_stored_query(&descriptor.query_name, &variables)
            .await
            .map_err(|e| Error::HostQueryError { source: Box::new(e) })?;

        let repo = RepositoryRef {
            id: descriptor.repository_id.clone(),
            name: descriptor.repository_name.clone(),
            kind: descriptor.repository_kind.clone(),
        };
        let commit = ctx
            .host
            .repository_commit(&repo.id, &repo.kind)
            .await
            .map_err(|e| Error::HostQueryError { source: Box::new(e) })?;

        let rendered = ctx
            .repository_locks
            .run_exclusive(
                ctx.transform_runner.as_ref(),
                &repo,
                &commit,
                &descriptor.transform_ref,
                query_result,
            )
            .await?;

        ctx.host
            .update_computed_attribute(&event.id, &event.kind, &descriptor.attribute_name, &rendered)
            .await?;
        info!(
            "updating computed attribute {}.{}='{}' ({})",
            event.kind, descriptor.attribute_name, rendered, event.id
        );
    }

    Ok(())
}

/// Resolves the GraphQL-query subscribers of the changed node and submits an
/// `update_computed_attribute_transform` run for every `TRANSFORM`
/// descriptor owned by each subscriber's kind. Matches
/// `query_transform_targets`.
pub async fn query_transform_targets(ctx: &ReconciliationContext, event: &NodeEvent) -> Result<(), Error> {
    let subscribers = ctx
        .host
        .query_subscribers(std::slice::from_ref(&event.id))
        .await
        .map_err(|e| Error::HostQueryError { source: Box::new(e) })?;

    for subscriber in subscribers {
        let sub_kind = subscriber.get("__typename").and_then(|v| v.as_str()).unwrap_or_default();
        let sub_id = subscriber.get("id").and_then(|v| v.as_str()).unwrap_or_default();

        for descriptor in ctx.index.python_by_node(sub_kind) {
            ctx.workflow_engine
                .submit_workflow(
                    UPDATE_COMPUTED_ATTRIBUTE_TRANSFORM_WORKFLOW,
                    json!({
                        "branch_name": event.branch,
                        "node_kind": sub_kind,
                        "object_id": sub_id,
                        "computed_attribute_name": descriptor.attribute_name,
                        "computed_attribute_kind": descriptor.attribute_kind,
                    }),
                )
                .await
                .map_err(|e| Error::EngineUnavailable {
                    message: e.to_string(),
                })?;
        }
    }

    Ok(())
}
