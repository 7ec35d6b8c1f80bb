//! The initial-sweep driver (component E): after a computed attribute is
//! first declared (or an automation is (re)registered), every existing node
//! of the relevant kind needs one reconciliation run submitted, not just
//! future events. Matches `trigger_update_jinja2_computed_attributes` and
//! `trigger_update_python_computed_attributes` from
//! `original_source/backend/infrahub/computed_attribute/tasks.py`.

use crate::engine::automation::WorkflowEngine;
use crate::engine::index::{SchemaIndex, TemplateDescriptor, TransformDescriptor};
use crate::engine::workers::UPDATE_COMPUTED_ATTRIBUTE_TRANSFORM_WORKFLOW;
use crate::client::HostGraph;
use crate::Error;
use serde_json::json;
use tracing::info;

/// The workflow submitted for every existing node of a `TEMPLATE`
/// descriptor's kind, matching `PROCESS_COMPUTED_MACRO`.
pub const PROCESS_COMPUTED_MACRO_WORKFLOW: &str = "process_computed_attribute_macro";

/// Sweeps every existing node of `descriptor`'s kind on `branch_name`,
/// submitting one `process_computed_attribute_macro` run per node.
pub async fn sweep_template_descriptor(
    host: &dyn HostGraph,
    workflow_engine: &dyn WorkflowEngine,
    branch_name: &str,
    descriptor: &TemplateDescriptor,
) -> Result<usize, Error> {
    let nodes = host
        .all_nodes(&descriptor.node_kind)
        .await
        .map_err(|e| Error::HostQueryError { source: Box::new(e) })?;

    for node in &nodes {
        let object_id = node.get("id").and_then(|v| v.as_str()).unwrap_or_default();
        workflow_engine
            .submit_workflow(
                PROCESS_COMPUTED_MACRO_WORKFLOW,
                json!({
                    "branch_name": branch_name,
                    "computed_attribute_name": descriptor.attribute_name,
                    "computed_attribute_kind": "Jinja2",
                    "node_kind": descriptor.node_kind,
                    "object_id": object_id,
                }),
            )
            .await
            .map_err(|e| Error::EngineUnavailable {
                message: e.to_string(),
            })?;
    }

    info!(
        "submitted {} initial-sweep runs for {}",
        nodes.len(),
        descriptor.key_name()
    );
    Ok(nodes.len())
}

/// Sweeps every existing node of `descriptor`'s kind on `branch_name`,
/// submitting one `update_computed_attribute_transform` run per node.
pub async fn sweep_transform_descriptor(
    host: &dyn HostGraph,
    workflow_engine: &dyn WorkflowEngine,
    branch_name: &str,
    descriptor: &TransformDescriptor,
) -> Result<usize, Error> {
    let nodes = host
        .all_nodes(&descriptor.node_kind)
        .await
        .map_err(|e| Error::HostQueryError { source: Box::new(e) })?;

    for node in &nodes {
        let object_id = node.get("id").and_then(|v| v.as_str()).unwrap_or_default();
        workflow_engine
            .submit_workflow(
                UPDATE_COMPUTED_ATTRIBUTE_TRANSFORM_WORKFLOW,
                json!({
                    "branch_name": branch_name,
                    "node_kind": descriptor.node_kind,
                    "object_id": object_id,
                    "computed_attribute_name": descriptor.attribute_name,
                    "computed_attribute_kind": descriptor.attribute_kind,
                }),
            )
            .await
            .map_err(|e| Error::EngineUnavailable {
                message: e.to_string(),
            })?;
    }

    info!(
        "submitted {} initial-sweep runs for {}",
        nodes.len(),
        descriptor.key_name()
    );
    Ok(nodes.len())
}

/// Sweeps every descriptor in `index` on `branch_name`. Returns the total
/// number of reconciliation runs submitted.
pub async fn run_initial_sweep(
    host: &dyn HostGraph,
    workflow_engine: &dyn WorkflowEngine,
    branch_name: &str,
    index: &SchemaIndex,
) -> Result<usize, Error> {
    let mut submitted = 0;
    for descriptor in index.all_template_descriptors() {
        submitted += sweep_template_descriptor(host, workflow_engine, branch_name, descriptor).await?;
    }
    for descriptor in index.all_transform_descriptors() {
        submitted += sweep_transform_descriptor(host, workflow_engine, branch_name, descriptor).await?;
    }
    Ok(submitted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::event::AutomationSpec;
    use crate::engine::schema::{AttributeSchema, NodeSchema, SchemaBranch};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Mutex;

    struct FakeHost {
        nodes: Vec<Value>,
    }

    #[async_trait]
    impl HostGraph for FakeHost {
        async fn query_nodes_with_shape(&self, _kind: &str, _filters: &Value, _shape: &str) -> Result<Vec<Value>, Error> {
            Ok(self.nodes.clone())
        }
        async fn all_nodes(&self, _kind: &str) -> Result<Vec<Value>, Error> {
            Ok(self.nodes.clone())
        }
        async fn query_subscribers(&self, _query_ids: &[String]) -> Result<Vec<Value>, Error> {
            Ok(Vec::new())
        }
        async fn update_computed_attribute(&self, _id: &str, _kind: &str, _attribute: &str, _value: &str) -> Result<(), Error> {
            Ok(())
        }
        async fn repository_commit(&self, _repository_id: &str, _repository_kind: &str) -> Result<String, Error> {
            Ok("abc123".to_string())
        }
        async fn run_stored_query(&self, _query_name: &str, _variables: &Value) -> Result<Value, Error> {
            Ok(json!({}))
        }
    }

    #[derive(Default)]
    struct RecordingEngine {
        submitted: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait]
    impl WorkflowEngine for RecordingEngine {
        async fn list_automations(&self) -> Result<Vec<(String, String)>, Error> {
            Ok(Vec::new())
        }
        async fn create_automation(&self, _spec: &AutomationSpec) -> Result<String, Error> {
            Ok("auto-1".to_string())
        }
        async fn update_automation(&self, _id: &str, _spec: &AutomationSpec) -> Result<(), Error> {
            Ok(())
        }
        async fn read_deployments(&self, _names: &[String]) -> Result<Vec<crate::engine::automation::Deployment>, Error> {
            Ok(Vec::new())
        }
        async fn submit_workflow(&self, workflow_name: &str, parameters: Value) -> Result<(), Error> {
            self.submitted.lock().unwrap().push((workflow_name.to_string(), parameters));
            Ok(())
        }
    }

    #[tokio::test]
    async fn sweep_submits_one_run_per_existing_node() {
        let node = NodeSchema::new("TShirt").with_attribute(AttributeSchema::computed_template(
            "display_label",
            "Text",
            "{{ name__value }}",
        ));
        let branch = SchemaBranch::new("main").with_node(node);
        let index = SchemaIndex::build(&branch);

        let host = FakeHost {
            nodes: vec![json!({"id": "a"}), json!({"id": "b"}), json!({"id": "c"})],
        };
        let engine = RecordingEngine::default();

        let submitted = run_initial_sweep(&host, &engine, "main", &index).await.unwrap();

        assert_eq!(submitted, 3);
        assert_eq!(engine.submitted.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn sweep_with_no_nodes_submits_nothing() {
        let node = NodeSchema::new("TShirt").with_attribute(AttributeSchema::computed_template(
            "display_label",
            "Text",
            "{{ name__value }}",
        ));
        let branch = SchemaBranch::new("main").with_node(node);
        let index = SchemaIndex::build(&branch);

        let host = FakeHost { nodes: Vec::new() };
        let engine = RecordingEngine::default();

        let submitted = run_initial_sweep(&host, &engine, "main", &index).await.unwrap();
        assert_eq!(submitted, 0);
    }
}
