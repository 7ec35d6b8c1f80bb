use async_trait::async_trait;
use infrahub_computed_attributes::client::HostGraph;
use infrahub_computed_attributes::engine::automation::{AutomationDescriptor, Deployment, WorkflowEngine};
use infrahub_computed_attributes::engine::event::AutomationSpec;
use infrahub_computed_attributes::Error;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

#[allow(dead_code)]
pub fn init() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// An in-memory stand-in for the workflow engine. Automations are stored
/// keyed by name so `reconcile` can be exercised across repeated
/// invocations without a live Prefect-like service.
#[derive(Default)]
pub struct FakeWorkflowEngine {
    automations: Mutex<HashMap<String, (String, AutomationSpec)>>,
    next_id: Mutex<u32>,
    pub submitted: Mutex<Vec<(String, Value)>>,
}

impl FakeWorkflowEngine {
    pub fn new() -> FakeWorkflowEngine {
        FakeWorkflowEngine::default()
    }

    /// The current automation names, for assertions against the catalog
    /// this crate produces.
    pub fn automation_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.automations.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn spec_for(&self, name: &str) -> Option<AutomationSpec> {
        self.automations.lock().unwrap().get(name).map(|(_, spec)| spec.clone())
    }
}

#[async_trait]
impl WorkflowEngine for FakeWorkflowEngine {
    async fn list_automations(&self) -> Result<Vec<(String, String)>, Error> {
        Ok(self
            .automations
            .lock()
            .unwrap()
            .iter()
            .map(|(name, (id, _))| (id.clone(), name.clone()))
            .collect())
    }

    async fn create_automation(&self, spec: &AutomationSpec) -> Result<String, Error> {
        let mut next_id = self.next_id.lock().unwrap();
        *next_id += 1;
        let id = format!("auto-{}", *next_id);
        self.automations
            .lock()
            .unwrap()
            .insert(spec.name.clone(), (id.clone(), spec.clone()));
        Ok(id)
    }

    async fn update_automation(&self, automation_id: &str, spec: &AutomationSpec) -> Result<(), Error> {
        self.automations
            .lock()
            .unwrap()
            .insert(spec.name.clone(), (automation_id.to_string(), spec.clone()));
        Ok(())
    }

    async fn read_deployments(&self, names: &[String]) -> Result<Vec<Deployment>, Error> {
        Ok(names
            .iter()
            .map(|name| Deployment {
                name: name.clone(),
                id: format!("deployment-{}", name),
            })
            .collect())
    }

    async fn submit_workflow(&self, workflow_name: &str, parameters: Value) -> Result<(), Error> {
        self.submitted
            .lock()
            .unwrap()
            .push((workflow_name.to_string(), parameters));
        Ok(())
    }
}

#[allow(dead_code)]
pub fn parse_catalog_names(engine: &FakeWorkflowEngine) -> Vec<AutomationDescriptor> {
    engine
        .automation_names()
        .into_iter()
        .filter_map(|name| AutomationDescriptor::parse("id", &name))
        .collect()
}

/// An in-memory stand-in for the host graph. Nodes are stored as raw JSON
/// keyed by id, matching the shape the GraphQL client would hand back
/// (`{ attr: { value: ... }, rel: { node: {...} } }`).
#[derive(Default)]
pub struct FakeHostGraph {
    pub nodes: Mutex<HashMap<String, Value>>,
    pub subscribers: Mutex<Vec<Value>>,
}

impl FakeHostGraph {
    pub fn new() -> FakeHostGraph {
        FakeHostGraph::default()
    }

    pub fn set_subscribers(&self, subscribers: Vec<Value>) {
        *self.subscribers.lock().unwrap() = subscribers;
    }

    pub fn insert(&self, node: Value) {
        let id = node.get("id").and_then(|v| v.as_str()).unwrap().to_string();
        self.nodes.lock().unwrap().insert(id, node);
    }

    pub fn get(&self, id: &str) -> Option<Value> {
        self.nodes.lock().unwrap().get(id).cloned()
    }
}

#[async_trait]
impl HostGraph for FakeHostGraph {
    async fn query_nodes_with_shape(&self, kind: &str, filters: &Value, _shape: &str) -> Result<Vec<Value>, Error> {
        let nodes = self.nodes.lock().unwrap();
        let declared_kind = filters.get("__kind").and_then(|v| v.as_str());
        Ok(nodes
            .values()
            .filter(|n| {
                let matches_kind = declared_kind.map(|k| k == kind).unwrap_or(true);
                let matches_filter = filters
                    .as_object()
                    .map(|obj| {
                        obj.iter().all(|(key, value)| {
                            if key == "__kind" {
                                return true;
                            }
                            if key == "ids" {
                                return value
                                    .as_array()
                                    .map(|ids| ids.iter().any(|id| n.get("id") == Some(id)))
                                    .unwrap_or(true);
                            }
                            // Relationship filters of shape `rel__ids`: match the
                            // relationship peer's id against the filter value.
                            if let Some(rel) = key.strip_suffix("__ids") {
                                return n
                                    .get(rel)
                                    .and_then(|r| r.get("node"))
                                    .and_then(|peer| peer.get("id"))
                                    .map(|id| id == value)
                                    .unwrap_or(false);
                            }
                            true
                        })
                    })
                    .unwrap_or(true);
                matches_kind && matches_filter
            })
            .cloned()
            .collect())
    }

    async fn all_nodes(&self, _kind: &str) -> Result<Vec<Value>, Error> {
        Ok(self.nodes.lock().unwrap().values().cloned().collect())
    }

    async fn query_subscribers(&self, _query_ids: &[String]) -> Result<Vec<Value>, Error> {
        Ok(self.subscribers.lock().unwrap().clone())
    }

    async fn update_computed_attribute(&self, id: &str, _kind: &str, attribute: &str, value: &str) -> Result<(), Error> {
        let mut nodes = self.nodes.lock().unwrap();
        if let Some(node) = nodes.get_mut(id) {
            node[attribute] = serde_json::json!({ "value": value });
        }
        Ok(())
    }

    async fn repository_commit(&self, _repository_id: &str, _repository_kind: &str) -> Result<String, Error> {
        Ok("abc123".to_string())
    }

    async fn run_stored_query(&self, _query_name: &str, _variables: &Value) -> Result<Value, Error> {
        Ok(serde_json::json!({}))
    }
}
