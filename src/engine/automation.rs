//! The automation registrar (component C): turns the [`SchemaIndex`] into a
//! set of reactive automations and reconciles them against whatever the
//! workflow engine currently has registered.
//!
//! Grounded in `ComputedAttributeAutomations` (automation catalog, keyed by
//! `{prefix}::{identifier}::{scope}`) from
//! `original_source/backend/infrahub/computed_attribute/models.py`, and the
//! `computed_attribute_setup`/`computed_attribute_setup_python` flows from
//! `original_source/backend/infrahub/computed_attribute/tasks.py`.

use crate::engine::event::{AutomationParameters, AutomationSpec, EventTrigger};
use crate::engine::index::SchemaIndex;
use crate::Error;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tracing::info;

/// The two automation kinds this crate ever registers, matching
/// `PROCESS_AUTOMATION_NAME_PREFIX`/`QUERY_AUTOMATION_NAME_PREFIX`.
pub const PROCESS_AUTOMATION_PREFIX: &str = "computed_attribute_process";
pub const QUERY_AUTOMATION_PREFIX: &str = "computed_attribute_query";

/// The default, never-interpreted automation scope. See the crate's design
/// notes: `scope` is carried as a string and reserved for future use.
pub const DEFAULT_SCOPE: &str = "default";

/// An automation as read back from the workflow engine, identified by its
/// `{prefix}::{identifier}::{scope}` name.
#[derive(Clone, Debug)]
pub struct AutomationDescriptor {
    pub id: String,
    pub prefix: String,
    pub identifier: String,
    pub scope: String,
}

impl AutomationDescriptor {
    /// Parses an automation name of shape `{prefix}::{identifier}::{scope}`.
    /// Names that don't split into exactly three `::`-separated components,
    /// or whose prefix isn't one this crate manages, are not automation
    /// descriptors and return `None`.
    pub fn parse(id: &str, name: &str) -> Option<AutomationDescriptor> {
        let parts: Vec<&str> = name.split("::").collect();
        let [prefix, identifier, scope] = parts.as_slice() else {
            return None;
        };
        if *prefix != PROCESS_AUTOMATION_PREFIX && *prefix != QUERY_AUTOMATION_PREFIX {
            return None;
        }
        Some(AutomationDescriptor {
            id: id.to_string(),
            prefix: prefix.to_string(),
            identifier: identifier.to_string(),
            scope: scope.to_string(),
        })
    }

    pub fn name(&self) -> String {
        format!("{}::{}::{}", self.prefix, self.identifier, self.scope)
    }
}

/// A catalog of this crate's own automations as currently registered with
/// the workflow engine, keyed by prefix then by `(identifier, scope)` —
/// matching `ComputedAttributeAutomations`, which is built separately per
/// prefix so that process and query-targets automations reconcile as two
/// independent sets.
#[derive(Clone, Debug, Default)]
pub struct AutomationCatalog {
    by_prefix: HashMap<String, HashMap<(String, String), AutomationDescriptor>>,
}

impl AutomationCatalog {
    /// Builds a catalog from the automations the workflow engine currently
    /// has registered, discarding any name that isn't a computed-attribute
    /// automation this crate manages.
    pub fn from_automations(automations: Vec<(String, String)>) -> AutomationCatalog {
        let mut catalog = AutomationCatalog::default();
        for (id, name) in automations {
            if let Some(descriptor) = AutomationDescriptor::parse(&id, &name) {
                catalog
                    .by_prefix
                    .entry(descriptor.prefix.clone())
                    .or_default()
                    .insert((descriptor.identifier.clone(), descriptor.scope.clone()), descriptor);
            }
        }
        catalog
    }

    pub fn has(&self, prefix: &str, identifier: &str, scope: &str) -> bool {
        self.get(prefix, identifier, scope).is_some()
    }

    pub fn get(&self, prefix: &str, identifier: &str, scope: &str) -> Option<&AutomationDescriptor> {
        self.by_prefix
            .get(prefix)
            .and_then(|scoped| scoped.get(&(identifier.to_string(), scope.to_string())))
    }
}

/// A deployment the workflow engine exposes, resolved by name.
#[derive(Clone, Debug)]
pub struct Deployment {
    pub name: String,
    pub id: String,
}

/// The workflow engine as seen by this crate: a narrow collaborator
/// interface, in the same spirit as the database collaborator traits this
/// lineage builds around external systems reached over the network. Never
/// embeds any reconciliation logic — only list/create/update primitives.
#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    /// Lists every automation currently registered, as `(id, name)` pairs.
    async fn list_automations(&self) -> Result<Vec<(String, String)>, Error>;

    /// Registers a brand new automation and returns its assigned id.
    async fn create_automation(&self, spec: &AutomationSpec) -> Result<String, Error>;

    /// Replaces an existing automation's definition in place.
    async fn update_automation(&self, automation_id: &str, spec: &AutomationSpec) -> Result<(), Error>;

    /// Resolves deployments by name, used to find the deployment id a
    /// `RunDeployment` action targets.
    async fn read_deployments(&self, names: &[String]) -> Result<Vec<Deployment>, Error>;

    /// Submits a one-off workflow run immediately, used by the initial-sweep
    /// driver and by the setup flow's trigger-update calls. `parameters` is
    /// serialized as the workflow's input.
    async fn submit_workflow(&self, workflow_name: &str, parameters: Value) -> Result<(), Error>;
}

/// The deployment name the reactive template-processing automation's
/// `RunDeployment` action targets.
pub const PROCESS_COMPUTED_MACRO_DEPLOYMENT: &str = "process_computed_attribute_macro";
/// The deployment name the reactive transform-processing automation's
/// `RunDeployment` action targets.
pub const PROCESS_COMPUTED_TRANSFORM_DEPLOYMENT: &str = "process_computed_attribute_transform";
/// The deployment name the query-targets automation's `RunDeployment` action targets.
pub const QUERY_TRANSFORM_TARGETS_DEPLOYMENT: &str = "query_computed_attribute_transform_targets";

/// Reconciles computed-attribute automations against a [`SchemaIndex`].
pub struct AutomationRegistrar<'a> {
    engine: &'a dyn WorkflowEngine,
}

impl<'a> AutomationRegistrar<'a> {
    pub fn new(engine: &'a dyn WorkflowEngine) -> AutomationRegistrar<'a> {
        AutomationRegistrar { engine }
    }

    /// Runs the four-step reconcile: list the engine's automations, build a
    /// catalog, create-or-update one process automation per descriptor (plus
    /// a query-targets automation per `TRANSFORM` descriptor), and leave any
    /// automation with no corresponding descriptor untouched — this crate
    /// never deletes automations.
    pub async fn reconcile(&self, index: &SchemaIndex) -> Result<(), Error> {
        let existing = self
            .engine
            .list_automations()
            .await
            .map_err(|e| Error::EngineUnavailable {
                message: e.to_string(),
            })?;
        let catalog = AutomationCatalog::from_automations(existing);

        for descriptor in index.all_template_descriptors() {
            let source_kinds = vec![descriptor.node_kind.clone()];
            let spec = AutomationSpec {
                name: format!(
                    "{}::{}::{}",
                    PROCESS_AUTOMATION_PREFIX,
                    descriptor.key_name(),
                    DEFAULT_SCOPE
                ),
                description: format!(
                    "Process value of the computed attribute for {} [{}]",
                    descriptor.key_name(),
                    DEFAULT_SCOPE
                ),
                enabled: true,
                trigger: EventTrigger::reactive_on_node_change(source_kinds),
                deployment_name: PROCESS_COMPUTED_MACRO_DEPLOYMENT.to_string(),
                parameters: AutomationParameters::templated(&descriptor.attribute_name, "Jinja2"),
            };
            self.create_or_update(&catalog, PROCESS_AUTOMATION_PREFIX, &descriptor.key_name(), &spec)
                .await?;
        }

        for descriptor in index.all_transform_descriptors() {
            let process_spec = AutomationSpec {
                name: format!(
                    "{}::{}::{}",
                    PROCESS_AUTOMATION_PREFIX,
                    descriptor.key_name(),
                    DEFAULT_SCOPE
                ),
                description: format!(
                    "Process value of the computed attribute for {} [{}]",
                    descriptor.key_name(),
                    DEFAULT_SCOPE
                ),
                enabled: true,
                trigger: EventTrigger::reactive_on_node_change(vec![descriptor.node_kind.clone()]),
                deployment_name: PROCESS_COMPUTED_TRANSFORM_DEPLOYMENT.to_string(),
                parameters: AutomationParameters::templated(&descriptor.attribute_name, "TransformPython"),
            };
            self.create_or_update(&catalog, PROCESS_AUTOMATION_PREFIX, &descriptor.key_name(), &process_spec)
                .await?;

            let query_spec = AutomationSpec {
                name: format!(
                    "{}::{}::{}",
                    QUERY_AUTOMATION_PREFIX,
                    descriptor.key_name(),
                    DEFAULT_SCOPE
                ),
                description: format!(
                    "Query the computed attribute targets for {} [{}]",
                    descriptor.key_name(),
                    DEFAULT_SCOPE
                ),
                enabled: true,
                trigger: EventTrigger::reactive_on_node_change(descriptor.query_models.clone()),
                deployment_name: QUERY_TRANSFORM_TARGETS_DEPLOYMENT.to_string(),
                parameters: AutomationParameters::templated(&descriptor.attribute_name, "TransformPython"),
            };
            self.create_or_update(&catalog, QUERY_AUTOMATION_PREFIX, &descriptor.key_name(), &query_spec)
                .await?;
        }

        Ok(())
    }

    async fn create_or_update(
        &self,
        catalog: &AutomationCatalog,
        prefix: &str,
        identifier: &str,
        spec: &AutomationSpec,
    ) -> Result<(), Error> {
        if let Some(existing) = catalog.get(prefix, identifier, DEFAULT_SCOPE) {
            self.engine
                .update_automation(&existing.id, spec)
                .await
                .map_err(|e| Error::EngineUnavailable {
                    message: e.to_string(),
                })?;
            info!("{} updated", identifier);
        } else {
            self.engine
                .create_automation(spec)
                .await
                .map_err(|e| Error::EngineUnavailable {
                    message: e.to_string(),
                })?;
            info!("{} created", identifier);
        }
        Ok(())
    }
}
