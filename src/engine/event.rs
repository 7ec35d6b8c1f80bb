//! Wire shapes for the event contract: the node-change event a worker is
//! invoked with, and the automation spec the registrar hands to the
//! workflow engine. Field names mirror `infrahub.node.*` resource keys and
//! the `AutomationCore`/`EventTrigger` shapes constructed in
//! `original_source/backend/infrahub/computed_attribute/tasks.py`.

use serde::{Deserialize, Serialize};

/// A node-change event as delivered to a reconciliation worker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeEvent {
    pub branch: String,
    pub kind: String,
    pub id: String,
    /// Names of the attributes that changed, when known. `None` means
    /// "treat this as a full-node refresh" (used by the initial sweep).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub updated_fields: Option<Vec<String>>,
}

/// Always `Reactive`: this crate only ever registers triggers that fire in
/// response to an event, never polling/scheduled triggers.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Posture {
    Reactive,
}

/// The event-matching trigger attached to an [`AutomationSpec`], matching
/// `EventTrigger`/`ResourceSpecification` from the original task module.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventTrigger {
    pub posture: Posture,
    pub expect: Vec<String>,
    /// Seconds of quiet period required before the trigger fires. Always 0:
    /// computed-attribute automations react immediately.
    pub within_seconds: u64,
    pub match_resource_kind: Vec<String>,
    pub threshold: u32,
}

impl EventTrigger {
    /// Builds the standard reactive node-change trigger this crate always
    /// registers: fires immediately (`within=0`) the first time
    /// (`threshold=1`) a `node.*` event matches one of `source_kinds`.
    pub fn reactive_on_node_change(source_kinds: Vec<String>) -> EventTrigger {
        EventTrigger {
            posture: Posture::Reactive,
            expect: vec!["node.*".to_string()],
            within_seconds: 0,
            match_resource_kind: source_kinds,
            threshold: 1,
        }
    }
}

/// The `RunDeployment` action parameters this crate submits. Every value is
/// a literal string, either a static descriptor field or a
/// `{{ event.resource[...] }}` template the workflow engine interpolates at
/// dispatch time; this crate never evaluates these templates itself.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct AutomationParameters {
    pub branch_name: String,
    pub node_kind: String,
    pub object_id: String,
    pub computed_attribute_name: String,
    pub computed_attribute_kind: String,
}

impl AutomationParameters {
    /// The standard template-parameter binding used by every computed-
    /// attribute automation this crate registers.
    pub fn templated(computed_attribute_name: &str, computed_attribute_kind: &str) -> AutomationParameters {
        AutomationParameters {
            branch_name: "{{ event.resource['infrahub.branch.name'] }}".to_string(),
            node_kind: "{{ event.resource['infrahub.node.kind'] }}".to_string(),
            object_id: "{{ event.resource['infrahub.node.id'] }}".to_string(),
            computed_attribute_name: computed_attribute_name.to_string(),
            computed_attribute_kind: computed_attribute_kind.to_string(),
        }
    }
}

/// The full automation spec this crate hands to the [`super::automation::WorkflowEngine`]
/// collaborator, matching `AutomationCore` from the original task module.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AutomationSpec {
    pub name: String,
    pub description: String,
    pub enabled: bool,
    pub trigger: EventTrigger,
    pub deployment_name: String,
    pub parameters: AutomationParameters,
}
