//! S4 — equality short-circuit halts propagation between two template
//! attributes that each depend on the other.

mod setup;

use infrahub_computed_attributes::engine::event::NodeEvent;
use infrahub_computed_attributes::engine::schema::{AttributeSchema, NodeSchema, SchemaBranch};
use infrahub_computed_attributes::engine::index::SchemaIndex;
use infrahub_computed_attributes::engine::transform::TransformRunner;
use infrahub_computed_attributes::engine::workers::{process_jinja2, ReconciliationContext};
use infrahub_computed_attributes::Error;
use serde_json::{json, Value};
use setup::{FakeHostGraph, FakeWorkflowEngine};
use std::sync::Arc;
use async_trait::async_trait;

struct UnusedTransformRunner;

#[async_trait]
impl TransformRunner for UnusedTransformRunner {
    async fn run(
        &self,
        _repo: &infrahub_computed_attributes::engine::transform::RepositoryRef,
        _commit: &str,
        _location: &str,
        _query_result: Value,
    ) -> Result<String, Error> {
        unreachable!("this test never invokes a transform")
    }
}

fn pair_index() -> SchemaIndex {
    let node = NodeSchema::new("Pair")
        .with_attribute(AttributeSchema::computed_template("a", "Text", "{{ b__value }}"))
        .with_attribute(AttributeSchema::computed_template("b", "Text", "{{ a__value }}"));
    let branch = SchemaBranch::new("main").with_node(node);
    SchemaIndex::build(&branch)
}

#[tokio::test]
async fn s4_equality_guard_stabilizes_a_dependency_cycle() {
    let host = Arc::new(FakeHostGraph::new());
    host.insert(json!({
        "id": "pair-1",
        "a": { "value": "old" },
        "b": { "value": "new" },
    }));

    let ctx = ReconciliationContext::new(
        host.clone(),
        Arc::new(FakeWorkflowEngine::new()),
        Arc::new(UnusedTransformRunner),
        pair_index(),
    );

    let event = NodeEvent {
        branch: "main".to_string(),
        kind: "Pair".to_string(),
        id: "pair-1".to_string(),
        updated_fields: None,
    };

    // First pass on "a": a picks up b's current value ("new") and differs
    // from its own stored value ("old"), so it writes.
    process_jinja2(&ctx, &event, "a").await.unwrap();
    let after_a = host.get("pair-1").unwrap();
    assert_eq!(after_a["a"]["value"], "new");

    // Second pass on "b": b reads a's now-updated value ("new"), which
    // already equals its own stored value, so the equality guard no-ops.
    process_jinja2(&ctx, &event, "b").await.unwrap();
    let after_b = host.get("pair-1").unwrap();
    assert_eq!(after_b["b"]["value"], "new");

    // A further pass on "a" confirms the cycle has stabilized: no more
    // writes occur no matter how many times either attribute reprocesses.
    process_jinja2(&ctx, &event, "a").await.unwrap();
    let stable = host.get("pair-1").unwrap();
    assert_eq!(stable["a"]["value"], "new");
    assert_eq!(stable["b"]["value"], "new");
}
