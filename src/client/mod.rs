//! This module provides the host GraphQL client used by the schema index
//! loader, the reconciliation workers, and the initial-sweep driver.

use crate::Error;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::fmt::{Display, Formatter, Result as FmtResult};
use tracing::{debug, trace};

/// The GraphQL document shape used to write a computed value back to the
/// host graph, field-for-field with `UPDATE_ATTRIBUTE` from the original
/// computed-attribute task module.
const UPDATE_ATTRIBUTE: &str = "mutation UpdateAttribute($id: String!, $kind: String!, $attribute: String!, $value: String) {
    InfrahubUpdateComputedAttribute(data: { id: $id, kind: $kind, attribute: $attribute, value: $value }) {
        ok
    }
}";

/// The subscriber-gathering query, field-for-field with
/// `GATHER_GRAPHQL_QUERY_SUBSCRIBERS` from the original computed-attribute
/// task module.
const GATHER_GRAPHQL_QUERY_SUBSCRIBERS: &str = "query GatherGraphQLQuerySubscribers($ids: [ID!]) {
    InfrahubGraphQLQueryGroup(ids: $ids) {
        edges {
            node {
                subscribers {
                    edges {
                        node {
                            id
                            display_label
                            __typename
                        }
                    }
                }
            }
        }
    }
}";

/// A client for the host Infrahub GraphQL API.
///
/// [`HostClient`] posts arbitrary named GraphQL queries and mutations to a
/// single endpoint and unwraps the `data.<result_field>` payload, the same
/// pattern the CRUD client in this lineage uses, generalized to run the
/// handful of fixed documents the reconciliation engine needs rather than
/// documents generated from a type configuration.
///
/// # Examples
///
/// ```rust
/// use infrahub_computed_attributes::client::HostClient;
///
/// let client = HostClient::new("http://localhost:8000/graphql/main");
/// ```
#[derive(Clone, Debug, Default)]
pub struct HostClient {
    endpoint: String,
}

impl HostClient {
    /// Takes the URL of an Infrahub GraphQL endpoint (branch-scoped, e.g.
    /// `.../graphql/main`) and returns a new [`HostClient`] targeting it.
    pub fn new(endpoint: &str) -> HostClient {
        trace!("HostClient::new called -- endpoint: {}", endpoint);
        HostClient {
            endpoint: endpoint.to_string(),
        }
    }

    /// Executes a GraphQL query or mutation against the host endpoint and
    /// returns the value found at `data.<result_field>`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClientRequestFailed`] if the HTTP request itself
    /// fails, and [`Error::PayloadNotFound`] if the JSON response does not
    /// contain `data.<result_field>`.
    pub async fn graphql(
        &self,
        query: &str,
        variables: &Value,
        result_field: &str,
    ) -> Result<Value, Error> {
        trace!(
            "HostClient::graphql called -- result_field: {} | variables: {:#?}",
            result_field,
            variables
        );

        let req_body = json!({
            "query": query,
            "variables": variables,
        });

        let client = reqwest::Client::new();
        debug!("HostClient::graphql posting request -- endpoint: {}", self.endpoint);
        let resp = client.post(self.endpoint.as_str()).json(&req_body).send().await?;
        let mut body = resp.json::<Value>().await?;
        debug!("HostClient::graphql -- response body: {:#?}", body);

        body.as_object_mut()
            .and_then(|m| m.remove("data"))
            .and_then(|mut d| d.as_object_mut().and_then(|dm| dm.remove(result_field)))
            .ok_or(Error::PayloadNotFound { response: body })
    }

    /// Runs an arbitrary named GraphQL query against the host, returning the
    /// raw `data.<result_field>` payload untouched. Used to execute the
    /// GraphQL query a `TRANSFORM` descriptor declares against the host
    /// before handing the result to the transform runner.
    pub async fn execute_named_query(
        &self,
        query: &str,
        variables: &Value,
        result_field: &str,
    ) -> Result<Value, Error> {
        self.graphql(query, variables, result_field)
            .await
            .map_err(|e| Error::HostQueryError { source: Box::new(e) })
    }

    /// Looks up every node of `kind` matching `filters` on the given branch,
    /// selecting only `id` and `display_label`. `filters` becomes the
    /// GraphQL `input` variable verbatim.
    pub async fn query_nodes_by_filter(
        &self,
        kind: &str,
        filters: &Value,
    ) -> Result<Vec<Value>, Error> {
        self.query_nodes_with_shape(kind, filters, "id display_label").await
    }

    /// Looks up every node of `kind` matching `filters`, selecting the given
    /// GraphQL `shape` (a raw selection set). Used by `process_jinja2` to
    /// fetch exactly the attribute/relationship paths a template references.
    pub async fn query_nodes_with_shape(
        &self,
        kind: &str,
        filters: &Value,
        shape: &str,
    ) -> Result<Vec<Value>, Error> {
        let query = Self::fmt_shaped_query(kind, shape);
        let variables = json!({ "input": filters });
        let payload = self
            .graphql(&query, &variables, kind)
            .await
            .map_err(|e| Error::HostQueryError { source: Box::new(e) })?;
        Ok(Self::edges_to_nodes(payload))
    }

    /// Looks up every node of `kind` on the given branch with no filter
    /// applied, used by the initial-sweep driver.
    pub async fn all_nodes(&self, kind: &str) -> Result<Vec<Value>, Error> {
        self.query_nodes_by_filter(kind, &json!({})).await
    }

    /// Resolves the GraphQL-query subscriber set for `query_ids`, used by
    /// the query-targets worker to find which objects a `TRANSFORM`
    /// descriptor's query currently subscribes.
    pub async fn query_subscribers(&self, query_ids: &[String]) -> Result<Vec<Value>, Error> {
        let variables = json!({ "ids": query_ids });
        let payload = self
            .graphql(
                GATHER_GRAPHQL_QUERY_SUBSCRIBERS,
                &variables,
                "InfrahubGraphQLQueryGroup",
            )
            .await
            .map_err(|e| Error::HostQueryError { source: Box::new(e) })?;
        let mut subscribers = Vec::new();
        for group in Self::edges_to_nodes(payload) {
            let nested = group
                .get("subscribers")
                .cloned()
                .unwrap_or(Value::Null);
            subscribers.extend(Self::edges_to_nodes(nested));
        }
        Ok(subscribers)
    }

    /// Writes a computed value back to the host graph. Callers are expected
    /// to have already applied the equality guard (skip the call if the new
    /// value equals the stored value) before invoking this.
    pub async fn update_computed_attribute(
        &self,
        id: &str,
        kind: &str,
        attribute: &str,
        value: &str,
    ) -> Result<(), Error> {
        let variables = json!({
            "id": id,
            "kind": kind,
            "attribute": attribute,
            "value": value,
        });
        self.graphql(UPDATE_ATTRIBUTE, &variables, "InfrahubUpdateComputedAttribute")
            .await
            .map(|_| ())
            .map_err(|e| Error::MutationError {
                message: e.to_string(),
            })
    }

    /// Resolves the worktree-head commit for a repository, the way
    /// `process_transform` reads `repo_node.commit.value` before invoking a
    /// transform.
    pub async fn repository_commit(&self, repository_id: &str, repository_kind: &str) -> Result<String, Error> {
        let query = format!(
            "query RepositoryCommit($id: ID!) {{ {kind}(ids: [$id]) {{ edges {{ node {{ commit {{ value }} }} }} }} }}",
            kind = repository_kind
        );
        let variables = json!({ "id": repository_id });
        let payload = self
            .graphql(&query, &variables, repository_kind)
            .await
            .map_err(|e| Error::HostQueryError { source: Box::new(e) })?;
        Self::edges_to_nodes(payload)
            .first()
            .and_then(|n| n.get("commit"))
            .and_then(|c| c.get("value"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| Error::RepositoryError {
                message: format!("no commit found for repository {}", repository_id),
            })
    }

    /// Runs a stored GraphQL query by name, the way `query_gql_query` runs a
    /// `CoreGraphQLQuery` object server-side rather than an ad hoc document
    /// posted by the caller. Stored queries live at a sibling `/query/<name>`
    /// path next to the branch-scoped GraphQL endpoint.
    pub async fn run_stored_query(&self, query_name: &str, variables: &Value) -> Result<Value, Error> {
        trace!("HostClient::run_stored_query called -- query_name: {}", query_name);
        let client = reqwest::Client::new();
        let url = self.stored_query_endpoint(query_name);
        let resp = client.post(&url).json(&json!({ "variables": variables })).send().await?;
        Ok(resp.json::<Value>().await?)
    }

    fn stored_query_endpoint(&self, query_name: &str) -> String {
        let base = self.endpoint.split("/graphql/").next().unwrap_or(&self.endpoint);
        format!("{}/query/{}", base, query_name)
    }

    fn edges_to_nodes(payload: Value) -> Vec<Value> {
        payload
            .get("edges")
            .and_then(|edges| edges.as_array())
            .map(|edges| {
                edges
                    .iter()
                    .filter_map(|edge| edge.get("node").cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn fmt_filtered_query(kind: &str) -> String {
        Self::fmt_shaped_query(kind, "id display_label")
    }

    fn fmt_shaped_query(kind: &str, shape: &str) -> String {
        format!(
            "query Filtered($input: {kind}FilterInput) {{
                {kind}(filters: $input) {{
                    edges {{ node {{ {shape} }} }}
                }}
            }}",
            kind = kind,
            shape = shape
        )
    }
}

/// The host graph as seen by the reconciliation workers and the initial-
/// sweep driver: a narrow collaborator interface over [`HostClient`], in the
/// same spirit as [`crate::engine::automation::WorkflowEngine`] and
/// [`crate::engine::transform::TransformRunner`]. Exists so worker logic can
/// be exercised against an in-memory fake instead of a live Infrahub
/// instance.
#[async_trait]
pub trait HostGraph: Send + Sync {
    async fn query_nodes_with_shape(
        &self,
        kind: &str,
        filters: &Value,
        shape: &str,
    ) -> Result<Vec<Value>, Error>;

    async fn all_nodes(&self, kind: &str) -> Result<Vec<Value>, Error>;

    async fn query_subscribers(&self, query_ids: &[String]) -> Result<Vec<Value>, Error>;

    async fn update_computed_attribute(
        &self,
        id: &str,
        kind: &str,
        attribute: &str,
        value: &str,
    ) -> Result<(), Error>;

    async fn repository_commit(&self, repository_id: &str, repository_kind: &str) -> Result<String, Error>;

    async fn run_stored_query(&self, query_name: &str, variables: &Value) -> Result<Value, Error>;
}

#[async_trait]
impl HostGraph for HostClient {
    async fn query_nodes_with_shape(
        &self,
        kind: &str,
        filters: &Value,
        shape: &str,
    ) -> Result<Vec<Value>, Error> {
        HostClient::query_nodes_with_shape(self, kind, filters, shape).await
    }

    async fn all_nodes(&self, kind: &str) -> Result<Vec<Value>, Error> {
        HostClient::all_nodes(self, kind).await
    }

    async fn query_subscribers(&self, query_ids: &[String]) -> Result<Vec<Value>, Error> {
        HostClient::query_subscribers(self, query_ids).await
    }

    async fn update_computed_attribute(
        &self,
        id: &str,
        kind: &str,
        attribute: &str,
        value: &str,
    ) -> Result<(), Error> {
        HostClient::update_computed_attribute(self, id, kind, attribute, value).await
    }

    async fn repository_commit(&self, repository_id: &str, repository_kind: &str) -> Result<String, Error> {
        HostClient::repository_commit(self, repository_id, repository_kind).await
    }

    async fn run_stored_query(&self, query_name: &str, variables: &Value) -> Result<Value, Error> {
        HostClient::run_stored_query(self, query_name, variables).await
    }
}

impl Display for HostClient {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}", self.endpoint)
    }
}
