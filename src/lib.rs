//! The computed-attribute reconciliation engine for Infrahub.
//!
//! Infrahub schemas can declare attributes as *computed*: their values are a
//! pure function of other graph data rather than something a user writes
//! directly. This crate is the subsystem that keeps those values correct
//! across branches as the graph changes:
//!
//!  * [`engine::index`] compiles a branch schema into a dependency index —
//!    which computed attributes depend on which node kinds;
//!  * [`engine::automation`] converges an external workflow engine's
//!    registered automations with that index;
//!  * [`engine::workers`] are the flows the workflow engine invokes when a
//!    node changes, which recompute and write back the affected values;
//!  * [`engine::sweep`] drives the one-time sweep needed when a computed
//!    attribute is newly declared;
//!  * [`template`] is the small Jinja2-flavored template engine the
//!    `TEMPLATE`-flavor workers render against.
//!
//! The surrounding Infrahub system — the GraphQL mutation layer, the
//! branch/diff engine, the git repository manager, permissions — is treated
//! as an external collaborator reached only through the narrow interfaces in
//! [`client`], [`engine::automation::WorkflowEngine`], and
//! [`engine::transform::TransformRunner`].

pub use config::EngineConfig;
pub use error::Error;

pub mod client;
pub mod config;
pub mod engine;
mod error;
pub mod template;
