//! Admission engine for a multi-tenant cluster-management platform.
//!
//! The engine is a stateless request handler backed by read-only caches of
//! cluster state. Incoming [`AdmissionReview`] posts are routed by the
//! [`dispatcher`](admission::dispatcher) to per-resource admitters, which
//! validate or mutate objects using the RBAC rule [`resolver`](authz::resolver),
//! the privilege [`escalation`](authz::escalation) checker, and the
//! role-template [graph](authz::templates).
//!
//! TLS termination, informer wiring, and webhook-configuration reconciliation
//! stay outside this crate; embedders feed the [`stores`], serve the
//! [`server::router`], and publish the configurations emitted by
//! [`admission::config`].
//!
//! [`AdmissionReview`]: webhook_core::admission::AdmissionReview

pub mod admission;
pub mod authz;
pub mod resources;
pub mod server;
pub mod stores;
pub mod types;
