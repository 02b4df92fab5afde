//! Client-less types and pure algorithms for a Kubernetes admission webhook.
//!
//! This crate carries everything the admission engine needs that does not
//! touch cluster state: the `AdmissionReview` wire types, group-version
//! identifiers, RBAC rule-coverage semantics, JSON-Patch construction, and
//! parsers for the Kubernetes quantity and duration string grammars.

pub mod admission;

pub mod duration;
pub use duration::Duration;

pub mod gvk;
pub use gvk::{GroupVersionKind, GroupVersionResource};

pub mod patch;

pub mod quantity;
pub use quantity::Quantity;

pub mod response;
pub use response::Status;

pub mod rules;
