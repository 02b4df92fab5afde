//! Typed views of the custom resources under admission.
//!
//! Every struct keeps a `#[serde(flatten)]` remainder map so that decoding a
//! request payload and re-serializing it is lossless; mutators rely on that
//! round trip when diffing for a JSON patch.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

pub mod auditlog;
pub mod catalog;
pub mod cluster;
pub mod management;
pub mod provisioning;

/// A partially-typed object: structured metadata plus everything else raw.
///
/// Used where the admitter only reasons about metadata (wildcard machine
/// configs, fleet workspaces, proxy endpoints).
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct PartialObject {
    /// Object metadata
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// All other keys
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

pub(crate) fn is_false(v: &bool) -> bool {
    !*v
}
