//! provisioning.cattle.io/v1 resource types.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A provisioning-side cluster. The admitters only reason about metadata and
/// the few spec fields below; the (large) machine-provisioning spec rides
/// along in the remainder map.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    /// Object metadata
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Cluster spec
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<ClusterSpec>,
    /// All other keys
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Spec of a provisioning [`Cluster`].
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Requested Kubernetes version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubernetes_version: Option<String>,
    /// Name of the cloud-credential secret used for provisioning
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_credential_secret_name: Option<String>,
    /// All other keys
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}
