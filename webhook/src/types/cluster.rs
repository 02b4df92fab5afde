//! cluster.cattle.io/v3 resource types.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A downstream replica of an API token, synced into managed clusters.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClusterAuthToken {
    /// Object metadata
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// The owning user
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user_name: String,
    /// Whether the token is usable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// RFC 3339 expiry, empty for no expiry
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub expires_at: String,
    /// RFC 3339 timestamp of last use
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<String>,
    /// All other keys
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}
