//! catalog.cattle.io/v1 resource types.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A chart repository served to downstream clusters.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRepo {
    /// Object metadata
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Repo spec
    #[serde(default)]
    pub spec: ClusterRepoSpec,
    /// All other keys
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Spec of a [`ClusterRepo`]: exactly one source must be set.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRepoSpec {
    /// An http(s) or oci index URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// A git repository URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_repo: Option<String>,
    /// Branch used with `git_repo`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_branch: Option<String>,
    /// All other keys
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}
