//! auditlog.cattle.io/v1 resource types.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Controls which API-server audit entries are kept and how they are redacted.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct AuditPolicy {
    /// Object metadata
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Policy spec
    #[serde(default)]
    pub spec: AuditPolicySpec,
    /// All other keys
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Spec of an [`AuditPolicy`].
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct AuditPolicySpec {
    /// Whether the policy is applied
    #[serde(default)]
    pub enabled: bool,
    /// Request filters, evaluated in order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Vec<AuditFilter>>,
    /// Extra redactions applied to kept entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_redactions: Option<Vec<AuditRedaction>>,
    /// How much of each request/response to record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verbosity: Option<AuditVerbosity>,
}

/// One allow/deny filter over request URIs.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct AuditFilter {
    /// `allow` or `deny`
    #[serde(default)]
    pub action: String,
    /// Regular expression matched against the request URI
    #[serde(default, rename = "requestURI")]
    pub request_uri: String,
}

/// Headers and JSON paths to strip from recorded entries.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct AuditRedaction {
    /// Header-name regular expressions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Vec<String>>,
    /// JSON paths into request/response bodies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paths: Option<Vec<String>>,
}

/// Verbosity of recorded entries.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct AuditVerbosity {
    /// Shorthand level, 0 to 3
    #[serde(default)]
    pub level: i32,
}
