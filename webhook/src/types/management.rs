//! management.cattle.io/v3 resource types.

use std::collections::BTreeMap;

use k8s_openapi::api::rbac::v1::PolicyRule;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::is_false;

/// A cluster-wide bundle of policy rules granted through GlobalRoleBindings.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct GlobalRole {
    /// Object metadata
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Human-facing name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Cluster-scoped policy rules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<PolicyRule>>,
    /// Rules granted per named namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespaced_rules: Option<BTreeMap<String, Vec<PolicyRule>>>,
    /// Cluster-context role templates whose rules expand into downstream clusters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inherited_cluster_roles: Option<Vec<String>>,
    /// Permissions granted in fleet workspaces
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inherited_fleet_workspace_permissions: Option<FleetWorkspacePermission>,
    /// System-owned; deletion and most updates are forbidden
    #[serde(default, skip_serializing_if = "is_false")]
    pub builtin: bool,
    /// Granted to newly created users
    #[serde(default, skip_serializing_if = "is_false")]
    pub new_user_default: bool,
    /// All other keys
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Fleet workspace permissions carried on a [`GlobalRole`].
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct FleetWorkspacePermission {
    /// Rules applied inside every fleet workspace namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_rules: Option<Vec<PolicyRule>>,
    /// Verbs granted on the fleetworkspaces resource itself
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_verbs: Option<Vec<String>>,
}

/// Grants a [`GlobalRole`] to one subject.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct GlobalRoleBinding {
    /// Object metadata
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Name of the granted GlobalRole
    #[serde(default)]
    pub global_role_name: String,
    /// Subject by user name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    /// Subject by user principal id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_principal_name: Option<String>,
    /// Subject by group principal id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_principal_name: Option<String>,
    /// All other keys
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// A named, inheritable bundle of rules bound per cluster or project.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct RoleTemplate {
    /// Object metadata
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Human-facing name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Policy rules granted by this template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<PolicyRule>>,
    /// Rules mirrored from an external backing ClusterRole
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_rules: Option<Vec<PolicyRule>>,
    /// Names of inherited templates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_template_names: Option<Vec<String>>,
    /// `"cluster"`, `"project"`, or empty
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub context: String,
    /// Locked templates cannot be newly bound or inherited
    #[serde(default, skip_serializing_if = "is_false")]
    pub locked: bool,
    /// System-owned; deletion and most updates are forbidden
    #[serde(default, skip_serializing_if = "is_false")]
    pub builtin: bool,
    /// Administrative templates are cluster-context only
    #[serde(default, skip_serializing_if = "is_false")]
    pub administrative: bool,
    /// Rules come from a backing ClusterRole
    #[serde(default, skip_serializing_if = "is_false")]
    pub external: bool,
    /// Hidden from the UI
    #[serde(default, skip_serializing_if = "is_false")]
    pub hidden: bool,
    /// Granted to cluster creators by default
    #[serde(default, skip_serializing_if = "is_false")]
    pub cluster_creator_default: bool,
    /// Granted to project creators by default
    #[serde(default, skip_serializing_if = "is_false")]
    pub project_creator_default: bool,
    /// All other keys
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl RoleTemplate {
    /// The template name.
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }
}

/// Binds a cluster-context [`RoleTemplate`] to one subject in one cluster.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRoleTemplateBinding {
    /// Object metadata
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// The cluster being granted access to
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cluster_name: String,
    /// The bound role template
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub role_template_name: String,
    /// Subject by user name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    /// Subject by user principal id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_principal_name: Option<String>,
    /// Subject by group name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    /// Subject by group principal id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_principal_name: Option<String>,
    /// All other keys
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Binds a project-context [`RoleTemplate`] to one subject in one project.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRoleTemplateBinding {
    /// Object metadata
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// The project being granted access to, as `<cluster>:<project>`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub project_name: String,
    /// The bound role template
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub role_template_name: String,
    /// Subject by user name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    /// Subject by user principal id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_principal_name: Option<String>,
    /// Subject by group name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    /// Subject by group principal id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_principal_name: Option<String>,
    /// Subject by service account, deprecated but still admitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<String>,
    /// All other keys
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// A project: a grouping of namespaces inside one cluster.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Object metadata
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Project spec
    #[serde(default)]
    pub spec: ProjectSpec,
    /// Project status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ProjectStatus>,
    /// All other keys
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Spec of a [`Project`].
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSpec {
    /// The owning cluster; must equal the object's namespace
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cluster_name: String,
    /// Human-facing name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Project-wide quota
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_quota: Option<ProjectResourceQuota>,
    /// Default quota stamped onto each member namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_default_resource_quota: Option<NamespaceResourceQuota>,
    /// Default container resource requests/limits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_default_resource_limit: Option<ContainerResourceLimit>,
    /// All other keys
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Status of a [`Project`].
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStatus {
    /// The namespace materializing the project in its cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backing_namespace: Option<String>,
    /// All other keys
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Project-wide quota totals, with apiserver-maintained usage.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProjectResourceQuota {
    /// Total allowed per resource name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<BTreeMap<String, String>>,
    /// Currently allocated per resource name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_limit: Option<BTreeMap<String, String>>,
}

/// Per-namespace default quota.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceResourceQuota {
    /// Default allowed per resource name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<BTreeMap<String, String>>,
}

/// Default container resource requests and limits for a project.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ContainerResourceLimit {
    /// Requested CPU
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_cpu: Option<String>,
    /// Requested memory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_memory: Option<String>,
    /// CPU limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits_cpu: Option<String>,
    /// Memory limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits_memory: Option<String>,
}

/// A managed downstream cluster.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    /// Object metadata
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Cluster spec
    #[serde(default)]
    pub spec: ClusterSpec,
    /// All other keys
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Spec of a management [`Cluster`].
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Human-facing name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// The fleet workspace the cluster is registered in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fleet_workspace_name: Option<String>,
    /// Name of the default PSA configuration template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_pod_security_admission_configuration_template_name: Option<String>,
    /// All other keys
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// A feature gate.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    /// Object metadata
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Feature spec
    #[serde(default)]
    pub spec: FeatureSpec,
    /// Feature status
    #[serde(default)]
    pub status: FeatureStatus,
    /// All other keys
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Spec of a [`Feature`]: the requested value, if overridden.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct FeatureSpec {
    /// The requested value; `None` means "use the default"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<bool>,
}

/// Status of a [`Feature`].
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct FeatureStatus {
    /// The built-in default
    #[serde(default)]
    pub default: bool,
    /// Whether the value may change at runtime
    #[serde(default)]
    pub dynamic: bool,
    /// When set, the value is pinned and spec changes are rejected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_value: Option<bool>,
    /// Free-form description
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// A platform-wide setting.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct Setting {
    /// Object metadata
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// The configured value; empty means "use the default"
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,
    /// The built-in default
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub default: String,
    /// All other keys
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// An API token.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    /// Object metadata
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// The owning user
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user_id: String,
    /// Auth provider that minted the token
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub auth_provider: String,
    /// Time to live in milliseconds; zero means no expiry
    #[serde(default, rename = "ttl")]
    pub ttl_millis: i64,
    /// All other keys
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// A platform user.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Object metadata
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Login name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Bootstrap password, cleared once hashed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// External identities attached to the user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal_ids: Option<Vec<String>>,
    /// Whether the user may log in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// All other keys
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Auth-provider attributes attached to a [`User`], named after it.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct UserAttribute {
    /// Object metadata
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Whether group memberships need refreshing
    #[serde(default)]
    pub needs_refresh: bool,
    /// All other keys
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// A node (machine) driver.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct NodeDriver {
    /// Object metadata
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Driver spec
    #[serde(default)]
    pub spec: NodeDriverSpec,
    /// All other keys
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Spec of a [`NodeDriver`].
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct NodeDriverSpec {
    /// Whether the driver may be used for new machines
    #[serde(default)]
    pub active: bool,
    /// Shipped with the platform
    #[serde(default)]
    pub builtin: bool,
    /// Human-facing name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Download URL of the driver binary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// All other keys
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// A pod-security-admission configuration template.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct PodSecurityAdmissionConfigurationTemplate {
    /// Object metadata
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Free-form description
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// The PSA levels and exemptions
    #[serde(default)]
    pub configuration: PodSecurityAdmissionConfiguration,
    /// All other keys
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// PSA levels and exemptions of a template.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct PodSecurityAdmissionConfiguration {
    /// Enforce/audit/warn levels and versions
    #[serde(default)]
    pub defaults: PodSecurityAdmissionDefaults,
    /// Namespaces, users, and runtime classes exempt from enforcement
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exemptions: Option<PodSecurityAdmissionExemptions>,
}

/// The PSA level/version pairs of a template.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct PodSecurityAdmissionDefaults {
    /// Enforced level
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enforce: Option<String>,
    /// Enforced level version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enforce_version: Option<String>,
    /// Audited level
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit: Option<String>,
    /// Audited level version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_version: Option<String>,
    /// Warned level
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warn: Option<String>,
    /// Warned level version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warn_version: Option<String>,
}

/// PSA exemptions of a template.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct PodSecurityAdmissionExemptions {
    /// Exempt usernames
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usernames: Option<Vec<String>>,
    /// Exempt runtime classes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_classes: Option<Vec<String>>,
    /// Exempt namespaces
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespaces: Option<Vec<String>>,
}

/// Downstream proxy configuration; at most one per cluster namespace.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClusterProxyConfig {
    /// Object metadata
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Whether downstream proxying is enabled
    #[serde(default)]
    pub enabled: bool,
    /// All other keys
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// An authentication provider configuration.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    /// Object metadata
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Provider type
    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub auth_type: String,
    /// Whether the provider is enabled
    #[serde(default)]
    pub enabled: bool,
    /// All other keys
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}
