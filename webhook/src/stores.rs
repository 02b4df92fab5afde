//! Read-only handles onto cached cluster state.
//!
//! The informer machinery that populates these caches is out of scope; the
//! engine only ever reads. [`Store`] mirrors the reflector-store surface
//! (point `get` plus a full `state` snapshot) and is object-safe so that
//! embedders can plug in their own cache layer. [`MemStore`] is the plain
//! in-memory implementation used by tests and single-process embedders.
//!
//! All reads are cache reads and may be stale; admitters treat a miss as
//! "does not exist" and leave retry semantics to the API server.

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use k8s_openapi::api::{
    core::v1::{Namespace, Secret},
    rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding},
};
use parking_lot::RwLock;
use thiserror::Error;

use crate::types::management::{
    Cluster, ClusterProxyConfig, ClusterRoleTemplateBinding, GlobalRole, GlobalRoleBinding,
    PodSecurityAdmissionConfigurationTemplate, Project, ProjectRoleTemplateBinding, RoleTemplate,
    Setting, User,
};
use crate::types::PartialObject;

/// A readable cache of one object kind.
///
/// `namespace` is `None` for cluster-scoped kinds.
pub trait Store<T>: Send + Sync {
    /// Retrieve the entry for `name`, if cached.
    fn get(&self, namespace: Option<&str>, name: &str) -> Option<Arc<T>>;

    /// A snapshot of every cached entry.
    fn state(&self) -> Vec<Arc<T>>;
}

/// A plain in-memory [`Store`].
pub struct MemStore<T> {
    items: RwLock<BTreeMap<(Option<String>, String), Arc<T>>>,
}

impl<T> Default for MemStore<T> {
    fn default() -> Self {
        Self {
            items: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<T> MemStore<T> {
    /// Insert or replace an entry.
    pub fn insert(&self, namespace: Option<&str>, name: &str, obj: T) {
        self.items.write().insert(
            (namespace.map(str::to_string), name.to_string()),
            Arc::new(obj),
        );
    }

    /// Remove an entry.
    pub fn remove(&self, namespace: Option<&str>, name: &str) {
        self.items
            .write()
            .remove(&(namespace.map(str::to_string), name.to_string()));
    }
}

impl<T: Send + Sync> Store<T> for MemStore<T> {
    fn get(&self, namespace: Option<&str>, name: &str) -> Option<Arc<T>> {
        self.items
            .read()
            .get(&(namespace.map(str::to_string), name.to_string()))
            .cloned()
    }

    fn state(&self) -> Vec<Arc<T>> {
        self.items.read().values().cloned().collect()
    }
}

/// Failed to write through one of the engine's write-back seams.
#[derive(Debug, Error)]
pub enum WriteError {
    /// The object disappeared under the writer.
    #[error("object not found")]
    NotFound,

    /// Any other apiserver failure.
    #[error("write failed: {0}")]
    Other(String),
}

/// The single write-back seam of the engine besides `SubjectAccessReview`:
/// the secret-delete mutator redacts rules on Roles owned by the secret.
#[async_trait]
pub trait RoleWriter: Send + Sync {
    /// Update an existing namespaced Role.
    async fn update(&self, role: &Role) -> Result<(), WriteError>;
}

/// Every cache the admitter catalog reads, bundled for registration.
#[derive(Clone)]
pub struct ObjectSet {
    /// management.cattle.io GlobalRoles.
    pub global_roles: Arc<dyn Store<GlobalRole>>,
    /// management.cattle.io GlobalRoleBindings.
    pub global_role_bindings: Arc<dyn Store<GlobalRoleBinding>>,
    /// management.cattle.io RoleTemplates.
    pub role_templates: Arc<dyn Store<RoleTemplate>>,
    /// management.cattle.io ClusterRoleTemplateBindings (namespaced by cluster).
    pub cluster_role_template_bindings: Arc<dyn Store<ClusterRoleTemplateBinding>>,
    /// management.cattle.io ProjectRoleTemplateBindings (namespaced by project).
    pub project_role_template_bindings: Arc<dyn Store<ProjectRoleTemplateBinding>>,
    /// management.cattle.io Projects (namespaced by cluster).
    pub projects: Arc<dyn Store<Project>>,
    /// management.cattle.io Clusters.
    pub clusters: Arc<dyn Store<Cluster>>,
    /// rbac/v1 ClusterRoles.
    pub cluster_roles: Arc<dyn Store<ClusterRole>>,
    /// rbac/v1 ClusterRoleBindings.
    pub cluster_role_bindings: Arc<dyn Store<ClusterRoleBinding>>,
    /// rbac/v1 Roles.
    pub roles: Arc<dyn Store<Role>>,
    /// rbac/v1 RoleBindings.
    pub role_bindings: Arc<dyn Store<RoleBinding>>,
    /// core/v1 Secrets.
    pub secrets: Arc<dyn Store<Secret>>,
    /// core/v1 Namespaces.
    pub namespaces: Arc<dyn Store<Namespace>>,
    /// management.cattle.io Users.
    pub users: Arc<dyn Store<User>>,
    /// management.cattle.io Settings.
    pub settings: Arc<dyn Store<Setting>>,
    /// fleet workspaces, keyed by workspace name.
    pub fleet_workspaces: Arc<dyn Store<PartialObject>>,
    /// management.cattle.io PodSecurityAdmissionConfigurationTemplates.
    pub psa_templates: Arc<dyn Store<PodSecurityAdmissionConfigurationTemplate>>,
    /// management.cattle.io ClusterProxyConfigs.
    pub cluster_proxy_configs: Arc<dyn Store<ClusterProxyConfig>>,
}

/// Concrete in-memory stores backing an [`ObjectSet`].
///
/// Tests and single-process embedders insert through the typed fields and
/// hand [`MemStores::object_set`] to the registry.
#[derive(Default)]
pub struct MemStores {
    /// See [`ObjectSet::global_roles`].
    pub global_roles: Arc<MemStore<GlobalRole>>,
    /// See [`ObjectSet::global_role_bindings`].
    pub global_role_bindings: Arc<MemStore<GlobalRoleBinding>>,
    /// See [`ObjectSet::role_templates`].
    pub role_templates: Arc<MemStore<RoleTemplate>>,
    /// See [`ObjectSet::cluster_role_template_bindings`].
    pub cluster_role_template_bindings: Arc<MemStore<ClusterRoleTemplateBinding>>,
    /// See [`ObjectSet::project_role_template_bindings`].
    pub project_role_template_bindings: Arc<MemStore<ProjectRoleTemplateBinding>>,
    /// See [`ObjectSet::projects`].
    pub projects: Arc<MemStore<Project>>,
    /// See [`ObjectSet::clusters`].
    pub clusters: Arc<MemStore<Cluster>>,
    /// See [`ObjectSet::cluster_roles`].
    pub cluster_roles: Arc<MemStore<ClusterRole>>,
    /// See [`ObjectSet::cluster_role_bindings`].
    pub cluster_role_bindings: Arc<MemStore<ClusterRoleBinding>>,
    /// See [`ObjectSet::roles`].
    pub roles: Arc<MemStore<Role>>,
    /// See [`ObjectSet::role_bindings`].
    pub role_bindings: Arc<MemStore<RoleBinding>>,
    /// See [`ObjectSet::secrets`].
    pub secrets: Arc<MemStore<Secret>>,
    /// See [`ObjectSet::namespaces`].
    pub namespaces: Arc<MemStore<Namespace>>,
    /// See [`ObjectSet::users`].
    pub users: Arc<MemStore<User>>,
    /// See [`ObjectSet::settings`].
    pub settings: Arc<MemStore<Setting>>,
    /// See [`ObjectSet::fleet_workspaces`].
    pub fleet_workspaces: Arc<MemStore<PartialObject>>,
    /// See [`ObjectSet::psa_templates`].
    pub psa_templates: Arc<MemStore<PodSecurityAdmissionConfigurationTemplate>>,
    /// See [`ObjectSet::cluster_proxy_configs`].
    pub cluster_proxy_configs: Arc<MemStore<ClusterProxyConfig>>,
}

impl MemStores {
    /// Bundle the stores as trait objects for the admitter registry.
    pub fn object_set(&self) -> ObjectSet {
        ObjectSet {
            global_roles: self.global_roles.clone(),
            global_role_bindings: self.global_role_bindings.clone(),
            role_templates: self.role_templates.clone(),
            cluster_role_template_bindings: self.cluster_role_template_bindings.clone(),
            project_role_template_bindings: self.project_role_template_bindings.clone(),
            projects: self.projects.clone(),
            clusters: self.clusters.clone(),
            cluster_roles: self.cluster_roles.clone(),
            cluster_role_bindings: self.cluster_role_bindings.clone(),
            roles: self.roles.clone(),
            role_bindings: self.role_bindings.clone(),
            secrets: self.secrets.clone(),
            namespaces: self.namespaces.clone(),
            users: self.users.clone(),
            settings: self.settings.clone(),
            fleet_workspaces: self.fleet_workspaces.clone(),
            psa_templates: self.psa_templates.clone(),
            cluster_proxy_configs: self.cluster_proxy_configs.clone(),
        }
    }
}
