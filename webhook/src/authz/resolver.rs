//! Effective-rule resolution for users and role objects.
//!
//! The resolver walks the cached RBAC graph by name; there are no in-memory
//! back-pointers. Duplicated rules are fine, coverage checks tolerate them.

use std::sync::Arc;

use k8s_openapi::api::authentication::v1::UserInfo;
use k8s_openapi::api::rbac::v1::{
    ClusterRole, ClusterRoleBinding, PolicyRule, Role, RoleBinding, Subject,
};
use thiserror::Error;
use tracing::warn;

use super::templates::{RoleTemplateResolver, TemplateError};
use crate::stores::{ObjectSet, Store};
use crate::types::management::{GlobalRole, GlobalRoleBinding};
use crate::types::PartialObject;

/// The `UserInfo.extra` key carrying the requester's principal ids.
pub const PRINCIPAL_ID_EXTRA: &str = "principalid";

/// The local fleet workspace; its namespace is not granted through
/// `inheritedFleetWorkspacePermissions`.
pub const LOCAL_FLEET_WORKSPACE: &str = "fleet-local";

/// Errors from resolving effective rules.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// A referenced role template was missing or cyclic.
    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// The principal ids the API server attached to the requester.
pub fn principal_ids(user: &UserInfo) -> impl Iterator<Item = &str> {
    user.extra
        .iter()
        .flat_map(|extra| extra.get(PRINCIPAL_ID_EXTRA))
        .flatten()
        .map(String::as_str)
}

/// Whether a native RBAC subject names the requester.
fn subject_matches(subject: &Subject, user: &UserInfo) -> bool {
    let username = user.username.as_deref().unwrap_or_default();
    match subject.kind.as_str() {
        "User" => {
            subject.name == username || principal_ids(user).any(|p| p == subject.name)
        }
        "Group" => user
            .groups
            .iter()
            .flatten()
            .any(|group| *group == subject.name),
        "ServiceAccount" => {
            let ns = subject.namespace.as_deref().unwrap_or_default();
            username
                .strip_prefix("system:serviceaccount:")
                .and_then(|rest| rest.split_once(':'))
                .is_some_and(|(sa_ns, sa_name)| sa_ns == ns && sa_name == subject.name)
        }
        _ => false,
    }
}

/// Whether a GlobalRoleBinding names the requester, by user name or by
/// principal.
fn grb_matches(grb: &GlobalRoleBinding, user: &UserInfo) -> bool {
    if let Some(name) = &grb.user_name {
        if Some(name.as_str()) == user.username.as_deref() {
            return true;
        }
    }
    if let Some(principal) = &grb.user_principal_name {
        if principal_ids(user).any(|p| p == principal) {
            return true;
        }
    }
    if let Some(group) = &grb.group_principal_name {
        if user.groups.iter().flatten().any(|g| g == group)
            || principal_ids(user).any(|p| p == group)
        {
            return true;
        }
    }
    false
}

/// Resolves the effective policy rules of a requester.
#[derive(Clone)]
pub struct RuleResolver {
    cluster_roles: Arc<dyn Store<ClusterRole>>,
    cluster_role_bindings: Arc<dyn Store<ClusterRoleBinding>>,
    roles: Arc<dyn Store<Role>>,
    role_bindings: Arc<dyn Store<RoleBinding>>,
    global_roles: Arc<dyn Store<GlobalRole>>,
    global_role_bindings: Arc<dyn Store<GlobalRoleBinding>>,
    fleet_workspaces: Arc<dyn Store<PartialObject>>,
    templates: RoleTemplateResolver,
}

impl RuleResolver {
    /// Build a resolver over the shared caches.
    pub fn new(stores: &ObjectSet) -> Self {
        Self {
            cluster_roles: stores.cluster_roles.clone(),
            cluster_role_bindings: stores.cluster_role_bindings.clone(),
            roles: stores.roles.clone(),
            role_bindings: stores.role_bindings.clone(),
            global_roles: stores.global_roles.clone(),
            global_role_bindings: stores.global_role_bindings.clone(),
            fleet_workspaces: stores.fleet_workspaces.clone(),
            templates: RoleTemplateResolver::new(
                stores.role_templates.clone(),
                stores.cluster_roles.clone(),
            ),
        }
    }

    /// The template resolver backing this rule resolver.
    pub fn templates(&self) -> &RoleTemplateResolver {
        &self.templates
    }

    /// Every rule in effect for `user`, cluster-wide plus inside `namespace`
    /// when one is given.
    pub fn rules_for_user(
        &self,
        user: &UserInfo,
        namespace: Option<&str>,
    ) -> Result<Vec<PolicyRule>, ResolveError> {
        let mut rules = Vec::new();

        for crb in self.cluster_role_bindings.state() {
            if crb.subjects.iter().flatten().any(|s| subject_matches(s, user)) {
                if let Some(role) = self.cluster_roles.get(None, &crb.role_ref.name) {
                    rules.extend(role.rules.clone().unwrap_or_default());
                }
            }
        }

        if let Some(ns) = namespace.filter(|ns| !ns.is_empty()) {
            for rb in self.role_bindings.state() {
                if rb.metadata.namespace.as_deref() != Some(ns) {
                    continue;
                }
                if !rb.subjects.iter().flatten().any(|s| subject_matches(s, user)) {
                    continue;
                }
                match rb.role_ref.kind.as_str() {
                    "Role" => {
                        if let Some(role) = self.roles.get(Some(ns), &rb.role_ref.name) {
                            rules.extend(role.rules.clone().unwrap_or_default());
                        }
                    }
                    "ClusterRole" => {
                        if let Some(role) = self.cluster_roles.get(None, &rb.role_ref.name) {
                            rules.extend(role.rules.clone().unwrap_or_default());
                        }
                    }
                    _ => {}
                }
            }
        }

        for grb in self.global_role_bindings.state() {
            if !grb_matches(&grb, user) {
                continue;
            }
            let Some(role) = self.global_roles.get(None, &grb.global_role_name) else {
                // a dangling binding grants nothing; admission must not 500
                // on somebody else's broken object
                warn!(
                    binding = grb.metadata.name.as_deref().unwrap_or_default(),
                    role = grb.global_role_name,
                    "globalRoleBinding references a missing globalRole"
                );
                continue;
            };
            rules.extend(self.global_role_rules(&role, namespace)?);
        }

        Ok(rules)
    }

    /// The rules a GlobalRole grants in the given scope: its cluster-wide
    /// rules, its rules for `namespace`, the expansion of its inherited
    /// cluster roles, and its fleet workspace permissions.
    pub fn global_role_rules(
        &self,
        role: &GlobalRole,
        namespace: Option<&str>,
    ) -> Result<Vec<PolicyRule>, ResolveError> {
        let mut rules = role.rules.clone().unwrap_or_default();

        if let Some(ns) = namespace.filter(|ns| !ns.is_empty()) {
            if let Some(per_ns) = &role.namespaced_rules {
                if let Some(ns_rules) = per_ns.get(ns) {
                    rules.extend(ns_rules.iter().cloned());
                }
            }
        }

        if let Some(inherited) = &role.inherited_cluster_roles {
            rules.extend(self.templates.rules_for_names(inherited)?);
        }

        if let Some(fleet) = &role.inherited_fleet_workspace_permissions {
            match namespace.filter(|ns| !ns.is_empty()) {
                Some(ns) => {
                    if ns != LOCAL_FLEET_WORKSPACE && self.fleet_workspaces.get(None, ns).is_some()
                    {
                        rules.extend(fleet.resource_rules.clone().unwrap_or_default());
                    }
                }
                None => {
                    if let Some(rule) = self.fleet_workspace_verbs_rule(fleet.workspace_verbs.as_deref())
                    {
                        rules.push(rule);
                    }
                }
            }
        }

        Ok(rules)
    }

    /// The synthetic rule granting `workspaceVerbs` on every non-local fleet
    /// workspace.
    pub fn fleet_workspace_verbs_rule(&self, verbs: Option<&[String]>) -> Option<PolicyRule> {
        let verbs = verbs?;
        if verbs.is_empty() {
            return None;
        }
        let names: Vec<String> = self
            .fleet_workspaces
            .state()
            .iter()
            .filter_map(|ws| ws.metadata.name.clone())
            .filter(|name| name != LOCAL_FLEET_WORKSPACE)
            .collect();
        Some(PolicyRule {
            verbs: verbs.to_vec(),
            api_groups: Some(vec!["management.cattle.io".to_string()]),
            resources: Some(vec!["fleetworkspaces".to_string()]),
            resource_names: Some(names),
            non_resource_urls: None,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::stores::MemStores;
    use k8s_openapi::api::rbac::v1::RoleRef;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    fn user(name: &str, groups: &[&str]) -> UserInfo {
        UserInfo {
            username: Some(name.to_string()),
            groups: Some(groups.iter().map(|s| s.to_string()).collect()),
            ..Default::default()
        }
    }

    fn meta(name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    fn rule(verbs: &[&str], resources: &[&str]) -> PolicyRule {
        PolicyRule {
            verbs: verbs.iter().map(|s| s.to_string()).collect(),
            api_groups: Some(vec!["".to_string()]),
            resources: Some(resources.iter().map(|s| s.to_string()).collect()),
            ..Default::default()
        }
    }

    fn subject(kind: &str, name: &str) -> Subject {
        Subject {
            kind: kind.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn native_cluster_rbac_is_walked() {
        let stores = MemStores::default();
        stores.cluster_roles.insert(
            None,
            "reader",
            ClusterRole {
                metadata: meta("reader"),
                rules: Some(vec![rule(&["get"], &["pods"])]),
                ..Default::default()
            },
        );
        stores.cluster_role_bindings.insert(
            None,
            "crb",
            ClusterRoleBinding {
                metadata: meta("crb"),
                role_ref: RoleRef {
                    api_group: "rbac.authorization.k8s.io".to_string(),
                    kind: "ClusterRole".to_string(),
                    name: "reader".to_string(),
                },
                subjects: Some(vec![subject("Group", "devs")]),
            },
        );
        let resolver = RuleResolver::new(&stores.object_set());

        let rules = resolver.rules_for_user(&user("alice", &["devs"]), None).unwrap();
        assert_eq!(rules.len(), 1);
        let rules = resolver.rules_for_user(&user("bob", &["ops"]), None).unwrap();
        assert!(rules.is_empty());
    }

    #[test]
    fn namespaced_role_bindings_apply_in_their_namespace_only() {
        let stores = MemStores::default();
        stores.roles.insert(
            Some("ns1"),
            "writer",
            Role {
                metadata: ObjectMeta {
                    name: Some("writer".to_string()),
                    namespace: Some("ns1".to_string()),
                    ..Default::default()
                },
                rules: Some(vec![rule(&["update"], &["configmaps"])]),
            },
        );
        stores.role_bindings.insert(
            Some("ns1"),
            "rb",
            RoleBinding {
                metadata: ObjectMeta {
                    name: Some("rb".to_string()),
                    namespace: Some("ns1".to_string()),
                    ..Default::default()
                },
                role_ref: RoleRef {
                    api_group: "rbac.authorization.k8s.io".to_string(),
                    kind: "Role".to_string(),
                    name: "writer".to_string(),
                },
                subjects: Some(vec![subject("User", "alice")]),
            },
        );
        let resolver = RuleResolver::new(&stores.object_set());

        assert_eq!(
            resolver.rules_for_user(&user("alice", &[]), Some("ns1")).unwrap().len(),
            1
        );
        assert!(resolver.rules_for_user(&user("alice", &[]), Some("ns2")).unwrap().is_empty());
        assert!(resolver.rules_for_user(&user("alice", &[]), None).unwrap().is_empty());
    }

    #[test]
    fn global_role_bindings_match_by_principal() {
        let stores = MemStores::default();
        stores.global_roles.insert(
            None,
            "gr",
            GlobalRole {
                metadata: meta("gr"),
                rules: Some(vec![rule(&["get"], &["settings"])]),
                ..Default::default()
            },
        );
        stores.global_role_bindings.insert(
            None,
            "grb",
            GlobalRoleBinding {
                metadata: meta("grb"),
                global_role_name: "gr".to_string(),
                user_principal_name: Some("keycloak_user://12345".to_string()),
                ..Default::default()
            },
        );
        let resolver = RuleResolver::new(&stores.object_set());

        let mut requester = user("u-abc", &[]);
        requester.extra = Some(BTreeMap::from([(
            PRINCIPAL_ID_EXTRA.to_string(),
            vec!["keycloak_user://12345".to_string()],
        )]));
        assert_eq!(resolver.rules_for_user(&requester, None).unwrap().len(), 1);
        assert!(resolver.rules_for_user(&user("u-abc", &[]), None).unwrap().is_empty());
    }

    #[test]
    fn global_role_namespaced_rules_require_the_namespace() {
        let stores = MemStores::default();
        stores.global_roles.insert(
            None,
            "gr",
            GlobalRole {
                metadata: meta("gr"),
                namespaced_rules: Some(BTreeMap::from([(
                    "ns1".to_string(),
                    vec![rule(&["get"], &["secrets"])],
                )])),
                ..Default::default()
            },
        );
        stores.global_role_bindings.insert(
            None,
            "grb",
            GlobalRoleBinding {
                metadata: meta("grb"),
                global_role_name: "gr".to_string(),
                user_name: Some("alice".to_string()),
                ..Default::default()
            },
        );
        let resolver = RuleResolver::new(&stores.object_set());

        assert_eq!(resolver.rules_for_user(&user("alice", &[]), Some("ns1")).unwrap().len(), 1);
        assert!(resolver.rules_for_user(&user("alice", &[]), Some("other")).unwrap().is_empty());
    }

    #[test]
    fn fleet_workspace_verbs_become_a_synthetic_rule() {
        let stores = MemStores::default();
        stores.fleet_workspaces.insert(
            None,
            "fleet-default",
            PartialObject {
                metadata: meta("fleet-default"),
                ..Default::default()
            },
        );
        stores.fleet_workspaces.insert(
            None,
            LOCAL_FLEET_WORKSPACE,
            PartialObject {
                metadata: meta(LOCAL_FLEET_WORKSPACE),
                ..Default::default()
            },
        );
        let resolver = RuleResolver::new(&stores.object_set());

        let rule = resolver
            .fleet_workspace_verbs_rule(Some(&["get".to_string()]))
            .unwrap();
        assert_eq!(rule.resources.as_deref().unwrap(), ["fleetworkspaces"]);
        assert_eq!(rule.resource_names.as_deref().unwrap(), ["fleet-default"]);
    }
}
