//! Validator for management.cattle.io/v3 GlobalRoleBindings.

use std::sync::Arc;

use async_trait::async_trait;

use webhook_core::admission::{AdmissionRequest, AdmissionResponse, Operation};
use webhook_core::gvk::GroupVersionResource;

use crate::admission::{AdmitError, Admitter, WebhookOptions};
use crate::authz::escalation::{
    BypassTarget, EscalationCheck, EscalationChecker, EscalationOutcome, VERB_BIND,
};
use crate::resources::{deleting, exactly_one_subject, validate_immutable, validate_subject_transition};
use crate::stores::Store;
use crate::types::management::{GlobalRole, GlobalRoleBinding};

fn gvr() -> GroupVersionResource {
    GroupVersionResource::gvr("management.cattle.io", "v3", "globalrolebindings")
}

/// Admits creates and updates of GlobalRoleBindings.
pub struct Validator {
    global_roles: Arc<dyn Store<GlobalRole>>,
    checker: EscalationChecker,
}

impl Validator {
    /// Build the validator over the GlobalRole cache and the escalation
    /// checker.
    pub fn new(global_roles: Arc<dyn Store<GlobalRole>>, checker: EscalationChecker) -> Self {
        Self {
            global_roles,
            checker,
        }
    }

    fn validate_subject(binding: &GlobalRoleBinding) -> Result<(), String> {
        exactly_one_subject(&[
            ("userName", binding.user_name.as_deref()),
            ("groupPrincipalName", binding.group_principal_name.as_deref()),
        ])?;
        if binding.user_principal_name.is_some() && binding.user_name.is_none() {
            return Err("userPrincipalName requires userName".to_string());
        }
        Ok(())
    }

    /// The referenced role's rules must be covered by the requester, per
    /// scope, unless the `bind` verb is held on the role.
    async fn check_escalation(
        &self,
        req: &AdmissionRequest,
        role: &GlobalRole,
    ) -> Result<EscalationOutcome, AdmitError> {
        let target = BypassTarget {
            verb: VERB_BIND,
            group: "management.cattle.io",
            resource: "globalroles",
            name: role.metadata.name.clone().unwrap_or_default(),
        };
        let mut check = EscalationCheck::new();

        let cluster_scoped = self.checker.resolver().global_role_rules(role, None)?;
        let outcome = self
            .checker
            .confirm_no_escalation(&req.user_info, &cluster_scoped, None, &target, &mut check)
            .await?;
        if !outcome.is_allowed() {
            return Ok(outcome);
        }

        for (ns, ns_rules) in role.namespaced_rules.iter().flatten() {
            let outcome = self
                .checker
                .confirm_no_escalation(&req.user_info, ns_rules, Some(ns), &target, &mut check)
                .await?;
            if !outcome.is_allowed() {
                return Ok(outcome);
            }
        }
        Ok(EscalationOutcome::Allowed)
    }
}

#[async_trait]
impl Admitter for Validator {
    fn gvr(&self) -> GroupVersionResource {
        gvr()
    }

    fn webhooks(&self) -> Vec<WebhookOptions> {
        vec![WebhookOptions::default()]
    }

    async fn admit(&self, req: &AdmissionRequest) -> Result<AdmissionResponse, AdmitError> {
        let objects = req.decode::<GlobalRoleBinding>()?;
        let response = AdmissionResponse::from(req);
        let new = objects
            .new
            .ok_or_else(|| AdmitError::Internal("request without new object".into()))?;

        if req.operation == Operation::Update && deleting(&new.metadata) {
            return Ok(response);
        }

        if new.global_role_name.is_empty() {
            return Ok(response.invalid("globalRoleName is required"));
        }
        if let Err(message) = Self::validate_subject(&new) {
            return Ok(response.invalid(message));
        }

        if let Some(old) = &objects.old {
            if let Err(message) =
                validate_immutable("globalRoleName", &old.global_role_name, &new.global_role_name)
            {
                return Ok(response.invalid(message));
            }
            for (field, before, after) in [
                ("userName", &old.user_name, &new.user_name),
                ("userPrincipalName", &old.user_principal_name, &new.user_principal_name),
                ("groupPrincipalName", &old.group_principal_name, &new.group_principal_name),
            ] {
                if let Err(message) =
                    validate_subject_transition(field, before.as_deref(), after.as_deref())
                {
                    return Ok(response.invalid(message));
                }
            }
        }

        let Some(role) = self.global_roles.get(None, &new.global_role_name) else {
            return Ok(response.invalid(format!(
                "globalRole {:?} was not found",
                new.global_role_name
            )));
        };

        match self.check_escalation(req, &role).await? {
            EscalationOutcome::Allowed => Ok(response),
            EscalationOutcome::Denied(message) => Ok(response.deny(message)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::authz::resolver::RuleResolver;
    use crate::resources::testutil::request;
    use crate::stores::MemStores;
    use k8s_openapi::api::rbac::v1::PolicyRule;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use serde_json::json;

    struct Reviewer(bool);

    #[async_trait]
    impl crate::authz::escalation::AccessReviewer for Reviewer {
        async fn review(
            &self,
            _: &k8s_openapi::api::authentication::v1::UserInfo,
            _: &k8s_openapi::api::authorization::v1::ResourceAttributes,
        ) -> Result<bool, crate::authz::escalation::AccessReviewError> {
            Ok(self.0)
        }
    }

    fn stores_with_role() -> MemStores {
        let stores = MemStores::default();
        stores.global_roles.insert(
            None,
            "viewer",
            GlobalRole {
                metadata: ObjectMeta {
                    name: Some("viewer".to_string()),
                    ..Default::default()
                },
                rules: Some(vec![PolicyRule {
                    verbs: vec!["get".to_string()],
                    api_groups: Some(vec!["".to_string()]),
                    resources: Some(vec!["pods".to_string()]),
                    ..Default::default()
                }]),
                ..Default::default()
            },
        );
        stores
    }

    fn validator(stores: &MemStores, sar_allows: bool) -> Validator {
        let set = stores.object_set();
        let checker = EscalationChecker::new(RuleResolver::new(&set), Arc::new(Reviewer(sar_allows)));
        Validator::new(set.global_roles, checker)
    }

    #[tokio::test]
    async fn binding_requires_exactly_one_subject() {
        let stores = stores_with_role();
        let v = validator(&stores, true);

        let none = request(
            gvr(),
            "GlobalRoleBinding",
            "grb1",
            None,
            Operation::Create,
            "admin",
            Some(json!({"metadata": {"name": "grb1"}, "globalRoleName": "viewer"})),
            None,
        );
        assert!(!v.admit(&none).await.unwrap().allowed);

        let both = request(
            gvr(),
            "GlobalRoleBinding",
            "grb1",
            None,
            Operation::Create,
            "admin",
            Some(json!({
                "metadata": {"name": "grb1"},
                "globalRoleName": "viewer",
                "userName": "u-abc",
                "groupPrincipalName": "okta_group://7"
            })),
            None,
        );
        assert!(!v.admit(&both).await.unwrap().allowed);

        let one = request(
            gvr(),
            "GlobalRoleBinding",
            "grb1",
            None,
            Operation::Create,
            "admin",
            Some(json!({
                "metadata": {"name": "grb1"},
                "globalRoleName": "viewer",
                "userName": "u-abc"
            })),
            None,
        );
        assert!(v.admit(&one).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn missing_role_is_invalid() {
        let stores = MemStores::default();
        let v = validator(&stores, true);
        let req = request(
            gvr(),
            "GlobalRoleBinding",
            "grb1",
            None,
            Operation::Create,
            "admin",
            Some(json!({
                "metadata": {"name": "grb1"},
                "globalRoleName": "ghost",
                "userName": "u-abc"
            })),
            None,
        );
        let res = v.admit(&req).await.unwrap();
        assert!(!res.allowed);
        assert_eq!(res.result.unwrap().code, 422);
    }

    #[tokio::test]
    async fn role_reference_is_immutable() {
        let stores = stores_with_role();
        stores.global_roles.insert(
            None,
            "editor",
            GlobalRole {
                metadata: ObjectMeta {
                    name: Some("editor".to_string()),
                    ..Default::default()
                },
                ..Default::default()
            },
        );
        let v = validator(&stores, true);
        let req = request(
            gvr(),
            "GlobalRoleBinding",
            "grb1",
            None,
            Operation::Update,
            "admin",
            Some(json!({
                "metadata": {"name": "grb1"},
                "globalRoleName": "editor",
                "userName": "u-abc"
            })),
            Some(json!({
                "metadata": {"name": "grb1"},
                "globalRoleName": "viewer",
                "userName": "u-abc"
            })),
        );
        let res = v.admit(&req).await.unwrap();
        assert!(!res.allowed);
        assert!(res.result.unwrap().message.contains("immutable"));
    }

    #[tokio::test]
    async fn principal_may_be_filled_in_once_but_not_changed() {
        let stores = stores_with_role();
        let v = validator(&stores, true);
        let old = json!({
            "metadata": {"name": "grb1"},
            "globalRoleName": "viewer",
            "userName": "u-abc"
        });
        let filled = json!({
            "metadata": {"name": "grb1"},
            "globalRoleName": "viewer",
            "userName": "u-abc",
            "userPrincipalName": "keycloak_user://1"
        });

        let req = request(
            gvr(),
            "GlobalRoleBinding",
            "grb1",
            None,
            Operation::Update,
            "admin",
            Some(filled.clone()),
            Some(old),
        );
        assert!(v.admit(&req).await.unwrap().allowed);

        let mut changed = filled.clone();
        changed["userPrincipalName"] = json!("keycloak_user://2");
        let req = request(
            gvr(),
            "GlobalRoleBinding",
            "grb1",
            None,
            Operation::Update,
            "admin",
            Some(changed),
            Some(filled),
        );
        assert!(!v.admit(&req).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn binding_beyond_own_rules_needs_the_bind_verb() {
        let stores = stores_with_role();
        let req = request(
            gvr(),
            "GlobalRoleBinding",
            "grb1",
            None,
            Operation::Create,
            "lowpriv",
            Some(json!({
                "metadata": {"name": "grb1"},
                "globalRoleName": "viewer",
                "userName": "someone"
            })),
            None,
        );
        let res = validator(&stores, false).admit(&req).await.unwrap();
        assert!(!res.allowed);
        assert_eq!(res.result.unwrap().code, 403);

        let res = validator(&stores, true).admit(&req).await.unwrap();
        assert!(res.allowed);
    }
}
