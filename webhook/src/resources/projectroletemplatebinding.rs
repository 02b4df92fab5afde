//! Admitters for management.cattle.io/v3 ProjectRoleTemplateBindings.

use std::sync::Arc;

use async_trait::async_trait;

use webhook_core::admission::{AdmissionRequest, AdmissionResponse, Operation};
use webhook_core::gvk::GroupVersionResource;
use webhook_core::patch;

use crate::admission::{AdmitError, Admitter, Scope, SideEffects, WebhookOptions};
use crate::authz::escalation::{
    BypassTarget, EscalationCheck, EscalationChecker, EscalationOutcome, VERB_BIND,
};
use crate::authz::templates::context;
use crate::resources::{
    deleting, exactly_one_subject, set_creator_annotations, validate_immutable,
    validate_subject_transition,
};
use crate::stores::Store;
use crate::types::management::{Project, ProjectRoleTemplateBinding};

fn gvr() -> GroupVersionResource {
    GroupVersionResource::gvr("management.cattle.io", "v3", "projectroletemplatebindings")
}

/// Split a `<clusterName>:<projectName>` reference.
fn split_project_name(project_name: &str) -> Option<(&str, &str)> {
    project_name
        .split_once(':')
        .filter(|(cluster, project)| !cluster.is_empty() && !project.is_empty())
}

/// Admits creates and updates of ProjectRoleTemplateBindings.
pub struct Validator {
    projects: Arc<dyn Store<Project>>,
    checker: EscalationChecker,
}

impl Validator {
    /// Build the validator over the Project cache and the escalation checker.
    pub fn new(projects: Arc<dyn Store<Project>>, checker: EscalationChecker) -> Self {
        Self { projects, checker }
    }

    fn validate_shape(req: &AdmissionRequest, binding: &ProjectRoleTemplateBinding) -> Result<(), String> {
        if binding.role_template_name.is_empty() {
            return Err("roleTemplateName is required".to_string());
        }
        let Some((_, project)) = split_project_name(&binding.project_name) else {
            return Err(
                "projectName must be of the form <clusterName>:<projectName>".to_string(),
            );
        };
        if Some(project) != req.namespace.as_deref() {
            return Err("projectName must match the binding's namespace".to_string());
        }
        exactly_one_subject(&[
            ("userName", binding.user_name.as_deref()),
            ("groupName", binding.group_name.as_deref()),
            ("groupPrincipalName", binding.group_principal_name.as_deref()),
            ("serviceAccount", binding.service_account.as_deref()),
        ])?;
        if binding.user_principal_name.is_some() && binding.user_name.is_none() {
            return Err("userPrincipalName requires userName".to_string());
        }
        Ok(())
    }
}

#[async_trait]
impl Admitter for Validator {
    fn gvr(&self) -> GroupVersionResource {
        gvr()
    }

    fn webhooks(&self) -> Vec<WebhookOptions> {
        vec![WebhookOptions {
            scope: Scope::Namespaced,
            ..Default::default()
        }]
    }

    async fn admit(&self, req: &AdmissionRequest) -> Result<AdmissionResponse, AdmitError> {
        let objects = req.decode::<ProjectRoleTemplateBinding>()?;
        let response = AdmissionResponse::from(req);
        let new = objects
            .new
            .ok_or_else(|| AdmitError::Internal("request without new object".into()))?;

        if req.operation == Operation::Update && deleting(&new.metadata) {
            return Ok(response);
        }

        if let Err(message) = Self::validate_shape(req, &new) {
            return Ok(response.invalid(message));
        }

        if let Some(old) = &objects.old {
            if let Err(message) = validate_immutable("projectName", &old.project_name, &new.project_name)
                .and_then(|()| {
                    validate_immutable(
                        "roleTemplateName",
                        &old.role_template_name,
                        &new.role_template_name,
                    )
                })
            {
                return Ok(response.invalid(message));
            }
            for (field, before, after) in [
                ("userName", &old.user_name, &new.user_name),
                ("userPrincipalName", &old.user_principal_name, &new.user_principal_name),
                ("groupName", &old.group_name, &new.group_name),
                ("groupPrincipalName", &old.group_principal_name, &new.group_principal_name),
                ("serviceAccount", &old.service_account, &new.service_account),
            ] {
                if let Err(message) =
                    validate_subject_transition(field, before.as_deref(), after.as_deref())
                {
                    return Ok(response.invalid(message));
                }
            }
        }

        // the project must exist under the named cluster
        let Some((cluster, project)) = split_project_name(&new.project_name) else {
            return Ok(response.invalid("projectName must be of the form <clusterName>:<projectName>"));
        };
        if self.projects.get(Some(cluster), project).is_none() {
            return Ok(response.invalid(format!(
                "project {project:?} was not found in cluster {cluster:?}"
            )));
        }

        let templates = self.checker.resolver().templates();
        let template = match templates.get(&new.role_template_name) {
            Ok(template) => template,
            Err(err) => return Ok(response.invalid(err.to_string())),
        };
        if template.context != context::PROJECT {
            return Ok(response.invalid(format!(
                "roleTemplate {:?} does not have project context",
                new.role_template_name
            )));
        }
        if req.operation == Operation::Create && template.locked {
            return Ok(response.invalid(format!(
                "roleTemplate {:?} is locked and cannot be newly bound",
                new.role_template_name
            )));
        }

        let candidates = templates.rules_for(&template)?;
        let target = BypassTarget {
            verb: VERB_BIND,
            group: "management.cattle.io",
            resource: "roletemplates",
            name: new.role_template_name.clone(),
        };
        let outcome = self
            .checker
            .confirm_no_escalation(
                &req.user_info,
                &candidates,
                req.namespace.as_deref(),
                &target,
                &mut EscalationCheck::new(),
            )
            .await?;
        match outcome {
            EscalationOutcome::Allowed => Ok(response),
            EscalationOutcome::Denied(message) => Ok(response.deny(message)),
        }
    }
}

/// Stamps creator annotations on newly created bindings.
#[derive(Default)]
pub struct Mutator;

#[async_trait]
impl Admitter for Mutator {
    fn gvr(&self) -> GroupVersionResource {
        gvr()
    }

    fn webhooks(&self) -> Vec<WebhookOptions> {
        vec![WebhookOptions {
            operations: vec![Operation::Create],
            scope: Scope::Namespaced,
            side_effects: SideEffects::NoneOnDryRun,
            ..Default::default()
        }]
    }

    async fn admit(&self, req: &AdmissionRequest) -> Result<AdmissionResponse, AdmitError> {
        let mut binding = req.decode_new::<ProjectRoleTemplateBinding>()?;
        let original = req
            .object
            .clone()
            .ok_or_else(|| AdmitError::Internal("create request without object".into()))?;
        set_creator_annotations(&mut binding.metadata, &req.user_info);
        let patch = patch::diff(&original, &binding)?;
        Ok(AdmissionResponse::from(req).with_patch(patch)?)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::authz::resolver::RuleResolver;
    use crate::resources::testutil::request;
    use crate::stores::MemStores;
    use crate::types::management::RoleTemplate;
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

    fn stores() -> MemStores {
        let stores = MemStores::default();
        stores.role_templates.insert(
            None,
            "project-member",
            RoleTemplate {
                metadata: ObjectMeta {
                    name: Some("project-member".to_string()),
                    ..Default::default()
                },
                context: "project".to_string(),
                ..Default::default()
            },
        );
        stores.projects.insert(
            Some("c-abc"),
            "p-xyz",
            Project {
                metadata: ObjectMeta {
                    name: Some("p-xyz".to_string()),
                    namespace: Some("c-abc".to_string()),
                    ..Default::default()
                },
                ..Default::default()
            },
        );
        stores
    }

    fn validator(stores: &MemStores, sar_allows: bool) -> Validator {
        let set = stores.object_set();
        let checker = EscalationChecker::new(RuleResolver::new(&set), Arc::new(Reviewer(sar_allows)));
        Validator::new(set.projects, checker)
    }

    fn body() -> serde_json::Value {
        json!({
            "metadata": {"name": "prtb1", "namespace": "p-xyz"},
            "projectName": "c-abc:p-xyz",
            "roleTemplateName": "project-member",
            "userName": "u-abc"
        })
    }

    #[tokio::test]
    async fn well_formed_binding_is_admitted() {
        let stores = stores();
        let req = request(
            gvr(),
            "ProjectRoleTemplateBinding",
            "prtb1",
            Some("p-xyz"),
            Operation::Create,
            "admin",
            Some(body()),
            None,
        );
        let res = validator(&stores, true).admit(&req).await.unwrap();
        assert!(res.allowed, "{:?}", res.result);
    }

    #[tokio::test]
    async fn malformed_project_name_is_invalid() {
        let stores = stores();
        let v = validator(&stores, true);
        for bad in ["p-xyz", ":p-xyz", "c-abc:", ""] {
            let mut b = body();
            b["projectName"] = json!(bad);
            let req = request(
                gvr(),
                "ProjectRoleTemplateBinding",
                "prtb1",
                Some("p-xyz"),
                Operation::Create,
                "admin",
                Some(b),
                None,
            );
            let res = v.admit(&req).await.unwrap();
            assert!(!res.allowed, "projectName {bad:?} should be rejected");
        }
    }

    #[tokio::test]
    async fn missing_project_is_invalid() {
        let stores = stores();
        let mut b = body();
        b["projectName"] = json!("c-abc:p-ghost");
        b["metadata"]["namespace"] = json!("p-ghost");
        let req = request(
            gvr(),
            "ProjectRoleTemplateBinding",
            "prtb1",
            Some("p-ghost"),
            Operation::Create,
            "admin",
            Some(b),
            None,
        );
        let res = validator(&stores, true).admit(&req).await.unwrap();
        assert!(!res.allowed);
        assert!(res.result.unwrap().message.contains("not found"));
    }

    #[tokio::test]
    async fn cluster_context_templates_are_rejected() {
        let stores = stores();
        stores.role_templates.insert(
            None,
            "cluster-member",
            RoleTemplate {
                metadata: ObjectMeta {
                    name: Some("cluster-member".to_string()),
                    ..Default::default()
                },
                context: "cluster".to_string(),
                ..Default::default()
            },
        );
        let mut b = body();
        b["roleTemplateName"] = json!("cluster-member");
        let req = request(
            gvr(),
            "ProjectRoleTemplateBinding",
            "prtb1",
            Some("p-xyz"),
            Operation::Create,
            "admin",
            Some(b),
            None,
        );
        let res = validator(&stores, true).admit(&req).await.unwrap();
        assert!(!res.allowed);
        assert!(res.result.unwrap().message.contains("project context"));
    }

    #[tokio::test]
    async fn service_account_subject_is_permitted_for_projects() {
        let stores = stores();
        let mut b = body();
        b["userName"] = json!(null);
        b["serviceAccount"] = json!("system:serviceaccount:p-xyz:builder");
        let req = request(
            gvr(),
            "ProjectRoleTemplateBinding",
            "prtb1",
            Some("p-xyz"),
            Operation::Create,
            "admin",
            Some(b),
            None,
        );
        let res = validator(&stores, true).admit(&req).await.unwrap();
        assert!(res.allowed, "{:?}", res.result);
    }

    #[tokio::test]
    async fn scope_fields_are_immutable() {
        let stores = stores();
        stores.projects.insert(
            Some("c-abc"),
            "p-two",
            Project::default(),
        );
        let mut changed = body();
        changed["projectName"] = json!("c-abc:p-two");
        let req = request(
            gvr(),
            "ProjectRoleTemplateBinding",
            "prtb1",
            Some("p-xyz"),
            Operation::Update,
            "admin",
            Some(changed),
            Some(body()),
        );
        let res = validator(&stores, true).admit(&req).await.unwrap();
        assert!(!res.allowed);
    }
}
