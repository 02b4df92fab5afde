//! Admitters for management.cattle.io/v3 ClusterRoleTemplateBindings.

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
use crate::types::management::ClusterRoleTemplateBinding;

fn gvr() -> GroupVersionResource {
    GroupVersionResource::gvr("management.cattle.io", "v3", "clusterroletemplatebindings")
}

fn subject_tuple(binding: &ClusterRoleTemplateBinding) -> (Option<&str>, Option<&str>, Option<&str>, Option<&str>) {
    (
        binding.user_name.as_deref(),
        binding.user_principal_name.as_deref(),
        binding.group_name.as_deref(),
        binding.group_principal_name.as_deref(),
    )
}

/// Admits creates and updates of ClusterRoleTemplateBindings.
pub struct Validator {
    bindings: Arc<dyn Store<ClusterRoleTemplateBinding>>,
    checker: EscalationChecker,
}

impl Validator {
    /// Build the validator over the binding cache (for duplicate detection)
    /// and the escalation checker.
    pub fn new(
        bindings: Arc<dyn Store<ClusterRoleTemplateBinding>>,
        checker: EscalationChecker,
    ) -> Self {
        Self { bindings, checker }
    }

    fn validate_shape(req: &AdmissionRequest, binding: &ClusterRoleTemplateBinding) -> Result<(), String> {
        if binding.cluster_name.is_empty() {
            return Err("clusterName is required".to_string());
        }
        if binding.role_template_name.is_empty() {
            return Err("roleTemplateName is required".to_string());
        }
        if Some(binding.cluster_name.as_str()) != req.namespace.as_deref() {
            return Err("clusterName must match the binding's namespace".to_string());
        }
        exactly_one_subject(&[
            ("userName", binding.user_name.as_deref()),
            ("groupName", binding.group_name.as_deref()),
            ("groupPrincipalName", binding.group_principal_name.as_deref()),
        ])?;
        if binding.user_principal_name.is_some() && binding.user_name.is_none() {
            return Err("userPrincipalName requires userName".to_string());
        }
        Ok(())
    }

    fn find_duplicate(&self, binding: &ClusterRoleTemplateBinding) -> Option<String> {
        self.bindings
            .state()
            .iter()
            .find(|other| {
                other.metadata.name != binding.metadata.name
                    && other.cluster_name == binding.cluster_name
                    && other.role_template_name == binding.role_template_name
                    && subject_tuple(other) == subject_tuple(binding)
            })
            .map(|other| other.metadata.name.clone().unwrap_or_default())
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
        let objects = req.decode::<ClusterRoleTemplateBinding>()?;
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
            if let Err(message) = validate_immutable("clusterName", &old.cluster_name, &new.cluster_name)
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
            ] {
                if let Err(message) =
                    validate_subject_transition(field, before.as_deref(), after.as_deref())
                {
                    return Ok(response.invalid(message));
                }
            }
        }

        let templates = self.checker.resolver().templates();
        let template = match templates.get(&new.role_template_name) {
            Ok(template) => template,
            Err(err) => return Ok(response.invalid(err.to_string())),
        };
        if template.context != context::CLUSTER {
            return Ok(response.invalid(format!(
                "roleTemplate {:?} does not have cluster context",
                new.role_template_name
            )));
        }
        if req.operation == Operation::Create && template.locked {
            return Ok(response.invalid(format!(
                "roleTemplate {:?} is locked and cannot be newly bound",
                new.role_template_name
            )));
        }

        if req.operation == Operation::Create {
            if let Some(duplicate) = self.find_duplicate(&new) {
                return Ok(response.conflict(format!(
                    "a binding with the same cluster, roleTemplate, and subject already exists: {duplicate:?}"
                )));
            }
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
                None,
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
        let mut binding = req.decode_new::<ClusterRoleTemplateBinding>()?;
        let original = req
            .object
            .clone()
            .ok_or_else(|| AdmitError::Internal("create request without object".into()))?;
        set_creator_annotations(&mut binding.metadata, &req.user_info);
        let patch = patch::diff(&original, &binding)?;
        Ok(AdmissionResponse::from(req).with_patch(patch)?)
    }
}
