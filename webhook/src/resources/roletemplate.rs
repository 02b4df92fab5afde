//! Validator for management.cattle.io/v3 RoleTemplates.

use std::sync::Arc;

use async_trait::async_trait;

use webhook_core::admission::{AdmissionRequest, AdmissionResponse, Operation};
use webhook_core::gvk::GroupVersionResource;
use webhook_core::rules;

use crate::admission::{AdmitError, Admitter, WebhookOptions};
use crate::authz::escalation::{
    BypassTarget, EscalationCheck, EscalationChecker, EscalationOutcome, VERB_ESCALATE,
};
use crate::authz::templates::context;
use crate::resources::deleting;
use crate::stores::Store;
use crate::types::management::{GlobalRole, RoleTemplate};

fn gvr() -> GroupVersionResource {
    GroupVersionResource::gvr("management.cattle.io", "v3", "roletemplates")
}

/// Admits creates, updates, and deletes of RoleTemplates.
pub struct Validator {
    global_roles: Arc<dyn Store<GlobalRole>>,
    checker: EscalationChecker,
}

impl Validator {
    /// Build the validator over the GlobalRole cache (for referrer checks)
    /// and the escalation checker.
    pub fn new(global_roles: Arc<dyn Store<GlobalRole>>, checker: EscalationChecker) -> Self {
        Self {
            global_roles,
            checker,
        }
    }

    fn validate_fields(template: &RoleTemplate) -> Result<(), String> {
        match template.context.as_str() {
            "" | context::CLUSTER | context::PROJECT => {}
            other => return Err(format!("context must be \"cluster\" or \"project\", got {other:?}")),
        }
        if template.administrative && template.context != context::CLUSTER {
            return Err("administrative roleTemplates must have cluster context".to_string());
        }
        if template.project_creator_default && template.context != context::PROJECT {
            return Err("projectCreatorDefault roleTemplates must have project context".to_string());
        }
        if template.external_rules.is_some() && !template.external {
            return Err("externalRules can only be set on external roleTemplates".to_string());
        }
        if let Some(own) = &template.rules {
            rules::validate(own, false, "rules").map_err(|e| e.to_string())?;
        }
        if let Some(external) = &template.external_rules {
            rules::validate(external, false, "externalRules").map_err(|e| e.to_string())?;
        }
        Ok(())
    }

    /// Refuse inheritance edges that would close a cycle, and edges crossing
    /// contexts.
    fn validate_inheritance(&self, template: &RoleTemplate, name: &str) -> Result<(), String> {
        let templates = self.checker.resolver().templates();
        for inherited in template.role_template_names.iter().flatten() {
            let target = templates
                .get(inherited)
                .map_err(|e| format!("roleTemplateNames: {e}"))?;
            if target.context != template.context {
                return Err(format!(
                    "roleTemplate {name:?} with context {:?} cannot inherit roleTemplate {inherited:?} with context {:?}",
                    template.context, target.context
                ));
            }
            let closes_cycle = templates
                .inherits(inherited, name)
                .map_err(|e| format!("roleTemplateNames: {e}"))?;
            if closes_cycle {
                return Err(format!(
                    "roleTemplate {name:?} cannot inherit roleTemplate {inherited:?}: {inherited:?} already inherits {name:?}"
                ));
            }
        }
        Ok(())
    }

    fn builtin_fields_unchanged(old: &RoleTemplate, new: &RoleTemplate) -> bool {
        let strip = |template: &RoleTemplate| -> serde_json::Value {
            let mut copy = template.clone();
            copy.metadata = Default::default();
            copy.locked = false;
            copy.cluster_creator_default = false;
            copy.project_creator_default = false;
            serde_json::to_value(copy).unwrap_or_default()
        };
        strip(old) == strip(new)
    }

    async fn check_escalation(
        &self,
        req: &AdmissionRequest,
        template: &RoleTemplate,
    ) -> Result<EscalationOutcome, AdmitError> {
        let templates = self.checker.resolver().templates();
        let mut candidates = templates.own_rules(template);
        if let Some(names) = &template.role_template_names {
            candidates.extend(templates.rules_for_names(names)?);
        }
        let target = BypassTarget {
            verb: VERB_ESCALATE,
            group: "management.cattle.io",
            resource: "roletemplates",
            name: req.name.clone(),
        };
        Ok(self
            .checker
            .confirm_no_escalation(
                &req.user_info,
                &candidates,
                None,
                &target,
                &mut EscalationCheck::new(),
            )
            .await?)
    }
}

#[async_trait]
impl Admitter for Validator {
    fn gvr(&self) -> GroupVersionResource {
        gvr()
    }

    fn webhooks(&self) -> Vec<WebhookOptions> {
        vec![WebhookOptions {
            operations: vec![Operation::Create, Operation::Update, Operation::Delete],
            ..Default::default()
        }]
    }

    async fn admit(&self, req: &AdmissionRequest) -> Result<AdmissionResponse, AdmitError> {
        let objects = req.decode::<RoleTemplate>()?;
        let response = AdmissionResponse::from(req);

        if req.operation == Operation::Delete {
            let old = objects
                .old
                .ok_or_else(|| AdmitError::Internal("delete request without old object".into()))?;
            if old.builtin {
                return Ok(response.deny(format!("roleTemplate {:?} is builtin", req.name)));
            }
            let referrers = self
                .checker
                .resolver()
                .templates()
                .referrers(&req.name, self.global_roles.as_ref());
            if !referrers.is_empty() {
                return Ok(response.deny(format!(
                    "roleTemplate {:?} is still referenced by: {}",
                    req.name,
                    referrers.join(", ")
                )));
            }
            return Ok(response);
        }

        let new = objects
            .new
            .ok_or_else(|| AdmitError::Internal("request without new object".into()))?;

        if req.operation == Operation::Update && deleting(&new.metadata) {
            return Ok(response);
        }

        match (&objects.old, req.operation.clone()) {
            (_, Operation::Create) if new.builtin => {
                return Ok(response.invalid("builtin roleTemplates cannot be created"));
            }
            (Some(old), Operation::Update) => {
                if !old.builtin && new.builtin {
                    return Ok(response.invalid("builtin field cannot be set to true"));
                }
                if old.builtin && !Self::builtin_fields_unchanged(old, &new) {
                    return Ok(response.deny(format!(
                        "roleTemplate {:?} is builtin and only its defaults may change",
                        req.name
                    )));
                }
            }
            _ => {}
        }

        if let Err(message) = Self::validate_fields(&new) {
            return Ok(response.invalid(message));
        }
        if let Err(message) = self.validate_inheritance(&new, &req.name) {
            return Ok(response.invalid(message));
        }

        match self.check_escalation(req, &new).await? {
            EscalationOutcome::Allowed => Ok(response),
            EscalationOutcome::Denied(message) => Ok(response.deny(message)),
        }
    }
}
