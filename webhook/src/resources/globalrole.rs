//! Validator for management.cattle.io/v3 GlobalRoles.

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
use crate::types::management::GlobalRole;

fn gvr() -> GroupVersionResource {
    GroupVersionResource::gvr("management.cattle.io", "v3", "globalroles")
}

/// Admits creates, updates, and deletes of GlobalRoles.
pub struct Validator {
    checker: EscalationChecker,
}

impl Validator {
    /// Build the validator over the escalation checker.
    pub fn new(checker: EscalationChecker) -> Self {
        Self { checker }
    }

    /// Field-shape validation of every rule section.
    fn validate_shape(&self, role: &GlobalRole) -> Result<(), String> {
        if let Some(role_rules) = &role.rules {
            rules::validate(role_rules, false, "rules").map_err(|e| e.to_string())?;
        }
        if let Some(per_ns) = &role.namespaced_rules {
            // an empty rule list for a namespace is admitted
            for (ns, ns_rules) in per_ns {
                rules::validate(ns_rules, true, &format!("namespacedRules[{ns}]"))
                    .map_err(|e| e.to_string())?;
            }
        }
        if let Some(fleet) = &role.inherited_fleet_workspace_permissions {
            if let Some(fleet_rules) = &fleet.resource_rules {
                rules::validate(
                    fleet_rules,
                    true,
                    "inheritedFleetWorkspacePermissions.resourceRules",
                )
                .map_err(|e| e.to_string())?;
            }
            if let Some(verbs) = &fleet.workspace_verbs {
                if verbs.is_empty() {
                    return Err(
                        "inheritedFleetWorkspacePermissions.workspaceVerbs must not be empty"
                            .to_string(),
                    );
                }
            }
        }
        Ok(())
    }

    /// Newly added `inheritedClusterRoles` must point at unlocked
    /// cluster-context templates; entries already on the old object are
    /// grandfathered.
    fn validate_inherited(&self, old: Option<&GlobalRole>, new: &GlobalRole) -> Result<(), String> {
        let existing: Vec<&String> = old
            .and_then(|o| o.inherited_cluster_roles.as_ref())
            .map(|names| names.iter().collect())
            .unwrap_or_default();
        for name in new.inherited_cluster_roles.iter().flatten() {
            if existing.contains(&name) {
                continue;
            }
            let template = self
                .checker
                .resolver()
                .templates()
                .get(name)
                .map_err(|e| format!("inheritedClusterRoles: {e}"))?;
            if template.context != context::CLUSTER {
                return Err(format!(
                    "inheritedClusterRoles: roleTemplate {name:?} does not have cluster context"
                ));
            }
            if template.locked {
                return Err(format!(
                    "inheritedClusterRoles: roleTemplate {name:?} is locked"
                ));
            }
        }
        Ok(())
    }

    /// Builtin roles admit only metadata and default-flag changes.
    fn builtin_fields_unchanged(old: &GlobalRole, new: &GlobalRole) -> bool {
        let strip = |role: &GlobalRole| -> serde_json::Value {
            let mut copy = role.clone();
            copy.metadata = Default::default();
            copy.new_user_default = false;
            for key in ["clusterCreatorDefault", "projectCreatorDefault", "locked"] {
                copy.extra.remove(key);
            }
            serde_json::to_value(copy).unwrap_or_default()
        };
        strip(old) == strip(new)
    }

    /// The union of every rule source the role grants, checked per scope.
    async fn check_escalation(
        &self,
        req: &AdmissionRequest,
        role: &GlobalRole,
    ) -> Result<EscalationOutcome, AdmitError> {
        let target = BypassTarget {
            verb: VERB_ESCALATE,
            group: "management.cattle.io",
            resource: "globalroles",
            name: req.name.clone(),
        };
        let mut check = EscalationCheck::new();
        let templates = self.checker.resolver().templates();

        let mut cluster_scoped = role.rules.clone().unwrap_or_default();
        if let Some(inherited) = &role.inherited_cluster_roles {
            cluster_scoped.extend(templates.rules_for_names(inherited)?);
        }
        if let Some(fleet) = &role.inherited_fleet_workspace_permissions {
            cluster_scoped.extend(fleet.resource_rules.clone().unwrap_or_default());
            if let Some(rule) = self
                .checker
                .resolver()
                .fleet_workspace_verbs_rule(fleet.workspace_verbs.as_deref())
            {
                cluster_scoped.push(rule);
            }
        }
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
        vec![WebhookOptions {
            operations: vec![Operation::Create, Operation::Update, Operation::Delete],
            ..Default::default()
        }]
    }

    async fn admit(&self, req: &AdmissionRequest) -> Result<AdmissionResponse, AdmitError> {
        let objects = req.decode::<GlobalRole>()?;
        let response = AdmissionResponse::from(req);

        if req.operation == Operation::Delete {
            let old = objects
                .old
                .ok_or_else(|| AdmitError::Internal("delete request without old object".into()))?;
            if old.builtin {
                return Ok(response.deny(format!("globalRole {:?} is builtin", req.name)));
            }
            return Ok(response);
        }

        let new = objects
            .new
            .ok_or_else(|| AdmitError::Internal("request without new object".into()))?;

        // updates racing finalizer removal are always admitted
        if req.operation == Operation::Update && deleting(&new.metadata) {
            return Ok(response);
        }

        match (&objects.old, req.operation.clone()) {
            (_, Operation::Create) if new.builtin => {
                return Ok(response.invalid("builtin globalRoles cannot be created"));
            }
            (Some(old), Operation::Update) => {
                if !old.builtin && new.builtin {
                    return Ok(response.invalid("builtin field cannot be set to true"));
                }
                if old.builtin && !Self::builtin_fields_unchanged(old, &new) {
                    return Ok(response.deny(format!(
                        "globalRole {:?} is builtin and only its defaults may change",
                        req.name
                    )));
                }
            }
            _ => {}
        }

        if let Err(message) = self.validate_shape(&new) {
            return Ok(response.invalid(message));
        }
        if let Err(message) = self.validate_inherited(objects.old.as_ref(), &new) {
            return Ok(response.invalid(message));
        }

        match self.check_escalation(req, &new).await? {
            EscalationOutcome::Allowed => Ok(response),
            EscalationOutcome::Denied(message) => Ok(response.deny(message)),
        }
    }
}
