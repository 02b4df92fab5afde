//! Ownership-label validators for the rbac.authorization.k8s.io/v1 kinds.
//!
//! Controllers stamp `gr-owner` / `grb-owner` labels onto the native RBAC
//! objects they manage; once set, those back-pointers must never change.

use async_trait::async_trait;

use webhook_core::admission::{AdmissionRequest, AdmissionResponse, Operation};
use webhook_core::gvk::GroupVersionResource;

use crate::admission::{AdmitError, Admitter, Scope, WebhookOptions};
use crate::resources::{keys, label};
use crate::types::PartialObject;

const RBAC_GROUP: &str = "rbac.authorization.k8s.io";

/// Validates that ownership labels stay put on one rbac/v1 resource.
pub struct OwnerLabelValidator {
    gvr: GroupVersionResource,
    scope: Scope,
}

impl OwnerLabelValidator {
    /// The validator for namespaced Roles.
    pub fn roles() -> Self {
        Self {
            gvr: GroupVersionResource::gvr(RBAC_GROUP, "v1", "roles"),
            scope: Scope::Namespaced,
        }
    }

    /// The validator for namespaced RoleBindings.
    pub fn role_bindings() -> Self {
        Self {
            gvr: GroupVersionResource::gvr(RBAC_GROUP, "v1", "rolebindings"),
            scope: Scope::Namespaced,
        }
    }

    /// The validator for ClusterRoles.
    pub fn cluster_roles() -> Self {
        Self {
            gvr: GroupVersionResource::gvr(RBAC_GROUP, "v1", "clusterroles"),
            scope: Scope::Cluster,
        }
    }

    /// The validator for ClusterRoleBindings.
    pub fn cluster_role_bindings() -> Self {
        Self {
            gvr: GroupVersionResource::gvr(RBAC_GROUP, "v1", "clusterrolebindings"),
            scope: Scope::Cluster,
        }
    }
}

#[async_trait]
impl Admitter for OwnerLabelValidator {
    fn gvr(&self) -> GroupVersionResource {
        self.gvr.clone()
    }

    fn webhooks(&self) -> Vec<WebhookOptions> {
        vec![WebhookOptions {
            operations: vec![Operation::Update],
            scope: self.scope,
            ..Default::default()
        }]
    }

    async fn admit(&self, req: &AdmissionRequest) -> Result<AdmissionResponse, AdmitError> {
        let objects = req.decode::<PartialObject>()?;
        let response = AdmissionResponse::from(req);
        let (Some(old), Some(new)) = (objects.old, objects.new) else {
            return Ok(response);
        };
        for key in [keys::GR_OWNER_LABEL, keys::GRB_OWNER_LABEL] {
            if let Some(owner) = label(&old.metadata, key) {
                if label(&new.metadata, key) != Some(owner) {
                    return Ok(response.invalid(format!("label {key} is immutable once set")));
                }
            }
        }
        Ok(response)
    }
}
