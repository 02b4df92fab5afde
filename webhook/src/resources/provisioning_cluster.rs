//! Admitters for provisioning.cattle.io/v1 Clusters.

use std::sync::Arc;

use async_trait::async_trait;

use webhook_core::admission::{AdmissionRequest, AdmissionResponse, Operation};
use webhook_core::gvk::GroupVersionResource;
use webhook_core::patch;

use crate::admission::{AdmitError, Admitter, Scope, SideEffects, WebhookOptions};
use crate::resources::{
    set_creator_annotations, validate_creator_annotation_transitions, validate_creator_principal,
};
use crate::stores::{ObjectSet, Store};
use crate::types::management::User;
use crate::types::provisioning::Cluster;

fn gvr() -> GroupVersionResource {
    GroupVersionResource::gvr("provisioning.cattle.io", "v1", "clusters")
}

/// Machine-pool roles and downstream system components claim these.
const RESERVED_NAMES: [&str; 2] = ["local", "c-local"];

fn valid_cluster_name(name: &str) -> Result<(), String> {
    if name.is_empty() || name.len() > 63 {
        return Err("cluster names must be 1-63 characters".to_string());
    }
    let dns = name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        && !name.starts_with('-')
        && !name.ends_with('-');
    if !dns {
        return Err(format!("{name:?} is not a valid RFC 1123 cluster name"));
    }
    Ok(())
}

/// Admits creates and updates of provisioning Clusters.
pub struct Validator {
    users: Arc<dyn Store<User>>,
}

impl Validator {
    /// Build the validator over the User cache.
    pub fn new(stores: &ObjectSet) -> Self {
        Self {
            users: stores.users.clone(),
        }
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
        let objects = req.decode::<Cluster>()?;
        let response = AdmissionResponse::from(req);
        let Some(new) = objects.new else {
            return Ok(response);
        };

        if req.operation == Operation::Create {
            if let Err(message) = valid_cluster_name(&req.name) {
                return Ok(response.invalid(message));
            }
            // the local cluster is registered by the system, not created
            if RESERVED_NAMES.contains(&req.name.as_str())
                && req.namespace.as_deref() != Some("fleet-local")
            {
                return Ok(response.invalid(format!("cluster name {:?} is reserved", req.name)));
            }
            if let Err(message) = validate_creator_principal(&new.metadata, self.users.as_ref()) {
                return Ok(response.invalid(message));
            }
        }

        if let Some(old) = &objects.old {
            if let Err(message) =
                validate_creator_annotation_transitions(&old.metadata, &new.metadata)
            {
                return Ok(response.invalid(message));
            }
        }
        Ok(response)
    }
}

/// Stamps creator annotations on newly created clusters.
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
        let mut cluster = req.decode_new::<Cluster>()?;
        let original = req
            .object
            .clone()
            .ok_or_else(|| AdmitError::Internal("create request without object".into()))?;
        set_creator_annotations(&mut cluster.metadata, &req.user_info);
        let patch = patch::diff(&original, &cluster)?;
        Ok(AdmissionResponse::from(req).with_patch(patch)?)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::resources::testutil::{patched, request};
    use crate::stores::MemStores;
    use serde_json::json;

    fn create(name: &str, ns: &str) -> AdmissionRequest {
        request(
            gvr(), "Cluster", name, Some(ns), Operation::Create, "u-admin",
            Some(json!({
                "metadata": {"name": name, "namespace": ns},
                "spec": {"kubernetesVersion": "v1.32.1+rke2r1"}
            })),
            None,
        )
    }

    #[tokio::test]
    async fn names_follow_dns_and_reservations() {
        let stores = MemStores::default();
        let v = Validator::new(&stores.object_set());

        assert!(v.admit(&create("team-a", "fleet-default")).await.unwrap().allowed);
        assert!(!v.admit(&create("Team-A", "fleet-default")).await.unwrap().allowed);
        assert!(!v.admit(&create(&"x".repeat(64), "fleet-default")).await.unwrap().allowed);
        // "local" only registers in fleet-local
        assert!(!v.admit(&create("local", "fleet-default")).await.unwrap().allowed);
        assert!(v.admit(&create("local", "fleet-local")).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn mutator_stamps_creator_annotations() {
        let req = create("team-a", "fleet-default");
        let res = Mutator.admit(&req).await.unwrap();
        assert!(res.allowed && res.has_patch());
        let doc = patched(&req, &res);
        assert_eq!(doc["metadata"]["annotations"]["field.cattle.io/creatorId"], "u-admin");
        assert_eq!(doc["spec"]["kubernetesVersion"], "v1.32.1+rke2r1");
    }
}
