//! Admitters for the rke-machine-config.cattle.io/v1 wildcard resource.
//!
//! Machine configs are driver-specific kinds (amazonec2configs,
//! digitaloceanconfigs, ...) registered through a single wildcard rule; the
//! admitters only reason about metadata.

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
use crate::types::PartialObject;

fn gvr() -> GroupVersionResource {
    GroupVersionResource::gvr("rke-machine-config.cattle.io", "v1", "*")
}

/// Admits creates and updates of machine configs.
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
        let objects = req.decode::<PartialObject>()?;
        let response = AdmissionResponse::from(req);
        let Some(new) = objects.new else {
            return Ok(response);
        };
        match &objects.old {
            None => {
                if let Err(message) = validate_creator_principal(&new.metadata, self.users.as_ref())
                {
                    return Ok(response.invalid(message));
                }
            }
            Some(old) => {
                if let Err(message) =
                    validate_creator_annotation_transitions(&old.metadata, &new.metadata)
                {
                    return Ok(response.invalid(message));
                }
            }
        }
        Ok(response)
    }
}

/// Stamps creator annotations on newly created machine configs.
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
        let mut config = req.decode_new::<PartialObject>()?;
        let original = req
            .object
            .clone()
            .ok_or_else(|| AdmitError::Internal("create request without object".into()))?;
        set_creator_annotations(&mut config.metadata, &req.user_info);
        let patch = patch::diff(&original, &config)?;
        Ok(AdmissionResponse::from(req).with_patch(patch)?)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::resources::testutil::{patched, request};
    use webhook_core::gvk::GroupVersionResource as Gvr;

    #[tokio::test]
    async fn wildcard_gvr_accepts_any_machine_config_resource() {
        let registered = gvr();
        assert!(registered.accepts(&Gvr::gvr("rke-machine-config.cattle.io", "v1", "amazonec2configs")));
        assert!(registered.accepts(&Gvr::gvr("rke-machine-config.cattle.io", "v1", "digitaloceanconfigs")));
        assert!(!registered.accepts(&Gvr::gvr("management.cattle.io", "v3", "clusters")));
    }

    #[tokio::test]
    async fn creates_are_stamped_regardless_of_kind() {
        let req = request(
            Gvr::gvr("rke-machine-config.cattle.io", "v1", "amazonec2configs"),
            "Amazonec2Config",
            "mc1",
            Some("fleet-default"),
            Operation::Create,
            "u-admin",
            Some(serde_json::json!({
                "metadata": {"name": "mc1", "namespace": "fleet-default"},
                "region": "eu-west-1",
                "instanceType": "t3.large"
            })),
            None,
        );
        let res = Mutator.admit(&req).await.unwrap();
        assert!(res.allowed && res.has_patch());
        let doc = patched(&req, &res);
        assert_eq!(doc["metadata"]["annotations"]["field.cattle.io/creatorId"], "u-admin");
        // driver-specific fields ride through untouched
        assert_eq!(doc["region"], "eu-west-1");
    }
}
