//! Validator for management.cattle.io/v3 AuthConfigs.

use async_trait::async_trait;

use webhook_core::admission::{AdmissionRequest, AdmissionResponse, Operation};
use webhook_core::gvk::GroupVersionResource;

use crate::admission::{AdmitError, Admitter, WebhookOptions};
use crate::resources::annotation;
use crate::types::management::AuthConfig;

fn gvr() -> GroupVersionResource {
    GroupVersionResource::gvr("management.cattle.io", "v3", "authconfigs")
}

const CLEANUP_ANN: &str = "management.cattle.io/auth-provider-cleanup";
const CLEANUP_VALUES: [&str; 3] = ["rancher-locked", "user-locked", "unlocked"];

/// Admits creates and updates of AuthConfigs.
#[derive(Default)]
pub struct Validator;

#[async_trait]
impl Admitter for Validator {
    fn gvr(&self) -> GroupVersionResource {
        gvr()
    }

    fn webhooks(&self) -> Vec<WebhookOptions> {
        vec![WebhookOptions {
            operations: vec![Operation::Create, Operation::Update],
            timeout_seconds: 10,
            ..Default::default()
        }]
    }

    async fn admit(&self, req: &AdmissionRequest) -> Result<AdmissionResponse, AdmitError> {
        let config = req.decode_new::<AuthConfig>()?;
        let response = AdmissionResponse::from(req);

        if let Some(value) = annotation(&config.metadata, CLEANUP_ANN) {
            if !CLEANUP_VALUES.contains(&value) {
                return Ok(response.invalid(format!(
                    "annotation {CLEANUP_ANN} must be one of {CLEANUP_VALUES:?}, got {value:?}"
                )));
            }
        }
        Ok(response)
    }
}
