//! Validator for management.cattle.io/v3 UserAttributes.

use std::sync::Arc;

use async_trait::async_trait;

use webhook_core::admission::{AdmissionRequest, AdmissionResponse, Operation};
use webhook_core::gvk::GroupVersionResource;

use crate::admission::{AdmitError, Admitter, WebhookOptions};
use crate::stores::{ObjectSet, Store};
use crate::types::management::User;

fn gvr() -> GroupVersionResource {
    GroupVersionResource::gvr("management.cattle.io", "v3", "userattributes")
}

/// Admits creates of UserAttributes: the attribute object shadows a User of
/// the same name.
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
            operations: vec![Operation::Create],
            timeout_seconds: 10,
            ..Default::default()
        }]
    }

    async fn admit(&self, req: &AdmissionRequest) -> Result<AdmissionResponse, AdmitError> {
        let response = AdmissionResponse::from(req);
        if self.users.get(None, &req.name).is_none() {
            return Ok(response.invalid(format!(
                "userAttribute {:?} does not match an existing user",
                req.name
            )));
        }
        Ok(response)
    }
}
