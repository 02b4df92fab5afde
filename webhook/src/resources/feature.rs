//! Validator for management.cattle.io/v3 Features.

use async_trait::async_trait;

use webhook_core::admission::{AdmissionRequest, AdmissionResponse, Operation};
use webhook_core::gvk::GroupVersionResource;

use crate::admission::{AdmitError, Admitter, WebhookOptions};
use crate::types::management::Feature;

fn gvr() -> GroupVersionResource {
    GroupVersionResource::gvr("management.cattle.io", "v3", "features")
}

/// Admits updates of Features: a feature whose value has been locked by the
/// platform cannot be steered away from the locked value.
#[derive(Default)]
pub struct Validator;

#[async_trait]
impl Admitter for Validator {
    fn gvr(&self) -> GroupVersionResource {
        gvr()
    }

    fn webhooks(&self) -> Vec<WebhookOptions> {
        vec![WebhookOptions {
            operations: vec![Operation::Update],
            timeout_seconds: 10,
            ..Default::default()
        }]
    }

    async fn admit(&self, req: &AdmissionRequest) -> Result<AdmissionResponse, AdmitError> {
        let feature = req.decode_new::<Feature>()?;
        let response = AdmissionResponse::from(req);

        if let Some(locked) = feature.status.locked_value {
            let effective = feature.spec.value.unwrap_or(feature.status.default);
            if effective != locked {
                return Ok(response.invalid(format!(
                    "feature {:?} value is locked to {locked}",
                    req.name
                )));
            }
        }
        Ok(response)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::resources::testutil::request;
    use serde_json::json;

    fn update(spec_value: serde_json::Value, locked: serde_json::Value) -> AdmissionRequest {
        request(
            gvr(),
            "Feature",
            "embedded-cluster-api",
            None,
            Operation::Update,
            "admin",
            Some(json!({
                "metadata": {"name": "embedded-cluster-api"},
                "spec": {"value": spec_value},
                "status": {"default": false, "dynamic": false, "lockedValue": locked}
            })),
            Some(json!({"metadata": {"name": "embedded-cluster-api"}, "spec": {}})),
        )
    }

    #[tokio::test]
    async fn locked_features_pin_their_value() {
        let v = Validator;
        assert!(!v.admit(&update(json!(true), json!(false))).await.unwrap().allowed);
        assert!(v.admit(&update(json!(false), json!(false))).await.unwrap().allowed);
        // default matches the lock when spec.value is unset
        assert!(v.admit(&update(json!(null), json!(false))).await.unwrap().allowed);
        // unlocked features move freely
        assert!(v.admit(&update(json!(true), json!(null))).await.unwrap().allowed);
    }
}
