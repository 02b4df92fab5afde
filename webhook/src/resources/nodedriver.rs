//! Validator for management.cattle.io/v3 NodeDrivers.

use async_trait::async_trait;

use webhook_core::admission::{AdmissionRequest, AdmissionResponse, Operation};
use webhook_core::gvk::GroupVersionResource;

use crate::admission::{AdmitError, Admitter, WebhookOptions};
use crate::types::management::NodeDriver;

fn gvr() -> GroupVersionResource {
    GroupVersionResource::gvr("management.cattle.io", "v3", "nodedrivers")
}

/// Admits creates, updates, and deletes of NodeDrivers.
#[derive(Default)]
pub struct Validator;

#[async_trait]
impl Admitter for Validator {
    fn gvr(&self) -> GroupVersionResource {
        gvr()
    }

    fn webhooks(&self) -> Vec<WebhookOptions> {
        vec![WebhookOptions {
            operations: vec![Operation::Create, Operation::Update, Operation::Delete],
            timeout_seconds: 10,
            ..Default::default()
        }]
    }

    async fn admit(&self, req: &AdmissionRequest) -> Result<AdmissionResponse, AdmitError> {
        let objects = req.decode::<NodeDriver>()?;
        let response = AdmissionResponse::from(req);

        if req.operation == Operation::Delete {
            let old = objects
                .old
                .ok_or_else(|| AdmitError::Internal("delete request without old object".into()))?;
            if old.spec.builtin {
                return Ok(response.deny(format!("nodeDriver {:?} is builtin", req.name)));
            }
            return Ok(response);
        }

        let new = objects
            .new
            .ok_or_else(|| AdmitError::Internal("request without new object".into()))?;

        // custom drivers have to come from somewhere
        if new.spec.active && !new.spec.builtin {
            let url = new.spec.url.as_deref().unwrap_or_default();
            if url.is_empty() {
                return Ok(response.invalid("spec.url is required for non-builtin drivers"));
            }
            if !url.starts_with("https://") && !url.starts_with("http://") {
                return Ok(response.invalid("spec.url must be an http(s) URL"));
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

    #[tokio::test]
    async fn builtin_drivers_cannot_be_deleted() {
        let req = request(
            gvr(), "NodeDriver", "amazonec2", None, Operation::Delete, "admin",
            None,
            Some(json!({"metadata": {"name": "amazonec2"}, "spec": {"builtin": true, "active": true}})),
        );
        let res = Validator.admit(&req).await.unwrap();
        assert!(!res.allowed);
        assert_eq!(res.result.unwrap().code, 403);
    }

    #[tokio::test]
    async fn custom_drivers_need_a_download_url() {
        let create = |spec: serde_json::Value| {
            request(
                gvr(), "NodeDriver", "custom", None, Operation::Create, "admin",
                Some(json!({"metadata": {"name": "custom"}, "spec": spec})),
                None,
            )
        };
        let res = Validator.admit(&create(json!({"active": true}))).await.unwrap();
        assert!(!res.allowed);

        let res = Validator
            .admit(&create(json!({"active": true, "url": "ftp://x"})))
            .await
            .unwrap();
        assert!(!res.allowed);

        let res = Validator
            .admit(&create(json!({"active": true, "url": "https://drivers.example.com/x"})))
            .await
            .unwrap();
        assert!(res.allowed);

        // inactive drivers may sit without a url
        let res = Validator.admit(&create(json!({"active": false}))).await.unwrap();
        assert!(res.allowed);
    }
}
