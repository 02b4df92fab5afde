//! Validator for cluster.cattle.io/v3 ClusterAuthTokens.

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

use webhook_core::admission::{AdmissionRequest, AdmissionResponse, Operation};
use webhook_core::gvk::GroupVersionResource;

use crate::admission::{AdmitError, Admitter, Scope, WebhookOptions};
use crate::types::cluster::ClusterAuthToken;

fn gvr() -> GroupVersionResource {
    GroupVersionResource::gvr("cluster.cattle.io", "v3", "clusterauthtokens")
}

fn valid_timestamp(field: &str, value: &str) -> Result<(), String> {
    serde_json::from_value::<Time>(serde_json::Value::String(value.to_string()))
        .map(|_| ())
        .map_err(|_| format!("{field}: {value:?} is not an RFC 3339 timestamp"))
}

/// Admits creates and updates of ClusterAuthTokens.
#[derive(Default)]
pub struct Validator;

#[async_trait]
impl Admitter for Validator {
    fn gvr(&self) -> GroupVersionResource {
        gvr()
    }

    fn webhooks(&self) -> Vec<WebhookOptions> {
        vec![WebhookOptions {
            scope: Scope::Namespaced,
            timeout_seconds: 10,
            ..Default::default()
        }]
    }

    async fn admit(&self, req: &AdmissionRequest) -> Result<AdmissionResponse, AdmitError> {
        let token = req.decode_new::<ClusterAuthToken>()?;
        let response = AdmissionResponse::from(req);

        if token.user_name.is_empty() {
            return Ok(response.invalid("userName is required"));
        }
        if !token.expires_at.is_empty() {
            if let Err(message) = valid_timestamp("expiresAt", &token.expires_at) {
                return Ok(response.invalid(message));
            }
        }
        if let Some(last_used) = token.last_used_at.as_deref() {
            if let Err(message) = valid_timestamp("lastUsedAt", last_used) {
                return Ok(response.invalid(message));
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

    async fn admit(body: serde_json::Value) -> AdmissionResponse {
        let req = request(
            gvr(), "ClusterAuthToken", "cat1", Some("cattle-system"), Operation::Update, "admin",
            Some(body),
            Some(json!({"metadata": {"name": "cat1"}, "userName": "u-abc"})),
        );
        Validator.admit(&req).await.unwrap()
    }

    #[tokio::test]
    async fn user_name_is_required() {
        let res = admit(json!({"metadata": {"name": "cat1"}})).await;
        assert!(!res.allowed);
    }

    #[tokio::test]
    async fn timestamps_must_be_rfc3339() {
        let res = admit(json!({
            "metadata": {"name": "cat1"},
            "userName": "u-abc",
            "lastUsedAt": "2026-08-01T10:30:00Z"
        }))
        .await;
        assert!(res.allowed, "{:?}", res.result);

        let res = admit(json!({
            "metadata": {"name": "cat1"},
            "userName": "u-abc",
            "lastUsedAt": "yesterday"
        }))
        .await;
        assert!(!res.allowed);

        let res = admit(json!({
            "metadata": {"name": "cat1"},
            "userName": "u-abc",
            "expiresAt": "not-a-time"
        }))
        .await;
        assert!(!res.allowed);
    }
}
