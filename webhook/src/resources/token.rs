//! Validator for management.cattle.io/v3 Tokens.

use async_trait::async_trait;

use webhook_core::admission::{AdmissionRequest, AdmissionResponse, Operation};
use webhook_core::gvk::GroupVersionResource;

use crate::admission::{AdmitError, Admitter, WebhookOptions};
use crate::resources::validate_immutable;
use crate::types::management::Token;

fn gvr() -> GroupVersionResource {
    GroupVersionResource::gvr("management.cattle.io", "v3", "tokens")
}

/// Admits creates and updates of Tokens: the owner is fixed, the TTL never
/// grows.
#[derive(Default)]
pub struct Validator;

#[async_trait]
impl Admitter for Validator {
    fn gvr(&self) -> GroupVersionResource {
        gvr()
    }

    fn webhooks(&self) -> Vec<WebhookOptions> {
        vec![WebhookOptions {
            timeout_seconds: 10,
            ..Default::default()
        }]
    }

    async fn admit(&self, req: &AdmissionRequest) -> Result<AdmissionResponse, AdmitError> {
        let objects = req.decode::<Token>()?;
        let response = AdmissionResponse::from(req);
        let new = objects
            .new
            .ok_or_else(|| AdmitError::Internal("request without new object".into()))?;

        if new.user_id.is_empty() {
            return Ok(response.invalid("userId is required"));
        }
        if new.ttl_millis < 0 {
            return Ok(response.invalid("ttl must not be negative"));
        }

        if let Some(old) = &objects.old {
            if let Err(message) = validate_immutable("userId", &old.user_id, &new.user_id) {
                return Ok(response.invalid(message));
            }
            // a ttl of zero never expires; moving to zero or past the old
            // value would extend the token's life
            let extended = old.ttl_millis != 0 && (new.ttl_millis == 0 || new.ttl_millis > old.ttl_millis);
            if extended {
                return Ok(response.invalid("ttl may only be shortened"));
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

    fn token(user: &str, ttl: i64) -> serde_json::Value {
        json!({"metadata": {"name": "token-abc"}, "userId": user, "ttl": ttl})
    }

    async fn admit_update(old: serde_json::Value, new: serde_json::Value) -> AdmissionResponse {
        let req = request(
            gvr(), "Token", "token-abc", None, Operation::Update, "admin", Some(new), Some(old),
        );
        Validator.admit(&req).await.unwrap()
    }

    #[tokio::test]
    async fn user_id_is_required_and_immutable() {
        let req = request(
            gvr(), "Token", "token-abc", None, Operation::Create, "admin",
            Some(token("", 0)), None,
        );
        assert!(!Validator.admit(&req).await.unwrap().allowed);

        let res = admit_update(token("u-abc", 0), token("u-other", 0)).await;
        assert!(!res.allowed);
        assert!(res.result.unwrap().message.contains("immutable"));
    }

    #[tokio::test]
    async fn ttl_may_shrink_but_not_grow() {
        assert!(admit_update(token("u", 10_000), token("u", 5_000)).await.allowed);
        assert!(!admit_update(token("u", 10_000), token("u", 20_000)).await.allowed);
        // zero means forever, so moving to zero is an extension
        assert!(!admit_update(token("u", 10_000), token("u", 0)).await.allowed);
        assert!(admit_update(token("u", 0), token("u", 10_000)).await.allowed);

        let req = request(
            gvr(), "Token", "token-abc", None, Operation::Create, "admin",
            Some(token("u", -5)), None,
        );
        assert!(!Validator.admit(&req).await.unwrap().allowed);
    }
}
