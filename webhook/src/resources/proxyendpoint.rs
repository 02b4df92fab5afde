//! Validator for management.cattle.io/v3 ProxyEndpoints.

use std::sync::Arc;

use async_trait::async_trait;

use webhook_core::admission::{AdmissionRequest, AdmissionResponse, Operation};
use webhook_core::gvk::GroupVersionResource;

use crate::admission::{AdmitError, Admitter, WebhookOptions};
use crate::resources::{validate_creator_annotation_transitions, validate_creator_principal};
use crate::stores::{ObjectSet, Store};
use crate::types::management::User;
use crate::types::PartialObject;

fn gvr() -> GroupVersionResource {
    GroupVersionResource::gvr("management.cattle.io", "v3", "proxyendpoints")
}

/// Admits creates and updates of ProxyEndpoints: creator metadata follows
/// the platform-wide annotation rules.
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
            timeout_seconds: 10,
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

#[cfg(test)]
mod test {
    use super::*;
    use crate::resources::testutil::request;
    use crate::stores::MemStores;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use serde_json::json;

    #[tokio::test]
    async fn creator_principal_must_match_a_user() {
        let stores = MemStores::default();
        let v = Validator::new(&stores.object_set());
        let body = json!({
            "metadata": {
                "name": "pe1",
                "annotations": {
                    "field.cattle.io/creatorId": "u-abc",
                    "field.cattle.io/creator-principal-name": "keycloak_user://1"
                }
            }
        });
        let req = request(gvr(), "ProxyEndpoint", "pe1", None, Operation::Create, "admin", Some(body), None);
        assert!(!v.admit(&req).await.unwrap().allowed);

        stores.users.insert(
            None,
            "u-abc",
            User {
                metadata: ObjectMeta {
                    name: Some("u-abc".to_string()),
                    ..Default::default()
                },
                principal_ids: Some(vec!["keycloak_user://1".to_string()]),
                ..Default::default()
            },
        );
        assert!(v.admit(&req).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn creator_id_cannot_change() {
        let stores = MemStores::default();
        let v = Validator::new(&stores.object_set());
        let old = json!({
            "metadata": {"name": "pe1", "annotations": {"field.cattle.io/creatorId": "u-abc"}}
        });
        let new = json!({
            "metadata": {"name": "pe1", "annotations": {"field.cattle.io/creatorId": "u-other"}}
        });
        let req = request(gvr(), "ProxyEndpoint", "pe1", None, Operation::Update, "admin", Some(new), Some(old.clone()));
        assert!(!v.admit(&req).await.unwrap().allowed);

        // removal is fine
        let removed = json!({"metadata": {"name": "pe1"}});
        let req = request(gvr(), "ProxyEndpoint", "pe1", None, Operation::Update, "admin", Some(removed), Some(old));
        assert!(v.admit(&req).await.unwrap().allowed);
    }
}
