//! Validator for management.cattle.io/v3 Users.

use std::sync::Arc;

use async_trait::async_trait;

use webhook_core::admission::{AdmissionRequest, AdmissionResponse, Operation};
use webhook_core::gvk::GroupVersionResource;

use crate::admission::{AdmitError, Admitter, WebhookOptions};
use crate::stores::{ObjectSet, Store};
use crate::types::management::{Setting, User};

fn gvr() -> GroupVersionResource {
    GroupVersionResource::gvr("management.cattle.io", "v3", "users")
}

const PASSWORD_MIN_LENGTH_SETTING: &str = "password-min-length";
const DEFAULT_PASSWORD_MIN_LENGTH: usize = 12;

/// Admits creates, updates, and deletes of Users.
pub struct Validator {
    settings: Arc<dyn Store<Setting>>,
}

impl Validator {
    /// Build the validator over the Setting cache.
    pub fn new(stores: &ObjectSet) -> Self {
        Self {
            settings: stores.settings.clone(),
        }
    }

    fn password_min_length(&self) -> usize {
        self.settings
            .get(None, PASSWORD_MIN_LENGTH_SETTING)
            .and_then(|setting| {
                let value = if setting.value.is_empty() {
                    &setting.default
                } else {
                    &setting.value
                };
                value.parse().ok()
            })
            .unwrap_or(DEFAULT_PASSWORD_MIN_LENGTH)
    }
}

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
        let objects = req.decode::<User>()?;
        let response = AdmissionResponse::from(req);

        if req.operation == Operation::Delete {
            if req.user_info.username.as_deref() == Some(req.name.as_str()) {
                return Ok(response.deny("users cannot delete themselves"));
            }
            return Ok(response);
        }

        let new = objects
            .new
            .ok_or_else(|| AdmitError::Internal("request without new object".into()))?;

        if req.operation == Operation::Create {
            if let Some(password) = &new.password {
                let minimum = self.password_min_length();
                if password.len() < minimum {
                    return Ok(response.invalid(format!(
                        "password must be at least {minimum} characters"
                    )));
                }
                if Some(password) == new.username.as_ref() {
                    return Ok(response.invalid("password cannot be the same as the username"));
                }
            }
        }

        if let Some(old) = &objects.old {
            let before = old.username.as_deref().unwrap_or_default();
            let after = new.username.as_deref().unwrap_or_default();
            if !before.is_empty() && before != after {
                return Ok(response.invalid("username cannot be changed once set"));
            }
            // self-lockout protection mirrors the deletion rule
            if req.user_info.username.as_deref() == Some(req.name.as_str())
                && new.enabled == Some(false)
                && old.enabled != Some(false)
            {
                return Ok(response.deny("users cannot disable themselves"));
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
    use serde_json::json;

    fn validator(stores: &MemStores) -> Validator {
        Validator::new(&stores.object_set())
    }

    #[tokio::test]
    async fn short_passwords_are_rejected_on_create() {
        let stores = MemStores::default();
        let req = request(
            gvr(), "User", "u-abc", None, Operation::Create, "admin",
            Some(json!({"metadata": {"name": "u-abc"}, "username": "alice", "password": "short"})),
            None,
        );
        let res = validator(&stores).admit(&req).await.unwrap();
        assert!(!res.allowed);

        let req = request(
            gvr(), "User", "u-abc", None, Operation::Create, "admin",
            Some(json!({"metadata": {"name": "u-abc"}, "username": "alice", "password": "long-enough-password"})),
            None,
        );
        assert!(validator(&stores).admit(&req).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn username_is_sticky() {
        let stores = MemStores::default();
        let req = request(
            gvr(), "User", "u-abc", None, Operation::Update, "admin",
            Some(json!({"metadata": {"name": "u-abc"}, "username": "bob"})),
            Some(json!({"metadata": {"name": "u-abc"}, "username": "alice"})),
        );
        assert!(!validator(&stores).admit(&req).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn users_cannot_remove_or_disable_themselves() {
        let stores = MemStores::default();
        let req = request(
            gvr(), "User", "admin-user", None, Operation::Delete, "admin-user",
            None,
            Some(json!({"metadata": {"name": "admin-user"}})),
        );
        let res = validator(&stores).admit(&req).await.unwrap();
        assert!(!res.allowed);

        let req = request(
            gvr(), "User", "admin-user", None, Operation::Update, "admin-user",
            Some(json!({"metadata": {"name": "admin-user"}, "enabled": false})),
            Some(json!({"metadata": {"name": "admin-user"}, "enabled": true})),
        );
        assert!(!validator(&stores).admit(&req).await.unwrap().allowed);

        // disabling someone else is allowed
        let req = request(
            gvr(), "User", "other", None, Operation::Update, "admin-user",
            Some(json!({"metadata": {"name": "other"}, "enabled": false})),
            Some(json!({"metadata": {"name": "other"}, "enabled": true})),
        );
        assert!(validator(&stores).admit(&req).await.unwrap().allowed);
    }
}
