//! Validator for management.cattle.io/v3 Settings.

use async_trait::async_trait;

use webhook_core::admission::{AdmissionRequest, AdmissionResponse, Operation};
use webhook_core::duration::Duration;
use webhook_core::gvk::GroupVersionResource;

use crate::admission::{AdmitError, Admitter, WebhookOptions};
use crate::types::management::Setting;

fn gvr() -> GroupVersionResource {
    GroupVersionResource::gvr("management.cattle.io", "v3", "settings")
}

/// `delete-inactive-user-after` must leave users at least two weeks.
const MIN_DELETE_INACTIVE: std::time::Duration = std::time::Duration::from_secs(336 * 3600);

fn validate_duration(value: &str, minimum: Option<std::time::Duration>) -> Result<(), String> {
    let parsed: Duration = value
        .parse()
        .map_err(|err| format!("{value:?} is not a valid duration: {err}"))?;
    if parsed.is_negative() {
        return Err(format!("{value:?} must not be negative"));
    }
    if let Some(minimum) = minimum {
        if parsed.duration() < minimum {
            return Err(format!(
                "{value:?} is below the minimum of {}h",
                minimum.as_secs() / 3600
            ));
        }
    }
    Ok(())
}

fn validate_int_range(value: &str, min: i64, max: i64) -> Result<(), String> {
    let parsed: i64 = value
        .parse()
        .map_err(|_| format!("{value:?} is not an integer"))?;
    if parsed < min || parsed > max {
        return Err(format!("{value:?} must be between {min} and {max}"));
    }
    Ok(())
}

fn validate_cron(value: &str) -> Result<(), String> {
    if value.split_whitespace().count() != 5 {
        return Err(format!("{value:?} is not a five-field cron expression"));
    }
    Ok(())
}

/// Admits creates and updates of Settings, checking the values of the
/// settings the platform itself consumes.
#[derive(Default)]
pub struct Validator;

impl Validator {
    fn validate_value(name: &str, value: &str) -> Result<(), String> {
        if value.is_empty() {
            // an empty value falls back to the default everywhere
            return Ok(());
        }
        match name {
            "password-min-length" => validate_int_range(value, 2, 256),
            "auth-user-session-ttl-minutes" => validate_int_range(value, 0, i64::MAX),
            "disable-inactive-user-after" => validate_duration(value, None),
            "delete-inactive-user-after" => validate_duration(value, Some(MIN_DELETE_INACTIVE)),
            "user-last-login-default" => validate_duration(value, None),
            "user-retention-cron" => validate_cron(value),
            _ => Ok(()),
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
        let setting = req.decode_new::<Setting>()?;
        let response = AdmissionResponse::from(req);
        if let Err(message) = Self::validate_value(&req.name, &setting.value) {
            return Ok(response.invalid(format!("value: {message}")));
        }
        Ok(response)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::resources::testutil::request;
    use serde_json::json;

    async fn admit(name: &str, value: &str) -> AdmissionResponse {
        let req = request(
            gvr(),
            "Setting",
            name,
            None,
            Operation::Update,
            "admin",
            Some(json!({"metadata": {"name": name}, "value": value})),
            Some(json!({"metadata": {"name": name}})),
        );
        Validator.admit(&req).await.unwrap()
    }

    #[tokio::test]
    async fn password_min_length_is_bounded() {
        assert!(admit("password-min-length", "12").await.allowed);
        assert!(!admit("password-min-length", "1").await.allowed);
        assert!(!admit("password-min-length", "1000").await.allowed);
        assert!(!admit("password-min-length", "twelve").await.allowed);
    }

    #[tokio::test]
    async fn retention_durations_parse_and_bound() {
        assert!(admit("disable-inactive-user-after", "720h").await.allowed);
        assert!(!admit("disable-inactive-user-after", "-1h").await.allowed);
        assert!(!admit("disable-inactive-user-after", "soon").await.allowed);
        assert!(admit("delete-inactive-user-after", "336h").await.allowed);
        assert!(!admit("delete-inactive-user-after", "24h").await.allowed);
    }

    #[tokio::test]
    async fn cron_settings_need_five_fields() {
        assert!(admit("user-retention-cron", "0 0 * * *").await.allowed);
        assert!(!admit("user-retention-cron", "every day").await.allowed);
    }

    #[tokio::test]
    async fn unknown_settings_and_empty_values_pass() {
        assert!(admit("server-url", "https://rancher.example.com").await.allowed);
        assert!(admit("password-min-length", "").await.allowed);
    }
}
