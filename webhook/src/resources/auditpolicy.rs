//! Validator for auditlog.cattle.io/v1 AuditPolicies.

use async_trait::async_trait;
use regex::Regex;

use webhook_core::admission::{AdmissionRequest, AdmissionResponse, Operation};
use webhook_core::gvk::GroupVersionResource;

use crate::admission::{AdmitError, Admitter, Scope, WebhookOptions};
use crate::types::auditlog::AuditPolicy;

fn gvr() -> GroupVersionResource {
    GroupVersionResource::gvr("auditlog.cattle.io", "v1", "auditpolicies")
}

const ACTIONS: [&str; 2] = ["allow", "deny"];
const MAX_VERBOSITY: i32 = 3;

/// Admits creates and updates of AuditPolicies.
#[derive(Default)]
pub struct Validator;

impl Validator {
    fn validate(policy: &AuditPolicy) -> Result<(), String> {
        for (i, filter) in policy.spec.filters.iter().flatten().enumerate() {
            if !ACTIONS.contains(&filter.action.as_str()) {
                return Err(format!(
                    "spec.filters[{i}].action must be one of {ACTIONS:?}, got {:?}",
                    filter.action
                ));
            }
            Regex::new(&filter.request_uri).map_err(|err| {
                format!("spec.filters[{i}].requestURI is not a valid regex: {err}")
            })?;
        }
        for (i, redaction) in policy.spec.additional_redactions.iter().flatten().enumerate() {
            for header in redaction.headers.iter().flatten() {
                Regex::new(header).map_err(|err| {
                    format!("spec.additionalRedactions[{i}].headers: {header:?} is not a valid regex: {err}")
                })?;
            }
        }
        if let Some(verbosity) = &policy.spec.verbosity {
            if !(0..=MAX_VERBOSITY).contains(&verbosity.level) {
                return Err(format!(
                    "spec.verbosity.level must be between 0 and {MAX_VERBOSITY}"
                ));
            }
        }
        Ok(())
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
            timeout_seconds: 10,
            ..Default::default()
        }]
    }

    async fn admit(&self, req: &AdmissionRequest) -> Result<AdmissionResponse, AdmitError> {
        let policy = req.decode_new::<AuditPolicy>()?;
        let response = AdmissionResponse::from(req);
        if let Err(message) = Self::validate(&policy) {
            return Ok(response.invalid(message));
        }
        Ok(response)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::resources::testutil::request;
    use serde_json::json;

    async fn admit(spec: serde_json::Value) -> AdmissionResponse {
        let req = request(
            gvr(), "AuditPolicy", "ap1", Some("cattle-system"), Operation::Create, "admin",
            Some(json!({"metadata": {"name": "ap1"}, "spec": spec})),
            None,
        );
        Validator.admit(&req).await.unwrap()
    }

    #[tokio::test]
    async fn filter_actions_and_regexes_are_checked() {
        let res = admit(json!({
            "enabled": true,
            "filters": [{"action": "allow", "requestURI": "^/api/v1/secrets"}]
        }))
        .await;
        assert!(res.allowed, "{:?}", res.result);

        assert!(!admit(json!({"filters": [{"action": "audit", "requestURI": ".*"}]})).await.allowed);
        assert!(!admit(json!({"filters": [{"action": "deny", "requestURI": "(unclosed"}]})).await.allowed);
    }

    #[tokio::test]
    async fn redaction_headers_must_compile() {
        assert!(
            admit(json!({"additionalRedactions": [{"headers": ["^Authorization$"]}]}))
                .await
                .allowed
        );
        assert!(
            !admit(json!({"additionalRedactions": [{"headers": ["[bad"]}]}))
                .await
                .allowed
        );
    }

    #[tokio::test]
    async fn verbosity_is_bounded() {
        assert!(admit(json!({"verbosity": {"level": 3}})).await.allowed);
        assert!(!admit(json!({"verbosity": {"level": 4}})).await.allowed);
        assert!(!admit(json!({"verbosity": {"level": -1}})).await.allowed);
    }
}
