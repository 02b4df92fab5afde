//! Validator for management.cattle.io/v3
//! PodSecurityAdmissionConfigurationTemplates.

use std::sync::Arc;

use async_trait::async_trait;

use webhook_core::admission::{AdmissionRequest, AdmissionResponse, Operation};
use webhook_core::gvk::GroupVersionResource;

use crate::admission::{AdmitError, Admitter, FailurePolicy, WebhookOptions};
use crate::stores::{ObjectSet, Store};
use crate::types::management::{Cluster, PodSecurityAdmissionConfigurationTemplate};

fn gvr() -> GroupVersionResource {
    GroupVersionResource::gvr(
        "management.cattle.io",
        "v3",
        "podsecurityadmissionconfigurationtemplates",
    )
}

const LEVELS: [&str; 3] = ["privileged", "baseline", "restricted"];

fn valid_level(level: &Option<String>) -> Result<(), String> {
    match level.as_deref() {
        None | Some("") => Ok(()),
        Some(level) if LEVELS.contains(&level) => Ok(()),
        Some(level) => Err(format!("level must be one of {LEVELS:?}, got {level:?}")),
    }
}

fn valid_version(version: &Option<String>) -> Result<(), String> {
    let Some(version) = version.as_deref().filter(|v| !v.is_empty()) else {
        return Ok(());
    };
    if version == "latest" {
        return Ok(());
    }
    let valid = version
        .strip_prefix('v')
        .and_then(|rest| rest.split_once('.'))
        .is_some_and(|(major, minor)| {
            major.parse::<u32>().is_ok() && minor.parse::<u32>().is_ok()
        });
    if valid {
        Ok(())
    } else {
        Err(format!("version must be \"latest\" or \"v<major>.<minor>\", got {version:?}"))
    }
}

/// Admits creates, updates, and deletes of PSA templates. The deletion
/// webhook fails open so that emergency cleanup is never blocked.
pub struct Validator {
    clusters: Arc<dyn Store<Cluster>>,
}

impl Validator {
    /// Build the validator over the management Cluster cache.
    pub fn new(stores: &ObjectSet) -> Self {
        Self {
            clusters: stores.clusters.clone(),
        }
    }
}

#[async_trait]
impl Admitter for Validator {
    fn gvr(&self) -> GroupVersionResource {
        gvr()
    }

    fn webhooks(&self) -> Vec<WebhookOptions> {
        vec![
            WebhookOptions {
                operations: vec![Operation::Create, Operation::Update],
                timeout_seconds: 10,
                ..Default::default()
            },
            WebhookOptions {
                operations: vec![Operation::Delete],
                failure_policy: FailurePolicy::Ignore,
                name_suffix: Some("deletion"),
                timeout_seconds: 10,
                ..Default::default()
            },
        ]
    }

    async fn admit(&self, req: &AdmissionRequest) -> Result<AdmissionResponse, AdmitError> {
        let response = AdmissionResponse::from(req);

        if req.operation == Operation::Delete {
            let users: Vec<String> = self
                .clusters
                .state()
                .iter()
                .filter(|cluster| {
                    cluster
                        .spec
                        .default_pod_security_admission_configuration_template_name
                        .as_deref()
                        == Some(req.name.as_str())
                })
                .filter_map(|cluster| cluster.metadata.name.clone())
                .collect();
            if !users.is_empty() {
                return Ok(response.deny(format!(
                    "podSecurityAdmissionConfigurationTemplate {:?} is still the default of: {}",
                    req.name,
                    users.join(", ")
                )));
            }
            return Ok(response);
        }

        let template = req.decode_new::<PodSecurityAdmissionConfigurationTemplate>()?;
        let defaults = &template.configuration.defaults;
        for (level, version) in [
            (&defaults.enforce, &defaults.enforce_version),
            (&defaults.audit, &defaults.audit_version),
            (&defaults.warn, &defaults.warn_version),
        ] {
            if let Err(message) = valid_level(level).and_then(|()| valid_version(version)) {
                return Ok(response.invalid(format!("configuration.defaults: {message}")));
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
    use crate::types::management::ClusterSpec;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use serde_json::json;

    fn create(defaults: serde_json::Value) -> AdmissionRequest {
        request(
            gvr(), "PodSecurityAdmissionConfigurationTemplate", "t1", None,
            Operation::Create, "admin",
            Some(json!({"metadata": {"name": "t1"}, "configuration": {"defaults": defaults}})),
            None,
        )
    }

    #[tokio::test]
    async fn levels_and_versions_are_checked() {
        let stores = MemStores::default();
        let v = Validator::new(&stores.object_set());

        let res = v
            .admit(&create(json!({"enforce": "restricted", "enforceVersion": "v1.32"})))
            .await
            .unwrap();
        assert!(res.allowed, "{:?}", res.result);

        assert!(!v.admit(&create(json!({"enforce": "paranoid"}))).await.unwrap().allowed);
        assert!(!v
            .admit(&create(json!({"warn": "baseline", "warnVersion": "1.32"})))
            .await
            .unwrap()
            .allowed);
        assert!(v
            .admit(&create(json!({"audit": "baseline", "auditVersion": "latest"})))
            .await
            .unwrap()
            .allowed);
    }

    #[tokio::test]
    async fn referenced_templates_cannot_be_deleted() {
        let stores = MemStores::default();
        stores.clusters.insert(
            None,
            "c1",
            Cluster {
                metadata: ObjectMeta {
                    name: Some("c1".to_string()),
                    ..Default::default()
                },
                spec: ClusterSpec {
                    default_pod_security_admission_configuration_template_name: Some(
                        "t1".to_string(),
                    ),
                    ..Default::default()
                },
                ..Default::default()
            },
        );
        let v = Validator::new(&stores.object_set());
        let req = request(
            gvr(), "PodSecurityAdmissionConfigurationTemplate", "t1", None,
            Operation::Delete, "admin",
            None,
            Some(json!({"metadata": {"name": "t1"}})),
        );
        let res = v.admit(&req).await.unwrap();
        assert!(!res.allowed);
        assert!(res.result.unwrap().message.contains("c1"));
    }

    #[test]
    fn deletion_webhook_fails_open() {
        let stores = MemStores::default();
        let hooks = Validator::new(&stores.object_set()).webhooks();
        assert_eq!(hooks[1].failure_policy, FailurePolicy::Ignore);
        assert_eq!(hooks[1].operations, vec![Operation::Delete]);
    }
}
