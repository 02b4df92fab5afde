//! Validator for management.cattle.io/v3 Clusters.

use std::sync::Arc;

use async_trait::async_trait;

use webhook_core::admission::{AdmissionRequest, AdmissionResponse, Operation};
use webhook_core::gvk::GroupVersionResource;

use crate::admission::{AdmitError, Admitter, WebhookOptions};
use crate::stores::{ObjectSet, Store};
use crate::types::management::{Cluster, PodSecurityAdmissionConfigurationTemplate};

fn gvr() -> GroupVersionResource {
    GroupVersionResource::gvr("management.cattle.io", "v3", "clusters")
}

/// The management cluster representing the local (upstream) cluster.
const LOCAL_CLUSTER: &str = "local";

/// Admits creates, updates, and deletes of management Clusters.
pub struct Validator {
    psa_templates: Arc<dyn Store<PodSecurityAdmissionConfigurationTemplate>>,
}

impl Validator {
    /// Build the validator over the PSA-template cache.
    pub fn new(stores: &ObjectSet) -> Self {
        Self {
            psa_templates: stores.psa_templates.clone(),
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
            operations: vec![Operation::Create, Operation::Update, Operation::Delete],
            ..Default::default()
        }]
    }

    async fn admit(&self, req: &AdmissionRequest) -> Result<AdmissionResponse, AdmitError> {
        let objects = req.decode::<Cluster>()?;
        let response = AdmissionResponse::from(req);

        if req.operation == Operation::Delete {
            if req.name == LOCAL_CLUSTER {
                return Ok(response.deny("the local cluster cannot be deleted"));
            }
            return Ok(response);
        }

        let new = objects
            .new
            .ok_or_else(|| AdmitError::Internal("request without new object".into()))?;

        if let Some(template) = &new.spec.default_pod_security_admission_configuration_template_name
        {
            if !template.is_empty() && self.psa_templates.get(None, template).is_none() {
                return Ok(response.invalid(format!(
                    "podSecurityAdmissionConfigurationTemplate {template:?} was not found"
                )));
            }
        }

        if let Some(old) = &objects.old {
            let before = old.spec.fleet_workspace_name.as_deref().unwrap_or_default();
            let after = new.spec.fleet_workspace_name.as_deref().unwrap_or_default();
            if !before.is_empty() && before != after {
                return Ok(response.invalid("spec.fleetWorkspaceName cannot be changed once set"));
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
    async fn psa_template_reference_must_resolve() {
        let stores = MemStores::default();
        let v = Validator::new(&stores.object_set());
        let req = request(
            gvr(),
            "Cluster",
            "c1",
            None,
            Operation::Create,
            "admin",
            Some(json!({
                "metadata": {"name": "c1"},
                "spec": {"defaultPodSecurityAdmissionConfigurationTemplateName": "restricted"}
            })),
            None,
        );
        assert!(!v.admit(&req).await.unwrap().allowed);

        stores.psa_templates.insert(
            None,
            "restricted",
            PodSecurityAdmissionConfigurationTemplate {
                metadata: ObjectMeta {
                    name: Some("restricted".to_string()),
                    ..Default::default()
                },
                ..Default::default()
            },
        );
        assert!(v.admit(&req).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn fleet_workspace_is_sticky() {
        let stores = MemStores::default();
        let v = Validator::new(&stores.object_set());
        let req = request(
            gvr(),
            "Cluster",
            "c1",
            None,
            Operation::Update,
            "admin",
            Some(json!({"metadata": {"name": "c1"}, "spec": {"fleetWorkspaceName": "fleet-other"}})),
            Some(json!({"metadata": {"name": "c1"}, "spec": {"fleetWorkspaceName": "fleet-default"}})),
        );
        assert!(!v.admit(&req).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn local_cluster_cannot_be_deleted() {
        let stores = MemStores::default();
        let v = Validator::new(&stores.object_set());
        let req = request(
            gvr(),
            "Cluster",
            "local",
            None,
            Operation::Delete,
            "admin",
            None,
            Some(json!({"metadata": {"name": "local"}, "spec": {}})),
        );
        let res = v.admit(&req).await.unwrap();
        assert!(!res.allowed);
        assert_eq!(res.result.unwrap().code, 403);
    }
}
