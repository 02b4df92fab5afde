//! Admitters for management.cattle.io/v3 FleetWorkspaces.

use std::sync::Arc;

use async_trait::async_trait;

use webhook_core::admission::{AdmissionRequest, AdmissionResponse, Operation};
use webhook_core::gvk::GroupVersionResource;
use webhook_core::patch;

use crate::admission::{AdmitError, Admitter, SideEffects, WebhookOptions};
use crate::resources::set_creator_annotations;
use crate::stores::{ObjectSet, Store};
use crate::types::management::Cluster;
use crate::types::PartialObject;

fn gvr() -> GroupVersionResource {
    GroupVersionResource::gvr("management.cattle.io", "v3", "fleetworkspaces")
}

fn dns1123(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 63
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        && !name.starts_with('-')
        && !name.ends_with('-')
}

/// Admits creates and deletes of FleetWorkspaces.
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
        vec![WebhookOptions {
            operations: vec![Operation::Create, Operation::Delete],
            timeout_seconds: 10,
            ..Default::default()
        }]
    }

    async fn admit(&self, req: &AdmissionRequest) -> Result<AdmissionResponse, AdmitError> {
        let response = AdmissionResponse::from(req);

        if req.operation == Operation::Delete {
            let members: Vec<String> = self
                .clusters
                .state()
                .iter()
                .filter(|cluster| {
                    cluster.spec.fleet_workspace_name.as_deref() == Some(req.name.as_str())
                })
                .filter_map(|cluster| cluster.metadata.name.clone())
                .collect();
            if !members.is_empty() {
                return Ok(response.deny(format!(
                    "fleetWorkspace {:?} still contains clusters: {}",
                    req.name,
                    members.join(", ")
                )));
            }
            return Ok(response);
        }

        if !dns1123(&req.name) {
            return Ok(response.invalid(format!(
                "{:?} is not a valid workspace name",
                req.name
            )));
        }
        Ok(response)
    }
}

/// Stamps creator annotations on newly created workspaces.
#[derive(Default)]
pub struct Mutator;

#[async_trait]
impl Admitter for Mutator {
    fn gvr(&self) -> GroupVersionResource {
        gvr()
    }

    fn webhooks(&self) -> Vec<WebhookOptions> {
        vec![WebhookOptions {
            operations: vec![Operation::Create],
            side_effects: SideEffects::NoneOnDryRun,
            timeout_seconds: 10,
            ..Default::default()
        }]
    }

    async fn admit(&self, req: &AdmissionRequest) -> Result<AdmissionResponse, AdmitError> {
        let mut workspace = req.decode_new::<PartialObject>()?;
        let original = req
            .object
            .clone()
            .ok_or_else(|| AdmitError::Internal("create request without object".into()))?;
        set_creator_annotations(&mut workspace.metadata, &req.user_info);
        let patch = patch::diff(&original, &workspace)?;
        Ok(AdmissionResponse::from(req).with_patch(patch)?)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::resources::testutil::{patched, request};
    use crate::stores::MemStores;
    use crate::types::management::ClusterSpec;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use serde_json::json;

    #[tokio::test]
    async fn workspace_names_follow_dns_rules() {
        let stores = MemStores::default();
        let v = Validator::new(&stores.object_set());
        for (name, ok) in [("fleet-default", true), ("Fleet", false), ("-x", false), ("", false)] {
            let req = request(
                gvr(), "FleetWorkspace", name, None, Operation::Create, "admin",
                Some(json!({"metadata": {"name": name}})),
                None,
            );
            assert_eq!(v.admit(&req).await.unwrap().allowed, ok, "{name:?}");
        }
    }

    #[tokio::test]
    async fn workspaces_with_clusters_cannot_be_deleted() {
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
                    fleet_workspace_name: Some("fleet-default".to_string()),
                    ..Default::default()
                },
                ..Default::default()
            },
        );
        let v = Validator::new(&stores.object_set());
        let req = request(
            gvr(), "FleetWorkspace", "fleet-default", None, Operation::Delete, "admin",
            None,
            Some(json!({"metadata": {"name": "fleet-default"}})),
        );
        let res = v.admit(&req).await.unwrap();
        assert!(!res.allowed);
        assert!(res.result.unwrap().message.contains("c1"));

        let req = request(
            gvr(), "FleetWorkspace", "fleet-empty", None, Operation::Delete, "admin",
            None,
            Some(json!({"metadata": {"name": "fleet-empty"}})),
        );
        assert!(v.admit(&req).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn mutator_stamps_creator() {
        let req = request(
            gvr(), "FleetWorkspace", "fleet-team-a", None, Operation::Create, "u-admin",
            Some(json!({"metadata": {"name": "fleet-team-a"}, "spec": {}})),
            None,
        );
        let res = Mutator.admit(&req).await.unwrap();
        assert!(res.allowed && res.has_patch());
        let doc = patched(&req, &res);
        assert_eq!(doc["metadata"]["annotations"]["field.cattle.io/creatorId"], "u-admin");
        assert_eq!(doc["spec"], json!({}));
    }
}
