//! Validator for management.cattle.io/v3 ClusterProxyConfigs.

use std::sync::Arc;

use async_trait::async_trait;

use webhook_core::admission::{AdmissionRequest, AdmissionResponse, Operation};
use webhook_core::gvk::GroupVersionResource;

use crate::admission::{AdmitError, Admitter, Scope, WebhookOptions};
use crate::stores::{ObjectSet, Store};
use crate::types::management::ClusterProxyConfig;

fn gvr() -> GroupVersionResource {
    GroupVersionResource::gvr("management.cattle.io", "v3", "clusterproxyconfigs")
}

/// Admits creates and updates of ClusterProxyConfigs: at most one per
/// cluster namespace. An update of the one cached object is not a second
/// object and passes.
pub struct Validator {
    configs: Arc<dyn Store<ClusterProxyConfig>>,
}

impl Validator {
    /// Build the validator over the ClusterProxyConfig cache.
    pub fn new(stores: &ObjectSet) -> Self {
        Self {
            configs: stores.cluster_proxy_configs.clone(),
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
            operations: vec![Operation::Create],
            scope: Scope::Namespaced,
            timeout_seconds: 10,
            ..Default::default()
        }]
    }

    async fn admit(&self, req: &AdmissionRequest) -> Result<AdmissionResponse, AdmitError> {
        let response = AdmissionResponse::from(req);
        let namespace = req.namespace_or_default();
        let existing = self
            .configs
            .state()
            .into_iter()
            .filter(|config| config.metadata.namespace.as_deref() == Some(namespace))
            .filter(|config| config.metadata.name.as_deref() != Some(req.name.as_str()))
            .count();
        if existing > 0 {
            return Ok(response.bad_request(format!(
                "only one clusterProxyConfig is allowed per cluster namespace {namespace:?}"
            )));
        }
        Ok(response)
    }
}
