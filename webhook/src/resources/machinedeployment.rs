//! Validator for the scale subresource of cluster.x-k8s.io/v1beta1
//! MachineDeployments.

use async_trait::async_trait;
use k8s_openapi::api::autoscaling::v1::Scale;

use webhook_core::admission::{AdmissionRequest, AdmissionResponse, Operation};
use webhook_core::gvk::GroupVersionResource;

use crate::admission::{AdmitError, Admitter, Scope, WebhookOptions};

fn gvr() -> GroupVersionResource {
    GroupVersionResource::gvr("cluster.x-k8s.io", "v1beta1", "machinedeployments")
}

/// Admits scale updates of MachineDeployments.
#[derive(Default)]
pub struct ScaleValidator;

#[async_trait]
impl Admitter for ScaleValidator {
    fn gvr(&self) -> GroupVersionResource {
        gvr()
    }

    fn webhooks(&self) -> Vec<WebhookOptions> {
        vec![WebhookOptions {
            operations: vec![Operation::Update],
            scope: Scope::Namespaced,
            timeout_seconds: 10,
            sub_resource_only: Some("scale"),
            ..Default::default()
        }]
    }

    async fn admit(&self, req: &AdmissionRequest) -> Result<AdmissionResponse, AdmitError> {
        let scale = req.decode_new::<Scale>()?;
        let response = AdmissionResponse::from(req);
        let replicas = scale.spec.as_ref().and_then(|spec| spec.replicas).unwrap_or(0);
        if replicas < 0 {
            return Ok(response.invalid("spec.replicas must not be negative"));
        }
        Ok(response)
    }
}
