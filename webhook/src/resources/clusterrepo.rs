//! Validator for catalog.cattle.io/v1 ClusterRepos.

use async_trait::async_trait;

use webhook_core::admission::{AdmissionRequest, AdmissionResponse, Operation};
use webhook_core::gvk::GroupVersionResource;

use crate::admission::{AdmitError, Admitter, WebhookOptions};
use crate::types::catalog::ClusterRepo;

fn gvr() -> GroupVersionResource {
    GroupVersionResource::gvr("catalog.cattle.io", "v1", "clusterrepos")
}

const SCHEMES: [&str; 3] = ["https://", "http://", "oci://"];

/// Admits creates and updates of ClusterRepos.
#[derive(Default)]
pub struct Validator;

impl Validator {
    fn validate(repo: &ClusterRepo) -> Result<(), String> {
        let url = repo.spec.url.as_deref().unwrap_or_default();
        let git_repo = repo.spec.git_repo.as_deref().unwrap_or_default();
        match (url.is_empty(), git_repo.is_empty()) {
            (true, true) => return Err("spec.url or spec.gitRepo is required".to_string()),
            (false, false) => {
                return Err("spec.url and spec.gitRepo are mutually exclusive".to_string())
            }
            _ => {}
        }
        if !url.is_empty() && !SCHEMES.iter().any(|scheme| url.starts_with(scheme)) {
            return Err(format!("spec.url must use one of {SCHEMES:?}"));
        }
        if repo.spec.git_branch.is_some() && git_repo.is_empty() {
            return Err("spec.gitBranch requires spec.gitRepo".to_string());
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
            timeout_seconds: 10,
            ..Default::default()
        }]
    }

    async fn admit(&self, req: &AdmissionRequest) -> Result<AdmissionResponse, AdmitError> {
        let repo = req.decode_new::<ClusterRepo>()?;
        let response = AdmissionResponse::from(req);
        if let Err(message) = Self::validate(&repo) {
            return Ok(response.invalid(message));
        }
        Ok(response)
    }
}
