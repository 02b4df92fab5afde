//! Validator for core/v1 Namespaces.
//!
//! Two webhook entries share this admitter: the general fail-closed entry,
//! and a fail-open entry covering `kube-system` creation so that cluster
//! bootstrap can never deadlock on the webhook.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{
    LabelSelector, LabelSelectorRequirement, ObjectMeta,
};

use webhook_core::admission::{AdmissionRequest, AdmissionResponse, Operation};
use webhook_core::gvk::GroupVersionResource;

use crate::admission::{AdmitError, Admitter, FailurePolicy, Scope, WebhookOptions};
use crate::authz::escalation::{BypassTarget, EscalationCheck, EscalationChecker, EscalationOutcome};
use crate::resources::{annotation, keys};
use crate::stores::{ObjectSet, Store};
use crate::types::management::Project;

fn gvr() -> GroupVersionResource {
    GroupVersionResource::gvr("", "v1", "namespaces")
}

const PSA_LABEL_PREFIX: &str = "pod-security.kubernetes.io/";
/// The project verb gating PSA label changes.
const VERB_UPDATE_PSA: &str = "updatepsa";

fn psa_labels(meta: &ObjectMeta) -> Vec<(String, String)> {
    let mut labels: Vec<(String, String)> = meta
        .labels
        .iter()
        .flatten()
        .filter(|(key, _)| key.starts_with(PSA_LABEL_PREFIX))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    labels.sort();
    labels
}

fn name_selector(operator: &str) -> Option<LabelSelector> {
    Some(LabelSelector {
        match_expressions: Some(vec![LabelSelectorRequirement {
            key: "kubernetes.io/metadata.name".to_string(),
            operator: operator.to_string(),
            values: Some(vec!["kube-system".to_string()]),
        }]),
        match_labels: None,
    })
}

/// Admits creates and updates of Namespaces.
pub struct Validator {
    projects: Arc<dyn Store<Project>>,
    checker: EscalationChecker,
}

impl Validator {
    /// Build the validator over the Project cache and the escalation checker.
    pub fn new(stores: &ObjectSet, checker: EscalationChecker) -> Self {
        Self {
            projects: stores.projects.clone(),
            checker,
        }
    }

    fn project_of(&self, meta: &ObjectMeta) -> Option<(String, String)> {
        let id = annotation(meta, keys::PROJECT_ID_ANN)?;
        let (cluster, project) = id.split_once(':')?;
        Some((cluster.to_string(), project.to_string()))
    }

    fn validate_project_reference(&self, meta: &ObjectMeta) -> Result<(), String> {
        let Some(id) = annotation(meta, keys::PROJECT_ID_ANN) else {
            return Ok(());
        };
        let Some((cluster, project)) = id.split_once(':').filter(|(c, p)| !c.is_empty() && !p.is_empty())
        else {
            return Err(format!(
                "annotation {} must be of the form <clusterName>:<projectName>",
                keys::PROJECT_ID_ANN
            ));
        };
        if self.projects.get(Some(cluster), project).is_none() {
            return Err(format!(
                "project {project:?} was not found in cluster {cluster:?}"
            ));
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
        vec![
            WebhookOptions {
                operations: vec![Operation::Create, Operation::Update],
                namespace_selector: name_selector("NotIn"),
                ..Default::default()
            },
            WebhookOptions {
                operations: vec![Operation::Create],
                failure_policy: FailurePolicy::Ignore,
                namespace_selector: name_selector("In"),
                name_suffix: Some("kube-system"),
                timeout_seconds: 10,
                ..Default::default()
            },
        ]
        .into_iter()
        .map(|mut options| {
            options.scope = Scope::Cluster;
            options
        })
        .collect()
    }

    async fn admit(&self, req: &AdmissionRequest) -> Result<AdmissionResponse, AdmitError> {
        let objects = req.decode::<Namespace>()?;
        let response = AdmissionResponse::from(req);
        let Some(new) = objects.new else {
            return Ok(response);
        };

        if req.name == "kube-system" {
            return Ok(response);
        }

        if let Err(message) = self.validate_project_reference(&new.metadata) {
            return Ok(response.invalid(message));
        }

        if let Some(old) = &objects.old {
            if psa_labels(&old.metadata) != psa_labels(&new.metadata) {
                if let Some((_, project)) = self.project_of(&old.metadata).or_else(|| self.project_of(&new.metadata)) {
                    let candidate = k8s_openapi::api::rbac::v1::PolicyRule {
                        verbs: vec![VERB_UPDATE_PSA.to_string()],
                        api_groups: Some(vec!["management.cattle.io".to_string()]),
                        resources: Some(vec!["projects".to_string()]),
                        resource_names: Some(vec![project.clone()]),
                        non_resource_urls: None,
                    };
                    let target = BypassTarget {
                        verb: VERB_UPDATE_PSA,
                        group: "management.cattle.io",
                        resource: "projects",
                        name: project,
                    };
                    let outcome = self
                        .checker
                        .confirm_no_escalation(
                            &req.user_info,
                            std::slice::from_ref(&candidate),
                            None,
                            &target,
                            &mut EscalationCheck::new(),
                        )
                        .await?;
                    if let EscalationOutcome::Denied(_) = outcome {
                        return Ok(response.unauthorized(format!(
                            "changing pod security admission labels requires the {VERB_UPDATE_PSA} verb on the namespace's project"
                        )));
                    }
                }
            }
        }

        Ok(response)
    }
}
