//! Emission of the webhook configurations.
//!
//! On startup the engine produces one `ValidatingWebhookConfiguration` and
//! one `MutatingWebhookConfiguration` covering the registered catalog.
//! Publishing them into the API server (and rotating the CA bundle) is the
//! embedder's job.

use std::sync::Arc;

use k8s_openapi::api::admissionregistration::v1::{
    MutatingWebhook, MutatingWebhookConfiguration, RuleWithOperations, ServiceReference,
    ValidatingWebhook, ValidatingWebhookConfiguration, WebhookClientConfig,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;

use webhook_core::admission::Operation;
use webhook_core::gvk::GroupVersionResource;

use super::{dispatcher, Admitter, WebhookOptions};

/// Name of both emitted configurations.
pub const CONFIGURATION_NAME: &str = "rancher.cattle.io";

/// How the API server reaches the engine.
#[derive(Clone, Debug)]
pub enum ClientTarget {
    /// Direct URL; the admitter path is appended.
    Url(String),
    /// In-cluster service reference; the admitter path is set on it.
    Service {
        /// Service namespace.
        namespace: String,
        /// Service name.
        name: String,
        /// Service port, defaulting to 443.
        port: Option<i32>,
    },
}

/// Connection block shared by every emitted webhook entry.
#[derive(Clone, Debug)]
pub struct ClientConnection {
    /// PEM bundle validating the serving certificate.
    pub ca_bundle: Vec<u8>,
    /// URL or service target.
    pub target: ClientTarget,
}

impl ClientConnection {
    fn client_config(&self, path: &str) -> WebhookClientConfig {
        let ca_bundle = Some(ByteString(self.ca_bundle.clone()));
        match &self.target {
            ClientTarget::Url(base) => WebhookClientConfig {
                ca_bundle,
                url: Some(format!("{}{path}", base.trim_end_matches('/'))),
                service: None,
            },
            ClientTarget::Service {
                namespace,
                name,
                port,
            } => WebhookClientConfig {
                ca_bundle,
                url: None,
                service: Some(ServiceReference {
                    namespace: namespace.clone(),
                    name: name.clone(),
                    path: Some(path.to_string()),
                    port: Some(port.unwrap_or(443)),
                }),
            },
        }
    }
}

fn operation_str(op: &Operation) -> String {
    match op {
        Operation::Create => "CREATE",
        Operation::Update => "UPDATE",
        Operation::Delete => "DELETE",
        Operation::Connect => "CONNECT",
    }
    .to_string()
}

/// The DNS name of one webhook entry: `<resource>.<group>.cattle.io`, with
/// the entry suffix worked into the first label when several webhooks share
/// a GVR.
fn webhook_name(gvr: &GroupVersionResource, suffix: Option<&str>) -> String {
    let mut resource = gvr.resource.replace('*', "all");
    if let Some(suffix) = suffix {
        resource = format!("{resource}-{suffix}");
    }
    if gvr.group.is_empty() {
        format!("{resource}.cattle.io")
    } else if gvr.group.ends_with("cattle.io") {
        format!("{resource}.{}", gvr.group)
    } else {
        format!("{resource}.{}.cattle.io", gvr.group)
    }
}

fn rule(gvr: &GroupVersionResource, options: &WebhookOptions) -> RuleWithOperations {
    let resource = match options.sub_resource_only {
        Some(sub) => format!("{}/{sub}", gvr.resource),
        None => gvr.resource.clone(),
    };
    RuleWithOperations {
        api_groups: Some(vec![gvr.group.clone()]),
        api_versions: Some(vec![gvr.version.clone()]),
        operations: Some(options.operations.iter().map(operation_str).collect()),
        resources: Some(vec![resource]),
        scope: Some(options.scope.as_str().to_string()),
    }
}

/// Build the validating configuration for the registered validators.
pub fn validating_configuration(
    validators: &[Arc<dyn Admitter>],
    connection: &ClientConnection,
) -> ValidatingWebhookConfiguration {
    let mut webhooks = Vec::new();
    for admitter in validators {
        let gvr = admitter.gvr();
        let path = dispatcher::validation_path(&gvr);
        for options in admitter.webhooks() {
            webhooks.push(ValidatingWebhook {
                name: webhook_name(&gvr, options.name_suffix),
                admission_review_versions: vec!["v1".to_string()],
                client_config: connection.client_config(&path),
                rules: Some(vec![rule(&gvr, &options)]),
                failure_policy: Some(options.failure_policy.as_str().to_string()),
                side_effects: options.side_effects.as_str().to_string(),
                timeout_seconds: Some(options.timeout_seconds),
                match_conditions: (!options.match_conditions.is_empty())
                    .then(|| options.match_conditions.clone()),
                namespace_selector: options.namespace_selector.clone(),
                object_selector: options.object_selector.clone(),
                match_policy: None,
            });
        }
    }
    ValidatingWebhookConfiguration {
        metadata: ObjectMeta {
            name: Some(CONFIGURATION_NAME.to_string()),
            ..Default::default()
        },
        webhooks: Some(webhooks),
    }
}

/// Build the mutating configuration for the registered mutators.
pub fn mutating_configuration(
    mutators: &[Arc<dyn Admitter>],
    connection: &ClientConnection,
) -> MutatingWebhookConfiguration {
    let mut webhooks = Vec::new();
    for admitter in mutators {
        let gvr = admitter.gvr();
        let path = dispatcher::mutation_path(&gvr);
        for options in admitter.webhooks() {
            webhooks.push(MutatingWebhook {
                name: webhook_name(&gvr, options.name_suffix),
                admission_review_versions: vec!["v1".to_string()],
                client_config: connection.client_config(&path),
                rules: Some(vec![rule(&gvr, &options)]),
                failure_policy: Some(options.failure_policy.as_str().to_string()),
                side_effects: options.side_effects.as_str().to_string(),
                timeout_seconds: Some(options.timeout_seconds),
                match_conditions: (!options.match_conditions.is_empty())
                    .then(|| options.match_conditions.clone()),
                namespace_selector: options.namespace_selector.clone(),
                object_selector: options.object_selector.clone(),
                match_policy: None,
                reinvocation_policy: None,
            });
        }
    }
    MutatingWebhookConfiguration {
        metadata: ObjectMeta {
            name: Some(CONFIGURATION_NAME.to_string()),
            ..Default::default()
        },
        webhooks: Some(webhooks),
    }
}
