//! The admitter contract and its surrounding plumbing.
//!
//! Every resource handler is a value implementing [`Admitter`]: it declares
//! the GVR it serves, the webhook configuration entries it wants emitted,
//! and an `admit` function. Validation failures are *responses* (the request
//! is rejected with a status); only engine-side failures (cache walks,
//! patch serialization) surface as [`AdmitError`], which the dispatcher turns
//! into a 500-class answer for the API server's failure policy to judge.

use async_trait::async_trait;
use k8s_openapi::api::admissionregistration::v1::MatchCondition;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use thiserror::Error;

use webhook_core::admission::{
    AdmissionRequest, AdmissionResponse, DecodeError, Operation, SerializePatchError,
};
use webhook_core::gvk::GroupVersionResource;
use webhook_core::patch::PatchError;

use crate::authz::resolver::ResolveError;
use crate::authz::templates::TemplateError;
use crate::stores::WriteError;

pub mod config;
pub mod dispatcher;

/// An engine-side failure while admitting a request.
#[derive(Debug, Error)]
pub enum AdmitError {
    /// The request payload did not decode into the admitter's type.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Effective-rule resolution failed.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// A role-template walk failed.
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// Building the response patch failed.
    #[error(transparent)]
    Patch(#[from] PatchError),

    /// Serializing the response patch failed.
    #[error(transparent)]
    SerializePatch(#[from] SerializePatchError),

    /// A write through one of the engine's seams failed.
    #[error(transparent)]
    Write(#[from] WriteError),

    /// Anything else.
    #[error("{0}")]
    Internal(String),
}

/// Scope of the emitted webhook rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    /// Cluster-scoped resources.
    Cluster,
    /// Namespaced resources.
    Namespaced,
}

impl Scope {
    /// The wire value for webhook configuration rules.
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Cluster => "Cluster",
            Scope::Namespaced => "Namespaced",
        }
    }
}

/// Failure policy of the emitted webhook.
///
/// `Ignore` is reserved for the webhooks that must never deadlock cluster
/// bootstrap or emergency cleanup; everything else fails closed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Reject the request when the webhook cannot be reached.
    #[default]
    Fail,
    /// Admit the request when the webhook cannot be reached.
    Ignore,
}

impl FailurePolicy {
    /// The wire value for webhook configuration entries.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailurePolicy::Fail => "Fail",
            FailurePolicy::Ignore => "Ignore",
        }
    }
}

/// Declared side effects of the emitted webhook.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SideEffects {
    /// No side effects at all (validators).
    #[default]
    None,
    /// Side effects are skipped on dry runs (mutators with write-back seams).
    NoneOnDryRun,
}

impl SideEffects {
    /// The wire value for webhook configuration entries.
    pub fn as_str(&self) -> &'static str {
        match self {
            SideEffects::None => "None",
            SideEffects::NoneOnDryRun => "NoneOnDryRun",
        }
    }
}

/// One webhook configuration entry an admitter wants emitted.
///
/// An admitter usually emits exactly one; the namespace validator emits a
/// second, failure-open entry covering `kube-system` creation.
#[derive(Clone, Debug)]
pub struct WebhookOptions {
    /// Operations forwarded to the webhook.
    pub operations: Vec<Operation>,
    /// Scope of the matched resources.
    pub scope: Scope,
    /// Fail-closed unless bootstrap safety demands otherwise.
    pub failure_policy: FailurePolicy,
    /// Side-effect declaration.
    pub side_effects: SideEffects,
    /// Per-call timeout.
    pub timeout_seconds: i32,
    /// CEL predicates evaluated by the API server before calling out.
    pub match_conditions: Vec<MatchCondition>,
    /// Restricts the webhook to matching namespaces.
    pub namespace_selector: Option<LabelSelector>,
    /// Restricts the webhook to matching objects.
    pub object_selector: Option<LabelSelector>,
    /// Distinguishes multiple entries sharing a GVR.
    pub name_suffix: Option<&'static str>,
    /// Registers the webhook on a subresource instead of the main resource.
    pub sub_resource_only: Option<&'static str>,
}

impl Default for WebhookOptions {
    fn default() -> Self {
        Self {
            operations: vec![Operation::Create, Operation::Update],
            scope: Scope::Cluster,
            failure_policy: FailurePolicy::Fail,
            side_effects: SideEffects::None,
            timeout_seconds: 15,
            match_conditions: Vec::new(),
            namespace_selector: None,
            object_selector: None,
            name_suffix: None,
            sub_resource_only: None,
        }
    }
}

/// A single resource admitter.
///
/// `admit` must be pure with respect to the request and the read-only caches.
/// The only permitted call-backs are the `SubjectAccessReview` behind the
/// escalation checker and the Role updates behind the secret-delete mutator.
#[async_trait]
pub trait Admitter: Send + Sync {
    /// The resource this admitter handles.
    fn gvr(&self) -> GroupVersionResource;

    /// The webhook configuration entries to emit for this admitter.
    fn webhooks(&self) -> Vec<WebhookOptions>;

    /// Judge one request.
    async fn admit(&self, req: &AdmissionRequest) -> Result<AdmissionResponse, AdmitError>;
}
