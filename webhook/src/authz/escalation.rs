//! Privilege-escalation prevention.
//!
//! A requester may only grant rules their own effective rules cover, unless
//! they hold a bypass verb (`escalate` or `bind`) on the role object being
//! granted. The bypass is confirmed lazily through a `SubjectAccessReview`
//! and cached for the rest of the request, which may consult it several
//! times (global rules, per-namespace rules, fleet rules).

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::authentication::v1::UserInfo;
use k8s_openapi::api::authorization::v1::ResourceAttributes;
use k8s_openapi::api::rbac::v1::PolicyRule;
use thiserror::Error;
use tracing::warn;

use super::resolver::{ResolveError, RuleResolver};
use webhook_core::rules;

/// The verb bypassing escalation checks on role-shaped objects.
pub const VERB_ESCALATE: &str = "escalate";
/// The verb bypassing escalation checks when binding a role to a subject.
pub const VERB_BIND: &str = "bind";

/// A `SubjectAccessReview` failed outright (transport, not a denial).
#[derive(Debug, Error)]
#[error("subjectaccessreview failed: {0}")]
pub struct AccessReviewError(pub String);

/// The one call-back into the API server the engine is allowed: asking
/// whether a user holds a verb on a resource.
#[async_trait]
pub trait AccessReviewer: Send + Sync {
    /// Whether `user` may perform `attributes`.
    async fn review(
        &self,
        user: &UserInfo,
        attributes: &ResourceAttributes,
    ) -> Result<bool, AccessReviewError>;
}

/// An [`AccessReviewer`] that never grants; the safe default when no client
/// is wired up.
pub struct DenyAll;

#[async_trait]
impl AccessReviewer for DenyAll {
    async fn review(&self, _: &UserInfo, _: &ResourceAttributes) -> Result<bool, AccessReviewError> {
        Ok(false)
    }
}

/// The role object a bypass verb would be checked against.
#[derive(Clone, Debug)]
pub struct BypassTarget {
    /// `escalate` or `bind`.
    pub verb: &'static str,
    /// API group of the role object's resource.
    pub group: &'static str,
    /// Plural resource of the role object.
    pub resource: &'static str,
    /// Name of the role object.
    pub name: String,
}

impl BypassTarget {
    fn attributes(&self) -> ResourceAttributes {
        ResourceAttributes {
            verb: Some(self.verb.to_string()),
            group: Some(self.group.to_string()),
            resource: Some(self.resource.to_string()),
            name: Some(self.name.clone()),
            ..Default::default()
        }
    }

    fn as_rule(&self) -> PolicyRule {
        PolicyRule {
            verbs: vec![self.verb.to_string()],
            api_groups: Some(vec![self.group.to_string()]),
            resources: Some(vec![self.resource.to_string()]),
            resource_names: Some(vec![self.name.clone()]),
            non_resource_urls: None,
        }
    }
}

/// The per-request bypass record. Created fresh on every admitter entry and
/// threaded through each coverage check, so one request performs at most one
/// review per (verb, target) pair. Never share it across requests.
#[derive(Default)]
pub struct EscalationCheck {
    checked: bool,
    has_verb: bool,
}

impl EscalationCheck {
    /// A fresh, unchecked record.
    pub fn new() -> Self {
        Self::default()
    }
}

/// The outcome of an escalation check.
#[derive(Debug, PartialEq, Eq)]
pub enum EscalationOutcome {
    /// Every candidate rule is covered, or the bypass verb is held.
    Allowed,
    /// Not covered and no bypass; the message enumerates the missing rules.
    Denied(String),
}

impl EscalationOutcome {
    /// Whether the check passed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, EscalationOutcome::Allowed)
    }
}

/// Checks candidate rule sets against a requester's effective rules.
#[derive(Clone)]
pub struct EscalationChecker {
    resolver: RuleResolver,
    reviewer: Arc<dyn AccessReviewer>,
}

impl EscalationChecker {
    /// Build a checker over the resolver and the review client.
    pub fn new(resolver: RuleResolver, reviewer: Arc<dyn AccessReviewer>) -> Self {
        Self { resolver, reviewer }
    }

    /// The rule resolver backing this checker.
    pub fn resolver(&self) -> &RuleResolver {
        &self.resolver
    }

    /// Confirm that granting `candidates` in `namespace` escalates nothing
    /// beyond what `user` already holds, or that the bypass verb is held.
    pub async fn confirm_no_escalation(
        &self,
        user: &UserInfo,
        candidates: &[PolicyRule],
        namespace: Option<&str>,
        target: &BypassTarget,
        check: &mut EscalationCheck,
    ) -> Result<EscalationOutcome, ResolveError> {
        let owned = self.resolver.rules_for_user(user, namespace)?;
        let uncovered = match rules::coverage_check(&owned, candidates) {
            Ok(()) => return Ok(EscalationOutcome::Allowed),
            Err(uncovered) => uncovered,
        };

        // a wildcard (or explicit) grant of the bypass verb in the user's own
        // rules short-circuits the review
        if rules::covers_rule(&owned, &target.as_rule()) {
            return Ok(EscalationOutcome::Allowed);
        }

        if !check.checked {
            check.checked = true;
            check.has_verb = match self.reviewer.review(user, &target.attributes()).await {
                Ok(allowed) => allowed,
                Err(err) => {
                    // surface the original coverage error, not the transport one
                    warn!(verb = target.verb, name = %target.name, error = %err,
                        "escalation bypass review failed");
                    false
                }
            };
        }
        if check.has_verb {
            return Ok(EscalationOutcome::Allowed);
        }

        Ok(EscalationOutcome::Denied(format!(
            "requester is attempting to grant permissions not currently held: [{uncovered}]"
        )))
    }
}
