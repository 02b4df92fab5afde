//! Routes admission reviews to their registered admitters.

use std::{collections::HashMap, sync::Arc, time::Instant};

use tracing::{error, info, warn};

use webhook_core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use webhook_core::gvk::GroupVersionResource;
use webhook_core::response::reason;

use super::Admitter;

/// Processing beyond this is reported as a slow request.
const SLOW_ADMISSION_MILLIS: u128 = 2_000;

enum Family {
    Validating,
    Mutating,
}

struct Route {
    admitter: Arc<dyn Admitter>,
    family: Family,
}

/// Maps one URL path per admitter onto its `admit` call, enforcing the
/// cross-cutting request semantics: GVR matching, the dry-run short-circuit
/// for mutators, slow-request tracing, and error conversion.
///
/// The dispatcher never retries; all retry is the API server's.
pub struct Dispatcher {
    routes: HashMap<String, Route>,
}

fn path_label(gvr: &GroupVersionResource) -> String {
    let resource = gvr.resource.replace('*', "all");
    if gvr.group.is_empty() {
        resource
    } else {
        format!("{}.{}", gvr.group, resource)
    }
}

/// The URL path serving a validating admitter.
pub fn validation_path(gvr: &GroupVersionResource) -> String {
    format!("/v1/webhook/validation/{}", path_label(gvr))
}

/// The URL path serving a mutating admitter.
pub fn mutation_path(gvr: &GroupVersionResource) -> String {
    format!("/v1/webhook/mutation/{}", path_label(gvr))
}

impl Dispatcher {
    /// Register both admitter families, one path each.
    pub fn new(validators: Vec<Arc<dyn Admitter>>, mutators: Vec<Arc<dyn Admitter>>) -> Self {
        let mut routes = HashMap::new();
        for admitter in validators {
            routes.insert(
                validation_path(&admitter.gvr()),
                Route {
                    admitter,
                    family: Family::Validating,
                },
            );
        }
        for admitter in mutators {
            routes.insert(
                mutation_path(&admitter.gvr()),
                Route {
                    admitter,
                    family: Family::Mutating,
                },
            );
        }
        Self { routes }
    }

    /// Every registered path.
    pub fn paths(&self) -> Vec<String> {
        self.routes.keys().cloned().collect()
    }

    /// Handle one POSTed review and produce the response review.
    pub async fn admit(&self, path: &str, review: AdmissionReview) -> AdmissionReview {
        let Some(route) = self.routes.get(path) else {
            return AdmissionResponse::invalid_review(format!("no admitter registered at {path}"))
                .into_review();
        };

        let req: AdmissionRequest = match review.try_into() {
            Ok(req) => req,
            Err(err) => {
                warn!(path, "invalid admission review: {err}");
                return AdmissionResponse::invalid_review(err.to_string()).into_review();
            }
        };

        let gvr = route.admitter.gvr();
        if !gvr.accepts(&req.resource) {
            return AdmissionResponse::from(&req)
                .bad_request(format!(
                    "webhook {path} does not handle resource {}",
                    req.resource
                ))
                .into_review();
        }

        // mutators declare NoneOnDryRun: answer dry runs without side effects
        // or patches; validators evaluate dry runs like any other request
        if req.dry_run && matches!(route.family, Family::Mutating) {
            return AdmissionResponse::from(&req).into_review();
        }

        let started = Instant::now();
        let response = match route.admitter.admit(&req).await {
            Ok(response) => response,
            Err(err) => {
                error!(path, operation = ?req.operation, name = %req.name, "admitter failed: {err}");
                AdmissionResponse::from(&req).failure(err.to_string(), reason::INTERNAL_ERROR, 500)
            }
        };
        let elapsed = started.elapsed();
        if elapsed.as_millis() > SLOW_ADMISSION_MILLIS {
            warn!(path, operation = ?req.operation, name = %req.name, ?elapsed,
                "slow admission request");
        } else {
            info!(path, operation = ?req.operation, name = %req.name,
                allowed = response.allowed, "admission reviewed");
        }

        response.into_review()
    }
}
