//! The HTTP surface of the engine.
//!
//! One POST route per registered admitter, all funnelled into the
//! [`Dispatcher`]. TLS termination and certificate rotation live outside;
//! embedders serve this router behind their own listener.

use std::sync::Arc;

use axum::{
    extract::{MatchedPath, State},
    routing::post,
    Json, Router,
};
use tower_http::trace::{DefaultMakeSpan, TraceLayer};
use tracing::Level;

use webhook_core::admission::AdmissionReview;

use crate::admission::dispatcher::Dispatcher;

/// Build the router serving every registered admission path.
pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    let mut router = Router::new();
    for path in dispatcher.paths() {
        router = router.route(&path, post(handle));
    }
    router
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO)),
        )
        .with_state(dispatcher)
}

async fn handle(
    State(dispatcher): State<Arc<Dispatcher>>,
    path: MatchedPath,
    Json(review): Json<AdmissionReview>,
) -> Json<AdmissionReview> {
    Json(dispatcher.admit(path.as_str(), review).await)
}
