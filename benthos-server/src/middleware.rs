use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};

use crate::state::AppState;

/// Per-endpoint observability: a call counter on entry, a duration
/// histogram around the handler, and a per-status result counter on
/// completion. The matched route pattern keeps label cardinality bounded.
pub async fn track_requests(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    state
        .metrics
        .request_calls
        .with_label_values(&[endpoint.as_str()])
        .inc();
    let timer = state
        .metrics
        .request_duration
        .with_label_values(&[endpoint.as_str()])
        .start_timer();

    let response = next.run(request).await;

    timer.observe_duration();
    state
        .metrics
        .request_results
        .with_label_values(&[endpoint.as_str(), response.status().as_str()])
        .inc();
    response
}
