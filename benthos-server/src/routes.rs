use axum::{
    Router,
    http::{StatusCode, header},
    routing::{MethodRouter, get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{
    admin, control, data, debug, home, jobs, metadata, version,
};
use crate::middleware::track_requests;
use crate::state::AppState;

/// Answer OPTIONS with 204 and the CORS triplet; the allowed-methods header
/// reflects the methods the route actually declares.
fn with_preflight(
    methods: &'static str,
    routes: MethodRouter<AppState>,
) -> MethodRouter<AppState> {
    routes.options(move || async move {
        (
            StatusCode::NO_CONTENT,
            [
                (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
                (
                    header::ACCESS_CONTROL_ALLOW_HEADERS,
                    "api_key, content-type, x-requested-with",
                ),
                (header::ACCESS_CONTROL_ALLOW_METHODS, methods),
            ],
        )
    })
}

/// Assemble the full application router.
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", with_preflight("GET, OPTIONS", get(home)))
        .route("/version", with_preflight("GET, OPTIONS", get(version)))
        .route(
            "/api/v1/jobs/retrieve_batch",
            with_preflight("POST, OPTIONS", post(jobs::retrieve_batch)),
        )
        .route(
            "/api/v1/jobs/status",
            with_preflight("PUT, OPTIONS", put(jobs::set_job_status)),
        )
        .route(
            "/api/v1/data/raw/{checksum}",
            with_preflight("GET, OPTIONS", get(data::get_raw_file)),
        )
        .route(
            "/api/v1/data/lens_cal/{camera_id}",
            with_preflight("GET, OPTIONS", get(data::get_lens_cal)),
        )
        .route(
            "/api/v1/data/preprocess_jpeg/{checksum}",
            with_preflight(
                "GET, PUT, OPTIONS",
                get(data::get_preprocess_jpeg).put(data::put_preprocess_jpeg),
            ),
        )
        .route(
            "/api/v1/data/laser_jpeg/{checksum}",
            with_preflight(
                "GET, PUT, DELETE, OPTIONS",
                get(data::get_laser_jpeg)
                    .put(data::put_laser_jpeg)
                    .delete(data::delete_laser_jpeg),
            ),
        )
        .route(
            "/api/v1/data/laser/{checksum}",
            with_preflight("GET, OPTIONS", get(data::get_laser_label)),
        )
        .route(
            "/api/v1/data/head_tail/{checksum}",
            with_preflight(
                "DELETE, OPTIONS",
                axum::routing::delete(data::delete_headtail_label),
            ),
        )
        .route(
            "/api/v1/control/discover",
            with_preflight("POST, OPTIONS", post(control::trigger_discovery)),
        )
        .route(
            "/api/v1/control/label_studio_sync",
            with_preflight("POST, OPTIONS", post(control::trigger_label_sync)),
        )
        .route(
            "/api/v1/debug/{id}",
            with_preflight("PUT, OPTIONS", put(debug::put_debug_blob)),
        )
        .route(
            "/api/v1/admin/scope",
            with_preflight(
                "GET, PUT, DELETE, OPTIONS",
                get(admin::get_scopes)
                    .put(admin::add_scopes)
                    .delete(admin::remove_scopes),
            ),
        )
        .route(
            "/api/v1/admin/new_key",
            with_preflight("POST, OPTIONS", post(admin::new_key)),
        )
        .route(
            "/api/v1/metadata/frame/{checksum}",
            with_preflight("GET, OPTIONS", get(metadata::get_frame)),
        )
        .route(
            "/api/v1/metadata/dive/{checksum}",
            with_preflight("GET, OPTIONS", get(metadata::get_dive)),
        )
        .route(
            "/api/v1/metadata/dives",
            with_preflight("GET, OPTIONS", get(metadata::list_dives)),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            track_requests,
        ))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
