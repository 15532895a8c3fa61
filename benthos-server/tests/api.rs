//! Router-level tests that exercise authentication, CORS, and the request
//! validation paths. The catalog pool is lazy, so everything here runs
//! without a live Postgres; handlers that would hit the database are only
//! driven through their validation short-circuits.

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum_test::TestServer;
use benthos_config::{DataModelSettings, DataPathEntry};
use benthos_core::{Catalog, DataModel, FileCache, KeyStore, Metrics, Orchestrator, worker};
use benthos_model::{Priority, Scope};
use benthos_server::{AppState, create_app};
use chrono::Utc;
use serde_json::{Value, json};
use sqlx::postgres::PgPoolOptions;
use tempfile::TempDir;

struct TestApp {
    server: TestServer,
    state: AppState,
    _tempdir: TempDir,
}

async fn build_test_app() -> TestApp {
    let tempdir = TempDir::new().expect("tempdir");
    let key_store = Arc::new(
        KeyStore::open(&tempdir.path().join("keys.db"))
            .await
            .expect("key store"),
    );
    let cache = FileCache::open(&tempdir.path().join("cache"), 1 << 20)
        .await
        .expect("file cache");

    // Never connected: these tests stay on the validation side of handlers.
    let pool = PgPoolOptions::new()
        .connect_lazy("postgres://postgres@localhost/postgres")
        .expect("lazy pool");
    let catalog = Catalog::from_pool(pool);
    let metrics = Arc::new(Metrics::unregistered());

    let mounts = vec![DataPathEntry {
        unc_path: "//nas/reef".into(),
        mount: tempdir.path().to_path_buf(),
        priority: Priority::Low,
    }];
    let data_model = Arc::new(DataModel::new(
        catalog.clone(),
        cache,
        mounts,
        &DataModelSettings {
            max_load_size: 1 << 20,
            preprocess_jpg_store: "//nas/preprocess".into(),
            preprocess_laser_jpg_store: "//nas/laser".into(),
            debug_data_store: tempdir.path().join("debug"),
        },
    ));
    let orchestrator = Arc::new(Orchestrator::new(catalog.clone(), Arc::clone(&metrics)));

    let state = AppState {
        catalog,
        key_store,
        orchestrator,
        data_model,
        metrics,
        discovery_trigger: worker::trigger(),
        label_sync_trigger: worker::trigger(),
        start_time: Utc::now(),
    };
    let server = TestServer::new(create_app(state.clone())).expect("test server");
    TestApp {
        server,
        state,
        _tempdir: tempdir,
    }
}

async fn key_with_scopes(app: &TestApp, scopes: &[Scope]) -> String {
    let (key, _) = app
        .state
        .key_store
        .new_key("test key", None)
        .await
        .expect("new key");
    for scope in scopes {
        app.state
            .key_store
            .set_scope(&key, *scope, true)
            .await
            .expect("set scope");
    }
    key
}

#[tokio::test]
async fn banner_and_version_are_public() {
    let app = build_test_app().await;

    let banner = app.server.get("/").await;
    banner.assert_status_ok();
    assert!(banner.text().contains("Benthos data processing orchestrator"));

    let version = app.server.get("/version").await;
    version.assert_status_ok();
    let body: Value = version.json();
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn options_returns_cors_triplet() {
    let app = build_test_app().await;

    let response = app.server.method(
        axum::http::Method::OPTIONS,
        "/api/v1/control/discover",
    )
    .await;
    response.assert_status(StatusCode::NO_CONTENT);
    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );
    let methods = response
        .headers()
        .get("access-control-allow-methods")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(methods.contains("POST"));
    assert!(
        response
            .headers()
            .get("access-control-allow-headers")
            .is_some()
    );
}

#[tokio::test]
async fn requests_without_a_key_are_unauthorized() {
    let app = build_test_app().await;

    let response = app.server.post("/api/v1/control/discover").await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn scope_gates_are_enforced() {
    let app = build_test_app().await;
    let key = key_with_scopes(&app, &[Scope::GetRawFile]).await;

    // The key authenticates but lacks doDiscovery.
    let denied = app
        .server
        .post("/api/v1/control/discover")
        .add_header("api_key", key.as_str())
        .await;
    denied.assert_status(StatusCode::UNAUTHORIZED);

    let scoped = key_with_scopes(&app, &[Scope::DoDiscovery]).await;
    let allowed = app
        .server
        .post("/api/v1/control/discover")
        .add_header("api_key", scoped.as_str())
        .await;
    allowed.assert_status_ok();

    // The trigger was actually set.
    tokio::time::timeout(
        Duration::from_millis(100),
        app.state.discovery_trigger.notified(),
    )
    .await
    .expect("discovery trigger set");
}

#[tokio::test]
async fn label_sync_trigger_is_scoped_separately() {
    let app = build_test_app().await;
    let key = key_with_scopes(&app, &[Scope::DoLabelStudioSync]).await;

    let response = app
        .server
        .post("/api/v1/control/label_studio_sync")
        .add_header("api_key", key.as_str())
        .await;
    response.assert_status_ok();
    tokio::time::timeout(
        Duration::from_millis(100),
        app.state.label_sync_trigger.notified(),
    )
    .await
    .expect("sync trigger set");
}

#[tokio::test]
async fn malformed_checksums_are_rejected_before_lookup() {
    let app = build_test_app().await;
    let key = key_with_scopes(&app, &[Scope::GetRawFile]).await;

    let response = app
        .server
        .get("/api/v1/data/raw/not-a-checksum")
        .add_header("api_key", key.as_str())
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn job_status_validation() {
    let app = build_test_app().await;
    let key = key_with_scopes(&app, &[]).await;

    let bad_id = app
        .server
        .put("/api/v1/jobs/status")
        .add_query_param("jobId", "not-a-uuid")
        .add_query_param("status", "completed")
        .add_header("api_key", key.as_str())
        .await;
    bad_id.assert_status(StatusCode::BAD_REQUEST);

    let bad_status = app
        .server
        .put("/api/v1/jobs/status")
        .add_query_param("jobId", "5eb63bbbe01eeed093cb22bb8f5acdc3")
        .add_query_param("status", "running")
        .add_header("api_key", key.as_str())
        .await;
    bad_status.assert_status(StatusCode::BAD_REQUEST);

    let bad_progress = app
        .server
        .put("/api/v1/jobs/status")
        .add_query_param("jobId", "5eb63bbbe01eeed093cb22bb8f5acdc3")
        .add_query_param("status", "in_progress")
        .add_query_param("progress", "500")
        .add_header("api_key", key.as_str())
        .await;
    bad_progress.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn empty_batch_requests_commit_nothing() {
    let app = build_test_app().await;
    let key = key_with_scopes(&app, &[]).await;

    let response = app
        .server
        .post("/api/v1/jobs/retrieve_batch")
        .add_query_param("worker", "test-worker")
        .add_query_param("nImages", "0")
        .add_header("api_key", key.as_str())
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["jobs"], json!([]));
}

#[tokio::test]
async fn debug_blob_round_trip() {
    let app = build_test_app().await;
    let key = key_with_scopes(&app, &[Scope::PutDebugBlob]).await;

    let bad = app
        .server
        .put("/api/v1/debug/not-a-uuid")
        .add_header("api_key", key.as_str())
        .bytes(b"PK\x03\x04".as_slice().into())
        .await;
    bad.assert_status(StatusCode::BAD_REQUEST);

    let id = uuid::Uuid::new_v4();
    let ok = app
        .server
        .put(&format!("/api/v1/debug/{id}"))
        .add_header("api_key", key.as_str())
        .bytes(b"PK\x03\x04".as_slice().into())
        .await;
    ok.assert_status_ok();

    let stored = app._tempdir.path().join("debug").join(format!("{id}.zip"));
    assert_eq!(std::fs::read(stored).unwrap(), b"PK\x03\x04");
}

#[tokio::test]
async fn admin_key_lifecycle_over_http() {
    let app = build_test_app().await;
    let admin = key_with_scopes(&app, &[Scope::Admin]).await;

    // Mint a key with an initial scope.
    let minted = app
        .server
        .post("/api/v1/admin/new_key")
        .add_query_param("comment", "field worker")
        .add_query_param("scopes", "getRawFile")
        .add_header("api_key", admin.as_str())
        .await;
    minted.assert_status_ok();
    let body: Value = minted.json();
    let key = body["key"].as_str().expect("key in response").to_string();
    assert!(body["expires"].as_str().is_some());

    // The scopes applied at creation are visible.
    let scopes = app
        .server
        .get("/api/v1/admin/scope")
        .add_query_param("key", &key)
        .add_header("api_key", admin.as_str())
        .await;
    scopes.assert_status_ok();
    let listed: Value = scopes.json();
    assert_eq!(listed["scopes"], json!(["getRawFile"]));

    // Adding then removing a scope leaves the set unchanged.
    let added = app
        .server
        .put("/api/v1/admin/scope")
        .add_query_param("key", &key)
        .add_header("api_key", admin.as_str())
        .json(&json!({"scopes": ["doDiscovery"]}))
        .await;
    added.assert_status_ok();
    let after_add: Value = added.json();
    assert_eq!(after_add["scopes"], json!(["doDiscovery", "getRawFile"]));

    let removed = app
        .server
        .delete("/api/v1/admin/scope")
        .add_query_param("key", &key)
        .add_header("api_key", admin.as_str())
        .json(&json!({"scopes": ["doDiscovery"]}))
        .await;
    removed.assert_status_ok();
    let after_remove: Value = removed.json();
    assert_eq!(after_remove["scopes"], json!(["getRawFile"]));

    // The minted key works against its own scope gate and no other.
    let raw = app
        .server
        .get("/api/v1/data/raw/not-a-checksum")
        .add_header("api_key", key.as_str())
        .await;
    raw.assert_status(StatusCode::BAD_REQUEST);
    let denied = app
        .server
        .post("/api/v1/control/discover")
        .add_header("api_key", key.as_str())
        .await;
    denied.assert_status(StatusCode::UNAUTHORIZED);

    // Admin endpoints themselves reject non-admin keys.
    let non_admin = app
        .server
        .get("/api/v1/admin/scope")
        .add_query_param("key", &key)
        .add_header("api_key", key.as_str())
        .await;
    non_admin.assert_status(StatusCode::UNAUTHORIZED);
}
