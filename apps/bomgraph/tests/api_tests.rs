//! Integration tests for the bomgraph HTTP API.
//!
//! Uses axum-test to drive the router without binding a socket.

#![allow(clippy::unwrap_used, clippy::panic)]

use axum::http::{HeaderValue, StatusCode, header};
use axum_test::TestServer;
use bomgraph::api::{
    AppState, ErrorResponse, ExportResponse, HashResponse, HealthResponse, StatusResponse,
    create_router,
};
use bomgraph::config::ServerConfig;
use bomgraph_core::{Session, import_canonical};
use serde_json::{Value, json};

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

fn open_config() -> ServerConfig {
    ServerConfig {
        rate_limit: 0,
        ..ServerConfig::default()
    }
}

fn create_test_server() -> TestServer {
    let router = create_router(AppState::new(Session::new()), &open_config());
    TestServer::new(router).unwrap()
}

async fn add_component(server: &TestServer, name: &str) -> (u64, u64) {
    let response = server
        .post("/components")
        .json(&json!({ "name": name, "classification": "ASM" }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    (
        body["component"].as_u64().unwrap(),
        body["revision"].as_u64().unwrap(),
    )
}

async fn add_link(server: &TestServer, source: u64, target: u64, quantity: f64) -> u64 {
    let response = server
        .post("/links")
        .json(&json!({ "source": source, "target": target, "quantity": quantity }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    body["link"].as_u64().unwrap()
}

async fn set_mass(server: &TestServer, revision: u64, mass: f64) {
    let response = server
        .put(&format!("/revisions/{}/attributes", revision))
        .json(&json!({ "attributes": [mass, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0] }))
        .await;
    response.assert_status(StatusCode::NO_CONTENT);
}

/// Root -(2)-> Left -(4)-> Bolt, Root -(3)-> Right -(4)-> Bolt; Bolt weighs 0.5.
async fn build_diamond(server: &TestServer) -> (u64, u64) {
    let (_, root) = add_component(server, "Root").await;
    let (left_c, left) = add_component(server, "Left").await;
    let (right_c, right) = add_component(server, "Right").await;
    let (bolt_c, bolt) = add_component(server, "Bolt").await;
    set_mass(server, bolt, 0.5).await;
    add_link(server, root, left_c, 2.0).await;
    add_link(server, root, right_c, 3.0).await;
    add_link(server, left, bolt_c, 4.0).await;
    add_link(server, right, bolt_c, 4.0).await;
    (root, bolt)
}

fn error_kind(response: &axum_test::TestResponse) -> String {
    let error: ErrorResponse = response.json();
    error.kind
}

// =============================================================================
// HEALTH / STATUS
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let server = create_test_server();

    let response = server.get("/health").await;

    response.assert_status_ok();
    let health: HealthResponse = response.json();
    assert_eq!(health.status, "ok");
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_status_empty_store() {
    let server = create_test_server();

    let response = server.get("/status").await;

    response.assert_status_ok();
    let status: StatusResponse = response.json();
    assert_eq!(status.backend, "memory");
    assert_eq!(status.components, 0);
    assert_eq!(status.revisions, 0);
    assert_eq!(status.links, 0);
}

// =============================================================================
// COMPONENTS AND REVISIONS
// =============================================================================

#[tokio::test]
async fn test_create_and_list_components() {
    let server = create_test_server();
    add_component(&server, "Frame").await;
    add_component(&server, "Bolt").await;

    let response = server.get("/components").await;
    response.assert_status_ok();
    let list: Vec<Value> = response.json();
    assert_eq!(list.len(), 2);
    assert!(list.iter().all(|c| c["revision_count"] == 1));
    assert!(list.iter().any(|c| c["name"] == "Frame"));
}

#[tokio::test]
async fn test_duplicate_component_conflicts() {
    let server = create_test_server();
    add_component(&server, "Frame").await;

    let response = server
        .post("/components")
        .json(&json!({ "name": "FRAME", "classification": "ASM" }))
        .await;

    response.assert_status(StatusCode::CONFLICT);
    assert_eq!(error_kind(&response), "lifecycle_violation");
}

#[tokio::test]
async fn test_empty_name_is_bad_request() {
    let server = create_test_server();

    let response = server
        .post("/components")
        .json(&json!({ "name": "", "classification": "ASM" }))
        .await;

    response.assert_status_bad_request();
}

#[tokio::test]
async fn test_new_revision_supersedes_draft() {
    let server = create_test_server();
    let (frame_c, first) = add_component(&server, "Frame").await;

    let response = server
        .post(&format!("/components/{}/revisions", frame_c))
        .await;
    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    assert_eq!(body["name"], "Frame_rev01");

    // The superseded revision is frozen.
    let response = server
        .put(&format!("/revisions/{}/attributes", first))
        .json(&json!({ "attributes": [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0] }))
        .await;
    response.assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_unknown_component_is_not_found() {
    let server = create_test_server();

    let response = server.post("/components/999/revisions").await;

    response.assert_status_not_found();
    assert_eq!(error_kind(&response), "not_found");
}

// =============================================================================
// LINKS
// =============================================================================

#[tokio::test]
async fn test_link_validation() {
    let server = create_test_server();
    let (frame_c, frame) = add_component(&server, "Frame").await;
    let (bolt_c, _) = add_component(&server, "Bolt").await;

    let zero = server
        .post("/links")
        .json(&json!({ "source": frame, "target": bolt_c, "quantity": 0.0 }))
        .await;
    zero.assert_status_bad_request();

    let own = server
        .post("/links")
        .json(&json!({ "source": frame, "target": frame_c, "quantity": 1.0 }))
        .await;
    own.assert_status(StatusCode::CONFLICT);

    add_link(&server, frame, bolt_c, 1.0).await;
    let duplicate = server
        .post("/links")
        .json(&json!({ "source": frame, "target": bolt_c, "quantity": 2.0 }))
        .await;
    duplicate.assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_cycle_is_rejected() {
    let server = create_test_server();
    let (a_c, a) = add_component(&server, "A").await;
    let (b_c, b) = add_component(&server, "B").await;
    let (c_c, c) = add_component(&server, "C").await;
    add_link(&server, a, b_c, 1.0).await;
    add_link(&server, b, c_c, 1.0).await;

    let response = server
        .post("/links")
        .json(&json!({ "source": c, "target": a_c, "quantity": 1.0 }))
        .await;

    response.assert_status(StatusCode::CONFLICT);
    assert_eq!(error_kind(&response), "cycle_detected");

    let report: Value = server.get(&format!("/revisions/{}/cycle", a)).await.json();
    assert_eq!(report["has_cycle"], false);
}

#[tokio::test]
async fn test_update_and_delete_link() {
    let server = create_test_server();
    let (_, frame) = add_component(&server, "Frame").await;
    let (bolt_c, _) = add_component(&server, "Bolt").await;
    let link = add_link(&server, frame, bolt_c, 1.0).await;

    let response = server
        .put(&format!("/links/{}", link))
        .json(&json!({ "quantity": 6.0, "kind": "welded" }))
        .await;
    response.assert_status_ok();
    let updated: Value = response.json();
    assert_eq!(updated["quantity"], 6.0);
    assert_eq!(updated["kind"], "welded");

    server
        .delete(&format!("/links/{}", link))
        .await
        .assert_status(StatusCode::NO_CONTENT);
    server
        .delete(&format!("/links/{}", link))
        .await
        .assert_status_not_found();
}

// =============================================================================
// LIFECYCLE
// =============================================================================

#[tokio::test]
async fn test_lock_cascades_and_freezes() {
    let server = create_test_server();
    let (_, frame) = add_component(&server, "Frame").await;
    let (bolt_c, bolt) = add_component(&server, "Bolt").await;
    add_link(&server, frame, bolt_c, 4.0).await;

    let response = server.post(&format!("/revisions/{}/lock", frame)).await;
    response.assert_status_ok();
    let outcome: Value = response.json();
    let locked: Vec<u64> = serde_json::from_value(outcome["locked"].clone()).unwrap();
    assert_eq!(locked, vec![frame, bolt]);

    // Locked revisions reject edits, a second lock, and unlock.
    let response = server
        .put(&format!("/revisions/{}/attributes", bolt))
        .json(&json!({ "attributes": [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0] }))
        .await;
    response.assert_status(StatusCode::CONFLICT);
    server
        .post(&format!("/revisions/{}/lock", frame))
        .await
        .assert_status(StatusCode::CONFLICT);
    let response = server.post(&format!("/revisions/{}/unlock", frame)).await;
    response.assert_status(StatusCode::CONFLICT);
    assert_eq!(error_kind(&response), "lifecycle_violation");
}

#[tokio::test]
async fn test_copy_revision_carries_links() {
    let server = create_test_server();
    let (_, frame) = add_component(&server, "Frame").await;
    let (bolt_c, _) = add_component(&server, "Bolt").await;
    add_link(&server, frame, bolt_c, 4.0).await;

    let response = server.post(&format!("/revisions/{}/copy", frame)).await;
    response.assert_status(StatusCode::CREATED);
    let outcome: Value = response.json();
    assert_eq!(outcome["links"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_delete_sole_revision_removes_component() {
    let server = create_test_server();
    let (_, frame) = add_component(&server, "Frame").await;

    let response = server.delete(&format!("/revisions/{}", frame)).await;
    response.assert_status_ok();
    let outcome: Value = response.json();
    assert_eq!(outcome["component_deleted"], true);

    let status: StatusResponse = server.get("/status").await.json();
    assert_eq!(status.components, 0);
}

// =============================================================================
// READ PASSES
// =============================================================================

#[tokio::test]
async fn test_analysis_of_diamond() {
    let server = create_test_server();
    let (root, bolt) = build_diamond(&server).await;

    let response = server.get(&format!("/revisions/{}/analysis", root)).await;
    response.assert_status_ok();
    let analysis: Value = response.json();

    let root_mass = &analysis["traversal"]["attributes"][root.to_string()][0];
    assert_eq!(root_mass.as_f64().unwrap(), 10.0);
    let bolt_total = &analysis["paths"]["quantities"][bolt.to_string()];
    assert_eq!(bolt_total.as_f64().unwrap(), 20.0);
    assert_eq!(
        analysis["paths"]["paths"][bolt.to_string()]
            .as_array()
            .unwrap()
            .len(),
        2
    );
    assert!(analysis.get("mismatches").is_none());
}

#[tokio::test]
async fn test_traverse_and_paths_agree_on_visited() {
    let server = create_test_server();
    let (root, _) = build_diamond(&server).await;

    let traversal: Value = server
        .get(&format!("/revisions/{}/traverse", root))
        .await
        .json();
    let paths: Value = server
        .get(&format!("/revisions/{}/paths", root))
        .await
        .json();

    assert_eq!(traversal["visited"].as_array().unwrap().len(), 4);
    assert_eq!(paths["quantities"].as_object().unwrap().len(), 4);
}

#[tokio::test]
async fn test_traverse_unknown_revision() {
    let server = create_test_server();

    let response = server.get("/revisions/42/traverse").await;

    response.assert_status_not_found();
}

// =============================================================================
// COPY / BULK IMPORT
// =============================================================================

#[tokio::test]
async fn test_copy_component_picks_free_name() {
    let server = create_test_server();
    let (frame_c, _) = add_component(&server, "Frame").await;

    let first = server.post(&format!("/components/{}/copy", frame_c)).await;
    first.assert_status(StatusCode::CREATED);
    let second = server.post(&format!("/components/{}/copy", frame_c)).await;
    second.assert_status(StatusCode::CREATED);

    let components: Value = server.get("/components").await.json();
    let names: Vec<&str> = components
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["component"]["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"Frame (1)"));
    assert!(names.contains(&"Frame (2)"));

    let missing = server.post("/components/999/copy").await;
    missing.assert_status_not_found();
}

#[tokio::test]
async fn test_tsv_import_builds_graph() {
    let server = create_test_server();
    let data = [
        "Frame\t\tpcs\tASM\t\t\t\t\t\t\t\t\t\tBolt\t8\tassembled",
        "Bolt\t\tpcs\tASM\tarticle\t0.5\t\t\t\t\t",
    ]
    .join("\n");

    let response = server.post("/import/tsv").json(&json!({ "data": data })).await;
    response.assert_status(StatusCode::CREATED);
    let summary: Value = response.json();
    assert_eq!(summary["created"].as_array().unwrap().len(), 2);
    assert_eq!(summary["links"], 1);

    let frame = summary["revisions"][0].as_u64().unwrap();
    let analysis: Value = server
        .get(&format!("/revisions/{}/analysis", frame))
        .await
        .json();
    assert_eq!(analysis["traversal"]["attributes"][frame.to_string()][0], 4.0);
}

#[tokio::test]
async fn test_tsv_import_reports_each_bad_line() {
    let server = create_test_server();
    let data = "Frame\tpcs\nBeam\t\tpcs\tASM\tgadget\t\t\t\t\t\t";

    let response = server.post("/import/tsv").json(&json!({ "data": data })).await;

    response.assert_status_bad_request();
    let error: ErrorResponse = response.json();
    assert_eq!(error.kind, "import_rejected");
    assert_eq!(error.details.len(), 2);
    assert!(error.details[0].starts_with("Line 1:"));
    assert!(error.details[1].starts_with("Line 2:"));

    let status: StatusResponse = server.get("/status").await.json();
    assert_eq!(status.components, 0);
}

// =============================================================================
// EXPORT / HASH
// =============================================================================

#[tokio::test]
async fn test_export_round_trips() {
    let server = create_test_server();
    build_diamond(&server).await;

    let response = server.post("/export").await;
    response.assert_status_ok();
    let export: ExportResponse = response.json();
    assert!(export.success);

    let data = base64::Engine::decode(
        &base64::engine::general_purpose::STANDARD,
        export.data.unwrap(),
    )
    .unwrap();
    let bom = import_canonical(&data).unwrap();
    assert_eq!(bom.components.len(), 4);
    assert_eq!(Some(bom.checksum()), export.checksum);
}

#[tokio::test]
async fn test_hash_changes_with_content() {
    let server = create_test_server();

    let empty: HashResponse = server.get("/hash").await.json();
    assert_eq!(empty.algorithm, "blake3");
    assert_eq!(empty.hash.len(), 64);

    add_component(&server, "Frame").await;
    let populated: HashResponse = server.get("/hash").await.json();
    assert_ne!(empty.hash, populated.hash);
}

// =============================================================================
// ERROR HANDLING
// =============================================================================

#[tokio::test]
async fn test_404_on_unknown_endpoint() {
    let server = create_test_server();

    server.get("/unknown").await.assert_status_not_found();
}

#[tokio::test]
async fn test_method_not_allowed() {
    let server = create_test_server();

    let response = server.post("/health").await;
    assert_eq!(response.status_code().as_u16(), 405);
}

#[tokio::test]
async fn test_invalid_json_body() {
    let server = create_test_server();

    let response = server
        .post("/components")
        .text("not valid json")
        .content_type("application/json")
        .await;

    assert!(response.status_code().is_client_error());
}

// =============================================================================
// AUTHENTICATION
// =============================================================================

fn create_auth_test_server(api_key: &str) -> TestServer {
    let config = ServerConfig {
        api_key: Some(api_key.to_string()),
        ..open_config()
    };
    let router = create_router(AppState::new(Session::new()), &config);
    TestServer::new(router).unwrap()
}

#[tokio::test]
async fn test_auth_valid_bearer_token() {
    let server = create_auth_test_server("test-secret-key-12345");

    let response = server
        .get("/status")
        .add_header(
            header::AUTHORIZATION,
            "Bearer test-secret-key-12345".parse::<HeaderValue>().unwrap(),
        )
        .await;

    response.assert_status_ok();
}

#[tokio::test]
async fn test_auth_valid_raw_token() {
    let server = create_auth_test_server("test-raw-key-67890");

    let response = server
        .get("/status")
        .add_header(
            header::AUTHORIZATION,
            "test-raw-key-67890".parse::<HeaderValue>().unwrap(),
        )
        .await;

    response.assert_status_ok();
}

#[tokio::test]
async fn test_auth_rejects_wrong_missing_and_bare_prefix() {
    let server = create_auth_test_server("correct-key");

    let wrong = server
        .get("/status")
        .add_header(
            header::AUTHORIZATION,
            "Bearer wrong-key".parse::<HeaderValue>().unwrap(),
        )
        .await;
    assert_eq!(wrong.status_code().as_u16(), 401);

    let missing = server.get("/status").await;
    assert_eq!(missing.status_code().as_u16(), 401);

    let bare = server
        .get("/status")
        .add_header(
            header::AUTHORIZATION,
            "Bearer ".parse::<HeaderValue>().unwrap(),
        )
        .await;
    assert_eq!(bare.status_code().as_u16(), 401);
}

#[tokio::test]
async fn test_auth_health_endpoint_bypasses_auth() {
    let server = create_auth_test_server("secret-key-for-bypass-test");

    server.get("/health").await.assert_status_ok();
}

// =============================================================================
// RATE LIMITING
// =============================================================================

#[tokio::test]
async fn test_rate_limit_returns_429() {
    let config = ServerConfig {
        rate_limit: 1,
        ..ServerConfig::default()
    };
    let router = create_router(AppState::new(Session::new()), &config);
    let server = TestServer::new(router).unwrap();

    server.get("/health").await.assert_status_ok();
    let response = server.get("/health").await;
    assert_eq!(response.status_code(), StatusCode::TOO_MANY_REQUESTS);
}

// =============================================================================
// SNAPSHOT PERSISTENCE
// =============================================================================

#[tokio::test]
async fn test_mutations_rewrite_snapshot_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bom.snapshot");
    let state = AppState::new(Session::new()).with_snapshot_file(path.clone());
    let server = TestServer::new(create_router(state, &open_config())).unwrap();

    add_component(&server, "Frame").await;
    add_component(&server, "Bolt").await;

    let reloaded = Session::from_snapshot_file(&path).unwrap();
    assert_eq!(reloaded.counts().unwrap().components, 2);
}
