//! Integration tests for bulk export/import

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use catalog_server::{build_router, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;

async fn test_app() -> Router {
    let pool = catalog_common::db::init::init_memory_database()
        .await
        .expect("in-memory database");
    build_router(AppState::new_unauthenticated(pool))
}

async fn send_json(app: &Router, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
    send_raw(app, method, uri, body.to_string().into_bytes(), "application/json").await
}

async fn send_raw(
    app: &Router,
    method: &str,
    uri: &str,
    body: Vec<u8>,
    content_type: &str,
) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn fetch_body(app: &Router, uri: &str) -> (StatusCode, String, Option<String>) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let disposition = response
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap(), disposition)
}

async fn seed_taxonomy(app: &Router) -> (i64, i64, i64, i64, i64) {
    let (_, function) = send_json(
        app,
        "POST",
        "/api/config/functions",
        json!({ "name": "Engineering" }),
    )
    .await;
    let function_id = function["id"].as_i64().unwrap();
    let (_, team) = send_json(
        app,
        "POST",
        "/api/config/teams",
        json!({ "function_id": function_id, "name": "Platform" }),
    )
    .await;
    let (_, capability) = send_json(
        app,
        "POST",
        "/api/config/capabilities",
        json!({ "name": "Coding" }),
    )
    .await;
    let (_, tool) = send_json(app, "POST", "/api/config/tools", json!({ "name": "Copilot" })).await;
    let (_, fallback) = send_json(app, "POST", "/api/config/tools", json!({ "name": "Other" })).await;
    (
        function_id,
        team["id"].as_i64().unwrap(),
        capability["id"].as_i64().unwrap(),
        tool["id"].as_i64().unwrap(),
        fallback["id"].as_i64().unwrap(),
    )
}

#[tokio::test]
async fn bad_row_collects_all_errors_and_good_rows_still_import() {
    let app = test_app().await;
    seed_taxonomy(&app).await;

    let csv = "function,team,method_type,capability,description,tools_used\n\
        Marketing,Nowhere,flow,Slides,,Quill\n\
        Engineering,Platform,task,Coding,shipped a parser,Copilot\n";

    let (status, summary) =
        send_raw(&app, "POST", "/api/import/entries?mode=append", csv.into(), "text/csv").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["success"], 1);
    assert_eq!(summary["total_rows"], 2);

    let errors = summary["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["row"], 2);
    let messages: Vec<&str> = errors[0]["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m.as_str().unwrap())
        .collect();
    assert!(messages.contains(&"Unknown function: Marketing"));
    assert!(messages.contains(&"Invalid method_type: flow"));
    assert!(messages.contains(&"Unknown capability: Slides"));
    assert!(messages.contains(&"Unknown tool: Quill"));
    assert!(messages.contains(&"Missing description"));
    // team resolution is scoped to the function, so the unknown
    // function suppresses a second team error
    assert!(!messages.iter().any(|m| m.starts_with("Unknown team")));

    let (_, entries) = send_json(&app, "GET", "/api/entries", Value::Null).await;
    assert_eq!(entries.as_array().unwrap().len(), 1);
    assert_eq!(entries[0]["description"], "shipped a parser");
}

#[tokio::test]
async fn replace_mode_with_no_valid_rows_keeps_existing_entries() {
    let app = test_app().await;
    let (function_id, _, capability_id, _, _) = seed_taxonomy(&app).await;

    let (status, _) = send_json(
        &app,
        "POST",
        "/api/entries",
        json!({
            "function_id": function_id,
            "method_type": "task",
            "capability_id": capability_id,
            "description": "original entry"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let csv = "function,method_type,capability,description\nNope,task,Coding,x\n";
    let (status, summary) =
        send_raw(&app, "POST", "/api/import/entries?mode=replace", csv.into(), "text/csv").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["success"], 0);

    let (_, entries) = send_json(&app, "GET", "/api/entries", Value::Null).await;
    assert_eq!(entries.as_array().unwrap().len(), 1, "existing data untouched");
}

#[tokio::test]
async fn merge_taxonomy_import_is_idempotent() {
    let app = test_app().await;

    let csv = "name\nEngineering\nSales\n";
    let (status, first) = send_raw(
        &app,
        "POST",
        "/api/import/config/functions?mode=merge",
        csv.into(),
        "text/csv",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["success"], 2);
    assert_eq!(first["skipped"], 0);

    // case differences still count as duplicates
    let csv = "name\nENGINEERING\nsales\n";
    let (status, second) = send_raw(
        &app,
        "POST",
        "/api/import/config/functions?mode=merge",
        csv.into(),
        "text/csv",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["success"], 0);
    assert_eq!(second["skipped"], 2);
    assert!(second["errors"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn team_import_requires_known_function() {
    let app = test_app().await;
    seed_taxonomy(&app).await;

    let csv = "function,team\nEngineering,Delivery\nGhosts,Phantom\n";
    let (status, summary) = send_raw(
        &app,
        "POST",
        "/api/import/config/teams?mode=merge",
        csv.into(),
        "text/csv",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["success"], 1);
    let errors = summary["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["errors"][0], "Unknown function: Ghosts");
}

#[tokio::test]
async fn replace_taxonomy_import_blocked_by_dependent_entries() {
    let app = test_app().await;
    let (function_id, _, capability_id, _, _) = seed_taxonomy(&app).await;

    let (status, _) = send_json(
        &app,
        "POST",
        "/api/entries",
        json!({
            "function_id": function_id,
            "method_type": "task",
            "capability_id": capability_id,
            "description": "anchors the capability"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let csv = "name\nWriting\n";
    let (status, body) = send_raw(
        &app,
        "POST",
        "/api/import/config/capabilities?mode=replace",
        csv.into(),
        "text/csv",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "has_dependents");

    // the existing taxonomy survived the rejected replace
    let (_, caps) = send_json(&app, "GET", "/api/config/capabilities", Value::Null).await;
    assert_eq!(caps.as_array().unwrap().len(), 1);
    assert_eq!(caps[0]["name"], "Coding");

    // tools have no dependents to block, so their replace goes through
    let csv = "name\nCursor\n";
    let (status, summary) = send_raw(
        &app,
        "POST",
        "/api/import/config/tools?mode=replace",
        csv.into(),
        "text/csv",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["success"], 1);
}

#[tokio::test]
async fn structural_failure_rejects_whole_request() {
    let app = test_app().await;
    let (status, body) = send_raw(
        &app,
        "POST",
        "/api/import/entries?mode=append",
        b"{\"not\": \"an array\"}".to_vec(),
        "application/json",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_input");
}

#[tokio::test]
async fn export_substitutes_fallback_tool_names() {
    let app = test_app().await;
    let (function_id, _, capability_id, tool_id, fallback_id) = seed_taxonomy(&app).await;

    let (status, _) = send_json(
        &app,
        "POST",
        "/api/entries",
        json!({
            "function_id": function_id,
            "method_type": "workflow",
            "capability_id": capability_id,
            "description": "pipeline triage",
            "tools_used": [tool_id, fallback_id],
            "other_tools": ["Internal GPT wrapper"]
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, csv, disposition) = fetch_body(&app, "/api/export/entries?format=csv").await;
    assert_eq!(status, StatusCode::OK);
    assert!(disposition.unwrap().contains("attachment"));
    assert!(csv.contains("Internal GPT wrapper"));
    assert!(csv.contains("Copilot"));

    let (_, tools_used) = send_json(&app, "GET", "/api/dashboard/tools-used", Value::Null).await;
    let names: Vec<&str> = tools_used
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["tool"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"Internal GPT wrapper"));
    assert!(!names.contains(&"Other"));
}

#[tokio::test]
async fn json_export_round_trips_through_replace_import() {
    let app = test_app().await;
    let (function_id, team_id, capability_id, tool_id, _) = seed_taxonomy(&app).await;

    let (status, _) = send_json(
        &app,
        "POST",
        "/api/entries",
        json!({
            "function_id": function_id,
            "team_id": team_id,
            "method_type": "workflow",
            "capability_id": capability_id,
            "description": "weekly report automation",
            "tools_used": [tool_id],
            "impacts": [
                { "type": "time_savings", "value": 3.0, "frequency": "weekly",
                  "time_unit": "hours", "annual_value": 150.0 }
            ],
            "submitted_by": "sam"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, exported, _) = fetch_body(&app, "/api/export/entries?format=json").await;
    assert_eq!(status, StatusCode::OK);

    let (status, summary) = send_raw(
        &app,
        "POST",
        "/api/import/entries?mode=replace",
        exported.into_bytes(),
        "application/json",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["success"], 1);
    assert!(summary["errors"].as_array().unwrap().is_empty());

    let (_, entries) = send_json(&app, "GET", "/api/entries", Value::Null).await;
    let rows = entries.as_array().unwrap();
    assert_eq!(rows.len(), 1, "replace swapped rather than appended");
    let row = &rows[0];
    assert_eq!(row["function_name"], "Engineering");
    assert_eq!(row["team_name"], "Platform");
    assert_eq!(row["description"], "weekly report automation");
    assert_eq!(row["tools_used"][0], tool_id);
    assert_eq!(row["impacts"][0]["type"], "time_savings");
    assert_eq!(row["impacts"][0]["annual_value"], 150.0);
    assert_eq!(row["submitted_by"], "sam");
}

#[tokio::test]
async fn taxonomy_export_lists_team_pairs() {
    let app = test_app().await;
    seed_taxonomy(&app).await;

    let (status, csv, _) = fetch_body(&app, "/api/export/config/teams?format=csv").await;
    assert_eq!(status, StatusCode::OK);
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some("function,team"));
    assert_eq!(lines.next(), Some("Engineering,Platform"));
}
