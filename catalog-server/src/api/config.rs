//! Taxonomy configuration endpoints

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use catalog_common::db::models::{Capability, Function, Team, Tool};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::ApiResult;
use crate::store::{reassign, taxonomy};
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/config", get(get_all_config))
        .route("/api/config/reload", post(reload_config))
        .route(
            "/api/config/functions",
            get(list_functions).post(create_function),
        )
        .route(
            "/api/config/functions/:id",
            put(update_function).delete(delete_function),
        )
        .route("/api/config/teams", get(list_teams).post(create_team))
        .route(
            "/api/config/teams/:id",
            put(update_team).delete(delete_team),
        )
        .route("/api/config/teams/:id/entries", get(team_entries))
        .route("/api/config/teams/:id/move-and-delete", post(move_and_delete))
        .route("/api/config/tools", get(list_tools).post(create_tool))
        .route(
            "/api/config/tools/:id",
            put(update_tool).delete(delete_tool),
        )
        .route(
            "/api/config/capabilities",
            get(list_capabilities).post(create_capability),
        )
        .route(
            "/api/config/capabilities/:id",
            put(update_capability).delete(delete_capability),
        )
}

/// `?all=true` includes inactive rows; the default is active only
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub all: bool,
}

#[derive(Debug, Deserialize)]
pub struct TeamListQuery {
    #[serde(default)]
    pub all: bool,
    pub function_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ItemCreate {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ItemUpdate {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct TeamCreate {
    pub function_id: i64,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct TeamUpdate {
    pub name: Option<String>,
    pub function_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CapabilityCreate {
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MoveEntriesRequest {
    /// Null detaches the entries to function level
    #[serde(default)]
    pub target_team_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ReloadRequest {
    #[serde(default)]
    pub functions: Vec<String>,
    #[serde(default)]
    pub teams: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub capabilities: Vec<CapabilityCreate>,
}

async fn get_all_config(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let functions = taxonomy::list_functions(&state.db, true).await?;
    let teams = taxonomy::list_teams(&state.db, None, true).await?;
    let tools = taxonomy::list_tools(&state.db, true).await?;
    let capabilities = taxonomy::list_capabilities(&state.db, true).await?;
    Ok(Json(json!({
        "functions": functions,
        "teams": teams,
        "tools": tools,
        "capabilities": capabilities,
    })))
}

async fn reload_config(
    State(state): State<AppState>,
    Json(payload): Json<ReloadRequest>,
) -> ApiResult<Json<Value>> {
    let capabilities: Vec<(String, Option<String>)> = payload
        .capabilities
        .into_iter()
        .map(|c| (c.name, c.icon))
        .collect();
    taxonomy::clear_and_reload_config(
        &state.db,
        &payload.functions,
        &payload.teams,
        &payload.tools,
        &capabilities,
    )
    .await?;
    Ok(Json(json!({ "status": "reloaded" })))
}

// ============ Functions ============

async fn list_functions(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Function>>> {
    Ok(Json(taxonomy::list_functions(&state.db, !query.all).await?))
}

async fn create_function(
    State(state): State<AppState>,
    Json(payload): Json<ItemCreate>,
) -> ApiResult<Json<Function>> {
    Ok(Json(taxonomy::create_function(&state.db, &payload.name).await?))
}

async fn update_function(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<ItemUpdate>,
) -> ApiResult<Json<Function>> {
    Ok(Json(taxonomy::update_function(&state.db, id, &payload.name).await?))
}

async fn delete_function(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    taxonomy::delete_function(&state.db, id).await?;
    Ok(Json(json!({ "status": "deleted" })))
}

// ============ Teams ============

async fn list_teams(
    State(state): State<AppState>,
    Query(query): Query<TeamListQuery>,
) -> ApiResult<Json<Vec<Team>>> {
    Ok(Json(taxonomy::list_teams(&state.db, query.function_id, !query.all).await?))
}

async fn create_team(
    State(state): State<AppState>,
    Json(payload): Json<TeamCreate>,
) -> ApiResult<Json<Team>> {
    Ok(Json(taxonomy::create_team(&state.db, payload.function_id, &payload.name).await?))
}

async fn update_team(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<TeamUpdate>,
) -> ApiResult<Json<Team>> {
    let existing = taxonomy::get_team(&state.db, id)
        .await?
        .ok_or_else(|| catalog_common::Error::NotFound(format!("Team {id}")))?;
    let name = payload.name.unwrap_or(existing.name);
    let function_id = payload.function_id.unwrap_or(existing.function_id);
    Ok(Json(taxonomy::update_team(&state.db, id, &name, function_id).await?))
}

async fn delete_team(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    taxonomy::delete_team(&state.db, id).await?;
    Ok(Json(json!({ "status": "deleted" })))
}

/// Pre-deletion report for the team deletion dialog
async fn team_entries(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<reassign::TeamEntryInfo>> {
    Ok(Json(reassign::team_entry_info(&state.db, id).await?))
}

async fn move_and_delete(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<MoveEntriesRequest>,
) -> ApiResult<Json<reassign::ReassignOutcome>> {
    Ok(Json(
        reassign::move_entries_and_delete(&state.db, id, payload.target_team_id).await?,
    ))
}

// ============ Tools ============

async fn list_tools(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Tool>>> {
    Ok(Json(taxonomy::list_tools(&state.db, !query.all).await?))
}

async fn create_tool(
    State(state): State<AppState>,
    Json(payload): Json<ItemCreate>,
) -> ApiResult<Json<Tool>> {
    Ok(Json(taxonomy::create_tool(&state.db, &payload.name).await?))
}

async fn update_tool(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<ItemUpdate>,
) -> ApiResult<Json<Tool>> {
    Ok(Json(taxonomy::update_tool(&state.db, id, &payload.name).await?))
}

async fn delete_tool(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    taxonomy::delete_tool(&state.db, id).await?;
    Ok(Json(json!({ "status": "deleted" })))
}

// ============ Capabilities ============

async fn list_capabilities(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Capability>>> {
    Ok(Json(taxonomy::list_capabilities(&state.db, !query.all).await?))
}

async fn create_capability(
    State(state): State<AppState>,
    Json(payload): Json<CapabilityCreate>,
) -> ApiResult<Json<Capability>> {
    Ok(Json(
        taxonomy::create_capability(&state.db, &payload.name, payload.icon.as_deref()).await?,
    ))
}

async fn update_capability(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<ItemUpdate>,
) -> ApiResult<Json<Capability>> {
    Ok(Json(taxonomy::update_capability(&state.db, id, &payload.name).await?))
}

async fn delete_capability(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    taxonomy::delete_capability(&state.db, id).await?;
    Ok(Json(json!({ "status": "deleted" })))
}
