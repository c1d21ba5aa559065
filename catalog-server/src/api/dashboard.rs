//! Dashboard endpoints: fetch the working set once, aggregate in memory

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::aggregate;
use crate::api::ApiResult;
use crate::store::{entries, taxonomy};
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/dashboard/summary", get(summary))
        .route("/api/dashboard/by-function", get(by_function))
        .route("/api/dashboard/by-team", get(by_team))
        .route("/api/dashboard/by-category", get(by_category))
        .route("/api/dashboard/impact-types", get(impact_types))
        .route("/api/dashboard/tools-used", get(tools_used))
        .route("/api/dashboard/capabilities", get(capabilities))
        .route("/api/dashboard/functions-with-teams", get(functions_with_teams))
}

async fn summary(State(state): State<AppState>) -> ApiResult<Json<aggregate::Summary>> {
    let rows = entries::all_entries(&state.db).await?;
    Ok(Json(aggregate::summary(&rows)))
}

async fn by_function(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<aggregate::FunctionBreakdown>>> {
    let rows = entries::all_entries(&state.db).await?;
    let functions = taxonomy::list_functions(&state.db, true).await?;
    Ok(Json(aggregate::by_function(&rows, &functions)))
}

async fn by_team(State(state): State<AppState>) -> ApiResult<Json<Vec<aggregate::TeamBreakdown>>> {
    let rows = entries::all_entries(&state.db).await?;
    let teams = taxonomy::list_teams(&state.db, None, true).await?;
    Ok(Json(aggregate::by_team(&rows, &teams)))
}

async fn by_category(State(state): State<AppState>) -> ApiResult<Json<aggregate::CategoryBreakdown>> {
    let rows = entries::all_entries(&state.db).await?;
    Ok(Json(aggregate::by_category(&rows)))
}

async fn impact_types(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<aggregate::ImpactTypeCount>>> {
    let rows = entries::all_entries(&state.db).await?;
    Ok(Json(aggregate::impact_types(&rows)))
}

async fn tools_used(State(state): State<AppState>) -> ApiResult<Json<Vec<aggregate::ToolUsage>>> {
    let rows = entries::all_entries(&state.db).await?;
    let tools = taxonomy::list_tools(&state.db, false).await?;
    Ok(Json(aggregate::tools_used(&rows, &tools)))
}

async fn capabilities(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<aggregate::CapabilityUsage>>> {
    let rows = entries::all_entries(&state.db).await?;
    let caps = taxonomy::list_capabilities(&state.db, true).await?;
    Ok(Json(aggregate::capabilities(&rows, &caps)))
}

async fn functions_with_teams(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<aggregate::FunctionWithTeams>>> {
    let rows = entries::all_entries(&state.db).await?;
    let functions = taxonomy::list_functions(&state.db, true).await?;
    let teams = taxonomy::list_teams(&state.db, None, true).await?;
    Ok(Json(aggregate::functions_with_teams(&rows, &functions, &teams)))
}
