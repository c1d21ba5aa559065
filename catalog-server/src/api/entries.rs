//! Entry CRUD endpoints

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use catalog_common::db::models::{Entry, EntryPatch, MethodType, NewEntry};
use catalog_common::Error;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::ApiResult;
use crate::store::entries::{self, EntryFilter};
use crate::AppState;

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 500;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/entries", get(list_entries).post(create_entry))
        .route(
            "/api/entries/:id",
            get(get_entry).put(update_entry).delete(delete_entry),
        )
}

#[derive(Debug, Deserialize)]
pub struct EntryListQuery {
    pub function_id: Option<i64>,
    pub team_id: Option<i64>,
    pub method_type: Option<MethodType>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl EntryListQuery {
    fn into_filter(self) -> Result<EntryFilter, Error> {
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT);
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(Error::InvalidInput(format!(
                "limit must be between 1 and {MAX_LIMIT}"
            )));
        }
        let offset = self.offset.unwrap_or(0);
        if offset < 0 {
            return Err(Error::InvalidInput("offset must be non-negative".to_string()));
        }
        Ok(EntryFilter {
            function_id: self.function_id,
            team_id: self.team_id,
            method_type: self.method_type,
            limit,
            offset,
        })
    }
}

async fn list_entries(
    State(state): State<AppState>,
    Query(query): Query<EntryListQuery>,
) -> ApiResult<Json<Vec<Entry>>> {
    let filter = query.into_filter()?;
    Ok(Json(entries::list_entries(&state.db, &filter).await?))
}

async fn get_entry(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Entry>> {
    let entry = entries::get_entry(&state.db, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Entry {id}")))?;
    Ok(Json(entry))
}

async fn create_entry(
    State(state): State<AppState>,
    Json(payload): Json<NewEntry>,
) -> ApiResult<Json<Entry>> {
    if payload.description.trim().is_empty() {
        return Err(Error::InvalidInput("description is required".to_string()).into());
    }
    Ok(Json(entries::create_entry(&state.db, &payload).await?))
}

async fn update_entry(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<EntryPatch>,
) -> ApiResult<Json<Entry>> {
    if let Some(desc) = &payload.description {
        if desc.trim().is_empty() {
            return Err(Error::InvalidInput("description cannot be emptied".to_string()).into());
        }
    }
    Ok(Json(entries::update_entry(&state.db, id, &payload).await?))
}

async fn delete_entry(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    entries::delete_entry(&state.db, id).await?;
    Ok(Json(json!({ "status": "deleted" })))
}
