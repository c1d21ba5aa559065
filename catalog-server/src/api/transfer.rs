//! Export and import endpoints.
//!
//! Exports are downloadable attachments; imports take the raw uploaded
//! file bytes and always answer 200 with a summary when the file itself
//! was readable, reserving client errors for structural failures.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use catalog_common::Error;
use serde::Deserialize;

use crate::api::ApiResult;
use crate::store::{entries, taxonomy};
use crate::transfer::export::{self, TaxonomyKind};
use crate::transfer::import::{self, EntryImportMode, ImportSummary, TaxonomyImportMode};
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/export/entries", get(export_entries))
        .route("/api/export/config/:kind", get(export_taxonomy))
        .route("/api/import/entries", post(import_entries))
        .route("/api/import/config/:kind", post(import_taxonomy))
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_format() -> String {
    "csv".to_string()
}

#[derive(Debug, Deserialize)]
pub struct EntryImportQuery {
    #[serde(default = "default_entry_mode")]
    pub mode: String,
}

fn default_entry_mode() -> String {
    "append".to_string()
}

#[derive(Debug, Deserialize)]
pub struct TaxonomyImportQuery {
    #[serde(default = "default_taxonomy_mode")]
    pub mode: String,
}

fn default_taxonomy_mode() -> String {
    "merge".to_string()
}

fn attachment(filename: &str, content_type: &'static str, body: String) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    )
        .into_response()
}

fn export_stamp() -> String {
    chrono::Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

async fn export_entries(
    State(state): State<AppState>,
    Query(query): Query<ExportQuery>,
) -> ApiResult<Response> {
    let rows = entries::all_entries(&state.db).await?;
    let tools = taxonomy::list_tools(&state.db, false).await?;
    let stamp = export_stamp();

    match query.format.as_str() {
        "csv" => {
            let body = export::entries_to_csv(&rows, &tools)?;
            Ok(attachment(&format!("entries_export_{stamp}.csv"), "text/csv", body))
        }
        "json" => {
            let body = export::entries_to_json(&rows, &tools)?;
            Ok(attachment(
                &format!("entries_export_{stamp}.json"),
                "application/json",
                body,
            ))
        }
        other => Err(Error::InvalidInput(format!("Unsupported format: {other}")).into()),
    }
}

async fn export_taxonomy(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(query): Query<ExportQuery>,
) -> ApiResult<Response> {
    let kind = TaxonomyKind::parse(&kind)
        .ok_or_else(|| Error::InvalidInput(format!("Unknown config type: {kind}")))?;
    let stamp = export_stamp();

    match query.format.as_str() {
        "csv" => {
            let body = export::taxonomy_to_csv(&state.db, kind).await?;
            Ok(attachment(
                &format!("{}_export_{stamp}.csv", kind.as_str()),
                "text/csv",
                body,
            ))
        }
        "json" => {
            let body = export::taxonomy_to_json(&state.db, kind).await?;
            Ok(attachment(
                &format!("{}_export_{stamp}.json", kind.as_str()),
                "application/json",
                body,
            ))
        }
        other => Err(Error::InvalidInput(format!("Unsupported format: {other}")).into()),
    }
}

async fn import_entries(
    State(state): State<AppState>,
    Query(query): Query<EntryImportQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<ImportSummary>> {
    let mode = EntryImportMode::parse(&query.mode)
        .ok_or_else(|| Error::InvalidInput(format!("Unknown import mode: {}", query.mode)))?;
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let summary = import::import_entries(&state.db, &body, mode, content_type).await?;
    Ok(Json(summary))
}

async fn import_taxonomy(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(query): Query<TaxonomyImportQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<ImportSummary>> {
    let kind = TaxonomyKind::parse(&kind)
        .ok_or_else(|| Error::InvalidInput(format!("Unknown config type: {kind}")))?;
    let mode = TaxonomyImportMode::parse(&query.mode)
        .ok_or_else(|| Error::InvalidInput(format!("Unknown import mode: {}", query.mode)))?;
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let summary = import::import_taxonomy(&state.db, kind, &body, mode, content_type).await?;
    Ok(Json(summary))
}
