use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use super::{backup_filename, manager_summary, summary_filename, BackupDocument};
use crate::errors::AppError;
use crate::identity::Principal;
use crate::state::AppState;
use crate::store::handlers::{resolve_range, today};

#[derive(Deserialize)]
pub struct SummaryQuery {
    pub start: Option<String>,
    pub end: Option<String>,
    #[serde(default)]
    pub download: bool,
}

/// GET /api/v1/summary
pub async fn handle_summary(
    State(state): State<AppState>,
    principal: Principal,
    Query(params): Query<SummaryQuery>,
) -> Result<Response, AppError> {
    let today = today();
    let range = resolve_range(params.start.as_deref(), params.end.as_deref(), today)?;
    let store = state.sessions.open(&principal).await;
    let text = manager_summary(&store.wins().await, range)
        .ok_or_else(|| AppError::NotFound("No wins in this date range".to_string()))?;

    if !params.download {
        return Ok(text.into_response());
    }
    let disposition = format!("attachment; filename=\"{}\"", summary_filename(today));
    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        text,
    )
        .into_response())
}

/// GET /api/v1/export
pub async fn handle_export(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Response, AppError> {
    let store = state.sessions.open(&principal).await;
    let snapshot = store.snapshot().await;
    let now = Utc::now();
    let document = BackupDocument {
        exported_at: now,
        wins: snapshot.wins.clone(),
        reflections: snapshot.reflections.clone(),
        profile: store.profile().await?,
    };
    let body = serde_json::to_string_pretty(&document).context("Failed to serialize backup")?;
    info!(
        "Exported {} wins and {} reflections for {}",
        document.wins.len(),
        document.reflections.len(),
        principal.uid
    );

    let disposition = format!("attachment; filename=\"{}\"", backup_filename(now));
    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}
