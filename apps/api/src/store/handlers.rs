use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::stats::{WinFilter, WinStats};
use super::StoreState;
use crate::errors::AppError;
use crate::identity::{IdentityVerdict, Principal};
use crate::models::dates::{parse_calendar_date, week_start, DateRange};
use crate::models::profile::{ProfilePatch, UserProfile};
use crate::models::reflection::{NewReflection, WeeklyReflection};
use crate::models::win::{NewWin, Taxonomy, Win, WinPatch};
use crate::state::AppState;
use crate::storage::local::LocalStore;
use crate::storage::{StorageMode, StoreError};

/// Default span for range queries without explicit bounds.
pub const DEFAULT_RANGE_DAYS: i64 = 30;

pub const GUEST_WARNING: &str = "Data is saved only in this account's local storage. \
It is not synced across devices. Export your data regularly to avoid loss.";

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Resolves optional `YYYY-MM-DD` bounds; missing bounds default to the last
/// `DEFAULT_RANGE_DAYS` days through `today`.
pub fn resolve_range(
    start: Option<&str>,
    end: Option<&str>,
    today: NaiveDate,
) -> Result<DateRange, AppError> {
    let parse = |name: &str, raw: Option<&str>| -> Result<Option<NaiveDate>, AppError> {
        raw.map(|value| {
            parse_calendar_date(value)
                .ok_or_else(|| AppError::Validation(format!("Invalid {name} date '{value}'")))
        })
        .transpose()
    };
    let fallback = DateRange::trailing_days(today, DEFAULT_RANGE_DAYS);
    let range = DateRange::new(
        parse("start", start)?.unwrap_or(fallback.start),
        parse("end", end)?.unwrap_or(fallback.end),
    );
    if range.start > range.end {
        return Err(AppError::Validation(
            "Start date must not be after end date".to_string(),
        ));
    }
    Ok(range)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub state: StoreState,
    pub mode: Option<StorageMode>,
    pub verdict: IdentityVerdict,
    /// Only probed for local sessions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_storage_available: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<&'static str>,
}

/// GET /api/v1/session
pub async fn handle_get_session(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<SessionResponse>, AppError> {
    let store = state.sessions.open(&principal).await;
    let verdict = state.policy.resolve(Some(&principal));
    let local = verdict == IdentityVerdict::Standard;
    let local_storage_available = local.then(|| {
        LocalStore::for_account(&state.config.local_store_dir, &principal.uid).is_available()
    });
    Ok(Json(SessionResponse {
        state: store.state(),
        mode: store.mode().await,
        verdict,
        local_storage_available,
        warning: local.then_some(GUEST_WARNING),
    }))
}

#[derive(Deserialize)]
pub struct SignOutQuery {
    /// Also wipe the account's local namespace. Ignored for cloud accounts.
    #[serde(default)]
    pub purge: bool,
}

/// DELETE /api/v1/session
pub async fn handle_sign_out(
    State(state): State<AppState>,
    principal: Principal,
    Query(params): Query<SignOutQuery>,
) -> Result<StatusCode, AppError> {
    if state.sessions.close(&principal.uid).await {
        info!("Signed out {}", principal.uid);
    }
    if params.purge && state.policy.resolve(Some(&principal)) == IdentityVerdict::Standard {
        let local = LocalStore::for_account(&state.config.local_store_dir, &principal.uid);
        if !local.clear_all() {
            return Err(AppError::Store(StoreError::LocalWrite("impactlog-*")));
        }
        info!("Purged local data for {}", principal.uid);
    }
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/wins?preset=&category=&impactLevel=&q=
pub async fn handle_list_wins(
    State(state): State<AppState>,
    principal: Principal,
    Query(filter): Query<WinFilter>,
) -> Result<Json<Vec<Win>>, AppError> {
    let store = state.sessions.open(&principal).await;
    Ok(Json(store.filtered_wins(&filter, today()).await))
}

/// GET /api/v1/taxonomy
pub async fn handle_taxonomy() -> Json<Taxonomy> {
    Json(Taxonomy::new())
}

fn require_text(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("'{field}' must not be empty")));
    }
    Ok(())
}

/// POST /api/v1/wins
pub async fn handle_add_win(
    State(state): State<AppState>,
    principal: Principal,
    Json(draft): Json<NewWin>,
) -> Result<(StatusCode, Json<Win>), AppError> {
    require_text("situation", &draft.situation)?;
    require_text("action", &draft.action)?;
    require_text("impact", &draft.impact)?;
    let store = state.sessions.open(&principal).await;
    let win = store.add_win(draft).await?;
    Ok((StatusCode::CREATED, Json(win)))
}

/// PATCH /api/v1/wins/:id
pub async fn handle_update_win(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    Json(patch): Json<WinPatch>,
) -> Result<Json<Win>, AppError> {
    for (field, value) in [
        ("situation", &patch.situation),
        ("action", &patch.action),
        ("impact", &patch.impact),
    ] {
        if let Some(value) = value {
            require_text(field, value)?;
        }
    }
    let store = state.sessions.open(&principal).await;
    Ok(Json(store.update_win(&id, patch).await?))
}

/// DELETE /api/v1/wins/:id
pub async fn handle_delete_win(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let store = state.sessions.open(&principal).await;
    store.delete_win(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct RangeQuery {
    pub start: Option<String>,
    pub end: Option<String>,
}

/// GET /api/v1/wins/range
pub async fn handle_wins_in_range(
    State(state): State<AppState>,
    principal: Principal,
    Query(params): Query<RangeQuery>,
) -> Result<Json<Vec<Win>>, AppError> {
    let range = resolve_range(params.start.as_deref(), params.end.as_deref(), today())?;
    let store = state.sessions.open(&principal).await;
    Ok(Json(store.wins_in_range(range).await))
}

/// GET /api/v1/stats
pub async fn handle_stats(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<WinStats>, AppError> {
    let store = state.sessions.open(&principal).await;
    Ok(Json(store.stats(today()).await))
}

/// GET /api/v1/reflections
pub async fn handle_list_reflections(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<Vec<WeeklyReflection>>, AppError> {
    let store = state.sessions.open(&principal).await;
    Ok(Json(store.reflections().await))
}

/// POST /api/v1/reflections
///
/// The week key is normalized to its Monday; one reflection per week.
pub async fn handle_add_reflection(
    State(state): State<AppState>,
    principal: Principal,
    Json(mut draft): Json<NewReflection>,
) -> Result<(StatusCode, Json<WeeklyReflection>), AppError> {
    draft.week_start_date = week_start(draft.week_start_date);
    let store = state.sessions.open(&principal).await;
    if store.reflection_for_week(draft.week_start_date).await.is_some() {
        return Err(AppError::Conflict(format!(
            "A reflection for the week of {} already exists",
            draft.week_start_date
        )));
    }
    let reflection = store.add_reflection(draft).await?;
    Ok((StatusCode::CREATED, Json(reflection)))
}

/// GET /api/v1/profile
pub async fn handle_get_profile(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<UserProfile>, AppError> {
    let store = state.sessions.open(&principal).await;
    Ok(Json(store.profile().await?))
}

/// PATCH /api/v1/profile
pub async fn handle_update_profile(
    State(state): State<AppState>,
    principal: Principal,
    Json(patch): Json<ProfilePatch>,
) -> Result<Json<UserProfile>, AppError> {
    let store = state.sessions.open(&principal).await;
    Ok(Json(store.update_profile(patch).await?))
}
