use axum::{extract::State, Json};
use serde::Deserialize;
use tracing::{info, warn};

use super::prompts::{car_user_prompt, CAR_SYSTEM_PROMPT};
use super::{parse_car, CarDraft};
use crate::errors::AppError;
use crate::identity::{IdentityVerdict, Principal};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct RewriteRequest {
    #[serde(default)]
    pub text: String,
}

/// POST /api/v1/rewrite
pub async fn handle_rewrite(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<RewriteRequest>,
) -> Result<Json<CarDraft>, AppError> {
    if state.policy.resolve(Some(&principal)) != IdentityVerdict::Privileged {
        warn!(
            "Unauthorized rewrite attempt by: {}",
            principal.email.as_deref().unwrap_or("unknown")
        );
        return Err(AppError::Forbidden);
    }

    let text = req.text.trim();
    if text.is_empty() {
        return Err(AppError::Validation(
            "The string argument 'text' is required".to_string(),
        ));
    }

    let llm = state.llm.as_ref().ok_or(AppError::LlmUnavailable)?;
    let raw = llm.generate(CAR_SYSTEM_PROMPT, &car_user_prompt(text)).await?;
    info!("Generated CAR rewrite ({} chars)", raw.len());
    Ok(Json(parse_car(&raw)))
}
