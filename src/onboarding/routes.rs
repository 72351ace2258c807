//! REST endpoints for the setup wizard.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};

use super::manager::OnboardingManager;
use super::model::{AdvanceOutcome, FormInput, WizardStatus};
use crate::api::ApiError;

/// GET /api/onboarding
///
/// Current step, stepper indicators, and form contents.
async fn get_status(State(manager): State<Arc<OnboardingManager>>) -> Json<WizardStatus> {
    Json(manager.status().await)
}

/// PUT /api/onboarding/forms
async fn update_form(
    State(manager): State<Arc<OnboardingManager>>,
    Json(input): Json<FormInput>,
) -> Json<WizardStatus> {
    manager.update_form(input).await;
    Json(manager.status().await)
}

/// POST /api/onboarding/advance
async fn advance(
    State(manager): State<Arc<OnboardingManager>>,
) -> Result<Json<AdvanceOutcome>, ApiError> {
    Ok(Json(manager.save_and_advance().await?))
}

async fn skip(
    State(manager): State<Arc<OnboardingManager>>,
) -> Result<Json<WizardStatus>, ApiError> {
    manager.skip().await?;
    Ok(Json(manager.status().await))
}

async fn back(
    State(manager): State<Arc<OnboardingManager>>,
) -> Result<Json<WizardStatus>, ApiError> {
    manager.back().await?;
    Ok(Json(manager.status().await))
}

/// POST /api/onboarding/steps/{id}
///
/// Select a completed or current step; locked steps answer 409.
async fn jump_to(
    State(manager): State<Arc<OnboardingManager>>,
    Path(id): Path<u8>,
) -> Result<Json<WizardStatus>, ApiError> {
    manager.jump_to(id).await?;
    Ok(Json(manager.status().await))
}

/// Build the onboarding REST routes.
pub fn onboarding_routes(manager: Arc<OnboardingManager>) -> Router {
    Router::new()
        .route("/api/onboarding", get(get_status))
        .route("/api/onboarding/forms", put(update_form))
        .route("/api/onboarding/advance", post(advance))
        .route("/api/onboarding/skip", post(skip))
        .route("/api/onboarding/back", post(back))
        .route("/api/onboarding/steps/{id}", post(jump_to))
        .with_state(manager)
}
