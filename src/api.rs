//! HTTP surface. Assembles the per-module routers and maps errors onto
//! status codes.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tracing::debug;

use crate::error::{Error, GatewayError, InboxError, OnboardingError};
use crate::inbox::{ConversationView, InboxRouteState, inbox_routes};
use crate::inventory::{InventoryManager, inventory_routes};
use crate::notify::Notifier;
use crate::onboarding::{OnboardingManager, onboarding_routes};

/// Everything the HTTP surface serves.
#[derive(Clone)]
pub struct AppState {
    pub onboarding: Arc<OnboardingManager>,
    pub inbox: Arc<ConversationView>,
    pub inventory: Arc<InventoryManager>,
    pub notifier: Notifier,
}

/// Build the full router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(onboarding_routes(Arc::clone(&state.onboarding)))
        .merge(inbox_routes(InboxRouteState {
            view: Arc::clone(&state.inbox),
            notifier: state.notifier.clone(),
        }))
        .merge(inventory_routes(Arc::clone(&state.inventory)))
        .layer(CorsLayer::permissive())
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "careops"
    }))
}

/// Error wrapper that renders as `{"error": "..."}` with a fitting status.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Gateway(GatewayError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            Error::Gateway(GatewayError::NotFound { .. }) => StatusCode::NOT_FOUND,
            Error::Gateway(_) => StatusCode::BAD_GATEWAY,
            Error::Auth(_) => StatusCode::UNAUTHORIZED,
            Error::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::Onboarding(OnboardingError::UnknownStep(_)) => StatusCode::NOT_FOUND,
            Error::Onboarding(_) => StatusCode::CONFLICT,
            Error::Inbox(InboxError::UnknownConversation(_)) => StatusCode::NOT_FOUND,
            Error::Inbox(InboxError::BlankDraft) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::Inbox(InboxError::NoSelection) => StatusCode::CONFLICT,
            Error::PermissionDenied { .. } => StatusCode::FORBIDDEN,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        debug!(status = %status, error = %self.0, "Request failed");
        (status, Json(serde_json::json!({"error": self.0.to_string()}))).into_response()
    }
}
