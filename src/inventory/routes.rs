//! REST endpoints for inventory.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};

use super::{InventoryForm, InventoryManager, StockLevel};
use crate::api::ApiError;

/// GET /api/inventory
async fn list_items(
    State(manager): State<Arc<InventoryManager>>,
) -> Result<Json<Vec<StockLevel>>, ApiError> {
    Ok(Json(manager.list().await?))
}

/// POST /api/inventory
///
/// Adds an item and returns the refreshed list.
async fn add_item(
    State(manager): State<Arc<InventoryManager>>,
    Json(form): Json<InventoryForm>,
) -> Result<(StatusCode, Json<Vec<StockLevel>>), ApiError> {
    let items = manager.add(&form).await?;
    Ok((StatusCode::CREATED, Json(items)))
}

/// Build the inventory REST routes.
pub fn inventory_routes(manager: Arc<InventoryManager>) -> Router {
    Router::new()
        .route("/api/inventory", get(list_items).post(add_item))
        .with_state(manager)
}
