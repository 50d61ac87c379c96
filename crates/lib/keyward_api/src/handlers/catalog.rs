//! Read-only catalog handlers.

use axum::Json;
use axum::extract::State;
use keyward_core::catalog::{Feature, Menu};

use crate::AppState;

/// `GET /api/catalog/features`
pub async fn features_handler(State(state): State<AppState>) -> Json<Vec<Feature>> {
    Json(state.catalog.features().to_vec())
}

/// `GET /api/catalog/menus`
pub async fn menus_handler(State(state): State<AppState>) -> Json<Vec<Menu>> {
    Json(state.catalog.menus().to_vec())
}
