// HTTP API (axum)

pub mod entities;

pub use entities::{create_entities_router, ApiState};

use axum::Router;

/// Full `/v1` API
pub fn create_router(state: ApiState) -> Router {
    Router::new().merge(create_entities_router(state))
}
