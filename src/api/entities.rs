use crate::datastore::Entity;
use crate::service::{EntityService, ServiceError};
use crate::validation::{ErrorList, Validate};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::info;

/// Shared state for the entities API
#[derive(Clone)]
pub struct ApiState {
    pub entity_service: Arc<EntityService>,
}

/// Body of POST /v1/entities. Missing fields surface as validation errors.
#[derive(Deserialize)]
struct AddEntityRequest {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
}

/// Response for accepted commands
#[derive(Serialize, Deserialize)]
pub struct CommandAccepted {
    pub command_id: String,
}

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize)]
struct ValidationErrorResponse {
    error: String,
    details: ErrorList,
}

/// Create entities API router
pub fn create_entities_router(state: ApiState) -> Router {
    Router::new()
        .route("/v1/entities", get(list_entities).post(add_entity))
        .route(
            "/v1/entities/:entity_id",
            get(get_entity_by_id).delete(delete_entity),
        )
        .route("/v1/entities/:entity_id/commands", post(new_command))
        .with_state(Arc::new(state))
}

/// GET /v1/entities - List all entities
async fn list_entities(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<Vec<Entity>>, ApiError> {
    let entities = state.entity_service.list_entities()?;
    Ok(Json(entities))
}

/// POST /v1/entities - Register an entity
async fn add_entity(
    State(state): State<Arc<ApiState>>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let request: AddEntityRequest =
        serde_json::from_slice(&body).map_err(|_| ApiError::InvalidJsonBody)?;
    let entity = Entity::new(request.id, request.name);

    let errors = entity.validate();
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    state.entity_service.add_entity(&entity)?;
    Ok(StatusCode::CREATED)
}

/// GET /v1/entities/:entity_id - Lookup entity
async fn get_entity_by_id(
    State(state): State<Arc<ApiState>>,
    Path(entity_id): Path<String>,
) -> Result<Json<Entity>, ApiError> {
    let entity = state.entity_service.get_entity_by_id(&entity_id)?;
    Ok(Json(entity))
}

/// DELETE /v1/entities/:entity_id - Delete entity
async fn delete_entity(
    State(state): State<Arc<ApiState>>,
    Path(entity_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.entity_service.delete_entity(&entity_id)?;
    Ok(StatusCode::OK)
}

/// POST /v1/entities/:entity_id/commands - Issue a command
///
/// Body is the desired state, which must be a JSON object.
async fn new_command(
    State(state): State<Arc<ApiState>>,
    Path(entity_id): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<CommandAccepted>), ApiError> {
    let desired_state: Map<String, Value> =
        serde_json::from_slice(&body).map_err(|_| ApiError::InvalidJsonBody)?;

    let command_id = state
        .entity_service
        .process_command(&entity_id, desired_state)
        .await?;

    info!(command_id = %command_id, entity_id = %entity_id, "Command accepted");

    Ok((StatusCode::ACCEPTED, Json(CommandAccepted { command_id })))
}

/// Entities API error types
#[derive(Debug)]
pub enum ApiError {
    InvalidJsonBody,
    Validation(ErrorList),
    Service(ServiceError),
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        ApiError::Service(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ApiError::InvalidJsonBody => {
                (StatusCode::BAD_REQUEST, "invalid JSON body".to_string())
            }
            ApiError::Validation(details) => {
                let body = Json(ValidationErrorResponse {
                    error: "Validation Error".to_string(),
                    details,
                });
                return (StatusCode::BAD_REQUEST, body).into_response();
            }
            ApiError::Service(e) => {
                let status = match e {
                    ServiceError::EntityNotFound => StatusCode::NOT_FOUND,
                    ServiceError::EntityAlreadyExists => StatusCode::CONFLICT,
                    ServiceError::Internal | ServiceError::Unpublished { .. } => {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                (status, e.to_string())
            }
        };

        let body = Json(ErrorResponse {
            error: error_message,
        });

        (status, body).into_response()
    }
}
