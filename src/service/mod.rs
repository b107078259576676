//! Entity service: entity CRUD and command issuance.
//!
//! Command issuance is two independent steps, with no transaction spanning
//! them:
//!
//! ```text
//! 1. datastore: add Command { status: pending }     (committed)
//! 2. broker:    publish entities/{id}/update         (may fail)
//! ```
//!
//! When step 2 fails the pending command stays stored and nothing retries the
//! publish. Callers see [`ServiceError::Unpublished`], which reports as an
//! internal error but carries the ID of the stranded command.

use crate::broker::{Broker, Message};
use crate::datastore::{Command, DataStore, DataStoreError, Entity};
use chrono::Utc;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

mod command_id;

#[cfg(test)]
mod tests;

pub use command_id::generate_command_id;

/// Service-level errors. Storage errors other than not-found and duplicate
/// collapse into `Internal`.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceError {
    EntityNotFound,
    EntityAlreadyExists,
    Internal,
    /// The command was stored as pending but its notification was not published.
    Unpublished { command_id: String },
}

impl ServiceError {
    pub fn is_internal(&self) -> bool {
        matches!(self, ServiceError::Internal | ServiceError::Unpublished { .. })
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::EntityNotFound => write!(f, "entity not found"),
            ServiceError::EntityAlreadyExists => write!(f, "entity already exists"),
            ServiceError::Internal | ServiceError::Unpublished { .. } => {
                write!(f, "internal error")
            }
        }
    }
}

impl std::error::Error for ServiceError {}

/// Logs the storage error and maps it to a service error.
fn map_storage_error(operation: &str, e: DataStoreError) -> ServiceError {
    match e {
        DataStoreError::RecordNotFound => ServiceError::EntityNotFound,
        DataStoreError::DuplicateRecord => ServiceError::EntityAlreadyExists,
        other => {
            error!(operation, error = %other, "Datastore operation failed");
            ServiceError::Internal
        }
    }
}

/// Orchestrates the datastore and broker. Built once at startup and shared.
pub struct EntityService {
    datastore: Arc<dyn DataStore>,
    broker: Arc<dyn Broker>,
}

impl EntityService {
    pub fn new(datastore: Arc<dyn DataStore>, broker: Arc<dyn Broker>) -> Self {
        Self { datastore, broker }
    }

    pub fn get_entity_by_id(&self, id: &str) -> Result<Entity, ServiceError> {
        self.datastore
            .get_entity_by_id(id)
            .map_err(|e| map_storage_error("get_entity_by_id", e))
    }

    pub fn list_entities(&self) -> Result<Vec<Entity>, ServiceError> {
        self.datastore.list_entities().map_err(|e| {
            error!(error = %e, "Failed to list entities");
            ServiceError::Internal
        })
    }

    pub fn add_entity(&self, entity: &Entity) -> Result<(), ServiceError> {
        self.datastore
            .add_entity(entity)
            .map_err(|e| map_storage_error("add_entity", e))?;

        info!(entity_id = %entity.id, name = %entity.name, "Entity added");
        Ok(())
    }

    pub fn delete_entity(&self, id: &str) -> Result<(), ServiceError> {
        self.datastore
            .delete_entity(id)
            .map_err(|e| map_storage_error("delete_entity", e))?;

        info!(entity_id = %id, "Entity deleted");
        Ok(())
    }

    /// Issues a command against an existing entity and returns its ID.
    ///
    /// The pending command is committed before the notification is
    /// published; see the module docs for the failure window.
    pub async fn process_command(
        &self,
        entity_id: &str,
        desired_state: Map<String, Value>,
    ) -> Result<String, ServiceError> {
        self.get_entity_by_id(entity_id)?;

        let payload = serde_json::to_vec(&desired_state).map_err(|e| {
            error!(entity_id = %entity_id, error = %e, "Failed to encode desired state");
            ServiceError::Internal
        })?;

        let command_id = generate_command_id();
        let command = Command::pending(&command_id, entity_id, desired_state, Utc::now());

        self.datastore.add_command(&command).map_err(|e| {
            error!(
                command_id = %command_id,
                entity_id = %entity_id,
                error = %e,
                "Failed to store command"
            );
            ServiceError::Internal
        })?;

        let topic = self.broker.format(&format!("entities/{}/update", entity_id));

        if let Err(e) = self
            .broker
            .publisher()
            .publish(&topic, Message::new(command_id.clone(), payload))
            .await
        {
            warn!(
                command_id = %command_id,
                entity_id = %entity_id,
                topic = %topic,
                error = %e,
                "Command stored as pending but notification was not published"
            );
            return Err(ServiceError::Unpublished { command_id });
        }

        info!(
            command_id = %command_id,
            entity_id = %entity_id,
            topic = %topic,
            "Command issued"
        );
        Ok(command_id)
    }
}
