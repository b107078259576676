use super::*;
use crate::broker::MemoryBroker;
use crate::datastore::{CommandRepository, CommandStatus, EntityRepository, MatchAll, SqliteDataStore};
use serde_json::json;

struct Harness {
    service: EntityService,
    datastore: Arc<SqliteDataStore>,
    broker: Arc<MemoryBroker>,
}

fn harness() -> Harness {
    let datastore = Arc::new(SqliteDataStore::open_in_memory().unwrap());
    datastore.init().unwrap();
    let broker = Arc::new(MemoryBroker::default());

    let service = EntityService::new(datastore.clone(), broker.clone());
    Harness {
        service,
        datastore,
        broker,
    }
}

fn power_on() -> Map<String, Value> {
    json!({"power": "on"}).as_object().cloned().unwrap()
}

#[tokio::test]
async fn test_command_for_missing_entity() {
    let h = harness();

    let result = h.service.process_command("ghost-1", power_on()).await;

    assert_eq!(result, Err(ServiceError::EntityNotFound));
    assert!(h.datastore.list_commands(&MatchAll).unwrap().is_empty());
    assert!(h.broker.published().is_empty());
}

#[tokio::test]
async fn test_command_issued_and_published() {
    let h = harness();
    h.service.add_entity(&Entity::new("e1", "Lamp")).unwrap();

    let command_id = h.service.process_command("e1", power_on()).await.unwrap();
    assert!(!command_id.is_empty());

    let command = h.datastore.get_command_by_id(&command_id).unwrap();
    assert_eq!(command.entity_id, "e1");
    assert_eq!(command.status, CommandStatus::Pending);
    assert!(command.resolved_at.is_none());
    assert_eq!(command.desired_state, power_on());

    let published = h.broker.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].topic, h.broker.format("entities/e1/update"));
    assert_eq!(published[0].message.key, command_id);

    let payload: Value = serde_json::from_slice(&published[0].message.payload).unwrap();
    assert_eq!(payload, json!({"power": "on"}));
}

#[tokio::test]
async fn test_each_command_gets_a_new_id() {
    let h = harness();
    h.service.add_entity(&Entity::new("e1", "Lamp")).unwrap();

    let first = h.service.process_command("e1", power_on()).await.unwrap();
    let second = h.service.process_command("e1", power_on()).await.unwrap();

    assert_ne!(first, second);
    assert_eq!(h.datastore.list_commands(&MatchAll).unwrap().len(), 2);
    assert_eq!(h.broker.published().len(), 2);
}

#[tokio::test]
async fn test_publish_failure_leaves_pending_command() {
    let h = harness();
    h.service.add_entity(&Entity::new("e1", "Lamp")).unwrap();
    h.broker.set_available(false);

    let err = h
        .service
        .process_command("e1", power_on())
        .await
        .expect_err("publish should fail");

    assert!(err.is_internal());
    assert_eq!(err.to_string(), "internal error");

    let ServiceError::Unpublished { command_id } = err else {
        panic!("expected Unpublished, got {:?}", err);
    };

    // Committed before the publish was attempted
    let command = h.datastore.get_command_by_id(&command_id).unwrap();
    assert_eq!(command.status, CommandStatus::Pending);
    assert!(h.broker.published().is_empty());
}

#[tokio::test]
async fn test_storage_failure_publishes_nothing() {
    let h = harness();
    h.service.add_entity(&Entity::new("e1", "Lamp")).unwrap();
    h.datastore.close().unwrap();

    let result = h.service.process_command("e1", power_on()).await;

    assert_eq!(result, Err(ServiceError::Internal));
    assert!(h.broker.published().is_empty());
}

#[test]
fn test_add_and_get_entity() {
    let h = harness();
    let entity = Entity::new("e1", "Lamp");

    h.service.add_entity(&entity).unwrap();

    assert_eq!(h.service.get_entity_by_id("e1").unwrap(), entity);
    assert_eq!(h.service.list_entities().unwrap(), vec![entity]);
}

#[test]
fn test_add_duplicate_entity() {
    let h = harness();
    h.service.add_entity(&Entity::new("e1", "Lamp")).unwrap();

    assert_eq!(
        h.service.add_entity(&Entity::new("e1", "Lamp")),
        Err(ServiceError::EntityAlreadyExists)
    );
}

#[test]
fn test_delete_then_lookup() {
    let h = harness();
    h.service.add_entity(&Entity::new("e2", "X")).unwrap();

    h.service.delete_entity("e2").unwrap();

    assert_eq!(
        h.service.get_entity_by_id("e2"),
        Err(ServiceError::EntityNotFound)
    );
    assert_eq!(h.service.delete_entity("e2"), Err(ServiceError::EntityNotFound));
}

#[test]
fn test_other_storage_errors_are_internal() {
    let datastore = Arc::new(SqliteDataStore::open_in_memory().unwrap());
    // No init: every collection is missing
    let service = EntityService::new(datastore.clone(), Arc::new(MemoryBroker::default()));

    assert_eq!(service.list_entities(), Err(ServiceError::Internal));
    assert_eq!(service.get_entity_by_id("e1"), Err(ServiceError::Internal));
    assert_eq!(
        service.add_entity(&Entity::new("e1", "Lamp")),
        Err(ServiceError::Internal)
    );
    assert!(datastore.list_entities().is_err());
}
