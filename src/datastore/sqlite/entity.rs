use super::collection::{self, Record};
use super::SqliteDataStore;
use crate::datastore::{Entity, EntityRepository, MatchAll, Result};
use tracing::debug;

impl Record for Entity {
    const COLLECTION: &'static str = "Entity";

    fn key(&self) -> String {
        self.id.clone()
    }
}

impl EntityRepository for SqliteDataStore {
    fn get_entity_by_id(&self, id: &str) -> Result<Entity> {
        self.with_read(|conn| collection::get(conn, id))
    }

    fn list_entities(&self) -> Result<Vec<Entity>> {
        self.with_read(|conn| collection::scan::<Entity>(conn, &MatchAll))
    }

    fn add_entity(&self, entity: &Entity) -> Result<()> {
        self.with_write(|conn| collection::insert(conn, entity))?;
        debug!(entity_id = %entity.id, "Stored entity");
        Ok(())
    }

    fn delete_entity(&self, id: &str) -> Result<()> {
        self.with_write(|conn| collection::remove::<Entity>(conn, id))?;
        debug!(entity_id = %id, "Deleted entity");
        Ok(())
    }
}
