use super::collection::{self, Record};
use super::SqliteDataStore;
use crate::datastore::{
    Command, CommandRepository, CommandStatus, DataStoreError, Filter, Result,
};
use chrono::Utc;
use tracing::debug;

impl Record for Command {
    const COLLECTION: &'static str = "Command";

    fn key(&self) -> String {
        self.id.clone()
    }
}

impl CommandRepository for SqliteDataStore {
    fn get_command_by_id(&self, id: &str) -> Result<Command> {
        self.with_read(|conn| collection::get(conn, id))
    }

    fn list_commands(&self, filter: &dyn Filter<Command>) -> Result<Vec<Command>> {
        self.with_read(|conn| collection::scan(conn, filter))
    }

    fn add_command(&self, command: &Command) -> Result<()> {
        if command.status.is_terminal() != command.resolved_at.is_some() {
            return Err(DataStoreError::InvalidData(format!(
                "command {} has status '{}' but resolved_at is {}",
                command.id,
                command.status,
                if command.resolved_at.is_some() { "set" } else { "absent" }
            )));
        }

        self.with_write(|conn| collection::insert(conn, command))?;
        debug!(
            command_id = %command.id,
            entity_id = %command.entity_id,
            status = %command.status,
            "Stored command"
        );
        Ok(())
    }

    fn resolve_command(&self, id: &str, status: CommandStatus) -> Result<Command> {
        if !status.is_terminal() {
            return Err(DataStoreError::InvalidData(
                "a command can only be resolved to success or failure".to_string(),
            ));
        }

        let command = self.with_write(|conn| {
            collection::update::<Command, _>(conn, id, |command| {
                if command.status.is_terminal() {
                    return Err(DataStoreError::AlreadyResolved);
                }
                command.status = status;
                command.resolved_at = Some(Utc::now());
                Ok(())
            })
        })?;

        debug!(command_id = %id, status = %status, "Resolved command");
        Ok(command)
    }

    fn delete_command(&self, id: &str) -> Result<()> {
        self.with_write(|conn| collection::remove::<Command>(conn, id))?;
        debug!(command_id = %id, "Deleted command");
        Ok(())
    }
}
