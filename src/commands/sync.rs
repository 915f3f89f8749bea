use crate::db::{queue, sync_history, Database};
use crate::error::JournalResult;
use crate::models::{MutationRecord, SyncHistoryEntry};

/// Recent drain passes, most recent first
pub fn get_sync_history(db: &Database, limit: u32) -> JournalResult<Vec<SyncHistoryEntry>> {
    let conn = db.conn.lock()?;
    sync_history::load_sync_history(&conn, limit)
}

/// Mutations saved locally but not yet acknowledged by the remote store
pub fn get_pending_mutations(db: &Database) -> JournalResult<Vec<MutationRecord>> {
    let conn = db.conn.lock()?;
    queue::load_records(&conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityType;
    use crate::sync::DrainOutcome;
    use crate::test_helpers::{harness, note_input};

    #[tokio::test]
    async fn test_history_and_pending_views() {
        let h = harness(true);
        h.mutations.create_entity(EntityType::Note, note_input("One")).unwrap();
        h.mutations.create_entity(EntityType::Note, note_input("Two")).unwrap();

        assert_eq!(get_pending_mutations(&h.db).unwrap().len(), 2);
        assert!(get_sync_history(&h.db, 10).unwrap().is_empty());

        assert_eq!(h.engine.drain_and_sync().await, DrainOutcome::Synced { records: 2 });

        assert!(get_pending_mutations(&h.db).unwrap().is_empty());
        let history = get_sync_history(&h.db, 10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].records_attempted, 2);
        assert_eq!(history[0].records_applied, 2);
        assert!(history[0].error_message.is_none());
    }
}
