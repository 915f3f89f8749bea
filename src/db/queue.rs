//! Durable FIFO of mutations not yet acknowledged by the remote store.
//!
//! Records are only ever removed after a successful drain, never one at a
//! time. `seq` comes from an AUTOINCREMENT key and is never reused, which
//! lets the sync engine clear exactly the records it snapshotted while
//! anything appended during the drain stays queued.

use rusqlite::{params, Connection};
use std::sync::Arc;

use crate::db::Database;
use crate::error::{JournalError, JournalResult};
use crate::models::{EntityType, MutationOperation, MutationRecord};

/// Append a record and return its queue position
pub fn append_record(conn: &Connection, record: &MutationRecord) -> JournalResult<i64> {
    conn.execute(
        "INSERT INTO mutation_queue (id, entity_type, operation, entity_id, payload, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            record.id,
            record.entity_type.as_str(),
            record.operation.as_str(),
            record.entity_id,
            record.payload.to_string(),
            record.timestamp
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Every queued record in append order, without removing anything
pub fn load_records(conn: &Connection) -> JournalResult<Vec<MutationRecord>> {
    let mut stmt = conn.prepare(
        "SELECT seq, id, entity_type, operation, entity_id, payload, timestamp
         FROM mutation_queue ORDER BY seq ASC",
    )?;

    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, i64>(6)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(seq, id, entity_type, operation, entity_id, payload, timestamp)| -> JournalResult<MutationRecord> {
            let entity_type: EntityType = entity_type.parse().map_err(corrupt_row)?;
            let operation: MutationOperation = operation.parse().map_err(corrupt_row)?;
            Ok(MutationRecord {
                id,
                seq,
                entity_type,
                operation,
                entity_id,
                payload: serde_json::from_str(&payload)?,
                timestamp,
            })
        })
        .collect()
}

pub fn clear_records(conn: &Connection) -> JournalResult<usize> {
    Ok(conn.execute("DELETE FROM mutation_queue", [])?)
}

/// Remove records up to and including `seq`
pub fn clear_records_through(conn: &Connection, seq: i64) -> JournalResult<usize> {
    Ok(conn.execute("DELETE FROM mutation_queue WHERE seq <= ?", [seq])?)
}

pub fn count_records(conn: &Connection) -> JournalResult<usize> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM mutation_queue", [], |row| row.get(0))?;
    Ok(count as usize)
}

fn corrupt_row(message: String) -> JournalError {
    JournalError::Database(rusqlite::Error::InvalidColumnType(
        0,
        message,
        rusqlite::types::Type::Text,
    ))
}

#[derive(Clone)]
pub struct MutationQueue {
    db: Arc<Database>,
}

impl MutationQueue {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn append(&self, record: &MutationRecord) -> JournalResult<i64> {
        let conn = self.db.conn.lock()?;
        append_record(&conn, record)
    }

    /// Snapshot of the queue. Nothing is removed.
    pub fn drain(&self) -> JournalResult<Vec<MutationRecord>> {
        let conn = self.db.conn.lock()?;
        load_records(&conn)
    }

    pub fn clear(&self) -> JournalResult<()> {
        let conn = self.db.conn.lock()?;
        let removed = clear_records(&conn)?;
        log::debug!("Cleared {} queued mutations", removed);
        Ok(())
    }

    pub fn clear_through(&self, seq: i64) -> JournalResult<usize> {
        let conn = self.db.conn.lock()?;
        clear_records_through(&conn, seq)
    }

    pub fn len(&self) -> JournalResult<usize> {
        let conn = self.db.conn.lock()?;
        count_records(&conn)
    }

    pub fn is_empty(&self) -> JournalResult<bool> {
        Ok(self.len()? == 0)
    }
}
