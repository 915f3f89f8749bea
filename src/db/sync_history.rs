use rusqlite::{params, Connection};

use crate::error::JournalResult;
use crate::models::SyncHistoryEntry;

pub fn insert_sync_history(conn: &Connection, entry: &SyncHistoryEntry) -> JournalResult<()> {
    conn.execute(
        "INSERT INTO sync_history
            (id, started_at, finished_at, status, records_attempted, records_applied, error_message)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            entry.id,
            entry.started_at,
            entry.finished_at,
            entry.status,
            entry.records_attempted,
            entry.records_applied,
            entry.error_message
        ],
    )?;
    Ok(())
}

/// Most recent passes first
pub fn load_sync_history(conn: &Connection, limit: u32) -> JournalResult<Vec<SyncHistoryEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, started_at, finished_at, status, records_attempted, records_applied, error_message
         FROM sync_history
         ORDER BY started_at DESC, rowid DESC
         LIMIT ?",
    )?;

    let entries = stmt
        .query_map([limit], |row| {
            Ok(SyncHistoryEntry {
                id: row.get(0)?,
                started_at: row.get(1)?,
                finished_at: row.get(2)?,
                status: row.get(3)?,
                records_attempted: row.get(4)?,
                records_applied: row.get(5)?,
                error_message: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(entries)
}
