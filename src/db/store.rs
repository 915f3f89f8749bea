//! Durable local store: one table per entity type, keyed by id.
//!
//! The free functions take a `&Connection` so the mutation path can run
//! them inside the same transaction as the queue append. `LocalStore`
//! wraps them for callers that just want the locked, one-shot version.

use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Arc;

use crate::db::Database;
use crate::error::JournalResult;
use crate::models::{Entity, EntityType};

/// Upsert by id. Writing the same id twice overwrites.
pub fn put_entity(conn: &Connection, entity: &Entity) -> JournalResult<()> {
    let data = entity.to_value()?.to_string();

    match entity {
        Entity::Trade(trade) => {
            conn.execute(
                "INSERT INTO trades (id, user_id, account_id, pnl, data, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    user_id = excluded.user_id,
                    account_id = excluded.account_id,
                    pnl = excluded.pnl,
                    data = excluded.data,
                    updated_at = excluded.updated_at",
                params![
                    trade.id,
                    trade.user_id,
                    trade.account_id,
                    trade.pnl,
                    data,
                    trade.updated_at
                ],
            )?;
        }
        _ => {
            // Table name comes from EntityType, never from input
            let sql = format!(
                "INSERT INTO {} (id, user_id, data, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                    user_id = excluded.user_id,
                    data = excluded.data,
                    updated_at = excluded.updated_at",
                entity.entity_type().table()
            );
            conn.execute(
                &sql,
                params![entity.id(), entity.user_id(), data, entity.updated_at()],
            )?;
        }
    }

    Ok(())
}

pub fn get_entity(
    conn: &Connection,
    entity_type: EntityType,
    id: &str,
) -> JournalResult<Option<Entity>> {
    let sql = format!("SELECT data FROM {} WHERE id = ?", entity_type.table());
    let data: Option<String> = conn
        .query_row(&sql, [id], |row| row.get(0))
        .optional()?;

    match data {
        Some(data) => {
            let value: serde_json::Value = serde_json::from_str(&data)?;
            Ok(Some(Entity::from_value(entity_type, value)?))
        }
        None => Ok(None),
    }
}

/// All records of one type, in first-insert order
pub fn get_all_entities(conn: &Connection, entity_type: EntityType) -> JournalResult<Vec<Entity>> {
    let sql = format!("SELECT data FROM {} ORDER BY rowid", entity_type.table());
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|data| -> JournalResult<Entity> {
            let value: serde_json::Value = serde_json::from_str(&data)?;
            Ok(Entity::from_value(entity_type, value)?)
        })
        .collect()
}

/// Delete by id. Returns whether a row existed; a missing id is not an error.
pub fn delete_entity(conn: &Connection, entity_type: EntityType, id: &str) -> JournalResult<bool> {
    let sql = format!("DELETE FROM {} WHERE id = ?", entity_type.table());
    let removed = conn.execute(&sql, [id])?;
    Ok(removed > 0)
}

/// Current balance of an account: initial balance plus the pnl of its
/// trades, optionally leaving one trade out. `None` if the account does
/// not exist.
pub fn account_balance(
    conn: &Connection,
    account_id: &str,
    excluding_trade: Option<&str>,
) -> JournalResult<Option<f64>> {
    let initial_balance = match get_entity(conn, EntityType::Account, account_id)? {
        Some(Entity::Account(account)) => account.initial_balance,
        _ => return Ok(None),
    };

    let trades_pnl: f64 = conn.query_row(
        "SELECT COALESCE(SUM(pnl), 0.0) FROM trades
         WHERE account_id = ?1 AND (?2 IS NULL OR id != ?2)",
        params![account_id, excluding_trade],
        |row| row.get(0),
    )?;

    Ok(Some(initial_balance + trades_pnl))
}

/// Locked, one-call-per-operation access to the entity tables
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<Database>,
}

impl LocalStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn put(&self, entity: &Entity) -> JournalResult<()> {
        let conn = self.db.conn.lock()?;
        put_entity(&conn, entity)
    }

    pub fn get(&self, entity_type: EntityType, id: &str) -> JournalResult<Option<Entity>> {
        let conn = self.db.conn.lock()?;
        get_entity(&conn, entity_type, id)
    }

    pub fn get_all(&self, entity_type: EntityType) -> JournalResult<Vec<Entity>> {
        let conn = self.db.conn.lock()?;
        get_all_entities(&conn, entity_type)
    }

    pub fn delete(&self, entity_type: EntityType, id: &str) -> JournalResult<()> {
        let conn = self.db.conn.lock()?;
        delete_entity(&conn, entity_type, id)?;
        Ok(())
    }

    pub fn account_balance(&self, account_id: &str) -> JournalResult<Option<f64>> {
        let conn = self.db.conn.lock()?;
        account_balance(&conn, account_id, None)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{Account, Direction, Note, Trade, TradeResult};

    pub(crate) fn account(id: &str, initial_balance: f64) -> Account {
        Account {
            id: id.to_string(),
            user_id: "user-1".to_string(),
            name: format!("Account {}", id),
            initial_balance,
            currency: "USD".to_string(),
            created_at: 1_700_000_000,
            updated_at: 1_700_000_000,
        }
    }

    pub(crate) fn trade(id: &str, account_id: &str, pnl: f64) -> Trade {
        Trade {
            id: id.to_string(),
            user_id: "user-1".to_string(),
            account_id: account_id.to_string(),
            symbol: "BTCUSDT".to_string(),
            direction: Direction::Long,
            result: TradeResult::Win,
            trade_date: 1_700_000_000,
            risk_percent: 1.0,
            reward_risk_ratio: 2.0,
            commission: None,
            risk_amount: 100.0,
            pnl,
            notes: String::new(),
            created_at: 1_700_000_000,
            updated_at: 1_700_000_000,
        }
    }

    fn store() -> LocalStore {
        LocalStore::new(Arc::new(Database::open_in_memory().unwrap()))
    }

    #[test]
    fn test_put_twice_overwrites() {
        let store = store();
        let mut acc = account("acc-1", 10_000.0);
        store.put(&Entity::Account(acc.clone())).unwrap();

        acc.name = "Renamed".to_string();
        store.put(&Entity::Account(acc.clone())).unwrap();

        let all = store.get_all(EntityType::Account).unwrap();
        assert_eq!(all, vec![Entity::Account(acc)]);
    }

    #[test]
    fn test_delete_missing_id_is_noop() {
        let store = store();
        store.delete(EntityType::Note, "does-not-exist").unwrap();
        assert!(store.get_all(EntityType::Note).unwrap().is_empty());
    }

    #[test]
    fn test_get_all_is_scoped_by_type() {
        let store = store();
        store.put(&Entity::Account(account("acc-1", 1_000.0))).unwrap();
        store
            .put(&Entity::Note(Note {
                id: "note-1".to_string(),
                user_id: "user-1".to_string(),
                title: "Plan".to_string(),
                content: "Wait for the retest".to_string(),
                trade_id: None,
                created_at: 1,
                updated_at: 1,
            }))
            .unwrap();

        assert_eq!(store.get_all(EntityType::Account).unwrap().len(), 1);
        assert_eq!(store.get_all(EntityType::Note).unwrap().len(), 1);
        assert!(store.get_all(EntityType::Trade).unwrap().is_empty());
        assert!(store.get(EntityType::Account, "note-1").unwrap().is_none());
    }

    #[test]
    fn test_account_balance_sums_trade_pnl() {
        let store = store();
        store.put(&Entity::Account(account("acc-1", 10_000.0))).unwrap();
        store.put(&Entity::Trade(trade("t-1", "acc-1", 200.0))).unwrap();
        store.put(&Entity::Trade(trade("t-2", "acc-1", -50.0))).unwrap();
        store.put(&Entity::Trade(trade("t-3", "acc-2", 999.0))).unwrap();

        assert_eq!(store.account_balance("acc-1").unwrap(), Some(10_150.0));

        let conn = store.db.conn.lock().unwrap();
        assert_eq!(account_balance(&conn, "acc-1", Some("t-1")).unwrap(), Some(9_950.0));
        assert_eq!(account_balance(&conn, "acc-2", None).unwrap(), None);
    }

    #[test]
    fn test_entities_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.db");
        let path = path.to_str().unwrap();

        {
            let store = LocalStore::new(Arc::new(Database::new(path).unwrap()));
            store.put(&Entity::Account(account("acc-1", 5_000.0))).unwrap();
            store.put(&Entity::Trade(trade("t-1", "acc-1", 42.0))).unwrap();
        }

        let store = LocalStore::new(Arc::new(Database::new(path).unwrap()));
        assert_eq!(store.get_all(EntityType::Trade).unwrap().len(), 1);
        assert_eq!(store.account_balance("acc-1").unwrap(), Some(5_042.0));
    }
}
