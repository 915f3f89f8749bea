use rusqlite::Connection;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::calculator::apply_derived_fields;
use crate::db::{queue, store, Database};
use crate::error::{JournalError, JournalResult};
use crate::models::{Entity, EntityType, MutationOperation, MutationRecord};
use crate::projection::ReadModelProjector;
use crate::sync::SyncTrigger;

/// Local mutation path.
///
/// Every call validates, writes the entity and its queue record in one
/// transaction, updates the read model, then nudges the scheduler. It
/// never waits on the network: once a call returns `Ok`, the change is
/// durable locally whatever happens to connectivity afterwards.
pub struct MutationApi {
    db: Arc<Database>,
    projector: Arc<ReadModelProjector>,
    sync_tx: mpsc::UnboundedSender<SyncTrigger>,
    user_id: String,
}

fn payload_object(entity_type: EntityType, data: Value) -> JournalResult<Map<String, Value>> {
    match data {
        Value::Object(fields) => Ok(fields),
        other => Err(JournalError::validation(
            entity_type,
            format!("expected a JSON object, got {}", other),
        )),
    }
}

fn parse_entity(entity_type: EntityType, fields: Map<String, Value>) -> JournalResult<Entity> {
    Entity::from_value(entity_type, Value::Object(fields))
        .map_err(|e| JournalError::validation(entity_type, e.to_string()))
}

fn require_finite(entity_type: EntityType, field: &str, value: f64) -> JournalResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(JournalError::validation(
            entity_type,
            format!("{} must be a finite number, got {}", field, value),
        ))
    }
}

/// Amounts must survive a JSON round trip: a non-finite f64 serializes
/// as `null` and the row could never be read back.
fn validate_amounts(entity: &Entity) -> JournalResult<()> {
    match entity {
        Entity::Account(account) => {
            require_finite(EntityType::Account, "initial_balance", account.initial_balance)
        }
        Entity::Trade(trade) => {
            require_finite(EntityType::Trade, "risk_percent", trade.risk_percent)?;
            require_finite(EntityType::Trade, "reward_risk_ratio", trade.reward_risk_ratio)?;
            if let Some(commission) = trade.commission {
                require_finite(EntityType::Trade, "commission", commission)?;
            }
            Ok(())
        }
        Entity::Note(_) | Entity::Settings(_) => Ok(()),
    }
}

/// Compute risk amount and pnl from the account's balance before this
/// trade. The account must exist locally.
fn derive_trade_fields(conn: &Connection, entity: &mut Entity) -> JournalResult<()> {
    if let Entity::Trade(trade) = entity {
        let balance = store::account_balance(conn, &trade.account_id, Some(&trade.id))?
            .ok_or_else(|| JournalError::Reference {
                entity_type: EntityType::Account,
                id: trade.account_id.clone(),
            })?;
        apply_derived_fields(trade, balance);
        require_finite(EntityType::Trade, "risk_amount", trade.risk_amount)?;
        require_finite(EntityType::Trade, "pnl", trade.pnl)?;
    }
    Ok(())
}

impl MutationApi {
    pub fn new(
        db: Arc<Database>,
        projector: Arc<ReadModelProjector>,
        sync_tx: mpsc::UnboundedSender<SyncTrigger>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            db,
            projector,
            sync_tx,
            user_id: user_id.into(),
        }
    }

    /// Create a record. A missing or empty `id` gets a fresh uuid; the
    /// user id and timestamps are always stamped here.
    pub fn create_entity(&self, entity_type: EntityType, data: Value) -> JournalResult<Entity> {
        let mut fields = payload_object(entity_type, data)?;

        let id = fields
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let now = chrono::Utc::now().timestamp();

        fields.insert("id".to_string(), Value::from(id.clone()));
        fields.insert("user_id".to_string(), Value::from(self.user_id.clone()));
        fields.insert("created_at".to_string(), Value::from(now));
        fields.insert("updated_at".to_string(), Value::from(now));

        let mut entity = parse_entity(entity_type, fields)?;
        validate_amounts(&entity)?;

        let mut state = self.projector.write()?;
        let mut conn = self.db.conn.lock()?;
        let tx = conn.transaction()?;

        if store::get_entity(&tx, entity_type, &id)?.is_some() {
            return Err(JournalError::validation(
                entity_type,
                format!("{} already exists", id),
            ));
        }
        // One settings blob per user; later changes are updates to it
        if entity_type == EntityType::Settings
            && !store::get_all_entities(&tx, EntityType::Settings)?.is_empty()
        {
            return Err(JournalError::validation(
                entity_type,
                "settings already exist, update them instead",
            ));
        }

        derive_trade_fields(&tx, &mut entity)?;
        store::put_entity(&tx, &entity)?;
        queue::append_record(
            &tx,
            &MutationRecord::new(entity_type, MutationOperation::Create, &id, entity.to_value()?),
        )?;
        tx.commit()?;
        drop(conn);

        state.apply_upsert(entity.clone());
        state.mark_pending(entity_type, &id);
        drop(state);

        log::debug!("Created {} {}", entity_type, id);
        self.notify_scheduler();
        Ok(entity)
    }

    /// Merge `data` over the stored record. Protected fields in the patch
    /// are ignored.
    pub fn update_entity(&self, entity_type: EntityType, id: &str, data: Value) -> JournalResult<Entity> {
        let patch = payload_object(entity_type, data)?;

        let mut state = self.projector.write()?;
        let mut conn = self.db.conn.lock()?;
        let tx = conn.transaction()?;

        let existing = store::get_entity(&tx, entity_type, id)?.ok_or_else(|| JournalError::NotFound {
            entity_type,
            id: id.to_string(),
        })?;

        let mut fields = payload_object(entity_type, existing.to_value()?)?;
        let protected = entity_type.protected_fields();
        for (key, value) in patch {
            if protected.contains(&key.as_str()) {
                log::debug!("Ignoring protected field {} on {} {}", key, entity_type, id);
                continue;
            }
            fields.insert(key, value);
        }
        fields.insert(
            "updated_at".to_string(),
            Value::from(chrono::Utc::now().timestamp()),
        );

        let mut entity = parse_entity(entity_type, fields)?;
        validate_amounts(&entity)?;
        derive_trade_fields(&tx, &mut entity)?;
        store::put_entity(&tx, &entity)?;
        queue::append_record(
            &tx,
            &MutationRecord::new(entity_type, MutationOperation::Update, id, entity.to_value()?),
        )?;
        tx.commit()?;
        drop(conn);

        state.apply_upsert(entity.clone());
        state.mark_pending(entity_type, id);
        drop(state);

        log::debug!("Updated {} {}", entity_type, id);
        self.notify_scheduler();
        Ok(entity)
    }

    /// Delete by id. An id that is not stored locally is still queued so
    /// the remote copy goes too.
    pub fn delete_entity(&self, entity_type: EntityType, id: &str) -> JournalResult<()> {
        if id.trim().is_empty() {
            return Err(JournalError::validation(entity_type, "id must not be empty"));
        }

        let mut state = self.projector.write()?;
        let mut conn = self.db.conn.lock()?;
        let tx = conn.transaction()?;

        let existed = store::delete_entity(&tx, entity_type, id)?;
        queue::append_record(&tx, &MutationRecord::delete(entity_type, id))?;
        tx.commit()?;
        drop(conn);

        state.apply_delete(entity_type, id);
        state.mark_pending(entity_type, id);
        drop(state);

        if existed {
            log::debug!("Deleted {} {}", entity_type, id);
        } else {
            log::debug!("Queued delete for {} {} not stored locally", entity_type, id);
        }
        self.notify_scheduler();
        Ok(())
    }

    fn notify_scheduler(&self) {
        if self.sync_tx.send(SyncTrigger::MutationCommitted).is_err() {
            log::debug!("Sync scheduler not running, mutation stays queued");
        }
    }
}
