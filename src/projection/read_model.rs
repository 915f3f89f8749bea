//! In-memory view the UI renders from.
//!
//! Hydrated from the local store (and the queue, for pending markers)
//! before any network activity, then updated synchronously by the
//! mutation path while it still holds the projection lock. Remote state
//! is never read back into it.

use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::{RwLock, RwLockWriteGuard};

use crate::calculator::round_currency;
use crate::db::{queue, store, Database};
use crate::error::JournalResult;
use crate::models::{Account, Entity, EntityType, MutationRecord, Note, SettingsBlob, Trade};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountView {
    #[serde(flatten)]
    pub account: Account,
    /// Initial balance plus the pnl of every trade in the account
    pub current_balance: f64,
}

/// Entity that has a local change the remote store has not acknowledged
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PendingEntity {
    pub entity_type: EntityType,
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReadModel {
    pub trades: Vec<Trade>,
    pub accounts: Vec<AccountView>,
    pub notes: Vec<Note>,
    pub settings: Option<SettingsBlob>,
    pub pending: Vec<PendingEntity>,
}

impl ReadModel {
    pub fn trade(&self, id: &str) -> Option<&Trade> {
        self.trades.iter().find(|t| t.id == id)
    }

    pub fn account(&self, id: &str) -> Option<&AccountView> {
        self.accounts.iter().find(|a| a.account.id == id)
    }

    pub fn note(&self, id: &str) -> Option<&Note> {
        self.notes.iter().find(|n| n.id == id)
    }

    pub fn is_pending(&self, entity_type: EntityType, id: &str) -> bool {
        self.pending
            .iter()
            .any(|p| p.entity_type == entity_type && p.id == id)
    }
}

/// Mutable state behind the projector lock. Records keep first-insert
/// order, like the local store.
#[derive(Debug, Default)]
pub struct ProjectionState {
    trades: Vec<Trade>,
    accounts: Vec<Account>,
    notes: Vec<Note>,
    settings: Vec<SettingsBlob>,
    pending: BTreeSet<PendingEntity>,
}

fn upsert_by_id<T>(items: &mut Vec<T>, item: T, id_of: impl Fn(&T) -> &str) {
    match items.iter().position(|existing| id_of(existing) == id_of(&item)) {
        Some(index) => items[index] = item,
        None => items.push(item),
    }
}

impl ProjectionState {
    pub fn apply_upsert(&mut self, entity: Entity) {
        match entity {
            Entity::Trade(trade) => upsert_by_id(&mut self.trades, trade, |t| t.id.as_str()),
            Entity::Account(account) => upsert_by_id(&mut self.accounts, account, |a| a.id.as_str()),
            Entity::Note(note) => upsert_by_id(&mut self.notes, note, |n| n.id.as_str()),
            Entity::Settings(settings) => upsert_by_id(&mut self.settings, settings, |s| s.id.as_str()),
        }
    }

    pub fn apply_delete(&mut self, entity_type: EntityType, id: &str) {
        match entity_type {
            EntityType::Trade => self.trades.retain(|t| t.id != id),
            EntityType::Account => self.accounts.retain(|a| a.id != id),
            EntityType::Note => self.notes.retain(|n| n.id != id),
            EntityType::Settings => self.settings.retain(|s| s.id != id),
        }
    }

    pub fn mark_pending(&mut self, entity_type: EntityType, id: &str) {
        self.pending.insert(PendingEntity {
            entity_type,
            id: id.to_string(),
        });
    }

    fn set_pending(&mut self, records: &[MutationRecord]) {
        self.pending = records
            .iter()
            .map(|record| PendingEntity {
                entity_type: record.entity_type,
                id: record.entity_id.clone(),
            })
            .collect();
    }

    fn to_read_model(&self) -> ReadModel {
        let accounts = self
            .accounts
            .iter()
            .map(|account| {
                let trades_pnl: f64 = self
                    .trades
                    .iter()
                    .filter(|t| t.account_id == account.id)
                    .map(|t| t.pnl)
                    .sum();
                AccountView {
                    account: account.clone(),
                    current_balance: round_currency(account.initial_balance + trades_pnl),
                }
            })
            .collect();

        ReadModel {
            trades: self.trades.clone(),
            accounts,
            notes: self.notes.clone(),
            // Most recently updated wins if the store ever holds more than one
            settings: self.settings.iter().max_by_key(|s| s.updated_at).cloned(),
            pending: self.pending.iter().cloned().collect(),
        }
    }
}

#[derive(Default)]
pub struct ReadModelProjector {
    state: RwLock<ProjectionState>,
}

impl ReadModelProjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the projection with what the local store holds. Touches
    /// nothing but the database.
    pub fn hydrate(&self, db: &Database) -> JournalResult<()> {
        let mut state = self.state.write()?;
        let conn = db.conn.lock()?;

        let mut fresh = ProjectionState::default();
        for entity_type in EntityType::ALL {
            for entity in store::get_all_entities(&conn, entity_type)? {
                fresh.apply_upsert(entity);
            }
        }
        fresh.set_pending(&queue::load_records(&conn)?);

        log::info!(
            "Hydrated read model: {} trades, {} accounts, {} notes, {} pending",
            fresh.trades.len(),
            fresh.accounts.len(),
            fresh.notes.len(),
            fresh.pending.len()
        );

        *state = fresh;
        Ok(())
    }

    /// Exclusive access for the mutation path. Lock order is projector
    /// first, then the database connection.
    pub fn write(&self) -> JournalResult<RwLockWriteGuard<'_, ProjectionState>> {
        Ok(self.state.write()?)
    }

    /// Recompute pending markers from whatever is still queued
    pub fn refresh_pending(&self, db: &Database) -> JournalResult<()> {
        let mut state = self.state.write()?;
        let conn = db.conn.lock()?;
        state.set_pending(&queue::load_records(&conn)?);
        Ok(())
    }

    pub fn snapshot(&self) -> JournalResult<ReadModel> {
        Ok(self.state.read()?.to_read_model())
    }
}
