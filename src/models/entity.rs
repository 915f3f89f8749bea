use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{Account, Note, SettingsBlob, Trade};

/// The four record kinds a user can mutate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Trade,
    Account,
    Note,
    Settings,
}

impl EntityType {
    pub const ALL: [EntityType; 4] = [
        EntityType::Account,
        EntityType::Trade,
        EntityType::Note,
        EntityType::Settings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Trade => "trade",
            EntityType::Account => "account",
            EntityType::Note => "note",
            EntityType::Settings => "settings",
        }
    }

    /// Local SQLite table holding this entity type
    pub fn table(&self) -> &'static str {
        match self {
            EntityType::Trade => "trades",
            EntityType::Account => "accounts",
            EntityType::Note => "notes",
            EntityType::Settings => "settings",
        }
    }

    /// Fields a caller can never overwrite through an update patch.
    pub fn protected_fields(&self) -> &'static [&'static str] {
        match self {
            EntityType::Trade => &["id", "user_id", "created_at", "risk_amount", "pnl"],
            _ => &["id", "user_id", "created_at"],
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trade" => Ok(EntityType::Trade),
            "account" => Ok(EntityType::Account),
            "note" => Ok(EntityType::Note),
            "settings" => Ok(EntityType::Settings),
            other => Err(format!("Unknown entity type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entity_type", content = "data", rename_all = "snake_case")]
pub enum Entity {
    Trade(Trade),
    Account(Account),
    Note(Note),
    Settings(SettingsBlob),
}

impl Entity {
    pub fn entity_type(&self) -> EntityType {
        match self {
            Entity::Trade(_) => EntityType::Trade,
            Entity::Account(_) => EntityType::Account,
            Entity::Note(_) => EntityType::Note,
            Entity::Settings(_) => EntityType::Settings,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Entity::Trade(t) => &t.id,
            Entity::Account(a) => &a.id,
            Entity::Note(n) => &n.id,
            Entity::Settings(s) => &s.id,
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            Entity::Trade(t) => &t.user_id,
            Entity::Account(a) => &a.user_id,
            Entity::Note(n) => &n.user_id,
            Entity::Settings(s) => &s.user_id,
        }
    }

    pub fn updated_at(&self) -> i64 {
        match self {
            Entity::Trade(t) => t.updated_at,
            Entity::Account(a) => a.updated_at,
            Entity::Note(n) => n.updated_at,
            Entity::Settings(s) => s.updated_at,
        }
    }

    /// Serialize the inner record (without the type tag)
    pub fn to_value(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            Entity::Trade(t) => serde_json::to_value(t),
            Entity::Account(a) => serde_json::to_value(a),
            Entity::Note(n) => serde_json::to_value(n),
            Entity::Settings(s) => serde_json::to_value(s),
        }
    }

    /// Deserialize an untagged record of a known type
    pub fn from_value(entity_type: EntityType, value: serde_json::Value) -> serde_json::Result<Self> {
        Ok(match entity_type {
            EntityType::Trade => Entity::Trade(serde_json::from_value(value)?),
            EntityType::Account => Entity::Account(serde_json::from_value(value)?),
            EntityType::Note => Entity::Note(serde_json::from_value(value)?),
            EntityType::Settings => Entity::Settings(serde_json::from_value(value)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entity_type_string_forms() {
        for entity_type in EntityType::ALL {
            let parsed: EntityType = entity_type.as_str().parse().unwrap();
            assert_eq!(parsed, entity_type);
        }
        assert!("position".parse::<EntityType>().is_err());
    }

    #[test]
    fn test_from_value_rejects_wrong_shape() {
        let value = json!({ "id": "a-1", "user_id": "u-1" });
        assert!(Entity::from_value(EntityType::Account, value).is_err());
    }

    #[test]
    fn test_trade_derived_fields_default_when_missing() {
        let value = json!({
            "id": "t-1",
            "user_id": "u-1",
            "account_id": "a-1",
            "symbol": "BTCUSDT",
            "direction": "LONG",
            "result": "IN_PROGRESS",
            "trade_date": 1700000000,
            "risk_percent": 1.0,
            "reward_risk_ratio": 2.0,
            "created_at": 1700000000,
            "updated_at": 1700000000
        });

        let entity = Entity::from_value(EntityType::Trade, value).unwrap();
        match entity {
            Entity::Trade(trade) => {
                assert_eq!(trade.risk_amount, 0.0);
                assert_eq!(trade.pnl, 0.0);
                assert_eq!(trade.commission, None);
            }
            other => panic!("Expected trade, got {:?}", other),
        }
    }
}
