use crate::api::client::{RemoteOperation, RemoteRow};
use crate::api::error::ApiError;
use crate::models::{EntityType, MutationOperation, MutationRecord};

/// Remote table for an entity type
pub fn remote_table(entity_type: EntityType) -> &'static str {
    match entity_type {
        EntityType::Trade => "trades",
        EntityType::Account => "accounts",
        EntityType::Note => "notes",
        EntityType::Settings => "user_settings",
    }
}

/// Map a queued mutation to the remote operation that replays it.
///
/// Rows are always stamped with the syncing user's id, whatever the
/// payload says, so a replay can only ever write into that user's scope.
pub fn map_record_to_operation(
    record: &MutationRecord,
    user_id: &str,
) -> Result<RemoteOperation, ApiError> {
    let table = remote_table(record.entity_type).to_string();

    match record.operation {
        MutationOperation::Delete => Ok(RemoteOperation::Delete {
            table,
            id: record.entity_id.clone(),
        }),
        MutationOperation::Create | MutationOperation::Update => {
            let mut row = record
                .payload
                .as_object()
                .cloned()
                .ok_or_else(|| {
                    ApiError::ParseError(format!(
                        "Mutation {} payload for {} {} is not an object",
                        record.id, record.entity_type, record.entity_id
                    ))
                })?;

            row.insert("id".to_string(), record.entity_id.clone().into());
            row.insert("user_id".to_string(), user_id.into());

            // The settings blob is stored under a single json column remotely
            if record.entity_type == EntityType::Settings {
                if let Some(values) = row.remove("values") {
                    row.insert("settings".to_string(), values);
                }
            }

            row.insert("client_updated_at".to_string(), record.timestamp.into());

            Ok(RemoteOperation::Upsert(RemoteRow {
                table,
                id: record.entity_id.clone(),
                row: serde_json::Value::Object(row),
            }))
        }
    }
}
