//! Helpers shared by the relation loaders of the blog entities.

use serde::de::DeserializeOwned;
use serde_json::Value;

use blogdata_core::result::AppResult;
use blogdata_core::traits::store::StoredRecord;
use blogdata_core::types::id::EntityId;

fn decode<U: DeserializeOwned>(record: &StoredRecord) -> AppResult<U> {
    Ok(serde_json::from_value(record.body.clone())?)
}

/// The record with identifier `id`, if loaded.
pub(crate) fn find_by_id<U: DeserializeOwned>(
    records: &[StoredRecord],
    id: EntityId,
) -> AppResult<Option<U>> {
    records.iter().find(|r| r.id == id).map(decode).transpose()
}

/// Records whose scalar `key` equals `id`.
pub(crate) fn collect_where<U: DeserializeOwned>(
    records: &[StoredRecord],
    key: &str,
    id: EntityId,
) -> AppResult<Vec<U>> {
    records
        .iter()
        .filter(|r| r.body.get(key).and_then(Value::as_i64) == Some(id.0))
        .map(decode)
        .collect()
}

/// Records whose array `key` contains `id`.
pub(crate) fn collect_containing<U: DeserializeOwned>(
    records: &[StoredRecord],
    key: &str,
    id: EntityId,
) -> AppResult<Vec<U>> {
    records
        .iter()
        .filter(|r| {
            r.body
                .get(key)
                .and_then(Value::as_array)
                .is_some_and(|ids| ids.iter().any(|v| v.as_i64() == Some(id.0)))
        })
        .map(decode)
        .collect()
}

/// Records whose identifier is in `ids`, in `ids` order.
pub(crate) fn collect_ids<U: DeserializeOwned>(
    records: &[StoredRecord],
    ids: &[EntityId],
) -> AppResult<Vec<U>> {
    ids.iter()
        .filter_map(|id| records.iter().find(|r| r.id == *id))
        .map(decode)
        .collect()
}
