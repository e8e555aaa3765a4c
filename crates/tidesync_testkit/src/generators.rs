//! Property-based test generators using proptest.
//!
//! Record batches produced here have unique identifiers, so applying a
//! batch in any order ends in the same store contents.

use proptest::prelude::*;
use serde_json::Value;
use tidesync_protocol::{Attributes, RemoteRecord, DELETED_KEY, ID_KEY, UPDATED_AT_KEY};

/// Strategy for generating timestamps in a small range so that collisions
/// and reorderings actually happen.
pub fn timestamp_strategy() -> impl Strategy<Value = i64> {
    0i64..10_000
}

/// Strategy for generating valid record identifiers.
pub fn record_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z0-9]{1,12}").expect("Invalid regex")
}

/// Strategy for generating valid entity names (also valid storage paths).
pub fn entity_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,15}").expect("Invalid regex")
}

/// Strategy for generating attribute values.
pub fn json_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        prop::string::string_regex("[ -~]{0,16}")
            .expect("Invalid regex")
            .prop_map(Value::String),
    ]
}

/// Strategy for generating attributes that never use an envelope key.
pub fn attributes_strategy() -> impl Strategy<Value = Attributes> {
    prop::collection::btree_map(
        prop::string::string_regex("[a-z]{1,8}")
            .expect("Invalid regex")
            .prop_filter("Attribute key must not be an envelope key", |k| {
                k != ID_KEY && k != UPDATED_AT_KEY && k != DELETED_KEY
            }),
        json_value_strategy(),
        0..5,
    )
}

/// Strategy for generating one record of `entity`.
pub fn remote_record_strategy(entity: &str) -> impl Strategy<Value = RemoteRecord> {
    let entity = entity.to_string();
    (
        record_id_strategy(),
        timestamp_strategy(),
        attributes_strategy(),
        prop::bool::weighted(0.2),
    )
        .prop_map(move |(id, ts, attributes, deleted)| {
            if deleted {
                RemoteRecord::tombstone(entity.as_str(), id, ts)
            } else {
                RemoteRecord::upsert(entity.as_str(), id, ts, attributes)
            }
        })
}

/// Strategy for generating up to `max_len` live records of `entity` with
/// unique identifiers, in arbitrary order.
pub fn record_batch_strategy(
    entity: &str,
    max_len: usize,
) -> impl Strategy<Value = Vec<RemoteRecord>> {
    let entity = entity.to_string();
    prop::collection::btree_map(
        record_id_strategy(),
        (timestamp_strategy(), attributes_strategy()),
        0..=max_len,
    )
    .prop_map(move |entries| {
        entries
            .into_iter()
            .map(|(id, (ts, attributes))| RemoteRecord::upsert(entity.as_str(), id, ts, attributes))
            .collect::<Vec<_>>()
    })
    .prop_shuffle()
}
