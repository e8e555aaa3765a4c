//! Remote records and explicit entity bundles.

use crate::error::{ProtocolError, ProtocolResult};
use crate::types::{Attributes, RecordId, Timestamp};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Envelope key holding the record identifier.
pub const ID_KEY: &str = "id";
/// Envelope key holding the last-updated timestamp.
pub const UPDATED_AT_KEY: &str = "updated_at";
/// Envelope key holding the deletion flag.
pub const DELETED_KEY: &str = "deleted";

/// One record as delivered by the remote server.
///
/// Records are received from a transport (or supplied by the caller in an
/// [`EntityPayload`]) and are never mutated by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRecord {
    /// Entity type the record belongs to.
    pub entity_name: String,
    /// Identifier within the entity type.
    pub identifier: RecordId,
    /// Field values, excluding the envelope keys.
    pub attributes: Attributes,
    /// Server-side last-updated timestamp.
    pub updated_at: Timestamp,
    /// Whether the server reports this record as deleted.
    pub deleted: bool,
}

impl RemoteRecord {
    /// Creates a live (non-deleted) record.
    pub fn upsert(
        entity_name: impl Into<String>,
        identifier: impl Into<RecordId>,
        updated_at: i64,
        attributes: Attributes,
    ) -> Self {
        Self {
            entity_name: entity_name.into(),
            identifier: identifier.into(),
            attributes,
            updated_at: Timestamp::new(updated_at),
            deleted: false,
        }
    }

    /// Creates a deletion marker.
    pub fn tombstone(
        entity_name: impl Into<String>,
        identifier: impl Into<RecordId>,
        updated_at: i64,
    ) -> Self {
        Self {
            entity_name: entity_name.into(),
            identifier: identifier.into(),
            attributes: Attributes::new(),
            updated_at: Timestamp::new(updated_at),
            deleted: true,
        }
    }

    /// Decodes a raw JSON object into a record of `entity_name`.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::Malformed`] if `raw` is not an object or `deleted` is not a bool
    /// - [`ProtocolError::MissingIdentifier`] if `id` is absent or empty
    /// - [`ProtocolError::InvalidTimestamp`] if `updated_at` is absent or unparseable
    pub fn from_raw(entity_name: &str, raw: Value) -> ProtocolResult<Self> {
        let Value::Object(mut fields) = raw else {
            return Err(ProtocolError::Malformed(format!(
                "record in '{}' is not an object",
                entity_name
            )));
        };

        let identifier = fields
            .remove(ID_KEY)
            .as_ref()
            .and_then(RecordId::from_json)
            .ok_or_else(|| ProtocolError::MissingIdentifier {
                entity: entity_name.to_string(),
            })?;

        let updated_at = match fields.remove(UPDATED_AT_KEY) {
            Some(value) => Timestamp::from_json(&value).map_err(|reason| {
                ProtocolError::invalid_timestamp(entity_name, identifier.as_str(), reason)
            })?,
            None => {
                return Err(ProtocolError::invalid_timestamp(
                    entity_name,
                    identifier.as_str(),
                    "missing updated_at",
                ))
            }
        };

        let deleted = match fields.remove(DELETED_KEY) {
            None | Some(Value::Null) => false,
            Some(Value::Bool(flag)) => flag,
            Some(other) => {
                return Err(ProtocolError::Malformed(format!(
                    "record '{}' in '{}' has non-boolean deleted flag {}",
                    identifier, entity_name, other
                )))
            }
        };

        Ok(Self {
            entity_name: entity_name.to_string(),
            identifier,
            attributes: fields.into_iter().collect(),
            updated_at,
            deleted,
        })
    }

    /// Encodes the record back into its raw JSON object form.
    #[must_use]
    pub fn to_raw(&self) -> Value {
        let mut fields: Map<String, Value> = self
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        fields.insert(ID_KEY.into(), Value::String(self.identifier.to_string()));
        fields.insert(UPDATED_AT_KEY.into(), Value::from(self.updated_at.value()));
        if self.deleted {
            fields.insert(DELETED_KEY.into(), Value::Bool(true));
        }
        Value::Object(fields)
    }
}

/// Already-fetched records keyed by entity name.
///
/// Used for push-driven updates, where the caller already holds the records
/// and the engine should skip watermark lookup and transport fetches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityPayload {
    entities: BTreeMap<String, Vec<RemoteRecord>>,
}

impl EntityPayload {
    /// Creates an empty bundle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds records for an entity, appending to any already present.
    pub fn insert(&mut self, entity_name: impl Into<String>, records: Vec<RemoteRecord>) {
        self.entities
            .entry(entity_name.into())
            .or_default()
            .extend(records);
    }

    /// Builder form of [`insert`](Self::insert).
    #[must_use]
    pub fn with(mut self, entity_name: impl Into<String>, records: Vec<RemoteRecord>) -> Self {
        self.insert(entity_name, records);
        self
    }

    /// Returns the records for an entity, if present.
    #[must_use]
    pub fn get(&self, entity_name: &str) -> Option<&[RemoteRecord]> {
        self.entities.get(entity_name).map(Vec::as_slice)
    }

    /// Returns true if the bundle mentions the entity.
    #[must_use]
    pub fn contains(&self, entity_name: &str) -> bool {
        self.entities.contains_key(entity_name)
    }

    /// Iterates over entity names in the bundle.
    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    /// Number of entities in the bundle.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns true if the bundle has no entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Total number of records across all entities.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.entities.values().map(Vec::len).sum()
    }

    /// Iterates over `(entity, records)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[RemoteRecord])> {
        self.entities
            .iter()
            .map(|(name, records)| (name.as_str(), records.as_slice()))
    }
}
