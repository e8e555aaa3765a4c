//! Payload codecs.
//!
//! A transport hands the engine raw bytes; this module turns them into
//! [`RemoteRecord`]s. Two shapes are supported:
//!
//! - a record array for a single entity: `[ {record}, ... ]`
//! - a bundle keyed by entity name: `{ "accounts": [ ... ], "tags": [ ... ] }`
//!
//! Both shapes can be carried as JSON or CBOR.

use crate::error::{ProtocolError, ProtocolResult};
use crate::record::{EntityPayload, RemoteRecord};
use serde_json::{Map, Value};
use std::str::FromStr;

/// Encoding of a payload body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayloadFormat {
    /// UTF-8 JSON.
    #[default]
    Json,
    /// CBOR (RFC 8949).
    Cbor,
}

impl PayloadFormat {
    /// MIME type for the format.
    #[must_use]
    pub fn content_type(&self) -> &'static str {
        match self {
            PayloadFormat::Json => "application/json",
            PayloadFormat::Cbor => "application/cbor",
        }
    }
}

impl FromStr for PayloadFormat {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(PayloadFormat::Json),
            "cbor" => Ok(PayloadFormat::Cbor),
            other => Err(ProtocolError::Malformed(format!(
                "unknown payload format '{}'",
                other
            ))),
        }
    }
}

fn parse(bytes: &[u8], format: PayloadFormat) -> ProtocolResult<Value> {
    match format {
        PayloadFormat::Json => Ok(serde_json::from_slice(bytes)?),
        PayloadFormat::Cbor => {
            ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::Cbor(e.to_string()))
        }
    }
}

fn render(value: &Value, format: PayloadFormat) -> ProtocolResult<Vec<u8>> {
    match format {
        PayloadFormat::Json => Ok(serde_json::to_vec(value)?),
        PayloadFormat::Cbor => {
            let mut buf = Vec::new();
            ciborium::ser::into_writer(value, &mut buf)
                .map_err(|e| ProtocolError::Cbor(e.to_string()))?;
            Ok(buf)
        }
    }
}

fn records_from_value(entity_name: &str, value: Value) -> ProtocolResult<Vec<RemoteRecord>> {
    let Value::Array(items) = value else {
        return Err(ProtocolError::Malformed(format!(
            "payload for '{}' is not an array",
            entity_name
        )));
    };
    items
        .into_iter()
        .map(|raw| RemoteRecord::from_raw(entity_name, raw))
        .collect()
}

/// Decodes a record array for `entity_name`.
///
/// Decoding is all-or-nothing: one malformed record fails the whole body.
pub fn decode_records(
    entity_name: &str,
    bytes: &[u8],
    format: PayloadFormat,
) -> ProtocolResult<Vec<RemoteRecord>> {
    records_from_value(entity_name, parse(bytes, format)?)
}

/// Encodes records as a record array.
pub fn encode_records(records: &[RemoteRecord], format: PayloadFormat) -> ProtocolResult<Vec<u8>> {
    let value = Value::Array(records.iter().map(RemoteRecord::to_raw).collect());
    render(&value, format)
}

/// Decodes a bundle keyed by entity name.
pub fn decode_bundle(bytes: &[u8], format: PayloadFormat) -> ProtocolResult<EntityPayload> {
    let Value::Object(entities) = parse(bytes, format)? else {
        return Err(ProtocolError::Malformed("bundle is not an object".into()));
    };

    let mut payload = EntityPayload::new();
    for (entity_name, value) in entities {
        let records = records_from_value(&entity_name, value)?;
        payload.insert(entity_name, records);
    }
    Ok(payload)
}

/// Encodes a bundle keyed by entity name.
pub fn encode_bundle(payload: &EntityPayload, format: PayloadFormat) -> ProtocolResult<Vec<u8>> {
    let entities: Map<String, Value> = payload
        .iter()
        .map(|(name, records)| {
            (
                name.to_string(),
                Value::Array(records.iter().map(RemoteRecord::to_raw).collect()),
            )
        })
        .collect();
    render(&Value::Object(entities), format)
}
