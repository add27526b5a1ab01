//! Conversions between base64 wire records and [`fle::OrgKeyRecord`].

use std::collections::HashSet;

use base64::{engine::general_purpose::STANDARD, Engine};
use common::protocol::{KeyRecord, WrappedDekEntry};
use common::ServiceError;
use fle::{OrgKeyRecord, WrappedDek};

/// Decode and sanity-check a caller-supplied key record.
///
/// # Errors
///
/// [`ServiceError::BadRequest`] for invalid base64, generation 0, or a
/// generation listed twice.
pub fn record_from_wire(record: &KeyRecord) -> Result<OrgKeyRecord, ServiceError> {
    let active = entry_from_wire(&record.active)?;
    let retired = record
        .retired
        .iter()
        .map(entry_from_wire)
        .collect::<Result<Vec<_>, _>>()?;

    let mut seen = HashSet::new();
    for wrapped in std::iter::once(&active).chain(retired.iter()) {
        if !seen.insert(wrapped.generation) {
            return Err(ServiceError::BadRequest(format!(
                "key record lists generation {} more than once",
                wrapped.generation
            )));
        }
    }

    Ok(OrgKeyRecord { active, retired })
}

pub fn record_to_wire(record: &OrgKeyRecord) -> KeyRecord {
    KeyRecord {
        active: entry_to_wire(&record.active),
        retired: record.retired.iter().map(entry_to_wire).collect(),
    }
}

fn entry_from_wire(entry: &WrappedDekEntry) -> Result<WrappedDek, ServiceError> {
    if entry.generation == 0 {
        return Err(ServiceError::BadRequest(
            "key record generations start at 1".into(),
        ));
    }
    let blob = decode_blob(&entry.blob)
        .map_err(|_| ServiceError::BadRequest(format!(
            "wrapped DEK for generation {} is not valid base64",
            entry.generation
        )))?;
    Ok(WrappedDek {
        generation: entry.generation,
        blob,
    })
}

fn entry_to_wire(wrapped: &WrappedDek) -> WrappedDekEntry {
    WrappedDekEntry {
        generation: wrapped.generation,
        blob: encode_blob(&wrapped.blob),
    }
}

pub fn encode_blob(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn decode_blob(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(encoded)
}
