//! Blob encodings shared by every object store backend.
//!
//! Input blobs are header-less CSV. Rows are passed through as raw strings so
//! that short or malformed rows surface as record-parse errors in `ingest`,
//! not as transport errors here. That includes fields that are not valid
//! UTF-8: they are decoded lossily and then fail to parse. Aggregates are
//! stored as JSON.

use pipeline::{Aggregate, Row};

use crate::ObjectStoreError;

/// Splits a CSV blob into rows of trimmed fields.
pub fn decode_rows(bytes: &[u8]) -> Result<Vec<Row>, ObjectStoreError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let mut rows = Vec::new();
    for record in reader.byte_records() {
        rows.push(
            record?
                .iter()
                .map(|field| String::from_utf8_lossy(field).into_owned())
                .collect(),
        );
    }
    Ok(rows)
}

/// Serializes an aggregate as stored in the cold store.
pub fn encode_aggregate(value: &Aggregate) -> Result<Vec<u8>, ObjectStoreError> {
    Ok(serde_json::to_vec(value)?)
}

/// Parses an aggregate previously written by [`encode_aggregate`].
pub fn decode_aggregate(bytes: &[u8]) -> Result<Aggregate, ObjectStoreError> {
    Ok(serde_json::from_slice(bytes)?)
}
