//! Conversion between typed job arguments and the engine's argument list.
//!
//! Engines carry arguments as an ordered JSON list. A typed argument value
//! that serializes to an array (tuples, vectors) contributes its elements,
//! unit contributes nothing, anything else becomes a single element.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::JobError;

/// Flatten typed arguments into the engine's argument list.
pub fn encode_args<A: Serialize>(args: &A) -> Result<Vec<Value>, serde_json::Error> {
    Ok(match serde_json::to_value(args)? {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    })
}

/// Rebuild typed arguments from the engine's argument list.
///
/// The list is first read as a whole (tuples, vectors), then as its single
/// element, then as unit when empty.
pub fn decode_args<A: DeserializeOwned>(args: Vec<Value>) -> Result<A, JobError> {
    let whole = Value::Array(args);
    let err = match serde_json::from_value::<A>(whole.clone()) {
        Ok(decoded) => return Ok(decoded),
        Err(err) => err,
    };

    let Value::Array(mut items) = whole else {
        return Err(JobError::InvalidArgs(err.to_string()));
    };
    let fallback = match items.len() {
        0 => Value::Null,
        1 => items.remove(0),
        _ => return Err(JobError::InvalidArgs(err.to_string())),
    };
    serde_json::from_value(fallback).map_err(|_| JobError::InvalidArgs(err.to_string()))
}
