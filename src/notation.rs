//! A portable text notation for single facts, one JSON object per fact:
//!
//! ```text
//! {"entity":1,"attribute":4611686018427387905,"value":{"string":"Ada"},"tx":1,"added":true}
//! ```
//!
//! Decoding is strict. Unknown fields, missing fields, trailing input and
//! out-of-range numbers are all errors.

use crate::construct::Fact;
use crate::error::NotationError;

pub fn encode_fact(fact: &Fact) -> Result<String, NotationError> {
    if !fact.value().is_well_formed() {
        return Err(NotationError::NonFinite);
    }
    serde_json::to_string(fact).map_err(|e| NotationError::Malformed(e.to_string()))
}

pub fn decode_fact(text: &str) -> Result<Fact, NotationError> {
    serde_json::from_str(text).map_err(|e| NotationError::Malformed(e.to_string()))
}
