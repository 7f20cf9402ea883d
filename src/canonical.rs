//! Canonical byte form for signatures, content ids, and persisted state.
//!
//! Every transcript in the protocol (document proofs, content signatures,
//! CID computation, the export envelope, session state) runs through the
//! same encoder: minimal JSON with lexically sorted keys at every nesting
//! level, absent optionals omitted, and byte sequences as integer arrays.
//! Serializing through [`serde_json::Value`] gives the sorted-key property,
//! since its map type keeps keys in `BTreeMap` order.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::Error;

/// Canonical bytes of any serializable value.
pub fn to_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, Error> {
    let value = serde_json::to_value(value).map_err(|err| Error::Serde(err.to_string()))?;
    serde_json::to_vec(&value).map_err(|err| Error::Serde(err.to_string()))
}

/// Parses a value previously written by [`to_bytes`].
pub fn from_bytes<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, Error> {
    serde_json::from_slice(bytes).map_err(|err| Error::Serde(err.to_string()))
}
