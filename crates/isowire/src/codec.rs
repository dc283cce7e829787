//! # Codec
//!
//! MessagePack encoding of [`RemoteMessage`]s.
//!
//! ## Invariants
//! - Structs are encoded with field names, so a peer built from a newer
//!   revision can add fields without breaking decoding of known ones.
//! - A message still holding a live [`crate::Value::Object`] fails to encode;
//!   marshaling must have replaced it first.

use crate::error::Result;
use crate::message::RemoteMessage;

/// Encodes a message into a standalone payload.
pub fn encode(message: &RemoteMessage) -> Result<Vec<u8>> {
    Ok(rmp_serde::to_vec_named(message)?)
}

/// Decodes a payload produced by [`encode`].
pub fn decode(payload: &[u8]) -> Result<RemoteMessage> {
    Ok(rmp_serde::from_slice(payload)?)
}
