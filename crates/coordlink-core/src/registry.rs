//! Codec traits resolving numeric type ids to encoders and decoders.
//!
//! The catalog of message ids and record schemas is supplied by the
//! integrator; the engine only ever goes through these two traits.

use bytes::Bytes;
use serde_json::{Map, Value};

use crate::frame::{MsgTypeId, SoTypeId};
use crate::record::Record;

/// Per-type codec for coordinator messages.
pub trait MessageRegistry: Send + Sync {
    /// Decode a payload for the given message type.
    ///
    /// `None` means "unknown type or undecodable payload"; the caller logs
    /// and drops the frame.
    fn decode(&self, msg_type: MsgTypeId, payload: &[u8]) -> Option<Record>;

    /// Encode a field map as the given message type's payload.
    ///
    /// `None` means no encoder could be resolved for the type.
    fn encode(&self, msg_type: MsgTypeId, fields: &Map<String, Value>) -> Option<Bytes>;
}

/// How instances of a shared-object type are keyed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyKind {
    /// No key is defined; objects of this type cannot be cached.
    Undefined,
    /// At most one instance exists; no key needed.
    Singleton,
    /// Keyed by the named record fields, in declared order.
    Fields(Vec<String>),
}

/// Decoder and key metadata for shared-object types.
///
/// Implementations resolve explicit overrides before falling back to schema
/// metadata; the cache memoizes the result per type id, so `key_fields` must
/// be stable for the process lifetime.
pub trait ObjectCatalog: Send + Sync {
    /// Decode a shared-object payload.
    fn decode(&self, so_type: SoTypeId, data: &[u8]) -> Option<Record>;

    /// Key layout for the given shared-object type.
    fn key_fields(&self, so_type: SoTypeId) -> KeyKind;
}
