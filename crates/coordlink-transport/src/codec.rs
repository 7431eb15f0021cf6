//! JSON implementations of the registry and catalog traits.
//!
//! Payloads are JSON objects on the wire; embedded object bytes ride as
//! base64 strings inside them. Deployments with a binary schema plug in
//! their own [`MessageRegistry`]/[`ObjectCatalog`] instead.

use std::collections::{HashMap, HashSet};

use bytes::Bytes;
use coordlink_core::{KeyKind, MessageRegistry, MsgTypeId, ObjectCatalog, Record, SoTypeId};
use serde_json::{Map, Value};

fn decode_object(data: &[u8]) -> Option<Record> {
    match serde_json::from_slice::<Value>(data) {
        Ok(Value::Object(map)) => Some(Record::new(map)),
        Ok(other) => {
            tracing::debug!("payload is not a JSON object: {other}");
            None
        }
        Err(e) => {
            tracing::debug!("undecodable JSON payload: {e}");
            None
        }
    }
}

/// Schema-less JSON message codec.
///
/// By default every type id decodes; restricting to a known id set makes
/// unknown traffic surface as "no decoder found" the way a generated
/// schema catalog would.
#[derive(Debug, Default)]
pub struct JsonRegistry {
    known: Option<HashSet<MsgTypeId>>,
}

impl JsonRegistry {
    /// Codec accepting every message type.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Codec rejecting types outside the given set.
    #[must_use]
    pub fn with_types(types: impl IntoIterator<Item = MsgTypeId>) -> Self {
        Self {
            known: Some(types.into_iter().collect()),
        }
    }

    fn knows(&self, msg_type: MsgTypeId) -> bool {
        self.known.as_ref().is_none_or(|set| set.contains(&msg_type))
    }
}

impl MessageRegistry for JsonRegistry {
    fn decode(&self, msg_type: MsgTypeId, payload: &[u8]) -> Option<Record> {
        if !self.knows(msg_type) {
            return None;
        }
        decode_object(payload)
    }

    fn encode(&self, msg_type: MsgTypeId, fields: &Map<String, Value>) -> Option<Bytes> {
        if !self.knows(msg_type) {
            return None;
        }
        serde_json::to_vec(&Value::Object(fields.clone()))
            .ok()
            .map(Bytes::from)
    }
}

/// Object catalog backed by an explicit per-type key table.
///
/// This is the load-time stand-in for schema reflection: the integrator
/// declares each cacheable type's key layout once, up front.
#[derive(Debug, Default)]
pub struct StaticCatalog {
    kinds: HashMap<SoTypeId, KeyKind>,
}

impl StaticCatalog {
    /// Empty catalog; every type is `Undefined` until declared.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a singleton type (one instance, no key).
    #[must_use]
    pub fn singleton(mut self, so_type: SoTypeId) -> Self {
        self.kinds.insert(so_type, KeyKind::Singleton);
        self
    }

    /// Declare a keyed type with its key fields in declared order.
    #[must_use]
    pub fn keyed<S: Into<String>>(
        mut self,
        so_type: SoTypeId,
        fields: impl IntoIterator<Item = S>,
    ) -> Self {
        self.kinds.insert(
            so_type,
            KeyKind::Fields(fields.into_iter().map(Into::into).collect()),
        );
        self
    }
}

impl ObjectCatalog for StaticCatalog {
    fn decode(&self, so_type: SoTypeId, data: &[u8]) -> Option<Record> {
        if !self.kinds.contains_key(&so_type) {
            return None;
        }
        decode_object(data)
    }

    fn key_fields(&self, so_type: SoTypeId) -> KeyKind {
        self.kinds
            .get(&so_type)
            .cloned()
            .unwrap_or(KeyKind::Undefined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn registry_round_trips_field_maps() {
        let registry = JsonRegistry::new();
        let fields = match json!({"version": 7, "name": "hello"}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };

        let payload = registry.encode(4006, &fields).unwrap();
        let record = registry.decode(4006, &payload).unwrap();
        assert_eq!(record.u64("version"), Some(7));
        assert_eq!(record.str("name"), Some("hello"));
    }

    #[test]
    fn restricted_registry_drops_unknown_types() {
        let registry = JsonRegistry::with_types([4006]);
        assert!(registry.decode(9999, b"{}").is_none());
        assert!(registry.encode(9999, &Map::new()).is_none());
        assert!(registry.decode(4006, b"{}").is_some());
    }

    #[test]
    fn malformed_payload_decodes_to_none() {
        let registry = JsonRegistry::new();
        assert!(registry.decode(4006, b"not json").is_none());
        assert!(registry.decode(4006, b"[1,2]").is_none());
    }

    #[test]
    fn catalog_reports_declared_key_kinds() {
        let catalog = StaticCatalog::new().singleton(7).keyed(1, ["id"]);

        assert_eq!(catalog.key_fields(7), KeyKind::Singleton);
        assert_eq!(catalog.key_fields(1), KeyKind::Fields(vec!["id".into()]));
        assert_eq!(catalog.key_fields(99), KeyKind::Undefined);
        assert!(catalog.decode(99, b"{}").is_none());
    }
}
