//! Locally replicated cache of coordinator-owned shared objects.
//!
//! The coordinator pushes create/update/destroy notifications and announces
//! whole cache groupings via subscribe/unsubscribe. Objects are read-only to
//! callers; an update replaces the contents behind the stored
//! [`SharedObject`] handle, so holders of a previously returned handle see
//! the new state.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, RwLock},
};

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use coordlink_core::{
    ChangeKind, ChannelKey, Event, EventBus, KeyKind, ObjectCatalog, ObjectKey, Record,
    SharedObject, SoTypeId,
    record::shared,
};

/// Identity of a server-announced cache grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheOwner {
    /// Owner entity type.
    pub owner_type: u64,
    /// Owner entity id.
    pub owner_id: u64,
}

/// Bookkeeping for one subscribed cache grouping.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionRecord {
    /// Version announced with the latest subscribe notification.
    pub version: u64,
    /// Shared-object types this grouping has ever contained.
    pub type_ids: HashSet<SoTypeId>,
}

enum Container {
    Singleton(SharedObject),
    Keyed(HashMap<ObjectKey, SharedObject>),
}

#[derive(Default)]
struct Inner {
    containers: HashMap<SoTypeId, Container>,
    subscriptions: HashMap<CacheOwner, SubscriptionRecord>,
}

/// The shared-object cache.
///
/// Mutated only from the inbound dispatch path; readers get cheap handle
/// clones and must treat the contents as read-only.
pub struct SoCache {
    bus: Arc<EventBus>,
    catalog: Arc<dyn ObjectCatalog>,
    inner: RwLock<Inner>,
    key_kinds: RwLock<HashMap<SoTypeId, KeyKind>>,
}

impl SoCache {
    /// Create a cache publishing change events on `bus`.
    #[must_use]
    pub fn new(bus: Arc<EventBus>, catalog: Arc<dyn ObjectCatalog>) -> Self {
        Self {
            bus,
            catalog,
            inner: RwLock::new(Inner::default()),
            key_kinds: RwLock::new(HashMap::new()),
        }
    }

    /// The singleton instance of a no-key type, if present.
    #[must_use]
    pub fn singleton(&self, so_type: SoTypeId) -> Option<SharedObject> {
        match self.inner.read().unwrap().containers.get(&so_type) {
            Some(Container::Singleton(obj)) => Some(Arc::clone(obj)),
            _ => None,
        }
    }

    /// Look up a keyed instance.
    #[must_use]
    pub fn get(&self, so_type: SoTypeId, key: &ObjectKey) -> Option<SharedObject> {
        match self.inner.read().unwrap().containers.get(&so_type) {
            Some(Container::Keyed(map)) => map.get(key).map(Arc::clone),
            _ => None,
        }
    }

    /// Snapshot of all keyed instances of a type.
    ///
    /// For keyed types the container is created empty on first read.
    #[must_use]
    pub fn entries(&self, so_type: SoTypeId) -> Vec<(ObjectKey, SharedObject)> {
        if matches!(self.resolve_kind(so_type), KeyKind::Fields(_)) {
            let mut inner = self.inner.write().unwrap();
            let container = inner
                .containers
                .entry(so_type)
                .or_insert_with(|| Container::Keyed(HashMap::new()));
            if let Container::Keyed(map) = container {
                return map
                    .iter()
                    .map(|(k, v)| (k.clone(), Arc::clone(v)))
                    .collect();
            }
        }
        Vec::new()
    }

    /// Snapshot of the subscription record for an owner, if subscribed.
    #[must_use]
    pub fn subscription(&self, owner: CacheOwner) -> Option<SubscriptionRecord> {
        self.inner
            .read()
            .unwrap()
            .subscriptions
            .get(&owner)
            .cloned()
    }

    /// Wholesale reset: every container and subscription record is dropped.
    ///
    /// Called on the became-ready edge; the coordinator resends full state
    /// for a fresh session, so nothing stale may survive into it.
    pub fn clear_all(&self) {
        let mut inner = self.inner.write().unwrap();
        inner.containers.clear();
        inner.subscriptions.clear();
    }

    /// Shared-object create notification.
    pub fn handle_create(&self, msg: &Record) {
        if let Some((so_type, obj)) = self.apply_object_msg(msg) {
            self.emit(ChangeKind::New, so_type, obj);
        }
    }

    /// Shared-object update notification.
    pub fn handle_update(&self, msg: &Record) {
        if let Some((so_type, obj)) = self.apply_object_msg(msg) {
            self.emit(ChangeKind::Updated, so_type, obj);
        }
    }

    /// Batched update notification.
    ///
    /// Only the `objects_modified` list is processed, in order; a failing
    /// entry does not abort the rest. The protocol also defines bulk
    /// added/removed lists, which this client does not consume.
    pub fn handle_update_multiple(&self, msg: &Record) {
        let Some(entries) = msg.array("objects_modified") else {
            return;
        };
        for entry in entries {
            match entry.as_object() {
                Some(map) => self.handle_update(&Record::new(map.clone())),
                None => tracing::warn!("non-object entry in objects_modified"),
            }
        }
    }

    /// Shared-object destroy notification.
    ///
    /// The record is decoded only to recover the key. The evicted instance
    /// is back-filled with the decoded contents before the `Removed` event;
    /// if nothing was stored, the decoded record itself is the best-effort
    /// payload.
    pub fn handle_destroy(&self, msg: &Record) {
        let Some((so_type, kind, record)) = self.parse_object_msg(msg) else {
            return;
        };

        let evicted = {
            let mut inner = self.inner.write().unwrap();
            match kind {
                KeyKind::Singleton => match inner.containers.remove(&so_type) {
                    Some(Container::Singleton(obj)) => Some(obj),
                    Some(other) => {
                        inner.containers.insert(so_type, other);
                        None
                    }
                    None => None,
                },
                KeyKind::Fields(fields) => {
                    let Some(key) = ObjectKey::extract(&record, &fields) else {
                        tracing::error!(so_type, "cannot extract key from destroy record");
                        return;
                    };
                    match inner.containers.get_mut(&so_type) {
                        Some(Container::Keyed(map)) => map.remove(&key),
                        _ => None,
                    }
                }
                KeyKind::Undefined => unreachable!("filtered in parse_object_msg"),
            }
        };

        let payload = match evicted {
            Some(obj) => {
                obj.write().unwrap().copy_from(&record);
                obj
            }
            None => shared(record),
        };
        self.emit(ChangeKind::Removed, so_type, payload);
    }

    /// Cache-grouping subscribe notification.
    ///
    /// Merges the subscription record (version overwrite, contained-type
    /// union) and applies every bundled object as a create. The first
    /// undecodable object aborts the remainder of this notification only.
    pub fn handle_cache_subscribed(&self, msg: &Record) {
        let Some(owner) = cache_owner(msg) else {
            tracing::warn!("cache subscribe without owner");
            return;
        };
        let version = msg.u64("version").unwrap_or(0);
        let groups = msg.array("objects").cloned().unwrap_or_default();

        {
            let mut inner = self.inner.write().unwrap();
            let sub = inner.subscriptions.entry(owner).or_default();
            sub.version = version;
            for group in &groups {
                if let Some(so_type) = group_type_id(group) {
                    sub.type_ids.insert(so_type);
                }
            }
        }

        for group in &groups {
            let Some(so_type) = group_type_id(group) else {
                continue;
            };
            let datas = group
                .as_object()
                .and_then(|g| g.get("object_data"))
                .and_then(|v| v.as_array());
            for data in datas.into_iter().flatten() {
                let decoded = data
                    .as_str()
                    .and_then(|s| BASE64.decode(s).ok())
                    .and_then(|bytes| self.apply_object(so_type, &bytes));
                match decoded {
                    Some(obj) => self.emit(ChangeKind::New, so_type, obj),
                    None => {
                        tracing::error!(so_type, "bad object in cache subscribe, aborting batch");
                        return;
                    }
                }
            }
        }
    }

    /// Cache-grouping unsubscribe notification.
    ///
    /// Unknown owners are a no-op. Otherwise every stored instance of every
    /// contained type is evicted with a `Removed` event, the containers are
    /// dropped and the subscription record deleted.
    pub fn handle_cache_unsubscribed(&self, msg: &Record) {
        let Some(owner) = cache_owner(msg) else {
            tracing::warn!("cache unsubscribe without owner");
            return;
        };

        let mut removed: Vec<(SoTypeId, SharedObject)> = Vec::new();
        {
            let mut inner = self.inner.write().unwrap();
            let Some(sub) = inner.subscriptions.remove(&owner) else {
                return;
            };
            for so_type in sub.type_ids {
                match inner.containers.remove(&so_type) {
                    Some(Container::Singleton(obj)) => removed.push((so_type, obj)),
                    Some(Container::Keyed(map)) => {
                        removed.extend(map.into_values().map(|obj| (so_type, obj)));
                    }
                    None => {}
                }
            }
        }

        for (so_type, obj) in removed {
            self.emit(ChangeKind::Removed, so_type, obj);
        }
    }

    /// Replay the welcome message's out-of-date subscribed caches.
    pub fn handle_welcome(&self, msg: &Record) {
        for entry in msg.array("outofdate_caches").into_iter().flatten() {
            match entry.as_object() {
                Some(map) => self.handle_cache_subscribed(&Record::new(map.clone())),
                None => tracing::warn!("non-object entry in outofdate_caches"),
            }
        }
    }

    /// Decode and store an object carried by a create/update message.
    fn apply_object_msg(&self, msg: &Record) -> Option<(SoTypeId, SharedObject)> {
        let (so_type, _, record) = self.parse_object_msg(msg)?;
        self.store(so_type, record).map(|obj| (so_type, obj))
    }

    /// Decode the `type_id`/`object_data` pair of an object message.
    fn parse_object_msg(&self, msg: &Record) -> Option<(SoTypeId, KeyKind, Record)> {
        let so_type = msg.u64("type_id").and_then(|t| u32::try_from(t).ok())?;
        let kind = self.resolve_kind(so_type);
        if kind == KeyKind::Undefined {
            tracing::error!(so_type, "no key fields resolved for type");
            return None;
        }

        let data = msg.bytes("object_data").or_else(|| {
            tracing::warn!(so_type, "missing object_data");
            None
        })?;
        let record = self.catalog.decode(so_type, &data).or_else(|| {
            tracing::error!(so_type, "unable to decode shared object");
            None
        })?;
        Some((so_type, kind, record))
    }

    /// Decode and store a raw object payload (cache-subscribed path).
    fn apply_object(&self, so_type: SoTypeId, data: &[u8]) -> Option<SharedObject> {
        let kind = self.resolve_kind(so_type);
        if kind == KeyKind::Undefined {
            tracing::error!(so_type, "no key fields resolved for type");
            return None;
        }
        let record = self.catalog.decode(so_type, data)?;
        self.store(so_type, record)
    }

    /// Insert or copy-in-place; returns the stored handle.
    fn store(&self, so_type: SoTypeId, record: Record) -> Option<SharedObject> {
        let kind = self.resolve_kind(so_type);
        let mut inner = self.inner.write().unwrap();

        let stored = match kind {
            KeyKind::Undefined => return None,
            KeyKind::Singleton => match inner.containers.get(&so_type) {
                Some(Container::Singleton(existing)) => {
                    existing.write().unwrap().copy_from(&record);
                    Arc::clone(existing)
                }
                _ => {
                    let obj = shared(record);
                    inner
                        .containers
                        .insert(so_type, Container::Singleton(Arc::clone(&obj)));
                    obj
                }
            },
            KeyKind::Fields(fields) => {
                let Some(key) = ObjectKey::extract(&record, &fields) else {
                    tracing::error!(so_type, "cannot extract key from record");
                    return None;
                };
                let container = inner
                    .containers
                    .entry(so_type)
                    .or_insert_with(|| Container::Keyed(HashMap::new()));
                let Container::Keyed(map) = container else {
                    return None;
                };
                match map.get(&key) {
                    Some(existing) => {
                        existing.write().unwrap().copy_from(&record);
                        Arc::clone(existing)
                    }
                    None => {
                        let obj = shared(record);
                        map.insert(key, Arc::clone(&obj));
                        obj
                    }
                }
            }
        };
        Some(stored)
    }

    /// Memoized key-kind resolution, one catalog query per type id.
    fn resolve_kind(&self, so_type: SoTypeId) -> KeyKind {
        if let Some(kind) = self.key_kinds.read().unwrap().get(&so_type) {
            return kind.clone();
        }
        let kind = self.catalog.key_fields(so_type);
        self.key_kinds
            .write()
            .unwrap()
            .entry(so_type)
            .or_insert(kind)
            .clone()
    }

    fn emit(&self, kind: ChangeKind, so_type: SoTypeId, obj: SharedObject) {
        tracing::debug!(?kind, so_type, "cache change");
        self.bus
            .publish(&ChannelKey::CacheChange(kind, so_type), Event::Object(obj));
    }
}

/// Read the `owner` field of a cache grouping message.
fn cache_owner(msg: &Record) -> Option<CacheOwner> {
    let owner = msg.get("owner")?.as_object()?;
    Some(CacheOwner {
        owner_type: owner.get("type")?.as_u64()?,
        owner_id: owner.get("id")?.as_u64()?,
    })
}

fn group_type_id(group: &serde_json::Value) -> Option<SoTypeId> {
    group
        .as_object()?
        .get("type_id")?
        .as_u64()
        .and_then(|t| u32::try_from(t).ok())
}
