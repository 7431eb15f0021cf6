//! Typed publish/subscribe fan-out for decoded traffic and cache changes.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::frame::{ConnectionStatus, MsgTypeId, SoTypeId};
use crate::record::{Record, SharedObject};

/// Per-channel buffer depth before slow subscribers start lagging.
const CHANNEL_CAPACITY: usize = 256;

/// Kind of a shared-object cache change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// Object was inserted.
    New,
    /// Object contents were replaced in place.
    Updated,
    /// Object was evicted.
    Removed,
}

/// Key identifying one broadcast channel on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelKey {
    /// Every decoded message of one type.
    Message(MsgTypeId),
    /// Responses targeting one job correlation id (literal 64-bit value).
    Job(u64),
    /// Cache changes of one kind for one shared-object type.
    CacheChange(ChangeKind, SoTypeId),
    /// Session status value changed.
    ConnectionStatus,
    /// Session became ready.
    Ready,
    /// Session stopped being ready.
    NotReady,
    /// Welcome bootstrap payload decoded.
    Welcome,
}

/// Payload delivered on a bus channel.
#[derive(Debug, Clone)]
pub enum Event {
    /// A decoded message.
    Message(Arc<Record>),
    /// A cached shared object (stored handle, post update-in-place).
    Object(SharedObject),
    /// The new session status.
    Status(ConnectionStatus),
    /// Edge notification with no payload.
    Signal,
}

/// Broadcast bus with one lazily created channel per [`ChannelKey`].
///
/// Publishing to a channel nobody listens to is a no-op; resetting a channel
/// disconnects every stale receiver, which is how job channels are scrubbed
/// before a wrapped-around id is reused.
pub struct EventBus {
    channels: RwLock<HashMap<ChannelKey, broadcast::Sender<Event>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribe to a channel, creating it if needed.
    #[must_use]
    pub fn subscribe(&self, key: ChannelKey) -> broadcast::Receiver<Event> {
        let mut channels = self.channels.write().unwrap();
        channels
            .entry(key)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Publish an event; silently dropped when nobody subscribed.
    pub fn publish(&self, key: &ChannelKey, event: Event) {
        let channels = self.channels.read().unwrap();
        if let Some(sender) = channels.get(key) {
            let _ = sender.send(event); // no receivers is fine
        }
    }

    /// Drop a channel, disconnecting all of its receivers.
    pub fn reset(&self, key: &ChannelKey) {
        self.channels.write().unwrap().remove(key);
    }

    /// Stream adapter over a channel; lagged entries are skipped.
    #[must_use]
    pub fn stream(&self, key: ChannelKey) -> futures::stream::BoxStream<'static, Event> {
        BroadcastStream::new(self.subscribe(key))
            .filter_map(|res| async move { res.ok() })
            .boxed()
    }
}
