//! Core types for the coordinator session client.
//!
//! This crate provides the fundamental building blocks:
//! - Frame and header types plus the well-known message ids
//! - `Record` - Dynamic field-map model for decoded messages
//! - `EventBus` - Typed publish/subscribe fan-out
//! - Registry and catalog traits for the externally supplied schema
//! - Match share-code codec

pub mod bus;
pub mod frame;
pub mod record;
pub mod registry;
pub mod sharecode;

pub use bus::{ChangeKind, ChannelKey, Event, EventBus};
pub use frame::{
    ConnectionStatus, FrameHeader, InboundFrame, LauncherKind, MsgTypeId, NO_TARGET, OutboundFrame,
    SoTypeId,
};
pub use record::{ObjectKey, Record, SharedObject};
pub use registry::{KeyKind, MessageRegistry, ObjectCatalog};
