//! Transport seam and wire codec for the coordinator client.
//!
//! Provides:
//! - `Transport` trait + `TransportEvent` (the adapter boundary)
//! - JSON codec implementations of the registry/catalog traits
//! - In-memory loopback transport for development and tests

pub mod codec;
pub mod loopback;
pub mod transport;

pub use codec::{JsonRegistry, StaticCatalog};
pub use transport::{Transport, TransportError, TransportEvent};
