//! Shared-object cache synchronization for the coordinator client.
//!
//! Provides:
//! - `SoCache` - Eventually-consistent replica of coordinator-owned objects
//! - Subscription bookkeeping for server-announced cache groupings

pub mod cache;

pub use cache::{CacheOwner, SoCache, SubscriptionRecord};
