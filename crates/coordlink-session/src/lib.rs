//! Session state machine and request correlation for the coordinator client.
//!
//! Provides:
//! - `CoordinatorClient` - Connection state machine, dispatcher and
//!   keep-alive retry loop over an injected transport
//! - `JobCounter`/`JobHandle` - Correlated request plumbing

pub mod client;
pub mod jobs;

pub use client::{ClientConfig, ClientError, CoordinatorClient};
pub use jobs::{JobCounter, JobHandle};
