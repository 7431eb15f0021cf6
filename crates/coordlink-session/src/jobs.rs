//! Job correlation id allocation.

use std::sync::Mutex;

use coordlink_core::Event;
use tokio::sync::broadcast;

/// Cyclic allocator for request correlation ids.
///
/// Ids live in 1..=9999; 0 is reserved. The narrow space is the only
/// defense against collision with long-outstanding jobs, so the channel for
/// a reused id is scrubbed before each send.
#[derive(Debug, Default)]
pub struct JobCounter {
    last: Mutex<u16>,
}

impl JobCounter {
    /// Start counting from zero (first id is 1).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id, wrapping deterministically.
    pub fn next(&self) -> u16 {
        let mut last = self.last.lock().unwrap();
        let mut id = (*last + 1) % 10_000;
        if id == 0 {
            id = 1;
        }
        *last = id;
        id
    }
}

/// Handle to one outstanding correlated request.
///
/// Holds the subscription opened before the request went out, so a response
/// arriving ahead of the await is not lost.
pub struct JobHandle {
    /// Allocated correlation id.
    pub id: u16,
    pub(crate) receiver: broadcast::Receiver<Event>,
}
