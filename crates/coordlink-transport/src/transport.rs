//! Transport seam between the session engine and the outside world.

use async_trait::async_trait;
use coordlink_core::{InboundFrame, OutboundFrame};
use thiserror::Error;

/// Transport-level failure.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The underlying session is gone; the frame was not delivered.
    #[error("transport disconnected")]
    Disconnected,
    /// I/O error from the underlying layer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outbound half of the externally supplied transport.
///
/// Login, framing and security live below this trait; the engine only hands
/// over fully assembled frames.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver one frame to the coordinator.
    ///
    /// # Errors
    /// Returns an error when the frame could not be handed to the session.
    async fn send(&self, frame: OutboundFrame) -> Result<(), TransportError>;
}

/// Inbound notification from the transport adapter.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A raw frame arrived.
    Frame(InboundFrame),
    /// The underlying session dropped.
    Disconnected,
    /// Out-of-band foreground-application report.
    NowPlaying {
        /// Application currently owning the session.
        app_id: u32,
    },
}
