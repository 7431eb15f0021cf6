//! In-memory transport for development and tests.

use async_trait::async_trait;
use coordlink_core::{InboundFrame, OutboundFrame};
use tokio::sync::mpsc;

use crate::transport::{Transport, TransportError, TransportEvent};

/// Outbound half handed to the client.
pub struct LoopbackTransport {
    outbound: mpsc::UnboundedSender<OutboundFrame>,
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&self, frame: OutboundFrame) -> Result<(), TransportError> {
        self.outbound
            .send(frame)
            .map_err(|_| TransportError::Disconnected)
    }
}

/// Test harness end: observes client sends and injects inbound events.
pub struct LoopbackRemote {
    outbound: mpsc::UnboundedReceiver<OutboundFrame>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl LoopbackRemote {
    /// Next frame the client sent, or `None` once the client is gone.
    pub async fn next_sent(&mut self) -> Option<OutboundFrame> {
        self.outbound.recv().await
    }

    /// Deliver an inbound frame to the client.
    pub fn deliver(&self, frame: InboundFrame) {
        let _ = self.events.send(TransportEvent::Frame(frame));
    }

    /// Report a session-level disconnect.
    pub fn disconnect(&self) {
        let _ = self.events.send(TransportEvent::Disconnected);
    }

    /// Report a foreground-application change.
    pub fn now_playing(&self, app_id: u32) {
        let _ = self.events.send(TransportEvent::NowPlaying { app_id });
    }
}

/// Build a connected loopback transport.
///
/// Returns the transport for the client, the inbound event stream to attach
/// to it, and the remote harness.
#[must_use]
pub fn pair() -> (
    LoopbackTransport,
    mpsc::UnboundedReceiver<TransportEvent>,
    LoopbackRemote,
) {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    (
        LoopbackTransport {
            outbound: outbound_tx,
        },
        event_rx,
        LoopbackRemote {
            outbound: outbound_rx,
            events: event_tx,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use coordlink_core::FrameHeader;

    #[tokio::test]
    async fn sent_frames_reach_the_remote() {
        let (transport, _events, mut remote) = pair();

        transport
            .send(OutboundFrame {
                msg_type: 4006,
                header: FrameHeader::default(),
                payload: Bytes::from_static(b"{}"),
            })
            .await
            .unwrap();

        let frame = remote.next_sent().await.unwrap();
        assert_eq!(frame.msg_type, 4006);
    }

    #[tokio::test]
    async fn send_after_remote_drop_is_disconnected() {
        let (transport, _events, remote) = pair();
        drop(remote);

        let result = transport
            .send(OutboundFrame {
                msg_type: 1,
                header: FrameHeader::default(),
                payload: Bytes::new(),
            })
            .await;

        assert!(matches!(result, Err(TransportError::Disconnected)));
    }
}
