//! Raw frame and header types exchanged with the coordinator.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Numeric identifier of a message type on the wire.
pub type MsgTypeId = u32;

/// Numeric identifier of a shared-object type.
pub type SoTypeId = u32;

/// Sentinel for "no job targeted" in a frame header.
///
/// The header fields are 64 bits wide even though locally allocated job ids
/// live in 1..=9999; the all-bits-set value is reserved by the protocol.
pub const NO_TARGET: u64 = u64::MAX;

/// Protocol version advertised in the hello request.
pub const CLIENT_VERSION: u64 = 2_000_202;

/// Well-known message-type identifiers consumed by the core itself.
///
/// Everything else on the wire is opaque to this workspace and resolved
/// through the [`crate::registry::MessageRegistry`].
pub mod msg {
    use super::MsgTypeId;

    /// Shared-object create notification.
    pub const SO_CREATE: MsgTypeId = 21;
    /// Shared-object update notification.
    pub const SO_UPDATE: MsgTypeId = 22;
    /// Shared-object destroy notification.
    pub const SO_DESTROY: MsgTypeId = 23;
    /// A cache grouping was subscribed; carries its bundled objects.
    pub const SO_CACHE_SUBSCRIBED: MsgTypeId = 24;
    /// A cache grouping was unsubscribed; its objects must be evicted.
    pub const SO_CACHE_UNSUBSCRIBED: MsgTypeId = 25;
    /// Batched shared-object updates.
    pub const SO_UPDATE_MULTIPLE: MsgTypeId = 26;

    /// Session welcome; forces the session ready and bootstraps caches.
    pub const CLIENT_WELCOME: MsgTypeId = 4004;
    /// Registry id for the sub-message embedded in the welcome payload.
    pub const WELCOME_BOOTSTRAP: MsgTypeId = 4005;
    /// Keep-alive hello request (standard launcher).
    pub const CLIENT_HELLO: MsgTypeId = 4006;
    /// Connection status notification from the coordinator.
    pub const CONNECTION_STATUS: MsgTypeId = 4009;
    /// Keep-alive hello request (partner launcher).
    pub const CLIENT_HELLO_PARTNER: MsgTypeId = 4011;
}

/// Job correlation fields carried by every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameHeader {
    /// Job id chosen by the sender of this frame.
    pub source_job_id: u64,
    /// Job id of the request this frame responds to, or [`NO_TARGET`].
    pub target_job_id: u64,
}

impl Default for FrameHeader {
    fn default() -> Self {
        Self {
            source_job_id: NO_TARGET,
            target_job_id: NO_TARGET,
        }
    }
}

impl FrameHeader {
    /// Header for a job-tagged request.
    #[must_use]
    pub fn for_job(job_id: u16) -> Self {
        Self {
            source_job_id: u64::from(job_id),
            ..Self::default()
        }
    }

    /// Whether this frame responds to a correlated request.
    #[must_use]
    pub const fn has_target(&self) -> bool {
        self.target_job_id != NO_TARGET
    }
}

/// A decoded-enough frame arriving from the transport.
#[derive(Debug, Clone)]
pub struct InboundFrame {
    /// Message-type identifier.
    pub msg_type: MsgTypeId,
    /// Correlation header.
    pub header: FrameHeader,
    /// Encoded message payload.
    pub payload: Bytes,
}

/// A frame handed to the transport for delivery.
#[derive(Debug, Clone)]
pub struct OutboundFrame {
    /// Message-type identifier.
    pub msg_type: MsgTypeId,
    /// Correlation header.
    pub header: FrameHeader,
    /// Encoded message payload.
    pub payload: Bytes,
}

/// Logical session status reported by the coordinator.
///
/// The wire allows more codes than the client cares about; anything unknown
/// lands in the not-ready bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// A session with the coordinator is established.
    HaveSession,
    /// No session.
    NoSession,
    /// Waiting in the coordinator's logon queue.
    LogonQueue,
    /// The upstream service itself is unreachable.
    NoUpstream,
}

impl ConnectionStatus {
    /// Map a wire status code onto the known variants.
    #[must_use]
    pub const fn from_code(code: u64) -> Self {
        match code {
            0 => Self::HaveSession,
            2 => Self::LogonQueue,
            3 => Self::NoUpstream,
            _ => Self::NoSession,
        }
    }

    /// Whether this status counts as a live session.
    #[must_use]
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::HaveSession)
    }
}

/// Launcher mode the client was built for; selects the hello variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LauncherKind {
    /// Regular launcher; hello carries the client version.
    #[default]
    Standard,
    /// Partner launcher; hello carries the launcher code instead.
    Partner,
}

impl LauncherKind {
    /// Wire code for this launcher.
    #[must_use]
    pub const fn code(self) -> u64 {
        match self {
            Self::Standard => 0,
            Self::Partner => 1,
        }
    }
}
