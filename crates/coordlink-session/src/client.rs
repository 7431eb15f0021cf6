//! The coordinator session client.
//!
//! Owns the connection state machine, the keep-alive retry loop, job
//! correlation and the inbound dispatcher. The transport and the message
//! schema are injected; see `coordlink-transport` for the seams.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use coordlink_cache::SoCache;
use coordlink_core::{
    ChannelKey, ConnectionStatus, Event, EventBus, FrameHeader, InboundFrame, LauncherKind,
    MessageRegistry, MsgTypeId, ObjectCatalog, OutboundFrame, Record,
    frame::{CLIENT_VERSION, msg},
};
use coordlink_transport::{Transport, TransportError, TransportEvent};
use serde_json::{Value, json};
use thiserror::Error;
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};

use crate::jobs::{JobCounter, JobHandle};

/// Client-side failure surfaced to callers.
///
/// Protocol-level garbage (unknown ids, undecodable payloads) is logged and
/// dropped instead; it never reaches this type.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The field mapping for a send was not a plain JSON object.
    #[error("message fields must be a JSON object")]
    InvalidFields,
    /// No encoder could be resolved for the message type.
    #[error("no encoder for message type {0}")]
    NoEncoder(MsgTypeId),
    /// The transport refused the frame.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    /// A correlated wait expired and the caller asked for an error.
    #[error("timed out waiting for a response")]
    Timeout,
    /// The awaited channel was scrubbed (correlation id reuse).
    #[error("correlation channel closed")]
    ChannelClosed,
}

/// Static client parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientConfig {
    /// Application id this client plays as; a foreign id in a now-playing
    /// report drops the session.
    pub app_id: u32,
    /// Launcher mode, decides the hello variant.
    pub launcher: LauncherKind,
}

#[derive(Debug)]
struct SessionState {
    status: ConnectionStatus,
    ready: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            status: ConnectionStatus::NoSession,
            ready: false,
        }
    }
}

enum ReadyEdge {
    Ready,
    NotReady,
}

/// Client-side engine for a logical session with a remote coordinator.
pub struct CoordinatorClient {
    bus: Arc<EventBus>,
    registry: Arc<dyn MessageRegistry>,
    transport: Arc<dyn Transport>,
    cache: SoCache,
    config: ClientConfig,
    state: Mutex<SessionState>,
    jobs: JobCounter,
    retry_loop: Mutex<Option<JoinHandle<()>>>,
}

impl CoordinatorClient {
    /// Build a client over the given transport and schema.
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        registry: Arc<dyn MessageRegistry>,
        catalog: Arc<dyn ObjectCatalog>,
        config: ClientConfig,
    ) -> Arc<Self> {
        let bus = Arc::new(EventBus::new());
        let cache = SoCache::new(Arc::clone(&bus), catalog);
        Arc::new(Self {
            bus,
            registry,
            transport,
            cache,
            config,
            state: Mutex::new(SessionState::default()),
            jobs: JobCounter::new(),
            retry_loop: Mutex::new(None),
        })
    }

    /// The event bus carrying message, job and cache-change channels.
    #[must_use]
    pub const fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// The shared-object cache replica.
    #[must_use]
    pub const fn cache(&self) -> &SoCache {
        &self.cache
    }

    /// Whether a session with the coordinator is established.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state.lock().unwrap().ready
    }

    /// Current session status; [`ConnectionStatus::NoSession`] until the
    /// coordinator reports otherwise.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.state.lock().unwrap().status
    }

    /// Start the keep-alive retry loop. No-op if already launched.
    pub fn launch(self: &Arc<Self>) {
        let mut guard = self.retry_loop.lock().unwrap();
        if guard.is_some() {
            return;
        }
        tracing::debug!("starting keep-alive loop");
        let client = Arc::clone(self);
        *guard = Some(tokio::spawn(client.knock_loop()));
    }

    /// Stop the retry loop and drop the session. Safe to call when not
    /// launched.
    pub fn exit(&self) {
        self.stop_retry_loop();
        self.set_connection_status(ConnectionStatus::NoSession);
    }

    /// Spawn the inbound pump consuming transport events.
    pub fn attach(
        self: &Arc<Self>,
        mut events: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> JoinHandle<()> {
        let client = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                client.handle_event(&event);
            }
        })
    }

    /// Process one transport notification.
    pub fn handle_event(&self, event: &TransportEvent) {
        match event {
            TransportEvent::Frame(frame) => self.handle_frame(frame),
            TransportEvent::Disconnected => self.handle_disconnect(),
            TransportEvent::NowPlaying { app_id } => self.handle_now_playing(*app_id),
        }
    }

    /// Dispatch one inbound frame.
    ///
    /// Unknown or undecodable frames are logged and dropped; a long-lived
    /// session sees schema drift, so this is steady-state, not failure.
    pub fn handle_frame(&self, frame: &InboundFrame) {
        let Some(record) = self.registry.decode(frame.msg_type, &frame.payload) else {
            tracing::warn!(msg_type = frame.msg_type, "no decoder for frame, dropping");
            return;
        };
        tracing::debug!(msg_type = frame.msg_type, "incoming");
        let record = Arc::new(record);

        match frame.msg_type {
            msg::CONNECTION_STATUS => {
                if let Some(code) = record.u64("status") {
                    self.set_connection_status(ConnectionStatus::from_code(code));
                }
            }
            msg::CLIENT_WELCOME => self.on_welcome(&record),
            msg::SO_CREATE => self.cache.handle_create(&record),
            msg::SO_UPDATE => self.cache.handle_update(&record),
            msg::SO_DESTROY => self.cache.handle_destroy(&record),
            msg::SO_UPDATE_MULTIPLE => self.cache.handle_update_multiple(&record),
            msg::SO_CACHE_SUBSCRIBED => self.cache.handle_cache_subscribed(&record),
            msg::SO_CACHE_UNSUBSCRIBED => self.cache.handle_cache_unsubscribed(&record),
            _ => {}
        }

        self.bus.publish(
            &ChannelKey::Message(frame.msg_type),
            Event::Message(Arc::clone(&record)),
        );
        if frame.header.has_target() {
            self.bus.publish(
                &ChannelKey::Job(frame.header.target_job_id),
                Event::Message(record),
            );
        }
    }

    /// Send a message with no correlation.
    ///
    /// # Errors
    /// Fails synchronously when `fields` is not a JSON object or no encoder
    /// resolves for the type; transport errors pass through.
    pub async fn send(&self, msg_type: MsgTypeId, fields: Value) -> Result<(), ClientError> {
        self.send_inner(msg_type, fields, None, None).await
    }

    /// Send with an explicit codec instead of the configured registry.
    ///
    /// # Errors
    /// Same conditions as [`Self::send`].
    pub async fn send_with(
        &self,
        msg_type: MsgTypeId,
        fields: Value,
        codec: &dyn MessageRegistry,
    ) -> Result<(), ClientError> {
        self.send_inner(msg_type, fields, Some(codec), None).await
    }

    /// Send a message as a correlated job.
    ///
    /// Scrubs any stale listeners left under the (possibly wrapped-around)
    /// id, subscribes before sending, and returns the handle to await.
    ///
    /// # Errors
    /// Same conditions as [`Self::send`].
    pub async fn send_job(&self, msg_type: MsgTypeId, fields: Value) -> Result<JobHandle, ClientError> {
        self.send_job_inner(msg_type, fields, None).await
    }

    /// Send a correlated job with an explicit codec instead of the
    /// configured registry.
    ///
    /// # Errors
    /// Same conditions as [`Self::send`].
    pub async fn send_job_with(
        &self,
        msg_type: MsgTypeId,
        fields: Value,
        codec: &dyn MessageRegistry,
    ) -> Result<JobHandle, ClientError> {
        self.send_job_inner(msg_type, fields, Some(codec)).await
    }

    async fn send_job_inner(
        &self,
        msg_type: MsgTypeId,
        fields: Value,
        codec: Option<&dyn MessageRegistry>,
    ) -> Result<JobHandle, ClientError> {
        let id = self.jobs.next();
        let key = ChannelKey::Job(u64::from(id));
        self.bus.reset(&key);
        let receiver = self.bus.subscribe(key);

        self.send_inner(msg_type, fields, codec, Some(id)).await?;
        Ok(JobHandle { id, receiver })
    }

    /// Wait for the response to a correlated request.
    ///
    /// # Errors
    /// [`ClientError::Timeout`] when the wait expires and `fail_on_timeout`
    /// is set (otherwise `Ok(None)`); [`ClientError::ChannelClosed`] when
    /// the job channel was scrubbed by id reuse.
    pub async fn wait_response(
        &self,
        handle: &mut JobHandle,
        timeout: Duration,
        fail_on_timeout: bool,
    ) -> Result<Option<Arc<Record>>, ClientError> {
        Self::await_channel(&mut handle.receiver, timeout, fail_on_timeout).await
    }

    /// Wait for the next message of a type.
    ///
    /// # Errors
    /// Same timeout contract as [`Self::wait_response`].
    pub async fn wait_message(
        &self,
        msg_type: MsgTypeId,
        timeout: Duration,
        fail_on_timeout: bool,
    ) -> Result<Option<Arc<Record>>, ClientError> {
        let mut receiver = self.bus.subscribe(ChannelKey::Message(msg_type));
        Self::await_channel(&mut receiver, timeout, fail_on_timeout).await
    }

    async fn await_channel(
        receiver: &mut broadcast::Receiver<Event>,
        timeout: Duration,
        fail_on_timeout: bool,
    ) -> Result<Option<Arc<Record>>, ClientError> {
        let wait = tokio::time::timeout(timeout, async {
            loop {
                match receiver.recv().await {
                    Ok(Event::Message(record)) => break Ok(record),
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "waiter lagged behind");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break Err(ClientError::ChannelClosed);
                    }
                }
            }
        })
        .await;

        match wait {
            Ok(Ok(record)) => Ok(Some(record)),
            Ok(Err(e)) => Err(e),
            Err(_) if fail_on_timeout => Err(ClientError::Timeout),
            Err(_) => Ok(None),
        }
    }

    async fn send_inner(
        &self,
        msg_type: MsgTypeId,
        fields: Value,
        codec: Option<&dyn MessageRegistry>,
        job: Option<u16>,
    ) -> Result<(), ClientError> {
        let Value::Object(fields) = fields else {
            return Err(ClientError::InvalidFields);
        };
        let codec = codec.unwrap_or_else(|| self.registry.as_ref());
        let payload = codec
            .encode(msg_type, &fields)
            .ok_or(ClientError::NoEncoder(msg_type))?;

        let header = job.map_or_else(FrameHeader::default, FrameHeader::for_job);
        tracing::debug!(msg_type, job, "outgoing");
        self.transport
            .send(OutboundFrame {
                msg_type,
                header,
                payload,
            })
            .await?;
        Ok(())
    }

    /// Keep-alive retry loop.
    ///
    /// While not ready: hello, then wait `3 + 2^n` seconds (n capped at 4)
    /// for the ready edge. While ready: park until the not-ready edge, then
    /// a short grace pause before knocking again.
    async fn knock_loop(self: Arc<Self>) {
        let mut n: u32 = 1;
        loop {
            if self.is_ready() {
                let mut not_ready = self.bus.subscribe(ChannelKey::NotReady);
                if self.is_ready() {
                    let _ = not_ready.recv().await;
                }
                n = 1;
                tokio::time::sleep(Duration::from_secs(1)).await;
            } else {
                let mut ready = self.bus.subscribe(ChannelKey::Ready);
                if let Err(e) = self.send_hello().await {
                    tracing::warn!("hello failed: {e}");
                }
                if !self.is_ready() {
                    let backoff = Duration::from_secs(3 + (1u64 << n));
                    let _ = tokio::time::timeout(backoff, ready.recv()).await;
                }
                n = (n + 1).min(4);
            }
        }
    }

    async fn send_hello(&self) -> Result<(), ClientError> {
        match self.config.launcher {
            LauncherKind::Standard => {
                self.send(msg::CLIENT_HELLO, json!({ "version": CLIENT_VERSION }))
                    .await
            }
            LauncherKind::Partner => {
                self.send(
                    msg::CLIENT_HELLO_PARTNER,
                    json!({ "client_launcher": self.config.launcher.code() }),
                )
                .await
            }
        }
    }

    fn handle_disconnect(&self) {
        tracing::debug!("transport disconnected");
        self.stop_retry_loop();
        self.set_connection_status(ConnectionStatus::NoSession);
    }

    fn handle_now_playing(&self, app_id: u32) {
        if self.is_ready() && app_id != self.config.app_id {
            tracing::debug!(app_id, "foreground session taken by another application");
            self.set_connection_status(ConnectionStatus::NoSession);
        }
    }

    /// Welcome forces the session ready, surfaces the embedded bootstrap
    /// payload and replays the bundled out-of-date caches.
    fn on_welcome(&self, record: &Arc<Record>) {
        self.set_connection_status(ConnectionStatus::HaveSession);

        match record
            .bytes("bootstrap")
            .and_then(|data| self.registry.decode(msg::WELCOME_BOOTSTRAP, &data))
        {
            Some(bootstrap) => {
                tracing::debug!("welcome bootstrap decoded");
                self.bus
                    .publish(&ChannelKey::Welcome, Event::Message(Arc::new(bootstrap)));
            }
            None => tracing::warn!("welcome without decodable bootstrap payload"),
        }

        self.cache.handle_welcome(record);
    }

    fn set_connection_status(&self, status: ConnectionStatus) {
        let (changed, edge) = {
            let mut state = self.state.lock().unwrap();
            let changed = state.status != status;
            state.status = status;
            let edge = if status.is_ready() && !state.ready {
                state.ready = true;
                Some(ReadyEdge::Ready)
            } else if !status.is_ready() && state.ready {
                state.ready = false;
                Some(ReadyEdge::NotReady)
            } else {
                None
            };
            (changed, edge)
        };

        if changed {
            tracing::debug!(?status, "connection status changed");
            self.bus
                .publish(&ChannelKey::ConnectionStatus, Event::Status(status));
        }
        match edge {
            Some(ReadyEdge::Ready) => {
                // fresh session: the coordinator resends full state
                self.cache.clear_all();
                self.bus.publish(&ChannelKey::Ready, Event::Signal);
            }
            Some(ReadyEdge::NotReady) => {
                self.bus.publish(&ChannelKey::NotReady, Event::Signal);
            }
            None => {}
        }
    }

    fn stop_retry_loop(&self) {
        if let Some(handle) = self.retry_loop.lock().unwrap().take() {
            handle.abort();
        }
    }
}

impl Drop for CoordinatorClient {
    fn drop(&mut self) {
        self.stop_retry_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
    use bytes::Bytes;
    use coordlink_core::{NO_TARGET, ObjectKey};
    use coordlink_transport::loopback::{self, LoopbackRemote};
    use coordlink_transport::{JsonRegistry, StaticCatalog};
    use serde_json::Value;
    use tokio_test::assert_ok;

    const APP_ID: u32 = 730;
    const ITEM: u32 = 1;

    fn setup(launcher: LauncherKind) -> (Arc<CoordinatorClient>, LoopbackRemote) {
        let (transport, events, remote) = loopback::pair();
        let client = CoordinatorClient::new(
            Arc::new(transport),
            Arc::new(JsonRegistry::new()),
            Arc::new(StaticCatalog::new().keyed(ITEM, ["id"])),
            ClientConfig {
                app_id: APP_ID,
                launcher,
            },
        );
        let _pump = client.attach(events);
        (client, remote)
    }

    fn inbound(msg_type: MsgTypeId, target: u64, value: &Value) -> InboundFrame {
        InboundFrame {
            msg_type,
            header: FrameHeader {
                source_job_id: NO_TARGET,
                target_job_id: target,
            },
            payload: Bytes::from(serde_json::to_vec(value).unwrap()),
        }
    }

    fn status_frame(code: u64) -> InboundFrame {
        inbound(msg::CONNECTION_STATUS, NO_TARGET, &json!({"status": code}))
    }

    fn b64(value: &Value) -> String {
        BASE64.encode(serde_json::to_vec(value).unwrap())
    }

    #[tokio::test]
    async fn sentinel_target_publishes_only_on_type_channel() {
        let (client, _remote) = setup(LauncherKind::Standard);
        let mut type_rx = client.bus().subscribe(ChannelKey::Message(5000));
        let mut job_rx = client.bus().subscribe(ChannelKey::Job(NO_TARGET));

        client.handle_frame(&inbound(5000, NO_TARGET, &json!({"x": 1})));

        assert!(matches!(type_rx.try_recv(), Ok(Event::Message(_))));
        assert!(job_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn job_response_carries_the_same_record_instance() {
        let (client, mut remote) = setup(LauncherKind::Standard);
        let mut type_rx = client.bus().subscribe(ChannelKey::Message(5001));

        let mut handle = client.send_job(5000, json!({"ask": true})).await.unwrap();
        let sent = remote.next_sent().await.unwrap();
        assert_eq!(sent.header.source_job_id, u64::from(handle.id));
        assert!(!sent.header.has_target());

        client.handle_frame(&inbound(
            5001,
            u64::from(handle.id),
            &json!({"answer": 42}),
        ));

        let response = client
            .wait_response(&mut handle, Duration::from_secs(1), true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.u64("answer"), Some(42));

        let Ok(Event::Message(type_copy)) = type_rx.try_recv() else {
            panic!("type channel missed the frame");
        };
        assert!(Arc::ptr_eq(&response, &type_copy));
    }

    #[tokio::test]
    async fn undecodable_frames_are_dropped() {
        let (transport, events, _remote) = loopback::pair();
        let client = CoordinatorClient::new(
            Arc::new(transport),
            Arc::new(JsonRegistry::with_types([5000])),
            Arc::new(StaticCatalog::new()),
            ClientConfig::default(),
        );
        let _pump = client.attach(events);
        let mut rx = client.bus().subscribe(ChannelKey::Message(9999));

        client.handle_frame(&inbound(9999, NO_TARGET, &json!({"x": 1})));

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn status_edges_fire_exactly_once_per_category_change() {
        let (client, _remote) = setup(LauncherKind::Standard);
        let mut ready_rx = client.bus().subscribe(ChannelKey::Ready);
        let mut not_ready_rx = client.bus().subscribe(ChannelKey::NotReady);
        let mut status_rx = client.bus().subscribe(ChannelKey::ConnectionStatus);

        client.handle_frame(&status_frame(0));
        client.handle_frame(&status_frame(0)); // repeat, same category
        client.handle_frame(&status_frame(2)); // logon queue, not ready
        client.handle_frame(&status_frame(1)); // still not ready

        assert_eq!(client.status(), ConnectionStatus::NoSession);
        assert!(ready_rx.try_recv().is_ok());
        assert!(ready_rx.try_recv().is_err(), "ready fired more than once");
        assert!(not_ready_rx.try_recv().is_ok());
        assert!(not_ready_rx.try_recv().is_err());

        // status event fires on value changes: 0, 2, 1
        let mut status_changes = 0;
        while status_rx.try_recv().is_ok() {
            status_changes += 1;
        }
        assert_eq!(status_changes, 3);
    }

    #[tokio::test]
    async fn ready_cycle_clears_cache_between_sessions() {
        let (client, _remote) = setup(LauncherKind::Standard);

        client.handle_frame(&status_frame(0));
        client.handle_frame(&inbound(
            msg::SO_CREATE,
            NO_TARGET,
            &json!({"type_id": ITEM, "object_data": b64(&json!({"id": 5}))}),
        ));
        assert!(client.cache().get(ITEM, &ObjectKey::from(5)).is_some());

        client.handle_frame(&status_frame(1));
        client.handle_frame(&status_frame(0));

        assert!(
            client.cache().get(ITEM, &ObjectKey::from(5)).is_none(),
            "stale object survived into the new session"
        );
    }

    #[tokio::test]
    async fn welcome_forces_ready_and_replays_caches() {
        let (client, _remote) = setup(LauncherKind::Standard);
        let mut welcome_rx = client.bus().subscribe(ChannelKey::Welcome);

        client.handle_frame(&inbound(
            msg::CLIENT_WELCOME,
            NO_TARGET,
            &json!({
                "bootstrap": b64(&json!({"motd": "hello"})),
                "outofdate_caches": [{
                    "owner": {"type": 2, "id": 7},
                    "version": 1,
                    "objects": [{"type_id": ITEM, "object_data": [b64(&json!({"id": 3}))]}],
                }],
            }),
        ));

        assert!(client.is_ready());
        let Ok(Event::Message(bootstrap)) = welcome_rx.try_recv() else {
            panic!("no welcome event");
        };
        assert_eq!(bootstrap.str("motd"), Some("hello"));
        assert!(client.cache().get(ITEM, &ObjectKey::from(3)).is_some());
    }

    #[tokio::test]
    async fn disconnect_drops_session_and_retry_loop() {
        let (client, remote) = setup(LauncherKind::Standard);
        let mut not_ready_rx = client.bus().subscribe(ChannelKey::NotReady);

        client.handle_frame(&status_frame(0));
        remote.disconnect();
        // the pump runs on the same runtime; yield until it drains
        while client.is_ready() {
            tokio::task::yield_now().await;
        }

        assert!(not_ready_rx.recv().await.is_ok());
        assert_eq!(client.status(), ConnectionStatus::NoSession);
    }

    #[tokio::test]
    async fn foreign_now_playing_drops_session() {
        let (client, _remote) = setup(LauncherKind::Standard);
        client.handle_frame(&status_frame(0));

        client.handle_event(&TransportEvent::NowPlaying { app_id: APP_ID });
        assert!(client.is_ready(), "own app id must not drop the session");

        client.handle_event(&TransportEvent::NowPlaying { app_id: 570 });
        assert!(!client.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_response_timeout_honors_caller_preference() {
        let (client, mut remote) = setup(LauncherKind::Standard);

        let mut handle = client.send_job(5000, json!({})).await.unwrap();
        let _ = remote.next_sent().await;

        let silent = client
            .wait_response(&mut handle, Duration::from_secs(5), false)
            .await;
        assert!(matches!(silent, Ok(None)));

        let raised = client
            .wait_response(&mut handle, Duration::from_secs(5), true)
            .await;
        assert!(matches!(raised, Err(ClientError::Timeout)));
    }

    #[tokio::test]
    async fn send_validates_fields_and_encoder() {
        let (transport, _events, _remote) = loopback::pair();
        let client = CoordinatorClient::new(
            Arc::new(transport),
            Arc::new(JsonRegistry::with_types([5000])),
            Arc::new(StaticCatalog::new()),
            ClientConfig::default(),
        );

        let bad_shape = client.send(5000, json!([1, 2])).await;
        assert!(matches!(bad_shape, Err(ClientError::InvalidFields)));

        let no_encoder = client.send(9999, json!({})).await;
        assert!(matches!(no_encoder, Err(ClientError::NoEncoder(9999))));

        // explicit codec override bypasses the restricted registry
        let permissive = JsonRegistry::new();
        tokio_test::assert_ok!(client.send_with(9999, json!({"a": 1}), &permissive).await);
    }

    #[tokio::test]
    async fn job_send_honors_codec_override() {
        let (transport, events, mut remote) = loopback::pair();
        let client = CoordinatorClient::new(
            Arc::new(transport),
            Arc::new(JsonRegistry::with_types([5000])),
            Arc::new(StaticCatalog::new()),
            ClientConfig::default(),
        );
        let _pump = client.attach(events);

        let no_encoder = client.send_job(9999, json!({})).await;
        assert!(matches!(no_encoder, Err(ClientError::NoEncoder(9999))));

        let permissive = JsonRegistry::new();
        let mut handle = client
            .send_job_with(9999, json!({"ask": true}), &permissive)
            .await
            .unwrap();
        let sent = remote.next_sent().await.unwrap();
        assert_eq!(sent.msg_type, 9999);
        assert_eq!(sent.header.source_job_id, u64::from(handle.id));

        client.handle_frame(&inbound(5000, u64::from(handle.id), &json!({"answer": 1})));
        let response = client
            .wait_response(&mut handle, Duration::from_secs(1), true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.u64("answer"), Some(1));
    }

    #[tokio::test]
    async fn initial_no_session_status_is_not_a_change() {
        let (client, _remote) = setup(LauncherKind::Standard);
        let mut status_rx = client.bus().subscribe(ChannelKey::ConnectionStatus);

        assert_eq!(client.status(), ConnectionStatus::NoSession);
        client.exit();

        assert_eq!(client.status(), ConnectionStatus::NoSession);
        assert!(
            status_rx.try_recv().is_err(),
            "redundant no-session write published a status event"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn keep_alive_retries_hello_until_ready() {
        let (client, mut remote) = setup(LauncherKind::Standard);
        client.launch();
        client.launch(); // idempotent

        let first = remote.next_sent().await.unwrap();
        assert_eq!(first.msg_type, msg::CLIENT_HELLO);
        let hello: Value = serde_json::from_slice(&first.payload).unwrap();
        assert_eq!(hello["version"].as_u64(), Some(CLIENT_VERSION));

        // no answer: the paused clock auto-advances through the backoff
        let second = remote.next_sent().await.unwrap();
        assert_eq!(second.msg_type, msg::CLIENT_HELLO);

        // session comes up: the loop parks until the not-ready edge
        let mut ready_rx = client.bus().subscribe(ChannelKey::Ready);
        remote.deliver(status_frame(0));
        assert!(ready_rx.recv().await.is_ok());

        let parked = tokio::time::timeout(Duration::from_secs(120), remote.next_sent()).await;
        assert!(parked.is_err(), "hello sent while session was ready");

        client.exit();
        client.exit(); // idempotent
    }

    #[tokio::test(start_paused = true)]
    async fn partner_launcher_sends_partner_hello() {
        let (client, mut remote) = setup(LauncherKind::Partner);
        client.launch();

        let first = remote.next_sent().await.unwrap();
        assert_eq!(first.msg_type, msg::CLIENT_HELLO_PARTNER);
        let hello: Value = serde_json::from_slice(&first.payload).unwrap();
        assert_eq!(hello["client_launcher"].as_u64(), Some(1));

        client.exit();
    }
}
