//! Loopback demo: a scripted coordinator on an in-memory transport.
//!
//! Run with: cargo run -p loopback-demo
//!
//! Shows the full client lifecycle against a fake coordinator: keep-alive
//! hello, welcome with bundled caches, a correlated request/response, and a
//! match share-code round trip.

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use bytes::Bytes;
use coordlink_core::{
    ChangeKind, ChannelKey, FrameHeader, InboundFrame, NO_TARGET, ObjectKey, sharecode,
};
use coordlink_core::frame::msg;
use coordlink_session::{ClientConfig, CoordinatorClient};
use coordlink_transport::{JsonRegistry, StaticCatalog, loopback};
use serde_json::{Value, json};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const APP_ID: u32 = 730;
const ITEM: u32 = 1;
const MATCH_LIST: u32 = 5001;

fn b64(value: &Value) -> String {
    BASE64.encode(serde_json::to_vec(value).unwrap_or_default())
}

fn frame(msg_type: u32, target: u64, value: &Value) -> InboundFrame {
    InboundFrame {
        msg_type,
        header: FrameHeader {
            source_job_id: NO_TARGET,
            target_job_id: target,
        },
        payload: Bytes::from(serde_json::to_vec(value).unwrap_or_default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .init();

    let (transport, events, mut remote) = loopback::pair();
    let client = CoordinatorClient::new(
        Arc::new(transport),
        Arc::new(JsonRegistry::new()),
        Arc::new(StaticCatalog::new().keyed(ITEM, ["id"])),
        ClientConfig {
            app_id: APP_ID,
            ..ClientConfig::default()
        },
    );
    let _pump = client.attach(events);

    let mut new_items = client
        .bus()
        .subscribe(ChannelKey::CacheChange(ChangeKind::New, ITEM));

    // The scripted coordinator: answer the first hello with a welcome that
    // bundles one already-subscribed cache.
    client.launch();
    let hello = remote.next_sent().await.expect("client never said hello");
    tracing::info!(msg_type = hello.msg_type, "coordinator got hello");

    remote.deliver(frame(
        msg::CLIENT_WELCOME,
        NO_TARGET,
        &json!({
            "bootstrap": b64(&json!({"motd": "welcome back"})),
            "outofdate_caches": [{
                "owner": {"type": 2, "id": 42},
                "version": 1,
                "objects": [{"type_id": ITEM, "object_data": [
                    b64(&json!({"id": 100, "name": "season pass"})),
                ]}],
            }],
        }),
    ));

    let item = match new_items.recv().await? {
        coordlink_core::Event::Object(obj) => obj,
        other => anyhow::bail!("unexpected cache event: {other:?}"),
    };
    tracing::info!(
        name = item.read().unwrap().str("name").unwrap_or("?"),
        "cache bootstrapped"
    );

    // A correlated request, answered out of band by the fake coordinator.
    let mut job = client.send_job(5000, json!({"account_id": 7})).await?;
    let request = remote.next_sent().await.expect("request not sent");
    remote.deliver(frame(
        MATCH_LIST,
        request.header.source_job_id,
        &json!({"matches": [3141]}),
    ));

    let response = client
        .wait_response(&mut job, Duration::from_secs(5), true)
        .await?
        .expect("no response");
    tracing::info!(?response, "got correlated response");

    // Share-code utility round trip.
    let code = sharecode::encode(3_141_592_653, 2_718_281_828, 137);
    let decoded = sharecode::decode(&code)?;
    tracing::info!(code, ?decoded, "share code round trip");

    let _ = client.cache().get(ITEM, &ObjectKey::from(100));
    client.exit();
    Ok(())
}
