//! Shared fixtures: an in-memory worker bus and snapshot builders.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use time::OffsetDateTime;
use tokio::sync::mpsc;

use kasha::application::bus::{BusError, RenderJob, RenderReply, WorkerBus};
use kasha::application::coordinator::{CoordinatorConfig, RenderCoordinator, RenderRequest};
use kasha::application::pending::PendingRenders;
use kasha::domain::snapshot::{DeviceType, PageMeta, RenderType, Snapshot, SnapshotTimes};
use kasha::infra::db::memory::MemoryStore;

pub const MAXAGE: Duration = Duration::from_secs(180);
pub const S_MAXAGE: Duration = Duration::from_secs(86_400);

/// Bus double: publishes land on a channel the test drains as "the worker".
pub struct ChannelBus {
    tx: mpsc::UnboundedSender<RenderJob>,
    reply_topic: String,
}

impl ChannelBus {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<RenderJob>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                tx,
                reply_topic: "render_reply.test".to_string(),
            }),
            rx,
        )
    }
}

#[async_trait]
impl WorkerBus for ChannelBus {
    fn reply_topic(&self) -> &str {
        &self.reply_topic
    }

    async fn publish(&self, job: &RenderJob) -> Result<(), BusError> {
        self.tx
            .send(job.clone())
            .map_err(|err| BusError::Publish(err.to_string()))
    }
}

/// Coordinator over a fresh memory store and channel bus.
pub fn gateway_core(
    worker_timeout: Duration,
) -> (
    Arc<RenderCoordinator>,
    Arc<MemoryStore>,
    mpsc::UnboundedReceiver<RenderJob>,
) {
    let store = Arc::new(MemoryStore::new());
    let (bus, jobs) = ChannelBus::new();
    let pending = Arc::new(PendingRenders::new(worker_timeout));
    let coordinator = Arc::new(RenderCoordinator::new(
        store.clone(),
        bus,
        pending,
        CoordinatorConfig {
            maxage: MAXAGE,
            s_maxage: S_MAXAGE,
            worker_timeout,
            callback_attempt_timeout: Duration::from_secs(1),
        },
    ));
    (coordinator, store, jobs)
}

/// Drain jobs forever, answering each with a successful render of `content`.
pub fn spawn_echo_worker(
    coordinator: Arc<RenderCoordinator>,
    mut jobs: mpsc::UnboundedReceiver<RenderJob>,
    content: &'static str,
    delay: Duration,
) {
    tokio::spawn(async move {
        while let Some(job) = jobs.recv().await {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            coordinator
                .handle_reply(rendered_reply(&job, content))
                .await;
        }
    });
}

/// A successful worker reply carrying `content`.
pub fn rendered_reply(job: &RenderJob, content: &str) -> RenderReply {
    RenderReply {
        correlation_id: job.correlation_id,
        ok: true,
        snapshot: Some(worker_snapshot(content)),
        key: None,
        error_kind: None,
        error_message: None,
    }
}

/// Snapshot the way a worker reports it; the coordinator re-stamps the
/// freshness windows on receipt.
pub fn worker_snapshot(content: &str) -> Snapshot {
    let now = OffsetDateTime::now_utc();
    Snapshot {
        status: 200,
        redirect: None,
        meta: PageMeta {
            title: Some("Example".into()),
            ..PageMeta::default()
        },
        open_graph: serde_json::Value::Null,
        links: Vec::new(),
        content: Some(Bytes::copy_from_slice(content.as_bytes())),
        error: None,
        times: SnapshotTimes {
            rendered_at: now,
            updated_at: now,
            last_accessed_at: now,
        },
        private_expires: now,
        shared_expires: now,
    }
}

/// A snapshot rendered `age` ago with the standard windows.
pub fn aged_snapshot(content: &str, age: Duration) -> Snapshot {
    let mut snapshot = worker_snapshot(content);
    snapshot.stamp(OffsetDateTime::now_utc() - age, MAXAGE, S_MAXAGE);
    snapshot
}

pub fn html_request(path: &str) -> RenderRequest {
    RenderRequest {
        site: "https://ex.com".into(),
        path: path.into(),
        device_type: DeviceType::Desktop,
        render_type: RenderType::Html,
        callback_url: None,
        no_wait: false,
        refresh: false,
        meta_only: false,
    }
}
