//! Redis-backed worker bus.
//!
//! Jobs are pushed onto the `render_jobs` list where workers compete with
//! blocking pops (at-least-once). Replies come back on a pub/sub channel
//! exclusive to this gateway instance; the reply pump decodes them and hands
//! each one to the coordinator exactly once.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config as PoolConfig, Pool, Runtime};
use futures::StreamExt;
use redis::AsyncCommands;
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::bus::{
    BusError, REPLY_TOPIC_PREFIX, RENDER_JOBS_TOPIC, RenderJob, WorkerBus,
};
use crate::application::coordinator::RenderCoordinator;

const RECONNECT_DELAY: Duration = Duration::from_secs(1);

pub struct RedisWorkerBus {
    pool: Pool,
    reply_topic: String,
}

impl RedisWorkerBus {
    /// Connect the writer pool and verify the broker answers.
    pub async fn connect(writer_url: &str, instance: Uuid) -> Result<Self, BusError> {
        let pool = PoolConfig::from_url(writer_url)
            .builder()
            .map_err(|err| BusError::Publish(format!("pool builder: {err}")))?
            .max_size(2)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|err| BusError::Publish(format!("pool build: {err}")))?;

        let mut conn = pool
            .get()
            .await
            .map_err(|err| BusError::Publish(format!("connection: {err}")))?;
        let _: String = redis::cmd("PING")
            .query_async(&mut *conn)
            .await
            .map_err(|err| BusError::Publish(format!("ping: {err}")))?;

        info!(target = "kasha::bus", url = %writer_url, "connected bus writer");

        Ok(Self {
            pool,
            reply_topic: format!("{REPLY_TOPIC_PREFIX}{instance}"),
        })
    }
}

#[async_trait]
impl WorkerBus for RedisWorkerBus {
    fn reply_topic(&self) -> &str {
        &self.reply_topic
    }

    async fn publish(&self, job: &RenderJob) -> Result<(), BusError> {
        let payload =
            serde_json::to_string(job).map_err(|err| BusError::Decode(err.to_string()))?;

        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|err| BusError::Publish(format!("connection: {err}")))?;
        conn.lpush::<_, _, ()>(RENDER_JOBS_TOPIC, payload)
            .await
            .map_err(|err| BusError::Publish(err.to_string()))?;

        Ok(())
    }
}

/// Consume the reply channel until shutdown, reconnecting on broker hiccups.
/// Each decoded reply is applied through the coordinator; malformed payloads
/// are logged and dropped.
pub async fn run_reply_pump(
    reader_url: String,
    reply_topic: String,
    coordinator: Arc<RenderCoordinator>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            return;
        }

        match pump_once(&reader_url, &reply_topic, &coordinator, &mut shutdown).await {
            Ok(()) => return,
            Err(err) => {
                warn!(
                    target = "kasha::bus",
                    error = %err,
                    "reply subscription lost; reconnecting"
                );
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
            _ = shutdown.changed() => {}
        }
    }
}

async fn pump_once(
    reader_url: &str,
    reply_topic: &str,
    coordinator: &Arc<RenderCoordinator>,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<(), BusError> {
    let client = redis::Client::open(reader_url)
        .map_err(|err| BusError::Subscribe(err.to_string()))?;
    let mut pubsub = client
        .get_async_pubsub()
        .await
        .map_err(|err| BusError::Subscribe(err.to_string()))?;
    pubsub
        .subscribe(reply_topic)
        .await
        .map_err(|err| BusError::Subscribe(err.to_string()))?;

    info!(target = "kasha::bus", topic = %reply_topic, "reply subscription established");

    let mut messages = pubsub.on_message();
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return Ok(());
                }
            }
            message = messages.next() => {
                let Some(message) = message else {
                    return Err(BusError::Subscribe("reply stream closed".into()));
                };
                let payload: String = message
                    .get_payload()
                    .map_err(|err| BusError::Decode(err.to_string()))?;
                match serde_json::from_str(&payload) {
                    Ok(reply) => coordinator.handle_reply(reply).await,
                    Err(err) => {
                        warn!(
                            target = "kasha::bus",
                            error = %err,
                            "dropping undecodable reply"
                        );
                    }
                }
            }
        }
    }
}
