//! Worker bus contract: job/reply envelopes and the publishing port.
//!
//! Jobs fan out to the render workers over a competing-consumer topic;
//! replies come back on a per-process topic carried in the job so any worker
//! can answer the instance that asked.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::snapshot::{DeviceType, RenderType, Snapshot, SnapshotKey};

/// Topic consumed by the worker pool.
pub const RENDER_JOBS_TOPIC: &str = "render_jobs";
/// Prefix of the per-process reply topic; the suffix is the instance id.
pub const REPLY_TOPIC_PREFIX: &str = "render_reply.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderJob {
    pub correlation_id: Uuid,
    pub reply_topic: String,
    pub url: String,
    pub device_type: DeviceType,
    #[serde(rename = "type")]
    pub render_type: RenderType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub meta_only: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderReply {
    pub correlation_id: Uuid,
    pub ok: bool,
    /// Absent on failures, and on successes where the worker persisted the
    /// snapshot itself because the payload would exceed the bus size limit;
    /// `key` then says where the snapshot landed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Snapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<SnapshotKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("failed to publish render job: {0}")]
    Publish(String),
    #[error("failed to subscribe to reply topic: {0}")]
    Subscribe(String),
    #[error("failed to decode bus payload: {0}")]
    Decode(String),
}

/// Publishing side of the worker bus. Reply consumption is wired separately
/// at process startup (see `infra::bus`).
#[async_trait]
pub trait WorkerBus: Send + Sync {
    /// Reply topic this gateway instance listens on.
    fn reply_topic(&self) -> &str;

    /// Fire-and-forget publish; the bus provides at-least-once delivery.
    async fn publish(&self, job: &RenderJob) -> Result<(), BusError>;
}
