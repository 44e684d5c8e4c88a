//! Render coordinator: the freshness state machine in front of the worker
//! pool.
//!
//! A request either hits a fresh snapshot, rides out a stale one while a
//! background refresh runs, or blocks on a fresh render. Renders are
//! deduplicated per fingerprint through the pending registry; replies arrive
//! via [`RenderCoordinator::handle_reply`] from the bus reply pump.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::domain::error::ErrorKind;
use crate::domain::snapshot::{
    CacheTier, DeviceType, Freshness, RenderType, Snapshot, SnapshotKey,
};

use super::bus::{RenderJob, RenderReply, WorkerBus};
use super::error::GatewayError;
use super::pending::{BeginOrJoin, Fingerprint, PendingRenders, RenderOutcome};
use super::repos::SnapshotsRepo;

/// Normalized coordinator input, independent of HTTP mode.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    /// Origin, e.g. `https://example.com`.
    pub site: String,
    /// Site-relative path including any query string.
    pub path: String,
    pub device_type: DeviceType,
    pub render_type: RenderType,
    pub callback_url: Option<String>,
    pub no_wait: bool,
    pub refresh: bool,
    pub meta_only: bool,
}

impl RenderRequest {
    pub fn key(&self) -> SnapshotKey {
        SnapshotKey {
            site: self.site.clone(),
            path: self.path.clone(),
            device_type: self.device_type,
            render_type: self.render_type,
        }
    }

    fn fingerprint(&self) -> Fingerprint {
        Fingerprint {
            key: self.key(),
            callback_url: self.callback_url.clone(),
        }
    }
}

/// Successful coordinator result.
#[derive(Debug)]
pub enum RenderOutput {
    /// A snapshot is available; `tier` names how it was obtained.
    Ready {
        snapshot: Snapshot,
        tier: CacheTier,
    },
    /// `no_wait` dispatch: the job is queued, nothing to return yet.
    Accepted,
}

/// Freshness windows and timeouts the coordinator operates under.
#[derive(Debug, Clone, Copy)]
pub struct CoordinatorConfig {
    pub maxage: Duration,
    pub s_maxage: Duration,
    pub worker_timeout: Duration,
    pub callback_attempt_timeout: Duration,
}

// Initial POST plus retries at these offsets.
const CALLBACK_RETRY_DELAYS: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(4),
    Duration::from_secs(16),
];

pub struct RenderCoordinator {
    snapshots: Arc<dyn SnapshotsRepo>,
    bus: Arc<dyn WorkerBus>,
    pending: Arc<PendingRenders>,
    http: reqwest::Client,
    config: CoordinatorConfig,
}

impl RenderCoordinator {
    pub fn new(
        snapshots: Arc<dyn SnapshotsRepo>,
        bus: Arc<dyn WorkerBus>,
        pending: Arc<PendingRenders>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            snapshots,
            bus,
            pending,
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn pending(&self) -> &Arc<PendingRenders> {
        &self.pending
    }

    /// Serve a render request per the freshness state machine.
    pub async fn render(self: &Arc<Self>, request: RenderRequest) -> Result<RenderOutput, GatewayError> {
        if !request.refresh {
            if let Some(snapshot) = self.snapshots.get(&request.key()).await? {
                match snapshot.freshness(OffsetDateTime::now_utc()) {
                    Freshness::Fresh => {
                        return Ok(RenderOutput::Ready {
                            snapshot,
                            tier: CacheTier::Fresh,
                        });
                    }
                    Freshness::Stale => {
                        self.spawn_background_refresh(&request, snapshot.clone());
                        return Ok(RenderOutput::Ready {
                            snapshot,
                            tier: CacheTier::StaleRevalidating,
                        });
                    }
                    Freshness::Expired => {}
                }
            }
        }

        self.dispatch(request).await
    }

    /// Register (or join) the in-flight render and, unless `no_wait`, block
    /// on its outcome up to the worker timeout.
    async fn dispatch(self: &Arc<Self>, request: RenderRequest) -> Result<RenderOutput, GatewayError> {
        let begin = self.begin(&request).await?;

        if request.no_wait {
            return Ok(RenderOutput::Accepted);
        }

        match tokio::time::timeout(self.config.worker_timeout, begin.receiver).await {
            Err(_) => {
                self.pending.fail(
                    begin.correlation_id,
                    ErrorKind::ServerWorkerTimeout,
                    "render worker did not reply in time",
                );
                Err(GatewayError::new(
                    ErrorKind::ServerWorkerTimeout,
                    "render worker did not reply in time",
                ))
            }
            Ok(Err(_closed)) => Err(GatewayError::internal("render waiter channel closed")),
            Ok(Ok(RenderOutcome::Rendered(snapshot))) => Ok(RenderOutput::Ready {
                snapshot,
                tier: CacheTier::Updated,
            }),
            Ok(Ok(RenderOutcome::Failed { kind, message })) => {
                Err(GatewayError::new(kind, message))
            }
        }
    }

    /// Leader election plus publish. Joiners skip the publish entirely.
    async fn begin(self: &Arc<Self>, request: &RenderRequest) -> Result<BeginOrJoin, GatewayError> {
        let fingerprint = request.fingerprint();
        let begin = self.pending.begin_or_join(fingerprint.clone());

        if begin.leader {
            let job = RenderJob {
                correlation_id: begin.correlation_id,
                reply_topic: self.bus.reply_topic().to_string(),
                url: request.key().url(),
                device_type: request.device_type,
                render_type: request.render_type,
                callback_url: request.callback_url.clone(),
                meta_only: request.meta_only,
            };

            if let Err(err) = self.bus.publish(&job).await {
                self.pending.fail(
                    begin.correlation_id,
                    ErrorKind::ServerInternalError,
                    err.to_string(),
                );
                return Err(GatewayError::internal(format!("job publish failed: {err}")));
            }

            debug!(
                target = "kasha::coordinator",
                correlation_id = %begin.correlation_id,
                url = %job.url,
                "render job published"
            );

            if let Some(callback_url) = request.callback_url.clone() {
                self.spawn_callback_observer(fingerprint, callback_url);
            }
        }

        Ok(begin)
    }

    /// Apply one bus reply: persist the snapshot, then wake the waiters.
    /// Replies for already-completed correlation ids are discarded.
    pub async fn handle_reply(&self, reply: RenderReply) {
        let Some(fingerprint) = self.pending.fingerprint_for(reply.correlation_id) else {
            debug!(
                target = "kasha::coordinator",
                correlation_id = %reply.correlation_id,
                "ignoring duplicate or late reply"
            );
            return;
        };

        if !reply.ok {
            let kind = reply
                .error_kind
                .as_deref()
                .map(ErrorKind::from_worker)
                .unwrap_or(ErrorKind::ServerRenderError);
            let message = reply
                .error_message
                .unwrap_or_else(|| "render worker reported an error".to_string());
            self.pending.fail(reply.correlation_id, kind, message);
            return;
        }

        match reply.snapshot {
            Some(mut snapshot) => {
                snapshot.stamp(
                    OffsetDateTime::now_utc(),
                    self.config.maxage,
                    self.config.s_maxage,
                );
                if let Err(violation) = snapshot.check_invariants() {
                    self.pending.fail(
                        reply.correlation_id,
                        ErrorKind::ServerRenderError,
                        format!("worker produced an inconsistent snapshot: {violation}"),
                    );
                    return;
                }
                if let Err(err) = self.snapshots.put(&fingerprint.key, &snapshot).await {
                    self.pending.fail(
                        reply.correlation_id,
                        ErrorKind::ServerInternalError,
                        format!("snapshot persist failed: {err}"),
                    );
                    return;
                }
                self.pending.complete_rendered(reply.correlation_id, snapshot);
            }
            // Oversized payload: the worker stored the snapshot itself and
            // replied with the key only.
            None => match self.snapshots.get(&fingerprint.key).await {
                Ok(Some(snapshot)) => {
                    self.pending.complete_rendered(reply.correlation_id, snapshot);
                }
                Ok(None) => {
                    self.pending.fail(
                        reply.correlation_id,
                        ErrorKind::ServerInternalError,
                        "worker reported success but no snapshot was stored",
                    );
                }
                Err(err) => {
                    self.pending.fail(
                        reply.correlation_id,
                        ErrorKind::ServerInternalError,
                        format!("snapshot read-back failed: {err}"),
                    );
                }
            },
        }
    }

    /// Dispatch a refresh for a stale snapshot without holding up the caller.
    /// A failed refresh re-puts the stale snapshot (its render time
    /// untouched) so the janitor keeps serving material alive.
    fn spawn_background_refresh(self: &Arc<Self>, request: &RenderRequest, stale: Snapshot) {
        let coordinator = Arc::clone(self);
        let mut request = request.clone();
        request.no_wait = false;
        request.refresh = true;

        tokio::spawn(async move {
            let key = request.key();
            let begin = match coordinator.begin(&request).await {
                Ok(begin) => begin,
                Err(err) => {
                    warn!(
                        target = "kasha::coordinator",
                        key = %key,
                        error = %err,
                        "background refresh dispatch failed"
                    );
                    return;
                }
            };

            let refreshed = matches!(
                tokio::time::timeout(coordinator.config.worker_timeout, begin.receiver).await,
                Ok(Ok(RenderOutcome::Rendered(_)))
            );

            if !refreshed {
                warn!(
                    target = "kasha::coordinator",
                    key = %key,
                    "background refresh failed; extending stale snapshot"
                );
                if let Err(err) = coordinator.snapshots.put(&key, &stale).await {
                    warn!(
                        target = "kasha::coordinator",
                        key = %key,
                        error = %err,
                        "could not extend stale snapshot"
                    );
                }
            }
        });
    }

    /// Observe the outcome of an in-flight render and POST it to the caller's
    /// callback URL. Callback failures never affect the primary response.
    fn spawn_callback_observer(self: &Arc<Self>, fingerprint: Fingerprint, callback_url: String) {
        let Some(receiver) = self.pending.join(&fingerprint) else {
            return;
        };
        let coordinator = Arc::clone(self);

        tokio::spawn(async move {
            // The sweep task resolves the entry at the worker timeout; the
            // doubled bound here only guards against a missed sweep.
            let outcome =
                tokio::time::timeout(coordinator.config.worker_timeout * 2, receiver).await;

            let (ok, error_kind) = match outcome {
                Ok(Ok(RenderOutcome::Rendered(_))) => (true, None),
                Ok(Ok(RenderOutcome::Failed { kind, .. })) => (false, Some(kind.code())),
                _ => (false, Some(ErrorKind::ServerWorkerTimeout.code())),
            };

            coordinator
                .post_callback(&callback_url, ok, &fingerprint.key, error_kind)
                .await;
        });
    }

    async fn post_callback(
        &self,
        callback_url: &str,
        ok: bool,
        key: &SnapshotKey,
        error_kind: Option<&'static str>,
    ) {
        let body = json!({
            "ok": ok,
            "key": key,
            "errorKind": error_kind,
        });

        let mut attempt = 0usize;
        loop {
            let sent = self
                .http
                .post(callback_url)
                .timeout(self.config.callback_attempt_timeout)
                .json(&body)
                .send()
                .await;

            match sent {
                Ok(response) if response.status().is_success() => return,
                Ok(response) => {
                    debug!(
                        target = "kasha::coordinator",
                        callback_url,
                        status = response.status().as_u16(),
                        attempt,
                        "callback rejected"
                    );
                }
                Err(err) => {
                    debug!(
                        target = "kasha::coordinator",
                        callback_url,
                        error = %err,
                        attempt,
                        "callback attempt failed"
                    );
                }
            }

            let Some(delay) = CALLBACK_RETRY_DELAYS.get(attempt) else {
                warn!(
                    target = "kasha::coordinator",
                    callback_url, "callback retries exhausted"
                );
                return;
            };
            tokio::time::sleep(*delay).await;
            attempt += 1;
        }
    }
}
