//! Process-local deduplication of in-flight renders.
//!
//! At most one outbound render job exists per fingerprint; every concurrent
//! request for the same fingerprint joins the in-flight entry and shares its
//! result. Cross-process deduplication is deliberately not attempted:
//! workers are idempotent per snapshot key.

use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::domain::error::ErrorKind;
use crate::domain::snapshot::{Snapshot, SnapshotKey};

/// Identity of a render request for deduplication purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub key: SnapshotKey,
    pub callback_url: Option<String>,
}

/// Terminal result delivered to every waiter of a fingerprint.
#[derive(Debug, Clone)]
pub enum RenderOutcome {
    Rendered(Snapshot),
    Failed { kind: ErrorKind, message: String },
}

struct PendingEntry {
    correlation_id: Uuid,
    published_at: Instant,
    waiters: Vec<oneshot::Sender<RenderOutcome>>,
}

/// Result of [`PendingRenders::begin_or_join`]: whether the caller must
/// publish the job, plus a receiver for the shared outcome.
pub struct BeginOrJoin {
    pub leader: bool,
    pub correlation_id: Uuid,
    pub receiver: oneshot::Receiver<RenderOutcome>,
}

pub struct PendingRenders {
    worker_timeout: Duration,
    by_fingerprint: DashMap<Fingerprint, PendingEntry>,
    by_correlation: DashMap<Uuid, Fingerprint>,
}

impl PendingRenders {
    pub fn new(worker_timeout: Duration) -> Self {
        Self {
            worker_timeout,
            by_fingerprint: DashMap::new(),
            by_correlation: DashMap::new(),
        }
    }

    pub fn worker_timeout(&self) -> Duration {
        self.worker_timeout
    }

    /// Register as leader for an absent fingerprint, or join the in-flight
    /// entry. Every caller receives its own receiver for the shared outcome;
    /// callers that do not intend to wait simply drop it.
    pub fn begin_or_join(&self, fingerprint: Fingerprint) -> BeginOrJoin {
        use dashmap::mapref::entry::Entry;

        let (tx, rx) = oneshot::channel();

        match self.by_fingerprint.entry(fingerprint.clone()) {
            Entry::Vacant(vacant) => {
                let correlation_id = Uuid::new_v4();
                vacant.insert(PendingEntry {
                    correlation_id,
                    published_at: Instant::now(),
                    waiters: vec![tx],
                });
                self.by_correlation.insert(correlation_id, fingerprint);
                BeginOrJoin {
                    leader: true,
                    correlation_id,
                    receiver: rx,
                }
            }
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                entry.waiters.push(tx);
                BeginOrJoin {
                    leader: false,
                    correlation_id: entry.correlation_id,
                    receiver: rx,
                }
            }
        }
    }

    /// Attach one more receiver to an in-flight fingerprint without taking
    /// leadership. Used by the callback observer.
    pub fn join(&self, fingerprint: &Fingerprint) -> Option<oneshot::Receiver<RenderOutcome>> {
        let mut entry = self.by_fingerprint.get_mut(fingerprint)?;
        let (tx, rx) = oneshot::channel();
        entry.waiters.push(tx);
        Some(rx)
    }

    /// Fingerprint currently bound to a correlation id, if still in flight.
    pub fn fingerprint_for(&self, correlation_id: Uuid) -> Option<Fingerprint> {
        self.by_correlation
            .get(&correlation_id)
            .map(|entry| entry.value().clone())
    }

    /// Resolve all waiters and purge the entry. Returns false when the
    /// correlation id is unknown, which makes duplicate bus replies a no-op.
    pub fn complete(&self, correlation_id: Uuid, outcome: RenderOutcome) -> bool {
        let Some((_, fingerprint)) = self.by_correlation.remove(&correlation_id) else {
            debug!(%correlation_id, "discarding reply for unknown correlation id");
            return false;
        };

        if let Some((_, entry)) = self.by_fingerprint.remove(&fingerprint) {
            for waiter in entry.waiters {
                let _ = waiter.send(outcome.clone());
            }
        }
        true
    }

    pub fn complete_rendered(&self, correlation_id: Uuid, snapshot: Snapshot) -> bool {
        self.complete(correlation_id, RenderOutcome::Rendered(snapshot))
    }

    pub fn fail(&self, correlation_id: Uuid, kind: ErrorKind, message: impl Into<String>) -> bool {
        self.complete(
            correlation_id,
            RenderOutcome::Failed {
                kind,
                message: message.into(),
            },
        )
    }

    /// Fail every entry older than the worker timeout. Returns how many were
    /// swept.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<Uuid> = self
            .by_fingerprint
            .iter()
            .filter(|entry| now.duration_since(entry.published_at) > self.worker_timeout)
            .map(|entry| entry.correlation_id)
            .collect();

        let mut swept = 0;
        for correlation_id in expired {
            if self.fail(
                correlation_id,
                ErrorKind::ServerWorkerTimeout,
                "render worker did not reply in time",
            ) {
                swept += 1;
            }
        }
        swept
    }

    pub fn in_flight(&self) -> usize {
        self.by_fingerprint.len()
    }
}
