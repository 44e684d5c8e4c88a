//! In-memory store implementation.
//!
//! Backs the test suite and local development without a Postgres instance.
//! Semantics mirror the Postgres store: `put` stamps `updated_at`, `get`
//! bumps `last_accessed_at`, scans are path-ordered with a keyset cursor.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::time::Instant;

use crate::application::repos::{
    ScanPage, SiteConfigRepo, SnapshotDigest, SnapshotsRepo, StoreError,
};
use crate::domain::site::SiteConfig;
use crate::domain::snapshot::{DeviceType, RenderType, Snapshot, SnapshotKey};

type MemKey = (String, String, DeviceType, RenderType);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn mem_key(key: &SnapshotKey) -> MemKey {
    (
        key.site.clone(),
        key.path.clone(),
        key.device_type,
        key.render_type,
    )
}

struct Lease {
    holder: String,
    expires_at: Instant,
}

#[derive(Default)]
pub struct MemoryStore {
    snapshots: Mutex<BTreeMap<MemKey, Snapshot>>,
    sites: Mutex<HashMap<String, SiteConfig>>,
    lease: Mutex<Option<Lease>>,
    puts: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_site(&self, config: SiteConfig) {
        lock(&self.sites).insert(config.host.clone(), config);
    }

    /// Number of `put` calls observed, across all keys.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn snapshot_count(&self) -> usize {
        lock(&self.snapshots).len()
    }

    /// Rewind a stored snapshot's `updated_at`, letting tests age entries
    /// past retention windows.
    pub fn backdate(&self, key: &SnapshotKey, updated_at: OffsetDateTime) {
        if let Some(snapshot) = lock(&self.snapshots).get_mut(&mem_key(key)) {
            snapshot.times.updated_at = updated_at;
        }
    }
}

#[async_trait]
impl SnapshotsRepo for MemoryStore {
    async fn get(&self, key: &SnapshotKey) -> Result<Option<Snapshot>, StoreError> {
        let mut snapshots = lock(&self.snapshots);
        Ok(snapshots.get_mut(&mem_key(key)).map(|snapshot| {
            snapshot.times.last_accessed_at = OffsetDateTime::now_utc();
            snapshot.clone()
        }))
    }

    async fn put(&self, key: &SnapshotKey, snapshot: &Snapshot) -> Result<(), StoreError> {
        let mut stored = snapshot.clone();
        stored.times.updated_at = OffsetDateTime::now_utc();
        lock(&self.snapshots).insert(mem_key(key), stored);
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, key: &SnapshotKey) -> Result<bool, StoreError> {
        Ok(lock(&self.snapshots).remove(&mem_key(key)).is_some())
    }

    async fn scan_site(
        &self,
        site: &str,
        cursor: Option<String>,
        limit: usize,
    ) -> Result<ScanPage, StoreError> {
        let snapshots = lock(&self.snapshots);

        let after: Option<MemKey> = match cursor {
            Some(cursor) => {
                let (path, device_type, render_type): (String, DeviceType, RenderType) =
                    serde_json::from_str(&cursor).map_err(|err| {
                        StoreError::Persistence(format!("invalid scan cursor: {err}"))
                    })?;
                Some((site.to_string(), path, device_type, render_type))
            }
            None => None,
        };

        let mut items = Vec::new();
        for ((entry_site, path, device_type, render_type), snapshot) in snapshots.iter() {
            if entry_site != site {
                continue;
            }
            if let Some(after) = &after {
                if (entry_site, path, device_type, render_type)
                    <= (&after.0, &after.1, &after.2, &after.3)
                {
                    continue;
                }
            }
            items.push(SnapshotDigest {
                path: path.clone(),
                device_type: *device_type,
                render_type: *render_type,
                status: snapshot.status,
                updated_at: snapshot.times.updated_at,
                meta: snapshot.meta.clone(),
            });
            if items.len() == limit {
                break;
            }
        }

        let next_cursor = if items.len() == limit {
            items.last().and_then(|digest| {
                serde_json::to_string(&(&digest.path, digest.device_type, digest.render_type)).ok()
            })
        } else {
            None
        };

        Ok(ScanPage { items, next_cursor })
    }

    async fn expire_before(&self, cutoff: OffsetDateTime) -> Result<u64, StoreError> {
        let mut snapshots = lock(&self.snapshots);
        let before = snapshots.len();
        snapshots.retain(|_, snapshot| snapshot.times.updated_at >= cutoff);
        Ok((before - snapshots.len()) as u64)
    }

    async fn acquire_janitor_lease(&self, holder: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut lease = lock(&self.lease);
        let now = Instant::now();
        let acquirable = match lease.as_ref() {
            None => true,
            Some(current) => current.expires_at < now || current.holder == holder,
        };
        if acquirable {
            *lease = Some(Lease {
                holder: holder.to_string(),
                expires_at: now + ttl,
            });
        }
        Ok(acquirable)
    }
}

#[async_trait]
impl SiteConfigRepo for MemoryStore {
    async fn find_site(&self, host: &str) -> Result<Option<SiteConfig>, StoreError> {
        Ok(lock(&self.sites).get(host).cloned())
    }
}
