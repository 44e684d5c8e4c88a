//! Store traits describing persistence adapters.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::site::SiteConfig;
use crate::domain::snapshot::{DeviceType, PageMeta, RenderType, Snapshot, SnapshotKey};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("resource not found")]
    NotFound,
    #[error("store timeout")]
    Timeout,
}

impl StoreError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Lightweight projection of a snapshot used by the sitemap scan: everything
/// the aggregator filters on, without the rendered body.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotDigest {
    pub path: String,
    pub device_type: DeviceType,
    pub render_type: RenderType,
    pub status: u16,
    pub updated_at: OffsetDateTime,
    pub meta: PageMeta,
}

/// One page of a site scan, ordered by `path`. `next_cursor` is the last
/// path of the page; absent when the scan is exhausted.
#[derive(Debug, Clone, Default)]
pub struct ScanPage {
    pub items: Vec<SnapshotDigest>,
    pub next_cursor: Option<String>,
}

#[async_trait]
pub trait SnapshotsRepo: Send + Sync {
    /// Fetch one snapshot and bump its `last_accessed_at`.
    async fn get(&self, key: &SnapshotKey) -> Result<Option<Snapshot>, StoreError>;

    /// Atomic upsert. `updated_at` is set to the write instant; every other
    /// timestamp (including `rendered_at`) is taken from the caller, which
    /// lets a failed background refresh re-put a stale snapshot without
    /// advancing its render time.
    async fn put(&self, key: &SnapshotKey, snapshot: &Snapshot) -> Result<(), StoreError>;

    /// Explicit invalidation. Returns whether a snapshot existed.
    async fn delete(&self, key: &SnapshotKey) -> Result<bool, StoreError>;

    /// Keyset scan of one site's snapshots ordered by `path`.
    async fn scan_site(
        &self,
        site: &str,
        cursor: Option<String>,
        limit: usize,
    ) -> Result<ScanPage, StoreError>;

    /// Remove snapshots whose `updated_at` predates `cutoff`; returns the
    /// number removed.
    async fn expire_before(&self, cutoff: OffsetDateTime) -> Result<u64, StoreError>;

    /// Conditional janitor lease: acquired when absent, expired, or already
    /// held by `holder`. Returns whether this process is the leader.
    async fn acquire_janitor_lease(&self, holder: &str, ttl: Duration) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait SiteConfigRepo: Send + Sync {
    /// Look up the rendering policy for a normalized host.
    async fn find_site(&self, host: &str) -> Result<Option<SiteConfig>, StoreError>;
}
