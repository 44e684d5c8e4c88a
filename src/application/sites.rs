//! SiteConfig resolver: per-origin policy lookups with a small TTL cache.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::domain::site::SiteConfig;

use super::repos::{SiteConfigRepo, StoreError};

struct CachedLookup {
    fetched_at: Instant,
    // None caches a confirmed miss for the same TTL as a hit.
    config: Option<Arc<SiteConfig>>,
}

pub struct SiteConfigResolver {
    repo: Arc<dyn SiteConfigRepo>,
    ttl: Duration,
    lookup_timeout: Duration,
    cache: DashMap<String, CachedLookup>,
    inflight: DashMap<String, Arc<Mutex<()>>>,
}

impl SiteConfigResolver {
    pub fn new(repo: Arc<dyn SiteConfigRepo>, ttl: Duration, lookup_timeout: Duration) -> Self {
        Self {
            repo,
            ttl,
            lookup_timeout,
            cache: DashMap::new(),
            inflight: DashMap::new(),
        }
    }

    /// Resolve the rendering policy for a host. Hosts are canonicalized
    /// before lookup; positive and negative results are both cached for the
    /// configured TTL, and concurrent lookups for one host collapse into a
    /// single store query.
    pub async fn resolve(&self, host: &str) -> Result<Option<Arc<SiteConfig>>, StoreError> {
        let host = canonical_host(host);

        if let Some(cached) = self.cached(&host) {
            return Ok(cached);
        }

        let gate = self
            .inflight
            .entry(host.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = gate.lock().await;

        // Another task may have finished the lookup while we waited.
        if let Some(cached) = self.cached(&host) {
            return Ok(cached);
        }

        let config = tokio::time::timeout(self.lookup_timeout, self.repo.find_site(&host))
            .await
            .map_err(|_| StoreError::Timeout)??
            .map(Arc::new);

        debug!(
            target = "kasha::sites",
            host = %host,
            found = config.is_some(),
            "site config lookup"
        );

        self.cache.insert(
            host.clone(),
            CachedLookup {
                fetched_at: Instant::now(),
                config: config.clone(),
            },
        );
        self.inflight.remove(&host);

        Ok(config)
    }

    /// Drop a cached entry so the next resolve hits the store.
    pub fn invalidate(&self, host: &str) {
        self.cache.remove(&canonical_host(host));
    }

    fn cached(&self, host: &str) -> Option<Option<Arc<SiteConfig>>> {
        let entry = self.cache.get(host)?;
        if entry.fetched_at.elapsed() <= self.ttl {
            Some(entry.config.clone())
        } else {
            None
        }
    }
}

/// Lowercase the host and strip a default port.
fn canonical_host(raw: &str) -> String {
    let lowered = raw.trim().to_ascii_lowercase();
    for suffix in [":80", ":443"] {
        if let Some(host) = lowered.strip_suffix(suffix) {
            return host.to_string();
        }
    }
    lowered
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::domain::site::Protocol;
    use crate::domain::snapshot::DeviceType;

    use super::*;

    struct CountingRepo {
        lookups: AtomicUsize,
        known: Option<SiteConfig>,
    }

    impl CountingRepo {
        fn with(known: Option<SiteConfig>) -> Arc<Self> {
            Arc::new(Self {
                lookups: AtomicUsize::new(0),
                known,
            })
        }

        fn count(&self) -> usize {
            self.lookups.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SiteConfigRepo for CountingRepo {
        async fn find_site(&self, _host: &str) -> Result<Option<SiteConfig>, StoreError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(self.known.clone())
        }
    }

    fn example_config() -> SiteConfig {
        SiteConfig {
            host: "example.com".into(),
            default_protocol: Protocol::Https,
            device_type: DeviceType::Desktop,
            robots: None,
            rewrites: Vec::new(),
        }
    }

    #[tokio::test]
    async fn repeated_resolves_hit_the_cache() {
        let repo = CountingRepo::with(Some(example_config()));
        let resolver = SiteConfigResolver::new(
            repo.clone(),
            Duration::from_secs(60),
            Duration::from_secs(5),
        );

        let first = resolver.resolve("Example.COM:443").await.expect("resolve");
        let second = resolver.resolve("example.com").await.expect("resolve");

        assert!(first.is_some());
        assert!(second.is_some());
        assert_eq!(repo.count(), 1);
    }

    #[tokio::test]
    async fn misses_are_cached_too() {
        let repo = CountingRepo::with(None);
        let resolver = SiteConfigResolver::new(
            repo.clone(),
            Duration::from_secs(60),
            Duration::from_secs(5),
        );

        assert!(resolver.resolve("unknown.test").await.expect("resolve").is_none());
        assert!(resolver.resolve("unknown.test").await.expect("resolve").is_none());
        assert_eq!(repo.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_are_refetched() {
        let repo = CountingRepo::with(Some(example_config()));
        let resolver = SiteConfigResolver::new(
            repo.clone(),
            Duration::from_secs(60),
            Duration::from_secs(5),
        );

        resolver.resolve("example.com").await.expect("resolve");
        tokio::time::advance(Duration::from_secs(61)).await;
        resolver.resolve("example.com").await.expect("resolve");

        assert_eq!(repo.count(), 2);
    }

    #[tokio::test]
    async fn concurrent_lookups_collapse() {
        let repo = CountingRepo::with(Some(example_config()));
        let resolver = Arc::new(SiteConfigResolver::new(
            repo.clone(),
            Duration::from_secs(60),
            Duration::from_secs(5),
        ));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let resolver = resolver.clone();
                tokio::spawn(async move { resolver.resolve("example.com").await })
            })
            .collect();

        for task in tasks {
            assert!(task.await.expect("join").expect("resolve").is_some());
        }
        assert_eq!(repo.count(), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let repo = CountingRepo::with(Some(example_config()));
        let resolver = SiteConfigResolver::new(
            repo.clone(),
            Duration::from_secs(60),
            Duration::from_secs(5),
        );

        resolver.resolve("example.com").await.expect("resolve");
        resolver.invalidate("example.com");
        resolver.resolve("example.com").await.expect("resolve");

        assert_eq!(repo.count(), 2);
    }
}
