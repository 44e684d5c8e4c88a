//! Sitemap aggregation over cached snapshots.
//!
//! Sitemaps reflect known snapshots only: a path that has never been
//! rendered is invisible here, and no render is triggered on its behalf.
//! Artifacts are rebuilt from a streaming site scan and memoized briefly so
//! crawler bursts do not hammer the store.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lru::LruCache;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::warn;

use crate::domain::site::SiteConfig;
use crate::domain::snapshot::RenderType;

use super::repos::{SnapshotDigest, SnapshotsRepo, StoreError};

const SCAN_BATCH: usize = 1_000;
const MEMO_CAPACITY: usize = 256;
const PAGE_SIZE: usize = 50_000;
const NEWS_PAGE_SIZE: usize = 25_000;
const NEWS_WINDOW: Duration = Duration::from_secs(48 * 3_600);

const XML_DECL: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";
const SITEMAP_XMLNS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";
const NEWS_XMLNS: &str = "http://www.google.com/schemas/sitemap-news/0.9";
const IMAGE_XMLNS: &str = "http://www.google.com/schemas/sitemap-image/1.1";
const VIDEO_XMLNS: &str = "http://www.google.com/schemas/sitemap-video/1.1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SitemapVariant {
    Plain,
    Google,
    GoogleNews,
    GoogleImage,
    GoogleVideo,
}

impl SitemapVariant {
    pub const ALL: [SitemapVariant; 5] = [
        SitemapVariant::Plain,
        SitemapVariant::Google,
        SitemapVariant::GoogleNews,
        SitemapVariant::GoogleImage,
        SitemapVariant::GoogleVideo,
    ];

    /// File stem of the artifact, without page number or extension.
    pub fn file_stem(self) -> &'static str {
        match self {
            SitemapVariant::Plain => "sitemap",
            SitemapVariant::Google => "sitemap.google",
            SitemapVariant::GoogleNews => "sitemap.google.news",
            SitemapVariant::GoogleImage => "sitemap.google.image",
            SitemapVariant::GoogleVideo => "sitemap.google.video",
        }
    }

    pub fn page_size(self) -> usize {
        match self {
            SitemapVariant::GoogleNews => NEWS_PAGE_SIZE,
            _ => PAGE_SIZE,
        }
    }
}

/// One parsed sitemap request: a page of a variant, or its index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SitemapRequest {
    pub variant: SitemapVariant,
    pub index: bool,
    /// 1-based.
    pub page: u32,
}

/// A requestable artifact name, as it appears in the URL path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactRequest {
    Robots,
    Sitemap(SitemapRequest),
}

/// Parse an artifact filename (`robots.txt`, `sitemap.google.news.2.xml`,
/// `sitemap.index.xml`, ...). Returns `None` for anything outside the
/// grammar.
pub fn parse_artifact(name: &str) -> Option<ArtifactRequest> {
    if name == "robots.txt" {
        return Some(ArtifactRequest::Robots);
    }

    let stem = name.strip_suffix(".xml")?;
    let mut segments = stem.split('.');
    if segments.next()? != "sitemap" {
        return None;
    }

    let mut segments = segments.peekable();
    let variant = if segments.peek() == Some(&"google") {
        segments.next();
        match segments.peek() {
            Some(&"news") => {
                segments.next();
                SitemapVariant::GoogleNews
            }
            Some(&"image") => {
                segments.next();
                SitemapVariant::GoogleImage
            }
            Some(&"video") => {
                segments.next();
                SitemapVariant::GoogleVideo
            }
            _ => SitemapVariant::Google,
        }
    } else {
        SitemapVariant::Plain
    };

    let index = if segments.peek() == Some(&"index") {
        segments.next();
        true
    } else {
        false
    };

    let page = match segments.next() {
        Some(number) => number.parse::<u32>().ok().filter(|page| *page >= 1)?,
        None => 1,
    };

    // Trailing segments mean the name is not part of the grammar.
    if segments.next().is_some() {
        return None;
    }

    Some(ArtifactRequest::Sitemap(SitemapRequest {
        variant,
        index,
        page,
    }))
}

#[derive(Debug, Error)]
pub enum SitemapError {
    /// Requested page lies beyond the last one.
    #[error("sitemap page does not exist")]
    PageNotFound,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A generated sitemap or robots artifact.
#[derive(Debug, Clone)]
pub struct SitemapArtifact {
    pub content_type: &'static str,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MemoKey {
    site: String,
    variant: &'static str,
    index: bool,
    page: u32,
}

struct MemoEntry {
    built_at: tokio::time::Instant,
    artifact: Arc<SitemapArtifact>,
}

pub struct SitemapService {
    snapshots: Arc<dyn SnapshotsRepo>,
    memo: Mutex<LruCache<MemoKey, MemoEntry>>,
    memo_ttl: Duration,
}

impl SitemapService {
    pub fn new(snapshots: Arc<dyn SnapshotsRepo>, memo_ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(MEMO_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self {
            snapshots,
            memo: Mutex::new(LruCache::new(capacity)),
            memo_ttl,
        }
    }

    /// Build (or reuse) the requested sitemap artifact for a site.
    pub async fn artifact(
        &self,
        site: &SiteConfig,
        request: SitemapRequest,
    ) -> Result<Arc<SitemapArtifact>, SitemapError> {
        let key = MemoKey {
            site: site.origin(),
            variant: request.variant.file_stem(),
            index: request.index,
            page: request.page,
        };
        if let Some(artifact) = self.memoized(&key) {
            return Ok(artifact);
        }

        let entries = self.collect(site, request.variant).await?;
        let body = if request.index {
            render_index(site, request.variant, entries.len(), request.page)?
        } else {
            render_page(site, request.variant, &entries, request.page)?
        };

        let artifact = Arc::new(SitemapArtifact {
            content_type: "application/xml",
            body,
        });
        self.memoize(key, artifact.clone());
        Ok(artifact)
    }

    /// Build `robots.txt`: configured directives followed by one `Sitemap:`
    /// line per variant that currently has at least one page.
    pub async fn robots_txt(
        &self,
        site: &SiteConfig,
    ) -> Result<Arc<SitemapArtifact>, SitemapError> {
        let key = MemoKey {
            site: site.origin(),
            variant: "robots",
            index: false,
            page: 1,
        };
        if let Some(artifact) = self.memoized(&key) {
            return Ok(artifact);
        }

        let origin = site.origin();
        let mut body = String::new();
        let directives = site
            .robots
            .as_ref()
            .map(|robots| robots.directives.as_slice())
            .unwrap_or_default();
        if directives.is_empty() {
            body.push_str("User-agent: *\nAllow: /\n");
        } else {
            for line in directives {
                body.push_str(line);
                body.push('\n');
            }
        }

        for variant in SitemapVariant::ALL {
            if !self.collect(site, variant).await?.is_empty() {
                body.push_str(&format!("Sitemap: {origin}/{}.index.xml\n", variant.file_stem()));
            }
        }

        let artifact = Arc::new(SitemapArtifact {
            content_type: "text/plain; charset=utf-8",
            body,
        });
        self.memoize(key, artifact.clone());
        Ok(artifact)
    }

    /// Stream the site's snapshots, applying the robot policy and the
    /// variant predicate. Entries are deduplicated by path (the scan is
    /// path-ordered, so duplicates from device variants are adjacent).
    async fn collect(
        &self,
        site: &SiteConfig,
        variant: SitemapVariant,
    ) -> Result<Vec<SnapshotDigest>, SitemapError> {
        let origin = site.origin();
        let now = OffsetDateTime::now_utc();
        let mut entries: Vec<SnapshotDigest> = Vec::new();
        let mut cursor = None;

        loop {
            let page = self
                .snapshots
                .scan_site(&origin, cursor, SCAN_BATCH)
                .await?;

            for digest in page.items {
                if let Some(last) = entries.last() {
                    if last.path == digest.path {
                        continue;
                    }
                }
                if !site.allows(&digest.path) {
                    continue;
                }
                if variant_admits(variant, &digest, &origin, now) {
                    entries.push(digest);
                }
            }

            cursor = page.next_cursor;
            if cursor.is_none() {
                break;
            }
        }

        Ok(entries)
    }

    fn memoized(&self, key: &MemoKey) -> Option<Arc<SitemapArtifact>> {
        let mut memo = lock_memo(&self.memo);
        let entry = memo.get(key)?;
        (entry.built_at.elapsed() <= self.memo_ttl).then(|| entry.artifact.clone())
    }

    fn memoize(&self, key: MemoKey, artifact: Arc<SitemapArtifact>) {
        lock_memo(&self.memo).put(
            key,
            MemoEntry {
                built_at: tokio::time::Instant::now(),
                artifact,
            },
        );
    }
}

fn lock_memo<'a>(
    memo: &'a Mutex<LruCache<MemoKey, MemoEntry>>,
) -> std::sync::MutexGuard<'a, LruCache<MemoKey, MemoEntry>> {
    match memo.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!(
                target = "kasha::sitemap",
                "recovered poisoned sitemap memo lock"
            );
            poisoned.into_inner()
        }
    }
}

fn variant_admits(
    variant: SitemapVariant,
    digest: &SnapshotDigest,
    origin: &str,
    now: OffsetDateTime,
) -> bool {
    if digest.render_type != RenderType::Html || digest.status != 200 {
        return false;
    }

    match variant {
        SitemapVariant::Plain => true,
        // The Google variant additionally drops pages whose canonical points
        // elsewhere, so duplicates do not compete with their canonical URL.
        SitemapVariant::Google => match digest.meta.canonical.as_deref() {
            Some(canonical) => canonical == format!("{origin}{}", digest.path),
            None => true,
        },
        SitemapVariant::GoogleNews => digest
            .meta
            .published_at
            .map(|published| now - published <= NEWS_WINDOW && published <= now)
            .unwrap_or(false),
        SitemapVariant::GoogleImage => !digest.meta.images.is_empty(),
        SitemapVariant::GoogleVideo => !digest.meta.videos.is_empty(),
    }
}

fn render_page(
    site: &SiteConfig,
    variant: SitemapVariant,
    entries: &[SnapshotDigest],
    page: u32,
) -> Result<String, SitemapError> {
    let size = variant.page_size();
    let start = (page as usize - 1) * size;
    if start >= entries.len() && page > 1 {
        return Err(SitemapError::PageNotFound);
    }
    let origin = site.origin();
    let window = entries.iter().skip(start).take(size);

    let mut xml = String::from(XML_DECL);
    xml.push_str(&urlset_open(variant));
    for digest in window {
        xml.push_str(&url_entry(&origin, variant, digest));
    }
    xml.push_str("</urlset>\n");
    Ok(xml)
}

fn render_index(
    site: &SiteConfig,
    variant: SitemapVariant,
    total: usize,
    page: u32,
) -> Result<String, SitemapError> {
    let size = variant.page_size();
    let page_count = total.div_ceil(size);
    if page > 1 {
        // The index itself fits one page for any realistic corpus; paging it
        // past the first is only valid when that page exists.
        return Err(SitemapError::PageNotFound);
    }

    let origin = site.origin();
    let stem = variant.file_stem();
    let mut xml = String::from(XML_DECL);
    xml.push_str(&format!("<sitemapindex xmlns=\"{SITEMAP_XMLNS}\">\n"));
    for number in 1..=page_count {
        xml.push_str(&format!(
            "  <sitemap><loc>{}</loc></sitemap>\n",
            xml_escape(&format!("{origin}/{stem}.{number}.xml"))
        ));
    }
    xml.push_str("</sitemapindex>\n");
    Ok(xml)
}

fn urlset_open(variant: SitemapVariant) -> String {
    match variant {
        SitemapVariant::Plain | SitemapVariant::Google => {
            format!("<urlset xmlns=\"{SITEMAP_XMLNS}\">\n")
        }
        SitemapVariant::GoogleNews => {
            format!("<urlset xmlns=\"{SITEMAP_XMLNS}\" xmlns:news=\"{NEWS_XMLNS}\">\n")
        }
        SitemapVariant::GoogleImage => {
            format!("<urlset xmlns=\"{SITEMAP_XMLNS}\" xmlns:image=\"{IMAGE_XMLNS}\">\n")
        }
        SitemapVariant::GoogleVideo => {
            format!("<urlset xmlns=\"{SITEMAP_XMLNS}\" xmlns:video=\"{VIDEO_XMLNS}\">\n")
        }
    }
}

fn url_entry(origin: &str, variant: SitemapVariant, digest: &SnapshotDigest) -> String {
    let loc = xml_escape(&format!("{origin}{}", digest.path));
    let lastmod = digest
        .updated_at
        .format(&Rfc3339)
        .unwrap_or_default();

    let mut entry = String::from("  <url>");
    entry.push_str(&format!("<loc>{loc}</loc>"));
    entry.push_str(&format!("<lastmod>{lastmod}</lastmod>"));

    match variant {
        SitemapVariant::Plain | SitemapVariant::Google => {}
        SitemapVariant::GoogleNews => {
            let title = xml_escape(digest.meta.title.as_deref().unwrap_or(""));
            let language = xml_escape(digest.meta.locale.as_deref().unwrap_or("en"));
            let published = digest
                .meta
                .published_at
                .and_then(|at| at.format(&Rfc3339).ok())
                .unwrap_or_default();
            entry.push_str("<news:news>");
            entry.push_str(&format!(
                "<news:publication><news:name>{}</news:name><news:language>{language}</news:language></news:publication>",
                xml_escape(origin.trim_start_matches("https://").trim_start_matches("http://")),
            ));
            entry.push_str(&format!(
                "<news:publication_date>{published}</news:publication_date>"
            ));
            entry.push_str(&format!("<news:title>{title}</news:title>"));
            entry.push_str("</news:news>");
        }
        SitemapVariant::GoogleImage => {
            for image in &digest.meta.images {
                entry.push_str(&format!(
                    "<image:image><image:loc>{}</image:loc></image:image>",
                    xml_escape(image)
                ));
            }
        }
        SitemapVariant::GoogleVideo => {
            let title = xml_escape(digest.meta.title.as_deref().unwrap_or(""));
            for video in &digest.meta.videos {
                entry.push_str(&format!(
                    "<video:video><video:title>{title}</video:title><video:content_loc>{}</video:content_loc></video:video>",
                    xml_escape(video)
                ));
            }
        }
    }

    entry.push_str("</url>\n");
    entry
}

/// Escape the five XML-reserved characters.
fn xml_escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use crate::domain::site::{Protocol, RobotsPolicy};
    use crate::domain::snapshot::{
        DeviceType, PageMeta, Snapshot, SnapshotKey, SnapshotTimes,
    };
    use crate::infra::db::memory::MemoryStore;

    use super::*;

    #[test]
    fn artifact_grammar_accepts_all_variants() {
        assert_eq!(parse_artifact("robots.txt"), Some(ArtifactRequest::Robots));
        assert_eq!(
            parse_artifact("sitemap.xml"),
            Some(ArtifactRequest::Sitemap(SitemapRequest {
                variant: SitemapVariant::Plain,
                index: false,
                page: 1,
            }))
        );
        assert_eq!(
            parse_artifact("sitemap.3.xml"),
            Some(ArtifactRequest::Sitemap(SitemapRequest {
                variant: SitemapVariant::Plain,
                index: false,
                page: 3,
            }))
        );
        assert_eq!(
            parse_artifact("sitemap.index.1.xml"),
            Some(ArtifactRequest::Sitemap(SitemapRequest {
                variant: SitemapVariant::Plain,
                index: true,
                page: 1,
            }))
        );
        assert_eq!(
            parse_artifact("sitemap.google.news.2.xml"),
            Some(ArtifactRequest::Sitemap(SitemapRequest {
                variant: SitemapVariant::GoogleNews,
                index: false,
                page: 2,
            }))
        );
        assert_eq!(
            parse_artifact("sitemap.google.video.index.xml"),
            Some(ArtifactRequest::Sitemap(SitemapRequest {
                variant: SitemapVariant::GoogleVideo,
                index: true,
                page: 1,
            }))
        );
    }

    #[test]
    fn artifact_grammar_rejects_garbage() {
        assert_eq!(parse_artifact("sitemap.0.xml"), None);
        assert_eq!(parse_artifact("sitemap.weird.xml"), None);
        assert_eq!(parse_artifact("sitemap.1.2.xml"), None);
        assert_eq!(parse_artifact("sitemap"), None);
        assert_eq!(parse_artifact("feed.xml"), None);
        assert_eq!(parse_artifact("sitemap.google.news.extra.1.xml"), None);
    }

    fn site() -> SiteConfig {
        SiteConfig {
            host: "ex.com".into(),
            default_protocol: Protocol::Https,
            device_type: DeviceType::Desktop,
            robots: Some(RobotsPolicy {
                directives: vec!["User-agent: *".into(), "Disallow: /private".into()],
                allow: Vec::new(),
                deny: vec!["/private".into()],
            }),
            rewrites: Vec::new(),
        }
    }

    fn snapshot(status: u16, meta: PageMeta) -> Snapshot {
        let now = OffsetDateTime::now_utc();
        Snapshot {
            status,
            redirect: None,
            meta,
            open_graph: serde_json::Value::Null,
            links: Vec::new(),
            content: Some(Bytes::from_static(b"<html/>")),
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

    async fn seed(store: &MemoryStore, path: &str, status: u16, meta: PageMeta) {
        let key = SnapshotKey {
            site: "https://ex.com".into(),
            path: path.into(),
            device_type: DeviceType::Desktop,
            render_type: RenderType::Html,
        };
        store.put(&key, &snapshot(status, meta)).await.expect("seed");
    }

    fn service(store: Arc<MemoryStore>) -> SitemapService {
        SitemapService::new(store, Duration::from_secs(3_600))
    }

    #[tokio::test]
    async fn plain_sitemap_lists_indexable_html_pages() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "/a", 200, PageMeta::default()).await;
        seed(&store, "/b", 200, PageMeta::default()).await;
        seed(&store, "/gone", 404, PageMeta::default()).await;
        seed(&store, "/private/x", 200, PageMeta::default()).await;

        let service = service(store);
        let artifact = service
            .artifact(
                &site(),
                SitemapRequest {
                    variant: SitemapVariant::Plain,
                    index: false,
                    page: 1,
                },
            )
            .await
            .expect("artifact");

        assert!(artifact.body.contains("<loc>https://ex.com/a</loc>"));
        assert!(artifact.body.contains("<loc>https://ex.com/b</loc>"));
        assert!(artifact.body.contains("<lastmod>"));
        assert!(!artifact.body.contains("/gone"));
        assert!(!artifact.body.contains("/private/x"));
    }

    #[tokio::test]
    async fn news_variant_keeps_only_recent_publications() {
        let store = Arc::new(MemoryStore::new());
        let fresh = PageMeta {
            title: Some("Fresh".into()),
            published_at: Some(OffsetDateTime::now_utc() - Duration::from_secs(3_600)),
            ..PageMeta::default()
        };
        let old = PageMeta {
            title: Some("Old".into()),
            published_at: Some(OffsetDateTime::now_utc() - Duration::from_secs(3 * 86_400)),
            ..PageMeta::default()
        };
        seed(&store, "/news/fresh", 200, fresh).await;
        seed(&store, "/news/old", 200, old).await;
        seed(&store, "/plain", 200, PageMeta::default()).await;

        let service = service(store);
        let artifact = service
            .artifact(
                &site(),
                SitemapRequest {
                    variant: SitemapVariant::GoogleNews,
                    index: false,
                    page: 1,
                },
            )
            .await
            .expect("artifact");

        assert!(artifact.body.contains("/news/fresh"));
        assert!(artifact.body.contains("<news:title>Fresh</news:title>"));
        assert!(!artifact.body.contains("/news/old"));
        assert!(!artifact.body.contains("/plain"));
    }

    #[tokio::test]
    async fn image_variant_emits_one_element_per_image() {
        let store = Arc::new(MemoryStore::new());
        let meta = PageMeta {
            images: vec![
                "https://cdn.ex.com/1.png".into(),
                "https://cdn.ex.com/2.png".into(),
            ],
            ..PageMeta::default()
        };
        seed(&store, "/gallery", 200, meta).await;
        seed(&store, "/plain", 200, PageMeta::default()).await;

        let service = service(store);
        let artifact = service
            .artifact(
                &site(),
                SitemapRequest {
                    variant: SitemapVariant::GoogleImage,
                    index: false,
                    page: 1,
                },
            )
            .await
            .expect("artifact");

        assert_eq!(artifact.body.matches("<image:image>").count(), 2);
        assert!(!artifact.body.contains("/plain"));
    }

    #[tokio::test]
    async fn pages_beyond_the_last_return_not_found() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "/a", 200, PageMeta::default()).await;

        let service = service(store);
        let result = service
            .artifact(
                &site(),
                SitemapRequest {
                    variant: SitemapVariant::Plain,
                    index: false,
                    page: 2,
                },
            )
            .await;

        assert!(matches!(result, Err(SitemapError::PageNotFound)));
    }

    #[tokio::test]
    async fn index_references_every_page() {
        let store = Arc::new(MemoryStore::new());
        // Three news pages at 25 000 per page.
        for i in 0..60_000usize {
            let meta = PageMeta {
                title: Some(format!("n{i}")),
                published_at: Some(OffsetDateTime::now_utc()),
                ..PageMeta::default()
            };
            seed(&store, &format!("/n/{i:06}"), 200, meta).await;
        }

        let service = service(store);
        let artifact = service
            .artifact(
                &site(),
                SitemapRequest {
                    variant: SitemapVariant::GoogleNews,
                    index: true,
                    page: 1,
                },
            )
            .await
            .expect("artifact");

        assert_eq!(artifact.body.matches("<sitemap>").count(), 3);
        assert!(artifact.body.contains("https://ex.com/sitemap.google.news.3.xml"));
        assert!(!artifact.body.contains("sitemap.google.news.4.xml"));
    }

    #[tokio::test]
    async fn robots_lists_only_populated_variants() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "/a", 200, PageMeta::default()).await;

        let service = service(store);
        let artifact = service.robots_txt(&site()).await.expect("robots");

        assert!(artifact.body.starts_with("User-agent: *\nDisallow: /private\n"));
        assert!(artifact.body.contains("Sitemap: https://ex.com/sitemap.index.xml"));
        assert!(artifact.body.contains("Sitemap: https://ex.com/sitemap.google.index.xml"));
        assert!(!artifact.body.contains("sitemap.google.news.index.xml"));
        assert!(!artifact.body.contains("sitemap.google.image.index.xml"));
    }

    #[tokio::test]
    async fn repeated_requests_are_memoized() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "/a", 200, PageMeta::default()).await;

        let service = service(store.clone());
        let request = SitemapRequest {
            variant: SitemapVariant::Plain,
            index: false,
            page: 1,
        };

        let first = service.artifact(&site(), request).await.expect("artifact");
        seed(&store, "/b", 200, PageMeta::default()).await;
        let second = service.artifact(&site(), request).await.expect("artifact");

        // Same generation served while the memo entry is live.
        assert_eq!(first.body, second.body);
        assert!(!second.body.contains("/b"));
    }
}
