//! HTTP surface tests against a live listener: mode selection, the render
//! API, proxy-mode serving, and sitemap artifacts.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use kasha::application::coordinator::{CoordinatorConfig, RenderCoordinator};
use kasha::application::pending::PendingRenders;
use kasha::application::repos::SnapshotsRepo;
use kasha::application::sitemap::SitemapService;
use kasha::application::sites::SiteConfigResolver;
use kasha::config::CacheSettings;
use kasha::domain::site::{Protocol, RobotsPolicy, SiteConfig};
use kasha::domain::snapshot::DeviceType;
use kasha::infra::db::memory::MemoryStore;
use kasha::infra::http::{GatewayState, KASHA_CACHE_HEADER, ModeSettings, build_router};

use common::{ChannelBus, aged_snapshot, html_request, spawn_echo_worker};

const WORKER_TIMEOUT: Duration = Duration::from_secs(5);

struct TestGateway {
    base: String,
    store: Arc<MemoryStore>,
    client: reqwest::Client,
}

async fn start_gateway(api_mode: bool) -> TestGateway {
    let store = Arc::new(MemoryStore::new());
    let (bus, jobs) = ChannelBus::new();
    let pending = Arc::new(PendingRenders::new(WORKER_TIMEOUT));
    let coordinator = Arc::new(RenderCoordinator::new(
        store.clone(),
        bus,
        pending,
        CoordinatorConfig {
            maxage: Duration::from_secs(180),
            s_maxage: Duration::from_secs(86_400),
            worker_timeout: WORKER_TIMEOUT,
            callback_attempt_timeout: Duration::from_secs(1),
        },
    ));
    spawn_echo_worker(coordinator.clone(), jobs, "<h1>rendered</h1>", Duration::ZERO);

    let cache = CacheSettings {
        maxage: Duration::from_secs(180),
        s_maxage: Duration::from_secs(86_400),
        robots_txt: Duration::from_secs(600),
        sitemap: Duration::from_secs(900),
        remove_after: Duration::from_secs(30 * 86_400),
    };

    let api_hosts: HashSet<String> = if api_mode {
        ["127.0.0.1".to_string()].into_iter().collect()
    } else {
        HashSet::new()
    };

    let state = GatewayState {
        coordinator,
        sitemaps: Arc::new(SitemapService::new(store.clone(), cache.sitemap)),
        sites: Arc::new(SiteConfigResolver::new(
            store.clone(),
            Duration::from_secs(60),
            Duration::from_secs(5),
        )),
        snapshots: store.clone(),
        store: None,
        mode: Arc::new(ModeSettings {
            api_hosts,
            enable_homepage: true,
            disallow_unknown_site: false,
        }),
        cache,
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, build_router(state)).await;
    });

    TestGateway {
        base: format!("http://{addr}"),
        store,
        client: reqwest::Client::new(),
    }
}

#[tokio::test]
async fn head_is_a_health_probe_and_other_methods_are_rejected() {
    let gateway = start_gateway(true).await;

    let head = gateway
        .client
        .head(format!("{}/anything", gateway.base))
        .send()
        .await
        .expect("head");
    assert_eq!(head.status(), 200);

    let post = gateway
        .client
        .post(format!("{}/render", gateway.base))
        .send()
        .await
        .expect("post");
    assert_eq!(post.status(), 405);
    assert_eq!(
        post.headers()
            .get("Kasha-Code")
            .and_then(|v| v.to_str().ok()),
        Some("CLIENT_METHOD_NOT_ALLOWED")
    );
}

#[tokio::test]
async fn render_endpoint_returns_the_rendered_snapshot() {
    let gateway = start_gateway(true).await;

    let response = gateway
        .client
        .get(format!(
            "{}/render?url=https://ex.com/a&deviceType=desktop&type=html",
            gateway.base
        ))
        .send()
        .await
        .expect("render");

    assert_eq!(response.status(), 200);
    assert_eq!(
        response
            .headers()
            .get(KASHA_CACHE_HEADER)
            .and_then(|v| v.to_str().ok()),
        Some("updated")
    );
    let body: serde_json::Value = response.json().await.expect("json");
    assert_eq!(body["status"], 200);
    assert_eq!(body["content"], "<h1>rendered</h1>");

    let stored = gateway
        .store
        .get(&html_request("/a").key())
        .await
        .expect("get")
        .expect("persisted");
    assert_eq!(stored.status, 200);
}

#[tokio::test]
async fn cache_endpoint_never_blocks() {
    let gateway = start_gateway(true).await;

    let response = gateway
        .client
        .get(format!("{}/cache?url=https://ex.com/a", gateway.base))
        .send()
        .await
        .expect("cache");

    assert_eq!(response.status(), 202);
    assert_eq!(
        response
            .headers()
            .get(KASHA_CACHE_HEADER)
            .and_then(|v| v.to_str().ok()),
        Some("updating")
    );
}

#[tokio::test]
async fn invalid_parameters_are_rejected_with_codes() {
    let gateway = start_gateway(true).await;

    let missing = gateway
        .client
        .get(format!("{}/render", gateway.base))
        .send()
        .await
        .expect("send");
    assert_eq!(missing.status(), 400);
    let body: serde_json::Value = missing.json().await.expect("json");
    assert_eq!(body["code"], "CLIENT_INVALID_PARAM");

    let bad_scheme = gateway
        .client
        .get(format!("{}/render?url=ftp://ex.com/a", gateway.base))
        .send()
        .await
        .expect("send");
    assert_eq!(bad_scheme.status(), 400);
    let body: serde_json::Value = bad_scheme.json().await.expect("json");
    assert_eq!(body["code"], "CLIENT_INVALID_PROTOCOL");

    let unknown = gateway
        .client
        .get(format!("{}/definitely-not-an-api", gateway.base))
        .send()
        .await
        .expect("send");
    assert_eq!(unknown.status(), 404);
    assert_eq!(
        unknown
            .headers()
            .get("Kasha-Code")
            .and_then(|v| v.to_str().ok()),
        Some("CLIENT_NO_SUCH_API")
    );
}

#[tokio::test]
async fn invalidate_removes_the_snapshot() {
    let gateway = start_gateway(true).await;
    let key = html_request("/a").key();
    gateway
        .store
        .put(&key, &aged_snapshot("<h1>bye</h1>", Duration::from_secs(10)))
        .await
        .expect("seed");

    let response = gateway
        .client
        .get(format!("{}/invalidate?url=https://ex.com/a", gateway.base))
        .send()
        .await
        .expect("invalidate");

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.expect("json");
    assert_eq!(body["invalidated"], true);
    assert!(gateway.store.get(&key).await.expect("get").is_none());
}

#[tokio::test]
async fn proxy_mode_serves_rendered_html() {
    let gateway = start_gateway(false).await;
    gateway.store.insert_site(SiteConfig {
        host: "ex.com".into(),
        default_protocol: Protocol::Https,
        device_type: DeviceType::Desktop,
        robots: None,
        rewrites: Vec::new(),
    });
    gateway
        .store
        .put(
            &html_request("/a").key(),
            &aged_snapshot("<h1>warm</h1>", Duration::from_secs(30)),
        )
        .await
        .expect("seed");

    let response = gateway
        .client
        .get(format!("{}/a", gateway.base))
        .header("X-Forwarded-Host", "ex.com")
        .header("X-Forwarded-Proto", "https")
        .send()
        .await
        .expect("proxy fetch");

    assert_eq!(response.status(), 200);
    assert_eq!(
        response
            .headers()
            .get(KASHA_CACHE_HEADER)
            .and_then(|v| v.to_str().ok()),
        Some("fresh")
    );
    assert_eq!(response.text().await.expect("body"), "<h1>warm</h1>");
}

#[tokio::test]
async fn proxy_mode_respects_the_robot_policy() {
    let gateway = start_gateway(false).await;
    gateway.store.insert_site(SiteConfig {
        host: "ex.com".into(),
        default_protocol: Protocol::Https,
        device_type: DeviceType::Desktop,
        robots: Some(RobotsPolicy {
            directives: Vec::new(),
            allow: Vec::new(),
            deny: vec!["/private".into()],
        }),
        rewrites: Vec::new(),
    });

    let response = gateway
        .client
        .get(format!("{}/private/x", gateway.base))
        .header("X-Forwarded-Host", "ex.com")
        .send()
        .await
        .expect("proxy fetch");

    assert_eq!(response.status(), 403);
    assert_eq!(
        response
            .headers()
            .get("Kasha-Code")
            .and_then(|v| v.to_str().ok()),
        Some("SERVER_ROBOTS_DISALLOW")
    );
}

#[tokio::test]
async fn sitemap_artifacts_are_served_in_both_modes() {
    let gateway = start_gateway(false).await;
    gateway.store.insert_site(SiteConfig {
        host: "ex.com".into(),
        default_protocol: Protocol::Https,
        device_type: DeviceType::Desktop,
        robots: None,
        rewrites: Vec::new(),
    });
    gateway
        .store
        .put(
            &html_request("/a").key(),
            &aged_snapshot("<h1>a</h1>", Duration::from_secs(30)),
        )
        .await
        .expect("seed");

    let sitemap = gateway
        .client
        .get(format!("{}/sitemap.xml", gateway.base))
        .header("X-Forwarded-Host", "ex.com")
        .send()
        .await
        .expect("sitemap");
    assert_eq!(sitemap.status(), 200);
    assert_eq!(
        sitemap
            .headers()
            .get("cache-control")
            .and_then(|v| v.to_str().ok()),
        Some("max-age=900")
    );
    let body = sitemap.text().await.expect("body");
    assert!(body.contains("<loc>https://ex.com/a</loc>"));

    let robots = gateway
        .client
        .get(format!("{}/robots.txt", gateway.base))
        .header("X-Forwarded-Host", "ex.com")
        .send()
        .await
        .expect("robots");
    assert_eq!(robots.status(), 200);
    assert_eq!(
        robots
            .headers()
            .get("cache-control")
            .and_then(|v| v.to_str().ok()),
        Some("max-age=600")
    );
    let body = robots.text().await.expect("body");
    assert!(body.contains("Sitemap: https://ex.com/sitemap.index.xml"));

    let missing_page = gateway
        .client
        .get(format!("{}/sitemap.9.xml", gateway.base))
        .header("X-Forwarded-Host", "ex.com")
        .send()
        .await
        .expect("missing page");
    assert_eq!(missing_page.status(), 404);
}

#[tokio::test]
async fn api_mode_namespaces_sitemaps_by_site() {
    let gateway = start_gateway(true).await;
    gateway
        .store
        .put(
            &html_request("/a").key(),
            &aged_snapshot("<h1>a</h1>", Duration::from_secs(30)),
        )
        .await
        .expect("seed");

    let response = gateway
        .client
        .get(format!("{}/sitemaps/ex.com/sitemap.xml", gateway.base))
        .send()
        .await
        .expect("sitemap");

    assert_eq!(response.status(), 200);
    let body = response.text().await.expect("body");
    assert!(body.contains("<loc>https://ex.com/a</loc>"));
}
