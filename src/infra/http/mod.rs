//! HTTP front: one dispatcher over two request interpretations.
//!
//! The pipeline is method-check → mode-select → route-dispatch: requests to a
//! configured API host use the explicit endpoints, anything else is proxy
//! mode where the Host (or forwarding headers) names the target site and the
//! path is the site-relative page.

mod api;
mod forwarded;
mod proxy;
mod respond;
mod sitemaps;

pub use respond::KASHA_CACHE_HEADER;

use std::collections::HashSet;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::header::HOST;
use axum::http::{Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::application::coordinator::RenderCoordinator;
use crate::application::error::GatewayError;
use crate::application::repos::SnapshotsRepo;
use crate::application::sitemap::SitemapService;
use crate::application::sites::SiteConfigResolver;
use crate::config::CacheSettings;
use crate::domain::error::ErrorKind;
use crate::domain::site::{Protocol, SiteConfig};
use crate::domain::snapshot::DeviceType;

use super::db::PostgresStore;

/// Mode selection and API-surface switches.
#[derive(Debug, Clone)]
pub struct ModeSettings {
    pub api_hosts: HashSet<String>,
    pub enable_homepage: bool,
    pub disallow_unknown_site: bool,
}

#[derive(Clone)]
pub struct GatewayState {
    pub coordinator: Arc<RenderCoordinator>,
    pub sitemaps: Arc<SitemapService>,
    pub sites: Arc<SiteConfigResolver>,
    pub snapshots: Arc<dyn SnapshotsRepo>,
    /// Present in real deployments; `None` lets tests run without Postgres.
    pub store: Option<Arc<PostgresStore>>,
    pub mode: Arc<ModeSettings>,
    pub cache: CacheSettings,
}

pub fn build_router(state: GatewayState) -> Router {
    Router::new().fallback(dispatch).with_state(state)
}

async fn dispatch(State(state): State<GatewayState>, request: Request<Body>) -> Response {
    let method = request.method().clone();
    match method {
        // Health probe: any HEAD answers 200 without touching the stores.
        Method::HEAD => StatusCode::OK.into_response(),
        Method::GET => {
            let (parts, _) = request.into_parts();
            let Some(host) = request_host(&parts) else {
                return GatewayError::new(
                    ErrorKind::ClientEmptyHostHeader,
                    "request carries no host",
                )
                .into_response();
            };

            if is_api_host(&state.mode.api_hosts, &host) {
                api::handle(state, parts).await
            } else {
                proxy::handle(state, parts).await
            }
        }
        _ => GatewayError::new(
            ErrorKind::ClientMethodNotAllowed,
            "only GET and HEAD are accepted",
        )
        .into_response(),
    }
}

fn request_host(parts: &axum::http::request::Parts) -> Option<String> {
    let from_header = parts
        .headers
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|host| !host.is_empty())
        .map(str::to_string);

    from_header.or_else(|| parts.uri.authority().map(|authority| authority.to_string()))
}

fn is_api_host(api_hosts: &HashSet<String>, host: &str) -> bool {
    let lowered = host.to_ascii_lowercase();
    if api_hosts.contains(&lowered) {
        return true;
    }
    match lowered.split_once(':') {
        Some((bare, _port)) => api_hosts.contains(bare),
        None => false,
    }
}

/// Fall back to a permissive default when a host has no stored config and
/// unknown sites are allowed.
fn default_site_config(host: &str, protocol: Protocol) -> SiteConfig {
    SiteConfig {
        host: host.to_string(),
        default_protocol: protocol,
        device_type: DeviceType::Desktop,
        robots: None,
        rewrites: Vec::new(),
    }
}
