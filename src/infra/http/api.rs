//! API-mode endpoints: explicit render/cache/invalidate calls plus sitemap
//! artifacts namespaced by site.

use axum::Json;
use axum::extract::Query;
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{Html, IntoResponse, Response};
use serde::Deserialize;
use url::Url;

use crate::application::coordinator::{RenderOutput, RenderRequest};
use crate::application::error::GatewayError;
use crate::domain::error::ErrorKind;
use crate::domain::site::{Protocol, normalize_host};
use crate::domain::snapshot::{DeviceType, RenderType, SnapshotKey};

use super::{GatewayState, default_site_config, respond, sitemaps};

const HOMEPAGE_HTML: &str = concat!(
    "<!doctype html>\n<html><head><title>kasha</title></head><body>\n",
    "<h1>kasha prerender gateway</h1>\n",
    "<p>GET /render?url=&lt;url&gt;&amp;deviceType=desktop&amp;type=html</p>\n",
    "<p>GET /cache?url=&lt;url&gt; (never blocks)</p>\n",
    "<p>GET /sitemaps/&lt;site&gt;/sitemap.xml</p>\n",
    "</body></html>\n",
);

pub async fn handle(state: GatewayState, parts: Parts) -> Response {
    let path = parts.uri.path().to_string();

    match path.as_str() {
        "/" => homepage(&state),
        "/render" => render(&state, &parts, false).await,
        "/cache" => render(&state, &parts, true).await,
        "/invalidate" => invalidate(&state, &parts).await,
        "/_health/store" => health(&state).await,
        _ => {
            if let Some(rest) = path.strip_prefix("/sitemaps/") {
                return sitemap(&state, rest).await;
            }
            if let Some(response) = static_fetch(&state, &parts).await {
                return response;
            }
            GatewayError::new(ErrorKind::ClientNoSuchApi, format!("no API at `{path}`"))
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenderQuery {
    url: Option<String>,
    device_type: Option<String>,
    #[serde(rename = "type")]
    render_type: Option<String>,
    no_wait: Option<String>,
    refresh: Option<String>,
    callback_url: Option<String>,
    meta_only: Option<String>,
}

/// Presence-style flag: `&noWait`, `&noWait=1`, `&noWait=true` all set it.
fn flag(value: &Option<String>) -> bool {
    match value.as_deref() {
        None => false,
        Some(raw) => !matches!(raw.to_ascii_lowercase().as_str(), "0" | "false"),
    }
}

async fn render(state: &GatewayState, parts: &Parts, force_no_wait: bool) -> Response {
    let query = match Query::<RenderQuery>::try_from_uri(&parts.uri) {
        Ok(Query(query)) => query,
        Err(err) => return GatewayError::invalid_param(err.to_string()).into_response(),
    };

    let Some(url) = query.url.as_deref() else {
        return GatewayError::invalid_param("missing `url` parameter").into_response();
    };

    let render_type = match query.render_type.as_deref() {
        None => RenderType::Html,
        Some(raw) => match raw.parse::<RenderType>() {
            Ok(render_type) => render_type,
            Err(()) => {
                return GatewayError::invalid_param(format!("unsupported type `{raw}`"))
                    .into_response();
            }
        },
    };

    if let Some(callback) = query.callback_url.as_deref() {
        if !is_http_url(callback) {
            return GatewayError::invalid_param("callbackUrl must be an http(s) URL")
                .into_response();
        }
    }

    let request = match build_request(state, url, query.device_type.as_deref(), render_type).await
    {
        Ok(mut request) => {
            request.no_wait = force_no_wait || flag(&query.no_wait);
            request.refresh = flag(&query.refresh);
            request.meta_only = flag(&query.meta_only);
            request.callback_url = query.callback_url.clone();
            request
        }
        Err(err) => return err.into_response(),
    };

    let meta_only = request.meta_only;
    match state.coordinator.render(request).await {
        Ok(RenderOutput::Ready { snapshot, tier }) => {
            respond::snapshot_json(&snapshot, tier, meta_only)
        }
        Ok(RenderOutput::Accepted) => respond::accepted(),
        Err(err) => err.into_response(),
    }
}

/// Translate a target URL into a coordinator input, applying the site's
/// policy gates.
async fn build_request(
    state: &GatewayState,
    url: &str,
    device_type: Option<&str>,
    render_type: RenderType,
) -> Result<RenderRequest, GatewayError> {
    let parsed = Url::parse(url)
        .map_err(|err| GatewayError::invalid_param(format!("invalid url: {err}")))?;

    let protocol = match parsed.scheme() {
        "http" => Protocol::Http,
        "https" => Protocol::Https,
        other => {
            return Err(GatewayError::new(
                ErrorKind::ClientInvalidProtocol,
                format!("unsupported protocol `{other}`"),
            ));
        }
    };

    let host = parsed
        .host_str()
        .ok_or_else(|| GatewayError::invalid_param("url has no host"))?;
    let host = normalize_host(host, protocol);

    let site_config = match state.sites.resolve(&host).await? {
        Some(config) => (*config).clone(),
        None if state.mode.disallow_unknown_site => {
            return Err(GatewayError::new(
                ErrorKind::ClientHostConfigNotExist,
                format!("no site config for `{host}`"),
            ));
        }
        None => default_site_config(&host, protocol),
    };

    let mut path = parsed.path().to_string();
    if let Some(query) = parsed.query() {
        path.push('?');
        path.push_str(query);
    }

    if !site_config.allows(parsed.path()) {
        return Err(GatewayError::new(
            ErrorKind::ServerRobotsDisallow,
            format!("`{path}` is disallowed by the site's robot policy"),
        ));
    }

    let device_type = match device_type {
        Some(raw) => raw.parse::<DeviceType>().map_err(|()| {
            GatewayError::invalid_param(format!("unsupported deviceType `{raw}`"))
        })?,
        None => site_config.device_type,
    };

    // The origin keeps a non-default port; the key must distinguish them.
    let site = parsed.origin().ascii_serialization();

    Ok(RenderRequest {
        site,
        path,
        device_type,
        render_type,
        callback_url: None,
        no_wait: false,
        refresh: false,
        meta_only: false,
    })
}

/// `GET /<http(s)-url>`: fetch the target without rendering it.
async fn static_fetch(state: &GatewayState, parts: &Parts) -> Option<Response> {
    let raw = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| parts.uri.path());
    let target = raw.strip_prefix('/')?;

    if !target.starts_with("http://") && !target.starts_with("https://") {
        return None;
    }

    let request = match build_request(state, target, None, RenderType::Static).await {
        Ok(request) => request,
        Err(err) => return Some(err.into_response()),
    };

    Some(match state.coordinator.render(request).await {
        Ok(RenderOutput::Ready { snapshot, tier }) => {
            respond::snapshot_json(&snapshot, tier, false)
        }
        Ok(RenderOutput::Accepted) => respond::accepted(),
        Err(err) => err.into_response(),
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InvalidateQuery {
    url: Option<String>,
    device_type: Option<String>,
    #[serde(rename = "type")]
    render_type: Option<String>,
}

/// Explicit snapshot invalidation; the only write surface besides renders.
async fn invalidate(state: &GatewayState, parts: &Parts) -> Response {
    let query = match Query::<InvalidateQuery>::try_from_uri(&parts.uri) {
        Ok(Query(query)) => query,
        Err(err) => return GatewayError::invalid_param(err.to_string()).into_response(),
    };

    let Some(url) = query.url.as_deref() else {
        return GatewayError::invalid_param("missing `url` parameter").into_response();
    };

    let render_type = match query.render_type.as_deref() {
        None => RenderType::Html,
        Some(raw) => match raw.parse::<RenderType>() {
            Ok(render_type) => render_type,
            Err(()) => {
                return GatewayError::invalid_param(format!("unsupported type `{raw}`"))
                    .into_response();
            }
        },
    };

    let request = match build_request(state, url, query.device_type.as_deref(), render_type).await
    {
        Ok(request) => request,
        Err(err) => return err.into_response(),
    };

    let key: SnapshotKey = request.key();
    match state.snapshots.delete(&key).await {
        Ok(existed) => (
            StatusCode::OK,
            Json(serde_json::json!({ "invalidated": existed })),
        )
            .into_response(),
        Err(err) => GatewayError::internal(err).into_response(),
    }
}

/// `GET /sitemaps/{site}/{artifact}`.
async fn sitemap(state: &GatewayState, rest: &str) -> Response {
    let Some((host, artifact_name)) = rest.split_once('/') else {
        return GatewayError::new(ErrorKind::ClientNoSuchApi, "missing sitemap artifact")
            .into_response();
    };
    if host.is_empty() || artifact_name.contains('/') {
        return GatewayError::new(ErrorKind::ClientNoSuchApi, "malformed sitemap path")
            .into_response();
    }

    let host = normalize_host(host, Protocol::Https);
    let site_config = match state.sites.resolve(&host).await {
        Ok(Some(config)) => (*config).clone(),
        Ok(None) if state.mode.disallow_unknown_site => {
            return GatewayError::new(
                ErrorKind::ClientHostConfigNotExist,
                format!("no site config for `{host}`"),
            )
            .into_response();
        }
        Ok(None) => default_site_config(&host, Protocol::Https),
        Err(err) => return GatewayError::internal(err).into_response(),
    };

    match sitemaps::serve_artifact(state, &site_config, artifact_name).await {
        Some(response) => response,
        None => GatewayError::new(
            ErrorKind::ClientNoSuchApi,
            format!("`{artifact_name}` is not a sitemap artifact"),
        )
        .into_response(),
    }
}

fn homepage(state: &GatewayState) -> Response {
    if state.mode.enable_homepage {
        Html(HOMEPAGE_HTML).into_response()
    } else {
        GatewayError::new(ErrorKind::ClientNoSuchApi, "homepage disabled").into_response()
    }
}

async fn health(state: &GatewayState) -> Response {
    match &state.store {
        Some(store) => match store.health_check().await {
            Ok(()) => StatusCode::NO_CONTENT.into_response(),
            Err(err) => GatewayError::internal(err).into_response(),
        },
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

fn is_http_url(raw: &str) -> bool {
    Url::parse(raw)
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false)
}
