//! Response formatting: freshness headers plus the JSON/HTML render bodies.

use std::time::Duration;

use axum::Json;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, LOCATION};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use time::OffsetDateTime;

use crate::application::sitemap::SitemapArtifact;
use crate::domain::snapshot::{CacheTier, PageMeta, Snapshot};

/// Header naming the freshness tier a response was served from.
pub const KASHA_CACHE_HEADER: &str = "Kasha-Cache";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RenderBody<'a> {
    status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    redirect: Option<&'a str>,
    meta: &'a PageMeta,
    open_graph: &'a serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

/// API-mode render response: the snapshot as JSON, outer status 200.
pub fn snapshot_json(snapshot: &Snapshot, tier: CacheTier, meta_only: bool) -> Response {
    let content = if meta_only {
        None
    } else {
        snapshot
            .content
            .as_ref()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    };

    let body = RenderBody {
        status: snapshot.status,
        redirect: snapshot.redirect.as_deref(),
        meta: &snapshot.meta,
        open_graph: &snapshot.open_graph,
        content,
    };

    let mut response = (StatusCode::OK, Json(body)).into_response();
    apply_freshness_headers(&mut response, snapshot, tier);
    response
}

/// Proxy-mode render response: the rendered body verbatim, carrying the
/// status the worker observed; redirects become real redirects.
pub fn snapshot_html(snapshot: &Snapshot, tier: CacheTier) -> Response {
    let status =
        StatusCode::from_u16(snapshot.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let mut response = match (&snapshot.redirect, &snapshot.content) {
        (Some(target), _) => {
            let mut response = status.into_response();
            if let Ok(value) = HeaderValue::from_str(target) {
                response.headers_mut().insert(LOCATION, value);
            }
            response
        }
        (None, Some(content)) => {
            let mut response = (status, content.clone()).into_response();
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/html; charset=utf-8"),
            );
            response
        }
        (None, None) => status.into_response(),
    };

    apply_freshness_headers(&mut response, snapshot, tier);
    response
}

/// `no_wait` dispatch acknowledgement.
pub fn accepted() -> Response {
    let mut response = (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "status": 202 })),
    )
        .into_response();
    response.headers_mut().insert(
        KASHA_CACHE_HEADER,
        HeaderValue::from_static(CacheTier::Updating.as_str()),
    );
    response
}

/// Sitemap or robots artifact with its artifact-cache lifetime.
pub fn artifact(artifact: &SitemapArtifact, max_age: Duration) -> Response {
    let mut response = (StatusCode::OK, artifact.body.clone()).into_response();
    let headers = response.headers_mut();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static(artifact.content_type),
    );
    if let Ok(value) = HeaderValue::from_str(&format!("max-age={}", max_age.as_secs())) {
        headers.insert(CACHE_CONTROL, value);
    }
    response
}

fn apply_freshness_headers(response: &mut Response, snapshot: &Snapshot, tier: CacheTier) {
    let headers = response.headers_mut();
    headers.insert(
        KASHA_CACHE_HEADER,
        HeaderValue::from_static(tier.as_str()),
    );
    let remaining = snapshot.remaining_private(OffsetDateTime::now_utc());
    if let Ok(value) = HeaderValue::from_str(&format!("max-age={remaining}")) {
        headers.insert(CACHE_CONTROL, value);
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use time::macros::datetime;

    use crate::domain::snapshot::SnapshotTimes;

    use super::*;

    fn snapshot(redirect: Option<&str>, content: Option<&'static [u8]>) -> Snapshot {
        let at = datetime!(2025-06-01 12:00 UTC);
        Snapshot {
            status: if redirect.is_some() { 301 } else { 200 },
            redirect: redirect.map(str::to_string),
            meta: PageMeta::default(),
            open_graph: serde_json::Value::Null,
            links: Vec::new(),
            content: content.map(Bytes::from_static),
            error: None,
            times: SnapshotTimes {
                rendered_at: at,
                updated_at: at,
                last_accessed_at: at,
            },
            private_expires: OffsetDateTime::now_utc() + Duration::from_secs(120),
            shared_expires: OffsetDateTime::now_utc() + Duration::from_secs(86_400),
        }
    }

    #[test]
    fn json_response_reports_tier_and_remaining_age() {
        let response = snapshot_json(&snapshot(None, Some(b"<h1>A</h1>")), CacheTier::Fresh, false);

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(KASHA_CACHE_HEADER)
                .and_then(|v| v.to_str().ok()),
            Some("fresh")
        );
        let cache_control = response
            .headers()
            .get(CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        assert!(cache_control.starts_with("max-age="));
    }

    #[test]
    fn html_redirect_sets_location() {
        let response = snapshot_html(
            &snapshot(Some("https://ex.com/new"), None),
            CacheTier::Fresh,
        );

        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(
            response.headers().get(LOCATION).and_then(|v| v.to_str().ok()),
            Some("https://ex.com/new")
        );
    }

    #[test]
    fn accepted_reports_updating_tier() {
        let response = accepted();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(
            response
                .headers()
                .get(KASHA_CACHE_HEADER)
                .and_then(|v| v.to_str().ok()),
            Some("updating")
        );
    }
}
