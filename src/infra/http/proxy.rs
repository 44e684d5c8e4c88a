//! Proxy mode: the Host (or forwarding headers) names the site, the path is
//! the page to serve.

use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};

use crate::application::coordinator::{RenderOutput, RenderRequest};
use crate::application::error::GatewayError;
use crate::domain::error::ErrorKind;
use crate::domain::site::normalize_host;
use crate::domain::snapshot::RenderType;

use super::forwarded::derive_origin;
use super::{GatewayState, default_site_config, respond, sitemaps};

pub async fn handle(state: GatewayState, parts: Parts) -> Response {
    let origin = match derive_origin(&parts.headers) {
        Ok(origin) => origin,
        Err(kind) => {
            return GatewayError::new(kind, "could not derive the target site").into_response();
        }
    };

    let resolved = match state.sites.resolve(&origin.host).await {
        Ok(resolved) => resolved,
        Err(err) => return GatewayError::internal(err).into_response(),
    };

    // Forwarded proto wins; a stored config supplies the default otherwise.
    let protocol = origin.proto.unwrap_or_else(|| {
        resolved
            .as_ref()
            .map(|config| config.default_protocol)
            .unwrap_or(crate::domain::site::Protocol::Https)
    });
    let host = normalize_host(&origin.host, protocol);

    let site_config = match resolved {
        Some(config) => (*config).clone(),
        None if state.mode.disallow_unknown_site => {
            return GatewayError::new(
                ErrorKind::ClientHostConfigNotExist,
                format!("no site config for `{host}`"),
            )
            .into_response();
        }
        None => default_site_config(&host, protocol),
    };

    // Root-level artifact names are sitemap territory.
    let path = parts.uri.path();
    if let Some(name) = path.strip_prefix('/') {
        if !name.contains('/') {
            if let Some(response) = sitemaps::serve_artifact(&state, &site_config, name).await {
                return response;
            }
        }
    }

    let rewritten = site_config.rewrite(path);
    if !site_config.allows(&rewritten) {
        return GatewayError::new(
            ErrorKind::ServerRobotsDisallow,
            format!("`{rewritten}` is disallowed by the site's robot policy"),
        )
        .into_response();
    }

    let mut page = rewritten;
    if let Some(query) = parts.uri.query() {
        page.push('?');
        page.push_str(query);
    }

    let request = RenderRequest {
        site: format!("{protocol}://{host}"),
        path: page,
        device_type: site_config.device_type,
        render_type: RenderType::Html,
        callback_url: None,
        no_wait: false,
        refresh: false,
        meta_only: false,
    };

    match state.coordinator.render(request).await {
        Ok(RenderOutput::Ready { snapshot, tier }) => respond::snapshot_html(&snapshot, tier),
        // Proxy requests always wait; Accepted cannot surface here.
        Ok(RenderOutput::Accepted) => {
            GatewayError::internal("unexpected accepted output in proxy mode").into_response()
        }
        Err(err) => err.into_response(),
    }
}
