//! Shared sitemap/robots endpoint handling for both modes.

use axum::response::{IntoResponse, Response};

use crate::application::error::GatewayError;
use crate::application::sitemap::{ArtifactRequest, SitemapError, parse_artifact};
use crate::domain::error::ErrorKind;
use crate::domain::site::SiteConfig;

use super::{GatewayState, respond};

/// Serve one artifact by its filename, or `None` when the name is outside
/// the sitemap grammar and the caller should keep routing.
pub async fn serve_artifact(
    state: &GatewayState,
    site: &SiteConfig,
    name: &str,
) -> Option<Response> {
    let request = parse_artifact(name)?;

    let response = match request {
        ArtifactRequest::Robots => match state.sitemaps.robots_txt(site).await {
            Ok(artifact) => respond::artifact(&artifact, state.cache.robots_txt),
            Err(err) => sitemap_error(err),
        },
        ArtifactRequest::Sitemap(request) => match state.sitemaps.artifact(site, request).await {
            Ok(artifact) => respond::artifact(&artifact, state.cache.sitemap),
            Err(err) => sitemap_error(err),
        },
    };

    Some(response)
}

fn sitemap_error(err: SitemapError) -> Response {
    match err {
        SitemapError::PageNotFound => GatewayError::new(
            ErrorKind::ClientNoSuchApi,
            "sitemap page does not exist",
        )
        .into_response(),
        SitemapError::Store(err) => GatewayError::internal(err).into_response(),
    }
}
