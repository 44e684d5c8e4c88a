//! Gateway-level errors and their wire representation.

use axum::Json;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::error;
use uuid::Uuid;

use crate::domain::error::ErrorKind;

use super::repos::StoreError;

/// Header mirroring the error `code` (and the cache tier on successes).
pub const KASHA_CODE_HEADER: &str = "Kasha-Code";

#[derive(Debug, Error)]
#[error("{message} ({})", .kind.code())]
pub struct GatewayError {
    pub kind: ErrorKind,
    pub message: String,
    pub event_id: Option<Uuid>,
}

impl GatewayError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            event_id: None,
        }
    }

    /// Catch-all for unexpected failures: logs the cause under a generated
    /// event id and surfaces only the id to the client.
    pub fn internal(detail: impl std::fmt::Display) -> Self {
        let event_id = Uuid::new_v4();
        error!(event_id = %event_id, detail = %detail, "internal gateway error");
        Self {
            kind: ErrorKind::ServerInternalError,
            message: "internal error".into(),
            event_id: Some(event_id),
        }
    }

    pub fn invalid_param(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ClientInvalidParam, message)
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.kind.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl From<StoreError> for GatewayError {
    fn from(err: StoreError) -> Self {
        GatewayError::internal(err)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<Uuid>,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.kind.code();
        let body = ErrorBody {
            code,
            message: self.message,
            timestamp: OffsetDateTime::now_utc().format(&Rfc3339).ok(),
            event_id: self.event_id,
        };

        let mut response = (status, Json(body)).into_response();
        response
            .headers_mut()
            .insert(KASHA_CODE_HEADER, HeaderValue::from_static(code));
        response
    }
}
