//! Wire error taxonomy.
//!
//! Every error that can surface to an HTTP client maps to one of these kinds;
//! the `code` string travels both in the JSON body and the `Kasha-Code`
//! header.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "CLIENT_INVALID_PARAM")]
    ClientInvalidParam,
    #[serde(rename = "CLIENT_INVALID_HEADER")]
    ClientInvalidHeader,
    #[serde(rename = "CLIENT_INVALID_PROTOCOL")]
    ClientInvalidProtocol,
    #[serde(rename = "CLIENT_EMPTY_HOST_HEADER")]
    ClientEmptyHostHeader,
    #[serde(rename = "CLIENT_HOST_CONFIG_NOT_EXIST")]
    ClientHostConfigNotExist,
    #[serde(rename = "CLIENT_METHOD_NOT_ALLOWED")]
    ClientMethodNotAllowed,
    #[serde(rename = "CLIENT_NO_SUCH_API")]
    ClientNoSuchApi,
    #[serde(rename = "SERVER_WORKER_TIMEOUT")]
    ServerWorkerTimeout,
    #[serde(rename = "SERVER_RENDER_ERROR")]
    ServerRenderError,
    #[serde(rename = "SERVER_NET_ERROR")]
    ServerNetError,
    #[serde(rename = "SERVER_ROBOTS_DISALLOW")]
    ServerRobotsDisallow,
    #[serde(rename = "SERVER_INTERNAL_ERROR")]
    ServerInternalError,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::ClientInvalidParam => "CLIENT_INVALID_PARAM",
            ErrorKind::ClientInvalidHeader => "CLIENT_INVALID_HEADER",
            ErrorKind::ClientInvalidProtocol => "CLIENT_INVALID_PROTOCOL",
            ErrorKind::ClientEmptyHostHeader => "CLIENT_EMPTY_HOST_HEADER",
            ErrorKind::ClientHostConfigNotExist => "CLIENT_HOST_CONFIG_NOT_EXIST",
            ErrorKind::ClientMethodNotAllowed => "CLIENT_METHOD_NOT_ALLOWED",
            ErrorKind::ClientNoSuchApi => "CLIENT_NO_SUCH_API",
            ErrorKind::ServerWorkerTimeout => "SERVER_WORKER_TIMEOUT",
            ErrorKind::ServerRenderError => "SERVER_RENDER_ERROR",
            ErrorKind::ServerNetError => "SERVER_NET_ERROR",
            ErrorKind::ServerRobotsDisallow => "SERVER_ROBOTS_DISALLOW",
            ErrorKind::ServerInternalError => "SERVER_INTERNAL_ERROR",
        }
    }

    pub fn http_status(self) -> u16 {
        match self {
            ErrorKind::ClientInvalidParam
            | ErrorKind::ClientInvalidHeader
            | ErrorKind::ClientInvalidProtocol
            | ErrorKind::ClientEmptyHostHeader => 400,
            ErrorKind::ClientHostConfigNotExist | ErrorKind::ClientNoSuchApi => 404,
            ErrorKind::ClientMethodNotAllowed => 405,
            ErrorKind::ServerRobotsDisallow => 403,
            ErrorKind::ServerWorkerTimeout => 504,
            ErrorKind::ServerNetError => 502,
            ErrorKind::ServerRenderError | ErrorKind::ServerInternalError => 500,
        }
    }

    /// Map a worker-reported error kind string onto the taxonomy. Unknown
    /// strings collapse into `SERVER_RENDER_ERROR`.
    pub fn from_worker(code: &str) -> Self {
        match code {
            "SERVER_NET_ERROR" => ErrorKind::ServerNetError,
            "SERVER_WORKER_TIMEOUT" => ErrorKind::ServerWorkerTimeout,
            _ => ErrorKind::ServerRenderError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_roundtrip_through_serde() {
        let json = serde_json::to_string(&ErrorKind::ServerWorkerTimeout).expect("serialize");
        assert_eq!(json, "\"SERVER_WORKER_TIMEOUT\"");
        let back: ErrorKind = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, ErrorKind::ServerWorkerTimeout);
    }

    #[test]
    fn statuses_match_taxonomy() {
        assert_eq!(ErrorKind::ClientInvalidParam.http_status(), 400);
        assert_eq!(ErrorKind::ClientHostConfigNotExist.http_status(), 404);
        assert_eq!(ErrorKind::ClientMethodNotAllowed.http_status(), 405);
        assert_eq!(ErrorKind::ServerRobotsDisallow.http_status(), 403);
        assert_eq!(ErrorKind::ServerWorkerTimeout.http_status(), 504);
        assert_eq!(ErrorKind::ServerNetError.http_status(), 502);
        assert_eq!(ErrorKind::ServerInternalError.http_status(), 500);
    }

    #[test]
    fn unknown_worker_codes_become_render_errors() {
        assert_eq!(ErrorKind::from_worker("BROWSER_CRASHED"), ErrorKind::ServerRenderError);
        assert_eq!(ErrorKind::from_worker("SERVER_NET_ERROR"), ErrorKind::ServerNetError);
    }
}
