//! Origin derivation for proxy mode.
//!
//! Precedence: `Forwarded` (RFC 7239, first element), then
//! `X-Forwarded-Host`/`X-Forwarded-Proto`, then the plain `Host` header.

use axum::http::HeaderMap;
use axum::http::header::HOST;

use crate::domain::error::ErrorKind;
use crate::domain::site::Protocol;

const FORWARDED: &str = "forwarded";
const X_FORWARDED_HOST: &str = "x-forwarded-host";
const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Host and (optional) protocol the client originally addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOrigin {
    pub host: String,
    pub proto: Option<Protocol>,
}

/// Derive the origin from the request headers.
pub fn derive_origin(headers: &HeaderMap) -> Result<RequestOrigin, ErrorKind> {
    if let Some(value) = headers.get(FORWARDED) {
        let value = value.to_str().map_err(|_| ErrorKind::ClientInvalidHeader)?;
        let parsed = parse_forwarded(value)?;
        if let Some(host) = parsed.host {
            return Ok(RequestOrigin {
                host,
                proto: parsed.proto,
            });
        }
        // A Forwarded header without a host pair still pins the protocol.
        if let Some(host) = x_forwarded_or_host(headers)? {
            return Ok(RequestOrigin {
                host,
                proto: parsed.proto,
            });
        }
        return Err(ErrorKind::ClientEmptyHostHeader);
    }

    if let Some(host) = header_str(headers, X_FORWARDED_HOST)? {
        let proto = match header_str(headers, X_FORWARDED_PROTO)? {
            Some(raw) => Some(
                raw.parse::<Protocol>()
                    .map_err(|_| ErrorKind::ClientInvalidProtocol)?,
            ),
            None => None,
        };
        return Ok(RequestOrigin { host, proto });
    }

    match header_str(headers, HOST.as_str())? {
        Some(host) => Ok(RequestOrigin { host, proto: None }),
        None => Err(ErrorKind::ClientEmptyHostHeader),
    }
}

struct ForwardedElement {
    host: Option<String>,
    proto: Option<Protocol>,
}

/// Parse the first element of a `Forwarded` header value.
fn parse_forwarded(value: &str) -> Result<ForwardedElement, ErrorKind> {
    let first = value.split(',').next().unwrap_or_default().trim();
    if first.is_empty() {
        return Err(ErrorKind::ClientInvalidHeader);
    }

    let mut host = None;
    let mut proto = None;

    for pair in first.split(';') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let (key, raw) = pair.split_once('=').ok_or(ErrorKind::ClientInvalidHeader)?;
        let raw = raw.trim().trim_matches('"');
        if raw.is_empty() {
            return Err(ErrorKind::ClientInvalidHeader);
        }
        match key.trim().to_ascii_lowercase().as_str() {
            "host" => host = Some(raw.to_string()),
            "proto" => {
                proto = Some(
                    raw.to_ascii_lowercase()
                        .parse::<Protocol>()
                        .map_err(|_| ErrorKind::ClientInvalidProtocol)?,
                );
            }
            // `for`, `by` and extension parameters are irrelevant here.
            _ => {}
        }
    }

    Ok(ForwardedElement { host, proto })
}

fn x_forwarded_or_host(headers: &HeaderMap) -> Result<Option<String>, ErrorKind> {
    if let Some(host) = header_str(headers, X_FORWARDED_HOST)? {
        return Ok(Some(host));
    }
    header_str(headers, HOST.as_str())
}

fn header_str(headers: &HeaderMap, name: &str) -> Result<Option<String>, ErrorKind> {
    match headers.get(name) {
        Some(value) => {
            let text = value
                .to_str()
                .map_err(|_| ErrorKind::ClientInvalidHeader)?
                .trim();
            Ok((!text.is_empty()).then(|| text.to_string()))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(
                axum::http::HeaderName::from_bytes(name.as_bytes()).expect("header name"),
                HeaderValue::from_str(value).expect("header value"),
            );
        }
        map
    }

    #[test]
    fn forwarded_header_wins_and_first_element_is_used() {
        let map = headers(&[
            ("forwarded", "for=1.2.3.4;host=a.example.com;proto=https, host=b.example.com"),
            ("x-forwarded-host", "c.example.com"),
            ("host", "d.example.com"),
        ]);

        let origin = derive_origin(&map).expect("origin");
        assert_eq!(origin.host, "a.example.com");
        assert_eq!(origin.proto, Some(Protocol::Https));
    }

    #[test]
    fn quoted_forwarded_values_are_unwrapped() {
        let map = headers(&[("forwarded", "host=\"ex.com:8443\";proto=\"https\"")]);

        let origin = derive_origin(&map).expect("origin");
        assert_eq!(origin.host, "ex.com:8443");
        assert_eq!(origin.proto, Some(Protocol::Https));
    }

    #[test]
    fn malformed_forwarded_is_rejected() {
        let map = headers(&[("forwarded", "host"), ("host", "ex.com")]);
        assert_eq!(derive_origin(&map), Err(ErrorKind::ClientInvalidHeader));
    }

    #[test]
    fn unsupported_forwarded_proto_is_rejected() {
        let map = headers(&[("forwarded", "host=ex.com;proto=gopher")]);
        assert_eq!(derive_origin(&map), Err(ErrorKind::ClientInvalidProtocol));
    }

    #[test]
    fn x_forwarded_pair_is_second_choice() {
        let map = headers(&[
            ("x-forwarded-host", "ex.com"),
            ("x-forwarded-proto", "http"),
            ("host", "internal.lb"),
        ]);

        let origin = derive_origin(&map).expect("origin");
        assert_eq!(origin.host, "ex.com");
        assert_eq!(origin.proto, Some(Protocol::Http));
    }

    #[test]
    fn host_header_is_the_fallback() {
        let map = headers(&[("host", "ex.com")]);
        let origin = derive_origin(&map).expect("origin");
        assert_eq!(origin.host, "ex.com");
        assert_eq!(origin.proto, None);
    }

    #[test]
    fn missing_host_is_an_empty_host_error() {
        let map = headers(&[]);
        assert_eq!(derive_origin(&map), Err(ErrorKind::ClientEmptyHostHeader));
    }
}
