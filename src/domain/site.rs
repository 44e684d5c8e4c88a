//! Per-origin rendering policy.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::snapshot::DeviceType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }

    /// Port implied by the scheme; stripped during host normalization.
    pub fn default_port(self) -> u16 {
        match self {
            Protocol::Http => 80,
            Protocol::Https => 443,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            _ => Err(()),
        }
    }
}

/// Robot policy for a site: raw `robots.txt` directive lines plus the
/// allow/deny prefixes used to decide which paths are indexable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RobotsPolicy {
    /// Directive lines emitted verbatim into `robots.txt`.
    pub directives: Vec<String>,
    pub allow: Vec<String>,
    pub deny: Vec<String>,
}

impl RobotsPolicy {
    /// Longest-prefix match: the most specific allow/deny rule wins, allow
    /// winning ties. No matching rule means indexable.
    pub fn is_indexable(&self, path: &str) -> bool {
        let allow = longest_prefix(&self.allow, path);
        let deny = longest_prefix(&self.deny, path);
        match (allow, deny) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(a), Some(d)) => a >= d,
        }
    }
}

fn longest_prefix(rules: &[String], path: &str) -> Option<usize> {
    rules
        .iter()
        .filter(|rule| !rule.is_empty() && path.starts_with(rule.as_str()))
        .map(|rule| rule.len())
        .max()
}

/// Path rewrite applied in proxy mode before dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewriteRule {
    pub from: String,
    pub to: String,
}

/// Rendering policy for one origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteConfig {
    pub host: String,
    pub default_protocol: Protocol,
    pub device_type: DeviceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub robots: Option<RobotsPolicy>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rewrites: Vec<RewriteRule>,
}

impl SiteConfig {
    /// Origin string used as the snapshot `site` component.
    pub fn origin(&self) -> String {
        format!("{}://{}", self.default_protocol, self.host)
    }

    /// Whether the site's robot policy permits rendering/indexing `path`.
    /// Sites without a policy allow everything.
    pub fn allows(&self, path: &str) -> bool {
        self.robots
            .as_ref()
            .map(|robots| robots.is_indexable(path))
            .unwrap_or(true)
    }

    /// Apply the first matching rewrite rule, if any.
    pub fn rewrite(&self, path: &str) -> String {
        for rule in &self.rewrites {
            if let Some(rest) = path.strip_prefix(rule.from.as_str()) {
                return format!("{}{rest}", rule.to);
            }
        }
        path.to_string()
    }
}

/// Canonical host form: lowercase, default port stripped.
pub fn normalize_host(raw: &str, protocol: Protocol) -> String {
    let lowered = raw.trim().to_ascii_lowercase();
    match lowered.rsplit_once(':') {
        Some((host, port)) if port.parse::<u16>() == Ok(protocol.default_port()) => {
            host.to_string()
        }
        _ => lowered,
    }
}
