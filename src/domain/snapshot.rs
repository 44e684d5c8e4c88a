//! Rendered snapshots and their freshness state.
//!
//! A snapshot is one rendered representation of a URL for one device class
//! and render type. Freshness is a two-tier window: up to `private_expires`
//! the snapshot is served as-is; between `private_expires` and
//! `shared_expires` it is served stale while a background refresh runs;
//! beyond `shared_expires` it is no longer trusted.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "device_type", rename_all = "lowercase")]
pub enum DeviceType {
    Desktop,
    Mobile,
}

impl DeviceType {
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceType::Desktop => "desktop",
            DeviceType::Mobile => "mobile",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceType {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "desktop" => Ok(DeviceType::Desktop),
            "mobile" => Ok(DeviceType::Mobile),
            _ => Err(()),
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "render_type", rename_all = "lowercase")]
pub enum RenderType {
    Html,
    Static,
}

impl RenderType {
    pub fn as_str(self) -> &'static str {
        match self {
            RenderType::Html => "html",
            RenderType::Static => "static",
        }
    }
}

impl fmt::Display for RenderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RenderType {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "html" => Ok(RenderType::Html),
            "static" => Ok(RenderType::Static),
            _ => Err(()),
        }
    }
}

/// Storage key of one snapshot. `site` is the origin (`https://example.com`),
/// `path` the site-relative path including any query string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotKey {
    pub site: String,
    pub path: String,
    pub device_type: DeviceType,
    pub render_type: RenderType,
}

impl SnapshotKey {
    /// Absolute URL the key denotes.
    pub fn url(&self) -> String {
        format!("{}{}", self.site, self.path)
    }
}

impl fmt::Display for SnapshotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{} [{}/{}]",
            self.site, self.path, self.device_type, self.render_type
        )
    }
}

/// Page metadata extracted by the render worker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<OffsetDateTime>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub videos: Vec<String>,
}

/// Freshness timestamps carried by every persisted snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotTimes {
    #[serde(with = "time::serde::rfc3339")]
    pub rendered_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_accessed_at: OffsetDateTime,
}

/// One rendered artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
    #[serde(default)]
    pub meta: PageMeta,
    #[serde(default)]
    pub open_graph: serde_json::Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<String>,
    #[serde(default, with = "base64_bytes")]
    pub content: Option<Bytes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub times: SnapshotTimes,
    #[serde(with = "time::serde::rfc3339")]
    pub private_expires: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub shared_expires: OffsetDateTime,
}

/// Freshness classification at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Within `private_expires`: serve directly.
    Fresh,
    /// Past `private_expires` but within `shared_expires`: serve and refresh
    /// in the background.
    Stale,
    /// Past `shared_expires`: a blocking render is required.
    Expired,
}

impl Snapshot {
    /// Classify this snapshot against the freshness windows.
    pub fn freshness(&self, now: OffsetDateTime) -> Freshness {
        if now <= self.private_expires {
            Freshness::Fresh
        } else if now <= self.shared_expires {
            Freshness::Stale
        } else {
            Freshness::Expired
        }
    }

    /// Seconds until `private_expires`, floored at zero. Drives the
    /// `Cache-Control: max-age` value on responses.
    pub fn remaining_private(&self, now: OffsetDateTime) -> u64 {
        let remaining = self.private_expires - now;
        remaining.whole_seconds().max(0) as u64
    }

    /// Stamp freshness windows from a render instant. `updated_at` and
    /// `last_accessed_at` are set to `rendered_at`; the store bumps them on
    /// write and read respectively.
    pub fn stamp(&mut self, rendered_at: OffsetDateTime, maxage: Duration, s_maxage: Duration) {
        self.times = SnapshotTimes {
            rendered_at,
            updated_at: rendered_at,
            last_accessed_at: rendered_at,
        };
        self.private_expires = rendered_at + maxage;
        self.shared_expires = rendered_at + s_maxage;
    }

    /// Structural invariants: timestamps are ordered and `content` is present
    /// exactly when the snapshot is neither an error nor a redirect.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.times.rendered_at > self.times.updated_at {
            return Err("renderedAt is later than updatedAt".into());
        }
        if self.private_expires > self.shared_expires {
            return Err("privateExpires is later than sharedExpires".into());
        }
        let expect_content = self.error.is_none() && self.redirect.is_none();
        if expect_content != self.content.is_some() {
            return Err("content must be present iff error and redirect are absent".into());
        }
        Ok(())
    }
}

/// Cache tier reported to the client on render responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    Fresh,
    StaleRevalidating,
    Updated,
    Updating,
    Miss,
}

impl CacheTier {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheTier::Fresh => "fresh",
            CacheTier::StaleRevalidating => "stale-revalidating",
            CacheTier::Updated => "updated",
            CacheTier::Updating => "updating",
            CacheTier::Miss => "miss",
        }
    }
}

/// Serialize `Option<Bytes>` as base64 so rendered bodies survive the JSON
/// bus envelope without escaping issues.
pub mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Bytes>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Bytes>, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        match encoded {
            Some(text) => STANDARD
                .decode(text.as_bytes())
                .map(|raw| Some(Bytes::from(raw)))
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}
