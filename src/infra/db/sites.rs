use async_trait::async_trait;
use sqlx::types::Json;

use crate::application::repos::{SiteConfigRepo, StoreError};
use crate::domain::site::{Protocol, RewriteRule, RobotsPolicy, SiteConfig};
use crate::domain::snapshot::DeviceType;

use super::{PostgresStore, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct SiteConfigRow {
    host: String,
    default_protocol: String,
    device_type: DeviceType,
    robots: Option<Json<RobotsPolicy>>,
    rewrites: Json<Vec<RewriteRule>>,
}

impl SiteConfigRow {
    fn into_config(self) -> Result<SiteConfig, StoreError> {
        let default_protocol = self.default_protocol.parse::<Protocol>().map_err(|_| {
            StoreError::Persistence(format!(
                "site `{}` has unsupported protocol `{}`",
                self.host, self.default_protocol
            ))
        })?;

        Ok(SiteConfig {
            host: self.host,
            default_protocol,
            device_type: self.device_type,
            robots: self.robots.map(|json| json.0),
            rewrites: self.rewrites.0,
        })
    }
}

#[async_trait]
impl SiteConfigRepo for PostgresStore {
    async fn find_site(&self, host: &str) -> Result<Option<SiteConfig>, StoreError> {
        let row: Option<SiteConfigRow> = sqlx::query_as(
            r#"
            SELECT host, default_protocol, device_type, robots, rewrites
            FROM site_configs
            WHERE host = $1
            "#,
        )
        .bind(host)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(SiteConfigRow::into_config).transpose()
    }
}
