use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use sqlx::types::Json;
use time::OffsetDateTime;

use crate::application::repos::{ScanPage, SnapshotDigest, SnapshotsRepo, StoreError};
use crate::domain::snapshot::{
    DeviceType, PageMeta, RenderType, Snapshot, SnapshotKey, SnapshotTimes,
};

use super::{PostgresStore, map_sqlx_error};

const JANITOR_LEASE_NAME: &str = "janitor";

#[derive(sqlx::FromRow)]
struct SnapshotRow {
    status: i32,
    redirect: Option<String>,
    meta: Json<PageMeta>,
    open_graph: serde_json::Value,
    links: Vec<String>,
    content: Option<Vec<u8>>,
    error: Option<String>,
    rendered_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    last_accessed_at: OffsetDateTime,
    private_expires: OffsetDateTime,
    shared_expires: OffsetDateTime,
}

impl From<SnapshotRow> for Snapshot {
    fn from(row: SnapshotRow) -> Self {
        Self {
            status: row.status as u16,
            redirect: row.redirect,
            meta: row.meta.0,
            open_graph: row.open_graph,
            links: row.links,
            content: row.content.map(Bytes::from),
            error: row.error,
            times: SnapshotTimes {
                rendered_at: row.rendered_at,
                updated_at: row.updated_at,
                last_accessed_at: row.last_accessed_at,
            },
            private_expires: row.private_expires,
            shared_expires: row.shared_expires,
        }
    }
}

#[derive(sqlx::FromRow)]
struct DigestRow {
    path: String,
    device_type: DeviceType,
    render_type: RenderType,
    status: i32,
    updated_at: OffsetDateTime,
    meta: Json<PageMeta>,
}

impl From<DigestRow> for SnapshotDigest {
    fn from(row: DigestRow) -> Self {
        Self {
            path: row.path,
            device_type: row.device_type,
            render_type: row.render_type,
            status: row.status as u16,
            updated_at: row.updated_at,
            meta: row.meta.0,
        }
    }
}

/// Scan cursor: the full key of the last row, JSON-encoded so arbitrary
/// path bytes survive the round trip.
fn encode_cursor(path: &str, device_type: DeviceType, render_type: RenderType) -> String {
    serde_json::to_string(&(path, device_type, render_type))
        .unwrap_or_else(|_| String::from("[\"\",\"desktop\",\"html\"]"))
}

fn decode_cursor(cursor: &str) -> Result<(String, DeviceType, RenderType), StoreError> {
    serde_json::from_str(cursor)
        .map_err(|err| StoreError::Persistence(format!("invalid scan cursor: {err}")))
}

#[async_trait]
impl SnapshotsRepo for PostgresStore {
    async fn get(&self, key: &SnapshotKey) -> Result<Option<Snapshot>, StoreError> {
        let row: Option<SnapshotRow> = sqlx::query_as(
            r#"
            UPDATE snapshots
            SET last_accessed_at = now()
            WHERE site = $1 AND path = $2 AND device_type = $3 AND render_type = $4
            RETURNING status, redirect, meta, open_graph, links, content, error,
                      rendered_at, updated_at, last_accessed_at,
                      private_expires, shared_expires
            "#,
        )
        .bind(&key.site)
        .bind(&key.path)
        .bind(key.device_type)
        .bind(key.render_type)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(Snapshot::from))
    }

    async fn put(&self, key: &SnapshotKey, snapshot: &Snapshot) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO snapshots (
                site, path, device_type, render_type,
                status, redirect, meta, open_graph, links, content, error,
                rendered_at, updated_at, last_accessed_at,
                private_expires, shared_expires
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, now(), $13, $14, $15)
            ON CONFLICT (site, path, device_type, render_type) DO UPDATE SET
                status = EXCLUDED.status,
                redirect = EXCLUDED.redirect,
                meta = EXCLUDED.meta,
                open_graph = EXCLUDED.open_graph,
                links = EXCLUDED.links,
                content = EXCLUDED.content,
                error = EXCLUDED.error,
                rendered_at = EXCLUDED.rendered_at,
                updated_at = now(),
                private_expires = EXCLUDED.private_expires,
                shared_expires = EXCLUDED.shared_expires
            "#,
        )
        .bind(&key.site)
        .bind(&key.path)
        .bind(key.device_type)
        .bind(key.render_type)
        .bind(snapshot.status as i32)
        .bind(&snapshot.redirect)
        .bind(Json(&snapshot.meta))
        .bind(&snapshot.open_graph)
        .bind(&snapshot.links)
        .bind(snapshot.content.as_ref().map(|bytes| bytes.as_ref()))
        .bind(&snapshot.error)
        .bind(snapshot.times.rendered_at)
        .bind(snapshot.times.last_accessed_at)
        .bind(snapshot.private_expires)
        .bind(snapshot.shared_expires)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn delete(&self, key: &SnapshotKey) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM snapshots
            WHERE site = $1 AND path = $2 AND device_type = $3 AND render_type = $4
            "#,
        )
        .bind(&key.site)
        .bind(&key.path)
        .bind(key.device_type)
        .bind(key.render_type)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn scan_site(
        &self,
        site: &str,
        cursor: Option<String>,
        limit: usize,
    ) -> Result<ScanPage, StoreError> {
        let limit = limit.clamp(1, 10_000) as i64;

        let rows: Vec<DigestRow> = match cursor.as_deref() {
            Some(cursor) => {
                let (path, device_type, render_type) = decode_cursor(cursor)?;
                sqlx::query_as(
                    r#"
                    SELECT path, device_type, render_type, status, updated_at, meta
                    FROM snapshots
                    WHERE site = $1 AND (path, device_type, render_type) > ($2, $3, $4)
                    ORDER BY path, device_type, render_type
                    LIMIT $5
                    "#,
                )
                .bind(site)
                .bind(path)
                .bind(device_type)
                .bind(render_type)
                .bind(limit)
                .fetch_all(self.pool())
                .await
            }
            None => {
                sqlx::query_as(
                    r#"
                    SELECT path, device_type, render_type, status, updated_at, meta
                    FROM snapshots
                    WHERE site = $1
                    ORDER BY path, device_type, render_type
                    LIMIT $2
                    "#,
                )
                .bind(site)
                .bind(limit)
                .fetch_all(self.pool())
                .await
            }
        }
        .map_err(map_sqlx_error)?;

        let next_cursor = if rows.len() as i64 == limit {
            rows.last()
                .map(|row| encode_cursor(&row.path, row.device_type, row.render_type))
        } else {
            None
        };

        Ok(ScanPage {
            items: rows.into_iter().map(SnapshotDigest::from).collect(),
            next_cursor,
        })
    }

    async fn expire_before(&self, cutoff: OffsetDateTime) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM snapshots WHERE updated_at < $1")
            .bind(cutoff)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn acquire_janitor_lease(&self, holder: &str, ttl: Duration) -> Result<bool, StoreError> {
        // Conditional upsert: taken over only when expired or already ours.
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            INSERT INTO janitor_lease (name, holder, expires_at)
            VALUES ($1, $2, now() + make_interval(secs => $3))
            ON CONFLICT (name) DO UPDATE SET
                holder = EXCLUDED.holder,
                expires_at = EXCLUDED.expires_at
            WHERE janitor_lease.expires_at < now() OR janitor_lease.holder = EXCLUDED.holder
            RETURNING holder
            "#,
        )
        .bind(JANITOR_LEASE_NAME)
        .bind(holder)
        .bind(ttl.as_secs_f64())
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.is_some())
    }
}
