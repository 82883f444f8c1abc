use anyhow::{Result, anyhow};
use async_trait::async_trait;
use libsql::{Row, params};
use std::time::SystemTime;

use super::models::{Ping, Site, i64_to_timestamp, timestamp_to_i64};
use crate::monitoring::store::{PingRecorder, SiteSource};
use crate::monitoring::types::Probe;
use crate::pool::{LibsqlManager, LibsqlPool};

const SITE_COLUMNS: &str = "id, user_id, name, url, updated_at, created_at";
const PING_COLUMNS: &str = "id, site_id, up, status_code, failure, latency_ms, updated_at, created_at";

/// LibSQL database implementation
pub struct DatabaseImpl {
    pool: LibsqlPool,
}

impl DatabaseImpl {
    /// Create a new database instance from a pool
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    /// Get a connection from the pool
    async fn get_conn(&self) -> Result<deadpool::managed::Object<LibsqlManager>> {
        self.pool.get().await.map_err(|e| anyhow!("Failed to get database connection: {}", e))
    }

    /// Register a site on behalf of `user_id`
    ///
    /// An empty name is stored as NULL.
    pub async fn create_site(&self, user_id: i64, name: Option<&str>, url: &str) -> Result<Site> {
        let conn = self.get_conn().await?;
        let name = name.map(str::trim).filter(|name| !name.is_empty()).map(str::to_string);
        let created_at = SystemTime::now();

        conn.execute(
            "INSERT INTO sites (user_id, name, url, created_at) VALUES (?, ?, ?, ?)",
            params![user_id, name.clone(), url.to_string(), timestamp_to_i64(created_at)],
        )
        .await?;

        Ok(Site {
            id: conn.last_insert_rowid(),
            user_id,
            name,
            url: url.to_string(),
            created_at: i64_to_timestamp(timestamp_to_i64(created_at)),
            updated_at: None,
        })
    }

    /// Delete a site; its pings go with it through ON DELETE CASCADE
    pub async fn delete_site(&self, site_id: i64) -> Result<bool> {
        let conn = self.get_conn().await?;
        let deleted = conn.execute("DELETE FROM sites WHERE id = ?", params![site_id]).await?;
        Ok(deleted > 0)
    }

    /// Most recent pings for a site, newest first
    pub async fn recent_pings(&self, site_id: i64, limit: usize) -> Result<Vec<Ping>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {PING_COLUMNS} FROM pings WHERE site_id = ? ORDER BY created_at DESC, id DESC LIMIT ?"
                ),
                params![site_id, limit as i64],
            )
            .await?;

        let mut pings = Vec::new();
        while let Some(row) = rows.next().await? {
            pings.push(ping_from_row(&row)?);
        }

        Ok(pings)
    }

    pub async fn count_pings(&self, site_id: i64) -> Result<u64> {
        let conn = self.get_conn().await?;
        let mut rows =
            conn.query("SELECT COUNT(*) FROM pings WHERE site_id = ?", params![site_id]).await?;

        match rows.next().await? {
            Some(row) => Ok(row.get::<i64>(0)? as u64),
            None => Ok(0),
        }
    }
}

fn site_from_row(row: &Row) -> Result<Site> {
    Ok(Site {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get::<Option<String>>(2)?,
        url: row.get(3)?,
        updated_at: row.get::<Option<i64>>(4)?.map(i64_to_timestamp),
        created_at: i64_to_timestamp(row.get(5)?),
    })
}

fn ping_from_row(row: &Row) -> Result<Ping> {
    let failure = match row.get::<Option<String>>(4)? {
        Some(raw) => Some(raw.parse().map_err(|e: String| anyhow!(e))?),
        None => None,
    };

    Ok(Ping {
        id: row.get(0)?,
        site_id: row.get(1)?,
        up: row.get::<i64>(2)? != 0,
        status_code: row.get::<i64>(3)? as u16,
        failure,
        latency_ms: row.get::<Option<i64>>(5)?.map(|v| v as u64),
        updated_at: row.get::<Option<i64>>(6)?.map(i64_to_timestamp),
        created_at: i64_to_timestamp(row.get(7)?),
    })
}

#[async_trait]
impl SiteSource for DatabaseImpl {
    async fn list_all_sites(&self) -> Result<Vec<Site>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(&format!("SELECT {SITE_COLUMNS} FROM sites ORDER BY created_at DESC, id DESC"), ())
            .await?;

        let mut sites = Vec::new();
        while let Some(row) = rows.next().await? {
            sites.push(site_from_row(&row)?);
        }

        Ok(sites)
    }
}

#[async_trait]
impl PingRecorder for DatabaseImpl {
    async fn record_ping(&self, site_id: i64, probe: &Probe) -> Result<i64> {
        let conn = self.get_conn().await?;
        let created_at = timestamp_to_i64(SystemTime::now());

        conn.execute(
            "INSERT INTO pings (site_id, up, status_code, failure, latency_ms, created_at) VALUES (?, ?, ?, ?, ?, ?)",
            params![
                site_id,
                if probe.outcome.is_up() { 1 } else { 0 },
                probe.outcome.status_code() as i64,
                probe.outcome.failure().map(|f| f.as_str().to_string()),
                probe.latency_ms() as i64,
                created_at
            ],
        )
        .await?;

        Ok(conn.last_insert_rowid())
    }
}
