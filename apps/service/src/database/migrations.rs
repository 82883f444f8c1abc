use anyhow::Result;
use libsql::Connection;

use super::models::timestamp_to_i64;

/// Schema version - increment when making schema changes
const SCHEMA_VERSION: i32 = 3;

/// Run database migrations
///
/// The front end creates its own users and sessions tables; sites.user_id is
/// therefore not a foreign key here.
pub async fn run_migrations(conn: &Connection) -> Result<()> {
    // WAL lets the front end keep reading while sweeps append pings
    conn.query("PRAGMA journal_mode = WAL", ()).await?.next().await?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL,
            description TEXT
        )",
        (),
    )
    .await?;

    let current_version = get_current_version(conn).await?;

    if current_version >= SCHEMA_VERSION {
        tracing::debug!("Database schema is up to date (version {})", current_version);
        return Ok(());
    }

    tracing::info!("Running migrations from version {} to {}", current_version, SCHEMA_VERSION);

    if current_version < 1 {
        run_migration_v1(conn).await?;
        record_migration(conn, 1, "Create sites and pings").await?;
    }

    if current_version < 2 {
        run_migration_v2(conn).await?;
        record_migration(conn, 2, "Index ping history by site").await?;
    }

    if current_version < 3 {
        run_migration_v3(conn).await?;
        record_migration(conn, 3, "Add probe columns to existing pings").await?;
    }

    tracing::info!("Database migrations completed (now at version {})", SCHEMA_VERSION);
    Ok(())
}

/// Get current schema version from database
async fn get_current_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn.query("SELECT MAX(version) FROM schema_migrations", ()).await?;

    if let Some(row) = rows.next().await? {
        let version: Option<i32> = row.get(0)?;
        Ok(version.unwrap_or(0))
    } else {
        Ok(0)
    }
}

/// Record that a migration was applied
async fn record_migration(conn: &Connection, version: i32, description: &str) -> Result<()> {
    let now = timestamp_to_i64(std::time::SystemTime::now());

    conn.execute(
        "INSERT INTO schema_migrations (version, applied_at, description) VALUES (?, ?, ?)",
        libsql::params![version, now, description],
    )
    .await?;

    tracing::info!("Applied migration v{}: {}", version, description);
    Ok(())
}

async fn run_migration_v1(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS sites (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            name TEXT,
            url TEXT NOT NULL CONSTRAINT url_not_blank CHECK (length(url) > 0),
            updated_at INTEGER,
            created_at INTEGER NOT NULL DEFAULT (unixepoch()),
            UNIQUE (user_id, url)
        )",
        (),
    )
    .await?;

    // status_code carries the down sentinel when up = 0
    conn.execute(
        "CREATE TABLE IF NOT EXISTS pings (
            id INTEGER PRIMARY KEY,
            site_id INTEGER NOT NULL REFERENCES sites(id) ON DELETE CASCADE,
            up INTEGER NOT NULL DEFAULT 0,
            status_code INTEGER NOT NULL,
            failure TEXT,
            latency_ms INTEGER,
            updated_at INTEGER,
            created_at INTEGER NOT NULL DEFAULT (unixepoch())
        )",
        (),
    )
    .await?;

    conn.execute("CREATE INDEX IF NOT EXISTS idx_sites_created_at ON sites(created_at DESC)", ())
        .await?;

    Ok(())
}

async fn run_migration_v2(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_pings_site_created_at ON pings(site_id, created_at DESC)",
        (),
    )
    .await?;

    Ok(())
}

/// Columns the monitor writes that the front end's own pings table lacks
const PING_PROBE_COLUMNS: [(&str, &str); 3] = [
    ("status_code", "INTEGER NOT NULL DEFAULT 500"),
    ("failure", "TEXT"),
    ("latency_ms", "INTEGER"),
];

/// The front end may have created pings first with only id, site_id, up and
/// timestamps; in that case v1's CREATE was a no-op.
async fn run_migration_v3(conn: &Connection) -> Result<()> {
    let existing = table_columns(conn, "pings").await?;

    for (name, definition) in PING_PROBE_COLUMNS {
        if existing.iter().any(|column| column == name) {
            continue;
        }

        conn.execute(&format!("ALTER TABLE pings ADD COLUMN {name} {definition}"), ())
            .await?;
        tracing::info!("Added column pings.{}", name);
    }

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_pings_site_created_at ON pings(site_id, created_at DESC)",
        (),
    )
    .await?;

    Ok(())
}

async fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut rows = conn.query(&format!("PRAGMA table_info({table})"), ()).await?;

    let mut columns = Vec::new();
    while let Some(row) = rows.next().await? {
        columns.push(row.get::<String>(1)?);
    }

    Ok(columns)
}
