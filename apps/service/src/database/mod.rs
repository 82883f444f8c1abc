/// Database layer
///
/// The sites and pings tables live in the SQLite file shared with the web
/// front end. This service reads sites and appends pings; everything else in
/// that file belongs to the front end.

pub mod repository;
pub mod migrations;
pub mod models;

pub use repository::DatabaseImpl;

use anyhow::Result;

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<()> {
    migrations::run_migrations(conn).await
}
