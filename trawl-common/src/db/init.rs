//! Database initialization
//!
//! Tables are created idempotently at startup. Timestamps are stored as unix
//! milliseconds (see [`crate::time`]); list and map columns are JSON text.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Busy timeout applied before application-level lock retry kicks in
const BUSY_TIMEOUT_MS: u32 = 250;

/// Open (creating if needed) the database file and ensure the schema
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL allows concurrent readers with one writer
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query(&format!("PRAGMA busy_timeout = {}", BUSY_TIMEOUT_MS))
        .execute(&pool)
        .await?;

    create_schema(&pool).await?;
    Ok(pool)
}

/// In-memory database for tests and dry runs
///
/// Every SQLite connection to `:memory:` is a separate database, so the pool
/// is pinned to a single connection.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    create_schema(&pool).await?;
    Ok(pool)
}

/// Create every table (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_items_table(pool).await?;
    create_source_fetches_table(pool).await?;
    create_heuristic_scores_table(pool).await?;
    create_analysis_packs_table(pool).await?;
    create_drafts_table(pool).await?;
    Ok(())
}

async fn create_items_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS items (
            id TEXT PRIMARY KEY,
            dedup_key TEXT NOT NULL UNIQUE,
            source_id TEXT NOT NULL,
            title TEXT NOT NULL,
            url TEXT NOT NULL,
            guid TEXT,
            published_at INTEGER NOT NULL,
            language TEXT,
            word_count INTEGER,
            source_domain TEXT NOT NULL,
            text TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            is_duplicate INTEGER NOT NULL DEFAULT 0,
            fetched_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_items_published_at ON items(published_at)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_items_content_hash ON items(content_hash)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_source_fetches_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS source_fetches (
            source_id TEXT PRIMARY KEY,
            last_fetch_at INTEGER NOT NULL,
            last_status TEXT NOT NULL CHECK (last_status IN ('ok', 'failed')),
            item_count INTEGER NOT NULL DEFAULT 0,
            error TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_heuristic_scores_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS heuristic_scores (
            item_id TEXT NOT NULL,
            persona_id TEXT NOT NULL,
            version TEXT NOT NULL,
            score REAL NOT NULL,
            breakdown TEXT NOT NULL,
            computed_at INTEGER NOT NULL,
            PRIMARY KEY (item_id, persona_id, version)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_analysis_packs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS analysis_packs (
            item_id TEXT NOT NULL,
            persona_id TEXT NOT NULL,
            tier TEXT NOT NULL CHECK (tier IN ('lite', 'full')),
            status TEXT NOT NULL CHECK (status IN ('pending', 'done', 'failed')),
            topic TEXT,
            summary_short TEXT,
            summary_long TEXT,
            dimension_scores TEXT NOT NULL DEFAULT '{}',
            overall_score REAL,
            action TEXT,
            reasons TEXT NOT NULL DEFAULT '[]',
            suggested_angle TEXT,
            key_points TEXT NOT NULL DEFAULT '[]',
            quotes TEXT NOT NULL DEFAULT '[]',
            model TEXT NOT NULL,
            prompt_version TEXT NOT NULL,
            prompt_tokens INTEGER NOT NULL DEFAULT 0,
            completion_tokens INTEGER NOT NULL DEFAULT 0,
            error TEXT,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (item_id, persona_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_packs_persona_updated ON analysis_packs(persona_id, updated_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_drafts_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS drafts (
            id TEXT PRIMARY KEY,
            persona_id TEXT NOT NULL,
            platform TEXT NOT NULL,
            merge_strategy TEXT NOT NULL,
            item_ids TEXT NOT NULL,
            commentary TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL CHECK (status IN ('selected', 'composed', 'exported')),
            output TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
