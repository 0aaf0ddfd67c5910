//! Idempotent schema setup for the SQLite store.
//!
//! Every statement is `CREATE … IF NOT EXISTS`, so `bh init` can run
//! against an existing database without touching its data.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    // Bundles, with the processing lease inline so claiming it is a
    // single conditional UPDATE.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bundles (
            id TEXT PRIMARY KEY,
            case_id TEXT NOT NULL,
            org_id TEXT NOT NULL,
            name TEXT NOT NULL,
            analysis_level TEXT NOT NULL,
            status TEXT NOT NULL,
            page_count INTEGER NOT NULL,
            chunk_size INTEGER NOT NULL,
            total_chunks INTEGER NOT NULL,
            processed_chunks INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            summary TEXT,
            lease_id TEXT,
            lease_expires_at INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            CHECK (processed_chunks >= 0 AND processed_chunks <= total_chunks)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_bundles_scope ON bundles(case_id, org_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS page_texts (
            bundle_id TEXT NOT NULL,
            page INTEGER NOT NULL,
            text TEXT NOT NULL,
            PRIMARY KEY (bundle_id, page),
            FOREIGN KEY (bundle_id) REFERENCES bundles(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunk_extractions (
            id TEXT PRIMARY KEY,
            bundle_id TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            start_page INTEGER NOT NULL,
            end_page INTEGER NOT NULL,
            payload_json TEXT NOT NULL,
            text_hash TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            UNIQUE(bundle_id, chunk_index),
            FOREIGN KEY (bundle_id) REFERENCES bundles(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS search_pages (
            bundle_id TEXT NOT NULL,
            page INTEGER NOT NULL,
            text TEXT NOT NULL,
            PRIMARY KEY (bundle_id, page),
            FOREIGN KEY (bundle_id) REFERENCES bundles(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
