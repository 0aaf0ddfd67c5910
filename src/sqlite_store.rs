//! SQLite-backed [`Store`] implementation.
//!
//! Timestamps are stored as Unix milliseconds. Extraction payloads are
//! stored as one JSON column; the chunk index and page range stay in
//! their own columns so ordering and the `(bundle_id, chunk_index)`
//! uniqueness constraint live in the schema.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use bundle_harness_core::models::{
    Bundle, BundleStatus, ChunkExtraction, ExtractionPayload, IndexedPage, PageText, Scope,
};
use bundle_harness_core::store::{CommitOutcome, Store};

/// SQLite implementation of the [`Store`] trait.
///
/// Wraps a [`SqlitePool`]. Chunk commits and lease claims are single
/// conditional statements (the commit inside a transaction, keyed on the
/// lease holder), so several processes may share one database file.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

const BUNDLE_COLUMNS: &str = "id, case_id, org_id, name, analysis_level, status, page_count, \
     chunk_size, total_chunks, processed_chunks, last_error, summary, created_at, updated_at";

fn ts_from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| anyhow!("invalid timestamp: {}", ms))
}

fn get_u32(row: &SqliteRow, col: &str) -> Result<u32> {
    let v: i64 = row.try_get(col)?;
    u32::try_from(v).with_context(|| format!("column {} out of range: {}", col, v))
}

fn bundle_from_row(row: &SqliteRow) -> Result<Bundle> {
    let level: String = row.try_get("analysis_level")?;
    let status: String = row.try_get("status")?;
    Ok(Bundle {
        id: row.try_get("id")?,
        case_id: row.try_get("case_id")?,
        org_id: row.try_get("org_id")?,
        name: row.try_get("name")?,
        analysis_level: level.parse()?,
        status: status.parse()?,
        page_count: get_u32(row, "page_count")?,
        chunk_size: get_u32(row, "chunk_size")?,
        total_chunks: get_u32(row, "total_chunks")?,
        processed_chunks: get_u32(row, "processed_chunks")?,
        last_error: row.try_get("last_error")?,
        summary: row.try_get("summary")?,
        created_at: ts_from_millis(row.try_get("created_at")?)?,
        updated_at: ts_from_millis(row.try_get("updated_at")?)?,
    })
}

fn extraction_from_row(row: &SqliteRow) -> Result<ChunkExtraction> {
    let payload_json: String = row.try_get("payload_json")?;
    let payload: ExtractionPayload =
        serde_json::from_str(&payload_json).context("corrupt extraction payload")?;
    Ok(ChunkExtraction {
        id: row.try_get("id")?,
        bundle_id: row.try_get("bundle_id")?,
        chunk_index: get_u32(row, "chunk_index")?,
        start_page: get_u32(row, "start_page")?,
        end_page: get_u32(row, "end_page")?,
        headings: payload.headings,
        timeline_events: payload.timeline_events,
        issues: payload.issues,
        candidate_contradictions: payload.candidate_contradictions,
        claims: payload.claims,
        text_hash: row.try_get("text_hash")?,
        created_at: ts_from_millis(row.try_get("created_at")?)?,
    })
}

impl SqliteStore {
    async fn owns(&self, scope: &Scope, bundle_id: &str) -> Result<bool> {
        let n: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM bundles WHERE id = ? AND case_id = ? AND org_id = ?",
        )
        .bind(bundle_id)
        .bind(&scope.case_id)
        .bind(&scope.org_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(n > 0)
    }

    async fn require_bundle(&self, scope: &Scope, bundle_id: &str) -> Result<Bundle> {
        self.get_bundle(scope, bundle_id)
            .await?
            .ok_or_else(|| anyhow!("Bundle not found: {}", bundle_id))
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_bundle(&self, bundle: &Bundle) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO bundles (id, case_id, org_id, name, analysis_level, status,
                                 page_count, chunk_size, total_chunks, processed_chunks,
                                 last_error, summary, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&bundle.id)
        .bind(&bundle.case_id)
        .bind(&bundle.org_id)
        .bind(&bundle.name)
        .bind(bundle.analysis_level.as_str())
        .bind(bundle.status.as_str())
        .bind(bundle.page_count as i64)
        .bind(bundle.chunk_size as i64)
        .bind(bundle.total_chunks as i64)
        .bind(bundle.processed_chunks as i64)
        .bind(&bundle.last_error)
        .bind(&bundle.summary)
        .bind(bundle.created_at.timestamp_millis())
        .bind(bundle.updated_at.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_bundle(&self, scope: &Scope, bundle_id: &str) -> Result<Option<Bundle>> {
        let sql = format!(
            "SELECT {} FROM bundles WHERE id = ? AND case_id = ? AND org_id = ?",
            BUNDLE_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(bundle_id)
            .bind(&scope.case_id)
            .bind(&scope.org_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(bundle_from_row).transpose()
    }

    async fn list_bundles(&self, scope: &Scope) -> Result<Vec<Bundle>> {
        let sql = format!(
            "SELECT {} FROM bundles WHERE case_id = ? AND org_id = ? \
             ORDER BY created_at DESC, rowid DESC",
            BUNDLE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(&scope.case_id)
            .bind(&scope.org_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(bundle_from_row).collect()
    }

    async fn set_status(
        &self,
        scope: &Scope,
        bundle_id: &str,
        status: BundleStatus,
        last_error: Option<&str>,
    ) -> Result<Bundle> {
        let result = sqlx::query(
            "UPDATE bundles SET status = ?, last_error = ?, updated_at = ? \
             WHERE id = ? AND case_id = ? AND org_id = ?",
        )
        .bind(status.as_str())
        .bind(last_error)
        .bind(Utc::now().timestamp_millis())
        .bind(bundle_id)
        .bind(&scope.case_id)
        .bind(&scope.org_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            bail!("Bundle not found: {}", bundle_id);
        }
        self.require_bundle(scope, bundle_id).await
    }

    async fn record_summary(&self, scope: &Scope, bundle_id: &str, summary: &str) -> Result<Bundle> {
        let result = sqlx::query(
            "UPDATE bundles SET summary = ?, status = 'completed', last_error = NULL, updated_at = ? \
             WHERE id = ? AND case_id = ? AND org_id = ?",
        )
        .bind(summary)
        .bind(Utc::now().timestamp_millis())
        .bind(bundle_id)
        .bind(&scope.case_id)
        .bind(&scope.org_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            bail!("Bundle not found: {}", bundle_id);
        }
        self.require_bundle(scope, bundle_id).await
    }

    async fn put_page_text(&self, scope: &Scope, bundle_id: &str, pages: &PageText) -> Result<()> {
        if !self.owns(scope, bundle_id).await? {
            bail!("Bundle not found: {}", bundle_id);
        }
        let mut tx = self.pool.begin().await?;
        for (page, text) in pages.iter() {
            // Plain INSERT: a second write hits the primary key and fails.
            sqlx::query("INSERT INTO page_texts (bundle_id, page, text) VALUES (?, ?, ?)")
                .bind(bundle_id)
                .bind(page as i64)
                .bind(text)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Page text for bundle {} is immutable", bundle_id))?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn page_range(
        &self,
        scope: &Scope,
        bundle_id: &str,
        start: u32,
        end: u32,
    ) -> Result<Vec<(u32, String)>> {
        let rows = sqlx::query(
            r#"
            SELECT p.page, p.text
            FROM page_texts p
            JOIN bundles b ON b.id = p.bundle_id
            WHERE p.bundle_id = ? AND b.case_id = ? AND b.org_id = ?
              AND p.page >= ? AND p.page <= ?
            ORDER BY p.page ASC
            "#,
        )
        .bind(bundle_id)
        .bind(&scope.case_id)
        .bind(&scope.org_id)
        .bind(start as i64)
        .bind(end as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| -> Result<(u32, String)> { Ok((get_u32(row, "page")?, row.try_get("text")?)) })
            .collect()
    }

    async fn put_search_pages(&self, scope: &Scope, bundle_id: &str, pages: &[IndexedPage]) -> Result<()> {
        if !self.owns(scope, bundle_id).await? {
            bail!("Bundle not found: {}", bundle_id);
        }
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM search_pages WHERE bundle_id = ?")
            .bind(bundle_id)
            .execute(&mut *tx)
            .await?;
        for p in pages {
            sqlx::query("INSERT INTO search_pages (bundle_id, page, text) VALUES (?, ?, ?)")
                .bind(bundle_id)
                .bind(p.page as i64)
                .bind(&p.text)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn search_pages(&self, scope: &Scope, bundle_id: &str) -> Result<Vec<IndexedPage>> {
        let rows = sqlx::query(
            r#"
            SELECT s.page, s.text
            FROM search_pages s
            JOIN bundles b ON b.id = s.bundle_id
            WHERE s.bundle_id = ? AND b.case_id = ? AND b.org_id = ?
            ORDER BY s.page ASC
            "#,
        )
        .bind(bundle_id)
        .bind(&scope.case_id)
        .bind(&scope.org_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| -> Result<IndexedPage> {
                Ok(IndexedPage {
                    page: get_u32(row, "page")?,
                    text: row.try_get("text")?,
                })
            })
            .collect()
    }

    async fn try_acquire_lease(
        &self,
        scope: &Scope,
        bundle_id: &str,
        lease_id: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE bundles SET lease_id = ?, lease_expires_at = ?
            WHERE id = ? AND case_id = ? AND org_id = ?
              AND (lease_id IS NULL OR lease_expires_at < ?)
            "#,
        )
        .bind(lease_id)
        .bind((now + ttl).timestamp_millis())
        .bind(bundle_id)
        .bind(&scope.case_id)
        .bind(&scope.org_id)
        .bind(now.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn release_lease(&self, scope: &Scope, bundle_id: &str, lease_id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE bundles SET lease_id = NULL, lease_expires_at = NULL \
             WHERE id = ? AND case_id = ? AND org_id = ? AND lease_id = ?",
        )
        .bind(bundle_id)
        .bind(&scope.case_id)
        .bind(&scope.org_id)
        .bind(lease_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn commit_chunk(
        &self,
        scope: &Scope,
        extraction: &ChunkExtraction,
        lease_id: &str,
        renew_until: DateTime<Utc>,
    ) -> Result<CommitOutcome> {
        let payload_json = serde_json::to_string(&extraction.payload())?;
        let mut tx = self.pool.begin().await?;

        // Compare-and-set on the prior counter value and the lease holder.
        // SET expressions see the pre-update row.
        let advanced = sqlx::query(
            r#"
            UPDATE bundles SET
                processed_chunks = processed_chunks + 1,
                status = CASE WHEN processed_chunks + 1 = total_chunks THEN 'completed' ELSE status END,
                last_error = CASE WHEN processed_chunks + 1 = total_chunks THEN NULL ELSE last_error END,
                lease_expires_at = ?,
                updated_at = ?
            WHERE id = ? AND case_id = ? AND org_id = ?
              AND lease_id = ?
              AND processed_chunks = ? AND processed_chunks < total_chunks
            "#,
        )
        .bind(renew_until.timestamp_millis())
        .bind(Utc::now().timestamp_millis())
        .bind(&extraction.bundle_id)
        .bind(&scope.case_id)
        .bind(&scope.org_id)
        .bind(lease_id)
        .bind(extraction.chunk_index as i64)
        .execute(&mut *tx)
        .await?;

        if advanced.rows_affected() == 0 {
            tx.rollback().await?;
            let current = self.require_bundle(scope, &extraction.bundle_id).await?;
            return Ok(CommitOutcome::Superseded(current));
        }

        sqlx::query(
            r#"
            INSERT INTO chunk_extractions (id, bundle_id, chunk_index, start_page, end_page,
                                           payload_json, text_hash, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(bundle_id, chunk_index) DO UPDATE SET
                id = excluded.id,
                start_page = excluded.start_page,
                end_page = excluded.end_page,
                payload_json = excluded.payload_json,
                text_hash = excluded.text_hash,
                created_at = excluded.created_at
            "#,
        )
        .bind(&extraction.id)
        .bind(&extraction.bundle_id)
        .bind(extraction.chunk_index as i64)
        .bind(extraction.start_page as i64)
        .bind(extraction.end_page as i64)
        .bind(&payload_json)
        .bind(&extraction.text_hash)
        .bind(extraction.created_at.timestamp_millis())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        let updated = self.require_bundle(scope, &extraction.bundle_id).await?;
        Ok(CommitOutcome::Committed(updated))
    }

    async fn list_extractions(&self, scope: &Scope, bundle_id: &str) -> Result<Vec<ChunkExtraction>> {
        let rows = sqlx::query(
            r#"
            SELECT x.id, x.bundle_id, x.chunk_index, x.start_page, x.end_page,
                   x.payload_json, x.text_hash, x.created_at
            FROM chunk_extractions x
            JOIN bundles b ON b.id = x.bundle_id
            WHERE x.bundle_id = ? AND b.case_id = ? AND b.org_id = ?
            ORDER BY x.chunk_index ASC
            "#,
        )
        .bind(bundle_id)
        .bind(&scope.case_id)
        .bind(&scope.org_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(extraction_from_row).collect()
    }

    async fn delete_case(&self, scope: &Scope) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        for table in ["page_texts", "chunk_extractions", "search_pages"] {
            let sql = format!(
                "DELETE FROM {} WHERE bundle_id IN \
                 (SELECT id FROM bundles WHERE case_id = ? AND org_id = ?)",
                table
            );
            sqlx::query(&sql)
                .bind(&scope.case_id)
                .bind(&scope.org_id)
                .execute(&mut *tx)
                .await?;
        }
        let deleted = sqlx::query("DELETE FROM bundles WHERE case_id = ? AND org_id = ?")
            .bind(&scope.case_id)
            .bind(&scope.org_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(deleted.rows_affected())
    }
}
