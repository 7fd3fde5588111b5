//! SQLite-backed [`ChunkStore`] implementation.
//!
//! Chunks live in the `chunks` table keyed by `(doc_id, chunk_number)`.
//! Embeddings are stored inline as little-endian `f32` BLOBs and searched
//! by brute-force cosine similarity. The FTS5 table `chunks_fts` shares its
//! rowids with `chunks`; it is created lazily by
//! [`ensure_text_index`](ChunkStore::ensure_text_index) and kept in sync by
//! every chunk write once it exists.
//!
//! Only [`vector_search`](ChunkStore::vector_search) reads embeddings back;
//! keyword and BM25 results carry `vector: None`.

use std::collections::HashMap;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{Row, SqlitePool};

use rag_eval_core::models::{Document, TextChunk};
use rag_eval_core::store::{rank_keyword_matches, ChunkStore};
use rag_eval_core::terms::query_terms;
use rag_eval_core::vector::{blob_to_vec, rank_by_similarity, vec_to_blob};

const CHUNK_COLUMNS: &str =
    "c.doc_id, c.chunk_number, c.chunk_id, c.text, c.post_title, c.publish_date, c.source";

/// Vector column for searches that rank by embedding; text-only reads
/// select `NULL` instead and skip decoding the BLOBs.
const WITH_EMBEDDING: &str = "c.embedding";
const WITHOUT_EMBEDDING: &str = "NULL AS embedding";

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

    /// Insert a document unless one with the same content hash exists.
    ///
    /// Returns `false` if the document was already stored.
    pub async fn insert_document(&self, doc: &Document) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        insert_document_row(&mut conn, doc).await
    }

    /// Store `docs` and swap their chunks for `chunks` in one transaction.
    ///
    /// Every existing chunk of each document is removed before `chunks` are
    /// written. If any statement fails nothing is committed and the
    /// previous index is left as it was. Returns the number of documents
    /// that were new.
    pub async fn replace_documents(&self, docs: &[Document], chunks: &[TextChunk]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let indexed = text_index_exists(&mut *tx).await?;

        let mut new_docs = 0;
        for doc in docs {
            if insert_document_row(&mut tx, doc).await? {
                new_docs += 1;
            }
            delete_document_chunks(&mut tx, &doc.id, indexed).await?;
        }
        write_chunks(&mut tx, chunks, indexed).await?;

        tx.commit().await?;
        Ok(new_docs)
    }

    async fn all_chunks(&self, with_vectors: bool) -> Result<Vec<TextChunk>> {
        let sql = if with_vectors {
            format!(
                "SELECT {}, {} FROM chunks c WHERE c.embedding IS NOT NULL ORDER BY c.rowid",
                CHUNK_COLUMNS, WITH_EMBEDDING
            )
        } else {
            format!(
                "SELECT {}, {} FROM chunks c ORDER BY c.rowid",
                CHUNK_COLUMNS, WITHOUT_EMBEDDING
            )
        };
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_chunk).collect()
    }
}

async fn insert_document_row(conn: &mut SqliteConnection, doc: &Document) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO documents (id, filename, content, title, publish_date, source_url)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO NOTHING
        "#,
    )
    .bind(&doc.id)
    .bind(&doc.filename)
    .bind(&doc.content)
    .bind(&doc.metadata.title)
    .bind(doc.metadata.publish_date.to_string())
    .bind(&doc.metadata.source_url)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

async fn delete_document_chunks(conn: &mut SqliteConnection, doc_id: &str, indexed: bool) -> Result<()> {
    if indexed {
        sqlx::query("DELETE FROM chunks_fts WHERE rowid IN (SELECT rowid FROM chunks WHERE doc_id = ?)")
            .bind(doc_id)
            .execute(&mut *conn)
            .await?;
    }

    sqlx::query("DELETE FROM chunks WHERE doc_id = ?")
        .bind(doc_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn write_chunks(conn: &mut SqliteConnection, chunks: &[TextChunk], indexed: bool) -> Result<()> {
    for chunk in chunks {
        let blob = chunk.vector.as_deref().map(vec_to_blob);
        // DO UPDATE keeps the rowid stable, so chunks_fts rows stay aligned.
        sqlx::query(
            r#"
            INSERT INTO chunks (doc_id, chunk_number, chunk_id, text, post_title,
                                publish_date, source, embedding)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(doc_id, chunk_number) DO UPDATE SET
                chunk_id = excluded.chunk_id,
                text = excluded.text,
                post_title = excluded.post_title,
                publish_date = excluded.publish_date,
                source = excluded.source,
                embedding = excluded.embedding
            "#,
        )
        .bind(&chunk.doc_id)
        .bind(chunk.chunk_number)
        .bind(&chunk.chunk_id)
        .bind(&chunk.text)
        .bind(&chunk.post_title)
        .bind(chunk.publish_date.to_string())
        .bind(&chunk.source)
        .bind(blob)
        .execute(&mut *conn)
        .await?;

        if indexed {
            sqlx::query(
                "DELETE FROM chunks_fts WHERE rowid = (SELECT rowid FROM chunks WHERE doc_id = ? AND chunk_number = ?)",
            )
            .bind(&chunk.doc_id)
            .bind(chunk.chunk_number)
            .execute(&mut *conn)
            .await?;
            sqlx::query(
                "INSERT INTO chunks_fts (rowid, chunk_id, text) SELECT rowid, chunk_id, text FROM chunks WHERE doc_id = ? AND chunk_number = ?",
            )
            .bind(&chunk.doc_id)
            .bind(chunk.chunk_number)
            .execute(&mut *conn)
            .await?;
        }
    }
    Ok(())
}

async fn text_index_exists<'e, E>(executor: E) -> Result<bool>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='chunks_fts'",
    )
    .fetch_one(executor)
    .await?;
    Ok(exists)
}

fn row_to_chunk(row: &SqliteRow) -> Result<TextChunk> {
    let publish_date: String = row.try_get("publish_date")?;
    let publish_date = NaiveDate::from_str(&publish_date)
        .with_context(|| format!("Invalid publish_date in chunks table: '{}'", publish_date))?;
    let embedding: Option<Vec<u8>> = row.try_get("embedding")?;

    Ok(TextChunk {
        chunk_id: row.try_get("chunk_id")?,
        doc_id: row.try_get("doc_id")?,
        chunk_number: row.try_get("chunk_number")?,
        text: row.try_get("text")?,
        vector: embedding.map(|b| blob_to_vec(&b)),
        post_title: row.try_get("post_title")?,
        publish_date,
        source: row.try_get("source")?,
    })
}

/// FTS5 query matching any of the terms. Terms are quoted so no input can
/// be read as query syntax.
fn fts_query(text: &str) -> Option<String> {
    let terms = query_terms(text);
    if terms.is_empty() {
        return None;
    }
    Some(
        terms
            .iter()
            .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
            .collect::<Vec<_>>()
            .join(" OR "),
    )
}

#[async_trait]
impl ChunkStore for SqliteStore {
    async fn add_chunks(&self, chunks: &[TextChunk]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let indexed = text_index_exists(&mut *tx).await?;
        write_chunks(&mut tx, chunks, indexed).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn vector_search(&self, vector: &[f32], limit: usize) -> Result<Vec<TextChunk>> {
        let chunks = self.all_chunks(true).await?;
        let ranked = rank_by_similarity(vector, chunks.iter().map(|c| c.vector.as_deref()), limit);
        Ok(ranked.into_iter().map(|i| chunks[i].clone()).collect())
    }

    async fn keyword_search(&self, keywords: &[String], limit: usize) -> Result<Vec<TextChunk>> {
        if keywords.is_empty() {
            return Ok(Vec::new());
        }
        let chunks = self.all_chunks(false).await?;
        Ok(rank_keyword_matches(chunks, keywords, limit))
    }

    async fn ensure_text_index(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // FTS5 CREATE is not idempotent natively, so we check first
        if text_index_exists(&mut *tx).await? {
            tracing::debug!("text index already exists, skipping build");
            return Ok(());
        }

        sqlx::query("CREATE VIRTUAL TABLE chunks_fts USING fts5(chunk_id UNINDEXED, text)")
            .execute(&mut *tx)
            .await?;
        let built = sqlx::query(
            "INSERT INTO chunks_fts (rowid, chunk_id, text) SELECT rowid, chunk_id, text FROM chunks",
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(rows = built.rows_affected(), "built text index");
        Ok(())
    }

    async fn bm25_search(&self, text: &str, limit: usize) -> Result<Vec<TextChunk>> {
        if !text_index_exists(&self.pool).await? {
            bail!("Text index has not been built. Call ensure_text_index first.");
        }
        let query = match fts_query(text) {
            Some(q) => q,
            None => return Ok(Vec::new()),
        };

        let sql = format!(
            r#"
            SELECT {}, {}
            FROM chunks_fts
            JOIN chunks c ON c.rowid = chunks_fts.rowid
            WHERE chunks_fts MATCH ?
            ORDER BY bm25(chunks_fts), c.rowid
            LIMIT ?
            "#,
            CHUNK_COLUMNS, WITHOUT_EMBEDDING
        );
        let rows = sqlx::query(&sql)
            .bind(&query)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_chunk).collect()
    }

    async fn chunk_counts(&self) -> Result<HashMap<String, i64>> {
        let rows = sqlx::query("SELECT doc_id, COUNT(*) AS n FROM chunks GROUP BY doc_id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| -> Result<(String, i64)> { Ok((row.try_get("doc_id")?, row.try_get("n")?)) })
            .collect()
    }

    async fn chunk_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
