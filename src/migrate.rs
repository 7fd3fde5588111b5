use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Create tables and indexes. Safe to run repeatedly.
///
/// The `chunks_fts` text index is not created here; it is built on demand
/// by [`SqliteStore::ensure_text_index`](crate::sqlite_store::SqliteStore).
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate(&pool).await?;
    pool.close().await;
    Ok(())
}

pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            filename TEXT NOT NULL,
            content TEXT NOT NULL,
            title TEXT NOT NULL,
            publish_date TEXT NOT NULL,
            source_url TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // chunk_id is the hash of the text and may repeat across documents.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            doc_id TEXT NOT NULL,
            chunk_number INTEGER NOT NULL,
            chunk_id TEXT NOT NULL,
            text TEXT NOT NULL,
            post_title TEXT NOT NULL,
            publish_date TEXT NOT NULL,
            source TEXT NOT NULL,
            embedding BLOB,
            PRIMARY KEY (doc_id, chunk_number)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_chunk_id ON chunks(chunk_id)")
        .execute(pool)
        .await?;

    Ok(())
}
