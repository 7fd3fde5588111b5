//! Database statistics.
//!
//! A quick summary of what is indexed: document and chunk counts,
//! embedding coverage, text index state, and chunks per document.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect_existing(config).await?;

    let total_docs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
        .fetch_one(&pool)
        .await?;

    let total_chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
        .fetch_one(&pool)
        .await?;

    let total_embedded: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE embedding IS NOT NULL")
            .fetch_one(&pool)
            .await?;

    let text_index: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='chunks_fts'",
    )
    .fetch_one(&pool)
    .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("rag-eval Database Stats");
    println!("=======================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Documents:   {}", total_docs);
    println!("  Chunks:      {}", total_chunks);
    println!(
        "  Embedded:    {} / {} ({}%)",
        total_embedded,
        total_chunks,
        if total_chunks > 0 {
            (total_embedded * 100) / total_chunks
        } else {
            0
        }
    );
    println!(
        "  Text index:  {}",
        if text_index { "built" } else { "not built" }
    );

    let rows = sqlx::query(
        r#"
        SELECT d.filename, d.title, d.publish_date, COUNT(c.chunk_number) AS chunk_count
        FROM documents d
        LEFT JOIN chunks c ON c.doc_id = d.id
        GROUP BY d.id
        ORDER BY d.filename
        "#,
    )
    .fetch_all(&pool)
    .await?;

    if !rows.is_empty() {
        println!();
        println!("  By document:");
        println!("  {:<32} {:<8} {:>6}   {}", "FILE", "DATE", "CHUNKS", "TITLE");
        println!("  {}", "-".repeat(76));

        for row in &rows {
            let filename: String = row.try_get("filename")?;
            let title: String = row.try_get("title")?;
            let date: String = row.try_get("publish_date")?;
            let chunk_count: i64 = row.try_get("chunk_count")?;
            println!(
                "  {:<32} {:<8} {:>6}   {}",
                filename,
                date.get(..7).unwrap_or(&date),
                chunk_count,
                title
            );
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
