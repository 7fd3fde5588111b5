//! `rag-eval query`: semantic lookup of a single question.

use std::sync::Arc;

use anyhow::{bail, Result};

use rag_eval_core::models::format_year_month;
use rag_eval_core::store::ChunkStore;

use crate::config::Config;
use crate::db;
use crate::embed::Embedder;
use crate::embedding::create_provider;
use crate::retry::CallPolicy;
use crate::sqlite_store::SqliteStore;

pub async fn run_query(config: &Config, text: &str, limit: usize) -> Result<()> {
    if limit == 0 {
        bail!("--limit must be >= 1");
    }
    if !config.embedding.is_enabled() {
        bail!("Query requires an embedding provider. Set [embedding] provider in the config.");
    }

    let pool = db::connect_existing(config).await?;
    let store = Arc::new(SqliteStore::new(pool.clone()));
    let embedder = Embedder::new(
        create_provider(&config.embedding)?,
        CallPolicy::from_config(&config.retry),
        config.embedding.batch_size,
    );

    let vector = embedder.embed_query(text).await?;
    let results = store.vector_search(&vector, limit).await?;
    let counts = store.chunk_counts().await?;

    if results.is_empty() {
        println!("No results.");
    }

    for (i, chunk) in results.iter().enumerate() {
        let total = counts.get(&chunk.doc_id).copied().unwrap_or(0);
        println!(
            "{}. {} ({})  chunk {}/{}  {}",
            i + 1,
            chunk.post_title,
            chunk.source,
            chunk.chunk_number,
            total,
            format_year_month(&chunk.publish_date)
        );
        println!("   id: {}", chunk.chunk_id);
        println!("   {}", preview(&chunk.text, 240));
        println!();
    }

    pool.close().await;
    Ok(())
}

/// First `max_chars` characters on one line.
fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{}…", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_flattens_and_truncates() {
        assert_eq!(preview("a\n\nb   c", 80), "a b c");
        assert_eq!(preview("abcdef", 3), "abc…");
    }
}
