//! Ingestion pipeline: documents → chunks → (embeddings) → index.

use std::path::PathBuf;

use anyhow::Result;

use rag_eval_core::chunk::{chunk_documents, ChunkParams};
use rag_eval_core::models::{Document, TextChunk};
use rag_eval_core::store::ChunkStore;

use crate::config::Config;
use crate::db;
use crate::documents::read_documents;
use crate::embed::Embedder;
use crate::embedding::create_provider;
use crate::migrate;
use crate::retry::CallPolicy;
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub documents: usize,
    pub chunks: usize,
    pub embedded: usize,
}

/// Chunk `docs` and, when an embedder is given, attach a vector to every
/// chunk. Nothing is written.
pub async fn prepare_chunks(
    docs: &[Document],
    params: &ChunkParams,
    embedder: Option<&Embedder>,
) -> Result<Vec<TextChunk>> {
    let mut chunks = chunk_documents(docs, params)?;
    tracing::info!(documents = docs.len(), chunks = chunks.len(), "chunked");

    if let Some(embedder) = embedder {
        tracing::info!(model = embedder.model_name(), "embedding chunks");
        embedder.embed_chunks(&mut chunks).await?;
    }
    Ok(chunks)
}

fn stats_for(docs: &[Document], chunks: &[TextChunk]) -> IngestStats {
    IngestStats {
        documents: docs.len(),
        chunks: chunks.len(),
        embedded: chunks.iter().filter(|c| c.vector.is_some()).count(),
    }
}

/// Chunk `docs`, embed the chunks when an embedder is given, and add them
/// to `store`.
pub async fn index_documents(
    docs: &[Document],
    params: &ChunkParams,
    embedder: Option<&Embedder>,
    store: &dyn ChunkStore,
) -> Result<IngestStats> {
    let chunks = prepare_chunks(docs, params, embedder).await?;
    store.add_chunks(&chunks).await?;
    Ok(stats_for(docs, &chunks))
}

/// Options for the `ingest` command.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub folder: PathBuf,
    pub suffix: String,
    pub strategy: Option<String>,
}

pub async fn run_ingest(config: &Config, options: &IngestOptions) -> Result<()> {
    let params = config.chunking.params(options.strategy.as_deref())?;
    let docs = read_documents(&options.folder, &options.suffix)?;

    let embedder = if config.embedding.is_enabled() {
        let provider = create_provider(&config.embedding)?;
        Some(Embedder::new(
            provider,
            CallPolicy::from_config(&config.retry),
            config.embedding.batch_size,
        ))
    } else {
        tracing::warn!("embedding provider is disabled; chunks are stored without vectors");
        None
    };

    // Embed before touching the database: a failed run keeps the old index.
    let chunks = prepare_chunks(&docs, &params, embedder.as_ref()).await?;
    let stats = stats_for(&docs, &chunks);

    let pool = db::connect(config).await?;
    migrate::migrate(&pool).await?;
    let store = SqliteStore::new(pool.clone());
    let new_docs = store.replace_documents(&docs, &chunks).await?;

    println!("ingest {}", options.folder.display());
    println!("  documents read:    {}", stats.documents);
    println!("  documents new:     {}", new_docs);
    println!("  chunks written:    {}", stats.chunks);
    println!("  chunks embedded:   {}", stats.embedded);
    println!("ok");

    pool.close().await;
    Ok(())
}
