//! # rag-eval
//!
//! Retrieval evaluation for RAG pipelines.
//!
//! rag-eval chunks a folder of front-matter documents, optionally embeds the
//! chunks, stores them in SQLite, and measures how well a retrieval mode
//! ranks the chunk each labeled question was written from.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌─────────────┐   ┌──────────────┐
//! │ Documents  │──▶│ Chunk+Embed │──▶│    SQLite    │
//! │ (folder)   │   │             │   │ chunks + FTS │
//! └────────────┘   └─────────────┘   └──────┬───────┘
//!                                           │
//! ┌────────────┐   ┌─────────────┐   ┌──────▼───────┐
//! │   Report   │◀──│   Metrics   │◀──│  Retrieve +  │◀── labels
//! │ table/JSON │   │ MRR/NDCG/R  │   │   Rerank     │
//! └────────────┘   └─────────────┘   └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rag-eval init
//! rag-eval ingest ./posts --strategy structural
//! rag-eval evaluate ./labels.jsonl --mode bm25 --json report.json
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`documents`] | Folder scan and front matter parsing |
//! | [`ingest`] | Chunk, embed, and store documents |
//! | [`embedding`] | Embedding provider implementations |
//! | [`embed`] | Batched, rate-limited embedding |
//! | [`retrieval`] | Semantic, keyword, and BM25 retrieval |
//! | [`rerank`] | Optional reranking stage |
//! | [`evaluate`] | Evaluation orchestrator and report |
//! | [`generate`] | Synthetic question labels from chunks |
//! | [`retry`] | Concurrency gate and retry policy for provider calls |
//! | [`sqlite_store`] | SQLite chunk store |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//!
//! Models, chunking, metrics and the store trait live in `rag-eval-core`.

pub mod config;
pub mod db;
pub mod documents;
pub mod embed;
pub mod embedding;
pub mod evaluate;
pub mod generate;
pub mod ingest;
pub mod keywords;
pub mod migrate;
pub mod query;
pub mod rerank;
pub mod retrieval;
pub mod retry;
pub mod sqlite_store;
pub mod stats;
