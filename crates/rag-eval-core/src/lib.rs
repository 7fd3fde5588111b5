//! # rag-eval core
//!
//! Runtime-agnostic logic for rag-eval: data models, front-matter parsing,
//! chunking, batching, the chunk store and provider traits, and the ranking
//! metrics engine.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem I/O. The
//! application crate supplies concrete stores and providers and drives the
//! async pipeline.

pub mod batch;
pub mod chunk;
pub mod frontmatter;
pub mod metrics;
pub mod models;
pub mod providers;
pub mod store;
pub mod terms;
pub mod vector;
