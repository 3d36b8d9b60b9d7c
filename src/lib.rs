//! Kjarni - Rust bindings for the kjarni inference engine
//!
//! The engine is a native library exposing a C ABI for text classification,
//! embeddings, cross-encoder reranking, and document indexing and search.
//! This crate loads it at runtime, resolves its entry points, and wraps each
//! model family in a safe handle type.
//!
//! # Features
//!
//! - **Runtime loading**: explicit path, embedded payload or search paths
//! - **Fixed-layout marshaling**: `#[repr(C)]` mirrors with pinned layouts
//! - **Ownership transfer**: engine-allocated results are copied out and
//!   released exactly once
//! - **Typed errors**: status codes plus the engine's last-error text
//!
//! # Example
//!
//! ```ignore
//! use kjarni::{Embedder, Reranker, Searcher, SearchMode};
//!
//! let embedder = Embedder::new("minilm-l6-v2")?;
//! let score = embedder.similarity("doctor", "physician")?;
//!
//! let reranker = Reranker::new()?;
//! let ranked = reranker.rerank_top_k("capital of france", &docs, 3)?;
//!
//! let searcher = Searcher::new("minilm-l6-v2")?;
//! for hit in searcher.search("./index", "error handling", SearchMode::Hybrid)? {
//!     println!("{:.3} {}", hit.score, hit.text);
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │   models::*          │  Classifier, Embedder, Reranker, Indexer, Searcher
//! └──────────┬───────────┘
//!            │
//!            ▼
//! ┌──────────────────────┐
//! │   ffi::Engine        │  symbol table, error translation, result buffers
//! └──────────┬───────────┘
//!            │
//!            ▼
//! ┌──────────────────────┐
//! │   ffi::LibraryLoader │  libkjarni_ffi.{so,dylib} / kjarni_ffi.dll
//! └──────────────────────┘
//! ```
//!
//! The engine is loaded once per process on first construction of any model
//! (see [`Engine::global`]). Configuration comes from `kjarni.toml` and the
//! `KJARNI_*` environment variables; see [`config`].

pub mod config;
pub mod error;
pub mod ffi;
pub mod models;

pub use config::{KjarniConfig, CONFIG_FILE_NAME};
pub use error::{Error, ErrorKind, Result};
pub use ffi::{Engine, LibraryLoader};
pub use models::{
    cosine_similarity, Classification, Classifier, ClassifierOptions, Device, Embedder,
    EmbedderOptions, IndexStats, Indexer, IndexerOptions, LabelScore, Model, Options,
    RerankResult, Reranker, RerankerOptions, SearchMode, SearchParams, SearchResult, Searcher,
    SearcherOptions,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
