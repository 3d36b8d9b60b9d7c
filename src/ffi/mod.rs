//! FFI Module for Kjarni
//!
//! Everything that touches the engine's C ABI lives here; the model wrappers
//! in [`crate::models`] only see safe types.
//!
//! # Architecture
//!
//! ```text
//! Classifier / Embedder / Reranker / Indexer / Searcher
//!       │
//!       ▼
//! HandleSlot (per-instance lock, closed state)
//!       │
//!       ▼
//! Engine (symbol table + last-error translation)
//!       │
//!       ▼
//! LibraryLoader (libloading)
//!       │
//!       ▼
//! libkjarni_ffi.{so,dylib} / kjarni_ffi.dll
//! ```
//!
//! Result buffers allocated by the engine are copied out and handed back
//! through [`EngineBuffer`].

mod buffer;
mod engine;
mod loader;
pub mod marshal;
mod symbols;
mod types;

pub use buffer::{EngineBuffer, EngineOwned};
pub use engine::Engine;
pub use loader::{
    library_name_for, platform_library_name, LibraryLoader, LoadedLibrary, ENV_LIBRARY_PATH,
};
pub use symbols::{Symbols, REQUIRED_SYMBOLS};
pub use types::*;

#[cfg(test)]
pub(crate) mod mock;
