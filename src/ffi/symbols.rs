//! Engine Symbol Table
//!
//! Typed function pointers for every entry point the bindings call. The table
//! is resolved once, eagerly, when the engine library is opened: a missing
//! symbol fails initialisation as a whole instead of surfacing later inside an
//! unrelated operation.

use libc::{c_char, c_int, size_t};
use libloading::Library;
use tracing::debug;

use super::types::*;
use crate::error::{Error, Result};

/// Resolved engine entry points.
///
/// The `*_free` entry points for result buffers are optional so that a table
/// assembled by hand (a statically linked engine, a test double) may omit
/// them. Buffers whose free entry point is absent are leaked rather than
/// released through an invalid address. [`Symbols::resolve`] always fills
/// them in.
#[derive(Clone, Copy)]
pub struct Symbols {
    pub last_error_message: unsafe extern "C" fn() -> *const c_char,
    pub clear_error: unsafe extern "C" fn(),

    pub classifier_new:
        unsafe extern "C" fn(*const FfiClassifierConfig, *mut RawHandle) -> Status,
    pub classifier_free: unsafe extern "C" fn(RawHandle),
    pub classifier_classify:
        unsafe extern "C" fn(RawHandle, *const c_char, *mut FfiClassResults) -> Status,
    pub classifier_num_labels: unsafe extern "C" fn(RawHandle) -> size_t,
    pub class_results_free: Option<unsafe extern "C" fn(FfiClassResults)>,

    pub embedder_new: unsafe extern "C" fn(*const FfiEmbedderConfig, *mut RawHandle) -> Status,
    pub embedder_free: unsafe extern "C" fn(RawHandle),
    pub embedder_encode:
        unsafe extern "C" fn(RawHandle, *const c_char, *mut FfiFloatArray) -> Status,
    pub embedder_encode_batch: unsafe extern "C" fn(
        RawHandle,
        *const *const c_char,
        size_t,
        *mut FfiFloat2DArray,
    ) -> Status,
    pub embedder_similarity:
        unsafe extern "C" fn(RawHandle, *const c_char, *const c_char, *mut f32) -> Status,
    pub embedder_dim: unsafe extern "C" fn(RawHandle) -> size_t,
    pub float_array_free: Option<unsafe extern "C" fn(FfiFloatArray)>,
    pub float_2d_array_free: Option<unsafe extern "C" fn(FfiFloat2DArray)>,

    pub reranker_new: unsafe extern "C" fn(*const FfiRerankerConfig, *mut RawHandle) -> Status,
    pub reranker_free: unsafe extern "C" fn(RawHandle),
    pub reranker_score:
        unsafe extern "C" fn(RawHandle, *const c_char, *const c_char, *mut f32) -> Status,
    pub reranker_rerank: unsafe extern "C" fn(
        RawHandle,
        *const c_char,
        *const *const c_char,
        size_t,
        *mut FfiRerankResults,
    ) -> Status,
    pub reranker_rerank_top_k: unsafe extern "C" fn(
        RawHandle,
        *const c_char,
        *const *const c_char,
        size_t,
        size_t,
        *mut FfiRerankResults,
    ) -> Status,
    /// Takes the descriptor by address, unlike the other free entry points.
    pub rerank_results_free: Option<unsafe extern "C" fn(*mut FfiRerankResults)>,

    pub indexer_new: unsafe extern "C" fn(*const FfiIndexerConfig, *mut RawHandle) -> Status,
    pub indexer_free: unsafe extern "C" fn(RawHandle),
    pub indexer_create: unsafe extern "C" fn(
        RawHandle,
        *const c_char,
        *const *const c_char,
        size_t,
        c_int,
        *mut FfiIndexStats,
    ) -> Status,

    pub searcher_new: unsafe extern "C" fn(*const FfiSearcherConfig, *mut RawHandle) -> Status,
    pub searcher_free: unsafe extern "C" fn(RawHandle),
    pub searcher_search_with_options: unsafe extern "C" fn(
        RawHandle,
        *const c_char,
        *const c_char,
        *const FfiSearchOptions,
        *mut FfiSearchResults,
    ) -> Status,
    pub search_results_free: Option<unsafe extern "C" fn(FfiSearchResults)>,
}

/// Every symbol [`Symbols::resolve`] requires, in resolution order.
pub const REQUIRED_SYMBOLS: &[&str] = &[
    "kjarni_last_error_message",
    "kjarni_clear_error",
    "kjarni_classifier_new",
    "kjarni_classifier_free",
    "kjarni_classifier_classify",
    "kjarni_classifier_num_labels",
    "kjarni_class_results_free",
    "kjarni_embedder_new",
    "kjarni_embedder_free",
    "kjarni_embedder_encode",
    "kjarni_embedder_encode_batch",
    "kjarni_embedder_similarity",
    "kjarni_embedder_dim",
    "kjarni_float_array_free",
    "kjarni_float_2d_array_free",
    "kjarni_reranker_new",
    "kjarni_reranker_free",
    "kjarni_reranker_score",
    "kjarni_reranker_rerank",
    "kjarni_reranker_rerank_top_k",
    "kjarni_rerank_results_free",
    "kjarni_indexer_new",
    "kjarni_indexer_free",
    "kjarni_indexer_create",
    "kjarni_searcher_new",
    "kjarni_searcher_free",
    "kjarni_searcher_search_with_options",
    "kjarni_search_results_free",
];

/// Look up one symbol and copy its address out as `T`.
///
/// # Safety
///
/// `T` must be the function pointer type the library actually exports under
/// `name`. The returned pointer is valid only while `library` stays loaded.
unsafe fn required<T: Copy>(library: &Library, name: &str) -> Result<T> {
    let symbol: libloading::Symbol<T> = library
        .get(name.as_bytes())
        .map_err(|e| Error::SymbolNotFound(format!("{}: {}", name, e)))?;
    Ok(*symbol)
}

impl Symbols {
    /// Resolve the full table from an opened engine library.
    ///
    /// Nothing is returned unless every entry in [`REQUIRED_SYMBOLS`] exists.
    ///
    /// # Safety
    ///
    /// `library` must be the kjarni engine (its exports must have the
    /// signatures declared here), and it must stay loaded for as long as the
    /// returned table is used.
    pub unsafe fn resolve(library: &Library) -> Result<Self> {
        let symbols = Symbols {
            last_error_message: required(library, "kjarni_last_error_message")?,
            clear_error: required(library, "kjarni_clear_error")?,

            classifier_new: required(library, "kjarni_classifier_new")?,
            classifier_free: required(library, "kjarni_classifier_free")?,
            classifier_classify: required(library, "kjarni_classifier_classify")?,
            classifier_num_labels: required(library, "kjarni_classifier_num_labels")?,
            class_results_free: Some(required(library, "kjarni_class_results_free")?),

            embedder_new: required(library, "kjarni_embedder_new")?,
            embedder_free: required(library, "kjarni_embedder_free")?,
            embedder_encode: required(library, "kjarni_embedder_encode")?,
            embedder_encode_batch: required(library, "kjarni_embedder_encode_batch")?,
            embedder_similarity: required(library, "kjarni_embedder_similarity")?,
            embedder_dim: required(library, "kjarni_embedder_dim")?,
            float_array_free: Some(required(library, "kjarni_float_array_free")?),
            float_2d_array_free: Some(required(library, "kjarni_float_2d_array_free")?),

            reranker_new: required(library, "kjarni_reranker_new")?,
            reranker_free: required(library, "kjarni_reranker_free")?,
            reranker_score: required(library, "kjarni_reranker_score")?,
            reranker_rerank: required(library, "kjarni_reranker_rerank")?,
            reranker_rerank_top_k: required(library, "kjarni_reranker_rerank_top_k")?,
            rerank_results_free: Some(required(library, "kjarni_rerank_results_free")?),

            indexer_new: required(library, "kjarni_indexer_new")?,
            indexer_free: required(library, "kjarni_indexer_free")?,
            indexer_create: required(library, "kjarni_indexer_create")?,

            searcher_new: required(library, "kjarni_searcher_new")?,
            searcher_free: required(library, "kjarni_searcher_free")?,
            searcher_search_with_options: required(
                library,
                "kjarni_searcher_search_with_options",
            )?,
            search_results_free: Some(required(library, "kjarni_search_results_free")?),
        };

        debug!(count = REQUIRED_SYMBOLS.len(), "resolved engine symbols");
        Ok(symbols)
    }
}

impl std::fmt::Debug for Symbols {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Symbols")
            .field("class_results_free", &self.class_results_free.is_some())
            .field("float_array_free", &self.float_array_free.is_some())
            .field("float_2d_array_free", &self.float_2d_array_free.is_some())
            .field("rerank_results_free", &self.rerank_results_free.is_some())
            .field("search_results_free", &self.search_results_free.is_some())
            .finish_non_exhaustive()
    }
}
