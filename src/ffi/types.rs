//! Engine ABI Types
//!
//! `#[repr(C)]` mirrors of the structures the engine was compiled with.
//! Every padding word the C compiler inserts is spelled out as a named
//! field, so the Rust layout never depends on implicit padding.
//!
//! The engine ships 64-bit binaries only; the layouts below are the 64-bit
//! layouts and are pinned by [`AbiLayout`] descriptors checked in tests.

use std::ffi::c_void;

use libc::{c_char, c_int, size_t};

/// Status code returned by every fallible entry point. Zero is success.
pub type Status = c_int;

/// Opaque engine-owned model handle.
pub type RawHandle = *mut c_void;

/// One field of a fixed-layout structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldLayout {
    pub name: &'static str,
    pub offset: usize,
    pub size: usize,
}

impl FieldLayout {
    pub const fn new(name: &'static str, offset: usize, size: usize) -> Self {
        Self { name, offset, size }
    }

    /// First byte past this field.
    pub const fn end(&self) -> usize {
        self.offset + self.size
    }
}

/// Byte layout contract of an engine structure.
pub trait AbiLayout: Sized {
    /// C name of the structure, for diagnostics.
    const NAME: &'static str;
    /// Total size including trailing padding.
    const SIZE: usize;
    /// Every field, padding included, in declaration order.
    const FIELDS: &'static [FieldLayout];
}

// =============================================================================
// Classifier
// =============================================================================

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FfiClassifierConfig {
    pub device: c_int,
    pub _pad0: c_int,
    pub cache_dir: *const c_char,
    pub model_name: *const c_char,
    pub model_path: *const c_char,
    pub labels: *const *const c_char,
    pub num_labels: size_t,
    pub multi_label: c_int,
    pub quiet: c_int,
}

impl AbiLayout for FfiClassifierConfig {
    const NAME: &'static str = "KjarniClassifierConfig";
    const SIZE: usize = 56;
    const FIELDS: &'static [FieldLayout] = &[
        FieldLayout::new("device", 0, 4),
        FieldLayout::new("_pad0", 4, 4),
        FieldLayout::new("cache_dir", 8, 8),
        FieldLayout::new("model_name", 16, 8),
        FieldLayout::new("model_path", 24, 8),
        FieldLayout::new("labels", 32, 8),
        FieldLayout::new("num_labels", 40, 8),
        FieldLayout::new("multi_label", 48, 4),
        FieldLayout::new("quiet", 52, 4),
    ];
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FfiClassResult {
    pub label: *const c_char,
    pub score: f32,
    pub _pad0: [u8; 4],
}

impl AbiLayout for FfiClassResult {
    const NAME: &'static str = "KjarniClassResult";
    const SIZE: usize = 16;
    const FIELDS: &'static [FieldLayout] = &[
        FieldLayout::new("label", 0, 8),
        FieldLayout::new("score", 8, 4),
        FieldLayout::new("_pad0", 12, 4),
    ];
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FfiClassResults {
    pub results: *mut FfiClassResult,
    pub len: size_t,
}

impl AbiLayout for FfiClassResults {
    const NAME: &'static str = "KjarniClassResults";
    const SIZE: usize = 16;
    const FIELDS: &'static [FieldLayout] = &[
        FieldLayout::new("results", 0, 8),
        FieldLayout::new("len", 8, 8),
    ];
}

// =============================================================================
// Embedder
// =============================================================================

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FfiEmbedderConfig {
    pub device: c_int,
    pub _pad0: c_int,
    pub cache_dir: *const c_char,
    pub model_name: *const c_char,
    pub model_path: *const c_char,
    pub normalize: c_int,
    pub quiet: c_int,
}

impl AbiLayout for FfiEmbedderConfig {
    const NAME: &'static str = "KjarniEmbedderConfig";
    const SIZE: usize = 40;
    const FIELDS: &'static [FieldLayout] = &[
        FieldLayout::new("device", 0, 4),
        FieldLayout::new("_pad0", 4, 4),
        FieldLayout::new("cache_dir", 8, 8),
        FieldLayout::new("model_name", 16, 8),
        FieldLayout::new("model_path", 24, 8),
        FieldLayout::new("normalize", 32, 4),
        FieldLayout::new("quiet", 36, 4),
    ];
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FfiFloatArray {
    pub data: *mut f32,
    pub len: size_t,
}

impl AbiLayout for FfiFloatArray {
    const NAME: &'static str = "KjarniFloatArray";
    const SIZE: usize = 16;
    const FIELDS: &'static [FieldLayout] = &[
        FieldLayout::new("data", 0, 8),
        FieldLayout::new("len", 8, 8),
    ];
}

/// Row-major matrix; element count is `rows * cols`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FfiFloat2DArray {
    pub data: *mut f32,
    pub rows: size_t,
    pub cols: size_t,
}

impl AbiLayout for FfiFloat2DArray {
    const NAME: &'static str = "KjarniFloat2DArray";
    const SIZE: usize = 24;
    const FIELDS: &'static [FieldLayout] = &[
        FieldLayout::new("data", 0, 8),
        FieldLayout::new("rows", 8, 8),
        FieldLayout::new("cols", 16, 8),
    ];
}

// =============================================================================
// Reranker
// =============================================================================

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FfiRerankerConfig {
    pub device: c_int,
    pub _pad0: c_int,
    pub cache_dir: *const c_char,
    pub model_name: *const c_char,
    pub model_path: *const c_char,
    pub quiet: c_int,
    pub _pad1: c_int,
}

impl AbiLayout for FfiRerankerConfig {
    const NAME: &'static str = "KjarniRerankerConfig";
    const SIZE: usize = 40;
    const FIELDS: &'static [FieldLayout] = &[
        FieldLayout::new("device", 0, 4),
        FieldLayout::new("_pad0", 4, 4),
        FieldLayout::new("cache_dir", 8, 8),
        FieldLayout::new("model_name", 16, 8),
        FieldLayout::new("model_path", 24, 8),
        FieldLayout::new("quiet", 32, 4),
        FieldLayout::new("_pad1", 36, 4),
    ];
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FfiRerankResult {
    pub index: size_t,
    pub score: f32,
    pub _pad0: [u8; 4],
}

impl AbiLayout for FfiRerankResult {
    const NAME: &'static str = "KjarniRerankResult";
    const SIZE: usize = 16;
    const FIELDS: &'static [FieldLayout] = &[
        FieldLayout::new("index", 0, 8),
        FieldLayout::new("score", 8, 4),
        FieldLayout::new("_pad0", 12, 4),
    ];
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FfiRerankResults {
    pub results: *mut FfiRerankResult,
    pub len: size_t,
}

impl AbiLayout for FfiRerankResults {
    const NAME: &'static str = "KjarniRerankResults";
    const SIZE: usize = 16;
    const FIELDS: &'static [FieldLayout] = &[
        FieldLayout::new("results", 0, 8),
        FieldLayout::new("len", 8, 8),
    ];
}

// =============================================================================
// Indexer
// =============================================================================

/// `extensions` and `exclude_patterns` are comma-separated strings or null.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FfiIndexerConfig {
    pub device: c_int,
    pub _pad0: c_int,
    pub cache_dir: *const c_char,
    pub model_name: *const c_char,
    pub chunk_size: size_t,
    pub chunk_overlap: size_t,
    pub batch_size: size_t,
    pub extensions: *const c_char,
    pub exclude_patterns: *const c_char,
    pub recursive: c_int,
    pub include_hidden: c_int,
    pub max_file_size: size_t,
    pub quiet: c_int,
    pub _pad1: c_int,
}

impl AbiLayout for FfiIndexerConfig {
    const NAME: &'static str = "KjarniIndexerConfig";
    const SIZE: usize = 88;
    const FIELDS: &'static [FieldLayout] = &[
        FieldLayout::new("device", 0, 4),
        FieldLayout::new("_pad0", 4, 4),
        FieldLayout::new("cache_dir", 8, 8),
        FieldLayout::new("model_name", 16, 8),
        FieldLayout::new("chunk_size", 24, 8),
        FieldLayout::new("chunk_overlap", 32, 8),
        FieldLayout::new("batch_size", 40, 8),
        FieldLayout::new("extensions", 48, 8),
        FieldLayout::new("exclude_patterns", 56, 8),
        FieldLayout::new("recursive", 64, 4),
        FieldLayout::new("include_hidden", 68, 4),
        FieldLayout::new("max_file_size", 72, 8),
        FieldLayout::new("quiet", 80, 4),
        FieldLayout::new("_pad1", 84, 4),
    ];
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct FfiIndexStats {
    pub documents_indexed: size_t,
    pub chunks_created: size_t,
    pub dimension: size_t,
    pub size_bytes: u64,
    pub files_processed: size_t,
    pub files_skipped: size_t,
    pub elapsed_ms: u64,
}

impl AbiLayout for FfiIndexStats {
    const NAME: &'static str = "KjarniIndexStats";
    const SIZE: usize = 56;
    const FIELDS: &'static [FieldLayout] = &[
        FieldLayout::new("documents_indexed", 0, 8),
        FieldLayout::new("chunks_created", 8, 8),
        FieldLayout::new("dimension", 16, 8),
        FieldLayout::new("size_bytes", 24, 8),
        FieldLayout::new("files_processed", 32, 8),
        FieldLayout::new("files_skipped", 40, 8),
        FieldLayout::new("elapsed_ms", 48, 8),
    ];
}

// =============================================================================
// Searcher
// =============================================================================

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FfiSearcherConfig {
    pub device: c_int,
    pub _pad0: c_int,
    pub cache_dir: *const c_char,
    pub model_name: *const c_char,
    pub rerank_model: *const c_char,
    pub default_mode: c_int,
    pub _pad1: c_int,
    pub default_top_k: size_t,
    pub quiet: c_int,
    pub _pad2: c_int,
}

impl AbiLayout for FfiSearcherConfig {
    const NAME: &'static str = "KjarniSearcherConfig";
    const SIZE: usize = 56;
    const FIELDS: &'static [FieldLayout] = &[
        FieldLayout::new("device", 0, 4),
        FieldLayout::new("_pad0", 4, 4),
        FieldLayout::new("cache_dir", 8, 8),
        FieldLayout::new("model_name", 16, 8),
        FieldLayout::new("rerank_model", 24, 8),
        FieldLayout::new("default_mode", 32, 4),
        FieldLayout::new("_pad1", 36, 4),
        FieldLayout::new("default_top_k", 40, 8),
        FieldLayout::new("quiet", 48, 4),
        FieldLayout::new("_pad2", 52, 4),
    ];
}

/// A zero `threshold` disables score filtering on the engine side.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FfiSearchOptions {
    pub mode: c_int,
    pub _pad0: c_int,
    pub top_k: size_t,
    pub use_reranker: c_int,
    pub threshold: f32,
    pub source_pattern: *const c_char,
    pub filter_key: *const c_char,
    pub filter_value: *const c_char,
}

impl AbiLayout for FfiSearchOptions {
    const NAME: &'static str = "KjarniSearchOptions";
    const SIZE: usize = 48;
    const FIELDS: &'static [FieldLayout] = &[
        FieldLayout::new("mode", 0, 4),
        FieldLayout::new("_pad0", 4, 4),
        FieldLayout::new("top_k", 8, 8),
        FieldLayout::new("use_reranker", 16, 4),
        FieldLayout::new("threshold", 20, 4),
        FieldLayout::new("source_pattern", 24, 8),
        FieldLayout::new("filter_key", 32, 8),
        FieldLayout::new("filter_value", 40, 8),
    ];
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FfiSearchResult {
    pub score: f32,
    pub _pad0: c_int,
    pub document_id: *const c_char,
    pub text: *const c_char,
    pub metadata_json: *const c_char,
}

impl AbiLayout for FfiSearchResult {
    const NAME: &'static str = "KjarniSearchResult";
    const SIZE: usize = 32;
    const FIELDS: &'static [FieldLayout] = &[
        FieldLayout::new("score", 0, 4),
        FieldLayout::new("_pad0", 4, 4),
        FieldLayout::new("document_id", 8, 8),
        FieldLayout::new("text", 16, 8),
        FieldLayout::new("metadata_json", 24, 8),
    ];
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FfiSearchResults {
    pub results: *mut FfiSearchResult,
    pub len: size_t,
}

impl AbiLayout for FfiSearchResults {
    const NAME: &'static str = "KjarniSearchResults";
    const SIZE: usize = 16;
    const FIELDS: &'static [FieldLayout] = &[
        FieldLayout::new("results", 0, 8),
        FieldLayout::new("len", 8, 8),
    ];
}

// Structural drift fails the build, not just the test run.
#[cfg(target_pointer_width = "64")]
const _: () = {
    use std::mem::size_of;
    assert!(size_of::<FfiClassifierConfig>() == FfiClassifierConfig::SIZE);
    assert!(size_of::<FfiClassResult>() == FfiClassResult::SIZE);
    assert!(size_of::<FfiClassResults>() == FfiClassResults::SIZE);
    assert!(size_of::<FfiEmbedderConfig>() == FfiEmbedderConfig::SIZE);
    assert!(size_of::<FfiFloatArray>() == FfiFloatArray::SIZE);
    assert!(size_of::<FfiFloat2DArray>() == FfiFloat2DArray::SIZE);
    assert!(size_of::<FfiRerankerConfig>() == FfiRerankerConfig::SIZE);
    assert!(size_of::<FfiRerankResult>() == FfiRerankResult::SIZE);
    assert!(size_of::<FfiRerankResults>() == FfiRerankResults::SIZE);
    assert!(size_of::<FfiIndexerConfig>() == FfiIndexerConfig::SIZE);
    assert!(size_of::<FfiIndexStats>() == FfiIndexStats::SIZE);
    assert!(size_of::<FfiSearcherConfig>() == FfiSearcherConfig::SIZE);
    assert!(size_of::<FfiSearchOptions>() == FfiSearchOptions::SIZE);
    assert!(size_of::<FfiSearchResult>() == FfiSearchResult::SIZE);
    assert!(size_of::<FfiSearchResults>() == FfiSearchResults::SIZE);
};
