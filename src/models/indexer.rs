//! Building search indexes from directories of files.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::{CommonArgs, HandleSlot, Model, Options};
use crate::error::{Error, Result};
use crate::ffi::marshal::{bool_to_int, join_list, opt_ptr, path_to_c_string, CStringArray};
use crate::ffi::{Engine, FfiIndexStats, FfiIndexerConfig};

/// Aggregate statistics for one indexing run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct IndexStats {
    pub documents_indexed: usize,
    pub chunks_created: usize,
    /// Embedding dimension stored in the index
    pub dimension: usize,
    pub size_bytes: u64,
    pub files_processed: usize,
    pub files_skipped: usize,
    pub elapsed_ms: u64,
}

impl IndexStats {
    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }
}

impl From<FfiIndexStats> for IndexStats {
    fn from(raw: FfiIndexStats) -> Self {
        Self {
            documents_indexed: raw.documents_indexed,
            chunks_created: raw.chunks_created,
            dimension: raw.dimension,
            size_bytes: raw.size_bytes,
            files_processed: raw.files_processed,
            files_skipped: raw.files_skipped,
            elapsed_ms: raw.elapsed_ms,
        }
    }
}

/// Indexer construction options.
#[derive(Debug, Clone)]
pub struct IndexerOptions {
    /// Embedding model; indexes can only be loaded from a registry name
    pub model: String,
    pub options: Options,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub batch_size: usize,
    /// File extensions to include; empty means the engine default set
    pub extensions: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub recursive: bool,
    pub include_hidden: bool,
    /// Largest file to index in bytes; 0 means the engine default
    pub max_file_size: usize,
}

impl IndexerOptions {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            options: Options::from_global_config(),
            chunk_size: 512,
            chunk_overlap: 50,
            batch_size: 32,
            extensions: Vec::new(),
            exclude_patterns: Vec::new(),
            recursive: true,
            include_hidden: false,
            max_file_size: 0,
        }
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn with_chunking(mut self, chunk_size: usize, chunk_overlap: usize) -> Self {
        self.chunk_size = chunk_size;
        self.chunk_overlap = chunk_overlap;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn with_exclude_patterns(mut self, patterns: Vec<String>) -> Self {
        self.exclude_patterns = patterns;
        self
    }

    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn with_include_hidden(mut self, include_hidden: bool) -> Self {
        self.include_hidden = include_hidden;
        self
    }

    pub fn with_max_file_size(mut self, bytes: usize) -> Self {
        self.max_file_size = bytes;
        self
    }
}

/// Chunks, embeds and persists files into an on-disk index.
///
/// File parsing and storage happen entirely inside the engine.
pub struct Indexer {
    slot: HandleSlot,
}

impl Indexer {
    pub fn new(model: impl Into<String>) -> Result<Self> {
        Self::with_options(IndexerOptions::new(model))
    }

    pub fn with_options(options: IndexerOptions) -> Result<Self> {
        Self::with_engine(Engine::global()?, options)
    }

    pub fn with_engine(engine: Arc<Engine>, options: IndexerOptions) -> Result<Self> {
        let model = Model::Name(options.model.clone());
        let common = CommonArgs::new(&options.options, Some(&model))?;
        let extensions = join_list(&options.extensions, "extension")?;
        let exclude = join_list(&options.exclude_patterns, "exclude pattern")?;

        let config = FfiIndexerConfig {
            device: options.options.device.code(),
            _pad0: 0,
            cache_dir: common.cache_dir(),
            model_name: common.model_name(),
            chunk_size: options.chunk_size,
            chunk_overlap: options.chunk_overlap,
            batch_size: options.batch_size,
            extensions: opt_ptr(&extensions),
            exclude_patterns: opt_ptr(&exclude),
            recursive: bool_to_int(options.recursive),
            include_hidden: bool_to_int(options.include_hidden),
            max_file_size: options.max_file_size,
            quiet: bool_to_int(options.options.quiet),
            _pad1: 0,
        };

        let symbols = *engine.symbols();
        let slot = HandleSlot::open(
            engine,
            "indexer",
            &config,
            symbols.indexer_new,
            symbols.indexer_free,
        )?;
        Ok(Self { slot })
    }

    /// Build a new index at `index_path` from `inputs`.
    ///
    /// Fails if an index already exists there; see [`Indexer::create_with`].
    pub fn create<S: AsRef<str>>(
        &self,
        index_path: impl AsRef<Path>,
        inputs: &[S],
    ) -> Result<IndexStats> {
        self.create_with(index_path, inputs, false)
    }

    /// Build an index, replacing an existing one when `force` is set.
    pub fn create_with<S: AsRef<str>>(
        &self,
        index_path: impl AsRef<Path>,
        inputs: &[S],
        force: bool,
    ) -> Result<IndexStats> {
        self.slot.with_handle(|engine, handle| {
            if inputs.is_empty() {
                return Err(Error::InvalidArgument(
                    "at least one input directory is required".to_string(),
                ));
            }
            let path = path_to_c_string(index_path.as_ref(), "index path")?;
            let inputs = CStringArray::new(inputs, "input path")?;

            let mut raw = FfiIndexStats::default();
            let status = unsafe {
                (engine.symbols().indexer_create)(
                    handle,
                    path.as_ptr(),
                    inputs.as_ptr(),
                    inputs.len(),
                    bool_to_int(force),
                    &mut raw,
                )
            };
            engine.check(status)?;

            // Stats are written into caller memory; nothing to free
            Ok(IndexStats::from(raw))
        })
    }

    /// Release the model. Safe to call more than once.
    pub fn close(&self) -> Result<()> {
        self.slot.close()
    }

    pub fn is_closed(&self) -> bool {
        self.slot.is_closed()
    }
}
