//! Querying indexes built by [`Indexer`](super::Indexer).

use std::fmt;
use std::path::Path;
use std::ptr;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{opt_arg, CommonArgs, HandleSlot, Model, Options};
use crate::error::{Error, Result};
use crate::ffi::marshal::{
    bool_to_int, copy_c_str, copy_records, opt_ptr, path_to_c_string, to_c_string,
};
use crate::ffi::{Engine, EngineBuffer, FfiSearchOptions, FfiSearchResults, FfiSearcherConfig};

/// Retrieval strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// BM25 over the chunk text
    Keyword,
    /// Vector similarity
    Semantic,
    #[default]
    Hybrid,
}

impl SearchMode {
    pub fn code(&self) -> i32 {
        match self {
            SearchMode::Keyword => 0,
            SearchMode::Semantic => 1,
            SearchMode::Hybrid => 2,
        }
    }
}

impl FromStr for SearchMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "keyword" | "bm25" => Ok(SearchMode::Keyword),
            "semantic" => Ok(SearchMode::Semantic),
            "hybrid" => Ok(SearchMode::Hybrid),
            other => Err(Error::InvalidArgument(format!("unknown search mode '{}'", other))),
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchMode::Keyword => write!(f, "keyword"),
            SearchMode::Semantic => write!(f, "semantic"),
            SearchMode::Hybrid => write!(f, "hybrid"),
        }
    }
}

/// One matched passage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub score: f32,
    pub text: String,
    pub document_id: Option<String>,
    /// Raw metadata as stored by the engine
    pub metadata_json: Option<String>,
}

impl SearchResult {
    /// Parsed metadata, `None` when the engine stored none.
    pub fn metadata(&self) -> Option<serde_json::Result<serde_json::Value>> {
        self.metadata_json.as_deref().map(serde_json::from_str)
    }
}

/// Per-query parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchParams {
    pub mode: SearchMode,
    pub top_k: usize,
    /// Apply the searcher's reranker to the candidates
    pub rerank: bool,
    /// Drop results scoring below this value
    pub threshold: Option<f32>,
    /// Glob over source file paths
    pub source_pattern: Option<String>,
    /// Metadata key and the value it must equal
    pub filter: Option<(String, String)>,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            mode: SearchMode::Hybrid,
            top_k: 10,
            rerank: true,
            threshold: None,
            source_pattern: None,
            filter: None,
        }
    }
}

impl SearchParams {
    pub fn new(mode: SearchMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_rerank(mut self, rerank: bool) -> Self {
        self.rerank = rerank;
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn with_source_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.source_pattern = Some(pattern.into());
        self
    }

    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filter = Some((key.into(), value.into()));
        self
    }
}

/// Searcher construction options.
#[derive(Debug, Clone)]
pub struct SearcherOptions {
    /// Embedding model; must match the one the index was built with
    pub model: String,
    pub options: Options,
    /// Cross-encoder used when a query asks for reranking
    pub rerank_model: Option<String>,
    pub default_mode: SearchMode,
    pub default_top_k: usize,
}

impl SearcherOptions {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            options: Options::from_global_config(),
            rerank_model: None,
            default_mode: SearchMode::Hybrid,
            default_top_k: 10,
        }
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn with_rerank_model(mut self, model: impl Into<String>) -> Self {
        self.rerank_model = Some(model.into());
        self
    }

    pub fn with_default_mode(mut self, mode: SearchMode) -> Self {
        self.default_mode = mode;
        self
    }

    pub fn with_default_top_k(mut self, top_k: usize) -> Self {
        self.default_top_k = top_k;
        self
    }
}

/// Queries on-disk indexes.
pub struct Searcher {
    slot: HandleSlot,
}

impl Searcher {
    pub fn new(model: impl Into<String>) -> Result<Self> {
        Self::with_options(SearcherOptions::new(model))
    }

    pub fn with_options(options: SearcherOptions) -> Result<Self> {
        Self::with_engine(Engine::global()?, options)
    }

    pub fn with_engine(engine: Arc<Engine>, options: SearcherOptions) -> Result<Self> {
        let model = Model::Name(options.model.clone());
        let common = CommonArgs::new(&options.options, Some(&model))?;
        // An empty name means no reranker, same as None
        let rerank_model = opt_arg(
            options.rerank_model.as_deref().filter(|m| !m.is_empty()),
            "rerank model",
        )?;

        let config = FfiSearcherConfig {
            device: options.options.device.code(),
            _pad0: 0,
            cache_dir: common.cache_dir(),
            model_name: common.model_name(),
            rerank_model: opt_ptr(&rerank_model),
            default_mode: options.default_mode.code(),
            _pad1: 0,
            default_top_k: options.default_top_k,
            quiet: bool_to_int(options.options.quiet),
            _pad2: 0,
        };

        let symbols = *engine.symbols();
        let slot = HandleSlot::open(
            engine,
            "searcher",
            &config,
            symbols.searcher_new,
            symbols.searcher_free,
        )?;
        Ok(Self { slot })
    }

    /// Top 10 passages for `query`, reranked when a reranker is configured.
    pub fn search(
        &self,
        index_path: impl AsRef<Path>,
        query: &str,
        mode: SearchMode,
    ) -> Result<Vec<SearchResult>> {
        self.search_with(index_path, query, &SearchParams::new(mode))
    }

    pub fn search_with(
        &self,
        index_path: impl AsRef<Path>,
        query: &str,
        params: &SearchParams,
    ) -> Result<Vec<SearchResult>> {
        self.slot.with_handle(|engine, handle| {
            let path = path_to_c_string(index_path.as_ref(), "index path")?;
            let query = to_c_string(query, "query")?;
            let source_pattern = opt_arg(params.source_pattern.as_deref(), "source pattern")?;
            let (filter_key, filter_value) = match &params.filter {
                Some((key, value)) => (
                    Some(to_c_string(key, "filter key")?),
                    Some(to_c_string(value, "filter value")?),
                ),
                None => (None, None),
            };

            let options = FfiSearchOptions {
                mode: params.mode.code(),
                _pad0: 0,
                top_k: params.top_k,
                use_reranker: bool_to_int(params.rerank),
                // 0 disables the threshold
                threshold: params.threshold.unwrap_or(0.0),
                source_pattern: opt_ptr(&source_pattern),
                filter_key: opt_ptr(&filter_key),
                filter_value: opt_ptr(&filter_value),
            };

            let symbols = engine.symbols();
            let mut raw = FfiSearchResults {
                results: ptr::null_mut(),
                len: 0,
            };
            let status = unsafe {
                (symbols.searcher_search_with_options)(
                    handle,
                    path.as_ptr(),
                    query.as_ptr(),
                    &options,
                    &mut raw,
                )
            };
            engine.check(status)?;

            let buffer = unsafe { EngineBuffer::new(raw, symbols) };
            Ok(buffer.copy_out(|results| {
                unsafe { copy_records(results.results, results.len) }
                    .into_iter()
                    .map(|item| unsafe {
                        SearchResult {
                            score: item.score,
                            text: copy_c_str(item.text).unwrap_or_default(),
                            document_id: copy_c_str(item.document_id),
                            metadata_json: copy_c_str(item.metadata_json),
                        }
                    })
                    .collect()
            }))
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
