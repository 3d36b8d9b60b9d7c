//! Cross-encoder reranking.

use std::ptr;
use std::sync::Arc;

use serde::Serialize;

use super::{CommonArgs, HandleSlot, Model, Options};
use crate::error::Result;
use crate::ffi::marshal::{bool_to_int, copy_records, to_c_string, CStringArray};
use crate::ffi::{Engine, EngineBuffer, FfiRerankResults, FfiRerankerConfig};

/// One document with its relevance to the query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RerankResult {
    /// Position of the document in the input slice
    pub index: usize,
    pub score: f32,
    pub document: String,
}

/// Reranker construction options.
#[derive(Debug, Clone, Default)]
pub struct RerankerOptions {
    /// `None` selects the engine's default cross-encoder
    pub model: Option<Model>,
    pub options: Options,
}

impl RerankerOptions {
    pub fn new() -> Self {
        Self {
            model: None,
            options: Options::from_global_config(),
        }
    }

    pub fn with_model(mut self, model: impl Into<Model>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }
}

/// Scores query/document relevance with a cross-encoder.
pub struct Reranker {
    slot: HandleSlot,
}

impl Reranker {
    /// Load the default cross-encoder on the global engine.
    pub fn new() -> Result<Self> {
        Self::with_options(RerankerOptions::new())
    }

    pub fn with_options(options: RerankerOptions) -> Result<Self> {
        Self::with_engine(Engine::global()?, options)
    }

    pub fn with_engine(engine: Arc<Engine>, options: RerankerOptions) -> Result<Self> {
        let common = CommonArgs::new(&options.options, options.model.as_ref())?;
        let config = FfiRerankerConfig {
            device: options.options.device.code(),
            _pad0: 0,
            cache_dir: common.cache_dir(),
            model_name: common.model_name(),
            model_path: common.model_path(),
            quiet: bool_to_int(options.options.quiet),
            _pad1: 0,
        };

        let symbols = *engine.symbols();
        let slot = HandleSlot::open(
            engine,
            "reranker",
            &config,
            symbols.reranker_new,
            symbols.reranker_free,
        )?;
        Ok(Self { slot })
    }

    /// Relevance of a single query/document pair.
    pub fn score(&self, query: &str, document: &str) -> Result<f32> {
        self.slot.with_handle(|engine, handle| {
            let query = to_c_string(query, "query")?;
            let document = to_c_string(document, "document")?;

            let mut score = 0.0f32;
            let status = unsafe {
                (engine.symbols().reranker_score)(
                    handle,
                    query.as_ptr(),
                    document.as_ptr(),
                    &mut score,
                )
            };
            engine.check(status)?;
            Ok(score)
        })
    }

    /// Every document, most relevant first.
    pub fn rerank<S: AsRef<str>>(&self, query: &str, documents: &[S]) -> Result<Vec<RerankResult>> {
        self.run(query, documents, None)
    }

    /// The `k` most relevant documents, most relevant first.
    ///
    /// Returns at most `min(k, documents.len())` entries.
    pub fn rerank_top_k<S: AsRef<str>>(
        &self,
        query: &str,
        documents: &[S],
        k: usize,
    ) -> Result<Vec<RerankResult>> {
        self.run(query, documents, Some(k))
    }

    fn run<S: AsRef<str>>(
        &self,
        query: &str,
        documents: &[S],
        top_k: Option<usize>,
    ) -> Result<Vec<RerankResult>> {
        self.slot.with_handle(|engine, handle| {
            if documents.is_empty() || top_k == Some(0) {
                return Ok(Vec::new());
            }
            let query = to_c_string(query, "query")?;
            let docs = CStringArray::new(documents, "document")?;
            let symbols = engine.symbols();

            let mut raw = FfiRerankResults {
                results: ptr::null_mut(),
                len: 0,
            };
            let status = unsafe {
                match top_k {
                    Some(k) => (symbols.reranker_rerank_top_k)(
                        handle,
                        query.as_ptr(),
                        docs.as_ptr(),
                        docs.len(),
                        k,
                        &mut raw,
                    ),
                    None => (symbols.reranker_rerank)(
                        handle,
                        query.as_ptr(),
                        docs.as_ptr(),
                        docs.len(),
                        &mut raw,
                    ),
                }
            };
            engine.check(status)?;

            let buffer = unsafe { EngineBuffer::new(raw, symbols) };
            let mut results: Vec<RerankResult> = buffer.copy_out(|results| {
                unsafe { copy_records(results.results, results.len) }
                    .into_iter()
                    .map(|item| RerankResult {
                        index: item.index,
                        score: item.score,
                        document: documents
                            .get(item.index)
                            .map(|d| d.as_ref().to_string())
                            .unwrap_or_default(),
                    })
                    .collect()
            });

            if let Some(k) = top_k {
                results.truncate(k);
            }
            Ok(results)
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
