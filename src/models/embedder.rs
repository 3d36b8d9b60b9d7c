//! Text embeddings.

use std::ptr;
use std::sync::Arc;

use super::{CommonArgs, HandleSlot, Model, Options};
use crate::error::{Error, ErrorKind, Result};
use crate::ffi::marshal::{bool_to_int, to_c_string, CStringArray};
use crate::ffi::{Engine, EngineBuffer, FfiEmbedderConfig, FfiFloat2DArray, FfiFloatArray};

/// Embedder construction options.
#[derive(Debug, Clone)]
pub struct EmbedderOptions {
    pub model: Model,
    pub options: Options,
    /// L2-normalise output vectors (engine side)
    pub normalize: bool,
}

impl EmbedderOptions {
    pub fn new(model: impl Into<Model>) -> Self {
        Self {
            model: model.into(),
            options: Options::from_global_config(),
            normalize: true,
        }
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }
}

/// Encodes text into dense vectors.
///
/// Known registry models: `minilm-l6-v2` (384-dim), `mpnet-base-v2`
/// (768-dim), `distilbert-base` (768-dim).
pub struct Embedder {
    slot: HandleSlot,
}

impl Embedder {
    /// Load `model` with default options on the global engine.
    pub fn new(model: impl Into<Model>) -> Result<Self> {
        Self::with_options(EmbedderOptions::new(model))
    }

    pub fn with_options(options: EmbedderOptions) -> Result<Self> {
        Self::with_engine(Engine::global()?, options)
    }

    pub fn with_engine(engine: Arc<Engine>, options: EmbedderOptions) -> Result<Self> {
        let common = CommonArgs::new(&options.options, Some(&options.model))?;
        let config = FfiEmbedderConfig {
            device: options.options.device.code(),
            _pad0: 0,
            cache_dir: common.cache_dir(),
            model_name: common.model_name(),
            model_path: common.model_path(),
            normalize: bool_to_int(options.normalize),
            quiet: bool_to_int(options.options.quiet),
        };

        let symbols = *engine.symbols();
        let slot = HandleSlot::open(
            engine,
            "embedder",
            &config,
            symbols.embedder_new,
            symbols.embedder_free,
        )?;
        Ok(Self { slot })
    }

    /// Embedding vector for `text`; its length equals [`Embedder::dim`].
    pub fn encode(&self, text: &str) -> Result<Vec<f32>> {
        self.slot.with_handle(|engine, handle| {
            let text = to_c_string(text, "text")?;
            let symbols = engine.symbols();

            let mut raw = FfiFloatArray {
                data: ptr::null_mut(),
                len: 0,
            };
            let status = unsafe { (symbols.embedder_encode)(handle, text.as_ptr(), &mut raw) };
            engine.check(status)?;

            let buffer = unsafe { EngineBuffer::new(raw, symbols) };
            Ok(buffer.copy_out(|array| {
                if array.data.is_null() || array.len == 0 {
                    return Vec::new();
                }
                unsafe { std::slice::from_raw_parts(array.data, array.len) }.to_vec()
            }))
        })
    }

    /// One vector per input, in input order.
    ///
    /// An empty batch returns immediately without calling the engine.
    pub fn encode_batch<S: AsRef<str>>(&self, texts: &[S]) -> Result<Vec<Vec<f32>>> {
        self.slot.with_handle(|engine, handle| {
            if texts.is_empty() {
                return Ok(Vec::new());
            }
            let texts = CStringArray::new(texts, "text")?;
            let symbols = engine.symbols();

            let mut raw = FfiFloat2DArray {
                data: ptr::null_mut(),
                rows: 0,
                cols: 0,
            };
            let status = unsafe {
                (symbols.embedder_encode_batch)(handle, texts.as_ptr(), texts.len(), &mut raw)
            };
            engine.check(status)?;

            let buffer = unsafe { EngineBuffer::new(raw, symbols) };
            buffer.copy_out(|matrix| {
                if matrix.data.is_null() || matrix.rows == 0 || matrix.cols == 0 {
                    return Ok(Vec::new());
                }
                // Element count is rows * cols as reported, never inferred
                let len = matrix.rows.checked_mul(matrix.cols).ok_or_else(|| {
                    Error::from_status(
                        ErrorKind::Unknown.code(),
                        Some(format!(
                            "batch shape {}x{} overflows the address space",
                            matrix.rows, matrix.cols
                        )),
                    )
                })?;
                let flat = unsafe { std::slice::from_raw_parts(matrix.data, len) };
                Ok(flat.chunks_exact(matrix.cols).map(<[f32]>::to_vec).collect())
            })
        })
    }

    /// Cosine similarity of two texts, computed by the engine.
    pub fn similarity(&self, a: &str, b: &str) -> Result<f32> {
        self.slot.with_handle(|engine, handle| {
            let a = to_c_string(a, "text")?;
            let b = to_c_string(b, "text")?;

            let mut score = 0.0f32;
            let status = unsafe {
                (engine.symbols().embedder_similarity)(handle, a.as_ptr(), b.as_ptr(), &mut score)
            };
            engine.check(status)?;
            Ok(score)
        })
    }

    /// Dimensionality of the model's vectors.
    pub fn dim(&self) -> Result<usize> {
        self.slot
            .with_handle(|engine, handle| Ok(unsafe { (engine.symbols().embedder_dim)(handle) }))
    }

    /// Release the model. Safe to call more than once.
    pub fn close(&self) -> Result<()> {
        self.slot.close()
    }

    pub fn is_closed(&self) -> bool {
        self.slot.is_closed()
    }
}

/// Cosine similarity of two vectors, computed host-side.
///
/// Returns 0 when the lengths differ, either vector is empty, or either has
/// zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    let denom = norm_a * norm_b;
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}
