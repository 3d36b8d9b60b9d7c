//! Text classification.

use std::ptr;
use std::sync::Arc;

use serde::Serialize;

use super::{CommonArgs, HandleSlot, Model, Options};
use crate::error::Result;
use crate::ffi::marshal::{bool_to_int, copy_c_str, copy_records, to_c_string, CStringArray};
use crate::ffi::{Engine, EngineBuffer, FfiClassResults, FfiClassifierConfig};

/// A single label with its confidence score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelScore {
    pub label: String,
    pub score: f32,
}

/// Output of a classification.
///
/// `label` and `score` are the top prediction: the first entry of
/// `all_scores` holding the maximum score. `all_scores` keeps the order the
/// engine returned, which the engine does not specify.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Classification {
    pub label: String,
    pub score: f32,
    pub all_scores: Vec<LabelScore>,
}

impl Classification {
    /// Build from the engine's scores. Empty input gives an empty result.
    pub fn from_scores(all_scores: Vec<LabelScore>) -> Self {
        let mut best: Option<&LabelScore> = None;
        for entry in &all_scores {
            // Strict comparison keeps the first of equal scores
            if best.map_or(true, |b| entry.score > b.score) {
                best = Some(entry);
            }
        }
        let (label, score) = best.map_or((String::new(), 0.0), |b| (b.label.clone(), b.score));
        Self {
            label,
            score,
            all_scores,
        }
    }
}

/// Classifier construction options.
#[derive(Debug, Clone)]
pub struct ClassifierOptions {
    pub model: Model,
    pub options: Options,
    /// Override the model's label names
    pub labels: Vec<String>,
    pub multi_label: bool,
}

impl ClassifierOptions {
    pub fn new(model: impl Into<Model>) -> Self {
        Self {
            model: model.into(),
            options: Options::from_global_config(),
            labels: Vec::new(),
            multi_label: false,
        }
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_multi_label(mut self, multi_label: bool) -> Self {
        self.multi_label = multi_label;
        self
    }
}

/// Text classifier backed by a pre-trained model.
///
/// Known registry models include `distilbert-sentiment`, `roberta-sentiment`,
/// `bert-sentiment-multilingual`, `distilroberta-emotion`, `roberta-emotions`
/// and `toxic-bert`. Models download on first use and are cached.
pub struct Classifier {
    slot: HandleSlot,
}

impl Classifier {
    /// Load `model` with default options on the global engine.
    pub fn new(model: impl Into<Model>) -> Result<Self> {
        Self::with_options(ClassifierOptions::new(model))
    }

    pub fn with_options(options: ClassifierOptions) -> Result<Self> {
        Self::with_engine(Engine::global()?, options)
    }

    /// Load a classifier on a specific engine.
    pub fn with_engine(engine: Arc<Engine>, options: ClassifierOptions) -> Result<Self> {
        let common = CommonArgs::new(&options.options, Some(&options.model))?;
        let labels = CStringArray::new(&options.labels, "label")?;

        let config = FfiClassifierConfig {
            device: options.options.device.code(),
            _pad0: 0,
            cache_dir: common.cache_dir(),
            model_name: common.model_name(),
            model_path: common.model_path(),
            labels: labels.as_ptr(),
            num_labels: labels.len(),
            multi_label: bool_to_int(options.multi_label),
            quiet: bool_to_int(options.options.quiet),
        };

        let symbols = *engine.symbols();
        let slot = HandleSlot::open(
            engine,
            "classifier",
            &config,
            symbols.classifier_new,
            symbols.classifier_free,
        )?;
        Ok(Self { slot })
    }

    /// Score `text` against every label.
    pub fn classify(&self, text: &str) -> Result<Classification> {
        self.slot.with_handle(|engine, handle| {
            let text = to_c_string(text, "text")?;
            let symbols = engine.symbols();

            let mut raw = FfiClassResults {
                results: ptr::null_mut(),
                len: 0,
            };
            let status = unsafe { (symbols.classifier_classify)(handle, text.as_ptr(), &mut raw) };
            engine.check(status)?;

            let buffer = unsafe { EngineBuffer::new(raw, symbols) };
            let scores = buffer.copy_out(|results| {
                // Safety: the engine filled `results` with `len` records
                // whose labels are NUL-terminated; all are copied before
                // the buffer is released.
                unsafe { copy_records(results.results, results.len) }
                    .into_iter()
                    .map(|item| LabelScore {
                        label: unsafe { copy_c_str(item.label) }.unwrap_or_default(),
                        score: item.score,
                    })
                    .collect()
            });
            Ok(Classification::from_scores(scores))
        })
    }

    /// Number of labels the model predicts.
    pub fn num_labels(&self) -> Result<usize> {
        self.slot.with_handle(|engine, handle| {
            Ok(unsafe { (engine.symbols().classifier_num_labels)(handle) })
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
