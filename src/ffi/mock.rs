//! In-process stand-in for the engine library, used by unit tests.
//!
//! Every entry point is a plain Rust `extern "C"` function assembled into a
//! [`Symbols`] table. Each model instance reports into a [`Counters`] record
//! keyed by its model name, so tests running in parallel stay isolated as
//! long as they use distinct names.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::ffi::{CStr, CString};
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;

use libc::{c_char, c_int, size_t};
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use super::engine::Engine;
use super::symbols::Symbols;
use super::types::*;
use crate::models::cosine_similarity;

/// Model name whose constructor fails with model-not-found.
pub const MISSING_MODEL: &str = "missing-model";

/// Input text that makes any operation fail with inference-failed.
pub const FAIL_TEXT: &str = "__mock_fail__";

/// Batch input for which the engine reports an impossible matrix shape.
pub const OVERFLOW_TEXT: &str = "__mock_overflow__";

/// Counter key for a reranker created without a model.
pub const DEFAULT_RERANKER: &str = "mock-default-cross-encoder";

pub const EMBEDDING_DIM: usize = 8;

const DEFAULT_LABELS: [&str; 2] = ["negative", "positive"];

/// What the mock observed for one model name.
#[derive(Default)]
pub struct Counters {
    calls: AtomicUsize,
    handles_freed: AtomicUsize,
    buffers_freed: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    device: AtomicI32,
    quiet: AtomicBool,
    multi_label: AtomicBool,
    normalize: AtomicBool,
    model_was_default: AtomicBool,
    has_rerank_model: AtomicBool,
    chunk_size: AtomicUsize,
    recursive: AtomicBool,
    last_mode: AtomicI32,
    last_top_k: AtomicUsize,
    last_rerank: AtomicBool,
    extensions: Mutex<Option<String>>,
    last_filter: Mutex<Option<String>>,
}

impl Counters {
    /// Operations run on handles (constructors and destructors excluded).
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn handles_freed(&self) -> usize {
        self.handles_freed.load(Ordering::SeqCst)
    }

    pub fn buffers_freed(&self) -> usize {
        self.buffers_freed.load(Ordering::SeqCst)
    }

    /// Highest number of operations seen running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn device(&self) -> i32 {
        self.device.load(Ordering::SeqCst)
    }

    pub fn quiet(&self) -> bool {
        self.quiet.load(Ordering::SeqCst)
    }

    pub fn multi_label(&self) -> bool {
        self.multi_label.load(Ordering::SeqCst)
    }

    pub fn normalize(&self) -> bool {
        self.normalize.load(Ordering::SeqCst)
    }

    pub fn model_was_default(&self) -> bool {
        self.model_was_default.load(Ordering::SeqCst)
    }

    pub fn has_rerank_model(&self) -> bool {
        self.has_rerank_model.load(Ordering::SeqCst)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size.load(Ordering::SeqCst)
    }

    pub fn recursive(&self) -> bool {
        self.recursive.load(Ordering::SeqCst)
    }

    pub fn extensions(&self) -> Option<String> {
        self.extensions.lock().clone()
    }

    pub fn last_mode(&self) -> i32 {
        self.last_mode.load(Ordering::SeqCst)
    }

    pub fn last_top_k(&self) -> usize {
        self.last_top_k.load(Ordering::SeqCst)
    }

    pub fn last_rerank(&self) -> bool {
        self.last_rerank.load(Ordering::SeqCst)
    }

    /// Last metadata filter as `key=value`.
    pub fn last_filter(&self) -> Option<String> {
        self.last_filter.lock().clone()
    }

    fn enter(&self) -> InFlight<'_> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        // Widen the window an unserialised caller would overlap in
        std::thread::yield_now();
        InFlight(self)
    }
}

struct InFlight<'a>(&'a Counters);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

static COUNTERS: Lazy<Mutex<HashMap<String, Arc<Counters>>>> = Lazy::new(Default::default);

/// Counters for `name`, created on first use.
pub fn counters(name: &str) -> Arc<Counters> {
    Arc::clone(COUNTERS.lock().entry(name.to_string()).or_default())
}

/// Host allocation backing one result buffer handed to the caller.
struct Allocation {
    counters: Arc<Counters>,
    _data: Box<dyn std::any::Any>,
}

// Only touched under the registry lock; the data is never shared.
unsafe impl Send for Allocation {}

static BUFFERS: Lazy<Mutex<HashMap<usize, Allocation>>> = Lazy::new(Default::default);

/// Keep `records` (and whatever they point into) alive until freed.
///
/// Returns a unique non-null base pointer even for an empty list.
fn hand_out<T: 'static, K: 'static>(
    counters: &Arc<Counters>,
    mut records: Vec<T>,
    keep: K,
) -> *mut T {
    records.reserve(1);
    let base = records.as_mut_ptr();
    BUFFERS.lock().insert(
        base as usize,
        Allocation {
            counters: Arc::clone(counters),
            _data: Box::new((records, keep)),
        },
    );
    base
}

fn take_back<T>(base: *mut T) {
    if let Some(allocation) = BUFFERS.lock().remove(&(base as usize)) {
        allocation.counters.buffers_freed.fetch_add(1, Ordering::SeqCst);
    }
}

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn fail(code: Status, message: &str) -> Status {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = CString::new(message).ok());
    code
}

unsafe extern "C" fn last_error_message() -> *const c_char {
    LAST_ERROR.with(|slot| slot.borrow().as_ref().map_or(ptr::null(), |s| s.as_ptr()))
}

unsafe extern "C" fn clear_error() {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = None);
}

/// Per-handle state behind every mock `RawHandle`.
struct MockModel {
    counters: Arc<Counters>,
    labels: Vec<String>,
    normalize: bool,
    indexes: Mutex<HashSet<String>>,
}

unsafe fn string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        None
    } else {
        Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
    }
}

unsafe fn strings(base: *const *const c_char, len: size_t) -> Vec<String> {
    if base.is_null() {
        return Vec::new();
    }
    std::slice::from_raw_parts(base, len)
        .iter()
        .map(|&p| string(p).unwrap_or_default())
        .collect()
}

/// Shared constructor path: resolve the model name, fail for the missing
/// one, box the state and write the handle.
unsafe fn create(
    model_name: *const c_char,
    model_path: *const c_char,
    default_name: Option<&str>,
    out: *mut RawHandle,
    setup: impl FnOnce(&Counters, &mut MockModel),
) -> Status {
    let name = match (string(model_name), string(model_path), default_name) {
        (Some(name), _, _) | (None, Some(name), _) => name,
        (None, None, Some(default)) => default.to_string(),
        (None, None, None) => return fail(7, "model name or path is required"),
    };
    if name == MISSING_MODEL {
        return fail(3, &format!("model '{}' not found in registry", name));
    }

    let counters = counters(&name);
    counters
        .model_was_default
        .store(string(model_name).is_none() && string(model_path).is_none(), Ordering::SeqCst);
    let mut model = MockModel {
        counters: Arc::clone(&counters),
        labels: DEFAULT_LABELS.iter().map(|s| s.to_string()).collect(),
        normalize: false,
        indexes: Mutex::new(HashSet::new()),
    };
    setup(counters.as_ref(), &mut model);

    *out = Box::into_raw(Box::new(model)) as RawHandle;
    0
}

unsafe fn model<'a>(handle: RawHandle) -> &'a MockModel {
    &*(handle as *const MockModel)
}

unsafe extern "C" fn free_model(handle: RawHandle) {
    if handle.is_null() {
        return;
    }
    let model = Box::from_raw(handle as *mut MockModel);
    model.counters.handles_freed.fetch_add(1, Ordering::SeqCst);
}

unsafe extern "C" fn classifier_new(
    config: *const FfiClassifierConfig,
    out: *mut RawHandle,
) -> Status {
    let config = &*config;
    create(config.model_name, config.model_path, None, out, |counters, model| {
        counters.device.store(config.device, Ordering::SeqCst);
        counters.quiet.store(config.quiet != 0, Ordering::SeqCst);
        counters.multi_label.store(config.multi_label != 0, Ordering::SeqCst);
        if config.num_labels > 0 {
            model.labels = strings(config.labels, config.num_labels);
        }
    })
}

fn is_positive(text: &str) -> bool {
    let text = text.to_lowercase();
    ["love", "great", "good"].iter().any(|w| text.contains(w))
}

unsafe extern "C" fn classifier_classify(
    handle: RawHandle,
    text: *const c_char,
    out: *mut FfiClassResults,
) -> Status {
    let model = model(handle);
    let _guard = model.counters.enter();
    let text = string(text).unwrap_or_default();
    if text == FAIL_TEXT {
        return fail(5, "forced failure");
    }

    let n = model.labels.len();
    let scores: Vec<f32> = if model.labels == DEFAULT_LABELS {
        if is_positive(&text) {
            vec![0.05, 0.95]
        } else {
            vec![0.8, 0.2]
        }
    } else {
        let total = (n * (n + 1) / 2) as f32;
        (0..n).map(|i| (n - i) as f32 / total).collect()
    };

    let labels: Vec<CString> = model
        .labels
        .iter()
        .map(|l| CString::new(l.as_str()).unwrap_or_default())
        .collect();
    let records: Vec<FfiClassResult> = labels
        .iter()
        .zip(scores)
        .map(|(label, score)| FfiClassResult {
            label: label.as_ptr(),
            score,
            _pad0: [0; 4],
        })
        .collect();
    let len = records.len();
    *out = FfiClassResults {
        results: hand_out(&model.counters, records, labels),
        len,
    };
    0
}

unsafe extern "C" fn classifier_num_labels(handle: RawHandle) -> size_t {
    let model = model(handle);
    let _guard = model.counters.enter();
    model.labels.len()
}

unsafe extern "C" fn class_results_free(results: FfiClassResults) {
    take_back(results.results);
}

unsafe extern "C" fn embedder_new(config: *const FfiEmbedderConfig, out: *mut RawHandle) -> Status {
    let config = &*config;
    create(config.model_name, config.model_path, None, out, |counters, model| {
        counters.device.store(config.device, Ordering::SeqCst);
        counters.quiet.store(config.quiet != 0, Ordering::SeqCst);
        counters.normalize.store(config.normalize != 0, Ordering::SeqCst);
        model.normalize = config.normalize != 0;
    })
}

/// Words sharing a concept land on the same axis; everything else is
/// spread over the remaining axes by byte sum.
fn embed(text: &str, normalize: bool) -> Vec<f32> {
    let mut v = vec![0.0f32; EMBEDDING_DIM];
    for word in text.to_lowercase().split_whitespace() {
        let axis = match word {
            "doctor" | "physician" | "nurse" | "hospital" => 0,
            "banana" | "apple" | "fruit" => 1,
            other => 2 + other.bytes().map(usize::from).sum::<usize>() % (EMBEDDING_DIM - 2),
        };
        v[axis] += 1.0;
    }
    if normalize {
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
    }
    v
}

unsafe extern "C" fn embedder_encode(
    handle: RawHandle,
    text: *const c_char,
    out: *mut FfiFloatArray,
) -> Status {
    let model = model(handle);
    let _guard = model.counters.enter();
    let text = string(text).unwrap_or_default();
    if text == FAIL_TEXT {
        return fail(5, "forced failure");
    }

    let vector = embed(&text, model.normalize);
    let len = vector.len();
    *out = FfiFloatArray {
        data: hand_out(&model.counters, vector, ()),
        len,
    };
    0
}

unsafe extern "C" fn embedder_encode_batch(
    handle: RawHandle,
    texts: *const *const c_char,
    count: size_t,
    out: *mut FfiFloat2DArray,
) -> Status {
    let model = model(handle);
    let _guard = model.counters.enter();
    let texts = strings(texts, count);
    if texts.iter().any(|t| t == FAIL_TEXT) {
        return fail(5, "forced failure in batch");
    }

    let flat: Vec<f32> = texts.iter().flat_map(|t| embed(t, model.normalize)).collect();
    let rows = if texts.iter().any(|t| t == OVERFLOW_TEXT) {
        usize::MAX
    } else {
        texts.len()
    };
    *out = FfiFloat2DArray {
        data: hand_out(&model.counters, flat, ()),
        rows,
        cols: EMBEDDING_DIM,
    };
    0
}

unsafe extern "C" fn embedder_similarity(
    handle: RawHandle,
    a: *const c_char,
    b: *const c_char,
    out: *mut f32,
) -> Status {
    let model = model(handle);
    let _guard = model.counters.enter();
    let a = embed(&string(a).unwrap_or_default(), model.normalize);
    let b = embed(&string(b).unwrap_or_default(), model.normalize);
    *out = cosine_similarity(&a, &b);
    0
}

unsafe extern "C" fn embedder_dim(handle: RawHandle) -> size_t {
    let model = model(handle);
    let _guard = model.counters.enter();
    EMBEDDING_DIM
}

unsafe extern "C" fn float_array_free(array: FfiFloatArray) {
    take_back(array.data);
}

unsafe extern "C" fn float_2d_array_free(array: FfiFloat2DArray) {
    take_back(array.data);
}

unsafe extern "C" fn reranker_new(config: *const FfiRerankerConfig, out: *mut RawHandle) -> Status {
    let config = &*config;
    create(
        config.model_name,
        config.model_path,
        Some(DEFAULT_RERANKER),
        out,
        |counters, _| {
            counters.device.store(config.device, Ordering::SeqCst);
            counters.quiet.store(config.quiet != 0, Ordering::SeqCst);
        },
    )
}

/// Fraction of query words present in the document.
fn overlap(query: &str, document: &str) -> f32 {
    let query: Vec<String> = query.to_lowercase().split_whitespace().map(String::from).collect();
    if query.is_empty() {
        return 0.0;
    }
    let document = document.to_lowercase();
    let words: HashSet<&str> = document.split_whitespace().collect();
    let hits = query.iter().filter(|w| words.contains(w.as_str())).count();
    hits as f32 / query.len() as f32
}

unsafe extern "C" fn reranker_score(
    handle: RawHandle,
    query: *const c_char,
    document: *const c_char,
    out: *mut f32,
) -> Status {
    let model = model(handle);
    let _guard = model.counters.enter();
    *out = overlap(&string(query).unwrap_or_default(), &string(document).unwrap_or_default());
    0
}

unsafe fn rerank(
    handle: RawHandle,
    query: *const c_char,
    documents: *const *const c_char,
    count: size_t,
    top_k: Option<size_t>,
    out: *mut FfiRerankResults,
) -> Status {
    let model = model(handle);
    let _guard = model.counters.enter();
    let query = string(query).unwrap_or_default();
    if query == FAIL_TEXT {
        return fail(5, "forced failure");
    }

    let mut records: Vec<FfiRerankResult> = strings(documents, count)
        .iter()
        .enumerate()
        .map(|(index, doc)| FfiRerankResult {
            index,
            score: overlap(&query, doc),
            _pad0: [0; 4],
        })
        .collect();
    records.sort_by(|a, b| b.score.total_cmp(&a.score));
    if let Some(k) = top_k {
        records.truncate(k);
    }

    let len = records.len();
    *out = FfiRerankResults {
        results: hand_out(&model.counters, records, ()),
        len,
    };
    0
}

unsafe extern "C" fn reranker_rerank(
    handle: RawHandle,
    query: *const c_char,
    documents: *const *const c_char,
    count: size_t,
    out: *mut FfiRerankResults,
) -> Status {
    rerank(handle, query, documents, count, None, out)
}

unsafe extern "C" fn reranker_rerank_top_k(
    handle: RawHandle,
    query: *const c_char,
    documents: *const *const c_char,
    count: size_t,
    k: size_t,
    out: *mut FfiRerankResults,
) -> Status {
    rerank(handle, query, documents, count, Some(k), out)
}

unsafe extern "C" fn rerank_results_free(results: *mut FfiRerankResults) {
    if results.is_null() {
        return;
    }
    take_back((*results).results);
    (*results).results = ptr::null_mut();
    (*results).len = 0;
}

unsafe extern "C" fn indexer_new(config: *const FfiIndexerConfig, out: *mut RawHandle) -> Status {
    let config = &*config;
    create(config.model_name, ptr::null(), None, out, |counters, _| {
        counters.device.store(config.device, Ordering::SeqCst);
        counters.quiet.store(config.quiet != 0, Ordering::SeqCst);
        counters.chunk_size.store(config.chunk_size, Ordering::SeqCst);
        counters.recursive.store(config.recursive != 0, Ordering::SeqCst);
        *counters.extensions.lock() = string(config.extensions);
    })
}

unsafe extern "C" fn indexer_create(
    handle: RawHandle,
    index_path: *const c_char,
    inputs: *const *const c_char,
    count: size_t,
    force: c_int,
    out: *mut FfiIndexStats,
) -> Status {
    let model = model(handle);
    let _guard = model.counters.enter();
    let path = string(index_path).unwrap_or_default();
    let inputs = strings(inputs, count);

    let mut indexes = model.indexes.lock();
    if indexes.contains(&path) && force == 0 {
        return fail(7, &format!("index at {} already exists", path));
    }
    indexes.insert(path);

    let documents = inputs.len() * 3;
    let chunks = inputs.len() * 5;
    *out = FfiIndexStats {
        documents_indexed: documents,
        chunks_created: chunks,
        dimension: EMBEDDING_DIM,
        size_bytes: (chunks * EMBEDDING_DIM * 4) as u64,
        files_processed: inputs.len(),
        files_skipped: 0,
        elapsed_ms: 7,
    };
    0
}

unsafe extern "C" fn searcher_new(config: *const FfiSearcherConfig, out: *mut RawHandle) -> Status {
    let config = &*config;
    create(config.model_name, ptr::null(), None, out, |counters, _| {
        counters.device.store(config.device, Ordering::SeqCst);
        counters.quiet.store(config.quiet != 0, Ordering::SeqCst);
        counters
            .has_rerank_model
            .store(!config.rerank_model.is_null(), Ordering::SeqCst);
    })
}

const PASSAGE_SCORES: [f32; 5] = [0.95, 0.8, 0.6, 0.4, 0.2];

unsafe extern "C" fn searcher_search_with_options(
    handle: RawHandle,
    _index_path: *const c_char,
    query: *const c_char,
    options: *const FfiSearchOptions,
    out: *mut FfiSearchResults,
) -> Status {
    let model = model(handle);
    let _guard = model.counters.enter();
    let options = &*options;
    let query = string(query).unwrap_or_default();
    if query == FAIL_TEXT {
        return fail(5, "forced failure");
    }

    let counters = &model.counters;
    counters.last_mode.store(options.mode, Ordering::SeqCst);
    counters.last_top_k.store(options.top_k, Ordering::SeqCst);
    counters.last_rerank.store(options.use_reranker != 0, Ordering::SeqCst);
    let filter = (string(options.filter_key), string(options.filter_value));
    *counters.last_filter.lock() = match filter {
        (Some(k), Some(v)) => Some(format!("{}={}", k, v)),
        _ => None,
    };

    let mut strings_kept = Vec::new();
    let mut records = Vec::new();
    for (i, &score) in PASSAGE_SCORES.iter().enumerate().take(options.top_k) {
        if options.threshold > 0.0 && score < options.threshold {
            continue;
        }
        let id = CString::new(format!("doc-{}", i)).unwrap_or_default();
        let text = CString::new(format!("passage {} about {}", i, query)).unwrap_or_default();
        let metadata = CString::new(format!(r#"{{"source":"notes/{}.md","lang":"rust"}}"#, i))
            .unwrap_or_default();
        records.push(FfiSearchResult {
            score,
            _pad0: 0,
            document_id: id.as_ptr(),
            text: text.as_ptr(),
            metadata_json: metadata.as_ptr(),
        });
        strings_kept.extend([id, text, metadata]);
    }

    let len = records.len();
    *out = FfiSearchResults {
        results: hand_out(counters, records, strings_kept),
        len,
    };
    0
}

unsafe extern "C" fn search_results_free(results: FfiSearchResults) {
    take_back(results.results);
}

fn symbols() -> Symbols {
    Symbols {
        last_error_message,
        clear_error,
        classifier_new,
        classifier_free: free_model,
        classifier_classify,
        classifier_num_labels,
        class_results_free: Some(class_results_free),
        embedder_new,
        embedder_free: free_model,
        embedder_encode,
        embedder_encode_batch,
        embedder_similarity,
        embedder_dim,
        float_array_free: Some(float_array_free),
        float_2d_array_free: Some(float_2d_array_free),
        reranker_new,
        reranker_free: free_model,
        reranker_score,
        reranker_rerank,
        reranker_rerank_top_k,
        rerank_results_free: Some(rerank_results_free),
        indexer_new,
        indexer_free: free_model,
        indexer_create,
        searcher_new,
        searcher_free: free_model,
        searcher_search_with_options,
        search_results_free: Some(search_results_free),
    }
}

/// A mock engine with every entry point present.
pub fn engine() -> Arc<Engine> {
    // Safety: every entry point above matches its declared signature and
    // lives for the whole process.
    Arc::new(unsafe { Engine::from_symbols(symbols()) })
}

/// A mock engine lacking every result-buffer free entry point.
pub fn engine_without_frees() -> Arc<Engine> {
    let symbols = Symbols {
        class_results_free: None,
        float_array_free: None,
        float_2d_array_free: None,
        rerank_results_free: None,
        search_results_free: None,
        ..symbols()
    };
    Arc::new(unsafe { Engine::from_symbols(symbols) })
}
