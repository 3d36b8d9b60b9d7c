//! Model Handles
//!
//! Safe wrappers over the engine's model handles. Each wrapper owns exactly
//! one native handle behind its own mutex; every operation holds that mutex
//! from argument marshaling through result release, so calls on one instance
//! never overlap. Distinct instances may be used from different threads.
//!
//! There is no way to cancel or time out a native call once it has started.
//!
//! # Example
//!
//! ```ignore
//! use kjarni::{Classifier, Embedder};
//!
//! let classifier = Classifier::new("distilbert-sentiment")?;
//! let result = classifier.classify("I love this product!")?;
//! println!("{} {:.2}", result.label, result.score);
//! classifier.close()?;
//!
//! let embedder = Embedder::new("minilm-l6-v2")?;
//! assert_eq!(embedder.encode("hello")?.len(), embedder.dim()?);
//! ```

pub mod classifier;
pub mod embedder;
pub mod indexer;
pub mod reranker;
pub mod searcher;

use std::ffi::CString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::ptr;
use std::str::FromStr;
use std::sync::Arc;

use libc::c_char;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::KjarniConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::ffi::marshal::{opt_ptr, path_to_c_string, to_c_string, to_opt_c_string};
use crate::ffi::{Engine, RawHandle, Status};

pub use classifier::{Classification, Classifier, ClassifierOptions, LabelScore};
pub use embedder::{cosine_similarity, Embedder, EmbedderOptions};
pub use indexer::{IndexStats, Indexer, IndexerOptions};
pub use reranker::{RerankResult, Reranker, RerankerOptions};
pub use searcher::{SearchMode, SearchParams, SearchResult, Searcher, SearcherOptions};

/// Compute device selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    #[default]
    Cpu,
    Gpu,
}

impl Device {
    /// Engine encoding of the device.
    pub fn code(&self) -> i32 {
        match self {
            Device::Cpu => 0,
            Device::Gpu => 1,
        }
    }
}

impl FromStr for Device {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "cpu" => Ok(Device::Cpu),
            "gpu" => Ok(Device::Gpu),
            other => Err(Error::InvalidArgument(format!(
                "unknown device '{}' (expected cpu or gpu)",
                other
            ))),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Gpu => write!(f, "gpu"),
        }
    }
}

/// Which model to load: a registry name (downloaded and cached by the
/// engine) or a local model directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Model {
    Name(String),
    Path(PathBuf),
}

impl Model {
    pub fn name(name: impl Into<String>) -> Self {
        Model::Name(name.into())
    }

    pub fn path(path: impl AsRef<Path>) -> Self {
        Model::Path(path.as_ref().to_path_buf())
    }
}

impl From<&str> for Model {
    fn from(name: &str) -> Self {
        Model::Name(name.to_string())
    }
}

impl From<String> for Model {
    fn from(name: String) -> Self {
        Model::Name(name)
    }
}

impl From<PathBuf> for Model {
    fn from(path: PathBuf) -> Self {
        Model::Path(path)
    }
}

/// Options shared by every model family.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Options {
    pub device: Device,
    /// Suppress engine-side logging during load and inference
    pub quiet: bool,
    pub cache_dir: Option<PathBuf>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options taken from the `[defaults]` section of a config.
    pub fn from_config(config: &KjarniConfig) -> Self {
        Self {
            device: config.defaults.device,
            quiet: config.defaults.quiet,
            cache_dir: config.defaults.cache_dir.clone(),
        }
    }

    /// Options from the process-wide config, `[defaults]` plus `KJARNI_*`.
    ///
    /// Every `*Options::new` starts from these.
    pub fn from_global_config() -> Self {
        Self::from_config(KjarniConfig::global())
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn with_cache_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cache_dir = Some(dir.as_ref().to_path_buf());
        self
    }
}

/// Engine strings common to every config struct.
///
/// Must stay alive until the constructor call that reads the pointers returns.
pub(crate) struct CommonArgs {
    cache_dir: Option<CString>,
    model_name: Option<CString>,
    model_path: Option<CString>,
}

impl CommonArgs {
    pub(crate) fn new(options: &Options, model: Option<&Model>) -> Result<Self> {
        let cache_dir = options
            .cache_dir
            .as_deref()
            .map(|p| path_to_c_string(p, "cache directory"))
            .transpose()?;
        let (model_name, model_path) = match model {
            Some(Model::Name(name)) => (Some(to_c_string(name, "model name")?), None),
            Some(Model::Path(path)) => (None, Some(path_to_c_string(path, "model path")?)),
            None => (None, None),
        };
        Ok(Self {
            cache_dir,
            model_name,
            model_path,
        })
    }

    pub(crate) fn cache_dir(&self) -> *const c_char {
        opt_ptr(&self.cache_dir)
    }

    pub(crate) fn model_name(&self) -> *const c_char {
        opt_ptr(&self.model_name)
    }

    pub(crate) fn model_path(&self) -> *const c_char {
        opt_ptr(&self.model_path)
    }
}

/// Optional extra string, null when absent.
pub(crate) fn opt_arg(value: Option<&str>, what: &str) -> Result<Option<CString>> {
    to_opt_c_string(value, what)
}

/// An engine handle that may be sent between threads.
///
/// Only ever touched while the owning [`HandleSlot`] mutex is held.
struct NativeHandle(RawHandle);

unsafe impl Send for NativeHandle {}

/// One engine handle plus the lock serialising access to it.
///
/// `None` in the mutex is the closed state; the handle is gone and no native
/// call can be made through this slot again.
pub(crate) struct HandleSlot {
    kind: &'static str,
    engine: Arc<Engine>,
    state: Mutex<Option<NativeHandle>>,
    destroy: unsafe extern "C" fn(RawHandle),
}

impl HandleSlot {
    /// Run an engine constructor and take ownership of the handle it returns.
    pub(crate) fn open<C>(
        engine: Arc<Engine>,
        kind: &'static str,
        config: &C,
        create: unsafe extern "C" fn(*const C, *mut RawHandle) -> Status,
        destroy: unsafe extern "C" fn(RawHandle),
    ) -> Result<Self> {
        let mut raw: RawHandle = ptr::null_mut();

        // Safety: `config` and every string it points at outlive the call.
        let status = unsafe { create(config, &mut raw) };
        engine.check(status)?;

        if raw.is_null() {
            return Err(Error::from_status(
                ErrorKind::NullPointer.code(),
                Some(format!("{} constructor returned a null handle", kind)),
            ));
        }

        debug!(kind, "created engine handle");
        Ok(Self {
            kind,
            engine,
            state: Mutex::new(Some(NativeHandle(raw))),
            destroy,
        })
    }

    /// Run `op` with the live handle while holding the instance lock.
    ///
    /// Fails with [`Error::UsedAfterClose`] without calling `op` once closed.
    pub(crate) fn with_handle<T>(
        &self,
        op: impl FnOnce(&Engine, RawHandle) -> Result<T>,
    ) -> Result<T> {
        let guard = self.state.lock();
        let handle = guard.as_ref().ok_or(Error::UsedAfterClose(self.kind))?;
        op(&self.engine, handle.0)
    }

    /// Release the native handle. Further calls are no-ops.
    pub(crate) fn close(&self) -> Result<()> {
        let mut guard = self.state.lock();
        if let Some(handle) = guard.take() {
            // Safety: the handle came from the matching constructor and
            // `take` guarantees it is destroyed only once.
            unsafe { (self.destroy)(handle.0) };
            debug!(kind = self.kind, "released engine handle");
        }
        Ok(())
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().is_none()
    }
}

impl Drop for HandleSlot {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
