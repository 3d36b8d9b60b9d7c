//! Engine Context
//!
//! An [`Engine`] is an opened engine library plus its resolved symbol table.
//! It is immutable once built and shared by `Arc` between every model handle.
//! The process-wide instance is created at most once behind a single-execution
//! gate; a failed attempt is cached and returned to every later caller.

use std::path::Path;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::info;

use super::loader::{LibraryLoader, LoadedLibrary};
use super::marshal::copy_c_str;
use super::symbols::Symbols;
use super::types::Status;
use crate::config::KjarniConfig;
use crate::error::{Error, Result};

static GLOBAL: OnceCell<Result<Arc<Engine>>> = OnceCell::new();

/// Loaded engine and its entry points.
pub struct Engine {
    symbols: Symbols,
    // Kept loaded for as long as `symbols` may be called.
    library: Option<LoadedLibrary>,
}

impl Engine {
    /// Open the engine library and resolve every symbol.
    ///
    /// This creates a private engine; most callers want [`Engine::global`].
    pub fn load(loader: &LibraryLoader) -> Result<Self> {
        let library = loader.load()?;

        // Safety: the loader located the kjarni engine binary, and `library`
        // is stored next to the table so it outlives every call through it.
        let symbols = unsafe { Symbols::resolve(library.library())? };

        info!(path = %library.path().display(), "kjarni engine loaded");
        Ok(Self {
            symbols,
            library: Some(library),
        })
    }

    /// Build an engine from an already-resolved table.
    ///
    /// # Safety
    ///
    /// Every function pointer in `symbols` must have the declared signature,
    /// follow the engine's ownership rules, and stay callable for the
    /// lifetime of the returned engine.
    pub unsafe fn from_symbols(symbols: Symbols) -> Self {
        Self {
            symbols,
            library: None,
        }
    }

    /// The process-wide engine, initialised on first use.
    ///
    /// The loader is configured from [`KjarniConfig::global`]: `kjarni.toml`
    /// (searched upward from the current directory) plus the `KJARNI_*`
    /// environment variables.
    pub fn global() -> Result<Arc<Engine>> {
        Self::global_with(|| LibraryLoader::from_config(&KjarniConfig::global().engine))
    }

    /// Initialise the process-wide engine with an explicit loader.
    ///
    /// Only the first initialisation runs; if the global engine already
    /// exists (or already failed), that outcome is returned and `loader` is
    /// ignored.
    pub fn init_global(loader: LibraryLoader) -> Result<Arc<Engine>> {
        Self::global_with(move || loader)
    }

    /// Initialise the process-wide engine from a specific `kjarni.toml`.
    ///
    /// `KJARNI_*` environment variables still apply on top of the file. The
    /// file also becomes the process-wide config, and so the source of model
    /// defaults, unless a config was already resolved.
    pub fn init_global_from_config(path: &Path) -> Result<Arc<Engine>> {
        let config = KjarniConfig::load(path)?.with_env_overrides();
        let loader = LibraryLoader::from_config(&config.engine);
        config.install_global();
        Self::init_global(loader)
    }

    fn global_with(make_loader: impl FnOnce() -> LibraryLoader) -> Result<Arc<Engine>> {
        GLOBAL
            .get_or_init(|| Engine::load(&make_loader()).map(Arc::new))
            .clone()
    }

    /// Path of the opened library, when loaded from disk.
    pub fn library_path(&self) -> Option<&Path> {
        self.library.as_ref().map(LoadedLibrary::path)
    }

    pub(crate) fn symbols(&self) -> &Symbols {
        &self.symbols
    }

    /// Turn a status code into `Ok` or a translated engine error.
    ///
    /// Must run right after the failing call, while the caller still holds
    /// the lock that serialised it: the engine's last-error slot is not tied
    /// to a handle and the next call may overwrite it.
    pub(crate) fn check(&self, status: Status) -> Result<()> {
        if status == 0 {
            Ok(())
        } else {
            Err(self.last_error(status))
        }
    }

    /// Build the error for `code` from the engine's last-error text.
    pub fn last_error(&self, code: Status) -> Error {
        Error::from_status(code, self.last_error_message())
    }

    /// Copy of the engine's current last-error text, if any.
    pub fn last_error_message(&self) -> Option<String> {
        // Safety: the pointer is engine-owned and valid until the next
        // engine call; it is copied before returning.
        unsafe { copy_c_str((self.symbols.last_error_message)()) }
    }

    /// Reset the engine's last-error slot.
    pub fn clear_error(&self) {
        unsafe { (self.symbols.clear_error)() }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("library", &self.library_path())
            .field("symbols", &self.symbols)
            .finish()
    }
}
