//! Engine Library Loader
//!
//! Picks the engine binary for the running platform, materialises it on disk
//! if it was handed over as bytes, and opens it with libloading.

use std::path::{Path, PathBuf};

use libloading::Library;
use tempfile::TempDir;
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::{Error, Result};

/// Environment variable naming the engine binary or a directory holding it.
pub const ENV_LIBRARY_PATH: &str = "KJARNI_LIB_PATH";

/// File name of the engine binary for the running platform.
pub fn platform_library_name() -> Result<&'static str> {
    library_name_for(std::env::consts::OS, std::env::consts::ARCH)
}

/// File name of the engine binary for `os`/`arch`, as reported by
/// `std::env::consts`.
pub fn library_name_for(os: &str, arch: &str) -> Result<&'static str> {
    match (os, arch) {
        ("linux", "x86_64") | ("linux", "aarch64") => Ok("libkjarni_ffi.so"),
        ("macos", "x86_64") | ("macos", "aarch64") => Ok("libkjarni_ffi.dylib"),
        ("windows", "x86_64") => Ok("kjarni_ffi.dll"),
        _ => Err(Error::UnsupportedPlatform {
            os: os.to_string(),
            arch: arch.to_string(),
        }),
    }
}

/// An opened engine library.
///
/// Field order matters: the library is closed before an extraction
/// directory is removed.
pub struct LoadedLibrary {
    library: Library,
    path: PathBuf,
    _extracted: Option<TempDir>,
}

impl LoadedLibrary {
    /// Path the library was opened from
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn library(&self) -> &Library {
        &self.library
    }
}

impl std::fmt::Debug for LoadedLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedLibrary")
            .field("path", &self.path)
            .finish()
    }
}

/// Locates and opens the engine library.
///
/// Candidates are tried in order: an explicit path, an embedded payload, then
/// the search paths.
#[derive(Debug, Clone)]
pub struct LibraryLoader {
    library_path: Option<PathBuf>,
    embedded: Option<&'static [u8]>,
    search_paths: Vec<PathBuf>,
}

impl LibraryLoader {
    /// Loader with the platform's default search paths only.
    ///
    /// The environment is not consulted here; `KJARNI_LIB_PATH` is folded
    /// into the config by [`KjarniConfig::with_env_overrides`].
    ///
    /// [`KjarniConfig::with_env_overrides`]: crate::config::KjarniConfig::with_env_overrides
    pub fn new() -> Self {
        Self {
            library_path: None,
            embedded: None,
            search_paths: default_search_paths(),
        }
    }

    /// Loader honouring the `[engine]` section of `kjarni.toml`.
    ///
    /// Config search paths are tried before the defaults. When the config
    /// went through the env overrides, a `KJARNI_LIB_PATH` file has already
    /// replaced the file's `library_path`.
    pub fn from_config(config: &EngineConfig) -> Self {
        let mut loader = Self::new();
        if let Some(path) = &config.library_path {
            loader.library_path = Some(path.clone());
        }
        for (i, path) in config.search_paths.iter().enumerate() {
            loader.search_paths.insert(i, path.clone());
        }
        loader
    }

    /// Use exactly this binary.
    pub fn with_library_path(mut self, path: impl AsRef<Path>) -> Self {
        self.library_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Use a binary carried in memory; it is written to a temp dir on load.
    pub fn with_embedded(mut self, bytes: &'static [u8]) -> Self {
        self.embedded = Some(bytes);
        self
    }

    /// Add a search path
    pub fn add_search_path(&mut self, path: impl AsRef<Path>) {
        self.search_paths.push(path.as_ref().to_path_buf());
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Find the engine binary on disk without opening it.
    pub fn find_library(&self) -> Result<PathBuf> {
        if let Some(path) = &self.library_path {
            if path.is_file() {
                return Ok(path.clone());
            }
            return Err(Error::LoadFailed {
                path: path.display().to_string(),
                message: "file does not exist".to_string(),
            });
        }

        let name = platform_library_name()?;
        self.search_paths
            .iter()
            .map(|dir| dir.join(name))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| Error::LoadFailed {
                path: name.to_string(),
                message: format!(
                    "not found in {} search paths (set {} to the engine binary)",
                    self.search_paths.len(),
                    ENV_LIBRARY_PATH
                ),
            })
    }

    /// Locate, materialise if needed, and open the engine library.
    pub fn load(&self) -> Result<LoadedLibrary> {
        if self.library_path.is_none() {
            if let Some(bytes) = self.embedded {
                let name = platform_library_name()?;
                let (dir, path) = extract(bytes, name)?;
                let library = open(&path)?;
                return Ok(LoadedLibrary {
                    library,
                    path,
                    _extracted: Some(dir),
                });
            }
        }

        let path = self.find_library()?;
        let library = open(&path)?;
        Ok(LoadedLibrary {
            library,
            path,
            _extracted: None,
        })
    }
}

impl Default for LibraryLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Write an embedded binary to a fresh `kjarni-*` temp directory.
fn extract(bytes: &[u8], file_name: &str) -> Result<(TempDir, PathBuf)> {
    let dir = tempfile::Builder::new()
        .prefix("kjarni-")
        .tempdir()
        .map_err(|e| Error::ExtractionFailed(format!("creating temp dir: {}", e)))?;

    let path = dir.path().join(file_name);
    std::fs::write(&path, bytes)
        .map_err(|e| Error::ExtractionFailed(format!("writing {}: {}", path.display(), e)))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).map_err(|e| {
            Error::ExtractionFailed(format!("setting permissions on {}: {}", path.display(), e))
        })?;
    }

    debug!(path = %path.display(), bytes = bytes.len(), "extracted engine library");
    Ok((dir, path))
}

fn open(path: &Path) -> Result<Library> {
    // Safety: loading a library runs its initialisers. The caller chose this
    // binary as the engine.
    let result = unsafe { open_raw(path) };
    result.map_err(|e| Error::LoadFailed {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

#[cfg(unix)]
unsafe fn open_raw(path: &Path) -> std::result::Result<Library, libloading::Error> {
    use libloading::os::unix::{Library as UnixLibrary, RTLD_GLOBAL, RTLD_NOW};
    UnixLibrary::open(Some(path), RTLD_NOW | RTLD_GLOBAL).map(Library::from)
}

#[cfg(not(unix))]
unsafe fn open_raw(path: &Path) -> std::result::Result<Library, libloading::Error> {
    Library::new(path)
}

/// Get the default library search paths for this platform
fn default_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // Next to the running executable, then the current directory
    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        paths.push(dir);
    }
    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd);
    }

    #[cfg(target_os = "linux")]
    {
        paths.push(PathBuf::from("/usr/local/lib"));
        paths.push(PathBuf::from("/usr/lib"));
        paths.push(PathBuf::from("/usr/lib64"));

        if let Ok(ld_path) = std::env::var("LD_LIBRARY_PATH") {
            paths.extend(ld_path.split(':').filter(|p| !p.is_empty()).map(PathBuf::from));
        }
    }

    #[cfg(target_os = "macos")]
    {
        paths.push(PathBuf::from("/usr/local/lib"));
        paths.push(PathBuf::from("/opt/homebrew/lib"));

        if let Ok(dyld_path) = std::env::var("DYLD_LIBRARY_PATH") {
            paths.extend(dyld_path.split(':').filter(|p| !p.is_empty()).map(PathBuf::from));
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Ok(path) = std::env::var("PATH") {
            paths.extend(path.split(';').filter(|p| !p.is_empty()).map(PathBuf::from));
        }
    }

    paths
}
