//! Locating and opening the LLVM shared library
//!
//! Resolution order:
//! - an explicit path is used as is and must exist
//! - otherwise each configured search directory is tried with every candidate
//!   file name
//! - finally the bare candidate names go to the platform dynamic loader, which
//!   applies its own search rules (`LD_LIBRARY_PATH`, `DYLD_LIBRARY_PATH`, `PATH`)

use libloading::Library;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Library loading errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("LLVM library not found: {0}")]
    LibraryNotFound(String),

    #[error("failed to load LLVM library: {0}")]
    LoadFailed(String),

    #[error("symbol '{symbol}' not found in library '{library}'")]
    SymbolNotFound { library: String, symbol: String },
}

// Versioned names tried after the unversioned one, newest first
const KNOWN_MAJOR_VERSIONS: &[u32] = &[19, 18, 17, 16];

/// Which library to open
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibrarySpec {
    /// Explicit file to open
    pub path: Option<PathBuf>,
    /// Bare library name, such as `LLVM-18`; platform prefix and suffix are added
    pub name: Option<String>,
    /// Directories tried before the platform loader's own search
    pub search_paths: Vec<PathBuf>,
}

impl LibrarySpec {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_search_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_paths.push(dir.into());
        self
    }

    /// File names to look for, most specific first
    pub fn candidates(&self) -> Vec<String> {
        match &self.name {
            Some(name) => vec![platform_file_name(name)],
            None => {
                let mut names = vec![platform_file_name(default_stem())];
                if !cfg!(target_os = "windows") {
                    names.extend(
                        KNOWN_MAJOR_VERSIONS
                            .iter()
                            .map(|major| platform_file_name(&format!("LLVM-{}", major))),
                    );
                }
                names
            }
        }
    }
}

impl From<&llvmc_config::LibraryConfig> for LibrarySpec {
    fn from(config: &llvmc_config::LibraryConfig) -> Self {
        Self {
            path: config.path.clone(),
            name: config.name.clone(),
            search_paths: config.search_paths.clone(),
        }
    }
}

fn default_stem() -> &'static str {
    if cfg!(target_os = "windows") {
        "LLVM-C"
    } else {
        "LLVM"
    }
}

/// Platform file name for a bare library name
///
/// - Linux: `lib{name}.so`
/// - macOS: `lib{name}.dylib`
/// - Windows: `{name}.dll`
///
/// Names that already carry an extension are returned unchanged.
pub fn platform_file_name(name: &str) -> String {
    let has_extension = [".so", ".dylib", ".dll"]
        .iter()
        .any(|ext| name.ends_with(ext) || name.contains(&format!("{}.", ext)));
    if has_extension {
        return name.to_string();
    }
    if cfg!(target_os = "windows") {
        format!("{}.dll", name)
    } else if cfg!(target_os = "macos") {
        format!("lib{}.dylib", name)
    } else {
        format!("lib{}.so", name)
    }
}

/// Resolves a [`LibrarySpec`] to an opened library
pub struct LibraryLoader<'a> {
    spec: &'a LibrarySpec,
}

impl<'a> LibraryLoader<'a> {
    pub fn new(spec: &'a LibrarySpec) -> Self {
        Self { spec }
    }

    /// First existing file under the configured search directories
    pub fn find_in_search_paths(&self) -> Option<PathBuf> {
        let candidates = self.spec.candidates();
        self.spec.search_paths.iter().find_map(|dir| {
            candidates
                .iter()
                .map(|file| dir.join(file))
                .find(|full| full.is_file())
        })
    }

    /// Open the library
    ///
    /// # Safety
    ///
    /// Loading a dynamic library runs its initialisation code in this process.
    /// The caller must trust the library.
    pub unsafe fn open(&self) -> Result<(PathBuf, Library), LoadError> {
        if let Some(path) = &self.spec.path {
            return open_file(path).map(|lib| (path.clone(), lib));
        }

        if let Some(path) = self.find_in_search_paths() {
            log::debug!("found LLVM library at {}", path.display());
            return open_file(&path).map(|lib| (path, lib));
        }

        let candidates = self.spec.candidates();
        let mut failures = Vec::new();
        for file in &candidates {
            match Library::new(file) {
                Ok(library) => {
                    log::debug!("platform loader resolved {}", file);
                    return Ok((PathBuf::from(file), library));
                }
                Err(e) => {
                    log::trace!("platform loader rejected {}: {}", file, e);
                    failures.push(file.as_str());
                }
            }
        }
        Err(LoadError::LibraryNotFound(failures.join(", ")))
    }
}

unsafe fn open_file(path: &Path) -> Result<Library, LoadError> {
    if !path.exists() {
        return Err(LoadError::LibraryNotFound(path.display().to_string()));
    }
    Library::new(path).map_err(|e| LoadError::LoadFailed(format!("{}: {}", path.display(), e)))
}
