//! llvmc configuration
//!
//! Settings for binding the LLVM C API: which library to open, how native
//! text is decoded, MCJIT options and the default pass pipeline.
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded and merged in the following order (later overrides earlier):
//! 1. Global config (~/.llvmc/config.toml)
//! 2. Project config (llvmc.toml, found by walking up from the start directory)
//! 3. Environment variables (LLVMC_*)
//! 4. CLI flags (applied by the caller)
//!
//! # Example
//!
//! ```no_run
//! use llvmc_config::ConfigLoader;
//! use std::path::Path;
//!
//! let mut loader = ConfigLoader::new();
//! let loaded = loader.load_from_directory(Path::new(".")).unwrap();
//! println!("opt level {}", loaded.config.jit.opt_level);
//! ```

pub mod binding;
pub mod loader;

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Home directory not found")]
    HomeNotFound,
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

// Re-export main types
pub use binding::{
    BindingConfig, CodeModelName, JitConfig, LibraryConfig, LogConfig, LogLevel, MessagesConfig,
    PassesConfig, TextEncoding,
};
pub use loader::{ConfigLoader, LoadedConfig, PROJECT_FILE_NAME};
