//! Configuration Loader
//!
//! Handles loading and merging configuration from multiple sources with proper precedence.
//! Files are merged key by key, so a project file that only sets `jit.opt_level`
//! keeps every other value from the global file.

use crate::binding::{read_config_file, BindingConfig, LogLevel, TextEncoding};
use crate::{ConfigError, ConfigResult};
use std::env;
use std::path::{Path, PathBuf};

/// Project configuration file name, looked up from the start directory upwards
pub const PROJECT_FILE_NAME: &str = "llvmc.toml";

/// Configuration loader
///
/// Loads configuration from multiple sources and merges them with proper precedence:
/// 1. Global config (~/.llvmc/config.toml) - lowest priority
/// 2. Project config (llvmc.toml) - overrides global
/// 3. Environment variables (LLVMC_*) - overrides project
/// 4. CLI flags - highest priority (handled by caller)
pub struct ConfigLoader {
    /// Cached global config path
    global_config_path: Option<PathBuf>,
}

/// Merged configuration result
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: BindingConfig,

    /// Files that contributed, lowest priority first
    pub sources: Vec<PathBuf>,

    /// Directory where llvmc.toml was found
    pub project_root: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            global_config_path: None,
        }
    }

    /// Use `path` instead of ~/.llvmc/config.toml
    pub fn with_global_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.global_config_path = Some(path.into());
        self
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find llvmc.toml, merges it over the
    /// global config if one exists, then applies environment overrides.
    pub fn load_from_directory(&mut self, start_dir: &Path) -> ConfigResult<LoadedConfig> {
        let project_file = find_project_file(start_dir);
        let mut loaded = self.load_layers(project_file.as_deref())?;
        loaded.project_root = project_file
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf);
        Ok(loaded)
    }

    /// Load configuration from a specific project config file
    pub fn load_from_file(&mut self, config_path: &Path) -> ConfigResult<LoadedConfig> {
        if !config_path.exists() {
            return Err(ConfigError::NotFound(config_path.to_path_buf()));
        }
        let mut loaded = self.load_layers(Some(config_path))?;
        loaded.project_root = config_path.parent().map(|p| p.to_path_buf());
        Ok(loaded)
    }

    fn load_layers(&mut self, project_file: Option<&Path>) -> ConfigResult<LoadedConfig> {
        let mut merged = toml::Table::new();
        let mut sources = Vec::new();

        let global = self.global_config_path()?;
        // Global config is optional - if it doesn't exist, it contributes nothing
        if global.exists() {
            merge_layer(&mut merged, read_layer(&global)?);
            sources.push(global);
        }
        if let Some(path) = project_file {
            merge_layer(&mut merged, read_layer(path)?);
            sources.push(path.to_path_buf());
        }

        let config: BindingConfig =
            toml::Value::Table(merged)
                .try_into()
                .map_err(|e| ConfigError::TomlParseError {
                    file: sources.last().cloned().unwrap_or_default(),
                    error: e,
                })?;
        let config = apply_env_overrides(config)?;
        config.validate()?;

        Ok(LoadedConfig {
            config,
            sources,
            project_root: None,
        })
    }

    fn global_config_path(&mut self) -> ConfigResult<PathBuf> {
        if let Some(path) = &self.global_config_path {
            return Ok(path.clone());
        }
        let path = Self::global_config_dir()?.join("config.toml");
        self.global_config_path = Some(path.clone());
        Ok(path)
    }

    /// Get the global configuration directory (~/.llvmc)
    pub fn global_config_dir() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".llvmc"))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadedConfig {
    /// Check if a project file was found
    pub fn is_project(&self) -> bool {
        self.project_root.is_some()
    }
}

fn find_project_file(start_dir: &Path) -> Option<PathBuf> {
    start_dir
        .ancestors()
        .map(|dir| dir.join(PROJECT_FILE_NAME))
        .find(|candidate| candidate.is_file())
}

/// Read one file as a raw table, after checking it against the schema
fn read_layer(path: &Path) -> ConfigResult<toml::Table> {
    let content = read_config_file(path)?;
    let parse_error = |error: toml::de::Error| ConfigError::TomlParseError {
        file: path.to_path_buf(),
        error,
    };
    let typed: BindingConfig = toml::from_str(&content).map_err(parse_error)?;
    typed.validate()?;
    toml::from_str(&content).map_err(parse_error)
}

/// Overlay one configuration layer onto the layers below it
///
/// `library.path` wins over `library.name`, so a layer that names a library
/// without giving a path drops any path inherited from below.
fn merge_layer(base: &mut toml::Table, layer: toml::Table) {
    let names_library = layer
        .get("library")
        .and_then(toml::Value::as_table)
        .is_some_and(|library| library.contains_key("name") && !library.contains_key("path"));
    if names_library {
        if let Some(toml::Value::Table(library)) = base.get_mut("library") {
            library.remove("path");
        }
    }
    merge_tables(base, layer);
}

/// Overlay `overlay` onto `base`; nested tables merge, everything else replaces
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        if let toml::Value::Table(incoming) = value {
            if let Some(toml::Value::Table(existing)) = base.get_mut(&key) {
                merge_tables(existing, incoming);
                continue;
            }
            base.insert(key, toml::Value::Table(incoming));
        } else {
            base.insert(key, value);
        }
    }
}

/// Apply environment variable overrides
///
/// - `LLVMC_LIBRARY`: a path (anything with a separator) or a bare library name
/// - `LLVMC_MESSAGE_ENCODING`: `latin1` or `utf8`
/// - `LLVMC_OPT_LEVEL`: 0..=3
/// - `LLVMC_LOG`: log level
fn apply_env_overrides(mut config: BindingConfig) -> ConfigResult<BindingConfig> {
    if let Some(library) = env_var("LLVMC_LIBRARY") {
        if library.contains('/') || library.contains('\\') {
            config.library.path = Some(PathBuf::from(library));
        } else {
            config.library.name = Some(library);
            config.library.path = None;
        }
    }

    if let Some(encoding) = env_var("LLVMC_MESSAGE_ENCODING") {
        config.messages.encoding = encoding
            .parse::<TextEncoding>()
            .map_err(|reason| invalid("LLVMC_MESSAGE_ENCODING", reason))?;
    }

    if let Some(level) = env_var("LLVMC_OPT_LEVEL") {
        config.jit.opt_level = level.trim().parse().map_err(|_| {
            invalid(
                "LLVMC_OPT_LEVEL",
                format!("expected a number between 0 and 3, got '{}'", level),
            )
        })?;
    }

    if let Some(level) = env_var("LLVMC_LOG") {
        config.log.level = level
            .parse::<LogLevel>()
            .map_err(|reason| invalid("LLVMC_LOG", reason))?;
    }

    Ok(config)
}

// Unset and empty are the same
fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn invalid(field: &str, reason: String) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason,
    }
}
