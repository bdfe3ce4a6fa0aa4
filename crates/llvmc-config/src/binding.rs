//! Binding configuration (llvmc.toml, ~/.llvmc/config.toml)
//!
//! Both files share this schema. Every section and field is optional in a
//! file; missing values take the defaults below.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Fully resolved configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct BindingConfig {
    pub library: LibraryConfig,
    pub messages: MessagesConfig,
    pub jit: JitConfig,
    pub passes: PassesConfig,
    pub log: LogConfig,
}

/// Which LLVM shared library to open
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct LibraryConfig {
    /// Bare library name such as `LLVM-18`; platform prefix and suffix are added
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Explicit library file; wins over `name`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Directories searched before the platform loader's own search
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub search_paths: Vec<PathBuf>,
}

/// Decoding of strings handed back by the library
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct MessagesConfig {
    pub encoding: TextEncoding,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TextEncoding {
    /// One byte per character
    #[default]
    Latin1,
    /// UTF-8, invalid sequences replaced
    Utf8,
}

impl FromStr for TextEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "latin1" | "latin-1" | "iso-8859-1" => Ok(TextEncoding::Latin1),
            "utf8" | "utf-8" => Ok(TextEncoding::Utf8),
            other => Err(format!("expected 'latin1' or 'utf8', got '{}'", other)),
        }
    }
}

/// MCJIT settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct JitConfig {
    /// 0..=3
    pub opt_level: u32,
    pub code_model: CodeModelName,
    pub no_frame_pointer_elim: bool,
    pub fast_isel: bool,
}

impl Default for JitConfig {
    fn default() -> Self {
        Self {
            opt_level: 2,
            code_model: CodeModelName::JitDefault,
            no_frame_pointer_elim: false,
            fast_isel: false,
        }
    }
}

/// `LLVMCodeModel` by name
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CodeModelName {
    Default,
    #[default]
    JitDefault,
    Tiny,
    Small,
    Kernel,
    Medium,
    Large,
}

/// New pass manager settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct PassesConfig {
    /// Textual pipeline, e.g. `default<O2>` or `function(instcombine)`
    pub pipeline: String,
    pub verify_each: bool,
    pub debug_logging: bool,
}

impl Default for PassesConfig {
    fn default() -> Self {
        Self {
            pipeline: "default<O2>".to_string(),
            verify_each: false,
            debug_logging: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    pub level: LogLevel,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(LogLevel::Off),
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

impl BindingConfig {
    /// Load and validate a single configuration file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = read_config_file(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges the schema cannot express
    pub fn validate(&self) -> ConfigResult<()> {
        if self.jit.opt_level > 3 {
            return Err(ConfigError::InvalidValue {
                field: "jit.opt_level".to_string(),
                reason: format!("must be between 0 and 3, got {}", self.jit.opt_level),
            });
        }
        if let Some(name) = &self.library.name {
            if name.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "library.name".to_string(),
                    reason: "must not be empty".to_string(),
                });
            }
        }
        if self.passes.pipeline.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "passes.pipeline".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Render as TOML, in the same schema the loader reads
    pub fn to_toml(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

pub(crate) fn read_config_file(path: &Path) -> ConfigResult<String> {
    std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ConfigError::NotFound(path.to_path_buf())
        } else {
            ConfigError::IoError(e)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn test_parse_empty_config() {
        let config: BindingConfig = toml::from_str("").unwrap();
        assert_eq!(config, BindingConfig::default());
        assert_eq!(config.jit.opt_level, 2);
        assert_eq!(config.passes.pipeline, "default<O2>");
        assert_eq!(config.messages.encoding, TextEncoding::Latin1);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[library]
name = "LLVM-18"
path = "/opt/llvm/lib/libLLVM.so"
search_paths = ["/opt/llvm/lib", "/usr/lib/llvm-18/lib"]

[messages]
encoding = "utf8"

[jit]
opt_level = 3
code_model = "jit-default"
no_frame_pointer_elim = true
fast_isel = true

[passes]
pipeline = "function(instcombine,simplifycfg)"
verify_each = true
debug_logging = false

[log]
level = "debug"
"#;

        let config: BindingConfig = toml::from_str(toml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.library.name.as_deref(), Some("LLVM-18"));
        assert_eq!(config.library.search_paths.len(), 2);
        assert_eq!(config.messages.encoding, TextEncoding::Utf8);
        assert_eq!(config.jit.code_model, CodeModelName::JitDefault);
        assert!(config.jit.fast_isel);
        assert_eq!(config.log.level, LogLevel::Debug);
    }

    #[rstest]
    #[case("default", CodeModelName::Default)]
    #[case("jit-default", CodeModelName::JitDefault)]
    #[case("tiny", CodeModelName::Tiny)]
    #[case("small", CodeModelName::Small)]
    #[case("kernel", CodeModelName::Kernel)]
    #[case("medium", CodeModelName::Medium)]
    #[case("large", CodeModelName::Large)]
    fn test_code_model_names(#[case] name: &str, #[case] expected: CodeModelName) {
        let config: BindingConfig =
            toml::from_str(&format!("[jit]\ncode_model = \"{}\"\n", name)).unwrap();
        assert_eq!(config.jit.code_model, expected);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: Result<BindingConfig, _> = toml::from_str("[jit]\nopt = 1\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_section_rejected() {
        let result: Result<BindingConfig, _> = toml::from_str("[linker]\nname = \"lld\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_opt_level_out_of_range() {
        let config = BindingConfig {
            jit: JitConfig {
                opt_level: 4,
                ..JitConfig::default()
            },
            ..BindingConfig::default()
        };
        match config.validate() {
            Err(ConfigError::InvalidValue { field, .. }) => assert_eq!(field, "jit.opt_level"),
            other => panic!("expected InvalidValue, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_pipeline_rejected() {
        let config = BindingConfig {
            passes: PassesConfig {
                pipeline: "  ".to_string(),
                ..PassesConfig::default()
            },
            ..BindingConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[rstest]
    #[case("latin1", TextEncoding::Latin1)]
    #[case("ISO-8859-1", TextEncoding::Latin1)]
    #[case("utf-8", TextEncoding::Utf8)]
    #[case("UTF8", TextEncoding::Utf8)]
    fn test_encoding_from_str(#[case] input: &str, #[case] expected: TextEncoding) {
        assert_eq!(input.parse::<TextEncoding>().unwrap(), expected);
    }

    #[test]
    fn test_log_level_from_str() {
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("trace".parse::<LogLevel>().unwrap(), LogLevel::Trace);
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_to_toml_reparses() {
        let config = BindingConfig {
            library: LibraryConfig {
                name: Some("LLVM-17".to_string()),
                path: None,
                search_paths: vec![PathBuf::from("/opt/llvm/lib")],
            },
            ..BindingConfig::default()
        };
        let rendered = config.to_toml().unwrap();
        assert!(rendered.contains("[jit]"));
        assert!(rendered.contains("code_model = \"jit-default\""));
        let reparsed: BindingConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(reparsed, config);
    }

    #[test]
    fn test_load_missing_file() {
        let result = BindingConfig::load_from_file(Path::new("/nonexistent/llvmc.toml"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }
}
