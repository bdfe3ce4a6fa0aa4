//! Configuration and runtime shared by every command

use anyhow::{bail, Context, Result};
use llvmc_config::{BindingConfig, ConfigLoader, LoadedConfig};
use llvmc_runtime::{Llvm, RuntimeOptions, StubApi};
use std::path::PathBuf;
use std::sync::Arc;

/// Flags accepted by every command
#[derive(Debug, Clone, Default)]
pub struct GlobalArgs {
    pub library: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub stub: bool,
    pub verbose: u8,
}

pub struct Session {
    pub args: GlobalArgs,
    pub loaded: LoadedConfig,
}

impl Session {
    /// Load layered configuration, then apply CLI flags on top
    pub fn load(args: GlobalArgs) -> Result<Self> {
        let mut loader = ConfigLoader::new();
        let mut loaded = match &args.config {
            Some(path) => loader
                .load_from_file(path)
                .with_context(|| format!("Failed to load configuration: {}", path.display()))?,
            None => loader
                .load_from_directory(&std::env::current_dir()?)
                .context("Failed to load configuration")?,
        };
        if let Some(library) = &args.library {
            loaded.config.library.path = Some(library.clone());
        }
        Ok(Self { args, loaded })
    }

    pub fn config(&self) -> &BindingConfig {
        &self.loaded.config
    }

    /// Bind the configured library
    ///
    /// The stub cannot parse, verify or optimise IR, so commands that do are
    /// refused under `--stub` instead of reporting made-up results.
    pub fn runtime(&self) -> Result<Llvm> {
        if self.args.stub {
            bail!("--stub only supports the probe and config commands");
        }
        let options = RuntimeOptions::from_config(self.config());
        Llvm::load(options).context("Failed to bind the LLVM C API")
    }

    /// Bind the configured library, or the in-process stub with `--stub`
    pub fn probe_runtime(&self) -> Result<Llvm> {
        if self.args.stub {
            log::info!("using the in-process stub instead of libLLVM");
            let options = RuntimeOptions::from_config(self.config());
            return Ok(Llvm::with_api(Arc::new(StubApi::new()), options));
        }
        self.runtime()
    }
}
