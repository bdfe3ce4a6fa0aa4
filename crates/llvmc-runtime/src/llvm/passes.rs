//! New pass manager
//!
//! `LLVMRunPasses` reports failure through an `LLVMErrorRef`, which is turned
//! into the same [`NativeError::Failed`] every other native message produces.
//!
//! [`NativeError::Failed`]: crate::llvm::NativeError::Failed

use crate::ffi::abi_bool::AbiBool;
use crate::ffi::handle::{kind, TargetMachineRef};
use crate::ffi::marshal::MarshalContext;
use crate::ffi::owned::Owned;
use crate::llvm::error::{failed, NativeResult};
use crate::llvm::module::Module;

/// Pipeline settings for [`Module::run_passes`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassOptions {
    pub pipeline: String,
    pub verify_each: bool,
    pub debug_logging: bool,
}

impl Default for PassOptions {
    fn default() -> Self {
        Self {
            pipeline: "default<O2>".to_string(),
            verify_each: false,
            debug_logging: false,
        }
    }
}

impl From<&llvmc_config::PassesConfig> for PassOptions {
    fn from(config: &llvmc_config::PassesConfig) -> Self {
        Self {
            pipeline: config.pipeline.clone(),
            verify_each: config.verify_each,
            debug_logging: config.debug_logging,
        }
    }
}

impl Module<'_> {
    /// Run a textual pipeline such as `default<O2>` or
    /// `function(instcombine,simplifycfg)` over the module
    pub fn run_passes(&self, options: &PassOptions) -> NativeResult<()> {
        let module = self.handle()?;
        let native = self.native();
        let mut marshal = MarshalContext::new();
        let pipeline = marshal.c_str(&options.pipeline)?;

        let pass_options = unsafe {
            Owned::<kind::PassBuilderOptions>::create(native.clone(), |api| {
                api.create_pass_builder_options()
            })
        }?;
        let raw_options = pass_options.handle()?;
        unsafe {
            native.pass_builder_options_set_verify_each(
                raw_options,
                AbiBool::from(options.verify_each),
            );
            native.pass_builder_options_set_debug_logging(
                raw_options,
                AbiBool::from(options.debug_logging),
            );
        }

        log::debug!("running pass pipeline '{}'", options.pipeline);
        // A null target machine runs the target-independent pipeline
        let error = unsafe {
            native.run_passes(module, pipeline, TargetMachineRef::null(), raw_options)
        };
        match unsafe { native.take_error(error) } {
            None => Ok(()),
            Some(message) => Err(failed("LLVMRunPasses", Some(message))),
        }
    }
}
