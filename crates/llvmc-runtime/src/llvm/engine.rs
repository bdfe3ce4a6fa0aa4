//! MCJIT execution engine
//!
//! Options go through [`McjitCompilerOptions`]: the native side fills in its
//! defaults first (`LLVMInitializeMCJITCompilerOptions`), then the caller's
//! settings are applied and the struct is passed by reference with its size.

use crate::ffi::handle::{kind, ExecutionEngineRef};
use crate::ffi::layout::{CodeModel, McjitCompilerOptions};
use crate::ffi::marshal::MarshalContext;
use crate::ffi::owned::{LifecycleError, Owned};
use crate::ffi::AbiBool;
use crate::llvm::error::{failed, NativeError, NativeResult};
use crate::llvm::module::Module;
use std::marker::PhantomData;

/// Settings applied on top of the native MCJIT defaults
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JitOptions {
    pub opt_level: u32,
    pub code_model: CodeModel,
    pub no_frame_pointer_elim: bool,
    pub fast_isel: bool,
}

impl Default for JitOptions {
    fn default() -> Self {
        Self {
            opt_level: 2,
            code_model: CodeModel::JitDefault,
            no_frame_pointer_elim: false,
            fast_isel: false,
        }
    }
}

impl From<&llvmc_config::JitConfig> for JitOptions {
    fn from(config: &llvmc_config::JitConfig) -> Self {
        Self {
            opt_level: config.opt_level,
            code_model: config.code_model.into(),
            no_frame_pointer_elim: config.no_frame_pointer_elim,
            fast_isel: config.fast_isel,
        }
    }
}

impl JitOptions {
    fn apply(&self, raw: &mut McjitCompilerOptions) {
        raw.opt_level = self.opt_level;
        raw.code_model = self.code_model;
        raw.no_frame_pointer_elim = AbiBool::from(self.no_frame_pointer_elim);
        raw.enable_fast_isel = AbiBool::from(self.fast_isel);
    }
}

/// An execution engine that owns the module it compiles
#[derive(Debug)]
pub struct ExecutionEngine<'ctx> {
    inner: Owned<kind::ExecutionEngine>,
    _context: PhantomData<&'ctx ()>,
}

impl<'ctx> ExecutionEngine<'ctx> {
    /// Create an MCJIT engine for `module`
    ///
    /// The module moves to the native side before the call and is released by
    /// it whether creation succeeds or not. Call
    /// [`crate::runtime::Llvm::link_in_mcjit`] and
    /// [`crate::runtime::Llvm::initialize_native_target`] first.
    pub fn create(module: Module<'ctx>, options: &JitOptions) -> NativeResult<Self> {
        let native = module.native();
        let mut raw_options = McjitCompilerOptions::default();
        unsafe {
            native.initialize_mcjit_compiler_options(&mut raw_options, McjitCompilerOptions::SIZE)
        };
        options.apply(&mut raw_options);

        let module = module.into_raw()?;
        let mut engine = ExecutionEngineRef::null();
        let (status, message) = native.call_with_message(|out| unsafe {
            native.create_mcjit_compiler_for_module(
                &mut engine,
                module,
                &mut raw_options,
                McjitCompilerOptions::SIZE,
                out,
            )
        });
        if status.get() {
            return Err(failed("LLVMCreateMCJITCompilerForModule", message));
        }
        log::debug!("created MCJIT engine at O{}", options.opt_level);

        let inner = unsafe { Owned::adopt(native.clone(), engine) }?;
        Ok(Self {
            inner,
            _context: PhantomData,
        })
    }

    pub fn handle(&self) -> Result<ExecutionEngineRef, LifecycleError> {
        self.inner.handle()
    }

    /// Address of a compiled function
    pub fn function_address(&self, name: &str) -> NativeResult<u64> {
        let engine = self.inner.handle()?;
        let mut marshal = MarshalContext::new();
        let c_name = marshal.c_str(name)?;
        match unsafe { self.inner.native().get_function_address(engine, c_name) } {
            0 => Err(NativeError::NotFound {
                what: format!("function '{}'", name),
            }),
            address => Ok(address),
        }
    }

    /// Release the engine and the module it owns. Idempotent.
    pub fn dispose(&mut self) {
        self.inner.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::marshal::MessageEncoding;
    use crate::ffi::stub::StubApi;
    use crate::ffi::Native;
    use crate::llvm::context::{AsContext, Context};
    use std::sync::Arc;

    fn setup() -> (Arc<StubApi>, Native) {
        let stub = Arc::new(StubApi::new());
        let native = Native::new(stub.clone(), MessageEncoding::Latin1);
        (stub, native)
    }

    fn module_with_main(ctx: &Context) -> Module<'_> {
        let module = ctx.create_module("jit").unwrap();
        let i32_ty = ctx.int_type(32).unwrap();
        let main = module
            .add_function("main", ctx.function_type(i32_ty, &[], false).unwrap())
            .unwrap();
        {
            let builder = module.create_builder().unwrap();
            builder
                .position_at_end(ctx.append_basic_block(main, "entry").unwrap())
                .unwrap();
            builder.build_ret(i32_ty.const_int(42, false).unwrap()).unwrap();
        }
        let void_ty = ctx.void_type().unwrap();
        module
            .add_function("declared", ctx.function_type(void_ty, &[], false).unwrap())
            .unwrap();
        module
    }

    #[test]
    fn test_options_reach_native_side() {
        let (stub, native) = setup();
        let ctx = Context::new(&native).unwrap();
        let options = JitOptions {
            opt_level: 3,
            code_model: CodeModel::Small,
            no_frame_pointer_elim: true,
            fast_isel: true,
        };
        let engine = ExecutionEngine::create(module_with_main(&ctx), &options).unwrap();
        let settings = stub.last_jit_settings().unwrap();
        assert_eq!(settings.opt_level, 3);
        assert_eq!(settings.code_model, CodeModel::Small);
        assert!(settings.no_frame_pointer_elim);
        assert!(settings.fast_isel);
        assert_ne!(engine.function_address("main").unwrap(), 0);
        assert!(matches!(
            engine.function_address("missing"),
            Err(NativeError::NotFound { .. })
        ));
        // Declarations have no code
        assert!(matches!(
            engine.function_address("declared"),
            Err(NativeError::NotFound { .. })
        ));
    }

    #[test]
    fn test_engine_owns_module() {
        let (stub, native) = setup();
        let ctx = Context::new(&native).unwrap();
        let engine = ExecutionEngine::create(module_with_main(&ctx), &JitOptions::default()).unwrap();
        drop(engine);
        assert_eq!(stub.count("LLVMDisposeExecutionEngine"), 1);
        assert_eq!(stub.count("LLVMDisposeModule"), 0);
        assert_eq!(stub.double_releases(), 0);
    }

    #[test]
    fn test_failed_creation_consumes_module() {
        let (stub, native) = setup();
        stub.fail_next(
            "LLVMCreateMCJITCompilerForModule",
            "Unable to find target for this triple (no targets are registered)",
        );
        let ctx = Context::new(&native).unwrap();
        let err = ExecutionEngine::create(module_with_main(&ctx), &JitOptions::default()).unwrap_err();
        assert_eq!(
            err.message(),
            Some("Unable to find target for this triple (no targets are registered)")
        );
        assert_eq!(stub.count("LLVMDisposeModule"), 0);
        assert_eq!(stub.live_messages(), 0);
        assert_eq!(stub.stale_handles(), 0);
        drop(ctx);
        // Only the context is left to release, and it was
        assert_eq!(stub.live_resources(), 0);
    }
}
