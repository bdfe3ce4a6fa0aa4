//! Modules

use crate::ffi::api::Native;
use crate::ffi::handle::{kind, ContextRef, ModuleRef};
use crate::ffi::layout::VerifierFailureAction;
use crate::ffi::marshal::{copy_c_str, MarshalContext};
use crate::ffi::owned::{LifecycleError, Owned};
use crate::llvm::builder::Builder;
use crate::llvm::error::{failed, NativeError, NativeResult};
use crate::llvm::types::Type;
use crate::llvm::values::Value;
use std::path::Path;

/// An owned module, borrowing the context it was created in
///
/// Functions and everything inside them borrow the module, so none of them
/// can be used once it is gone:
///
/// ```compile_fail,E0505
/// use llvmc_runtime::llvm::AsContext;
/// use llvmc_runtime::runtime::Llvm;
///
/// let llvm = Llvm::shared().unwrap();
/// let context = llvm.create_context().unwrap();
/// let module = context.create_module("m").unwrap();
/// let fn_ty = context
///     .function_type(context.void_type().unwrap(), &[], false)
///     .unwrap();
/// let f = module.add_function("f", fn_ty).unwrap();
/// drop(module);
/// println!("{}", f.name());
/// ```
#[derive(Debug)]
pub struct Module<'ctx> {
    inner: Owned<kind::Module>,
    context: ContextRef,
    native: &'ctx Native,
}

impl<'ctx> Module<'ctx> {
    pub(crate) fn new(native: &'ctx Native, context: ContextRef, name: &str) -> NativeResult<Self> {
        let mut marshal = MarshalContext::new();
        let name = marshal.c_str(name)?;
        // SAFETY: a fresh module owned by the caller
        let inner = unsafe {
            Owned::create(native.clone(), |api| {
                api.module_create_with_name_in_context(name, context)
            })
        }?;
        Ok(Self {
            inner,
            context,
            native,
        })
    }

    /// Take ownership of a module produced by another native call
    pub(crate) fn adopt(
        native: &'ctx Native,
        context: ContextRef,
        handle: ModuleRef,
    ) -> NativeResult<Self> {
        let inner = unsafe { Owned::adopt(native.clone(), handle) }?;
        Ok(Self {
            inner,
            context,
            native,
        })
    }

    pub fn handle(&self) -> Result<ModuleRef, LifecycleError> {
        self.inner.handle()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }

    /// Release now instead of at drop. Idempotent.
    pub fn dispose(&mut self) {
        self.inner.dispose();
    }

    pub(crate) fn native(&self) -> &'ctx Native {
        self.native
    }

    /// Hand the module to a native call that takes ownership of it
    pub(crate) fn into_raw(self) -> Result<ModuleRef, LifecycleError> {
        self.inner.into_raw()
    }

    /// Textual IR
    pub fn print_to_string(&self) -> NativeResult<String> {
        let module = self.handle()?;
        // SAFETY: the returned buffer is owned by us and released by `take_message`
        unsafe {
            self.native
                .take_message(self.native.print_module_to_string(module))
        }
        .ok_or_else(|| failed("LLVMPrintModuleToString", None))
    }

    pub fn print_to_file(&self, path: &Path) -> NativeResult<()> {
        let module = self.handle()?;
        let mut marshal = MarshalContext::new();
        let filename = marshal.c_str(&path.to_string_lossy())?;
        let (status, message) = self.native.call_with_message(|out| unsafe {
            self.native.print_module_to_file(module, filename, out)
        });
        if status.get() {
            return Err(failed("LLVMPrintModuleToFile", message));
        }
        Ok(())
    }

    /// Run the IR verifier
    ///
    /// The native message is returned verbatim in [`NativeError::Failed`].
    pub fn verify(&self) -> NativeResult<()> {
        let module = self.handle()?;
        let (broken, message) = self.native.call_with_message(|out| unsafe {
            self.native
                .verify_module(module, VerifierFailureAction::ReturnStatus, out)
        });
        if broken.get() {
            return Err(failed("LLVMVerifyModule", message));
        }
        Ok(())
    }

    pub fn set_target(&self, triple: &str) -> NativeResult<()> {
        let module = self.handle()?;
        let mut marshal = MarshalContext::new();
        let triple = marshal.c_str(triple)?;
        unsafe { self.native.set_target(module, triple) };
        Ok(())
    }

    /// Target triple; empty when unset
    pub fn target(&self) -> NativeResult<String> {
        let module = self.handle()?;
        // Borrowed from the module: copied, never released
        let triple = unsafe { copy_c_str(self.native.get_target(module), self.native.encoding()) };
        Ok(triple.unwrap_or_default())
    }

    pub fn set_data_layout(&self, layout: &str) -> NativeResult<()> {
        let module = self.handle()?;
        let mut marshal = MarshalContext::new();
        let layout = marshal.c_str(layout)?;
        unsafe { self.native.set_data_layout(module, layout) };
        Ok(())
    }

    pub fn add_function(&self, name: &str, function_type: Type<'ctx>) -> NativeResult<Value<'_>> {
        let module = self.handle()?;
        let mut marshal = MarshalContext::new();
        let name = marshal.c_str(name)?;
        let raw = unsafe {
            self.native
                .add_function(module, name, function_type.handle())
        };
        Value::new(self.native, raw)
    }

    /// `LLVMGetNamedFunction`; `None` when absent
    pub fn get_function(&self, name: &str) -> NativeResult<Option<Value<'_>>> {
        let module = self.handle()?;
        let mut marshal = MarshalContext::new();
        let c_name = marshal.c_str(name)?;
        let raw = unsafe { self.native.get_named_function(module, c_name) };
        if raw.is_null() {
            return Ok(None);
        }
        Value::new(self.native, raw).map(Some)
    }

    pub fn function(&self, name: &str) -> NativeResult<Value<'_>> {
        self.get_function(name)?.ok_or_else(|| NativeError::NotFound {
            what: format!("function '{}'", name),
        })
    }

    /// A builder for instructions in this module's functions
    pub fn create_builder(&self) -> NativeResult<Builder<'_>> {
        self.handle()?;
        Builder::new(self.native, self.context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::marshal::MessageEncoding;
    use crate::ffi::stub::StubApi;
    use crate::llvm::context::{AsContext, Context};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn setup() -> (Arc<StubApi>, Native) {
        let stub = Arc::new(StubApi::new());
        let native = Native::new(stub.clone(), MessageEncoding::Latin1);
        (stub, native)
    }

    #[test]
    fn test_print_releases_message() {
        let (stub, native) = setup();
        let ctx = Context::new(&native).unwrap();
        let module = ctx.create_module("printed").unwrap();
        let text = module.print_to_string().unwrap();
        assert!(text.starts_with("; ModuleID = 'printed'"));
        assert_eq!(stub.count("LLVMDisposeMessage"), 1);
        assert_eq!(stub.live_messages(), 0);
    }

    #[test]
    fn test_verify_success_releases_empty_message() {
        let (stub, native) = setup();
        let ctx = Context::new(&native).unwrap();
        let module = ctx.create_module("ok").unwrap();
        module.verify().unwrap();
        assert_eq!(stub.count("LLVMDisposeMessage"), 1);
        assert_eq!(stub.live_messages(), 0);
    }

    #[test]
    fn test_verify_failure_carries_message() {
        let (stub, native) = setup();
        stub.fail_next("LLVMVerifyModule", "Broken module found, compilation aborted!");
        let ctx = Context::new(&native).unwrap();
        let module = ctx.create_module("broken").unwrap();
        let err = module.verify().unwrap_err();
        assert_eq!(err.message(), Some("Broken module found, compilation aborted!"));
        assert_eq!(stub.live_messages(), 0);
    }

    #[test]
    fn test_target_and_layout() {
        let (stub, native) = setup();
        let ctx = Context::new(&native).unwrap();
        let module = ctx.create_module("target").unwrap();
        assert_eq!(module.target().unwrap(), "");
        module.set_target("aarch64-apple-darwin").unwrap();
        module.set_data_layout("e-m:o-i64:64-i128:128-n32:64-S128").unwrap();
        assert_eq!(module.target().unwrap(), "aarch64-apple-darwin");
        // Borrowed strings are never released
        assert_eq!(stub.count("LLVMDisposeMessage"), 0);
        let layout = stub.calls_to("LLVMSetDataLayout").remove(0);
        assert_eq!(
            layout.text.as_deref(),
            Some("e-m:o-i64:64-i128:128-n32:64-S128")
        );
    }

    #[test]
    fn test_named_function_lookup() {
        let (_stub, native) = setup();
        let ctx = Context::new(&native).unwrap();
        let module = ctx.create_module("lookup").unwrap();
        let fn_ty = ctx.function_type(ctx.void_type().unwrap(), &[], false).unwrap();
        let f = module.add_function("present", fn_ty).unwrap();
        assert_eq!(module.get_function("present").unwrap(), Some(f));
        assert_eq!(module.get_function("absent").unwrap(), None);
        assert!(matches!(
            module.function("absent"),
            Err(NativeError::NotFound { .. })
        ));
    }

    #[test]
    fn test_functions_released_with_module() {
        let (stub, native) = setup();
        let ctx = Context::new(&native).unwrap();
        let module = ctx.create_module("owner").unwrap();
        let i32_ty = ctx.int_type(32).unwrap();
        let fn_ty = ctx.function_type(i32_ty, &[i32_ty], false).unwrap();
        let (function, param, block) = {
            let f = module.add_function("f", fn_ty).unwrap();
            let entry = ctx.append_basic_block(f, "entry").unwrap();
            (f.handle(), f.param(0).unwrap().handle(), entry.handle())
        };
        assert!(stub.is_live(function));

        drop(module);
        assert!(!stub.is_live(function));
        assert!(!stub.is_live(param));
        assert!(!stub.is_live(block));
        assert_eq!(stub.stale_handles(), 0);
        // Context-owned objects survive the module
        assert!(stub.is_live(i32_ty.handle()));
    }

    #[test]
    fn test_builder_comes_from_live_module() {
        let (stub, native) = setup();
        let ctx = Context::new(&native).unwrap();
        let mut module = ctx.create_module("built").unwrap();
        module.create_builder().unwrap();
        module.dispose();
        assert!(matches!(
            module.create_builder(),
            Err(NativeError::Lifecycle(LifecycleError::UseAfterDispose { kind: "module" }))
        ));
        assert_eq!(stub.count("LLVMCreateBuilderInContext"), 1);
        assert_eq!(stub.count("LLVMDisposeBuilder"), 1);
    }

    #[test]
    fn test_interior_nul_rejected_before_native_call() {
        let (stub, native) = setup();
        let ctx = Context::new(&native).unwrap();
        assert!(matches!(
            ctx.create_module("bad\0name"),
            Err(NativeError::Marshal(_))
        ));
        assert_eq!(stub.count("LLVMModuleCreateWithNameInContext"), 0);
    }

    #[test]
    fn test_use_after_dispose() {
        let (stub, native) = setup();
        let ctx = Context::new(&native).unwrap();
        let mut module = ctx.create_module("gone").unwrap();
        module.dispose();
        module.dispose();
        assert!(matches!(
            module.print_to_string(),
            Err(NativeError::Lifecycle(LifecycleError::UseAfterDispose { kind: "module" }))
        ));
        assert_eq!(stub.count("LLVMDisposeModule"), 1);
        assert_eq!(stub.count("LLVMPrintModuleToString"), 0);
    }

    #[test]
    fn test_print_to_file() {
        let (_stub, native) = setup();
        let ctx = Context::new(&native).unwrap();
        let module = ctx.create_module("file").unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.ll");
        module.print_to_file(&path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("ModuleID = 'file'"));

        let missing = dir.path().join("no/such/dir/out.ll");
        let err = module.print_to_file(&missing).unwrap_err();
        assert!(err.message().is_some());
    }
}
