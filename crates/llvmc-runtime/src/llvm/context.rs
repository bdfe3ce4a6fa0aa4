//! Contexts
//!
//! [`Context`] owns a context created with `LLVMContextCreate`.
//! [`GlobalContext`] borrows the process-wide context, which is never
//! released by this crate. Both implement [`AsContext`], the entry point for
//! creating modules, types and blocks.

use crate::ffi::api::Native;
use crate::ffi::handle::{kind, ContextRef};
use crate::ffi::owned::{LifecycleError, Owned};
use crate::llvm::error::NativeResult;
use crate::llvm::ir;
use crate::llvm::module::Module;
use crate::llvm::types::{self, Type};
use crate::llvm::values::{BasicBlock, Value};
use std::path::Path;

/// Anything that can stand in for an `LLVMContextRef`
pub trait AsContext {
    /// The live context handle
    fn raw_context(&self) -> NativeResult<ContextRef>;

    fn native(&self) -> &Native;

    fn create_module(&self, name: &str) -> NativeResult<Module<'_>> {
        Module::new(self.native(), self.raw_context()?, name)
    }

    fn int_type(&self, bits: u32) -> NativeResult<Type<'_>> {
        types::int_type(self.native(), self.raw_context()?, bits)
    }

    fn void_type(&self) -> NativeResult<Type<'_>> {
        types::void_type(self.native(), self.raw_context()?)
    }

    /// `LLVMFunctionType`; `params` may be empty
    fn function_type<'c>(
        &'c self,
        ret: Type<'c>,
        params: &[Type<'c>],
        var_arg: bool,
    ) -> NativeResult<Type<'c>> {
        types::function_type(self.native(), ret, params, var_arg)
    }

    /// Literal struct type with the given element types
    fn struct_type<'c>(&'c self, elements: &[Type<'c>], packed: bool) -> NativeResult<Type<'c>> {
        types::struct_type(self.native(), self.raw_context()?, elements, packed)
    }

    /// The block belongs to `function` and borrows the same module
    fn append_basic_block<'v>(
        &self,
        function: Value<'v>,
        name: &str,
    ) -> NativeResult<BasicBlock<'v>> {
        BasicBlock::append(self.raw_context()?, function, name)
    }

    /// Parse textual or bitcode IR held in memory
    fn parse_ir(&self, source: &str, buffer_name: &str) -> NativeResult<Module<'_>> {
        ir::parse_ir(self.native(), self.raw_context()?, source, buffer_name)
    }

    fn parse_ir_file(&self, path: &Path) -> NativeResult<Module<'_>> {
        ir::parse_ir_file(self.native(), self.raw_context()?, path)
    }
}

/// An owned LLVM context
///
/// Everything created from it borrows it, so it cannot be dropped while
/// modules are alive.
#[derive(Debug)]
pub struct Context {
    inner: Owned<kind::Context>,
}

impl Context {
    pub fn new(native: &Native) -> NativeResult<Self> {
        // SAFETY: `LLVMContextCreate` returns a fresh context owned by the caller
        let inner = unsafe { Owned::create(native.clone(), |api| api.context_create()) }?;
        Ok(Self { inner })
    }

    pub fn handle(&self) -> Result<ContextRef, LifecycleError> {
        self.inner.handle()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }

    /// Release now instead of at drop. Idempotent.
    pub fn dispose(&mut self) {
        self.inner.dispose();
    }
}

impl AsContext for Context {
    fn raw_context(&self) -> NativeResult<ContextRef> {
        Ok(self.inner.handle()?)
    }

    fn native(&self) -> &Native {
        self.inner.native()
    }
}

/// The process-wide context from `LLVMGetGlobalContext`
#[derive(Debug, Clone, Copy)]
pub struct GlobalContext<'a> {
    handle: ContextRef,
    native: &'a Native,
}

impl<'a> GlobalContext<'a> {
    pub(crate) fn new(native: &'a Native, handle: ContextRef) -> Self {
        Self { handle, native }
    }

    pub fn handle(&self) -> ContextRef {
        self.handle
    }
}

impl AsContext for GlobalContext<'_> {
    fn raw_context(&self) -> NativeResult<ContextRef> {
        Ok(self.handle)
    }

    fn native(&self) -> &Native {
        self.native
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::marshal::MessageEncoding;
    use crate::ffi::stub::StubApi;
    use crate::llvm::error::NativeError;
    use std::sync::Arc;

    #[test]
    fn test_context_lifecycle() {
        let stub = Arc::new(StubApi::new());
        let native = Native::new(stub.clone(), MessageEncoding::Latin1);
        let mut ctx = Context::new(&native).unwrap();
        assert!(ctx.handle().is_ok());
        ctx.dispose();
        assert!(matches!(
            ctx.int_type(32),
            Err(NativeError::Lifecycle(LifecycleError::UseAfterDispose { kind: "context" }))
        ));
        drop(ctx);
        assert_eq!(stub.count("LLVMContextDispose"), 1);
        assert_eq!(stub.count("LLVMIntTypeInContext"), 0);
    }

    #[test]
    fn test_global_context_is_not_released() {
        let stub = Arc::new(StubApi::new());
        let native = Native::new(stub.clone(), MessageEncoding::Latin1);
        let handle = unsafe { native.get_global_context() };
        {
            let global = GlobalContext::new(&native, handle);
            let byte = global.int_type(8).unwrap();
            assert!(!byte.handle().is_null());
        }
        assert_eq!(stub.count("LLVMContextDispose"), 0);
    }
}
