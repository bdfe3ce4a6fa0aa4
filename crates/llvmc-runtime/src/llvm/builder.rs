//! Instruction builder
//!
//! Created from a [`Module`] and bound to its lifetime: the values it produces
//! belong to that module's functions. Constants from the context coerce to
//! the shorter module lifetime.
//!
//! [`Module`]: crate::llvm::Module

use crate::ffi::api::Native;
use crate::ffi::array::with_slice_mut;
use crate::ffi::handle::{kind, ContextRef, ValueRef};
use crate::ffi::marshal::MarshalContext;
use crate::ffi::owned::Owned;
use crate::llvm::error::NativeResult;
use crate::llvm::types::Type;
use crate::llvm::values::{BasicBlock, Value};

#[derive(Debug)]
pub struct Builder<'m> {
    inner: Owned<kind::Builder>,
    native: &'m Native,
}

impl<'m> Builder<'m> {
    pub(crate) fn new(native: &'m Native, context: ContextRef) -> NativeResult<Self> {
        let inner =
            unsafe { Owned::create(native.clone(), |api| api.create_builder_in_context(context)) }?;
        Ok(Self { inner, native })
    }

    pub fn dispose(&mut self) {
        self.inner.dispose();
    }

    pub fn position_at_end(&self, block: BasicBlock<'m>) -> NativeResult<()> {
        let builder = self.inner.handle()?;
        unsafe { self.native.position_builder_at_end(builder, block.handle()) };
        Ok(())
    }

    pub fn build_add(&self, lhs: Value<'m>, rhs: Value<'m>, name: &str) -> NativeResult<Value<'m>> {
        let builder = self.inner.handle()?;
        let mut marshal = MarshalContext::new();
        let name = marshal.c_str(name)?;
        let raw = unsafe {
            self.native
                .build_add(builder, lhs.handle(), rhs.handle(), name)
        };
        Value::new(self.native, raw)
    }

    pub fn build_ret(&self, value: Value<'m>) -> NativeResult<Value<'m>> {
        let builder = self.inner.handle()?;
        Value::new(self.native, unsafe {
            self.native.build_ret(builder, value.handle())
        })
    }

    pub fn build_ret_void(&self) -> NativeResult<Value<'m>> {
        let builder = self.inner.handle()?;
        Value::new(self.native, unsafe { self.native.build_ret_void(builder) })
    }

    /// `LLVMBuildCall2`; `args` may be empty
    pub fn build_call(
        &self,
        function_type: Type<'m>,
        function: Value<'m>,
        args: &[Value<'m>],
        name: &str,
    ) -> NativeResult<Value<'m>> {
        let builder = self.inner.handle()?;
        let mut marshal = MarshalContext::new();
        let name = marshal.c_str(name)?;
        let mut raw_args: Vec<ValueRef> = args.iter().map(|a| a.handle()).collect();
        let raw = with_slice_mut(&mut raw_args, |ptr, count| unsafe {
            self.native.build_call2(
                builder,
                function_type.handle(),
                function.handle(),
                ptr,
                count,
                name,
            )
        })?;
        Value::new(self.native, raw)
    }
}
