//! Types
//!
//! Types are uniqued and owned by their context, so a [`Type`] is a plain
//! copyable handle that borrows the context it came from.

use crate::ffi::abi_bool::AbiBool;
use crate::ffi::api::Native;
use crate::ffi::array::{fill_vec, with_slice_mut};
use crate::ffi::handle::{ContextRef, TypeRef};
use crate::llvm::error::{non_null, NativeResult};
use crate::llvm::values::Value;
use std::fmt;

#[derive(Clone, Copy)]
pub struct Type<'ctx> {
    handle: TypeRef,
    native: &'ctx Native,
}

impl<'ctx> Type<'ctx> {
    pub(crate) fn new(native: &'ctx Native, handle: TypeRef) -> NativeResult<Self> {
        Ok(Self {
            handle: non_null(handle)?,
            native,
        })
    }

    pub fn handle(self) -> TypeRef {
        self.handle
    }

    /// Parameter types of a function type, in order
    pub fn param_types(self) -> Vec<Type<'ctx>> {
        let raw: Vec<TypeRef> = fill_vec(
            // SAFETY: `handle` is a live type from this context
            || unsafe { self.native.count_param_types(self.handle) },
            |dest| unsafe { self.native.get_param_types(self.handle, dest) },
        );
        self.wrap_all(raw)
    }

    pub fn is_var_arg(self) -> bool {
        unsafe { self.native.is_function_var_arg(self.handle) }.get()
    }

    /// Element types of a struct type, in order
    pub fn struct_element_types(self) -> Vec<Type<'ctx>> {
        let raw: Vec<TypeRef> = fill_vec(
            || unsafe { self.native.count_struct_element_types(self.handle) },
            |dest| unsafe { self.native.get_struct_element_types(self.handle, dest) },
        );
        self.wrap_all(raw)
    }

    pub fn is_packed_struct(self) -> bool {
        unsafe { self.native.is_packed_struct(self.handle) }.get()
    }

    /// `LLVMConstInt`. `n` is truncated to the type's width; `sign_extend`
    /// controls how it is widened first.
    pub fn const_int(self, n: u64, sign_extend: bool) -> NativeResult<Value<'ctx>> {
        let raw = unsafe { self.native.const_int(self.handle, n, AbiBool::from(sign_extend)) };
        Value::new(self.native, raw)
    }

    fn wrap_all(self, raw: Vec<TypeRef>) -> Vec<Type<'ctx>> {
        raw.into_iter()
            .map(|handle| Type {
                handle,
                native: self.native,
            })
            .collect()
    }
}

impl PartialEq for Type<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl Eq for Type<'_> {}

impl fmt::Debug for Type<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Type({:?})", self.handle)
    }
}

pub(crate) fn int_type(native: &Native, context: ContextRef, bits: u32) -> NativeResult<Type<'_>> {
    Type::new(native, unsafe { native.int_type_in_context(context, bits) })
}

pub(crate) fn void_type(native: &Native, context: ContextRef) -> NativeResult<Type<'_>> {
    Type::new(native, unsafe { native.void_type_in_context(context) })
}

pub(crate) fn function_type<'c>(
    native: &'c Native,
    ret: Type<'c>,
    params: &[Type<'c>],
    var_arg: bool,
) -> NativeResult<Type<'c>> {
    let mut raw: Vec<TypeRef> = params.iter().map(|t| t.handle).collect();
    let handle = with_slice_mut(&mut raw, |ptr, count| unsafe {
        native.function_type(ret.handle, ptr, count, AbiBool::from(var_arg))
    })?;
    Type::new(native, handle)
}

pub(crate) fn struct_type<'c>(
    native: &'c Native,
    context: ContextRef,
    elements: &[Type<'c>],
    packed: bool,
) -> NativeResult<Type<'c>> {
    let mut raw: Vec<TypeRef> = elements.iter().map(|t| t.handle).collect();
    let handle = with_slice_mut(&mut raw, |ptr, count| unsafe {
        native.struct_type_in_context(context, ptr, count, AbiBool::from(packed))
    })?;
    Type::new(native, handle)
}
