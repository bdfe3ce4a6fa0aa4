//! Values and basic blocks
//!
//! Both are copyable views. Functions, parameters, blocks and instructions
//! borrow the module that owns them, so they cannot be used after the module
//! is dropped or handed to an execution engine. Constants borrow the context.

use crate::ffi::api::Native;
use crate::ffi::array::fill_vec;
use crate::ffi::handle::{BasicBlockRef, ContextRef, ValueRef};
use crate::ffi::marshal::{copy_c_str_with_len, MarshalContext};
use crate::llvm::error::{non_null, NativeError, NativeResult};
use crate::llvm::types::Type;
use std::fmt;

#[derive(Clone, Copy)]
pub struct Value<'a> {
    handle: ValueRef,
    native: &'a Native,
}

impl<'a> Value<'a> {
    pub(crate) fn new(native: &'a Native, handle: ValueRef) -> NativeResult<Self> {
        Ok(Self {
            handle: non_null(handle)?,
            native,
        })
    }

    pub fn handle(self) -> ValueRef {
        self.handle
    }

    pub(crate) fn native(self) -> &'a Native {
        self.native
    }

    /// `LLVMTypeOf`
    pub fn type_of(self) -> NativeResult<Type<'a>> {
        Type::new(self.native, unsafe { self.native.type_of(self.handle) })
    }

    /// The value type of a global, such as the signature of a function
    pub fn global_value_type(self) -> NativeResult<Type<'a>> {
        Type::new(self.native, unsafe {
            self.native.global_get_value_type(self.handle)
        })
    }

    /// The value's name; empty when unnamed
    pub fn name(self) -> String {
        let mut len = 0usize;
        // The name is borrowed from the value; it is copied and never released
        unsafe {
            let ptr = self.native.get_value_name2(self.handle, &mut len);
            copy_c_str_with_len(ptr, len, self.native.encoding())
        }
        .unwrap_or_default()
    }

    pub fn set_name(self, name: &str) {
        unsafe {
            self.native
                .set_value_name2(self.handle, name.as_ptr().cast(), name.len())
        }
    }

    pub fn count_params(self) -> u32 {
        unsafe { self.native.count_params(self.handle) }
    }

    /// Parameters of a function, in order
    pub fn params(self) -> Vec<Value<'a>> {
        let raw: Vec<ValueRef> = fill_vec(
            || unsafe { self.native.count_params(self.handle) },
            |dest| unsafe { self.native.get_params(self.handle, dest) },
        );
        raw.into_iter()
            .map(|handle| Value {
                handle,
                native: self.native,
            })
            .collect()
    }

    pub fn param(self, index: u32) -> NativeResult<Value<'a>> {
        if index >= self.count_params() {
            return Err(NativeError::NotFound {
                what: format!("parameter {}", index),
            });
        }
        Value::new(self.native, unsafe { self.native.get_param(self.handle, index) })
    }

    /// `LLVMValueAsBasicBlock`; only meaningful for block values
    pub fn as_basic_block(self) -> NativeResult<BasicBlock<'a>> {
        let raw = unsafe { self.native.value_as_basic_block(self.handle) };
        Ok(BasicBlock {
            handle: non_null(raw)?,
            native: self.native,
        })
    }
}

impl PartialEq for Value<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl Eq for Value<'_> {}

impl fmt::Debug for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value({:?})", self.handle)
    }
}

#[derive(Clone, Copy)]
pub struct BasicBlock<'a> {
    handle: BasicBlockRef,
    native: &'a Native,
}

impl<'a> BasicBlock<'a> {
    pub(crate) fn append(context: ContextRef, function: Value<'a>, name: &str) -> NativeResult<Self> {
        let native = function.native;
        let mut marshal = MarshalContext::new();
        let name = marshal.c_str(name)?;
        let raw = unsafe { native.append_basic_block_in_context(context, function.handle, name) };
        Ok(Self {
            handle: non_null(raw)?,
            native,
        })
    }

    pub fn handle(self) -> BasicBlockRef {
        self.handle
    }

    /// `LLVMBasicBlockAsValue`
    pub fn as_value(self) -> NativeResult<Value<'a>> {
        Value::new(self.native, unsafe {
            self.native.basic_block_as_value(self.handle)
        })
    }
}

impl PartialEq for BasicBlock<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl Eq for BasicBlock<'_> {}

impl fmt::Debug for BasicBlock<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BasicBlock({:?})", self.handle)
    }
}
