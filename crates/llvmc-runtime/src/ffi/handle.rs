//! Opaque native handles
//!
//! Every LLVM-C object is passed across the boundary as an untyped pointer.
//! `Handle<K>` keeps that representation (`#[repr(transparent)]` over
//! `*mut c_void`) while a zero-sized kind marker `K` keeps a module handle from
//! being passed where a builder handle is expected.
//!
//! Equality and hashing look at the address only. A null address is the
//! invalid-handle sentinel. A handle whose native object has been freed is
//! still representable; the safe wrappers in [`crate::llvm`] use lifetimes and
//! [`crate::ffi::owned::Owned`] to keep that state out of reach.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::os::raw::c_void;

/// Marker implemented by every handle kind
pub trait HandleKind {
    /// Name used in diagnostics and logs
    const NAME: &'static str;
}

macro_rules! handle_kinds {
    ($($(#[$meta:meta])* $kind:ident => $alias:ident, $name:literal;)*) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy)]
            pub enum $kind {}

            impl HandleKind for $kind {
                const NAME: &'static str = $name;
            }

            #[doc = concat!("Handle to a native `", $name, "`")]
            pub type $alias = Handle<$kind>;
        )*
    };
}

pub mod kind {
    //! Zero-sized handle kinds

    use super::{Handle, HandleKind};

    handle_kinds! {
        /// `LLVMContextRef`
        Context => ContextRef, "context";
        /// `LLVMModuleRef`
        Module => ModuleRef, "module";
        /// `LLVMBuilderRef`
        Builder => BuilderRef, "builder";
        /// `LLVMTypeRef`
        Type => TypeRef, "type";
        /// `LLVMValueRef`
        Value => ValueRef, "value";
        /// `LLVMBasicBlockRef`
        BasicBlock => BasicBlockRef, "basic block";
        /// `LLVMExecutionEngineRef`
        ExecutionEngine => ExecutionEngineRef, "execution engine";
        /// `LLVMPassBuilderOptionsRef`
        PassBuilderOptions => PassBuilderOptionsRef, "pass builder options";
        /// `LLVMMemoryBufferRef`
        MemoryBuffer => MemoryBufferRef, "memory buffer";
        /// `LLVMErrorRef`
        Error => ErrorRef, "error";
        /// `LLVMTargetMachineRef`
        TargetMachine => TargetMachineRef, "target machine";
        /// `LLVMMCJITMemoryManagerRef`
        McjitMemoryManager => McjitMemoryManagerRef, "MCJIT memory manager";
    }
}

pub use kind::{
    BasicBlockRef, BuilderRef, ContextRef, ErrorRef, ExecutionEngineRef, McjitMemoryManagerRef,
    MemoryBufferRef, ModuleRef, PassBuilderOptionsRef, TargetMachineRef, TypeRef, ValueRef,
};

/// Typed wrapper around one native address
#[repr(transparent)]
pub struct Handle<K: HandleKind> {
    raw: *mut c_void,
    _kind: PhantomData<K>,
}

impl<K: HandleKind> Handle<K> {
    /// Wrap a raw address returned by the native library
    pub const fn from_raw(raw: *mut c_void) -> Self {
        Self {
            raw,
            _kind: PhantomData,
        }
    }

    /// Wrap an integer address
    pub fn from_addr(addr: usize) -> Self {
        Self::from_raw(addr as *mut c_void)
    }

    /// The invalid-handle sentinel
    pub const fn null() -> Self {
        Self::from_raw(std::ptr::null_mut())
    }

    pub fn as_raw(self) -> *mut c_void {
        self.raw
    }

    pub fn addr(self) -> usize {
        self.raw as usize
    }

    pub fn is_null(self) -> bool {
        self.raw.is_null()
    }

    /// `Some(self)` unless this is the null sentinel
    pub fn non_null(self) -> Option<Self> {
        if self.is_null() {
            None
        } else {
            Some(self)
        }
    }

    /// Reinterpret as another kind sharing the same native pointer type.
    ///
    /// Only kinds related by [`Relabel`] may be converted; use the named
    /// helpers such as [`BasicBlockRef::as_value`] at call sites.
    fn relabel<T: HandleKind>(self) -> Handle<T>
    where
        K: Relabel<T>,
    {
        Handle::from_raw(self.raw)
    }
}

/// Pairs of kinds that the native ABI represents with one underlying pointer
pub trait Relabel<T: HandleKind>: HandleKind {}

impl Relabel<kind::Value> for kind::BasicBlock {}
impl Relabel<kind::BasicBlock> for kind::Value {}

impl BasicBlockRef {
    /// View this basic block as a value
    pub fn as_value(self) -> ValueRef {
        self.relabel()
    }
}

impl ValueRef {
    /// View this value as a basic block.
    ///
    /// The caller must know the value really is a basic block; nothing is
    /// checked here.
    pub fn as_basic_block(self) -> BasicBlockRef {
        self.relabel()
    }
}

impl<K: HandleKind> Clone for Handle<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K: HandleKind> Copy for Handle<K> {}

impl<K: HandleKind> PartialEq for Handle<K> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<K: HandleKind> Eq for Handle<K> {}

impl<K: HandleKind> Hash for Handle<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl<K: HandleKind> Default for Handle<K> {
    fn default() -> Self {
        Self::null()
    }
}

impl<K: HandleKind> fmt::Debug for Handle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:#x})", K::NAME, self.addr())
    }
}

impl<K: HandleKind> fmt::Pointer for Handle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&self.raw, f)
    }
}
