//! llvmc runtime - LLVM-C marshaling core
//!
//! This library provides the boundary between Rust and the LLVM C API:
//! - Typed opaque handles and the `LLVMBool` representation
//! - Array marshaling in both directions, including empty arrays
//! - Native messages and `LLVMErrorRef` released exactly once
//! - Resource-owning wrappers with a single guarded release
//! - `#[repr(C)]` mirrors of native option structs
//! - Safe wrappers for contexts, modules, IR building, parsing, passes and MCJIT
//!
//! The API table is loaded from a shared library at runtime
//! ([`runtime::Llvm::load`]) or, with the `stub` feature, served in process
//! by `ffi::StubApi`.

/// llvmc runtime version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod ffi;
pub mod llvm;
pub mod runtime;

pub use ffi::{AbiBool, Handle, LibrarySpec, MessageEncoding, Native, NativeApi};
#[cfg(any(test, feature = "stub"))]
pub use ffi::StubApi;
pub use llvm::{AsContext, Context, Module, NativeError, NativeResult};
pub use runtime::{LibraryInfo, Llvm, RuntimeOptions, Version};
