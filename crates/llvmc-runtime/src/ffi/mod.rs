//! Marshaling core for the LLVM C API
//!
//! Everything that crosses the C boundary goes through this module:
//! - typed opaque handles and the fixed-width boolean
//! - pointer + count arrays, in both directions
//! - native messages and `LLVMErrorRef`, released exactly once
//! - resource-owning wrappers with a single guarded release
//! - `#[repr(C)]` mirrors of option structs
//! - the symbol table, loaded from a shared library or, with the `stub`
//!   feature, served in process
//!
//! # Safety
//!
//! The unsafe surface is the [`NativeApi`] trait and the raw helpers around
//! it. The safe wrappers in [`crate::llvm`] are built on top.

pub mod abi_bool;
pub mod api;
pub mod array;
pub mod handle;
pub mod layout;
pub mod loader;
pub mod marshal;
pub mod message;
pub mod owned;
#[cfg(any(test, feature = "stub"))]
pub mod stub;

pub use abi_bool::{from_managed_bool, to_managed_bool, AbiBool};
pub use api::{LibraryApi, Native, NativeApi, SYMBOLS};
pub use array::{fill_vec, with_slice, with_slice_mut, CStringArray, NativeElement};
pub use handle::{kind, Handle, HandleKind};
pub use layout::{CodeModel, McjitCompilerOptions, VerifierFailureAction};
pub use loader::{LibraryLoader, LibrarySpec, LoadError};
pub use marshal::{MarshalContext, MarshalError, MessageEncoding};
pub use message::{MessageRelease, OwnedMessage};
pub use owned::{LifecycleError, Owned, Resource};
#[cfg(any(test, feature = "stub"))]
pub use stub::{StubApi, StubCall};
