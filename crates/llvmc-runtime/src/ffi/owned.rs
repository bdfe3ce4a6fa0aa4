//! Resource-owning wrappers
//!
//! [`Owned<K>`] holds exactly one native handle of kind `K` and releases it
//! exactly once. Explicit [`Owned::dispose`] and `Drop` share one guarded
//! release routine, so whichever runs first frees the object and the other is
//! a no-op. After disposal the handle is gone: [`Owned::handle`] reports
//! [`LifecycleError::UseAfterDispose`] instead of forwarding a stale pointer.

use crate::ffi::api::{Native, NativeApi};
use crate::ffi::handle::{kind, Handle, HandleKind};
use thiserror::Error;

/// Lifecycle violations detected by the wrapper itself
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("{kind} used after it was disposed")]
    UseAfterDispose { kind: &'static str },

    #[error("native factory returned a null {kind}")]
    NullHandle { kind: &'static str },
}

/// A handle kind with a native release function
pub trait Resource: HandleKind + Sized {
    /// Free the native object.
    ///
    /// # Safety
    ///
    /// `handle` must be live and owned by the caller; it is dangling afterwards.
    unsafe fn release(api: &dyn NativeApi, handle: Handle<Self>);
}

macro_rules! resources {
    ($($kind:ident => $release:ident;)*) => {
        $(
            impl Resource for kind::$kind {
                unsafe fn release(api: &dyn NativeApi, handle: Handle<Self>) {
                    api.$release(handle)
                }
            }
        )*
    };
}

resources! {
    Context => context_dispose;
    Module => dispose_module;
    Builder => dispose_builder;
    ExecutionEngine => dispose_execution_engine;
    PassBuilderOptions => dispose_pass_builder_options;
    MemoryBuffer => dispose_memory_buffer;
}

/// Exclusive owner of one native handle
pub struct Owned<K: Resource> {
    native: Native,
    handle: Option<Handle<K>>,
}

impl<K: Resource> Owned<K> {
    /// Construct through exactly one native factory call
    ///
    /// # Safety
    ///
    /// `factory` must return a fresh handle owned by the caller (or null),
    /// and no other wrapper may own it.
    pub unsafe fn create<F>(native: Native, factory: F) -> Result<Self, LifecycleError>
    where
        F: FnOnce(&dyn NativeApi) -> Handle<K>,
    {
        let handle = factory(&*native);
        Self::adopt(native, handle)
    }

    /// Take ownership of a handle obtained elsewhere
    ///
    /// # Safety
    ///
    /// Same contract as [`Owned::create`].
    pub unsafe fn adopt(native: Native, handle: Handle<K>) -> Result<Self, LifecycleError> {
        let handle = handle
            .non_null()
            .ok_or(LifecycleError::NullHandle { kind: K::NAME })?;
        log::trace!("acquired {:?}", handle);
        Ok(Self {
            native,
            handle: Some(handle),
        })
    }

    /// The live handle, or an error once disposed
    pub fn handle(&self) -> Result<Handle<K>, LifecycleError> {
        self.handle
            .ok_or(LifecycleError::UseAfterDispose { kind: K::NAME })
    }

    pub fn is_disposed(&self) -> bool {
        self.handle.is_none()
    }

    pub fn native(&self) -> &Native {
        &self.native
    }

    /// Release the native object now. Calling again is a no-op.
    pub fn dispose(&mut self) {
        self.release();
    }

    /// Give up ownership without releasing, e.g. when the native side takes
    /// the object over
    pub fn into_raw(mut self) -> Result<Handle<K>, LifecycleError> {
        let handle = self.handle()?;
        self.handle = None;
        Ok(handle)
    }

    fn release(&mut self) {
        if let Some(handle) = self.handle.take() {
            // SAFETY: `handle` was owned by this wrapper and has just been taken,
            // so no other path can release it again
            unsafe { K::release(&*self.native, handle) };
            log::trace!("released {:?}", handle);
        }
    }
}

impl<K: Resource> Drop for Owned<K> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<K: Resource> std::fmt::Debug for Owned<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.handle {
            Some(handle) => write!(f, "Owned({:?})", handle),
            None => write!(f, "Owned({}, disposed)", K::NAME),
        }
    }
}
