//! Native messages: owned `char *` buffers released exactly once
//!
//! Many LLVM-C calls hand back a message through a `char **OutMessage`
//! parameter, or return an `LLVMErrorRef` whose text must be extracted. Both
//! conventions end in this module:
//!
//! 1. the native call writes the message address straight into an
//!    [`OwnedMessage`] guard,
//! 2. a null address means "no message", whatever the call returned,
//! 3. a non-null address is copied into a `String`,
//! 4. the guard releases the buffer once, with the release function that
//!    matches the allocator, and never calls it with null,
//! 5. the caller gets the status and the `Option<String>` together.
//!
//! The guard releases on drop, so early returns and unwinding do not leak.

use crate::ffi::api::NativeApi;
use crate::ffi::handle::ErrorRef;
use crate::ffi::marshal::{copy_c_str, MessageEncoding};
use std::os::raw::c_char;

/// The native function that frees a given message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRelease {
    /// `LLVMDisposeMessage`
    DisposeMessage,
    /// `LLVMDisposeErrorMessage`
    DisposeErrorMessage,
}

/// Guard over one native message buffer
pub struct OwnedMessage<'a> {
    api: &'a dyn NativeApi,
    ptr: *mut c_char,
    release: MessageRelease,
}

impl<'a> OwnedMessage<'a> {
    /// An empty slot to pass as a `char **` out parameter
    pub fn empty(api: &'a dyn NativeApi, release: MessageRelease) -> Self {
        Self {
            api,
            ptr: std::ptr::null_mut(),
            release,
        }
    }

    /// Take ownership of a message returned by the native library
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a buffer allocated by the native library that is
    /// freed by `release` and that nobody else will free.
    pub unsafe fn from_raw(api: &'a dyn NativeApi, ptr: *mut c_char, release: MessageRelease) -> Self {
        Self { api, ptr, release }
    }

    /// Address for the native call to write into.
    ///
    /// Any message already held is released first so a reused slot cannot leak.
    pub fn out_ptr(&mut self) -> *mut *mut c_char {
        self.release_now();
        &mut self.ptr
    }

    pub fn is_null(&self) -> bool {
        self.ptr.is_null()
    }

    /// Copy the text without releasing it
    pub fn to_string_with(&self, encoding: MessageEncoding) -> Option<String> {
        // SAFETY: the guard owns a live, NUL-terminated buffer or null
        unsafe { copy_c_str(self.ptr, encoding) }
    }

    /// Copy the text, then release the native buffer
    pub fn into_string(self, encoding: MessageEncoding) -> Option<String> {
        self.to_string_with(encoding)
        // `self` drops here and releases
    }

    fn release_now(&mut self) {
        let ptr = std::mem::replace(&mut self.ptr, std::ptr::null_mut());
        if ptr.is_null() {
            return;
        }
        // SAFETY: the pointer came from the native allocator paired with `release`
        // and was swapped out above, so it is freed exactly once
        unsafe {
            match self.release {
                MessageRelease::DisposeMessage => self.api.dispose_message(ptr),
                MessageRelease::DisposeErrorMessage => self.api.dispose_error_message(ptr),
            }
        }
        log::trace!("released native message {:p} via {:?}", ptr, self.release);
    }
}

impl Drop for OwnedMessage<'_> {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl std::fmt::Debug for OwnedMessage<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnedMessage")
            .field("ptr", &self.ptr)
            .field("release", &self.release)
            .finish()
    }
}

/// Invoke a native call that reports through `char **OutMessage`
///
/// Returns the call's own result together with the message, if any. The
/// message buffer is released before this function returns.
pub fn call_with_message<R, F>(
    api: &dyn NativeApi,
    encoding: MessageEncoding,
    call: F,
) -> (R, Option<String>)
where
    F: FnOnce(*mut *mut c_char) -> R,
{
    let mut slot = OwnedMessage::empty(api, MessageRelease::DisposeMessage);
    let result = call(slot.out_ptr());
    (result, slot.into_string(encoding))
}

/// Turn an `LLVMErrorRef` into its message text
///
/// A null error is success and yields `None`. A non-null error is consumed by
/// `LLVMGetErrorMessage` and always yields `Some`.
///
/// # Safety
///
/// `error` must be null or an unconsumed error from the native library.
pub unsafe fn error_message(
    api: &dyn NativeApi,
    error: ErrorRef,
    encoding: MessageEncoding,
) -> Option<String> {
    if error.is_null() {
        return None;
    }
    let ptr = api.get_error_message(error);
    let text = OwnedMessage::from_raw(api, ptr, MessageRelease::DisposeErrorMessage)
        .into_string(encoding);
    Some(text.unwrap_or_default())
}
