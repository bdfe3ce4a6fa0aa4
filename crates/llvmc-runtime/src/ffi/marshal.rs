//! String marshaling across the C boundary
//!
//! Outbound strings become NUL-terminated `CString`s that live for the whole
//! native call. Inbound strings are copied out of native memory and decoded
//! with a [`MessageEncoding`]; the default treats every byte as one character
//! (Latin-1), which is the single-byte convention of the binding.
//!
//! # Memory Safety
//!
//! - Outbound strings are owned by [`MarshalContext`] until it drops
//! - Inbound pointers are checked for null before they are read
//! - Nothing in this module frees native memory; see [`crate::ffi::message`]

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use thiserror::Error;

/// Marshaling errors raised before a native call is made
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarshalError {
    #[error("string contains an interior NUL byte at offset {position}: {value:?}")]
    InteriorNul { value: String, position: usize },

    #[error("array of {len} elements exceeds the native count limit of {max}")]
    ArrayTooLong { len: usize, max: usize },

    #[error("argument vector is empty; it must start with the program name")]
    MissingProgramName,
}

/// Text decoding applied to native strings copied into Rust
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MessageEncoding {
    /// One byte, one character (ISO-8859-1)
    #[default]
    Latin1,
    /// UTF-8, with invalid sequences replaced by U+FFFD
    Utf8Lossy,
}

impl MessageEncoding {
    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            MessageEncoding::Latin1 => bytes.iter().map(|&b| b as char).collect(),
            MessageEncoding::Utf8Lossy => String::from_utf8_lossy(bytes).into_owned(),
        }
    }
}

impl From<llvmc_config::TextEncoding> for MessageEncoding {
    fn from(value: llvmc_config::TextEncoding) -> Self {
        match value {
            llvmc_config::TextEncoding::Latin1 => MessageEncoding::Latin1,
            llvmc_config::TextEncoding::Utf8 => MessageEncoding::Utf8Lossy,
        }
    }
}

/// Convert a Rust string into an owned C string
pub fn to_cstring(value: &str) -> Result<CString, MarshalError> {
    CString::new(value).map_err(|e| MarshalError::InteriorNul {
        value: value.to_string(),
        position: e.nul_position(),
    })
}

/// Copy a borrowed, NUL-terminated native string.
///
/// Returns `None` for a null pointer. The native memory is not released;
/// use this only for strings the native side keeps ownership of.
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated buffer that stays valid
/// for the duration of the call.
pub unsafe fn copy_c_str(ptr: *const c_char, encoding: MessageEncoding) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    let bytes = CStr::from_ptr(ptr).to_bytes();
    Some(encoding.decode(bytes))
}

/// Copy a borrowed native string with an explicit length (no terminator needed).
///
/// # Safety
///
/// `ptr` must be null or valid for reads of `len` bytes.
pub unsafe fn copy_c_str_with_len(
    ptr: *const c_char,
    len: usize,
    encoding: MessageEncoding,
) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    let bytes = std::slice::from_raw_parts(ptr as *const u8, len);
    Some(encoding.decode(bytes))
}

/// Keeps outbound C strings alive for the duration of a native call
///
/// # Example
///
/// ```
/// # use llvmc_runtime::ffi::MarshalContext;
/// let mut ctx = MarshalContext::new();
/// let name = ctx.c_str("main").unwrap();
/// assert!(!name.is_null());
/// // `name` stays valid until `ctx` drops
/// ```
#[derive(Debug, Default)]
pub struct MarshalContext {
    allocated_strings: Vec<CString>,
}

impl MarshalContext {
    pub fn new() -> Self {
        Self {
            allocated_strings: Vec::new(),
        }
    }

    /// Marshal a string and return a pointer valid until this context drops
    pub fn c_str(&mut self, value: &str) -> Result<*const c_char, MarshalError> {
        let c_string = to_cstring(value)?;
        // The heap buffer does not move when the CString moves into the Vec
        let ptr = c_string.as_ptr();
        self.allocated_strings.push(c_string);
        Ok(ptr)
    }

    pub fn len(&self) -> usize {
        self.allocated_strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allocated_strings.is_empty()
    }
}
