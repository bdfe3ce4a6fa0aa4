//! Variable-length arrays across the C boundary
//!
//! The native convention is "pointer to first element + count". Two rules
//! follow from it:
//!
//! - For an empty sequence, the count is `0` and the pointer is the address of
//!   a stack-local placeholder. The native side never dereferences it, and the
//!   address of an empty Rust slice is never handed out.
//! - For output arrays, the paired count call runs first, exactly that many
//!   elements are allocated, and the fill call only runs when the count is
//!   nonzero.
//!
//! Element types must have the exact size and alignment of the native element;
//! that promise is the [`NativeElement`] marker.

use crate::ffi::abi_bool::AbiBool;
use crate::ffi::handle::{Handle, HandleKind};
use crate::ffi::marshal::{to_cstring, MarshalError};
use std::ffi::CString;
use std::mem::MaybeUninit;
use std::os::raw::{c_char, c_int, c_uint, c_ulonglong};

/// Types laid out exactly like their native array element
///
/// # Safety
///
/// Implementors must be `#[repr(C)]` or `#[repr(transparent)]` mirrors of the
/// native element so that `[Self]` and the native array agree byte for byte.
pub unsafe trait NativeElement: Copy {}

unsafe impl<K: HandleKind> NativeElement for Handle<K> {}
unsafe impl NativeElement for AbiBool {}
unsafe impl NativeElement for c_int {}
unsafe impl NativeElement for c_uint {}
unsafe impl NativeElement for c_ulonglong {}
unsafe impl NativeElement for u8 {}
unsafe impl NativeElement for *const c_char {}

/// Convert a Rust length into the native `unsigned` count
pub fn native_count(len: usize) -> Result<c_uint, MarshalError> {
    c_uint::try_from(len).map_err(|_| MarshalError::ArrayTooLong {
        len,
        max: c_uint::MAX as usize,
    })
}

/// Pass `items` to a native function taking `(const T *items, unsigned count)`
///
/// # Examples
///
/// ```
/// # use llvmc_runtime::ffi::array::with_slice;
/// let total = with_slice(&[1i32, 2, 3], |ptr, count| {
///     unsafe { std::slice::from_raw_parts(ptr, count as usize) }.iter().sum::<i32>()
/// })
/// .unwrap();
/// assert_eq!(total, 6);
/// ```
pub fn with_slice<T, R, F>(items: &[T], call: F) -> Result<R, MarshalError>
where
    T: NativeElement,
    F: FnOnce(*const T, c_uint) -> R,
{
    let count = native_count(items.len())?;
    if items.is_empty() {
        let placeholder = MaybeUninit::<T>::uninit();
        Ok(call(placeholder.as_ptr(), 0))
    } else {
        Ok(call(items.as_ptr(), count))
    }
}

/// Mutable variant of [`with_slice`] for in/out arrays
pub fn with_slice_mut<T, R, F>(items: &mut [T], call: F) -> Result<R, MarshalError>
where
    T: NativeElement,
    F: FnOnce(*mut T, c_uint) -> R,
{
    let count = native_count(items.len())?;
    if items.is_empty() {
        let mut placeholder = MaybeUninit::<T>::uninit();
        Ok(call(placeholder.as_mut_ptr(), 0))
    } else {
        Ok(call(items.as_mut_ptr(), count))
    }
}

/// Read a native array into a fresh `Vec`
///
/// `count` is the paired native count query. `fill` receives a buffer of
/// exactly that many elements and is skipped entirely when the count is zero.
pub fn fill_vec<T, C, F>(count: C, fill: F) -> Vec<T>
where
    T: NativeElement + Default,
    C: FnOnce() -> c_uint,
    F: FnOnce(*mut T),
{
    let len = count() as usize;
    if len == 0 {
        return Vec::new();
    }
    let mut out = vec![T::default(); len];
    fill(out.as_mut_ptr());
    out
}

/// An array of C strings plus the storage that keeps it alive
#[derive(Debug)]
pub struct CStringArray {
    // Owns the bytes `pointers` refer to
    _strings: Vec<CString>,
    pointers: Vec<*const c_char>,
}

impl CStringArray {
    pub fn new<S: AsRef<str>>(items: &[S]) -> Result<Self, MarshalError> {
        let strings = items
            .iter()
            .map(|s| to_cstring(s.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        let pointers = strings.iter().map(|s| s.as_ptr()).collect();
        Ok(Self {
            _strings: strings,
            pointers,
        })
    }

    /// Call with `(const char *const *items, unsigned count)`
    pub fn with_ptrs<R, F>(&self, call: F) -> Result<R, MarshalError>
    where
        F: FnOnce(*const *const c_char, c_uint) -> R,
    {
        with_slice(&self.pointers, call)
    }

    pub fn len(&self) -> usize {
        self.pointers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pointers.is_empty()
    }
}
