//! `LLVMBool`: the int-backed boolean of the C ABI
//!
//! Zero is false and any other value is true. Values produced on the Rust
//! side are always exactly `0` or `1`. Rust's `bool` is never passed across
//! the boundary in its place.

use std::fmt;
use std::os::raw::c_int;

/// Integer boolean as declared by the native ABI
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AbiBool(c_int);

impl AbiBool {
    pub const FALSE: AbiBool = AbiBool(0);
    pub const TRUE: AbiBool = AbiBool(1);

    /// Wrap a raw integer received from native code
    pub const fn from_raw(raw: c_int) -> Self {
        AbiBool(raw)
    }

    pub const fn raw(self) -> c_int {
        self.0
    }

    pub const fn get(self) -> bool {
        to_managed_bool(self.0)
    }
}

/// Any nonzero integer is true
pub const fn to_managed_bool(raw: c_int) -> bool {
    raw != 0
}

/// Canonical encoding: `1` for true, `0` for false
pub const fn from_managed_bool(value: bool) -> c_int {
    if value {
        1
    } else {
        0
    }
}

impl From<bool> for AbiBool {
    fn from(value: bool) -> Self {
        AbiBool(from_managed_bool(value))
    }
}

impl From<AbiBool> for bool {
    fn from(value: AbiBool) -> Self {
        value.get()
    }
}

impl fmt::Debug for AbiBool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AbiBool({}: {})", self.0, self.get())
    }
}
