//! Struct and enum mirrors of the LLVM-C headers
//!
//! Field order, width and alignment follow the C declarations exactly. A
//! mismatch here is silent memory corruption, so the tests below check every
//! field offset against the header layout for the host.

use crate::ffi::abi_bool::AbiBool;
use crate::ffi::handle::McjitMemoryManagerRef;
use std::os::raw::c_uint;

/// `LLVMCodeModel` (LLVM 8 and later)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CodeModel {
    #[default]
    Default = 0,
    JitDefault = 1,
    Tiny = 2,
    Small = 3,
    Kernel = 4,
    Medium = 5,
    Large = 6,
}

impl From<llvmc_config::CodeModelName> for CodeModel {
    fn from(value: llvmc_config::CodeModelName) -> Self {
        use llvmc_config::CodeModelName as N;
        match value {
            N::Default => CodeModel::Default,
            N::JitDefault => CodeModel::JitDefault,
            N::Tiny => CodeModel::Tiny,
            N::Small => CodeModel::Small,
            N::Kernel => CodeModel::Kernel,
            N::Medium => CodeModel::Medium,
            N::Large => CodeModel::Large,
        }
    }
}

/// `LLVMVerifierFailureAction`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerifierFailureAction {
    /// Print to stderr and abort the process
    AbortProcess = 0,
    /// Print to stderr and return 1
    PrintMessage = 1,
    /// Return 1 and print nothing
    ReturnStatus = 2,
}

/// `struct LLVMMCJITCompilerOptions`
///
/// ```c
/// struct LLVMMCJITCompilerOptions {
///   unsigned OptLevel;
///   LLVMCodeModel CodeModel;
///   LLVMBool NoFramePointerElim;
///   LLVMBool EnableFastISel;
///   LLVMMCJITMemoryManagerRef MCJMM;
/// };
/// ```
///
/// Passed by reference together with `size_of::<Self>()`, as the C API expects.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct McjitCompilerOptions {
    pub opt_level: c_uint,
    pub code_model: CodeModel,
    pub no_frame_pointer_elim: AbiBool,
    pub enable_fast_isel: AbiBool,
    pub mcjmm: McjitMemoryManagerRef,
}

impl Default for McjitCompilerOptions {
    /// Zeroed, as `LLVMInitializeMCJITCompilerOptions` starts from
    fn default() -> Self {
        Self {
            opt_level: 0,
            code_model: CodeModel::Default,
            no_frame_pointer_elim: AbiBool::FALSE,
            enable_fast_isel: AbiBool::FALSE,
            mcjmm: McjitMemoryManagerRef::null(),
        }
    }
}

impl McjitCompilerOptions {
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{align_of, offset_of, size_of};
    use std::os::raw::{c_int, c_void};

    // Reference layout computed the way a C compiler lays the struct out
    fn c_layout() -> (Vec<usize>, usize, usize) {
        let ptr = size_of::<*mut c_void>();
        let int = size_of::<c_int>();
        let offsets = vec![0, int, 2 * int, 3 * int];
        let after_ints = 4 * int;
        let mcjmm = after_ints.div_ceil(align_of::<*mut c_void>()) * align_of::<*mut c_void>();
        let align = align_of::<*mut c_void>().max(align_of::<c_int>());
        let size = (mcjmm + ptr).div_ceil(align) * align;
        let mut all = offsets;
        all.push(mcjmm);
        (all, size, align)
    }

    #[test]
    fn test_mcjit_options_field_offsets() {
        let (expected, _, _) = c_layout();
        let actual = vec![
            offset_of!(McjitCompilerOptions, opt_level),
            offset_of!(McjitCompilerOptions, code_model),
            offset_of!(McjitCompilerOptions, no_frame_pointer_elim),
            offset_of!(McjitCompilerOptions, enable_fast_isel),
            offset_of!(McjitCompilerOptions, mcjmm),
        ];
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_mcjit_options_size_and_align() {
        let (_, size, align) = c_layout();
        assert_eq!(McjitCompilerOptions::SIZE, size);
        assert_eq!(align_of::<McjitCompilerOptions>(), align);
        if cfg!(target_pointer_width = "64") {
            assert_eq!(McjitCompilerOptions::SIZE, 24);
        }
    }

    #[test]
    fn test_enums_are_c_int_sized() {
        assert_eq!(size_of::<CodeModel>(), size_of::<c_int>());
        assert_eq!(size_of::<VerifierFailureAction>(), size_of::<c_int>());
    }

    #[test]
    fn test_enum_discriminants_match_header() {
        assert_eq!(CodeModel::Default as c_int, 0);
        assert_eq!(CodeModel::JitDefault as c_int, 1);
        assert_eq!(CodeModel::Large as c_int, 6);
        assert_eq!(VerifierFailureAction::ReturnStatus as c_int, 2);
    }

    #[test]
    fn test_default_is_zeroed() {
        let options = McjitCompilerOptions::default();
        assert_eq!(options.opt_level, 0);
        assert!(options.mcjmm.is_null());
        assert!(!options.enable_fast_isel.get());
    }
}
