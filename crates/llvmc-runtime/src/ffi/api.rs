//! The native API table
//!
//! One method per LLVM-C symbol, declared once in the `native_api!` list below.
//! The list expands into:
//!
//! - [`NativeApi`]: the trait every native call goes through. The dynamically
//!   loaded library implements it, and so does the in-process `StubApi`
//!   behind the `stub` feature.
//! - [`LibraryApi`]: the `libloading` implementation. Every symbol is resolved
//!   when the library is opened, so a missing symbol fails early instead of at
//!   first use.
//! - [`SYMBOLS`]: the symbol names, for diagnostics.
//!
//! Signatures mirror the C header exactly: handles are [`Handle`] aliases,
//! `LLVMBool` is [`AbiBool`], arrays are pointer plus count.
//!
//! [`Handle`]: crate::ffi::handle::Handle

use crate::ffi::abi_bool::AbiBool;
use crate::ffi::handle::{
    BasicBlockRef, BuilderRef, ContextRef, ErrorRef, ExecutionEngineRef, MemoryBufferRef,
    ModuleRef, PassBuilderOptionsRef, TargetMachineRef, TypeRef, ValueRef,
};
use crate::ffi::layout::{McjitCompilerOptions, VerifierFailureAction};
use crate::ffi::loader::{LibraryLoader, LibrarySpec, LoadError};
use crate::ffi::marshal::MessageEncoding;
use crate::ffi::message::{self, MessageRelease, OwnedMessage};
use libloading::Library;
use std::ops::Deref;
use std::os::raw::{c_char, c_int, c_uint, c_ulonglong};
use std::path::{Path, PathBuf};
use std::sync::Arc;

macro_rules! native_api {
    ($(
        $(#[$meta:meta])*
        fn $method:ident($($arg:ident: $ty:ty),* $(,)?) $(-> $ret:ty)? = $symbol:literal;
    )*) => {
        /// Every native entry point, one method per symbol
        ///
        /// # Safety
        ///
        /// Methods forward raw handles and pointers unchanged. Callers uphold the
        /// native contract: live handles of the right kind, valid buffers, and
        /// correctly sized arrays.
        pub trait NativeApi: Send + Sync {
            $(
                $(#[$meta])*
                #[doc = concat!("`", $symbol, "`")]
                unsafe fn $method(&self, $($arg: $ty),*) $(-> $ret)?;
            )*

            /// `LLVMInitializeNativeTarget`: a header inline in C, so it is
            /// assembled from the per-architecture symbols. Returns true when no
            /// native target is available.
            unsafe fn initialize_native_target(&self) -> AbiBool;
        }

        struct SymbolTable {
            $($method: unsafe extern "C" fn($($ty),*) $(-> $ret)?,)*
        }

        impl SymbolTable {
            unsafe fn resolve(library: &Library, name: &str) -> Result<Self, LoadError> {
                Ok(Self {
                    $($method: resolve_symbol(library, name, $symbol)?,)*
                })
            }
        }

        impl NativeApi for LibraryApi {
            $(
                unsafe fn $method(&self, $($arg: $ty),*) $(-> $ret)? {
                    (self.symbols.$method)($($arg),*)
                }
            )*

            unsafe fn initialize_native_target(&self) -> AbiBool {
                match &self.native_target {
                    Some(target) => {
                        for &init in target {
                            init();
                        }
                        AbiBool::FALSE
                    }
                    None => AbiBool::TRUE,
                }
            }
        }

        /// Names of every symbol resolved by [`LibraryApi`]
        pub const SYMBOLS: &[&str] = &[$($symbol),*];
    };
}

native_api! {
    // Context
    fn context_create() -> ContextRef = "LLVMContextCreate";
    fn context_dispose(context: ContextRef) = "LLVMContextDispose";
    fn get_global_context() -> ContextRef = "LLVMGetGlobalContext";

    // Messages and errors
    fn dispose_message(message: *mut c_char) = "LLVMDisposeMessage";
    /// Consumes `error`; the returned message is owned by the caller.
    fn get_error_message(error: ErrorRef) -> *mut c_char = "LLVMGetErrorMessage";
    fn dispose_error_message(message: *mut c_char) = "LLVMDisposeErrorMessage";

    // Library
    fn get_version(major: *mut c_uint, minor: *mut c_uint, patch: *mut c_uint) = "LLVMGetVersion";
    fn parse_command_line_options(
        argc: c_int,
        argv: *const *const c_char,
        overview: *const c_char,
    ) = "LLVMParseCommandLineOptions";

    // Modules
    fn module_create_with_name_in_context(name: *const c_char, context: ContextRef) -> ModuleRef
        = "LLVMModuleCreateWithNameInContext";
    fn dispose_module(module: ModuleRef) = "LLVMDisposeModule";
    fn print_module_to_string(module: ModuleRef) -> *mut c_char = "LLVMPrintModuleToString";
    fn print_module_to_file(
        module: ModuleRef,
        filename: *const c_char,
        error_message: *mut *mut c_char,
    ) -> AbiBool = "LLVMPrintModuleToFile";
    fn verify_module(
        module: ModuleRef,
        action: VerifierFailureAction,
        out_message: *mut *mut c_char,
    ) -> AbiBool = "LLVMVerifyModule";
    fn set_target(module: ModuleRef, triple: *const c_char) = "LLVMSetTarget";
    fn get_target(module: ModuleRef) -> *const c_char = "LLVMGetTarget";
    fn set_data_layout(module: ModuleRef, layout: *const c_char) = "LLVMSetDataLayout";
    fn get_named_function(module: ModuleRef, name: *const c_char) -> ValueRef = "LLVMGetNamedFunction";
    fn add_function(module: ModuleRef, name: *const c_char, function_type: TypeRef) -> ValueRef
        = "LLVMAddFunction";

    // Types
    fn int_type_in_context(context: ContextRef, num_bits: c_uint) -> TypeRef = "LLVMIntTypeInContext";
    fn void_type_in_context(context: ContextRef) -> TypeRef = "LLVMVoidTypeInContext";
    fn function_type(
        return_type: TypeRef,
        param_types: *mut TypeRef,
        param_count: c_uint,
        is_var_arg: AbiBool,
    ) -> TypeRef = "LLVMFunctionType";
    fn count_param_types(function_type: TypeRef) -> c_uint = "LLVMCountParamTypes";
    fn get_param_types(function_type: TypeRef, dest: *mut TypeRef) = "LLVMGetParamTypes";
    fn is_function_var_arg(function_type: TypeRef) -> AbiBool = "LLVMIsFunctionVarArg";
    fn struct_type_in_context(
        context: ContextRef,
        element_types: *mut TypeRef,
        element_count: c_uint,
        packed: AbiBool,
    ) -> TypeRef = "LLVMStructTypeInContext";
    fn count_struct_element_types(struct_type: TypeRef) -> c_uint = "LLVMCountStructElementTypes";
    fn get_struct_element_types(struct_type: TypeRef, dest: *mut TypeRef) = "LLVMGetStructElementTypes";
    fn is_packed_struct(struct_type: TypeRef) -> AbiBool = "LLVMIsPackedStruct";
    fn type_of(value: ValueRef) -> TypeRef = "LLVMTypeOf";
    fn global_get_value_type(global: ValueRef) -> TypeRef = "LLVMGlobalGetValueType";

    // Values
    fn count_params(function: ValueRef) -> c_uint = "LLVMCountParams";
    fn get_params(function: ValueRef, params: *mut ValueRef) = "LLVMGetParams";
    fn get_param(function: ValueRef, index: c_uint) -> ValueRef = "LLVMGetParam";
    fn set_value_name2(value: ValueRef, name: *const c_char, name_len: usize) = "LLVMSetValueName2";
    /// The returned string is borrowed from the value and must not be released.
    fn get_value_name2(value: ValueRef, length: *mut usize) -> *const c_char = "LLVMGetValueName2";
    fn const_int(int_type: TypeRef, n: c_ulonglong, sign_extend: AbiBool) -> ValueRef = "LLVMConstInt";
    fn append_basic_block_in_context(
        context: ContextRef,
        function: ValueRef,
        name: *const c_char,
    ) -> BasicBlockRef = "LLVMAppendBasicBlockInContext";
    fn basic_block_as_value(block: BasicBlockRef) -> ValueRef = "LLVMBasicBlockAsValue";
    fn value_as_basic_block(value: ValueRef) -> BasicBlockRef = "LLVMValueAsBasicBlock";

    // Builder
    fn create_builder_in_context(context: ContextRef) -> BuilderRef = "LLVMCreateBuilderInContext";
    fn dispose_builder(builder: BuilderRef) = "LLVMDisposeBuilder";
    fn position_builder_at_end(builder: BuilderRef, block: BasicBlockRef) = "LLVMPositionBuilderAtEnd";
    fn build_add(builder: BuilderRef, lhs: ValueRef, rhs: ValueRef, name: *const c_char) -> ValueRef
        = "LLVMBuildAdd";
    fn build_ret(builder: BuilderRef, value: ValueRef) -> ValueRef = "LLVMBuildRet";
    fn build_ret_void(builder: BuilderRef) -> ValueRef = "LLVMBuildRetVoid";
    fn build_call2(
        builder: BuilderRef,
        function_type: TypeRef,
        function: ValueRef,
        args: *mut ValueRef,
        num_args: c_uint,
        name: *const c_char,
    ) -> ValueRef = "LLVMBuildCall2";

    // IR input
    fn create_memory_buffer_with_memory_range_copy(
        input_data: *const c_char,
        input_data_length: usize,
        buffer_name: *const c_char,
    ) -> MemoryBufferRef = "LLVMCreateMemoryBufferWithMemoryRangeCopy";
    fn create_memory_buffer_with_contents_of_file(
        path: *const c_char,
        out_mem_buf: *mut MemoryBufferRef,
        out_message: *mut *mut c_char,
    ) -> AbiBool = "LLVMCreateMemoryBufferWithContentsOfFile";
    fn dispose_memory_buffer(mem_buf: MemoryBufferRef) = "LLVMDisposeMemoryBuffer";
    /// Takes ownership of `mem_buf` whether or not parsing succeeds.
    fn parse_ir_in_context(
        context: ContextRef,
        mem_buf: MemoryBufferRef,
        out_module: *mut ModuleRef,
        out_message: *mut *mut c_char,
    ) -> AbiBool = "LLVMParseIRInContext";

    // Execution engine
    fn link_in_mcjit() = "LLVMLinkInMCJIT";
    fn initialize_mcjit_compiler_options(options: *mut McjitCompilerOptions, size_of_options: usize)
        = "LLVMInitializeMCJITCompilerOptions";
    /// Takes ownership of `module` whether or not creation succeeds.
    fn create_mcjit_compiler_for_module(
        out_jit: *mut ExecutionEngineRef,
        module: ModuleRef,
        options: *mut McjitCompilerOptions,
        size_of_options: usize,
        out_error: *mut *mut c_char,
    ) -> AbiBool = "LLVMCreateMCJITCompilerForModule";
    fn get_function_address(engine: ExecutionEngineRef, name: *const c_char) -> u64
        = "LLVMGetFunctionAddress";
    fn dispose_execution_engine(engine: ExecutionEngineRef) = "LLVMDisposeExecutionEngine";

    // New pass manager
    fn create_pass_builder_options() -> PassBuilderOptionsRef = "LLVMCreatePassBuilderOptions";
    fn dispose_pass_builder_options(options: PassBuilderOptionsRef) = "LLVMDisposePassBuilderOptions";
    fn pass_builder_options_set_verify_each(options: PassBuilderOptionsRef, verify_each: AbiBool)
        = "LLVMPassBuilderOptionsSetVerifyEach";
    fn pass_builder_options_set_debug_logging(options: PassBuilderOptionsRef, debug_logging: AbiBool)
        = "LLVMPassBuilderOptionsSetDebugLogging";
    fn run_passes(
        module: ModuleRef,
        passes: *const c_char,
        target_machine: TargetMachineRef,
        options: PassBuilderOptionsRef,
    ) -> ErrorRef = "LLVMRunPasses";
}

unsafe fn resolve_symbol<T: Copy>(
    library: &Library,
    library_name: &str,
    symbol: &str,
) -> Result<T, LoadError> {
    library
        .get::<T>(symbol.as_bytes())
        .map(|sym| *sym)
        .map_err(|_| LoadError::SymbolNotFound {
            library: library_name.to_string(),
            symbol: symbol.to_string(),
        })
}

type TargetInit = unsafe extern "C" fn();

/// Per-architecture symbols behind `LLVMInitializeNativeTarget`
fn native_target_symbols() -> Option<[String; 4]> {
    let arch = if cfg!(any(target_arch = "x86_64", target_arch = "x86")) {
        "X86"
    } else if cfg!(target_arch = "aarch64") {
        "AArch64"
    } else if cfg!(target_arch = "arm") {
        "ARM"
    } else if cfg!(target_arch = "riscv64") {
        "RISCV"
    } else if cfg!(target_arch = "powerpc64") {
        "PowerPC"
    } else {
        return None;
    };
    Some(
        ["TargetInfo", "Target", "TargetMC", "AsmPrinter"]
            .map(|part| format!("LLVMInitialize{}{}", arch, part)),
    )
}

/// LLVM-C loaded from a shared library
pub struct LibraryApi {
    symbols: SymbolTable,
    native_target: Option<[TargetInit; 4]>,
    path: PathBuf,
    // Declared last: dropped after the symbol table that points into it
    _library: Library,
}

impl LibraryApi {
    /// Resolve, open, and bind the library described by `spec`
    ///
    /// # Safety
    ///
    /// Opening a shared library runs its initialisers. The library must be a
    /// genuine LLVM build whose C API matches these declarations.
    pub unsafe fn open(spec: &LibrarySpec) -> Result<Self, LoadError> {
        let (path, library) = LibraryLoader::new(spec).open()?;
        let name = path.display().to_string();
        let symbols = SymbolTable::resolve(&library, &name)?;

        let native_target = native_target_symbols().and_then(|names| {
            let mut fns = [noop_target_init as TargetInit; 4];
            for (slot, symbol) in fns.iter_mut().zip(names.iter()) {
                *slot = resolve_symbol::<TargetInit>(&library, &name, symbol).ok()?;
            }
            Some(fns)
        });
        if native_target.is_none() {
            log::debug!("no native target initialisers found in {}", name);
        }

        log::debug!("bound {} LLVM-C symbols from {}", SYMBOLS.len(), name);
        Ok(Self {
            symbols,
            native_target,
            path,
            _library: library,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

unsafe extern "C" fn noop_target_init() {}

/// A shared API table together with the text convention for native strings
///
/// Cheap to clone; every safe wrapper holds one.
#[derive(Clone)]
pub struct Native {
    table: Arc<dyn NativeApi>,
    encoding: MessageEncoding,
}

impl Native {
    pub fn new(table: Arc<dyn NativeApi>, encoding: MessageEncoding) -> Self {
        Self { table, encoding }
    }

    pub fn encoding(&self) -> MessageEncoding {
        self.encoding
    }

    pub fn table(&self) -> &Arc<dyn NativeApi> {
        &self.table
    }

    /// Run a call that reports through a `char **OutMessage` parameter
    ///
    /// The message is materialised and released before this returns, on every
    /// path. A null message is `None` regardless of the call's status.
    pub fn call_with_message<R, F>(&self, call: F) -> (R, Option<String>)
    where
        F: FnOnce(*mut *mut c_char) -> R,
    {
        message::call_with_message(&*self.table, self.encoding, call)
    }

    /// Take ownership of a string returned by an `LLVMDisposeMessage` API
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a message allocated by the native library that
    /// nobody else will release.
    pub unsafe fn take_message(&self, ptr: *mut c_char) -> Option<String> {
        OwnedMessage::from_raw(&*self.table, ptr, MessageRelease::DisposeMessage)
            .into_string(self.encoding)
    }

    /// Convert an `LLVMErrorRef` into its message, consuming the error
    ///
    /// `None` means success (a null error). A failure always yields `Some`,
    /// possibly with empty text.
    ///
    /// # Safety
    ///
    /// `error` must be null or an unconsumed error returned by the library.
    pub unsafe fn take_error(&self, error: ErrorRef) -> Option<String> {
        message::error_message(&*self.table, error, self.encoding)
    }
}

impl Deref for Native {
    type Target = dyn NativeApi;

    fn deref(&self) -> &Self::Target {
        &*self.table
    }
}

impl std::fmt::Debug for Native {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Native")
            .field("encoding", &self.encoding)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_symbol_names_unique() {
        let unique: HashSet<_> = SYMBOLS.iter().collect();
        assert_eq!(unique.len(), SYMBOLS.len());
    }

    #[test]
    fn test_symbol_names_are_llvm_c() {
        assert!(SYMBOLS.iter().all(|s| s.starts_with("LLVM")));
        assert!(SYMBOLS.contains(&"LLVMDisposeMessage"));
        assert!(SYMBOLS.contains(&"LLVMCreateMCJITCompilerForModule"));
    }

    #[test]
    fn test_native_target_symbols_for_host() {
        if cfg!(target_arch = "x86_64") {
            let names = native_target_symbols().unwrap();
            assert_eq!(names[1], "LLVMInitializeX86Target");
        }
    }

    #[test]
    fn test_open_missing_library() {
        let spec = LibrarySpec::path("/nonexistent/dir/libLLVM-missing.so");
        let result = unsafe { LibraryApi::open(&spec) };
        assert!(matches!(result, Err(LoadError::LibraryNotFound(_))));
    }
}
