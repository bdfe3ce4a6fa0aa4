//! Library entry point
//!
//! [`Llvm`] binds an API table (a loaded `libLLVM` or the in-process stub) to
//! the runtime options it was configured with. It owns nothing native itself;
//! contexts, modules and engines are created from it and borrow its
//! [`Native`] table.
//!
//! # Examples
//!
//! ```no_run
//! use llvmc_runtime::llvm::AsContext;
//! use llvmc_runtime::runtime::Llvm;
//!
//! let llvm = Llvm::shared().unwrap();
//! let context = llvm.create_context().unwrap();
//! let module = context.create_module("demo").unwrap();
//! println!("{}", module.print_to_string().unwrap());
//! ```

use crate::ffi::api::{LibraryApi, Native, NativeApi, SYMBOLS};
use crate::ffi::array::CStringArray;
use crate::ffi::handle::ContextRef;
use crate::ffi::loader::LibrarySpec;
use crate::ffi::marshal::{MarshalContext, MarshalError, MessageEncoding};
use crate::llvm::context::{Context, GlobalContext};
use crate::llvm::engine::{ExecutionEngine, JitOptions};
use crate::llvm::error::{NativeError, NativeResult};
use crate::llvm::module::Module;
use crate::llvm::passes::PassOptions;
use llvmc_config::{BindingConfig, ConfigError, ConfigLoader};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::os::raw::{c_int, c_uint};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

/// Everything the runtime takes from configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuntimeOptions {
    pub library: LibrarySpec,
    pub encoding: MessageEncoding,
    pub jit: JitOptions,
    pub passes: PassOptions,
}

impl RuntimeOptions {
    pub fn from_config(config: &BindingConfig) -> Self {
        Self {
            library: LibrarySpec::from(&config.library),
            encoding: config.messages.encoding.into(),
            jit: JitOptions::from(&config.jit),
            passes: PassOptions::from(&config.passes),
        }
    }
}

/// `LLVMGetVersion` triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// What was bound, for diagnostics and `llvmc probe`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LibraryInfo {
    /// `None` when the table is not backed by a shared library
    pub path: Option<PathBuf>,
    pub version: Version,
    pub symbols: usize,
}

/// A bound LLVM-C API table plus its runtime options
pub struct Llvm {
    native: Native,
    info: LibraryInfo,
    options: RuntimeOptions,
    // Address of the global context, fetched on first use
    global: OnceLock<usize>,
}

impl Llvm {
    /// Open the library described by `options.library` and bind every symbol
    pub fn load(options: RuntimeOptions) -> NativeResult<Self> {
        // SAFETY: the loader only opens libraries named by configuration,
        // which must be LLVM builds exporting the C API
        let api = unsafe { LibraryApi::open(&options.library) }?;
        let path = api.path().to_path_buf();
        Ok(Self::assemble(Arc::new(api), Some(path), options))
    }

    /// Bind an existing table, such as the in-process stub
    pub fn with_api(api: Arc<dyn NativeApi>, options: RuntimeOptions) -> Self {
        Self::assemble(api, None, options)
    }

    /// The process-wide instance, configured from the layered configuration
    /// of the current directory
    ///
    /// Resolved on first success and kept for the life of the process. A
    /// failed attempt is not cached.
    pub fn shared() -> NativeResult<&'static Llvm> {
        static SHARED: OnceLock<Llvm> = OnceLock::new();
        static INIT: Mutex<()> = parking_lot::const_mutex(());

        if let Some(llvm) = SHARED.get() {
            return Ok(llvm);
        }
        let _guard = INIT.lock();
        if let Some(llvm) = SHARED.get() {
            return Ok(llvm);
        }

        let start = std::env::current_dir().map_err(ConfigError::from)?;
        let loaded = ConfigLoader::new().load_from_directory(&start)?;
        let llvm = Self::load(RuntimeOptions::from_config(&loaded.config))?;
        Ok(SHARED.get_or_init(|| llvm))
    }

    fn assemble(api: Arc<dyn NativeApi>, path: Option<PathBuf>, options: RuntimeOptions) -> Self {
        let native = Native::new(api, options.encoding);
        let version = query_version(&native);
        log::debug!("bound LLVM {}", version);
        Self {
            native,
            info: LibraryInfo {
                path,
                version,
                symbols: SYMBOLS.len(),
            },
            options,
            global: OnceLock::new(),
        }
    }

    pub fn native(&self) -> &Native {
        &self.native
    }

    pub fn info(&self) -> &LibraryInfo {
        &self.info
    }

    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    pub fn version(&self) -> Version {
        self.info.version
    }

    pub fn create_context(&self) -> NativeResult<Context> {
        Context::new(&self.native)
    }

    /// The process-wide context. Never released by this crate.
    pub fn global_context(&self) -> GlobalContext<'_> {
        let addr = *self
            .global
            .get_or_init(|| unsafe { self.native.get_global_context() }.addr());
        GlobalContext::new(&self.native, ContextRef::from_addr(addr))
    }

    /// Force MCJIT to be linked in; required before creating an engine
    pub fn link_in_mcjit(&self) {
        unsafe { self.native.link_in_mcjit() };
    }

    /// Register the host target. Fails when the library was built without it.
    pub fn initialize_native_target(&self) -> NativeResult<()> {
        if unsafe { self.native.initialize_native_target() }.get() {
            return Err(NativeError::NotFound {
                what: "native target".to_string(),
            });
        }
        Ok(())
    }

    /// Forward `args` to LLVM's option parser; `args[0]` is the program name
    ///
    /// The native parser reads `argv[0]` unconditionally, so an empty `args`
    /// is rejected without calling it.
    pub fn parse_command_line_options<S: AsRef<str>>(
        &self,
        args: &[S],
        overview: &str,
    ) -> NativeResult<()> {
        if args.is_empty() {
            return Err(MarshalError::MissingProgramName.into());
        }
        let argv = CStringArray::new(args)?;
        let mut marshal = MarshalContext::new();
        let overview = marshal.c_str(overview)?;
        argv.with_ptrs(|ptr, count| unsafe {
            self.native
                .parse_command_line_options(count as c_int, ptr, overview)
        })?;
        Ok(())
    }

    /// Prepare MCJIT and build an engine for `module` with the configured options
    pub fn create_execution_engine<'c>(
        &self,
        module: Module<'c>,
    ) -> NativeResult<ExecutionEngine<'c>> {
        self.link_in_mcjit();
        self.initialize_native_target()?;
        ExecutionEngine::create(module, &self.options.jit)
    }

    /// Run the configured pass pipeline over `module`
    pub fn optimize(&self, module: &Module<'_>) -> NativeResult<()> {
        module.run_passes(&self.options.passes)
    }
}

impl fmt::Debug for Llvm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Llvm")
            .field("info", &self.info)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

fn query_version(native: &Native) -> Version {
    let (mut major, mut minor, mut patch): (c_uint, c_uint, c_uint) = (0, 0, 0);
    unsafe { native.get_version(&mut major, &mut minor, &mut patch) };
    Version {
        major,
        minor,
        patch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::layout::CodeModel;
    use crate::ffi::stub::StubApi;
    use crate::llvm::context::AsContext;
    use pretty_assertions::assert_eq;

    fn stub_llvm() -> (Arc<StubApi>, Llvm) {
        let stub = Arc::new(StubApi::new());
        let llvm = Llvm::with_api(stub.clone(), RuntimeOptions::default());
        (stub, llvm)
    }

    #[test]
    fn test_info_from_stub() {
        let stub = Arc::new(StubApi::new());
        stub.set_version(17, 0, 6);
        let llvm = Llvm::with_api(stub, RuntimeOptions::default());
        assert_eq!(llvm.version().to_string(), "17.0.6");
        assert_eq!(llvm.info().path, None);
        assert_eq!(llvm.info().symbols, SYMBOLS.len());
    }

    #[test]
    fn test_info_serializes() {
        let (_stub, llvm) = stub_llvm();
        let json = serde_json::to_value(llvm.info()).unwrap();
        assert_eq!(json["version"]["major"], 18);
        assert!(json["path"].is_null());
    }

    #[test]
    fn test_global_context_fetched_once() {
        let (stub, llvm) = stub_llvm();
        let first = llvm.global_context().handle();
        let second = llvm.global_context().handle();
        assert_eq!(first, second);
        assert_eq!(stub.count("LLVMGetGlobalContext"), 1);

        let global = llvm.global_context();
        let module = global.create_module("global").unwrap();
        drop(module);
        assert_eq!(stub.count("LLVMContextDispose"), 0);
    }

    #[test]
    fn test_command_line_forwarded() {
        let (stub, llvm) = stub_llvm();
        llvm.parse_command_line_options(&["llvmc", "-debug-pass=Structure"], "llvmc options")
            .unwrap();
        assert_eq!(
            stub.command_line(),
            vec!["llvmc".to_string(), "-debug-pass=Structure".to_string()]
        );
    }

    #[test]
    fn test_command_line_rejects_interior_nul() {
        let (stub, llvm) = stub_llvm();
        let err = llvm
            .parse_command_line_options(&["llvmc", "bad\0arg"], "")
            .unwrap_err();
        assert!(matches!(err, NativeError::Marshal(_)));
        assert_eq!(stub.count("LLVMParseCommandLineOptions"), 0);
    }

    #[test]
    fn test_command_line_requires_program_name() {
        let (stub, llvm) = stub_llvm();
        let err = llvm
            .parse_command_line_options::<&str>(&[], "llvmc options")
            .unwrap_err();
        assert!(matches!(
            err,
            NativeError::Marshal(MarshalError::MissingProgramName)
        ));
        assert_eq!(stub.count("LLVMParseCommandLineOptions"), 0);
        assert!(stub.command_line().is_empty());
    }

    #[test]
    fn test_engine_with_configured_options() {
        let stub = Arc::new(StubApi::new());
        let options = RuntimeOptions {
            jit: JitOptions {
                opt_level: 1,
                code_model: CodeModel::Large,
                ..JitOptions::default()
            },
            ..RuntimeOptions::default()
        };
        let llvm = Llvm::with_api(stub.clone(), options);
        let ctx = llvm.create_context().unwrap();
        let module = ctx.create_module("jit").unwrap();
        let engine = llvm.create_execution_engine(module).unwrap();
        drop(engine);

        assert_eq!(stub.count("LLVMLinkInMCJIT"), 1);
        assert_eq!(stub.count("LLVMInitializeNativeTarget"), 1);
        let settings = stub.last_jit_settings().unwrap();
        assert_eq!(settings.opt_level, 1);
        assert_eq!(settings.code_model, CodeModel::Large);
    }

    #[test]
    fn test_options_from_config() {
        let config: BindingConfig = toml::from_str(
            r#"
[library]
name = "LLVM-17"

[messages]
encoding = "utf8"

[jit]
opt_level = 3
code_model = "small"

[passes]
pipeline = "function(instcombine)"
verify_each = true
"#,
        )
        .unwrap();
        let options = RuntimeOptions::from_config(&config);
        assert_eq!(options.library.name.as_deref(), Some("LLVM-17"));
        assert_eq!(options.encoding, MessageEncoding::Utf8Lossy);
        assert_eq!(options.jit.opt_level, 3);
        assert_eq!(options.jit.code_model, CodeModel::Small);
        assert_eq!(options.passes.pipeline, "function(instcombine)");
        assert!(options.passes.verify_each);
    }

    #[test]
    fn test_load_missing_library() {
        let options = RuntimeOptions {
            library: LibrarySpec::path("/nonexistent/lib/libLLVM.so"),
            ..RuntimeOptions::default()
        };
        assert!(matches!(Llvm::load(options), Err(NativeError::Load(_))));
    }
}
