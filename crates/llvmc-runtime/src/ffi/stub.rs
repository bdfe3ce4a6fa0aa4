//! In-process test double for the LLVM library
//!
//! [`StubApi`] implements [`NativeApi`] as a handle registry with an ordered
//! call journal. It models what the marshaling layer depends on and nothing
//! more:
//! - which handles are live and who owns them: disposing a module drops its
//!   functions, their parameters, blocks and instructions; disposing a context
//!   drops its types and constants
//! - arrays, read only when the count is nonzero
//! - messages as real heap buffers that must come back through the matching
//!   release function
//! - ownership transfer: modules passed to `LLVMCreateMCJITCompilerForModule`
//!   and buffers passed to `LLVMParseIRInContext` are consumed on every path
//!
//! It does not read, print or check IR. Parsing keeps the buffer text and
//! printing returns it; verification, pass pipelines and engine creation
//! succeed unless a failure was queued with [`StubApi::fail_next`].
//!
//! Calls that name a handle the registry no longer holds are counted by
//! [`StubApi::stale_handles`].

use crate::ffi::abi_bool::AbiBool;
use crate::ffi::api::NativeApi;
use crate::ffi::handle::{
    BasicBlockRef, BuilderRef, ContextRef, ErrorRef, ExecutionEngineRef, Handle, HandleKind,
    MemoryBufferRef, ModuleRef, PassBuilderOptionsRef, TargetMachineRef, TypeRef, ValueRef,
};
use crate::ffi::layout::{CodeModel, McjitCompilerOptions, VerifierFailureAction};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_uint, c_ulonglong};

/// Array argument as observed by the stub
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayArg {
    pub count: u32,
    pub non_null: bool,
}

/// One journal entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StubCall {
    pub symbol: &'static str,
    /// Address of the primary handle argument, 0 when there is none
    pub handle: usize,
    pub array: Option<ArrayArg>,
    /// String argument, if the call takes one
    pub text: Option<String>,
    /// Scalar argument (bit width, option value, struct size)
    pub value: Option<u64>,
    /// Address returned, 0 for null or none
    pub result: usize,
}

impl StubCall {
    fn new(symbol: &'static str) -> Self {
        Self {
            symbol,
            ..Self::default()
        }
    }

    fn handle<K: HandleKind>(mut self, handle: Handle<K>) -> Self {
        self.handle = handle.addr();
        self
    }

    fn array<T>(mut self, ptr: *const T, count: c_uint) -> Self {
        self.array = Some(ArrayArg {
            count,
            non_null: !ptr.is_null(),
        });
        self
    }

    fn text(mut self, text: Option<String>) -> Self {
        self.text = text;
        self
    }

    fn value(mut self, value: u64) -> Self {
        self.value = Some(value);
        self
    }

    fn result(mut self, addr: usize) -> Self {
        self.result = addr;
        self
    }
}

/// MCJIT settings as received by `LLVMCreateMCJITCompilerForModule`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JitSettings {
    pub opt_level: u32,
    pub code_model: CodeModel,
    pub no_frame_pointer_elim: bool,
    pub fast_isel: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MessageKind {
    Message,
    ErrorMessage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TypeDef {
    Void,
    Int(u32),
    Function {
        ret: usize,
        params: Vec<usize>,
        var_arg: bool,
    },
    Struct {
        elements: Vec<usize>,
        packed: bool,
    },
}

#[derive(Debug)]
enum ValueKind {
    Function { params: Vec<usize>, blocks: usize },
    Param,
    Constant,
    Instruction,
}

#[derive(Debug)]
struct ValueDef {
    ty: usize,
    name: CString,
    kind: ValueKind,
}

#[derive(Debug)]
enum Object {
    Context,
    Module {
        name: String,
        text: Option<String>,
        target: CString,
    },
    Type(TypeDef),
    Value(ValueDef),
    Block,
    Builder { block: usize },
    MemoryBuffer { name: String, contents: Vec<u8> },
    Engine { module: usize },
    PassOptions,
    Error(String),
}

impl Object {
    fn is_resource(&self) -> bool {
        !matches!(self, Object::Type(_) | Object::Value(_) | Object::Block)
    }
}

#[derive(Debug)]
struct Entry {
    /// Address of the object this one is released with, 0 for none
    owner: usize,
    object: Object,
}

struct StubState {
    next_addr: usize,
    objects: BTreeMap<usize, Entry>,
    messages: HashMap<usize, MessageKind>,
    journal: Vec<StubCall>,
    failures: HashMap<&'static str, VecDeque<String>>,
    double_releases: usize,
    mismatched_releases: usize,
    stale_handles: usize,
    global_context: Option<usize>,
    version: (u32, u32, u32),
    last_jit: Option<JitSettings>,
    command_line: Vec<String>,
}

impl StubState {
    fn new() -> Self {
        Self {
            next_addr: 0x1000,
            objects: BTreeMap::new(),
            messages: HashMap::new(),
            journal: Vec::new(),
            failures: HashMap::new(),
            double_releases: 0,
            mismatched_releases: 0,
            stale_handles: 0,
            global_context: None,
            version: (18, 1, 8),
            last_jit: None,
            command_line: Vec::new(),
        }
    }

    fn alloc(&mut self, owner: usize, object: Object) -> usize {
        let addr = self.next_addr;
        self.next_addr += 0x10;
        self.objects.insert(addr, Entry { owner, object });
        addr
    }

    fn is_live(&self, addr: usize) -> bool {
        self.objects.contains_key(&addr)
    }

    fn get(&self, addr: usize) -> Option<&Object> {
        self.objects.get(&addr).map(|e| &e.object)
    }

    fn get_mut(&mut self, addr: usize) -> Option<&mut Object> {
        self.objects.get_mut(&addr).map(|e| &mut e.object)
    }

    fn owner(&self, addr: usize) -> usize {
        self.objects.get(&addr).map(|e| e.owner).unwrap_or(0)
    }

    /// Remove `addr` and everything it owns, transitively
    fn drop_tree(&mut self, addr: usize) -> Option<Object> {
        let entry = self.objects.remove(&addr)?;
        let owned: Vec<usize> = self
            .objects
            .iter()
            .filter(|(_, e)| e.owner == addr)
            .map(|(a, _)| *a)
            .collect();
        for child in owned {
            self.drop_tree(child);
        }
        Some(entry.object)
    }

    fn release(&mut self, addr: usize) {
        if addr == 0 || self.drop_tree(addr).is_none() {
            self.double_releases += 1;
            log::trace!("stub: release of unknown object {:#x}", addr);
        }
    }

    // Record before the call changes the registry, so a stale argument is
    // told apart from one the call itself consumes
    fn record(&mut self, call: StubCall) {
        if call.handle != 0 && !self.is_live(call.handle) {
            self.stale_handles += 1;
            log::trace!("stub: {} on stale handle {:#x}", call.symbol, call.handle);
        }
        self.journal.push(call);
    }

    fn take_failure(&mut self, symbol: &'static str) -> Option<String> {
        self.failures.get_mut(symbol)?.pop_front()
    }

    fn new_message(&mut self, bytes: &[u8], kind: MessageKind) -> *mut c_char {
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        let ptr = CString::new(&bytes[..end]).unwrap_or_default().into_raw();
        self.messages.insert(ptr as usize, kind);
        ptr
    }

    unsafe fn free_message(&mut self, ptr: *mut c_char, kind: MessageKind) {
        if ptr.is_null() {
            self.double_releases += 1;
            return;
        }
        match self.messages.remove(&(ptr as usize)) {
            Some(allocated) => {
                if allocated != kind {
                    self.mismatched_releases += 1;
                }
                drop(CString::from_raw(ptr));
            }
            None => self.double_releases += 1,
        }
    }

    unsafe fn write_message(&mut self, out: *mut *mut c_char, text: &str) {
        if !out.is_null() {
            *out = self.new_message(text.as_bytes(), MessageKind::Message);
        }
    }

    fn intern_type(&mut self, context: usize, def: TypeDef) -> usize {
        let existing = self.objects.iter().find_map(|(addr, e)| match &e.object {
            Object::Type(t) if e.owner == context && *t == def => Some(*addr),
            _ => None,
        });
        existing.unwrap_or_else(|| self.alloc(context, Object::Type(def)))
    }

    fn type_def(&self, addr: usize) -> Option<&TypeDef> {
        match self.get(addr) {
            Some(Object::Type(def)) => Some(def),
            _ => None,
        }
    }

    fn value(&self, addr: usize) -> Option<&ValueDef> {
        match self.get(addr) {
            Some(Object::Value(def)) => Some(def),
            _ => None,
        }
    }

    fn new_value(&mut self, owner: usize, ty: usize, name: &[u8], kind: ValueKind) -> usize {
        let name = CString::new(name).unwrap_or_default();
        self.alloc(owner, Object::Value(ValueDef { ty, name, kind }))
    }

    fn add_function(&mut self, module: usize, name: &str, function_type: usize) -> usize {
        let param_types = match self.type_def(function_type) {
            Some(TypeDef::Function { params, .. }) => params.clone(),
            _ => Vec::new(),
        };
        let function = self.new_value(
            module,
            function_type,
            name.as_bytes(),
            ValueKind::Function {
                params: Vec::new(),
                blocks: 0,
            },
        );
        let params: Vec<usize> = param_types
            .into_iter()
            .map(|ty| self.new_value(function, ty, b"", ValueKind::Param))
            .collect();
        if let Some(Object::Value(ValueDef {
            kind: ValueKind::Function { params: slot, .. },
            ..
        })) = self.get_mut(function)
        {
            *slot = params;
        }
        function
    }

    fn functions(&self, module: usize) -> impl Iterator<Item = (usize, &ValueDef)> {
        self.objects.iter().filter_map(move |(addr, e)| match &e.object {
            Object::Value(def @ ValueDef {
                kind: ValueKind::Function { .. },
                ..
            }) if e.owner == module => Some((*addr, def)),
            _ => None,
        })
    }

    fn find_function(&self, module: usize, name: &str) -> Option<usize> {
        self.functions(module)
            .find(|(_, def)| def.name.as_bytes() == name.as_bytes())
            .map(|(addr, _)| addr)
    }

    fn params(&self, function: usize) -> Vec<usize> {
        match self.value(function) {
            Some(ValueDef {
                kind: ValueKind::Function { params, .. },
                ..
            }) => params.clone(),
            _ => Vec::new(),
        }
    }

    fn has_body(&self, function: usize) -> bool {
        matches!(
            self.value(function),
            Some(ValueDef {
                kind: ValueKind::Function { blocks, .. },
                ..
            }) if *blocks > 0
        )
    }

    fn module_text(&self, module: usize) -> String {
        match self.get(module) {
            Some(Object::Module {
                text: Some(text), ..
            }) => text.clone(),
            Some(Object::Module { name, .. }) => format!("; ModuleID = '{}'\n", name),
            _ => String::new(),
        }
    }

    /// An instruction inserted at the builder's current block
    fn instruction(&mut self, builder: usize, ty: usize, name: &[u8]) -> usize {
        let block = match self.get(builder) {
            Some(Object::Builder { block }) => *block,
            _ => 0,
        };
        self.new_value(block, ty, name, ValueKind::Instruction)
    }
}

unsafe fn read_text(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        None
    } else {
        Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
    }
}

// Reads nothing when the count is zero; the pointer may be a placeholder
unsafe fn read_array<T: Copy>(ptr: *const T, count: c_uint) -> Vec<T> {
    if count == 0 || ptr.is_null() {
        Vec::new()
    } else {
        std::slice::from_raw_parts(ptr, count as usize).to_vec()
    }
}

unsafe fn write_array<T>(dest: *mut T, items: impl IntoIterator<Item = T>) {
    for (i, item) in items.into_iter().enumerate() {
        *dest.add(i) = item;
    }
}

/// Native API implemented in process, with an ordered call journal
pub struct StubApi {
    state: Mutex<StubState>,
}

impl StubApi {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StubState::new()),
        }
    }

    /// Every call so far, in order
    pub fn calls(&self) -> Vec<StubCall> {
        self.state.lock().journal.clone()
    }

    /// Calls to one symbol, in order
    pub fn calls_to(&self, symbol: &str) -> Vec<StubCall> {
        self.state
            .lock()
            .journal
            .iter()
            .filter(|c| c.symbol == symbol)
            .cloned()
            .collect()
    }

    pub fn count(&self, symbol: &str) -> usize {
        self.state
            .lock()
            .journal
            .iter()
            .filter(|c| c.symbol == symbol)
            .count()
    }

    pub fn clear_calls(&self) {
        self.state.lock().journal.clear();
    }

    /// Make the next call to `symbol` report failure with `message`
    ///
    /// Honoured by `LLVMVerifyModule`, `LLVMParseIRInContext`, `LLVMRunPasses`
    /// and `LLVMCreateMCJITCompilerForModule`. Queued failures are used in
    /// order.
    pub fn fail_next(&self, symbol: &'static str, message: &str) {
        self.state
            .lock()
            .failures
            .entry(symbol)
            .or_default()
            .push_back(message.to_string());
    }

    /// Messages handed out and not yet released
    pub fn live_messages(&self) -> usize {
        self.state.lock().messages.len()
    }

    /// Contexts, modules, builders, buffers, engines, pass options and errors
    /// still alive
    pub fn live_resources(&self) -> usize {
        self.state
            .lock()
            .objects
            .values()
            .filter(|e| e.object.is_resource())
            .count()
    }

    /// Releases of objects or messages that were not live
    pub fn double_releases(&self) -> usize {
        self.state.lock().double_releases
    }

    /// Messages released through the wrong dispose function
    pub fn mismatched_releases(&self) -> usize {
        self.state.lock().mismatched_releases
    }

    /// Calls whose primary handle argument was no longer live
    pub fn stale_handles(&self) -> usize {
        self.state.lock().stale_handles
    }

    /// A message as `LLVMPrintModuleToString` would return it
    pub fn create_message(&self, bytes: &[u8]) -> *mut c_char {
        self.state.lock().new_message(bytes, MessageKind::Message)
    }

    /// A failure value as `LLVMRunPasses` would return it
    pub fn create_error(&self, bytes: &[u8]) -> ErrorRef {
        let text = String::from_utf8_lossy(bytes).into_owned();
        ErrorRef::from_addr(self.state.lock().alloc(0, Object::Error(text)))
    }

    pub fn set_version(&self, major: u32, minor: u32, patch: u32) {
        self.state.lock().version = (major, minor, patch);
    }

    /// Options received by the last execution engine creation
    pub fn last_jit_settings(&self) -> Option<JitSettings> {
        self.state.lock().last_jit
    }

    /// Arguments received by `LLVMParseCommandLineOptions`
    pub fn command_line(&self) -> Vec<String> {
        self.state.lock().command_line.clone()
    }

    pub fn is_live<K: HandleKind>(&self, handle: Handle<K>) -> bool {
        self.state.lock().is_live(handle.addr())
    }
}

impl Default for StubApi {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StubApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("StubApi")
            .field("objects", &state.objects.len())
            .field("messages", &state.messages.len())
            .field("calls", &state.journal.len())
            .finish()
    }
}

impl NativeApi for StubApi {
    unsafe fn context_create(&self) -> ContextRef {
        let mut s = self.state.lock();
        let addr = s.alloc(0, Object::Context);
        s.record(StubCall::new("LLVMContextCreate").result(addr));
        ContextRef::from_addr(addr)
    }

    unsafe fn context_dispose(&self, context: ContextRef) {
        let mut s = self.state.lock();
        s.record(StubCall::new("LLVMContextDispose").handle(context));
        s.release(context.addr());
    }

    unsafe fn get_global_context(&self) -> ContextRef {
        let mut s = self.state.lock();
        let addr = match s.global_context {
            Some(addr) => addr,
            None => {
                let addr = s.alloc(0, Object::Context);
                s.global_context = Some(addr);
                addr
            }
        };
        s.record(StubCall::new("LLVMGetGlobalContext").result(addr));
        ContextRef::from_addr(addr)
    }

    unsafe fn dispose_message(&self, message: *mut c_char) {
        let mut s = self.state.lock();
        s.record(StubCall::new("LLVMDisposeMessage").result(message as usize));
        s.free_message(message, MessageKind::Message);
    }

    unsafe fn get_error_message(&self, error: ErrorRef) -> *mut c_char {
        let mut s = self.state.lock();
        s.record(StubCall::new("LLVMGetErrorMessage").handle(error));
        match s.objects.remove(&error.addr()).map(|e| e.object) {
            Some(Object::Error(text)) => s.new_message(text.as_bytes(), MessageKind::ErrorMessage),
            _ => {
                s.double_releases += 1;
                std::ptr::null_mut()
            }
        }
    }

    unsafe fn dispose_error_message(&self, message: *mut c_char) {
        let mut s = self.state.lock();
        s.record(StubCall::new("LLVMDisposeErrorMessage").result(message as usize));
        s.free_message(message, MessageKind::ErrorMessage);
    }

    unsafe fn get_version(&self, major: *mut c_uint, minor: *mut c_uint, patch: *mut c_uint) {
        let mut s = self.state.lock();
        s.record(StubCall::new("LLVMGetVersion"));
        let (ma, mi, pa) = s.version;
        for (out, value) in [(major, ma), (minor, mi), (patch, pa)] {
            if !out.is_null() {
                *out = value;
            }
        }
    }

    unsafe fn parse_command_line_options(
        &self,
        argc: c_int,
        argv: *const *const c_char,
        overview: *const c_char,
    ) {
        let mut s = self.state.lock();
        let count = argc.max(0) as c_uint;
        let args: Vec<String> = read_array(argv, count)
            .into_iter()
            .filter_map(|p| read_text(p))
            .collect();
        s.record(
            StubCall::new("LLVMParseCommandLineOptions")
                .array(argv, count)
                .text(read_text(overview)),
        );
        s.command_line = args;
    }

    unsafe fn module_create_with_name_in_context(
        &self,
        name: *const c_char,
        context: ContextRef,
    ) -> ModuleRef {
        let mut s = self.state.lock();
        let text = read_text(name);
        s.record(
            StubCall::new("LLVMModuleCreateWithNameInContext")
                .handle(context)
                .text(text.clone()),
        );
        let addr = s.alloc(
            0,
            Object::Module {
                name: text.unwrap_or_default(),
                text: None,
                target: CString::default(),
            },
        );
        if let Some(call) = s.journal.last_mut() {
            call.result = addr;
        }
        ModuleRef::from_addr(addr)
    }

    unsafe fn dispose_module(&self, module: ModuleRef) {
        let mut s = self.state.lock();
        s.record(StubCall::new("LLVMDisposeModule").handle(module));
        s.release(module.addr());
    }

    unsafe fn print_module_to_string(&self, module: ModuleRef) -> *mut c_char {
        let mut s = self.state.lock();
        s.record(StubCall::new("LLVMPrintModuleToString").handle(module));
        let text = s.module_text(module.addr());
        let ptr = s.new_message(text.as_bytes(), MessageKind::Message);
        if let Some(call) = s.journal.last_mut() {
            call.result = ptr as usize;
        }
        ptr
    }

    unsafe fn print_module_to_file(
        &self,
        module: ModuleRef,
        filename: *const c_char,
        error_message: *mut *mut c_char,
    ) -> AbiBool {
        let mut s = self.state.lock();
        let path = read_text(filename);
        s.record(
            StubCall::new("LLVMPrintModuleToFile")
                .handle(module)
                .text(path.clone()),
        );
        let text = s.module_text(module.addr());
        match std::fs::write(path.unwrap_or_default(), text) {
            Ok(()) => AbiBool::FALSE,
            Err(e) => {
                s.write_message(error_message, &e.to_string());
                AbiBool::TRUE
            }
        }
    }

    unsafe fn verify_module(
        &self,
        module: ModuleRef,
        action: VerifierFailureAction,
        out_message: *mut *mut c_char,
    ) -> AbiBool {
        let mut s = self.state.lock();
        s.record(
            StubCall::new("LLVMVerifyModule")
                .handle(module)
                .value(action as u64),
        );
        let failure = s.take_failure("LLVMVerifyModule");
        // The verifier writes a message whenever it is given a slot
        s.write_message(out_message, failure.as_deref().unwrap_or(""));
        AbiBool::from(failure.is_some())
    }

    unsafe fn set_target(&self, module: ModuleRef, triple: *const c_char) {
        let mut s = self.state.lock();
        let text = read_text(triple);
        s.record(
            StubCall::new("LLVMSetTarget")
                .handle(module)
                .text(text.clone()),
        );
        if let Some(Object::Module { target, .. }) = s.get_mut(module.addr()) {
            *target = CString::new(text.unwrap_or_default()).unwrap_or_default();
        }
    }

    unsafe fn get_target(&self, module: ModuleRef) -> *const c_char {
        let mut s = self.state.lock();
        s.record(StubCall::new("LLVMGetTarget").handle(module));
        match s.get(module.addr()) {
            Some(Object::Module { target, .. }) => target.as_ptr(),
            _ => std::ptr::null(),
        }
    }

    unsafe fn set_data_layout(&self, module: ModuleRef, layout: *const c_char) {
        self.state.lock().record(
            StubCall::new("LLVMSetDataLayout")
                .handle(module)
                .text(read_text(layout)),
        );
    }

    unsafe fn get_named_function(&self, module: ModuleRef, name: *const c_char) -> ValueRef {
        let mut s = self.state.lock();
        let text = read_text(name);
        let found = s
            .find_function(module.addr(), text.as_deref().unwrap_or(""))
            .unwrap_or(0);
        s.record(
            StubCall::new("LLVMGetNamedFunction")
                .handle(module)
                .text(text)
                .result(found),
        );
        ValueRef::from_addr(found)
    }

    unsafe fn add_function(
        &self,
        module: ModuleRef,
        name: *const c_char,
        function_type: TypeRef,
    ) -> ValueRef {
        let mut s = self.state.lock();
        let text = read_text(name);
        s.record(
            StubCall::new("LLVMAddFunction")
                .handle(module)
                .text(text.clone()),
        );
        let addr = s.add_function(
            module.addr(),
            text.as_deref().unwrap_or(""),
            function_type.addr(),
        );
        if let Some(call) = s.journal.last_mut() {
            call.result = addr;
        }
        ValueRef::from_addr(addr)
    }

    unsafe fn int_type_in_context(&self, context: ContextRef, num_bits: c_uint) -> TypeRef {
        let mut s = self.state.lock();
        s.record(
            StubCall::new("LLVMIntTypeInContext")
                .handle(context)
                .value(u64::from(num_bits)),
        );
        let addr = s.intern_type(context.addr(), TypeDef::Int(num_bits));
        if let Some(call) = s.journal.last_mut() {
            call.result = addr;
        }
        TypeRef::from_addr(addr)
    }

    unsafe fn void_type_in_context(&self, context: ContextRef) -> TypeRef {
        let mut s = self.state.lock();
        s.record(StubCall::new("LLVMVoidTypeInContext").handle(context));
        let addr = s.intern_type(context.addr(), TypeDef::Void);
        if let Some(call) = s.journal.last_mut() {
            call.result = addr;
        }
        TypeRef::from_addr(addr)
    }

    unsafe fn function_type(
        &self,
        return_type: TypeRef,
        param_types: *mut TypeRef,
        param_count: c_uint,
        is_var_arg: AbiBool,
    ) -> TypeRef {
        let mut s = self.state.lock();
        s.record(
            StubCall::new("LLVMFunctionType")
                .handle(return_type)
                .array(param_types.cast_const(), param_count),
        );
        let params = read_array(param_types.cast_const(), param_count)
            .into_iter()
            .map(|t| t.addr())
            .collect();
        let context = s.owner(return_type.addr());
        let addr = s.intern_type(
            context,
            TypeDef::Function {
                ret: return_type.addr(),
                params,
                var_arg: is_var_arg.get(),
            },
        );
        if let Some(call) = s.journal.last_mut() {
            call.result = addr;
        }
        TypeRef::from_addr(addr)
    }

    unsafe fn count_param_types(&self, function_type: TypeRef) -> c_uint {
        let mut s = self.state.lock();
        let count = match s.type_def(function_type.addr()) {
            Some(TypeDef::Function { params, .. }) => params.len() as c_uint,
            _ => 0,
        };
        s.record(
            StubCall::new("LLVMCountParamTypes")
                .handle(function_type)
                .value(u64::from(count)),
        );
        count
    }

    unsafe fn get_param_types(&self, function_type: TypeRef, dest: *mut TypeRef) {
        let mut s = self.state.lock();
        let params = match s.type_def(function_type.addr()) {
            Some(TypeDef::Function { params, .. }) => params.clone(),
            _ => Vec::new(),
        };
        s.record(
            StubCall::new("LLVMGetParamTypes")
                .handle(function_type)
                .array(dest.cast_const(), params.len() as c_uint),
        );
        write_array(dest, params.into_iter().map(TypeRef::from_addr));
    }

    unsafe fn is_function_var_arg(&self, function_type: TypeRef) -> AbiBool {
        let mut s = self.state.lock();
        s.record(StubCall::new("LLVMIsFunctionVarArg").handle(function_type));
        AbiBool::from(matches!(
            s.type_def(function_type.addr()),
            Some(TypeDef::Function { var_arg: true, .. })
        ))
    }

    unsafe fn struct_type_in_context(
        &self,
        context: ContextRef,
        element_types: *mut TypeRef,
        element_count: c_uint,
        packed: AbiBool,
    ) -> TypeRef {
        let mut s = self.state.lock();
        s.record(
            StubCall::new("LLVMStructTypeInContext")
                .handle(context)
                .array(element_types.cast_const(), element_count),
        );
        let elements = read_array(element_types.cast_const(), element_count)
            .into_iter()
            .map(|t| t.addr())
            .collect();
        let addr = s.intern_type(
            context.addr(),
            TypeDef::Struct {
                elements,
                packed: packed.get(),
            },
        );
        if let Some(call) = s.journal.last_mut() {
            call.result = addr;
        }
        TypeRef::from_addr(addr)
    }

    unsafe fn count_struct_element_types(&self, struct_type: TypeRef) -> c_uint {
        let mut s = self.state.lock();
        let count = match s.type_def(struct_type.addr()) {
            Some(TypeDef::Struct { elements, .. }) => elements.len() as c_uint,
            _ => 0,
        };
        s.record(
            StubCall::new("LLVMCountStructElementTypes")
                .handle(struct_type)
                .value(u64::from(count)),
        );
        count
    }

    unsafe fn get_struct_element_types(&self, struct_type: TypeRef, dest: *mut TypeRef) {
        let mut s = self.state.lock();
        let elements = match s.type_def(struct_type.addr()) {
            Some(TypeDef::Struct { elements, .. }) => elements.clone(),
            _ => Vec::new(),
        };
        s.record(
            StubCall::new("LLVMGetStructElementTypes")
                .handle(struct_type)
                .array(dest.cast_const(), elements.len() as c_uint),
        );
        write_array(dest, elements.into_iter().map(TypeRef::from_addr));
    }

    unsafe fn is_packed_struct(&self, struct_type: TypeRef) -> AbiBool {
        let mut s = self.state.lock();
        s.record(StubCall::new("LLVMIsPackedStruct").handle(struct_type));
        AbiBool::from(matches!(
            s.type_def(struct_type.addr()),
            Some(TypeDef::Struct { packed: true, .. })
        ))
    }

    unsafe fn type_of(&self, value: ValueRef) -> TypeRef {
        let mut s = self.state.lock();
        s.record(StubCall::new("LLVMTypeOf").handle(value));
        let addr = s.value(value.addr()).map(|v| v.ty).unwrap_or(0);
        if let Some(call) = s.journal.last_mut() {
            call.result = addr;
        }
        TypeRef::from_addr(addr)
    }

    unsafe fn global_get_value_type(&self, global: ValueRef) -> TypeRef {
        let mut s = self.state.lock();
        let addr = s.value(global.addr()).map(|v| v.ty).unwrap_or(0);
        s.record(
            StubCall::new("LLVMGlobalGetValueType")
                .handle(global)
                .result(addr),
        );
        TypeRef::from_addr(addr)
    }

    unsafe fn count_params(&self, function: ValueRef) -> c_uint {
        let mut s = self.state.lock();
        let count = s.params(function.addr()).len() as c_uint;
        s.record(
            StubCall::new("LLVMCountParams")
                .handle(function)
                .value(u64::from(count)),
        );
        count
    }

    unsafe fn get_params(&self, function: ValueRef, params: *mut ValueRef) {
        let mut s = self.state.lock();
        let values = s.params(function.addr());
        s.record(
            StubCall::new("LLVMGetParams")
                .handle(function)
                .array(params.cast_const(), values.len() as c_uint),
        );
        write_array(params, values.into_iter().map(ValueRef::from_addr));
    }

    unsafe fn get_param(&self, function: ValueRef, index: c_uint) -> ValueRef {
        let mut s = self.state.lock();
        let addr = s
            .params(function.addr())
            .get(index as usize)
            .copied()
            .unwrap_or(0);
        s.record(
            StubCall::new("LLVMGetParam")
                .handle(function)
                .value(u64::from(index))
                .result(addr),
        );
        ValueRef::from_addr(addr)
    }

    unsafe fn set_value_name2(&self, value: ValueRef, name: *const c_char, name_len: usize) {
        let mut s = self.state.lock();
        let bytes = if name.is_null() {
            Vec::new()
        } else {
            std::slice::from_raw_parts(name.cast::<u8>(), name_len).to_vec()
        };
        s.record(
            StubCall::new("LLVMSetValueName2")
                .handle(value)
                .text(Some(String::from_utf8_lossy(&bytes).into_owned()))
                .value(name_len as u64),
        );
        if let Some(Object::Value(def)) = s.get_mut(value.addr()) {
            def.name = CString::new(bytes).unwrap_or_default();
        }
    }

    unsafe fn get_value_name2(&self, value: ValueRef, length: *mut usize) -> *const c_char {
        let mut s = self.state.lock();
        s.record(StubCall::new("LLVMGetValueName2").handle(value));
        let (ptr, len) = match s.value(value.addr()) {
            Some(def) => (def.name.as_ptr(), def.name.as_bytes().len()),
            None => (std::ptr::null(), 0),
        };
        if !length.is_null() {
            *length = len;
        }
        ptr
    }

    unsafe fn const_int(&self, int_type: TypeRef, n: c_ulonglong, sign_extend: AbiBool) -> ValueRef {
        let mut s = self.state.lock();
        s.record(
            StubCall::new("LLVMConstInt")
                .handle(int_type)
                .value(n)
                .text(Some(sign_extend.get().to_string())),
        );
        let context = s.owner(int_type.addr());
        let addr = s.new_value(context, int_type.addr(), b"", ValueKind::Constant);
        if let Some(call) = s.journal.last_mut() {
            call.result = addr;
        }
        ValueRef::from_addr(addr)
    }

    unsafe fn append_basic_block_in_context(
        &self,
        context: ContextRef,
        function: ValueRef,
        name: *const c_char,
    ) -> BasicBlockRef {
        let mut s = self.state.lock();
        let text = read_text(name);
        s.record(
            StubCall::new("LLVMAppendBasicBlockInContext")
                .handle(context)
                .text(text),
        );
        if !s.is_live(function.addr()) {
            s.stale_handles += 1;
        }
        let addr = s.alloc(function.addr(), Object::Block);
        if let Some(Object::Value(ValueDef {
            kind: ValueKind::Function { blocks, .. },
            ..
        })) = s.get_mut(function.addr())
        {
            *blocks += 1;
        }
        if let Some(call) = s.journal.last_mut() {
            call.result = addr;
        }
        BasicBlockRef::from_addr(addr)
    }

    unsafe fn basic_block_as_value(&self, block: BasicBlockRef) -> ValueRef {
        let mut s = self.state.lock();
        s.record(
            StubCall::new("LLVMBasicBlockAsValue")
                .handle(block)
                .result(block.addr()),
        );
        block.as_value()
    }

    unsafe fn value_as_basic_block(&self, value: ValueRef) -> BasicBlockRef {
        let mut s = self.state.lock();
        s.record(
            StubCall::new("LLVMValueAsBasicBlock")
                .handle(value)
                .result(value.addr()),
        );
        value.as_basic_block()
    }

    unsafe fn create_builder_in_context(&self, context: ContextRef) -> BuilderRef {
        let mut s = self.state.lock();
        s.record(StubCall::new("LLVMCreateBuilderInContext").handle(context));
        let addr = s.alloc(0, Object::Builder { block: 0 });
        if let Some(call) = s.journal.last_mut() {
            call.result = addr;
        }
        BuilderRef::from_addr(addr)
    }

    unsafe fn dispose_builder(&self, builder: BuilderRef) {
        let mut s = self.state.lock();
        s.record(StubCall::new("LLVMDisposeBuilder").handle(builder));
        s.release(builder.addr());
    }

    unsafe fn position_builder_at_end(&self, builder: BuilderRef, block: BasicBlockRef) {
        let mut s = self.state.lock();
        s.record(
            StubCall::new("LLVMPositionBuilderAtEnd")
                .handle(builder)
                .result(block.addr()),
        );
        if !s.is_live(block.addr()) {
            s.stale_handles += 1;
        }
        if let Some(Object::Builder { block: current }) = s.get_mut(builder.addr()) {
            *current = block.addr();
        }
    }

    unsafe fn build_add(
        &self,
        builder: BuilderRef,
        lhs: ValueRef,
        _rhs: ValueRef,
        name: *const c_char,
    ) -> ValueRef {
        let mut s = self.state.lock();
        let text = read_text(name).unwrap_or_default();
        s.record(
            StubCall::new("LLVMBuildAdd")
                .handle(builder)
                .text(Some(text.clone())),
        );
        let ty = s.value(lhs.addr()).map(|v| v.ty).unwrap_or(0);
        let addr = s.instruction(builder.addr(), ty, text.as_bytes());
        if let Some(call) = s.journal.last_mut() {
            call.result = addr;
        }
        ValueRef::from_addr(addr)
    }

    unsafe fn build_ret(&self, builder: BuilderRef, value: ValueRef) -> ValueRef {
        let mut s = self.state.lock();
        s.record(StubCall::new("LLVMBuildRet").handle(builder));
        if !s.is_live(value.addr()) {
            s.stale_handles += 1;
        }
        let context = s.owner(s.value(value.addr()).map(|v| v.ty).unwrap_or(0));
        let void = s.intern_type(context, TypeDef::Void);
        let addr = s.instruction(builder.addr(), void, b"");
        if let Some(call) = s.journal.last_mut() {
            call.result = addr;
        }
        ValueRef::from_addr(addr)
    }

    unsafe fn build_ret_void(&self, builder: BuilderRef) -> ValueRef {
        let mut s = self.state.lock();
        s.record(StubCall::new("LLVMBuildRetVoid").handle(builder));
        let addr = s.instruction(builder.addr(), 0, b"");
        if let Some(call) = s.journal.last_mut() {
            call.result = addr;
        }
        ValueRef::from_addr(addr)
    }

    unsafe fn build_call2(
        &self,
        builder: BuilderRef,
        function_type: TypeRef,
        function: ValueRef,
        args: *mut ValueRef,
        num_args: c_uint,
        name: *const c_char,
    ) -> ValueRef {
        let mut s = self.state.lock();
        let text = read_text(name).unwrap_or_default();
        s.record(
            StubCall::new("LLVMBuildCall2")
                .handle(builder)
                .array(args.cast_const(), num_args)
                .text(Some(text.clone())),
        );
        let stale = std::iter::once(function)
            .chain(read_array(args.cast_const(), num_args))
            .filter(|v| !s.is_live(v.addr()))
            .count();
        s.stale_handles += stale;
        let ret = match s.type_def(function_type.addr()) {
            Some(TypeDef::Function { ret, .. }) => *ret,
            _ => 0,
        };
        let addr = s.instruction(builder.addr(), ret, text.as_bytes());
        if let Some(call) = s.journal.last_mut() {
            call.result = addr;
        }
        ValueRef::from_addr(addr)
    }

    unsafe fn create_memory_buffer_with_memory_range_copy(
        &self,
        input_data: *const c_char,
        input_data_length: usize,
        buffer_name: *const c_char,
    ) -> MemoryBufferRef {
        let mut s = self.state.lock();
        let contents = if input_data.is_null() {
            Vec::new()
        } else {
            std::slice::from_raw_parts(input_data.cast::<u8>(), input_data_length).to_vec()
        };
        let name = read_text(buffer_name).unwrap_or_default();
        let addr = s.alloc(
            0,
            Object::MemoryBuffer {
                name: name.clone(),
                contents,
            },
        );
        s.record(
            StubCall::new("LLVMCreateMemoryBufferWithMemoryRangeCopy")
                .text(Some(name))
                .value(input_data_length as u64)
                .result(addr),
        );
        MemoryBufferRef::from_addr(addr)
    }

    unsafe fn create_memory_buffer_with_contents_of_file(
        &self,
        path: *const c_char,
        out_mem_buf: *mut MemoryBufferRef,
        out_message: *mut *mut c_char,
    ) -> AbiBool {
        let mut s = self.state.lock();
        let name = read_text(path).unwrap_or_default();
        match std::fs::read(&name) {
            Ok(contents) => {
                let addr = s.alloc(
                    0,
                    Object::MemoryBuffer {
                        name: name.clone(),
                        contents,
                    },
                );
                if !out_mem_buf.is_null() {
                    *out_mem_buf = MemoryBufferRef::from_addr(addr);
                }
                s.record(
                    StubCall::new("LLVMCreateMemoryBufferWithContentsOfFile")
                        .text(Some(name))
                        .result(addr),
                );
                AbiBool::FALSE
            }
            Err(e) => {
                s.record(
                    StubCall::new("LLVMCreateMemoryBufferWithContentsOfFile").text(Some(name)),
                );
                s.write_message(out_message, &e.to_string());
                AbiBool::TRUE
            }
        }
    }

    unsafe fn dispose_memory_buffer(&self, mem_buf: MemoryBufferRef) {
        let mut s = self.state.lock();
        s.record(StubCall::new("LLVMDisposeMemoryBuffer").handle(mem_buf));
        s.release(mem_buf.addr());
    }

    unsafe fn parse_ir_in_context(
        &self,
        context: ContextRef,
        mem_buf: MemoryBufferRef,
        out_module: *mut ModuleRef,
        out_message: *mut *mut c_char,
    ) -> AbiBool {
        let mut s = self.state.lock();
        s.record(StubCall::new("LLVMParseIRInContext").handle(context));
        // The buffer is consumed whether or not parsing succeeds
        let buffer = s.objects.remove(&mem_buf.addr()).map(|e| e.object);
        let (name, contents) = match buffer {
            Some(Object::MemoryBuffer { name, contents }) => (name, contents),
            _ => {
                s.stale_handles += 1;
                s.write_message(out_message, "invalid memory buffer");
                return AbiBool::TRUE;
            }
        };
        if let Some(message) = s.take_failure("LLVMParseIRInContext") {
            s.write_message(out_message, &message);
            return AbiBool::TRUE;
        }
        let module = s.alloc(
            0,
            Object::Module {
                name,
                text: Some(String::from_utf8_lossy(&contents).into_owned()),
                target: CString::default(),
            },
        );
        if !out_module.is_null() {
            *out_module = ModuleRef::from_addr(module);
        }
        if let Some(call) = s.journal.last_mut() {
            call.result = module;
        }
        AbiBool::FALSE
    }

    unsafe fn link_in_mcjit(&self) {
        self.state.lock().record(StubCall::new("LLVMLinkInMCJIT"));
    }

    unsafe fn initialize_mcjit_compiler_options(
        &self,
        options: *mut McjitCompilerOptions,
        size_of_options: usize,
    ) {
        let mut s = self.state.lock();
        s.record(
            StubCall::new("LLVMInitializeMCJITCompilerOptions").value(size_of_options as u64),
        );
        if !options.is_null() && size_of_options == McjitCompilerOptions::SIZE {
            *options = McjitCompilerOptions {
                code_model: CodeModel::JitDefault,
                ..McjitCompilerOptions::default()
            };
        }
    }

    unsafe fn create_mcjit_compiler_for_module(
        &self,
        out_jit: *mut ExecutionEngineRef,
        module: ModuleRef,
        options: *mut McjitCompilerOptions,
        size_of_options: usize,
        out_error: *mut *mut c_char,
    ) -> AbiBool {
        let mut s = self.state.lock();
        s.record(
            StubCall::new("LLVMCreateMCJITCompilerForModule")
                .handle(module)
                .value(size_of_options as u64),
        );
        let settings = if options.is_null() || size_of_options != McjitCompilerOptions::SIZE {
            None
        } else {
            let o = &*options;
            Some(JitSettings {
                opt_level: o.opt_level,
                code_model: o.code_model,
                no_frame_pointer_elim: o.no_frame_pointer_elim.get(),
                fast_isel: o.enable_fast_isel.get(),
            })
        };
        s.last_jit = settings;

        let failure = if !matches!(s.get(module.addr()), Some(Object::Module { .. })) {
            Some("invalid module".to_string())
        } else if settings.is_none() {
            Some("invalid MCJIT compiler options".to_string())
        } else {
            s.take_failure("LLVMCreateMCJITCompilerForModule")
        };

        if let Some(message) = failure {
            // The module and everything in it go away even when creation fails
            s.drop_tree(module.addr());
            s.write_message(out_error, &message);
            return AbiBool::TRUE;
        }
        let engine = s.alloc(
            0,
            Object::Engine {
                module: module.addr(),
            },
        );
        if !out_jit.is_null() {
            *out_jit = ExecutionEngineRef::from_addr(engine);
        }
        if let Some(call) = s.journal.last_mut() {
            call.result = engine;
        }
        AbiBool::FALSE
    }

    unsafe fn get_function_address(&self, engine: ExecutionEngineRef, name: *const c_char) -> u64 {
        let mut s = self.state.lock();
        let text = read_text(name);
        let module = match s.get(engine.addr()) {
            Some(Object::Engine { module }) => *module,
            _ => 0,
        };
        // Only functions with a body get an address
        let address = s
            .find_function(module, text.as_deref().unwrap_or(""))
            .filter(|f| s.has_body(*f))
            .map(|f| 0x7f00_0000_0000 + f as u64)
            .unwrap_or(0);
        s.record(
            StubCall::new("LLVMGetFunctionAddress")
                .handle(engine)
                .text(text)
                .value(address),
        );
        address
    }

    unsafe fn dispose_execution_engine(&self, engine: ExecutionEngineRef) {
        let mut s = self.state.lock();
        s.record(StubCall::new("LLVMDisposeExecutionEngine").handle(engine));
        match s.objects.remove(&engine.addr()).map(|e| e.object) {
            Some(Object::Engine { module }) => s.release(module),
            _ => s.double_releases += 1,
        }
    }

    unsafe fn create_pass_builder_options(&self) -> PassBuilderOptionsRef {
        let mut s = self.state.lock();
        let addr = s.alloc(0, Object::PassOptions);
        s.record(StubCall::new("LLVMCreatePassBuilderOptions").result(addr));
        PassBuilderOptionsRef::from_addr(addr)
    }

    unsafe fn dispose_pass_builder_options(&self, options: PassBuilderOptionsRef) {
        let mut s = self.state.lock();
        s.record(StubCall::new("LLVMDisposePassBuilderOptions").handle(options));
        s.release(options.addr());
    }

    unsafe fn pass_builder_options_set_verify_each(
        &self,
        options: PassBuilderOptionsRef,
        verify_each: AbiBool,
    ) {
        self.state.lock().record(
            StubCall::new("LLVMPassBuilderOptionsSetVerifyEach")
                .handle(options)
                .value(u64::from(verify_each.get())),
        );
    }

    unsafe fn pass_builder_options_set_debug_logging(
        &self,
        options: PassBuilderOptionsRef,
        debug_logging: AbiBool,
    ) {
        self.state.lock().record(
            StubCall::new("LLVMPassBuilderOptionsSetDebugLogging")
                .handle(options)
                .value(u64::from(debug_logging.get())),
        );
    }

    unsafe fn run_passes(
        &self,
        module: ModuleRef,
        passes: *const c_char,
        _target_machine: TargetMachineRef,
        options: PassBuilderOptionsRef,
    ) -> ErrorRef {
        let mut s = self.state.lock();
        s.record(
            StubCall::new("LLVMRunPasses")
                .handle(module)
                .text(read_text(passes)),
        );
        if !s.is_live(options.addr()) {
            s.stale_handles += 1;
        }
        let error = match s.take_failure("LLVMRunPasses") {
            Some(message) => s.alloc(0, Object::Error(message)),
            None => 0,
        };
        if let Some(call) = s.journal.last_mut() {
            call.result = error;
        }
        ErrorRef::from_addr(error)
    }

    unsafe fn initialize_native_target(&self) -> AbiBool {
        self.state
            .lock()
            .record(StubCall::new("LLVMInitializeNativeTarget"));
        AbiBool::FALSE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    unsafe fn function_in(stub: &StubApi, ctx: ContextRef, module: ModuleRef, arity: usize) -> ValueRef {
        let i32_ty = stub.int_type_in_context(ctx, 32);
        let mut params = vec![i32_ty; arity];
        let ty = stub.function_type(i32_ty, params.as_mut_ptr(), arity as c_uint, AbiBool::FALSE);
        let name = CString::new("f").unwrap();
        stub.add_function(module, name.as_ptr(), ty)
    }

    #[test]
    fn test_types_are_uniqued_per_context() {
        let stub = StubApi::new();
        unsafe {
            let ctx = stub.context_create();
            let other = stub.context_create();
            let a = stub.int_type_in_context(ctx, 32);
            let b = stub.int_type_in_context(ctx, 32);
            let c = stub.int_type_in_context(ctx, 64);
            let d = stub.int_type_in_context(other, 32);
            assert_eq!(a, b);
            assert_ne!(a, c);
            assert_ne!(a, d);
            stub.context_dispose(ctx);
            assert!(!stub.is_live(a));
            assert!(stub.is_live(d));
            stub.context_dispose(other);
        }
    }

    #[test]
    fn test_zero_count_array_is_not_read() {
        let stub = StubApi::new();
        unsafe {
            let ctx = stub.context_create();
            let void = stub.void_type_in_context(ctx);
            // A dangling but non-null placeholder must never be dereferenced
            let placeholder = std::ptr::NonNull::<TypeRef>::dangling().as_ptr();
            let ty = stub.function_type(void, placeholder, 0, AbiBool::FALSE);
            assert_eq!(stub.count_param_types(ty), 0);
        }
        let call = stub.calls_to("LLVMFunctionType").remove(0);
        assert_eq!(
            call.array,
            Some(ArrayArg {
                count: 0,
                non_null: true
            })
        );
    }

    #[test]
    fn test_release_of_unknown_object_is_counted() {
        let stub = StubApi::new();
        unsafe {
            let ctx = stub.context_create();
            stub.context_dispose(ctx);
            stub.context_dispose(ctx);
        }
        assert_eq!(stub.double_releases(), 1);
        assert_eq!(stub.stale_handles(), 1);
        assert_eq!(stub.live_resources(), 0);
    }

    #[test]
    fn test_message_released_with_wrong_function() {
        let stub = StubApi::new();
        let message = stub.create_message(b"text");
        unsafe { stub.dispose_error_message(message) };
        assert_eq!(stub.mismatched_releases(), 1);
        assert_eq!(stub.live_messages(), 0);
    }

    #[test]
    fn test_module_dispose_drops_what_it_owns() {
        let stub = StubApi::new();
        unsafe {
            let ctx = stub.context_create();
            let name = CString::new("owner").unwrap();
            let module = stub.module_create_with_name_in_context(name.as_ptr(), ctx);
            let f = function_in(&stub, ctx, module, 2);
            let param = stub.get_param(f, 1);
            let entry = CString::new("entry").unwrap();
            let block = stub.append_basic_block_in_context(ctx, f, entry.as_ptr());
            assert!(stub.is_live(param));
            assert!(stub.is_live(block));

            stub.dispose_module(module);
            assert!(!stub.is_live(f));
            assert!(!stub.is_live(param));
            assert!(!stub.is_live(block));
            assert_eq!(stub.stale_handles(), 0);

            let mut len = 0;
            assert!(stub.get_value_name2(f, &mut len).is_null());
            assert_eq!(stub.stale_handles(), 1);
            stub.context_dispose(ctx);
        }
    }

    #[test]
    fn test_failed_engine_creation_drops_module_contents() {
        let stub = StubApi::new();
        stub.fail_next("LLVMCreateMCJITCompilerForModule", "no targets are registered");
        unsafe {
            let ctx = stub.context_create();
            let name = CString::new("jit").unwrap();
            let module = stub.module_create_with_name_in_context(name.as_ptr(), ctx);
            let f = function_in(&stub, ctx, module, 1);

            let mut options = McjitCompilerOptions::default();
            let mut engine = ExecutionEngineRef::null();
            let mut error = std::ptr::null_mut();
            let failed = stub.create_mcjit_compiler_for_module(
                &mut engine,
                module,
                &mut options,
                McjitCompilerOptions::SIZE,
                &mut error,
            );
            assert!(failed.get());
            assert!(engine.is_null());
            assert!(!stub.is_live(module));
            assert!(!stub.is_live(f));
            assert_eq!(CStr::from_ptr(error).to_str().unwrap(), "no targets are registered");
            stub.dispose_message(error);
            stub.context_dispose(ctx);
        }
        assert_eq!(stub.live_resources(), 0);
        assert_eq!(stub.stale_handles(), 0);
    }

    #[test]
    fn test_engine_dispose_drops_module_contents() {
        let stub = StubApi::new();
        unsafe {
            let ctx = stub.context_create();
            let name = CString::new("jit").unwrap();
            let module = stub.module_create_with_name_in_context(name.as_ptr(), ctx);
            let f = function_in(&stub, ctx, module, 0);
            let mut options = McjitCompilerOptions::default();
            let mut engine = ExecutionEngineRef::null();
            let mut error = std::ptr::null_mut();
            let failed = stub.create_mcjit_compiler_for_module(
                &mut engine,
                module,
                &mut options,
                McjitCompilerOptions::SIZE,
                &mut error,
            );
            assert!(!failed.get());
            assert!(stub.is_live(f));
            stub.dispose_execution_engine(engine);
            assert!(!stub.is_live(f));
            stub.context_dispose(ctx);
        }
        assert_eq!(stub.count("LLVMDisposeModule"), 0);
        assert_eq!(stub.double_releases(), 0);
    }

    #[test]
    fn test_parse_keeps_text_and_consumes_buffer() {
        let stub = StubApi::new();
        // Not IR at all; the stub does not look inside
        let source = "declare i32 @f)(\n";
        unsafe {
            let ctx = stub.context_create();
            let name = CString::new("odd.ll").unwrap();
            let buf = stub.create_memory_buffer_with_memory_range_copy(
                source.as_ptr().cast(),
                source.len(),
                name.as_ptr(),
            );
            let mut module = ModuleRef::null();
            let mut message = std::ptr::null_mut();
            let failed = stub.parse_ir_in_context(ctx, buf, &mut module, &mut message);
            assert!(!failed.get());
            assert!(message.is_null());
            assert!(!stub.is_live(buf));

            let printed = stub.print_module_to_string(module);
            assert_eq!(CStr::from_ptr(printed).to_str().unwrap(), source);
            stub.dispose_message(printed);
            stub.dispose_module(module);
            stub.context_dispose(ctx);
        }
    }

    #[test]
    fn test_queued_failures_are_used_in_order() {
        let stub = StubApi::new();
        stub.fail_next("LLVMVerifyModule", "first");
        stub.fail_next("LLVMVerifyModule", "second");
        unsafe {
            let ctx = stub.context_create();
            let name = CString::new("m").unwrap();
            let module = stub.module_create_with_name_in_context(name.as_ptr(), ctx);
            let mut texts = Vec::new();
            for _ in 0..3 {
                let mut message = std::ptr::null_mut();
                let broken =
                    stub.verify_module(module, VerifierFailureAction::ReturnStatus, &mut message);
                texts.push((broken.get(), CStr::from_ptr(message).to_str().unwrap().to_string()));
                stub.dispose_message(message);
            }
            assert_eq!(
                texts,
                vec![
                    (true, "first".to_string()),
                    (true, "second".to_string()),
                    (false, String::new()),
                ]
            );
            stub.dispose_module(module);
            stub.context_dispose(ctx);
        }
        assert_eq!(stub.live_messages(), 0);
    }
}
