//! Reading IR into a module
//!
//! Input goes through an `LLVMMemoryBufferRef`. `LLVMParseIRInContext` takes
//! the buffer over on every path, so the owning wrapper gives it up right
//! before the call.

use crate::ffi::api::Native;
use crate::ffi::handle::{kind, ContextRef, MemoryBufferRef, ModuleRef};
use crate::ffi::marshal::MarshalContext;
use crate::ffi::owned::Owned;
use crate::llvm::error::{failed, NativeResult};
use crate::llvm::module::Module;
use std::path::Path;

pub(crate) fn parse_ir<'c>(
    native: &'c Native,
    context: ContextRef,
    source: &str,
    buffer_name: &str,
) -> NativeResult<Module<'c>> {
    let mut marshal = MarshalContext::new();
    let name = marshal.c_str(buffer_name)?;
    // The range is copied, so `source` need not outlive the buffer
    let buffer = unsafe {
        Owned::create(native.clone(), |api| {
            api.create_memory_buffer_with_memory_range_copy(source.as_ptr().cast(), source.len(), name)
        })
    }?;
    parse_buffer(native, context, buffer)
}

pub(crate) fn parse_ir_file<'c>(
    native: &'c Native,
    context: ContextRef,
    path: &Path,
) -> NativeResult<Module<'c>> {
    let mut marshal = MarshalContext::new();
    let c_path = marshal.c_str(&path.to_string_lossy())?;
    let mut raw = MemoryBufferRef::null();
    let (status, message) = native.call_with_message(|out| unsafe {
        native.create_memory_buffer_with_contents_of_file(c_path, &mut raw, out)
    });
    if status.get() {
        return Err(failed("LLVMCreateMemoryBufferWithContentsOfFile", message));
    }
    let buffer = unsafe { Owned::adopt(native.clone(), raw) }?;
    parse_buffer(native, context, buffer)
}

fn parse_buffer<'c>(
    native: &'c Native,
    context: ContextRef,
    buffer: Owned<kind::MemoryBuffer>,
) -> NativeResult<Module<'c>> {
    let buffer = buffer.into_raw()?;
    let mut module = ModuleRef::null();
    let (status, message) = native.call_with_message(|out| unsafe {
        native.parse_ir_in_context(context, buffer, &mut module, out)
    });
    if status.get() {
        return Err(failed("LLVMParseIRInContext", message));
    }
    Module::adopt(native, context, module)
}

#[cfg(test)]
mod tests {
    use crate::ffi::marshal::MessageEncoding;
    use crate::ffi::stub::StubApi;
    use crate::ffi::Native;
    use crate::llvm::context::{AsContext, Context};
    use crate::llvm::error::NativeError;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::sync::Arc;

    const ADD_IR: &str = "\
; ModuleID = 'add'
target triple = \"x86_64-unknown-linux-gnu\"

define i32 @add(i32 %a, i32 %b) {
entry:
  %sum = add i32 %a, %b
  ret i32 %sum
}
";

    fn setup() -> (Arc<StubApi>, Native) {
        let stub = Arc::new(StubApi::new());
        let native = Native::new(stub.clone(), MessageEncoding::Latin1);
        (stub, native)
    }

    #[test]
    fn test_parse_from_memory() {
        let (stub, native) = setup();
        let ctx = Context::new(&native).unwrap();
        let module = ctx.parse_ir(ADD_IR, "add.ll").unwrap();
        assert_eq!(module.print_to_string().unwrap(), ADD_IR);
        let buffer = stub
            .calls_to("LLVMCreateMemoryBufferWithMemoryRangeCopy")
            .remove(0);
        assert_eq!(buffer.text.as_deref(), Some("add.ll"));
        assert_eq!(buffer.value, Some(ADD_IR.len() as u64));
        // The buffer went to the parser; nobody disposes it
        assert_eq!(stub.count("LLVMDisposeMemoryBuffer"), 0);
        assert_eq!(stub.double_releases(), 0);
        assert_eq!(stub.stale_handles(), 0);
    }

    #[test]
    fn test_parsed_module_builds_in_its_context() {
        let (stub, native) = setup();
        let ctx = Context::new(&native).unwrap();
        let module = ctx.parse_ir(ADD_IR, "add.ll").unwrap();
        drop(module.create_builder().unwrap());
        let create = stub.calls_to("LLVMCreateBuilderInContext").remove(0);
        assert_eq!(create.handle, ctx.handle().unwrap().addr());
    }

    #[test]
    fn test_parse_error_is_verbatim() {
        let (stub, native) = setup();
        stub.fail_next(
            "LLVMParseIRInContext",
            "broken.ll:1:1: error: expected top-level entity",
        );
        let ctx = Context::new(&native).unwrap();
        let err = ctx.parse_ir("nonsense\n", "broken.ll").unwrap_err();
        assert_eq!(
            err.message(),
            Some("broken.ll:1:1: error: expected top-level entity")
        );
        assert_eq!(stub.live_messages(), 0);
        assert_eq!(stub.count("LLVMDisposeMemoryBuffer"), 0);
        drop(ctx);
        assert_eq!(stub.live_resources(), 0);
    }

    #[test]
    fn test_malformed_function_header_does_not_panic() {
        let (stub, native) = setup();
        let ctx = Context::new(&native).unwrap();
        // A close paren before the open one
        let module = ctx.parse_ir("declare i32 @f)(\n", "odd.ll").unwrap();
        assert_eq!(module.print_to_string().unwrap(), "declare i32 @f)(\n");
        assert_eq!(stub.count("LLVMVerifyModule"), 0);
    }

    #[test]
    fn test_parse_from_file() {
        let (stub, native) = setup();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("add.ll");
        std::fs::write(&path, ADD_IR).unwrap();
        let ctx = Context::new(&native).unwrap();
        let module = ctx.parse_ir_file(&path).unwrap();
        assert_eq!(module.print_to_string().unwrap(), ADD_IR);
        let opened = stub
            .calls_to("LLVMCreateMemoryBufferWithContentsOfFile")
            .remove(0);
        assert_eq!(opened.text, Some(path.to_string_lossy().into_owned()));
        assert_eq!(stub.count("LLVMDisposeMemoryBuffer"), 0);
    }

    #[test]
    fn test_missing_file() {
        let (stub, native) = setup();
        let ctx = Context::new(&native).unwrap();
        let err = ctx
            .parse_ir_file(std::path::Path::new("/nonexistent/input.ll"))
            .unwrap_err();
        match err {
            NativeError::Failed { operation, message } => {
                assert_eq!(operation, "LLVMCreateMemoryBufferWithContentsOfFile");
                assert!(message.is_some());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(stub.count("LLVMParseIRInContext"), 0);
        assert_eq!(stub.live_messages(), 0);
    }

    proptest! {
        #[test]
        fn prop_any_source_parses_or_fails_cleanly(source in "[ -~\n]{0,64}") {
            let (stub, native) = setup();
            let ctx = Context::new(&native).unwrap();
            if let Ok(module) = ctx.parse_ir(&source, "any.ll") {
                drop(module);
            }
            prop_assert_eq!(stub.live_messages(), 0);
            prop_assert_eq!(stub.count("LLVMDisposeMemoryBuffer"), 0);
        }
    }
}
