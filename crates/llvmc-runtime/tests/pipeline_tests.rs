//! Build, parse, verify, optimise and JIT modules end to end against the stub

use llvmc_runtime::ffi::StubApi;
use llvmc_runtime::llvm::{AsContext, NativeError, PassOptions};
use llvmc_runtime::{Llvm, RuntimeOptions};
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::sync::Arc;

fn stub_llvm() -> (Arc<StubApi>, Llvm) {
    let stub = Arc::new(StubApi::new());
    let llvm = Llvm::with_api(stub.clone(), RuntimeOptions::default());
    (stub, llvm)
}

#[test]
fn test_build_function_call_sequence() {
    let (stub, llvm) = stub_llvm();
    let ctx = llvm.create_context().unwrap();
    let module = ctx.create_module("demo").unwrap();
    let i32_ty = ctx.int_type(32).unwrap();
    let add = module
        .add_function("add", ctx.function_type(i32_ty, &[i32_ty, i32_ty], false).unwrap())
        .unwrap();
    let [a, b] = [add.param(0).unwrap(), add.param(1).unwrap()];
    a.set_name("a");
    let builder = module.create_builder().unwrap();
    builder
        .position_at_end(ctx.append_basic_block(add, "entry").unwrap())
        .unwrap();
    let sum = builder.build_add(a, b, "sum").unwrap();
    builder.build_ret(sum).unwrap();
    drop(builder);
    module.verify().unwrap();

    let journal: Vec<String> = stub
        .calls()
        .iter()
        .skip_while(|c| c.symbol != "LLVMModuleCreateWithNameInContext")
        .map(|c| match (&c.text, c.array) {
            (Some(text), _) => format!("{} {:?}", c.symbol, text),
            (None, Some(array)) => format!("{} [{}]", c.symbol, array.count),
            (None, None) => c.symbol.to_string(),
        })
        .collect();
    insta::assert_snapshot!(journal.join("\n"), @r#"
    LLVMModuleCreateWithNameInContext "demo"
    LLVMIntTypeInContext
    LLVMFunctionType [2]
    LLVMAddFunction "add"
    LLVMCountParams
    LLVMGetParam
    LLVMCountParams
    LLVMGetParam
    LLVMSetValueName2 "a"
    LLVMCreateBuilderInContext
    LLVMAppendBasicBlockInContext "entry"
    LLVMPositionBuilderAtEnd
    LLVMBuildAdd "sum"
    LLVMBuildRet
    LLVMDisposeBuilder
    LLVMVerifyModule
    LLVMDisposeMessage
    "#);
    assert_eq!(stub.stale_handles(), 0);
}

#[test]
fn test_verify_reports_native_message() {
    let (stub, llvm) = stub_llvm();
    stub.fail_next(
        "LLVMVerifyModule",
        "Basic Block in function 'f' does not have terminator!\nlabel %bb\n",
    );
    let ctx = llvm.create_context().unwrap();
    let module = ctx
        .parse_ir("define void @f() {\nbb:\n  %x = add i32 1, 2\n}\n", "broken.ll")
        .unwrap();
    let err = module.verify().unwrap_err();
    assert_eq!(
        err.message(),
        Some("Basic Block in function 'f' does not have terminator!\nlabel %bb\n")
    );
    assert_eq!(stub.live_messages(), 0);
}

#[rstest]
#[case("default<O0>")]
#[case("default<O3>")]
#[case("function(instcombine,simplifycfg)")]
fn test_optimize_with_configured_pipeline(#[case] pipeline: &str) {
    let stub = Arc::new(StubApi::new());
    let options = RuntimeOptions {
        passes: PassOptions {
            pipeline: pipeline.to_string(),
            ..PassOptions::default()
        },
        ..RuntimeOptions::default()
    };
    let llvm = Llvm::with_api(stub.clone(), options);
    let ctx = llvm.create_context().unwrap();
    let module = ctx.create_module("opt").unwrap();
    llvm.optimize(&module).unwrap();

    let call = stub.calls_to("LLVMRunPasses").remove(0);
    assert_eq!(call.text.as_deref(), Some(pipeline));
}

#[test]
fn test_pipeline_error_message() {
    let (stub, llvm) = stub_llvm();
    stub.fail_next("LLVMRunPasses", "invalid empty pipeline");
    let ctx = llvm.create_context().unwrap();
    let module = ctx.create_module("opt").unwrap();
    let err = module
        .run_passes(&PassOptions {
            pipeline: String::new(),
            ..PassOptions::default()
        })
        .unwrap_err();
    match err {
        NativeError::Failed { operation, message } => {
            assert_eq!(operation, "LLVMRunPasses");
            assert_eq!(message.as_deref(), Some("invalid empty pipeline"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(stub.count("LLVMDisposeErrorMessage"), 1);
}

#[test]
fn test_print_round_trips_through_file() {
    let (stub, llvm) = stub_llvm();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.ll");

    let ctx = llvm.create_context().unwrap();
    let module = ctx.create_module("written").unwrap();
    module.print_to_file(&path).unwrap();

    let reparsed = ctx.parse_ir_file(&path).unwrap();
    assert_eq!(
        reparsed.print_to_string().unwrap(),
        module.print_to_string().unwrap()
    );
    assert_eq!(stub.live_messages(), 0);
}

#[test]
fn test_jit_compiled_function_has_address() {
    let (stub, llvm) = stub_llvm();
    let ctx = llvm.create_context().unwrap();
    let module = ctx.create_module("jit").unwrap();
    let i32_ty = ctx.int_type(32).unwrap();
    let main = module
        .add_function("main", ctx.function_type(i32_ty, &[], false).unwrap())
        .unwrap();
    {
        let builder = module.create_builder().unwrap();
        builder
            .position_at_end(ctx.append_basic_block(main, "entry").unwrap())
            .unwrap();
        builder.build_ret(i32_ty.const_int(0, false).unwrap()).unwrap();
    }

    let mut engine = llvm.create_execution_engine(module).unwrap();
    assert_ne!(engine.function_address("main").unwrap(), 0);
    engine.dispose();
    engine.dispose();
    assert_eq!(stub.count("LLVMDisposeExecutionEngine"), 1);
    assert!(engine.function_address("main").is_err());
    assert_eq!(stub.double_releases(), 0);
}
