//! Optimization pipeline behaviour on the amdgcn target.

mod common;

use common::{backend_runtime, call_count, init_logging, require_backend, ANSWER, CALLER_CALLEE};
use hlc::{CompileError, CompilerOptions, OptLevel, OptimizationRequest, Runtime, SizeLevel};

const WITH_DEBUG_INFO: &str = r#"
define i32 @f() !dbg !5 {
entry:
  ret i32 0, !dbg !8
}

!llvm.dbg.cu = !{!0}
!llvm.module.flags = !{!3, !4}

!0 = distinct !DICompileUnit(language: DW_LANG_C99, file: !1, producer: "hlc-test", isOptimized: false, runtimeVersion: 0, emissionKind: FullDebug)
!1 = !DIFile(filename: "kernel.c", directory: "/tmp")
!3 = !{i32 2, !"Debug Info Version", i32 3}
!4 = !{i32 7, !"Dwarf Version", i32 4}
!5 = distinct !DISubprogram(name: "f", scope: !1, file: !1, line: 1, type: !6, scopeLine: 1, spFlags: DISPFlagDefinition, unit: !0)
!6 = !DISubroutineType(types: !7)
!7 = !{null}
!8 = !DILocation(line: 1, column: 1, scope: !5)
"#;

#[test]
fn test_every_level_keeps_module_valid() {
    let runtime = backend_runtime();

    for opt in OptLevel::ALL {
        for size in SizeLevel::ALL {
            let mut module = runtime.parse_text(CALLER_CALLEE).unwrap();
            runtime
                .optimize(&mut module, OptimizationRequest::new(opt, size).with_verify(true))
                .unwrap_or_else(|e| panic!("{opt} size {}: {e}", size.as_u8()));
            assert!(module.verify().is_ok());
            assert!(module.function_names().contains(&"caller".to_string()));
        }
    }
    assert_eq!(runtime.stats().optimizations_run, 12);
}

#[test]
fn test_o0_keeps_functions_and_calls() {
    let runtime = backend_runtime();
    let mut module = runtime.parse_text(CALLER_CALLEE).unwrap();
    let calls_before = call_count(&module.serialize());

    runtime
        .optimize(&mut module, OptimizationRequest::new(OptLevel::O0, SizeLevel::None))
        .unwrap();

    assert_eq!(module.function_names(), vec!["add_one", "caller"]);
    assert_eq!(call_count(&module.serialize()), calls_before);
}

#[test]
fn test_o3_inlines_and_sets_target() {
    let runtime = backend_runtime();
    let mut module = runtime.parse_text(CALLER_CALLEE).unwrap();

    runtime
        .optimize(&mut module, OptimizationRequest::new(OptLevel::O3, SizeLevel::None))
        .unwrap();

    let ir = module.serialize();
    assert_eq!(call_count(&ir), 0, "{ir}");
    assert!(module.triple().starts_with("amdgcn"));
    assert!(!module.data_layout().is_empty());
    assert!(ir.contains("\"target-cpu\"=\"fiji\""));
    assert!(ir.contains("\"no-builtins\""));
}

#[test]
fn test_disable_inlining_keeps_calls() {
    init_logging();
    let runtime = Runtime::with_options(CompilerOptions {
        disable_inlining: true,
        ..CompilerOptions::default()
    });
    require_backend();
    let mut module = runtime.parse_text(CALLER_CALLEE).unwrap();

    runtime
        .optimize(&mut module, OptimizationRequest::new(OptLevel::O2, SizeLevel::None))
        .unwrap();

    assert!(call_count(&module.serialize()) > 0);
}

#[test]
fn test_out_of_range_levels_are_rejected() {
    assert!(matches!(
        OptimizationRequest::from_raw(4, 0, false),
        Err(CompileError::InvalidLevel { what: "optimization", value: 4 })
    ));
    assert!(matches!(
        OptimizationRequest::from_raw(2, 3, false),
        Err(CompileError::InvalidLevel { what: "size", value: 3 })
    ));
    assert!(OptimizationRequest::from_raw(-1, 0, false).is_err());

    let request = OptimizationRequest::from_raw(3, 2, true).unwrap();
    assert_eq!(request.opt_level, OptLevel::O3);
    assert_eq!(request.size_level, SizeLevel::Smallest);
    assert!(request.verify);
}

#[test]
fn test_strip_debug_removes_metadata() {
    init_logging();
    let runtime = Runtime::with_options(CompilerOptions {
        strip_debug: true,
        ..CompilerOptions::default()
    });
    require_backend();
    let mut module = runtime.parse_text(WITH_DEBUG_INFO).unwrap();
    assert!(module.has_debug_info());

    runtime
        .optimize(&mut module, OptimizationRequest::new(OptLevel::O0, SizeLevel::None))
        .unwrap();

    let ir = module.serialize();
    assert!(!ir.contains("!dbg"), "{ir}");
    assert!(!ir.contains("DISubprogram"));
}

#[test]
fn test_optimize_is_repeatable() {
    let runtime = backend_runtime();
    let mut module = runtime.parse_text(ANSWER).unwrap();
    let request = OptimizationRequest::new(OptLevel::O2, SizeLevel::Small);

    runtime.optimize(&mut module, request).unwrap();
    runtime.optimize(&mut module, request).unwrap();

    assert_eq!(module.function_names(), vec!["answer"]);
    assert!(module.serialize().contains("ret i32 42"));
}
