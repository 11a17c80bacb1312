//! Assembly and object emission for the amdgcn target.

mod common;

use common::{backend_runtime, ANSWER, CALLER_CALLEE, LDS_OVERFLOW, NOT_DOMINATED, USES_ANSWER};
use hlc::{Artifact, CompileError, OptLevel, OptimizationRequest, OutputKind, SizeLevel, VerifyStage};

#[test]
fn test_optimized_function_appears_in_assembly() {
    let runtime = backend_runtime();
    let mut module = runtime.parse_text(ANSWER).unwrap();
    runtime
        .optimize(&mut module, OptimizationRequest::new(OptLevel::O3, SizeLevel::None))
        .unwrap();

    let asm = runtime.emit_assembly(&module, OptLevel::O3).unwrap();

    assert!(asm.contains("answer"), "{asm}");
    assert!(asm.contains("s_setpc_b64") || asm.contains("s_endpgm"), "{asm}");
}

#[test]
fn test_object_defines_exported_symbols() {
    let runtime = backend_runtime();
    let module = runtime.parse_text(CALLER_CALLEE).unwrap();

    let object = runtime.emit_object(&module, OptLevel::O2).unwrap();

    assert!(!object.is_empty());
    assert_eq!(&object.as_bytes()[..4], b"\x7fELF");
    let symbols = object.defined_symbols().unwrap();
    assert!(symbols.iter().any(|s| s == "caller"), "{symbols:?}");
    assert_eq!(runtime.stats().emitted_bytes, object.len());
}

#[test]
fn test_emit_does_not_mutate_module() {
    let runtime = backend_runtime();
    let module = runtime.parse_text(CALLER_CALLEE).unwrap();
    let before = module.serialize();

    runtime.emit_assembly(&module, OptLevel::O0).unwrap();
    runtime.emit_object(&module, OptLevel::O3).unwrap();

    assert_eq!(module.serialize(), before);
    assert!(module.triple().is_empty());
}

#[test]
fn test_emit_dispatches_on_kind() {
    let runtime = backend_runtime();
    let module = runtime.parse_text(ANSWER).unwrap();

    let asm = runtime.emit(&module, OptLevel::O1, OutputKind::Assembly).unwrap();
    let obj = runtime.emit(&module, OptLevel::O1, OutputKind::Object).unwrap();

    assert!(matches!(asm, Artifact::Assembly(_)));
    assert!(matches!(obj, Artifact::Object(_)));
    assert!(!asm.is_empty() && !obj.is_empty());

    let stats = runtime.stats();
    assert_eq!(stats.assembly_emitted, 1);
    assert_eq!(stats.objects_emitted, 1);
}

#[test]
fn test_broken_module_is_not_lowered() {
    let runtime = backend_runtime();
    let module = runtime.parse_text(NOT_DOMINATED).unwrap();

    let err = runtime.emit_assembly(&module, OptLevel::O2).unwrap_err();

    assert!(matches!(
        err,
        CompileError::Verification {
            stage: VerifyStage::Codegen,
            ..
        }
    ));
}

#[test]
fn test_backend_error_diagnostic_fails_emission() {
    let runtime = backend_runtime();
    let module = runtime.parse_text(LDS_OVERFLOW).unwrap();

    let object = runtime.emit_object(&module, OptLevel::O2);
    let asm = runtime.emit_assembly(&module, OptLevel::O0);

    match object {
        Err(CompileError::CodeGeneration { reason }) => assert!(reason.contains("local memory"), "{reason}"),
        other => panic!("expected a code generation error, got {other:?}"),
    }
    assert!(matches!(asm, Err(CompileError::CodeGeneration { .. })));
    assert_eq!(runtime.stats().failures, 2);

    let healthy = runtime.parse_text(ANSWER).unwrap();
    assert!(runtime.emit_object(&healthy, OptLevel::O2).is_ok());
    assert!(runtime.diagnostics_installed());
}

#[test]
fn test_backend_error_after_link_is_reported() {
    let runtime = backend_runtime();
    let mut dst = runtime.parse_text(USES_ANSWER).unwrap();
    let src = runtime.parse_text(ANSWER).unwrap();
    runtime.link(&mut dst, &src).unwrap();
    assert!(runtime.diagnostics_installed());

    let module = runtime.parse_text(LDS_OVERFLOW).unwrap();
    let err = runtime.emit_object(&module, OptLevel::O2).unwrap_err();

    assert!(matches!(err, CompileError::CodeGeneration { .. }));
    assert!(runtime.emit_assembly(&dst, OptLevel::O2).is_ok());
}
