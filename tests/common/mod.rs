//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use hlc::{Runtime, TargetConfig};

/// Smallest useful kernel helper.
pub const ANSWER: &str = r#"
define i32 @answer() {
entry:
  ret i32 42
}
"#;

/// A caller and a callee that the inliner can fold together.
pub const CALLER_CALLEE: &str = r#"
define internal i32 @add_one(i32 %x) {
entry:
  %r = add i32 %x, 1
  ret i32 %r
}

define i32 @caller(i32 %v) {
entry:
  %a = call i32 @add_one(i32 %v)
  %b = call i32 @add_one(i32 %a)
  ret i32 %b
}
"#;

/// Parses, but uses a value before it is defined.
pub const NOT_DOMINATED: &str = r#"
define i32 @broken() {
entry:
  %a = add i32 %b, 1
  %b = add i32 %a, 1
  ret i32 %b
}
"#;

/// A kernel whose LDS use is over the per-workgroup limit.
pub const LDS_OVERFLOW: &str = r#"
@lds = addrspace(3) global [70000 x i32] undef, align 4

define amdgpu_kernel void @big_lds(ptr addrspace(1) %out, i32 %i) {
entry:
  %p = getelementptr [70000 x i32], ptr addrspace(3) @lds, i32 0, i32 %i
  store i32 %i, ptr addrspace(3) %p, align 4
  %v = load i32, ptr addrspace(3) %p, align 4
  store i32 %v, ptr addrspace(1) %out, align 4
  ret void
}
"#;

/// Calls `@answer` without defining it.
pub const USES_ANSWER: &str = r#"
declare i32 @answer()

define i32 @twice() {
entry:
  %a = call i32 @answer()
  %r = mul i32 %a, 2
  ret i32 %r
}
"#;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Fail the test when this LLVM build lacks the amdgcn backend.
pub fn require_backend() {
    assert!(
        TargetConfig::codegen().is_available(),
        "LLVM was built without the amdgcn backend; these tests need an LLVM with AMDGPU enabled"
    );
}

/// Runtime for a test that needs the amdgcn backend.
pub fn backend_runtime() -> Runtime {
    init_logging();
    let runtime = Runtime::initialize();
    require_backend();
    runtime
}

/// Count `call` instructions in printed IR.
pub fn call_count(ir: &str) -> usize {
    ir.lines().filter(|line| line.contains(" call ")).count()
}
