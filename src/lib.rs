//! hlc - LLVM IR compilation service for a fixed GPU target.
//!
//! hlc takes LLVM IR, as text or bitcode, and turns it into optimized code
//! for the `amdgcn` HSA target (`fiji`). A host process that knows nothing
//! about LLVM drives it through the C functions in [`ffi`]; Rust callers use
//! [`Runtime`] directly.
//!
//! # Primary Usage
//!
//! ```ignore
//! use hlc::{Runtime, OptimizationRequest, OptLevel, SizeLevel};
//!
//! let runtime = Runtime::initialize();
//! let mut module = runtime.parse_text(ir)?;
//! runtime.optimize(&mut module, OptimizationRequest::new(OptLevel::O3, SizeLevel::None))?;
//! let asm = runtime.emit_assembly(&module, OptLevel::O3)?;
//! ```
//!
//! # Architecture
//!
//! - [`core`] - runtime context, switches, errors, statistics
//! - [`llvm`] - modules, verifier, pass pipeline, linker, code generation
//! - [`ffi`]  - C-callable boundary with a per-thread handle table

pub mod core;
pub mod ffi;
pub mod llvm;

pub use crate::core::{
    BackendArgs, CompileError, CompileResult, CompilerOptions, Runtime, SessionStats, VerifyStage,
};
pub use crate::llvm::{
    Artifact, IrModule, ObjectCode, OptLevel, OptimizationRequest, OutputKind, PassPipeline, SizeLevel,
    TargetConfig,
};
