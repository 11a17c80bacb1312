//! Module lifecycle and compilation pipeline on top of LLVM.
//!
//! - [`module`]    - owned modules: parsing, printing, copying, queries
//! - [`diagnostics`] - context diagnostic capture
//! - [`verifier`]  - well-formedness checkpoints
//! - [`pipeline`]  - optimization levels and pass selection
//! - [`optimizer`] - the optimization driver
//! - [`linker`]    - two-module linking
//! - [`target`]    - the fixed target and its attribute rewrites
//! - [`codegen`]   - assembly and object emission

pub mod codegen;
pub mod diagnostics;
pub mod linker;
pub mod module;
pub mod optimizer;
pub mod pipeline;
pub mod target;
pub mod verifier;

pub use codegen::{emit, emit_assembly, emit_object, Artifact, ObjectCode, OutputKind};
pub use linker::link;
pub use module::{looks_like_bitcode, IrModule};
pub use optimizer::optimize;
pub use pipeline::{InlinerPolicy, OptLevel, OptimizationRequest, PassPipeline, SizeLevel};
pub use target::TargetConfig;
