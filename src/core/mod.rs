// This module serves as the hub for hlc's ambient infrastructure, the pieces every pipeline
// stage relies on but that know nothing about individual passes or backends: the error
// taxonomy (CompileError and the VerifyStage checkpoints), the global switches and the
// backend-flag passthrough (CompilerOptions, BackendArgs), session statistics, and the
// Runtime context object that owns the LLVM context and guards one-time target registration.

//! Core hlc infrastructure.
//!
//! # Key Components
//!
//! ## Runtime (`runtime`)
//! - One-time target registration behind an idempotent guard
//! - The context object every module operation goes through
//!
//! ## Options (`options`)
//! - Global pipeline switches, parsed with clap
//! - Passthrough of unknown flags to LLVM
//!
//! ## Errors (`error`)
//! - `CompileError` taxonomy and verification checkpoints

pub mod error;
pub mod options;
pub mod runtime;
pub mod session;

pub use error::{CompileError, CompileResult, VerifyStage};
pub use options::{BackendArgs, CompilerOptions};
pub use runtime::{initialize_targets, shutdown, targets_initialized, Runtime};
pub use session::SessionStats;
