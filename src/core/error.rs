// This module defines the error taxonomy of the hlc compilation service using the thiserror
// crate. CompileError covers every recoverable failure a caller can observe: malformed IR
// text (Parse), malformed bitcode (Decode), well-formedness violations found by the verifier
// at one of the pipeline checkpoints (Verification, tagged with a VerifyStage), a backend that
// cannot be resolved (UnsupportedTarget), an output encoding the backend refuses to produce
// (UnsupportedOutputKind), symbol conflicts reported by the IR linker (LinkConflict),
// out-of-range optimization or size levels (InvalidLevel), pipeline construction errors
// reported by the pass builder (PassPipeline), backend failures while emitting
// (CodeGeneration), rejected backend switches (InvalidOption), stale or unknown module
// handles passed across the C boundary (InvalidHandle) and null pointers where the C boundary
// needs one (NullArgument). Every variant carries the
// diagnostic text produced by LLVM so it can be logged or handed across the C boundary.

//! Error types for the hlc compilation service.
//!
//! Using thiserror for more idiomatic error handling.

use std::fmt;

use thiserror::Error;

/// Verification checkpoint at which a module was found to be broken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyStage {
    /// Precondition check before any optimization runs.
    Input,
    /// Re-check right before the pass pipeline executes.
    PipelineEntry,
    /// Check between two pass bundles when verifying each step.
    BetweenBundles,
    /// Check after every pass has run.
    PostOptimization,
    /// Destination operand of a link.
    LinkDestination,
    /// Source operand of a link.
    LinkSource,
    /// Input handed to the code generator.
    Codegen,
    /// Module about to be deep-copied.
    Copy,
}

impl fmt::Display for VerifyStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VerifyStage::Input => "input",
            VerifyStage::PipelineEntry => "pipeline entry",
            VerifyStage::BetweenBundles => "pass bundle",
            VerifyStage::PostOptimization => "post-optimization",
            VerifyStage::LinkDestination => "link destination",
            VerifyStage::LinkSource => "link source",
            VerifyStage::Codegen => "codegen input",
            VerifyStage::Copy => "deep copy",
        };
        f.write_str(name)
    }
}

/// Main error type for module operations.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("Failed to parse IR text: {message}")]
    Parse {
        message: String,
    },

    #[error("Failed to decode bitcode: {message}")]
    Decode {
        message: String,
    },

    #[error("Module verification failed at {stage}: {message}")]
    Verification {
        stage: VerifyStage,
        message: String,
    },

    #[error("Unsupported target {target}: {reason}")]
    UnsupportedTarget {
        target: String,
        reason: String,
    },

    #[error("Target does not support generation of {kind} output: {message}")]
    UnsupportedOutputKind {
        kind: crate::llvm::OutputKind,
        message: String,
    },

    #[error("Link failed: {message}")]
    LinkConflict {
        message: String,
    },

    #[error("Invalid {what} level {value}")]
    InvalidLevel {
        what: &'static str,
        value: i64,
    },

    #[error("Pass pipeline `{pipeline}` failed: {message}")]
    PassPipeline {
        pipeline: String,
        message: String,
    },

    #[error("Code generation failed: {reason}")]
    CodeGeneration {
        reason: String,
    },

    #[error("Invalid backend option: {reason}")]
    InvalidOption {
        reason: String,
    },

    #[error("Invalid module handle {id}")]
    InvalidHandle {
        id: u64,
    },

    #[error("Null pointer passed as {name}")]
    NullArgument {
        name: &'static str,
    },
}

impl CompileError {
    /// Shorthand for a verification failure at `stage`.
    pub fn verification(stage: VerifyStage, message: impl Into<String>) -> Self {
        CompileError::Verification {
            stage,
            message: message.into(),
        }
    }
}

/// Result type alias for compile operations.
pub type CompileResult<T> = Result<T, CompileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verification_message_names_stage() {
        let err = CompileError::verification(VerifyStage::LinkSource, "broken call");
        assert_eq!(
            err.to_string(),
            "Module verification failed at link source: broken call"
        );
    }

    #[test]
    fn test_invalid_level_message() {
        let err = CompileError::InvalidLevel { what: "optimization", value: 7 };
        assert_eq!(err.to_string(), "Invalid optimization level 7");
    }
}
