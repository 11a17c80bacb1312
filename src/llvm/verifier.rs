//! Module well-formedness checks.
//!
//! The actual rules live in LLVM's verifier. This module only decides what a
//! failure means at each checkpoint: a diagnostic string for callers, and a
//! [`CompileError::Verification`] tagged with the stage for the pipeline.

use inkwell::module::Module;

use crate::core::{CompileError, CompileResult, VerifyStage};

/// Run the verifier. `Err` carries LLVM's diagnostic.
pub fn check(module: &Module<'_>) -> Result<(), String> {
    module.verify().map_err(|message| message.to_string())
}

/// Run the verifier as checkpoint `stage`.
pub fn verify_at(module: &Module<'_>, stage: VerifyStage) -> CompileResult<()> {
    check(module).map_err(|message| {
        log::warn!("module is broken at {} check: {}", stage, message.trim_end());
        CompileError::verification(stage, message)
    })?;
    log::debug!("{} check passed", stage);
    Ok(())
}
