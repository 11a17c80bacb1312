//! Two-module IR linking.
//!
//! Both operands are verified first. The merge itself happens on a copy of
//! the destination, which replaces `dst` only once LLVM's linker succeeded;
//! symbol conflicts follow LLVM's own resolution rules and come back as
//! [`CompileError::LinkConflict`]. `src` is never touched. The context's
//! diagnostic handler is restored once the merge returns.

use super::diagnostics::CaptureScope;
use super::module::IrModule;
use crate::core::{CompileError, CompileResult, VerifyStage};

/// Merge a deep copy of `src` into `dst`.
pub fn link<'ctx>(dst: &mut IrModule<'ctx>, src: &IrModule<'ctx>) -> CompileResult<()> {
    log::info!("linking {} into {}", src.name(), dst.name());

    let merged = dst.clone_at(VerifyStage::LinkDestination)?;
    let incoming = src.clone_at(VerifyStage::LinkSource)?;

    let scope = CaptureScope::begin(&merged.as_llvm().get_context());
    let linked = merged.as_llvm().link_in_module(incoming.into_llvm());
    drop(scope);

    linked.map_err(|e| CompileError::LinkConflict {
        message: e.to_string(),
    })?;

    log::debug!("link succeeded, {} function(s) in result", merged.function_names().len());
    dst.replace(merged);
    Ok(())
}
