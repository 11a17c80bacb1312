// This module runs the optimization pipeline over one module. The order is fixed: optional
// debug stripping, the input verification that terminates the process on broken IR (passes
// over broken IR have no defined behavior in LLVM), a snapshot of the verified module, triple
// normalization and data layout fallback, target attribute and no-builtins rewriting, the pass
// pipeline selected by PassPipeline::build, and a final verification. Any failure after the
// snapshot restores it, so a caller either gets a verified optimized module or exactly the
// module it passed in.

//! Optimization pipeline driver.

use super::diagnostics::CaptureScope;
use super::module::IrModule;
use super::pipeline::{OptimizationRequest, PassPipeline};
use super::target::{self, TargetConfig};
use super::verifier;
use crate::core::{CompileError, CompileResult, CompilerOptions, VerifyStage};

/// Optimize `module` in place.
pub fn optimize(
    module: &mut IrModule<'_>,
    request: &OptimizationRequest,
    options: &CompilerOptions,
) -> CompileResult<()> {
    let pipeline = PassPipeline::build(request, options);
    optimize_with(module, request, options, &pipeline)
}

/// Optimize `module` with an explicit pipeline.
pub(crate) fn optimize_with(
    module: &mut IrModule<'_>,
    request: &OptimizationRequest,
    options: &CompilerOptions,
    pipeline: &PassPipeline,
) -> CompileResult<()> {
    log::info!(
        "optimizing {} at {} (size level {}, verify each: {})",
        module.name(),
        request.opt_level,
        request.size_level.as_u8(),
        request.verify
    );

    if options.strip_debug && module.strip_debug_info() {
        log::debug!("stripped debug info");
    }

    if let Err(message) = module.verify() {
        abort_on_broken_input(&message);
    }
    let snapshot = module.clone_at(VerifyStage::Input)?;

    match run(module, request, pipeline) {
        Ok(()) => Ok(()),
        Err(err) => {
            log::warn!("optimization failed, restoring input module: {}", err);
            module.replace(snapshot);
            Err(err)
        }
    }
}

fn run(module: &IrModule<'_>, request: &OptimizationRequest, pipeline: &PassPipeline) -> CompileResult<()> {
    let config = TargetConfig::optimizer();
    let machine = config.create_target_machine(request.opt_level)?;
    let llvm = module.as_llvm();

    llvm.set_triple(&config.normalized_triple());
    if module.data_layout().is_empty() {
        log::debug!("module has no data layout, using the target default");
        llvm.set_data_layout(&machine.get_target_data().get_data_layout());
    }

    let touched = target::apply_function_attributes(llvm, &config);
    target::disable_lib_calls(llvm);
    log::debug!("target attributes applied to {} function(s)", touched);

    let segments = pipeline.segments();
    if segments.is_empty() {
        log::debug!("no transformation passes at {}", request.opt_level);
        return verifier::verify_at(llvm, VerifyStage::PostOptimization);
    }

    verifier::verify_at(llvm, VerifyStage::PipelineEntry)?;

    for text in &segments {
        log::debug!("running pass pipeline: {}", text);
        let scope = CaptureScope::begin(&llvm.get_context());
        let ran = llvm.run_passes(text, &machine, pipeline.builder_options());
        let diagnostics = scope.finish();

        ran.map_err(|e| CompileError::PassPipeline {
            pipeline: text.clone(),
            message: e.to_string(),
        })?;
        if !diagnostics.is_empty() {
            return Err(CompileError::PassPipeline {
                pipeline: text.clone(),
                message: diagnostics.join("\n"),
            });
        }
        if pipeline.tuning.verify_each {
            verifier::verify_at(llvm, VerifyStage::BetweenBundles)?;
        }
    }

    verifier::verify_at(llvm, VerifyStage::PostOptimization)
}

/// Broken input is a precondition violation, not a recoverable error.
fn abort_on_broken_input(message: &str) -> ! {
    log::error!("input module is broken: {}", message.trim_end());
    eprintln!("error: input module is broken!\n{}", message.trim_end());
    std::process::exit(1);
}
