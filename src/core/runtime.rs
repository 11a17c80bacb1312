// This module implements the global runtime state of hlc. Target registration (target info,
// machine code layer, assembly printer and parser for the AMDGPU backend) happens exactly once
// per process behind a std::sync::Once, no matter how many Runtime values are created, so
// repeated initialization is a no-op. A Runtime is the explicit context object every other
// operation goes through: it owns the LLVM context all of its modules live in, the global
// pipeline switches and the session statistics. Modules borrow the Runtime, which means the
// borrow checker enforces that backend switches are applied before any module exists and that
// no module outlives its context. The Runtime also owns the diagnostic sink its context reports
// into, so backend error diagnostics never reach LLVM's default handler, which exits the
// process. shutdown() releases LLVM's process-wide state and is only valid as the very last
// call of the process.

//! Process-wide initialization and the per-context runtime.

use std::cell::RefCell;
use std::ffi::{c_char, CString};
use std::sync::Once;

use inkwell::context::Context;
use inkwell::targets::{InitializationConfig, Target};

use super::error::{CompileError, CompileResult};
use super::options::{BackendArgs, CompilerOptions};
use super::session::SessionStats;
use crate::llvm::diagnostics::{self, DiagnosticSink};
use crate::llvm::{
    self, Artifact, IrModule, ObjectCode, OptLevel, OptimizationRequest, OutputKind,
};

static REGISTRY: Once = Once::new();

/// Register the fixed backend with LLVM. Idempotent.
pub fn initialize_targets() {
    REGISTRY.call_once(|| {
        Target::initialize_amd_gpu(&InitializationConfig::default());
        log::debug!("registered amdgpu target, mc layer, asm printer and parser");
    });
}

/// Whether [`initialize_targets`] has completed in this process.
pub fn targets_initialized() -> bool {
    REGISTRY.is_completed()
}

/// Release LLVM's process-wide state.
///
/// # Safety
///
/// No LLVM object may be alive or created afterwards, on any thread.
pub unsafe fn shutdown() {
    log::info!("shutting down LLVM");
    llvm_sys::core::LLVMShutdown();
}

/// Forward flags to LLVM's own command-line parser.
///
/// LLVM exits the process on a flag it does not know, and rejects a flag
/// that was already given once in this process.
fn forward_to_llvm(args: &[String]) -> CompileResult<()> {
    if args.is_empty() {
        return Ok(());
    }

    let argv: Vec<CString> = std::iter::once("hlc")
        .chain(args.iter().map(String::as_str))
        .map(CString::new)
        .collect::<Result<_, _>>()
        .map_err(|e| CompileError::InvalidOption {
            reason: e.to_string(),
        })?;
    let pointers: Vec<*const c_char> = argv.iter().map(|arg| arg.as_ptr()).collect();
    let overview = CString::new("hlc backend options").map_err(|e| CompileError::InvalidOption {
        reason: e.to_string(),
    })?;

    log::debug!("forwarding {} option(s) to LLVM: {:?}", args.len(), args);
    unsafe {
        llvm_sys::support::LLVMParseCommandLineOptions(
            pointers.len() as i32,
            pointers.as_ptr(),
            overview.as_ptr(),
        );
    }
    Ok(())
}

/// Compilation context.
///
/// Owns the LLVM context every module parsed through it lives in. A
/// `Runtime` and its modules must stay on one thread; concurrent workers
/// each create their own.
pub struct Runtime {
    context: Context,
    diagnostics: Box<DiagnosticSink>,
    options: CompilerOptions,
    stats: RefCell<SessionStats>,
}

impl Runtime {
    /// Create a runtime with every switch off.
    pub fn initialize() -> Self {
        Self::with_options(CompilerOptions::default())
    }

    /// Create a runtime with the given switches.
    pub fn with_options(options: CompilerOptions) -> Self {
        initialize_targets();
        log::info!("hlc runtime initialized: {:?}", options);
        let context = Context::create();
        let diagnostics = Box::new(DiagnosticSink::new());
        // SAFETY: the sink is boxed and dropped after the context.
        unsafe { diagnostics::install(&&context, &diagnostics) };
        Self {
            context,
            diagnostics,
            options,
            stats: RefCell::new(SessionStats::default()),
        }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// Whether the context still reports diagnostics to this runtime.
    pub fn diagnostics_installed(&self) -> bool {
        diagnostics::is_installed(&&self.context, &self.diagnostics)
    }

    /// Apply a raw list of backend flags.
    ///
    /// hlc switches are merged into [`Runtime::options`]; the rest goes to
    /// LLVM and affects the whole process. LLVM terminates the process on a
    /// flag it does not recognise.
    pub fn set_command_line_options<S: AsRef<str>>(&mut self, args: &[S]) -> CompileResult<()> {
        let parsed = BackendArgs::parse(args)?;
        self.options.merge(&parsed.switches);
        forward_to_llvm(&parsed.forwarded)
    }

    /// Snapshot of the session statistics.
    pub fn stats(&self) -> SessionStats {
        self.stats.borrow().clone()
    }

    /// Log and count a failed result. Successful results pass through.
    pub fn check<T>(&self, result: CompileResult<T>) -> CompileResult<T> {
        if let Err(err) = &result {
            log::warn!("{}", err);
            self.stats.borrow_mut().record_failure();
        }
        result
    }

    fn track<T>(&self, result: CompileResult<T>, record: impl FnOnce(&mut SessionStats, &T)) -> CompileResult<T> {
        if let Ok(value) = &result {
            record(&mut self.stats.borrow_mut(), value);
        }
        self.check(result)
    }

    /// Parse a module from IR text. The result is not verified.
    pub fn parse_text(&self, text: &str) -> CompileResult<IrModule<'_>> {
        let result = IrModule::parse_text(&self.context, text);
        self.track(result, |stats, _| stats.record_parse(false))
    }

    /// Decode a module from bitcode, fully materialized.
    pub fn parse_bitcode(&self, bytes: &[u8]) -> CompileResult<IrModule<'_>> {
        let result = IrModule::parse_bitcode(&self.context, bytes);
        self.track(result, |stats, _| stats.record_parse(true))
    }

    /// Run the optimization pipeline over `module`.
    ///
    /// A module that fails verification on entry terminates the process.
    pub fn optimize(&self, module: &mut IrModule<'_>, request: OptimizationRequest) -> CompileResult<()> {
        let result = llvm::optimize(module, &request, &self.options);
        self.track(result, |stats, _| stats.record_optimization())
    }

    /// Merge a copy of `src` into `dst`.
    pub fn link<'ctx>(&self, dst: &mut IrModule<'ctx>, src: &IrModule<'ctx>) -> CompileResult<()> {
        let result = llvm::link(dst, src);
        self.track(result, |stats, _| stats.record_link())
    }

    /// Lower a copy of `module` to `kind`.
    pub fn emit(&self, module: &IrModule<'_>, level: OptLevel, kind: OutputKind) -> CompileResult<Artifact> {
        let result = llvm::emit(module, level, kind);
        self.track(result, |stats, artifact| stats.record_emit(kind, artifact.len()))
    }

    pub fn emit_assembly(&self, module: &IrModule<'_>, level: OptLevel) -> CompileResult<String> {
        let result = llvm::emit_assembly(module, level);
        self.track(result, |stats, text| stats.record_emit(OutputKind::Assembly, text.len()))
    }

    pub fn emit_object(&self, module: &IrModule<'_>, level: OptLevel) -> CompileResult<ObjectCode> {
        let result = llvm::emit_object(module, level);
        self.track(result, |stats, object| stats.record_emit(OutputKind::Object, object.len()))
    }

    /// Tear the context down. Modules must already be gone.
    pub fn finalize(self) {
        log::info!("hlc runtime finalized\n{}", self.stats.borrow());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_is_idempotent() {
        let first = Runtime::initialize();
        let second = Runtime::initialize();
        assert!(targets_initialized());
        first.finalize();
        second.finalize();
    }

    #[test]
    fn test_switches_merge_into_options() {
        let mut runtime = Runtime::initialize();
        runtime
            .set_command_line_options(&["-disable-inlining", "--disable-slp-vectorization"])
            .unwrap();
        assert!(runtime.options().disable_inlining);
        assert!(runtime.options().disable_slp_vectorization);
        assert!(!runtime.options().strip_debug);
    }

    #[test]
    fn test_runtime_owns_diagnostics() {
        let runtime = Runtime::initialize();
        assert!(runtime.diagnostics_installed());
        let moved = Box::new(runtime);
        assert!(moved.diagnostics_installed());
    }

    #[test]
    fn test_real_llvm_flag_is_forwarded() {
        let mut runtime = Runtime::initialize();
        runtime
            .set_command_line_options(&["-enable-misched=true", "--strip-debug"])
            .unwrap();
        assert!(runtime.options().strip_debug);
    }

    #[test]
    fn test_check_counts_external_failures() {
        let runtime = Runtime::initialize();
        assert!(runtime.check::<()>(Ok(())).is_ok());
        assert!(runtime
            .check::<()>(Err(CompileError::InvalidHandle { id: 3 }))
            .is_err());
        assert_eq!(runtime.stats().failures, 1);
    }

    #[test]
    fn test_parse_failure_is_counted() {
        let runtime = Runtime::initialize();
        assert!(runtime.parse_text("define i32 @broken(").is_err());
        let stats = runtime.stats();
        assert_eq!(stats.modules_parsed, 0);
        assert_eq!(stats.failures, 1);
    }
}
