// This module routes LLVM context diagnostics into Rust. Without a handler LLVM terminates the
// process on the first error diagnostic, and inkwell's module linker leaves its own handler
// installed pointing into a stack frame that no longer exists. The Runtime therefore installs
// a handler backed by a DiagnosticSink it owns for the whole life of its context. Operations
// that can raise backend diagnostics (pass pipelines, linking, code generation) run inside a
// CaptureScope: it swaps in a handler with a fresh sink, runs the operation, and on drop puts
// back whatever handler was installed before, so a handler left behind by the operation never
// outlives it. Error diagnostics are collected for the caller; warnings and remarks are logged.

//! Context diagnostic capture.

use std::cell::RefCell;
use std::ffi::{c_void, CStr};

use inkwell::context::AsContextRef;
use llvm_sys::core::{
    LLVMContextGetDiagnosticContext, LLVMContextGetDiagnosticHandler, LLVMContextSetDiagnosticHandler,
    LLVMDisposeMessage, LLVMGetDiagInfoDescription, LLVMGetDiagInfoSeverity,
};
use llvm_sys::prelude::{LLVMContextRef, LLVMDiagnosticInfoRef};
use llvm_sys::{LLVMDiagnosticHandler, LLVMDiagnosticSeverity};

/// Error diagnostics reported through a context.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    errors: RefCell<Vec<String>>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain the collected error messages.
    pub fn take_errors(&self) -> Vec<String> {
        std::mem::take(&mut *self.errors.borrow_mut())
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.borrow().is_empty()
    }

    fn push(&self, message: String) {
        if let Ok(mut errors) = self.errors.try_borrow_mut() {
            errors.push(message);
        }
    }
}

extern "C" fn collect(info: LLVMDiagnosticInfoRef, sink: *mut c_void) {
    let (severity, message) = unsafe {
        let raw = LLVMGetDiagInfoDescription(info);
        let message = if raw.is_null() {
            String::new()
        } else {
            let text = CStr::from_ptr(raw).to_string_lossy().into_owned();
            LLVMDisposeMessage(raw);
            text
        };
        (LLVMGetDiagInfoSeverity(info), message)
    };

    match severity {
        LLVMDiagnosticSeverity::LLVMDSError => {
            log::debug!("llvm error diagnostic: {}", message);
            // SAFETY: `sink` is the pointer registered next to this handler and
            // outlives its registration.
            if let Some(sink) = unsafe { (sink as *const DiagnosticSink).as_ref() } {
                sink.push(message);
            }
        }
        LLVMDiagnosticSeverity::LLVMDSWarning => log::warn!("llvm: {}", message),
        LLVMDiagnosticSeverity::LLVMDSRemark | LLVMDiagnosticSeverity::LLVMDSNote => {
            log::trace!("llvm: {}", message)
        }
    }
}

fn handler_address(handler: LLVMDiagnosticHandler) -> Option<usize> {
    handler.map(|f| f as usize)
}

/// Point the context's diagnostic handler at `sink`.
///
/// # Safety
///
/// `sink` must stay at the same address until another handler replaces this one.
pub unsafe fn install<'ctx>(context: &impl AsContextRef<'ctx>, sink: &DiagnosticSink) {
    install_raw(context.as_ctx_ref(), sink);
}

unsafe fn install_raw(context: LLVMContextRef, sink: &DiagnosticSink) {
    LLVMContextSetDiagnosticHandler(context, Some(collect), sink as *const DiagnosticSink as *mut c_void);
}

/// Whether the context currently reports into `sink`.
pub fn is_installed<'ctx>(context: &impl AsContextRef<'ctx>, sink: &DiagnosticSink) -> bool {
    let raw = context.as_ctx_ref();
    let (handler, target) = unsafe { (LLVMContextGetDiagnosticHandler(raw), LLVMContextGetDiagnosticContext(raw)) };
    handler_address(handler) == handler_address(Some(collect)) && target as *const DiagnosticSink == sink as *const _
}

/// Diagnostics captured for the duration of one operation.
pub struct CaptureScope {
    context: LLVMContextRef,
    previous_handler: LLVMDiagnosticHandler,
    previous_target: *mut c_void,
    sink: Box<DiagnosticSink>,
}

impl CaptureScope {
    pub fn begin<'ctx>(context: &impl AsContextRef<'ctx>) -> Self {
        let raw = context.as_ctx_ref();
        let sink = Box::new(DiagnosticSink::new());
        let (previous_handler, previous_target) =
            unsafe { (LLVMContextGetDiagnosticHandler(raw), LLVMContextGetDiagnosticContext(raw)) };
        // SAFETY: the boxed sink lives until `Drop` restores the previous handler.
        unsafe { install_raw(raw, &sink) };
        Self {
            context: raw,
            previous_handler,
            previous_target,
            sink,
        }
    }

    /// Restore the previous handler and return the error messages seen.
    pub fn finish(self) -> Vec<String> {
        self.sink.take_errors()
    }
}

impl Drop for CaptureScope {
    fn drop(&mut self) {
        unsafe { LLVMContextSetDiagnosticHandler(self.context, self.previous_handler, self.previous_target) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkwell::context::Context;

    #[test]
    fn test_install_and_detect() {
        let context = Context::create();
        let sink = DiagnosticSink::new();
        let other = DiagnosticSink::new();

        assert!(!is_installed(&&context, &sink));
        unsafe { install(&&context, &sink) };
        assert!(is_installed(&&context, &sink));
        assert!(!is_installed(&&context, &other));
    }

    #[test]
    fn test_scope_restores_previous_handler() {
        let context = Context::create();
        let sink = DiagnosticSink::new();
        unsafe { install(&&context, &sink) };

        let scope = CaptureScope::begin(&&context);
        assert!(!is_installed(&&context, &sink));
        assert!(scope.finish().is_empty());

        assert!(is_installed(&&context, &sink));
        assert!(!sink.has_errors());
    }
}
