// This module defines IrModule, the owned handle to one LLVM module and the unit every hlc
// operation works on. Modules are created only by parsing: IR text through LLVM's assembly
// parser, or bitcode through the eager bitcode reader so every lazily encoded function body
// is materialized before the caller sees the module. Neither path verifies; that is left to
// the pipeline. Serialization renders the canonical textual form without touching the
// module. Deep copies go through try_clone, which verifies first because LLVM cannot clone a
// broken module safely. The read-only queries (function and global names, exported
// definitions, triple, data layout, debug info presence) are what callers and tests use to
// observe the effect of optimization, linking and code generation.

//! Owned LLVM modules.

use inkwell::context::Context;
use inkwell::memory_buffer::MemoryBuffer;
use inkwell::module::{Linkage, Module};
use inkwell::values::GlobalValue;

use super::verifier;
use crate::core::{CompileError, CompileResult, VerifyStage};

/// Identifier given to every parsed module, so that printing and reparsing
/// yields the same `ModuleID` line.
const BUFFER_NAME: &str = "hlc-module";

const BITCODE_MAGIC: [u8; 4] = [b'B', b'C', 0xC0, 0xDE];
const BITCODE_WRAPPER_MAGIC: [u8; 4] = [0xDE, 0xC0, 0x17, 0x0B];

/// Whether `bytes` start like a raw or wrapped bitcode file.
pub fn looks_like_bitcode(bytes: &[u8]) -> bool {
    bytes.starts_with(&BITCODE_MAGIC) || bytes.starts_with(&BITCODE_WRAPPER_MAGIC)
}

/// One IR module, exclusively owned.
///
/// Dropping or [`destroy`](IrModule::destroy)ing the handle releases the
/// whole graph. Cross-module operations only ever see deep copies.
#[derive(Debug)]
pub struct IrModule<'ctx> {
    module: Module<'ctx>,
}

impl<'ctx> IrModule<'ctx> {
    /// Parse IR text.
    pub fn parse_text(context: &'ctx Context, text: &str) -> CompileResult<Self> {
        let buffer = MemoryBuffer::create_from_memory_range_copy(text.as_bytes(), BUFFER_NAME);
        let module = context
            .create_module_from_ir(buffer)
            .map_err(|e| CompileError::Parse {
                message: e.to_string(),
            })?;
        log::info!("parsed IR text ({} bytes)", text.len());
        Ok(Self { module })
    }

    /// Decode bitcode. All function bodies are materialized.
    pub fn parse_bitcode(context: &'ctx Context, bytes: &[u8]) -> CompileResult<Self> {
        let buffer = MemoryBuffer::create_from_memory_range_copy(bytes, BUFFER_NAME);
        let module = Module::parse_bitcode_from_buffer(&buffer, context).map_err(|e| {
            let message = e.to_string();
            log::warn!("bitcode decode failed: {}", message);
            CompileError::Decode { message }
        })?;
        log::info!("decoded bitcode ({} bytes)", bytes.len());
        Ok(Self { module })
    }

    /// Wrap a module built directly through inkwell.
    pub fn from_llvm(module: Module<'ctx>) -> Self {
        Self { module }
    }

    pub fn as_llvm(&self) -> &Module<'ctx> {
        &self.module
    }

    pub fn into_llvm(self) -> Module<'ctx> {
        self.module
    }

    /// Swap in `other`, disposing the current graph.
    pub(crate) fn replace(&mut self, other: Self) {
        self.module = other.module;
    }

    /// Canonical textual form.
    pub fn serialize(&self) -> String {
        self.module.print_to_string().to_string()
    }

    /// Bitcode encoding.
    pub fn to_bitcode(&self) -> Vec<u8> {
        self.module.write_bitcode_to_memory().as_slice().to_vec()
    }

    /// Run the verifier. `Err` carries the diagnostic.
    pub fn verify(&self) -> Result<(), String> {
        verifier::check(&self.module)
    }

    pub(crate) fn verify_at(&self, stage: VerifyStage) -> CompileResult<()> {
        verifier::verify_at(&self.module, stage)
    }

    /// Deep copy. Fails for modules that do not verify.
    pub fn try_clone(&self) -> CompileResult<Self> {
        self.clone_at(VerifyStage::Copy)
    }

    pub(crate) fn clone_at(&self, stage: VerifyStage) -> CompileResult<Self> {
        self.verify_at(stage)?;
        Ok(Self {
            module: self.module.clone(),
        })
    }

    /// Release the module. Equivalent to dropping it.
    pub fn destroy(self) {
        log::debug!("destroying module {}", self.name());
    }

    pub fn name(&self) -> String {
        self.module.get_name().to_string_lossy().into_owned()
    }

    /// Names of all functions, definitions and declarations, in module order.
    pub fn function_names(&self) -> Vec<String> {
        self.module
            .get_functions()
            .map(|f| f.get_name().to_string_lossy().into_owned())
            .collect()
    }

    /// Names of all global variables, in module order.
    pub fn global_names(&self) -> Vec<String> {
        self.module
            .get_globals()
            .map(|g| g.get_name().to_string_lossy().into_owned())
            .collect()
    }

    /// Functions and globals defined here and visible to other modules.
    pub fn exported_definitions(&self) -> Vec<String> {
        let functions = self.module.get_functions().map(|f| f.as_global_value());
        functions
            .chain(self.module.get_globals())
            .filter(is_exported_definition)
            .map(|g| g.get_name().to_string_lossy().into_owned())
            .collect()
    }

    pub fn triple(&self) -> String {
        self.module.get_triple().as_str().to_string_lossy().into_owned()
    }

    pub fn data_layout(&self) -> String {
        self.module
            .get_data_layout()
            .as_str()
            .to_string_lossy()
            .into_owned()
    }

    /// Whether the module carries a debug info version flag.
    pub fn has_debug_info(&self) -> bool {
        unsafe { llvm_sys::debuginfo::LLVMGetModuleDebugMetadataVersion(self.module.as_mut_ptr()) != 0 }
    }

    /// Drop all debug metadata. Returns whether anything was removed.
    pub fn strip_debug_info(&self) -> bool {
        unsafe { llvm_sys::debuginfo::LLVMStripModuleDebugInfo(self.module.as_mut_ptr()) != 0 }
    }
}

fn is_exported_definition(global: &GlobalValue<'_>) -> bool {
    !global.is_declaration() && !matches!(global.get_linkage(), Linkage::Internal | Linkage::Private)
}
