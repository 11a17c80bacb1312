// This module lowers a module to target code. Every call works on a verified deep copy of
// the caller's module, so emitting never changes what the caller holds. The copy gets the
// fixed codegen triple and the target machine's data layout (overriding whatever the module
// carried), the same target attribute and no-builtins rewrites the optimizer applies, and is
// then run through the backend pipeline LLVM builds for the requested file type, writing into
// an in-memory buffer. Error diagnostics the backend reports while doing so (resource limits,
// unsupported constructs) fail the call even when LLVM still produced output. Assembly comes back as text; object code as an owned ObjectCode buffer
// that can list the symbols of the ELF code object it contains.

//! Code generation backend.

use std::fmt;

use inkwell::targets::FileType;
use object::{Object, ObjectSymbol};

use super::diagnostics::CaptureScope;
use super::module::IrModule;
use super::pipeline::OptLevel;
use super::target::{self, TargetConfig};
use crate::core::{CompileError, CompileResult, VerifyStage};

/// Output encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Assembly,
    Object,
}

impl OutputKind {
    fn file_type(self) -> FileType {
        match self {
            OutputKind::Assembly => FileType::Assembly,
            OutputKind::Object => FileType::Object,
        }
    }
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputKind::Assembly => f.write_str("assembly"),
            OutputKind::Object => f.write_str("object"),
        }
    }
}

/// Object code handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectCode {
    bytes: Vec<u8>,
}

impl ObjectCode {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Names of the symbols the object defines.
    pub fn defined_symbols(&self) -> CompileResult<Vec<String>> {
        let file = object::File::parse(&*self.bytes).map_err(|e| CompileError::CodeGeneration {
            reason: format!("emitted object does not parse: {e}"),
        })?;

        Ok(file
            .symbols()
            .filter(|symbol| symbol.is_definition())
            .filter_map(|symbol| symbol.name().ok())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect())
    }
}

/// Either kind of emitted output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    Assembly(String),
    Object(ObjectCode),
}

impl Artifact {
    pub fn len(&self) -> usize {
        match self {
            Artifact::Assembly(text) => text.len(),
            Artifact::Object(object) => object.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Artifact::Assembly(text) => text.as_bytes(),
            Artifact::Object(object) => object.as_bytes(),
        }
    }
}

/// Lower a copy of `module` to `kind`.
pub fn emit(module: &IrModule<'_>, level: OptLevel, kind: OutputKind) -> CompileResult<Artifact> {
    match kind {
        OutputKind::Assembly => emit_assembly(module, level).map(Artifact::Assembly),
        OutputKind::Object => emit_object(module, level).map(Artifact::Object),
    }
}

pub fn emit_assembly(module: &IrModule<'_>, level: OptLevel) -> CompileResult<String> {
    let bytes = compile(module, level, OutputKind::Assembly)?;
    String::from_utf8(bytes).map_err(|e| CompileError::CodeGeneration {
        reason: format!("assembly is not valid UTF-8: {e}"),
    })
}

pub fn emit_object(module: &IrModule<'_>, level: OptLevel) -> CompileResult<ObjectCode> {
    let bytes = compile(module, level, OutputKind::Object)?;
    Ok(ObjectCode { bytes })
}

fn compile(module: &IrModule<'_>, level: OptLevel, kind: OutputKind) -> CompileResult<Vec<u8>> {
    log::info!("emitting {} for {} at {}", kind, module.name(), level);

    let copy = module.clone_at(VerifyStage::Codegen)?;
    let config = TargetConfig::codegen();
    let machine = config.create_target_machine(level)?;
    machine.set_asm_verbosity(true);

    let llvm = copy.as_llvm();
    llvm.set_triple(&config.normalized_triple());
    llvm.set_data_layout(&machine.get_target_data().get_data_layout());
    target::apply_function_attributes(llvm, &config);
    target::disable_lib_calls(llvm);

    let scope = CaptureScope::begin(&llvm.get_context());
    let written = machine.write_to_memory_buffer(llvm, kind.file_type());
    let diagnostics = scope.finish();

    let buffer = written.map_err(|e| classify_backend_error(kind, e.to_string()))?;
    if !diagnostics.is_empty() {
        return Err(CompileError::CodeGeneration {
            reason: diagnostics.join("\n"),
        });
    }

    let bytes = buffer.as_slice().to_vec();
    log::debug!("{} output: {} bytes", kind, bytes.len());
    Ok(bytes)
}

fn classify_backend_error(kind: OutputKind, message: String) -> CompileError {
    if message.contains("can't emit a file of this type") {
        CompileError::UnsupportedOutputKind { kind, message }
    } else {
        CompileError::CodeGeneration { reason: message }
    }
}
