// This module pins the single backend hlc compiles for: the amdgcn architecture with the HSA
// runtime triple, the fiji CPU and a fixed feature string. The optimizer and the code
// generator each carry their own literal TargetConfig; both must describe the same machine so
// the function attributes written during optimization match what codegen writes again, and a
// unit test holds them together. Besides target machine creation the module implements the
// two function-level rewrites both pipelines share: stamping target-cpu/target-features
// attributes on every function (merging feature lists, configured signs win) and marking
// every definition no-builtins so LLVM never turns code into C runtime calls the GPU cannot
// service.

//! Fixed target configuration and target-driven attribute rewrites.

use inkwell::attributes::AttributeLoc;
use inkwell::module::Module;
use inkwell::targets::{CodeModel, RelocMode, Target, TargetMachine, TargetTriple};

use super::pipeline::OptLevel;
use crate::core::{CompileError, CompileResult};

/// Backend, triple, CPU and features of the target machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetConfig {
    /// Architecture name used for the registry lookup.
    pub arch: &'static str,
    pub triple: &'static str,
    pub cpu: &'static str,
    pub features: &'static str,
}

impl TargetConfig {
    /// Configuration used by the optimization pipeline.
    pub const fn optimizer() -> Self {
        Self {
            arch: "amdgcn",
            triple: "amdgcn--amdhsa",
            cpu: "fiji",
            features: "+promote-alloca,+flat-for-global",
        }
    }

    /// Configuration used by the code generator.
    pub const fn codegen() -> Self {
        Self {
            arch: "amdgcn",
            triple: "amdgcn--amdhsa",
            cpu: "fiji",
            features: "+promote-alloca,+flat-for-global",
        }
    }

    pub fn normalized_triple(&self) -> TargetTriple {
        TargetMachine::normalize_triple(&TargetTriple::create(self.triple))
    }

    /// Whether the backend is registered in this process.
    pub fn is_available(&self) -> bool {
        Target::from_name(self.arch).is_some()
    }

    /// Build a target machine for `level`.
    pub fn create_target_machine(&self, level: OptLevel) -> CompileResult<TargetMachine> {
        let target = Target::from_name(self.arch).ok_or_else(|| CompileError::UnsupportedTarget {
            target: self.arch.to_string(),
            reason: "backend is not registered".to_string(),
        })?;
        let triple = self.normalized_triple();

        log::debug!(
            "creating target machine {} cpu={} features={} level={}",
            triple.as_str().to_string_lossy(),
            self.cpu,
            self.features,
            level
        );

        target
            .create_target_machine(
                &triple,
                self.cpu,
                self.features,
                level.codegen_level(),
                RelocMode::Default,
                CodeModel::Default,
            )
            .ok_or_else(|| CompileError::UnsupportedTarget {
                target: triple.as_str().to_string_lossy().into_owned(),
                reason: format!("cannot create a target machine for cpu {}", self.cpu),
            })
    }
}

/// Merge two comma separated feature lists. Entries of `configured`
/// replace entries of `existing` with the same name.
pub fn merge_features(existing: &str, configured: &str) -> String {
    fn feature_name(entry: &str) -> &str {
        entry.trim_start_matches(['+', '-'])
    }

    let configured: Vec<&str> = configured.split(',').map(str::trim).filter(|f| !f.is_empty()).collect();
    let mut merged: Vec<&str> = existing
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .filter(|f| !configured.iter().any(|c| feature_name(c) == feature_name(f)))
        .collect();
    merged.extend(configured);
    merged.join(",")
}

/// Stamp `target-cpu` and `target-features` on every non-intrinsic function.
///
/// Returns the number of functions touched.
pub fn apply_function_attributes(module: &Module<'_>, config: &TargetConfig) -> usize {
    let context = module.get_context();
    let mut touched = 0;

    for function in module.get_functions() {
        if function.get_intrinsic_id() != 0 {
            continue;
        }

        if !config.cpu.is_empty() {
            let cpu = context.create_string_attribute("target-cpu", config.cpu);
            function.add_attribute(AttributeLoc::Function, cpu);
        }

        if !config.features.is_empty() {
            let existing = function
                .get_string_attribute(AttributeLoc::Function, "target-features")
                .map(|attr| attr.get_string_value().to_string_lossy().into_owned())
                .unwrap_or_default();
            let features = merge_features(&existing, config.features);
            let attr = context.create_string_attribute("target-features", &features);
            function.add_attribute(AttributeLoc::Function, attr);
        }

        log::trace!("target attributes set on {}", function.get_name().to_string_lossy());
        touched += 1;
    }

    touched
}

/// Mark every function definition `no-builtins`.
///
/// This is what keeps library-call simplification off: target library info
/// treats every C runtime function as unavailable inside such a function.
pub fn disable_lib_calls(module: &Module<'_>) -> usize {
    let context = module.get_context();
    let mut touched = 0;

    for function in module.get_functions() {
        if function.count_basic_blocks() == 0 {
            continue;
        }
        let attr = context.create_string_attribute("no-builtins", "");
        function.add_attribute(AttributeLoc::Function, attr);
        touched += 1;
    }

    log::trace!("library calls disabled in {} function(s)", touched);
    touched
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkwell::context::Context;

    #[test]
    fn test_optimizer_and_codegen_agree() {
        assert_eq!(TargetConfig::optimizer(), TargetConfig::codegen());
    }

    #[test]
    fn test_merge_features() {
        assert_eq!(merge_features("", "+a,+b"), "+a,+b");
        assert_eq!(merge_features("+x,-a", "+a,+b"), "+x,+a,+b");
        assert_eq!(merge_features("+a", ""), "+a");
        assert_eq!(merge_features(" +x , ,+y", "-y,"), "+x,-y");
    }

    #[test]
    fn test_attributes_skip_intrinsics_and_declarations() {
        let context = Context::create();
        let module = context.create_module("attrs");
        let i32_type = context.i32_type();
        let fn_type = i32_type.fn_type(&[], false);

        let defined = module.add_function("defined", fn_type, None);
        let entry = context.append_basic_block(defined, "entry");
        let builder = context.create_builder();
        builder.position_at_end(entry);
        builder.build_return(Some(&i32_type.const_int(0, false))).unwrap();
        let declared = module.add_function("declared", fn_type, None);

        let config = TargetConfig::optimizer();
        assert_eq!(apply_function_attributes(&module, &config), 2);
        assert_eq!(disable_lib_calls(&module), 1);

        let cpu = defined
            .get_string_attribute(AttributeLoc::Function, "target-cpu")
            .unwrap();
        assert_eq!(cpu.get_string_value().to_str().unwrap(), "fiji");
        assert!(declared
            .get_string_attribute(AttributeLoc::Function, "target-cpu")
            .is_some());
        assert!(defined
            .get_string_attribute(AttributeLoc::Function, "no-builtins")
            .is_some());
        assert!(declared
            .get_string_attribute(AttributeLoc::Function, "no-builtins")
            .is_none());
    }
}
