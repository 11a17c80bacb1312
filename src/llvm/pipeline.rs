// This module decides which passes run for an optimization request. OptLevel and SizeLevel
// are typed levels; converting an out-of-range integer fails with InvalidLevel instead of
// leaving the level dispatch undefined. PassPipeline is a pure value built fresh for every
// request: an ordered list of named bundles, each made of module, cgscc or function scoped
// steps, plus the tuning flags handed to LLVM's pass builder. The bundles mirror the classic
// opt layout: a standard link-time bundle whenever the level is positive, then the
// per-function simplification bundle (LLVM's function adaptor walks the functions in
// declaration order inside one analysis-manager lifetime), then the level specific module
// bundle with its inliner policy, vectorizers and unroller. Level 0 yields an empty pipeline.
// Rendering produces the textual pipeline description accepted by LLVMRunPasses.

//! Optimization levels and pass pipeline selection.

use std::fmt;

use inkwell::passes::PassBuilderOptions;
use inkwell::OptimizationLevel;

use crate::core::{CompileError, CompileResult, CompilerOptions};

/// Optimization level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum OptLevel {
    #[default]
    O0,
    O1,
    O2,
    O3,
}

impl OptLevel {
    pub const ALL: [OptLevel; 4] = [OptLevel::O0, OptLevel::O1, OptLevel::O2, OptLevel::O3];

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Code generator level: 0 none, 1 less, 2 default, 3 aggressive.
    pub fn codegen_level(self) -> OptimizationLevel {
        match self {
            OptLevel::O0 => OptimizationLevel::None,
            OptLevel::O1 => OptimizationLevel::Less,
            OptLevel::O2 => OptimizationLevel::Default,
            OptLevel::O3 => OptimizationLevel::Aggressive,
        }
    }
}

impl TryFrom<i64> for OptLevel {
    type Error = CompileError;

    fn try_from(value: i64) -> CompileResult<Self> {
        match value {
            0 => Ok(OptLevel::O0),
            1 => Ok(OptLevel::O1),
            2 => Ok(OptLevel::O2),
            3 => Ok(OptLevel::O3),
            _ => Err(CompileError::InvalidLevel {
                what: "optimization",
                value,
            }),
        }
    }
}

impl fmt::Display for OptLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "O{}", self.as_u8())
    }
}

/// Bias towards code size: 0 none, 1 `Os`, 2 `Oz`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum SizeLevel {
    #[default]
    None,
    Small,
    Smallest,
}

impl SizeLevel {
    pub const ALL: [SizeLevel; 3] = [SizeLevel::None, SizeLevel::Small, SizeLevel::Smallest];

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<i64> for SizeLevel {
    type Error = CompileError;

    fn try_from(value: i64) -> CompileResult<Self> {
        match value {
            0 => Ok(SizeLevel::None),
            1 => Ok(SizeLevel::Small),
            2 => Ok(SizeLevel::Smallest),
            _ => Err(CompileError::InvalidLevel { what: "size", value }),
        }
    }
}

/// What the caller asked `optimize` for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OptimizationRequest {
    pub opt_level: OptLevel,
    pub size_level: SizeLevel,
    /// Run the verifier after every pass.
    pub verify: bool,
}

impl OptimizationRequest {
    pub fn new(opt_level: OptLevel, size_level: SizeLevel) -> Self {
        Self {
            opt_level,
            size_level,
            verify: false,
        }
    }

    /// Validate raw levels as they arrive over the C boundary.
    pub fn from_raw(opt_level: i64, size_level: i64, verify: bool) -> CompileResult<Self> {
        Ok(Self {
            opt_level: OptLevel::try_from(opt_level)?,
            size_level: SizeLevel::try_from(size_level)?,
            verify,
        })
    }

    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }
}

/// Inliner used by the per-level bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InlinerPolicy {
    Disabled,
    /// Only `alwaysinline` callees; LLVM's cost-model inliner needs level 2+.
    AlwaysInline,
    /// Cost-model inliner, sized by the function's level.
    CostModel,
}

impl InlinerPolicy {
    pub fn select(level: OptLevel, options: &CompilerOptions) -> Self {
        if options.disable_inlining {
            InlinerPolicy::Disabled
        } else if level > OptLevel::O1 {
            InlinerPolicy::CostModel
        } else {
            InlinerPolicy::AlwaysInline
        }
    }
}

/// Pass manager nesting a step runs at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassScope {
    Module,
    Cgscc,
    Function,
}

/// A run of passes at one scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassStep {
    pub scope: PassScope,
    pub passes: Vec<String>,
}

impl PassStep {
    fn new<S: Into<String>>(scope: PassScope, passes: impl IntoIterator<Item = S>) -> Self {
        Self {
            scope,
            passes: passes.into_iter().map(Into::into).collect(),
        }
    }

    fn render(&self) -> String {
        let body = self.passes.join(",");
        match self.scope {
            PassScope::Module => body,
            PassScope::Cgscc => format!("cgscc({body})"),
            PassScope::Function => format!("function({body})"),
        }
    }
}

/// A named group of steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassBundle {
    pub name: String,
    pub steps: Vec<PassStep>,
}

impl PassBundle {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    fn step<S: Into<String>>(mut self, scope: PassScope, passes: impl IntoIterator<Item = S>) -> Self {
        let step = PassStep::new(scope, passes);
        if !step.passes.is_empty() {
            self.steps.push(step);
        }
        self
    }

    /// Every pass name in order, without scope wrappers.
    pub fn pass_names(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().flat_map(|s| s.passes.iter().map(String::as_str))
    }

    pub fn render(&self) -> String {
        self.steps.iter().map(PassStep::render).collect::<Vec<_>>().join(",")
    }
}

/// Flags handed to LLVM's pass builder alongside the pipeline text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineTuning {
    pub loop_vectorize: bool,
    pub slp_vectorize: bool,
    pub unroll_loops: bool,
    /// Verify the module after every bundle.
    pub verify_each: bool,
}

/// Ordered pass bundles for one optimization request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PassPipeline {
    pub bundles: Vec<PassBundle>,
    pub tuning: PipelineTuning,
}

impl PassPipeline {
    /// Select passes for `request`.
    pub fn build(request: &OptimizationRequest, options: &CompilerOptions) -> Self {
        let level = request.opt_level;
        let size = request.size_level;
        let vectorize = level > OptLevel::O1 && size < SizeLevel::Smallest;

        let tuning = PipelineTuning {
            loop_vectorize: !options.disable_loop_vectorization && vectorize,
            slp_vectorize: !options.disable_slp_vectorization && vectorize,
            unroll_loops: level != OptLevel::O0,
            verify_each: request.verify,
        };

        let mut bundles = Vec::new();
        if level > OptLevel::O0 && !options.disable_optimizations {
            bundles.push(standard_link_bundle(options));
        }
        if level > OptLevel::O0 {
            bundles.push(function_simplification_bundle());
            bundles.push(module_bundle(level, size, InlinerPolicy::select(level, options), &tuning));
        }

        Self { bundles, tuning }
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.iter().all(|b| b.steps.is_empty())
    }

    pub fn bundle(&self, name: &str) -> Option<&PassBundle> {
        self.bundles.iter().find(|b| b.name == name)
    }

    /// Whether any bundle runs `pass`.
    pub fn contains(&self, pass: &str) -> bool {
        self.bundles.iter().any(|b| b.pass_names().any(|p| p == pass))
    }

    /// Textual pipeline for `LLVMRunPasses`.
    pub fn render(&self) -> String {
        self.bundles
            .iter()
            .filter(|b| !b.steps.is_empty())
            .map(PassBundle::render)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Pipeline texts to run in order. With verify-each every bundle runs on
    /// its own so the module can be checked in between.
    pub fn segments(&self) -> Vec<String> {
        if self.tuning.verify_each {
            self.bundles
                .iter()
                .filter(|b| !b.steps.is_empty())
                .map(PassBundle::render)
                .collect()
        } else if self.is_empty() {
            Vec::new()
        } else {
            vec![self.render()]
        }
    }

    /// Pass builder flags. Verification is never delegated to LLVM's
    /// instrumentation, which aborts on a broken module.
    pub fn builder_options(&self) -> PassBuilderOptions {
        let options = PassBuilderOptions::create();
        options.set_loop_vectorization(self.tuning.loop_vectorize);
        options.set_loop_slp_vectorization(self.tuning.slp_vectorize);
        options.set_loop_unrolling(self.tuning.unroll_loops);
        options.set_loop_interleaving(self.tuning.loop_vectorize);
        options
    }
}

/// Link-time cleanup run once for every positive level.
fn standard_link_bundle(options: &CompilerOptions) -> PassBundle {
    use PassScope::*;

    let inliner: &[&str] = if options.disable_inlining { &[] } else { &["inline"] };

    PassBundle::new("standard-link")
        .step(Module, ["globaldce", "forceattrs", "inferattrs"])
        .step(Cgscc, ["function-attrs"])
        .step(
            Module,
            ["rpo-function-attrs", "ipsccp", "called-value-propagation", "globalopt", "constmerge", "deadargelim"],
        )
        .step(Function, ["instcombine"])
        .step(Cgscc, inliner.iter().copied())
        .step(Module, ["globalopt", "globaldce"])
        .step(Function, ["instcombine", "jump-threading", "sroa", "tailcallelim"])
        .step(Cgscc, ["function-attrs"])
        .step(Function, ["loop-mssa(licm)", "mldst-motion", "gvn", "memcpyopt", "dse"])
        .step(Function, ["instcombine", "jump-threading", "simplifycfg"])
        .step(Module, ["elim-avail-extern", "globaldce"])
}

/// Early per-function cleanup.
fn function_simplification_bundle() -> PassBundle {
    PassBundle::new("function-simplification")
        .step(PassScope::Function, ["lower-expect", "simplifycfg", "sroa", "early-cse"])
}

/// Level specific module pipeline.
fn module_bundle(level: OptLevel, size: SizeLevel, inliner: InlinerPolicy, tuning: &PipelineTuning) -> PassBundle {
    use PassScope::*;

    let mut bundle = PassBundle::new(format!("module-{level}"))
        .step(
            Module,
            ["forceattrs", "inferattrs", "ipsccp", "called-value-propagation", "globalopt", "deadargelim"],
        )
        .step(Function, ["mem2reg", "instcombine", "simplifycfg"]);

    bundle = match inliner {
        InlinerPolicy::CostModel => bundle.step(Cgscc, ["inline", "function-attrs"]),
        InlinerPolicy::AlwaysInline => bundle
            .step(Module, ["always-inline"])
            .step(Cgscc, ["function-attrs"]),
        InlinerPolicy::Disabled => bundle.step(Cgscc, ["function-attrs"]),
    };

    if level > OptLevel::O2 && size == SizeLevel::None {
        bundle = bundle.step(Cgscc, ["argpromotion"]);
    }

    let mut simplify: Vec<String> = vec!["sroa".into(), "early-cse<memssa>".into()];
    if level > OptLevel::O1 {
        simplify.push("speculative-execution".into());
    }
    simplify.extend(["jump-threading", "correlated-propagation", "simplifycfg"].map(String::from));
    if level > OptLevel::O2 {
        simplify.push("aggressive-instcombine".into());
    }
    simplify.push("instcombine".into());
    if size == SizeLevel::None {
        simplify.push("tailcallelim".into());
    }
    simplify.extend(
        ["simplifycfg", "reassociate", "loop-mssa(loop-rotate,licm)", "simplifycfg", "instcombine"].map(String::from),
    );
    if tuning.unroll_loops {
        simplify.push("loop(loop-idiom,indvars,loop-deletion,loop-unroll-full)".into());
    } else {
        simplify.push("loop(loop-idiom,indvars,loop-deletion)".into());
    }
    if level > OptLevel::O1 {
        simplify.extend(["mldst-motion", "gvn"].map(String::from));
    }
    simplify.extend(
        [
            "memcpyopt",
            "sccp",
            "bdce",
            "instcombine",
            "jump-threading",
            "correlated-propagation",
            "dse",
            "loop-mssa(licm)",
            "adce",
            "simplifycfg",
            "instcombine",
        ]
        .map(String::from),
    );
    bundle = bundle
        .step(Function, simplify)
        .step(Module, ["rpo-function-attrs", "globalopt", "globaldce", "elim-avail-extern"]);

    let mut late: Vec<String> = vec!["float2int".into(), "loop(loop-rotate)".into()];
    if tuning.loop_vectorize {
        late.push("loop-vectorize".into());
    }
    late.extend(["loop-load-elim", "instcombine", "simplifycfg"].map(String::from));
    if tuning.slp_vectorize {
        late.push("slp-vectorizer".into());
    }
    late.push("instcombine".into());
    if tuning.unroll_loops {
        late.push(format!("loop-unroll<O{}>", level.as_u8()));
    }
    late.push("alignment-from-assumptions".into());

    bundle
        .step(Function, late)
        .step(Module, ["strip-dead-prototypes", "globaldce", "constmerge"])
}
