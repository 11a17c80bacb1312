// This module holds the global switches that shape the optimization pipeline and the raw
// backend-flag passthrough. CompilerOptions is a clap Args struct so the same switches are
// accepted by the hlc driver (flattened into its command line) and by
// Runtime::set_command_line_options, which receives an untyped list of strings from the host.
// BackendArgs::parse splits such a list: arguments naming one of our switches (single or
// double dash, the way LLVM tools spell them) are parsed by clap, everything else is kept
// verbatim so it can be forwarded to LLVM's own command-line parser.

//! Backend switches and command-line passthrough.

use clap::{Args, CommandFactory, Parser};

use super::error::{CompileError, CompileResult};

/// Global switches consulted by the optimization pipeline.
///
/// All switches default to off. Library-call simplification is not a switch:
/// it is disabled unconditionally because the target has no C runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Args)]
pub struct CompilerOptions {
    /// Do not add any inliner to the pass pipelines.
    #[arg(long = "disable-inlining")]
    pub disable_inlining: bool,

    /// Never run the loop vectorizer.
    #[arg(long = "disable-loop-vectorization")]
    pub disable_loop_vectorization: bool,

    /// Never run the SLP vectorizer.
    #[arg(long = "disable-slp-vectorization")]
    pub disable_slp_vectorization: bool,

    /// Strip debug metadata before verifying the input.
    #[arg(long = "strip-debug")]
    pub strip_debug: bool,

    /// Reduce the standard link-time bundle to nothing.
    #[arg(long = "disable-opt")]
    pub disable_optimizations: bool,
}

impl CompilerOptions {
    /// Turn on every switch that is on in `other`.
    pub fn merge(&mut self, other: &CompilerOptions) {
        self.disable_inlining |= other.disable_inlining;
        self.disable_loop_vectorization |= other.disable_loop_vectorization;
        self.disable_slp_vectorization |= other.disable_slp_vectorization;
        self.strip_debug |= other.strip_debug;
        self.disable_optimizations |= other.disable_optimizations;
    }
}

#[derive(Parser)]
#[command(name = "hlc-backend", no_binary_name = true)]
struct SwitchParser {
    #[command(flatten)]
    options: CompilerOptions,
}

/// A backend argument list split into our switches and LLVM's flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendArgs {
    /// Switches recognised by hlc.
    pub switches: CompilerOptions,
    /// Arguments left for LLVM, in their original order and spelling.
    pub forwarded: Vec<String>,
}

impl BackendArgs {
    /// Split and parse a raw argument list.
    pub fn parse<S: AsRef<str>>(args: &[S]) -> CompileResult<Self> {
        let command = SwitchParser::command();
        let known: Vec<&str> = command
            .get_arguments()
            .filter_map(|arg| arg.get_long())
            .collect();

        let mut ours = Vec::new();
        let mut forwarded = Vec::new();
        for arg in args {
            let arg = arg.as_ref();
            let trimmed = arg.trim_start_matches('-');
            let name = trimmed.split('=').next().unwrap_or(trimmed);
            if arg.starts_with('-') && known.contains(&name) {
                ours.push(format!("--{trimmed}"));
            } else {
                forwarded.push(arg.to_string());
            }
        }

        let parsed = SwitchParser::try_parse_from(&ours).map_err(|e| CompileError::InvalidOption {
            reason: e.to_string(),
        })?;

        Ok(Self {
            switches: parsed.options,
            forwarded,
        })
    }
}
