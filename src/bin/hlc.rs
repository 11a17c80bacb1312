//! hlc driver.
//!
//! Reads a module (IR text or bitcode), links any extra modules into it,
//! optimizes it and writes assembly, object code or the optimized IR.

use std::error::Error;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use hlc::llvm::looks_like_bitcode;
use hlc::{CompilerOptions, IrModule, OptimizationRequest, OutputKind, Runtime};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Emit {
    Asm,
    Obj,
    Ir,
}

#[derive(Debug, Parser)]
#[command(name = "hlc", version, about = "Compile LLVM IR for the amdgcn HSA target")]
struct Cli {
    /// Input module, `-` for stdin.
    input: PathBuf,

    /// Additional modules to link into the input, in order.
    #[arg(long = "link", value_name = "FILE")]
    link: Vec<PathBuf>,

    /// Optimization level (0-3).
    #[arg(short = 'O', default_value_t = 2)]
    opt_level: i64,

    /// Size level (0-2).
    #[arg(long = "size", default_value_t = 0)]
    size_level: i64,

    #[arg(long = "emit", value_enum, default_value_t = Emit::Asm)]
    emit: Emit,

    /// Output file, stdout when omitted.
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Verify the module after every pass bundle.
    #[arg(long = "verify-each")]
    verify_each: bool,

    /// Flag forwarded to LLVM; may be repeated.
    #[arg(long = "llvm-arg", value_name = "FLAG", allow_hyphen_values = true)]
    llvm_args: Vec<String>,

    /// Print session statistics to stderr.
    #[arg(long = "stats")]
    stats: bool,

    #[command(flatten)]
    switches: CompilerOptions,
}

fn read_input(path: &Path) -> io::Result<Vec<u8>> {
    if path.as_os_str() == "-" {
        let mut buffer = Vec::new();
        io::stdin().read_to_end(&mut buffer)?;
        Ok(buffer)
    } else {
        fs::read(path)
    }
}

fn load<'ctx>(runtime: &'ctx Runtime, path: &Path) -> Result<IrModule<'ctx>, Box<dyn Error>> {
    let bytes = read_input(path)?;
    let module = if looks_like_bitcode(&bytes) {
        runtime.parse_bitcode(&bytes)?
    } else {
        runtime.parse_text(std::str::from_utf8(&bytes)?)?
    };
    log::debug!("loaded {} ({} bytes)", path.display(), bytes.len());
    Ok(module)
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let cli = Cli::parse();

    let request = OptimizationRequest::from_raw(cli.opt_level, cli.size_level, cli.verify_each)?;

    let mut runtime = Runtime::with_options(cli.switches.clone());
    runtime.set_command_line_options(&cli.llvm_args)?;

    let mut module = load(&runtime, &cli.input)?;
    for path in &cli.link {
        let extra = load(&runtime, path)?;
        runtime.link(&mut module, &extra)?;
    }

    runtime.optimize(&mut module, request)?;

    let bytes = match cli.emit {
        Emit::Ir => module.serialize().into_bytes(),
        Emit::Asm => runtime.emit(&module, request.opt_level, OutputKind::Assembly)?.as_bytes().to_vec(),
        Emit::Obj => runtime.emit(&module, request.opt_level, OutputKind::Object)?.as_bytes().to_vec(),
    };

    match &cli.output {
        Some(path) => fs::write(path, &bytes)?,
        None => io::stdout().write_all(&bytes)?,
    }

    if cli.stats {
        eprintln!("{}", runtime.stats());
    }

    drop(module);
    runtime.finalize();
    Ok(())
}
