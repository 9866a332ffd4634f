//! Backend driver.
//!
//! Reads textual IR, runs every function through the backend pipeline and
//! prints the requested stages.
//!
//! ```bash
//! cymbolc --print-ssa --print-alloc tests/filetest/diamond.tir
//! RUST_LOG=debug cymbolc --print-frame - < input.tir
//! ```

use clap::Parser;
use cymbol_backend::core::CompilationSession;
use cymbol_backend::pipeline::{compile_function, PipelineOptions};
use cymbol_backend::tir::{parse_ir, render, PrintOptions};
use std::error::Error;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "cymbolc")]
#[command(about = "Cymbol backend: CFG, dominators, SSA, register allocation and frame layout", long_about = None)]
struct Cli {
    /// Input .tir file, or `-` for stdin
    input: PathBuf,

    /// Print the linked IR
    #[arg(long)]
    print_ir: bool,

    /// Print the CFG before SSA construction
    #[arg(long)]
    print_cfg: bool,

    /// Print the CFG integrity report
    #[arg(long)]
    print_integrity: bool,

    /// Print the reverse post-order
    #[arg(long)]
    print_rpo: bool,

    /// Print dominator, idom and dominance frontier tables
    #[arg(long)]
    print_dom: bool,

    /// Print the CFG in SSA form
    #[arg(long)]
    print_ssa: bool,

    /// Print register and spill slot assignments
    #[arg(long)]
    print_alloc: bool,

    /// Print the stack frame layout
    #[arg(long)]
    print_frame: bool,

    /// Also emit Graphviz dot for the printed graphs
    #[arg(long)]
    dot: bool,

    /// Only compile the named function
    #[arg(long)]
    function: Option<String>,

    /// Scan registers in ascending order instead of callee-saved first
    #[arg(long)]
    no_prefer_callee_saved: bool,

    /// Fail when the spill area would exceed this many slots
    #[arg(long)]
    max_spill_slots: Option<u32>,

    /// Treat frame layout violations as errors
    #[arg(long)]
    strict_layout: bool,

    /// Print session statistics at the end
    #[arg(long)]
    stats: bool,
}

impl Cli {
    fn print_options(&self) -> PrintOptions {
        PrintOptions {
            ir: self.print_ir,
            cfg: self.print_cfg,
            integrity: self.print_integrity,
            rpo: self.print_rpo,
            dom: self.print_dom,
            ssa: self.print_ssa,
            alloc: self.print_alloc,
            frame: self.print_frame,
            dot: self.dot,
        }
    }

    fn pipeline_options(&self) -> PipelineOptions {
        let mut options = PipelineOptions {
            strict_layout: self.strict_layout,
            ..PipelineOptions::default()
        };
        options.allocator.prefer_callee_saved = !self.no_prefer_callee_saved;
        options.allocator.max_spill_slots = self.max_spill_slots;
        options
    }
}

fn read_input(path: &Path) -> io::Result<String> {
    if path.as_os_str() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        fs::read_to_string(path)
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn Error>> {
    let text = read_input(&cli.input)
        .map_err(|e| format!("cannot read {}: {}", cli.input.display(), e))?;
    let funcs = parse_ir(&text)?;

    let session = CompilationSession::new();
    let print = cli.print_options();
    let options = cli.pipeline_options();
    for func in &funcs {
        if cli.function.as_deref().is_some_and(|name| name != func.name()) {
            continue;
        }
        let compiled = compile_function(&session, func, &options)?;
        print!("{}", render(func, &compiled, &print)?);
    }

    if cli.stats {
        print!("{}", session.stats());
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
