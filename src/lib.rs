//! Cymbol backend - from linked IR blocks to a 16-register VM.
//!
//! The crate takes the basic blocks produced by the Cymbol front end, builds
//! a control-flow graph, computes dominators and dominance frontiers,
//! rewrites the graph into SSA form, assigns every SSA variable a register
//! or spill slot and lays out an ABI-conformant stack frame.
//!
//! # Primary Usage
//!
//! ```
//! use cymbol_backend::core::CompilationSession;
//! use cymbol_backend::pipeline::{compile_function, PipelineOptions};
//! use cymbol_backend::tir::parse_ir;
//!
//! let funcs = parse_ir("func id(x) {\n    ret x\n}\n")?;
//! let session = CompilationSession::new();
//! let compiled = compile_function(&session, &funcs[0], &PipelineOptions::default())?;
//! assert_eq!(compiled.frame.frame_size, 80);
//! # Ok::<(), cymbol_backend::core::CompileError>(())
//! ```
//!
//! # Architecture
//!
//! - [`ir`] - Instructions, basic blocks and linked functions
//! - [`cfg`] - CFG construction and integrity checking
//! - [`analysis`] - Dominators and SSA construction
//! - [`vm16`] - Calling convention, register allocation and frame layout
//! - [`pipeline`] - All stages for one function
//! - [`tir`] - Textual IR, printer and FileCheck runner
//! - [`core`] - Shared infrastructure (errors, session, register file)

pub mod analysis;
pub mod cfg;
pub mod core;
pub mod ir;
pub mod pipeline;
pub mod tir;
pub mod vm16;

pub use analysis::{DominatorAnalysis, SsaGraphBuilder, SsaReport, SsaValidator};
pub use cfg::{Cfg, CfgBuilder, Edge, EdgeKind};
pub use core::{CompilationSession, CompileError, CompileResult, SessionStats};
pub use ir::{BasicBlock, BlockId, Instruction, IrFunction};
pub use pipeline::{compile_function, CompiledFunction, PipelineOptions};
pub use vm16::{FunctionFrame, LinearScanAllocator, Location};
