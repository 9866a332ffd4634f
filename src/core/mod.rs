// This module collects the infrastructure shared by every backend stage: the error
// taxonomy (structural errors for malformed graphs, allocation exhaustion, frame layout
// violations, parse errors), the per-compilation-unit session that replaces process-wide
// counters and accumulates statistics, and the bitset register file that the register
// allocator builds on. None of these components know about a particular pass; they are
// the vocabulary the passes share.

//! Core backend infrastructure.
//!
//! # Key Components
//!
//! ## Errors (`error`)
//! - [`CompileError`] and the [`CompileResult`] alias used by every stage
//! - Structural errors and frame layout violations
//!
//! ## Session Management (`session`)
//! - Per-compilation-unit state, no globals
//! - Compilation statistics
//!
//! ## Register Tracking (`register_file`)
//! - Bitset register sets
//! - Ownership of physical registers by variable name

pub mod error;
pub mod register_file;
pub mod session;

pub use error::{CompileError, CompileResult, LayoutViolation, StructuralError};
pub use register_file::{Reg, RegAllocError, RegSet, RegisterFile};
pub use session::{CompilationSession, SessionStats};
