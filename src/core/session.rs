// This module provides CompilationSession, the per-compilation-unit context threaded
// through the backend pipeline. It replaces process-wide mutable counters: everything a
// compilation accumulates (the function currently being compiled, how many blocks and
// edges were built, how many phis were inserted, how many registers were handed out and
// how many variables were spilled) lives in one session value owned by the caller, so
// independent compilations never observe each other's state. Methods take `&self` and
// record through interior mutability, which lets every stage borrow the session shared.
// SessionStats renders a short human-readable summary for the driver.

//! Per-compilation-unit session state and statistics.

use std::cell::RefCell;
use std::fmt;

/// Compilation session.
///
/// Owns the statistics of one compilation unit. Block ids are generated by
/// each [`IrFunction`](crate::ir::IrFunction), never by a global counter.
#[derive(Debug, Default)]
pub struct CompilationSession {
    /// Session statistics for debugging.
    stats: RefCell<SessionStats>,

    /// Current function being compiled.
    current_function: RefCell<Option<String>>,
}

impl CompilationSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set current function being compiled.
    pub fn set_current_function(&self, name: &str) {
        *self.current_function.borrow_mut() = Some(name.to_string());
    }

    pub fn current_function(&self) -> Option<String> {
        self.current_function.borrow().clone()
    }

    /// Clear per-function state.
    pub fn clear_function_state(&self) {
        *self.current_function.borrow_mut() = None;
    }

    /// Record a finished CFG.
    pub fn record_cfg_built(&self, blocks: usize, edges: usize) {
        let mut stats = self.stats.borrow_mut();
        stats.blocks_built += blocks;
        stats.edges_built += edges;
    }

    /// Record that a function went through the whole pipeline.
    pub fn record_function_compiled(&self, name: &str, blocks: usize) {
        let mut stats = self.stats.borrow_mut();
        stats.functions_compiled += 1;

        if stats.largest_function_blocks < blocks {
            stats.largest_function_blocks = blocks;
            stats.largest_function_name = name.to_string();
        }
    }

    pub fn record_phis_inserted(&self, count: usize) {
        self.stats.borrow_mut().phis_inserted += count;
    }

    pub fn record_register_allocated(&self) {
        self.stats.borrow_mut().registers_allocated += 1;
    }

    pub fn record_spills_generated(&self, count: usize) {
        self.stats.borrow_mut().spills_generated += count;
    }

    pub fn record_layout_violations(&self, count: usize) {
        self.stats.borrow_mut().layout_violations += count;
    }

    /// Get compilation statistics.
    pub fn stats(&self) -> SessionStats {
        self.stats.borrow().clone()
    }
}

/// Compilation session statistics.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionStats {
    /// Number of functions compiled.
    pub functions_compiled: usize,

    /// Blocks placed into CFGs.
    pub blocks_built: usize,

    /// Edges placed into CFGs.
    pub edges_built: usize,

    /// Phi instructions inserted by SSA construction.
    pub phis_inserted: usize,

    /// Variables that received a physical register.
    pub registers_allocated: usize,

    /// Variables placed in spill slots.
    pub spills_generated: usize,

    /// Stack frame layout violations reported.
    pub layout_violations: usize,

    /// Block count of the largest function.
    pub largest_function_blocks: usize,

    /// Name of largest function.
    pub largest_function_name: String,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Compilation Session Statistics:")?;
        writeln!(f, "  Functions compiled: {}", self.functions_compiled)?;
        writeln!(f, "  Blocks: {}", self.blocks_built)?;
        writeln!(f, "  Edges: {}", self.edges_built)?;
        writeln!(f, "  Phi nodes inserted: {}", self.phis_inserted)?;
        writeln!(f, "  Registers allocated: {}", self.registers_allocated)?;
        writeln!(f, "  Spills generated: {}", self.spills_generated)?;
        writeln!(f, "  Layout violations: {}", self.layout_violations)?;

        if !self.largest_function_name.is_empty() {
            writeln!(
                f,
                "  Largest function: {} ({} blocks)",
                self.largest_function_name, self.largest_function_blocks
            )?;
        }

        Ok(())
    }
}
