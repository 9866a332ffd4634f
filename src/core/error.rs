// This module defines the error taxonomy of the backend using the thiserror crate.
// CompileError is the single error type every stage returns: structural problems in
// the control-flow graph (dangling edges, dominator sets that never converge), an
// allocator that has run out of both registers and spill slots, stack frame layout
// violations (aggregated rather than reported one at a time), out-of-bounds ABI or
// frame queries, and textual IR parse failures. No stage retries; errors propagate
// with `?` to the caller compiling the current function.

//! Error types for the backend.
//!
//! Using thiserror for more idiomatic error handling.

use crate::ir::BlockId;
use thiserror::Error;

/// Problems with the shape of a control-flow graph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StructuralError {
    #[error("edge {from} -> {to} references missing block {missing}")]
    DanglingEdge {
        from: BlockId,
        to: BlockId,
        missing: BlockId,
    },

    #[error("dominator sets did not converge after {iterations} iterations")]
    NonConvergence { iterations: usize },

    #[error("unknown block {0}")]
    UnknownBlock(BlockId),

    #[error("block at position {position} has id {id}; ids must be dense")]
    NonDenseBlockIds { position: usize, id: BlockId },

    #[error("function {0} has no blocks")]
    EmptyFunction(String),
}

/// A single stack frame layout problem found by `validate_layout`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayoutViolation {
    #[error("stack frame size {frame_size} is not aligned to {alignment} bytes")]
    Misaligned { frame_size: u64, alignment: u64 },

    #[error("local variable {index} offset {offset} is out of bounds")]
    LocalOutOfFrame { index: u32, offset: u64 },

    #[error("parameter {index} offset {offset} is out of bounds")]
    ParameterOutOfFrame { index: u32, offset: u64 },
}

/// Main error type for compiling one function.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("structural error: {0}")]
    Structural(#[from] StructuralError),

    #[error("no register or spill slot left for {var}")]
    AllocationExhausted { var: String },

    #[error("{function}: {} stack frame layout violation(s)", .violations.len())]
    Layout {
        function: String,
        violations: Vec<LayoutViolation>,
    },

    #[error("{what} index {index} out of bounds (limit {limit})")]
    OutOfBounds {
        what: &'static str,
        index: u32,
        limit: u32,
    },

    #[error("invalid register r{reg}: {reason}")]
    InvalidRegister { reg: u8, reason: String },

    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },
}

/// Result type alias for compile operations.
pub type CompileResult<T> = Result<T, CompileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_error_converts() {
        let err: CompileError = StructuralError::UnknownBlock(7).into();
        assert_eq!(err.to_string(), "structural error: unknown block 7");
    }

    #[test]
    fn test_layout_error_counts_violations() {
        let err = CompileError::Layout {
            function: "main".to_string(),
            violations: vec![
                LayoutViolation::Misaligned { frame_size: 90, alignment: 16 },
                LayoutViolation::ParameterOutOfFrame { index: 9, offset: 80 },
            ],
        };
        assert_eq!(err.to_string(), "main: 2 stack frame layout violation(s)");
    }
}
