//! Dataflow analyses over a built CFG.

pub mod dominators;
pub mod ssa;
pub mod validate;

pub use dominators::DominatorAnalysis;
pub use ssa::{SsaGraphBuilder, SsaReport};
pub use validate::{SsaIssue, SsaValidationReport, SsaValidator};
