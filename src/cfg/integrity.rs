//! Structural integrity checks over a control-flow graph.
//!
//! The checker never stops at the first problem: it walks the whole graph and
//! returns an [`IntegrityReport`] listing every issue found. Issues that make
//! later analyses meaningless (bad edge endpoints, duplicate edges, branches
//! to missing blocks) are errors; the rest are warnings that only get logged.

use super::{BranchMismatch, Cfg, Edge};
use crate::ir::{BasicBlock, BlockId, Instruction};
use log::{debug, warn};
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityIssue {
    EmptyCfg,
    InvalidEdgeSource { source: BlockId, target: BlockId },
    InvalidEdgeTarget { source: BlockId, target: BlockId },
    DuplicateEdge { source: BlockId, target: BlockId },
    InvalidJumpTarget { block: BlockId, target: BlockId },
    UnreachableBlock(BlockId),
    EmptyBlock(BlockId),
    BranchMismatch(BranchMismatch),
}

impl IntegrityIssue {
    pub fn is_error(&self) -> bool {
        match self {
            IntegrityIssue::EmptyCfg
            | IntegrityIssue::InvalidEdgeSource { .. }
            | IntegrityIssue::InvalidEdgeTarget { .. }
            | IntegrityIssue::DuplicateEdge { .. }
            | IntegrityIssue::InvalidJumpTarget { .. } => true,
            IntegrityIssue::UnreachableBlock(_)
            | IntegrityIssue::EmptyBlock(_)
            | IntegrityIssue::BranchMismatch(_) => false,
        }
    }
}

impl fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrityIssue::EmptyCfg => write!(f, "CFG has no blocks"),
            IntegrityIssue::InvalidEdgeSource { source, target } => {
                write!(f, "edge L{} -> L{} has an invalid source", source, target)
            }
            IntegrityIssue::InvalidEdgeTarget { source, target } => {
                write!(f, "edge L{} -> L{} has an invalid target", source, target)
            }
            IntegrityIssue::DuplicateEdge { source, target } => {
                write!(f, "duplicate edge L{} -> L{}", source, target)
            }
            IntegrityIssue::InvalidJumpTarget { block, target } => {
                write!(f, "L{} branches to missing block L{}", block, target)
            }
            IntegrityIssue::UnreachableBlock(id) => write!(f, "L{} is unreachable", id),
            IntegrityIssue::EmptyBlock(id) => write!(f, "L{} is empty", id),
            IntegrityIssue::BranchMismatch(m) => write!(f, "{}", m),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrityReport {
    issues: Vec<IntegrityIssue>,
}

impl IntegrityReport {
    /// No error-level issues. Warnings do not invalidate a graph.
    pub fn is_valid(&self) -> bool {
        !self.issues.iter().any(IntegrityIssue::is_error)
    }

    pub fn issues(&self) -> &[IntegrityIssue] {
        &self.issues
    }

    pub fn errors(&self) -> impl Iterator<Item = &IntegrityIssue> {
        self.issues.iter().filter(|i| i.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &IntegrityIssue> {
        self.issues.iter().filter(|i| !i.is_error())
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }
}

impl fmt::Display for IntegrityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.issues.is_empty() {
            return writeln!(f, "CFG integrity: ok");
        }
        writeln!(f, "CFG integrity: {} issue(s)", self.issues.len())?;
        for issue in &self.issues {
            let level = if issue.is_error() { "error" } else { "warning" };
            writeln!(f, "  {}: {}", level, issue)?;
        }
        Ok(())
    }
}

pub struct IntegrityChecker;

impl IntegrityChecker {
    /// Check a built CFG, including the mismatches its builder flagged.
    pub fn check(cfg: &Cfg) -> IntegrityReport {
        let mut report = Self::check_parts(cfg.blocks(), cfg.edges());
        report.issues.extend(
            cfg.mismatches()
                .iter()
                .copied()
                .map(IntegrityIssue::BranchMismatch),
        );
        Self::log(&report);
        report
    }

    /// Check raw blocks and edges with block 0 as the entry.
    pub fn check_parts(blocks: &[BasicBlock], edges: &[Edge]) -> IntegrityReport {
        let mut issues = Vec::new();
        if blocks.is_empty() {
            issues.push(IntegrityIssue::EmptyCfg);
            return IntegrityReport { issues };
        }

        let n = blocks.len();
        let mut seen = HashSet::new();
        let mut succs = vec![Vec::new(); n];
        for edge in edges {
            let (source, target) = (edge.source, edge.target);
            if source >= n {
                issues.push(IntegrityIssue::InvalidEdgeSource { source, target });
                continue;
            }
            if target >= n {
                issues.push(IntegrityIssue::InvalidEdgeTarget { source, target });
                continue;
            }
            if !seen.insert((source, target)) {
                issues.push(IntegrityIssue::DuplicateEdge { source, target });
                continue;
            }
            succs[source].push(target);
        }

        for block in blocks {
            let targets: Vec<BlockId> = match block.terminator() {
                Some(Instruction::Jump(t)) => vec![*t],
                Some(Instruction::CondJump {
                    then_target,
                    else_target,
                    ..
                }) => vec![*then_target, *else_target],
                _ => Vec::new(),
            };
            for target in targets {
                if target >= n {
                    issues.push(IntegrityIssue::InvalidJumpTarget {
                        block: block.id(),
                        target,
                    });
                }
            }
        }

        let mut reachable = vec![false; n];
        let mut queue = std::collections::VecDeque::from([0]);
        reachable[0] = true;
        while let Some(id) = queue.pop_front() {
            for &succ in &succs[id] {
                if !reachable[succ] {
                    reachable[succ] = true;
                    queue.push_back(succ);
                }
            }
        }
        for (id, _) in reachable.iter().enumerate().filter(|(_, r)| !**r) {
            issues.push(IntegrityIssue::UnreachableBlock(id));
        }

        for block in blocks.iter().filter(|b| b.is_empty()) {
            issues.push(IntegrityIssue::EmptyBlock(block.id()));
        }

        IntegrityReport { issues }
    }

    fn log(report: &IntegrityReport) {
        for issue in &report.issues {
            if issue.is_error() {
                warn!("CFG integrity error: {}", issue);
            } else {
                debug!("CFG integrity warning: {}", issue);
            }
        }
    }
}
