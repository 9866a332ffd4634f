// This module implements the control-flow graph holder. A Cfg owns its blocks, indexed
// densely by id, and an explicit edge list; predecessor and successor sets are derived
// once from the edge list at construction and never change afterwards. Construction
// validates that every edge endpoint names an existing block and fails with a
// StructuralError otherwise. Blocks are immutable to downstream analyses, with one
// exception: SSA construction prepends phi instructions through `block_mut`. The holder
// also carries the branch/successor mismatches the builder flagged, and offers reverse
// post-order traversal and Graphviz output for debugging.

//! Control-flow graph holder.

pub mod builder;
pub mod integrity;

pub use builder::CfgBuilder;
pub use integrity::{IntegrityChecker, IntegrityIssue, IntegrityReport};

use crate::core::error::{CompileResult, StructuralError};
use crate::ir::{BasicBlock, BlockId};
use std::collections::BTreeSet;
use std::fmt::{self, Write as _};

/// How an edge was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// Target of an unconditional jump.
    Jump,
    /// Else target of a conditional jump.
    Fallthrough,
    /// Found by walking the block's successor list.
    Successor,
}

impl EdgeKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            EdgeKind::Jump => "jump",
            EdgeKind::Fallthrough => "fallthrough",
            EdgeKind::Successor => "successor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    pub source: BlockId,
    pub target: BlockId,
    pub kind: EdgeKind,
}

impl Edge {
    pub fn new(source: BlockId, target: BlockId, kind: EdgeKind) -> Self {
        Self {
            source,
            target,
            kind,
        }
    }
}

/// Disagreement between a block's terminator and its successor list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchMismatch {
    /// The then target of a conditional jump is missing from the successor
    /// list, so no edge was emitted for it.
    MissingThenEdge { block: BlockId, then_target: BlockId },
    /// The successor list names a block the terminator never branches to.
    UnlistedSuccessor { block: BlockId, successor: BlockId },
}

impl BranchMismatch {
    pub fn block(&self) -> BlockId {
        match *self {
            BranchMismatch::MissingThenEdge { block, .. }
            | BranchMismatch::UnlistedSuccessor { block, .. } => block,
        }
    }
}

impl fmt::Display for BranchMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BranchMismatch::MissingThenEdge { block, then_target } => write!(
                f,
                "L{}: then target L{} is not in the successor list",
                block, then_target
            ),
            BranchMismatch::UnlistedSuccessor { block, successor } => write!(
                f,
                "L{}: successor L{} is not a target of the terminator",
                block, successor
            ),
        }
    }
}

/// Control-flow graph of one function. The entry block is always id 0.
#[derive(Debug, Clone)]
pub struct Cfg {
    blocks: Vec<BasicBlock>,
    edges: Vec<Edge>,
    preds: Vec<BTreeSet<BlockId>>,
    succs: Vec<BTreeSet<BlockId>>,
    mismatches: Vec<BranchMismatch>,
}

impl Cfg {
    /// Build a CFG from blocks indexed by id and an edge list.
    ///
    /// Every block's successor and predecessor lists are replaced by the
    /// ones the edge list implies.
    pub fn new(mut blocks: Vec<BasicBlock>, edges: Vec<Edge>) -> CompileResult<Self> {
        for (position, block) in blocks.iter().enumerate() {
            if block.id() != position {
                return Err(StructuralError::NonDenseBlockIds {
                    position,
                    id: block.id(),
                }
                .into());
            }
        }

        let n = blocks.len();
        let mut preds = vec![BTreeSet::new(); n];
        let mut succs = vec![BTreeSet::new(); n];
        for edge in &edges {
            for endpoint in [edge.source, edge.target] {
                if endpoint >= n {
                    return Err(StructuralError::DanglingEdge {
                        from: edge.source,
                        to: edge.target,
                        missing: endpoint,
                    }
                    .into());
                }
            }
            succs[edge.source].insert(edge.target);
            preds[edge.target].insert(edge.source);
        }

        for (block, (s, p)) in blocks.iter_mut().zip(succs.iter().zip(preds.iter())) {
            block.set_adjacency(s.iter().copied().collect(), p.iter().copied().collect());
        }

        Ok(Self {
            blocks,
            edges,
            preds,
            succs,
            mismatches: Vec::new(),
        })
    }

    pub(crate) fn set_mismatches(&mut self, mismatches: Vec<BranchMismatch>) {
        self.mismatches = mismatches;
    }

    pub fn entry(&self) -> BlockId {
        0
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(id)
    }

    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut BasicBlock> {
        self.blocks.get_mut(id)
    }

    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn has_edge(&self, source: BlockId, target: BlockId) -> bool {
        self.succs
            .get(source)
            .is_some_and(|succs| succs.contains(&target))
    }

    /// Predecessors of `id` in ascending id order; empty for unknown ids.
    pub fn predecessors(&self, id: BlockId) -> &BTreeSet<BlockId> {
        static EMPTY: BTreeSet<BlockId> = BTreeSet::new();
        self.preds.get(id).unwrap_or(&EMPTY)
    }

    /// Successors of `id` in ascending id order; empty for unknown ids.
    pub fn successors(&self, id: BlockId) -> &BTreeSet<BlockId> {
        static EMPTY: BTreeSet<BlockId> = BTreeSet::new();
        self.succs.get(id).unwrap_or(&EMPTY)
    }

    /// Branch/successor disagreements flagged while building.
    pub fn mismatches(&self) -> &[BranchMismatch] {
        &self.mismatches
    }

    /// Blocks reachable from the entry in reverse post-order.
    pub fn reverse_post_order(&self) -> Vec<BlockId> {
        if self.blocks.is_empty() {
            return Vec::new();
        }

        let mut post = Vec::with_capacity(self.blocks.len());
        let mut visited = vec![false; self.blocks.len()];
        let mut stack = vec![(self.entry(), false)];
        while let Some((block, processed)) = stack.pop() {
            if processed {
                post.push(block);
                continue;
            }
            if visited[block] {
                continue;
            }
            visited[block] = true;
            stack.push((block, true));
            // reversed so the lowest successor is explored first
            for &succ in self.succs[block].iter().rev() {
                if !visited[succ] {
                    stack.push((succ, false));
                }
            }
        }
        post.reverse();
        post
    }

    /// Render the graph in Graphviz dot format.
    pub fn to_dot(&self, name: &str) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "digraph \"{}\" {{", name);
        let _ = writeln!(out, "  node [shape=box, fontname=monospace];");
        for block in &self.blocks {
            let mut label = format!("{}:\\l", block.name());
            for inst in block.instructions() {
                let _ = write!(label, "  {}\\l", escape_dot(&inst.to_string()));
            }
            let _ = writeln!(out, "  n{} [label=\"{}\"];", block.id(), label);
        }
        for edge in &self.edges {
            let style = match edge.kind {
                EdgeKind::Jump => "solid",
                EdgeKind::Fallthrough => "dashed",
                EdgeKind::Successor => "dotted",
            };
            let _ = writeln!(
                out,
                "  n{} -> n{} [style={}];",
                edge.source, edge.target, style
            );
        }
        out.push_str("}\n");
        out
    }
}

fn escape_dot(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

impl fmt::Display for Cfg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for block in &self.blocks {
            write!(f, "L{}:", block.id())?;
            let preds = self.predecessors(block.id());
            if block.label().is_some() || !preds.is_empty() {
                write!(f, " ;")?;
            }
            if let Some(label) = block.label() {
                write!(f, " {}", label)?;
            }
            if !preds.is_empty() {
                write!(f, " preds =")?;
                for p in preds {
                    write!(f, " L{}", p)?;
                }
            }
            writeln!(f)?;
            for inst in block.instructions() {
                writeln!(f, "    {}", inst)?;
            }
        }
        for edge in &self.edges {
            writeln!(
                f,
                "edge L{} -> L{} ({})",
                edge.source,
                edge.target,
                edge.kind.as_str()
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::CompileError;

    fn diamond() -> Cfg {
        let blocks = (0..4).map(BasicBlock::new).collect();
        let edges = vec![
            Edge::new(0, 1, EdgeKind::Successor),
            Edge::new(0, 2, EdgeKind::Fallthrough),
            Edge::new(1, 3, EdgeKind::Jump),
            Edge::new(2, 3, EdgeKind::Jump),
        ];
        Cfg::new(blocks, edges).unwrap()
    }

    #[test]
    fn test_adjacency_derived_from_edges() {
        let cfg = diamond();
        assert_eq!(cfg.len(), 4);
        assert_eq!(cfg.successors(0).iter().copied().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(cfg.predecessors(3).iter().copied().collect::<Vec<_>>(), vec![1, 2]);
        assert!(cfg.predecessors(0).is_empty());
        assert_eq!(cfg.block(3).unwrap().predecessors(), &[1, 2]);
        assert!(cfg.has_edge(1, 3));
        assert!(!cfg.has_edge(3, 1));
    }

    #[test]
    fn test_dangling_edge_rejected() {
        let blocks = (0..2).map(BasicBlock::new).collect();
        let edges = vec![Edge::new(0, 1, EdgeKind::Jump), Edge::new(1, 7, EdgeKind::Jump)];
        let err = Cfg::new(blocks, edges).unwrap_err();
        assert_eq!(
            err,
            CompileError::Structural(StructuralError::DanglingEdge {
                from: 1,
                to: 7,
                missing: 7
            })
        );
    }

    #[test]
    fn test_non_dense_ids_rejected() {
        let blocks = vec![BasicBlock::new(0), BasicBlock::new(2)];
        let err = Cfg::new(blocks, Vec::new()).unwrap_err();
        assert!(matches!(
            err,
            CompileError::Structural(StructuralError::NonDenseBlockIds { position: 1, id: 2 })
        ));
    }

    #[test]
    fn test_reverse_post_order() {
        let cfg = diamond();
        let rpo = cfg.reverse_post_order();
        assert_eq!(rpo.first(), Some(&0));
        assert_eq!(rpo.last(), Some(&3));
        assert_eq!(rpo.len(), 4);
    }

    #[test]
    fn test_rpo_skips_unreachable() {
        let blocks = (0..3).map(BasicBlock::new).collect();
        let edges = vec![Edge::new(0, 1, EdgeKind::Jump)];
        let cfg = Cfg::new(blocks, edges).unwrap();
        assert_eq!(cfg.reverse_post_order(), vec![0, 1]);
    }

    #[test]
    fn test_to_dot() {
        let dot = diamond().to_dot("diamond");
        assert!(dot.starts_with("digraph \"diamond\" {"));
        assert!(dot.contains("n0 -> n2 [style=dashed];"));
        assert!(dot.contains("n1 -> n3 [style=solid];"));
    }
}
