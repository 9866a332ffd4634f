// This module implements the CFG Builder, which turns the linked block structure of an
// IrFunction into a Cfg. Starting at the entry block it visits every reachable block
// once and derives edges with a fixed rule: an unconditional jump contributes an edge to
// its target, a conditional jump contributes an edge to its else target, and the block's
// pre-wired successor list is then walked to add whatever edges are still missing (this
// is where the then edge of a conditional jump comes from). Edges are deduplicated by
// (source, target). When the successor list and the terminator disagree the builder
// does not reconcile them; it logs a warning and records a BranchMismatch on the CFG.
// Block ids are rewritten so the entry block becomes id 0; unreachable blocks stay in
// the CFG as isolated nodes for the integrity checker to report.

//! Building a [`Cfg`] from an [`IrFunction`].

use super::{BranchMismatch, Cfg, Edge, EdgeKind};
use crate::core::error::{CompileResult, StructuralError};
use crate::ir::{BasicBlock, BlockId, Instruction, IrFunction};
use log::{debug, trace, warn};
use std::collections::HashSet;

/// Builds control-flow graphs from pre-wired IR functions.
pub struct CfgBuilder<'a> {
    func: &'a IrFunction,
    edges: Vec<Edge>,
    seen: HashSet<(BlockId, BlockId)>,
    visited: Vec<bool>,
    mismatches: Vec<BranchMismatch>,
}

impl<'a> CfgBuilder<'a> {
    /// Build the CFG of `func`, starting at its entry block.
    pub fn build(func: &'a IrFunction) -> CompileResult<Cfg> {
        if func.blocks().is_empty() {
            return Err(StructuralError::EmptyFunction(func.name().to_string()).into());
        }

        let mut builder = Self {
            func,
            edges: Vec::new(),
            seen: HashSet::new(),
            visited: vec![false; func.blocks().len()],
            mismatches: Vec::new(),
        };
        builder.traverse()?;
        builder.finish()
    }

    fn traverse(&mut self) -> CompileResult<()> {
        let mut stack = vec![self.func.entry()];
        while let Some(id) = stack.pop() {
            if self.visited[id] {
                trace!("block L{} already visited", id);
                continue;
            }
            self.visited[id] = true;

            let discovered = self.visit(id)?;
            // reversed so the first discovered target is visited next
            stack.extend(discovered.into_iter().rev().filter(|&t| !self.visited[t]));
        }
        Ok(())
    }

    /// Emit the edges of block `id` and return the newly reached targets.
    fn visit(&mut self, id: BlockId) -> CompileResult<Vec<BlockId>> {
        let func = self.func;
        let block = &func.blocks()[id];
        let mut discovered = Vec::new();

        match block.terminator() {
            Some(Instruction::Jump(target)) => {
                if self.add_edge(id, *target, EdgeKind::Jump)? {
                    discovered.push(*target);
                }
            }
            Some(Instruction::CondJump {
                then_target,
                else_target,
                ..
            }) => {
                if self.add_edge(id, *else_target, EdgeKind::Fallthrough)? {
                    discovered.push(*else_target);
                }
                if !block.successors().contains(then_target) {
                    self.flag(BranchMismatch::MissingThenEdge {
                        block: id,
                        then_target: *then_target,
                    });
                }
            }
            _ => {}
        }

        for &succ in block.successors() {
            if !branches_to(block, succ) {
                self.flag(BranchMismatch::UnlistedSuccessor {
                    block: id,
                    successor: succ,
                });
            }
            if self.add_edge(id, succ, EdgeKind::Successor)? {
                discovered.push(succ);
            }
        }

        Ok(discovered)
    }

    /// Record `source -> target` unless an edge between the pair exists.
    fn add_edge(&mut self, source: BlockId, target: BlockId, kind: EdgeKind) -> CompileResult<bool> {
        if target >= self.visited.len() {
            return Err(StructuralError::DanglingEdge {
                from: source,
                to: target,
                missing: target,
            }
            .into());
        }
        if !self.seen.insert((source, target)) {
            trace!("edge L{} -> L{} already present", source, target);
            return Ok(false);
        }

        trace!("edge L{} -> L{} ({})", source, target, kind.as_str());
        self.edges.push(Edge::new(source, target, kind));
        Ok(true)
    }

    fn flag(&mut self, mismatch: BranchMismatch) {
        warn!("{}: {}", self.func.name(), mismatch);
        self.mismatches.push(mismatch);
    }

    fn finish(self) -> CompileResult<Cfg> {
        let entry = self.func.entry();
        // entry moves to 0, blocks created before it shift up by one
        let map = |id: BlockId| match id {
            id if id == entry => 0,
            id if id < entry => id + 1,
            id => id,
        };

        let mut blocks: Vec<BasicBlock> = self.func.blocks().to_vec();
        for block in &mut blocks {
            block.renumber(&map);
        }
        blocks.sort_by_key(BasicBlock::id);

        let edges = self
            .edges
            .iter()
            .map(|e| Edge::new(map(e.source), map(e.target), e.kind))
            .collect();
        let mismatches = self
            .mismatches
            .iter()
            .map(|m| match *m {
                BranchMismatch::MissingThenEdge { block, then_target } => {
                    BranchMismatch::MissingThenEdge {
                        block: map(block),
                        then_target: map(then_target),
                    }
                }
                BranchMismatch::UnlistedSuccessor { block, successor } => {
                    BranchMismatch::UnlistedSuccessor {
                        block: map(block),
                        successor: map(successor),
                    }
                }
            })
            .collect();

        let unreachable = self.visited.iter().filter(|v| !**v).count();
        let mut cfg = Cfg::new(blocks, edges)?;
        cfg.set_mismatches(mismatches);

        debug!(
            "built CFG for {}: {} blocks, {} edges, {} unreachable, {} mismatches",
            self.func.name(),
            cfg.len(),
            cfg.edges().len(),
            unreachable,
            cfg.mismatches().len()
        );
        Ok(cfg)
    }
}

/// Whether the block's terminator can transfer control to `target`.
/// Blocks without a terminator fall through to any listed successor.
fn branches_to(block: &BasicBlock, target: BlockId) -> bool {
    match block.terminator() {
        Some(Instruction::Jump(t)) => *t == target,
        Some(Instruction::CondJump {
            then_target,
            else_target,
            ..
        }) => *then_target == target || *else_target == target,
        Some(Instruction::Return(_)) => false,
        _ => true,
    }
}
