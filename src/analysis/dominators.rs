// This module implements dominator analysis over a Cfg by iterative dataflow. Dominator
// sets are seeded with {entry} for the entry block and with every block id for all other
// blocks, then refined by intersecting predecessor sets until nothing changes; the loop is
// bounded by |V|^2 rounds and fails with NonConvergence beyond that. A block without
// predecessors keeps the set it had. The immediate dominator of a block is the strict
// dominator that dominates none of the other strict dominators, i.e. the deepest one;
// blocks unreachable from the entry get none. Dominance frontiers are computed in two
// passes: a local pass over CFG successors followed by propagation to a fixpoint.

//! Dominators, immediate dominators and dominance frontiers.

use crate::cfg::Cfg;
use crate::core::error::{CompileResult, StructuralError};
use crate::ir::BlockId;
use log::{debug, trace};
use std::collections::{BTreeSet, VecDeque};
use std::fmt::{self, Write as _};

/// Dominator tables for one CFG.
///
/// The tables are a snapshot: they describe the CFG passed to
/// [`DominatorAnalysis::analyze`] and are not updated if it changes.
#[derive(Debug, Clone, Default)]
pub struct DominatorAnalysis {
    dom: Vec<BTreeSet<BlockId>>,
    idom: Vec<Option<BlockId>>,
    df: Vec<BTreeSet<BlockId>>,
    iterations: usize,
}

impl DominatorAnalysis {
    pub fn analyze(cfg: &Cfg) -> CompileResult<Self> {
        let n = cfg.len();
        if n == 0 {
            return Ok(Self::default());
        }

        let (dom, iterations) = compute_dominators(cfg)?;
        let reachable = reachable_from_entry(cfg);
        let idom = compute_idom(&dom, &reachable);
        let df = compute_frontiers(cfg, &idom);

        debug!(
            "dominators converged after {} iteration(s) over {} blocks",
            iterations, n
        );
        Ok(Self {
            dom,
            idom,
            df,
            iterations,
        })
    }

    /// Whether `a` dominates `b`. Every block dominates itself.
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        self.dom.get(b).is_some_and(|set| set.contains(&a))
    }

    pub fn strictly_dominates(&self, a: BlockId, b: BlockId) -> bool {
        a != b && self.dominates(a, b)
    }

    pub fn dominators(&self, id: BlockId) -> Option<&BTreeSet<BlockId>> {
        self.dom.get(id)
    }

    /// The entry and unreachable blocks have no immediate dominator.
    pub fn immediate_dominator(&self, id: BlockId) -> Option<BlockId> {
        self.idom.get(id).copied().flatten()
    }

    pub fn dominance_frontier(&self, id: BlockId) -> Option<&BTreeSet<BlockId>> {
        self.df.get(id)
    }

    /// Number of rounds the dominator iteration took.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn len(&self) -> usize {
        self.dom.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dom.is_empty()
    }

    /// Dominator-tree children of every block, each list ascending.
    pub fn dominator_tree_children(&self) -> Vec<Vec<BlockId>> {
        let mut children = vec![Vec::new(); self.idom.len()];
        for (id, parent) in self.idom.iter().enumerate() {
            if let Some(parent) = parent {
                children[*parent].push(id);
            }
        }
        children
    }

    /// Dominator-tree preorder starting at the entry block.
    pub fn preorder(&self) -> Vec<BlockId> {
        if self.idom.is_empty() {
            return Vec::new();
        }

        let children = self.dominator_tree_children();
        let mut order = Vec::with_capacity(self.idom.len());
        let mut stack = vec![0];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(children[id].iter().rev());
        }
        order
    }

    /// Whether `id` is reachable from the entry block. Unreachable blocks
    /// keep their seed dominator set and must be left out of tree queries.
    pub fn is_reachable(&self, id: BlockId) -> bool {
        (id == 0 && !self.idom.is_empty()) || self.immediate_dominator(id).is_some()
    }

    /// Distance from the entry in the dominator tree; `None` when unreachable.
    pub fn depth(&self, id: BlockId) -> Option<usize> {
        if !self.is_reachable(id) {
            return None;
        }
        let mut depth = 0;
        let mut current = id;
        while let Some(parent) = self.immediate_dominator(current) {
            depth += 1;
            current = parent;
        }
        Some(depth)
    }

    /// Reachable blocks dominated by `id`, including `id` itself.
    pub fn dominated_blocks(&self, id: BlockId) -> BTreeSet<BlockId> {
        (0..self.dom.len())
            .filter(|&b| self.is_reachable(b) && self.dominates(id, b))
            .collect()
    }

    /// Edges `n -> h` of `cfg` where `h` dominates `n`.
    pub fn back_edges(&self, cfg: &Cfg) -> Vec<(BlockId, BlockId)> {
        cfg.edges()
            .iter()
            .map(|e| (e.source, e.target))
            .filter(|&(n, h)| self.is_reachable(n) && self.dominates(h, n))
            .collect()
    }

    /// Targets of back edges.
    pub fn loop_headers(&self, cfg: &Cfg) -> BTreeSet<BlockId> {
        self.back_edges(cfg).into_iter().map(|(_, h)| h).collect()
    }

    /// A CFG is reducible when the reachable subgraph without its back edges
    /// is acyclic, i.e. every cycle is entered through a dominating header.
    pub fn is_reducible(&self, cfg: &Cfg) -> bool {
        let n = self.dom.len();
        let mut succs = vec![Vec::new(); n];
        let mut in_degree = vec![0usize; n];
        for edge in cfg.edges() {
            let (s, t) = (edge.source, edge.target);
            if s >= n || t >= n || !self.is_reachable(s) || self.dominates(t, s) {
                continue;
            }
            succs[s].push(t);
            in_degree[t] += 1;
        }

        let mut ready: VecDeque<BlockId> = (0..n)
            .filter(|&id| self.is_reachable(id) && in_degree[id] == 0)
            .collect();
        let mut ordered = 0;
        while let Some(id) = ready.pop_front() {
            ordered += 1;
            for &t in &succs[id] {
                in_degree[t] -= 1;
                if in_degree[t] == 0 {
                    ready.push_back(t);
                }
            }
        }

        let reachable = (0..n).filter(|&id| self.is_reachable(id)).count();
        trace!("reducibility: {} of {} blocks ordered", ordered, reachable);
        ordered == reachable
    }

    /// The dominator tree in Graphviz dot format.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph DominatorTree {\n  node [shape=circle];\n");
        for id in 0..self.idom.len() {
            let _ = writeln!(out, "  {};", id);
        }
        for (id, parent) in self.idom.iter().enumerate() {
            if let Some(parent) = parent {
                let _ = writeln!(out, "  {} -> {} [style=solid];", parent, id);
            }
        }
        out.push_str("}\n");
        out
    }
}

fn write_set(f: &mut fmt::Formatter<'_>, set: &BTreeSet<BlockId>) -> fmt::Result {
    write!(f, "{{")?;
    for (i, id) in set.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "L{}", id)?;
    }
    write!(f, "}}")
}

impl fmt::Display for DominatorAnalysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for id in 0..self.dom.len() {
            write!(f, "L{}: idom=", id)?;
            match self.idom[id] {
                Some(parent) => write!(f, "L{}", parent)?,
                None => write!(f, "-")?,
            }
            write!(f, " dom=")?;
            write_set(f, &self.dom[id])?;
            write!(f, " df=")?;
            write_set(f, &self.df[id])?;
            writeln!(f)?;
        }
        Ok(())
    }
}

fn compute_dominators(cfg: &Cfg) -> CompileResult<(Vec<BTreeSet<BlockId>>, usize)> {
    let n = cfg.len();
    let all: BTreeSet<BlockId> = (0..n).collect();
    let mut dom = vec![all; n];
    dom[0] = BTreeSet::from([0]);

    let max_iterations = (n * n).max(1);
    let mut iterations = 0;
    loop {
        let mut changed = false;
        for id in 1..n {
            let preds = cfg.predecessors(id);
            if preds.is_empty() {
                continue;
            }

            let mut new_set: Option<BTreeSet<BlockId>> = None;
            for &p in preds {
                new_set = Some(match new_set {
                    None => dom[p].clone(),
                    Some(acc) => acc.intersection(&dom[p]).copied().collect(),
                });
            }
            let mut new_set = new_set.unwrap_or_default();
            new_set.insert(id);

            if new_set != dom[id] {
                trace!("dom[L{}] = {:?}", id, new_set);
                dom[id] = new_set;
                changed = true;
            }
        }

        iterations += 1;
        if !changed {
            return Ok((dom, iterations));
        }
        if iterations >= max_iterations {
            return Err(StructuralError::NonConvergence { iterations }.into());
        }
    }
}

fn reachable_from_entry(cfg: &Cfg) -> Vec<bool> {
    let mut reachable = vec![false; cfg.len()];
    for id in cfg.reverse_post_order() {
        reachable[id] = true;
    }
    reachable
}

fn compute_idom(dom: &[BTreeSet<BlockId>], reachable: &[bool]) -> Vec<Option<BlockId>> {
    let mut idom = vec![None; dom.len()];
    for id in 1..dom.len() {
        if !reachable[id] {
            continue;
        }
        let candidates: Vec<BlockId> = dom[id].iter().copied().filter(|&c| c != id).collect();
        // the deepest candidate dominates none of the others
        idom[id] = candidates.iter().copied().find(|&c| {
            candidates
                .iter()
                .all(|&other| other == c || !dom[other].contains(&c))
        });
    }
    idom
}

fn compute_frontiers(cfg: &Cfg, idom: &[Option<BlockId>]) -> Vec<BTreeSet<BlockId>> {
    let n = cfg.len();
    let mut df = vec![BTreeSet::new(); n];

    for (id, frontier) in df.iter_mut().enumerate() {
        for &succ in cfg.successors(id) {
            if idom[succ] != Some(id) {
                frontier.insert(succ);
            }
        }
    }

    loop {
        let mut changed = false;
        for id in 0..n {
            let mut merged = df[id].clone();
            for &c in &df[id] {
                merged.extend(df[c].iter().copied());
            }
            if merged.len() != df[id].len() {
                df[id] = merged;
                changed = true;
            }
        }
        if !changed {
            return df;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::{Edge, EdgeKind};
    use crate::core::error::CompileError;
    use crate::ir::BasicBlock;

    fn cfg_from(n: usize, edges: &[(BlockId, BlockId)]) -> Cfg {
        let blocks = (0..n).map(BasicBlock::new).collect();
        let edges = edges
            .iter()
            .map(|&(s, t)| Edge::new(s, t, EdgeKind::Successor))
            .collect();
        Cfg::new(blocks, edges).unwrap()
    }

    fn set(ids: &[BlockId]) -> BTreeSet<BlockId> {
        ids.iter().copied().collect()
    }

    #[test]
    fn test_diamond() {
        let cfg = cfg_from(4, &[(0, 1), (0, 2), (1, 3), (2, 3)]);
        let dom = DominatorAnalysis::analyze(&cfg).unwrap();

        assert_eq!(dom.immediate_dominator(0), None);
        assert_eq!(dom.immediate_dominator(1), Some(0));
        assert_eq!(dom.immediate_dominator(2), Some(0));
        assert_eq!(dom.immediate_dominator(3), Some(0));

        assert_eq!(dom.dominance_frontier(1), Some(&set(&[3])));
        assert_eq!(dom.dominance_frontier(2), Some(&set(&[3])));
        assert_eq!(dom.dominance_frontier(3), Some(&set(&[])));
        assert_eq!(dom.dominance_frontier(0), Some(&set(&[])));
    }

    #[test]
    fn test_idom_is_deepest_strict_dominator() {
        // 0 -> 1 -> 2 -> 3
        let cfg = cfg_from(4, &[(0, 1), (1, 2), (2, 3)]);
        let dom = DominatorAnalysis::analyze(&cfg).unwrap();
        assert_eq!(dom.dominators(3), Some(&set(&[0, 1, 2, 3])));
        assert_eq!(dom.immediate_dominator(3), Some(2));
        assert_eq!(dom.immediate_dominator(2), Some(1));
        assert_eq!(dom.preorder(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_loop_frontier() {
        // 0 -> 1 -> 2 -> 1, 1 -> 3
        let cfg = cfg_from(4, &[(0, 1), (1, 2), (2, 1), (1, 3)]);
        let dom = DominatorAnalysis::analyze(&cfg).unwrap();

        assert_eq!(dom.immediate_dominator(2), Some(1));
        assert_eq!(dom.immediate_dominator(3), Some(1));
        assert_eq!(dom.dominance_frontier(2), Some(&set(&[1])));
        // propagation only follows frontier members, not the dominator tree
        assert_eq!(dom.dominance_frontier(1), Some(&set(&[])));
        assert!(dom.strictly_dominates(1, 2));
        assert!(!dom.strictly_dominates(2, 2));
        assert!(dom.dominates(2, 2));
    }

    #[test]
    fn test_unreachable_keeps_seed_and_has_no_idom() {
        let cfg = cfg_from(3, &[(0, 1)]);
        let dom = DominatorAnalysis::analyze(&cfg).unwrap();
        assert_eq!(dom.dominators(2), Some(&set(&[0, 1, 2])));
        assert_eq!(dom.immediate_dominator(2), None);
        assert_eq!(dom.preorder(), vec![0, 1]);
    }

    #[test]
    fn test_unreachable_pred_does_not_block_dominance() {
        // 2 is unreachable but feeds 1
        let cfg = cfg_from(3, &[(0, 1), (2, 1)]);
        let dom = DominatorAnalysis::analyze(&cfg).unwrap();
        assert_eq!(dom.dominators(1), Some(&set(&[0, 1])));
        assert_eq!(dom.immediate_dominator(1), Some(0));
    }

    #[test]
    fn test_empty_cfg() {
        let cfg = Cfg::new(Vec::new(), Vec::new()).unwrap();
        let dom = DominatorAnalysis::analyze(&cfg).unwrap();
        assert!(dom.is_empty());
        assert!(dom.preorder().is_empty());
    }

    #[test]
    fn test_non_convergence_error_shape() {
        let err: CompileError = StructuralError::NonConvergence { iterations: 17 }.into();
        assert!(err.to_string().contains("17 iterations"));
    }

    #[test]
    fn test_depth_and_dominated_blocks() {
        // 0 -> 1 -> 2 -> 1, 1 -> 3, 4 unreachable
        let cfg = cfg_from(5, &[(0, 1), (1, 2), (2, 1), (1, 3)]);
        let dom = DominatorAnalysis::analyze(&cfg).unwrap();

        assert_eq!(dom.depth(0), Some(0));
        assert_eq!(dom.depth(1), Some(1));
        assert_eq!(dom.depth(2), Some(2));
        assert_eq!(dom.depth(3), Some(2));
        assert_eq!(dom.depth(4), None);

        assert_eq!(dom.dominated_blocks(1), set(&[1, 2, 3]));
        assert_eq!(dom.dominated_blocks(0), set(&[0, 1, 2, 3]));
        assert_eq!(dom.dominated_blocks(3), set(&[3]));
        assert!(!dom.is_reachable(4));
    }

    #[test]
    fn test_loop_headers() {
        // nested: 0 -> 1 -> 2 -> 3 -> 2, 3 -> 1, 1 -> 4
        let cfg = cfg_from(5, &[(0, 1), (1, 2), (2, 3), (3, 2), (3, 1), (1, 4)]);
        let dom = DominatorAnalysis::analyze(&cfg).unwrap();
        assert_eq!(dom.back_edges(&cfg), vec![(3, 2), (3, 1)]);
        assert_eq!(dom.loop_headers(&cfg), set(&[1, 2]));
        assert!(dom.is_reducible(&cfg));

        let straight = cfg_from(3, &[(0, 1), (1, 2)]);
        let dom = DominatorAnalysis::analyze(&straight).unwrap();
        assert!(dom.loop_headers(&straight).is_empty());
    }

    #[test]
    fn test_self_loop_is_a_header() {
        let cfg = cfg_from(3, &[(0, 1), (1, 1), (1, 2)]);
        let dom = DominatorAnalysis::analyze(&cfg).unwrap();
        assert_eq!(dom.loop_headers(&cfg), set(&[1]));
        assert!(dom.is_reducible(&cfg));
    }

    #[test]
    fn test_two_entry_cycle_is_irreducible() {
        // the 1 <-> 2 cycle can be entered at either block
        let cfg = cfg_from(4, &[(0, 1), (0, 2), (1, 2), (2, 1), (2, 3)]);
        let dom = DominatorAnalysis::analyze(&cfg).unwrap();
        assert!(dom.loop_headers(&cfg).is_empty());
        assert!(!dom.is_reducible(&cfg));
    }

    #[test]
    fn test_unreachable_edges_are_not_back_edges() {
        // 2 is unreachable; its seed set would claim 1 dominates it
        let cfg = cfg_from(3, &[(0, 1), (2, 1)]);
        let dom = DominatorAnalysis::analyze(&cfg).unwrap();
        assert!(dom.back_edges(&cfg).is_empty());
        assert!(dom.is_reducible(&cfg));
    }

    #[test]
    fn test_to_dot_lists_tree_edges() {
        let cfg = cfg_from(4, &[(0, 1), (0, 2), (1, 3), (2, 3)]);
        let dot = DominatorAnalysis::analyze(&cfg).unwrap().to_dot();
        assert!(dot.contains("0 -> 3 [style=solid];"));
        assert!(!dot.contains("1 -> 3"));
    }

    #[test]
    fn test_display() {
        let cfg = cfg_from(2, &[(0, 1)]);
        let out = DominatorAnalysis::analyze(&cfg).unwrap().to_string();
        assert_eq!(
            out,
            "L0: idom=- dom={L0} df={}\nL1: idom=L0 dom={L0, L1} df={}\n"
        );
    }
}
