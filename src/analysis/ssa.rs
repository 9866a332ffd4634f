// This module implements the SSA Graph Builder. It rewrites a Cfg in place: phi
// instructions are inserted at merge blocks (two or more predecessors) found through a
// per-variable dominance-frontier worklist, then definitions are renamed to versioned
// variables while walking the dominator tree in preorder. Versioning uses one global
// counter per variable name and one global "current version" map instead of the
// textbook per-path stack, so a definition in one dominator subtree stays visible to the
// next sibling subtree. Phi operands are filled last, one per predecessor in predecessor
// order, each naming the version current at the end of that predecessor. Version 0
// stands for the unrenamed incoming value (parameters and anything never defined).

//! SSA construction.

use super::dominators::DominatorAnalysis;
use crate::cfg::Cfg;
use crate::core::error::CompileResult;
use crate::ir::{BlockId, Instruction, Phi, PhiOperand, Var};
use log::{debug, trace};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

/// Summary of one SSA construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SsaReport {
    /// Phi instructions inserted, by block.
    pub phis: BTreeMap<BlockId, Vec<String>>,
    /// Highest version handed out per variable name.
    pub versions: BTreeMap<String, u32>,
}

impl SsaReport {
    pub fn phi_count(&self) -> usize {
        self.phis.values().map(Vec::len).sum()
    }

    pub fn version_count(&self, name: &str) -> u32 {
        self.versions.get(name).copied().unwrap_or(0)
    }
}

/// Converts a CFG to SSA form in place.
pub struct SsaGraphBuilder<'a> {
    dom: &'a DominatorAnalysis,
    counters: HashMap<String, u32>,
    current: HashMap<String, u32>,
    exit_versions: HashMap<BlockId, HashMap<String, u32>>,
}

impl<'a> SsaGraphBuilder<'a> {
    /// Analyze dominators of `cfg` and convert it to SSA form.
    pub fn construct(cfg: &mut Cfg) -> CompileResult<(DominatorAnalysis, SsaReport)> {
        let dom = DominatorAnalysis::analyze(cfg)?;
        let report = SsaGraphBuilder::build(cfg, &dom)?;
        Ok((dom, report))
    }

    /// Convert `cfg` to SSA form using precomputed dominator tables.
    pub fn build(cfg: &mut Cfg, dom: &'a DominatorAnalysis) -> CompileResult<SsaReport> {
        let mut builder = Self {
            dom,
            counters: HashMap::new(),
            current: HashMap::new(),
            exit_versions: HashMap::new(),
        };

        let phis = builder.insert_phis(cfg);
        builder.rename(cfg);
        builder.fill_phi_operands(cfg);

        let report = SsaReport {
            phis,
            versions: builder.counters.into_iter().collect(),
        };
        debug!(
            "SSA: {} phi(s) inserted, {} variable(s) renamed",
            report.phi_count(),
            report.versions.len()
        );
        Ok(report)
    }

    fn insert_phis(&self, cfg: &mut Cfg) -> BTreeMap<BlockId, Vec<String>> {
        let mut def_blocks: BTreeMap<String, BTreeSet<BlockId>> = BTreeMap::new();
        for block in cfg.blocks() {
            for name in block.defined_vars() {
                def_blocks
                    .entry(name.to_string())
                    .or_default()
                    .insert(block.id());
            }
        }

        let mut inserted: BTreeMap<BlockId, Vec<String>> = BTreeMap::new();
        for (name, defs) in &def_blocks {
            let mut worklist: VecDeque<BlockId> = defs.iter().copied().collect();
            let mut processed = BTreeSet::new();
            let mut has_phi = BTreeSet::new();

            while let Some(id) = worklist.pop_front() {
                if !processed.insert(id) {
                    continue;
                }
                let Some(frontier) = self.dom.dominance_frontier(id) else {
                    continue;
                };
                for &merge in frontier {
                    if cfg.predecessors(merge).len() < 2 || !has_phi.insert(merge) {
                        continue;
                    }
                    if let Some(block) = cfg.block_mut(merge) {
                        trace!("phi for {} at L{}", name, merge);
                        block.prepend_phi(Phi::new(Var::new(name.as_str())));
                        inserted.entry(merge).or_default().push(name.clone());
                    }
                    if !defs.contains(&merge) {
                        worklist.push_back(merge);
                    }
                }
            }
        }
        inserted
    }

    fn next_version(&mut self, name: &str) -> u32 {
        let counter = self.counters.entry(name.to_string()).or_insert(0);
        *counter += 1;
        let version = *counter;
        self.current.insert(name.to_string(), version);
        version
    }

    fn rename(&mut self, cfg: &mut Cfg) {
        let phi_names: BTreeSet<String> = cfg
            .blocks()
            .iter()
            .flat_map(|b| b.phis().map(|phi| phi.result.name.clone()))
            .collect();

        for id in self.dom.preorder() {
            let Some(block) = cfg.block_mut(id) else {
                continue;
            };

            for inst in block.instructions_mut() {
                if !inst.is_phi() {
                    let current = &self.current;
                    inst.for_each_use_mut(|var| {
                        var.version = current.get(&var.name).copied().unwrap_or(0);
                    });
                }
                let name = match inst.def() {
                    Some(var) => var.name.clone(),
                    None => continue,
                };
                let version = self.next_version(&name);
                if let Some(var) = inst.def_mut() {
                    var.version = version;
                }
            }

            let exit: HashMap<String, u32> = phi_names
                .iter()
                .filter_map(|name| self.current.get(name).map(|v| (name.clone(), *v)))
                .collect();
            self.exit_versions.insert(id, exit);
        }
    }

    fn fill_phi_operands(&self, cfg: &mut Cfg) {
        for id in 0..cfg.len() {
            let preds: Vec<BlockId> = cfg.predecessors(id).iter().copied().collect();
            let Some(block) = cfg.block_mut(id) else {
                continue;
            };

            for inst in block.instructions_mut() {
                let Instruction::Phi(phi) = inst else {
                    break;
                };
                phi.operands = preds
                    .iter()
                    .map(|&pred| {
                        let version = self
                            .exit_versions
                            .get(&pred)
                            .and_then(|exit| exit.get(&phi.result.name))
                            .copied()
                            .unwrap_or(0);
                        PhiOperand {
                            pred,
                            value: Var::versioned(phi.result.name.as_str(), version),
                        }
                    })
                    .collect();
            }
        }
    }
}
