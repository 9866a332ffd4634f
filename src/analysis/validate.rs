//! Structural checks over a CFG in SSA form.
//!
//! [`SsaValidator::validate`] walks the whole graph and reports every issue
//! it finds. Definitions are checked in dominator-tree preorder, the order
//! renaming assigns versions in, so a version read by a non-phi instruction
//! must already have been defined earlier in that walk. Phi operands are
//! only required to name a version defined somewhere: loop headers read
//! versions defined further down the tree.

use super::dominators::DominatorAnalysis;
use crate::cfg::Cfg;
use crate::ir::{BlockId, Instruction, Var};
use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SsaIssue {
    /// A phi needs exactly one operand per predecessor.
    PhiArity {
        block: BlockId,
        var: String,
        expected: usize,
        actual: usize,
    },
    PhiOperandNotPredecessor {
        block: BlockId,
        var: String,
        pred: BlockId,
    },
    /// A phi operand names a version nothing defines.
    UndefinedPhiOperand { block: BlockId, var: Var },
    UseBeforeDefinition { block: BlockId, var: Var },
    DuplicateDefinition { var: Var },
    UnversionedDefinition { block: BlockId, var: String },
    MissingVersion { name: String, version: u32 },
}

impl fmt::Display for SsaIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SsaIssue::PhiArity {
                block,
                var,
                expected,
                actual,
            } => write!(
                f,
                "phi for {} in L{} has {} operand(s), expected {}",
                var, block, actual, expected
            ),
            SsaIssue::PhiOperandNotPredecessor { block, var, pred } => write!(
                f,
                "phi for {} in L{} has an operand for non-predecessor L{}",
                var, block, pred
            ),
            SsaIssue::UndefinedPhiOperand { block, var } => {
                write!(f, "phi in L{} reads undefined {}", block, var)
            }
            SsaIssue::UseBeforeDefinition { block, var } => {
                write!(f, "L{} uses {} before its definition", block, var)
            }
            SsaIssue::DuplicateDefinition { var } => write!(f, "{} is defined more than once", var),
            SsaIssue::UnversionedDefinition { block, var } => {
                write!(f, "L{} defines {} without a version", block, var)
            }
            SsaIssue::MissingVersion { name, version } => {
                write!(f, "{} has no definition of version {}", name, version)
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SsaValidationReport {
    issues: Vec<SsaIssue>,
}

impl SsaValidationReport {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn issues(&self) -> &[SsaIssue] {
        &self.issues
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }
}

impl fmt::Display for SsaValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.issues.is_empty() {
            return writeln!(f, "SSA validation: ok");
        }
        writeln!(f, "SSA validation: {} issue(s)", self.issues.len())?;
        for issue in &self.issues {
            writeln!(f, "  error: {}", issue)?;
        }
        Ok(())
    }
}

pub struct SsaValidator;

impl SsaValidator {
    /// Check `cfg` against the dominator tables it was renamed with.
    pub fn validate(cfg: &Cfg, dom: &DominatorAnalysis) -> SsaValidationReport {
        let mut issues = Vec::new();
        Self::check_phis(cfg, &mut issues);
        let defined = Self::check_definitions(cfg, &mut issues);
        Self::check_uses(cfg, dom, &defined, &mut issues);

        let report = SsaValidationReport { issues };
        if report.is_valid() {
            debug!("SSA validation: ok");
        } else {
            for issue in &report.issues {
                warn!("SSA validation: {}", issue);
            }
        }
        report
    }

    fn check_phis(cfg: &Cfg, issues: &mut Vec<SsaIssue>) {
        for block in cfg.blocks() {
            let preds = cfg.predecessors(block.id());
            for phi in block.phis() {
                let var = phi.result.to_string();
                if phi.operands.len() != preds.len() {
                    issues.push(SsaIssue::PhiArity {
                        block: block.id(),
                        var: var.clone(),
                        expected: preds.len(),
                        actual: phi.operands.len(),
                    });
                }
                for op in phi.operands.iter().filter(|op| !preds.contains(&op.pred)) {
                    issues.push(SsaIssue::PhiOperandNotPredecessor {
                        block: block.id(),
                        var: var.clone(),
                        pred: op.pred,
                    });
                }
            }
        }
    }

    /// Every versioned definition, checked for duplicates and gaps.
    fn check_definitions(cfg: &Cfg, issues: &mut Vec<SsaIssue>) -> HashSet<Var> {
        let mut defined = HashSet::new();
        let mut versions: BTreeMap<&str, BTreeSet<u32>> = BTreeMap::new();
        for block in cfg.blocks() {
            for var in block.instructions().iter().filter_map(Instruction::def) {
                if !var.is_versioned() {
                    continue;
                }
                if !defined.insert(var.clone()) {
                    issues.push(SsaIssue::DuplicateDefinition { var: var.clone() });
                }
                versions.entry(var.name.as_str()).or_default().insert(var.version);
            }
        }

        for (name, seen) in &versions {
            let max = seen.iter().next_back().copied().unwrap_or(0);
            for version in (1..=max).filter(|v| !seen.contains(v)) {
                issues.push(SsaIssue::MissingVersion {
                    name: name.to_string(),
                    version,
                });
            }
        }
        defined
    }

    fn check_uses(
        cfg: &Cfg,
        dom: &DominatorAnalysis,
        defined: &HashSet<Var>,
        issues: &mut Vec<SsaIssue>,
    ) {
        let mut seen: HashSet<&Var> = HashSet::new();
        for id in dom.preorder() {
            let Some(block) = cfg.block(id) else {
                continue;
            };
            for inst in block.instructions() {
                if let Instruction::Phi(phi) = inst {
                    for op in phi.operands.iter().filter(|op| op.value.is_versioned()) {
                        if !defined.contains(&op.value) {
                            issues.push(SsaIssue::UndefinedPhiOperand {
                                block: id,
                                var: op.value.clone(),
                            });
                        }
                    }
                } else {
                    for var in inst.uses().into_iter().filter(|v| v.is_versioned()) {
                        if !seen.contains(var) {
                            issues.push(SsaIssue::UseBeforeDefinition {
                                block: id,
                                var: var.clone(),
                            });
                        }
                    }
                }

                if let Some(var) = inst.def() {
                    if var.is_versioned() {
                        seen.insert(var);
                    } else {
                        issues.push(SsaIssue::UnversionedDefinition {
                            block: id,
                            var: var.name.clone(),
                        });
                    }
                }
            }
        }
    }
}
