//! Basic blocks.
//!
//! A block is an ordered instruction list with a stable id, a kind derived
//! from its last instruction, and successor/predecessor lists holding block
//! ids. The lists are non-owning: they name other blocks in the same
//! function or CFG and are kept mutually consistent by [`BasicBlock::link`].

use super::{BlockId, Instruction, Phi, Var};

/// Block classification derived from the last appended instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Continuous,
    EndsByJump,
    EndsByCondJump,
    EndsByReturn,
}

impl BlockKind {
    pub fn of(inst: &Instruction) -> Self {
        match inst {
            Instruction::Jump(_) => BlockKind::EndsByJump,
            Instruction::CondJump { .. } => BlockKind::EndsByCondJump,
            Instruction::Return(_) => BlockKind::EndsByReturn,
            Instruction::Label(_)
            | Instruction::Assign { .. }
            | Instruction::Call { .. }
            | Instruction::Binary { .. }
            | Instruction::Unary { .. }
            | Instruction::Phi(_) => BlockKind::Continuous,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    id: BlockId,
    label: Option<String>,
    instructions: Vec<Instruction>,
    kind: BlockKind,
    successors: Vec<BlockId>,
    predecessors: Vec<BlockId>,
}

impl BasicBlock {
    pub fn new(id: BlockId) -> Self {
        Self {
            id,
            label: None,
            instructions: Vec::new(),
            kind: BlockKind::Continuous,
            successors: Vec::new(),
            predecessors: Vec::new(),
        }
    }

    pub fn with_label(id: BlockId, label: impl Into<String>) -> Self {
        let mut block = Self::new(id);
        block.label = Some(label.into());
        block
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Label if present, otherwise `L<id>`.
    pub fn name(&self) -> String {
        match &self.label {
            Some(label) => label.clone(),
            None => format!("L{}", self.id),
        }
    }

    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub(crate) fn instructions_mut(&mut self) -> &mut Vec<Instruction> {
        &mut self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Append an instruction and recompute the block kind.
    pub fn add_instruction(&mut self, inst: Instruction) {
        self.kind = BlockKind::of(&inst);
        self.instructions.push(inst);
    }

    pub fn successors(&self) -> &[BlockId] {
        &self.successors
    }

    pub fn predecessors(&self) -> &[BlockId] {
        &self.predecessors
    }

    /// Record `next` as a successor of this block and this block as a
    /// predecessor of `next`. Linking twice is a no-op.
    pub fn link(&mut self, next: &mut BasicBlock) {
        self.add_successor(next.id);
        next.add_predecessor(self.id);
    }

    pub(crate) fn add_successor(&mut self, id: BlockId) {
        if !self.successors.contains(&id) {
            self.successors.push(id);
        }
    }

    pub(crate) fn add_predecessor(&mut self, id: BlockId) {
        if !self.predecessors.contains(&id) {
            self.predecessors.push(id);
        }
    }

    pub(crate) fn set_adjacency(&mut self, successors: Vec<BlockId>, predecessors: Vec<BlockId>) {
        self.successors = successors;
        self.predecessors = predecessors;
    }

    /// Give the block a new id, rewriting its adjacency and branch targets.
    pub(crate) fn renumber(&mut self, map: &impl Fn(BlockId) -> BlockId) {
        self.id = map(self.id);
        for succ in &mut self.successors {
            *succ = map(*succ);
        }
        for pred in &mut self.predecessors {
            *pred = map(*pred);
        }
        for inst in &mut self.instructions {
            inst.remap_targets(map);
        }
    }

    pub fn terminator(&self) -> Option<&Instruction> {
        self.instructions.last().filter(|inst| inst.is_terminator())
    }

    /// A finalized block ends in a terminator or falls through to an
    /// explicitly linked successor.
    pub fn is_finalized(&self) -> bool {
        self.terminator().is_some() || !self.successors.is_empty()
    }

    /// Phi instructions at the head of the block.
    pub fn phis(&self) -> impl Iterator<Item = &Phi> {
        self.instructions.iter().map_while(|inst| match inst {
            Instruction::Phi(phi) => Some(phi),
            _ => None,
        })
    }

    pub fn phi_count(&self) -> usize {
        self.phis().count()
    }

    pub(crate) fn prepend_phi(&mut self, phi: Phi) {
        let at = self.phi_count();
        self.instructions.insert(at, Instruction::Phi(phi));
    }

    /// Names of variables defined in this block, first definition order,
    /// excluding phi results.
    pub fn defined_vars(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for inst in self.instructions.iter().filter(|inst| !inst.is_phi()) {
            if let Some(Var { name, .. }) = inst.def() {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Names of variables read in this block, first use order.
    pub fn used_vars(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for inst in &self.instructions {
            for var in inst.uses() {
                if !names.contains(&var.name.as_str()) {
                    names.push(&var.name);
                }
            }
        }
        names
    }
}
