//! Linked block structure produced by lowering.
//!
//! `IrFunction` is the per-function compilation context: it owns the block
//! arena and the block id sequence, so ids are dense, assigned once in
//! creation order, and never shared between functions compiled side by side.

use super::{BasicBlock, BlockId, Instruction};
use crate::core::error::{CompileResult, StructuralError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrFunction {
    name: String,
    params: Vec<String>,
    nlocals: u32,
    blocks: Vec<BasicBlock>,
    entry: BlockId,
}

impl IrFunction {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            nlocals: 0,
            blocks: Vec::new(),
            entry: 0,
        }
    }

    pub fn with_params<I, S>(name: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut func = Self::new(name);
        func.params = params.into_iter().map(Into::into).collect();
        func
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn nargs(&self) -> u32 {
        self.params.len() as u32
    }

    pub fn nlocals(&self) -> u32 {
        self.nlocals
    }

    pub fn set_nlocals(&mut self, nlocals: u32) {
        self.nlocals = nlocals;
    }

    /// Create a block with the next id.
    pub fn new_block(&mut self, label: Option<&str>) -> BlockId {
        let id = self.blocks.len();
        let block = match label {
            Some(label) => BasicBlock::with_label(id, label),
            None => BasicBlock::new(id),
        };
        self.blocks.push(block);
        id
    }

    pub fn entry(&self) -> BlockId {
        self.entry
    }

    pub fn set_entry(&mut self, id: BlockId) -> CompileResult<()> {
        self.check(id)?;
        self.entry = id;
        Ok(())
    }

    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(id)
    }

    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut BasicBlock> {
        self.blocks.get_mut(id)
    }

    /// Append an instruction to block `id`.
    pub fn push(&mut self, id: BlockId, inst: Instruction) -> CompileResult<()> {
        self.check(id)?;
        self.blocks[id].add_instruction(inst);
        Ok(())
    }

    /// Wire `from -> to` in both blocks' adjacency lists.
    pub fn link(&mut self, from: BlockId, to: BlockId) -> CompileResult<()> {
        self.check(from)?;
        self.check(to)?;

        if from == to {
            let block = &mut self.blocks[from];
            block.add_successor(to);
            block.add_predecessor(from);
            return Ok(());
        }

        let (a, b) = if from < to {
            let (lo, hi) = self.blocks.split_at_mut(to);
            (&mut lo[from], &mut hi[0])
        } else {
            let (lo, hi) = self.blocks.split_at_mut(from);
            (&mut hi[0], &mut lo[to])
        };
        a.link(b);
        Ok(())
    }

    fn check(&self, id: BlockId) -> CompileResult<()> {
        if id < self.blocks.len() {
            Ok(())
        } else {
            Err(StructuralError::UnknownBlock(id).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::CompileError;

    #[test]
    fn test_block_ids_are_dense_and_ordered() {
        let mut func = IrFunction::new("f");
        assert_eq!(func.new_block(Some("entry")), 0);
        assert_eq!(func.new_block(None), 1);
        assert_eq!(func.new_block(None), 2);
        assert_eq!(func.blocks().len(), 3);
        assert_eq!(func.block(1).unwrap().name(), "L1");
    }

    #[test]
    fn test_link_both_directions() {
        let mut func = IrFunction::new("f");
        let a = func.new_block(None);
        let b = func.new_block(None);
        func.link(b, a).unwrap();
        func.link(a, b).unwrap();

        assert_eq!(func.block(a).unwrap().successors(), &[b]);
        assert_eq!(func.block(a).unwrap().predecessors(), &[b]);
        assert_eq!(func.block(b).unwrap().successors(), &[a]);
    }

    #[test]
    fn test_self_loop() {
        let mut func = IrFunction::new("f");
        let a = func.new_block(None);
        func.link(a, a).unwrap();
        assert_eq!(func.block(a).unwrap().successors(), &[a]);
        assert_eq!(func.block(a).unwrap().predecessors(), &[a]);
    }

    #[test]
    fn test_unknown_block_rejected() {
        let mut func = IrFunction::new("f");
        func.new_block(None);
        let err = func.link(0, 5).unwrap_err();
        assert_eq!(err, CompileError::Structural(StructuralError::UnknownBlock(5)));
    }
}
