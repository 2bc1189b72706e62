//! Functions and their control flow graphs.

use std::{
    collections::{HashMap, HashSet},
    fmt,
};

use serde::{Deserialize, Serialize};

use crate::{
    ir::{Block, BlockId, Op, Terminator, ValueId},
    Result,
};

/// A function: an entry block plus the blocks reachable from it.
///
/// Blocks live in a vector indexed by [`BlockId`]. Passes that restructure control flow only
/// ever append blocks; a block that becomes unreachable stays in place, so every id handed out
/// remains valid for the lifetime of the function. Values are numbered per function by a
/// monotonic counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    /// Symbol name.
    pub name: String,
    /// Parameter values, defined on entry.
    #[serde(default)]
    pub params: Vec<ValueId>,
    /// Entry block.
    pub entry: BlockId,
    blocks: Vec<Block>,
    next_value: usize,
}

impl Function {
    /// Creates an empty function. The first block added becomes the entry.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            entry: BlockId::new(0),
            blocks: Vec::new(),
            next_value: 0,
        }
    }

    /// Allocates a fresh value id.
    pub fn new_value(&mut self) -> ValueId {
        let value = ValueId::new(self.next_value);
        self.next_value += 1;
        value
    }

    /// Adds a parameter and returns its value.
    pub fn add_param(&mut self) -> ValueId {
        let value = self.new_value();
        self.params.push(value);
        value
    }

    /// Appends an empty block labelled `label` and returns its id.
    pub fn add_block(&mut self, label: impl Into<String>) -> BlockId {
        let id = BlockId::new(self.blocks.len());
        self.blocks.push(Block::new(id, label));
        id
    }

    /// Returns the block with the given id.
    #[must_use]
    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id.index())
    }

    /// Returns the block with the given id mutably.
    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut Block> {
        self.blocks.get_mut(id.index())
    }

    /// Returns the block with the given id, or a [`crate::Error::Malformed`] error naming it.
    pub fn try_block(&self, id: BlockId) -> Result<&Block> {
        self.block(id)
            .ok_or_else(|| malformed_error!("{} has no block {}", self.name, id))
    }

    /// Mutable variant of [`Function::try_block`].
    pub fn try_block_mut(&mut self, id: BlockId) -> Result<&mut Block> {
        let name = &self.name;
        self.blocks
            .get_mut(id.index())
            .ok_or_else(|| malformed_error!("{} has no block {}", name, id))
    }

    /// All blocks in id order.
    #[must_use]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Number of blocks, reachable or not.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Number of values allocated so far.
    #[must_use]
    pub fn value_count(&self) -> usize {
        self.next_value
    }

    /// Finds the first block carrying `label`.
    #[must_use]
    pub fn block_by_label(&self, label: &str) -> Option<BlockId> {
        self.blocks
            .iter()
            .find(|block| block.label == label)
            .map(|block| block.id)
    }

    /// Sets the terminator of `block`.
    pub fn set_terminator(&mut self, block: BlockId, terminator: Terminator) -> Result<()> {
        self.try_block_mut(block)?.terminator = terminator;
        Ok(())
    }

    /// Returns the unique predecessors of `block`, in block order.
    #[must_use]
    pub fn predecessors(&self, block: BlockId) -> Vec<BlockId> {
        self.blocks
            .iter()
            .filter(|candidate| candidate.terminator.successors().contains(&block))
            .map(|candidate| candidate.id)
            .collect()
    }

    /// Returns the predecessor lists of all blocks, indexed by block id.
    #[must_use]
    pub fn predecessor_map(&self) -> Vec<Vec<BlockId>> {
        let mut preds = vec![Vec::new(); self.blocks.len()];
        for block in &self.blocks {
            for succ in block.successors() {
                if let Some(list) = preds.get_mut(succ.index()) {
                    list.push(block.id);
                }
            }
        }
        preds
    }

    /// Maps every defined value to the block defining it. Parameters are attributed to the
    /// entry block.
    #[must_use]
    pub fn definitions(&self) -> HashMap<ValueId, BlockId> {
        let mut defs = HashMap::new();
        for param in &self.params {
            defs.insert(*param, self.entry);
        }
        for block in &self.blocks {
            for value in block.defs() {
                defs.insert(value, block.id);
            }
        }
        defs
    }

    /// Maps every used value to the blocks using it.
    ///
    /// A merge node input counts as a use in the merge node's block. Each block appears at
    /// most once per value.
    #[must_use]
    pub fn users(&self) -> HashMap<ValueId, Vec<BlockId>> {
        let mut users: HashMap<ValueId, Vec<BlockId>> = HashMap::new();
        for block in &self.blocks {
            let phi_uses = block
                .phis
                .iter()
                .flat_map(|phi| phi.operands.iter().map(|operand| operand.value));
            for value in phi_uses.chain(block.uses()) {
                let list = users.entry(value).or_default();
                if !list.contains(&block.id) {
                    list.push(block.id);
                }
            }
        }
        users
    }

    /// Appends a copy of `source` labelled `label`.
    ///
    /// Every value defined in the copy is renamed to a fresh id; the returned map records
    /// original → fresh for those definitions. Operands, merge node inputs and terminator
    /// targets are copied verbatim: resolving them to other clones is left to the caller,
    /// which usually knows more about the surrounding region than this function does. The
    /// copy never inherits `address_taken`.
    pub fn clone_block(
        &mut self,
        source: BlockId,
        label: impl Into<String>,
    ) -> Result<(BlockId, HashMap<ValueId, ValueId>)> {
        let original = self.try_block(source)?.clone();
        let id = self.add_block(label);
        let mut renamed = HashMap::new();

        let mut phis = original.phis;
        for phi in &mut phis {
            let fresh = self.new_value();
            renamed.insert(phi.dest, fresh);
            phi.dest = fresh;
        }

        let mut ops = original.ops;
        for op in &mut ops {
            if let Some(dest) = op.dest() {
                let fresh = self.new_value();
                renamed.insert(dest, fresh);
                op.set_dest(fresh);
            }
        }

        let block = self.try_block_mut(id)?;
        block.phis = phis;
        block.ops = ops;
        block.terminator = original.terminator;
        Ok((id, renamed))
    }

    /// Rewrites operands of `block` (operations, terminator and merge node inputs) through
    /// `values`; ids absent from the map are kept.
    pub fn remap_block_values(
        &mut self,
        block: BlockId,
        values: &HashMap<ValueId, ValueId>,
    ) -> Result<()> {
        let lookup = |value: ValueId| values.get(&value).copied().unwrap_or(value);
        let block = self.try_block_mut(block)?;
        for phi in &mut block.phis {
            for operand in &mut phi.operands {
                operand.value = lookup(operand.value);
            }
        }
        for op in &mut block.ops {
            op.remap_values(lookup);
        }
        block.terminator.remap_values(lookup);
        Ok(())
    }

    /// Checks the structural invariants the passes rely on.
    ///
    /// - every terminator target and merge node predecessor names an existing block
    /// - every value is defined exactly once
    /// - every merge node has exactly one input per predecessor edge
    /// - a block whose address is materialized is flagged `address_taken`
    pub fn verify(&self) -> Result<()> {
        let count = self.blocks.len();
        if self.entry.index() >= count {
            return Err(malformed_error!("{}: entry {} out of range", self.name, self.entry));
        }

        let mut defined = HashSet::new();
        for param in &self.params {
            if !defined.insert(*param) {
                return Err(malformed_error!("{}: {} defined twice", self.name, param));
            }
        }

        let preds = self.predecessor_map();
        for block in &self.blocks {
            for succ in block.terminator.successors() {
                if succ.index() >= count {
                    return Err(malformed_error!(
                        "{}: {} targets missing block {}",
                        self.name,
                        block.id,
                        succ
                    ));
                }
            }

            for value in block.defs() {
                if !defined.insert(value) {
                    return Err(malformed_error!("{}: {} defined twice", self.name, value));
                }
            }

            let mut expected: Vec<BlockId> = preds[block.id.index()].clone();
            expected.sort();
            for phi in &block.phis {
                let mut incoming: Vec<BlockId> =
                    phi.operands.iter().map(|operand| operand.predecessor).collect();
                incoming.sort();
                if incoming != expected {
                    return Err(malformed_error!(
                        "{}: merge node {} in {} has inputs from {:?}, predecessors are {:?}",
                        self.name,
                        phi.dest,
                        block.id,
                        incoming,
                        expected
                    ));
                }
            }

            for op in &block.ops {
                if let Op::BlockAddress { block: target, .. } = op {
                    let flagged = self.block(*target).is_some_and(|b| b.address_taken);
                    if !flagged {
                        return Err(malformed_error!(
                            "{}: address of {} taken but block not flagged",
                            self.name,
                            target
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn {}(", self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{param}")?;
        }
        writeln!(f, ") entry {} {{", self.entry)?;
        for block in &self.blocks {
            writeln!(f, "{block}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Phi;

    fn diamond() -> Function {
        let mut func = Function::new("diamond");
        let cond = func.add_param();
        let entry = func.add_block("entry");
        let left = func.add_block("left");
        let right = func.add_block("right");
        let join = func.add_block("join");

        func.set_terminator(
            entry,
            Terminator::Branch {
                condition: cond,
                true_target: left,
                false_target: right,
            },
        )
        .unwrap();
        func.set_terminator(left, Terminator::Jump { target: join })
            .unwrap();
        func.set_terminator(right, Terminator::Jump { target: join })
            .unwrap();

        let result = func.new_value();
        let mut phi = Phi::new(result);
        phi.add_operand(cond, left);
        phi.add_operand(cond, right);
        let block = func.block_mut(join).unwrap();
        block.phis.push(phi);
        block.terminator = Terminator::Return {
            value: Some(result),
        };
        func
    }

    #[test]
    fn test_predecessors() {
        let func = diamond();
        assert_eq!(
            func.predecessors(BlockId::new(3)),
            vec![BlockId::new(1), BlockId::new(2)]
        );
        assert!(func.predecessors(BlockId::new(0)).is_empty());
        assert!(func.verify().is_ok());
    }

    #[test]
    fn test_clone_block_renames_defs() {
        let mut func = diamond();
        let (copy, renamed) = func.clone_block(BlockId::new(3), "join.1").unwrap();

        assert_eq!(copy, BlockId::new(4));
        assert_eq!(renamed.len(), 1);
        let original_phi = func.block(BlockId::new(3)).unwrap().phis[0].dest;
        let cloned_phi = func.block(copy).unwrap().phis[0].dest;
        assert_eq!(renamed[&original_phi], cloned_phi);
        assert_ne!(original_phi, cloned_phi);
        // The return still names the original value until remapped.
        assert_eq!(
            func.block(copy).unwrap().terminator.uses(),
            vec![original_phi]
        );
        func.remap_block_values(copy, &renamed).unwrap();
        assert_eq!(func.block(copy).unwrap().terminator.uses(), vec![cloned_phi]);
    }

    #[test]
    fn test_verify_rejects_missing_phi_input() {
        let mut func = diamond();
        func.block_mut(BlockId::new(3)).unwrap().phis[0].remove_operand(BlockId::new(2));
        assert!(func.verify().is_err());
    }

    #[test]
    fn test_block_by_label() {
        let func = diamond();
        assert_eq!(func.block_by_label("right"), Some(BlockId::new(2)));
        assert_eq!(func.block_by_label("nowhere"), None);
    }
}
