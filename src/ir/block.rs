//! Basic blocks and merge nodes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ir::{BlockId, Op, Terminator, ValueId};

/// One input of a merge node: the value to use when control arrives from `predecessor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhiOperand {
    /// Incoming value.
    pub value: ValueId,
    /// Predecessor block the value flows in from.
    pub predecessor: BlockId,
}

impl PhiOperand {
    /// Creates a new merge node input.
    #[must_use]
    pub const fn new(value: ValueId, predecessor: BlockId) -> Self {
        Self { value, predecessor }
    }
}

impl fmt::Display for PhiOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {}", self.value, self.predecessor)
    }
}

/// A merge node at block entry, `dest = phi(v1 from bb1, v2 from bb2)`.
///
/// # Invariants
///
/// - Exactly one operand per predecessor edge of the owning block
/// - Evaluated before any operation of the block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phi {
    /// Defined value.
    pub dest: ValueId,
    /// Incoming values, one per predecessor.
    pub operands: Vec<PhiOperand>,
}

impl Phi {
    /// Creates a merge node without inputs.
    #[must_use]
    pub fn new(dest: ValueId) -> Self {
        Self {
            dest,
            operands: Vec::new(),
        }
    }

    /// Returns the value flowing in from `predecessor`.
    #[must_use]
    pub fn operand_from(&self, predecessor: BlockId) -> Option<ValueId> {
        self.operands
            .iter()
            .find(|operand| operand.predecessor == predecessor)
            .map(|operand| operand.value)
    }

    /// Appends an input.
    pub fn add_operand(&mut self, value: ValueId, predecessor: BlockId) {
        self.operands.push(PhiOperand::new(value, predecessor));
    }

    /// Removes every input arriving from `predecessor`. Returns `true` if any was removed.
    pub fn remove_operand(&mut self, predecessor: BlockId) -> bool {
        let before = self.operands.len();
        self.operands
            .retain(|operand| operand.predecessor != predecessor);
        self.operands.len() != before
    }
}

impl fmt::Display for Phi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = phi(", self.dest)?;
        for (i, operand) in self.operands.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{operand}")?;
        }
        write!(f, ")")
    }
}

/// A basic block: merge nodes, straight-line operations, one terminator.
///
/// The label is the name the lifter gave the block (for example `BB_401000`); cloning
/// passes derive clone labels from it by appending a suffix. `address_taken` is set when
/// the block's address is used as data, which pins its identity: such a block cannot be
/// duplicated without silently splitting the uses of its address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Stable block id, equal to the block's index in its function.
    pub id: BlockId,
    /// Block label.
    pub label: String,
    /// Merge nodes at block entry.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub phis: Vec<Phi>,
    /// Operations in execution order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ops: Vec<Op>,
    /// The block's terminator.
    pub terminator: Terminator,
    /// Whether the block's address escapes as data.
    #[serde(default)]
    pub address_taken: bool,
}

impl Block {
    /// Creates an empty block that ends in [`Terminator::Unreachable`].
    #[must_use]
    pub fn new(id: BlockId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            phis: Vec::new(),
            ops: Vec::new(),
            terminator: Terminator::Unreachable,
            address_taken: false,
        }
    }

    /// Returns the successor blocks without duplicates.
    #[must_use]
    pub fn successors(&self) -> Vec<BlockId> {
        self.terminator.unique_successors()
    }

    /// Returns every value defined in this block, merge nodes first.
    #[must_use]
    pub fn defs(&self) -> Vec<ValueId> {
        self.phis
            .iter()
            .map(|phi| phi.dest)
            .chain(self.ops.iter().filter_map(Op::dest))
            .collect()
    }

    /// Returns every value read by operations and the terminator of this block.
    ///
    /// Merge node inputs are not included; they are uses on the incoming edge, not in the
    /// block itself.
    #[must_use]
    pub fn uses(&self) -> Vec<ValueId> {
        self.ops
            .iter()
            .flat_map(Op::uses)
            .chain(self.terminator.uses())
            .collect()
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({}):", self.id, self.label)?;
        for phi in &self.phis {
            writeln!(f, "    {phi}")?;
        }
        for op in &self.ops {
            writeln!(f, "    {op}")?;
        }
        write!(f, "    {}", self.terminator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phi_operands() {
        let mut phi = Phi::new(ValueId::new(3));
        phi.add_operand(ValueId::new(1), BlockId::new(0));
        phi.add_operand(ValueId::new(2), BlockId::new(1));

        assert_eq!(phi.operand_from(BlockId::new(1)), Some(ValueId::new(2)));
        assert_eq!(phi.operand_from(BlockId::new(5)), None);
        assert_eq!(phi.to_string(), "%3 = phi(%1 from bb0, %2 from bb1)");

        assert!(phi.remove_operand(BlockId::new(0)));
        assert!(!phi.remove_operand(BlockId::new(0)));
        assert_eq!(phi.operands.len(), 1);
    }
}
