//! Operations and terminators.
//!
//! Straight-line work inside a block is expressed as [`Op`]s. Control leaves a block through
//! exactly one [`Terminator`]. Both expose their value operands through `uses` and a
//! `remap_values` rewrite hook, which is what the cloning passes rely on when they substitute
//! per-iteration copies for original values.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ir::{BlockId, GlobalId, ValueId};

/// Arithmetic and comparison operators. All arithmetic is wrapping on 64 bits; comparisons
/// produce `0` or `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    /// Wrapping addition.
    Add,
    /// Wrapping subtraction.
    Sub,
    /// Wrapping multiplication.
    Mul,
    /// Bitwise and.
    And,
    /// Bitwise or.
    Or,
    /// Bitwise exclusive or.
    Xor,
    /// Logical shift left (shift amount taken modulo 64).
    Shl,
    /// Logical shift right (shift amount taken modulo 64).
    Shr,
    /// Equality.
    Eq,
    /// Inequality.
    Ne,
    /// Unsigned less-than.
    Ult,
}

impl BinaryOp {
    /// Evaluates the operator on two concrete operands.
    #[must_use]
    pub fn apply(self, left: u64, right: u64) -> u64 {
        match self {
            BinaryOp::Add => left.wrapping_add(right),
            BinaryOp::Sub => left.wrapping_sub(right),
            BinaryOp::Mul => left.wrapping_mul(right),
            BinaryOp::And => left & right,
            BinaryOp::Or => left | right,
            BinaryOp::Xor => left ^ right,
            BinaryOp::Shl => left.wrapping_shl((right % 64) as u32),
            BinaryOp::Shr => left.wrapping_shr((right % 64) as u32),
            BinaryOp::Eq => u64::from(left == right),
            BinaryOp::Ne => u64::from(left != right),
            BinaryOp::Ult => u64::from(left < right),
        }
    }

    fn mnemonic(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Xor => "xor",
            BinaryOp::Shl => "shl",
            BinaryOp::Shr => "shr",
            BinaryOp::Eq => "eq",
            BinaryOp::Ne => "ne",
            BinaryOp::Ult => "ult",
        }
    }
}

/// A non-terminating operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    /// `dest = value`
    Const {
        /// Defined value.
        dest: ValueId,
        /// Immediate.
        value: u64,
    },
    /// `dest = op left, right`
    Binary {
        /// Defined value.
        dest: ValueId,
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        left: ValueId,
        /// Right operand.
        right: ValueId,
    },
    /// `dest = load global`
    Load {
        /// Defined value.
        dest: ValueId,
        /// Global read from.
        global: GlobalId,
    },
    /// `store value, global`
    Store {
        /// Global written to.
        global: GlobalId,
        /// Stored value.
        value: ValueId,
    },
    /// `dest = call callee(args)`; helpers provided by the runtime (emulation helpers,
    /// system call stubs) are referenced by name.
    Call {
        /// Defined value, if the callee returns one.
        dest: Option<ValueId>,
        /// Symbol name of the callee.
        callee: String,
        /// Arguments.
        args: Vec<ValueId>,
    },
    /// `dest = blockaddress block`; materializes a block's address as data.
    BlockAddress {
        /// Defined value.
        dest: ValueId,
        /// Block whose address is taken.
        block: BlockId,
    },
    /// `dest = src`
    Copy {
        /// Defined value.
        dest: ValueId,
        /// Copied value.
        src: ValueId,
    },
}

impl Op {
    /// Returns the value defined by this operation, if any.
    #[must_use]
    pub fn dest(&self) -> Option<ValueId> {
        match self {
            Op::Const { dest, .. }
            | Op::Binary { dest, .. }
            | Op::Load { dest, .. }
            | Op::BlockAddress { dest, .. }
            | Op::Copy { dest, .. } => Some(*dest),
            Op::Call { dest, .. } => *dest,
            Op::Store { .. } => None,
        }
    }

    /// Replaces the defined value. Does nothing for operations without a result.
    pub fn set_dest(&mut self, value: ValueId) {
        match self {
            Op::Const { dest, .. }
            | Op::Binary { dest, .. }
            | Op::Load { dest, .. }
            | Op::BlockAddress { dest, .. }
            | Op::Copy { dest, .. } => *dest = value,
            Op::Call { dest, .. } => {
                if dest.is_some() {
                    *dest = Some(value);
                }
            }
            Op::Store { .. } => {}
        }
    }

    /// Returns the values read by this operation.
    #[must_use]
    pub fn uses(&self) -> Vec<ValueId> {
        match self {
            Op::Const { .. } | Op::Load { .. } | Op::BlockAddress { .. } => Vec::new(),
            Op::Binary { left, right, .. } => vec![*left, *right],
            Op::Store { value, .. } => vec![*value],
            Op::Call { args, .. } => args.clone(),
            Op::Copy { src, .. } => vec![*src],
        }
    }

    /// Rewrites every value operand through `map`. The defined value is left alone.
    pub fn remap_values(&mut self, mut map: impl FnMut(ValueId) -> ValueId) {
        match self {
            Op::Const { .. } | Op::Load { .. } | Op::BlockAddress { .. } => {}
            Op::Binary { left, right, .. } => {
                *left = map(*left);
                *right = map(*right);
            }
            Op::Store { value, .. } => *value = map(*value),
            Op::Call { args, .. } => {
                for arg in args {
                    *arg = map(*arg);
                }
            }
            Op::Copy { src, .. } => *src = map(*src),
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Const { dest, value } => write!(f, "{dest} = const {value:#x}"),
            Op::Binary {
                dest,
                op,
                left,
                right,
            } => write!(f, "{dest} = {} {left}, {right}", op.mnemonic()),
            Op::Load { dest, global } => write!(f, "{dest} = load {global}"),
            Op::Store { global, value } => write!(f, "store {value}, {global}"),
            Op::Call { dest, callee, args } => {
                if let Some(dest) = dest {
                    write!(f, "{dest} = ")?;
                }
                write!(f, "call {callee}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            Op::BlockAddress { dest, block } => write!(f, "{dest} = blockaddress {block}"),
            Op::Copy { dest, src } => write!(f, "{dest} = {src}"),
        }
    }
}

/// One arm of a [`Terminator::Switch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchCase {
    /// Matched value.
    pub value: u64,
    /// Block entered when the switch value equals [`SwitchCase::value`].
    pub target: BlockId,
}

/// The single control transfer closing a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Terminator {
    /// Unconditional branch.
    Jump {
        /// Successor.
        target: BlockId,
    },
    /// Two-way branch on a non-zero condition.
    Branch {
        /// Condition value.
        condition: ValueId,
        /// Successor when the condition is non-zero.
        true_target: BlockId,
        /// Successor when the condition is zero.
        false_target: BlockId,
    },
    /// Multi-way dispatch. The first case whose value matches wins.
    Switch {
        /// Dispatched value.
        value: ValueId,
        /// Cases in source order.
        cases: Vec<SwitchCase>,
        /// Successor when no case matches.
        default: BlockId,
    },
    /// Function return.
    Return {
        /// Returned value.
        value: Option<ValueId>,
    },
    /// Jump through a computed block address. The target list is the set of blocks the
    /// address may resolve to; it cannot be retargeted after cloning.
    IndirectJump {
        /// Address operand.
        address: ValueId,
        /// Possible destinations.
        targets: Vec<BlockId>,
    },
    /// Control never reaches the end of this block.
    Unreachable,
}

impl Terminator {
    /// Returns the successor blocks in operand order. A block listed twice (for example both
    /// arms of a branch) appears twice.
    #[must_use]
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Terminator::Jump { target } => vec![*target],
            Terminator::Branch {
                true_target,
                false_target,
                ..
            } => vec![*true_target, *false_target],
            Terminator::Switch { cases, default, .. } => {
                let mut targets: Vec<BlockId> = cases.iter().map(|case| case.target).collect();
                targets.push(*default);
                targets
            }
            Terminator::IndirectJump { targets, .. } => targets.clone(),
            Terminator::Return { .. } | Terminator::Unreachable => Vec::new(),
        }
    }

    /// Returns the successor blocks with duplicates removed, first occurrence order.
    #[must_use]
    pub fn unique_successors(&self) -> Vec<BlockId> {
        let mut unique = Vec::new();
        for target in self.successors() {
            if !unique.contains(&target) {
                unique.push(target);
            }
        }
        unique
    }

    /// Redirects every edge to `old` so that it targets `new` instead.
    ///
    /// Jumps, branches and switches are retargetable; indirect jumps are not, because the
    /// address operand would still resolve to `old`. Returns `true` if any edge changed.
    pub fn replace_successor(&mut self, old: BlockId, new: BlockId) -> bool {
        let mut changed = false;
        let mut swap = |target: &mut BlockId| {
            if *target == old {
                *target = new;
                changed = true;
            }
        };
        match self {
            Terminator::Jump { target } => swap(target),
            Terminator::Branch {
                true_target,
                false_target,
                ..
            } => {
                swap(true_target);
                swap(false_target);
            }
            Terminator::Switch { cases, default, .. } => {
                for case in cases.iter_mut() {
                    swap(&mut case.target);
                }
                swap(default);
            }
            Terminator::IndirectJump { .. } | Terminator::Return { .. } | Terminator::Unreachable => {}
        }
        changed
    }

    /// Rewrites every successor through `map`, including indirect jump target lists.
    pub fn remap_blocks(&mut self, mut map: impl FnMut(BlockId) -> BlockId) {
        match self {
            Terminator::Jump { target } => *target = map(*target),
            Terminator::Branch {
                true_target,
                false_target,
                ..
            } => {
                *true_target = map(*true_target);
                *false_target = map(*false_target);
            }
            Terminator::Switch { cases, default, .. } => {
                for case in cases.iter_mut() {
                    case.target = map(case.target);
                }
                *default = map(*default);
            }
            Terminator::IndirectJump { targets, .. } => {
                for target in targets.iter_mut() {
                    *target = map(*target);
                }
            }
            Terminator::Return { .. } | Terminator::Unreachable => {}
        }
    }

    /// Returns the values read by this terminator.
    #[must_use]
    pub fn uses(&self) -> Vec<ValueId> {
        match self {
            Terminator::Branch { condition, .. } => vec![*condition],
            Terminator::Switch { value, .. } => vec![*value],
            Terminator::Return { value } => value.iter().copied().collect(),
            Terminator::IndirectJump { address, .. } => vec![*address],
            Terminator::Jump { .. } | Terminator::Unreachable => Vec::new(),
        }
    }

    /// Rewrites every value operand through `map`.
    pub fn remap_values(&mut self, mut map: impl FnMut(ValueId) -> ValueId) {
        match self {
            Terminator::Branch { condition, .. } => *condition = map(*condition),
            Terminator::Switch { value, .. } => *value = map(*value),
            Terminator::Return { value } => {
                if let Some(value) = value {
                    *value = map(*value);
                }
            }
            Terminator::IndirectJump { address, .. } => *address = map(*address),
            Terminator::Jump { .. } | Terminator::Unreachable => {}
        }
    }

    /// Returns `true` for [`Terminator::Jump`].
    #[must_use]
    pub fn is_unconditional(&self) -> bool {
        matches!(self, Terminator::Jump { .. })
    }
}

impl fmt::Display for Terminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Terminator::Jump { target } => write!(f, "br {target}"),
            Terminator::Branch {
                condition,
                true_target,
                false_target,
            } => write!(f, "br {condition}, {true_target}, {false_target}"),
            Terminator::Switch {
                value,
                cases,
                default,
            } => {
                write!(f, "switch {value}, {default} [")?;
                for (i, case) in cases.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:#x} -> {}", case.value, case.target)?;
                }
                write!(f, "]")
            }
            Terminator::Return { value: Some(value) } => write!(f, "ret {value}"),
            Terminator::Return { value: None } => write!(f, "ret"),
            Terminator::IndirectJump { address, targets } => {
                write!(f, "indirectbr {address}, [")?;
                for (i, target) in targets.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{target}")?;
                }
                write!(f, "]")
            }
            Terminator::Unreachable => write!(f, "unreachable"),
        }
    }
}
