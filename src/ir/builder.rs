//! Builder pattern for programmatic IR construction.
//!
//! A closure-based API where all blocks of a function are defined within a single
//! expression, keeping the CFG shape visible. It is how tests, fixtures and small lifter
//! stubs produce functions without managing block and value ids by hand.
//!
//! ```rust,ignore
//! let func = FunctionBuilder::new("main", 1).build_with(|f| {
//!     let cond = f.param(0);
//!
//!     f.block(0, "entry", |b| b.branch(cond, 1, 2));
//!     f.block(1, "then", |b| b.jump(3));
//!     f.block(2, "else", |b| b.jump(3));
//!     f.block(3, "exit", |b| b.ret(None));
//! });
//! ```
//!
//! Merge node inputs that flow in along back edges usually name values that are defined
//! later in the closure. [`FunctionContext::phi_input`] adds such inputs once the defining
//! block has been built.

use crate::ir::{
    BinaryOp, BlockId, Function, GlobalId, Op, Phi, SwitchCase, Terminator, ValueId,
};

/// Builds a [`Function`] from a closure.
#[derive(Debug)]
pub struct FunctionBuilder {
    function: Function,
}

impl FunctionBuilder {
    /// Creates a builder for a function named `name` taking `num_params` parameters.
    #[must_use]
    pub fn new(name: impl Into<String>, num_params: usize) -> Self {
        let mut function = Function::new(name);
        for _ in 0..num_params {
            function.add_param();
        }
        Self { function }
    }

    /// Runs `f` against the function under construction and returns the result.
    ///
    /// Block 0 is the entry. Blocks referenced but never defined are left as unreachable
    /// placeholders so ids stay dense.
    pub fn build_with<F>(mut self, f: F) -> Function
    where
        F: FnOnce(&mut FunctionContext<'_>),
    {
        let mut pending_addresses = Vec::new();
        let mut ctx = FunctionContext {
            function: &mut self.function,
            pending_addresses: &mut pending_addresses,
        };
        f(&mut ctx);

        for target in pending_addresses {
            ensure_block(&mut self.function, target.index());
            if let Some(block) = self.function.block_mut(target) {
                block.address_taken = true;
            }
        }
        self.function
    }
}

fn ensure_block(function: &mut Function, id: usize) {
    while function.block_count() <= id {
        let next = function.block_count();
        function.add_block(format!("bb{next}"));
    }
}

/// Function-level builder context.
pub struct FunctionContext<'a> {
    function: &'a mut Function,
    pending_addresses: &'a mut Vec<BlockId>,
}

impl FunctionContext<'_> {
    /// Returns parameter `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[must_use]
    pub fn param(&self, index: usize) -> ValueId {
        self.function.params[index]
    }

    /// Defines block `id` labelled `label`, returning whatever the closure returns.
    pub fn block<R, F>(&mut self, id: usize, label: &str, f: F) -> R
    where
        F: FnOnce(&mut BlockBuilder<'_>) -> R,
    {
        ensure_block(self.function, id);
        if let Some(block) = self.function.block_mut(BlockId::new(id)) {
            block.label = label.to_string();
        }
        let mut builder = BlockBuilder {
            function: self.function,
            pending_addresses: self.pending_addresses,
            block: BlockId::new(id),
        };
        f(&mut builder)
    }

    /// Adds the input `value from pred` to the merge node defining `phi` in block `block`.
    pub fn phi_input(&mut self, block: usize, phi: ValueId, value: ValueId, pred: usize) {
        if let Some(block) = self.function.block_mut(BlockId::new(block)) {
            if let Some(node) = block.phis.iter_mut().find(|node| node.dest == phi) {
                node.add_operand(value, BlockId::new(pred));
            }
        }
    }
}

/// Block-level builder.
pub struct BlockBuilder<'a> {
    function: &'a mut Function,
    pending_addresses: &'a mut Vec<BlockId>,
    block: BlockId,
}

impl BlockBuilder<'_> {
    fn push(&mut self, op: Op) {
        if let Some(block) = self.function.block_mut(self.block) {
            block.ops.push(op);
        }
    }

    fn terminate(&mut self, terminator: Terminator) {
        if let Some(block) = self.function.block_mut(self.block) {
            block.terminator = terminator;
        }
    }

    /// The id of the block being built.
    #[must_use]
    pub fn id(&self) -> BlockId {
        self.block
    }

    /// `phi(inputs)`, each input given as `(value, predecessor block)`.
    pub fn phi(&mut self, inputs: &[(ValueId, usize)]) -> ValueId {
        let dest = self.function.new_value();
        let mut phi = Phi::new(dest);
        for (value, pred) in inputs {
            phi.add_operand(*value, BlockId::new(*pred));
        }
        if let Some(block) = self.function.block_mut(self.block) {
            block.phis.push(phi);
        }
        dest
    }

    /// `const value`
    pub fn constant(&mut self, value: u64) -> ValueId {
        let dest = self.function.new_value();
        self.push(Op::Const { dest, value });
        dest
    }

    /// `op left, right`
    pub fn binary(&mut self, op: BinaryOp, left: ValueId, right: ValueId) -> ValueId {
        let dest = self.function.new_value();
        self.push(Op::Binary {
            dest,
            op,
            left,
            right,
        });
        dest
    }

    /// `add left, right`
    pub fn add(&mut self, left: ValueId, right: ValueId) -> ValueId {
        self.binary(BinaryOp::Add, left, right)
    }

    /// `ult left, right`
    pub fn ult(&mut self, left: ValueId, right: ValueId) -> ValueId {
        self.binary(BinaryOp::Ult, left, right)
    }

    /// `load global`
    pub fn load(&mut self, global: GlobalId) -> ValueId {
        let dest = self.function.new_value();
        self.push(Op::Load { dest, global });
        dest
    }

    /// `store value, global`
    pub fn store(&mut self, global: GlobalId, value: ValueId) {
        self.push(Op::Store { global, value });
    }

    /// `const value` followed by `store`, the lifter's idiom for setting the VPC.
    pub fn store_const(&mut self, global: GlobalId, value: u64) {
        let constant = self.constant(value);
        self.store(global, constant);
    }

    /// `call callee(args)` returning a value.
    pub fn call(&mut self, callee: &str, args: &[ValueId]) -> ValueId {
        let dest = self.function.new_value();
        self.push(Op::Call {
            dest: Some(dest),
            callee: callee.to_string(),
            args: args.to_vec(),
        });
        dest
    }

    /// `call callee(args)` without a result.
    pub fn call_void(&mut self, callee: &str, args: &[ValueId]) {
        self.push(Op::Call {
            dest: None,
            callee: callee.to_string(),
            args: args.to_vec(),
        });
    }

    /// `blockaddress target`; flags `target` as address-taken.
    pub fn block_address(&mut self, target: usize) -> ValueId {
        let dest = self.function.new_value();
        let block = BlockId::new(target);
        self.push(Op::BlockAddress { dest, block });
        self.pending_addresses.push(block);
        dest
    }

    /// `copy src`
    pub fn copy(&mut self, src: ValueId) -> ValueId {
        let dest = self.function.new_value();
        self.push(Op::Copy { dest, src });
        dest
    }

    /// Unconditional jump.
    pub fn jump(&mut self, target: usize) {
        self.terminate(Terminator::Jump {
            target: BlockId::new(target),
        });
    }

    /// Two-way branch.
    pub fn branch(&mut self, condition: ValueId, true_target: usize, false_target: usize) {
        self.terminate(Terminator::Branch {
            condition,
            true_target: BlockId::new(true_target),
            false_target: BlockId::new(false_target),
        });
    }

    /// Multi-way switch; cases are `(value, target)`.
    pub fn switch(&mut self, value: ValueId, cases: &[(u64, usize)], default: usize) {
        self.terminate(Terminator::Switch {
            value,
            cases: cases
                .iter()
                .map(|(case, target)| SwitchCase {
                    value: *case,
                    target: BlockId::new(*target),
                })
                .collect(),
            default: BlockId::new(default),
        });
    }

    /// Return.
    pub fn ret(&mut self, value: Option<ValueId>) {
        self.terminate(Terminator::Return { value });
    }

    /// Indirect jump through `address` to one of `targets`.
    pub fn indirect_jump(&mut self, address: ValueId, targets: &[usize]) {
        self.terminate(Terminator::IndirectJump {
            address,
            targets: targets.iter().copied().map(BlockId::new).collect(),
        });
    }
}
