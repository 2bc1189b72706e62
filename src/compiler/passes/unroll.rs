//! Structural loop unrolling.
//!
//! Unrolling by `N` lays `N - 1` copies of the loop body out ahead of the original
//! loop. The preheader enters the first copy, every copy's latch falls into the next
//! copy's header, and the last copy's latch enters the original header, which keeps its
//! own back edge.
//!
//! ```text
//!   before                 after (N = 3)
//!
//!   [pre]                  [pre] -> [H.1] -> [B.1] -> [L.1]
//!     |                                                  |
//!     v                       +--------------------------+
//!   [H] <---+                 v
//!     |     |              [H.2] -> [B.2] -> [L.2]
//!     v     |                                  |
//!   [B]     |                 +----------------+
//!     |     |                 v
//!     v     |              [H] <---+
//!   [L] ----+                |     |
//!                            v     |
//!                           [B] -> [L]
//! ```
//!
//! Exits out of any copy stay exits: a copy that leaves the loop early leaves it for
//! good, exactly like the iteration it stands for.
//!
//! # Data flow repair
//!
//! Every cloned block gets fresh value ids. A last-value map tracks, for every value
//! defined in the original loop, the id that holds it in the most recent copy. Header
//! merge nodes are not cloned: in the first copy they resolve to the preheader input, in
//! later copies to the previous copy's latch input. Exit-block merge nodes gain one input
//! per cloned exiting block. Because a clone may use values of blocks cloned after it
//! within the same iteration (along back edges of nested loops), operands are rewritten
//! in a second pass once the whole iteration has been cloned.
//!
//! # Preconditions
//!
//! Checked before anything is mutated; a failure leaves the function untouched and is
//! reported as a distinct [`UnrollError`].

use std::collections::{HashMap, HashSet};

use log::{debug, warn};
use thiserror::Error;

use crate::{
    analysis::LoopInfo,
    compiler::{pass::Pass, EventKind, EventLog},
    config::UnrollConfig,
    ir::{BlockId, Function, Module, Terminator, ValueId},
    utils::graph::{algorithms::reverse_postorder, GraphBase, NodeId, Successors},
    Result,
};

/// Why a loop could not be unrolled.
#[derive(Error, Debug)]
pub enum UnrollError {
    /// The unroll count was zero.
    #[error("unroll count must be at least 1")]
    InvalidCount,

    /// The header does not have exactly one predecessor outside the loop.
    #[error("loop has no preheader")]
    NoPreheader,

    /// The loop has several back edges.
    #[error("loop has {0} latches, expected exactly one")]
    NoSingleLatch(usize),

    /// A loop block ends in an indirect jump, whose targets cannot be retargeted.
    #[error("block {0} ends in an indirect jump and cannot be cloned")]
    NotCloneable(BlockId),

    /// The address of a loop block is materialized somewhere.
    #[error("address of block {0} is taken")]
    AddressTaken(BlockId),

    /// The latch ends in something other than an unconditional jump.
    #[error("latch {0} does not end in an unconditional jump")]
    LatchNotUnconditional(BlockId),

    /// A value defined in the loop is used outside it without an exit merge node.
    #[error("value {value} escapes the loop into {user} without an exit merge node")]
    EscapingValue {
        /// The escaping value.
        value: ValueId,
        /// The block outside the loop reading it.
        user: BlockId,
    },

    /// A clone label is already used by another block of the function.
    #[error("label '{0}' of an unrolled copy is already taken")]
    LabelTaken(String),

    /// The IR itself is inconsistent.
    #[error(transparent)]
    Ir(#[from] crate::Error),
}

/// Result of a successful unroll.
#[derive(Debug, Clone, Default)]
pub struct Unrolled {
    /// Number of body copies added (count - 1).
    pub iterations: usize,
    /// Every block created, in creation order.
    pub blocks: Vec<BlockId>,
}

/// A loop that passed every precondition.
struct UnrollPlan {
    header: BlockId,
    latch: BlockId,
    preheader: BlockId,
    body: HashSet<BlockId>,
    /// Loop blocks in reverse postorder from the header.
    order: Vec<BlockId>,
}

/// The loop as a graph of its own: back edges to the header and exit edges removed.
struct LoopRegion<'a> {
    function: &'a Function,
    plan_body: &'a HashSet<BlockId>,
    header: BlockId,
}

impl GraphBase for LoopRegion<'_> {
    fn node_count(&self) -> usize {
        self.function.block_count()
    }

    fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.function.block_count()).map(NodeId::new)
    }
}

impl Successors for LoopRegion<'_> {
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.function
            .block(BlockId::from(node))
            .map(|block| block.successors())
            .unwrap_or_default()
            .into_iter()
            .filter(|succ| *succ != self.header && self.plan_body.contains(succ))
            .map(NodeId::from)
    }
}

/// Value and block correspondences of the most recent copy.
#[derive(Default)]
struct LastValueMap {
    values: HashMap<ValueId, ValueId>,
    blocks: HashMap<BlockId, BlockId>,
}

impl LastValueMap {
    fn value(&self, value: ValueId) -> ValueId {
        self.values.get(&value).copied().unwrap_or(value)
    }

    fn block(&self, block: BlockId) -> BlockId {
        self.blocks.get(&block).copied().unwrap_or(block)
    }

    fn clone_of(&self, block: BlockId) -> Result<BlockId> {
        self.blocks
            .get(&block)
            .copied()
            .ok_or_else(|| malformed_error!("no clone recorded for {}", block))
    }
}

fn check_preconditions(
    function: &Function,
    lp: &LoopInfo,
    count: usize,
) -> std::result::Result<UnrollPlan, UnrollError> {
    if count == 0 {
        return Err(UnrollError::InvalidCount);
    }
    let header = BlockId::from(lp.header);
    let preheader = lp
        .preheader
        .map(BlockId::from)
        .ok_or(UnrollError::NoPreheader)?;
    let latch = lp
        .single_latch()
        .map(BlockId::from)
        .ok_or(UnrollError::NoSingleLatch(lp.latches.len()))?;

    let body: HashSet<BlockId> = lp.body.iter().copied().map(BlockId::from).collect();

    for node in &lp.body {
        let block = function.try_block(BlockId::from(*node))?;
        if matches!(block.terminator, Terminator::IndirectJump { .. }) {
            return Err(UnrollError::NotCloneable(block.id));
        }
    }
    for node in &lp.body {
        let block = function.try_block(BlockId::from(*node))?;
        if block.address_taken {
            return Err(UnrollError::AddressTaken(block.id));
        }
    }
    if !function.try_block(latch)?.terminator.is_unconditional() {
        return Err(UnrollError::LatchNotUnconditional(latch));
    }

    let mut defined = HashSet::new();
    for id in &body {
        defined.extend(function.try_block(*id)?.defs());
    }
    for block in function.blocks() {
        if body.contains(&block.id) {
            continue;
        }
        if let Some(value) = block.uses().into_iter().find(|v| defined.contains(v)) {
            return Err(UnrollError::EscapingValue {
                value,
                user: block.id,
            });
        }
        for phi in &block.phis {
            for operand in &phi.operands {
                if defined.contains(&operand.value) && !body.contains(&operand.predecessor) {
                    return Err(UnrollError::EscapingValue {
                        value: operand.value,
                        user: block.id,
                    });
                }
            }
        }
    }

    for phi in &function.try_block(header)?.phis {
        if phi.operand_from(preheader).is_none() || phi.operand_from(latch).is_none() {
            return Err(malformed_error!(
                "{}: header merge node {} lacks a preheader or latch input",
                function.name,
                phi.dest
            )
            .into());
        }
    }

    let labels: HashSet<&str> = function.blocks().iter().map(|b| b.label.as_str()).collect();
    for node in &lp.body {
        let label = &function.try_block(BlockId::from(*node))?.label;
        for iteration in 1..count {
            let clone_label = format!("{label}.{iteration}");
            if labels.contains(clone_label.as_str()) {
                return Err(UnrollError::LabelTaken(clone_label));
            }
        }
    }

    let order = {
        let region = LoopRegion {
            function,
            plan_body: &body,
            header,
        };
        reverse_postorder(&region, header.into())
            .into_iter()
            .map(BlockId::from)
            .collect()
    };

    Ok(UnrollPlan {
        header,
        latch,
        preheader,
        body,
        order,
    })
}

/// Unrolls `lp` in `function` so that the body runs `count` times per trip around the
/// back edge.
///
/// `count == 1` only validates the loop. On a precondition failure the function is left
/// exactly as it was.
///
/// # Errors
///
/// Returns the first failed precondition, or [`UnrollError::Ir`] if the IR is
/// inconsistent.
pub fn unroll_loop(
    function: &mut Function,
    lp: &LoopInfo,
    count: usize,
) -> std::result::Result<Unrolled, UnrollError> {
    let plan = check_preconditions(function, lp, count)?;
    if count == 1 {
        return Ok(Unrolled::default());
    }

    let header_phis = function.try_block(plan.header)?.phis.clone();
    let mut last = LastValueMap::default();
    let mut created = Vec::new();

    for iteration in 1..count {
        let mut iteration_blocks = Vec::with_capacity(plan.order.len());

        for &original in &plan.order {
            let label = format!("{}.{}", function.try_block(original)?.label, iteration);
            let (clone, mut renamed) = function.clone_block(original, label)?;

            if original == plan.header {
                for phi in &header_phis {
                    let incoming = if iteration == 1 {
                        phi.operand_from(plan.preheader)
                    } else {
                        phi.operand_from(plan.latch).map(|v| last.value(v))
                    }
                    .ok_or_else(|| malformed_error!("header merge node {} lost an input", phi.dest))?;
                    renamed.insert(phi.dest, incoming);
                }
                function.try_block_mut(clone)?.phis.clear();

                if iteration == 1 {
                    function
                        .try_block_mut(plan.preheader)?
                        .terminator
                        .replace_successor(plan.header, clone);
                } else {
                    let previous_header = last.clone_of(plan.header)?;
                    let previous_latch = last.clone_of(plan.latch)?;
                    function
                        .try_block_mut(previous_latch)?
                        .terminator
                        .replace_successor(previous_header, clone);
                }
            }

            last.blocks.insert(original, clone);
            last.values.extend(renamed);

            for successor in function.try_block(original)?.successors() {
                if plan.body.contains(&successor) {
                    continue;
                }
                let exit = function.try_block_mut(successor)?;
                for phi in &mut exit.phis {
                    if let Some(incoming) = phi.operand_from(original) {
                        phi.add_operand(last.value(incoming), clone);
                    }
                }
            }

            iteration_blocks.push(clone);
        }

        for &clone in &iteration_blocks {
            let block = function.try_block_mut(clone)?;
            for phi in &mut block.phis {
                for operand in &mut phi.operands {
                    operand.value = last.value(operand.value);
                    operand.predecessor = last.block(operand.predecessor);
                }
            }
            for op in &mut block.ops {
                op.remap_values(|v| last.value(v));
            }
            block.terminator.remap_values(|v| last.value(v));
            block.terminator.remap_blocks(|b| last.block(b));
        }

        debug!(
            "{}: unrolled copy {} of {} ({} blocks)",
            function.name,
            iteration,
            plan.header,
            iteration_blocks.len()
        );
        created.extend(iteration_blocks);
    }

    let last_latch = last.clone_of(plan.latch)?;
    let last_header = last.clone_of(plan.header)?;
    let header = function.try_block_mut(plan.header)?;
    for phi in &mut header.phis {
        let incoming = phi
            .operand_from(plan.latch)
            .map(|v| last.value(v))
            .ok_or_else(|| malformed_error!("header merge node {} lost an input", phi.dest))?;
        phi.remove_operand(plan.preheader);
        phi.add_operand(incoming, last_latch);
    }
    function
        .try_block_mut(last_latch)?
        .terminator
        .replace_successor(last_header, plan.header);

    Ok(Unrolled {
        iterations: count - 1,
        blocks: created,
    })
}

/// Unrolls the loop whose header carries the configured label.
pub struct UnrollPass {
    config: UnrollConfig,
    matched: bool,
}

impl UnrollPass {
    /// Creates the pass.
    #[must_use]
    pub fn new(config: UnrollConfig) -> Self {
        Self {
            config,
            matched: false,
        }
    }
}

impl Pass for UnrollPass {
    fn name(&self) -> &'static str {
        "loop-unroll"
    }

    fn description(&self) -> &'static str {
        "Unrolls the loop with the configured header label N times"
    }

    fn initialize(&mut self, _module: &Module, _events: &EventLog) -> Result<()> {
        self.matched = false;
        self.config.validate()
    }

    fn run_on_loop(
        &mut self,
        module: &mut Module,
        function: usize,
        lp: &LoopInfo,
        events: &EventLog,
    ) -> Result<bool> {
        let function = module
            .function_mut(function)
            .ok_or_else(|| malformed_error!("function index {} out of range", function))?;
        let header = BlockId::from(lp.header);
        if function.try_block(header)?.label != self.config.header_label {
            return Ok(false);
        }
        self.matched = true;

        match unroll_loop(function, lp, self.config.count) {
            Ok(unrolled) if unrolled.iterations == 0 => {
                debug!("{}: loop {} unrolled once, nothing to do", function.name, header);
                Ok(false)
            }
            Ok(unrolled) => {
                events
                    .record(EventKind::LoopUnrolled)
                    .at(function.name.clone(), header)
                    .pass(self.name())
                    .message(format!(
                        "unrolled {} times, {} blocks added",
                        self.config.count,
                        unrolled.blocks.len()
                    ));
                Ok(true)
            }
            Err(UnrollError::Ir(error)) => Err(error),
            Err(error) => {
                warn!("{}: cannot unroll loop at {}: {}", function.name, header, error);
                events
                    .record(EventKind::PreconditionFailed)
                    .at(function.name.clone(), header)
                    .pass(self.name())
                    .message(error.to_string());
                Ok(false)
            }
        }
    }

    fn finalize(&mut self, _module: &Module, events: &EventLog) -> Result<()> {
        if !self.matched {
            let message = format!("no loop headed by '{}'", self.config.header_label);
            warn!("{message}");
            events.warn(message);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::CfgView,
        ir::{FunctionBuilder, Interpreter, Module},
    };

    /// sum = 0; for i in 0..n { sum += i }; return sum
    ///
    /// 0 entry -> 1 header(phi i, phi sum; i < n ? 2 : 3) -> 2 latch -> 1 ; 3 exit
    fn counting_loop() -> Function {
        FunctionBuilder::new("count", 1).build_with(|f| {
            let n = f.param(0);
            let (i, sum) = f.block(1, "header", |b| {
                let i = b.phi(&[]);
                let sum = b.phi(&[]);
                let cond = b.ult(i, n);
                b.branch(cond, 2, 3);
                (i, sum)
            });
            let (i_next, sum_next) = f.block(2, "latch", |b| {
                let one = b.constant(1);
                let sum_next = b.add(sum, i);
                let i_next = b.add(i, one);
                b.jump(1);
                (i_next, sum_next)
            });
            let zero = f.block(0, "entry", |b| {
                let zero = b.constant(0);
                b.jump(1);
                zero
            });
            f.block(3, "exit", |b| {
                let out = b.phi(&[(sum, 1)]);
                b.ret(Some(out));
            });
            f.phi_input(1, i, zero, 0);
            f.phi_input(1, sum, zero, 0);
            f.phi_input(1, i, i_next, 2);
            f.phi_input(1, sum, sum_next, 2);
        })
    }

    fn header_loop(function: &Function) -> LoopInfo {
        let header = function.block_by_label("header").unwrap();
        CfgView::new(function)
            .loops()
            .loop_for_header(header.into())
            .cloned()
            .unwrap()
    }

    fn run(function: &Function, n: u64) -> Option<u64> {
        let module = Module::new("t");
        Interpreter::new(&module)
            .run(function, &[n])
            .unwrap()
            .result
    }

    #[test]
    fn test_unroll_preserves_results() {
        for count in 1..=4 {
            let mut function = counting_loop();
            let lp = header_loop(&function);
            let unrolled = unroll_loop(&mut function, &lp, count).unwrap();
            assert_eq!(unrolled.iterations, count - 1);
            assert_eq!(unrolled.blocks.len(), (count - 1) * 2);
            function.verify().unwrap();

            for n in 0..9 {
                assert_eq!(run(&function, n), Some(n * n.saturating_sub(1) / 2), "count {count}, n {n}");
            }
        }
    }

    #[test]
    fn test_unroll_labels_and_chain() {
        let mut function = counting_loop();
        let lp = header_loop(&function);
        unroll_loop(&mut function, &lp, 3).unwrap();

        let h1 = function.block_by_label("header.1").unwrap();
        let l1 = function.block_by_label("latch.1").unwrap();
        let h2 = function.block_by_label("header.2").unwrap();
        let l2 = function.block_by_label("latch.2").unwrap();
        let header = function.block_by_label("header").unwrap();
        let entry = function.block_by_label("entry").unwrap();

        assert_eq!(function.try_block(entry).unwrap().successors(), vec![h1]);
        assert_eq!(function.try_block(l1).unwrap().successors(), vec![h2]);
        assert_eq!(function.try_block(l2).unwrap().successors(), vec![header]);
        assert!(function.try_block(h1).unwrap().phis.is_empty());

        let mut preds = function.predecessors(header);
        preds.sort();
        let latch = function.block_by_label("latch").unwrap();
        let mut expected = vec![latch, l2];
        expected.sort();
        assert_eq!(preds, expected);
    }

    #[test]
    fn test_count_one_is_noop() {
        let mut function = counting_loop();
        let before = function.clone();
        let lp = header_loop(&function);
        let unrolled = unroll_loop(&mut function, &lp, 1).unwrap();
        assert_eq!(unrolled.iterations, 0);
        assert_eq!(function.to_string(), before.to_string());
    }

    #[test]
    fn test_zero_count_rejected() {
        let mut function = counting_loop();
        let lp = header_loop(&function);
        assert!(matches!(
            unroll_loop(&mut function, &lp, 0),
            Err(UnrollError::InvalidCount)
        ));
    }

    #[test]
    fn test_conditional_latch_rejected() {
        // Do-while: the latch itself decides whether to loop.
        let mut function = FunctionBuilder::new("f", 0).build_with(|f| {
            f.block(0, "entry", |b| b.jump(1));
            f.block(1, "header", |b| b.jump(2));
            f.block(2, "latch", |b| {
                let c = b.constant(0);
                b.branch(c, 1, 3);
            });
            f.block(3, "exit", |b| b.ret(None));
        });
        let before = function.to_string();
        let lp = header_loop(&function);
        let latch = function.block_by_label("latch").unwrap();
        assert!(matches!(
            unroll_loop(&mut function, &lp, 2),
            Err(UnrollError::LatchNotUnconditional(b)) if b == latch
        ));
        assert_eq!(function.to_string(), before);
    }

    #[test]
    fn test_escaping_value_rejected() {
        let mut function = FunctionBuilder::new("f", 0).build_with(|f| {
            f.block(0, "entry", |b| b.jump(1));
            let v = f.block(1, "header", |b| {
                let v = b.constant(7);
                b.branch(v, 2, 3);
                v
            });
            f.block(2, "latch", |b| b.jump(1));
            f.block(3, "exit", |b| b.ret(Some(v)));
        });
        let lp = header_loop(&function);
        let exit = function.block_by_label("exit").unwrap();
        assert!(matches!(
            unroll_loop(&mut function, &lp, 2),
            Err(UnrollError::EscapingValue { user, .. }) if user == exit
        ));
    }

    fn assert_rejected<F>(mut function: Function, count: usize, check: F)
    where
        F: Fn(&UnrollError) -> bool,
    {
        let before = function.to_string();
        let lp = header_loop(&function);
        match unroll_loop(&mut function, &lp, count) {
            Err(error) => assert!(check(&error), "unexpected error: {error}"),
            Ok(_) => panic!("unrolling must fail"),
        }
        assert_eq!(function.to_string(), before);
    }

    #[test]
    fn test_two_latches_rejected() {
        // header -> l1 | l2 | exit; both latches jump back.
        let function = FunctionBuilder::new("f", 1).build_with(|f| {
            let n = f.param(0);
            f.block(0, "entry", |b| b.jump(1));
            f.block(1, "header", |b| b.switch(n, &[(0, 2), (1, 3)], 4));
            f.block(2, "l1", |b| b.jump(1));
            f.block(3, "l2", |b| b.jump(1));
            f.block(4, "exit", |b| b.ret(None));
        });
        assert_rejected(function, 3, |e| matches!(e, UnrollError::NoSingleLatch(2)));
    }

    #[test]
    fn test_address_taken_block_rejected() {
        let function = FunctionBuilder::new("f", 0).build_with(|f| {
            f.block(0, "entry", |b| b.jump(1));
            f.block(1, "header", |b| {
                let c = b.constant(1);
                b.branch(c, 2, 3);
            });
            f.block(2, "latch", |b| b.jump(1));
            f.block(3, "exit", |b| {
                let addr = b.block_address(2);
                b.ret(Some(addr));
            });
        });
        assert_rejected(function, 3, |e| {
            matches!(e, UnrollError::AddressTaken(b) if *b == BlockId::new(2))
        });
    }

    #[test]
    fn test_indirect_jump_rejected() {
        let function = FunctionBuilder::new("f", 0).build_with(|f| {
            f.block(0, "entry", |b| b.jump(1));
            f.block(1, "header", |b| {
                let c = b.constant(1);
                b.branch(c, 2, 3);
            });
            f.block(2, "body", |b| {
                let addr = b.constant(0x40);
                b.indirect_jump(addr, &[4]);
            });
            f.block(3, "exit", |b| b.ret(None));
            f.block(4, "latch", |b| b.jump(1));
        });
        assert_rejected(function, 2, |e| {
            matches!(e, UnrollError::NotCloneable(b) if *b == BlockId::new(2))
        });
    }

    #[test]
    fn test_two_entries_rejected() {
        // entry and side both enter the header.
        let function = FunctionBuilder::new("f", 0).build_with(|f| {
            f.block(0, "entry", |b| {
                let c = b.constant(0);
                b.branch(c, 1, 4);
            });
            f.block(1, "header", |b| {
                let c = b.constant(1);
                b.branch(c, 2, 3);
            });
            f.block(2, "latch", |b| b.jump(1));
            f.block(3, "exit", |b| b.ret(None));
            f.block(4, "side", |b| b.jump(1));
        });
        assert_rejected(function, 2, |e| matches!(e, UnrollError::NoPreheader));
    }

    #[test]
    fn test_clone_label_collision_rejected() {
        let mut function = counting_loop();
        let exit = function.block_by_label("exit").unwrap();
        function.block_mut(exit).unwrap().label = "latch.2".to_string();
        assert_rejected(function, 3, |e| {
            matches!(e, UnrollError::LabelTaken(label) if label == "latch.2")
        });
    }

    #[test]
    fn test_clone_label_free_below_count() {
        let mut function = counting_loop();
        let exit = function.block_by_label("exit").unwrap();
        function.block_mut(exit).unwrap().label = "latch.3".to_string();
        let lp = header_loop(&function);
        let unrolled = unroll_loop(&mut function, &lp, 3).unwrap();
        assert_eq!(unrolled.iterations, 2);
        function.verify().unwrap();
    }
}
