//! Recognition and specialization of interpretation loops.
//!
//! # Shape
//!
//! ```text
//!            [entry]
//!               |
//!               v
//!   +----> [dispatch]  %pc = load @vpc ; switch %pc [v1 -> T1, v2 -> T2, ...] default D
//!   |        /  |  \
//!   |      T1   T2  ...   emulated blocks, each ending in br latch
//!   |        \  |  /
//!   +----- [latch]        optional shared block closing every iteration
//! ```
//!
//! # Specialization
//!
//! For a VPC value `v` the untangler creates
//!
//! - a **header clone** `dispatch.v` that performs the header's work and jumps straight to
//!   the block the switch selects for `v`, and
//! - a **latch** for the block that switch target owns: the shared latch's work followed
//!   by a fresh VPC load and a switch with no cases whose default is the err block. Every
//!   back edge leaving the region owned by that target now lands here.
//!
//! A traced transition `p -> s` then becomes the case `s -> dispatch.s` in the latch of
//! `p`. Transitions that were never traced fall through the default into the err block,
//! which jumps back to the generic dispatch header, so behavior is preserved for any
//! execution.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::{
    analysis::{CfgView, LoopInfo},
    ir::{BlockId, Function, GlobalId, Op, SwitchCase, Terminator, ValueId},
    Result,
};

use super::trace::TraceEdge;

/// The specialized header and latch of one VPC value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderLatchPair {
    /// Header clone jumping straight to the value's emulated block.
    pub header: BlockId,
    /// Latch closing iterations that started at the value's emulated block.
    pub latch: BlockId,
}

/// A loop recognized as an interpretation loop.
#[derive(Debug, Clone)]
pub struct DispatchLoop {
    /// The dispatch block.
    pub header: BlockId,
    /// The block every emulated block jumps back through, if there is one.
    pub shared_latch: Option<BlockId>,
    /// The VPC global.
    pub vpc: GlobalId,
    cases: HashMap<u64, BlockId>,
    default: BlockId,
    /// Back edge sources mapped to the nearest dominating switch target.
    owners: HashMap<BlockId, BlockId>,
}

impl DispatchLoop {
    /// Block the dispatch switch selects for `vpc`.
    #[must_use]
    pub fn target_for(&self, vpc: u64) -> BlockId {
        self.cases.get(&vpc).copied().unwrap_or(self.default)
    }

    /// Number of distinct case values of the dispatch switch.
    #[must_use]
    pub fn case_count(&self) -> usize {
        self.cases.len()
    }

    /// Where back edges enter the dispatch: the shared latch, or the header itself.
    fn back_edge_target(&self) -> BlockId {
        self.shared_latch.unwrap_or(self.header)
    }
}

/// Outcome of inspecting a loop.
#[derive(Debug)]
pub enum Qualification {
    /// The loop is not an interpretation loop at all.
    NotDispatch(String),
    /// The loop dispatches on the VPC but its structure cannot be specialized.
    Rejected(String),
    /// The loop can be untangled.
    Qualified(DispatchLoop),
}

/// Decides whether `lp` is an interpretation loop driven by `vpc`.
///
/// # Errors
///
/// Returns [`crate::Error::Malformed`] if the loop refers to missing blocks.
pub fn qualify(function: &Function, lp: &LoopInfo, vpc: GlobalId) -> Result<Qualification> {
    let header = BlockId::from(lp.header);
    let block = function.try_block(header)?;

    let Terminator::Switch {
        value,
        cases,
        default,
    } = &block.terminator
    else {
        return Ok(Qualification::NotDispatch(format!(
            "{header} does not end in a switch"
        )));
    };
    let loads_vpc = block
        .ops
        .iter()
        .any(|op| matches!(op, Op::Load { dest, global } if dest == value && *global == vpc));
    if !loads_vpc {
        return Ok(Qualification::NotDispatch(format!(
            "switch in {header} is not on a value loaded from {vpc}"
        )));
    }

    if !block.phis.is_empty() {
        return Ok(Qualification::Rejected(format!(
            "dispatch header {header} has merge nodes"
        )));
    }
    let users = function.users();
    if let Some(reason) = escaping_definition(function, header, &users)? {
        return Ok(Qualification::Rejected(reason));
    }

    let shared_latch = match lp.single_latch().map(BlockId::from) {
        Some(latch)
            if latch != header
                && function.try_block(latch)?.terminator == (Terminator::Jump { target: header }) =>
        {
            if !function.try_block(latch)?.phis.is_empty() {
                return Ok(Qualification::Rejected(format!(
                    "shared latch {latch} has merge nodes"
                )));
            }
            if let Some(reason) = escaping_definition(function, latch, &users)? {
                return Ok(Qualification::Rejected(reason));
            }
            Some(latch)
        }
        _ => None,
    };

    let mut case_map = HashMap::with_capacity(cases.len());
    for case in cases {
        case_map.entry(case.value).or_insert(case.target);
    }

    let mut dispatch = DispatchLoop {
        header,
        shared_latch,
        vpc,
        cases: case_map,
        default: *default,
        owners: HashMap::new(),
    };
    dispatch.owners = back_edge_owners(function, lp, &dispatch);
    Ok(Qualification::Qualified(dispatch))
}

/// Returns a reason if a value defined in `block` is used anywhere else.
fn escaping_definition(
    function: &Function,
    block: BlockId,
    users: &HashMap<ValueId, Vec<BlockId>>,
) -> Result<Option<String>> {
    for value in function.try_block(block)?.defs() {
        if let Some(user) = users
            .get(&value)
            .and_then(|list| list.iter().find(|user| **user != block))
        {
            return Ok(Some(format!(
                "value {value} defined in {block} is used in {user}"
            )));
        }
    }
    Ok(None)
}

/// Maps every loop block with an edge into the dispatch to the switch target that owns it:
/// the nearest block on its dominator chain the switch can select.
fn back_edge_owners(
    function: &Function,
    lp: &LoopInfo,
    dispatch: &DispatchLoop,
) -> HashMap<BlockId, BlockId> {
    let dominators = CfgView::new(function).dominators();
    let targets: HashSet<BlockId> = dispatch
        .cases
        .values()
        .copied()
        .chain(std::iter::once(dispatch.default))
        .collect();
    let back_edge_target = dispatch.back_edge_target();

    let mut owners = HashMap::new();
    for node in &lp.body {
        let id = BlockId::from(*node);
        if id == dispatch.header || Some(id) == dispatch.shared_latch {
            continue;
        }
        let Some(block) = function.block(id) else {
            continue;
        };
        let retargetable = !matches!(block.terminator, Terminator::IndirectJump { .. });
        if !retargetable || !block.successors().contains(&back_edge_target) {
            continue;
        }

        let mut current = Some(*node);
        while let Some(candidate) = current {
            let candidate_block = BlockId::from(candidate);
            if targets.contains(&candidate_block) {
                owners.insert(id, candidate_block);
                break;
            }
            if candidate_block == dispatch.header {
                break;
            }
            current = dominators.immediate_dominator(candidate);
        }
    }
    owners
}

/// Header/latch memo and err block for one interpretation loop.
#[derive(Debug, Default)]
pub struct DispatchUntangler {
    pairs: BTreeMap<u64, HeaderLatchPair>,
    latches_by_target: HashMap<BlockId, BlockId>,
    latches_by_vpc: HashMap<u64, BlockId>,
    err_block: Option<BlockId>,
}

impl DispatchUntangler {
    /// Creates an untangler with nothing memoized.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The header/latch pairs created so far, by VPC value.
    #[must_use]
    pub fn pairs(&self) -> &BTreeMap<u64, HeaderLatchPair> {
        &self.pairs
    }

    /// The shared err block, once created.
    #[must_use]
    pub fn err_block(&self) -> Option<BlockId> {
        self.err_block
    }

    /// Number of distinct specialized latches.
    #[must_use]
    pub fn latch_count(&self) -> usize {
        self.latches_by_target.len()
    }

    fn get_or_create_err(&mut self, function: &mut Function, dispatch: &DispatchLoop) -> Result<BlockId> {
        if let Some(err) = self.err_block {
            return Ok(err);
        }
        let label = format!("{}.err", function.try_block(dispatch.header)?.label);
        let err = function.add_block(label);
        function.set_terminator(
            err,
            Terminator::Jump {
                target: dispatch.header,
            },
        )?;
        self.err_block = Some(err);
        Ok(err)
    }

    /// Returns the latch closing iterations that start at the block selected for `vpc`,
    /// creating it on first use.
    ///
    /// Values selecting the same block share one latch.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the dispatch blocks are missing.
    pub fn latch_for(
        &mut self,
        function: &mut Function,
        dispatch: &DispatchLoop,
        vpc: u64,
    ) -> Result<BlockId> {
        if let Some(latch) = self.latches_by_vpc.get(&vpc) {
            return Ok(*latch);
        }
        let target = dispatch.target_for(vpc);
        if let Some(latch) = self.latches_by_target.get(&target).copied() {
            self.latches_by_vpc.insert(vpc, latch);
            return Ok(latch);
        }

        let err = self.get_or_create_err(function, dispatch)?;
        let latch = match dispatch.shared_latch {
            Some(shared) => {
                let label = format!("{}.{:#x}", function.try_block(shared)?.label, vpc);
                let (latch, renamed) = function.clone_block(shared, label)?;
                function.remap_block_values(latch, &renamed)?;
                latch
            }
            None => {
                let label = format!("{}.latch.{:#x}", function.try_block(dispatch.header)?.label, vpc);
                function.add_block(label)
            }
        };

        let pc = function.new_value();
        let block = function.try_block_mut(latch)?;
        block.ops.push(Op::Load {
            dest: pc,
            global: dispatch.vpc,
        });
        block.terminator = Terminator::Switch {
            value: pc,
            cases: Vec::new(),
            default: err,
        };

        let back_edge_target = dispatch.back_edge_target();
        for (source, owner) in &dispatch.owners {
            if *owner == target {
                function
                    .try_block_mut(*source)?
                    .terminator
                    .replace_successor(back_edge_target, latch);
            }
        }

        self.latches_by_target.insert(target, latch);
        self.latches_by_vpc.insert(vpc, latch);
        Ok(latch)
    }

    /// Returns the pair specialized for `vpc`, creating it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the dispatch blocks are missing.
    pub fn get_or_create_pair(
        &mut self,
        function: &mut Function,
        dispatch: &DispatchLoop,
        vpc: u64,
    ) -> Result<HeaderLatchPair> {
        if let Some(pair) = self.pairs.get(&vpc) {
            return Ok(*pair);
        }

        let target = dispatch.target_for(vpc);
        let label = format!("{}.{:#x}", function.try_block(dispatch.header)?.label, vpc);
        let (header, renamed) = function.clone_block(dispatch.header, label)?;
        function.remap_block_values(header, &renamed)?;
        function.set_terminator(header, Terminator::Jump { target })?;

        for phi in &mut function.try_block_mut(target)?.phis {
            if let Some(value) = phi.operand_from(dispatch.header) {
                if phi.operand_from(header).is_none() {
                    phi.add_operand(value, header);
                }
            }
        }

        let latch = self.latch_for(function, dispatch, vpc)?;
        let pair = HeaderLatchPair { header, latch };
        self.pairs.insert(vpc, pair);
        Ok(pair)
    }

    /// Turns the traced transition `edge` into a direct case of the predecessor's latch.
    ///
    /// Returns `false` if the case already existed.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the dispatch blocks are missing.
    pub fn add_edge(
        &mut self,
        function: &mut Function,
        dispatch: &DispatchLoop,
        edge: TraceEdge,
    ) -> Result<bool> {
        let successor = u64::from(edge.successor);
        let pair = self.get_or_create_pair(function, dispatch, successor)?;
        let latch = self.latch_for(function, dispatch, u64::from(edge.predecessor))?;

        let Terminator::Switch { cases, .. } = &mut function.try_block_mut(latch)?.terminator else {
            return Err(malformed_error!("specialized latch {} lost its switch", latch));
        };
        if cases.iter().any(|case| case.value == successor) {
            return Ok(false);
        }
        cases.push(SwitchCase {
            value: successor,
            target: pair.header,
        });
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{FunctionBuilder, Initializer, Module},
        utils::graph::NodeId,
    };

    fn header_node() -> NodeId {
        BlockId::new(1).into()
    }

    fn interpreter() -> (Function, GlobalId) {
        let mut module = Module::new("m");
        let vpc = module.add_global("vpc", Initializer::Zero(8));
        let function = FunctionBuilder::new("main", 0).build_with(|f| {
            f.block(0, "entry", |b| {
                b.store_const(vpc, 0x10);
                b.jump(1);
            });
            f.block(1, "dispatch", |b| {
                let pc = b.load(vpc);
                b.switch(pc, &[(0x10, 2), (0x20, 3), (0x30, 3)], 4);
            });
            f.block(2, "BB_10", |b| {
                b.store_const(vpc, 0x20);
                b.jump(5);
            });
            f.block(3, "BB_20", |b| {
                b.store_const(vpc, 0);
                b.jump(5);
            });
            f.block(4, "exit", |b| b.ret(None));
            f.block(5, "latch", |b| b.jump(1));
        });
        (function, vpc)
    }

    fn dispatch_loop(function: &Function, vpc: GlobalId) -> DispatchLoop {
        let forest = CfgView::new(function).loops();
        let lp = forest.loop_for_header(header_node()).unwrap();
        match qualify(function, lp, vpc).unwrap() {
            Qualification::Qualified(dispatch) => dispatch,
            other => panic!("expected a dispatch loop, got {other:?}"),
        }
    }

    #[test]
    fn test_qualify_interpretation_loop() {
        let (function, vpc) = interpreter();
        let dispatch = dispatch_loop(&function, vpc);
        assert_eq!(dispatch.header, BlockId::new(1));
        assert_eq!(dispatch.shared_latch, Some(BlockId::new(5)));
        assert_eq!(dispatch.target_for(0x20), BlockId::new(3));
        assert_eq!(dispatch.target_for(0x99), BlockId::new(4));
        assert_eq!(dispatch.case_count(), 3);
    }

    #[test]
    fn test_switch_on_other_global_not_dispatch() {
        let (function, _) = interpreter();
        let forest = CfgView::new(&function).loops();
        let lp = forest.loop_for_header(header_node()).unwrap();
        let other = GlobalId::new(42);
        assert!(matches!(
            qualify(&function, lp, other).unwrap(),
            Qualification::NotDispatch(_)
        ));
    }

    #[test]
    fn test_header_value_escaping_rejected() {
        let (mut function, vpc) = interpreter();
        // Make BB_10 read the header's VPC load.
        let pc = function.blocks()[1].defs()[0];
        function
            .try_block_mut(BlockId::new(2))
            .unwrap()
            .ops
            .push(Op::Copy {
                dest: ValueId::new(1000),
                src: pc,
            });
        let forest = CfgView::new(&function).loops();
        let lp = forest.loop_for_header(header_node()).unwrap();
        assert!(matches!(
            qualify(&function, lp, vpc).unwrap(),
            Qualification::Rejected(_)
        ));
    }

    #[test]
    fn test_pair_creation_is_idempotent() {
        let (mut function, vpc) = interpreter();
        let dispatch = dispatch_loop(&function, vpc);
        let mut untangler = DispatchUntangler::new();

        let first = untangler.get_or_create_pair(&mut function, &dispatch, 0x20).unwrap();
        let blocks = function.block_count();
        let second = untangler.get_or_create_pair(&mut function, &dispatch, 0x20).unwrap();

        assert_eq!(first, second);
        assert_eq!(function.block_count(), blocks);
        assert_eq!(untangler.pairs().len(), 1);
        assert_eq!(
            function.try_block(first.header).unwrap().terminator,
            Terminator::Jump {
                target: BlockId::new(3)
            }
        );
        assert_eq!(function.try_block(first.header).unwrap().label, "dispatch.0x20");
    }

    #[test]
    fn test_values_with_same_target_share_latch() {
        let (mut function, vpc) = interpreter();
        let dispatch = dispatch_loop(&function, vpc);
        let mut untangler = DispatchUntangler::new();

        let a = untangler.latch_for(&mut function, &dispatch, 0x20).unwrap();
        let b = untangler.latch_for(&mut function, &dispatch, 0x30).unwrap();
        assert_eq!(a, b);
        assert_eq!(untangler.latch_count(), 1);

        // BB_20 now closes its iteration through the specialized latch.
        assert_eq!(function.try_block(BlockId::new(3)).unwrap().successors(), vec![a]);
        // BB_10 still uses the shared one.
        assert_eq!(
            function.try_block(BlockId::new(2)).unwrap().successors(),
            vec![BlockId::new(5)]
        );
    }

    #[test]
    fn test_add_edge_once() {
        let (mut function, vpc) = interpreter();
        let dispatch = dispatch_loop(&function, vpc);
        let mut untangler = DispatchUntangler::new();

        assert!(untangler
            .add_edge(&mut function, &dispatch, TraceEdge::new(0x10, 0x20))
            .unwrap());
        assert!(!untangler
            .add_edge(&mut function, &dispatch, TraceEdge::new(0x10, 0x20))
            .unwrap());

        let latch = untangler.latch_for(&mut function, &dispatch, 0x10).unwrap();
        let pair = untangler.pairs()[&0x20];
        let Terminator::Switch { cases, default, .. } =
            &function.try_block(latch).unwrap().terminator
        else {
            panic!("latch must end in a switch");
        };
        assert_eq!(cases, &vec![SwitchCase { value: 0x20, target: pair.header }]);
        assert_eq!(Some(*default), untangler.err_block());
        function.verify().unwrap();
    }
}
