//! Trace-guided untangling of interpretation loops.
//!
//! A lifter that cannot resolve indirect control flow statically routes every block
//! transition through one dispatch switch on the virtual program counter. Execution
//! traces tell which transitions actually happen; this pass turns each of them into a
//! direct edge between specialized copies of the dispatch header and latch, leaving the
//! generic dispatch in place for everything the traces did not cover.
//!
//! # Pipeline
//!
//! 1. [`Pass::initialize`] resolves the configured entry function and VPC global and
//!    merges the trace files. Missing names are configuration errors; an unreadable
//!    trace is skipped unless none could be read.
//! 2. Each loop of the entry function is checked with [`qualify`]. Loops that do not
//!    dispatch on the VPC are ignored; interpretation loops whose header or latch is not
//!    self-contained are skipped with a warning.
//! 3. The first qualifying loop is rewritten edge by edge through a
//!    [`DispatchUntangler`].

mod dispatch;
mod trace;

pub use dispatch::{qualify, DispatchLoop, DispatchUntangler, HeaderLatchPair, Qualification};
pub use trace::{read_traces, write_trace, TraceEdge, TraceSet, TRACE_RECORD_SIZE};

use std::collections::{BTreeMap, HashSet};

use log::{debug, info, warn};

use crate::{
    analysis::LoopInfo,
    compiler::{pass::Pass, EventKind, EventLog},
    config::UntangleConfig,
    ir::{BlockId, Function, GlobalId, Module},
    Result,
};

/// Rewrites the interpretation loop of the entry function from execution traces.
pub struct UntanglePass {
    config: UntangleConfig,
    vpc: Option<GlobalId>,
    traces: TraceSet,
    untangler: DispatchUntangler,
    done: bool,
}

impl UntanglePass {
    /// Creates the pass.
    #[must_use]
    pub fn new(config: UntangleConfig) -> Self {
        Self {
            config,
            vpc: None,
            traces: TraceSet::new(),
            untangler: DispatchUntangler::new(),
            done: false,
        }
    }

    /// The header/latch pairs created so far, by VPC value.
    #[must_use]
    pub fn vpc_map(&self) -> &BTreeMap<u64, HeaderLatchPair> {
        self.untangler.pairs()
    }

    /// The merged traces.
    #[must_use]
    pub fn traces(&self) -> &TraceSet {
        &self.traces
    }

    /// The err block, once created.
    #[must_use]
    pub fn err_block(&self) -> Option<BlockId> {
        self.untangler.err_block()
    }
}

impl Pass for UntanglePass {
    fn name(&self) -> &'static str {
        "untangle-dispatch"
    }

    fn description(&self) -> &'static str {
        "Specializes the interpretation loop into direct edges using execution traces"
    }

    fn should_run(&self, function: &Function) -> bool {
        !self.done && function.name == self.config.entry_function
    }

    fn initialize(&mut self, module: &Module, events: &EventLog) -> Result<()> {
        self.config.validate()?;

        if module.function_by_name(&self.config.entry_function).is_none() {
            return Err(config_error!(
                "entry function '{}' not found in module '{}'",
                self.config.entry_function,
                module.name
            ));
        }
        let vpc = module.global_by_name(&self.config.vpc_global).ok_or_else(|| {
            config_error!(
                "VPC global '{}' not found in module '{}'",
                self.config.vpc_global,
                module.name
            )
        })?;

        self.traces = read_traces(&self.config.trace_files, events)?;
        self.vpc = Some(vpc);
        self.untangler = DispatchUntangler::new();
        self.done = false;
        Ok(())
    }

    fn run_on_loop(
        &mut self,
        module: &mut Module,
        function: usize,
        lp: &LoopInfo,
        events: &EventLog,
    ) -> Result<bool> {
        let Some(vpc) = self.vpc else {
            return Err(config_error!("untangle pass run before initialization"));
        };
        let function = module
            .function_mut(function)
            .ok_or_else(|| malformed_error!("function index {} out of range", function))?;
        if !self.should_run(function) {
            return Ok(false);
        }

        let header = BlockId::from(lp.header);
        let dispatch = match qualify(function, lp, vpc)? {
            Qualification::Qualified(dispatch) => dispatch,
            Qualification::NotDispatch(reason) => {
                debug!("{}: loop at {} not untangled: {}", function.name, header, reason);
                return Ok(false);
            }
            Qualification::Rejected(reason) => {
                warn!("{}: skipping interpretation loop at {}: {}", function.name, header, reason);
                events
                    .record(EventKind::Warning)
                    .at(function.name.clone(), header)
                    .pass(self.name())
                    .message(reason);
                return Ok(false);
            }
        };

        let name = self.name();
        let existing: HashSet<u64> = self.untangler.pairs().keys().copied().collect();
        let mut specialized = 0usize;
        for edge in self.traces.edges() {
            if self.untangler.add_edge(function, &dispatch, *edge)? {
                specialized += 1;
                debug!("{}: direct edge {}", function.name, edge);
                events
                    .record(EventKind::EdgeSpecialized)
                    .at(function.name.clone(), header)
                    .pass(name)
                    .message(edge.to_string());
            }
        }

        let mut created = 0usize;
        for (vpc_value, pair) in self.untangler.pairs() {
            if existing.contains(vpc_value) {
                continue;
            }
            created += 1;
            events
                .record(EventKind::PairCreated)
                .at(function.name.clone(), pair.header)
                .pass(name)
                .message(format!("vpc {:#x}: header {}, latch {}", vpc_value, pair.header, pair.latch));
        }

        if specialized == 0 && created == 0 {
            return Ok(false);
        }

        self.done = true;
        info!(
            "{}: untangled dispatch at {}: {} direct edges, {} header/latch pairs, {} latches",
            function.name,
            header,
            specialized,
            created,
            self.untangler.latch_count()
        );
        events
            .record(EventKind::DispatchUntangled)
            .at(function.name.clone(), header)
            .pass(name)
            .message(format!("{specialized} direct edges, {created} header/latch pairs"));
        Ok(true)
    }
}
