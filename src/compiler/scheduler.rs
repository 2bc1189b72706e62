//! Pass scheduler for orchestrating the transformation pipeline.
//!
//! The `PassScheduler` runs passes in a fixed order. Module passes run once; loop
//! passes are offered the natural loops of every function, innermost first, with the
//! loop forest recomputed after each change.

use std::collections::HashSet;

use log::{debug, warn};

use crate::{
    analysis::CfgView,
    compiler::{
        pass::Pass, EmbedSectionsPass, EventKind, EventLog, UnrollPass, UntanglePass,
    },
    config::{PipelineConfig, DEFAULT_MAX_ITERATIONS},
    ir::Module,
    utils::graph::NodeId,
    Result,
};

/// Orchestrates pass execution over a module.
///
/// Passes run in insertion order. Every pass is initialized before the first one
/// runs, so a configuration problem in a late stage is reported before an early stage
/// has mutated the module.
pub struct PassScheduler {
    /// Maximum number of loops offered to a pass per function.
    max_iterations: usize,
    /// The passes, in execution order.
    passes: Vec<Box<dyn Pass>>,
}

impl Default for PassScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ITERATIONS)
    }
}

impl PassScheduler {
    /// Creates an empty scheduler.
    ///
    /// # Arguments
    ///
    /// * `max_iterations` - Maximum number of loops offered to a loop pass per function.
    #[must_use]
    pub fn new(max_iterations: usize) -> Self {
        Self {
            max_iterations,
            passes: Vec::new(),
        }
    }

    /// Builds the standard pipeline: sections → unroll → untangle, each stage only if
    /// configured.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] if the configuration is invalid.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        config.validate()?;

        let mut scheduler = Self::new(config.max_iterations);
        if config.sections {
            scheduler.add(EmbedSectionsPass::new());
        }
        if let Some(unroll) = &config.unroll {
            scheduler.add(UnrollPass::new(unroll.clone()));
        }
        if let Some(untangle) = &config.untangle {
            scheduler.add(UntanglePass::new(untangle.clone()));
        }
        Ok(scheduler)
    }

    /// Appends a pass.
    pub fn add<P: Pass + 'static>(&mut self, pass: P) -> &mut Self {
        self.passes.push(Box::new(pass));
        self
    }

    /// Names of the scheduled passes, in order.
    #[must_use]
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Number of scheduled passes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    /// Returns `true` if no pass is scheduled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Runs every pass over `module`.
    ///
    /// # Returns
    ///
    /// `true` if any pass changed the module.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a pass. Initialization errors are raised before
    /// any pass has run.
    pub fn run(&mut self, module: &mut Module, events: &EventLog) -> Result<bool> {
        for pass in &mut self.passes {
            pass.initialize(module, events)?;
        }

        let max_iterations = self.max_iterations;
        let mut any_changed = false;

        for pass in &mut self.passes {
            let name = pass.name();
            debug!("running pass {name}");
            events
                .record(EventKind::PassStarted)
                .pass(name)
                .message(pass.description());

            let outcome = if pass.is_global() {
                pass.run_on_module(module, events)
            } else {
                Self::run_on_loops(pass.as_mut(), module, events, max_iterations)
            };
            let changed = match outcome {
                Ok(changed) => changed,
                Err(error) => {
                    events.error(format!("{name}: {error}"));
                    return Err(error);
                }
            };

            events
                .record(EventKind::PassCompleted)
                .pass(name)
                .message(if changed { "changed" } else { "unchanged" });
            any_changed |= changed;
        }

        for pass in &mut self.passes {
            pass.finalize(module, events)?;
        }

        Ok(any_changed)
    }

    /// Offers every loop of every function to `pass`.
    ///
    /// Loops are taken innermost first. A header is offered at most once per function,
    /// and the forest is recomputed whenever the pass reports a change, since blocks
    /// may have been added or retargeted.
    fn run_on_loops(
        pass: &mut dyn Pass,
        module: &mut Module,
        events: &EventLog,
        max_iterations: usize,
    ) -> Result<bool> {
        let mut any_changed = false;

        for index in 0..module.functions().len() {
            let mut offered: HashSet<NodeId> = HashSet::new();
            let mut cached = None;
            let mut remaining = max_iterations;

            loop {
                let Some(function) = module.function(index) else {
                    break;
                };
                if !pass.should_run(function) {
                    break;
                }

                let forest = cached.get_or_insert_with(|| CfgView::new(function).loops());
                let Some(lp) = forest
                    .by_depth_descending()
                    .into_iter()
                    .find(|lp| !offered.contains(&lp.header))
                    .cloned()
                else {
                    break;
                };

                if remaining == 0 {
                    let message = format!(
                        "{}: loop limit of {} reached, remaining loops skipped",
                        function.name, max_iterations
                    );
                    warn!("{message}");
                    events
                        .record(EventKind::Warning)
                        .function(function.name.clone())
                        .pass(pass.name())
                        .message(message);
                    break;
                }
                remaining -= 1;
                offered.insert(lp.header);

                if pass.run_on_loop(module, index, &lp, events)? {
                    any_changed = true;
                    cached = None;
                }
            }
        }

        Ok(any_changed)
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;
    use crate::{
        analysis::LoopInfo,
        config::{UnrollConfig, UntangleConfig},
        ir::{BlockId, FunctionBuilder},
    };

    /// Records lifecycle calls and offered headers; claims a change for the first loop.
    #[derive(Default, Clone)]
    struct Recorder {
        log: Rc<RefCell<Vec<String>>>,
    }

    impl Recorder {
        fn entries(&self) -> Vec<String> {
            self.log.borrow().clone()
        }
    }

    impl Pass for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        fn run_on_loop(
            &mut self,
            _module: &mut Module,
            _function: usize,
            lp: &LoopInfo,
            _events: &EventLog,
        ) -> Result<bool> {
            let mut log = self.log.borrow_mut();
            log.push(format!("loop {}", BlockId::from(lp.header)));
            Ok(log.len() == 2)
        }

        fn initialize(&mut self, _module: &Module, _events: &EventLog) -> Result<()> {
            self.log.borrow_mut().push("init".into());
            Ok(())
        }

        fn finalize(&mut self, _module: &Module, _events: &EventLog) -> Result<()> {
            self.log.borrow_mut().push("fini".into());
            Ok(())
        }
    }

    fn nested_loops() -> Module {
        // 0 -> 1 (outer header) -> 2 (inner header) -> 3 -> 2 | 4 -> 1 | 5
        let function = FunctionBuilder::new("main", 0).build_with(|f| {
            f.block(0, "entry", |b| b.jump(1));
            f.block(1, "outer", |b| b.jump(2));
            f.block(2, "inner", |b| b.jump(3));
            f.block(3, "inner.body", |b| {
                let c = b.constant(1);
                b.branch(c, 2, 4);
            });
            f.block(4, "outer.latch", |b| {
                let c = b.constant(0);
                b.branch(c, 1, 5);
            });
            f.block(5, "exit", |b| b.ret(None));
        });
        let mut module = Module::new("m");
        module.add_function(function);
        module
    }

    #[test]
    fn test_lifecycle_and_order() {
        let mut module = nested_loops();
        let events = EventLog::new();
        let recorder = Recorder::default();

        let mut scheduler = PassScheduler::default();
        scheduler.add(recorder.clone());
        let changed = scheduler.run(&mut module, &events).unwrap();

        assert!(changed);
        assert_eq!(recorder.entries(), vec!["init", "loop bb2", "loop bb1", "fini"]);
        assert!(events.has(EventKind::PassStarted));
        assert_eq!(events.count_kind(EventKind::PassCompleted), 1);
    }

    #[test]
    fn test_iteration_limit() {
        let mut module = nested_loops();
        let events = EventLog::new();
        let mut recorder = Recorder::default();

        PassScheduler::run_on_loops(&mut recorder, &mut module, &events, 1).unwrap();
        assert_eq!(recorder.entries(), vec!["loop bb2"]);
        assert_eq!(events.count_kind(EventKind::Warning), 1);
    }

    struct Failing;

    impl Pass for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn is_global(&self) -> bool {
            true
        }

        fn run_on_module(&mut self, _module: &mut Module, _events: &EventLog) -> Result<bool> {
            Err(crate::Error::Section("broken".into()))
        }
    }

    #[test]
    fn test_pass_failure_recorded() {
        let mut module = nested_loops();
        let events = EventLog::new();
        let recorder = Recorder::default();

        let mut scheduler = PassScheduler::default();
        scheduler.add(Failing).add(recorder.clone());
        let result = scheduler.run(&mut module, &events);

        assert!(matches!(result, Err(crate::Error::Section(_))));
        assert_eq!(events.count_kind(EventKind::Error), 1);
        assert!(!events.has(EventKind::PassCompleted));
        assert_eq!(recorder.entries(), vec!["init"]);
    }

    #[test]
    fn test_from_config_order() {
        let config = PipelineConfig::new()
            .with_sections(true)
            .with_untangle(UntangleConfig::new("main", "vpc"))
            .with_unroll(UnrollConfig::new(2, "dispatch"));
        let scheduler = PassScheduler::from_config(&config).unwrap();
        assert_eq!(
            scheduler.pass_names(),
            vec!["embed-sections", "loop-unroll", "untangle-dispatch"]
        );
        assert_eq!(scheduler.len(), 3);
    }

    #[test]
    fn test_from_config_invalid() {
        let config = PipelineConfig::new().with_unroll(UnrollConfig::new(0, "dispatch"));
        assert!(PassScheduler::from_config(&config).is_err());
        assert!(PassScheduler::default().is_empty());
    }
}
