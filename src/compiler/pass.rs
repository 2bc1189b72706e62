//! The pass interface shared by every transformation of the pipeline.
//!
//! Passes come in two shapes. Module passes (sections embedding) see the whole
//! module once. Loop passes (unrolling, untangling) are handed one natural loop at a
//! time by the [`crate::compiler::PassScheduler`], which owns loop discovery and
//! makes sure a header is offered at most once per run.

use crate::{
    analysis::LoopInfo,
    compiler::EventLog,
    ir::{Function, Module},
    Result,
};

/// A transformation run by the [`crate::compiler::PassScheduler`].
///
/// Unlike analyses, passes may keep state across invocations (the untangler's
/// header/latch memo lives in the pass instance), so every entry point takes
/// `&mut self`.
///
/// # Lifecycle
///
/// 1. [`Pass::initialize`] once, before anything is mutated. Configuration problems
///    must be reported here.
/// 2. Either [`Pass::run_on_module`] (when [`Pass::is_global`]) or
///    [`Pass::run_on_loop`] for every loop of every function accepted by
///    [`Pass::should_run`].
/// 3. [`Pass::finalize`] once.
pub trait Pass {
    /// Unique name for logging and events.
    fn name(&self) -> &'static str;

    /// Does this pass operate on the module as a whole?
    ///
    /// Global passes have [`Pass::run_on_module`] called instead of being handed
    /// loops.
    fn is_global(&self) -> bool {
        false
    }

    /// Should the scheduler look for loops in `function` at all?
    fn should_run(&self, _function: &Function) -> bool {
        true
    }

    /// Run on the entire module.
    ///
    /// Returns `true` if the module changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the module could not be processed.
    fn run_on_module(&mut self, _module: &mut Module, _events: &EventLog) -> Result<bool> {
        Ok(false)
    }

    /// Run on one loop of the function at `function` in `module`.
    ///
    /// The loop description is only valid for the CFG it was computed on; a pass that
    /// changes the function returns `true` so the scheduler recomputes the forest
    /// before offering the next loop.
    ///
    /// # Errors
    ///
    /// Returns an error if the IR is inconsistent. A loop the pass does not apply to
    /// is not an error: return `Ok(false)`.
    fn run_on_loop(
        &mut self,
        _module: &mut Module,
        _function: usize,
        _lp: &LoopInfo,
        _events: &EventLog,
    ) -> Result<bool> {
        Ok(false)
    }

    /// Called once before the pass runs.
    ///
    /// # Errors
    ///
    /// Returns an error (usually [`crate::Error::Config`]) if the pass cannot run on
    /// this module.
    fn initialize(&mut self, _module: &Module, _events: &EventLog) -> Result<()> {
        Ok(())
    }

    /// Called once after the pass completes.
    ///
    /// # Errors
    ///
    /// Returns an error if cleanup fails.
    fn finalize(&mut self, _module: &Module, _events: &EventLog) -> Result<()> {
        Ok(())
    }

    /// Human readable description.
    fn description(&self) -> &'static str {
        "No description available"
    }
}
