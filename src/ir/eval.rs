//! Reference interpreter for the IR.
//!
//! Executes one function against a scalar model of the module's globals. The transformation
//! passes promise to preserve observable behavior, and this is the observer: the sequence
//! of global stores, external calls and the returned value must be identical before and
//! after a pass runs.
//!
//! Globals are modelled as 64-bit cells initialized from the first eight bytes of their
//! initializer. Calls are not executed; they are recorded with their argument values and
//! yield `0`.

use std::collections::HashMap;

use crate::{
    ir::{BlockId, Function, GlobalId, Module, Op, Terminator, ValueId},
    Error, Result,
};

/// Default bound on executed blocks.
pub const DEFAULT_STEP_LIMIT: usize = 100_000;

/// An observable side effect, in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// A store to a global.
    Store(GlobalId, u64),
    /// A call to an external helper.
    Call(String, Vec<u64>),
}

/// Result of running a function to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    /// Returned value.
    pub result: Option<u64>,
    /// Observable effects.
    pub effects: Vec<Effect>,
    /// Blocks entered, in order.
    pub path: Vec<BlockId>,
}

/// IR interpreter over a module's globals.
#[derive(Debug, Clone)]
pub struct Interpreter {
    globals: HashMap<GlobalId, u64>,
    step_limit: usize,
}

impl Interpreter {
    /// Creates an interpreter with globals initialized from `module`.
    #[must_use]
    pub fn new(module: &Module) -> Self {
        let globals = module
            .globals()
            .iter()
            .map(|global| (global.id, global.initializer.scalar()))
            .collect();
        Self {
            globals,
            step_limit: DEFAULT_STEP_LIMIT,
        }
    }

    /// Sets the maximum number of blocks executed before giving up.
    #[must_use]
    pub fn with_step_limit(mut self, limit: usize) -> Self {
        self.step_limit = limit;
        self
    }

    /// Current value of `global`.
    #[must_use]
    pub fn global(&self, global: GlobalId) -> Option<u64> {
        self.globals.get(&global).copied()
    }

    /// Runs `function` with the given arguments.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] when the function reads an undefined value, reaches an
    /// `unreachable` terminator or a merge node without an input for the incoming edge, and
    /// [`Error::Error`] when the step limit is exceeded.
    pub fn run(&mut self, function: &Function, args: &[u64]) -> Result<Execution> {
        let mut values: HashMap<ValueId, u64> = function
            .params
            .iter()
            .copied()
            .zip(args.iter().copied())
            .collect();
        let mut effects = Vec::new();
        let mut path = Vec::new();
        let mut previous: Option<BlockId> = None;
        let mut current = function.entry;

        loop {
            if path.len() >= self.step_limit {
                return Err(Error::Error(format!(
                    "{}: step limit of {} blocks exceeded",
                    function.name, self.step_limit
                )));
            }
            path.push(current);
            let block = function.try_block(current)?;

            // Merge nodes read their inputs simultaneously.
            let mut incoming = Vec::with_capacity(block.phis.len());
            for phi in &block.phis {
                let pred = previous.ok_or_else(|| {
                    malformed_error!("merge node {} in entry block {}", phi.dest, current)
                })?;
                let source = phi.operand_from(pred).ok_or_else(|| {
                    malformed_error!("merge node {} has no input from {}", phi.dest, pred)
                })?;
                incoming.push((phi.dest, read(&values, source)?));
            }
            values.extend(incoming);

            for op in &block.ops {
                match op {
                    Op::Const { dest, value } => {
                        values.insert(*dest, *value);
                    }
                    Op::Binary {
                        dest,
                        op,
                        left,
                        right,
                    } => {
                        let result = op.apply(read(&values, *left)?, read(&values, *right)?);
                        values.insert(*dest, result);
                    }
                    Op::Load { dest, global } => {
                        let value = self.globals.get(global).copied().ok_or_else(|| {
                            malformed_error!("load from unknown global {}", global)
                        })?;
                        values.insert(*dest, value);
                    }
                    Op::Store { global, value } => {
                        let value = read(&values, *value)?;
                        self.globals.insert(*global, value);
                        effects.push(Effect::Store(*global, value));
                    }
                    Op::Call { dest, callee, args } => {
                        let args = args
                            .iter()
                            .map(|arg| read(&values, *arg))
                            .collect::<Result<Vec<_>>>()?;
                        effects.push(Effect::Call(callee.clone(), args));
                        if let Some(dest) = dest {
                            values.insert(*dest, 0);
                        }
                    }
                    Op::BlockAddress { dest, block } => {
                        values.insert(*dest, block.index() as u64);
                    }
                    Op::Copy { dest, src } => {
                        let value = read(&values, *src)?;
                        values.insert(*dest, value);
                    }
                }
            }

            let next = match &block.terminator {
                Terminator::Jump { target } => *target,
                Terminator::Branch {
                    condition,
                    true_target,
                    false_target,
                } => {
                    if read(&values, *condition)? != 0 {
                        *true_target
                    } else {
                        *false_target
                    }
                }
                Terminator::Switch {
                    value,
                    cases,
                    default,
                } => {
                    let value = read(&values, *value)?;
                    cases
                        .iter()
                        .find(|case| case.value == value)
                        .map_or(*default, |case| case.target)
                }
                Terminator::IndirectJump { address, targets } => {
                    let address = read(&values, *address)?;
                    targets
                        .iter()
                        .copied()
                        .find(|target| target.index() as u64 == address)
                        .ok_or_else(|| {
                            malformed_error!("indirect jump to {:#x} outside its target list", address)
                        })?
                }
                Terminator::Return { value } => {
                    let result = match value {
                        Some(value) => Some(read(&values, *value)?),
                        None => None,
                    };
                    return Ok(Execution {
                        result,
                        effects,
                        path,
                    });
                }
                Terminator::Unreachable => {
                    return Err(malformed_error!("reached unreachable in {}", current));
                }
            };

            previous = Some(current);
            current = next;
        }
    }
}

fn read(values: &HashMap<ValueId, u64>, value: ValueId) -> Result<u64> {
    values
        .get(&value)
        .copied()
        .ok_or_else(|| malformed_error!("use of undefined value {}", value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FunctionBuilder, Initializer};

    #[test]
    fn test_counting_loop_result() {
        let mut module = Module::new("m");
        let counter = module.add_global("counter", Initializer::Zero(8));
        let func = FunctionBuilder::new("count", 1).build_with(|f| {
            let n = f.param(0);
            let zero = f.block(0, "entry", |b| {
                let zero = b.constant(0);
                b.jump(1);
                zero
            });
            let i = f.block(1, "header", |b| {
                let i = b.phi(&[(zero, 0)]);
                let more = b.ult(i, n);
                b.branch(more, 2, 3);
                i
            });
            let next = f.block(2, "body", |b| {
                let one = b.constant(1);
                let next = b.add(i, one);
                b.store(counter, next);
                b.jump(1);
                next
            });
            f.phi_input(1, i, next, 2);
            f.block(3, "exit", |b| b.ret(Some(i)));
        });

        let mut interp = Interpreter::new(&module);
        let run = interp.run(&func, &[3]).unwrap();
        assert_eq!(run.result, Some(3));
        assert_eq!(run.effects.len(), 3);
        assert_eq!(interp.global(counter), Some(3));
    }

    #[test]
    fn test_step_limit() {
        let module = Module::new("m");
        let func = FunctionBuilder::new("spin", 0).build_with(|f| {
            f.block(0, "entry", |b| b.jump(0));
        });
        let mut interp = Interpreter::new(&module).with_step_limit(10);
        assert!(interp.run(&func, &[]).is_err());
    }
}
