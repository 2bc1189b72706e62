//! Integration tests for the structural loop unroller driven through the pass scheduler.

use binlift::{
    analysis::CfgView,
    compiler::{unroll_loop, EventKind, EventLog, PassScheduler, UnrollError},
    config::{PipelineConfig, UnrollConfig},
    ir::{Function, FunctionBuilder, Interpreter, Module},
    Error, Result,
};

/// Returns `x` after `x = x * 3 + 1` ran `n` times, with the update split over two blocks.
///
/// ```text
/// entry -> head(i, x; i < n ? step : done)
/// step: t = x * 3 -> tail: x' = t + 1, i' = i + 1 -> head
/// ```
fn affine_loop() -> Function {
    FunctionBuilder::new("affine", 1).build_with(|f| {
        let n = f.param(0);
        let (i, x) = f.block(1, "head", |b| {
            let i = b.phi(&[]);
            let x = b.phi(&[]);
            let cond = b.ult(i, n);
            b.branch(cond, 2, 4);
            (i, x)
        });
        let t = f.block(2, "step", |b| {
            let three = b.constant(3);
            let t = b.binary(binlift::ir::BinaryOp::Mul, x, three);
            b.jump(3);
            t
        });
        let (i_next, x_next) = f.block(3, "tail", |b| {
            let one = b.constant(1);
            let x_next = b.add(t, one);
            let i_next = b.add(i, one);
            b.jump(1);
            (i_next, x_next)
        });
        let zero = f.block(0, "entry", |b| {
            let zero = b.constant(0);
            b.jump(1);
            zero
        });
        f.block(4, "done", |b| {
            let out = b.phi(&[(x, 1)]);
            b.ret(Some(out));
        });
        f.phi_input(1, i, zero, 0);
        f.phi_input(1, x, zero, 0);
        f.phi_input(1, i, i_next, 3);
        f.phi_input(1, x, x_next, 3);
    })
}

fn expected(n: u64) -> u64 {
    (0..n).fold(0u64, |x, _| x.wrapping_mul(3).wrapping_add(1))
}

fn module_with(function: Function) -> Module {
    let mut module = Module::new("m");
    module.add_function(function);
    module
}

fn evaluate(module: &Module, n: u64) -> Result<Option<u64>> {
    Ok(Interpreter::new(module).run(&module.functions()[0], &[n])?.result)
}

/// Unrolling through the pipeline keeps every trip count's result.
#[test]
fn test_pipeline_unroll_preserves_values() -> Result<()> {
    for count in [2, 3, 5] {
        let mut module = module_with(affine_loop());
        let config = PipelineConfig::new().with_unroll(UnrollConfig::new(count, "head"));
        let events = EventLog::new();

        assert!(PassScheduler::from_config(&config)?.run(&mut module, &events)?);
        assert_eq!(events.count_kind(EventKind::LoopUnrolled), 1);

        let function = &module.functions()[0];
        function.verify()?;
        assert_eq!(function.block_count(), 5 + 3 * (count - 1));
        for it in 1..count {
            assert!(function.block_by_label(&format!("step.{it}")).is_some());
        }

        for n in 0..12 {
            assert_eq!(evaluate(&module, n)?, Some(expected(n)), "count {count}, n {n}");
        }
    }
    Ok(())
}

/// The unrolled copies are not unrolled again within the same run.
#[test]
fn test_unrolled_loop_offered_once() -> Result<()> {
    let mut module = module_with(affine_loop());
    let config = PipelineConfig::new().with_unroll(UnrollConfig::new(2, "head"));
    let events = EventLog::new();
    PassScheduler::from_config(&config)?.run(&mut module, &events)?;

    assert_eq!(events.count_kind(EventKind::LoopUnrolled), 1);
    assert!(module.functions()[0].block_by_label("head.1.1").is_none());
    Ok(())
}

/// A loop whose latch ends in a branch is reported and left untouched.
#[test]
fn test_precondition_failure_leaves_loop() -> Result<()> {
    let function = FunctionBuilder::new("dowhile", 1).build_with(|f| {
        let n = f.param(0);
        let i = f.block(1, "body", |b| {
            let i = b.phi(&[]);
            b.jump(2);
            i
        });
        let next = f.block(2, "check", |b| {
            let one = b.constant(1);
            let next = b.add(i, one);
            let cond = b.ult(next, n);
            b.branch(cond, 1, 3);
            next
        });
        let zero = f.block(0, "entry", |b| {
            let zero = b.constant(0);
            b.jump(1);
            zero
        });
        f.block(3, "done", |b| b.ret(Some(next)));
        f.phi_input(1, i, zero, 0);
        f.phi_input(1, i, next, 2);
    });
    let mut module = module_with(function);
    let before = module.clone();

    let config = PipelineConfig::new().with_unroll(UnrollConfig::new(4, "body"));
    let events = EventLog::new();
    assert!(!PassScheduler::from_config(&config)?.run(&mut module, &events)?);
    assert_eq!(module, before);
    assert_eq!(events.count_kind(EventKind::PreconditionFailed), 1);

    let mut function = module.functions()[0].clone();
    let header = function.block_by_label("body").expect("body");
    let lp = CfgView::new(&function)
        .loops()
        .loop_for_header(header.into())
        .cloned()
        .expect("loop");
    assert!(matches!(
        unroll_loop(&mut function, &lp, 4),
        Err(UnrollError::LatchNotUnconditional(_))
    ));
    Ok(())
}

/// A zero count is rejected before the pipeline starts.
#[test]
fn test_zero_count_is_config_error() {
    let config = PipelineConfig::new().with_unroll(UnrollConfig::new(0, "head"));
    assert!(matches!(
        PassScheduler::from_config(&config),
        Err(Error::Config(_))
    ));
}
