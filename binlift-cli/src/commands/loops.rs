use std::path::Path;

use anyhow::bail;
use binlift::{analysis::CfgView, ir::BlockId};
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    commands::common::load_module,
    output::{print_output, Align, TabWriter},
};

#[derive(Debug, Serialize)]
struct LoopOutput {
    header: String,
    loop_type: String,
    depth: usize,
    size: usize,
    preheader: Option<String>,
    latches: Vec<String>,
    exits: Vec<String>,
}

#[derive(Debug, Serialize)]
struct FunctionLoops {
    function: String,
    block_count: usize,
    loops: Vec<LoopOutput>,
}

pub fn run(path: &Path, function: Option<&str>, opts: &GlobalOptions) -> anyhow::Result<()> {
    let module = load_module(path)?;

    let functions: Vec<_> = module
        .functions()
        .iter()
        .filter(|f| function.map_or(true, |name| f.name == name))
        .collect();
    if functions.is_empty() {
        if let Some(name) = function {
            bail!("function '{name}' not found in module '{}'", module.name);
        }
    }

    let output: Vec<FunctionLoops> = functions
        .into_iter()
        .map(|function| {
            let label = |id: BlockId| {
                function
                    .block(id)
                    .map_or_else(|| id.to_string(), |b| b.label.clone())
            };
            let forest = CfgView::new(function).loops();
            let loops = forest
                .iter()
                .map(|lp| LoopOutput {
                    header: label(BlockId::from(lp.header)),
                    loop_type: format!("{:?}", lp.loop_type),
                    depth: lp.depth,
                    size: lp.size(),
                    preheader: lp.preheader.map(|p| label(BlockId::from(p))),
                    latches: lp.latches.iter().map(|&l| label(BlockId::from(l))).collect(),
                    exits: lp.exit_blocks().map(|e| label(BlockId::from(e))).collect(),
                })
                .collect();
            FunctionLoops {
                function: function.name.clone(),
                block_count: function.block_count(),
                loops,
            }
        })
        .collect();

    print_output(&output, opts, |functions| {
        for f in functions {
            println!("{} ({} blocks, {} loops)", f.function, f.block_count, f.loops.len());
            if f.loops.is_empty() {
                continue;
            }
            let mut table = TabWriter::new(&[
                ("Header", Align::Left),
                ("Type", Align::Left),
                ("Depth", Align::Right),
                ("Blocks", Align::Right),
                ("Preheader", Align::Left),
                ("Latches", Align::Left),
                ("Exits", Align::Left),
            ])
            .indent("  ");
            for lp in &f.loops {
                table.row(vec![
                    lp.header.clone(),
                    lp.loop_type.clone(),
                    lp.depth.to_string(),
                    lp.size.to_string(),
                    lp.preheader.clone().unwrap_or_else(|| "-".to_string()),
                    lp.latches.join(","),
                    lp.exits.join(","),
                ]);
            }
            table.print();
        }
    })
}
