use std::path::{Path, PathBuf};

use anyhow::Context;
use binlift::{
    compiler::{EventKind, EventLog, PassScheduler},
    config::{require_single, PipelineConfig, UnrollConfig, UntangleConfig},
};
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    commands::common::{file_display_name, load_module, save_module},
};

pub struct RunOptions<'a> {
    pub output: Option<&'a Path>,
    pub sections: bool,
    pub source: Option<&'a Path>,
    pub entry: &'a [String],
    pub vpc: &'a [String],
    pub traces: &'a [PathBuf],
    pub unroll: &'a [usize],
    pub unroll_header: &'a [String],
    pub max_iterations: Option<usize>,
    pub report: Option<&'a Path>,
    pub global: &'a GlobalOptions,
}

#[derive(Debug, Serialize)]
struct EventReport {
    kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pass: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    block: Option<String>,
    message: String,
}

#[derive(Debug, Serialize)]
struct RunReport {
    module: String,
    output: String,
    passes: Vec<String>,
    changed: bool,
    sections_embedded: usize,
    loops_unrolled: usize,
    edges_specialized: usize,
    pairs_created: usize,
    warnings: Vec<String>,
    events: Vec<EventReport>,
}

/// Builds the pipeline configuration from repeated command line flags.
///
/// A stage is enabled as soon as any of its flags is present; its scalar options must
/// then be given exactly once.
fn build_config(opts: &RunOptions) -> binlift::Result<PipelineConfig> {
    let mut config = PipelineConfig::new().with_sections(opts.sections);

    if !opts.entry.is_empty() || !opts.vpc.is_empty() || !opts.traces.is_empty() {
        let entry = require_single("--entry", opts.entry)?;
        let vpc = require_single("--vpc", opts.vpc)?;
        config = config
            .with_untangle(UntangleConfig::new(entry, vpc).with_traces(opts.traces.iter().cloned()));
    }

    if !opts.unroll.is_empty() || !opts.unroll_header.is_empty() {
        let count = require_single("--unroll", opts.unroll)?;
        let header = require_single("--unroll-header", opts.unroll_header)?;
        config = config.with_unroll(UnrollConfig::new(count, header));
    }

    if let Some(max) = opts.max_iterations {
        config = config.with_max_iterations(max);
    }

    config.validate()?;
    Ok(config)
}

pub fn run(path: &Path, opts: &RunOptions) -> anyhow::Result<()> {
    let config = build_config(opts).context("invalid pipeline configuration")?;
    let mut scheduler = PassScheduler::from_config(&config)?;
    if scheduler.is_empty() {
        anyhow::bail!("nothing to do: enable --sections, --entry/--vpc/--trace or --unroll");
    }

    let mut module = load_module(path)?;
    if let Some(source) = opts.source {
        module.source_path = Some(source.to_path_buf());
    }

    let events = EventLog::new();
    let changed = scheduler
        .run(&mut module, &events)
        .with_context(|| format!("pipeline failed on {}", path.display()))?;

    save_module(&module, path, opts.output)?;
    let output_path = opts.output.unwrap_or(path);

    let report = RunReport {
        module: module.name.clone(),
        output: output_path.display().to_string(),
        passes: scheduler.pass_names().iter().map(ToString::to_string).collect(),
        changed,
        sections_embedded: events.count_kind(EventKind::SectionEmbedded),
        loops_unrolled: events.count_kind(EventKind::LoopUnrolled),
        edges_specialized: events.count_kind(EventKind::EdgeSpecialized),
        pairs_created: events.count_kind(EventKind::PairCreated),
        warnings: events.warnings().map(|e| e.message.clone()).collect(),
        events: events
            .iter()
            .map(|event| EventReport {
                kind: event.kind.description().to_string(),
                pass: event.pass.clone(),
                function: event.function.clone(),
                block: event.block.map(|b| b.to_string()),
                message: event.message.clone(),
            })
            .collect(),
    };

    if let Some(report_file) = opts.report {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(report_file, json)
            .with_context(|| format!("failed to write report: {}", report_file.display()))?;
        eprintln!("Report written to {}", report_file.display());
    }

    if opts.global.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        eprintln!(
            "Pipeline complete: {} -> {}",
            file_display_name(path),
            file_display_name(output_path)
        );
        eprintln!("  Passes:      {}", report.passes.join(", "));
        eprintln!("  Changes:     {}", events.summary());
        if !report.warnings.is_empty() {
            eprintln!("  Warnings:    {}", report.warnings.len());
            for w in &report.warnings {
                eprintln!("    - {w}");
            }
        }
    }

    Ok(())
}
