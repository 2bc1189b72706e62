use std::path::PathBuf;

use anyhow::Context;
use binlift::compiler::{read_traces, EventLog};
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    output::{print_output, Align, TabWriter},
};

#[derive(Debug, Serialize)]
struct EdgeOutput {
    predecessor: String,
    successor: String,
}

#[derive(Debug, Serialize)]
struct TraceSummary {
    files_read: usize,
    files_failed: Vec<String>,
    records: usize,
    distinct_edges: usize,
    distinct_successors: usize,
    skipped_bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    edges: Option<Vec<EdgeOutput>>,
}

pub fn run(paths: &[PathBuf], show_edges: bool, opts: &GlobalOptions) -> anyhow::Result<()> {
    let traces = read_traces(paths, &EventLog::new()).context("failed to read traces")?;

    let summary = TraceSummary {
        files_read: traces.files_read,
        files_failed: traces
            .files_failed
            .iter()
            .map(|p| p.display().to_string())
            .collect(),
        records: traces.records,
        distinct_edges: traces.len(),
        distinct_successors: traces.successors().len(),
        skipped_bytes: traces.skipped_bytes,
        edges: show_edges.then(|| {
            traces
                .edges()
                .iter()
                .map(|edge| EdgeOutput {
                    predecessor: format!("{:#x}", edge.predecessor),
                    successor: format!("{:#x}", edge.successor),
                })
                .collect()
        }),
    };

    print_output(&summary, opts, |s| {
        println!("Files:        {} read, {} failed", s.files_read, s.files_failed.len());
        println!("Records:      {}", s.records);
        println!("Edges:        {} distinct", s.distinct_edges);
        println!("Successors:   {} distinct", s.distinct_successors);
        if s.skipped_bytes > 0 {
            println!("Skipped:      {} trailing bytes", s.skipped_bytes);
        }
        if let Some(edges) = &s.edges {
            println!();
            let mut table =
                TabWriter::new(&[("From", Align::Right), ("To", Align::Right)]).indent("  ");
            for edge in edges {
                table.row(vec![edge.predecessor.clone(), edge.successor.clone()]);
            }
            table.print();
        }
    })
}
