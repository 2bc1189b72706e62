//! Execution trace files.
//!
//! A trace is a flat sequence of 8-byte records, one per observed control transfer
//! between emulated blocks:
//!
//! ```text
//! offset  size  field
//! 0       4     successor_pc    (u32, little endian)
//! 4       4     predecessor_pc  (u32, little endian)
//! ```
//!
//! Several trace files are merged into one edge list; an edge seen in an earlier file
//! (or earlier in the same file) is not repeated.

use std::{
    collections::HashSet,
    fmt,
    io::Write,
    path::{Path, PathBuf},
};

use log::{debug, warn};

use crate::{
    compiler::{EventKind, EventLog},
    file::SourceBinary,
    Result,
};

/// Size of one trace record in bytes.
pub const TRACE_RECORD_SIZE: usize = 8;

/// An observed VPC transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TraceEdge {
    /// Address of the block control left.
    pub predecessor: u32,
    /// Address of the block control entered.
    pub successor: u32,
}

impl TraceEdge {
    /// Creates an edge.
    #[must_use]
    pub const fn new(predecessor: u32, successor: u32) -> Self {
        Self {
            predecessor,
            successor,
        }
    }

    fn from_record(record: &[u8]) -> Option<Self> {
        let successor = u32::from_le_bytes(record.get(0..4)?.try_into().ok()?);
        let predecessor = u32::from_le_bytes(record.get(4..8)?.try_into().ok()?);
        Some(Self {
            predecessor,
            successor,
        })
    }

    fn to_record(self) -> [u8; TRACE_RECORD_SIZE] {
        let mut record = [0u8; TRACE_RECORD_SIZE];
        record[0..4].copy_from_slice(&self.successor.to_le_bytes());
        record[4..8].copy_from_slice(&self.predecessor.to_le_bytes());
        record
    }
}

impl fmt::Display for TraceEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x} -> {:#x}", self.predecessor, self.successor)
    }
}

/// A deduplicated set of edges in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct TraceSet {
    edges: Vec<TraceEdge>,
    seen: HashSet<TraceEdge>,
    /// Records encountered, duplicates included.
    pub records: usize,
    /// Trailing bytes that did not form a whole record.
    pub skipped_bytes: usize,
    /// Files that were read successfully.
    pub files_read: usize,
    /// Files that could not be read.
    pub files_failed: Vec<PathBuf>,
}

impl TraceSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `edge`; returns `false` if it was already present.
    pub fn insert(&mut self, edge: TraceEdge) -> bool {
        if self.seen.insert(edge) {
            self.edges.push(edge);
            true
        } else {
            false
        }
    }

    /// Adds every whole record in `bytes` and returns the number of trailing bytes
    /// that were ignored.
    pub fn add_bytes(&mut self, bytes: &[u8]) -> usize {
        let chunks = bytes.chunks_exact(TRACE_RECORD_SIZE);
        let remainder = chunks.remainder().len();
        for record in chunks {
            if let Some(edge) = TraceEdge::from_record(record) {
                self.records += 1;
                self.insert(edge);
            }
        }
        self.skipped_bytes += remainder;
        remainder
    }

    /// Maps and merges the trace file at `path`.
    ///
    /// An empty file counts as read and contributes no edges.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::FileError`] if the file cannot be opened or mapped.
    pub fn add_file(&mut self, path: &Path) -> Result<usize> {
        let remainder = if std::fs::metadata(path)?.len() == 0 {
            0
        } else {
            let trace = SourceBinary::from_file(path)?;
            self.add_bytes(trace.data())
        };
        self.files_read += 1;
        Ok(remainder)
    }

    /// The edges, in first-seen order.
    #[must_use]
    pub fn edges(&self) -> &[TraceEdge] {
        &self.edges
    }

    /// Number of distinct edges.
    #[must_use]
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Returns `true` if no edge was read.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Distinct successor addresses, in first-seen order.
    #[must_use]
    pub fn successors(&self) -> Vec<u32> {
        let mut seen = HashSet::new();
        self.edges
            .iter()
            .filter(|edge| seen.insert(edge.successor))
            .map(|edge| edge.successor)
            .collect()
    }
}

/// Reads and merges `paths` in order.
///
/// A file that cannot be read is logged, recorded as a skipped trace, and left out; so is
/// a truncated trailing record.
///
/// # Errors
///
/// Returns [`crate::Error::Trace`] if not a single file could be read.
pub fn read_traces(paths: &[PathBuf], events: &EventLog) -> Result<TraceSet> {
    let mut traces = TraceSet::new();

    for path in paths {
        match traces.add_file(path) {
            Ok(0) => {}
            Ok(remainder) => {
                let message = format!(
                    "{}: ignoring truncated trailing record ({} bytes)",
                    path.display(),
                    remainder
                );
                warn!("{message}");
                events
                    .record(EventKind::TraceRecordSkipped)
                    .message(message);
            }
            Err(error) => {
                let message = format!("{}: cannot read trace: {}", path.display(), error);
                warn!("{message}");
                events
                    .record(EventKind::TraceRecordSkipped)
                    .message(message);
                traces.files_failed.push(path.clone());
            }
        }
    }

    if traces.files_read == 0 {
        return Err(crate::Error::Trace(if paths.is_empty() {
            "no trace files given".to_string()
        } else {
            format!("none of the {} trace files could be read", paths.len())
        }));
    }

    debug!(
        "read {} trace records ({} distinct edges) from {} files",
        traces.records,
        traces.len(),
        traces.files_read
    );
    Ok(traces)
}

/// Writes `edges` in the trace record format.
///
/// # Errors
///
/// Returns [`crate::Error::FileError`] if writing fails.
pub fn write_trace<W: Write>(writer: &mut W, edges: &[TraceEdge]) -> Result<()> {
    for edge in edges {
        writer.write_all(&edge.to_record())?;
    }
    Ok(())
}
