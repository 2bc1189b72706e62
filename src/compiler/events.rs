//! Event logging for the transformation pipeline.
//!
//! Every pass records what it did (sections embedded, loops unrolled, dispatch edges
//! specialized) and what it declined to do (failed preconditions, skipped trace records).
//! Events complement the `log` output: logging is for humans watching a run, the event log
//! is for callers that want to inspect or summarize a run afterwards.
//!
//! # Architecture
//!
//! - [`Event`] - A single recorded event
//! - [`EventLog`] - Append-only collection with query and summary helpers
//! - [`EventBuilder`] - Fluent API; the event is pushed when the builder is dropped
//!
//! Recording only needs `&EventLog`: the log is backed by `boxcar::Vec`, so passes can take a
//! shared reference alongside a mutable borrow of the module.
//!
//! # Example
//!
//! ```rust,ignore
//! use binlift::compiler::{EventLog, EventKind};
//!
//! let log = EventLog::new();
//! log.record(EventKind::LoopUnrolled)
//!     .at("main", header)
//!     .message("unrolled dispatch 4 times");
//! log.warn("trace.bin: 3 trailing bytes ignored");
//! println!("{}", log.summary());
//! ```

use std::{collections::HashMap, fmt};

use crate::ir::BlockId;

/// What an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A section's contents were embedded as a global.
    SectionEmbedded,
    /// A section record was written to the side-table.
    SectionRecorded,
    /// A loop was unrolled.
    LoopUnrolled,
    /// An interpretation loop was rewritten from traces.
    DispatchUntangled,
    /// One traced VPC transition became a direct edge.
    EdgeSpecialized,
    /// A header/latch pair was created for a VPC value.
    PairCreated,
    /// A transformation was skipped because a precondition did not hold.
    PreconditionFailed,
    /// A malformed trace record or unreadable trace file was skipped.
    TraceRecordSkipped,
    /// A pass started.
    PassStarted,
    /// A pass finished.
    PassCompleted,
    /// Informational message.
    Info,
    /// Warning message.
    Warning,
    /// Error message.
    Error,
}

impl EventKind {
    /// Human-readable description.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::SectionEmbedded => "section embedded",
            Self::SectionRecorded => "section recorded",
            Self::LoopUnrolled => "loop unrolled",
            Self::DispatchUntangled => "dispatch untangled",
            Self::EdgeSpecialized => "edge specialized",
            Self::PairCreated => "pair created",
            Self::PreconditionFailed => "precondition failed",
            Self::TraceRecordSkipped => "trace record skipped",
            Self::PassStarted => "pass started",
            Self::PassCompleted => "pass completed",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    /// Returns `true` for kinds that describe a change to the module.
    #[must_use]
    pub fn is_transformation(&self) -> bool {
        matches!(
            self,
            Self::SectionEmbedded
                | Self::SectionRecorded
                | Self::LoopUnrolled
                | Self::DispatchUntangled
                | Self::EdgeSpecialized
                | Self::PairCreated
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A recorded event.
#[derive(Debug, Clone)]
pub struct Event {
    /// Event kind.
    pub kind: EventKind,
    /// Function the event concerns.
    pub function: Option<String>,
    /// Block the event concerns.
    pub block: Option<BlockId>,
    /// Message.
    pub message: String,
    /// Pass that recorded the event.
    pub pass: Option<String>,
}

impl Event {
    fn new(kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            function: None,
            block: None,
            message: message.into(),
            pass: None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.kind)?;
        if let Some(function) = &self.function {
            write!(f, " {function}")?;
            if let Some(block) = self.block {
                write!(f, ":{block}")?;
            }
        }
        write!(f, " {}", self.message)
    }
}

/// Fluent event construction. The event is appended to the log on drop.
pub struct EventBuilder<'a> {
    log: &'a EventLog,
    kind: EventKind,
    function: Option<String>,
    block: Option<BlockId>,
    message: Option<String>,
    pass: Option<String>,
}

impl<'a> EventBuilder<'a> {
    fn new(log: &'a EventLog, kind: EventKind) -> Self {
        Self {
            log,
            kind,
            function: None,
            block: None,
            message: None,
            pass: None,
        }
    }

    /// Sets function and block.
    pub fn at(mut self, function: impl Into<String>, block: BlockId) -> Self {
        self.function = Some(function.into());
        self.block = Some(block);
        self
    }

    /// Sets the function only.
    pub fn function(mut self, function: impl Into<String>) -> Self {
        self.function = Some(function.into());
        self
    }

    /// Sets the message. Defaults to the kind's description.
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Sets the recording pass.
    pub fn pass(mut self, pass_name: impl Into<String>) -> Self {
        self.pass = Some(pass_name.into());
        self
    }
}

impl Drop for EventBuilder<'_> {
    fn drop(&mut self) {
        let message = self
            .message
            .take()
            .unwrap_or_else(|| self.kind.description().to_string());
        let event = Event {
            kind: self.kind,
            function: self.function.take(),
            block: self.block.take(),
            message,
            pass: self.pass.take(),
        };
        self.log.events.push(event);
    }
}

/// Append-only event collection.
#[derive(Debug)]
pub struct EventLog {
    events: boxcar::Vec<Event>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for EventLog {
    fn clone(&self) -> Self {
        let new_log = Self::new();
        new_log.merge(self);
        new_log
    }
}

impl EventLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: boxcar::Vec::new(),
        }
    }

    /// Returns `true` if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.count() == 0
    }

    /// Number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.count()
    }

    /// Starts recording an event of `kind`.
    pub fn record(&self, kind: EventKind) -> EventBuilder<'_> {
        EventBuilder::new(self, kind)
    }

    /// Records an informational message.
    pub fn info(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Info, message));
    }

    /// Records a warning.
    pub fn warn(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Warning, message));
    }

    /// Records an error.
    pub fn error(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Error, message));
    }

    /// Appends copies of every event in `other`.
    pub fn merge(&self, other: &EventLog) {
        for (_, event) in &other.events {
            self.events.push(event.clone());
        }
    }

    /// Returns `true` if an event of `kind` was recorded.
    #[must_use]
    pub fn has(&self, kind: EventKind) -> bool {
        self.events.iter().any(|(_, e)| e.kind == kind)
    }

    /// Number of events of `kind`.
    #[must_use]
    pub fn count_kind(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|(_, e)| e.kind == kind).count()
    }

    /// Iterates over all events in recording order.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().map(|(_, e)| e)
    }

    /// Iterates over events of `kind`.
    pub fn filter_kind(&self, kind: EventKind) -> impl Iterator<Item = &Event> + '_ {
        self.events
            .iter()
            .filter_map(move |(_, e)| if e.kind == kind { Some(e) } else { None })
    }

    /// Iterates over warnings.
    pub fn warnings(&self) -> impl Iterator<Item = &Event> + '_ {
        self.filter_kind(EventKind::Warning)
    }

    /// Event counts per kind.
    #[must_use]
    pub fn count_by_kind(&self) -> HashMap<EventKind, usize> {
        let mut counts = HashMap::new();
        for (_, event) in &self.events {
            *counts.entry(event.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Number of transformation events.
    #[must_use]
    pub fn transformation_count(&self) -> usize {
        self.events
            .iter()
            .filter(|(_, e)| e.kind.is_transformation())
            .count()
    }

    /// One-line summary of the transformations recorded.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "no events".to_string();
        }

        let counts = self.count_by_kind();

        // Only show transformation counts in summary
        let mut parts: Vec<String> = counts
            .iter()
            .filter(|(k, _)| k.is_transformation())
            .map(|(kind, count)| format!("{} {}", count, kind.description()))
            .collect();

        if parts.is_empty() {
            return format!("{} events", self.len());
        }

        parts.sort();
        parts.join(", ")
    }
}
