//! Transformation pipeline over lifted modules.
//!
//! # Architecture
//!
//! ```text
//! PassScheduler                 fixed-order execution
//!   ├─ initialize()             every pass, before anything is mutated
//!   ├─ EmbedSectionsPass        module pass: source sections → globals + side-table
//!   ├─ UnrollPass               loop pass: N-times unroll of one labelled loop
//!   ├─ UntanglePass             loop pass: traces → direct dispatch edges
//!   └─ finalize()
//!
//! EventLog                      what every pass did or declined to do
//! ```
//!
//! Loop passes never discover loops themselves. The scheduler computes the loop forest of
//! each function, offers loops innermost first, and recomputes the forest after a pass
//! reports a change. A header is offered at most once per pass, so the copies a pass creates
//! are never fed back into it.
//!
//! # Example
//!
//! ```rust,ignore
//! use binlift::{compiler::{EventLog, PassScheduler}, config::PipelineConfig};
//!
//! let config = PipelineConfig::new().with_sections(true);
//! let mut scheduler = PassScheduler::from_config(&config)?;
//! let events = EventLog::new();
//! scheduler.run(&mut module, &events)?;
//! println!("{}", events.summary());
//! ```

mod events;
mod pass;
mod passes;
mod scheduler;

pub use events::{Event, EventBuilder, EventKind, EventLog};
pub use pass::Pass;
pub use passes::{
    qualify, read_traces, unroll_loop, write_trace, DispatchLoop, DispatchUntangler,
    EmbedSectionsPass, HeaderLatchPair, Qualification, TraceEdge, TraceSet, UnrollError,
    UnrollPass, Unrolled, UntanglePass, TRACE_RECORD_SIZE,
};
pub use scheduler::PassScheduler;
