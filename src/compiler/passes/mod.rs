//! Built-in transformation passes.
//!
//! - [`EmbedSectionsPass`] - copies the source binary's sections into the module
//! - [`UnrollPass`] - structural unrolling of one labelled loop
//! - [`UntanglePass`] - trace-guided specialization of the interpretation loop

mod sections;
mod unroll;
mod untangle;

pub use sections::EmbedSectionsPass;
pub use unroll::{unroll_loop, UnrollError, UnrollPass, Unrolled};
pub use untangle::{
    qualify, read_traces, write_trace, DispatchLoop, DispatchUntangler, HeaderLatchPair,
    Qualification, TraceEdge, TraceSet, UntanglePass, TRACE_RECORD_SIZE,
};
