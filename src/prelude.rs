//! # binlift Prelude
//!
//! The types needed to load a lifted module, configure and run the pipeline, and inspect the
//! result. Import with `use binlift::prelude::*;`.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all binlift operations
pub use crate::Error;

/// The result type used throughout binlift
pub use crate::Result;

// ================================================================================================
// IR
// ================================================================================================

pub use crate::ir::{
    BlockId, Function, FunctionBuilder, GlobalId, Initializer, Interpreter, Module, Op,
    Terminator, ValueId,
};

// ================================================================================================
// Pipeline
// ================================================================================================

pub use crate::compiler::{
    EmbedSectionsPass, EventKind, EventLog, Pass, PassScheduler, UnrollPass, UntanglePass,
};

pub use crate::config::{PipelineConfig, UnrollConfig, UntangleConfig};

// ================================================================================================
// Sections and Traces
// ================================================================================================

pub use crate::compiler::{TraceEdge, TraceSet};

pub use crate::sections::{find_section_by_name, SectionMeta};

pub use crate::file::SourceBinary;
