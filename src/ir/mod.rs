//! Intermediate representation of a lifted binary.
//!
//! The IR is deliberately small: it models exactly what the control-flow recovery passes
//! need to see of a lifted program. Everything else a lifter produces (CPU state layout,
//! instruction semantics) is hidden behind opaque [`Op::Call`]s and global loads and stores.
//!
//! # Architecture
//!
//! ```text
//! Module
//! ├── globals: Vec<GlobalVariable>     ordered, addressed by stable GlobalId
//! ├── metadata: MetadataTable          side-table ("sections" → SectionEntry records)
//! └── functions: Vec<Function>
//!     └── blocks: Vec<Block>           addressed by BlockId == index
//!         ├── phis: Vec<Phi>           merge nodes
//!         ├── ops: Vec<Op>             straight-line operations
//!         └── terminator: Terminator   jump / branch / switch / return / ...
//! ```
//!
//! # Interpretation loops
//!
//! A freshly lifted function routes every indirect transfer through one dispatch block:
//!
//! ```text
//! entry:     store 0x1000 -> @vpc ; br dispatch
//! dispatch:  %pc = load @vpc ; switch %pc [0x1000 -> BB_1000, 0x2000 -> BB_2000, ...]
//! BB_1000:   ... ; store 0x2000 -> @vpc ; br latch
//! latch:     br dispatch
//! ```
//!
//! [`crate::compiler::UntanglePass`] rewrites this shape using execution traces.
//!
//! # Key Components
//!
//! - [`Module`] / [`Function`] / [`Block`] - the containers
//! - [`Op`] / [`Terminator`] - instructions
//! - [`FunctionBuilder`] - closure-based construction for tests and fixtures
//! - [`Interpreter`] - reference semantics used to check that passes preserve behavior

mod block;
mod builder;
mod eval;
mod function;
mod global;
mod metadata;
mod module;
mod ops;
mod value;

pub use block::{Block, Phi, PhiOperand};
pub use builder::{BlockBuilder, FunctionBuilder, FunctionContext};
pub use eval::{Effect, Execution, Interpreter, DEFAULT_STEP_LIMIT};
pub use function::Function;
pub use global::{GlobalVariable, Initializer};
pub use metadata::{MetadataNode, MetadataTable, SectionEntry};
pub use module::Module;
pub(crate) use module::SectionAnchor;
pub use ops::{BinaryOp, Op, SwitchCase, Terminator};
pub use value::{BlockId, GlobalId, MetadataId, ValueId};
