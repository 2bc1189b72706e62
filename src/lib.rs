// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]

//! # binlift
//!
//! Transformation passes for statically recompiling lifted binaries.
//!
//! A dynamic-binary-translation lifter produces a module in which every emulated basic block
//! is reached through one interpretation loop: load the virtual program counter (VPC), switch
//! on it, run the block, jump back. `binlift` turns that module into something a compiler can
//! optimize and a linker can place:
//!
//! - **Untangling** ([`compiler::UntanglePass`]) rewrites the interpretation loop along the
//!   VPC transitions observed in execution traces, so the emulated blocks jump to each other
//!   directly. Untraced transitions still go through the original dispatch.
//! - **Unrolling** ([`compiler::UnrollPass`]) replicates one labelled loop body N times with
//!   fully rewired SSA values.
//! - **Section management** ([`sections`]) keeps the original section layout (names, load
//!   addresses, sizes, file offsets and contents) in the module's metadata side-table, and
//!   renders linker directives from it.
//!
//! # Architecture
//!
//! - [`ir`] - SSA IR: modules, functions, blocks, globals, the metadata side-table and a
//!   reference interpreter
//! - [`analysis`] - CFG views, dominators, natural loop forest
//! - [`compiler`] - the [`compiler::Pass`] trait, the passes, the scheduler and the event log
//! - [`sections`] - section records, section globals, linker directives
//! - [`file`] - memory-mapped access to the source binary and its ELF section table
//! - [`config`] - typed configuration for the pipeline and each pass
//!
//! # Quick start
//!
//! ```rust,ignore
//! use binlift::prelude::*;
//!
//! let mut module = Module::load("lifted.json")?;
//! let config = PipelineConfig::new()
//!     .with_sections(true)
//!     .with_untangle(UntangleConfig::new("wrapper", "vpc").with_trace("run1.trace"));
//!
//! let events = EventLog::new();
//! PassScheduler::from_config(&config)?.run(&mut module, &events)?;
//! module.save("untangled.json")?;
//! # Ok::<(), binlift::Error>(())
//! ```
//!
//! # Error handling
//!
//! Every fallible operation returns [`Result`]. Configuration problems surface as
//! [`Error::Config`] before any pass mutates the module; unreadable trace files and loops a
//! pass does not apply to are logged and skipped.

#[macro_use]
pub(crate) mod error;

pub mod analysis;
pub mod compiler;
pub mod config;
pub mod file;
pub mod ir;
pub mod sections;
pub mod utils;

/// Convenient re-exports of the most commonly used types.
///
/// # Example
///
/// ```rust,no_run
/// use binlift::prelude::*;
///
/// let module = Module::new("lifted");
/// let events = EventLog::new();
/// PassScheduler::from_config(&PipelineConfig::new())?.run(&mut module.clone(), &events)?;
/// # Ok::<(), binlift::Error>(())
/// ```
pub mod prelude;

/// `binlift` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always
/// [`Error`]. This is used consistently throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// `binlift` Error type
///
/// # Examples
///
/// ```rust,no_run
/// use binlift::{config::UnrollConfig, Error};
///
/// match UnrollConfig::new(0, "loop").validate() {
///     Err(Error::Config(message)) => println!("bad configuration: {message}"),
///     Err(e) => println!("Error: {e}"),
///     Ok(()) => {}
/// }
/// ```
pub use error::Error;
