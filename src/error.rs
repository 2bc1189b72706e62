use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! config_error {
    ($fmt:expr $(, $arg:expr)* $(,)?) => {
        crate::Error::Config(format!($fmt $(, $arg)*))
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The variants follow the error taxonomy of the transformation pipeline. Configuration
/// problems are hard stops reported before any module mutation, input problems carry enough
/// context to be reported and skipped by the caller, and IR consistency problems surface as
/// [`Error::Malformed`] with the source location that detected them.
///
/// Unroller precondition failures are not part of this enum; they are reported through
/// [`crate::compiler::UnrollError`] so that every failed condition is a distinct value that
/// leaves the loop untouched.
///
/// # Error Categories
///
/// ## Configuration Errors
/// - [`Error::Config`] - Missing or duplicated options, unresolvable configured names
///
/// ## Input Errors
/// - [`Error::Trace`] - Trace files that could not be used at all
/// - [`Error::Section`] - Section records and backing data that could not be resolved
/// - [`Error::OutOfBounds`] - Attempted to read beyond the end of the source binary
/// - [`Error::Empty`] - Empty input provided
///
/// ## I/O and External Errors
/// - [`Error::FileError`] - Filesystem I/O errors
/// - [`Error::GoblinErr`] - ELF parsing errors from the goblin crate
/// - [`Error::Serialization`] - Module (de)serialization errors
///
/// ## IR Errors
/// - [`Error::Malformed`] - Inconsistent IR (dangling block, value or global references)
/// - [`Error::GraphError`] - Control flow graph analysis error
///
/// # Examples
///
/// ```rust,ignore
/// use binlift::{Error, ir::Module};
///
/// match Module::load("lifted.json") {
///     Ok(module) => println!("{} functions", module.functions().len()),
///     Err(Error::FileError(io_err)) => eprintln!("I/O error: {io_err}"),
///     Err(e) => eprintln!("Other error: {e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The IR is internally inconsistent and could not be processed.
    ///
    /// Raised when a reference inside the module (block, value, global or metadata handle)
    /// does not resolve. The error includes the source location where the problem was detected.
    ///
    /// # Fields
    ///
    /// * `message` - Description of the inconsistency
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while reading the source binary.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// The input format or feature is not supported.
    ///
    /// Returned when the source binary is not an ELF object, the only container
    /// format the section embedding understands.
    #[error("This file type is not supported")]
    NotSupported,

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// Invalid or incomplete configuration.
    ///
    /// Covers missing or repeated required options, a zero unroll count, and configured
    /// names (entry function, VPC global) that do not exist in the module. These are
    /// always fatal and reported before the pipeline mutates anything.
    #[error("Configuration error - {0}")]
    Config(String),

    /// The supplied traces could not be used.
    ///
    /// Individual malformed records are skipped and only logged; this error is returned
    /// when not a single trace file could be read.
    #[error("Trace error - {0}")]
    Trace(String),

    /// A section record or its backing data could not be resolved.
    #[error("Section error - {0}")]
    Section(String),

    /// File I/O error.
    ///
    /// Wraps standard I/O errors that can occur while opening trace files,
    /// the source binary, or serialized modules.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Other errors that don't fit specific categories.
    #[error("{0}")]
    Error(String),

    /// Error from the goblin crate during ELF parsing.
    #[error("{0}")]
    GoblinErr(#[from] goblin::error::Error),

    /// Module serialization or deserialization failed.
    #[error("{0}")]
    Serialization(#[from] serde_json::Error),

    /// Control flow graph analysis error.
    ///
    /// Returned when a graph algorithm is asked about a node that is not part of
    /// the graph it was computed on.
    #[error("{0}")]
    GraphError(String),
}
