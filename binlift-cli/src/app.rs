use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// binlift - control-flow recovery for lifted binaries
#[derive(Debug, Parser)]
#[command(name = "binlift", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared across all subcommands.
#[derive(Debug, Parser)]
pub struct GlobalOptions {
    /// Emit output as JSON instead of human-readable text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose (debug-level) logging output.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the transformation pipeline on a lifted module.
    Run {
        /// Path to the module (JSON).
        #[arg(value_name = "MODULE")]
        path: PathBuf,

        /// Where to write the transformed module. Defaults to overwriting the input.
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Embed the sections of the module's source binary.
        #[arg(long)]
        sections: bool,

        /// Source binary to record in the module before embedding sections.
        #[arg(long, value_name = "FILE")]
        source: Option<PathBuf>,

        /// Function holding the interpretation loop. Enables untangling.
        #[arg(long, value_name = "NAME")]
        entry: Vec<String>,

        /// Global holding the virtual program counter.
        #[arg(long, value_name = "NAME")]
        vpc: Vec<String>,

        /// Execution trace file; may be repeated.
        #[arg(long, value_name = "FILE")]
        trace: Vec<PathBuf>,

        /// How many times to unroll the selected loop. Enables unrolling.
        #[arg(long, value_name = "N")]
        unroll: Vec<usize>,

        /// Label of the header block of the loop to unroll.
        #[arg(long, value_name = "LABEL")]
        unroll_header: Vec<String>,

        /// Maximum number of loops offered to a pass per function.
        #[arg(long)]
        max_iterations: Option<usize>,

        /// Write the event log as JSON to this file.
        #[arg(long, value_name = "FILE")]
        report: Option<PathBuf>,
    },

    /// Inspect and edit section records.
    Sections {
        #[command(subcommand)]
        action: SectionsAction,
    },

    /// Summarize execution trace files.
    Trace {
        /// Trace files, merged in order.
        #[arg(value_name = "FILE", required = true)]
        paths: Vec<PathBuf>,

        /// List every distinct edge.
        #[arg(long)]
        edges: bool,
    },

    /// Print the loop forest of a function.
    Loops {
        /// Path to the module (JSON).
        #[arg(value_name = "MODULE")]
        path: PathBuf,

        /// Function name. Defaults to every function.
        #[arg(long, value_name = "NAME")]
        function: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
pub enum SectionsAction {
    /// List the section records stored in a module.
    List {
        /// Path to the module (JSON).
        #[arg(value_name = "MODULE")]
        path: PathBuf,
    },

    /// Import a `<addr> <size> <name>` listing, copying contents from the source binary.
    Import {
        /// Path to the module (JSON).
        #[arg(value_name = "MODULE")]
        path: PathBuf,

        /// Listing file.
        #[arg(value_name = "LISTING")]
        listing: PathBuf,

        /// Create zero-filled globals instead of reading the source binary.
        #[arg(long)]
        zero: bool,

        /// Mark the imported section globals read-only.
        #[arg(long)]
        readonly: bool,

        /// Where to write the module. Defaults to overwriting the input.
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Embed every allocated section of an ELF binary.
    Embed {
        /// Path to the module (JSON).
        #[arg(value_name = "MODULE")]
        path: PathBuf,

        /// Source binary. Defaults to the one recorded in the module.
        #[arg(long, value_name = "FILE")]
        source: Option<PathBuf>,

        /// Where to write the module. Defaults to overwriting the input.
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Print `--section-start` linker directives as a make fragment.
    LinkerFlags {
        /// Path to the module (JSON).
        #[arg(value_name = "MODULE")]
        path: PathBuf,
    },
}
