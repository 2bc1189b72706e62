mod app;
mod commands;
mod output;

use clap::Parser;

use crate::app::{Cli, Command, SectionsAction};

fn main() -> anyhow::Result<()> {
    ctrlc::set_handler(|| {
        eprintln!("\nCancelled.");
        std::process::exit(130);
    })
    .expect("failed to set Ctrl+C handler");

    let cli = Cli::parse();

    // Show binlift info+ on stderr unless --json; --verbose enables debug; RUST_LOG overrides
    if !cli.global.json {
        let level = if cli.global.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        };
        env_logger::Builder::new()
            .filter_module("binlift", level)
            .parse_default_env()
            .target(env_logger::Target::Stderr)
            .format_timestamp(None)
            .format_module_path(false)
            .format_target(false)
            .init();
    }

    match &cli.command {
        Command::Run {
            path,
            output,
            sections,
            source,
            entry,
            vpc,
            trace,
            unroll,
            unroll_header,
            max_iterations,
            report,
        } => commands::run::run(
            path,
            &commands::run::RunOptions {
                output: output.as_deref(),
                sections: *sections,
                source: source.as_deref(),
                entry,
                vpc,
                traces: trace,
                unroll,
                unroll_header,
                max_iterations: *max_iterations,
                report: report.as_deref(),
                global: &cli.global,
            },
        ),
        Command::Sections { action } => match action {
            SectionsAction::List { path } => commands::sections::list(path, &cli.global),
            SectionsAction::Import {
                path,
                listing,
                zero,
                readonly,
                output,
            } => commands::sections::import(
                path,
                listing,
                *zero,
                *readonly,
                output.as_deref(),
                &cli.global,
            ),
            SectionsAction::Embed {
                path,
                source,
                output,
            } => commands::sections::embed(
                path,
                source.as_deref(),
                output.as_deref(),
                &cli.global,
            ),
            SectionsAction::LinkerFlags { path } => commands::sections::linker_flags(path),
        },
        Command::Trace { paths, edges } => commands::trace::run(paths, *edges, &cli.global),
        Command::Loops { path, function } => {
            commands::loops::run(path, function.as_deref(), &cli.global)
        }
    }
}
