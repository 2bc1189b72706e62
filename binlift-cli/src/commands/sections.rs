use std::path::Path;

use anyhow::{bail, Context};
use binlift::{
    compiler::{EmbedSectionsPass, EventKind, EventLog, Pass},
    sections::{
        copy_section, find_section_by_name, parse_section_listing, read_from_binary, sections,
        write_section_config, write_section_meta,
    },
};
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    commands::common::{load_module, save_module},
    output::{print_output, Align, TabWriter},
};

#[derive(Debug, Serialize)]
struct SectionOutput {
    name: String,
    load_base: String,
    size: u32,
    file_offset: String,
    global: Option<String>,
    readonly: Option<bool>,
}

pub fn list(path: &Path, opts: &GlobalOptions) -> anyhow::Result<()> {
    let module = load_module(path)?;

    let rows: Vec<SectionOutput> = sections(&module)
        .into_iter()
        .map(|meta| {
            let global = meta.global.and_then(|id| module.global(id));
            SectionOutput {
                name: meta.name,
                load_base: format!("{:#010x}", meta.load_base),
                size: meta.size,
                file_offset: format!("{:#x}", meta.file_offset),
                global: global.map(|g| g.name.clone()),
                readonly: global.map(|g| g.readonly),
            }
        })
        .collect();

    print_output(&rows, opts, |rows| {
        if rows.is_empty() {
            println!("No section records in {}", path.display());
            return;
        }
        let mut table = TabWriter::new(&[
            ("Name", Align::Left),
            ("Address", Align::Right),
            ("Size", Align::Right),
            ("Offset", Align::Right),
            ("Global", Align::Left),
            ("Mode", Align::Left),
        ]);
        for row in rows {
            table.row(vec![
                row.name.clone(),
                row.load_base.clone(),
                row.size.to_string(),
                row.file_offset.clone(),
                row.global.clone().unwrap_or_else(|| "-".to_string()),
                match row.readonly {
                    Some(true) => "ro",
                    Some(false) => "rw",
                    None => "-",
                }
                .to_string(),
            ]);
        }
        table.print();
    })
}

pub fn import(
    path: &Path,
    listing: &Path,
    zero: bool,
    readonly: bool,
    output: Option<&Path>,
    opts: &GlobalOptions,
) -> anyhow::Result<()> {
    let mut module = load_module(path)?;
    let text = std::fs::read_to_string(listing)
        .with_context(|| format!("failed to read listing: {}", listing.display()))?;
    let records = parse_section_listing(&text)
        .with_context(|| format!("invalid listing: {}", listing.display()))?;

    let mut imported = Vec::new();
    for mut meta in records {
        if find_section_by_name(&module, &meta.name).is_some() {
            log::warn!("{}: already recorded, skipping", meta.name);
            continue;
        }
        let contents = if zero {
            None
        } else {
            Some(
                read_from_binary(&module, meta.file_offset, meta.size)
                    .with_context(|| format!("failed to read contents of {}", meta.name))?,
            )
        };
        copy_section(&mut module, &mut meta, contents.as_deref(), readonly)?;
        write_section_meta(&mut module, &mut meta)?;
        imported.push(meta.name);
    }

    save_module(&module, path, output)?;
    print_output(&imported, opts, |names| {
        eprintln!("Imported {} sections: {}", names.len(), names.join(", "));
    })
}

pub fn embed(
    path: &Path,
    source: Option<&Path>,
    output: Option<&Path>,
    opts: &GlobalOptions,
) -> anyhow::Result<()> {
    let mut module = load_module(path)?;
    if let Some(source) = source {
        module.source_path = Some(source.to_path_buf());
    }
    if module.source_path.is_none() {
        bail!("module has no source binary; pass --source");
    }

    let events = EventLog::new();
    let mut pass = EmbedSectionsPass::new();
    pass.run_on_module(&mut module, &events)
        .context("failed to embed sections")?;
    save_module(&module, path, output)?;

    let embedded: Vec<String> = events
        .filter_kind(EventKind::SectionEmbedded)
        .map(|e| e.message.clone())
        .collect();
    print_output(&embedded, opts, |lines| {
        eprintln!("Embedded {} sections", lines.len());
        for line in lines {
            eprintln!("  {line}");
        }
    })
}

pub fn linker_flags(path: &Path) -> anyhow::Result<()> {
    let module = load_module(path)?;
    let mut stdout = std::io::stdout().lock();
    if write_section_config(&module, &mut stdout)? == 0 {
        bail!("no section records in {}", path.display());
    }
    Ok(())
}
