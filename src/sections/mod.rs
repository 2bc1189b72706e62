//! Section metadata manager.
//!
//! Lifting a binary keeps its code but loses its layout. This module carries the facts needed
//! to rebuild that layout across passes: for each original section, its name, load address,
//! size and file offset, plus the global that holds its contents. Records live in the
//! module's metadata side-table under the [`SECTIONS_METADATA`] collection and serialize with
//! the module.
//!
//! # Records and handles
//!
//! A [`SectionMeta`] is a detached copy of one record. Its `handle` links it back to the
//! side-table node it was read from (or written to), so [`write_section_meta`] updates that
//! node in place instead of appending a duplicate.
//!
//! # Section globals
//!
//! [`copy_section`] materializes a section as a byte-array global tagged with the section name.
//! Section globals are inserted ahead of every global that existed before the first copy and
//! keep their call order among themselves:
//!
//! ```text
//! before:  vpc, regs
//! copy .text, .data, .bss
//! after:   .text, .data, .bss, vpc, regs
//! ```
//!
//! # Examples
//!
//! ```rust,ignore
//! use binlift::sections::{copy_section, write_section_meta, find_section_by_name, SectionMeta};
//!
//! let mut meta = SectionMeta::new(".data", 0x0804_a000, 16, 0x1000);
//! let bytes = binlift::sections::read_from_binary(&module, 0x1000, 16)?;
//! copy_section(&mut module, &mut meta, Some(&bytes), false)?;
//! write_section_meta(&mut module, &mut meta)?;
//!
//! assert!(find_section_by_name(&module, ".data").is_some());
//! ```

mod linker;
mod listing;

pub use linker::{section_start_flags, write_section_config};
pub use listing::parse_section_listing;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    config::SECTIONS_METADATA,
    file::{ElfSection, SourceBinary},
    ir::{GlobalId, Initializer, MetadataId, MetadataNode, Module, SectionAnchor, SectionEntry},
    Error, Result,
};

/// One original-binary section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionMeta {
    /// Section name, for example `.data`.
    pub name: String,
    /// Virtual address the section is loaded at.
    pub load_base: u32,
    /// Size in bytes.
    pub size: u32,
    /// Offset of the contents in the source binary.
    pub file_offset: u32,
    /// Global holding the contents, once [`copy_section`] created it.
    pub global: Option<GlobalId>,
    /// Side-table node this record was read from or written to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<MetadataId>,
}

impl SectionMeta {
    /// Creates a record that has neither a global nor a side-table node yet.
    #[must_use]
    pub fn new(name: impl Into<String>, load_base: u32, size: u32, file_offset: u32) -> Self {
        Self {
            name: name.into(),
            load_base,
            size,
            file_offset,
            global: None,
            handle: None,
        }
    }

    /// Builds a record from an ELF section header.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Section`] if the address, size or offset does not fit in 32 bits.
    pub fn from_elf(section: &ElfSection) -> Result<Self> {
        let narrow = |field: &str, value: u64| {
            u32::try_from(value).map_err(|_| {
                Error::Section(format!(
                    "{}: {} {:#x} does not fit in 32 bits",
                    section.name, field, value
                ))
            })
        };

        Ok(Self::new(
            section.name.clone(),
            narrow("address", section.address)?,
            narrow("size", section.size)?,
            narrow("file offset", section.offset)?,
        ))
    }

    fn to_entry(&self) -> SectionEntry {
        SectionEntry {
            name: self.name.clone(),
            load_base: self.load_base,
            size: self.size,
            file_offset: self.file_offset,
            global: self.global,
        }
    }

    fn from_entry(entry: &SectionEntry, handle: MetadataId) -> Self {
        Self {
            name: entry.name.clone(),
            load_base: entry.load_base,
            size: entry.size,
            file_offset: entry.file_offset,
            global: entry.global,
            handle: Some(handle),
        }
    }
}

/// Creates the global holding the contents of `meta` and stores its id in the record.
///
/// The global is `meta.size` bytes long, initialized from `bytes` or zero-filled when `bytes`
/// is `None`, 1-byte aligned, placed in the output section `meta.name` and immutable when
/// `readonly` is set.
///
/// # Errors
///
/// Returns [`Error::Section`] if `bytes` is not exactly `meta.size` bytes long.
pub fn copy_section(
    module: &mut Module,
    meta: &mut SectionMeta,
    bytes: Option<&[u8]>,
    readonly: bool,
) -> Result<GlobalId> {
    let size = meta.size as usize;
    let initializer = match bytes {
        Some(bytes) if bytes.len() != size => {
            return Err(Error::Section(format!(
                "{}: got {} bytes for a section of {} bytes",
                meta.name,
                bytes.len(),
                size
            )));
        }
        Some(bytes) => Initializer::Bytes(bytes.to_vec()),
        None => Initializer::Zero(size),
    };

    let anchor = match module.section_anchor {
        Some(anchor) => anchor,
        None => {
            let anchor = module
                .globals()
                .first()
                .map_or(SectionAnchor::End, |global| SectionAnchor::Before(global.id));
            module.section_anchor = Some(anchor);
            anchor
        }
    };
    let position = match anchor {
        SectionAnchor::Before(id) => module
            .global_position(id)
            .unwrap_or(module.globals().len()),
        SectionAnchor::End => module.globals().len(),
    };

    let id = module.insert_global(position, meta.name.clone(), initializer);
    if let Some(global) = module.global_mut(id) {
        global.section = Some(meta.name.clone());
        global.align = 1;
        global.readonly = readonly;
    }

    debug!(
        "copy section at {:#x}: {} ({} bytes, {}{})",
        meta.load_base,
        meta.name,
        meta.size,
        if bytes.is_some() { "raw data" } else { "zero-initialized" },
        if readonly { ", readonly" } else { "" }
    );

    meta.global = Some(id);
    Ok(id)
}

/// Persists `meta` in the side-table.
///
/// A record with a handle overwrites its node; a record without one is appended to the
/// [`SECTIONS_METADATA`] collection and receives the new handle.
///
/// # Errors
///
/// Returns [`Error::Section`] if the handle does not name a section node of this module.
pub fn write_section_meta(module: &mut Module, meta: &mut SectionMeta) -> Result<MetadataId> {
    let entry = meta.to_entry();

    if let Some(handle) = meta.handle {
        match module.metadata.node_mut(handle) {
            Some(MetadataNode::Section(existing)) => *existing = entry,
            None => {
                return Err(Error::Section(format!(
                    "{}: no metadata node {}",
                    meta.name, handle
                )))
            }
        }
        return Ok(handle);
    }

    let handle = module.metadata.push(MetadataNode::Section(entry));
    module.metadata.add_named(SECTIONS_METADATA, handle);
    meta.handle = Some(handle);
    Ok(handle)
}

/// Reads the record stored at `handle`.
///
/// # Errors
///
/// Returns [`Error::Section`] if there is no section node at `handle`.
pub fn read_section_meta(module: &Module, handle: MetadataId) -> Result<SectionMeta> {
    match module.metadata.node(handle) {
        Some(MetadataNode::Section(entry)) => Ok(SectionMeta::from_entry(entry, handle)),
        None => Err(Error::Section(format!("no metadata node {handle}"))),
    }
}

/// All stored records, in table order.
#[must_use]
pub fn sections(module: &Module) -> Vec<SectionMeta> {
    let mut all = Vec::new();
    map_to_sections(module, |meta| {
        all.push(meta.clone());
        false
    });
    all
}

/// Calls `callback` on each record in table order until it returns `true`.
///
/// Returns whether the walk was stopped by the callback.
pub fn map_to_sections<F>(module: &Module, mut callback: F) -> bool
where
    F: FnMut(&SectionMeta) -> bool,
{
    for &handle in module.metadata.named(SECTIONS_METADATA) {
        let Ok(meta) = read_section_meta(module, handle) else {
            continue;
        };
        if callback(&meta) {
            return true;
        }
    }
    false
}

/// Returns the first record named `name`.
#[must_use]
pub fn find_section_by_name(module: &Module, name: &str) -> Option<SectionMeta> {
    let mut found = None;
    map_to_sections(module, |meta| {
        if meta.name == name {
            found = Some(meta.clone());
            true
        } else {
            false
        }
    });
    found
}

/// Reads `size` bytes at `offset` from the module's source binary.
///
/// # Errors
///
/// Returns [`Error::Section`] if the module has no source path or the range runs past the end
/// of the file, and [`Error::FileError`] if the file cannot be opened.
pub fn read_from_binary(module: &Module, offset: u32, size: u32) -> Result<Vec<u8>> {
    let Some(path) = module.source_path.as_ref() else {
        return Err(Error::Section(format!(
            "module '{}' has no source binary",
            module.name
        )));
    };

    let binary = SourceBinary::from_file(path)?;
    match binary.read(u64::from(offset), u64::from(size)) {
        Ok(bytes) => Ok(bytes.to_vec()),
        Err(Error::OutOfBounds) => Err(Error::Section(format!(
            "{}: short read of {} bytes at {:#x} (file is {} bytes)",
            path.display(),
            size,
            offset,
            binary.len()
        ))),
        Err(error) => Err(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_section_zero_fill() {
        let mut module = Module::new("m");
        let mut meta = SectionMeta::new(".bss", 0x2000, 32, 0);

        let id = copy_section(&mut module, &mut meta, None, false).unwrap();
        let global = module.global(id).unwrap();
        assert_eq!(global.initializer, Initializer::Zero(32));
        assert_eq!(global.section.as_deref(), Some(".bss"));
        assert_eq!(global.align, 1);
        assert!(!global.readonly);
        assert_eq!(meta.global, Some(id));
    }

    #[test]
    fn test_copy_section_length_mismatch() {
        let mut module = Module::new("m");
        let mut meta = SectionMeta::new(".data", 0x2000, 4, 0);
        let result = copy_section(&mut module, &mut meta, Some(&[1, 2, 3]), false);
        assert!(matches!(result, Err(Error::Section(_))));
        assert!(module.globals().is_empty());
        assert_eq!(meta.global, None);
    }

    #[test]
    fn test_sections_without_prior_globals_append() {
        let mut module = Module::new("m");
        let mut a = SectionMeta::new(".a", 0, 1, 0);
        let mut b = SectionMeta::new(".b", 1, 1, 1);
        copy_section(&mut module, &mut a, None, false).unwrap();
        copy_section(&mut module, &mut b, None, false).unwrap();
        module.add_global("late", Initializer::Zero(4));

        let names: Vec<_> = module.globals().iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec![".a", ".b", "late"]);
    }

    #[test]
    fn test_write_then_update_in_place() {
        let mut module = Module::new("m");
        let mut meta = SectionMeta::new(".text", 0x1000, 8, 0x40);
        let handle = write_section_meta(&mut module, &mut meta).unwrap();
        assert_eq!(meta.handle, Some(handle));

        meta.size = 16;
        assert_eq!(write_section_meta(&mut module, &mut meta).unwrap(), handle);
        assert_eq!(module.metadata.named(SECTIONS_METADATA).len(), 1);
        assert_eq!(read_section_meta(&module, handle).unwrap().size, 16);
    }

    #[test]
    fn test_from_elf_rejects_wide_values() {
        let section = ElfSection {
            name: ".big".to_string(),
            address: 0x1_0000_0000,
            size: 4,
            offset: 0,
            alloc: true,
            writable: false,
            nobits: false,
        };
        assert!(matches!(SectionMeta::from_elf(&section), Err(Error::Section(_))));
    }
}
