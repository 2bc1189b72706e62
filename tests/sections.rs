//! Integration tests for the section metadata manager.

use binlift::{
    config::SECTIONS_METADATA,
    ir::{Initializer, Module},
    sections::{
        copy_section, find_section_by_name, map_to_sections, read_from_binary, read_section_meta,
        section_start_flags, write_section_meta, SectionMeta,
    },
    Error, Result,
};

/// A 16-byte `.data` section becomes a writable 16-byte global with the same contents.
#[test]
fn test_copy_section_with_contents() -> Result<()> {
    let mut module = Module::new("m");
    let contents: Vec<u8> = (0u8..16).collect();
    let mut meta = SectionMeta::new(".data", 0x0804_a000, 16, 0x1000);

    let id = copy_section(&mut module, &mut meta, Some(&contents), false)?;
    let global = module.global(id).expect("section global");
    assert_eq!(global.name, ".data");
    assert_eq!(global.section.as_deref(), Some(".data"));
    assert_eq!(global.initializer, Initializer::Bytes(contents));
    assert_eq!(global.size(), 16);
    assert_eq!(global.align, 1);
    assert!(!global.readonly);
    assert_eq!(meta.global, Some(id));
    Ok(())
}

/// A section without contents becomes a zero-filled global.
#[test]
fn test_copy_section_zero_filled_readonly() -> Result<()> {
    let mut module = Module::new("m");
    let mut meta = SectionMeta::new(".rodata", 0x0804_8800, 64, 0x800);

    let id = copy_section(&mut module, &mut meta, None, true)?;
    let global = module.global(id).expect("section global");
    assert_eq!(global.initializer.to_bytes(), vec![0u8; 64]);
    assert!(global.readonly);
    Ok(())
}

/// Section globals go in front of the pre-existing globals, in call order.
#[test]
fn test_section_globals_keep_call_order() -> Result<()> {
    let mut module = Module::new("m");
    module.add_global("vpc", Initializer::Zero(4));
    module.add_global("regs", Initializer::Zero(32));

    for (name, base) in [(".text", 0x1000u32), (".data", 0x2000), (".bss", 0x3000)] {
        let mut meta = SectionMeta::new(name, base, 8, 0);
        copy_section(&mut module, &mut meta, None, false)?;
    }
    module.add_global("late", Initializer::Zero(1));

    let names: Vec<&str> = module.globals().iter().map(|g| g.name.as_str()).collect();
    assert_eq!(names, vec![".text", ".data", ".bss", "vpc", "regs", "late"]);
    Ok(())
}

/// Records survive serialization and are updated in place through their handle.
#[test]
fn test_records_round_trip_and_update_in_place() -> Result<()> {
    let mut module = Module::new("m");
    let mut text = SectionMeta::new(".text", 0x0804_8000, 0x1a4, 0x40);
    copy_section(&mut module, &mut text, None, true)?;
    let handle = write_section_meta(&mut module, &mut text)?;
    let mut data = SectionMeta::new(".data", 0x0804_a000, 0x10, 0x1000);
    write_section_meta(&mut module, &mut data)?;

    let reloaded = Module::from_json(&module.to_json()?)?;
    assert_eq!(read_section_meta(&reloaded, handle)?, text);
    assert_eq!(find_section_by_name(&reloaded, ".data"), Some(data.clone()));

    let mut updated = read_section_meta(&reloaded, handle)?;
    updated.size = 0x200;
    let mut reloaded = reloaded;
    assert_eq!(write_section_meta(&mut reloaded, &mut updated)?, handle);
    assert_eq!(reloaded.metadata.named(SECTIONS_METADATA).len(), 2);
    assert_eq!(find_section_by_name(&reloaded, ".text").map(|m| m.size), Some(0x200));
    assert_eq!(
        section_start_flags(&reloaded),
        vec![
            "--section-start=.text=0x8048000".to_string(),
            "--section-start=.data=0x804a000".to_string(),
        ]
    );
    Ok(())
}

/// The walk visits records in table order and stops at the first `true`.
#[test]
fn test_map_to_sections_stops_early() -> Result<()> {
    let mut module = Module::new("m");
    for name in [".a", ".b", ".c"] {
        write_section_meta(&mut module, &mut SectionMeta::new(name, 0, 0, 0))?;
    }

    let mut visited = Vec::new();
    let stopped = map_to_sections(&module, |meta| {
        visited.push(meta.name.clone());
        meta.name == ".b"
    });
    assert!(stopped);
    assert_eq!(visited, vec![".a", ".b"]);

    assert!(!map_to_sections(&module, |_| false));
    Ok(())
}

/// With duplicate names the first record wins.
#[test]
fn test_find_first_match() -> Result<()> {
    let mut module = Module::new("m");
    write_section_meta(&mut module, &mut SectionMeta::new(".dup", 0x1000, 1, 0))?;
    write_section_meta(&mut module, &mut SectionMeta::new(".dup", 0x2000, 2, 0))?;

    let found = find_section_by_name(&module, ".dup").expect(".dup");
    assert_eq!(found.load_base, 0x1000);
    assert!(find_section_by_name(&module, ".missing").is_none());
    Ok(())
}

/// Contents are read from the module's source binary; short reads are errors.
#[test]
fn test_read_from_binary() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("binary");
    std::fs::write(&path, (0u8..=255).collect::<Vec<u8>>())?;
    let module = Module::new("m").with_source_path(&path);

    assert_eq!(read_from_binary(&module, 0x10, 4)?, vec![0x10, 0x11, 0x12, 0x13]);
    assert!(matches!(
        read_from_binary(&module, 250, 16),
        Err(Error::Section(_))
    ));

    let missing = Module::new("m").with_source_path(dir.path().join("missing"));
    assert!(matches!(
        read_from_binary(&missing, 0, 1),
        Err(Error::FileError(_))
    ));
    assert!(matches!(
        read_from_binary(&Module::new("m"), 0, 1),
        Err(Error::Section(_))
    ));
    Ok(())
}
