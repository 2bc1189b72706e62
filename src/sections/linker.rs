//! Linker directives that put recompiled sections back at their original addresses.

use std::io::Write;

use crate::{ir::Module, sections::map_to_sections, Result};

/// One `--section-start=NAME=0xADDR` directive per stored record, in table order.
#[must_use]
pub fn section_start_flags(module: &Module) -> Vec<String> {
    let mut flags = Vec::new();
    map_to_sections(module, |meta| {
        flags.push(format!("--section-start={}={:#x}", meta.name, meta.load_base));
        false
    });
    flags
}

/// Writes the directives as a make fragment, one `$(BIN): LDFLAGS += ...` line per record.
///
/// # Errors
///
/// Returns [`crate::Error::FileError`] if writing fails.
pub fn write_section_config<W: Write>(module: &Module, writer: &mut W) -> Result<usize> {
    let flags = section_start_flags(module);
    for flag in &flags {
        writeln!(writer, "$(BIN): LDFLAGS += {flag}")?;
    }
    Ok(flags.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sections::{write_section_meta, SectionMeta};

    #[test]
    fn test_make_fragment() {
        let mut module = Module::new("m");
        for (name, base) in [(".text", 0x0804_8000u32), (".data", 0x0804_a000)] {
            let mut meta = SectionMeta::new(name, base, 4, 0);
            write_section_meta(&mut module, &mut meta).unwrap();
        }

        let mut out = Vec::new();
        assert_eq!(write_section_config(&module, &mut out).unwrap(), 2);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "$(BIN): LDFLAGS += --section-start=.text=0x8048000\n\
             $(BIN): LDFLAGS += --section-start=.data=0x804a000\n"
        );
    }
}
