//! Embedding of the source binary's sections.
//!
//! Every allocated, named section of the ELF file the module was lifted from becomes a
//! byte-array global plus a side-table record, so later stages can relink the recompiled
//! program at the original addresses. Sections already recorded by name are left alone,
//! which makes the pass safe to run on a module that went through it before.

use log::{debug, info, warn};

use crate::{
    compiler::{pass::Pass, EventKind, EventLog},
    file::SourceBinary,
    ir::Module,
    sections::{copy_section, find_section_by_name, write_section_meta, SectionMeta},
    Result,
};

/// Copies the allocated sections of the module's source binary into the module.
#[derive(Debug, Default)]
pub struct EmbedSectionsPass {
    embedded: usize,
}

impl EmbedSectionsPass {
    /// Creates the pass.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sections embedded by the last run.
    #[must_use]
    pub fn embedded(&self) -> usize {
        self.embedded
    }
}

impl Pass for EmbedSectionsPass {
    fn name(&self) -> &'static str {
        "embed-sections"
    }

    fn description(&self) -> &'static str {
        "Copies allocated ELF sections of the source binary into section globals"
    }

    fn is_global(&self) -> bool {
        true
    }

    fn run_on_module(&mut self, module: &mut Module, events: &EventLog) -> Result<bool> {
        self.embedded = 0;
        let Some(path) = module.source_path.clone() else {
            warn!("module '{}' has no source binary, no sections embedded", module.name);
            events
                .record(EventKind::Warning)
                .pass(self.name())
                .message("no source binary recorded");
            return Ok(false);
        };

        let binary = SourceBinary::from_file(&path)?;
        for section in binary.elf_sections()? {
            if !section.alloc || section.name.is_empty() {
                continue;
            }
            if find_section_by_name(module, &section.name).is_some() {
                debug!("{}: already recorded", section.name);
                continue;
            }

            let mut meta = SectionMeta::from_elf(&section)?;
            let contents = if section.nobits {
                None
            } else {
                Some(binary.read(section.offset, section.size)?)
            };
            copy_section(module, &mut meta, contents, !section.writable)?;
            write_section_meta(module, &mut meta)?;

            self.embedded += 1;
            events
                .record(EventKind::SectionEmbedded)
                .pass(self.name())
                .message(format!(
                    "{} at {:#x} ({} bytes)",
                    meta.name, meta.load_base, meta.size
                ));
            events
                .record(EventKind::SectionRecorded)
                .pass(self.name())
                .message(meta.name.clone());
        }

        info!(
            "embedded {} sections of {} into '{}'",
            self.embedded,
            path.display(),
            module.name
        );
        Ok(self.embedded > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::SECTIONS_METADATA, ir::Initializer};

    #[test]
    fn test_without_source_binary() {
        let mut module = Module::new("m");
        let events = EventLog::new();
        let mut pass = EmbedSectionsPass::new();

        assert!(!pass.run_on_module(&mut module, &events).unwrap());
        assert!(events.has(EventKind::Warning));
        assert!(module.globals().is_empty());
    }

    #[test]
    fn test_not_an_elf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob");
        std::fs::write(&path, [0x42u8; 64]).unwrap();
        let mut module = Module::new("m").with_source_path(&path);

        let result = EmbedSectionsPass::new().run_on_module(&mut module, &EventLog::new());
        assert!(result.is_err());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_embeds_running_binary_once() {
        let mut module = Module::new("m").with_source_path(std::env::current_exe().unwrap());
        let vpc = module.add_global("vpc", Initializer::Zero(4));
        let events = EventLog::new();
        let mut pass = EmbedSectionsPass::new();

        assert!(pass.run_on_module(&mut module, &events).unwrap());
        let embedded = pass.embedded();
        assert!(embedded > 0);
        assert_eq!(module.metadata.named(SECTIONS_METADATA).len(), embedded);
        assert_eq!(module.global_position(vpc), Some(embedded));

        let text = find_section_by_name(&module, ".text").unwrap();
        let global = module.global(text.global.unwrap()).unwrap();
        assert!(global.readonly);
        assert_eq!(global.size(), text.size as usize);

        assert!(!pass.run_on_module(&mut module, &events).unwrap());
        assert_eq!(module.metadata.named(SECTIONS_METADATA).len(), embedded);
    }
}
