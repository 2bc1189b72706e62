//! Access to the source binary a module was lifted from.
//!
//! The section manager needs two things from the original binary: raw byte ranges
//! (section contents, addressed by file offset) and the ELF section table. Both are
//! served by [`SourceBinary`], which sits on top of a pluggable [`Backend`]:
//!
//! - [`Physical`] - memory-mapped file on disk
//! - [`Memory`] - owned buffer
//!
//! # Examples
//!
//! ```rust,ignore
//! use binlift::file::SourceBinary;
//!
//! let binary = SourceBinary::from_file("/bin/true")?;
//! for section in binary.elf_sections()? {
//!     println!("{} at {:#x}", section.name, section.address);
//! }
//! ```

mod memory;
mod physical;

pub use memory::Memory;
pub use physical::Physical;

use std::path::Path;

use goblin::{
    elf::section_header::{SHF_ALLOC, SHF_WRITE, SHT_NOBITS},
    Object,
};

use crate::{
    Error::{Empty, NotSupported},
    Result,
};

/// Bounds-checked read access to a byte buffer.
pub trait Backend: Send + Sync {
    /// Returns `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] if the range does not lie within the data.
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]>;

    /// Returns the entire data buffer.
    fn data(&self) -> &[u8];

    /// Returns the total length of the data buffer.
    fn len(&self) -> usize;
}

/// One entry of an ELF section table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElfSection {
    /// Section name from the section header string table.
    pub name: String,
    /// Load address.
    pub address: u64,
    /// Size in memory.
    pub size: u64,
    /// Offset of the contents in the file.
    pub offset: u64,
    /// Occupies memory at run time (`SHF_ALLOC`).
    pub alloc: bool,
    /// Writable at run time (`SHF_WRITE`).
    pub writable: bool,
    /// Has no file contents (`SHT_NOBITS`, e.g. `.bss`).
    pub nobits: bool,
}

/// The original binary of a lifted module.
pub struct SourceBinary {
    data: Box<dyn Backend>,
}

impl SourceBinary {
    /// Maps the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::FileError`] if the file cannot be opened and
    /// [`crate::Error::Empty`] if it is empty.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::load(Physical::new(path)?)
    }

    /// Wraps an in-memory image.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Empty`] if `data` is empty.
    pub fn from_mem(data: Vec<u8>) -> Result<Self> {
        Self::load(Memory::new(data))
    }

    fn load<T: Backend + 'static>(data: T) -> Result<Self> {
        if data.len() == 0 {
            return Err(Empty);
        }
        Ok(Self {
            data: Box::new(data),
        })
    }

    /// Size of the binary in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the binary has no contents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.len() == 0
    }

    /// The whole binary.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.data.data()
    }

    /// Reads `size` bytes at file offset `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] if the range extends past the end of the file.
    pub fn read(&self, offset: u64, size: u64) -> Result<&[u8]> {
        let offset = usize::try_from(offset).map_err(|_| crate::Error::OutOfBounds)?;
        let size = usize::try_from(size).map_err(|_| crate::Error::OutOfBounds)?;
        self.data.data_slice(offset, size)
    }

    /// Parses the ELF section table.
    ///
    /// The null section at index 0 is skipped.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotSupported`] if the binary is not an ELF object and
    /// [`crate::Error::GoblinErr`] if it cannot be parsed.
    pub fn elf_sections(&self) -> Result<Vec<ElfSection>> {
        let Object::Elf(elf) = Object::parse(self.data.data())? else {
            return Err(NotSupported);
        };

        let mut sections = Vec::with_capacity(elf.section_headers.len());
        for header in elf.section_headers.iter().skip(1) {
            let name = elf.shdr_strtab.get_at(header.sh_name).unwrap_or_default();
            sections.push(ElfSection {
                name: name.to_string(),
                address: header.sh_addr,
                size: header.sh_size,
                offset: header.sh_offset,
                alloc: header.sh_flags & u64::from(SHF_ALLOC) != 0,
                writable: header.sh_flags & u64::from(SHF_WRITE) != 0,
                nobits: header.sh_type == SHT_NOBITS,
            });
        }
        Ok(sections)
    }
}

impl std::fmt::Debug for SourceBinary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceBinary")
            .field("len", &self.data.len())
            .finish()
    }
}
