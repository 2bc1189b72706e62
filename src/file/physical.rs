//! Memory-mapped file backend.
//!
//! The source binary of a lifted module can be large while the section manager only
//! ever needs a few ranges of it, so the file is mapped instead of read. All access goes
//! through the bounds-checked [`Backend`] interface.
//!
//! ```rust,ignore
//! use binlift::file::{Backend, Physical};
//!
//! let physical = Physical::new("/bin/true")?;
//! let magic = physical.data_slice(0, 4)?;
//! assert_eq!(magic, b"\x7fELF");
//! ```

use super::Backend;
use crate::{
    Error::{Error, FileError, OutOfBounds},
    Result,
};

use memmap2::Mmap;
use std::{fs, path::Path};

/// A file backend that maps the file into the address space.
#[derive(Debug)]
pub struct Physical {
    /// Memory-mapped file data
    data: Mmap,
}

impl Physical {
    /// Maps the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::FileError`] if the file cannot be opened and
    /// [`crate::Error::Error`] if it cannot be mapped.
    pub fn new(path: impl AsRef<Path>) -> Result<Physical> {
        let file = match fs::File::open(path) {
            Ok(file) => file,
            Err(error) => return Err(FileError(error)),
        };

        // The mapping is read-only and lives no longer than this backend.
        let mmap = match unsafe { Mmap::map(&file) } {
            Ok(mmap) => mmap,
            Err(error) => return Err(Error(error.to_string())),
        };

        Ok(Physical { data: mmap })
    }
}

impl Backend for Physical {
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let Some(offset_end) = offset.checked_add(len) else {
            return Err(OutOfBounds);
        };

        if offset_end > self.data.len() {
            return Err(OutOfBounds);
        }

        Ok(&self.data[offset..offset_end])
    }

    fn data(&self) -> &[u8] {
        self.data.as_ref()
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn physical() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let mut contents = vec![0xCC_u8; 512];
        contents[100..104].copy_from_slice(b"DATA");
        file.write_all(&contents).unwrap();
        file.flush().unwrap();

        let physical = Physical::new(file.path()).unwrap();
        assert_eq!(physical.len(), 512);
        assert_eq!(physical.data()[0], 0xCC);
        assert_eq!(physical.data_slice(100, 4).unwrap(), b"DATA");

        assert!(matches!(physical.data_slice(510, 4), Err(OutOfBounds)));
        assert!(matches!(physical.data_slice(usize::MAX, 2), Err(OutOfBounds)));
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = Physical::new(dir.path().join("absent.bin"));
        assert!(matches!(result, Err(FileError(_))));
    }
}
