//! Global data objects.

use serde::{Deserialize, Serialize};

use crate::ir::GlobalId;

/// Initial contents of a global.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Initializer {
    /// Explicit bytes.
    Bytes(Vec<u8>),
    /// `n` zero bytes.
    Zero(usize),
}

impl Initializer {
    /// Size of the initialized object in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        match self {
            Initializer::Bytes(bytes) => bytes.len(),
            Initializer::Zero(size) => *size,
        }
    }

    /// Materializes the contents.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Initializer::Bytes(bytes) => bytes.clone(),
            Initializer::Zero(size) => vec![0; *size],
        }
    }

    /// Reads the first eight bytes as a little-endian scalar, zero-extending short objects.
    #[must_use]
    pub fn scalar(&self) -> u64 {
        match self {
            Initializer::Zero(_) => 0,
            Initializer::Bytes(bytes) => {
                let mut raw = [0u8; 8];
                for (dst, src) in raw.iter_mut().zip(bytes.iter()) {
                    *dst = *src;
                }
                u64::from_le_bytes(raw)
            }
        }
    }
}

/// A module-level data object: emulated registers such as the VPC, or the embedded
/// contents of an original binary section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalVariable {
    /// Stable id. Independent of the global's position in [`crate::ir::Module::globals`].
    pub id: GlobalId,
    /// Symbol name.
    pub name: String,
    /// Initial contents.
    pub initializer: Initializer,
    /// Output section the object must be placed in, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    /// Alignment in bytes.
    pub align: u32,
    /// Whether the object is immutable.
    #[serde(default)]
    pub readonly: bool,
}

impl GlobalVariable {
    /// Size in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.initializer.size()
    }
}
