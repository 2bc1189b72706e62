//! Stable identifiers for IR entities.
//!
//! Every entity the transformation passes rewrite is addressed through a small copyable
//! index instead of a reference. Cloning a region of a function therefore never has to chase
//! pointers: a pass allocates fresh ids for the copies and records the mapping from original
//! to clone in an explicit table, then rewrites operands through that table.
//!
//! | Id | Scope | Display |
//! |----|-------|---------|
//! | [`ValueId`] | one function | `%5` |
//! | [`BlockId`] | one function | `bb3` |
//! | [`GlobalId`] | module | `@2` |
//! | [`MetadataId`] | module side-table | `!0` |
//!
//! Identity is never derived from an address: a block's id stays the same for the lifetime of
//! the module, and whether its address escapes is tracked separately through
//! [`crate::ir::Block::address_taken`].

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(usize);

        impl $name {
            /// Creates an id from its raw index.
            #[must_use]
            pub const fn new(index: usize) -> Self {
                Self(index)
            }

            /// Returns the raw index.
            #[must_use]
            pub const fn index(self) -> usize {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

define_id!(
    /// An SSA value defined by an operation, a merge node, or a function argument.
    ValueId,
    "%"
);

define_id!(
    /// A basic block inside a function. Blocks are never removed, so the id doubles as
    /// the block's index in [`crate::ir::Function::blocks`].
    BlockId,
    "bb"
);

define_id!(
    /// A global data object. Stable across reordering of the module's global list.
    GlobalId,
    "@"
);

define_id!(
    /// A node in the module's metadata side-table.
    MetadataId,
    "!"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_prefixes() {
        assert_eq!(ValueId::new(5).to_string(), "%5");
        assert_eq!(BlockId::new(3).to_string(), "bb3");
        assert_eq!(GlobalId::new(2).to_string(), "@2");
        assert_eq!(MetadataId::new(0).to_string(), "!0");
    }

    #[test]
    fn test_serde_transparent() {
        let json = serde_json::to_string(&BlockId::new(7)).unwrap();
        assert_eq!(json, "7");
        let back: BlockId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, BlockId::new(7));
    }
}
