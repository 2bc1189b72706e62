//! The module's metadata side-table.
//!
//! Nodes are stored in an arena and addressed by [`MetadataId`]. Named collections group node
//! ids under a string key, in insertion order; `"sections"` holds the section records written
//! by [`crate::sections`]. The table is plain data and serializes with the module.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ir::{GlobalId, MetadataId};

/// The five fields persisted for one original-binary section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionEntry {
    /// Section name, for example `.data`.
    pub name: String,
    /// Virtual address the section is loaded at.
    pub load_base: u32,
    /// Size in bytes.
    pub size: u32,
    /// Offset of the section's contents in the source binary.
    pub file_offset: u32,
    /// Global holding the section's contents, if one was created.
    pub global: Option<GlobalId>,
}

/// A typed side-table record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetadataNode {
    /// A section layout record.
    Section(SectionEntry),
}

/// Arena of metadata nodes plus named, ordered collections of node ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataTable {
    nodes: Vec<MetadataNode>,
    named: BTreeMap<String, Vec<MetadataId>>,
}

impl MetadataTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `node` and returns its id. The node is not part of any named collection yet.
    pub fn push(&mut self, node: MetadataNode) -> MetadataId {
        let id = MetadataId::new(self.nodes.len());
        self.nodes.push(node);
        id
    }

    /// Returns the node with the given id.
    #[must_use]
    pub fn node(&self, id: MetadataId) -> Option<&MetadataNode> {
        self.nodes.get(id.index())
    }

    /// Returns the node with the given id mutably.
    pub fn node_mut(&mut self, id: MetadataId) -> Option<&mut MetadataNode> {
        self.nodes.get_mut(id.index())
    }

    /// Appends `id` to the collection `name`, creating the collection on first use.
    pub fn add_named(&mut self, name: &str, id: MetadataId) {
        self.named.entry(name.to_string()).or_default().push(id);
    }

    /// Returns the ids in collection `name`, in insertion order.
    #[must_use]
    pub fn named(&self, name: &str) -> &[MetadataId] {
        self.named.get(name).map_or(&[], Vec::as_slice)
    }

    /// Number of nodes in the arena.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the arena holds no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
