//! The top-level IR container.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    ir::{Function, GlobalId, GlobalVariable, Initializer, MetadataTable},
    Result,
};

/// A lifted program: functions, global data objects and the metadata side-table.
///
/// The module owns everything transitively. Blocks, values and globals created by the
/// transformation passes become part of it and live as long as it does. `source_path`
/// records the binary the module was lifted from; raw section contents are read from there.
///
/// The whole module, side-table included, round-trips through JSON with
/// [`Module::save`] and [`Module::load`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    /// Module name.
    pub name: String,
    /// Path of the binary this module was lifted from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<PathBuf>,
    functions: Vec<Function>,
    globals: Vec<GlobalVariable>,
    next_global: usize,
    /// Set by the first section copy. Section globals are inserted ahead of the anchor so
    /// they keep their embedding order in front of the original globals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) section_anchor: Option<SectionAnchor>,
    /// Side-table of typed records.
    #[serde(default)]
    pub metadata: MetadataTable,
}

/// Insertion point for embedded section globals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum SectionAnchor {
    /// Ahead of the first global that existed when sections were first embedded.
    Before(GlobalId),
    /// At the end of the list; the module had no globals yet.
    End,
}

impl Module {
    /// Creates an empty module.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the source binary path.
    #[must_use]
    pub fn with_source_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_path = Some(path.into());
        self
    }

    /// Adds a function and returns its index.
    pub fn add_function(&mut self, function: Function) -> usize {
        self.functions.push(function);
        self.functions.len() - 1
    }

    /// All functions.
    #[must_use]
    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    /// Returns the function at `index`.
    #[must_use]
    pub fn function(&self, index: usize) -> Option<&Function> {
        self.functions.get(index)
    }

    /// Returns the function at `index` mutably.
    pub fn function_mut(&mut self, index: usize) -> Option<&mut Function> {
        self.functions.get_mut(index)
    }

    /// Returns the index of the function named `name`.
    #[must_use]
    pub fn function_by_name(&self, name: &str) -> Option<usize> {
        self.functions.iter().position(|function| function.name == name)
    }

    fn allocate_global(&mut self, name: impl Into<String>, initializer: Initializer) -> GlobalVariable {
        let id = GlobalId::new(self.next_global);
        self.next_global += 1;
        GlobalVariable {
            id,
            name: name.into(),
            initializer,
            section: None,
            align: 1,
            readonly: false,
        }
    }

    /// Appends a mutable global and returns its id.
    pub fn add_global(&mut self, name: impl Into<String>, initializer: Initializer) -> GlobalId {
        let global = self.allocate_global(name, initializer);
        let id = global.id;
        self.globals.push(global);
        id
    }

    /// Inserts a new global at list position `index` (clamped to the list length) and
    /// returns its id.
    pub fn insert_global(
        &mut self,
        index: usize,
        name: impl Into<String>,
        initializer: Initializer,
    ) -> GlobalId {
        let global = self.allocate_global(name, initializer);
        let id = global.id;
        let index = index.min(self.globals.len());
        self.globals.insert(index, global);
        id
    }

    /// All globals in list order.
    #[must_use]
    pub fn globals(&self) -> &[GlobalVariable] {
        &self.globals
    }

    /// Returns the global with the given id.
    #[must_use]
    pub fn global(&self, id: GlobalId) -> Option<&GlobalVariable> {
        self.globals.iter().find(|global| global.id == id)
    }

    /// Returns the global with the given id mutably.
    pub fn global_mut(&mut self, id: GlobalId) -> Option<&mut GlobalVariable> {
        self.globals.iter_mut().find(|global| global.id == id)
    }

    /// Returns the id of the global named `name`.
    #[must_use]
    pub fn global_by_name(&self, name: &str) -> Option<GlobalId> {
        self.globals
            .iter()
            .find(|global| global.name == name)
            .map(|global| global.id)
    }

    /// Returns the list position of the global with the given id.
    #[must_use]
    pub fn global_position(&self, id: GlobalId) -> Option<usize> {
        self.globals.iter().position(|global| global.id == id)
    }

    /// Parses a module from its JSON form.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes the module to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Loads a module from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Writes the module to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_ids_survive_reordering() {
        let mut module = Module::new("m");
        let a = module.add_global("a", Initializer::Zero(8));
        let b = module.insert_global(0, "b", Initializer::Bytes(vec![1, 2]));

        assert_eq!(module.global_position(b), Some(0));
        assert_eq!(module.global_position(a), Some(1));
        assert_eq!(module.global(a).map(|g| g.name.as_str()), Some("a"));
        assert_eq!(module.global_by_name("b"), Some(b));
    }

    #[test]
    fn test_json_round_trip() {
        let mut module = Module::new("m").with_source_path("/bin/true");
        module.add_global("vpc", Initializer::Zero(4));
        module.add_function(Function::new("main"));

        let json = module.to_json().unwrap();
        let back = Module::from_json(&json).unwrap();
        assert_eq!(back, module);
    }
}
