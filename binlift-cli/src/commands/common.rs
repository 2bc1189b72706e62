use std::path::Path;

use anyhow::Context;
use binlift::ir::Module;

/// Load a module from its JSON form.
pub fn load_module(path: &Path) -> anyhow::Result<Module> {
    Module::load(path).with_context(|| format!("failed to load module: {}", path.display()))
}

/// Write `module` to `output`, or back to `input` when no output was given.
pub fn save_module(module: &Module, input: &Path, output: Option<&Path>) -> anyhow::Result<()> {
    let target = output.unwrap_or(input);
    module
        .save(target)
        .with_context(|| format!("failed to write module: {}", target.display()))
}

/// Extract a display-friendly filename from a path.
pub fn file_display_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |f| f.to_string_lossy().to_string(),
    )
}
