//! Configuration for the transformation pipeline.
//!
//! Each stage has its own configuration type; [`PipelineConfig`] bundles them and
//! decides which stages run. A stage whose configuration is absent is simply not
//! scheduled.
//!
//! Scalar options must be given exactly once. Front ends that collect options from
//! repeated flags route them through [`require_single`] before building these types, so
//! duplicates and omissions are reported before any transformation runs.

use std::path::PathBuf;

use crate::Result;

/// Default bound on the number of loops the scheduler offers a pass per function.
pub const DEFAULT_MAX_ITERATIONS: usize = 64;

/// Name of the side-table collection section records are stored in.
pub const SECTIONS_METADATA: &str = "sections";

/// Returns the single value supplied for `option`.
///
/// # Errors
///
/// Returns [`crate::Error::Config`] if `values` is empty or holds more than one entry.
///
/// # Examples
///
/// ```rust
/// use binlift::config::require_single;
///
/// assert_eq!(require_single("count", &[4]).unwrap(), 4);
/// assert!(require_single::<u32>("count", &[]).is_err());
/// assert!(require_single("count", &[1, 2]).is_err());
/// ```
pub fn require_single<T: Clone>(option: &str, values: &[T]) -> Result<T> {
    match values {
        [value] => Ok(value.clone()),
        [] => Err(config_error!("option '{}' is required", option)),
        _ => Err(config_error!(
            "option '{}' may only be given once, got {} values",
            option,
            values.len()
        )),
    }
}

/// Configuration of the dispatch-loop untangler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UntangleConfig {
    /// Function holding the interpretation loop.
    pub entry_function: String,
    /// Global variable whose loaded value drives the dispatch switch.
    pub vpc_global: String,
    /// Execution traces, merged in this order.
    pub trace_files: Vec<PathBuf>,
}

impl UntangleConfig {
    /// Creates a configuration without trace files.
    #[must_use]
    pub fn new(entry_function: impl Into<String>, vpc_global: impl Into<String>) -> Self {
        Self {
            entry_function: entry_function.into(),
            vpc_global: vpc_global.into(),
            trace_files: Vec::new(),
        }
    }

    /// Appends a trace file.
    #[must_use]
    pub fn with_trace(mut self, path: impl Into<PathBuf>) -> Self {
        self.trace_files.push(path.into());
        self
    }

    /// Replaces the trace file list.
    #[must_use]
    pub fn with_traces<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.trace_files = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Checks that the required names are present.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] naming the first empty option.
    pub fn validate(&self) -> Result<()> {
        if self.entry_function.is_empty() {
            return Err(config_error!("untangle: entry function name is empty"));
        }
        if self.vpc_global.is_empty() {
            return Err(config_error!("untangle: VPC global name is empty"));
        }
        Ok(())
    }
}

/// Configuration of the structural loop unroller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnrollConfig {
    /// Number of copies of the loop body after unrolling; 1 leaves the loop as is.
    pub count: usize,
    /// Label of the loop header to unroll.
    ///
    /// Copies are labelled `<label>.<i>`; unrolling fails if one of those labels is
    /// already taken.
    pub header_label: String,
}

impl Default for UnrollConfig {
    fn default() -> Self {
        Self {
            count: 1,
            header_label: String::new(),
        }
    }
}

impl UnrollConfig {
    /// Creates a configuration unrolling the loop headed by `header_label` `count` times.
    #[must_use]
    pub fn new(count: usize, header_label: impl Into<String>) -> Self {
        Self {
            count,
            header_label: header_label.into(),
        }
    }

    /// Checks the count and label.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] for a zero count or an empty label.
    pub fn validate(&self) -> Result<()> {
        if self.count == 0 {
            return Err(config_error!("unroll: count must be at least 1"));
        }
        if self.header_label.is_empty() {
            return Err(config_error!("unroll: header label is empty"));
        }
        Ok(())
    }
}

/// Which stages run, and how.
///
/// Stages always run in the order sections → unroll → untangle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Embed the source binary's sections into the module.
    pub sections: bool,
    /// Unroll a loop before untangling.
    pub unroll: Option<UnrollConfig>,
    /// Untangle the interpretation loop.
    pub untangle: Option<UntangleConfig>,
    /// Bound on the loops offered to a pass per function.
    pub max_iterations: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sections: false,
            unroll: None,
            untangle: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration with every stage disabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables section embedding.
    #[must_use]
    pub fn with_sections(mut self, enable: bool) -> Self {
        self.sections = enable;
        self
    }

    /// Enables the unroller.
    #[must_use]
    pub fn with_unroll(mut self, unroll: UnrollConfig) -> Self {
        self.unroll = Some(unroll);
        self
    }

    /// Enables the untangler.
    #[must_use]
    pub fn with_untangle(mut self, untangle: UntangleConfig) -> Self {
        self.untangle = Some(untangle);
        self
    }

    /// Sets the per-function loop bound.
    #[must_use]
    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    /// Validates every enabled stage.
    ///
    /// # Errors
    ///
    /// Returns the first [`crate::Error::Config`] found.
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(config_error!("max iterations must be at least 1"));
        }
        if let Some(unroll) = &self.unroll {
            unroll.validate()?;
        }
        if let Some(untangle) = &self.untangle {
            untangle.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_require_single() {
        assert_eq!(require_single("vpc", &["pc".to_string()]).unwrap(), "pc");

        let missing = require_single::<String>("vpc", &[]).unwrap_err();
        assert!(matches!(missing, Error::Config(ref m) if m.contains("required")));

        let repeated = require_single("vpc", &["a", "b"]).unwrap_err();
        assert!(matches!(repeated, Error::Config(ref m) if m.contains("once")));
    }

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert!(!config.sections);
        assert!(config.unroll.is_none());
        assert!(config.untangle.is_none());
        assert_eq!(config.max_iterations, DEFAULT_MAX_ITERATIONS);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = PipelineConfig::new()
            .with_sections(true)
            .with_unroll(UnrollConfig::new(4, "dispatch"))
            .with_untangle(UntangleConfig::new("main", "vpc").with_trace("a.trace"))
            .with_max_iterations(8);

        assert!(config.sections);
        assert_eq!(config.unroll.as_ref().map(|u| u.count), Some(4));
        assert_eq!(
            config.untangle.as_ref().map(|u| u.trace_files.len()),
            Some(1)
        );
        assert_eq!(config.max_iterations, 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_errors() {
        let zero = PipelineConfig::new().with_unroll(UnrollConfig::new(0, "h"));
        assert!(matches!(zero.validate(), Err(Error::Config(_))));

        let unnamed = PipelineConfig::new().with_untangle(UntangleConfig::new("", "vpc"));
        assert!(matches!(unnamed.validate(), Err(Error::Config(_))));

        let no_iterations = PipelineConfig::new().with_max_iterations(0);
        assert!(matches!(no_iterations.validate(), Err(Error::Config(_))));
    }
}
