use serde::{Deserialize, Serialize};

use crate::dex::error::DexError;
use crate::patch::exclude::ClassFilter;

/// Options for patch generation. Application takes none: everything it needs is in the
/// patch file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DexPatchConfig {
    /// Dotted class names or descriptors, with `*` and `?` wildcards. Matching classes are
    /// left out of the patched container.
    pub excluded_class_patterns: Vec<String>,
    /// Fail instead of warning when retained data still references an excluded class.
    pub strict_exclusions: bool,
}

impl DexPatchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exclude(mut self, pattern: &str) -> Self {
        self.excluded_class_patterns.push(pattern.to_string());
        self
    }

    pub fn strict_exclusions(mut self, strict: bool) -> Self {
        self.strict_exclusions = strict;
        self
    }

    pub(crate) fn class_filter(&self) -> Result<ClassFilter, DexError> {
        ClassFilter::new(&self.excluded_class_patterns)
    }
}
