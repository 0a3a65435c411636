//! Top-level-domain suffix list
//!
//! A loaded-once value passed by reference into every component that derives
//! registrable domains. The embedded default covers the common multi-part
//! suffixes; operators can substitute a fuller list from a file in the same
//! one-suffix-per-line format.

use std::collections::HashSet;
use std::io;
use std::path::Path;

/// Known multi-part public suffixes ("co.uk", "com.au", ...).
#[derive(Debug, Clone)]
pub struct TldList {
    suffixes: HashSet<String>,
}

impl TldList {
    /// Builds the list from the suffix data compiled into the binary.
    pub fn builtin() -> Self {
        Self::parse(include_str!("effective_tlds.txt"))
    }

    /// Loads a list from a file with one suffix per line.
    ///
    /// Blank lines and lines starting with `//` or `#` are skipped, matching
    /// the format published on publicsuffix.org.
    pub fn from_file(path: &Path) -> io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    fn parse(content: &str) -> Self {
        let suffixes = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with("//") && !line.starts_with('#'))
            .map(|line| line.to_lowercase())
            .collect();
        Self { suffixes }
    }

    pub fn contains(&self, suffix: &str) -> bool {
        self.suffixes.contains(suffix)
    }

    pub fn len(&self) -> usize {
        self.suffixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.suffixes.is_empty()
    }
}
