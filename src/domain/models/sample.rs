//! Samples drawn from a package for one day.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Zero-based line/character position in a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    pub const fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// Syntactic role of the sampled token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    /// A name bound by an import statement
    ImportedName,
    /// Attribute access on an imported module (`os.path`)
    ImportedAttribute,
    /// Any other attribute access
    Attribute,
    /// Any other identifier
    Name,
}

impl SymbolKind {
    pub const fn is_imported(self) -> bool {
        matches!(self, Self::ImportedName | Self::ImportedAttribute)
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ImportedName => "imported_name",
            Self::ImportedAttribute => "imported_attr",
            Self::Attribute => "attr",
            Self::Name => "name",
        };
        f.write_str(s)
    }
}

/// A (file, symbol position) pair exercised against every checker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sample {
    /// Path relative to the package root
    pub file: PathBuf,
    pub position: Position,
    pub token: String,
    pub kind: SymbolKind,
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{} token={} kind={}",
            self.file.display(),
            self.position.line + 1,
            self.position.character + 1,
            self.token,
            self.kind
        )
    }
}
