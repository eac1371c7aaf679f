//! Deterministic sample selection.
//!
//! The random stream for a package is seeded from `"{name}:{date}"`, so every
//! checker sees the same samples on the same day and a day can be replayed
//! exactly. Symbol positions come from a lexical scan of the source file that
//! prefers names bound by imports, which are the tokens most likely to have a
//! resolvable definition.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::domain::errors::SamplingError;
use crate::domain::models::{Package, Position, Sample, SymbolKind};

/// Directory names never descended into.
const EXCLUDED_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    ".venv",
    "venv",
    ".tox",
    "__pycache__",
    ".mypy_cache",
    ".pytest_cache",
    ".ruff_cache",
    "node_modules",
    "build",
    "dist",
    ".eggs",
    ".idea",
    ".vscode",
];

const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global",
    "if", "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return",
    "try", "while", "with", "yield",
];

/// Builtins that resolve to the same stub everywhere and add only noise.
const BANNED: &[&str] = &[
    "self", "cls", "int", "str", "float", "bool", "list", "dict", "set", "tuple", "object",
];

const STRING_PREFIXES: &[&str] = &["r", "u", "f", "b", "br", "rb", "fr", "rf"];

/// Result of scanning a package working copy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceScan {
    /// Sorted `.py` paths relative to the root
    pub candidate_files: Vec<PathBuf>,
    /// A `py.typed` marker exists
    pub has_inline_annotations: bool,
}

fn is_excluded(name: &str) -> bool {
    EXCLUDED_DIRS.iter().any(|d| d.eq_ignore_ascii_case(name))
}

/// Walk `root` and collect the files eligible for sampling.
pub fn scan_sources(root: &Path) -> Result<SourceScan, SamplingError> {
    if !root.is_dir() {
        return Err(SamplingError::ScanFailed {
            path: root.to_path_buf(),
            message: "not a directory".to_string(),
        });
    }

    let mut scan = SourceScan::default();
    let walker = WalkDir::new(root).follow_links(false).into_iter();
    for entry in walker.filter_entry(|e| {
        e.depth() == 0 || !(e.file_type().is_dir() && is_excluded(&e.file_name().to_string_lossy()))
    }) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                debug!(root = %root.display(), error = %err, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if name == "py.typed" {
            scan.has_inline_annotations = true;
        } else if name.ends_with(".py") {
            if let Ok(relative) = entry.path().strip_prefix(root) {
                scan.candidate_files.push(relative.to_path_buf());
            }
        }
    }
    scan.candidate_files.sort();
    Ok(scan)
}

/// Sorted `.py` files under `root`, relative to it.
pub fn discover_candidate_files(root: &Path) -> Result<Vec<PathBuf>, SamplingError> {
    scan_sources(root).map(|scan| scan.candidate_files)
}

/// 32-byte seed for a (package, date) pair.
pub fn seed_for(package: &str, date: NaiveDate) -> [u8; 32] {
    let digest = Sha256::digest(format!("{package}:{}", date.format("%Y-%m-%d")).as_bytes());
    digest.into()
}

/// Draw `count` samples from `package` for `seed_date`.
pub fn select_samples(
    package: &Package,
    seed_date: NaiveDate,
    count: usize,
    max_file_tries: usize,
) -> Result<SampleSet, SamplingError> {
    if package.candidate_files.is_empty() {
        return Err(SamplingError::NoEligibleFiles(package.name().to_string()));
    }
    Ok(SampleSet {
        package: package.name().to_string(),
        root: package.root.clone(),
        files: package.candidate_files.clone().into(),
        seed: seed_for(package.name(), seed_date),
        count,
        max_file_tries: max_file_tries.max(1),
    })
}

/// A finite, restartable sequence of samples.
///
/// Nothing is read from disk until the sequence is iterated, and every call to
/// [`SampleSet::iter`] replays the same samples.
#[derive(Debug, Clone)]
pub struct SampleSet {
    package: String,
    root: PathBuf,
    files: Arc<[PathBuf]>,
    seed: [u8; 32],
    count: usize,
    max_file_tries: usize,
}

impl SampleSet {
    /// Number of samples requested.
    pub const fn requested(&self) -> usize {
        self.count
    }

    pub fn iter(&self) -> SampleIter<'_> {
        SampleIter {
            set: self,
            rng: StdRng::from_seed(self.seed),
            produced: 0,
            exhausted: false,
        }
    }
}

impl<'a> IntoIterator for &'a SampleSet {
    type Item = Sample;
    type IntoIter = SampleIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over a [`SampleSet`].
pub struct SampleIter<'a> {
    set: &'a SampleSet,
    rng: StdRng,
    produced: usize,
    exhausted: bool,
}

impl Iterator for SampleIter<'_> {
    type Item = Sample;

    fn next(&mut self) -> Option<Sample> {
        if self.exhausted || self.produced >= self.set.count {
            return None;
        }

        for _ in 0..self.set.max_file_tries {
            let index = self.rng.random_range(0..self.set.files.len());
            let relative = &self.set.files[index];
            let Ok(bytes) = std::fs::read(self.set.root.join(relative)) else {
                continue;
            };
            let text = String::from_utf8_lossy(&bytes);
            let occurrences = collect_occurrences(&text);
            if occurrences.is_empty() {
                continue;
            }

            let preferred: Vec<&Occurrence> =
                occurrences.iter().filter(|o| o.kind.is_imported()).collect();
            let pool: Vec<&Occurrence> = if preferred.is_empty() {
                occurrences.iter().collect()
            } else {
                preferred
            };
            let Some(picked) = pool.choose(&mut self.rng) else {
                continue;
            };

            self.produced += 1;
            return Some(Sample {
                file: relative.clone(),
                position: picked.position,
                token: picked.token.clone(),
                kind: picked.kind,
            });
        }

        warn!(
            package = %self.set.package,
            tries = self.set.max_file_tries,
            "no usable symbol found, sample set ends early"
        );
        self.exhausted = true;
        None
    }
}

/// A candidate symbol occurrence in a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occurrence {
    pub position: Position,
    pub token: String,
    pub kind: SymbolKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Token {
    text: String,
    /// Byte offset in the line
    start: usize,
    after_dot: bool,
}

#[derive(Debug, Default)]
struct Imports {
    names: HashSet<String>,
    modules: HashSet<String>,
    /// Lines (0-based) belonging to import statements
    lines: HashSet<usize>,
}

/// Collect candidate symbol occurrences from Python source text.
///
/// Positions use UTF-16 code units for the character offset, as LSP expects.
pub fn collect_occurrences(text: &str) -> Vec<Occurrence> {
    let lines: Vec<Vec<Token>> = tokenize(text);
    let raw_lines: Vec<&str> = text.lines().collect();
    let imports = collect_imports(&lines, &raw_lines);

    let mut out = Vec::new();
    for (line_no, tokens) in lines.iter().enumerate() {
        if imports.lines.contains(&line_no) {
            continue;
        }
        for (i, token) in tokens.iter().enumerate() {
            let word = token.text.as_str();
            if KEYWORDS.contains(&word) || BANNED.contains(&word) {
                continue;
            }
            let kind = if token.after_dot {
                let base_is_module = i > 0
                    && !tokens[i - 1].after_dot
                    && imports.modules.contains(&tokens[i - 1].text);
                if base_is_module {
                    SymbolKind::ImportedAttribute
                } else {
                    SymbolKind::Attribute
                }
            } else if imports.names.contains(word) {
                SymbolKind::ImportedName
            } else {
                SymbolKind::Name
            };

            let line_text = raw_lines.get(line_no).copied().unwrap_or("");
            let character = utf16_column(line_text, token.start);
            out.push(Occurrence {
                position: Position::new(
                    u32::try_from(line_no).unwrap_or(u32::MAX),
                    character,
                ),
                token: token.text.clone(),
                kind,
            });
        }
    }
    out
}

fn utf16_column(line: &str, byte_offset: usize) -> u32 {
    let prefix = line.get(..byte_offset).unwrap_or(line);
    u32::try_from(prefix.encode_utf16().count()).unwrap_or(u32::MAX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Continuation {
    None,
    /// Inside `from x import (...)`
    Parenthesized,
    /// Previous `from` line ended with a backslash
    FromBackslash,
    /// Previous `import` line ended with a backslash
    ImportBackslash,
}

fn collect_imports(lines: &[Vec<Token>], raw: &[&str]) -> Imports {
    let mut imports = Imports::default();
    let mut continuation = Continuation::None;

    for (line_no, tokens) in lines.iter().enumerate() {
        let code = raw
            .get(line_no)
            .and_then(|l| l.split('#').next())
            .unwrap_or("")
            .trim_end();
        let words: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        let backslash = code.ends_with('\\');

        match continuation {
            Continuation::Parenthesized => {
                imports.lines.insert(line_no);
                bind_from_names(&words, &mut imports.names);
                if code.contains(')') {
                    continuation = Continuation::None;
                }
                continue;
            }
            Continuation::FromBackslash => {
                imports.lines.insert(line_no);
                bind_from_names(&words, &mut imports.names);
                if !backslash {
                    continuation = Continuation::None;
                }
                continue;
            }
            Continuation::ImportBackslash => {
                imports.lines.insert(line_no);
                bind_import_names(tokens, &mut imports);
                if !backslash {
                    continuation = Continuation::None;
                }
                continue;
            }
            Continuation::None => {}
        }

        match words.first() {
            Some(&"import") => {
                imports.lines.insert(line_no);
                bind_import_names(&tokens[1..], &mut imports);
                if backslash {
                    continuation = Continuation::ImportBackslash;
                }
            }
            Some(&"from") => {
                imports.lines.insert(line_no);
                if let Some(pos) = words.iter().position(|w| *w == "import") {
                    bind_from_names(&words[pos + 1..], &mut imports.names);
                }
                if code.contains('(') && !code.contains(')') {
                    continuation = Continuation::Parenthesized;
                } else if backslash {
                    continuation = Continuation::FromBackslash;
                }
            }
            _ => {}
        }
    }
    imports
}

/// `import a.b as c, d` binds `c` and `d` (module names).
fn bind_import_names(tokens: &[Token], imports: &mut Imports) {
    let mut i = 0;
    while i < tokens.len() {
        if tokens[i].after_dot {
            i += 1;
            continue;
        }
        let head = tokens[i].text.clone();
        let mut j = i + 1;
        while j < tokens.len() && tokens[j].after_dot {
            j += 1;
        }
        let bound = if j + 1 < tokens.len() && tokens[j].text == "as" {
            let alias = tokens[j + 1].text.clone();
            j += 2;
            alias
        } else {
            head
        };
        imports.names.insert(bound.clone());
        imports.modules.insert(bound);
        i = j;
    }
}

/// `from x import a as b, c` binds `b` and `c`.
fn bind_from_names(words: &[&str], names: &mut HashSet<String>) {
    let mut i = 0;
    while i < words.len() {
        if words.get(i + 1) == Some(&"as") {
            if let Some(alias) = words.get(i + 2) {
                names.insert((*alias).to_string());
            }
            i += 3;
        } else {
            if words[i] != "as" {
                names.insert(words[i].to_string());
            }
            i += 1;
        }
    }
}

/// Split source text into identifier tokens per line, skipping comments and
/// string literals (including multi-line triple-quoted strings).
fn tokenize(text: &str) -> Vec<Vec<Token>> {
    let mut result = Vec::new();
    let mut open_triple: Option<&'static str> = None;

    for line in text.lines() {
        let mut tokens = Vec::new();
        let bytes = line.as_bytes();
        let mut i = 0;
        let mut last_significant: Option<u8> = None;

        if let Some(delim) = open_triple {
            if let Some(end) = line.find(delim) {
                i = end + delim.len();
                open_triple = None;
            } else {
                result.push(tokens);
                continue;
            }
        }

        while i < bytes.len() {
            let c = bytes[i];
            match c {
                b'#' => break,
                b'"' | b'\'' => {
                    let (next, triple) = skip_string(line, i);
                    if let Some(delim) = triple {
                        open_triple = Some(delim);
                        i = bytes.len();
                    } else {
                        i = next;
                    }
                    last_significant = Some(c);
                }
                c if c == b'_' || c.is_ascii_alphabetic() || c >= 0x80 => {
                    let start = i;
                    while i < bytes.len()
                        && (bytes[i] == b'_' || bytes[i].is_ascii_alphanumeric() || bytes[i] >= 0x80)
                    {
                        i += 1;
                    }
                    let word = &line[start..i];
                    let is_prefix = i < bytes.len()
                        && (bytes[i] == b'"' || bytes[i] == b'\'')
                        && STRING_PREFIXES.contains(&word.to_ascii_lowercase().as_str());
                    if !is_prefix && word.chars().next().is_some_and(|ch| ch == '_' || ch.is_alphabetic()) {
                        tokens.push(Token {
                            text: word.to_string(),
                            start,
                            after_dot: last_significant == Some(b'.'),
                        });
                    }
                    last_significant = Some(b'a');
                }
                b' ' | b'\t' => i += 1,
                _ => {
                    if c.is_ascii_digit() {
                        while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'.' || bytes[i] == b'_') {
                            i += 1;
                        }
                        last_significant = Some(b'0');
                        continue;
                    }
                    last_significant = Some(c);
                    i += 1;
                }
            }
        }
        result.push(tokens);
    }
    result
}

/// Skip the string literal starting at byte `start`. Returns the offset after
/// it, or the delimiter of a triple-quoted string left open at end of line.
fn skip_string(line: &str, start: usize) -> (usize, Option<&'static str>) {
    let bytes = line.as_bytes();
    let quote = bytes[start];
    let triple: &'static str = if quote == b'"' { "\"\"\"" } else { "'''" };

    if line[start..].starts_with(triple) {
        let body = start + 3;
        return match line[body..].find(triple) {
            Some(end) => (body + end + 3, None),
            None => (bytes.len(), Some(triple)),
        };
    }

    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return (i + 1, None),
            _ => i += 1,
        }
    }
    (bytes.len(), None)
}
