use fxhash::FxHashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use super::constants::{
    COMMENT_END, COMMENT_MARKER, END_GROUP_KEY, END_MARKER, END_OBJECT_KEY, QUOTE_CHARS,
    STRUCTURE_KEY,
};
use super::error::LabelError;

/// A single raw key/value pair read from a label.
///
/// Continuation lines are emitted with an empty key and folded into their owner by the
/// tree builder. The depth path is filled in by the tree builder as well.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct LabelEntry {
    pub key: String,
    pub value: String,
    pub depth_path: Vec<String>,
}

impl LabelEntry {
    pub fn new(key: &str, value: &str) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
            depth_path: Vec::new(),
        }
    }

    pub fn is_continuation(&self) -> bool {
        self.key.is_empty()
    }
}

/// Reads label files into a flat stream of LabelEntries.
///
/// External fragments named by `^STRUCTURE` are tokenized recursively and spliced into the
/// stream where they are referenced. Fragments are looked up in the override table first,
/// then next to the label that includes them.
#[derive(Debug)]
pub(crate) struct LabelTokenizer<'a> {
    overrides: &'a FxHashMap<String, PathBuf>,
    include_stack: Vec<PathBuf>,
}

impl<'a> LabelTokenizer<'a> {
    pub fn new(overrides: &'a FxHashMap<String, PathBuf>) -> Self {
        Self {
            overrides,
            include_stack: Vec::new(),
        }
    }

    /// Tokenize the label at path, expanding any included fragments
    pub fn tokenize(&mut self, path: &Path) -> Result<Vec<LabelEntry>, LabelError> {
        let mut entries = Vec::new();
        self.tokenize_into(path, &mut entries)?;
        Ok(entries)
    }

    fn tokenize_into(
        &mut self,
        path: &Path,
        entries: &mut Vec<LabelEntry>,
    ) -> Result<(), LabelError> {
        if !path.exists() {
            return Err(LabelError::BadFilePath(path.to_path_buf()));
        }
        let canonical = path.canonicalize()?;
        if self.include_stack.contains(&canonical) {
            return Err(LabelError::IncludeCycle(path.to_path_buf()));
        }
        self.include_stack.push(canonical);

        // Labels can be attached to binary data, so we only decode up to END and tolerate
        // the odd invalid byte along the way.
        let mut reader = BufReader::new(File::open(path)?);
        let mut buffer: Vec<u8> = Vec::new();
        loop {
            buffer.clear();
            if reader.read_until(b'\n', &mut buffer)? == 0 {
                break;
            }
            let raw = String::from_utf8_lossy(&buffer);
            let line = raw.trim();
            if line == END_MARKER {
                break;
            }
            if line.is_empty() || line.starts_with(COMMENT_MARKER) {
                continue;
            }

            let entry = parse_line(line);
            if entry.key == STRUCTURE_KEY {
                let fragment = self.resolve_include(&entry.value, path)?;
                spdlog::debug!("Splicing structure {} from {:?}", entry.value, fragment);
                self.tokenize_into(&fragment, entries)?;
            } else {
                entries.push(entry);
            }
        }

        self.include_stack.pop();
        Ok(())
    }

    /// Find the file for an included fragment
    fn resolve_include(&self, name: &str, including_file: &Path) -> Result<PathBuf, LabelError> {
        if let Some(path) = self.overrides.get(name) {
            if path.exists() {
                return Ok(path.clone());
            }
        }

        let parent = including_file.parent().unwrap_or_else(|| Path::new("."));
        [
            name.to_string(),
            name.to_lowercase(),
            name.to_uppercase(),
        ]
        .iter()
        .map(|candidate| parent.join(candidate))
        .find(|candidate| candidate.exists())
        .ok_or_else(|| LabelError::MissingInclude {
            name: name.to_string(),
            including_file: including_file.to_path_buf(),
        })
    }
}

/// Split a single trimmed, non-empty label line into an entry
fn parse_line(line: &str) -> LabelEntry {
    match line.split_once('=') {
        Some((key, value)) => LabelEntry::new(key.trim(), &clean_value(value)),
        None if line == END_OBJECT_KEY || line == END_GROUP_KEY => LabelEntry::new(line, ""),
        None => LabelEntry::new("", &clean_value(line)),
    }
}

/// Strip any trailing comment, surrounding whitespace and quote characters from a value
fn clean_value(value: &str) -> String {
    let mut value = value;
    if let Some(idx) = value.find(COMMENT_MARKER) {
        // Only a comment if we are not sitting inside a quoted string
        let before = &value[..idx];
        if before.matches('"').count() % 2 == 0 && value[idx..].contains(COMMENT_END) {
            value = before;
        }
    }
    value
        .trim()
        .trim_matches(&QUOTE_CHARS[..])
        .trim()
        .to_string()
}
