use fxhash::FxHashMap;
use std::path::Path;

use super::constants::{END_GROUP_KEY, END_OBJECT_KEY, GROUP_KEY, OBJECT_KEY};
use super::error::{LabelError, SchemaError};
use super::label_tokenizer::LabelEntry;

/// The value stored under a key in a LabelNode.
///
/// Structural sections always hold at least one node; repeated siblings with the same name
/// (several COLUMN objects, for example) are kept in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub enum LabelValue {
    Scalar(String),
    Nodes(Vec<LabelNode>),
}

/// One level of the nested label structure. Keys are kept in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelNode {
    entries: Vec<(String, LabelValue)>,
    index: FxHashMap<String, usize>,
}

impl LabelNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&LabelValue> {
        self.index.get(key).map(|idx| &self.entries[*idx].1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Get the raw string for a leaf key. Returns None if the key is missing or is a structure.
    pub fn scalar(&self, key: &str) -> Option<&str> {
        match self.get(key) {
            Some(LabelValue::Scalar(value)) => Some(value),
            _ => None,
        }
    }

    /// Get every child structure stored under key. Empty if the key is missing or is a leaf.
    pub fn children(&self, key: &str) -> &[LabelNode] {
        match self.get(key) {
            Some(LabelValue::Nodes(nodes)) => nodes,
            _ => &[],
        }
    }

    /// Get the first child structure stored under key
    pub fn child(&self, key: &str) -> Option<&LabelNode> {
        self.children(key).first()
    }

    /// Parse a leaf as an unsigned integer, ignoring any trailing unit tag like `<BYTES>`.
    ///
    /// Returns None if the key is absent.
    pub fn integer(&self, key: &str) -> Result<Option<usize>, SchemaError> {
        match self.scalar(key) {
            Some(value) => parse_integer(value)
                .map(Some)
                .ok_or_else(|| SchemaError::BadInteger {
                    field: key.to_string(),
                    value: value.to_string(),
                }),
            None => Ok(None),
        }
    }

    /// Iterate over the keys of this node in declaration order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &LabelValue)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert a leaf. A repeated leaf key overwrites the previous value.
    fn insert_scalar(&mut self, key: &str, value: &str) {
        match self.index.get(key) {
            Some(idx) => {
                spdlog::debug!("Label key {} repeated; keeping the last value", key);
                self.entries[*idx].1 = LabelValue::Scalar(value.to_string());
            }
            None => self.push(key, LabelValue::Scalar(value.to_string())),
        }
    }

    /// Append a new, empty child structure under key
    fn append_child(&mut self, key: &str) {
        match self.index.get(key) {
            Some(idx) => {
                let slot = &mut self.entries[*idx].1;
                if let LabelValue::Nodes(nodes) = slot {
                    nodes.push(LabelNode::new());
                } else {
                    spdlog::debug!("Label key {} redeclared as a structure", key);
                    *slot = LabelValue::Nodes(vec![LabelNode::new()]);
                }
            }
            None => self.push(key, LabelValue::Nodes(vec![LabelNode::new()])),
        }
    }

    /// Get the most recently appended child under key
    fn last_child_mut(&mut self, key: &str) -> Option<&mut LabelNode> {
        let idx = *self.index.get(key)?;
        match &mut self.entries[idx].1 {
            LabelValue::Nodes(nodes) => nodes.last_mut(),
            LabelValue::Scalar(_) => None,
        }
    }

    /// Insert an entry at the end of path, descending through the last sibling of each segment
    fn insert_at(&mut self, path: &[String], entry: &LabelEntry) {
        match path.split_first() {
            Some((segment, rest)) => {
                if self.last_child_mut(segment).is_none() {
                    self.append_child(segment);
                }
                if let Some(child) = self.last_child_mut(segment) {
                    child.insert_at(rest, entry);
                }
            }
            None if is_open_key(&entry.key) => self.append_child(&entry.value),
            None => self.insert_scalar(&entry.key, &entry.value),
        }
    }

    fn push(&mut self, key: &str, value: LabelValue) {
        self.index.insert(key.to_string(), self.entries.len());
        self.entries.push((key.to_string(), value));
    }
}

/// Parse an integer value, dropping a trailing unit tag
pub(crate) fn parse_integer(value: &str) -> Option<usize> {
    let number = match value.find('<') {
        Some(idx) => &value[..idx],
        None => value,
    };
    number.trim().parse().ok()
}

fn is_open_key(key: &str) -> bool {
    key == OBJECT_KEY || key == GROUP_KEY
}

fn is_close_key(key: &str) -> bool {
    key == END_OBJECT_KEY || key == END_GROUP_KEY
}

/// Fold continuation entries into the value of the nearest preceding keyed entry.
///
/// A continuation with nothing before it to attach to is dropped.
pub(crate) fn fold_continuations(entries: Vec<LabelEntry>) -> Vec<LabelEntry> {
    let mut folded: Vec<LabelEntry> = Vec::with_capacity(entries.len());
    for entry in entries {
        if !entry.is_continuation() {
            folded.push(entry);
            continue;
        }
        match folded.last_mut() {
            Some(owner) => {
                if owner.value.is_empty() {
                    owner.value = entry.value;
                } else if !entry.value.is_empty() {
                    owner.value.push(' ');
                    owner.value.push_str(&entry.value);
                }
            }
            None => spdlog::warn!("Dropping label continuation {:?} with no owner", entry.value),
        }
    }
    folded
}

/// Record the stack of open structures for every entry and drop the structure terminators
pub(crate) fn tag_depths(
    entries: Vec<LabelEntry>,
    label_path: &Path,
) -> Result<Vec<LabelEntry>, LabelError> {
    let mut stack: Vec<String> = Vec::new();
    let mut tagged: Vec<LabelEntry> = Vec::with_capacity(entries.len());
    for (idx, mut entry) in entries.into_iter().enumerate() {
        if is_close_key(&entry.key) {
            if stack.pop().is_none() {
                return Err(LabelError::UnbalancedStructure {
                    key: entry.key,
                    entry: idx,
                    file: label_path.to_path_buf(),
                });
            }
            continue;
        }
        entry.depth_path = stack.clone();
        if is_open_key(&entry.key) {
            stack.push(entry.value.clone());
        }
        tagged.push(entry);
    }

    if let Some(open) = stack.last() {
        return Err(LabelError::UnbalancedStructure {
            key: open.clone(),
            entry: tagged.len(),
            file: label_path.to_path_buf(),
        });
    }
    Ok(tagged)
}

/// Materialize tagged entries into a nested LabelNode.
///
/// Each path segment descends into the last structure appended under that name, so a new
/// OBJECT with an existing name becomes a sibling rather than replacing the previous one.
pub(crate) fn assemble(entries: &[LabelEntry]) -> LabelNode {
    let mut root = LabelNode::new();
    for entry in entries {
        root.insert_at(&entry.depth_path, entry);
    }
    root
}

/// Run all of the tree building passes over a raw entry stream
pub(crate) fn build_tree(
    entries: Vec<LabelEntry>,
    label_path: &Path,
) -> Result<LabelNode, LabelError> {
    let folded = fold_continuations(entries);
    let tagged = tag_depths(folded, label_path)?;
    Ok(assemble(&tagged))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(pairs: &[(&str, &str)]) -> Vec<LabelEntry> {
        pairs.iter().map(|(k, v)| LabelEntry::new(k, v)).collect()
    }

    fn build(pairs: &[(&str, &str)]) -> Result<LabelNode, LabelError> {
        build_tree(entries(pairs), Path::new("test.lbl"))
    }

    #[test]
    fn test_fold_continuations() {
        let folded = fold_continuations(entries(&[
            ("DESCRIPTION", "one"),
            ("", "two"),
            ("", "three"),
            ("NOTE", ""),
            ("", "four"),
        ]));
        assert_eq!(
            folded,
            entries(&[("DESCRIPTION", "one two three"), ("NOTE", "four")])
        );
        assert!(folded.iter().all(|e| !e.key.is_empty()));
    }

    #[test]
    fn test_fold_is_idempotent() {
        let once = fold_continuations(entries(&[("A", "x"), ("", "y"), ("B", "z")]));
        let twice = fold_continuations(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_depth_paths() {
        let tagged = tag_depths(
            entries(&[
                ("RECORD_BYTES", "512"),
                ("OBJECT", "TABLE"),
                ("ROWS", "3"),
                ("OBJECT", "COLUMN"),
                ("NAME", "TIME"),
                ("END_OBJECT", "COLUMN"),
                ("END_OBJECT", "TABLE"),
            ]),
            Path::new("test.lbl"),
        )
        .unwrap();
        let paths: Vec<Vec<String>> = tagged.iter().map(|e| e.depth_path.clone()).collect();
        assert_eq!(tagged.len(), 5);
        assert!(paths[0].is_empty());
        assert!(paths[1].is_empty());
        assert_eq!(paths[2], vec!["TABLE"]);
        assert_eq!(paths[3], vec!["TABLE"]);
        assert_eq!(paths[4], vec!["TABLE", "COLUMN"]);
    }

    #[test]
    fn test_unbalanced_close() {
        let result = build(&[("OBJECT", "TABLE"), ("END_OBJECT", ""), ("END_OBJECT", "")]);
        match result {
            Err(LabelError::UnbalancedStructure { key, entry, .. }) => {
                assert_eq!(key, "END_OBJECT");
                assert_eq!(entry, 2);
            }
            other => panic!("Expected UnbalancedStructure, got {other:?}"),
        }
    }

    #[test]
    fn test_unclosed_structure() {
        assert!(matches!(
            build(&[("OBJECT", "TABLE"), ("ROWS", "1")]),
            Err(LabelError::UnbalancedStructure { .. })
        ));
    }

    #[test]
    fn test_repeated_siblings() {
        let root = build(&[
            ("OBJECT", "TABLE"),
            ("OBJECT", "COLUMN"),
            ("NAME", "A"),
            ("END_OBJECT", "COLUMN"),
            ("OBJECT", "COLUMN"),
            ("NAME", "B"),
            ("END_OBJECT", "COLUMN"),
            ("OBJECT", "COLUMN"),
            ("NAME", "C"),
            ("END_OBJECT", "COLUMN"),
            ("END_OBJECT", "TABLE"),
        ])
        .unwrap();
        let table = root.child("TABLE").unwrap();
        let names: Vec<&str> = table
            .children("COLUMN")
            .iter()
            .map(|c| c.scalar("NAME").unwrap())
            .collect();
        assert_eq!(names, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_single_structure_is_sequence() {
        let root = build(&[("OBJECT", "TABLE"), ("END_OBJECT", "TABLE")]).unwrap();
        match root.get("TABLE") {
            Some(LabelValue::Nodes(nodes)) => assert_eq!(nodes.len(), 1),
            other => panic!("Expected a structure, got {other:?}"),
        }
    }

    #[test]
    fn test_repeated_tables_nest_correctly() {
        let root = build(&[
            ("OBJECT", "TABLE"),
            ("ROWS", "1"),
            ("OBJECT", "COLUMN"),
            ("NAME", "A"),
            ("END_OBJECT", "COLUMN"),
            ("END_OBJECT", "TABLE"),
            ("OBJECT", "TABLE"),
            ("ROWS", "2"),
            ("OBJECT", "COLUMN"),
            ("NAME", "B"),
            ("END_OBJECT", "COLUMN"),
            ("END_OBJECT", "TABLE"),
        ])
        .unwrap();
        let tables = root.children("TABLE");
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].scalar("ROWS"), Some("1"));
        assert_eq!(tables[1].scalar("ROWS"), Some("2"));
        assert_eq!(tables[1].children("COLUMN").len(), 1);
        assert_eq!(
            tables[1].child("COLUMN").unwrap().scalar("NAME"),
            Some("B")
        );
    }

    #[test]
    fn test_groups_are_structures() {
        let root = build(&[
            ("GROUP", "PARAMETERS"),
            ("GAIN", "2"),
            ("END_GROUP", "PARAMETERS"),
        ])
        .unwrap();
        assert_eq!(
            root.child("PARAMETERS").unwrap().scalar("GAIN"),
            Some("2")
        );
    }

    #[test]
    fn test_integer_values() {
        let root = build(&[("RECORD_BYTES", "512 <BYTES>"), ("ROWS", "twelve")]).unwrap();
        assert_eq!(root.integer("RECORD_BYTES").unwrap(), Some(512));
        assert_eq!(root.integer("MISSING").unwrap(), None);
        assert!(matches!(
            root.integer("ROWS"),
            Err(SchemaError::BadInteger { .. })
        ));
        assert_eq!(root.keys().collect::<Vec<&str>>(), vec!["RECORD_BYTES", "ROWS"]);
    }
}
