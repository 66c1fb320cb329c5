use std::path::{Path, PathBuf};

use super::constants::{BYTES_UNIT_TAG, POINTER_PREFIX, QUOTE_CHARS, RECORD_BYTES_KEY};
use super::error::PointerError;
use super::label_tree::{parse_integer, LabelNode, LabelValue};

/// A resolved `^NAME` entry: which file a section lives in and where it starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pointer {
    pub target_key: String,
    pub file_name: String,
    pub file_path: PathBuf,
    pub byte_offset: u64,
}

/// Where a pointer's offset is measured from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Offset {
    Records(u64),
    Bytes(u64),
}

/// All of the pointers declared at the top level of a label, in declaration order
#[derive(Debug, Clone, Default)]
pub struct PointerTable {
    pointers: Vec<Pointer>,
}

impl PointerTable {
    /// Scan the top level of the label for pointers.
    ///
    /// File names are resolved relative to the directory holding the label. Pointers given as
    /// a bare offset refer to data attached to the label file itself.
    pub fn new(label: &LabelNode, label_path: &Path) -> Result<Self, PointerError> {
        let label_dir = label_path.parent().unwrap_or_else(|| Path::new("."));
        let mut pointers = Vec::new();
        for (key, value) in label.iter() {
            let Some(target_key) = key.strip_prefix(POINTER_PREFIX) else {
                continue;
            };
            let LabelValue::Scalar(value) = value else {
                continue;
            };
            // ^STRUCTURE is consumed by the tokenizer; anything left with an empty name is junk
            if target_key.is_empty() {
                continue;
            }

            let (file_name, offset) = match parse_pointer_value(key, value)? {
                (Some(name), offset) => (name, offset),
                (None, offset) => (
                    label_path
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_default(),
                    offset,
                ),
            };
            let byte_offset = match offset {
                Offset::Bytes(bytes) => bytes.saturating_sub(1),
                Offset::Records(records) => {
                    let record_bytes = label
                        .integer(RECORD_BYTES_KEY)
                        .ok()
                        .flatten()
                        .ok_or_else(|| PointerError::MissingRecordSize {
                            key: key.to_string(),
                        })?;
                    records
                        .saturating_sub(1)
                        .checked_mul(record_bytes as u64)
                        .ok_or_else(|| PointerError::ParsingError {
                            key: key.to_string(),
                            value: value.to_string(),
                        })?
                }
            };

            pointers.push(Pointer {
                target_key: target_key.to_string(),
                file_path: label_dir.join(&file_name),
                file_name,
                byte_offset,
            });
        }
        Ok(Self { pointers })
    }

    pub fn get(&self, name: &str) -> Option<&Pointer> {
        self.pointers.iter().find(|p| p.target_key == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Pointer> {
        self.pointers.iter()
    }

    pub fn len(&self) -> usize {
        self.pointers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pointers.is_empty()
    }
}

/// Decode a pointer value into an optional file name and an offset.
///
/// Accepted forms are `NAME`, `(NAME, OFFSET)`, `(NAME, OFFSET <BYTES>)`, `OFFSET` and
/// `OFFSET <BYTES>`. A bare file name starts at the top of the file.
fn parse_pointer_value(key: &str, value: &str) -> Result<(Option<String>, Offset), PointerError> {
    let value = value.trim();
    if let Some(inner) = value
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
    {
        let Some((name, offset)) = inner.split_once(',') else {
            return Err(PointerError::BadFormat {
                key: key.to_string(),
                value: value.to_string(),
            });
        };
        let name = strip_quotes(name);
        if name.is_empty() {
            return Err(PointerError::BadFormat {
                key: key.to_string(),
                value: value.to_string(),
            });
        }
        return Ok((Some(name), parse_offset(key, offset)?));
    }

    if value.starts_with(|c: char| c.is_ascii_digit()) {
        return Ok((None, parse_offset(key, value)?));
    }

    let name = strip_quotes(value);
    if name.is_empty() {
        return Err(PointerError::BadFormat {
            key: key.to_string(),
            value: value.to_string(),
        });
    }
    Ok((Some(name), Offset::Bytes(1)))
}

fn parse_offset(key: &str, offset: &str) -> Result<Offset, PointerError> {
    let offset = offset.trim();
    let number = parse_integer(offset).ok_or_else(|| PointerError::ParsingError {
        key: key.to_string(),
        value: offset.to_string(),
    })? as u64;
    if offset.to_uppercase().ends_with(BYTES_UNIT_TAG) {
        Ok(Offset::Bytes(number))
    } else {
        Ok(Offset::Records(number))
    }
}

fn strip_quotes(value: &str) -> String {
    value.trim().trim_matches(&QUOTE_CHARS[..]).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::label_tokenizer::LabelEntry;
    use crate::label_tree::build_tree;

    fn label(pairs: &[(&str, &str)]) -> LabelNode {
        let entries = pairs.iter().map(|(k, v)| LabelEntry::new(k, v)).collect();
        build_tree(entries, Path::new("/data/product.lbl")).unwrap()
    }

    #[test]
    fn test_record_offset() {
        let table = PointerTable::new(
            &label(&[("RECORD_BYTES", "512"), ("^TABLE", "(\"DATA.DAT\", 3)")]),
            Path::new("/data/product.lbl"),
        )
        .unwrap();
        let pointer = table.get("TABLE").unwrap();
        assert_eq!(pointer.file_name, "DATA.DAT");
        assert_eq!(pointer.file_path, PathBuf::from("/data/DATA.DAT"));
        assert_eq!(pointer.byte_offset, 1024);
    }

    #[test]
    fn test_byte_offset() {
        let table = PointerTable::new(
            &label(&[("^TABLE", "(\"DATA.DAT\", 1024 <BYTES>)")]),
            Path::new("/data/product.lbl"),
        )
        .unwrap();
        assert_eq!(table.get("TABLE").unwrap().byte_offset, 1023);
    }

    #[test]
    fn test_bare_name() {
        let table = PointerTable::new(
            &label(&[("^HEADER", "\"HEAD.TXT\""), ("^TABLE", "DATA.TAB")]),
            Path::new("/data/product.lbl"),
        )
        .unwrap();
        assert_eq!(table.len(), 2);
        let names: Vec<&str> = table.iter().map(|p| p.target_key.as_str()).collect();
        assert_eq!(names, vec!["HEADER", "TABLE"]);
        assert_eq!(table.get("HEADER").unwrap().file_name, "HEAD.TXT");
        assert_eq!(table.get("TABLE").unwrap().byte_offset, 0);
    }

    #[test]
    fn test_attached_offset() {
        let table = PointerTable::new(
            &label(&[("RECORD_BYTES", "100 <BYTES>"), ("^TABLE", "4")]),
            Path::new("/data/product.lbl"),
        )
        .unwrap();
        let pointer = table.get("TABLE").unwrap();
        assert_eq!(pointer.file_name, "product.lbl");
        assert_eq!(pointer.byte_offset, 300);

        let table = PointerTable::new(
            &label(&[("^TABLE", "601 <BYTES>")]),
            Path::new("/data/product.lbl"),
        )
        .unwrap();
        assert_eq!(table.get("TABLE").unwrap().byte_offset, 600);
    }

    #[test]
    fn test_missing_record_bytes() {
        let result = PointerTable::new(
            &label(&[("^TABLE", "(\"DATA.DAT\", 3)")]),
            Path::new("/data/product.lbl"),
        );
        match result {
            Err(PointerError::MissingRecordSize { key }) => assert_eq!(key, "^TABLE"),
            other => panic!("Expected MissingRecordSize, got {other:?}"),
        }
    }

    #[test]
    fn test_bad_pointers() {
        assert!(matches!(
            parse_pointer_value("^TABLE", "(\"DATA.DAT\" 3)"),
            Err(PointerError::BadFormat { .. })
        ));
        assert!(matches!(
            parse_pointer_value("^TABLE", "(\"DATA.DAT\", three)"),
            Err(PointerError::ParsingError { .. })
        ));
    }

    #[test]
    fn test_record_offset_overflow() {
        let result = PointerTable::new(
            &label(&[
                ("RECORD_BYTES", "4294967296"),
                ("^TABLE", "(\"D.DAT\", 18446744073709551615)"),
            ]),
            Path::new("/data/product.lbl"),
        );
        match result {
            Err(PointerError::ParsingError { key, .. }) => assert_eq!(key, "^TABLE"),
            other => panic!("Expected ParsingError, got {other:?}"),
        }
    }

    #[test]
    fn test_nested_pointers_ignored() {
        let table = PointerTable::new(
            &label(&[
                ("OBJECT", "TABLE"),
                ("^DESCRIPTION", "\"TABLE.TXT\""),
                ("END_OBJECT", "TABLE"),
            ]),
            Path::new("/data/product.lbl"),
        )
        .unwrap();
        assert!(table.is_empty());
    }
}
