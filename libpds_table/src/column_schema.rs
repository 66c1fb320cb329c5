use std::fmt::Display;
use std::str::FromStr;

use super::constants::{
    BYTES_KEY, COLUMNS_KEY, COLUMN_KEY, DATA_TYPE_KEY, INTERCHANGE_FORMAT_KEY, ITEMS_KEY,
    ITEM_BYTES_KEY, NAME_KEY, ROWS_KEY, ROW_BYTES_KEY, ROW_PREFIX_BYTES_KEY,
    ROW_SUFFIX_BYTES_KEY, START_BYTE_KEY, UNIT_KEY,
};
use super::error::SchemaError;
use super::label_tree::LabelNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    SignedInt,
    UnsignedInt,
    Float,
    Char,
    BitString,
}

impl Display for ElementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SignedInt => write!(f, "SignedInt"),
            Self::UnsignedInt => write!(f, "UnsignedInt"),
            Self::Float => write!(f, "Float"),
            Self::Char => write!(f, "Char"),
            Self::BitString => write!(f, "BitString"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Big,
    Little,
}

/// How the rows of a table are stored on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterchangeFormat {
    Ascii,
    Binary,
}

impl FromStr for InterchangeFormat {
    type Err = SchemaError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ASCII" => Ok(Self::Ascii),
            "BINARY" => Ok(Self::Binary),
            _ => Err(SchemaError::UnknownInterchangeFormat(s.to_string())),
        }
    }
}

/// The concrete decode rule for a single column.
///
/// `per_item_bytes` is the footprint of one item in the row, while `element_width` is the
/// width of the value it decodes into. The two only differ for text-encoded numbers, where
/// the digits are parsed into a fixed width integer or float.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: String,
    pub item_count: usize,
    pub start_byte: usize,
    pub total_bytes: usize,
    pub per_item_bytes: usize,
    pub element_kind: ElementKind,
    pub endianness: Endianness,
    pub element_width: usize,
    pub text_encoded: bool,
    pub unit: Option<String>,
}

/// Result of matching a DATA_TYPE string
struct TypeRule {
    kind: ElementKind,
    endianness: Endianness,
    element_width: usize,
    text_encoded: bool,
}

impl ColumnSchema {
    /// Derive the decode rule for a COLUMN object of a table stored with the given format
    pub fn derive(node: &LabelNode, format: InterchangeFormat) -> Result<Self, SchemaError> {
        let name = node
            .scalar(NAME_KEY)
            .ok_or_else(|| missing_field(COLUMN_KEY, NAME_KEY))?
            .to_string();
        let start_byte = required_integer(node, &name, START_BYTE_KEY)?
            .checked_sub(1)
            .ok_or_else(|| SchemaError::BadInteger {
                field: format!("{name}.{START_BYTE_KEY}"),
                value: String::from("0"),
            })?;
        let bytes = required_integer(node, &name, BYTES_KEY)?;
        let mut item_count = node.integer(ITEMS_KEY)?.unwrap_or(1).max(1);
        let per_item_bytes = node.integer(ITEM_BYTES_KEY)?.unwrap_or(bytes);
        let data_type = node
            .scalar(DATA_TYPE_KEY)
            .ok_or_else(|| missing_field(&name, DATA_TYPE_KEY))?
            .to_string();

        let rule = classify(&name, &data_type, per_item_bytes, format)?;
        let total_bytes = match rule.kind {
            ElementKind::Char | ElementKind::BitString => {
                // One element per byte of the field
                item_count = per_item_bytes;
                bytes
            }
            _ => item_count
                .checked_mul(per_item_bytes)
                .ok_or_else(|| out_of_range(&name, ITEMS_KEY, item_count))?,
        };
        if start_byte.checked_add(total_bytes).is_none() {
            return Err(out_of_range(&name, BYTES_KEY, total_bytes));
        }

        Ok(Self {
            name,
            data_type,
            item_count,
            start_byte,
            total_bytes,
            per_item_bytes,
            element_kind: rule.kind,
            endianness: rule.endianness,
            element_width: rule.element_width,
            text_encoded: rule.text_encoded,
            unit: node.scalar(UNIT_KEY).map(String::from),
        })
    }

    /// True if this column decodes to more than one value per row
    pub fn is_multi_item(&self) -> bool {
        !matches!(self.element_kind, ElementKind::Char) && self.item_count > 1
    }

    /// One past the last byte of the field. Derivation guarantees this does not overflow.
    pub fn end_byte(&self) -> usize {
        self.start_byte + self.total_bytes
    }
}

/// Map a declared DATA_TYPE onto an element kind, width and byte order
fn classify(
    column: &str,
    data_type: &str,
    per_item_bytes: usize,
    format: InterchangeFormat,
) -> Result<TypeRule, SchemaError> {
    let normalized = data_type.trim().to_uppercase().replace(' ', "_");
    let prefix_order = if normalized.starts_with("MSB") {
        Some(Endianness::Big)
    } else if normalized.starts_with("LSB") {
        Some(Endianness::Little)
    } else {
        None
    };
    let ascii_declared = normalized.starts_with("ASCII");
    let text_encoded = ascii_declared || format == InterchangeFormat::Ascii;
    let unknown = || SchemaError::UnknownDataType {
        column: column.to_string(),
        data_type: data_type.to_string(),
    };
    let bad_width = || SchemaError::UnsupportedWidth {
        column: column.to_string(),
        data_type: data_type.to_string(),
        bytes: per_item_bytes,
    };

    if normalized.ends_with("BIT_STRING") {
        // Bit strings only exist in binary rows
        if format == InterchangeFormat::Ascii {
            return Err(unknown());
        }
        return Ok(TypeRule {
            kind: ElementKind::BitString,
            endianness: prefix_order.unwrap_or(Endianness::Big),
            element_width: 1,
            text_encoded: false,
        });
    }

    if normalized.ends_with("CHARACTER") || is_time_type(&normalized) {
        return Ok(TypeRule {
            kind: ElementKind::Char,
            endianness: Endianness::Big,
            element_width: 1,
            text_encoded: true,
        });
    }

    if normalized.ends_with("INTEGER") {
        let kind = if normalized.contains("UNSIGNED") {
            ElementKind::UnsignedInt
        } else {
            ElementKind::SignedInt
        };
        // Legacy convention: ASCII integers always decode to a 4 byte signed value
        if ascii_declared {
            return Ok(TypeRule {
                kind: ElementKind::SignedInt,
                endianness: Endianness::Big,
                element_width: 4,
                text_encoded: true,
            });
        }
        if text_encoded {
            return Ok(TypeRule {
                kind,
                endianness: Endianness::Big,
                element_width: 8,
                text_encoded: true,
            });
        }
        if !matches!(per_item_bytes, 1 | 2 | 4 | 8) {
            return Err(bad_width());
        }
        let endianness = prefix_order.unwrap_or(
            if normalized.starts_with("PC") || normalized.starts_with("VAX") {
                Endianness::Little
            } else {
                Endianness::Big
            },
        );
        return Ok(TypeRule {
            kind,
            endianness,
            element_width: per_item_bytes,
            text_encoded: false,
        });
    }

    if normalized.ends_with("REAL") || normalized == "FLOAT" {
        // VAX floating point is not IEEE
        if normalized.starts_with("VAX") {
            return Err(unknown());
        }
        if text_encoded {
            return Ok(TypeRule {
                kind: ElementKind::Float,
                endianness: Endianness::Big,
                element_width: 8,
                text_encoded: true,
            });
        }
        if !matches!(per_item_bytes, 4 | 8) {
            return Err(bad_width());
        }
        let endianness = if normalized == "PC_REAL" {
            Endianness::Little
        } else {
            prefix_order.unwrap_or(Endianness::Big)
        };
        return Ok(TypeRule {
            kind: ElementKind::Float,
            endianness,
            element_width: per_item_bytes,
            text_encoded: false,
        });
    }

    Err(unknown())
}

/// DATE and TIME columns are kept as their literal text
fn is_time_type(normalized: &str) -> bool {
    matches!(normalized, "DATE" | "TIME")
        || normalized.ends_with("_DATE")
        || normalized.ends_with("_TIME")
}

fn missing_field(object: &str, field: &str) -> SchemaError {
    SchemaError::MissingField {
        object: object.to_string(),
        field: field.to_string(),
    }
}

/// A field whose value is parseable but makes the layout overflow
fn out_of_range(object: &str, field: &str, value: usize) -> SchemaError {
    SchemaError::BadInteger {
        field: format!("{object}.{field}"),
        value: value.to_string(),
    }
}

fn required_integer(node: &LabelNode, object: &str, field: &str) -> Result<usize, SchemaError> {
    node.integer(field)?
        .ok_or_else(|| missing_field(object, field))
}

/// The complete decode plan for one table-like section
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub name: String,
    pub n_rows: usize,
    pub n_columns: usize,
    pub row_bytes: usize,
    pub row_prefix_bytes: usize,
    pub row_suffix_bytes: usize,
    pub format: InterchangeFormat,
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    /// Derive the schema of the table described by node.
    ///
    /// Tables without an INTERCHANGE_FORMAT are taken to be binary.
    pub fn derive(name: &str, node: &LabelNode) -> Result<Self, SchemaError> {
        let column_nodes = node.children(COLUMN_KEY);
        if column_nodes.is_empty() {
            return Err(SchemaError::NotATable(name.to_string()));
        }

        let format = match node.scalar(INTERCHANGE_FORMAT_KEY) {
            Some(value) => InterchangeFormat::from_str(value)?,
            None => {
                spdlog::debug!("Table {} has no {}; assuming BINARY", name, INTERCHANGE_FORMAT_KEY);
                InterchangeFormat::Binary
            }
        };
        let n_rows = required_integer(node, name, ROWS_KEY)?;
        let row_bytes = match format {
            InterchangeFormat::Binary => required_integer(node, name, ROW_BYTES_KEY)?,
            InterchangeFormat::Ascii => node.integer(ROW_BYTES_KEY)?.unwrap_or(0),
        };
        let row_prefix_bytes = node.integer(ROW_PREFIX_BYTES_KEY)?.unwrap_or(0);
        let row_suffix_bytes = node.integer(ROW_SUFFIX_BYTES_KEY)?.unwrap_or(0);
        if row_bytes
            .checked_add(row_prefix_bytes)
            .and_then(|bytes| bytes.checked_add(row_suffix_bytes))
            .is_none()
        {
            return Err(out_of_range(name, ROW_BYTES_KEY, row_bytes));
        }

        let columns = column_nodes
            .iter()
            .map(|column| ColumnSchema::derive(column, format))
            .collect::<Result<Vec<ColumnSchema>, SchemaError>>()?;

        if let Some(declared) = node.integer(COLUMNS_KEY)? {
            if declared != columns.len() {
                spdlog::warn!(
                    "Table {} declares {} columns but describes {}; using the described columns",
                    name,
                    declared,
                    columns.len()
                );
            }
        }

        Ok(Self {
            name: name.to_string(),
            n_rows,
            n_columns: columns.len(),
            row_bytes,
            row_prefix_bytes,
            row_suffix_bytes,
            format,
            columns,
        })
    }

    /// Total bytes occupied by one row, including any prefix and suffix. Derivation
    /// guarantees this does not overflow.
    pub fn row_stride(&self) -> usize {
        self.row_bytes + self.row_prefix_bytes + self.row_suffix_bytes
    }
}
