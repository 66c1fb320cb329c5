use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LabelError {
    #[error("Could not locate included structure {name} referenced by label {including_file:?}")]
    MissingInclude {
        name: String,
        including_file: PathBuf,
    },
    #[error("Found {key} at entry {entry} of label {file:?} with no matching open structure")]
    UnbalancedStructure {
        key: String,
        entry: usize,
        file: PathBuf,
    },
    #[error("Label {0:?} includes itself through a ^STRUCTURE chain")]
    IncludeCycle(PathBuf),
    #[error("Could not open label because file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Label failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum PointerError {
    #[error("Pointer {key} gives a record offset but the label has no RECORD_BYTES")]
    MissingRecordSize { key: String },
    #[error("Pointer {key} has a value {value:?} which is not a file name or (file, offset) pair")]
    BadFormat { key: String, value: String },
    #[error("Pointer {key} has an offset {value:?} which could not be parsed as an integer")]
    ParsingError { key: String, value: String },
}

#[derive(Debug, Clone, Error)]
pub enum SchemaError {
    #[error("Column {column} declares an unknown DATA_TYPE {data_type:?}")]
    UnknownDataType { column: String, data_type: String },
    #[error("Column {column} declares DATA_TYPE {data_type} with unsupported width {bytes} bytes")]
    UnsupportedWidth {
        column: String,
        data_type: String,
        bytes: usize,
    },
    #[error("Object {object} is missing the required field {field}")]
    MissingField { object: String, field: String },
    #[error("Field {field} has a value {value:?} which could not be parsed as an integer")]
    BadInteger { field: String, value: String },
    #[error("Found unknown INTERCHANGE_FORMAT {0:?}; expected ASCII or BINARY")]
    UnknownInterchangeFormat(String),
    #[error("Section {0} has no COLUMN objects and cannot be decoded as a table")]
    NotATable(String),
}

#[derive(Debug, Error)]
pub enum TableError {
    #[error("Table in {file:?} was truncated at row {row} of {n_rows}")]
    TruncatedTable {
        file: PathBuf,
        row: usize,
        n_rows: usize,
    },
    #[error("Table in {file:?} failed to parse {text:?} at row {row} in column {column}")]
    ParsingError {
        file: PathBuf,
        row: usize,
        column: String,
        text: String,
    },
    #[error("Column {column} extends past the end of a {row_bytes} byte row")]
    ColumnOutOfRow { column: String, row_bytes: usize },
    #[error("Table decoding failed due to schema error: {0}")]
    Schema(#[from] SchemaError),
    #[error("Table decoding failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}

/// A single section which could not be loaded, alongside the reason
#[derive(Debug)]
pub struct SectionFailure {
    pub name: String,
    pub error: TableError,
}

#[derive(Debug, Error)]
pub enum ProductError {
    #[error("Invalid product {path:?}: {reason}")]
    InvalidProduct { path: PathBuf, reason: String },
    #[error("Product has no section named {0}")]
    UnknownSection(String),
    #[error("Section {0} has not been loaded")]
    SectionNotLoaded(String),
    #[error("Failed to load sections: {}", fmt_failures(.0))]
    SectionsFailed(Vec<SectionFailure>),
    #[error("Product failed due to label error: {0}")]
    Label(#[from] LabelError),
    #[error("Product failed due to pointer error: {0}")]
    Pointer(#[from] PointerError),
}

fn fmt_failures(failures: &[SectionFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.name, f.error))
        .collect::<Vec<String>>()
        .join(", ")
}

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("No reader registered for dataset {0}")]
    NoReader(String),
    #[error("Reader could not find a {0} axis in any loaded table")]
    MissingAxis(&'static str),
    #[error("Record {index} is out of range for a table with {n_rows} rows")]
    RecordOutOfRange { index: usize, n_rows: usize },
    #[error("Reader failed due to product error: {0}")]
    Product(#[from] ProductError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
}
