// Label syntax
pub const END_MARKER: &str = "END";
pub const COMMENT_MARKER: &str = "/*";
pub const COMMENT_END: &str = "*/";
pub const POINTER_PREFIX: char = '^';
pub const BYTES_UNIT_TAG: &str = "<BYTES>";
pub const QUOTE_CHARS: [char; 2] = ['"', '\''];

// Structural keywords
pub const OBJECT_KEY: &str = "OBJECT";
pub const END_OBJECT_KEY: &str = "END_OBJECT";
pub const GROUP_KEY: &str = "GROUP";
pub const END_GROUP_KEY: &str = "END_GROUP";
pub const STRUCTURE_KEY: &str = "^STRUCTURE";

// Product keywords
pub const RECORD_BYTES_KEY: &str = "RECORD_BYTES";
pub const DATA_SET_ID_KEY: &str = "DATA_SET_ID";

// Table keywords
pub const COLUMN_KEY: &str = "COLUMN";
pub const COLUMNS_KEY: &str = "COLUMNS";
pub const ROWS_KEY: &str = "ROWS";
pub const ROW_BYTES_KEY: &str = "ROW_BYTES";
pub const ROW_PREFIX_BYTES_KEY: &str = "ROW_PREFIX_BYTES";
pub const ROW_SUFFIX_BYTES_KEY: &str = "ROW_SUFFIX_BYTES";
pub const INTERCHANGE_FORMAT_KEY: &str = "INTERCHANGE_FORMAT";

// Column keywords
pub const NAME_KEY: &str = "NAME";
pub const START_BYTE_KEY: &str = "START_BYTE";
pub const BYTES_KEY: &str = "BYTES";
pub const ITEMS_KEY: &str = "ITEMS";
pub const ITEM_BYTES_KEY: &str = "ITEM_BYTES";
pub const DATA_TYPE_KEY: &str = "DATA_TYPE";
pub const UNIT_KEY: &str = "UNIT";

/// Label files are only accepted with these extensions (compared case-insensitively)
pub const LABEL_EXTENSIONS: [&str; 1] = ["lbl"];
