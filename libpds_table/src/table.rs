use bitvec::prelude::{BitVec, Msb0};
use fxhash::FxHashMap;
use ndarray::{ArrayD, Axis, IxDyn};

use super::column_schema::{ColumnSchema, ElementKind, TableSchema};

/// The decoded values of one column.
///
/// Single-item columns have shape `[n_rows]`; multi-item columns have shape
/// `[n_rows, item_count]`.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Int8(ArrayD<i8>),
    Int16(ArrayD<i16>),
    Int32(ArrayD<i32>),
    Int64(ArrayD<i64>),
    UInt8(ArrayD<u8>),
    UInt16(ArrayD<u16>),
    UInt32(ArrayD<u32>),
    UInt64(ArrayD<u64>),
    Float32(ArrayD<f32>),
    Float64(ArrayD<f64>),
    Text(ArrayD<String>),
}

/// A single value pulled out of a row
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    List(Vec<CellValue>),
}

/// Dispatch the same expression over every numeric array variant
macro_rules! numeric_arrays {
    ($data:expr, $arr:ident => $body:expr, $text:ident => $text_body:expr) => {
        match $data {
            ColumnData::Int8($arr) => $body,
            ColumnData::Int16($arr) => $body,
            ColumnData::Int32($arr) => $body,
            ColumnData::Int64($arr) => $body,
            ColumnData::UInt8($arr) => $body,
            ColumnData::UInt16($arr) => $body,
            ColumnData::UInt32($arr) => $body,
            ColumnData::UInt64($arr) => $body,
            ColumnData::Float32($arr) => $body,
            ColumnData::Float64($arr) => $body,
            ColumnData::Text($text) => $text_body,
        }
    };
}

impl ColumnData {
    /// Allocate a zeroed array of the right element type and shape for column
    pub fn allocate(column: &ColumnSchema, n_rows: usize) -> Self {
        let shape = if column.is_multi_item() {
            IxDyn(&[n_rows, column.item_count])
        } else {
            IxDyn(&[n_rows])
        };
        match (column.element_kind, column.element_width, column.text_encoded) {
            (ElementKind::Char, _, _) => Self::Text(ArrayD::default(shape)),
            (ElementKind::BitString, _, _) => Self::UInt8(ArrayD::zeros(shape)),
            (ElementKind::SignedInt, 1, false) => Self::Int8(ArrayD::zeros(shape)),
            (ElementKind::SignedInt, 2, false) => Self::Int16(ArrayD::zeros(shape)),
            (ElementKind::SignedInt, 4, _) => Self::Int32(ArrayD::zeros(shape)),
            (ElementKind::SignedInt, _, _) => Self::Int64(ArrayD::zeros(shape)),
            (ElementKind::UnsignedInt, 1, false) => Self::UInt8(ArrayD::zeros(shape)),
            (ElementKind::UnsignedInt, 2, false) => Self::UInt16(ArrayD::zeros(shape)),
            (ElementKind::UnsignedInt, 4, false) => Self::UInt32(ArrayD::zeros(shape)),
            (ElementKind::UnsignedInt, _, _) => Self::UInt64(ArrayD::zeros(shape)),
            (ElementKind::Float, 4, false) => Self::Float32(ArrayD::zeros(shape)),
            (ElementKind::Float, _, _) => Self::Float64(ArrayD::zeros(shape)),
        }
    }

    pub fn shape(&self) -> &[usize] {
        numeric_arrays!(self, arr => arr.shape(), text => text.shape())
    }

    /// Number of rows held by the column
    pub fn len(&self) -> usize {
        self.shape().first().copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Short name of the element type, e.g. `i16` or `text`
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Int8(_) => "i8",
            Self::Int16(_) => "i16",
            Self::Int32(_) => "i32",
            Self::Int64(_) => "i64",
            Self::UInt8(_) => "u8",
            Self::UInt16(_) => "u16",
            Self::UInt32(_) => "u32",
            Self::UInt64(_) => "u64",
            Self::Float32(_) => "f32",
            Self::Float64(_) => "f64",
            Self::Text(_) => "text",
        }
    }

    /// Convert a numeric column to f64. Returns None for text columns.
    pub fn to_f64(&self) -> Option<ArrayD<f64>> {
        numeric_arrays!(self, arr => Some(arr.mapv(|v| v as f64)), _text => None)
    }

    pub fn as_f64(&self) -> Option<&ArrayD<f64>> {
        match self {
            Self::Float64(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<&ArrayD<i64>> {
        match self {
            Self::Int64(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&ArrayD<String>> {
        match self {
            Self::Text(arr) => Some(arr),
            _ => None,
        }
    }

    /// Get the value(s) of this column at a row
    pub fn cell(&self, row: usize) -> Option<CellValue> {
        if row >= self.len() {
            return None;
        }
        let value = match self {
            Self::Int8(arr) => collect_cell(arr, row, |v| CellValue::Int(*v as i64)),
            Self::Int16(arr) => collect_cell(arr, row, |v| CellValue::Int(*v as i64)),
            Self::Int32(arr) => collect_cell(arr, row, |v| CellValue::Int(*v as i64)),
            Self::Int64(arr) => collect_cell(arr, row, |v| CellValue::Int(*v)),
            Self::UInt8(arr) => collect_cell(arr, row, |v| CellValue::UInt(*v as u64)),
            Self::UInt16(arr) => collect_cell(arr, row, |v| CellValue::UInt(*v as u64)),
            Self::UInt32(arr) => collect_cell(arr, row, |v| CellValue::UInt(*v as u64)),
            Self::UInt64(arr) => collect_cell(arr, row, |v| CellValue::UInt(*v)),
            Self::Float32(arr) => collect_cell(arr, row, |v| CellValue::Float(*v as f64)),
            Self::Float64(arr) => collect_cell(arr, row, |v| CellValue::Float(*v)),
            Self::Text(arr) => collect_cell(arr, row, |v| CellValue::Text(v.clone())),
        };
        Some(value)
    }
}

fn collect_cell<T>(arr: &ArrayD<T>, row: usize, convert: impl Fn(&T) -> CellValue) -> CellValue {
    let row_view = arr.index_axis(Axis(0), row);
    if row_view.ndim() == 0 {
        row_view.iter().map(&convert).next().unwrap_or(CellValue::List(Vec::new()))
    } else {
        CellValue::List(row_view.iter().map(convert).collect())
    }
}

/// A fully decoded table. Owned by the product it came from.
#[derive(Debug, Clone)]
pub struct TableSection {
    pub n_rows: usize,
    pub n_columns: usize,
    pub columns: Vec<ColumnSchema>,
    data: Vec<ColumnData>,
    lookup: FxHashMap<String, usize>,
}

impl TableSection {
    /// Allocate an empty section with one pre-sized array per column
    pub fn allocate(schema: &TableSchema) -> Self {
        let data = schema
            .columns
            .iter()
            .map(|column| ColumnData::allocate(column, schema.n_rows))
            .collect();
        let lookup = schema
            .columns
            .iter()
            .enumerate()
            .map(|(idx, column)| (column.name.clone(), idx))
            .collect();
        Self {
            n_rows: schema.n_rows,
            n_columns: schema.n_columns,
            columns: schema.columns.clone(),
            data,
            lookup,
        }
    }

    /// Get the decoded array for a column by name
    pub fn column(&self, name: &str) -> Option<&ColumnData> {
        self.lookup.get(name).map(|idx| &self.data[*idx])
    }

    pub fn schema(&self, name: &str) -> Option<&ColumnSchema> {
        self.lookup.get(name).map(|idx| &self.columns[*idx])
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Iterate over (schema, data) pairs in declared order
    pub fn iter(&self) -> impl Iterator<Item = (&ColumnSchema, &ColumnData)> {
        self.columns.iter().zip(self.data.iter())
    }

    /// View a BIT_STRING cell as individual bits, most significant bit first
    pub fn bits(&self, name: &str, row: usize) -> Option<BitVec<u8, Msb0>> {
        let idx = *self.lookup.get(name)?;
        if self.columns[idx].element_kind != ElementKind::BitString || row >= self.n_rows {
            return None;
        }
        match &self.data[idx] {
            ColumnData::UInt8(arr) => {
                let bytes: Vec<u8> = arr.index_axis(Axis(0), row).iter().copied().collect();
                Some(BitVec::from_vec(bytes))
            }
            _ => None,
        }
    }

    pub(crate) fn data_mut(&mut self) -> &mut [ColumnData] {
        &mut self.data
    }
}
