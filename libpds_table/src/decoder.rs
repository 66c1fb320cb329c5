use byteorder::{BigEndian, ByteOrder, LittleEndian};
use ndarray::{ArrayD, Axis};
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::str::FromStr;

use super::column_schema::{
    ColumnSchema, ElementKind, Endianness, InterchangeFormat, TableSchema,
};
use super::error::TableError;
use super::pointer::Pointer;
use super::table::{ColumnData, TableSection};

/// TableDecoder reads the rows of a table out of its data file.
///
/// The file is opened, read and closed within a single call to decode. Decoding is
/// all-or-nothing: any failure discards every row read so far.
#[derive(Debug)]
pub struct TableDecoder<'a> {
    schema: &'a TableSchema,
    file_path: PathBuf,
    byte_offset: u64,
}

impl<'a> TableDecoder<'a> {
    pub fn new(schema: &'a TableSchema, pointer: &Pointer) -> Self {
        Self {
            schema,
            file_path: pointer.file_path.clone(),
            byte_offset: pointer.byte_offset,
        }
    }

    /// Decode every row of the table into a freshly allocated TableSection.
    ///
    /// The rows are known to be present before any column array is allocated.
    pub fn decode(&self) -> Result<TableSection, TableError> {
        let mut file = File::open(&self.file_path)?;
        let file_size = file.metadata()?.len();
        file.seek(SeekFrom::Start(self.byte_offset))?;
        let reader = BufReader::new(file);
        let available = file_size.saturating_sub(self.byte_offset);

        let section = match self.schema.format {
            InterchangeFormat::Binary => self.decode_binary(reader, available)?,
            InterchangeFormat::Ascii => self.decode_ascii(reader)?,
        };

        spdlog::info!(
            "Decoded {} rows and {} columns of {} from {:?} ({})",
            self.schema.n_rows,
            self.schema.n_columns,
            self.schema.name,
            self.file_path,
            human_bytes::human_bytes(file_size as f64)
        );
        Ok(section)
    }

    fn decode_binary<R: Read>(
        &self,
        mut reader: R,
        available: u64,
    ) -> Result<TableSection, TableError> {
        let schema = self.schema;
        self.check_columns(schema.row_bytes, false)?;

        let stride = schema.row_stride() as u64;
        let needed = (schema.n_rows as u64).checked_mul(stride);
        if needed.map_or(true, |needed| needed > available) {
            let complete_rows = available.checked_div(stride).unwrap_or(0);
            return Err(self.truncated(complete_rows as usize));
        }

        let mut section = TableSection::allocate(schema);
        let prefix = schema.row_prefix_bytes;
        let mut row_buffer = vec![0u8; schema.row_stride()];
        for row in 0..schema.n_rows {
            if let Err(e) = reader.read_exact(&mut row_buffer) {
                return match e.kind() {
                    ErrorKind::UnexpectedEof => Err(self.truncated(row)),
                    _ => Err(TableError::IOError(e)),
                };
            }
            let record = &row_buffer[prefix..prefix + schema.row_bytes];
            for (column, data) in schema.columns.iter().zip(section.data_mut().iter_mut()) {
                let field = &record[column.start_byte..column.end_byte()];
                if column.text_encoded {
                    let text = String::from_utf8_lossy(field);
                    self.decode_text(column, &text, data, row)?;
                } else {
                    match column.endianness {
                        Endianness::Big => decode_field::<BigEndian>(column, field, data, row),
                        Endianness::Little => {
                            decode_field::<LittleEndian>(column, field, data, row)
                        }
                    }
                }
            }
        }
        Ok(section)
    }

    fn decode_ascii<R: BufRead>(&self, mut reader: R) -> Result<TableSection, TableError> {
        // Lines are gathered first so the row count is backed by the file
        let mut lines: Vec<Vec<u8>> = Vec::new();
        let mut row_width = self.schema.row_bytes;
        for row in 0..self.schema.n_rows {
            let mut line: Vec<u8> = Vec::new();
            if reader.read_until(b'\n', &mut line)? == 0 {
                return Err(self.truncated(row));
            }
            row_width = row_width.max(line.len());
            while matches!(line.last(), Some(b'\n') | Some(b'\r')) {
                line.pop();
            }
            lines.push(line);
        }
        self.check_columns(row_width, true)?;

        let mut section = TableSection::allocate(self.schema);
        for (row, line) in lines.iter().enumerate() {
            for (column, data) in self
                .schema
                .columns
                .iter()
                .zip(section.data_mut().iter_mut())
            {
                let start = column.start_byte.min(line.len());
                let end = column.end_byte().min(line.len());
                let text = String::from_utf8_lossy(&line[start..end]);
                self.decode_text(column, &text, data, row)?;
            }
        }
        Ok(section)
    }

    /// Every column must fit in a row. Text in ASCII rows may run past short lines.
    fn check_columns(&self, row_width: usize, text_may_overhang: bool) -> Result<(), TableError> {
        for column in self.schema.columns.iter() {
            let overhang_allowed = text_may_overhang && column.element_kind == ElementKind::Char;
            if !overhang_allowed && column.end_byte() > row_width {
                return Err(TableError::ColumnOutOfRow {
                    column: column.name.clone(),
                    row_bytes: row_width,
                });
            }
        }
        Ok(())
    }

    /// Parse a text field into the column's array at row
    fn decode_text(
        &self,
        column: &ColumnSchema,
        field: &str,
        data: &mut ColumnData,
        row: usize,
    ) -> Result<(), TableError> {
        if let ColumnData::Text(arr) = data {
            fill_row(arr, row, std::iter::once(field.trim().to_string()));
            return Ok(());
        }

        let items = split_items(column, field);
        match data {
            ColumnData::Int8(arr) => fill_row(arr, row, self.parse_items(column, &items, row)?),
            ColumnData::Int16(arr) => fill_row(arr, row, self.parse_items(column, &items, row)?),
            ColumnData::Int32(arr) => fill_row(arr, row, self.parse_items(column, &items, row)?),
            ColumnData::Int64(arr) => fill_row(arr, row, self.parse_items(column, &items, row)?),
            ColumnData::UInt8(arr) => fill_row(arr, row, self.parse_items(column, &items, row)?),
            ColumnData::UInt16(arr) => fill_row(arr, row, self.parse_items(column, &items, row)?),
            ColumnData::UInt32(arr) => fill_row(arr, row, self.parse_items(column, &items, row)?),
            ColumnData::UInt64(arr) => fill_row(arr, row, self.parse_items(column, &items, row)?),
            ColumnData::Float32(arr) => fill_row(arr, row, self.parse_items(column, &items, row)?),
            ColumnData::Float64(arr) => fill_row(arr, row, self.parse_items(column, &items, row)?),
            ColumnData::Text(_) => (),
        }
        Ok(())
    }

    fn parse_items<T: FromStr>(
        &self,
        column: &ColumnSchema,
        items: &[&str],
        row: usize,
    ) -> Result<Vec<T>, TableError> {
        items
            .iter()
            .map(|item| {
                parse_number(item).ok_or_else(|| TableError::ParsingError {
                    file: self.file_path.clone(),
                    row,
                    column: column.name.clone(),
                    text: item.to_string(),
                })
            })
            .collect()
    }

    fn truncated(&self, row: usize) -> TableError {
        TableError::TruncatedTable {
            file: self.file_path.clone(),
            row,
            n_rows: self.schema.n_rows,
        }
    }
}

/// Write values into the row of an array. Scalar columns take one value; vector columns take
/// one value per item.
fn fill_row<T>(arr: &mut ArrayD<T>, row: usize, values: impl IntoIterator<Item = T>) {
    let mut view = arr.index_axis_mut(Axis(0), row);
    for (slot, value) in view.iter_mut().zip(values) {
        *slot = value;
    }
}

/// Decode a binary field of a column into its array
fn decode_field<B: ByteOrder>(
    column: &ColumnSchema,
    field: &[u8],
    data: &mut ColumnData,
    row: usize,
) {
    let chunks = field.chunks_exact(column.element_width);
    match data {
        ColumnData::Int8(arr) => fill_row(arr, row, chunks.map(|c| c[0] as i8)),
        ColumnData::Int16(arr) => fill_row(arr, row, chunks.map(B::read_i16)),
        ColumnData::Int32(arr) => fill_row(arr, row, chunks.map(B::read_i32)),
        ColumnData::Int64(arr) => fill_row(arr, row, chunks.map(B::read_i64)),
        ColumnData::UInt8(arr) => fill_row(arr, row, chunks.map(|c| c[0])),
        ColumnData::UInt16(arr) => fill_row(arr, row, chunks.map(B::read_u16)),
        ColumnData::UInt32(arr) => fill_row(arr, row, chunks.map(B::read_u32)),
        ColumnData::UInt64(arr) => fill_row(arr, row, chunks.map(B::read_u64)),
        ColumnData::Float32(arr) => fill_row(arr, row, chunks.map(B::read_f32)),
        ColumnData::Float64(arr) => fill_row(arr, row, chunks.map(B::read_f64)),
        ColumnData::Text(arr) => fill_row(
            arr,
            row,
            std::iter::once(String::from_utf8_lossy(field).trim().to_string()),
        ),
    }
}

/// Split a text field into its items. Multi-item fields are cut into equal chunks of
/// per_item_bytes characters.
fn split_items<'f>(column: &ColumnSchema, field: &'f str) -> Vec<&'f str> {
    if !column.is_multi_item() {
        return vec![field];
    }
    let mut items = Vec::with_capacity(column.item_count);
    let mut cursor = 0;
    for _ in 0..column.item_count {
        let end = (cursor + column.per_item_bytes).min(field.len());
        items.push(field.get(cursor..end).unwrap_or(""));
        cursor = end;
    }
    items
}

/// Parse a number, accepting Fortran style `D` exponents for reals
fn parse_number<T: FromStr>(text: &str) -> Option<T> {
    let text = text.trim();
    text.parse().ok().or_else(|| {
        text.replace(|c: char| c == 'D' || c == 'd', "E")
            .parse()
            .ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;
    use std::fs;
    use std::io::Write;
    use std::path::Path;

    fn column(
        name: &str,
        kind: ElementKind,
        start: usize,
        width: usize,
        items: usize,
        endianness: Endianness,
    ) -> ColumnSchema {
        ColumnSchema {
            name: name.to_string(),
            data_type: String::from("TEST"),
            item_count: items,
            start_byte: start,
            total_bytes: width * items,
            per_item_bytes: width,
            element_kind: kind,
            endianness,
            element_width: width,
            text_encoded: false,
            unit: None,
        }
    }

    fn binary_schema(n_rows: usize, row_bytes: usize, columns: Vec<ColumnSchema>) -> TableSchema {
        TableSchema {
            name: String::from("TABLE"),
            n_rows,
            n_columns: columns.len(),
            row_bytes,
            row_prefix_bytes: 0,
            row_suffix_bytes: 0,
            format: InterchangeFormat::Binary,
            columns,
        }
    }

    fn pointer(path: &Path, byte_offset: u64) -> Pointer {
        Pointer {
            target_key: String::from("TABLE"),
            file_name: path.file_name().unwrap().to_string_lossy().to_string(),
            file_path: path.to_path_buf(),
            byte_offset,
        }
    }

    #[test]
    fn test_binary_round_trip_row_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.dat");
        let mut bytes: Vec<u8> = Vec::new();
        for row in 0..12u32 {
            let mut record = vec![0u8; 1024];
            BigEndian::write_u32(&mut record[0..4], row);
            LittleEndian::write_f64(&mut record[4..12], row as f64 * 0.5);
            bytes.extend_from_slice(&record);
        }
        fs::write(&path, &bytes).unwrap();

        let schema = binary_schema(
            12,
            1024,
            vec![
                column("ID", ElementKind::UnsignedInt, 0, 4, 1, Endianness::Big),
                column("VALUE", ElementKind::Float, 4, 8, 1, Endianness::Little),
            ],
        );
        let section = TableDecoder::new(&schema, &pointer(&path, 0)).decode().unwrap();
        for (_, data) in section.iter() {
            assert_eq!(data.len(), 12);
        }
        match section.column("ID").unwrap() {
            ColumnData::UInt32(arr) => assert_eq!(arr[[11]], 11),
            other => panic!("Expected u32 column, got {}", other.type_name()),
        }
        match section.column("VALUE").unwrap() {
            ColumnData::Float64(arr) => assert_eq!(arr[[3]], 1.5),
            other => panic!("Expected f64 column, got {}", other.type_name()),
        }

        // Drop one byte off the end and the last row can no longer be read
        fs::write(&path, &bytes[..bytes.len() - 1]).unwrap();
        match TableDecoder::new(&schema, &pointer(&path, 0)).decode() {
            Err(TableError::TruncatedTable { row, n_rows, .. }) => {
                assert_eq!(row, 11);
                assert_eq!(n_rows, 12);
            }
            other => panic!("Expected TruncatedTable, got {other:?}"),
        }
    }

    #[test]
    fn test_binary_multi_item_and_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.dat");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(&[0xff; 10]).unwrap();
        for row in 0..2i16 {
            // prefix, 3 x i16 LE, bit string, suffix
            file.write_u8(0xaa).unwrap();
            for item in 0..3i16 {
                file.write_i16::<LittleEndian>(-(row * 10 + item)).unwrap();
            }
            file.write_all(&[0b1000_0001, 0x0f]).unwrap();
            file.write_u8(0xbb).unwrap();
        }
        drop(file);

        let mut schema = binary_schema(
            2,
            8,
            vec![
                column("SAMPLES", ElementKind::SignedInt, 0, 2, 3, Endianness::Little),
                column("FLAGS", ElementKind::BitString, 6, 1, 2, Endianness::Big),
            ],
        );
        schema.row_prefix_bytes = 1;
        schema.row_suffix_bytes = 1;
        let section = TableDecoder::new(&schema, &pointer(&path, 10)).decode().unwrap();

        match section.column("SAMPLES").unwrap() {
            ColumnData::Int16(arr) => {
                assert_eq!(arr.shape(), &[2, 3]);
                assert_eq!(arr[[1, 2]], -12);
                assert_eq!(arr[[0, 1]], -1);
            }
            other => panic!("Expected i16 column, got {}", other.type_name()),
        }
        let bits = section.bits("FLAGS", 0).unwrap();
        assert_eq!(bits.len(), 16);
        assert!(bits[0]);
        assert!(!bits[1]);
        assert!(bits[7]);
        assert_eq!(bits.count_ones(), 6);
        assert!(section.bits("SAMPLES", 0).is_none());
    }

    #[test]
    fn test_column_outside_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.dat");
        fs::write(&path, [0u8; 8]).unwrap();
        let schema = binary_schema(
            1,
            8,
            vec![column("BIG", ElementKind::Float, 4, 8, 1, Endianness::Big)],
        );
        assert!(matches!(
            TableDecoder::new(&schema, &pointer(&path, 0)).decode(),
            Err(TableError::ColumnOutOfRow { .. })
        ));
    }

    #[test]
    fn test_declared_rows_beyond_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.dat");
        fs::write(&path, [0u8; 8]).unwrap();
        let schema = binary_schema(
            100000000000000,
            8,
            vec![column("VALUE", ElementKind::Float, 0, 8, 1, Endianness::Big)],
        );
        match TableDecoder::new(&schema, &pointer(&path, 0)).decode() {
            Err(TableError::TruncatedTable { row, n_rows, .. }) => {
                assert_eq!(row, 1);
                assert_eq!(n_rows, 100000000000000);
            }
            other => panic!("Expected TruncatedTable, got {other:?}"),
        }

        // Rows times stride does not even fit in a u64
        let schema = binary_schema(
            usize::MAX,
            8,
            vec![column("VALUE", ElementKind::Float, 0, 8, 1, Endianness::Big)],
        );
        assert!(matches!(
            TableDecoder::new(&schema, &pointer(&path, 0)).decode(),
            Err(TableError::TruncatedTable { row: 1, .. })
        ));

        // An offset past the end of the file leaves no rows at all
        assert!(matches!(
            TableDecoder::new(&schema, &pointer(&path, 64)).decode(),
            Err(TableError::TruncatedTable { row: 0, .. })
        ));
    }

    #[test]
    fn test_binary_character_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.dat");
        fs::write(&path, b"ABC DEF GHI XYZ         ").unwrap();
        let mut name = column("NAME", ElementKind::Char, 0, 12, 1, Endianness::Big);
        name.item_count = 12;
        name.element_width = 1;
        name.text_encoded = true;
        let schema = binary_schema(2, 12, vec![name]);

        let section = TableDecoder::new(&schema, &pointer(&path, 0)).decode().unwrap();
        let names = section.column("NAME").unwrap().as_text().unwrap();
        assert_eq!(names.shape(), &[2]);
        assert_eq!(names[[0]], "ABC DEF GHI");
        assert_eq!(names[[1]], "XYZ");
    }

    fn ascii_column(
        name: &str,
        kind: ElementKind,
        start: usize,
        width: usize,
        items: usize,
    ) -> ColumnSchema {
        let mut col = column(name, kind, start, width, items, Endianness::Big);
        col.text_encoded = true;
        col.element_width = 8;
        col
    }

    #[test]
    fn test_ascii_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.tab");
        fs::write(
            &path,
            "2001-01-01T00:00  -12  1.5D2    1    2    3\r\n\
             2001-01-01T00:01   40 2.0E-1    4    5    6\r\n",
        )
        .unwrap();

        let mut time = ascii_column("TIME", ElementKind::Char, 0, 16, 1);
        time.item_count = 16;
        time.per_item_bytes = 16;
        let schema = TableSchema {
            name: String::from("TABLE"),
            n_rows: 2,
            n_columns: 4,
            row_bytes: 45,
            row_prefix_bytes: 0,
            row_suffix_bytes: 0,
            format: InterchangeFormat::Ascii,
            columns: vec![
                time,
                ascii_column("COUNT", ElementKind::SignedInt, 16, 5, 1),
                ascii_column("FLUX", ElementKind::Float, 21, 7, 1),
                ascii_column("BINS", ElementKind::UnsignedInt, 28, 5, 3),
            ],
        };
        let section = TableDecoder::new(&schema, &pointer(&path, 0)).decode().unwrap();

        let times = section.column("TIME").unwrap().as_text().unwrap();
        assert_eq!(times[[1]], "2001-01-01T00:01");
        let counts = section.column("COUNT").unwrap().as_i64().unwrap();
        assert_eq!(counts[[0]], -12);
        let flux = section.column("FLUX").unwrap().as_f64().unwrap();
        assert_eq!(flux[[0]], 150.0);
        assert_eq!(flux[[1]], 0.2);
        match section.column("BINS").unwrap() {
            ColumnData::UInt64(arr) => {
                assert_eq!(arr.shape(), &[2, 3]);
                assert_eq!(arr[[1, 2]], 6);
            }
            other => panic!("Expected u64 column, got {}", other.type_name()),
        }

        let short = TableSchema { n_rows: 3, ..schema.clone() };
        assert!(matches!(
            TableDecoder::new(&short, &pointer(&path, 0)).decode(),
            Err(TableError::TruncatedTable { row: 2, .. })
        ));
    }

    #[test]
    fn test_ascii_parse_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.tab");
        fs::write(&path, "  12\r\n abc\r\n").unwrap();
        let schema = TableSchema {
            name: String::from("TABLE"),
            n_rows: 2,
            n_columns: 1,
            row_bytes: 6,
            row_prefix_bytes: 0,
            row_suffix_bytes: 0,
            format: InterchangeFormat::Ascii,
            columns: vec![ascii_column("N", ElementKind::SignedInt, 0, 4, 1)],
        };
        match TableDecoder::new(&schema, &pointer(&path, 0)).decode() {
            Err(TableError::ParsingError { row, column, text, .. }) => {
                assert_eq!(row, 1);
                assert_eq!(column, "N");
                assert_eq!(text, " abc");
            }
            other => panic!("Expected ParsingError, got {other:?}"),
        }
    }

    #[test]
    fn test_ascii_declared_rows_beyond_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.tab");
        fs::write(&path, "  12\r\n  13\r\n").unwrap();
        let schema = TableSchema {
            name: String::from("TABLE"),
            n_rows: 100000000000000,
            n_columns: 1,
            row_bytes: 6,
            row_prefix_bytes: 0,
            row_suffix_bytes: 0,
            format: InterchangeFormat::Ascii,
            columns: vec![ascii_column("N", ElementKind::SignedInt, 0, 4, 1)],
        };
        assert!(matches!(
            TableDecoder::new(&schema, &pointer(&path, 0)).decode(),
            Err(TableError::TruncatedTable { row: 2, .. })
        ));
    }

    #[test]
    fn test_ascii_items_beyond_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.tab");
        fs::write(&path, "  12  13\r\n").unwrap();
        let schema = TableSchema {
            name: String::from("TABLE"),
            n_rows: 1,
            n_columns: 2,
            row_bytes: 10,
            row_prefix_bytes: 0,
            row_suffix_bytes: 0,
            format: InterchangeFormat::Ascii,
            columns: vec![
                ascii_column("LABEL", ElementKind::Char, 0, 64, 1),
                ascii_column("N", ElementKind::SignedInt, 0, 4, 1 << 40),
            ],
        };
        match TableDecoder::new(&schema, &pointer(&path, 0)).decode() {
            Err(TableError::ColumnOutOfRow { column, row_bytes }) => {
                assert_eq!(column, "N");
                assert_eq!(row_bytes, 10);
            }
            other => panic!("Expected ColumnOutOfRow, got {other:?}"),
        }

        // Text may run past the end of a short line
        let text_only = TableSchema {
            n_columns: 1,
            columns: vec![ascii_column("LABEL", ElementKind::Char, 0, 64, 1)],
            ..schema
        };
        let section = TableDecoder::new(&text_only, &pointer(&path, 0)).decode().unwrap();
        let labels = section.column("LABEL").unwrap().as_text().unwrap();
        assert_eq!(labels[[0]], "12  13");
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number::<f64>(" 1.0D-3 "), Some(0.001));
        assert_eq!(parse_number::<i64>("+42"), Some(42));
        assert_eq!(parse_number::<i32>(""), None);
    }
}
