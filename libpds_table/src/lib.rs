//! # libpds_table
//!
//! libpds_table reads tabular science data products described by plain-text labels, written
//! in Rust. A label is a list of `KEY = VALUE` statements, nested with `OBJECT`/`END_OBJECT`
//! (or `GROUP`/`END_GROUP`), which describes where data lives (pointers such as
//! `^TABLE = ("DATA.DAT", 3)`) and how each row of a table is laid out (`COLUMN` objects).
//! libpds_table turns the label into a typed schema and decodes ASCII or binary tables into
//! columnar [ndarray](https://docs.rs/ndarray) arrays, one per column.
//!
//! ## Installation
//!
//! The only method of install is from source.
//!
//! ### Rust
//!
//! If you have not used Rust before, you will most likely need to install the Rust tool
//! chain. See the [Rust docs](https://www.rust-lang.org/tools/install) for installation
//! instructions.
//!
//! ### Building & Install
//!
//! To build and install the CLI use `cargo install --path ./pds_table_cli` from the top
//! level repository. The binary will be installed to your cargo install location
//! (typically something like `~/.cargo/bin/`). To use the CLI see the `pds_table_cli`
//! README.
//!
//! ## Usage
//!
//! Products are opened lazily. Opening a label parses it, resolves its pointers, and
//! finds every section which is both pointed to and described. No data is read until a
//! section is loaded:
//!
//! ```no_run
//! use libpds_table::product::{ProductModel, SectionSelector};
//! use std::path::Path;
//!
//! let mut product = ProductModel::open(Path::new("/data/product.lbl")).unwrap();
//! product.load(&SectionSelector::Single(String::from("TABLE"))).unwrap();
//! let table = product.section("TABLE").unwrap();
//! for (schema, data) in table.iter() {
//!     println!("{} {} {:?}", schema.name, data.type_name(), data.shape());
//! }
//! ```
//!
//! Loading is idempotent; a section which has already been loaded is never read again.
//! When several sections are requested, every one of them is attempted and all of the
//! failures are reported together.
//!
//! For consumers that want time or frequency axes instead of raw columns, the
//! [reader::ReaderRegistry] picks a [reader::ProductReader] based on the label's
//! `DATA_SET_ID`, falling back to a generic column-name based reader.
//!
//! ## Configuration
//!
//! The CLI (and [config::Config]) use a YAML configuration file of the following format:
//!
//! ```yml
//! label_path: /data/product.lbl
//! structure_overrides:
//!   COLUMNS.FMT: /data/label/columns.fmt
//! sections:
//!   - TABLE
//! dataset_id: null
//! ```
//!
//! - `label_path`: full path to the label (must have a `.lbl` extension)
//! - `structure_overrides`: optional map from `^STRUCTURE` file names to where that file
//! actually lives. Anything not in the map is looked up next to the including label,
//! trying the name as given, then in lower case, then in upper case.
//! - `sections`: the sections to load. Leave empty (or give `all`) to load every table.
//! - `dataset_id`: optional reader to use instead of the one named by the label
//!
//! ## Data Types
//!
//! Columns are decoded to arrays of shape `[rows]`, or `[rows, items]` for columns with
//! more than one item. The element type follows the column's `DATA_TYPE` and width:
//!
//! ```text
//! *_INTEGER (1,2,4,8 bytes)           -> i8, i16, i32, i64
//! *_UNSIGNED_INTEGER (1,2,4,8 bytes)  -> u8, u16, u32, u64
//! *_REAL (4,8 bytes)                  -> f32, f64
//! ASCII_INTEGER                       -> i32
//! ASCII_REAL                          -> f64
//! CHARACTER, DATE, TIME               -> String (trimmed)
//! BIT_STRING                          -> u8, one column per byte
//! ```
//!
//! `MSB_` and `SUN_` types are big endian, `LSB_` and `PC_` types are little endian.
//! Numeric columns in ASCII tables hold signed or unsigned 64 bit integers or f64 unless
//! declared ASCII_INTEGER.
//!
//! ## Logging
//!
//! The library logs through [spdlog](https://docs.rs/spdlog-rs). Applications can install
//! their own sinks or leave the default logger in place.
pub mod column_schema;
pub mod config;
pub mod constants;
pub mod decoder;
pub mod error;
mod label_tokenizer;
pub mod label_tree;
pub mod pointer;
pub mod product;
pub mod reader;
pub mod table;
