use fxhash::FxHashMap;
use std::path::{Path, PathBuf};

use super::column_schema::TableSchema;
use super::config::Config;
use super::constants::{COLUMN_KEY, DATA_SET_ID_KEY, LABEL_EXTENSIONS};
use super::decoder::TableDecoder;
use super::error::{ProductError, SectionFailure, TableError};
use super::label_tokenizer::LabelTokenizer;
use super::label_tree::{build_tree, LabelNode};
use super::pointer::{Pointer, PointerTable};
use super::table::TableSection;

/// Which sections a call to [`ProductModel::load`] should bring into memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionSelector {
    All,
    Single(String),
    List(Vec<String>),
}

impl SectionSelector {
    /// Build a selector from a list of names. An empty list selects everything.
    pub fn from_names(names: &[String]) -> Self {
        match names {
            [] => Self::All,
            [name] => Self::from(name.as_str()),
            _ => Self::List(names.to_vec()),
        }
    }
}

impl From<&str> for SectionSelector {
    fn from(name: &str) -> Self {
        if name.eq_ignore_ascii_case("all") {
            Self::All
        } else {
            Self::Single(name.to_string())
        }
    }
}

/// Sections start out unloaded and become loaded exactly once
#[derive(Debug, Clone)]
pub enum SectionState {
    Unloaded,
    Loaded(TableSection),
}

/// A section which is both pointed to (`^NAME`) and described (`OBJECT = NAME`) by the label
#[derive(Debug, Clone)]
pub struct DataSection {
    pub name: String,
    pub label: LabelNode,
    pub pointer: Pointer,
    state: SectionState,
}

impl DataSection {
    fn new(label: &LabelNode, pointer: &Pointer) -> Self {
        Self {
            name: pointer.target_key.clone(),
            label: label.clone(),
            pointer: pointer.clone(),
            state: SectionState::Unloaded,
        }
    }

    pub fn referenced_file(&self) -> &Path {
        &self.pointer.file_path
    }

    pub fn byte_offset(&self) -> u64 {
        self.pointer.byte_offset
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state, SectionState::Loaded(_))
    }

    /// Only sections which describe columns can be decoded
    pub fn is_table(&self) -> bool {
        !self.label.children(COLUMN_KEY).is_empty()
    }

    pub fn state(&self) -> &SectionState {
        &self.state
    }

    pub fn table(&self) -> Option<&TableSection> {
        match &self.state {
            SectionState::Loaded(table) => Some(table),
            SectionState::Unloaded => None,
        }
    }

    /// Decode the section. The state is only changed if every row decodes.
    fn load(&mut self) -> Result<(), TableError> {
        let schema = TableSchema::derive(&self.name, &self.label)?;
        let table = TableDecoder::new(&schema, &self.pointer).decode()?;
        self.state = SectionState::Loaded(table);
        Ok(())
    }
}

/// What a call to load did with each requested name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub loaded: Vec<String>,
    pub already_loaded: Vec<String>,
    pub skipped: Vec<String>,
    pub unknown: Vec<String>,
}

/// ProductModel is the entry point for reading a labelled product.
///
/// It owns the parsed label, the pointer table and one DataSection per decodable section.
/// Data is only read from disk when a section is explicitly loaded. Consumers get shared
/// references to the decoded tables.
#[derive(Debug)]
pub struct ProductModel {
    label_path: PathBuf,
    label: LabelNode,
    pointers: PointerTable,
    sections: Vec<DataSection>,
}

impl ProductModel {
    /// Open the label at label_path, looking for any included structures next to it
    pub fn open(label_path: &Path) -> Result<Self, ProductError> {
        Self::open_with_overrides(label_path, &FxHashMap::default())
    }

    /// Open the label described by a Config
    pub fn from_config(config: &Config) -> Result<Self, ProductError> {
        Self::open_with_overrides(&config.label_path, &config.overrides())
    }

    /// Open a label, resolving included structures through the override table first
    pub fn open_with_overrides(
        label_path: &Path,
        overrides: &FxHashMap<String, PathBuf>,
    ) -> Result<Self, ProductError> {
        let extension = label_path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if !LABEL_EXTENSIONS.contains(&extension.as_str()) {
            return Err(ProductError::InvalidProduct {
                path: label_path.to_path_buf(),
                reason: format!("expected a label with one of the extensions {LABEL_EXTENSIONS:?}"),
            });
        }

        let entries = LabelTokenizer::new(overrides).tokenize(label_path)?;
        let label = build_tree(entries, label_path)?;
        let pointers = PointerTable::new(&label, label_path)?;

        let mut sections = Vec::new();
        for pointer in pointers.iter() {
            match label.child(&pointer.target_key) {
                Some(node) => sections.push(DataSection::new(node, pointer)),
                None => spdlog::debug!(
                    "Pointer {} has no matching structure and will not be loaded",
                    pointer.target_key
                ),
            }
        }

        if !sections.iter().any(DataSection::is_table) {
            return Err(ProductError::InvalidProduct {
                path: label_path.to_path_buf(),
                reason: String::from("label does not describe any decodable table"),
            });
        }

        spdlog::info!(
            "Opened {:?} with {} pointers and {} sections",
            label_path,
            pointers.len(),
            sections.len()
        );
        Ok(Self {
            label_path: label_path.to_path_buf(),
            label,
            pointers,
            sections,
        })
    }

    pub fn label(&self) -> &LabelNode {
        &self.label
    }

    pub fn label_path(&self) -> &Path {
        &self.label_path
    }

    pub fn pointers(&self) -> &PointerTable {
        &self.pointers
    }

    /// The identifier of the dataset this product belongs to, if the label gives one
    pub fn dataset_id(&self) -> Option<&str> {
        self.label.scalar(DATA_SET_ID_KEY)
    }

    /// Names of every section, in label order
    pub fn sections(&self) -> Vec<&str> {
        self.sections.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn data_section(&self, name: &str) -> Option<&DataSection> {
        self.sections.iter().find(|s| s.name == name)
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.data_section(name).is_some_and(DataSection::is_loaded)
    }

    /// Load the selected sections.
    ///
    /// Unknown names and sections that are not tables are reported and skipped. Sections
    /// that are already loaded are left untouched. If any section fails to decode, the others
    /// are still loaded and every failure is returned together.
    pub fn load(&mut self, selector: &SectionSelector) -> Result<LoadSummary, ProductError> {
        let requested: Vec<String> = match selector {
            SectionSelector::All => self
                .sections
                .iter()
                .filter(|s| s.is_table())
                .map(|s| s.name.clone())
                .collect(),
            SectionSelector::Single(name) => vec![name.clone()],
            SectionSelector::List(names) => names.clone(),
        };

        let mut summary = LoadSummary::default();
        let mut failures = Vec::new();
        for name in requested {
            let Some(section) = self.sections.iter_mut().find(|s| s.name == name) else {
                spdlog::warn!("Product has no section named {}; skipping", name);
                summary.unknown.push(name);
                continue;
            };
            if section.is_loaded() {
                summary.already_loaded.push(name);
                continue;
            }
            if !section.is_table() {
                spdlog::warn!("Section {} is not a table; skipping", name);
                summary.skipped.push(name);
                continue;
            }
            match section.load() {
                Ok(()) => summary.loaded.push(name),
                Err(error) => {
                    spdlog::error!("Failed to load section {}: {}", name, error);
                    failures.push(SectionFailure { name, error });
                }
            }
        }

        if failures.is_empty() {
            Ok(summary)
        } else {
            Err(ProductError::SectionsFailed(failures))
        }
    }

    /// Get a loaded table by name
    pub fn section(&self, name: &str) -> Result<&TableSection, ProductError> {
        let section = self
            .data_section(name)
            .ok_or_else(|| ProductError::UnknownSection(name.to_string()))?;
        section
            .table()
            .ok_or_else(|| ProductError::SectionNotLoaded(name.to_string()))
    }
}

/// Open the product described by the label at label_path
pub fn open(label_path: &Path) -> Result<ProductModel, ProductError> {
    ProductModel::open(label_path)
}
