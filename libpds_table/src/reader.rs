use fxhash::FxHashMap;
use ndarray::{Array1, Ix1};
use std::path::Path;

use super::error::ReaderError;
use super::product::{ProductModel, SectionSelector};
use super::table::{CellValue, TableSection};

/// Common view over a product for consumers that want axes and records rather than raw
/// columns.
pub trait ProductReader {
    fn product(&self) -> &ProductModel;

    /// Values of the time-like column of the primary table, as f64
    fn time_axis(&self) -> Result<Array1<f64>, ReaderError>;

    /// Values of the frequency-like column of the primary table, as f64
    fn frequency_axis(&self) -> Result<Array1<f64>, ReaderError>;

    /// Every column value of one row of the primary table, in declared order
    fn single_record(&self, index: usize) -> Result<Vec<(String, CellValue)>, ReaderError>;
}

/// Builds a reader from an opened product
pub type ReaderFactory = fn(ProductModel) -> Result<Box<dyn ProductReader>, ReaderError>;

const TIME_KEYWORDS: [&str; 3] = ["TIME", "EPOCH", "SECONDS"];
const FREQUENCY_KEYWORDS: [&str; 2] = ["FREQUENCY", "FREQ"];

/// A reader which works on any product by treating its first table as the primary one.
///
/// Axes are found by column name: the first numeric single-item column whose name contains
/// one of the keywords is used.
#[derive(Debug)]
pub struct ColumnarReader {
    product: ProductModel,
    primary: String,
}

impl ColumnarReader {
    pub fn new(mut product: ProductModel) -> Result<Self, ReaderError> {
        let primary = product
            .sections()
            .into_iter()
            .find(|name| {
                product
                    .data_section(name)
                    .is_some_and(|section| section.is_table())
            })
            .map(String::from)
            .ok_or_else(|| ReaderError::NoReader(String::from("product without tables")))?;
        product.load(&SectionSelector::Single(primary.clone()))?;
        Ok(Self { product, primary })
    }

    /// Factory function suitable for a ReaderRegistry
    pub fn boxed(product: ProductModel) -> Result<Box<dyn ProductReader>, ReaderError> {
        Ok(Box::new(Self::new(product)?))
    }

    pub fn primary_name(&self) -> &str {
        &self.primary
    }

    fn primary(&self) -> Result<&TableSection, ReaderError> {
        Ok(self.product.section(&self.primary)?)
    }

    fn find_axis(&self, keywords: &[&str], axis: &'static str) -> Result<Array1<f64>, ReaderError> {
        let table = self.primary()?;
        for (schema, data) in table.iter() {
            let name = schema.name.to_uppercase();
            if schema.is_multi_item() || !keywords.iter().any(|k| name.contains(k)) {
                continue;
            }
            let Some(values) = data.to_f64() else {
                continue;
            };
            if let Ok(values) = values.into_dimensionality::<Ix1>() {
                return Ok(values);
            }
        }
        Err(ReaderError::MissingAxis(axis))
    }
}

impl ProductReader for ColumnarReader {
    fn product(&self) -> &ProductModel {
        &self.product
    }

    fn time_axis(&self) -> Result<Array1<f64>, ReaderError> {
        self.find_axis(&TIME_KEYWORDS, "time")
    }

    fn frequency_axis(&self) -> Result<Array1<f64>, ReaderError> {
        self.find_axis(&FREQUENCY_KEYWORDS, "frequency")
    }

    fn single_record(&self, index: usize) -> Result<Vec<(String, CellValue)>, ReaderError> {
        let table = self.primary()?;
        if index >= table.n_rows {
            return Err(ReaderError::RecordOutOfRange {
                index,
                n_rows: table.n_rows,
            });
        }
        Ok(table
            .iter()
            .filter_map(|(schema, data)| data.cell(index).map(|cell| (schema.name.clone(), cell)))
            .collect())
    }
}

/// Maps dataset identifiers to reader factories.
///
/// Products whose DATA_SET_ID is not registered are handled by the fallback factory.
#[derive(Debug, Clone)]
pub struct ReaderRegistry {
    factories: FxHashMap<String, ReaderFactory>,
    fallback: ReaderFactory,
}

impl Default for ReaderRegistry {
    fn default() -> Self {
        Self::new(ColumnarReader::boxed)
    }
}

impl ReaderRegistry {
    pub fn new(fallback: ReaderFactory) -> Self {
        Self {
            factories: FxHashMap::default(),
            fallback,
        }
    }

    /// Register a factory for a dataset. Replaces any previous registration.
    pub fn register(&mut self, dataset_id: &str, factory: ReaderFactory) {
        if self
            .factories
            .insert(dataset_id.to_string(), factory)
            .is_some()
        {
            spdlog::warn!("Replacing reader registered for dataset {}", dataset_id);
        }
    }

    pub fn get(&self, dataset_id: &str) -> Option<ReaderFactory> {
        self.factories.get(dataset_id).copied()
    }

    pub fn is_registered(&self, dataset_id: &str) -> bool {
        self.factories.contains_key(dataset_id)
    }

    /// Open the label at label_path and wrap it in the reader for its dataset
    pub fn open(&self, label_path: &Path) -> Result<Box<dyn ProductReader>, ReaderError> {
        self.open_product(ProductModel::open(label_path)?)
    }

    /// Wrap an already opened product in the reader for its dataset
    pub fn open_product(
        &self,
        product: ProductModel,
    ) -> Result<Box<dyn ProductReader>, ReaderError> {
        let factory = match product.dataset_id().and_then(|id| self.get(id)) {
            Some(factory) => factory,
            None => {
                spdlog::debug!(
                    "No reader registered for dataset {:?}; using the generic reader",
                    product.dataset_id()
                );
                self.fallback
            }
        };
        factory(product)
    }

    /// Wrap a product in the reader registered for dataset_id, without any fallback
    pub fn open_as(
        &self,
        dataset_id: &str,
        product: ProductModel,
    ) -> Result<Box<dyn ProductReader>, ReaderError> {
        let factory = self
            .get(dataset_id)
            .ok_or_else(|| ReaderError::NoReader(dataset_id.to_string()))?;
        factory(product)
    }
}
