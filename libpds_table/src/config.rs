use fxhash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::error::ConfigError;
use super::product::SectionSelector;

/// Structure representing the application configuration. Contains the label to read and
/// which parts of it to load.
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub label_path: PathBuf,
    #[serde(default)]
    pub structure_overrides: BTreeMap<String, PathBuf>,
    #[serde(default)]
    pub sections: Vec<String>,
    #[serde(default)]
    pub dataset_id: Option<String>,
}

impl Default for Config {
    /// Generate a new Config object. The label path will be invalid
    fn default() -> Self {
        Self {
            label_path: PathBuf::from("None"),
            structure_overrides: BTreeMap::new(),
            sections: Vec::new(),
            dataset_id: None,
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    /// Write the configuration to a YAML file
    pub fn write_config_file(&self, config_path: &Path) -> Result<(), ConfigError> {
        let yaml_str = serde_yaml::to_string(self)?;
        std::fs::write(config_path, yaml_str)?;
        Ok(())
    }

    /// Which sections should be loaded. No names means everything.
    pub fn selector(&self) -> SectionSelector {
        SectionSelector::from_names(&self.sections)
    }

    /// The structure overrides in the form used by the tokenizer
    pub fn overrides(&self) -> FxHashMap<String, PathBuf> {
        self.structure_overrides
            .iter()
            .map(|(name, path)| (name.clone(), path.clone()))
            .collect()
    }
}
