//! Explicit feature schema
//!
//! An ordered list of named numeric columns, validated once. The position of
//! a column in the schema is its position in every feature vector.

use moodmix_common::config::SchemaConfig;
use moodmix_common::{Error, Result};

/// One numeric feature column with optional plausibility bounds
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureColumn {
    pub name: String,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl FeatureColumn {
    /// True when `value` is finite and inside the declared bounds
    pub fn accepts(&self, value: f64) -> bool {
        if !value.is_finite() {
            return false;
        }
        if let Some(min) = self.min {
            if value < min {
                return false;
            }
        }
        if let Some(max) = self.max {
            if value > max {
                return false;
            }
        }
        true
    }
}

/// Ordered feature columns (dimension D = number of columns)
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSchema {
    columns: Vec<FeatureColumn>,
}

impl FeatureSchema {
    pub fn new(columns: Vec<FeatureColumn>) -> Result<Self> {
        if columns.is_empty() {
            return Err(Error::Config("feature schema has no columns".to_string()));
        }
        for (i, column) in columns.iter().enumerate() {
            if column.name.trim().is_empty() {
                return Err(Error::Config(format!("feature column {} has an empty name", i)));
            }
            if columns[..i].iter().any(|c| c.name == column.name) {
                return Err(Error::Config(format!(
                    "feature column '{}' declared twice",
                    column.name
                )));
            }
        }
        Ok(Self { columns })
    }

    pub fn from_config(config: &SchemaConfig) -> Result<Self> {
        Self::new(
            config
                .features
                .iter()
                .map(|c| FeatureColumn {
                    name: c.name.trim().to_string(),
                    min: c.min,
                    max: c.max,
                })
                .collect(),
        )
    }

    /// Schema over the named columns with their built-in bounds
    pub fn from_names(names: &[&str]) -> Result<Self> {
        Self::from_config(&SchemaConfig::from_names(names))
    }

    pub fn dimension(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[FeatureColumn] {
        &self.columns
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self {
            columns: SchemaConfig::default()
                .features
                .into_iter()
                .map(|c| FeatureColumn {
                    name: c.name,
                    min: c.min,
                    max: c.max,
                })
                .collect(),
        }
    }
}
