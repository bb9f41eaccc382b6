use std::path::Path;

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::{dates::DateDetectionConfig, yaml_provider};

pub const DEFAULT_SAMPLE_ROWS: usize = 5_000;
pub const DEFAULT_DATE_SAMPLE_SIZE: usize = 100;
pub const DEFAULT_DATE_THRESHOLD: f64 = 50.0;
pub const DEFAULT_NUMERIC_THRESHOLD: f64 = 0.8;
pub const DEFAULT_CATEGORY_LIMIT: usize = 100;

/// Tuning knobs for inference. Every key is optional in a config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngestConfig {
    /// Rows the classifier looks at per column.
    pub sample_rows: usize,
    /// Non-missing values the date detector scores per column.
    pub date_sample_size: usize,
    /// Minimum match percentage for a column to count as a date.
    pub date_threshold: f64,
    /// Percentage points within which two date candidates count as tied.
    pub ambiguity_margin: f64,
    /// Share of values that must coerce to numbers for the numeric rule.
    pub numeric_threshold: f64,
    /// Maximum distinct values for a categorical or ordinal column.
    pub category_limit: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            sample_rows: DEFAULT_SAMPLE_ROWS,
            date_sample_size: DEFAULT_DATE_SAMPLE_SIZE,
            date_threshold: DEFAULT_DATE_THRESHOLD,
            ambiguity_margin: 0.0,
            numeric_threshold: DEFAULT_NUMERIC_THRESHOLD,
            category_limit: DEFAULT_CATEGORY_LIMIT,
        }
    }
}

impl IngestConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let config: IngestConfig = yaml_provider::load_from_path(path)
            .with_context(|| format!("Loading ingest config from {path:?}"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.sample_rows > 0, "sample_rows must be positive");
        ensure!(self.date_sample_size > 0, "date_sample_size must be positive");
        ensure!(
            (0.0..=100.0).contains(&self.date_threshold),
            "date_threshold must be between 0 and 100"
        );
        ensure!(
            self.ambiguity_margin >= 0.0,
            "ambiguity_margin cannot be negative"
        );
        ensure!(
            self.numeric_threshold > 0.0 && self.numeric_threshold <= 1.0,
            "numeric_threshold must be in (0, 1]"
        );
        Ok(())
    }

    pub fn date_detection(&self) -> DateDetectionConfig {
        DateDetectionConfig {
            sample_size: self.date_sample_size,
            threshold: self.date_threshold,
            ambiguity_margin: self.ambiguity_margin,
        }
    }
}
