use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;

pub use serde_yaml::Value as YamlValue;

/// Text codec behind sidecar and config files.
pub trait YamlProvider: Send + Sync {
    fn parse_str(&self, input: &str) -> Result<YamlValue>;
    fn dump_value(&self, value: &YamlValue) -> Result<String>;
}

struct SerdeYamlProvider;

impl YamlProvider for SerdeYamlProvider {
    fn parse_str(&self, input: &str) -> Result<YamlValue> {
        if input.trim().is_empty() {
            // An empty document reads as an empty mapping so every key can default.
            return Ok(YamlValue::Mapping(Default::default()));
        }
        Ok(serde_yaml::from_str(input)?)
    }

    fn dump_value(&self, value: &YamlValue) -> Result<String> {
        Ok(serde_yaml::to_string(value)?)
    }
}

static YAML_PROVIDER: OnceLock<Box<dyn YamlProvider>> = OnceLock::new();

pub fn provider() -> &'static dyn YamlProvider {
    YAML_PROVIDER
        .get_or_init(|| Box::new(SerdeYamlProvider))
        .as_ref()
}

pub fn from_str<T: DeserializeOwned>(input: &str) -> Result<T> {
    let value = provider().parse_str(input)?;
    Ok(serde_yaml::from_value(value)?)
}

pub fn to_string<T: Serialize>(value: &T) -> Result<String> {
    let yaml_value = serde_yaml::to_value(value)?;
    provider().dump_value(&yaml_value)
}

pub fn load_from_path<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("Opening YAML file {path:?}"))?;
    from_str(&raw).with_context(|| format!("Parsing YAML file {path:?}"))
}
