//! Semantic column types and the schema sidecar that persists them next to a dataset.
//!
//! A sidecar lives at the dataset path with its extension replaced by
//! `.schema.yml` and holds three maps:
//!
//! ```yaml
//! types:
//!   status: binary
//!   level: ordinal
//! orders:
//!   level: Low,Medium,High
//! date_standardized:
//!   visit:
//!     original_format: MM/DD/YYYY
//!     target_format: YYYY-MM-DD
//!     standardized: true
//! ```
//!
//! Readers tolerate a missing file and any subset of the keys; writers always
//! emit all three.

use std::{
    collections::HashMap,
    ffi::OsString,
    fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
    sync::{Arc, Mutex, MutexGuard, OnceLock},
};

use anyhow::anyhow;
use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    error::{IngestError, Result},
    yaml_provider,
};

pub const SIDECAR_SUFFIX: &str = "schema.yml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticType {
    Numeric,
    Binary,
    Categorical,
    Ordinal,
    Count,
    Date,
    String,
    Auto,
}

impl SemanticType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SemanticType::Numeric => "numeric",
            SemanticType::Binary => "binary",
            SemanticType::Categorical => "categorical",
            SemanticType::Ordinal => "ordinal",
            SemanticType::Count => "count",
            SemanticType::Date => "date",
            SemanticType::String => "string",
            SemanticType::Auto => "auto",
        }
    }

    pub fn variants() -> &'static [&'static str] {
        &[
            "numeric",
            "binary",
            "categorical",
            "ordinal",
            "count",
            "date",
            "string",
            "auto",
        ]
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SemanticType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "numeric" | "number" | "continuous" => Ok(SemanticType::Numeric),
            "binary" | "bool" | "boolean" => Ok(SemanticType::Binary),
            "categorical" | "category" | "nominal" => Ok(SemanticType::Categorical),
            "ordinal" | "ordered" => Ok(SemanticType::Ordinal),
            "count" => Ok(SemanticType::Count),
            "date" => Ok(SemanticType::Date),
            "string" | "text" => Ok(SemanticType::String),
            "auto" => Ok(SemanticType::Auto),
            _ => Err(anyhow!(
                "Unknown column type '{value}'. Supported types: {}",
                SemanticType::variants().join(", ")
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateStandardization {
    pub original_format: Option<String>,
    pub target_format: String,
    #[serde(default)]
    pub standardized: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaSidecar {
    #[serde(default)]
    pub types: IndexMap<String, SemanticType>,
    /// Category orders stored as comma-joined labels.
    #[serde(default)]
    pub orders: IndexMap<String, String>,
    #[serde(default)]
    pub date_standardized: IndexMap<String, DateStandardization>,
}

impl SchemaSidecar {
    pub fn is_empty(&self) -> bool {
        self.types.is_empty() && self.orders.is_empty() && self.date_standardized.is_empty()
    }

    pub fn order_for(&self, column: &str) -> Option<Vec<String>> {
        self.orders.get(column).map(|joined| split_order(joined))
    }

    pub fn set_order(&mut self, column: &str, levels: &[String]) {
        self.orders.insert(column.to_string(), levels.join(","));
    }

    /// Moves every entry recorded under `from` to `to`, keeping map positions.
    pub fn rename_column(&mut self, from: &str, to: &str) {
        rename_key(&mut self.types, from, to);
        rename_key(&mut self.orders, from, to);
        rename_key(&mut self.date_standardized, from, to);
    }

    pub fn to_yaml_string(&self) -> anyhow::Result<String> {
        yaml_provider::to_string(self)
    }
}

pub fn split_order(joined: &str) -> Vec<String> {
    joined
        .split(',')
        .map(str::trim)
        .filter(|level| !level.is_empty())
        .map(str::to_string)
        .collect()
}

fn rename_key<V>(map: &mut IndexMap<String, V>, from: &str, to: &str) {
    if let Some(index) = map.get_index_of(from) {
        if let Some((_, value)) = map.shift_remove_index(index) {
            map.shift_insert(index.min(map.len()), to.to_string(), value);
        }
    }
}

/// `survey.csv` → `survey.schema.yml`.
pub fn sidecar_path(dataset: &Path) -> PathBuf {
    dataset.with_extension(SIDECAR_SUFFIX)
}

/// Path-keyed persistence of schema sidecars.
pub trait SchemaStore: Send + Sync {
    /// `Ok(None)` when no sidecar exists yet.
    fn load(&self, dataset: &Path) -> Result<Option<SchemaSidecar>>;

    fn save(&self, dataset: &Path, sidecar: &SchemaSidecar) -> Result<()>;

    /// Read-modify-write under the store's lock; returns the written sidecar.
    fn update(
        &self,
        dataset: &Path,
        edit: &mut dyn FnMut(&mut SchemaSidecar),
    ) -> Result<SchemaSidecar>;

    /// Returns whether a sidecar was removed.
    fn remove(&self, dataset: &Path) -> Result<bool>;
}

/// Stores sidecars as YAML files beside their datasets.
#[derive(Debug, Clone, Copy, Default)]
pub struct SidecarFileStore;

static PATH_LOCKS: OnceLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();

fn lock_ignoring_poison<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn path_lock(path: &Path) -> Arc<Mutex<()>> {
    let registry = PATH_LOCKS.get_or_init(|| Mutex::new(HashMap::new()));
    let key = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    lock_ignoring_poison(registry)
        .entry(key)
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone()
}

impl SidecarFileStore {
    pub fn new() -> Self {
        SidecarFileStore
    }

    fn read(&self, path: &Path) -> Result<Option<SchemaSidecar>> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(IngestError::SchemaReadCorrupt {
                    path: path.to_path_buf(),
                    reason: err.to_string(),
                });
            }
        };
        yaml_provider::from_str::<SchemaSidecar>(&raw)
            .map(Some)
            .map_err(|err| IngestError::SchemaReadCorrupt {
                path: path.to_path_buf(),
                reason: format!("{err:#}"),
            })
    }

    fn write(&self, path: &Path, sidecar: &SchemaSidecar) -> Result<()> {
        let write_failed = |reason: String| IngestError::SchemaWriteFailed {
            path: path.to_path_buf(),
            reason,
        };
        let serialized = sidecar
            .to_yaml_string()
            .map_err(|err| write_failed(format!("{err:#}")))?;
        let mut temp_name = path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("sidecar"));
        temp_name.push(format!(".{}.tmp", std::process::id()));
        let temp_path = path.with_file_name(temp_name);
        fs::write(&temp_path, serialized).map_err(|err| write_failed(err.to_string()))?;
        if let Err(err) = fs::rename(&temp_path, path) {
            let _ = fs::remove_file(&temp_path);
            return Err(write_failed(err.to_string()));
        }
        debug!("Wrote schema sidecar {path:?}");
        Ok(())
    }
}

impl SchemaStore for SidecarFileStore {
    fn load(&self, dataset: &Path) -> Result<Option<SchemaSidecar>> {
        self.read(&sidecar_path(dataset))
    }

    fn save(&self, dataset: &Path, sidecar: &SchemaSidecar) -> Result<()> {
        let path = sidecar_path(dataset);
        let lock = path_lock(&path);
        let _guard = lock_ignoring_poison(&lock);
        self.write(&path, sidecar)
    }

    fn update(
        &self,
        dataset: &Path,
        edit: &mut dyn FnMut(&mut SchemaSidecar),
    ) -> Result<SchemaSidecar> {
        let path = sidecar_path(dataset);
        let lock = path_lock(&path);
        let _guard = lock_ignoring_poison(&lock);
        let mut sidecar = match self.read(&path) {
            Ok(existing) => existing.unwrap_or_default(),
            Err(err) => {
                log::warn!("{err}; rewriting it from scratch");
                SchemaSidecar::default()
            }
        };
        edit(&mut sidecar);
        self.write(&path, &sidecar)?;
        Ok(sidecar)
    }

    fn remove(&self, dataset: &Path) -> Result<bool> {
        let path = sidecar_path(dataset);
        let lock = path_lock(&path);
        let _guard = lock_ignoring_poison(&lock);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(IngestError::Io(err)),
        }
    }
}

/// Keeps sidecars in memory, keyed by dataset path.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sidecars: Mutex<HashMap<PathBuf, SchemaSidecar>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SchemaStore for MemoryStore {
    fn load(&self, dataset: &Path) -> Result<Option<SchemaSidecar>> {
        Ok(lock_ignoring_poison(&self.sidecars).get(dataset).cloned())
    }

    fn save(&self, dataset: &Path, sidecar: &SchemaSidecar) -> Result<()> {
        lock_ignoring_poison(&self.sidecars).insert(dataset.to_path_buf(), sidecar.clone());
        Ok(())
    }

    fn update(
        &self,
        dataset: &Path,
        edit: &mut dyn FnMut(&mut SchemaSidecar),
    ) -> Result<SchemaSidecar> {
        let mut sidecars = lock_ignoring_poison(&self.sidecars);
        let sidecar = sidecars.entry(dataset.to_path_buf()).or_default();
        edit(sidecar);
        Ok(sidecar.clone())
    }

    fn remove(&self, dataset: &Path) -> Result<bool> {
        Ok(lock_ignoring_poison(&self.sidecars)
            .remove(dataset)
            .is_some())
    }
}
