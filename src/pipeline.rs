//! End-to-end loading: read, classify, detect dates, merge the sidecar, apply types.
//!
//! The sidecar is consulted after fresh inference so persisted decisions win,
//! and written when it does not exist yet or when the caller overrides a
//! decision. Sidecar problems never fail a load; they are logged and reported
//! through [`SidecarState::Unavailable`].

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::{debug, info, warn};

use crate::{
    apply::{ApplyReport, apply_types},
    classify::Classifier,
    config::IngestConfig,
    dataset::{ColumnData, Dataset},
    dates::{self, DateDecision, DateFormat},
    error::{IngestError, Result},
    reader::{self, ReadOptions, SourceFormat},
    schema::{DateStandardization, SchemaSidecar, SchemaStore, SemanticType, SidecarFileStore},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SidecarState {
    /// No sidecar existed; one was written from this load's inference.
    Seeded,
    /// A sidecar existed and its decisions were merged.
    Present,
    /// The sidecar could not be read or written; inference alone was used.
    Unavailable,
}

#[derive(Debug)]
pub struct LoadedDataset {
    pub path: PathBuf,
    pub dataset: Dataset,
    pub types: IndexMap<String, SemanticType>,
    pub orders: IndexMap<String, Vec<String>>,
    pub source: SourceFormat,
    /// Date detection results for every column that was checked.
    pub dates: IndexMap<String, DateDecision>,
    /// Date columns whose best formats tie and should be confirmed by a person.
    pub ambiguous_dates: Vec<String>,
    /// Date columns currently holding standardized text, keyed by column.
    pub standardized: IndexMap<String, DateStandardization>,
    pub sidecar_state: SidecarState,
    pub apply_report: ApplyReport,
}

pub struct DatasetLoader<S = SidecarFileStore> {
    store: S,
    config: IngestConfig,
    classifier: Classifier,
}

impl DatasetLoader<SidecarFileStore> {
    pub fn new(config: IngestConfig) -> Self {
        Self::with_store(SidecarFileStore::new(), config)
    }
}

impl Default for DatasetLoader<SidecarFileStore> {
    fn default() -> Self {
        Self::new(IngestConfig::default())
    }
}

fn detects_dates(semantic_type: SemanticType, data: &ColumnData) -> bool {
    !matches!(semantic_type, SemanticType::Numeric | SemanticType::Count)
        && !data.is_native_numeric()
}

impl<S: SchemaStore> DatasetLoader<S> {
    pub fn with_store(store: S, config: IngestConfig) -> Self {
        let classifier = Classifier {
            numeric_threshold: config.numeric_threshold,
            category_limit: config.category_limit,
        };
        Self {
            store,
            config,
            classifier,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn load(&self, path: &Path, options: &ReadOptions) -> Result<LoadedDataset> {
        let outcome = reader::read_dataset(path, options)?;
        let mut dataset = outcome.dataset;

        let classification = self
            .classifier
            .classify_dataset(&dataset, self.config.sample_rows);
        let mut types = classification.types;
        let mut orders = classification.orders;

        let detection = self.config.date_detection();
        let mut date_decisions = IndexMap::new();
        for column in dataset.columns() {
            let inferred = types
                .get(&column.name)
                .copied()
                .unwrap_or(SemanticType::String);
            if !detects_dates(inferred, &column.data) {
                continue;
            }
            let decision = dates::detect_column(&column.data.to_values(), &detection);
            if decision.is_date {
                debug!(
                    "Column '{}' looks like dates ({:?})",
                    column.name,
                    decision.best().map(|c| c.display_name.as_str())
                );
                types.insert(column.name.clone(), SemanticType::Date);
                orders.shift_remove(&column.name);
            }
            date_decisions.insert(column.name.clone(), decision);
        }

        let (sidecar, sidecar_state) = self.merge_sidecar(path, &dataset, &mut types, &mut orders);

        let mut standardized = IndexMap::new();
        if let Some(sidecar) = &sidecar {
            for (column, entry) in &sidecar.date_standardized {
                if !entry.standardized || dataset.column(column).is_none() {
                    continue;
                }
                match restandardize(&mut dataset, column, entry) {
                    Ok(()) => {
                        types.insert(column.clone(), SemanticType::Date);
                        standardized.insert(column.clone(), entry.clone());
                    }
                    Err(err) => warn!("Could not re-apply date standardization: {err}"),
                }
            }
        }

        let ambiguous_dates = date_decisions
            .iter()
            .filter(|(column, decision)| {
                decision.ambiguous
                    && types.get(*column) == Some(&SemanticType::Date)
                    && !standardized.contains_key(*column)
            })
            .map(|(column, _)| column.clone())
            .collect::<Vec<_>>();
        for column in &ambiguous_dates {
            warn!("Column '{column}' matches several date formats equally well; confirm the format");
        }

        let apply_report = apply_types(&mut dataset, &types, &orders);
        info!(
            "Loaded {} row(s) x {} column(s) from {:?} (sidecar {:?})",
            dataset.row_count(),
            dataset.column_count(),
            path,
            sidecar_state
        );
        Ok(LoadedDataset {
            path: path.to_path_buf(),
            dataset,
            types,
            orders,
            source: outcome.format,
            dates: date_decisions,
            ambiguous_dates,
            standardized,
            sidecar_state,
            apply_report,
        })
    }

    /// Overlays a persisted sidecar on fresh inference, or seeds one when none exists.
    fn merge_sidecar(
        &self,
        path: &Path,
        dataset: &Dataset,
        types: &mut IndexMap<String, SemanticType>,
        orders: &mut IndexMap<String, Vec<String>>,
    ) -> (Option<SchemaSidecar>, SidecarState) {
        match self.store.load(path) {
            Ok(Some(sidecar)) => {
                for (column, persisted) in &sidecar.types {
                    if *persisted == SemanticType::Auto || dataset.column(column).is_none() {
                        continue;
                    }
                    types.insert(column.clone(), *persisted);
                }
                for column in sidecar.orders.keys() {
                    if dataset.column(column).is_some()
                        && let Some(order) = sidecar.order_for(column)
                    {
                        orders.insert(column.clone(), order);
                    }
                }
                (Some(sidecar), SidecarState::Present)
            }
            Ok(None) => {
                let mut seeded = SchemaSidecar {
                    types: types.clone(),
                    ..SchemaSidecar::default()
                };
                for (column, order) in orders.iter() {
                    seeded.set_order(column, order);
                }
                match self.store.save(path, &seeded) {
                    Ok(()) => {
                        info!("Seeded schema sidecar for {} column(s)", seeded.types.len());
                        (Some(seeded), SidecarState::Seeded)
                    }
                    Err(err) => {
                        warn!("{err}; continuing without a sidecar");
                        (None, SidecarState::Unavailable)
                    }
                }
            }
            Err(err) => {
                warn!("{err}; using fresh inference only");
                (None, SidecarState::Unavailable)
            }
        }
    }

    fn update_sidecar(
        &self,
        loaded: &mut LoadedDataset,
        edit: &mut dyn FnMut(&mut SchemaSidecar),
    ) {
        if let Err(err) = self.store.update(&loaded.path, edit) {
            warn!("{err}; the change applies to this session only");
            loaded.sidecar_state = SidecarState::Unavailable;
        }
    }

    /// Records a type override for `column`; `auto` removes the override.
    pub fn set_column_type(
        &self,
        path: &Path,
        column: &str,
        semantic_type: SemanticType,
        order: Option<Vec<String>>,
    ) -> Result<SchemaSidecar> {
        let sidecar = self.store.update(path, &mut |sidecar| {
            if semantic_type == SemanticType::Auto {
                sidecar.types.shift_remove(column);
                sidecar.orders.shift_remove(column);
                return;
            }
            sidecar.types.insert(column.to_string(), semantic_type);
            if let Some(order) = order.as_ref().filter(|o| !o.is_empty()) {
                sidecar.set_order(column, order);
            }
        })?;
        info!("Column '{column}' set to {semantic_type} in {path:?}");
        Ok(sidecar)
    }

    /// Converts a column to `target` and records the standardization.
    ///
    /// `original` names the format the values are in. When absent, a column
    /// standardized earlier is read in its current target format and any other
    /// column in its best detected pattern. The sidecar keeps the format of the
    /// file itself so reloads convert from the raw values. Returns how many
    /// non-missing values could not be converted.
    pub fn standardize_dates(
        &self,
        loaded: &mut LoadedDataset,
        column: &str,
        target: &str,
        original: Option<&str>,
    ) -> Result<usize> {
        let values = loaded.dataset.require_column(column)?.data.to_values();
        let target = DateFormat::resolve(target)?;
        let previous = loaded.standardized.get(column).cloned();
        let hint = match (original, &previous) {
            (Some(original), _) => DateFormat::resolve_hint(original)?,
            (None, Some(previous)) => Some(DateFormat::resolve(&previous.target_format)?),
            (None, None) => loaded
                .dates
                .get(column)
                .and_then(|decision| decision.best())
                .filter(|best| !best.is_flexible())
                .and_then(|best| DateFormat::resolve(&best.pattern).ok()),
        };
        let converted = dates::convert_column(&values, &target, hint.as_ref());
        let failed = values
            .iter()
            .zip(&converted)
            .filter(|(before, after)| before.is_some() && after.is_none())
            .count();
        loaded
            .dataset
            .replace_data(column, ColumnData::Text(converted))?;
        loaded
            .types
            .insert(column.to_string(), SemanticType::Date);
        loaded.orders.shift_remove(column);
        loaded.ambiguous_dates.retain(|c| c != column);

        let original_format = match previous {
            Some(previous) => previous.original_format,
            None => hint.as_ref().map(|h| h.display_name.clone()),
        };
        let entry = DateStandardization {
            original_format,
            target_format: target.display_name.clone(),
            standardized: true,
        };
        loaded.standardized.insert(column.to_string(), entry.clone());
        self.update_sidecar(loaded, &mut |sidecar| {
            sidecar
                .types
                .insert(column.to_string(), SemanticType::Date);
            sidecar
                .date_standardized
                .insert(column.to_string(), entry.clone());
        });
        if failed > 0 {
            warn!("{failed} value(s) in '{column}' could not be read as dates and are now missing");
        }
        info!("Standardized '{column}' to {}", target.display_name);
        Ok(failed)
    }

    /// Renames a column in the loaded table and in every sidecar map.
    pub fn rename_column(&self, loaded: &mut LoadedDataset, from: &str, to: &str) -> Result<()> {
        let index = loaded
            .dataset
            .column_index(from)
            .ok_or_else(|| IngestError::ColumnNotFound(from.to_string()))?;
        loaded.dataset.rename_column(from, to)?;
        let to = loaded.dataset.columns()[index].name.clone();
        rename_entry(&mut loaded.types, from, &to);
        rename_entry(&mut loaded.orders, from, &to);
        rename_entry(&mut loaded.dates, from, &to);
        rename_entry(&mut loaded.standardized, from, &to);
        for column in loaded.ambiguous_dates.iter_mut() {
            if column == from {
                *column = to.clone();
            }
        }
        let from_owned = from.to_string();
        self.update_sidecar(loaded, &mut |sidecar| sidecar.rename_column(&from_owned, &to));
        info!("Renamed column '{from}' to '{to}'");
        Ok(())
    }
}

fn rename_entry<V>(map: &mut IndexMap<String, V>, from: &str, to: &str) {
    if let Some(index) = map.get_index_of(from)
        && let Some((_, value)) = map.shift_remove_index(index)
    {
        map.shift_insert(index, to.to_string(), value);
    }
}

fn restandardize(
    dataset: &mut Dataset,
    column: &str,
    entry: &DateStandardization,
) -> Result<()> {
    let target = DateFormat::resolve(&entry.target_format)?;
    let hint = match &entry.original_format {
        Some(original) => DateFormat::resolve_hint(original)?,
        None => None,
    };
    let values = dataset.require_column(column)?.data.to_values();
    let converted = dates::convert_column(&values, &target, hint.as_ref());
    dataset.replace_data(column, ColumnData::Text(converted))
}
