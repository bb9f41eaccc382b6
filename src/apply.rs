use std::collections::HashMap;

use indexmap::IndexMap;
use itertools::Itertools;
use log::{debug, warn};

use crate::{
    classify::natural_order,
    dataset::{Categories, ColumnData, Dataset, Value},
    error::IngestError,
    schema::SemanticType,
};

/// Recognised binary spellings as `(positive, negative)`.
const BINARY_PAIRS: &[(&str, &str)] = &[
    ("yes", "no"),
    ("y", "n"),
    ("true", "false"),
    ("t", "f"),
    ("1", "0"),
    ("positive", "negative"),
    ("pass", "fail"),
    ("present", "absent"),
];

#[derive(Debug, Default)]
pub struct ApplyReport {
    /// Columns whose representation changed, with the type applied.
    pub applied: IndexMap<String, SemanticType>,
    /// Columns left untouched because coercion failed.
    pub failures: Vec<IngestError>,
    /// Binary columns that held more than two values and became categories.
    pub binary_as_category: Vec<String>,
    /// Ordinal values outside the level order, set to missing, per column.
    pub out_of_order_values: IndexMap<String, usize>,
}

impl ApplyReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.out_of_order_values.is_empty()
    }
}

fn display_values(data: &ColumnData) -> Vec<Option<String>> {
    data.to_values()
        .into_iter()
        .map(|cell| cell.map(|value| value.as_display().trim().to_string()))
        .collect()
}

/// Numbers for each cell plus how many non-missing cells converted.
fn coerce_numbers(values: &[Option<Value>]) -> (Vec<Option<f64>>, usize, usize) {
    let mut converted = 0usize;
    let mut present = 0usize;
    let numbers = values
        .iter()
        .map(|cell| {
            let value = cell.as_ref()?;
            present += 1;
            let number = value.to_number();
            if number.is_some() {
                converted += 1;
            }
            number
        })
        .collect();
    (numbers, converted, present)
}

fn coercion_failure(column: &str, target: SemanticType) -> IngestError {
    IngestError::ColumnCoercionFailed {
        column: column.to_string(),
        target: target.to_string(),
        reason: "no value could be converted to a number".to_string(),
    }
}

fn to_numeric(column: &str, data: &ColumnData) -> Result<ColumnData, IngestError> {
    let (numbers, converted, present) = coerce_numbers(&data.to_values());
    if present > 0 && converted == 0 {
        return Err(coercion_failure(column, SemanticType::Numeric));
    }
    Ok(ColumnData::Numeric(numbers))
}

fn to_count(column: &str, data: &ColumnData) -> Result<ColumnData, IngestError> {
    let (numbers, converted, present) = coerce_numbers(&data.to_values());
    if present > 0 && converted == 0 {
        return Err(coercion_failure(column, SemanticType::Count));
    }
    Ok(ColumnData::Integer(
        numbers
            .into_iter()
            .map(|n| n.map(|v| v.max(0.0).round() as i64))
            .collect(),
    ))
}

fn categories(labels: &[Option<String>], levels: Vec<String>, ordered: bool) -> (Categories, usize) {
    let positions = levels
        .iter()
        .enumerate()
        .map(|(idx, level)| (level.as_str(), idx as u32))
        .collect::<HashMap<_, _>>();
    let mut dropped = 0usize;
    let codes = labels
        .iter()
        .map(|label| {
            let label = label.as_deref()?;
            let code = positions.get(label).copied();
            if code.is_none() {
                dropped += 1;
            }
            code
        })
        .collect();
    (
        Categories {
            levels,
            codes,
            ordered,
        },
        dropped,
    )
}

fn distinct_labels(labels: &[Option<String>]) -> Vec<String> {
    labels.iter().flatten().unique().cloned().collect()
}

fn to_categorical(data: &ColumnData) -> ColumnData {
    let labels = display_values(data);
    let levels = distinct_labels(&labels).into_iter().sorted().collect();
    ColumnData::Categorical(categories(&labels, levels, false).0)
}

/// Builds an ordered category, returning how many values fell outside `order`.
fn to_ordinal(data: &ColumnData, order: Option<&Vec<String>>) -> (ColumnData, usize) {
    let labels = display_values(data);
    let levels = match order.filter(|o| !o.is_empty()) {
        Some(order) => order.iter().map(|l| l.trim().to_string()).unique().collect(),
        None => natural_order(&distinct_labels(&labels)),
    };
    let (categories, dropped) = categories(&labels, levels, true);
    (ColumnData::Categorical(categories), dropped)
}

/// Maps the (lower-cased) distinct values of a binary column to 0 and 1.
fn binary_mapping(distinct: &[String]) -> HashMap<String, i64> {
    if let Some((positive, _)) = BINARY_PAIRS.iter().find(|(positive, negative)| {
        distinct
            .iter()
            .all(|v| v == positive || v == negative)
    }) {
        return distinct
            .iter()
            .map(|v| (v.clone(), i64::from(v == positive)))
            .collect();
    }
    let numbers = distinct
        .iter()
        .map(|v| crate::dataset::parse_number(v))
        .collect::<Option<Vec<_>>>();
    if let Some(numbers) = numbers {
        let has_zero = numbers.contains(&0.0);
        let max = numbers.iter().copied().fold(f64::MIN, f64::max);
        return distinct
            .iter()
            .zip(numbers)
            .map(|(v, n)| {
                let bit = if has_zero || distinct.len() == 1 {
                    n != 0.0
                } else {
                    n == max
                };
                (v.clone(), i64::from(bit))
            })
            .collect();
    }
    let sorted = distinct.iter().sorted().collect::<Vec<_>>();
    distinct
        .iter()
        .map(|v| (v.clone(), i64::from(sorted.first() != Some(&v))))
        .collect()
}

enum BinaryOutcome {
    Coded(ColumnData),
    Category(ColumnData),
}

fn to_binary(data: &ColumnData) -> BinaryOutcome {
    let keys = display_values(data)
        .into_iter()
        .map(|cell| cell.map(|v| v.to_lowercase()))
        .collect::<Vec<_>>();
    let distinct = distinct_labels(&keys);
    if distinct.len() > 2 {
        return BinaryOutcome::Category(to_categorical(data));
    }
    let mapping = binary_mapping(&distinct);
    BinaryOutcome::Coded(ColumnData::Integer(
        keys.iter()
            .map(|key| key.as_ref().and_then(|k| mapping.get(k).copied()))
            .collect(),
    ))
}

fn to_text(data: &ColumnData) -> ColumnData {
    ColumnData::Text(
        (0..data.len())
            .map(|row| data.cell_text(row))
            .collect(),
    )
}

/// Coerces each listed column to its semantic type.
///
/// Columns that are missing from the dataset are skipped. A numeric or count
/// column in which nothing converts keeps its previous data and is reported
/// in [`ApplyReport::failures`] instead of failing the whole table.
pub fn apply_types(
    dataset: &mut Dataset,
    types: &IndexMap<String, SemanticType>,
    orders: &IndexMap<String, Vec<String>>,
) -> ApplyReport {
    let mut report = ApplyReport::default();
    for (column, semantic_type) in types {
        let Some(current) = dataset.column(column).map(|c| &c.data) else {
            debug!("Skipping type for unknown column '{column}'");
            continue;
        };
        let converted = match semantic_type {
            SemanticType::Auto => continue,
            SemanticType::Numeric => to_numeric(column, current),
            SemanticType::Count => to_count(column, current),
            SemanticType::Binary => match to_binary(current) {
                BinaryOutcome::Coded(data) => Ok(data),
                BinaryOutcome::Category(data) => {
                    debug!("Binary column '{column}' has more than two values; storing as category");
                    report.binary_as_category.push(column.clone());
                    Ok(data)
                }
            },
            SemanticType::Categorical => Ok(to_categorical(current)),
            SemanticType::Ordinal => {
                let (data, dropped) = to_ordinal(current, orders.get(column));
                if dropped > 0 {
                    warn!("{dropped} value(s) in '{column}' are outside its level order and were set to missing");
                    report.out_of_order_values.insert(column.clone(), dropped);
                }
                Ok(data)
            }
            SemanticType::Date | SemanticType::String => Ok(to_text(current)),
        };
        match converted.and_then(|data| dataset.replace_data(column, data)) {
            Ok(()) => {
                report.applied.insert(column.clone(), *semantic_type);
            }
            Err(err) => {
                warn!("{err}; keeping the column as it was");
                report.failures.push(err);
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::text_cell;

    fn dataset(name: &str, values: &[&str]) -> Dataset {
        Dataset::from_columns(vec![(
            name.to_string(),
            values.iter().map(|v| text_cell(v)).collect(),
        )])
    }

    fn apply_one(ds: &mut Dataset, column: &str, ty: SemanticType) -> ApplyReport {
        let mut types = IndexMap::new();
        types.insert(column.to_string(), ty);
        apply_types(ds, &types, &IndexMap::new())
    }

    fn integers(ds: &Dataset, column: &str) -> Vec<Option<i64>> {
        match &ds.column(column).unwrap().data {
            ColumnData::Integer(v) => v.clone(),
            other => panic!("expected integers, got {}", other.kind()),
        }
    }

    #[test]
    fn yes_no_maps_yes_to_one() {
        let mut ds = dataset("smoker", &["Yes", "no", "", "YES"]);
        apply_one(&mut ds, "smoker", SemanticType::Binary);
        assert_eq!(integers(&ds, "smoker"), vec![Some(1), Some(0), None, Some(1)]);
    }

    #[test]
    fn numeric_pair_without_zero_maps_larger_to_one() {
        let mut ds = dataset("group", &["1", "2", "2", "1"]);
        apply_one(&mut ds, "group", SemanticType::Binary);
        assert_eq!(integers(&ds, "group"), vec![Some(0), Some(1), Some(1), Some(0)]);
    }

    #[test]
    fn text_pair_maps_sorted_first_to_zero() {
        let mut ds = dataset("arm", &["treatment", "control"]);
        apply_one(&mut ds, "arm", SemanticType::Binary);
        assert_eq!(integers(&ds, "arm"), vec![Some(1), Some(0)]);
    }

    #[test]
    fn binary_with_three_values_becomes_category() {
        let mut ds = dataset("answer", &["yes", "no", "maybe"]);
        let report = apply_one(&mut ds, "answer", SemanticType::Binary);
        assert_eq!(report.binary_as_category, vec!["answer".to_string()]);
        assert_eq!(ds.column("answer").unwrap().data.kind(), "category");
    }

    #[test]
    fn count_clamps_and_rounds() {
        let mut ds = dataset("visits", &["-2", "3.6", "x", "4"]);
        apply_one(&mut ds, "visits", SemanticType::Count);
        assert_eq!(integers(&ds, "visits"), vec![Some(0), Some(4), None, Some(4)]);
    }

    #[test]
    fn numeric_without_numbers_keeps_column_and_reports() {
        let mut ds = dataset("name", &["ann", "bob"]);
        let report = apply_one(&mut ds, "name", SemanticType::Numeric);
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(
            report.failures[0],
            IngestError::ColumnCoercionFailed { .. }
        ));
        assert_eq!(ds.column("name").unwrap().data.kind(), "raw");
    }

    #[test]
    fn ordinal_uses_caller_order_and_drops_unknown_levels() {
        let mut ds = dataset("level", &["High", "Low", "Extreme", "Medium"]);
        let mut types = IndexMap::new();
        types.insert("level".to_string(), SemanticType::Ordinal);
        let mut orders = IndexMap::new();
        orders.insert(
            "level".to_string(),
            vec!["Low".to_string(), "Medium".to_string(), "High".to_string()],
        );
        let report = apply_types(&mut ds, &types, &orders);
        assert_eq!(report.out_of_order_values.get("level"), Some(&1));
        match &ds.column("level").unwrap().data {
            ColumnData::Categorical(c) => {
                assert!(c.ordered);
                assert_eq!(c.levels, vec!["Low", "Medium", "High"]);
                assert_eq!(c.codes, vec![Some(2), Some(0), None, Some(1)]);
            }
            other => panic!("expected categories, got {}", other.kind()),
        }
    }

    #[test]
    fn ordinal_stringifies_numbers_and_sorts_numerically() {
        let mut ds = Dataset::from_columns(vec![(
            "stage".to_string(),
            vec![
                Some(Value::Number(10.0)),
                Some(Value::Number(2.0)),
                Some(Value::Number(1.0)),
            ],
        )]);
        apply_one(&mut ds, "stage", SemanticType::Ordinal);
        match &ds.column("stage").unwrap().data {
            ColumnData::Categorical(c) => assert_eq!(c.levels, vec!["1", "2", "10"]),
            other => panic!("expected categories, got {}", other.kind()),
        }
    }

    #[test]
    fn categorical_levels_are_sorted() {
        let mut ds = dataset("grade", &["B", "A", "C", "A"]);
        apply_one(&mut ds, "grade", SemanticType::Categorical);
        match &ds.column("grade").unwrap().data {
            ColumnData::Categorical(c) => {
                assert!(!c.ordered);
                assert_eq!(c.levels, vec!["A", "B", "C"]);
            }
            other => panic!("expected categories, got {}", other.kind()),
        }
    }

    #[test]
    fn auto_and_unknown_columns_are_left_alone() {
        let mut ds = dataset("x", &["1", "2"]);
        let mut types = IndexMap::new();
        types.insert("x".to_string(), SemanticType::Auto);
        types.insert("ghost".to_string(), SemanticType::Numeric);
        let report = apply_types(&mut ds, &types, &IndexMap::new());
        assert!(report.applied.is_empty());
        assert!(report.is_clean());
        assert_eq!(ds.column("x").unwrap().data.kind(), "raw");
    }
}
