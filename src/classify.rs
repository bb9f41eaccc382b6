//! Semantic type classification for raw columns.
//!
//! Each column is profiled once and then run through an ordered chain of
//! rules; the first rule that returns a verdict decides the type. Binary
//! detection runs before numeric detection so 0/1 columns are not treated as
//! continuous measurements.

use std::{cmp::Ordering, collections::HashSet, sync::OnceLock};

use indexmap::IndexMap;
use itertools::Itertools;
use log::debug;
use regex::Regex;

use crate::{
    config::{DEFAULT_CATEGORY_LIMIT, DEFAULT_NUMERIC_THRESHOLD},
    dataset::{ColumnData, Dataset, Value},
    schema::SemanticType,
};

/// Ordered vocabularies, lowest level first. Matching is case-insensitive.
const ORDERED_VOCABULARIES: &[&[&str]] = &[
    &["very low", "low", "medium", "high", "very high"],
    &["small", "medium", "large"],
    &["poor", "fair", "good", "very good", "excellent"],
    &["never", "rarely", "sometimes", "often", "always"],
    &[
        "strongly disagree",
        "disagree",
        "neutral",
        "neither agree nor disagree",
        "agree",
        "strongly agree",
    ],
    &[
        "very unsatisfied",
        "unsatisfied",
        "neutral",
        "satisfied",
        "very satisfied",
    ],
    &["none", "mild", "moderate", "severe"],
    &["beginner", "intermediate", "advanced", "expert"],
    &["first", "second", "third", "fourth"],
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    pub types: IndexMap<String, SemanticType>,
    /// Inferred level order for ordinal columns.
    pub orders: IndexMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub semantic_type: SemanticType,
    pub order: Option<Vec<String>>,
    pub rule: &'static str,
}

/// Summary of one column's sampled cells, computed once per column.
#[derive(Debug, Clone)]
pub struct ColumnProfile {
    pub non_missing: usize,
    /// Distinct non-missing values in first-seen order, as displayed.
    pub distinct: Vec<String>,
    pub native_numeric: bool,
    pub coerced: Vec<f64>,
}

impl ColumnProfile {
    pub fn from_values(values: &[Option<Value>], native_numeric: bool) -> Self {
        let mut seen = HashSet::new();
        let mut distinct = Vec::new();
        let mut coerced = Vec::new();
        let mut non_missing = 0usize;
        for value in values.iter().flatten() {
            non_missing += 1;
            let display = value.as_display();
            if seen.insert(display.clone()) {
                distinct.push(display);
            }
            if let Some(number) = value.to_number() {
                coerced.push(number);
            }
        }
        ColumnProfile {
            non_missing,
            distinct,
            native_numeric,
            coerced,
        }
    }

    fn coercion_ratio(&self) -> f64 {
        if self.non_missing == 0 {
            0.0
        } else {
            self.coerced.len() as f64 / self.non_missing as f64
        }
    }

    fn distinct_coerced(&self) -> usize {
        self.coerced
            .iter()
            .map(|v| v.to_bits())
            .collect::<HashSet<_>>()
            .len()
    }
}

type Rule = fn(&ColumnProfile, &Classifier) -> Option<(SemanticType, Option<Vec<String>>)>;

const RULES: &[(&str, Rule)] = &[
    ("all-missing", rule_all_missing),
    ("two-distinct", rule_two_distinct),
    ("native-numeric", rule_native_numeric),
    ("coercible-numeric", rule_coercible_numeric),
    ("low-cardinality", rule_low_cardinality),
    ("fallback", rule_fallback),
];

fn rule_all_missing(
    profile: &ColumnProfile,
    _: &Classifier,
) -> Option<(SemanticType, Option<Vec<String>>)> {
    (profile.non_missing == 0).then_some((SemanticType::String, None))
}

fn rule_two_distinct(
    profile: &ColumnProfile,
    _: &Classifier,
) -> Option<(SemanticType, Option<Vec<String>>)> {
    (profile.distinct.len() == 2).then_some((SemanticType::Binary, None))
}

fn rule_native_numeric(
    profile: &ColumnProfile,
    _: &Classifier,
) -> Option<(SemanticType, Option<Vec<String>>)> {
    profile
        .native_numeric
        .then_some((SemanticType::Numeric, None))
}

fn rule_coercible_numeric(
    profile: &ColumnProfile,
    classifier: &Classifier,
) -> Option<(SemanticType, Option<Vec<String>>)> {
    if profile.coercion_ratio() < classifier.numeric_threshold {
        return None;
    }
    if profile.distinct_coerced() == 2 {
        Some((SemanticType::Binary, None))
    } else {
        Some((SemanticType::Numeric, None))
    }
}

fn rule_low_cardinality(
    profile: &ColumnProfile,
    classifier: &Classifier,
) -> Option<(SemanticType, Option<Vec<String>>)> {
    if profile.distinct.len() > classifier.category_limit {
        return None;
    }
    if let Some(order) = vocabulary_order(&profile.distinct) {
        return Some((SemanticType::Ordinal, Some(order)));
    }
    if let Some(order) = numeric_label_order(&profile.distinct) {
        return Some((SemanticType::Ordinal, Some(order)));
    }
    Some((SemanticType::Categorical, None))
}

fn rule_fallback(
    _: &ColumnProfile,
    _: &Classifier,
) -> Option<(SemanticType, Option<Vec<String>>)> {
    Some((SemanticType::String, None))
}

/// Orders `distinct` by the first vocabulary that contains every value.
pub fn vocabulary_order(distinct: &[String]) -> Option<Vec<String>> {
    if distinct.len() < 2 {
        return None;
    }
    let lowered = distinct
        .iter()
        .map(|v| v.trim().to_lowercase())
        .collect::<Vec<_>>();
    ORDERED_VOCABULARIES.iter().find_map(|vocabulary| {
        let ranks = lowered
            .iter()
            .map(|v| vocabulary.iter().position(|level| level == v))
            .collect::<Option<Vec<_>>>()?;
        Some(
            distinct
                .iter()
                .zip(ranks)
                .sorted_by_key(|(_, rank)| *rank)
                .map(|(label, _)| label.clone())
                .collect(),
        )
    })
}

fn numeric_label_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^\s*(?:[<>~≤≥]=?\s*)?(-?\d+(?:\.\d+)?)(?:\s*[-–]\s*\d+(?:\.\d+)?)?(?:\s*[+%]|\s+[A-Za-z][A-Za-z ]*)?\s*$",
        )
        .ok()
    })
    .as_ref()
}

/// Leading number of a whole numeric label such as `3`, `10+`, `1-2 times`, or `<5`.
///
/// Codes that merely start with a digit (`3A`, `12B`) are not numeric labels.
pub fn numeric_label_key(label: &str) -> Option<f64> {
    numeric_label_regex()?
        .captures(label)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

/// Numeric-looking labels ordered by their leading number.
fn numeric_label_order(distinct: &[String]) -> Option<Vec<String>> {
    if distinct.len() < 2 {
        return None;
    }
    let keyed = distinct
        .iter()
        .map(|label| numeric_label_key(label).map(|key| (key, label)))
        .collect::<Option<Vec<_>>>()?;
    Some(
        keyed
            .into_iter()
            .sorted_by(|(a, la), (b, lb)| a.partial_cmp(b).unwrap_or(Ordering::Equal).then(la.cmp(lb)))
            .map(|(_, label)| label.clone())
            .collect(),
    )
}

/// Sorts labels numerically when every label has a leading number, else lexically.
pub fn natural_order(labels: &[String]) -> Vec<String> {
    numeric_label_order(labels).unwrap_or_else(|| labels.iter().sorted().cloned().collect())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classifier {
    pub numeric_threshold: f64,
    pub category_limit: usize,
}

impl Default for Classifier {
    fn default() -> Self {
        Self {
            numeric_threshold: DEFAULT_NUMERIC_THRESHOLD,
            category_limit: DEFAULT_CATEGORY_LIMIT,
        }
    }
}

impl Classifier {
    pub fn classify_column(&self, data: &ColumnData, sample_rows: usize) -> Verdict {
        let mut values = data.to_values();
        values.truncate(sample_rows);
        let profile = ColumnProfile::from_values(&values, data.is_native_numeric());
        self.classify_profile(&profile)
    }

    pub fn classify_profile(&self, profile: &ColumnProfile) -> Verdict {
        RULES
            .iter()
            .find_map(|(name, rule)| {
                rule(profile, self).map(|(semantic_type, order)| Verdict {
                    semantic_type,
                    order,
                    rule: name,
                })
            })
            .unwrap_or(Verdict {
                semantic_type: SemanticType::String,
                order: None,
                rule: "fallback",
            })
    }

    pub fn classify_dataset(&self, dataset: &Dataset, sample_rows: usize) -> Classification {
        let mut classification = Classification::default();
        for column in dataset.columns() {
            let verdict = self.classify_column(&column.data, sample_rows);
            debug!(
                "Column '{}' classified as {} by rule '{}'",
                column.name, verdict.semantic_type, verdict.rule
            );
            if let Some(order) = verdict.order {
                classification.orders.insert(column.name.clone(), order);
            }
            classification
                .types
                .insert(column.name.clone(), verdict.semantic_type);
        }
        classification
    }
}

pub fn classify_column(data: &ColumnData, sample_rows: usize) -> Verdict {
    Classifier::default().classify_column(data, sample_rows)
}

pub fn classify_dataset(dataset: &Dataset, sample_rows: usize) -> Classification {
    Classifier::default().classify_dataset(dataset, sample_rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(values: &[&str]) -> ColumnData {
        ColumnData::Raw(values.iter().map(|v| crate::dataset::text_cell(v)).collect())
    }

    fn type_of(values: &[&str]) -> SemanticType {
        classify_column(&raw(values), usize::MAX).semantic_type
    }

    #[test]
    fn all_missing_is_string() {
        assert_eq!(type_of(&["", "NA", "null"]), SemanticType::String);
    }

    #[test]
    fn two_distinct_values_are_binary_even_when_numeric() {
        assert_eq!(type_of(&["0", "1", "1", "0"]), SemanticType::Binary);
        assert_eq!(type_of(&["yes", "no", "", "yes"]), SemanticType::Binary);
    }

    #[test]
    fn native_numbers_are_numeric() {
        let data = ColumnData::Raw(vec![
            Some(Value::Number(1.5)),
            Some(Value::Number(2.0)),
            Some(Value::Number(7.25)),
        ]);
        assert_eq!(
            classify_column(&data, 10).semantic_type,
            SemanticType::Numeric
        );
    }

    #[test]
    fn mostly_numeric_text_is_numeric() {
        let mut values = (0..8).map(|i| i.to_string()).collect::<Vec<_>>();
        values.push("unknown".into());
        values.push("n.d.".into());
        let refs = values.iter().map(String::as_str).collect::<Vec<_>>();
        assert_eq!(type_of(&refs), SemanticType::Numeric);
    }

    #[test]
    fn coerced_pair_with_noise_is_binary() {
        assert_eq!(
            type_of(&["1", "0", "1", "1.0", "0", "1", "0", "1", "x"]),
            SemanticType::Binary
        );
    }

    #[test]
    fn vocabulary_column_is_ordinal_with_vocabulary_order() {
        let verdict = classify_column(&raw(&["High", "Low", "Medium", "Low"]), 100);
        assert_eq!(verdict.semantic_type, SemanticType::Ordinal);
        assert_eq!(
            verdict.order,
            Some(vec!["Low".to_string(), "Medium".to_string(), "High".to_string()])
        );
    }

    #[test]
    fn numeric_labels_are_ordinal_in_numeric_order() {
        let verdict = classify_column(&raw(&["10+", "2-4 times", "1", "5-9", "1"]), 100);
        assert_eq!(verdict.semantic_type, SemanticType::Ordinal);
        assert_eq!(
            verdict.order,
            Some(vec![
                "1".to_string(),
                "2-4 times".to_string(),
                "5-9".to_string(),
                "10+".to_string()
            ])
        );
    }

    #[test]
    fn alphanumeric_codes_are_categorical() {
        assert_eq!(type_of(&["3A", "12B", "7C", "3A"]), SemanticType::Categorical);
        assert_eq!(
            type_of(&["3A", "12B", "7C", "3A", "5 apples"]),
            SemanticType::Categorical
        );
    }

    #[test]
    fn numeric_label_key_needs_the_whole_label() {
        assert_eq!(numeric_label_key("<5"), Some(5.0));
        assert_eq!(numeric_label_key("50%"), Some(50.0));
        assert_eq!(numeric_label_key("3 or more"), Some(3.0));
        assert_eq!(numeric_label_key("3A"), None);
        assert_eq!(numeric_label_key("12-B"), None);
        assert_eq!(numeric_label_key("v2"), None);
    }

    #[test]
    fn severity_scale_keeps_none_as_its_first_level() {
        let verdict = classify_column(&raw(&["mild", "none", "severe", "moderate", "none"]), 100);
        assert_eq!(verdict.semantic_type, SemanticType::Ordinal);
        assert_eq!(
            verdict.order,
            Some(vec![
                "none".to_string(),
                "mild".to_string(),
                "moderate".to_string(),
                "severe".to_string()
            ])
        );
    }

    #[test]
    fn free_labels_are_categorical() {
        assert_eq!(type_of(&["A", "B", "C", "A"]), SemanticType::Categorical);
    }

    #[test]
    fn high_cardinality_text_is_string() {
        let values = (0..150).map(|i| format!("note {i}a")).collect::<Vec<_>>();
        let refs = values.iter().map(String::as_str).collect::<Vec<_>>();
        assert_eq!(type_of(&refs), SemanticType::String);
    }

    #[test]
    fn sample_rows_bound_the_profile() {
        let mut values = vec!["a", "b", "c"];
        values.extend(std::iter::repeat_n("7", 20));
        // Only the first three rows are seen, all of them labels.
        assert_eq!(
            classify_column(&raw(&values), 3).semantic_type,
            SemanticType::Categorical
        );
    }

    #[test]
    fn classify_dataset_keeps_column_order() {
        let headers = vec!["id".to_string(), "level".to_string()];
        let rows = vec![
            vec![Some(Value::Number(1.0)), Some(Value::Text("Low".into()))],
            vec![Some(Value::Number(2.0)), Some(Value::Text("High".into()))],
            vec![Some(Value::Number(3.0)), Some(Value::Text("Medium".into()))],
        ];
        let classification = classify_dataset(&Dataset::from_rows(&headers, rows), 100);
        assert_eq!(
            classification.types.keys().collect::<Vec<_>>(),
            vec!["id", "level"]
        );
        assert!(classification.orders.contains_key("level"));
        assert!(!classification.orders.contains_key("id"));
    }
}
