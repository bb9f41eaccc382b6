//! In-memory tabular dataset: named, equal-length columns of raw or typed cells.
//!
//! Readers build a [`Dataset`] of [`ColumnData::Raw`] columns; the applier later
//! swaps each column for its typed representation. Column names are sanitized
//! and de-duplicated at construction time so every later stage can address
//! columns by name.

use std::{collections::HashSet, fmt};

use serde::{Deserialize, Serialize};

use crate::error::{IngestError, Result};

/// Rendering used wherever a missing cell must be shown as text.
pub const MISSING_MARKER: &str = "NA";

/// `none` is absent: it is the lowest level of the severity vocabulary.
const MISSING_TOKENS: &[&str] = &["na", "n/a", "nan", "-nan", "null", "#n/a", "<na>", "missing"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Text(String),
    Number(f64),
    Bool(bool),
}

impl Value {
    pub fn as_display(&self) -> String {
        match self {
            Value::Text(s) => s.clone(),
            Value::Number(n) => format_number(*n),
            Value::Bool(b) => b.to_string(),
        }
    }

    /// Best-effort numeric view used by coercion.
    pub fn to_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => n.is_finite().then_some(*n),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Text(s) => parse_number(s),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

/// Parses a finite number out of free text; words such as `inf` or `nan` are rejected.
pub fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E')
    {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        (value as i64).to_string()
    } else {
        value.to_string()
    }
}

pub fn is_missing_token(raw: &str) -> bool {
    let trimmed = raw.trim();
    trimmed.is_empty() || {
        let lowered = trimmed.to_ascii_lowercase();
        MISSING_TOKENS.contains(&lowered.as_str())
    }
}

/// Turns a raw text cell into a value, mapping blanks and missing tokens to `None`.
pub fn text_cell(raw: &str) -> Option<Value> {
    if is_missing_token(raw) {
        None
    } else {
        Some(Value::Text(raw.trim().to_string()))
    }
}

/// Category container. `codes` index into `levels`; `ordered` marks an ordinal scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Categories {
    pub levels: Vec<String>,
    pub codes: Vec<Option<u32>>,
    pub ordered: bool,
}

impl Categories {
    pub fn label(&self, row: usize) -> Option<&str> {
        let code = self.codes.get(row).copied().flatten()?;
        self.levels.get(code as usize).map(|s| s.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnData {
    Raw(Vec<Option<Value>>),
    Numeric(Vec<Option<f64>>),
    Integer(Vec<Option<i64>>),
    Categorical(Categories),
    Text(Vec<Option<String>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Raw(v) => v.len(),
            ColumnData::Numeric(v) => v.len(),
            ColumnData::Integer(v) => v.len(),
            ColumnData::Categorical(c) => c.codes.len(),
            ColumnData::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ColumnData::Raw(_) => "raw",
            ColumnData::Numeric(_) => "numeric",
            ColumnData::Integer(_) => "integer",
            ColumnData::Categorical(c) if c.ordered => "ordered-category",
            ColumnData::Categorical(_) => "category",
            ColumnData::Text(_) => "text",
        }
    }

    /// Whether the cells are already held as numbers (no text coercion needed).
    pub fn is_native_numeric(&self) -> bool {
        match self {
            ColumnData::Numeric(_) | ColumnData::Integer(_) => true,
            ColumnData::Raw(values) => {
                let mut seen = false;
                for value in values.iter().flatten() {
                    if !matches!(value, Value::Number(_)) {
                        return false;
                    }
                    seen = true;
                }
                seen
            }
            _ => false,
        }
    }

    /// Cell at `row` rendered as text; `None` for missing.
    pub fn cell_text(&self, row: usize) -> Option<String> {
        match self {
            ColumnData::Raw(v) => v.get(row)?.as_ref().map(Value::as_display),
            ColumnData::Numeric(v) => v.get(row).copied().flatten().map(format_number),
            ColumnData::Integer(v) => v.get(row).copied().flatten().map(|i| i.to_string()),
            ColumnData::Categorical(c) => c.label(row).map(str::to_string),
            ColumnData::Text(v) => v.get(row).cloned().flatten(),
        }
    }

    /// Every cell as an optional value, the common input shape for inference and coercion.
    pub fn to_values(&self) -> Vec<Option<Value>> {
        match self {
            ColumnData::Raw(v) => v.clone(),
            ColumnData::Numeric(v) => v.iter().map(|c| c.map(Value::Number)).collect(),
            ColumnData::Integer(v) => v.iter().map(|c| c.map(|i| Value::Number(i as f64))).collect(),
            ColumnData::Categorical(c) => (0..c.codes.len())
                .map(|row| c.label(row).map(|s| Value::Text(s.to_string())))
                .collect(),
            ColumnData::Text(v) => v.iter().map(|c| c.clone().map(Value::Text)).collect(),
        }
    }

    pub fn truncate(&mut self, len: usize) {
        match self {
            ColumnData::Raw(v) => v.truncate(len),
            ColumnData::Numeric(v) => v.truncate(len),
            ColumnData::Integer(v) => v.truncate(len),
            ColumnData::Categorical(c) => c.codes.truncate(len),
            ColumnData::Text(v) => v.truncate(len),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    columns: Vec<Column>,
}

impl Dataset {
    /// Builds a dataset from a header row and raw rows.
    ///
    /// Short rows are padded with missing cells and long rows are cut to the
    /// header width, so every column ends up the same length.
    pub fn from_rows(headers: &[String], rows: Vec<Vec<Option<Value>>>) -> Self {
        let names = sanitize_headers(headers);
        let width = names.len();
        let mut columns: Vec<Vec<Option<Value>>> =
            (0..width).map(|_| Vec::with_capacity(rows.len())).collect();
        for row in rows {
            let mut cells = row.into_iter();
            for column in columns.iter_mut() {
                column.push(cells.next().flatten());
            }
        }
        Dataset {
            columns: names
                .into_iter()
                .zip(columns)
                .map(|(name, values)| Column {
                    name,
                    data: ColumnData::Raw(values),
                })
                .collect(),
        }
    }

    /// Builds a dataset from named raw columns, padding shorter columns with missing cells.
    pub fn from_columns(columns: Vec<(String, Vec<Option<Value>>)>) -> Self {
        let height = columns.iter().map(|(_, v)| v.len()).max().unwrap_or(0);
        let headers = columns.iter().map(|(n, _)| n.clone()).collect::<Vec<_>>();
        let names = sanitize_headers(&headers);
        Dataset {
            columns: names
                .into_iter()
                .zip(columns)
                .map(|(name, (_, mut values))| {
                    values.resize(height, None);
                    Column {
                        name,
                        data: ColumnData::Raw(values),
                    }
                })
                .collect(),
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map(|c| c.data.len()).unwrap_or(0)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn require_column(&self, name: &str) -> Result<&Column> {
        self.column(name)
            .ok_or_else(|| IngestError::ColumnNotFound(name.to_string()))
    }

    /// Replaces a column's cells. The new data must keep the table rectangular.
    pub fn replace_data(&mut self, name: &str, data: ColumnData) -> Result<()> {
        let height = self.row_count();
        let column = self
            .columns
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| IngestError::ColumnNotFound(name.to_string()))?;
        if data.len() != height {
            return Err(IngestError::ColumnCoercionFailed {
                column: name.to_string(),
                target: data.kind().to_string(),
                reason: format!("expected {height} row(s) but got {}", data.len()),
            });
        }
        column.data = data;
        Ok(())
    }

    pub fn rename_column(&mut self, from: &str, to: &str) -> Result<()> {
        if to.trim_start_matches('\u{feff}').trim().is_empty() {
            return Err(IngestError::BlankColumnName(from.to_string()));
        }
        let target = sanitize_name(to, 0);
        if target != from && self.column(&target).is_some() {
            return Err(IngestError::DuplicateColumn(target));
        }
        let column = self
            .columns
            .iter_mut()
            .find(|c| c.name == from)
            .ok_or_else(|| IngestError::ColumnNotFound(from.to_string()))?;
        column.name = target;
        Ok(())
    }

    /// Keeps only the first `limit` rows.
    pub fn truncate(&mut self, limit: usize) {
        for column in &mut self.columns {
            column.data.truncate(limit);
        }
    }

    /// Copy of the first `rows` rows, used to classify large tables on a sample.
    pub fn head(&self, rows: usize) -> Dataset {
        let mut copy = self.clone();
        copy.truncate(rows);
        copy
    }

    pub fn rows_as_text(&self, limit: usize) -> Vec<Vec<String>> {
        (0..self.row_count().min(limit))
            .map(|row| {
                self.columns
                    .iter()
                    .map(|c| {
                        c.data
                            .cell_text(row)
                            .unwrap_or_else(|| MISSING_MARKER.to_string())
                    })
                    .collect()
            })
            .collect()
    }
}

fn sanitize_name(raw: &str, position: usize) -> String {
    let cleaned = raw
        .trim_start_matches('\u{feff}')
        .replace(['\r', '\n'], " ")
        .trim()
        .to_string();
    if cleaned.is_empty() {
        format!("column_{}", position + 1)
    } else {
        cleaned
    }
}

/// Strips BOMs and line breaks from header names and suffixes later duplicates.
pub fn sanitize_headers(headers: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut names = Vec::with_capacity(headers.len());
    for (idx, raw) in headers.iter().enumerate() {
        let base = sanitize_name(raw, idx);
        let mut name = base.clone();
        let mut suffix = 1;
        while seen.contains(&name) {
            name = format!("{base}_{suffix}");
            suffix += 1;
        }
        seen.insert(name.clone());
        names.push(name);
    }
    names
}
