//! Robust reader: loads a file of unknown encoding, delimiter, or layout into a raw [`Dataset`].
//!
//! Every format is read through an ordered list of attempts. The first attempt
//! that succeeds wins and the last failure is kept for diagnostics:
//!
//! - **Delimited text** crosses candidate encodings with candidate delimiters and
//!   prefers the first combination that yields more than one column.
//! - **Spreadsheets** go through `calamine` when the `spreadsheet` feature is on.
//! - **Record-oriented text** tries JSON lines, a whole JSON document, then a
//!   lenient walk of whatever structure decoded.

use std::{fmt, fs, path::Path};

use anyhow::anyhow;
use encoding_rs::Encoding;
use log::{debug, info, warn};
use serde_json::Value as JsonValue;

use crate::{
    dataset::{Dataset, Value, text_cell},
    error::{IngestError, Result},
    io_utils,
};

/// Share of non-empty first-row cells that must be non-numeric to promote the row to a header.
const HEADER_TEXT_RATIO: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetSelector {
    Index(usize),
    Name(String),
}

impl SheetSelector {
    /// Numeric selectors address sheets by 0-based position; anything else is a name.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().parse::<usize>() {
            Ok(idx) => SheetSelector::Index(idx),
            Err(_) => SheetSelector::Name(raw.trim().to_string()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    pub encoding: Option<String>,
    pub sheet: Option<SheetSelector>,
    pub row_limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordLayout {
    JsonLines,
    Document,
    Lenient,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceFormat {
    Delimited {
        encoding: &'static str,
        delimiter: u8,
        header_promoted: bool,
        skipped_records: usize,
    },
    Spreadsheet {
        sheet: String,
    },
    Records {
        layout: RecordLayout,
    },
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFormat::Delimited {
                encoding,
                delimiter,
                ..
            } => write!(
                f,
                "delimited text ({encoding}, delimiter '{}')",
                crate::printable_delimiter(*delimiter)
            ),
            SourceFormat::Spreadsheet { sheet } => write!(f, "spreadsheet (sheet '{sheet}')"),
            SourceFormat::Records { layout } => write!(f, "records ({layout:?})"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReadOutcome {
    pub dataset: Dataset,
    pub format: SourceFormat,
}

enum FileKind {
    Delimited,
    Spreadsheet,
    Records,
}

fn file_kind(path: &Path) -> FileKind {
    match io_utils::extension_of(path).as_deref() {
        Some("xlsx" | "xlsm" | "xlsb" | "xls" | "ods") => FileKind::Spreadsheet,
        Some("json" | "jsonl" | "ndjson") => FileKind::Records,
        _ => FileKind::Delimited,
    }
}

pub fn read_dataset(path: &Path, options: &ReadOptions) -> Result<ReadOutcome> {
    if path.as_os_str().is_empty() {
        return Err(IngestError::PathEmpty);
    }
    if !path.exists() {
        return Err(IngestError::FileNotFound(path.to_path_buf()));
    }
    let mut outcome = match file_kind(path) {
        FileKind::Delimited => read_delimited(path, options)?,
        FileKind::Spreadsheet => read_spreadsheet(path, options)?,
        FileKind::Records => read_records(path, options)?,
    };
    if let Some(limit) = options.row_limit {
        outcome.dataset.truncate(limit);
    }
    info!(
        "Read {} row(s) x {} column(s) from {:?} as {}",
        outcome.dataset.row_count(),
        outcome.dataset.column_count(),
        path,
        outcome.format
    );
    Ok(outcome)
}

/// Runs `attempts` in order, returning the first success or the last failure.
fn first_success<'a, T>(
    attempts: Vec<Box<dyn FnOnce() -> anyhow::Result<T> + 'a>>,
) -> std::result::Result<T, (usize, anyhow::Error)> {
    let mut tried = 0usize;
    let mut last_error = anyhow!("no read strategy was applicable");
    for attempt in attempts {
        tried += 1;
        match attempt() {
            Ok(value) => return Ok(value),
            Err(err) => {
                debug!("Read attempt {tried} failed: {err:#}");
                last_error = err;
            }
        }
    }
    Err((tried, last_error))
}

struct DelimitedParse {
    dataset: Dataset,
    header_promoted: bool,
    skipped_records: usize,
    /// Leading lines were dropped to find the table.
    reshaped: bool,
}

fn read_delimited(path: &Path, options: &ReadOptions) -> Result<ReadOutcome> {
    let bytes = fs::read(path)?;
    let encodings = io_utils::candidate_encodings(&bytes, options.encoding.as_deref());
    let delimiters = io_utils::candidate_delimiters(path);

    let mut attempts = 0usize;
    let mut last_error = String::new();
    let mut fallback: Option<(DelimitedParse, &'static Encoding, u8)> = None;
    let mut reshaped: Option<(DelimitedParse, &'static Encoding, u8)> = None;

    for &encoding in &encodings {
        let text = match io_utils::decode_strict(&bytes, encoding) {
            Ok(text) => text,
            Err(err) => {
                attempts += 1;
                debug!("Skipping encoding {}: {err}", encoding.name());
                last_error = err.to_string();
                continue;
            }
        };
        for &delimiter in &delimiters {
            attempts += 1;
            match parse_delimited(&text, delimiter, options.row_limit) {
                Ok(parsed) if parsed.dataset.column_count() > 1 && !parsed.reshaped => {
                    return Ok(delimited_outcome(parsed, encoding, delimiter));
                }
                Ok(parsed) if parsed.dataset.column_count() > 1 => {
                    if reshaped.is_none() {
                        reshaped = Some((parsed, encoding, delimiter));
                    }
                }
                Ok(parsed) => {
                    debug!(
                        "{} with delimiter '{}' produced a single column",
                        encoding.name(),
                        crate::printable_delimiter(delimiter)
                    );
                    if fallback.is_none() {
                        fallback = Some((parsed, encoding, delimiter));
                    }
                }
                Err(err) => last_error = err.to_string(),
            }
        }
        if let Some((parsed, encoding, delimiter)) = reshaped.take() {
            return Ok(delimited_outcome(parsed, encoding, delimiter));
        }
    }

    if let Some((parsed, encoding, delimiter)) = fallback {
        return Ok(delimited_outcome(parsed, encoding, delimiter));
    }

    warn!("Every encoding/delimiter combination failed for {path:?}; trying lossy UTF-8");
    attempts += 1;
    let text = io_utils::decode_lossy(&bytes);
    parse_delimited(&text, io_utils::DEFAULT_CSV_DELIMITER, options.row_limit)
        .map(|parsed| delimited_outcome(parsed, encoding_rs::UTF_8, io_utils::DEFAULT_CSV_DELIMITER))
        .map_err(|err| IngestError::AllReadAttemptsFailed {
            path: path.to_path_buf(),
            attempts,
            last_error: if last_error.is_empty() {
                err.to_string()
            } else {
                format!("{last_error}; final attempt: {err}")
            },
        })
}

fn delimited_outcome(
    parsed: DelimitedParse,
    encoding: &'static Encoding,
    delimiter: u8,
) -> ReadOutcome {
    ReadOutcome {
        dataset: parsed.dataset,
        format: SourceFormat::Delimited {
            encoding: encoding.name(),
            delimiter,
            header_promoted: parsed.header_promoted,
            skipped_records: parsed.skipped_records,
        },
    }
}

/// Parses decoded text with one delimiter, skipping malformed records.
fn parse_delimited(
    text: &str,
    delimiter: u8,
    row_limit: Option<usize>,
) -> anyhow::Result<DelimitedParse> {
    let mut reader = io_utils::open_csv_reader(text, delimiter, true);
    let headers = reader
        .headers()?
        .iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>();
    if headers.is_empty() {
        return Err(anyhow!("no header row"));
    }
    let (rows, skipped) = collect_rows(&mut reader, row_limit);
    if headers.len() > 1 || rows.iter().all(|r| r.len() <= 1) {
        return Ok(DelimitedParse {
            dataset: Dataset::from_rows(&headers, rows),
            header_promoted: false,
            skipped_records: skipped,
            reshaped: false,
        });
    }

    // A single header cell over wider rows means a title line sat above the real header.
    let mut reader = io_utils::open_csv_reader(text, delimiter, false);
    let (mut rows, skipped) = collect_rows(&mut reader, None);
    let width = rows.iter().map(|r| r.len()).max().unwrap_or(0);
    let preamble = rows.iter().take_while(|r| r.len() < width).count();
    rows.drain(..preamble);
    let first = rows.remove(0);
    let (headers, header_promoted) = if row_is_mostly_textual(&first) {
        let mut names = first
            .iter()
            .map(|c| c.as_ref().map(Value::as_display).unwrap_or_default())
            .collect::<Vec<_>>();
        names.resize(width, String::new());
        (names, true)
    } else {
        rows.insert(0, first);
        ((1..=width).map(|i| format!("column_{i}")).collect(), false)
    };
    if let Some(limit) = row_limit {
        rows.truncate(limit);
    }
    Ok(DelimitedParse {
        dataset: Dataset::from_rows(&headers, rows),
        header_promoted,
        skipped_records: skipped,
        reshaped: true,
    })
}

fn collect_rows(
    reader: &mut csv::Reader<&[u8]>,
    row_limit: Option<usize>,
) -> (Vec<Vec<Option<Value>>>, usize) {
    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for record in reader.records() {
        if row_limit.is_some_and(|limit| rows.len() >= limit) {
            break;
        }
        match record {
            Ok(record) => rows.push(record.iter().map(text_cell).collect()),
            Err(err) => {
                skipped += 1;
                debug!("Skipping malformed record: {err}");
            }
        }
    }
    (rows, skipped)
}

fn row_is_mostly_textual(row: &[Option<Value>]) -> bool {
    let non_empty = row.iter().flatten().count();
    if non_empty == 0 {
        return false;
    }
    let textual = row
        .iter()
        .flatten()
        .filter(|value| value.to_number().is_none())
        .count();
    textual as f64 / non_empty as f64 > HEADER_TEXT_RATIO
}

#[cfg(feature = "spreadsheet")]
fn read_spreadsheet(path: &Path, options: &ReadOptions) -> Result<ReadOutcome> {
    use calamine::{Data, DataType, Reader, open_workbook_auto};

    let mut workbook =
        open_workbook_auto(path).map_err(|e| IngestError::Spreadsheet(e.to_string()))?;
    let sheet_names = workbook.sheet_names().to_vec();
    let sheet = match &options.sheet {
        None => sheet_names.first().cloned(),
        Some(SheetSelector::Index(idx)) => sheet_names.get(*idx).cloned(),
        Some(SheetSelector::Name(name)) => sheet_names.iter().find(|s| *s == name).cloned(),
    }
    .ok_or_else(|| {
        IngestError::Spreadsheet(format!(
            "sheet {:?} not found (available: {})",
            options.sheet,
            sheet_names.join(", ")
        ))
    })?;
    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|e| IngestError::Spreadsheet(e.to_string()))?;

    let cell_value = |cell: &Data| -> Option<Value> {
        match cell {
            Data::Empty | Data::Error(_) => None,
            Data::Int(i) => Some(Value::Number(*i as f64)),
            Data::Float(f) => Some(Value::Number(*f)),
            Data::Bool(b) => Some(Value::Bool(*b)),
            Data::String(s) => text_cell(s),
            Data::DateTimeIso(s) | Data::DurationIso(s) => text_cell(s),
            Data::DateTime(_) => cell.as_datetime().map(|dt| {
                let rendered = if dt.time() == chrono::NaiveTime::MIN {
                    dt.format("%Y-%m-%d").to_string()
                } else {
                    dt.format("%Y-%m-%d %H:%M:%S").to_string()
                };
                Value::Text(rendered)
            }),
        }
    };

    let mut rows = range.rows();
    let headers = rows
        .next()
        .map(|row| {
            row.iter()
                .map(|c| cell_value(c).map(|v| v.as_display()).unwrap_or_default())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    let data = rows
        .take(options.row_limit.unwrap_or(usize::MAX))
        .map(|row| row.iter().map(cell_value).collect())
        .collect();
    Ok(ReadOutcome {
        dataset: Dataset::from_rows(&headers, data),
        format: SourceFormat::Spreadsheet { sheet },
    })
}

#[cfg(not(feature = "spreadsheet"))]
fn read_spreadsheet(path: &Path, _options: &ReadOptions) -> Result<ReadOutcome> {
    Err(IngestError::UnsupportedFormatDependencyMissing {
        format: io_utils::extension_of(path).unwrap_or_else(|| "spreadsheet".to_string()),
        hint: "rebuild with `--features spreadsheet` to enable the calamine engine".to_string(),
    })
}

fn read_records(path: &Path, options: &ReadOptions) -> Result<ReadOutcome> {
    let bytes = fs::read(path)?;
    let text = io_utils::candidate_encodings(&bytes, options.encoding.as_deref())
        .into_iter()
        .find_map(|encoding| io_utils::decode_strict(&bytes, encoding).ok())
        .unwrap_or_else(|| io_utils::decode_lossy(&bytes));
    let limit = options.row_limit;
    let line_oriented = matches!(
        io_utils::extension_of(path).as_deref(),
        Some("jsonl" | "ndjson")
    );

    let attempts: Vec<Box<dyn FnOnce() -> anyhow::Result<(Dataset, RecordLayout)> + '_>> = vec![
        Box::new(|| {
            Ok((
                records_from_lines(&text, limit, line_oriented)?,
                RecordLayout::JsonLines,
            ))
        }),
        Box::new(|| Ok((records_from_document(&text, limit)?, RecordLayout::Document))),
        Box::new(|| Ok((records_lenient(&text, limit)?, RecordLayout::Lenient))),
    ];
    let (dataset, layout) =
        first_success(attempts).map_err(|(attempts, err)| IngestError::AllReadAttemptsFailed {
            path: path.to_path_buf(),
            attempts,
            last_error: err.to_string(),
        })?;
    Ok(ReadOutcome {
        dataset,
        format: SourceFormat::Records { layout },
    })
}

fn json_cell(value: &JsonValue) -> Option<Value> {
    match value {
        JsonValue::Null => None,
        JsonValue::Bool(b) => Some(Value::Bool(*b)),
        JsonValue::Number(n) => n.as_f64().map(Value::Number),
        JsonValue::String(s) => text_cell(s),
        nested => Some(Value::Text(nested.to_string())),
    }
}

/// Rows from a list of JSON objects; keys are unioned in first-seen order.
fn rows_from_objects<'a, I>(objects: I, limit: Option<usize>) -> Dataset
where
    I: IntoIterator<Item = &'a serde_json::Map<String, JsonValue>>,
{
    let mut headers: Vec<String> = Vec::new();
    let objects = objects
        .into_iter()
        .take(limit.unwrap_or(usize::MAX))
        .collect::<Vec<_>>();
    for object in &objects {
        for key in object.keys() {
            if !headers.contains(key) {
                headers.push(key.clone());
            }
        }
    }
    let rows = objects
        .iter()
        .map(|object| {
            headers
                .iter()
                .map(|key| object.get(key).and_then(json_cell))
                .collect()
        })
        .collect();
    Dataset::from_rows(&headers, rows)
}

/// One object per line. Outside `.jsonl`/`.ndjson` files a lone line is a whole
/// document and is left to the document strategies.
fn records_from_lines(
    text: &str,
    limit: Option<usize>,
    line_oriented: bool,
) -> anyhow::Result<Dataset> {
    let lines = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>();
    if !line_oriented && lines.len() < 2 {
        return Err(anyhow!("a single line is read as a whole JSON document"));
    }
    let objects = lines
        .into_iter()
        .take(limit.unwrap_or(usize::MAX))
        .map(|line| match serde_json::from_str::<JsonValue>(line)? {
            JsonValue::Object(map) => Ok(map),
            other => Err(anyhow!("line is not a JSON object: {other}")),
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    if objects.is_empty() {
        return Err(anyhow!("no JSON records found"));
    }
    Ok(rows_from_objects(&objects, limit))
}

fn records_from_document(text: &str, limit: Option<usize>) -> anyhow::Result<Dataset> {
    match serde_json::from_str::<JsonValue>(text)? {
        JsonValue::Array(items) => {
            let objects = items
                .iter()
                .map(|item| {
                    item.as_object()
                        .ok_or_else(|| anyhow!("array element is not an object"))
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            Ok(rows_from_objects(objects, limit))
        }
        JsonValue::Object(map) => {
            let mut columns = Vec::with_capacity(map.len());
            let mut height = None;
            for (key, value) in &map {
                let items = value
                    .as_array()
                    .ok_or_else(|| anyhow!("'{key}' does not hold an array"))?;
                if *height.get_or_insert(items.len()) != items.len() {
                    return Err(anyhow!("column '{key}' has a different length"));
                }
                let cells = items
                    .iter()
                    .take(limit.unwrap_or(usize::MAX))
                    .map(json_cell)
                    .collect();
                columns.push((key.clone(), cells));
            }
            Ok(Dataset::from_columns(columns))
        }
        other => Err(anyhow!("unsupported JSON document root: {other}")),
    }
}

/// Last resort: any mapping becomes columns, any list of mappings becomes rows.
fn records_lenient(text: &str, limit: Option<usize>) -> anyhow::Result<Dataset> {
    let value: JsonValue = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(_) => {
            let items = text
                .lines()
                .filter_map(|line| serde_json::from_str::<JsonValue>(line).ok())
                .collect::<Vec<_>>();
            if items.is_empty() {
                return Err(anyhow!("no JSON values could be decoded"));
            }
            JsonValue::Array(items)
        }
    };
    match value {
        JsonValue::Object(map) => {
            let columns = map
                .iter()
                .map(|(key, value)| {
                    let cells: Vec<Option<Value>> = match value {
                        JsonValue::Array(items) => items
                            .iter()
                            .take(limit.unwrap_or(usize::MAX))
                            .map(json_cell)
                            .collect(),
                        scalar => vec![json_cell(scalar)],
                    };
                    (key.clone(), cells)
                })
                .collect();
            Ok(Dataset::from_columns(columns))
        }
        JsonValue::Array(items) => {
            let objects = items.iter().filter_map(|i| i.as_object()).collect::<Vec<_>>();
            if objects.is_empty() {
                return Err(anyhow!("list holds no mappings"));
            }
            Ok(rows_from_objects(objects, limit))
        }
        other => Err(anyhow!("unsupported JSON structure: {other}")),
    }
}
