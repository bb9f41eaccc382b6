//! Date format detection and conversion.
//!
//! Detection scores a fixed catalogue of chrono patterns against a sample of
//! a column, plus one pattern-free pass through [`flexible`]. Conversion parses
//! each value with a hint pattern first, then falls back through a cascade of
//! flexible parses before giving up on the value.

pub mod flexible;

use std::{fmt::Write as _, sync::OnceLock};

use chrono::{
    NaiveDate, NaiveDateTime, NaiveTime,
    format::{Item, StrftimeItems},
};
use log::debug;
use regex::Regex;
use serde::Serialize;

use crate::{
    config::{DEFAULT_DATE_SAMPLE_SIZE, DEFAULT_DATE_THRESHOLD},
    dataset::Value,
    error::{IngestError, Result},
};

use self::flexible::ParseOptions;

pub const FLEXIBLE_PATTERN: &str = "flexible";
pub const FLEXIBLE_DISPLAY_NAME: &str = "Flexible (inferred)";

const MAX_SAMPLE_VALUES: usize = 3;

/// Known patterns as `(chrono pattern, display name)`.
pub const DATE_FORMAT_CATALOGUE: &[(&str, &str)] = &[
    ("%Y-%m-%d", "YYYY-MM-DD"),
    ("%Y/%m/%d", "YYYY/MM/DD"),
    ("%Y.%m.%d", "YYYY.MM.DD"),
    ("%Y%m%d", "YYYYMMDD"),
    ("%Y-%d-%m", "YYYY-DD-MM"),
    ("%Y/%d/%m", "YYYY/DD/MM"),
    ("%m/%d/%Y", "MM/DD/YYYY"),
    ("%m-%d-%Y", "MM-DD-YYYY"),
    ("%m.%d.%Y", "MM.DD.YYYY"),
    ("%d/%m/%Y", "DD/MM/YYYY"),
    ("%d-%m-%Y", "DD-MM-YYYY"),
    ("%d.%m.%Y", "DD.MM.YYYY"),
    ("%m/%d/%y", "MM/DD/YY"),
    ("%d/%m/%y", "DD/MM/YY"),
    ("%y-%m-%d", "YY-MM-DD"),
    ("%Y-%m-%d %H:%M:%S", "YYYY-MM-DD HH:MM:SS"),
    ("%Y-%m-%d %H:%M", "YYYY-MM-DD HH:MM"),
    ("%m/%d/%Y %H:%M:%S", "MM/DD/YYYY HH:MM:SS"),
    ("%d/%m/%Y %H:%M:%S", "DD/MM/YYYY HH:MM:SS"),
    ("%Y-%m-%dT%H:%M:%S", "ISO 8601"),
    ("%Y-%m-%dT%H:%M:%S%.f", "ISO 8601 (fractional seconds)"),
    ("%Y-%m-%dT%H:%M:%SZ", "ISO 8601 (UTC)"),
    ("%d %b %Y", "DD Mon YYYY"),
    ("%b %d, %Y", "Mon DD, YYYY"),
    ("%d %B %Y", "DD Month YYYY"),
    ("%B %d, %Y", "Month DD, YYYY"),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateCandidate {
    pub pattern: String,
    pub display_name: String,
    pub match_count: usize,
    pub match_percentage: f64,
    pub sample_values: Vec<String>,
}

impl DateCandidate {
    pub fn is_flexible(&self) -> bool {
        self.pattern == FLEXIBLE_PATTERN
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DateDetectionConfig {
    pub sample_size: usize,
    /// Minimum best-candidate match percentage for a date column.
    pub threshold: f64,
    /// Percentage points within which candidates tie with the best one.
    pub ambiguity_margin: f64,
}

impl Default for DateDetectionConfig {
    fn default() -> Self {
        Self {
            sample_size: DEFAULT_DATE_SAMPLE_SIZE,
            threshold: DEFAULT_DATE_THRESHOLD,
            ambiguity_margin: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateDecision {
    pub candidates: Vec<DateCandidate>,
    pub is_date: bool,
    pub ambiguous: bool,
}

impl DateDecision {
    pub fn best(&self) -> Option<&DateCandidate> {
        self.candidates.first()
    }
}

/// Builds an anchored regex for the textual shape a chrono pattern produces.
///
/// Returns `None` for specifiers without a fixed shape, in which case callers
/// rely on chrono alone.
pub fn shape_regex(pattern: &str) -> Option<Regex> {
    let mut shape = String::from("^");
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            shape.push_str(&regex::escape(c.encode_utf8(&mut [0; 4])));
            continue;
        }
        let piece = match chars.next()? {
            'Y' => r"\d{4}",
            'y' => r"\d{2}",
            'm' | 'd' | 'H' | 'M' | 'S' | 'I' => r"\d{1,2}",
            'e' => r"\s?\d{1,2}",
            'b' | 'h' => "[A-Za-z]{3}",
            'B' => "[A-Za-z]{3,9}",
            'p' => "(?i:am|pm)",
            '.' if chars.next()? == 'f' => r"\.\d+",
            '%' => "%",
            _ => return None,
        };
        shape.push_str(piece);
    }
    shape.push('$');
    Regex::new(&shape).ok()
}

struct CompiledFormat {
    pattern: &'static str,
    display_name: &'static str,
    shape: Option<Regex>,
}

fn catalogue() -> &'static [CompiledFormat] {
    static COMPILED: OnceLock<Vec<CompiledFormat>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        DATE_FORMAT_CATALOGUE
            .iter()
            .map(|&(pattern, display_name)| CompiledFormat {
                pattern,
                display_name,
                shape: shape_regex(pattern),
            })
            .collect()
    })
}

/// Parses with a chrono pattern, accepting date-only patterns at midnight.
pub fn parse_with_pattern(text: &str, pattern: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, pattern)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(text, pattern)
                .ok()
                .map(|date| date.and_time(NaiveTime::MIN))
        })
}

fn strict_parse(text: &str, pattern: &str, shape: Option<&Regex>) -> Option<NaiveDateTime> {
    if let Some(shape) = shape
        && !shape.is_match(text)
    {
        return None;
    }
    parse_with_pattern(text, pattern)
}

fn sample_text(values: &[Option<Value>], sample_size: usize) -> Vec<String> {
    values
        .iter()
        .flatten()
        .map(|value| value.as_display().trim().to_string())
        .filter(|text| !text.is_empty())
        .take(sample_size)
        .collect()
}

fn score<F>(sample: &[String], pattern: &str, display_name: &str, parses: F) -> DateCandidate
where
    F: Fn(&str) -> bool,
{
    let matched = sample
        .iter()
        .filter(|text| parses(text.as_str()))
        .collect::<Vec<_>>();
    DateCandidate {
        pattern: pattern.to_string(),
        display_name: display_name.to_string(),
        match_count: matched.len(),
        match_percentage: matched.len() as f64 / sample.len() as f64 * 100.0,
        sample_values: matched
            .into_iter()
            .take(MAX_SAMPLE_VALUES)
            .cloned()
            .collect(),
    }
}

/// Ranks every catalogue pattern that matches at least one sampled value.
pub fn detect_formats(values: &[Option<Value>], sample_size: usize) -> Vec<DateCandidate> {
    let sample = sample_text(values, sample_size);
    if sample.is_empty() {
        return Vec::new();
    }
    let mut candidates = catalogue()
        .iter()
        .map(|format| {
            score(&sample, format.pattern, format.display_name, |text| {
                strict_parse(text, format.pattern, format.shape.as_ref()).is_some()
            })
        })
        .filter(|candidate| candidate.match_count > 0)
        .collect::<Vec<_>>();

    let best_fixed = candidates
        .iter()
        .map(|c| c.match_percentage)
        .fold(0.0_f64, f64::max);
    let flexible = score(&sample, FLEXIBLE_PATTERN, FLEXIBLE_DISPLAY_NAME, |text| {
        flexible::parse(text, ParseOptions::default()).is_some()
    });
    if flexible.match_count > 0 && (candidates.is_empty() || flexible.match_percentage > best_fixed)
    {
        candidates.push(flexible);
    }

    candidates.sort_by(|a, b| b.match_percentage.total_cmp(&a.match_percentage));
    candidates
}

pub fn decide(candidates: Vec<DateCandidate>, config: &DateDetectionConfig) -> DateDecision {
    let best = candidates.first().map(|c| c.match_percentage).unwrap_or(0.0);
    let is_date = !candidates.is_empty() && best >= config.threshold;
    let tied = candidates
        .iter()
        .filter(|c| best - c.match_percentage <= config.ambiguity_margin)
        .count();
    DateDecision {
        is_date,
        ambiguous: is_date && tied >= 2,
        candidates,
    }
}

/// Detection and decision in one step for a column's values.
pub fn detect_column(values: &[Option<Value>], config: &DateDetectionConfig) -> DateDecision {
    decide(detect_formats(values, config.sample_size), config)
}

/// A concrete output or hint format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateFormat {
    pub pattern: String,
    pub display_name: String,
}

impl DateFormat {
    /// Accepts a catalogue display name (`MM/DD/YYYY`) or a chrono pattern (`%m/%d/%Y`).
    pub fn resolve(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if let Some((pattern, display_name)) = DATE_FORMAT_CATALOGUE.iter().find(|(p, d)| {
            *p == trimmed || d.eq_ignore_ascii_case(trimmed)
        }) {
            return Ok(DateFormat {
                pattern: pattern.to_string(),
                display_name: display_name.to_string(),
            });
        }
        if !trimmed.contains('%')
            || StrftimeItems::new(trimmed).any(|item| matches!(item, Item::Error))
        {
            return Err(IngestError::InvalidDateFormat(input.to_string()));
        }
        Ok(DateFormat {
            pattern: trimmed.to_string(),
            display_name: trimmed.to_string(),
        })
    }

    /// Like [`DateFormat::resolve`], but the flexible marker resolves to no hint.
    pub fn resolve_hint(input: &str) -> Result<Option<Self>> {
        let trimmed = input.trim();
        if trimmed.eq_ignore_ascii_case(FLEXIBLE_PATTERN)
            || trimmed.eq_ignore_ascii_case(FLEXIBLE_DISPLAY_NAME)
        {
            return Ok(None);
        }
        Self::resolve(trimmed).map(Some)
    }

    pub fn format(&self, value: &NaiveDateTime) -> Option<String> {
        let mut rendered = String::new();
        write!(rendered, "{}", value.format(&self.pattern)).ok()?;
        Some(rendered)
    }
}

/// Year-first split of three numeric parts, with day/month swapped by magnitude.
fn split_numeric_parts(text: &str) -> Option<NaiveDateTime> {
    let parts = text
        .split(['-', '/', '.', ' '])
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>();
    let [year, middle, last] = parts.as_slice() else {
        return None;
    };
    if !parts.iter().all(|p| p.chars().all(|c| c.is_ascii_digit())) {
        return None;
    }
    let year_value: i32 = year.parse().ok()?;
    let year_value = match year.len() {
        1 | 2 if year_value <= 68 => 2000 + year_value,
        1 | 2 => 1900 + year_value,
        _ => year_value,
    };
    let middle: u32 = middle.parse().ok()?;
    let last: u32 = last.parse().ok()?;
    let (month, day) = if middle > 12 && last <= 12 {
        (last, middle)
    } else {
        (middle, last)
    };
    NaiveDate::from_ymd_opt(year_value, month, day).map(|d| d.and_time(NaiveTime::MIN))
}

/// Cascade used when the hint pattern does not fit a value.
pub fn parse_with_cascade(text: &str) -> Option<NaiveDateTime> {
    const CASCADE: [ParseOptions; 3] = [
        ParseOptions {
            year_first: true,
            day_first: false,
            fuzzy: false,
        },
        ParseOptions {
            year_first: true,
            day_first: false,
            fuzzy: true,
        },
        ParseOptions {
            year_first: false,
            day_first: true,
            fuzzy: true,
        },
    ];
    CASCADE
        .iter()
        .find_map(|options| flexible::parse(text, *options))
        .or_else(|| split_numeric_parts(text))
}

/// Converts every value to `target`, returning `None` for values nothing can parse.
pub fn convert_column(
    values: &[Option<Value>],
    target: &DateFormat,
    hint: Option<&DateFormat>,
) -> Vec<Option<String>> {
    let hint_shape = hint.and_then(|h| shape_regex(&h.pattern));
    let mut failures = 0usize;
    let converted = values
        .iter()
        .map(|value| {
            let text = value.as_ref()?.as_display();
            let text = text.trim();
            if text.is_empty() {
                return None;
            }
            let parsed = hint
                .and_then(|h| strict_parse(text, &h.pattern, hint_shape.as_ref()))
                .or_else(|| parse_with_cascade(text));
            let rendered = parsed.and_then(|dt| target.format(&dt));
            if rendered.is_none() {
                failures += 1;
            }
            rendered
        })
        .collect();
    if failures > 0 {
        debug!(
            "{failures} value(s) could not be converted to {}",
            target.display_name
        );
    }
    converted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(values: &[&str]) -> Vec<Option<Value>> {
        values.iter().map(|v| crate::dataset::text_cell(v)).collect()
    }

    #[test]
    fn catalogue_has_unique_patterns_and_shapes() {
        let mut patterns = DATE_FORMAT_CATALOGUE
            .iter()
            .map(|(p, _)| *p)
            .collect::<Vec<_>>();
        patterns.sort();
        patterns.dedup();
        assert_eq!(patterns.len(), DATE_FORMAT_CATALOGUE.len());
        assert!(catalogue().iter().all(|f| f.shape.is_some()));
    }

    #[test]
    fn shape_check_rejects_short_years() {
        let shape = shape_regex("%m/%d/%Y");
        assert!(strict_parse("01/15/2024", "%m/%d/%Y", shape.as_ref()).is_some());
        assert!(strict_parse("1/15/24", "%m/%d/%Y", shape.as_ref()).is_none());
    }

    #[test]
    fn iso_column_ranks_iso_first() {
        let values = texts(&["2024-01-15", "2024-02-20", "2024-03-25", "bad"]);
        let candidates = detect_formats(&values, 100);
        let best = &candidates[0];
        assert_eq!(best.display_name, "YYYY-MM-DD");
        assert_eq!(best.match_count, 3);
        assert_eq!(best.match_percentage, 75.0);
        assert_eq!(best.sample_values.len(), 3);
    }

    #[test]
    fn exact_tie_is_ambiguous() {
        let values = texts(&["01/02/2024", "03/04/2024", "05/06/2024"]);
        let decision = detect_column(&values, &DateDetectionConfig::default());
        assert!(decision.is_date);
        assert!(decision.ambiguous);
    }

    #[test]
    fn day_above_twelve_breaks_the_tie() {
        let values = texts(&["01/02/2024", "03/04/2024", "25/06/2024"]);
        let decision = detect_column(&values, &DateDetectionConfig::default());
        assert_eq!(
            decision.best().map(|c| c.display_name.as_str()),
            Some("DD/MM/YYYY")
        );
        assert!(!decision.ambiguous);
    }

    #[test]
    fn wider_margin_flags_near_ties() {
        let values = texts(&["01/02/2024", "03/04/2024", "25/06/2024", "07/08/2024"]);
        let strict = detect_column(&values, &DateDetectionConfig::default());
        assert!(!strict.ambiguous);
        let lenient = detect_column(
            &values,
            &DateDetectionConfig {
                ambiguity_margin: 30.0,
                ..DateDetectionConfig::default()
            },
        );
        assert!(lenient.ambiguous);
    }

    #[test]
    fn flexible_candidate_appears_when_no_pattern_fits() {
        let values = texts(&["Jan 5th, 2024", "March 3rd, 2023", "Sept 2022"]);
        let candidates = detect_formats(&values, 100);
        assert!(candidates[0].is_flexible());
        assert_eq!(candidates[0].match_count, 3);
    }

    #[test]
    fn below_threshold_is_not_a_date() {
        let values = texts(&["2024-01-15", "apple", "pear", "plum"]);
        assert!(!detect_column(&values, &DateDetectionConfig::default()).is_date);
    }

    #[test]
    fn resolve_accepts_names_and_patterns() {
        assert_eq!(DateFormat::resolve("mm/dd/yyyy").unwrap().pattern, "%m/%d/%Y");
        assert_eq!(DateFormat::resolve("%d %b %Y").unwrap().display_name, "DD Mon YYYY");
        assert_eq!(DateFormat::resolve("%Y week %W").unwrap().pattern, "%Y week %W");
        assert!(matches!(
            DateFormat::resolve("YYYY-QQ"),
            Err(IngestError::InvalidDateFormat(_))
        ));
        assert!(DateFormat::resolve("%Y-%Q").is_err());
        assert_eq!(DateFormat::resolve_hint("flexible").unwrap(), None);
    }

    #[test]
    fn conversion_round_trips_between_formats() {
        let iso = DateFormat::resolve("YYYY-MM-DD").unwrap();
        let us = DateFormat::resolve("MM/DD/YYYY").unwrap();
        let original = texts(&["2024-01-15", "2023-12-31", ""]);
        let converted = convert_column(&original, &us, Some(&iso));
        assert_eq!(
            converted,
            vec![Some("01/15/2024".into()), Some("12/31/2023".into()), None]
        );
        let back = convert_column(
            &converted
                .iter()
                .map(|v| v.clone().map(Value::Text))
                .collect::<Vec<_>>(),
            &iso,
            Some(&us),
        );
        assert_eq!(back, vec![Some("2024-01-15".into()), Some("2023-12-31".into()), None]);
    }

    #[test]
    fn cascade_handles_mixed_inputs() {
        let iso = DateFormat::resolve("YYYY-MM-DD").unwrap();
        let values = texts(&["15 March 2024", "2024.13.01", "on 3/4/2024 maybe", "not a date"]);
        let converted = convert_column(&values, &iso, None);
        assert_eq!(converted[0].as_deref(), Some("2024-03-15"));
        assert_eq!(converted[1].as_deref(), Some("2024-01-13"));
        assert_eq!(converted[2].as_deref(), Some("2024-03-04"));
        assert_eq!(converted[3], None);
    }
}
