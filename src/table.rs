//! Plain-text tables for terminal output.

use std::borrow::Cow;
use std::fmt::Write as _;

use crate::dataset::Dataset;

const COLUMN_GAP: &str = "  ";
const MIN_RULE_WIDTH: usize = 3;

/// Renders `headers` and `rows` as aligned columns with a dashed rule under the header.
///
/// Cells beyond the header width are ignored; missing trailing cells render empty.
pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut widths = headers.iter().map(|h| char_width(h).max(1)).collect::<Vec<_>>();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(char_width(cell));
        }
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_line(headers, &widths));
    let rule_widths = widths
        .iter()
        .map(|w| (*w).max(MIN_RULE_WIDTH))
        .collect::<Vec<_>>();
    let rules = rule_widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_line(&rules, &rule_widths));
    for row in rows {
        let _ = writeln!(output, "{}", format_line(row, &widths));
    }
    output
}

/// First `limit` rows of a dataset; missing cells show as `NA`.
pub fn render_preview(dataset: &Dataset, limit: usize) -> String {
    render_table(&dataset.column_names(), &dataset.rows_as_text(limit))
}

fn format_line(values: &[String], widths: &[usize]) -> String {
    let mut line = widths
        .iter()
        .enumerate()
        .map(|(idx, width)| {
            let cell = values.get(idx).map(|v| flatten(v)).unwrap_or_default();
            let padding = width.saturating_sub(char_width(&cell));
            format!("{cell}{}", " ".repeat(padding))
        })
        .collect::<Vec<_>>()
        .join(COLUMN_GAP);
    line.truncate(line.trim_end().len());
    line
}

fn char_width(value: &str) -> usize {
    value.chars().count()
}

// Line breaks and tabs inside a cell would break the grid.
fn flatten(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Value;

    #[test]
    fn columns_align_to_widest_cell() {
        let rendered = render_table(
            &["column".to_string(), "type".to_string()],
            &[
                vec!["id".to_string(), "numeric".to_string()],
                vec!["status".to_string(), "binary".to_string()],
            ],
        );
        let lines = rendered.lines().collect::<Vec<_>>();
        assert_eq!(lines[0], "column  type");
        assert_eq!(lines[1], "------  -------");
        assert_eq!(lines[2], "id      numeric");
        assert_eq!(lines[3], "status  binary");
    }

    #[test]
    fn embedded_newlines_are_flattened() {
        let rendered = render_table(&["note".to_string()], &[vec!["a\nb".to_string()]]);
        assert!(rendered.lines().any(|line| line == "a b"));
    }

    #[test]
    fn preview_marks_missing_cells() {
        let dataset = Dataset::from_rows(
            &["a".to_string(), "b".to_string()],
            vec![vec![Some(Value::Text("x".into())), None]],
        );
        let rendered = render_preview(&dataset, 5);
        assert!(rendered.lines().nth(2).is_some_and(|line| line.ends_with("NA")));
    }
}
