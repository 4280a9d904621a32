use std::collections::BTreeSet;

use calamine::Data;
use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;

/// Keywords kept per row chunk.
pub const MAX_KEYWORDS: usize = 25;

static LOWER_UPPER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([a-z])([A-Z])").expect("valid regex"));
static ACRONYM_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Z]+)([A-Z][a-z])").expect("valid regex"));

/// Cells that carry no value. Formula error cells count as empty
/// rather than as string garbage.
pub fn is_empty_cell(value: &Data) -> bool {
    matches!(value, Data::Empty | Data::Error(_))
}

/// Render a cell the way it reads in the sheet. Numbers that are
/// whole render without a trailing `.0` so identifier columns stored
/// as floats compare equal across sheets.
pub fn cell_to_string(value: &Data) -> String {
    match value {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < 1e15 {
                format!("{}", *f as i64)
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(naive) => format_datetime(naive),
            None => dt.as_f64().to_string(),
        },
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
    }
}

fn format_datetime(naive: NaiveDateTime) -> String {
    naive.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Expand camelCase and PascalCase into readable words:
/// "CustomerID" -> "Customer ID", "unitPrice" -> "unit Price".
pub fn expand_camel_case(text: &str) -> String {
    let expanded = LOWER_UPPER.replace_all(text, "$1 $2");
    ACRONYM_WORD.replace_all(&expanded, "$1 $2").into_owned()
}

/// Searchable keywords for one row: each value's string form, the
/// words inside camelCase values, and every column header with
/// underscores spaced out. Lowercased, deduplicated, sorted,
/// capped at MAX_KEYWORDS.
pub fn extract_keywords<'a, I>(cells: I) -> Vec<String>
where
    I: IntoIterator<Item = (&'a str, &'a Data)>,
{
    let mut keywords: BTreeSet<String> = BTreeSet::new();

    for (column, value) in cells {
        if is_empty_cell(value) {
            continue;
        }
        let val_str = cell_to_string(value).trim().to_string();
        keywords.insert(val_str.to_lowercase());

        let expanded = expand_camel_case(&val_str);
        if !expanded.eq_ignore_ascii_case(&val_str) {
            for word in expanded.split_whitespace().filter(|w| w.len() > 1) {
                keywords.insert(word.to_lowercase());
            }
        }

        keywords.insert(column.to_lowercase().replace('_', " "));
    }

    keywords
        .into_iter()
        .filter(|kw| kw.len() > 1)
        .take(MAX_KEYWORDS)
        .collect()
}
