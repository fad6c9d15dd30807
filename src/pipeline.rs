//! The transform pipeline behind every materialized view.
//!
//! Order is fixed: deletion filter, addition prepend, search, column filter,
//! sort, edit overlay merge. Everything here is pure so the same inputs always
//! give the same rows in the same order.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::record::{FieldValue, Fields, Record, RowId};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn toggled(self) -> Self {
        match self {
            SortOrder::Asc => SortOrder::Desc,
            SortOrder::Desc => SortOrder::Asc,
        }
    }
}

/// Search, filter and sort settings of a view.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewParams {
    pub search: String,
    pub filter_column: Option<String>,
    pub filter_value: String,
    pub sort_column: Option<String>,
    pub sort_order: SortOrder,
}

/// Everything the pipeline reads besides the parameters.
pub struct PipelineInput<'a> {
    pub snapshot: &'a [Record],
    pub additions: &'a [Record],
    pub deletions: &'a HashSet<RowId>,
    pub edits: &'a HashMap<RowId, Fields>,
}

// Base letter of a lowercase Latin letter with a diacritic.
fn base_letter(c: char) -> char {
    match c {
        'à'..='å' | 'ā' | 'ă' | 'ą' => 'a',
        'ç' | 'ć' | 'ĉ' | 'ċ' | 'č' => 'c',
        'ď' | 'đ' => 'd',
        'è'..='ë' | 'ē' | 'ĕ' | 'ė' | 'ę' | 'ě' => 'e',
        'ĝ' | 'ğ' | 'ġ' | 'ģ' => 'g',
        'ì'..='ï' | 'ĩ' | 'ī' | 'ĭ' | 'į' | 'ı' => 'i',
        'ķ' => 'k',
        'ĺ' | 'ļ' | 'ľ' | 'ł' => 'l',
        'ñ' | 'ń' | 'ņ' | 'ň' => 'n',
        'ò'..='ö' | 'ø' | 'ō' | 'ŏ' | 'ő' => 'o',
        'ŕ' | 'ŗ' | 'ř' => 'r',
        'ś' | 'ŝ' | 'ş' | 'š' => 's',
        'ţ' | 'ť' | 'ŧ' => 't',
        'ù'..='ü' | 'ũ' | 'ū' | 'ŭ' | 'ů' | 'ű' | 'ų' => 'u',
        'ý' | 'ÿ' => 'y',
        'ź' | 'ż' | 'ž' => 'z',
        _ => c,
    }
}

fn lower(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

// Rough collation classes: whitespace, then punctuation and symbols, then
// digits, then letters.
fn collation_key(c: char) -> (u8, char) {
    let class = if c.is_whitespace() {
        0
    } else if c.is_ascii_digit() {
        2
    } else if c.is_alphabetic() {
        3
    } else if c.is_numeric() {
        4
    } else {
        1
    };
    (class, base_letter(lower(c)))
}

/// Locale-style string ordering.
///
/// Letters compare by base letter first, ignoring case and accents. Ties are
/// broken by accents (unaccented first) and then by case (lowercase first).
pub fn locale_compare(a: &str, b: &str) -> Ordering {
    let primary = a.chars().map(collation_key).cmp(b.chars().map(collation_key));
    if primary != Ordering::Equal {
        return primary;
    }

    let accents = a.chars().map(lower).cmp(b.chars().map(lower));
    if accents != Ordering::Equal {
        return accents;
    }

    for (x, y) in a.chars().zip(b.chars()) {
        if x != y {
            return match (x.is_lowercase(), y.is_lowercase()) {
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                _ => x.cmp(&y),
            };
        }
    }
    a.len().cmp(&b.len())
}

/// Compares two cells of the sort column. Missing cells count as "".
pub fn compare_fields(a: Option<&FieldValue>, b: Option<&FieldValue>) -> Ordering {
    match (a, b) {
        (Some(FieldValue::Text(x)), Some(FieldValue::Text(y))) => locale_compare(x, y),
        (Some(x @ FieldValue::Number(_)), Some(y @ FieldValue::Number(_))) => {
            match (x.as_f64(), y.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
                _ => Ordering::Equal,
            }
        }
        _ => {
            let x = a.map(FieldValue::display).unwrap_or_default();
            let y = b.map(FieldValue::display).unwrap_or_default();
            locale_compare(&x, &y)
        }
    }
}

/// True if any present field contains `needle` (already lowercased).
pub fn matches_search(record: &Record, needle: &str) -> bool {
    record
        .fields
        .values()
        .filter(|v| !v.is_absent())
        .any(|v| v.display().to_lowercase().contains(needle))
}

/// True if `column` is present and contains `needle` (already lowercased).
pub fn matches_filter(record: &Record, column: &str, needle: &str) -> bool {
    match record.get(column) {
        Some(value) => value.display().to_lowercase().contains(needle),
        None => false,
    }
}

/// Runs the full pipeline and returns the materialized rows.
pub fn materialize(input: &PipelineInput<'_>, params: &ViewParams) -> Vec<Record> {
    let mut rows: Vec<&Record> = input
        .additions
        .iter()
        .chain(
            input
                .snapshot
                .iter()
                .filter(|r| !input.deletions.contains(&r.internal_id)),
        )
        .collect();

    let search = params.search.trim().to_lowercase();
    if !search.is_empty() {
        rows.retain(|r| matches_search(r, &search));
    }

    if let Some(column) = &params.filter_column {
        let needle = params.filter_value.trim().to_lowercase();
        if !needle.is_empty() {
            rows.retain(|r| matches_filter(r, column, &needle));
        }
    }

    if let Some(column) = &params.sort_column {
        // `sort_by` is stable, so ties keep pipeline order in both directions.
        rows.sort_by(|a, b| {
            let ord = compare_fields(a.get(column), b.get(column));
            match params.sort_order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });
    }

    rows.into_iter()
        .map(|r| merge_edits(r, input.edits))
        .collect()
}

/// Copy of `record` with its overlay entry applied.
pub fn merge_edits(record: &Record, edits: &HashMap<RowId, Fields>) -> Record {
    let mut merged = record.clone();
    if let Some(patch) = edits.get(&record.internal_id) {
        merged.merge(patch);
    }
    merged
}
