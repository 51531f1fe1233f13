//! Header detection for CRT sheets.
//!
//! CRT exports put a title block above the table, so the header row has to be
//! found by content. Once found, the header is assumed to span exactly two
//! rows: the category/gas group on top and units or gas names below. That
//! assumption is not verified against the sheet and breaks on layouts with a
//! single or a three-row header (the third-row case is partly absorbed by
//! [`absorb_unit_row`]).

use std::path::Path;

use ahash::AHashMap;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::sheet::{Cell, RawSheet, RawTable};

pub const DEFAULT_LOOKAHEAD: usize = 15;

/// Anchor text that opens the summary tables of every CRT vintage seen so far.
pub const CRT_ANCHOR: &str = "GREENHOUSE GAS SOURCE";

/// Header fragments worth keeping when two header rows are joined.
const HEADER_KEYWORDS: &[&str] = &[
    // categories
    "SINK CATEGORIES", "SOURCE", "EMISSION", "ACTIVITY", "FACTOR",
    // gases
    "CO2", "CH4", "N2O", "SF6", "HFC", "PFC", "NF3", "NF", "NO", "NMVOC", "CO", "SO",
    // energy content
    "GCV", "NCV", "NCV/GCV",
    // mass and energy units
    "(kt)", "Mt", "t", "kg", "PJ", "(TJ)",
    // emission factors
    "(t/TJ)", "(kg/TJ)", "kg/t", "(kg/t)", "(Mt)", "(t)", "(kg)", "(PJ)",
    // CO2 equivalents
    "CO₂ equivalents", "CO₂-eq", "CO2-eq", "CO2 eq", "t CO₂ eq", "kt CO₂ eq", "Mt CO₂ eq",
    // CCS and reference years
    "captured", "transported", "injected", "stored",
    "Reference year", "Base year", "1990", "Change from",
];

/// Strings that mark a unit row smuggled in below the real header.
const UNIT_PATTERNS: &[&str] = &[
    "(TJ)", "(kt)", "(Mt)", "(t)", "(kg)", "(PJ)",
    "(t/TJ)", "(kg/TJ)", "(kg/t)",
    "NCV/GCV", "GCV", "NCV",
    "CO₂-eq", "CO2-eq", "CO2 eq",
    "t CO₂ eq", "kt CO₂ eq", "Mt CO₂ eq",
];

/// How to find the header row: an anchor phrase first, keywords as fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderSearch {
    pub anchor: Option<String>,
    pub keywords: Vec<String>,
    pub lookahead: usize,
}

impl Default for HeaderSearch {
    fn default() -> Self {
        Self::anchored(CRT_ANCHOR)
    }
}

impl HeaderSearch {
    pub fn anchored(anchor: impl Into<String>) -> Self {
        Self {
            anchor: Some(anchor.into()),
            keywords: Vec::new(),
            lookahead: DEFAULT_LOOKAHEAD,
        }
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }
}

/// Returns the index of the first header row.
///
/// Scans the first `lookahead` rows top to bottom for a cell containing the
/// anchor (case-insensitive). Only when no anchor is configured or nothing
/// matched does it scan again for any of the keywords.
pub fn detect_header_row(sheet: &RawSheet, search: &HeaderSearch) -> Result<usize> {
    let scan = |needles: &[String]| -> Option<usize> {
        if needles.is_empty() {
            return None;
        }
        sheet
            .rows
            .iter()
            .take(search.lookahead)
            .position(|row| {
                row.iter().filter_map(Cell::as_text).any(|cell| {
                    let cell = cell.to_lowercase();
                    needles.iter().any(|needle| cell.contains(needle.as_str()))
                })
            })
    };

    let lower = |words: &[String]| -> Vec<String> {
        words
            .iter()
            .filter(|w| !w.is_empty())
            .map(|w| w.to_lowercase())
            .collect()
    };

    let anchors = search.anchor.as_ref().map(|a| lower(std::slice::from_ref(a)));
    anchors
        .and_then(|a| scan(a.as_slice()))
        .or_else(|| scan(lower(search.keywords.as_slice()).as_slice()))
        .ok_or(Error::HeaderNotFound {
            lookahead: search.lookahead,
        })
}

/// The two header row indices implied by a detected header start.
pub fn header_rows(start: usize) -> [usize; 2] {
    [start, start + 1]
}

/// Detects the header, flattens the two header rows into single names and
/// returns the data rows below them.
pub fn read_with_detected_header(sheet: &RawSheet, search: &HeaderSearch) -> Result<RawTable> {
    let [top, bottom] = header_rows(detect_header_row(sheet, search)?);
    debug!(sheet = %sheet.name, header_row = top, "header detected");

    let width = sheet.rows.iter().skip(top).map(Vec::len).max().unwrap_or(0);

    // Group headers are merged cells in Excel; they span to the right.
    let mut group: Option<String> = None;
    let mut columns = Vec::with_capacity(width);
    for col in 0..width {
        if let Some(text) = sheet.cell(top, col).as_text() {
            group = Some(text);
        }
        let parts: Vec<String> = group
            .iter()
            .cloned()
            .chain(sheet.cell(bottom, col).as_text())
            .collect();
        columns.push(flatten_header(&parts, col));
    }

    let rows = sheet
        .rows
        .iter()
        .skip(bottom + 1)
        .map(|row| {
            let mut row = row.clone();
            row.resize(width, Cell::Empty);
            row
        })
        .collect();

    let mut table = RawTable {
        columns: dedupe_names(columns),
        rows,
    };
    absorb_unit_row(&mut table);
    Ok(table)
}

/// Joins header fragments, keeping only those that match the domain allowlist.
///
/// When nothing survives the filter the unfiltered join is used instead, and a
/// fully blank header becomes `Unnamed: {index}`.
pub fn flatten_header(parts: &[String], index: usize) -> String {
    let kept: Vec<&str> = parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| HEADER_KEYWORDS.iter().any(|k| p.contains(k)))
        .collect();

    let joined = if kept.is_empty() {
        parts.iter().map(|p| p.trim()).collect::<Vec<_>>().join(" ")
    } else {
        kept.join(" ")
    };

    let joined = joined.trim();
    if joined.is_empty() {
        format!("Unnamed: {index}")
    } else {
        joined.to_owned()
    }
}

fn dedupe_names(columns: Vec<String>) -> Vec<String> {
    let mut seen: AHashMap<String, usize> = AHashMap::new();
    columns
        .into_iter()
        .map(|name| {
            let count = seen.entry(name.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                name
            } else {
                format!("{name}.{}", *count - 1)
            }
        })
        .collect()
}

pub fn looks_like_unit(value: &str) -> bool {
    let value = value.trim();
    UNIT_PATTERNS.iter().any(|p| value.contains(p))
        || (value.contains('(') && value.contains(')') && value.chars().count() < 20)
}

/// Folds a unit row sitting in data row 0 into the column names.
///
/// Applies only when every non-empty cell of that row looks like a unit; the
/// units are appended to their column names and the row is dropped.
pub fn absorb_unit_row(table: &mut RawTable) -> bool {
    let Some(first) = table.rows.first() else {
        return false;
    };

    let units: Vec<Option<String>> = first.iter().map(Cell::as_text).collect();
    let non_empty = units.iter().flatten().count();
    if non_empty == 0 || !units.iter().flatten().all(|u| looks_like_unit(u)) {
        return false;
    }

    for (name, unit) in table.columns.iter_mut().zip(&units) {
        if let Some(unit) = unit {
            *name = format!("{name} {unit}");
        }
    }
    table.rows.remove(0);
    debug!(units = non_empty, "absorbed unit row into header");
    true
}

/// `(country_code, year)` parsed from a CRT filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrtFileName {
    pub country_code: String,
    pub year: i32,
}

/// Parses `{ISO3}-CRT-{version}-{tag}-{year}-{timestamp}.xlsx`.
///
/// Segment 0 is the country code and segment 4 the inventory year. Returns
/// `None` with a warning when the name has fewer than five segments or the
/// year segment is not an integer.
pub fn parse_crt_filename(filename: &str) -> Option<CrtFileName> {
    let stem = Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename);

    let parts: Vec<&str> = stem.split('-').collect();
    if parts.len() < 5 {
        warn!(filename, "filename has fewer than five '-' separated segments");
        return None;
    }
    match parts[4].trim().parse::<i32>() {
        Ok(year) => Some(CrtFileName {
            country_code: parts[0].to_owned(),
            year,
        }),
        Err(err) => {
            warn!(filename, segment = parts[4], %err, "year segment is not an integer");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn t(s: &str) -> Cell {
        Cell::text(s)
    }

    fn summary_sheet() -> RawSheet {
        RawSheet::new(
            "Summary2",
            vec![
                vec![t("Table Summary 2 Summary report for CO2 equivalent emissions")],
                vec![t("Inventory 2021"), Cell::Empty, t("Submission 2025 v0.6")],
                vec![],
                vec![
                    t("GREENHOUSE GAS SOURCE AND SINK CATEGORIES"),
                    t("CO2 (1)"),
                    t("CH4"),
                    t("N2O"),
                    t("Total"),
                ],
                vec![Cell::Empty, t("CO2 equivalents (kt ) (2)")],
                vec![t("Total (net emissions)"), Cell::Number(10.0), Cell::Number(2.0), Cell::Number(1.0), Cell::Number(13.0)],
                vec![t("1. Energy"), Cell::Number(8.0), t("NO"), Cell::Number(0.5)],
            ],
        )
    }

    #[test]
    fn anchor_is_matched_case_insensitively() {
        let sheet = summary_sheet();
        let search = HeaderSearch::anchored("greenhouse gas source");
        assert_eq!(detect_header_row(&sheet, &search).unwrap(), 3);
        assert_eq!(header_rows(3), [3, 4]);
    }

    #[test]
    fn anchor_wins_over_an_earlier_keyword_row() {
        let sheet = summary_sheet();
        let search = HeaderSearch::anchored(CRT_ANCHOR).with_keywords(["inventory"]);
        assert_eq!(detect_header_row(&sheet, &search).unwrap(), 3);
    }

    #[test]
    fn keywords_are_the_fallback() {
        let sheet = summary_sheet();
        let search = HeaderSearch::anchored("not present").with_keywords(["SUBMISSION"]);
        assert_eq!(detect_header_row(&sheet, &search).unwrap(), 1);

        let search = HeaderSearch {
            anchor: None,
            keywords: vec!["ch4".into()],
            lookahead: DEFAULT_LOOKAHEAD,
        };
        assert_eq!(detect_header_row(&sheet, &search).unwrap(), 3);
    }

    #[test]
    fn header_outside_lookahead_is_not_found() {
        let sheet = summary_sheet();
        let search = HeaderSearch {
            lookahead: 3,
            ..HeaderSearch::default()
        };
        assert!(matches!(
            detect_header_row(&sheet, &search),
            Err(Error::HeaderNotFound { lookahead: 3 })
        ));
    }

    #[test]
    fn two_row_header_is_flattened_with_allowlist() {
        let table = read_with_detected_header(&summary_sheet(), &HeaderSearch::default()).unwrap();
        assert_eq!(
            table.columns,
            vec![
                "GREENHOUSE GAS SOURCE AND SINK CATEGORIES",
                "CO2 (1) CO2 equivalents (kt ) (2)",
                "CH4",
                "N2O",
                "Total",
            ]
        );
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1][0], t("1. Energy"));
        assert_eq!(table.rows[1].len(), 5);
    }

    #[test]
    fn unmatched_fragments_fall_back_to_plain_join() {
        let parts = vec!["Unspecified mix of HFCs and PFCs".to_owned()];
        assert_eq!(flatten_header(&parts, 3), "Unspecified mix of HFCs and PFCs");

        let parts = vec!["Remarks".to_owned(), "misc".to_owned()];
        assert_eq!(flatten_header(&parts, 7), "Remarks misc");

        assert_eq!(flatten_header(&[], 9), "Unnamed: 9");
    }

    #[test]
    fn allowlist_drops_non_domain_fragments() {
        let parts = vec!["Reference year (1990)".to_owned(), "Remarks".to_owned()];
        assert_eq!(flatten_header(&parts, 0), "Reference year (1990)");
    }

    #[test]
    fn duplicate_names_get_suffixes() {
        let names = dedupe_names(vec!["CO2".into(), "CH4".into(), "CO2".into(), "CO2".into()]);
        assert_eq!(names, vec!["CO2", "CH4", "CO2.1", "CO2.2"]);
    }

    #[test]
    fn unit_row_is_absorbed_when_every_cell_is_a_unit() {
        let mut table = RawTable {
            columns: vec!["CATEGORIES".into(), "CO2".into(), "CH4".into()],
            rows: vec![
                vec![Cell::Empty, t("(kt)"), t("(kt)")],
                vec![t("1. Energy"), Cell::Number(1.0), Cell::Number(2.0)],
            ],
        };
        assert!(absorb_unit_row(&mut table));
        assert_eq!(table.columns, vec!["CATEGORIES", "CO2 (kt)", "CH4 (kt)"]);
        assert_eq!(table.rows.len(), 1);
    }

    #[test]
    fn data_row_is_left_alone() {
        let mut table = RawTable {
            columns: vec!["CATEGORIES".into(), "CO2".into()],
            rows: vec![vec![t("1. Energy"), Cell::Number(1.0)]],
        };
        assert!(!absorb_unit_row(&mut table));
        assert_eq!(table.columns, vec!["CATEGORIES", "CO2"]);
        assert_eq!(table.rows.len(), 1);
    }

    #[test]
    fn crt_filenames_yield_country_and_year() {
        assert_eq!(
            parse_crt_filename("GBR-CRT-2025-V0.6-1990-20250415-091720.xlsx"),
            Some(CrtFileName {
                country_code: "GBR".into(),
                year: 1990
            })
        );
        assert_eq!(parse_crt_filename("GBR-CRT-2025-V0.6.xlsx"), None);
        assert_eq!(parse_crt_filename("GBR-CRT-2025-V0.6-latest-1.xlsx"), None);
    }
}
