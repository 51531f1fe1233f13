use std::fmt;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Range, Reader};

use crate::error::{Error, Result};

/// One spreadsheet cell, reduced to what the normalizer cares about.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Cell {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    /// Blank cells and whitespace-only strings both count as empty.
    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Number(_) | Cell::Bool(_) => false,
        }
    }

    /// Trimmed textual form, `None` for empty cells.
    pub fn as_text(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        Some(self.to_string().trim().to_owned())
    }

    /// Lenient numeric coercion: anything that is not a number becomes missing.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(v) if v.is_finite() => Some(*v),
            Cell::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
            _ => None,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Text(s) => f.write_str(s),
            // Whole numbers print without a fraction so year headers read "1990".
            Cell::Number(v) if v.fract() == 0.0 && v.abs() < 1e15 => write!(f, "{}", *v as i64),
            Cell::Number(v) => write!(f, "{v}"),
            Cell::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Int(i) => Cell::Number(*i as f64),
            Data::Float(v) => Cell::Number(*v),
            Data::String(s) => Cell::Text(s.clone()),
            Data::Bool(b) => Cell::Bool(*b),
            Data::DateTime(dt) => Cell::Number(dt.as_f64()),
            Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
            Data::Error(_) | Data::Empty => Cell::Empty,
        }
    }
}

/// A loaded worksheet as a dense grid, row 0 being the first row of the sheet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSheet {
    pub name: String,
    pub rows: Vec<Vec<Cell>>,
}

impl RawSheet {
    pub fn new(name: impl Into<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        static EMPTY: Cell = Cell::Empty;
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY)
    }

    /// Uses row `header` as column names and everything below it as data.
    pub fn into_table(self, header: usize) -> RawTable {
        let width = self.width();
        let columns = (0..width)
            .map(|col| {
                self.cell(header, col)
                    .as_text()
                    .unwrap_or_else(|| format!("Unnamed: {col}"))
            })
            .collect();
        let rows = self.rows.into_iter().skip(header + 1).collect();
        RawTable { columns, rows }
    }

    fn from_range(name: &str, range: &Range<Data>) -> Self {
        // calamine ranges begin at the first used cell; pad so indices match the sheet.
        let (row_offset, col_offset) = range
            .start()
            .map(|(r, c)| (r as usize, c as usize))
            .unwrap_or((0, 0));

        let mut rows = vec![Vec::new(); row_offset];
        for source in range.rows() {
            let mut row = vec![Cell::Empty; col_offset];
            row.extend(source.iter().map(Cell::from));
            rows.push(row);
        }
        Self::new(name, rows)
    }
}

/// A sheet after header detection: flat column names over the remaining rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

/// Loads one named sheet from an `.xlsx`/`.xls`/`.ods` workbook.
pub fn read_sheet(path: &Path, sheet: &str) -> Result<RawSheet> {
    let workbook_error = |source| Error::Workbook {
        path: path.to_path_buf(),
        sheet: sheet.to_owned(),
        source,
    };

    let mut workbook = open_workbook_auto(path).map_err(workbook_error)?;
    let range = workbook.worksheet_range(sheet).map_err(workbook_error)?;
    Ok(RawSheet::from_range(sheet, &range))
}

/// Loads the first sheet of a workbook, whatever its name.
pub fn read_first_sheet(path: &Path) -> Result<RawSheet> {
    let mut workbook = open_workbook_auto(path).map_err(|source| Error::Workbook {
        path: path.to_path_buf(),
        sheet: String::new(),
        source,
    })?;
    let name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| Error::EmptyWorkbook(path.to_path_buf()))?;
    let range = workbook.worksheet_range(&name).map_err(|source| Error::Workbook {
        path: path.to_path_buf(),
        sheet: name.clone(),
        source,
    })?;
    Ok(RawSheet::from_range(&name, &range))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_numbers_display_without_fraction() {
        assert_eq!(Cell::Number(1990.0).to_string(), "1990");
        assert_eq!(Cell::Number(12.5).to_string(), "12.5");
        assert_eq!(Cell::Empty.to_string(), "");
    }

    #[test]
    fn numeric_coercion_turns_notation_keys_into_missing() {
        assert_eq!(Cell::text(" 42.5 ").as_f64(), Some(42.5));
        assert_eq!(Cell::text("NO").as_f64(), None);
        assert_eq!(Cell::text("NE,IE").as_f64(), None);
        assert_eq!(Cell::Bool(true).as_f64(), None);
        assert_eq!(Cell::Number(f64::NAN).as_f64(), None);
    }

    #[test]
    fn whitespace_text_is_empty() {
        assert!(Cell::text("   ").is_empty());
        assert_eq!(Cell::text("  1.A Fuel ").as_text().as_deref(), Some("1.A Fuel"));
    }

    #[test]
    fn offset_ranges_are_padded_to_sheet_coordinates() {
        let mut range = Range::new((2, 1), (3, 2));
        range.set_value((2, 1), Data::String("anchor".into()));
        range.set_value((3, 2), Data::Float(4.0));

        let sheet = RawSheet::from_range("Summary2", &range);
        assert_eq!(sheet.height(), 4);
        assert_eq!(sheet.cell(2, 1), &Cell::text("anchor"));
        assert_eq!(sheet.cell(3, 2), &Cell::Number(4.0));
        assert_eq!(sheet.cell(0, 0), &Cell::Empty);
    }

    #[test]
    fn first_row_becomes_the_header() {
        let sheet = RawSheet::new(
            "EM-DAT",
            vec![
                vec![Cell::text("Country"), Cell::Empty, Cell::text("Start Year")],
                vec![Cell::text("Chad"), Cell::text("x"), Cell::Number(2001.0)],
            ],
        );
        let table = sheet.into_table(0);
        assert_eq!(table.columns, vec!["Country", "Unnamed: 1", "Start Year"]);
        assert_eq!(table.rows.len(), 1);
    }
}
