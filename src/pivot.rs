use ahash::AHashMap;
use tracing::{debug, warn};

use crate::error::Result;
use crate::frame::{Column, ColumnData, Frame};
use crate::hierarchy::LABEL_COLUMN;

pub const YEAR_COLUMN: &str = "Year";

/// Which columns of a level table index and label the pivot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PivotSpec<'a> {
    pub index: &'a str,
    pub columns: &'a str,
}

impl Default for PivotSpec<'_> {
    fn default() -> Self {
        Self {
            index: YEAR_COLUMN,
            columns: LABEL_COLUMN,
        }
    }
}

/// Year x category wide table for one gas at one level.
#[derive(Debug, Clone, PartialEq)]
pub struct PivotTable {
    pub gas: String,
    /// Ascending, unique.
    pub years: Vec<i32>,
    /// Sorted, unique.
    pub labels: Vec<String>,
    /// `values[year][label]`
    pub values: Vec<Vec<Option<f64>>>,
    /// Rows dropped because their `(year, label)` pair was already filled.
    pub duplicates: usize,
}

impl PivotTable {
    pub fn get(&self, year: i32, label: &str) -> Option<f64> {
        let row = self.years.binary_search(&year).ok()?;
        let col = self.labels.binary_search_by(|l| l.as_str().cmp(label)).ok()?;
        self.values[row][col]
    }

    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
    }

    /// `Year` followed by one float column per label.
    pub fn to_frame(&self, index: &str) -> Result<Frame> {
        let mut columns = Vec::with_capacity(self.labels.len() + 1);
        columns.push(Column::new(
            index,
            ColumnData::Int32(self.years.iter().copied().map(Some).collect()),
        ));
        for (col, label) in self.labels.iter().enumerate() {
            columns.push(Column::new(
                label.clone(),
                ColumnData::Float64(self.values.iter().map(|row| row[col]).collect()),
            ));
        }
        Frame::new(columns)
    }
}

/// Reshapes a long level table into a wide table for one gas.
///
/// Rows with a missing year, label or gas value are ignored, so only years and
/// labels with at least one value appear. When a `(year, label)` pair occurs
/// more than once the first value in table order wins; later ones are counted
/// in [`PivotTable::duplicates`] and logged, not rejected.
///
/// Returns `Ok(None)` when the table has no such gas column.
pub fn pivot_gas(frame: &Frame, gas: &str, spec: PivotSpec<'_>) -> Result<Option<PivotTable>> {
    let Some(column) = frame.column(gas) else {
        debug!(gas, "gas column not present, skipping pivot");
        return Ok(None);
    };
    let ColumnData::Float64(values) = &column.data else {
        warn!(gas, kind = column.data.type_name(), "gas column is not numeric, skipping pivot");
        return Ok(None);
    };
    let years = frame.int32(spec.index)?;
    let labels = frame.utf8(spec.columns)?;

    let mut cells: AHashMap<(i32, &str), f64> = AHashMap::new();
    let mut duplicates = 0;
    for ((year, label), value) in years.iter().zip(labels).zip(values) {
        let (Some(year), Some(label), Some(value)) = (year, label, value) else {
            continue;
        };
        match cells.entry((*year, label.as_str())) {
            std::collections::hash_map::Entry::Occupied(_) => duplicates += 1,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(*value);
            }
        }
    }

    if duplicates > 0 {
        warn!(gas, duplicates, "duplicate (year, label) pairs; first value kept");
    }

    let mut row_keys: Vec<i32> = cells.keys().map(|(y, _)| *y).collect();
    row_keys.sort_unstable();
    row_keys.dedup();
    let mut col_keys: Vec<&str> = cells.keys().map(|(_, l)| *l).collect();
    col_keys.sort_unstable();
    col_keys.dedup();

    let table = row_keys
        .iter()
        .map(|y| col_keys.iter().map(|l| cells.get(&(*y, *l)).copied()).collect())
        .collect();

    Ok(Some(PivotTable {
        gas: gas.to_owned(),
        years: row_keys,
        labels: col_keys.into_iter().map(str::to_owned).collect(),
        values: table,
        duplicates,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn level_table(rows: &[(i32, &str, Option<f64>)]) -> Frame {
        Frame::new(vec![
            Column::new(YEAR_COLUMN, ColumnData::Int32(rows.iter().map(|r| Some(r.0)).collect())),
            Column::new(LABEL_COLUMN, ColumnData::Utf8(rows.iter().map(|r| Some(r.1.to_string())).collect())),
            Column::new("CO₂ (kt)", ColumnData::Float64(rows.iter().map(|r| r.2).collect())),
        ])
        .unwrap()
    }

    #[test]
    fn shape_counts_distinct_years_and_labels_with_values() {
        let frame = level_table(&[
            (1991, "Energy", Some(10.0)),
            (1990, "Energy", Some(12.0)),
            (1990, "Agriculture", Some(3.0)),
            (1991, "Waste", None),
            (1992, "Waste", None),
        ]);
        let pivot = pivot_gas(&frame, "CO₂ (kt)", PivotSpec::default()).unwrap().unwrap();
        assert_eq!(pivot.years, vec![1990, 1991]);
        assert_eq!(pivot.labels, vec!["Agriculture", "Energy"]);
        assert_eq!(pivot.get(1990, "Energy"), Some(12.0));
        assert_eq!(pivot.get(1991, "Agriculture"), None);
        assert_eq!(pivot.get(1992, "Waste"), None);
    }

    #[test]
    fn first_occurrence_wins_on_duplicates() {
        let frame = level_table(&[
            (1990, "Energy", Some(1.0)),
            (1990, "Energy", Some(2.0)),
            (1990, "Energy", Some(3.0)),
        ]);
        let pivot = pivot_gas(&frame, "CO₂ (kt)", PivotSpec::default()).unwrap().unwrap();
        assert_eq!(pivot.get(1990, "Energy"), Some(1.0));
        assert_eq!(pivot.duplicates, 2);
    }

    #[test]
    fn missing_gas_is_skipped_not_failed() {
        let frame = level_table(&[(1990, "Energy", Some(1.0))]);
        assert!(pivot_gas(&frame, "CH₄ (kt)", PivotSpec::default()).unwrap().is_none());
    }

    #[test]
    fn wide_frame_has_year_then_labels() {
        let frame = level_table(&[(1990, "Energy", Some(1.0)), (1991, "Waste", Some(2.0))]);
        let wide = pivot_gas(&frame, "CO₂ (kt)", PivotSpec::default())
            .unwrap()
            .unwrap()
            .to_frame(YEAR_COLUMN)
            .unwrap();
        assert_eq!(wide.names().collect::<Vec<_>>(), vec!["Year", "Energy", "Waste"]);
        assert_eq!(wide.int32("Year").unwrap(), &[Some(1990), Some(1991)]);
        assert_eq!(wide.float64("Energy").unwrap(), &[Some(1.0), None]);
        assert_eq!(wide.float64("Waste").unwrap(), &[None, Some(2.0)]);
    }
}
