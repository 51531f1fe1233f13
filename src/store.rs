//! Read side of the processed tree, as the dashboard consumes it.
//!
//! Nothing here returns an error for absent or unreadable data: a missing
//! country, level or gas comes back as `None` so the caller can show a
//! "data not available" state.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::Result;
use crate::frame::{ColumnData, Frame};
use crate::gases::{gas_slug, is_co2_column, is_other_gas_column};
use crate::hierarchy::{Level, PartitionKey};
use crate::parquet::read_parquet;
use crate::pivot::YEAR_COLUMN;
use crate::processor::COUNTRY_COLUMN;

const COMBINED_SUFFIX: &str = "_combined.parquet";

/// The four levels a country page shows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CountryTables {
    pub total: Option<Frame>,
    pub sectors: Option<Frame>,
    pub subsectors: Option<Frame>,
    pub sub_subsectors: Option<Frame>,
}

impl CountryTables {
    pub fn get(&self, level: Level) -> Option<&Frame> {
        match level {
            Level::Total => self.total.as_ref(),
            Level::SECTOR => self.sectors.as_ref(),
            Level::SUBSECTOR => self.subsectors.as_ref(),
            Level::SUB_SUBSECTOR => self.sub_subsectors.as_ref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatasetStore {
    root: PathBuf,
}

impl DatasetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Country folder names, sorted. Empty when the root does not exist.
    pub fn countries(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().to_str().map(str::to_owned))
            .collect();
        names.sort();
        names
    }

    pub fn level_dir(&self, country: &str, key: PartitionKey) -> PathBuf {
        self.root.join(country).join(key.dir_name())
    }

    pub fn gas_level_dir(&self, country: &str, gas: &str, key: PartitionKey) -> PathBuf {
        self.root.join(country).join(gas_slug(gas)).join(key.dir_name())
    }

    /// One country's table at one level, all years stacked.
    pub fn load_level(&self, country: &str, key: PartitionKey) -> Option<Frame> {
        load_dir(&self.level_dir(country, key))
    }

    /// One country's wide gas pivot at one level. `gas` may be the canonical
    /// column name or its slug.
    pub fn load_gas_level(&self, country: &str, gas: &str, key: PartitionKey) -> Option<Frame> {
        load_dir(&self.gas_level_dir(country, gas, key))
    }

    pub fn load_country(&self, country: &str) -> CountryTables {
        let load = |level| self.load_level(country, PartitionKey::Level(level));
        CountryTables {
            total: load(Level::Total),
            sectors: load(Level::SECTOR),
            subsectors: load(Level::SUBSECTOR),
            sub_subsectors: load(Level::SUB_SUBSECTOR),
        }
    }

    /// Every country's Total table from `from_year` on, `Country` set to the
    /// folder name. `None` when no country has any.
    pub fn load_all_totals(&self, from_year: i32) -> Option<Frame> {
        let mut frames = Vec::new();
        for country in self.countries() {
            let Some(mut frame) = self.load_level(&country, PartitionKey::Level(Level::Total)) else {
                continue;
            };
            let mask: Vec<bool> = match frame.int32(YEAR_COLUMN) {
                Ok(years) => years.iter().map(|y| y.is_some_and(|y| y >= from_year)).collect(),
                Err(err) => {
                    warn!(country = %country, %err, "total table without usable Year column");
                    continue;
                }
            };
            frame = frame.filter(&mask);
            frame.set_utf8_constant(COUNTRY_COLUMN, &country);
            frames.push(frame);
        }
        if frames.is_empty() {
            return None;
        }
        match Frame::concat(&frames) {
            Ok(frame) => Some(frame),
            Err(err) => {
                warn!(%err, "could not stack country totals");
                None
            }
        }
    }
}

/// Parquet files of a level directory: the combined artifacts when there are
/// any, otherwise whatever staged files are present.
fn level_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|e| e == "parquet"))
        .collect();
    files.sort();

    let is_combined = |p: &PathBuf| {
        p.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(COMBINED_SUFFIX))
    };
    if files.iter().any(is_combined) {
        files.retain(is_combined);
    }
    files
}

fn read_all(files: &[PathBuf]) -> Result<Frame> {
    let frames = files
        .iter()
        .map(|f| read_parquet(f))
        .collect::<Result<Vec<_>>>()?;
    Frame::concat(&frames)
}

fn load_dir(dir: &Path) -> Option<Frame> {
    let files = level_files(dir);
    if files.is_empty() {
        debug!(dir = %dir.display(), "no data");
        return None;
    }
    match read_all(&files) {
        Ok(frame) => Some(frame),
        Err(err) => {
            warn!(dir = %dir.display(), %err, "could not read level data");
            None
        }
    }
}

/// First CO₂ column of a table.
pub fn co2_column(frame: &Frame) -> Option<&str> {
    frame.names().find(|n| is_co2_column(n))
}

/// Non-CO₂ gas columns of a table, in table order.
pub fn other_gas_columns(frame: &Frame) -> Vec<&str> {
    frame.names().filter(|n| is_other_gas_column(n)).collect()
}

/// Distinct years of a table, ascending.
pub fn years(frame: &Frame) -> Vec<i32> {
    let Some(column) = frame.column(YEAR_COLUMN) else {
        return Vec::new();
    };
    let ColumnData::Int32(values) = &column.data else {
        return Vec::new();
    };
    let mut years: Vec<i32> = values.iter().flatten().copied().collect();
    years.sort_unstable();
    years.dedup();
    years
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Column;
    use crate::parquet::write_parquet;
    use pretty_assertions::assert_eq;

    fn totals(years: &[i32]) -> Frame {
        Frame::new(vec![
            Column::new(YEAR_COLUMN, ColumnData::Int32(years.iter().copied().map(Some).collect())),
            Column::new("CO₂ (kt)", ColumnData::Float64(years.iter().map(|y| Some(*y as f64)).collect())),
            Column::new("CH₄ (kt)", ColumnData::Float64(vec![None; years.len()])),
            Column::new(COUNTRY_COLUMN, ColumnData::Utf8(vec![Some("X".into()); years.len()])),
        ])
        .unwrap()
    }

    #[test]
    fn absent_data_is_none_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = DatasetStore::new(dir.path().join("missing"));
        assert!(store.countries().is_empty());
        assert!(store.load_level("germany", PartitionKey::Level(Level::Total)).is_none());
        assert!(store.load_all_totals(1990).is_none());
        assert_eq!(store.load_country("germany"), CountryTables::default());
    }

    #[test]
    fn combined_files_win_over_staged_ones() {
        let dir = tempfile::tempdir().unwrap();
        let level = dir.path().join("germany/total");
        write_parquet(&totals(&[1990]), &level.join("deu_Summary2_1990_total.parquet")).unwrap();
        write_parquet(&totals(&[1990, 1991]), &level.join("germany_total_combined.parquet")).unwrap();

        let store = DatasetStore::new(dir.path());
        let frame = store.load_level("germany", PartitionKey::Level(Level::Total)).unwrap();
        assert_eq!(years(&frame), vec![1990, 1991]);
        assert_eq!(frame.height(), 2);
    }

    #[test]
    fn staged_files_are_stacked_without_combined() {
        let dir = tempfile::tempdir().unwrap();
        let level = dir.path().join("germany/sectors");
        write_parquet(&totals(&[1991]), &level.join("deu_Summary2_1991_sectors.parquet")).unwrap();
        write_parquet(&totals(&[1990]), &level.join("deu_Summary2_1990_sectors.parquet")).unwrap();

        let store = DatasetStore::new(dir.path());
        let tables = store.load_country("germany");
        assert!(tables.total.is_none());
        let sectors = tables.get(Level::SECTOR).unwrap();
        assert_eq!(sectors.int32(YEAR_COLUMN).unwrap(), &[Some(1990), Some(1991)]);
    }

    #[test]
    fn all_totals_filter_years_and_tag_countries() {
        let dir = tempfile::tempdir().unwrap();
        for country in ["austria", "germany"] {
            let path = dir.path().join(country).join("total").join(format!("{country}_total_combined.parquet"));
            write_parquet(&totals(&[1989, 1990, 2000]), &path).unwrap();
        }
        fs::create_dir_all(dir.path().join("empty")).unwrap();

        let store = DatasetStore::new(dir.path());
        assert_eq!(store.countries(), vec!["austria", "empty", "germany"]);

        let all = store.load_all_totals(1990).unwrap();
        assert_eq!(all.height(), 4);
        let countries: Vec<&str> = all
            .utf8(COUNTRY_COLUMN)
            .unwrap()
            .iter()
            .map(|c| c.as_deref().unwrap())
            .collect();
        assert_eq!(countries, vec!["austria", "austria", "germany", "germany"]);
        assert_eq!(years(&all), vec![1990, 2000]);
    }

    #[test]
    fn gas_helpers_pick_columns() {
        let frame = totals(&[1990]);
        assert_eq!(co2_column(&frame), Some("CO₂ (kt)"));
        assert_eq!(other_gas_columns(&frame), vec!["CH₄ (kt)"]);
    }
}
