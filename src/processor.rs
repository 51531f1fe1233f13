//! Sheet processing: workbook in, leveled parquet artifacts out.
//!
//! Each `(workbook, sheet)` pair of a country folder is normalized and
//! partitioned on a rayon pool, and every non-empty partition is staged as a
//! per-year artifact. Once the country is done the staged artifacts of each
//! level are concatenated into one combined time series, optionally pivoted
//! per gas, and the staging files are removed.

use std::collections::hash_map::Entry;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use ahash::AHashMap;
use crossbeam::channel;
use dashmap::DashMap;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::frame::{Column, ColumnData, Frame};
use crate::gases::{canonical_gases, gas_slug, is_retained_value_column, standardize_column};
use crate::header::{parse_crt_filename, read_with_detected_header, HeaderSearch};
use crate::hierarchy::{build_hierarchy, LevelPartition, PartitionKey, CATEGORY_COLUMN};
use crate::parquet::{read_parquet, write_csv, write_parquet};
use crate::pivot::{pivot_gas, PivotSpec, YEAR_COLUMN};
use crate::sheet::{read_sheet, Cell, RawTable};

pub const SHEET_COLUMN: &str = "Sheet";
pub const COUNTRY_COLUMN: &str = "Country";

const WORKBOOK_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xls", "ods"];

/// Turns a header-flattened table into the typed frame the hierarchy builder
/// works on.
///
/// Gas headers are renamed to their canonical names, the category column is
/// kept as text and every other column is coerced to numbers (anything
/// unparsable becomes missing). Rows without a single number and columns
/// without a single value are dropped, and only gas/year value columns are
/// kept. `Sheet`, `Country` and `Year` are appended.
pub fn normalize_table(table: RawTable, sheet: &str, country: &str, year: i32) -> Result<Frame> {
    let RawTable { columns, rows } = table;
    let names: Vec<String> = columns.iter().map(|c| standardize_column(c)).collect();

    let category = names
        .iter()
        .position(|n| n.contains(CATEGORY_COLUMN))
        .ok_or_else(|| Error::CategoryColumnNotFound(CATEGORY_COLUMN.to_owned()))?;

    let numeric: Vec<(usize, Vec<Option<f64>>)> = (0..names.len())
        .filter(|&col| col != category)
        .map(|col| (col, rows.iter().map(|r| r.get(col).and_then(Cell::as_f64)).collect()))
        .collect();

    let kept_rows: Vec<usize> = (0..rows.len())
        .filter(|&r| numeric.iter().any(|(_, values)| values[r].is_some()))
        .collect();
    debug!(
        sheet,
        rows = rows.len(),
        kept = kept_rows.len(),
        "dropped rows without numeric values"
    );

    let labels: Vec<Option<String>> = kept_rows
        .iter()
        .map(|&r| rows[r].get(category).and_then(Cell::as_text))
        .collect();
    let mut out = vec![Column::new(names[category].clone(), ColumnData::Utf8(labels))];

    for (col, values) in numeric {
        let name = &names[col];
        if !is_retained_value_column(name) {
            continue;
        }
        let values: Vec<Option<f64>> = kept_rows.iter().map(|&r| values[r]).collect();
        if values.iter().all(Option::is_none) {
            continue;
        }
        if out.iter().any(|c| &c.name == name) {
            debug!(sheet, column = %name, "duplicate column after renaming, keeping the first");
            continue;
        }
        out.push(Column::new(name.clone(), ColumnData::Float64(values)));
    }

    let mut frame = Frame::new(out)?;
    frame.set_utf8_constant(SHEET_COLUMN, sheet);
    frame.set_utf8_constant(COUNTRY_COLUMN, &country.to_uppercase());
    frame.push_column(Column::new(
        YEAR_COLUMN,
        ColumnData::Int32(vec![Some(year); frame.height()]),
    ))?;
    Ok(frame)
}

/// The leveled partitions of one sheet of one workbook.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedSheet {
    pub country_code: String,
    pub year: i32,
    pub partitions: Vec<LevelPartition>,
}

/// Runs filename parsing, header detection, normalization and the hierarchy
/// builder for one sheet. Every error here is fatal to this file only.
pub fn process_file(
    path: &Path,
    sheet: &str,
    country: &str,
    search: &HeaderSearch,
) -> Result<ProcessedSheet> {
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let crt = parse_crt_filename(filename)
        .ok_or_else(|| Error::UnparsableFilename(filename.to_owned()))?;

    let raw = read_sheet(path, sheet)?;
    let table = read_with_detected_header(&raw, search)?;
    let frame = normalize_table(table, sheet, country, crt.year)?;
    let partitions = build_hierarchy(&frame)?;

    Ok(ProcessedSheet {
        country_code: crt.country_code,
        year: crt.year,
        partitions,
    })
}

/// `{root}/{country}/{level}/{cc}_{sheet}_{year}_{level}.parquet`
pub fn staging_path(
    root: &Path,
    country: &str,
    key: PartitionKey,
    country_code: &str,
    sheet: &str,
    year: i32,
) -> PathBuf {
    let level = key.dir_name();
    root.join(country).join(&level).join(format!(
        "{}_{sheet}_{year}_{level}.parquet",
        country_code.to_lowercase()
    ))
}

/// `{root}/{country}/{level}/{country}_{level}_combined.{extension}`
pub fn combined_path(root: &Path, country: &str, key: PartitionKey, extension: &str) -> PathBuf {
    let level = key.dir_name();
    root.join(country)
        .join(&level)
        .join(format!("{country}_{level}_combined.{extension}"))
}

/// `{root}/{country}/{gas}/{level}/{country}_{level}_{gas}_combined.{extension}`
pub fn gas_level_path(
    root: &Path,
    country: &str,
    gas: &str,
    key: PartitionKey,
    extension: &str,
) -> PathBuf {
    let level = key.dir_name();
    root.join(country)
        .join(gas)
        .join(&level)
        .join(format!("{country}_{level}_{gas}_combined.{extension}"))
}

/// Workbooks directly inside `dir`, sorted by path. Excel lock files are skipped.
pub fn list_workbooks(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        let is_workbook = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| WORKBOOK_EXTENSIONS.iter().any(|w| e.eq_ignore_ascii_case(w)));
        if is_workbook && !name.starts_with("~$") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Sub-folders of `root`, sorted by name.
pub fn list_country_dirs(root: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(root)? {
        let path = entry?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// What happened to one `(workbook, sheet)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Processed {
        path: PathBuf,
        sheet: String,
        year: i32,
        rows: usize,
    },
    Skipped {
        path: PathBuf,
        sheet: String,
        reason: String,
    },
}

impl FileOutcome {
    fn sort_key(&self) -> (&Path, &str) {
        match self {
            FileOutcome::Processed { path, sheet, .. } | FileOutcome::Skipped { path, sheet, .. } => {
                (path.as_path(), sheet.as_str())
            }
        }
    }
}

/// Summary of one country folder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountryReport {
    pub country: String,
    /// Sorted by workbook path, then sheet.
    pub outcomes: Vec<FileOutcome>,
    /// Combined per-level artifacts, in level order.
    pub combined: Vec<PathBuf>,
    pub gas_tables: Vec<PathBuf>,
}

impl CountryReport {
    pub fn processed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, FileOutcome::Processed { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.len() - self.processed()
    }
}

fn country_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Stages every partition of one processed sheet. Returns the row count.
///
/// The partitions are published to `staged` only once all of them are
/// written; on error the files written so far are removed.
fn stage_sheet(
    config: &PipelineConfig,
    country: &str,
    sheet: &str,
    processed: &ProcessedSheet,
    staged: &DashMap<PartitionKey, Vec<PathBuf>>,
) -> Result<usize> {
    let mut rows = 0;
    let mut written: Vec<(PartitionKey, PathBuf)> = Vec::new();
    for partition in &processed.partitions {
        if partition.frame.is_empty() {
            continue;
        }
        let path = staging_path(
            &config.output_root,
            country,
            partition.key,
            &processed.country_code,
            sheet,
            processed.year,
        );
        if let Err(err) = write_parquet(&partition.frame, &path) {
            for (_, path) in &written {
                if let Err(err) = fs::remove_file(path) {
                    warn!(file = %path.display(), %err, "could not remove partial staging artifact");
                }
            }
            return Err(err);
        }
        rows += partition.frame.height();
        written.push((partition.key, path));
    }
    for (key, path) in written {
        staged.entry(key).or_default().push(path);
    }
    Ok(rows)
}

/// Keeps one workbook per `(country code, year)`.
///
/// Resubmissions differ only in the version and timestamp segments, so the
/// last one in path order wins. Returns the kept files (sorted) and the
/// `(superseded, replacement)` pairs. Names that do not parse are kept and
/// left for [`process_file`] to reject.
pub fn latest_submissions(mut files: Vec<PathBuf>) -> (Vec<PathBuf>, Vec<(PathBuf, PathBuf)>) {
    files.sort();
    let mut kept: Vec<PathBuf> = Vec::with_capacity(files.len());
    let mut by_year: AHashMap<(String, i32), usize> = AHashMap::new();
    let mut superseded = Vec::new();

    for path in files {
        let crt = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(parse_crt_filename);
        let Some(crt) = crt else {
            kept.push(path);
            continue;
        };
        match by_year.entry((crt.country_code.to_uppercase(), crt.year)) {
            Entry::Occupied(slot) => {
                let old = std::mem::replace(&mut kept[*slot.get()], path.clone());
                superseded.push((old, path));
            }
            Entry::Vacant(slot) => {
                slot.insert(kept.len());
                kept.push(path);
            }
        }
    }
    kept.sort();
    (kept, superseded)
}

/// Processes the given sheets of every workbook in `country_dir`, then
/// combines the staged artifacts per level.
pub fn process_country(
    config: &PipelineConfig,
    country_dir: &Path,
    sheets: &[String],
) -> Result<CountryReport> {
    let country = country_name(country_dir);
    let (files, superseded) = latest_submissions(list_workbooks(country_dir)?);
    let mut sheet_names: Vec<&str> = Vec::with_capacity(sheets.len());
    for sheet in sheets {
        if !sheet_names.contains(&sheet.as_str()) {
            sheet_names.push(sheet);
        }
    }
    info!(country = %country, files = files.len(), sheets = sheet_names.len(), "processing country");

    let work: Vec<(&PathBuf, &str)> = files
        .iter()
        .flat_map(|f| sheet_names.iter().map(move |s| (f, *s)))
        .collect();

    let search = config.header_search();
    let staged: DashMap<PartitionKey, Vec<PathBuf>> = DashMap::new();
    let (tx, rx) = channel::unbounded::<FileOutcome>();

    // Each country gets its own pool so a batch never oversubscribes.
    let pool = ThreadPoolBuilder::new()
        .num_threads(config.num_threads.unwrap_or(0))
        .build()?;

    pool.install(|| {
        work.par_iter().for_each_with(tx, |tx, (path, sheet)| {
            let result = process_file(path, sheet, &country, &search).and_then(|processed| {
                let rows = stage_sheet(config, &country, sheet, &processed, &staged)?;
                Ok((processed.year, rows))
            });

            let outcome = match result {
                Ok((year, rows)) => {
                    info!(file = %path.display(), sheet, year, rows, "processed");
                    FileOutcome::Processed {
                        path: (*path).clone(),
                        sheet: (*sheet).to_owned(),
                        year,
                        rows,
                    }
                }
                Err(err) => {
                    warn!(file = %path.display(), sheet, %err, "skipping file");
                    FileOutcome::Skipped {
                        path: (*path).clone(),
                        sheet: (*sheet).to_owned(),
                        reason: err.to_string(),
                    }
                }
            };
            // The receiver outlives the pool, so a send cannot fail here.
            let _ = tx.send(outcome);
        });
    });

    let mut outcomes: Vec<FileOutcome> = rx.iter().collect();
    for (old, new) in &superseded {
        warn!(file = %old.display(), replacement = %new.display(), "skipping superseded submission");
        let reason = format!("superseded by {}", new.display());
        outcomes.extend(sheet_names.iter().map(|sheet| FileOutcome::Skipped {
            path: old.clone(),
            sheet: (*sheet).to_owned(),
            reason: reason.clone(),
        }));
    }
    outcomes.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

    let mut report = CountryReport {
        country: country.clone(),
        outcomes,
        ..CountryReport::default()
    };

    let levels: BTreeMap<PartitionKey, Vec<PathBuf>> = staged.into_iter().collect();
    for (key, mut paths) in levels {
        paths.sort();
        paths.dedup();
        match combine_level(config, &country, key, &paths) {
            Ok((combined, gas_tables)) => {
                report.combined.push(combined);
                report.gas_tables.extend(gas_tables);
            }
            Err(err) => error!(country = %country, level = %key, %err, "combining level failed"),
        }
        if !config.keep_yearly {
            for path in &paths {
                if let Err(err) = fs::remove_file(path) {
                    warn!(file = %path.display(), %err, "could not remove staging artifact");
                }
            }
        }
    }

    info!(
        country = %country,
        processed = report.processed(),
        skipped = report.skipped(),
        levels = report.combined.len(),
        "country done"
    );
    Ok(report)
}

/// Concatenates the staged artifacts of one level (already sorted) and writes
/// the combined table, its CSV mirror and the per-gas pivots.
fn combine_level(
    config: &PipelineConfig,
    country: &str,
    key: PartitionKey,
    paths: &[PathBuf],
) -> Result<(PathBuf, Vec<PathBuf>)> {
    let frames = paths
        .iter()
        .map(|p| read_parquet(p))
        .collect::<Result<Vec<_>>>()?;
    let combined = Frame::concat(&frames)?;

    let path = combined_path(&config.output_root, country, key, "parquet");
    write_parquet(&combined, &path)?;
    if let Some(csv_root) = &config.csv_root {
        write_csv(&combined, &combined_path(csv_root, country, key, "csv"))?;
    }
    debug!(country, level = %key, files = paths.len(), rows = combined.height(), "combined level");

    let mut gas_tables = Vec::new();
    if config.pivot_gases {
        for gas in canonical_gases() {
            let Some(pivot) = pivot_gas(&combined, gas, PivotSpec::default())? else {
                continue;
            };
            if pivot.is_empty() {
                debug!(country, level = %key, gas, "no values for gas");
                continue;
            }
            let slug = gas_slug(gas);
            let wide = pivot.to_frame(YEAR_COLUMN)?;
            let gas_path = gas_level_path(&config.output_root, country, &slug, key, "parquet");
            write_parquet(&wide, &gas_path)?;
            if let Some(csv_root) = &config.csv_root {
                write_csv(&wide, &gas_level_path(csv_root, country, &slug, key, "csv"))?;
            }
            gas_tables.push(gas_path);
        }
    }
    Ok((path, gas_tables))
}

/// Processes every configured country folder under `input_root`.
///
/// A country that fails as a whole (unreadable folder, pool error) is logged
/// and left out of the result; the rest of the batch still runs.
pub fn run_batch(config: &PipelineConfig) -> Result<Vec<CountryReport>> {
    let dirs = list_country_dirs(&config.input_root)?;
    let selected: Vec<PathBuf> = dirs
        .into_iter()
        .filter(|d| {
            config.countries.is_empty()
                || config
                    .countries
                    .iter()
                    .any(|c| c.eq_ignore_ascii_case(&country_name(d)))
        })
        .collect();

    info!(
        input = %config.input_root.display(),
        output = %config.output_root.display(),
        countries = selected.len(),
        "starting batch"
    );

    let mut reports = Vec::with_capacity(selected.len());
    for dir in &selected {
        match process_country(config, dir, &config.sheets) {
            Ok(report) => reports.push(report),
            Err(err) => error!(country = %dir.display(), %err, "country failed"),
        }
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::{Level, LABEL_COLUMN, LEVEL_COLUMN};
    use pretty_assertions::assert_eq;

    fn raw_table() -> RawTable {
        RawTable {
            columns: vec![
                "GREENHOUSE GAS SOURCE AND SINK CATEGORIES".into(),
                "CO2".into(),
                "CH4".into(),
                "Notes".into(),
                "Unnamed: 4".into(),
            ],
            rows: vec![
                vec![Cell::text("Total national emissions"), Cell::Number(1000.0), Cell::Number(10.0), Cell::text("x"), Cell::Empty],
                vec![Cell::text("1 Energy"), Cell::Number(600.0), Cell::text("NO"), Cell::Empty, Cell::Empty],
                vec![Cell::text("Heading without values"), Cell::text("IE"), Cell::Empty, Cell::Empty, Cell::Empty],
                vec![Cell::text("1.A Fuel combustion"), Cell::text("400"), Cell::Empty, Cell::Empty, Cell::Empty],
            ],
        }
    }

    #[test]
    fn normalization_coerces_filters_and_tags() {
        let frame = normalize_table(raw_table(), "Summary2", "germany", 2021).unwrap();

        assert_eq!(
            frame.names().collect::<Vec<_>>(),
            vec![
                "GREENHOUSE GAS SOURCE AND SINK CATEGORIES",
                "CO₂ (kt)",
                "CH₄ (kt)",
                "Sheet",
                "Country",
                "Year"
            ]
        );
        assert_eq!(frame.height(), 3);
        assert_eq!(frame.float64("CO₂ (kt)").unwrap(), &[Some(1000.0), Some(600.0), Some(400.0)]);
        assert_eq!(frame.float64("CH₄ (kt)").unwrap(), &[Some(10.0), None, None]);
        assert_eq!(frame.utf8("Country").unwrap()[0].as_deref(), Some("GERMANY"));
        assert_eq!(frame.int32("Year").unwrap(), &[Some(2021); 3]);
    }

    #[test]
    fn missing_category_column_is_an_error() {
        let mut table = raw_table();
        table.columns[0] = "Something else".into();
        let err = normalize_table(table, "Summary2", "germany", 2021).unwrap_err();
        assert!(matches!(err, Error::CategoryColumnNotFound(_)));
    }

    #[test]
    fn normalized_table_levels_cleanly() {
        let frame = normalize_table(raw_table(), "Summary2", "germany", 2021).unwrap();
        let partitions = build_hierarchy(&frame).unwrap();
        let keys: Vec<PartitionKey> = partitions.iter().map(|p| p.key).collect();
        assert_eq!(
            keys,
            vec![
                PartitionKey::Level(Level::Total),
                PartitionKey::Level(Level::SECTOR),
                PartitionKey::Level(Level::SUBSECTOR)
            ]
        );
        let sector = &partitions[1].frame;
        assert_eq!(sector.utf8(LABEL_COLUMN).unwrap()[0].as_deref(), Some("Energy"));
        assert_eq!(sector.utf8(LEVEL_COLUMN).unwrap()[0].as_deref(), Some("Sector"));
    }

    #[test]
    fn artifact_paths_follow_the_layout() {
        let root = Path::new("out");
        assert_eq!(
            staging_path(root, "germany", PartitionKey::Level(Level::SECTOR), "DEU", "Summary2", 2021),
            PathBuf::from("out/germany/sectors/deu_Summary2_2021_sectors.parquet")
        );
        assert_eq!(
            combined_path(root, "germany", PartitionKey::Memo, "csv"),
            PathBuf::from("out/germany/memo_items/germany_memo_items_combined.csv")
        );
        assert_eq!(
            gas_level_path(root, "germany", "co2", PartitionKey::Level(Level::Total), "parquet"),
            PathBuf::from("out/germany/co2/total/germany_total_co2_combined.parquet")
        );
    }

    #[test]
    fn bad_filename_is_rejected_before_opening() {
        let err = process_file(
            Path::new("does-not-exist.xlsx"),
            "Summary2",
            "germany",
            &HeaderSearch::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnparsableFilename(_)));
    }

    #[test]
    fn resubmissions_keep_the_latest_per_year() {
        let files = vec![
            PathBuf::from("in/DEU-CRT-2025-V2.0-2021-20250301.xlsx"),
            PathBuf::from("in/notes.xlsx"),
            PathBuf::from("in/DEU-CRT-2025-V1.0-2022-20250101.xlsx"),
            PathBuf::from("in/DEU-CRT-2025-V1.0-2021-20250101.xlsx"),
        ];
        let (kept, superseded) = latest_submissions(files);
        assert_eq!(
            kept,
            vec![
                PathBuf::from("in/DEU-CRT-2025-V1.0-2022-20250101.xlsx"),
                PathBuf::from("in/DEU-CRT-2025-V2.0-2021-20250301.xlsx"),
                PathBuf::from("in/notes.xlsx"),
            ]
        );
        assert_eq!(
            superseded,
            vec![(
                PathBuf::from("in/DEU-CRT-2025-V1.0-2021-20250101.xlsx"),
                PathBuf::from("in/DEU-CRT-2025-V2.0-2021-20250301.xlsx"),
            )]
        );
    }

    #[test]
    fn failed_staging_publishes_and_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            output_root: dir.path().to_path_buf(),
            ..PipelineConfig::default()
        };
        let frame = normalize_table(raw_table(), "Summary2", "germany", 2021).unwrap();
        let processed = ProcessedSheet {
            country_code: "DEU".into(),
            year: 2021,
            partitions: build_hierarchy(&frame).unwrap(),
        };

        // A plain file where the sectors directory has to go.
        fs::create_dir_all(dir.path().join("germany")).unwrap();
        fs::write(dir.path().join("germany/sectors"), b"").unwrap();

        let staged = DashMap::new();
        assert!(stage_sheet(&config, "germany", "Summary2", &processed, &staged).is_err());
        assert!(staged.is_empty());
        let total = staging_path(
            dir.path(),
            "germany",
            PartitionKey::Level(Level::Total),
            "DEU",
            "Summary2",
            2021,
        );
        assert!(!total.exists());
    }

    #[test]
    fn workbooks_are_listed_sorted_without_lock_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.xlsx", "a.XLSX", "~$a.xlsx", "notes.txt"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        fs::create_dir(dir.path().join("sub.xlsx")).unwrap();

        let names: Vec<String> = list_workbooks(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.XLSX", "b.xlsx"]);
    }
}
