//! Climate-impact side datasets shown next to the inventory: EM-DAT extreme
//! weather events, Our World in Data global emissions and NASA GISS
//! temperature anomalies.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::ops::RangeInclusive;
use std::path::Path;

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::frame::{Column, ColumnData, Frame};
use crate::parquet::write_parquet;
use crate::pivot::YEAR_COLUMN;
use crate::sheet::{read_first_sheet, Cell, RawTable};

pub const DEFAULT_HAZARDS: &[&str] = &[
    "Wildfire",
    "Flood",
    "Drought",
    "Heatwave",
    "Extreme temperature",
    "Storm",
    "Mass movement (wet)",
];

const COUNTRY_RENAMES: &[(&str, &str)] = &[(
    "United Kingdom of Great Britain and Northern Ireland",
    "United Kingdom",
)];

const IMPACT_COLUMNS: [&str; 3] = ["Total Deaths", "Total Affected", "Total Damage ('000 US$)"];

pub const TEMPERATURE_ANOMALY_COLUMN: &str = "Temperature_Anomaly";

fn exact_column(columns: &[String], name: &str) -> Result<usize> {
    columns
        .iter()
        .position(|c| c.trim() == name)
        .ok_or_else(|| Error::MissingColumn(name.to_owned()))
}

// EM-DAT extreme weather

/// Sums deaths, affected people and damage per `(Country, Year, Disaster Type)`
/// for the given hazard types. Missing impact values count as zero; rows
/// without a start year are dropped.
pub fn summarize_extreme_weather<S: AsRef<str>>(table: &RawTable, hazards: &[S]) -> Result<Frame> {
    let country = exact_column(&table.columns, "Country")?;
    let disaster = exact_column(&table.columns, "Disaster Type")?;
    let start_year = exact_column(&table.columns, "Start Year")?;
    let impacts = IMPACT_COLUMNS
        .iter()
        .map(|name| exact_column(&table.columns, name))
        .collect::<Result<Vec<_>>>()?;

    let cell = |row: &Vec<Cell>, col: usize| row.get(col).cloned().unwrap_or_default();

    let mut groups: BTreeMap<(String, i32, String), [f64; 3]> = BTreeMap::new();
    let mut undated = 0usize;
    for row in &table.rows {
        let Some(kind) = cell(row, disaster).as_text() else {
            continue;
        };
        if !hazards.iter().any(|h| h.as_ref() == kind) {
            continue;
        }
        let Some(year) = cell(row, start_year).as_f64() else {
            undated += 1;
            continue;
        };
        let name = cell(row, country).as_text().unwrap_or_default();
        let name = COUNTRY_RENAMES
            .iter()
            .find(|(from, _)| *from == name)
            .map_or(name.clone(), |(_, to)| (*to).to_owned());

        let sums = groups.entry((name, year as i32, kind)).or_insert([0.0; 3]);
        for (sum, &col) in sums.iter_mut().zip(&impacts) {
            *sum += cell(row, col).as_f64().unwrap_or(0.0);
        }
    }
    if undated > 0 {
        warn!(rows = undated, "hazard rows without a start year dropped");
    }

    let mut countries = Vec::with_capacity(groups.len());
    let mut years = Vec::with_capacity(groups.len());
    let mut kinds = Vec::with_capacity(groups.len());
    let mut totals: [Vec<Option<f64>>; 3] = Default::default();
    for ((name, year, kind), sums) in groups {
        countries.push(Some(name));
        years.push(Some(year));
        kinds.push(Some(kind));
        for (column, value) in totals.iter_mut().zip(sums) {
            column.push(Some(value));
        }
    }

    let mut columns = vec![
        Column::new("Country", ColumnData::Utf8(countries)),
        Column::new(YEAR_COLUMN, ColumnData::Int32(years)),
        Column::new("Disaster Type", ColumnData::Utf8(kinds)),
    ];
    for (name, values) in IMPACT_COLUMNS.iter().zip(totals) {
        columns.push(Column::new(*name, ColumnData::Float64(values)));
    }
    Frame::new(columns)
}

// OWID global emissions

fn parse_f64(field: Option<&str>) -> Option<f64> {
    field?.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_year(field: Option<&str>) -> Option<i32> {
    let field = field?.trim();
    field
        .parse::<i32>()
        .ok()
        .or_else(|| field.parse::<f64>().ok().map(|y| y as i32))
}

/// World rows of the OWID CO₂ dataset: `Year`, `CO₂`, `CO₂_including_luc`
/// and `Total_ghg`, rows without a CO₂ value dropped.
pub fn global_emissions<R: Read>(reader: R) -> Result<Frame> {
    let mut csv = csv::Reader::from_reader(reader);
    let headers: Vec<String> = csv.headers()?.iter().map(str::to_owned).collect();
    let country = exact_column(&headers, "country")?;
    let year = exact_column(&headers, "year")?;
    let co2 = exact_column(&headers, "co2")?;
    let luc = exact_column(&headers, "co2_including_luc")?;
    let total = exact_column(&headers, "total_ghg")?;

    let (mut years, mut co2s, mut lucs, mut totals) = (Vec::new(), Vec::new(), Vec::new(), Vec::new());
    for record in csv.records() {
        let record = record?;
        if record.get(country) != Some("World") {
            continue;
        }
        let Some(value) = parse_f64(record.get(co2)) else {
            continue;
        };
        years.push(parse_year(record.get(year)));
        co2s.push(Some(value));
        lucs.push(parse_f64(record.get(luc)));
        totals.push(parse_f64(record.get(total)));
    }

    Frame::new(vec![
        Column::new(YEAR_COLUMN, ColumnData::Int32(years)),
        Column::new("CO₂", ColumnData::Float64(co2s)),
        Column::new("CO₂_including_luc", ColumnData::Float64(lucs)),
        Column::new("Total_ghg", ColumnData::Float64(totals)),
    ])
}

// GISS temperature anomalies

/// Annual (`J-D`) anomalies from a GISTEMP table for `years`. The first line
/// of the file is a title and is skipped; `***` marks a missing value.
pub fn temperature_anomalies<R: Read>(reader: R, years: RangeInclusive<i32>) -> Result<Frame> {
    let mut reader = BufReader::new(reader);
    let mut title = String::new();
    reader.read_line(&mut title)?;

    let mut csv = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers: Vec<String> = csv.headers()?.iter().map(str::to_owned).collect();
    let year_col = exact_column(&headers, "Year")?;
    let annual = exact_column(&headers, "J-D")?;

    let (mut out_years, mut anomalies) = (Vec::new(), Vec::new());
    for record in csv.records() {
        let record = record?;
        let Some(year) = parse_year(record.get(year_col)) else {
            continue;
        };
        if !years.contains(&year) {
            continue;
        }
        out_years.push(Some(year));
        anomalies.push(parse_f64(record.get(annual)));
    }

    Frame::new(vec![
        Column::new(YEAR_COLUMN, ColumnData::Int32(out_years)),
        Column::new(TEMPERATURE_ANOMALY_COLUMN, ColumnData::Float64(anomalies)),
    ])
}

// File wrappers

fn finish(frame: Frame, output: Option<&Path>, dataset: &str) -> Result<Frame> {
    if let Some(output) = output {
        write_parquet(&frame, output)?;
        info!(dataset, rows = frame.height(), path = %output.display(), "saved");
    }
    Ok(frame)
}

pub fn process_extreme_weather<S: AsRef<str>>(
    input: &Path,
    output: Option<&Path>,
    hazards: &[S],
) -> Result<Frame> {
    let table = read_first_sheet(input)?.into_table(0);
    let summary = summarize_extreme_weather(&table, hazards)?;
    finish(summary, output, "extreme weather")
}

pub fn process_global_emissions(input: &Path, output: Option<&Path>) -> Result<Frame> {
    let frame = global_emissions(File::open(input)?)?;
    finish(frame, output, "global emissions")
}

pub fn process_temperature_anomalies(
    input: &Path,
    output: Option<&Path>,
    years: RangeInclusive<i32>,
) -> Result<Frame> {
    let frame = temperature_anomalies(File::open(input)?, years)?;
    finish(frame, output, "temperature anomalies")
}
