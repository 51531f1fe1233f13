use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use arrow2::io::parquet::read;
use arrow2::io::parquet::write::{
    transverse, CompressionOptions, Encoding, FileWriter, RowGroupIterator, Version, WriteOptions,
};
use tracing::debug;

use crate::arrow_converter::{from_chunks, to_chunk};
use crate::error::Result;
use crate::frame::{ColumnData, Frame};

static WRITE_OPTIONS: WriteOptions = WriteOptions {
    write_statistics: true,
    compression: CompressionOptions::Snappy,
    version: Version::V2,
    data_pagesize_limit: None,
};

/// Writes a frame as a single-row-group parquet file, creating parent dirs.
pub fn write_parquet(frame: &Frame, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }

    // Convert Frame → arrow2 schema + chunk
    let (schema, chunk) = to_chunk(frame)?;
    let encodings = schema
        .fields
        .iter()
        .map(|f| transverse(&f.data_type, |_| Encoding::Plain))
        .collect();

    let row_groups =
        RowGroupIterator::try_new(std::iter::once(Ok(chunk)), &schema, WRITE_OPTIONS, encodings)?;

    let file = File::create(path)?;
    let mut writer = FileWriter::try_new(file, schema, WRITE_OPTIONS)?;
    for group in row_groups {
        writer.write(group?)?;
    }
    writer.end(None)?;

    debug!(path = %path.display(), rows = frame.height(), "wrote parquet");
    Ok(())
}

pub fn read_parquet(path: &Path) -> Result<Frame> {
    let mut file = File::open(path)?;
    let metadata = read::read_metadata(&mut file)?;
    let schema = read::infer_schema(&metadata)?;
    let reader = read::FileReader::new(file, metadata.row_groups, schema.clone(), None, None, None);
    let chunks = reader.collect::<std::result::Result<Vec<_>, _>>()?;
    from_chunks(&schema, &chunks)
}

/// Row count from the footer alone, without decoding any column.
pub fn parquet_row_count(path: &Path) -> Result<usize> {
    let mut file = File::open(path)?;
    let metadata = parquet2::read::read_metadata(&mut file)?;
    Ok(metadata.num_rows)
}

/// Plain-text mirror of an artifact for human inspection.
pub fn write_csv(frame: &Frame, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let mut writer = csv::Writer::from_writer(BufWriter::new(File::create(path)?));
    writer.write_record(frame.names())?;

    for row in 0..frame.height() {
        let record = frame.columns().iter().map(|c| match &c.data {
            ColumnData::Utf8(v) => v[row].clone().unwrap_or_default(),
            ColumnData::Int32(v) => v[row].map(|x| x.to_string()).unwrap_or_default(),
            ColumnData::Float64(v) => v[row].map(|x| x.to_string()).unwrap_or_default(),
            ColumnData::Boolean(v) => v[row].map(|x| x.to_string()).unwrap_or_default(),
        });
        writer.write_record(record)?;
    }
    writer.flush()?;
    Ok(())
}
