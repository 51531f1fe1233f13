use std::path::PathBuf;

use thiserror::Error;

/// Everything that can go wrong while normalizing or storing inventory tables.
///
/// The first group of variants is fatal to a single workbook only: the sheet
/// processor turns them into a skipped-file entry and moves on.
#[derive(Debug, Error)]
pub enum Error {
    #[error("no header row detected within the first {lookahead} rows")]
    HeaderNotFound { lookahead: usize },

    #[error("category column containing {0:?} not found")]
    CategoryColumnNotFound(String),

    #[error("filename {0:?} does not follow the CRT naming convention")]
    UnparsableFilename(String),

    #[error("category path depth {depth} exceeds the supported maximum of {max}")]
    DepthExceeded { depth: usize, max: usize },

    #[error("cannot read sheet {sheet:?} from {}: {source}", path.display())]
    Workbook {
        path: PathBuf,
        sheet: String,
        #[source]
        source: calamine::Error,
    },

    #[error("workbook {} has no sheets", .0.display())]
    EmptyWorkbook(PathBuf),

    #[error("column {0:?} not found")]
    MissingColumn(String),

    #[error("column {name:?} has type {actual}, expected {expected}")]
    ColumnType {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("column {name:?} has {actual} rows, table has {expected}")]
    ColumnLength {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("duplicate column {0:?}")]
    DuplicateColumn(String),

    #[error("unsupported arrow type {data_type} in column {name:?}")]
    UnsupportedArrowType { name: String, data_type: String },

    #[error(transparent)]
    Arrow(#[from] arrow2::error::Error),

    #[error(transparent)]
    Parquet(#[from] parquet2::error::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
