//! Normalization of UNFCCC CRT greenhouse-gas inventory workbooks.
//!
//! Workbooks are read with calamine, their two-row headers detected and
//! flattened, category labels parsed into an outline hierarchy and the rows
//! split into one table per level. Tables are written as parquet through
//! arrow2, combined per country across years and optionally pivoted per gas.
//! [`store::DatasetStore`] is the read side used by the dashboard.

pub mod arrow_converter;
pub mod cache;
pub mod category;
pub mod climate;
pub mod config;
pub mod error;
pub mod frame;
pub mod gases;
pub mod header;
pub mod hierarchy;
pub mod log;
pub mod parquet;
pub mod pivot;
pub mod processor;
pub mod sheet;
pub mod store;

pub use error::{Error, Result};
pub use frame::Frame;
