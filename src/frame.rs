use std::fmt;

use ahash::AHashSet;

use crate::error::{Error, Result};

/// Column storage. Every artifact the pipeline writes is made of these four.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Utf8(Vec<Option<String>>),
    Int32(Vec<Option<i32>>),
    Float64(Vec<Option<f64>>),
    Boolean(Vec<Option<bool>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Utf8(v) => v.len(),
            ColumnData::Int32(v) => v.len(),
            ColumnData::Float64(v) => v.len(),
            ColumnData::Boolean(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ColumnData::Utf8(_) => "utf8",
            ColumnData::Int32(_) => "int32",
            ColumnData::Float64(_) => "float64",
            ColumnData::Boolean(_) => "boolean",
        }
    }

    /// An all-null column of the same type.
    fn nulls_like(&self, len: usize) -> Self {
        match self {
            ColumnData::Utf8(_) => ColumnData::Utf8(vec![None; len]),
            ColumnData::Int32(_) => ColumnData::Int32(vec![None; len]),
            ColumnData::Float64(_) => ColumnData::Float64(vec![None; len]),
            ColumnData::Boolean(_) => ColumnData::Boolean(vec![None; len]),
        }
    }

    fn take(&self, indices: &[usize]) -> Self {
        fn pick<T: Clone>(v: &[Option<T>], indices: &[usize]) -> Vec<Option<T>> {
            indices.iter().map(|&i| v.get(i).cloned().flatten()).collect()
        }
        match self {
            ColumnData::Utf8(v) => ColumnData::Utf8(pick(v, indices)),
            ColumnData::Int32(v) => ColumnData::Int32(pick(v, indices)),
            ColumnData::Float64(v) => ColumnData::Float64(pick(v, indices)),
            ColumnData::Boolean(v) => ColumnData::Boolean(pick(v, indices)),
        }
    }

    fn extend(&mut self, name: &str, other: &ColumnData) -> Result<()> {
        match (self, other) {
            (ColumnData::Utf8(a), ColumnData::Utf8(b)) => a.extend_from_slice(b),
            (ColumnData::Int32(a), ColumnData::Int32(b)) => a.extend_from_slice(b),
            (ColumnData::Float64(a), ColumnData::Float64(b)) => a.extend_from_slice(b),
            (ColumnData::Boolean(a), ColumnData::Boolean(b)) => a.extend_from_slice(b),
            (a, b) => {
                return Err(Error::ColumnType {
                    name: name.to_owned(),
                    expected: a.type_name(),
                    actual: b.type_name(),
                })
            }
        }
        Ok(())
    }

    fn display(&self, row: usize) -> String {
        match self {
            ColumnData::Utf8(v) => v.get(row).cloned().flatten().unwrap_or_default(),
            ColumnData::Int32(v) => v.get(row).copied().flatten().map(|x| x.to_string()).unwrap_or_default(),
            ColumnData::Float64(v) => v.get(row).copied().flatten().map(|x| x.to_string()).unwrap_or_default(),
            ColumnData::Boolean(v) => v.get(row).copied().flatten().map(|x| x.to_string()).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

/// A small column-oriented table with unique column names.
///
/// Normalized sheets, level partitions, combined time series and gas pivots
/// are all frames; `arrow_converter` maps them onto arrow2 chunks for parquet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    columns: Vec<Column>,
    height: usize,
}

impl Frame {
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let mut frame = Frame::default();
        for column in columns {
            frame.push_column(column)?;
        }
        Ok(frame)
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.height == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn push_column(&mut self, column: Column) -> Result<()> {
        if self.column(&column.name).is_some() {
            return Err(Error::DuplicateColumn(column.name));
        }
        if !self.columns.is_empty() && column.data.len() != self.height {
            return Err(Error::ColumnLength {
                name: column.name,
                expected: self.height,
                actual: column.data.len(),
            });
        }
        self.height = column.data.len();
        self.columns.push(column);
        Ok(())
    }

    /// Sets a column to the same value on every row, replacing it if present.
    pub fn set_utf8_constant(&mut self, name: &str, value: &str) {
        let data = ColumnData::Utf8(vec![Some(value.to_owned()); self.height]);
        match self.columns.iter_mut().find(|c| c.name == name) {
            Some(column) => column.data = data,
            None => self.columns.push(Column::new(name, data)),
        }
    }

    pub fn utf8(&self, name: &str) -> Result<&[Option<String>]> {
        match &self.require(name)?.data {
            ColumnData::Utf8(v) => Ok(v),
            other => Err(type_error(name, "utf8", other)),
        }
    }

    pub fn int32(&self, name: &str) -> Result<&[Option<i32>]> {
        match &self.require(name)?.data {
            ColumnData::Int32(v) => Ok(v),
            other => Err(type_error(name, "int32", other)),
        }
    }

    pub fn float64(&self, name: &str) -> Result<&[Option<f64>]> {
        match &self.require(name)?.data {
            ColumnData::Float64(v) => Ok(v),
            other => Err(type_error(name, "float64", other)),
        }
    }

    pub fn boolean(&self, name: &str) -> Result<&[Option<bool>]> {
        match &self.require(name)?.data {
            ColumnData::Boolean(v) => Ok(v),
            other => Err(type_error(name, "boolean", other)),
        }
    }

    fn require(&self, name: &str) -> Result<&Column> {
        self.column(name)
            .ok_or_else(|| Error::MissingColumn(name.to_owned()))
    }

    /// Rows at `indices`, in that order.
    pub fn take(&self, indices: &[usize]) -> Frame {
        Frame {
            columns: self
                .columns
                .iter()
                .map(|c| Column::new(c.name.clone(), c.data.take(indices)))
                .collect(),
            height: indices.len(),
        }
    }

    pub fn filter(&self, mask: &[bool]) -> Frame {
        let indices: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(i, keep)| keep.then_some(i))
            .collect();
        self.take(&indices)
    }

    pub fn head(&self, n: usize) -> Frame {
        let indices: Vec<usize> = (0..self.height.min(n)).collect();
        self.take(&indices)
    }

    /// Stacks frames vertically over the union of their columns.
    ///
    /// Column order follows first appearance; a column missing from one frame
    /// is null-filled for that frame's rows.
    pub fn concat(frames: &[Frame]) -> Result<Frame> {
        let mut out = Frame::default();
        for frame in frames {
            out.append(frame)?;
        }
        Ok(out)
    }

    fn append(&mut self, other: &Frame) -> Result<()> {
        let before = self.height;
        let mut touched: AHashSet<usize> = AHashSet::with_capacity(other.width());

        for column in &other.columns {
            match self.columns.iter().position(|c| c.name == column.name) {
                Some(i) => {
                    self.columns[i].data.extend(&column.name, &column.data)?;
                    touched.insert(i);
                }
                None => {
                    let mut data = column.data.nulls_like(before);
                    data.extend(&column.name, &column.data)?;
                    touched.insert(self.columns.len());
                    self.columns.push(Column::new(column.name.clone(), data));
                }
            }
        }

        for (i, column) in self.columns.iter_mut().enumerate() {
            if !touched.contains(&i) {
                let pad = column.data.nulls_like(other.height);
                column.data.extend(&column.name.clone(), &pad)?;
            }
        }
        self.height = before + other.height;
        Ok(())
    }
}

fn type_error(name: &str, expected: &'static str, actual: &ColumnData) -> Error {
    Error::ColumnType {
        name: name.to_owned(),
        expected,
        actual: actual.type_name(),
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.names().collect::<Vec<_>>().join("\t"))?;
        for row in 0..self.height {
            let cells: Vec<String> = self.columns.iter().map(|c| c.data.display(row)).collect();
            writeln!(f, "{}", cells.join("\t"))?;
        }
        write!(f, "[{} rows x {} columns]", self.height, self.width())
    }
}
