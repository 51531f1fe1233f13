use arrow2::array::{
    Array, BooleanArray, MutableBooleanArray, MutablePrimitiveArray, MutableUtf8Array, PrimitiveArray,
    Utf8Array,
};
use arrow2::chunk::Chunk;
use arrow2::datatypes::{DataType, Field, Schema};

use crate::error::{Error, Result};
use crate::frame::{Column, ColumnData, Frame};

fn data_type(data: &ColumnData) -> DataType {
    match data {
        ColumnData::Utf8(_) => DataType::Utf8,
        ColumnData::Int32(_) => DataType::Int32,
        ColumnData::Float64(_) => DataType::Float64,
        ColumnData::Boolean(_) => DataType::Boolean,
    }
}

pub fn to_schema(frame: &Frame) -> Schema {
    Schema::from(
        frame
            .columns()
            .iter()
            .map(|c| Field::new(c.name.clone(), data_type(&c.data), true))
            .collect::<Vec<_>>(),
    )
}

/// Converts a frame into an arrow2 schema and a single chunk.
pub fn to_chunk(frame: &Frame) -> Result<(Schema, Chunk<Box<dyn Array>>)> {
    // ---- UTF8 builder ----
    macro_rules! build_utf8 {
        ($values:expr) => {{
            let mut col = MutableUtf8Array::<i32>::with_capacity($values.len());
            for v in $values {
                col.push(v.as_deref());
            }
            let array: Utf8Array<i32> = col.into();
            array.boxed()
        }};
    }

    // ---- Primitive / boolean builders ----
    macro_rules! build_prim {
        ($values:expr, $builder:ty, $array:ty) => {{
            let mut col = <$builder>::with_capacity($values.len());
            for v in $values {
                col.push(*v);
            }
            let array: $array = col.into();
            array.boxed()
        }};
    }

    let arrays: Vec<Box<dyn Array>> = frame
        .columns()
        .iter()
        .map(|c| match &c.data {
            ColumnData::Utf8(v) => build_utf8!(v),
            ColumnData::Int32(v) => build_prim!(v, MutablePrimitiveArray<i32>, PrimitiveArray<i32>),
            ColumnData::Float64(v) => build_prim!(v, MutablePrimitiveArray<f64>, PrimitiveArray<f64>),
            ColumnData::Boolean(v) => build_prim!(v, MutableBooleanArray, BooleanArray),
        })
        .collect();

    Ok((to_schema(frame), Chunk::try_new(arrays)?))
}

// arrow2 -> Frame

fn downcast<'a, T: 'static>(array: &'a dyn Array, field: &Field) -> Result<&'a T> {
    array
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| Error::UnsupportedArrowType {
            name: field.name.clone(),
            data_type: format!("{:?}", array.data_type()),
        })
}

fn read_column(field: &Field, chunks: &[Chunk<Box<dyn Array>>], index: usize) -> Result<ColumnData> {
    let arrays = chunks.iter().map(|chunk| chunk.arrays()[index].as_ref());

    let data = match field.data_type {
        DataType::Utf8 => {
            let mut out = Vec::new();
            for array in arrays {
                let array = downcast::<Utf8Array<i32>>(array, field)?;
                out.extend(array.iter().map(|v| v.map(str::to_owned)));
            }
            ColumnData::Utf8(out)
        }
        DataType::LargeUtf8 => {
            let mut out = Vec::new();
            for array in arrays {
                let array = downcast::<Utf8Array<i64>>(array, field)?;
                out.extend(array.iter().map(|v| v.map(str::to_owned)));
            }
            ColumnData::Utf8(out)
        }
        DataType::Int32 => {
            let mut out = Vec::new();
            for array in arrays {
                let array = downcast::<PrimitiveArray<i32>>(array, field)?;
                out.extend(array.iter().map(|v| v.copied()));
            }
            ColumnData::Int32(out)
        }
        DataType::Float64 => {
            let mut out = Vec::new();
            for array in arrays {
                let array = downcast::<PrimitiveArray<f64>>(array, field)?;
                out.extend(array.iter().map(|v| v.copied()));
            }
            ColumnData::Float64(out)
        }
        DataType::Boolean => {
            let mut out = Vec::new();
            for array in arrays {
                let array = downcast::<BooleanArray>(array, field)?;
                out.extend(array.iter());
            }
            ColumnData::Boolean(out)
        }
        ref other => {
            return Err(Error::UnsupportedArrowType {
                name: field.name.clone(),
                data_type: format!("{other:?}"),
            })
        }
    };
    Ok(data)
}

/// Rebuilds a frame from the chunks of one file, concatenating chunks in order.
pub fn from_chunks(schema: &Schema, chunks: &[Chunk<Box<dyn Array>>]) -> Result<Frame> {
    let columns = schema
        .fields
        .iter()
        .enumerate()
        .map(|(i, field)| Ok(Column::new(field.name.clone(), read_column(field, chunks, i)?)))
        .collect::<Result<Vec<_>>>()?;
    Frame::new(columns)
}
