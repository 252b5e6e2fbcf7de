use arrow::util::display::array_value_to_string;
use arrow_array::cast::AsArray;
use arrow_array::types::{
    Float32Type, Float64Type, Int16Type, Int32Type, Int64Type, Int8Type, UInt16Type, UInt32Type,
    UInt64Type, UInt8Type,
};
use arrow_array::{Array, RecordBatch};
use arrow_schema::{ArrowError, DataType};
use argo_types::{ResultSet, Value};

/// Single cell as a [`Value`]. Types without a direct mapping fall back to Arrow's
/// display formatting.
pub(crate) fn cell_value(array: &dyn Array, row: usize) -> Result<Value, ArrowError> {
    if array.is_null(row) {
        return Ok(Value::Null);
    }
    let v = match array.data_type() {
        DataType::Boolean => Value::Bool(array.as_boolean().value(row)),
        DataType::Int8 => Value::Int(array.as_primitive::<Int8Type>().value(row).into()),
        DataType::Int16 => Value::Int(array.as_primitive::<Int16Type>().value(row).into()),
        DataType::Int32 => Value::Int(array.as_primitive::<Int32Type>().value(row).into()),
        DataType::Int64 => Value::Int(array.as_primitive::<Int64Type>().value(row)),
        DataType::UInt8 => Value::Int(array.as_primitive::<UInt8Type>().value(row).into()),
        DataType::UInt16 => Value::Int(array.as_primitive::<UInt16Type>().value(row).into()),
        DataType::UInt32 => Value::Int(array.as_primitive::<UInt32Type>().value(row).into()),
        DataType::UInt64 => {
            let x = array.as_primitive::<UInt64Type>().value(row);
            i64::try_from(x).map_or(Value::Float(x as f64), Value::Int)
        }
        DataType::Float32 => Value::Float(array.as_primitive::<Float32Type>().value(row).into()),
        DataType::Float64 => Value::Float(array.as_primitive::<Float64Type>().value(row)),
        DataType::Utf8 => Value::Text(array.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => Value::Text(array.as_string::<i64>().value(row).to_string()),
        _ => Value::Text(array_value_to_string(array, row)?),
    };
    Ok(v)
}

/// Flatten collected batches into one row-oriented result.
pub(crate) fn batches_to_result_set(
    columns: Vec<String>,
    batches: &[RecordBatch],
) -> Result<ResultSet, ArrowError> {
    let mut result = ResultSet::new(columns);
    for batch in batches {
        for row in 0..batch.num_rows() {
            let cells = batch
                .columns()
                .iter()
                .map(|col| cell_value(col.as_ref(), row))
                .collect::<Result<Vec<_>, _>>()?;
            result.push_row(cells);
        }
    }
    Ok(result)
}
