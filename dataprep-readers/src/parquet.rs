//! Schema extraction from Parquet footers

use std::fs::File;
use std::io::Read;
use std::path::Path;

use parquet::basic::{ConvertedType, LogicalType, Type as PhysicalType};
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::schema::types::Type as SchemaType;

use dataprep_core::{ColumnType, Field, Schema};

use crate::error::{Error, Result};

const PARQUET_MAGIC: &[u8; 4] = b"PAR1";

/// Read the schema of a Parquet file from its footer. No row group is
/// decoded.
pub fn read_schema(path: &Path) -> Result<Schema> {
    let parquet_error = |message: String| Error::Parquet {
        path: path.to_path_buf(),
        message,
    };

    let mut file = File::open(path).map_err(|e| parquet_error(e.to_string()))?;
    let mut magic = [0u8; 4];
    if file.read_exact(&mut magic).is_err() || &magic != PARQUET_MAGIC {
        return Err(Error::Format(format!("{} is not a Parquet file", path.display())));
    }

    let reader = SerializedFileReader::new(file).map_err(|e| parquet_error(e.to_string()))?;
    let metadata = reader.metadata().file_metadata();
    let root = metadata.schema_descr().root_schema();

    let fields = root
        .get_fields()
        .iter()
        .map(|field| {
            convert_field(field).map_err(|reason| {
                Error::Format(format!("{}: column '{}' {reason}", path.display(), field.name()))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Schema::new(fields)?)
}

fn convert_field(field: &SchemaType) -> std::result::Result<Field, &'static str> {
    if !field.is_primitive() {
        return Err("is nested, which is not supported");
    }

    let info = field.get_basic_info();
    let logical = info.logical_type();
    let converted = info.converted_type();

    let column_type = match field.get_physical_type() {
        PhysicalType::BOOLEAN => ColumnType::Boolean,
        PhysicalType::INT32 | PhysicalType::INT64 => match (logical, converted) {
            (Some(LogicalType::Date), _) | (_, ConvertedType::DATE) => ColumnType::Date,
            (Some(LogicalType::Timestamp { .. }), _)
            | (_, ConvertedType::TIMESTAMP_MILLIS | ConvertedType::TIMESTAMP_MICROS) => ColumnType::Timestamp,
            (Some(LogicalType::Decimal { .. }), _) | (_, ConvertedType::DECIMAL) => ColumnType::Float,
            (Some(LogicalType::Time { .. }), _) | (_, ConvertedType::TIME_MILLIS | ConvertedType::TIME_MICROS) => {
                ColumnType::String
            }
            _ => ColumnType::Integer,
        },
        PhysicalType::INT96 => ColumnType::Timestamp,
        PhysicalType::FLOAT | PhysicalType::DOUBLE => ColumnType::Float,
        PhysicalType::BYTE_ARRAY | PhysicalType::FIXED_LEN_BYTE_ARRAY => match (logical, converted) {
            (Some(LogicalType::String | LogicalType::Enum | LogicalType::Json), _)
            | (_, ConvertedType::UTF8 | ConvertedType::ENUM | ConvertedType::JSON) => ColumnType::String,
            (Some(LogicalType::Decimal { .. }), _) | (_, ConvertedType::DECIMAL) => ColumnType::Float,
            _ => return Err("holds raw binary, which is not supported"),
        },
    };

    Ok(Field::new(field.name(), column_type))
}
