use std::sync::Arc;

use arrow::array::{
    ArrayRef, BinaryArray, BooleanArray, Int16Array, Int32Array, Int64Array, Int8Array, StringArray, UInt16Array,
    UInt32Array, UInt64Array, UInt8Array,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, GzipLevel};
use parquet::file::properties::WriterProperties;
use parquet::schema::types::ColumnPath;
use serde::Deserialize;

use crate::error::job::announcer::AnnouncerError;
use crate::types::announcement::{Announcement, ColumnValue};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ColumnType {
    Boolean,
    Int32,
    Int64,
    ByteArray,
    String,
    Integer { bit_width: u8, sign: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ColumnCompression {
    Uncompressed,
    Snappy,
    Gzip,
}

impl From<ColumnCompression> for Compression {
    fn from(compression: ColumnCompression) -> Self {
        match compression {
            ColumnCompression::Uncompressed => Compression::UNCOMPRESSED,
            ColumnCompression::Snappy => Compression::SNAPPY,
            ColumnCompression::Gzip => Compression::GZIP(GzipLevel::default()),
        }
    }
}

/// One column of a DSNP parquet schema model
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ParquetColumn {
    pub name: String,
    pub column_type: ColumnType,
    pub compression: ColumnCompression,
    pub bloom_filter: bool,
}

/// Column layout of a batch file, as registered on chain
#[derive(Debug, Clone)]
pub struct ParquetModel {
    columns: Vec<ParquetColumn>,
    schema: SchemaRef,
}

impl ParquetModel {
    pub fn parse(schema_id: u16, model: &str) -> Result<Self, AnnouncerError> {
        let columns: Vec<ParquetColumn> = serde_json::from_str(model)
            .map_err(|e| AnnouncerError::InvalidSchemaModel { schema_id, message: e.to_string() })?;
        if columns.is_empty() {
            return Err(AnnouncerError::InvalidSchemaModel { schema_id, message: "model has no columns".into() });
        }

        let fields = columns
            .iter()
            .map(|column| Ok(Field::new(&column.name, arrow_type(schema_id, &column.column_type)?, false)))
            .collect::<Result<Vec<_>, AnnouncerError>>()?;

        Ok(Self { columns, schema: Arc::new(Schema::new(fields)) })
    }

    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    pub fn writer_properties(&self) -> WriterProperties {
        self.columns
            .iter()
            .fold(WriterProperties::builder(), |builder, column| {
                let path = ColumnPath::from(column.name.as_str());
                builder
                    .set_column_compression(path.clone(), column.compression.into())
                    .set_column_bloom_filter_enabled(path, column.bloom_filter)
            })
            .build()
    }

    /// Encodes `announcements` as one parquet file, rows in the given order
    pub fn encode(&self, announcements: &[Announcement]) -> Result<Vec<u8>, AnnouncerError> {
        let arrays = self
            .schema
            .fields()
            .iter()
            .map(|field| column_array(field, announcements))
            .collect::<Result<Vec<_>, _>>()?;
        let batch = RecordBatch::try_new(self.schema.clone(), arrays)?;

        let mut writer = ArrowWriter::try_new(Vec::new(), self.schema.clone(), Some(self.writer_properties()))?;
        writer.write(&batch)?;
        Ok(writer.into_inner()?)
    }
}

fn arrow_type(schema_id: u16, column_type: &ColumnType) -> Result<DataType, AnnouncerError> {
    Ok(match column_type {
        ColumnType::Boolean => DataType::Boolean,
        ColumnType::Int32 => DataType::Int32,
        ColumnType::Int64 => DataType::Int64,
        ColumnType::ByteArray => DataType::Binary,
        ColumnType::String => DataType::Utf8,
        ColumnType::Integer { bit_width, sign: true } => match bit_width {
            8 => DataType::Int8,
            16 => DataType::Int16,
            32 => DataType::Int32,
            64 => DataType::Int64,
            other => return Err(invalid_width(schema_id, *other)),
        },
        ColumnType::Integer { bit_width, sign: false } => match bit_width {
            8 => DataType::UInt8,
            16 => DataType::UInt16,
            32 => DataType::UInt32,
            64 => DataType::UInt64,
            other => return Err(invalid_width(schema_id, *other)),
        },
    })
}

fn invalid_width(schema_id: u16, bit_width: u8) -> AnnouncerError {
    AnnouncerError::InvalidSchemaModel { schema_id, message: format!("unsupported integer bit width {}", bit_width) }
}

fn column_array(field: &Field, announcements: &[Announcement]) -> Result<ArrayRef, AnnouncerError> {
    let column = field.name();
    let values = announcements
        .iter()
        .map(|announcement| {
            announcement.column(column).ok_or_else(|| AnnouncerError::MissingColumn { column: column.clone() })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(match field.data_type() {
        DataType::Boolean => Arc::new(BooleanArray::from(booleans(column, &values)?)),
        DataType::Utf8 => Arc::new(StringArray::from_iter_values(texts(column, &values)?)),
        DataType::Binary => Arc::new(BinaryArray::from_iter_values(texts(column, &values)?.into_iter().map(str::as_bytes))),
        DataType::Int8 => Arc::new(Int8Array::from(integers::<i8>(column, &values)?)),
        DataType::Int16 => Arc::new(Int16Array::from(integers::<i16>(column, &values)?)),
        DataType::Int32 => Arc::new(Int32Array::from(integers::<i32>(column, &values)?)),
        DataType::Int64 => Arc::new(Int64Array::from(integers::<i64>(column, &values)?)),
        DataType::UInt8 => Arc::new(UInt8Array::from(integers::<u8>(column, &values)?)),
        DataType::UInt16 => Arc::new(UInt16Array::from(integers::<u16>(column, &values)?)),
        DataType::UInt32 => Arc::new(UInt32Array::from(integers::<u32>(column, &values)?)),
        DataType::UInt64 => Arc::new(UInt64Array::from(integers::<u64>(column, &values)?)),
        other => return Err(mismatch(column, &other.to_string())),
    })
}

fn mismatch(column: &str, expected: &str) -> AnnouncerError {
    AnnouncerError::TypeMismatch { column: column.to_string(), expected: expected.to_string() }
}

fn texts<'a>(column: &str, values: &'a [ColumnValue]) -> Result<Vec<&'a str>, AnnouncerError> {
    values
        .iter()
        .map(|value| match value {
            ColumnValue::Text(text) => Ok(text.as_str()),
            _ => Err(mismatch(column, "text")),
        })
        .collect()
}

fn booleans(column: &str, values: &[ColumnValue]) -> Result<Vec<bool>, AnnouncerError> {
    values
        .iter()
        .map(|value| match value {
            ColumnValue::Bool(flag) => Ok(*flag),
            _ => Err(mismatch(column, "boolean")),
        })
        .collect()
}

fn integers<T>(column: &str, values: &[ColumnValue]) -> Result<Vec<T>, AnnouncerError>
where
    T: TryFrom<i64> + TryFrom<u64>,
{
    let expected = std::any::type_name::<T>();
    values
        .iter()
        .map(|value| match value {
            ColumnValue::Int(int) => T::try_from(*int).map_err(|_| mismatch(column, expected)),
            ColumnValue::UInt(uint) => T::try_from(*uint).map_err(|_| mismatch(column, expected)),
            _ => Err(mismatch(column, expected)),
        })
        .collect()
}
