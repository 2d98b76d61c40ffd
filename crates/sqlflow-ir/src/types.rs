//! Type system for resolved columns

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    // Primitives
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Decimal { precision: u8, scale: u8 },

    // Text
    String,
    Varchar(Option<u32>),

    // Binary
    Blob,

    // Temporal
    Date,
    Time,
    Timestamp,

    // Special
    Unknown,
}

impl DataType {
    /// Normalize a database-native type name such as `VARCHAR(255)`,
    /// `bigint unsigned` or `DECIMAL(10,2)`.
    pub fn from_native(native: &str) -> DataType {
        let upper = native.trim().to_ascii_uppercase();
        let upper = upper
            .strip_suffix("UNSIGNED")
            .map(str::trim_end)
            .unwrap_or(&upper);

        let (base, args) = match upper.split_once('(') {
            Some((base, rest)) => (base.trim(), rest.trim_end_matches(')')),
            None => (upper, ""),
        };
        let mut args = args.split(',').filter_map(|a| a.trim().parse::<u32>().ok());

        match base {
            "BOOL" | "BOOLEAN" => DataType::Bool,
            "TINYINT" => DataType::Int8,
            "SMALLINT" => DataType::Int16,
            "INT" | "INTEGER" | "MEDIUMINT" => DataType::Int32,
            "BIGINT" => DataType::Int64,
            "FLOAT" | "REAL" => DataType::Float32,
            "DOUBLE" | "DOUBLE PRECISION" => DataType::Float64,
            "DECIMAL" | "NUMERIC" => DataType::Decimal {
                precision: args.next().map_or(10, |p| p.min(u8::MAX as u32) as u8),
                scale: args.next().map_or(0, |s| s.min(u8::MAX as u32) as u8),
            },
            "VARCHAR" | "NVARCHAR" | "CHAR" | "NCHAR" => DataType::Varchar(args.next()),
            "TEXT" | "STRING" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT" => DataType::String,
            "BLOB" | "BINARY" | "VARBINARY" | "LONGBLOB" => DataType::Blob,
            "DATE" => DataType::Date,
            "TIME" => DataType::Time,
            "DATETIME" | "TIMESTAMP" => DataType::Timestamp,
            _ => DataType::Unknown,
        }
    }

    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            DataType::Bool | DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64
        )
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integral()
            || matches!(self, DataType::Float32 | DataType::Float64 | DataType::Decimal { .. })
    }

    pub fn is_string(&self) -> bool {
        matches!(self, DataType::String | DataType::Varchar(_))
    }

    /// Tensor dtype a submitter program reads this column as, if any
    pub fn tensor_dtype(&self) -> Option<&'static str> {
        if self.is_integral() {
            Some("int64")
        } else if self.is_numeric() {
            Some("float32")
        } else if self.is_string() {
            Some("string")
        } else {
            None
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Bool => write!(f, "BOOLEAN"),
            DataType::Int8 => write!(f, "TINYINT"),
            DataType::Int16 => write!(f, "SMALLINT"),
            DataType::Int32 => write!(f, "INT"),
            DataType::Int64 => write!(f, "BIGINT"),
            DataType::Float32 => write!(f, "FLOAT"),
            DataType::Float64 => write!(f, "DOUBLE"),
            DataType::Decimal { precision, scale } => write!(f, "DECIMAL({precision},{scale})"),
            DataType::String => write!(f, "STRING"),
            DataType::Varchar(Some(n)) => write!(f, "VARCHAR({n})"),
            DataType::Varchar(None) => write!(f, "VARCHAR"),
            DataType::Blob => write!(f, "BLOB"),
            DataType::Date => write!(f, "DATE"),
            DataType::Time => write!(f, "TIME"),
            DataType::Timestamp => write!(f, "TIMESTAMP"),
            DataType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// A column bound to the type the schema oracle reported for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedFieldType {
    pub name: String,
    pub native_type: String,
    pub data_type: DataType,
}

impl ResolvedFieldType {
    pub fn new(name: impl Into<String>, native_type: impl Into<String>) -> Self {
        let native_type = native_type.into();
        Self {
            name: name.into(),
            data_type: DataType::from_native(&native_type),
            native_type,
        }
    }
}
