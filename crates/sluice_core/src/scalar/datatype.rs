use std::fmt;

use serde::{Deserialize, Serialize};

/// Type tag for a scalar value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DataType {
    Null,
    Integer,
    Float,
    Numeric,
    String,
    Boolean,
    Timestamp,
    Interval,
    Object,
    /// Wildcard type used by function signatures that accept (or return)
    /// values of any type.
    Any,
}

impl DataType {
    /// If this type can be stored in a row column.
    ///
    /// Null and Any are only used during type resolution.
    pub const fn is_row_type(&self) -> bool {
        !matches!(self, DataType::Null | DataType::Any)
    }

    pub const fn is_numeric(&self) -> bool {
        matches!(self, DataType::Integer | DataType::Float | DataType::Numeric)
    }

    pub fn parse(s: &str) -> Option<DataType> {
        Some(match s.to_ascii_lowercase().as_str() {
            "null" | "void" => DataType::Null,
            "int" | "integer" | "bigint" => DataType::Integer,
            "float" | "real" | "double" => DataType::Float,
            "numeric" | "decimal" => DataType::Numeric,
            "string" | "text" | "varchar" => DataType::String,
            "bool" | "boolean" => DataType::Boolean,
            "timestamp" => DataType::Timestamp,
            "interval" => DataType::Interval,
            "object" | "json" => DataType::Object,
            "any" => DataType::Any,
            _ => return None,
        })
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Null => "Null",
            Self::Integer => "Integer",
            Self::Float => "Float",
            Self::Numeric => "Numeric",
            Self::String => "String",
            Self::Boolean => "Boolean",
            Self::Timestamp => "Timestamp",
            Self::Interval => "Interval",
            Self::Object => "Object",
            Self::Any => "Any",
        };
        write!(f, "{s}")
    }
}
