//! Core types: column types, column descriptors, table schemas, and rows.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Tenant identifier supplied by the identity layer.
pub type OwnerId = i64;

/// Catalog row identifier.
pub type TableId = i64;

/// A dynamically shaped row: column name to JSON value, in column order.
pub type Row = Map<String, Value>;

/// Name of the shared metadata table.
pub const DEFAULT_CATALOG_TABLE: &str = "core_tables";

/// Table name length bounds.
pub const MIN_TABLE_NAME_LEN: usize = 3;
pub const MAX_TABLE_NAME_LEN: usize = 60;

/// Maximum column name length.
pub const MAX_COLUMN_NAME_LEN: usize = 30;

/// Largest precision accepted for `decimal`/`numeric` columns.
pub const MAX_NUMERIC_PRECISION: u32 = 1000;

/// The closed set of column types a dynamic table may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ColumnType {
    Integer,
    SmallInt,
    BigInt,
    SmallSerial,
    Serial,
    BigSerial,
    Decimal,
    Numeric,
    Real,
    DoublePrecision,
    Money,
    Varchar,
    Char,
    Character,
    Text,
    Bit,
    BitVarying,
    Boolean,
    Date,
    Time,
    TimeWithTimeZone,
    TimeWithoutTimeZone,
    Timestamp,
    TimestampWithTimeZone,
    TimestampWithoutTimeZone,
    Json,
    Jsonb,
    Uuid,
    Cidr,
    Inet,
    MacAddr,
    MacAddr8,
}

/// Value family a column type belongs to, used for literal formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFamily {
    Integer,
    Decimal,
    Text,
    Boolean,
    Json,
    Other,
}

impl ColumnType {
    pub const ALL: [ColumnType; 32] = [
        ColumnType::Integer,
        ColumnType::SmallInt,
        ColumnType::BigInt,
        ColumnType::SmallSerial,
        ColumnType::Serial,
        ColumnType::BigSerial,
        ColumnType::Decimal,
        ColumnType::Numeric,
        ColumnType::Real,
        ColumnType::DoublePrecision,
        ColumnType::Money,
        ColumnType::Varchar,
        ColumnType::Char,
        ColumnType::Character,
        ColumnType::Text,
        ColumnType::Bit,
        ColumnType::BitVarying,
        ColumnType::Boolean,
        ColumnType::Date,
        ColumnType::Time,
        ColumnType::TimeWithTimeZone,
        ColumnType::TimeWithoutTimeZone,
        ColumnType::Timestamp,
        ColumnType::TimestampWithTimeZone,
        ColumnType::TimestampWithoutTimeZone,
        ColumnType::Json,
        ColumnType::Jsonb,
        ColumnType::Uuid,
        ColumnType::Cidr,
        ColumnType::Inet,
        ColumnType::MacAddr,
        ColumnType::MacAddr8,
    ];

    /// Canonical lowercase spelling, as stored in the catalog.
    pub fn keyword(self) -> &'static str {
        match self {
            ColumnType::Integer => "integer",
            ColumnType::SmallInt => "smallint",
            ColumnType::BigInt => "bigint",
            ColumnType::SmallSerial => "smallserial",
            ColumnType::Serial => "serial",
            ColumnType::BigSerial => "bigserial",
            ColumnType::Decimal => "decimal",
            ColumnType::Numeric => "numeric",
            ColumnType::Real => "real",
            ColumnType::DoublePrecision => "double precision",
            ColumnType::Money => "money",
            ColumnType::Varchar => "varchar",
            ColumnType::Char => "char",
            ColumnType::Character => "character",
            ColumnType::Text => "text",
            ColumnType::Bit => "bit",
            ColumnType::BitVarying => "bit varying",
            ColumnType::Boolean => "boolean",
            ColumnType::Date => "date",
            ColumnType::Time => "time",
            ColumnType::TimeWithTimeZone => "time with time zone",
            ColumnType::TimeWithoutTimeZone => "time without time zone",
            ColumnType::Timestamp => "timestamp",
            ColumnType::TimestampWithTimeZone => "timestamp with time zone",
            ColumnType::TimestampWithoutTimeZone => "timestamp without time zone",
            ColumnType::Json => "json",
            ColumnType::Jsonb => "jsonb",
            ColumnType::Uuid => "uuid",
            ColumnType::Cidr => "cidr",
            ColumnType::Inet => "inet",
            ColumnType::MacAddr => "macaddr",
            ColumnType::MacAddr8 => "macaddr8",
        }
    }

    pub fn family(self) -> TypeFamily {
        match self {
            ColumnType::Integer
            | ColumnType::SmallInt
            | ColumnType::BigInt
            | ColumnType::SmallSerial
            | ColumnType::Serial
            | ColumnType::BigSerial => TypeFamily::Integer,
            ColumnType::Decimal
            | ColumnType::Numeric
            | ColumnType::Real
            | ColumnType::DoublePrecision => TypeFamily::Decimal,
            ColumnType::Varchar | ColumnType::Char | ColumnType::Character | ColumnType::Text => {
                TypeFamily::Text
            }
            ColumnType::Boolean => TypeFamily::Boolean,
            ColumnType::Json | ColumnType::Jsonb => TypeFamily::Json,
            _ => TypeFamily::Other,
        }
    }

    /// Whether a `(length)` qualifier applies.
    pub fn takes_length(self) -> bool {
        matches!(
            self,
            ColumnType::Varchar
                | ColumnType::Char
                | ColumnType::Character
                | ColumnType::Bit
                | ColumnType::BitVarying
        )
    }

    /// Whether a `(precision[,scale])` qualifier applies.
    pub fn takes_precision(self) -> bool {
        matches!(self, ColumnType::Decimal | ColumnType::Numeric)
    }

    pub fn is_serial(self) -> bool {
        matches!(
            self,
            ColumnType::SmallSerial | ColumnType::Serial | ColumnType::BigSerial
        )
    }

    /// Inclusive integer range a value must fall in, for integer types.
    pub fn integer_range(self) -> Option<(i64, i64)> {
        match self {
            ColumnType::SmallInt | ColumnType::SmallSerial => {
                Some((i16::MIN as i64, i16::MAX as i64))
            }
            ColumnType::Integer | ColumnType::Serial => Some((i32::MIN as i64, i32::MAX as i64)),
            ColumnType::BigInt | ColumnType::BigSerial => Some((i64::MIN, i64::MAX)),
            _ => None,
        }
    }

    /// Type a text-encoded bind parameter is cast to. Serial types are
    /// pseudo-types and cast to their underlying integer type; qualifiers are
    /// left to the column definition.
    pub fn cast_target(self) -> &'static str {
        match self {
            ColumnType::SmallSerial => "SMALLINT",
            ColumnType::Serial => "INTEGER",
            ColumnType::BigSerial => "BIGINT",
            ColumnType::Char | ColumnType::Character | ColumnType::Varchar => "TEXT",
            ColumnType::Bit | ColumnType::BitVarying => "VARBIT",
            ColumnType::Decimal => "NUMERIC",
            ColumnType::Integer => "INTEGER",
            ColumnType::SmallInt => "SMALLINT",
            ColumnType::BigInt => "BIGINT",
            ColumnType::Numeric => "NUMERIC",
            ColumnType::Real => "REAL",
            ColumnType::DoublePrecision => "DOUBLE PRECISION",
            ColumnType::Money => "MONEY",
            ColumnType::Text => "TEXT",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Date => "DATE",
            ColumnType::Time | ColumnType::TimeWithoutTimeZone => "TIME",
            ColumnType::TimeWithTimeZone => "TIMETZ",
            ColumnType::Timestamp | ColumnType::TimestampWithoutTimeZone => "TIMESTAMP",
            ColumnType::TimestampWithTimeZone => "TIMESTAMPTZ",
            ColumnType::Json => "JSON",
            ColumnType::Jsonb => "JSONB",
            ColumnType::Uuid => "UUID",
            ColumnType::Cidr => "CIDR",
            ColumnType::Inet => "INET",
            ColumnType::MacAddr => "MACADDR",
            ColumnType::MacAddr8 => "MACADDR8",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Error returned when a type name is outside the supported set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownColumnType(pub String);

impl fmt::Display for UnknownColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid type=({})", self.0)
    }
}

impl std::error::Error for UnknownColumnType {}

impl FromStr for ColumnType {
    type Err = UnknownColumnType;

    /// Case-insensitive; runs of whitespace are collapsed, and `bool` is
    /// accepted as an alias of `boolean`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_lowercase();
        if normalized == "bool" {
            return Ok(ColumnType::Boolean);
        }
        ColumnType::ALL
            .into_iter()
            .find(|t| t.keyword() == normalized)
            .ok_or_else(|| UnknownColumnType(s.to_string()))
    }
}

impl TryFrom<String> for ColumnType {
    type Error = UnknownColumnType;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ColumnType> for String {
    fn from(t: ColumnType) -> Self {
        t.keyword().to_string()
    }
}

/// The abstract, JSON-shaped definition of one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<u32>,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub required: bool,
    /// Scalar literal used as the column default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            length: None,
            precision: None,
            scale: None,
            primary: false,
            unique: false,
            required: false,
            default: None,
        }
    }

    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    pub fn precision(mut self, precision: u32, scale: Option<u32>) -> Self {
        self.precision = Some(precision);
        self.scale = scale;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Primary columns are implicitly NOT NULL.
    pub fn is_not_null(&self) -> bool {
        self.required || self.primary
    }
}

/// Catalog record describing one dynamic table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub id: TableId,
    pub name: String,
    pub owner_id: OwnerId,
    pub columns: Vec<ColumnDescriptor>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn primary_column(&self) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.primary)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}
