//! Type mapper: column descriptors to physical column definitions, and JSON
//! values to typed literals.

use serde_json::Value;

use crate::error::{QueryError, SchemaError};
use crate::sql::{is_numeric_text, ColumnDef, Literal, Param};
use crate::types::{
    ColumnDescriptor, ColumnType, TypeFamily, MAX_COLUMN_NAME_LEN, MAX_NUMERIC_PRECISION,
    MAX_TABLE_NAME_LEN, MIN_TABLE_NAME_LEN,
};

/// Whether `name` matches `[A-Za-z][A-Za-z0-9_]*`.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub fn validate_column_name(name: &str) -> Result<(), SchemaError> {
    let reason = if name.is_empty() {
        "name can not be empty".to_string()
    } else if name.len() > MAX_COLUMN_NAME_LEN {
        format!("name can not be longer than {MAX_COLUMN_NAME_LEN} characters")
    } else if !is_identifier(name) {
        "name must start with a letter and contain only letters, digits and underscores"
            .to_string()
    } else {
        return Ok(());
    };
    Err(SchemaError::InvalidColumn {
        column: name.to_string(),
        reason,
    })
}

/// Validate a user table name. The catalog table's own name is reserved.
pub fn validate_table_name(name: &str, catalog_table: &str) -> Result<(), SchemaError> {
    let len = name.len();
    let reason = if !(MIN_TABLE_NAME_LEN..=MAX_TABLE_NAME_LEN).contains(&len) {
        format!("length must be between {MIN_TABLE_NAME_LEN} and {MAX_TABLE_NAME_LEN}")
    } else if !is_identifier(name) {
        "name must start with a letter and contain only letters, digits and underscores"
            .to_string()
    } else if name.eq_ignore_ascii_case(catalog_table) {
        "name is reserved".to_string()
    } else {
        return Ok(());
    };
    Err(SchemaError::InvalidTableName {
        name: name.to_string(),
        reason,
    })
}

/// Parse a type name for `column`, failing with `InvalidColumn`.
pub fn parse_column_type(column: &str, type_name: &str) -> Result<ColumnType, SchemaError> {
    type_name.parse().map_err(|_| SchemaError::InvalidColumn {
        column: column.to_string(),
        reason: format!("contains invalid type=({type_name})"),
    })
}

/// Validate a descriptor and compile it to a physical column definition.
pub fn compile_column(desc: &ColumnDescriptor) -> Result<ColumnDef, SchemaError> {
    validate_column_name(&desc.name)?;
    let invalid = |reason: String| SchemaError::InvalidColumn {
        column: desc.name.clone(),
        reason,
    };
    let ty = desc.column_type;

    if let Some(length) = desc.length {
        if !ty.takes_length() {
            return Err(invalid(format!("type=({ty}) does not take a length")));
        }
        if length == 0 {
            return Err(invalid("length must be greater than 0".to_string()));
        }
    }

    match (desc.precision, desc.scale) {
        (None, Some(_)) => return Err(invalid("scale requires a precision".to_string())),
        (Some(_), _) if !ty.takes_precision() => {
            return Err(invalid(format!("type=({ty}) does not take a precision")));
        }
        (Some(p), _) if p == 0 || p > MAX_NUMERIC_PRECISION => {
            return Err(invalid(format!(
                "precision must be between 1 and {MAX_NUMERIC_PRECISION}"
            )));
        }
        (Some(p), Some(s)) if s > p => {
            return Err(invalid(format!(
                "scale ({s}) can not exceed precision ({p})"
            )));
        }
        _ => {}
    }

    let default = match &desc.default {
        None => None,
        Some(Value::Array(_)) | Some(Value::Object(_)) if ty.family() != TypeFamily::Json => {
            return Err(invalid("default must be a scalar literal".to_string()));
        }
        Some(value) => Some(
            format_literal(value, desc, None)
                .map_err(|e| invalid(format!("invalid default: {e}")))?
                .value,
        ),
    };

    Ok(ColumnDef {
        name: desc.name.clone(),
        column_type: ty,
        length: desc.length,
        precision: desc.precision,
        scale: desc.scale,
        primary: desc.primary,
        unique: desc.unique,
        not_null: desc.required,
        default,
    })
}

/// Convert a JSON value into a typed bind parameter for `column`.
///
/// `row` is the 1-based payload row the value came from, when there is one.
pub fn format_literal(
    value: &Value,
    column: &ColumnDescriptor,
    row: Option<usize>,
) -> Result<Param, QueryError> {
    let ty = column.column_type;
    let invalid = |reason: String| QueryError::InvalidValue {
        column: column.name.clone(),
        row,
        reason,
    };

    if value.is_null() {
        return Ok(Param::new(Literal::Null, ty));
    }

    let literal = match ty.family() {
        TypeFamily::Text => {
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return Err(invalid(format!("expected a string, got {value}"))),
            };
            check_length(&text, column, row)?;
            Literal::Text(text)
        }
        TypeFamily::Boolean => match value {
            Value::Bool(b) => Literal::Bool(*b),
            Value::String(s) if s.eq_ignore_ascii_case("true") => Literal::Bool(true),
            Value::String(s) if s.eq_ignore_ascii_case("false") => Literal::Bool(false),
            _ => {
                return Err(invalid(format!(
                    "invalid value [{value}] for boolean type column"
                )));
            }
        },
        TypeFamily::Integer => {
            let n = parse_integer(value)
                .ok_or_else(|| invalid(format!("expected an integer, got {value}")))?;
            if let Some((min, max)) = ty.integer_range() {
                if n < min || n > max {
                    return Err(invalid(format!("{n} is out of range for type {ty}")));
                }
            }
            Literal::Int(n)
        }
        TypeFamily::Decimal => parse_number(value)
            .ok_or_else(|| invalid(format!("expected a number, got {value}")))?,
        TypeFamily::Json => Literal::Json(value.clone()),
        TypeFamily::Other => match (ty, value) {
            (ColumnType::Money, Value::Number(_)) => parse_number(value)
                .ok_or_else(|| invalid(format!("expected an amount, got {value}")))?,
            (ColumnType::Bit | ColumnType::BitVarying, Value::String(s)) => {
                if !s.chars().all(|c| c == '0' || c == '1') {
                    return Err(invalid(format!("[{s}] is not a bit string")));
                }
                check_length(s, column, row)?;
                Literal::Text(s.clone())
            }
            (_, Value::String(s)) => Literal::Text(s.clone()),
            _ => return Err(invalid(format!("expected a string, got {value}"))),
        },
    };

    Ok(Param::new(literal, ty))
}

fn check_length(text: &str, column: &ColumnDescriptor, row: Option<usize>) -> Result<(), QueryError> {
    if let (true, Some(max)) = (column.column_type.takes_length(), column.length) {
        if text.chars().count() > max as usize {
            return Err(QueryError::ValueTooLong {
                column: column.name.clone(),
                row,
                max,
            });
        }
    }
    Ok(())
}

fn parse_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Integral values that fit an `i64` become `Int`; everything else keeps its
/// exact decimal text.
fn parse_number(value: &Value) -> Option<Literal> {
    match value {
        Value::Number(n) => Some(n.as_i64().map_or_else(
            || Literal::Numeric(n.to_string()),
            Literal::Int,
        )),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                return Some(Literal::Int(i));
            }
            is_numeric_text(s).then(|| Literal::Numeric(s.to_string()))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn col(name: &str, ty: ColumnType) -> ColumnDescriptor {
        ColumnDescriptor::new(name, ty)
    }

    // -----------------------------------------------------------------------
    // Names
    // -----------------------------------------------------------------------

    #[test]
    fn test_identifier_rules() {
        assert!(is_identifier("a"));
        assert!(is_identifier("user_id2"));
        assert!(!is_identifier("2users"));
        assert!(!is_identifier("_id"));
        assert!(!is_identifier("drop table"));
        assert!(!is_identifier(""));
    }

    #[test]
    fn test_table_name_rules() {
        assert!(validate_table_name("posts", "core_tables").is_ok());
        assert!(validate_table_name("ab", "core_tables").is_err());
        assert!(validate_table_name(&"a".repeat(61), "core_tables").is_err());
        assert!(validate_table_name("1posts", "core_tables").is_err());
        assert!(validate_table_name("CORE_TABLES", "core_tables").is_err());
    }

    #[test]
    fn test_parse_column_type_reports_invalid_column() {
        let err = parse_column_type("avatar", "blob").unwrap_err();
        assert_eq!(err.to_string(), "column=(avatar) contains invalid type=(blob)");
    }

    // -----------------------------------------------------------------------
    // compile_column
    // -----------------------------------------------------------------------

    #[test]
    fn test_compile_bare_types() {
        let def = compile_column(&col("id", ColumnType::BigSerial).primary()).unwrap();
        assert_eq!(def.to_string(), "\"id\" BIGSERIAL PRIMARY KEY");

        let def = compile_column(&col("ok", ColumnType::Boolean).required()).unwrap();
        assert_eq!(def.to_string(), "\"ok\" BOOLEAN NOT NULL");
    }

    #[test]
    fn test_compile_length_and_precision() {
        let def = compile_column(&col("title", ColumnType::Varchar).length(80).unique()).unwrap();
        assert_eq!(def.to_string(), "\"title\" VARCHAR(80) UNIQUE");

        let def = compile_column(&col("price", ColumnType::Decimal).precision(8, Some(2))).unwrap();
        assert_eq!(def.to_string(), "\"price\" DECIMAL(8,2)");

        let def = compile_column(&col("total", ColumnType::Numeric).precision(12, None)).unwrap();
        assert_eq!(def.to_string(), "\"total\" NUMERIC(12)");
    }

    #[test]
    fn test_compile_rejects_malformed_qualifiers() {
        assert!(compile_column(&col("n", ColumnType::Integer).length(4)).is_err());
        assert!(compile_column(&col("n", ColumnType::Varchar).length(0)).is_err());
        assert!(compile_column(&col("n", ColumnType::Integer).precision(10, Some(4))).is_err());
        assert!(compile_column(&col("n", ColumnType::Numeric).precision(4, Some(6))).is_err());
        assert!(compile_column(&col("n", ColumnType::Numeric).precision(0, None)).is_err());

        let mut scale_only = col("n", ColumnType::Numeric);
        scale_only.scale = Some(2);
        assert!(compile_column(&scale_only).is_err());
    }

    #[test]
    fn test_compile_rejects_bad_names() {
        let err = compile_column(&col("9lives", ColumnType::Text)).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidColumn { .. }));
    }

    #[test]
    fn test_compile_default_is_escaped_literal() {
        let def = compile_column(&col("note", ColumnType::Text).default_value("it's")).unwrap();
        assert_eq!(def.to_string(), "\"note\" TEXT DEFAULT ('it''s')");

        let def = compile_column(&col("n", ColumnType::Integer).default_value(5)).unwrap();
        assert_eq!(def.to_string(), "\"n\" INTEGER DEFAULT (5)");
    }

    #[test]
    fn test_compile_default_must_match_type() {
        let err = compile_column(&col("n", ColumnType::Integer).default_value("abc")).unwrap_err();
        assert!(err.to_string().contains("invalid default"), "{err}");

        let err = compile_column(&col("n", ColumnType::Text).default_value(json!(["a"]))).unwrap_err();
        assert!(err.to_string().contains("scalar"), "{err}");
    }

    // -----------------------------------------------------------------------
    // format_literal
    // -----------------------------------------------------------------------

    #[test]
    fn test_format_text_enforces_length() {
        let title = col("title", ColumnType::Varchar).length(5);
        let p = format_literal(&json!("hello"), &title, Some(1)).unwrap();
        assert_eq!(p.value, Literal::Text("hello".to_string()));

        let err = format_literal(&json!("hello!"), &title, Some(3)).unwrap_err();
        assert!(matches!(
            err,
            QueryError::ValueTooLong { row: Some(3), max: 5, .. }
        ));
    }

    #[test]
    fn test_format_text_counts_characters_not_bytes() {
        let name = col("name", ColumnType::Varchar).length(3);
        assert!(format_literal(&json!("äöü"), &name, None).is_ok());
    }

    #[test]
    fn test_format_text_stringifies_scalars() {
        let c = col("c", ColumnType::Text);
        assert_eq!(
            format_literal(&json!(42), &c, None).unwrap().value,
            Literal::Text("42".to_string())
        );
        assert!(format_literal(&json!({"a": 1}), &c, None).is_err());
    }

    #[test]
    fn test_format_boolean() {
        let c = col("active", ColumnType::Boolean);
        assert_eq!(
            format_literal(&json!(true), &c, None).unwrap().value,
            Literal::Bool(true)
        );
        assert_eq!(
            format_literal(&json!("FALSE"), &c, None).unwrap().value,
            Literal::Bool(false)
        );
        let err = format_literal(&json!("yes"), &c, Some(2)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "row [2] invalid value for column [active]: invalid value [\"yes\"] for boolean type column"
        );
    }

    #[test]
    fn test_format_integer_range() {
        let small = col("s", ColumnType::SmallInt);
        assert!(format_literal(&json!(32767), &small, None).is_ok());
        assert!(format_literal(&json!(32768), &small, None).is_err());
        assert_eq!(
            format_literal(&json!("12"), &small, None).unwrap().value,
            Literal::Int(12)
        );
        assert_eq!(
            format_literal(&json!(3.0), &small, None).unwrap().value,
            Literal::Int(3)
        );
        assert!(format_literal(&json!(3.5), &small, None).is_err());
    }

    #[test]
    fn test_format_decimal() {
        let c = col("price", ColumnType::Numeric);
        assert_eq!(
            format_literal(&json!(9.75), &c, None).unwrap().value,
            Literal::Numeric("9.75".to_string())
        );
        assert_eq!(
            format_literal(&json!("10"), &c, None).unwrap().value,
            Literal::Int(10)
        );
        assert!(format_literal(&json!("ten"), &c, None).is_err());
    }

    #[test]
    fn test_format_decimal_keeps_every_digit() {
        let c = col("amount", ColumnType::Numeric).precision(30, Some(9));
        for text in ["12345678901234567890.123456789", "0.123456789012345678", "-1e-30"] {
            let param = format_literal(&json!(text), &c, None).unwrap();
            assert_eq!(param.value.to_text().as_deref(), Some(text));
        }

        // Past i64 but integral: still exact.
        let big = format_literal(&json!("92233720368547758070"), &c, None).unwrap();
        assert_eq!(big.value, Literal::Numeric("92233720368547758070".to_string()));

        let real = col("ratio", ColumnType::DoublePrecision);
        assert!(format_literal(&json!("1.5; DROP TABLE x"), &real, None).is_err());
        assert!(format_literal(&json!("NaN"), &real, None).is_err());
    }

    #[test]
    fn test_format_null_and_json() {
        let c = col("meta", ColumnType::Jsonb);
        assert_eq!(
            format_literal(&json!({"k": [1]}), &c, None).unwrap().value,
            Literal::Json(json!({"k": [1]}))
        );
        assert_eq!(
            format_literal(&Value::Null, &c, None).unwrap().value,
            Literal::Null
        );
    }

    #[test]
    fn test_format_other_types_take_strings() {
        let c = col("born", ColumnType::Date);
        assert_eq!(
            format_literal(&json!("2020-01-31"), &c, None).unwrap().value,
            Literal::Text("2020-01-31".to_string())
        );
        assert!(format_literal(&json!(20200131), &c, None).is_err());

        let bits = col("flags", ColumnType::Bit).length(3);
        assert!(format_literal(&json!("101"), &bits, None).is_ok());
        assert!(format_literal(&json!("102"), &bits, None).is_err());
        assert!(format_literal(&json!("1011"), &bits, None).is_err());
    }
}
