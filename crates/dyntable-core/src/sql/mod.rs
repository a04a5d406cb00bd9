//! Structured SQL statements.
//!
//! The compilers never build SQL by string concatenation of user data. They
//! produce [`Statement`] values whose identifiers have already been validated
//! and whose literals are typed [`Param`]s. A statement renders to SQL text
//! with `$n` placeholders plus the ordered bind values (see [`render`]); the
//! in-memory backend interprets the structure directly.

pub mod condition;
pub mod render;

use std::fmt;

use serde_json::Value;

use crate::types::ColumnType;

pub use condition::Condition;
pub use render::Rendered;

/// A literal value, already checked against the type of its column.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    /// Exact decimal text, already checked by [`is_numeric_text`].
    Numeric(String),
    Text(String),
    Json(Value),
}

impl Literal {
    pub fn is_null(&self) -> bool {
        matches!(self, Literal::Null)
    }

    /// Text encoding used when binding the value as a parameter. `None` binds
    /// SQL NULL.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Literal::Null => None,
            Literal::Bool(b) => Some(b.to_string()),
            Literal::Int(i) => Some(i.to_string()),
            Literal::Numeric(n) => Some(n.clone()),
            Literal::Text(s) => Some(s.clone()),
            Literal::Json(v) => Some(v.to_string()),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Literal::Null => Value::Null,
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Int(i) => Value::from(*i),
            Literal::Numeric(n) => n
                .parse::<serde_json::Number>()
                .map(Value::Number)
                .unwrap_or_else(|_| Value::String(n.clone())),
            Literal::Text(s) => Value::String(s.clone()),
            Literal::Json(v) => v.clone(),
        }
    }

    /// SQL text for the literal, with quotes escaped. Only used where bind
    /// parameters are not accepted (column defaults in DDL).
    pub fn to_sql_inline(&self) -> String {
        match self {
            Literal::Null => "NULL".to_string(),
            Literal::Bool(b) => b.to_string(),
            Literal::Int(i) => i.to_string(),
            Literal::Numeric(n) => n.clone(),
            Literal::Text(s) => quote_literal(s),
            Literal::Json(v) => quote_literal(&v.to_string()),
        }
    }
}

/// A bind parameter: a literal plus the column type it is cast to.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub value: Literal,
    pub column_type: ColumnType,
}

impl Param {
    pub fn new(value: Literal, column_type: ColumnType) -> Self {
        Self { value, column_type }
    }
}

/// A compiled physical column definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
    pub length: Option<u32>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
    pub primary: bool,
    pub unique: bool,
    pub not_null: bool,
    pub default: Option<Literal>,
}

impl fmt::Display for ColumnDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}",
            quote_ident(&self.name),
            self.column_type.keyword().to_ascii_uppercase()
        )?;
        if let Some(length) = self.length {
            write!(f, "({length})")?;
        }
        if let Some(precision) = self.precision {
            match self.scale {
                Some(scale) if scale > 0 => write!(f, "({precision},{scale})")?,
                _ => write!(f, "({precision})")?,
            }
        }
        if self.primary {
            f.write_str(" PRIMARY KEY")?;
        }
        if self.unique {
            f.write_str(" UNIQUE")?;
        }
        if self.not_null {
            f.write_str(" NOT NULL")?;
        }
        if let Some(default) = &self.default {
            write!(f, " DEFAULT ({})", default.to_sql_inline())?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AlterAction {
    AddColumn(ColumnDef),
    DropColumn(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub column: String,
    pub descending: bool,
}

/// One SQL statement against a single table.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    CreateTable {
        table: String,
        columns: Vec<ColumnDef>,
        if_not_exists: bool,
    },
    DropTable {
        table: String,
        if_exists: bool,
    },
    AlterTable {
        table: String,
        actions: Vec<AlterAction>,
    },
    Insert {
        table: String,
        columns: Vec<String>,
        rows: Vec<Vec<Param>>,
        returning: bool,
    },
    Update {
        table: String,
        assignments: Vec<(String, Param)>,
        filter: Option<Condition>,
        returning: bool,
    },
    Delete {
        table: String,
        filter: Option<Condition>,
        returning: bool,
    },
    Select {
        table: String,
        /// Empty selects every column.
        fields: Vec<String>,
        filter: Option<Condition>,
        order_by: Vec<OrderBy>,
        limit: Option<u64>,
        offset: Option<u64>,
    },
}

impl Statement {
    /// Whether executing the statement yields a row set.
    pub fn returns_rows(&self) -> bool {
        match self {
            Statement::Select { .. } => true,
            Statement::Insert { returning, .. }
            | Statement::Update { returning, .. }
            | Statement::Delete { returning, .. } => *returning,
            _ => false,
        }
    }

    pub fn render(&self) -> Rendered {
        render::render(self)
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render().sql)
    }
}

/// Double-quote an identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Whether `s` is a plain decimal number: an optional sign, digits with an
/// optional fraction, and an optional exponent.
pub fn is_numeric_text(s: &str) -> bool {
    let s = s.strip_prefix(['+', '-']).unwrap_or(s);
    let (mantissa, exponent) = match s.find(['e', 'E']) {
        Some(i) => (&s[..i], Some(&s[i + 1..])),
        None => (s, None),
    };
    let (int, frac) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    let digits = |p: &str| p.bytes().all(|b| b.is_ascii_digit());
    if (int.is_empty() && frac.is_empty()) || !digits(int) || !digits(frac) {
        return false;
    }
    match exponent {
        None => true,
        Some(e) => {
            let e = e.strip_prefix(['+', '-']).unwrap_or(e);
            !e.is_empty() && digits(e)
        }
    }
}

/// Single-quote a string literal, doubling embedded quotes.
pub fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn column(name: &str, column_type: ColumnType) -> ColumnDef {
        ColumnDef {
            name: name.to_string(),
            column_type,
            length: None,
            precision: None,
            scale: None,
            primary: false,
            unique: false,
            not_null: false,
            default: None,
        }
    }

    #[test]
    fn test_column_def_modifier_order() {
        let mut def = column("email", ColumnType::Varchar);
        def.length = Some(120);
        def.primary = true;
        def.unique = true;
        def.not_null = true;
        def.default = Some(Literal::Text("none".to_string()));
        assert_eq!(
            def.to_string(),
            "\"email\" VARCHAR(120) PRIMARY KEY UNIQUE NOT NULL DEFAULT ('none')"
        );
    }

    #[test]
    fn test_column_def_precision_and_scale() {
        let mut def = column("price", ColumnType::Numeric);
        def.precision = Some(10);
        def.scale = Some(2);
        assert_eq!(def.to_string(), "\"price\" NUMERIC(10,2)");

        def.scale = Some(0);
        assert_eq!(def.to_string(), "\"price\" NUMERIC(10)");
    }

    #[test]
    fn test_multi_word_type_keyword() {
        let def = column("at", ColumnType::TimestampWithTimeZone);
        assert_eq!(def.to_string(), "\"at\" TIMESTAMP WITH TIME ZONE");
    }

    #[test]
    fn test_inline_literal_escapes_quotes() {
        assert_eq!(
            Literal::Text("it's".to_string()).to_sql_inline(),
            "'it''s'"
        );
        assert_eq!(
            Literal::Json(json!({"a": "b'c"})).to_sql_inline(),
            "'{\"a\":\"b''c\"}'"
        );
        assert_eq!(Literal::Null.to_sql_inline(), "NULL");
    }

    #[test]
    fn test_quote_ident_doubles_quotes() {
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_literal_text_encoding() {
        assert_eq!(Literal::Null.to_text(), None);
        assert_eq!(Literal::Bool(true).to_text().as_deref(), Some("true"));
        assert_eq!(
            Literal::Numeric("1.50".to_string()).to_text().as_deref(),
            Some("1.50")
        );
        assert_eq!(
            Literal::Json(json!([1, 2])).to_text().as_deref(),
            Some("[1,2]")
        );
    }

    #[test]
    fn test_numeric_text_grammar() {
        for ok in ["0", "-12", "+3.5", ".5", "5.", "1e10", "2.5E-3", "12345678901234567890.123456789"] {
            assert!(is_numeric_text(ok), "{ok} should be numeric");
        }
        for bad in ["", ".", "-", "1.2.3", "e5", "1e", "1e+", "NaN", "inf", "1 2", "0x10", "1;"] {
            assert!(!is_numeric_text(bad), "{bad} should not be numeric");
        }
    }
}
