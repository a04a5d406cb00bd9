//! Predicate compiler: OR-map plus one AND-group to a WHERE condition.
//!
//! On the wire a filter is a JSON object mapping column names to value
//! arrays. The reserved key `"&"` holds a nested object of the same shape
//! whose entries are AND-ed:
//!
//! ```json
//! { "id": [1, 2], "name": ["a", null], "&": { "active": [true] } }
//! ```
//!
//! means `(id IN (1, 2) OR (name IN ('a') OR name IS NULL)) AND active = true`.

use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::error::QueryError;
use crate::sql::Condition;
use crate::types::{ColumnDescriptor, ColumnType, TableSchema, TypeFamily};

use super::column::format_literal;

/// Key holding the AND group in the wire form.
pub const AND_GROUP_KEY: &str = "&";

/// A two-level filter: rows match `(OR over any) AND (AND over all)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredicateSpec {
    pub any: Vec<(String, Vec<Value>)>,
    pub all: Vec<(String, Vec<Value>)>,
}

impl PredicateSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry to the OR group.
    pub fn or<V: Into<Value>>(mut self, column: &str, values: impl IntoIterator<Item = V>) -> Self {
        self.any
            .push((column.to_string(), values.into_iter().map(Into::into).collect()));
        self
    }

    /// Add an entry to the AND group.
    pub fn and<V: Into<Value>>(mut self, column: &str, values: impl IntoIterator<Item = V>) -> Self {
        self.all
            .push((column.to_string(), values.into_iter().map(Into::into).collect()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.any.is_empty() && self.all.is_empty()
    }

    /// Parse the wire form. `null` is the empty filter.
    pub fn from_filters(filters: &Value) -> Result<Self, QueryError> {
        let map = match filters {
            Value::Null => return Ok(Self::default()),
            Value::Object(map) => map,
            _ => {
                return Err(QueryError::InvalidFilter(
                    "filters must be an object".to_string(),
                ));
            }
        };

        let mut spec = Self::default();
        for (key, value) in map {
            if key == AND_GROUP_KEY {
                let group = value.as_object().ok_or_else(|| {
                    QueryError::InvalidFilter(format!("values inside {AND_GROUP_KEY} must be a map"))
                })?;
                for (column, values) in group {
                    spec.all.push((column.clone(), value_list(column, values)?));
                }
            } else {
                spec.any.push((key.clone(), value_list(key, value)?));
            }
        }
        Ok(spec)
    }

    /// Encode into the wire form.
    pub fn to_filters(&self) -> Value {
        let mut map: Map<String, Value> = self
            .any
            .iter()
            .map(|(c, v)| (c.clone(), Value::Array(v.clone())))
            .collect();
        if !self.all.is_empty() {
            let group: Map<String, Value> = self
                .all
                .iter()
                .map(|(c, v)| (c.clone(), Value::Array(v.clone())))
                .collect();
            map.insert(AND_GROUP_KEY.to_string(), Value::Object(group));
        }
        Value::Object(map)
    }

    fn columns(&self) -> impl Iterator<Item = &str> {
        self.any
            .iter()
            .chain(self.all.iter())
            .map(|(c, _)| c.as_str())
    }
}

fn value_list(column: &str, values: &Value) -> Result<Vec<Value>, QueryError> {
    values
        .as_array()
        .cloned()
        .ok_or_else(|| QueryError::InvalidFilter(format!("values of [{column}] must be an array")))
}

/// Compile `spec` against `schema`. Returns `None` for an empty spec, in
/// which case the statement carries no WHERE clause.
pub fn compile_predicate(
    spec: &PredicateSpec,
    schema: &TableSchema,
) -> Result<Option<Condition>, QueryError> {
    check_columns(spec.columns(), schema)?;

    let mut any = Vec::with_capacity(spec.any.len());
    for (column, values) in &spec.any {
        any.push(compile_clause(lookup(schema, column)?, values)?);
    }

    let mut parts = Vec::with_capacity(spec.all.len() + 1);
    if let Some(or) = Condition::or(any) {
        parts.push(or);
    }
    for (column, values) in &spec.all {
        parts.push(compile_clause(lookup(schema, column)?, values)?);
    }

    Ok(Condition::and(parts))
}

/// Fail with one `UnknownColumn` naming every column absent from `schema`.
pub(crate) fn check_columns<'a>(
    columns: impl Iterator<Item = &'a str>,
    schema: &TableSchema,
) -> Result<(), QueryError> {
    let mut seen = HashSet::new();
    let unknown: Vec<String> = columns
        .filter(|c| !schema.has_column(c) && seen.insert(*c))
        .map(String::from)
        .collect();
    if unknown.is_empty() {
        Ok(())
    } else {
        Err(QueryError::UnknownColumn(unknown))
    }
}

fn lookup<'a>(schema: &'a TableSchema, column: &str) -> Result<&'a ColumnDescriptor, QueryError> {
    schema
        .column(column)
        .ok_or_else(|| QueryError::UnknownColumn(vec![column.to_string()]))
}

fn compile_clause(column: &ColumnDescriptor, values: &[Value]) -> Result<Condition, QueryError> {
    if column.column_type.family() == TypeFamily::Boolean {
        return match values {
            [Value::Bool(_)] => Ok(Condition::Eq {
                column: column.name.clone(),
                value: format_literal(&values[0], column, None)?,
            }),
            _ => Err(QueryError::InvalidBooleanFilter {
                column: column.name.clone(),
            }),
        };
    }

    if values.is_empty() {
        return Err(QueryError::EmptyValueList {
            column: column.name.clone(),
        });
    }

    // `json` has no equality operator; only IS NULL can be asked of it.
    if column.column_type == ColumnType::Json && values.iter().any(|v| !v.is_null()) {
        return Err(QueryError::InvalidFilter(format!(
            "column [{}] of type json can only be filtered by null, use jsonb to match values",
            column.name
        )));
    }

    let or_null = values.iter().any(Value::is_null);
    let params = values
        .iter()
        .filter(|v| !v.is_null())
        .map(|v| format_literal(v, column, None))
        .collect::<Result<Vec<_>, _>>()?;

    if params.is_empty() {
        return Ok(Condition::IsNull {
            column: column.name.clone(),
        });
    }
    Ok(Condition::In {
        column: column.name.clone(),
        values: params,
        or_null,
    })
}
