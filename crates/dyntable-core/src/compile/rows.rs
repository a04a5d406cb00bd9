//! Row compiler: row payloads to INSERT/UPDATE, predicates to DELETE/SELECT.

use std::collections::{BTreeSet, HashMap};

use serde_json::Value;

use crate::error::QueryError;
use crate::sql::{Condition, OrderBy, Statement};
use crate::types::{Row, TableSchema};

use super::column::format_literal;
use super::predicate::{check_columns, compile_predicate, PredicateSpec};

/// Options of a filtered read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectQuery {
    /// Columns to return; empty returns every column.
    pub fields: Vec<String>,
    pub predicate: PredicateSpec,
    /// `(column, descending)` pairs.
    pub order_by: Vec<(String, bool)>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Compile rows into multi-row INSERTs, one per distinct set of present
/// columns, in order of first appearance.
pub fn compile_insert(schema: &TableSchema, rows: &[Row]) -> Result<Vec<Statement>, QueryError> {
    if rows.is_empty() {
        return Err(QueryError::EmptyPayload);
    }
    check_row_columns(schema, rows)?;

    for (i, row) in rows.iter().enumerate() {
        for column in schema.columns.iter().filter(|c| c.required) {
            match row.get(&column.name) {
                None => {
                    return Err(QueryError::MissingRequiredColumn {
                        column: column.name.clone(),
                        row: i + 1,
                    });
                }
                Some(Value::Null) => {
                    return Err(QueryError::NullRequiredColumn {
                        column: column.name.clone(),
                        row: i + 1,
                    });
                }
                Some(_) => {}
            }
        }
    }

    let mut groups: Vec<(BTreeSet<&str>, Vec<usize>)> = Vec::new();
    let mut index: HashMap<BTreeSet<&str>, usize> = HashMap::new();
    for (i, row) in rows.iter().enumerate() {
        let key: BTreeSet<&str> = row.keys().map(String::as_str).collect();
        match index.get(&key) {
            Some(&g) => groups[g].1.push(i),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push((key, vec![i]));
            }
        }
    }

    let mut statements = Vec::with_capacity(groups.len());
    for (key, members) in groups {
        let columns: Vec<_> = schema
            .columns
            .iter()
            .filter(|c| key.contains(c.name.as_str()))
            .collect();

        let mut values = Vec::with_capacity(members.len());
        for i in members {
            let row = &rows[i];
            let params = columns
                .iter()
                .map(|c| format_literal(&row[&c.name], c, Some(i + 1)))
                .collect::<Result<Vec<_>, _>>()?;
            values.push(params);
        }

        statements.push(Statement::Insert {
            table: schema.name.clone(),
            columns: columns.iter().map(|c| c.name.clone()).collect(),
            rows: values,
            returning: false,
        });
    }
    Ok(statements)
}

/// Compile rows into one UPDATE each, keyed by the primary column value.
pub fn compile_update(schema: &TableSchema, rows: &[Row]) -> Result<Vec<Statement>, QueryError> {
    let primary = schema
        .primary_column()
        .ok_or_else(|| QueryError::NoPrimaryColumn(schema.name.clone()))?;
    if rows.is_empty() {
        return Err(QueryError::EmptyPayload);
    }
    check_row_columns(schema, rows)?;

    let mut statements = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        let n = i + 1;
        let key = match row.get(&primary.name) {
            Some(v) if !v.is_null() => format_literal(v, primary, Some(n))?,
            _ => {
                return Err(QueryError::MissingPrimaryValue {
                    column: primary.name.clone(),
                    row: n,
                });
            }
        };

        let mut assignments = Vec::new();
        for column in schema.columns.iter().filter(|c| !c.primary) {
            let Some(value) = row.get(&column.name) else {
                continue;
            };
            if column.required && value.is_null() {
                return Err(QueryError::NullRequiredColumn {
                    column: column.name.clone(),
                    row: n,
                });
            }
            assignments.push((column.name.clone(), format_literal(value, column, Some(n))?));
        }
        if assignments.is_empty() {
            return Err(QueryError::NothingToUpdate { row: n });
        }

        statements.push(Statement::Update {
            table: schema.name.clone(),
            assignments,
            filter: Some(Condition::Eq {
                column: primary.name.clone(),
                value: key,
            }),
            returning: false,
        });
    }
    Ok(statements)
}

/// `DELETE FROM t WHERE <predicate> RETURNING *`. An empty predicate is
/// rejected rather than deleting every row.
pub fn compile_delete(schema: &TableSchema, spec: &PredicateSpec) -> Result<Statement, QueryError> {
    let filter = compile_predicate(spec, schema)?.ok_or(QueryError::EmptyFilter)?;
    Ok(Statement::Delete {
        table: schema.name.clone(),
        filter: Some(filter),
        returning: true,
    })
}

/// `SELECT <fields> FROM t [WHERE ...] [ORDER BY ...] [LIMIT n] [OFFSET n]`.
pub fn compile_select(schema: &TableSchema, query: &SelectQuery) -> Result<Statement, QueryError> {
    check_columns(
        query
            .fields
            .iter()
            .chain(query.order_by.iter().map(|(c, _)| c))
            .map(String::as_str),
        schema,
    )?;
    let filter = compile_predicate(&query.predicate, schema)?;

    Ok(Statement::Select {
        table: schema.name.clone(),
        fields: query.fields.clone(),
        filter,
        order_by: query
            .order_by
            .iter()
            .map(|(column, descending)| OrderBy {
                column: column.clone(),
                descending: *descending,
            })
            .collect(),
        limit: query.limit,
        offset: query.offset,
    })
}

/// Fail with one `UnknownColumn` listing every `column(row#n)` pair that is
/// not in the schema; also rejects empty rows.
fn check_row_columns(schema: &TableSchema, rows: &[Row]) -> Result<(), QueryError> {
    let mut unknown = Vec::new();
    for (i, row) in rows.iter().enumerate() {
        if row.is_empty() {
            return Err(QueryError::EmptyRow { row: i + 1 });
        }
        for column in row.keys() {
            if !schema.has_column(column) {
                unknown.push(format!("{column}(row#{})", i + 1));
            }
        }
    }
    if unknown.is_empty() {
        Ok(())
    } else {
        Err(QueryError::UnknownColumn(unknown))
    }
}
