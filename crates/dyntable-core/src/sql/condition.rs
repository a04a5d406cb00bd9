//! Boolean conditions for WHERE clauses.
//!
//! A [`Condition`] renders to SQL for real backends and can also be evaluated
//! directly against a row of [`Literal`]s, which is how the in-memory backend
//! filters.

use std::cmp::Ordering;

use super::render::SqlWriter;
use super::{Literal, Param};

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `col = $n`
    Eq { column: String, value: Param },
    /// `col IN ($1, $2, ...)`, optionally `OR col IS NULL`.
    In {
        column: String,
        values: Vec<Param>,
        or_null: bool,
    },
    /// `col IS NULL`
    IsNull { column: String },
    And(Vec<Condition>),
    Or(Vec<Condition>),
}

impl Condition {
    /// Collapse single-element groups.
    pub fn and(mut items: Vec<Condition>) -> Option<Condition> {
        match items.len() {
            0 => None,
            1 => items.pop(),
            _ => Some(Condition::And(items)),
        }
    }

    pub fn or(mut items: Vec<Condition>) -> Option<Condition> {
        match items.len() {
            0 => None,
            1 => items.pop(),
            _ => Some(Condition::Or(items)),
        }
    }

    /// Every column the condition references, in order of appearance.
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Condition::Eq { column, .. }
            | Condition::In { column, .. }
            | Condition::IsNull { column } => out.push(column),
            Condition::And(items) | Condition::Or(items) => {
                for item in items {
                    item.collect_columns(out);
                }
            }
        }
    }

    pub(crate) fn write_sql(&self, w: &mut SqlWriter) {
        match self {
            Condition::Eq { column, value } => {
                w.push_ident(column);
                w.push(" = ");
                w.push_param(value);
            }
            Condition::In {
                column,
                values,
                or_null,
            } => {
                if *or_null {
                    w.push("(");
                }
                w.push_ident(column);
                w.push(" IN (");
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        w.push(", ");
                    }
                    w.push_param(value);
                }
                w.push(")");
                if *or_null {
                    w.push(" OR ");
                    w.push_ident(column);
                    w.push(" IS NULL)");
                }
            }
            Condition::IsNull { column } => {
                w.push_ident(column);
                w.push(" IS NULL");
            }
            Condition::And(items) => write_group(w, items, " AND "),
            Condition::Or(items) => write_group(w, items, " OR "),
        }
    }

    /// Evaluate against a row. `lookup` resolves a column to its value;
    /// comparisons involving NULL are never true.
    pub fn eval<'a, F>(&self, lookup: &F) -> bool
    where
        F: Fn(&str) -> Option<&'a Literal>,
    {
        match self {
            Condition::Eq { column, value } => lookup(column)
                .map(|v| literal_eq(v, &value.value))
                .unwrap_or(false),
            Condition::In {
                column,
                values,
                or_null,
            } => match lookup(column) {
                None | Some(Literal::Null) => *or_null,
                Some(v) => values.iter().any(|p| literal_eq(v, &p.value)),
            },
            Condition::IsNull { column } => lookup(column).map_or(true, Literal::is_null),
            Condition::And(items) => items.iter().all(|c| c.eval(lookup)),
            Condition::Or(items) => items.iter().any(|c| c.eval(lookup)),
        }
    }
}

fn write_group(w: &mut SqlWriter, items: &[Condition], sep: &str) {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            w.push(sep);
        }
        let nested = matches!(item, Condition::And(v) | Condition::Or(v) if v.len() > 1);
        if nested {
            w.push("(");
        }
        item.write_sql(w);
        if nested {
            w.push(")");
        }
    }
}

fn literal_eq(a: &Literal, b: &Literal) -> bool {
    compare_literals(a, b) == Some(Ordering::Equal)
}

/// Compare two literals, returning an ordering if the types are comparable.
///
/// - Integers and numerics: compared numerically
/// - Text: lexicographically
/// - Booleans: false < true
/// - JSON: equality only
/// - NULL or mismatched types: `None`
pub fn compare_literals(a: &Literal, b: &Literal) -> Option<Ordering> {
    match (a, b) {
        (Literal::Int(x), Literal::Int(y)) => Some(x.cmp(y)),
        (Literal::Int(_) | Literal::Numeric(_), Literal::Int(_) | Literal::Numeric(_)) => {
            let (x, y) = (decimal_text(a), decimal_text(b));
            compare_decimals(&x, &y).or_else(|| approximate(a)?.partial_cmp(&approximate(b)?))
        }
        (Literal::Text(x), Literal::Text(y)) => Some(x.cmp(y)),
        (Literal::Bool(x), Literal::Bool(y)) => Some(x.cmp(y)),
        (Literal::Json(x), Literal::Json(y)) if x == y => Some(Ordering::Equal),
        _ => None,
    }
}

fn decimal_text(lit: &Literal) -> String {
    match lit {
        Literal::Int(i) => i.to_string(),
        Literal::Numeric(n) => n.clone(),
        _ => String::new(),
    }
}

/// Exact comparison of two plain decimals. `None` when either carries an
/// exponent.
fn compare_decimals(a: &str, b: &str) -> Option<Ordering> {
    let (neg_a, int_a, frac_a) = split_decimal(a)?;
    let (neg_b, int_b, frac_b) = split_decimal(b)?;
    let zero_a = int_a.is_empty() && frac_a.is_empty();
    let zero_b = int_b.is_empty() && frac_b.is_empty();
    let neg_a = neg_a && !zero_a;
    let neg_b = neg_b && !zero_b;
    if neg_a != neg_b {
        return Some(if neg_a { Ordering::Less } else { Ordering::Greater });
    }
    let magnitude = int_a
        .len()
        .cmp(&int_b.len())
        .then_with(|| int_a.cmp(int_b))
        .then_with(|| frac_a.cmp(frac_b));
    Some(if neg_a { magnitude.reverse() } else { magnitude })
}

/// Sign, integer digits without leading zeros, fraction digits without
/// trailing zeros.
fn split_decimal(s: &str) -> Option<(bool, &str, &str)> {
    if s.contains(['e', 'E']) {
        return None;
    }
    let (neg, rest) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let (int, frac) = rest.split_once('.').unwrap_or((rest, ""));
    Some((neg, int.trim_start_matches('0'), frac.trim_end_matches('0')))
}

fn approximate(lit: &Literal) -> Option<f64> {
    match lit {
        Literal::Int(i) => Some(*i as f64),
        Literal::Numeric(n) => n.parse().ok(),
        _ => None,
    }
}
