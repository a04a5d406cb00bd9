//! Rendering of [`Statement`]s to parameterized SQL text.
//!
//! Every literal becomes a `$n::TYPE` placeholder. Backends bind the values
//! in `params` as text; the cast converts them to the column type.

use std::fmt::Write;

use super::{quote_ident, AlterAction, Condition, Literal, Param, Statement};

/// SQL text plus its positional bind values.
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub sql: String,
    pub params: Vec<Literal>,
}

pub(crate) struct SqlWriter {
    sql: String,
    params: Vec<Literal>,
}

impl SqlWriter {
    pub(crate) fn new() -> Self {
        Self {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, s: &str) {
        self.sql.push_str(s);
    }

    pub(crate) fn push_ident(&mut self, name: &str) {
        self.sql.push_str(&quote_ident(name));
    }

    pub(crate) fn push_param(&mut self, param: &Param) {
        self.params.push(param.value.clone());
        let _ = write!(
            self.sql,
            "${}::{}",
            self.params.len(),
            param.column_type.cast_target()
        );
    }

    fn push_idents(&mut self, names: &[String]) {
        for (i, name) in names.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.push_ident(name);
        }
    }

    fn push_params(&mut self, params: &[Param]) {
        for (i, param) in params.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.push_param(param);
        }
    }

    fn push_where(&mut self, filter: &Option<Condition>) {
        if let Some(cond) = filter {
            self.push(" WHERE ");
            cond.write_sql(self);
        }
    }

    pub(crate) fn finish(self) -> Rendered {
        Rendered {
            sql: self.sql,
            params: self.params,
        }
    }
}

pub(crate) fn render(stmt: &Statement) -> Rendered {
    let mut w = SqlWriter::new();
    match stmt {
        Statement::CreateTable {
            table,
            columns,
            if_not_exists,
        } => {
            w.push("CREATE TABLE ");
            if *if_not_exists {
                w.push("IF NOT EXISTS ");
            }
            w.push_ident(table);
            w.push(" (");
            let defs: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
            w.push(&defs.join(", "));
            w.push(")");
        }
        Statement::DropTable { table, if_exists } => {
            w.push("DROP TABLE ");
            if *if_exists {
                w.push("IF EXISTS ");
            }
            w.push_ident(table);
        }
        Statement::AlterTable { table, actions } => {
            w.push("ALTER TABLE ");
            w.push_ident(table);
            for (i, action) in actions.iter().enumerate() {
                w.push(if i == 0 { " " } else { ", " });
                match action {
                    AlterAction::AddColumn(def) => {
                        w.push("ADD COLUMN ");
                        w.push(&def.to_string());
                    }
                    AlterAction::DropColumn(name) => {
                        w.push("DROP COLUMN ");
                        w.push_ident(name);
                    }
                }
            }
        }
        Statement::Insert {
            table,
            columns,
            rows,
            returning,
        } => {
            w.push("INSERT INTO ");
            w.push_ident(table);
            w.push(" (");
            w.push_idents(columns);
            w.push(") VALUES ");
            for (i, row) in rows.iter().enumerate() {
                if i > 0 {
                    w.push(", ");
                }
                w.push("(");
                w.push_params(row);
                w.push(")");
            }
            if *returning {
                w.push(" RETURNING *");
            }
        }
        Statement::Update {
            table,
            assignments,
            filter,
            returning,
        } => {
            w.push("UPDATE ");
            w.push_ident(table);
            w.push(" SET ");
            for (i, (column, param)) in assignments.iter().enumerate() {
                if i > 0 {
                    w.push(", ");
                }
                w.push_ident(column);
                w.push(" = ");
                w.push_param(param);
            }
            w.push_where(filter);
            if *returning {
                w.push(" RETURNING *");
            }
        }
        Statement::Delete {
            table,
            filter,
            returning,
        } => {
            w.push("DELETE FROM ");
            w.push_ident(table);
            w.push_where(filter);
            if *returning {
                w.push(" RETURNING *");
            }
        }
        Statement::Select {
            table,
            fields,
            filter,
            order_by,
            limit,
            offset,
        } => {
            w.push("SELECT ");
            if fields.is_empty() {
                w.push("*");
            } else {
                w.push_idents(fields);
            }
            w.push(" FROM ");
            w.push_ident(table);
            w.push_where(filter);
            for (i, order) in order_by.iter().enumerate() {
                w.push(if i == 0 { " ORDER BY " } else { ", " });
                w.push_ident(&order.column);
                if order.descending {
                    w.push(" DESC");
                }
            }
            if let Some(limit) = limit {
                w.push(&format!(" LIMIT {limit}"));
            }
            if let Some(offset) = offset {
                w.push(&format!(" OFFSET {offset}"));
            }
        }
    }
    w.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::{ColumnDef, OrderBy};
    use crate::types::ColumnType;

    fn int(v: i64) -> Param {
        Param::new(Literal::Int(v), ColumnType::Integer)
    }

    fn text(v: &str) -> Param {
        Param::new(Literal::Text(v.to_string()), ColumnType::Varchar)
    }

    #[test]
    fn test_render_insert_numbers_placeholders_across_rows() {
        let stmt = Statement::Insert {
            table: "posts".to_string(),
            columns: vec!["id".to_string(), "title".to_string()],
            rows: vec![vec![int(1), text("a")], vec![int(2), text("b")]],
            returning: false,
        };
        let r = stmt.render();
        assert_eq!(
            r.sql,
            "INSERT INTO \"posts\" (\"id\", \"title\") VALUES ($1::INTEGER, $2::TEXT), ($3::INTEGER, $4::TEXT)"
        );
        assert_eq!(
            r.params,
            vec![
                Literal::Int(1),
                Literal::Text("a".to_string()),
                Literal::Int(2),
                Literal::Text("b".to_string()),
            ]
        );
    }

    #[test]
    fn test_render_update_with_where() {
        let stmt = Statement::Update {
            table: "posts".to_string(),
            assignments: vec![("title".to_string(), text("x"))],
            filter: Some(Condition::Eq {
                column: "id".to_string(),
                value: int(7),
            }),
            returning: false,
        };
        assert_eq!(
            stmt.render().sql,
            "UPDATE \"posts\" SET \"title\" = $1::TEXT WHERE \"id\" = $2::INTEGER"
        );
    }

    #[test]
    fn test_render_delete_returning() {
        let stmt = Statement::Delete {
            table: "posts".to_string(),
            filter: Some(Condition::IsNull {
                column: "title".to_string(),
            }),
            returning: true,
        };
        assert_eq!(
            stmt.render().sql,
            "DELETE FROM \"posts\" WHERE \"title\" IS NULL RETURNING *"
        );
    }

    #[test]
    fn test_render_select_options() {
        let stmt = Statement::Select {
            table: "posts".to_string(),
            fields: vec!["id".to_string(), "title".to_string()],
            filter: None,
            order_by: vec![OrderBy {
                column: "id".to_string(),
                descending: true,
            }],
            limit: Some(10),
            offset: Some(20),
        };
        assert_eq!(
            stmt.render().sql,
            "SELECT \"id\", \"title\" FROM \"posts\" ORDER BY \"id\" DESC LIMIT 10 OFFSET 20"
        );

        let star = Statement::Select {
            table: "posts".to_string(),
            fields: Vec::new(),
            filter: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
        };
        assert_eq!(star.render().sql, "SELECT * FROM \"posts\"");
    }

    #[test]
    fn test_render_alter_table_joins_clauses() {
        let def = ColumnDef {
            name: "age".to_string(),
            column_type: ColumnType::Integer,
            length: None,
            precision: None,
            scale: None,
            primary: false,
            unique: false,
            not_null: false,
            default: Some(Literal::Int(0)),
        };
        let stmt = Statement::AlterTable {
            table: "people".to_string(),
            actions: vec![
                AlterAction::AddColumn(def),
                AlterAction::DropColumn("nick".to_string()),
            ],
        };
        assert_eq!(
            stmt.render().sql,
            "ALTER TABLE \"people\" ADD COLUMN \"age\" INTEGER DEFAULT (0), DROP COLUMN \"nick\""
        );
    }

    #[test]
    fn test_render_create_and_drop() {
        let stmt = Statement::DropTable {
            table: "people".to_string(),
            if_exists: true,
        };
        assert_eq!(stmt.render().sql, "DROP TABLE IF EXISTS \"people\"");
        assert!(stmt.render().params.is_empty());
    }
}
