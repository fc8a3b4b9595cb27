//! SQL serialization of the mini-AST.
//!
//! The surface is deliberately rigid so that repeated builds over the same
//! catalog are byte-identical: projection list, then ` \nFROM `, subqueries as
//! `(…) AS "alias"`, ` \nWHERE `, ` GROUP BY `. Identifiers are double-quoted
//! only when they are not lowercase-safe or collide with a reserved word;
//! function names render lowercased; a wildcard aggregate argument renders as
//! the literal `'*'` (`COUNT(*)` emits `count('*')`).

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use super::{
    BinaryOperator, Expr, Join, JoinKind, Literal, Relation, Select, SelectItem, TableRef,
    UnaryOperator,
};

/// Reserved words that are always quoted when used as identifiers.
const RESERVED_WORDS: &[&str] = &[
    "all", "and", "as", "between", "by", "case", "cast", "cross", "distinct", "else", "end",
    "exists", "false", "from", "full", "group", "having", "in", "inner", "is", "join", "left",
    "like", "limit", "not", "null", "on", "or", "order", "outer", "right", "select", "then",
    "true", "union", "when", "where",
];

fn is_lowercase_safe(ident: &str) -> bool {
    static SAFE: OnceLock<Regex> = OnceLock::new();
    let re = SAFE.get_or_init(|| Regex::new(r"^[a-z_][a-z0-9_]*$").expect("Invalid regex pattern"));
    re.is_match(ident)
}

/// Quotes an identifier when required.
pub(crate) fn quote_ident(ident: &str) -> String {
    if is_lowercase_safe(ident) && RESERVED_WORDS.binary_search(&ident).is_err() {
        ident.to_string()
    } else {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }
}

fn fmt_comma_separated<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (index, item) in items.iter().enumerate() {
        if index > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Select {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SELECT ")?;
        fmt_comma_separated(f, &self.projection)?;
        if !self.from.is_empty() {
            write!(f, " \nFROM ")?;
            fmt_comma_separated(f, &self.from)?;
        }
        if let Some(selection) = &self.selection {
            write!(f, " \nWHERE {selection}")?;
        }
        if !self.group_by.is_empty() {
            write!(f, " GROUP BY ")?;
            fmt_comma_separated(f, &self.group_by)?;
        }
        Ok(())
    }
}

impl fmt::Display for SelectItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)?;
        if let Some(alias) = &self.alias {
            write!(f, " AS {}", quote_ident(alias))?;
        }
        Ok(())
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.relation)?;
        for join in &self.joins {
            write!(f, "{join}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Join {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keyword = match self.kind {
            JoinKind::Inner => "JOIN",
            JoinKind::LeftOuter => "LEFT OUTER JOIN",
            JoinKind::RightOuter => "RIGHT OUTER JOIN",
            JoinKind::FullOuter => "FULL OUTER JOIN",
            JoinKind::Cross => "CROSS JOIN",
        };
        write!(f, " {keyword} {}", self.relation)?;
        if let Some(constraint) = &self.constraint {
            write!(f, " ON {constraint}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Relation::Node { name } => write!(f, "{}", quote_ident(name)),
            Relation::Table { parts } => {
                for (index, part) in parts.iter().enumerate() {
                    if index > 0 {
                        write!(f, ".")?;
                    }
                    write!(f, "{}", quote_ident(part))?;
                }
                Ok(())
            }
            Relation::Subquery { query, alias } => {
                write!(f, "({query}) AS {}", quote_ident(alias))
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Identifier { parts } => {
                for (index, part) in parts.iter().enumerate() {
                    if index > 0 {
                        write!(f, ".")?;
                    }
                    write!(f, "{}", quote_ident(part))?;
                }
                Ok(())
            }
            Expr::Column { relation, name } => {
                if let Some(relation) = relation {
                    write!(f, "{}.", quote_ident(relation))?;
                }
                write!(f, "{}", quote_ident(name))
            }
            Expr::Wildcard => write!(f, "*"),
            Expr::Literal(literal) => write!(f, "{literal}"),
            Expr::Function { name, args } => {
                write!(f, "{}(", name.to_lowercase())?;
                for (index, arg) in args.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    match arg {
                        // SQLAlchemy-compatible rendering of aggregate wildcards.
                        Expr::Wildcard => write!(f, "'*'")?,
                        other => write!(f, "{other}")?,
                    }
                }
                write!(f, ")")
            }
            Expr::BinaryOp { left, op, right } => write!(f, "{left} {op} {right}"),
            Expr::UnaryOp { op, expr } => match op {
                UnaryOperator::Not => write!(f, "NOT {expr}"),
                UnaryOperator::Minus => write!(f, "-{expr}"),
                UnaryOperator::Plus => write!(f, "+{expr}"),
            },
            Expr::Nested(inner) => write!(f, "({inner})"),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Number(number) => write!(f, "{number}"),
            Literal::String(string) => write!(f, "'{}'", string.replace('\'', "''")),
            Literal::Boolean(boolean) => write!(f, "{boolean}"),
            Literal::Null => write!(f, "NULL"),
        }
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            BinaryOperator::Gt => ">",
            BinaryOperator::Lt => "<",
            BinaryOperator::GtEq => ">=",
            BinaryOperator::LtEq => "<=",
            BinaryOperator::Eq => "=",
            BinaryOperator::NotEq => "!=",
            BinaryOperator::And => "AND",
            BinaryOperator::Or => "OR",
            BinaryOperator::Plus => "+",
            BinaryOperator::Minus => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Modulo => "%",
        };
        write!(f, "{token}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("one"), "one");
        assert_eq!(quote_ident("user_id"), "user_id");
        assert_eq!(quote_ident("A"), "\"A\"");
        assert_eq!(quote_ident("core.comments"), "\"core.comments\"");
        assert_eq!(quote_ident("select"), "\"select\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_reserved_words_are_sorted() {
        let mut sorted = RESERVED_WORDS.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, RESERVED_WORDS);
    }

    #[test]
    fn test_render_table_select() {
        let select = Select {
            projection: vec![
                SelectItem::aliased(Expr::column("A", "one"), "one"),
                SelectItem::aliased(Expr::column("A", "two"), "two"),
            ],
            from: vec![TableRef::new(Relation::Table {
                parts: vec!["A".to_string()],
            })],
            selection: None,
            group_by: vec![],
        };
        assert_eq!(
            select.to_string(),
            "SELECT \"A\".one AS one, \"A\".two AS two \nFROM \"A\""
        );
    }

    #[test]
    fn test_render_subquery_with_where_and_group_by() {
        let inner = Select {
            projection: vec![SelectItem::aliased(Expr::column("comments", "user_id"), "user_id")],
            from: vec![TableRef::new(Relation::Table {
                parts: vec!["comments".to_string()],
            })],
            selection: None,
            group_by: vec![],
        };
        let outer = Select {
            projection: vec![SelectItem::unnamed(Expr::column("core.comments", "user_id"))],
            from: vec![TableRef::new(Relation::subquery(inner, "core.comments"))],
            selection: Some(Expr::binary(
                Expr::column("core.comments", "user_id"),
                BinaryOperator::Gt,
                Expr::Literal(Literal::Number("1".to_string())),
            )),
            group_by: vec![Expr::column("core.comments", "user_id")],
        };
        assert_eq!(
            outer.to_string(),
            "SELECT \"core.comments\".user_id \
             \nFROM (SELECT comments.user_id AS user_id \
             \nFROM comments) AS \"core.comments\" \
             \nWHERE \"core.comments\".user_id > 1 GROUP BY \"core.comments\".user_id"
        );
    }

    #[test]
    fn test_render_aggregate_wildcard() {
        let expr = Expr::Function {
            name: "COUNT".to_string(),
            args: vec![Expr::Wildcard],
        };
        assert_eq!(expr.to_string(), "count('*')");
    }

    #[test]
    fn test_render_literals() {
        assert_eq!(Literal::String("it's".to_string()).to_string(), "'it''s'");
        assert_eq!(Literal::Boolean(true).to_string(), "true");
        assert_eq!(Literal::Null.to_string(), "NULL");
    }

    #[test]
    fn test_render_join() {
        let select = Select {
            projection: vec![SelectItem::unnamed(Expr::Wildcard)],
            from: vec![TableRef {
                relation: Relation::Node {
                    name: "a".to_string(),
                },
                joins: vec![Join {
                    relation: Relation::Node {
                        name: "b".to_string(),
                    },
                    kind: JoinKind::LeftOuter,
                    constraint: Some(Expr::binary(
                        Expr::column("a", "id"),
                        BinaryOperator::Eq,
                        Expr::column("b", "id"),
                    )),
                }],
            }],
            selection: None,
            group_by: vec![],
        };
        assert_eq!(
            select.to_string(),
            "SELECT * \nFROM a LEFT OUTER JOIN b ON a.id = b.id"
        );
    }
}
