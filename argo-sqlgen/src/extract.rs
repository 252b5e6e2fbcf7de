//! Pulls a single read-only SELECT out of raw model output.

use sqlparser::ast::{Query, SetExpr, Statement};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SqlRejection {
    #[error("no SELECT keyword in model output")]
    NoSelect,
    #[error("generated SQL does not parse: {0}")]
    Parse(String),
    #[error("expected one statement, found {0}")]
    StatementCount(usize),
    #[error("generated SQL is not a read-only query")]
    NotReadOnly,
}

/// Cut model output down to the statement starting at the first "SELECT"
/// (any case) and ending at the first ";", then require it to parse as exactly one
/// read-only query.
pub fn extract_select(raw: &str) -> Result<String, SqlRejection> {
    // ASCII upper-casing keeps byte offsets aligned with `raw`.
    let start = raw
        .to_ascii_uppercase()
        .find("SELECT")
        .ok_or(SqlRejection::NoSelect)?;
    let tail = &raw[start..];
    let sql = match tail.find(';') {
        Some(end) => &tail[..=end],
        None => tail.trim_end().trim_end_matches("```").trim_end(),
    };
    validate_read_only(sql)?;
    Ok(sql.trim_end().to_string())
}

pub fn validate_read_only(sql: &str) -> Result<(), SqlRejection> {
    let statements = Parser::parse_sql(&PostgreSqlDialect {}, sql)
        .map_err(|e| SqlRejection::Parse(e.to_string()))?;
    match statements.as_slice() {
        [Statement::Query(query)] if read_only_query(query) => Ok(()),
        [_] => Err(SqlRejection::NotReadOnly),
        other => Err(SqlRejection::StatementCount(other.len())),
    }
}

fn read_only_query(query: &Query) -> bool {
    if !query.locks.is_empty() {
        return false;
    }
    if let Some(with) = &query.with {
        if !with.cte_tables.iter().all(|cte| read_only_query(&cte.query)) {
            return false;
        }
    }
    read_only_set_expr(&query.body)
}

fn read_only_set_expr(expr: &SetExpr) -> bool {
    match expr {
        SetExpr::Select(select) => select.into.is_none(),
        SetExpr::Query(query) => read_only_query(query),
        SetExpr::SetOperation { left, right, .. } => {
            read_only_set_expr(left) && read_only_set_expr(right)
        }
        SetExpr::Values(_) | SetExpr::Table(_) => true,
        _ => false,
    }
}
