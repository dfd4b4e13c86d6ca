use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;

use super::{parse_arguments, schema_for, SqlTool};
use crate::db::Cursor;
use crate::error::AgentError;

const MAX_ROWS: usize = 100;

lazy_static::lazy_static! {
    static ref READ_ONLY_KEYWORDS: HashSet<&'static str> =
        ["SELECT", "WITH", "VALUES", "EXPLAIN"].into_iter().collect();
}

#[derive(Deserialize, JsonSchema)]
pub struct RunQueryParams {
    #[schemars(description = "A single read-only SQLite SELECT statement")]
    sql: String,
}

pub struct RunQuery;

impl SqlTool for RunQuery {
    fn name(&self) -> &'static str {
        "run_query"
    }

    fn description(&self) -> &'static str {
        "Execute one read-only SQLite statement (SELECT or WITH ... SELECT) and return the result \
         as a pipe separated table with a header line. At most 100 rows are returned, so use \
         aggregates, WHERE clauses and LIMIT to keep results small. Statements that modify the \
         database (INSERT, UPDATE, DELETE, DROP, ALTER, CREATE, ...) are rejected."
    }

    fn parameters(&self) -> Value {
        schema_for::<RunQueryParams>()
    }

    fn call(&self, cursor: &Cursor<'_>, arguments: Value) -> Result<String, AgentError> {
        let params: RunQueryParams = parse_arguments(self.name(), arguments)?;
        let sql = check_statement(&params.sql)?;
        cursor.ensure_read_only(sql)?;
        Ok(cursor.query(sql, MAX_ROWS)?.to_text())
    }
}

/// Reject anything but a single statement starting with a read-only keyword.
/// Returns the statement up to its terminating semicolon.
pub fn check_statement(sql: &str) -> Result<&str, AgentError> {
    let mut sql = sql.trim();
    if let Some(pos) = find_statement_separator(sql) {
        let mut rest = skip_comments(&sql[pos + 1..]);
        while let Some(more) = rest.strip_prefix(';') {
            rest = skip_comments(more);
        }
        if !rest.is_empty() {
            return Err(AgentError::InvalidQuery(
                "only one statement per query is allowed".to_string(),
            ));
        }
        sql = sql[..pos].trim_end();
    }

    let mut head = skip_comments(sql);
    if head.is_empty() {
        return Err(AgentError::InvalidQuery("empty statement".to_string()));
    }
    while let Some(rest) = head.strip_prefix('(') {
        head = skip_comments(rest);
    }

    let keyword: String = head
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_uppercase();
    if !READ_ONLY_KEYWORDS.contains(keyword.as_str()) {
        return Err(AgentError::InvalidQuery(format!(
            "only SELECT queries are allowed, refusing to run {}",
            if keyword.is_empty() { "this statement" } else { keyword.as_str() }
        )));
    }

    Ok(sql)
}

/// The text after any leading whitespace and comments.
fn skip_comments(sql: &str) -> &str {
    let mut rest = sql.trim_start();
    loop {
        if let Some(comment) = rest.strip_prefix("--") {
            rest = comment.find('\n').map_or("", |end| &comment[end + 1..]);
        } else if let Some(comment) = rest.strip_prefix("/*") {
            rest = comment.find("*/").map_or("", |end| &comment[end + 2..]);
        } else {
            return rest;
        }
        rest = rest.trim_start();
    }
}

/// Byte offset of the first `;` outside quotes and comments.
fn find_statement_separator(sql: &str) -> Option<usize> {
    let bytes = sql.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                let closing = if q == b'[' { b']' } else { q };
                if b == closing {
                    quote = None;
                }
            }
            None => match b {
                b'\'' | b'"' | b'`' | b'[' => quote = Some(b),
                b'-' if bytes.get(i + 1) == Some(&b'-') => {
                    while i < bytes.len() && bytes[i] != b'\n' {
                        i += 1;
                    }
                }
                b'/' if bytes.get(i + 1) == Some(&b'*') => {
                    i += 2;
                    while i + 1 < bytes.len() && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                        i += 1;
                    }
                    i += 1;
                }
                b';' => return Some(i),
                _ => {}
            },
        }
        i += 1;
    }
    None
}
