use rusqlite::types::ValueRef;
use rusqlite::{Connection, ErrorCode, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::AgentError;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_CELL_CHARS: usize = 200;

/// Handle to the single database file. Connections are opened per use and never kept.
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
}

impl Database {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Run `f` against a fresh read-only connection that is closed when `f` returns.
    pub fn with_cursor<T, F>(&self, f: F) -> Result<T, AgentError>
    where
        F: FnOnce(&Cursor<'_>) -> Result<T, AgentError>,
    {
        let conn = self.connect()?;
        let result = f(&Cursor { conn: &conn });

        if let Err((_, err)) = conn.close() {
            warn!(path = %self.path.display(), error = %err, "Failed to close database connection");
        }
        result
    }

    fn connect(&self) -> Result<Connection, AgentError> {
        if !self.path.is_file() {
            return Err(AgentError::DatabaseUnavailable(format!(
                "{} does not exist",
                self.path.display()
            )));
        }

        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| {
            AgentError::DatabaseUnavailable(format!("{}: {}", self.path.display(), e))
        })?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| AgentError::DatabaseUnavailable(e.to_string()))?;

        debug!(path = %self.path.display(), "Opened database connection");
        Ok(conn)
    }

    /// File size and per-table row counts, read straight from the catalog.
    pub fn info(&self) -> Result<DatabaseInfo, AgentError> {
        let size_bytes = std::fs::metadata(&self.path)
            .map(|m| m.len())
            .map_err(|e| AgentError::DatabaseUnavailable(e.to_string()))?;

        let tables = self.with_cursor(|cursor| {
            cursor
                .table_names()?
                .into_iter()
                .map(|name| {
                    let row_count = cursor.count_rows(&name)?;
                    Ok(TableInfo { name, row_count })
                })
                .collect::<Result<Vec<_>, AgentError>>()
        })?;

        Ok(DatabaseInfo {
            path: self.path.clone(),
            size_bytes,
            tables,
        })
    }
}

/// Read access to one open connection.
pub struct Cursor<'conn> {
    conn: &'conn Connection,
}

impl Cursor<'_> {
    pub fn table_names(&self) -> Result<Vec<String>, AgentError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            )
            .map_err(query_error)?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(query_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(query_error)?;
        Ok(names)
    }

    pub fn table_exists(&self, table: &str) -> Result<bool, AgentError> {
        Ok(self.table_sql(table)?.is_some())
    }

    /// The `CREATE TABLE` statement of `table`, if the table exists.
    pub fn table_sql(&self, table: &str) -> Result<Option<String>, AgentError> {
        let sql = self
            .conn
            .query_row(
                "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()
            .map_err(query_error)?;
        Ok(sql.map(|s| s.unwrap_or_default()))
    }

    pub fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>, AgentError> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", quote_identifier(table)))
            .map_err(query_error)?;
        let columns = stmt
            .query_map([], |row| {
                Ok(ColumnInfo {
                    name: row.get(1)?,
                    data_type: row.get(2)?,
                    not_null: row.get::<_, i64>(3)? != 0,
                    primary_key: row.get::<_, i64>(5)? != 0,
                })
            })
            .map_err(query_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(query_error)?;
        Ok(columns)
    }

    pub fn count_rows(&self, table: &str) -> Result<i64, AgentError> {
        self.conn
            .query_row(
                &format!("SELECT count(*) FROM {}", quote_identifier(table)),
                [],
                |row| row.get(0),
            )
            .map_err(query_error)
    }

    /// Prepare `sql` without running it; fails unless it is a single read-only statement.
    pub fn ensure_read_only(&self, sql: &str) -> Result<(), AgentError> {
        let stmt = self.conn.prepare(sql).map_err(query_error)?;
        if !stmt.readonly() {
            return Err(AgentError::InvalidQuery(
                "only read-only statements are allowed".to_string(),
            ));
        }
        Ok(())
    }

    /// Run a statement and collect at most `limit` rows.
    pub fn query(&self, sql: &str, limit: usize) -> Result<RowSet, AgentError> {
        let mut stmt = self.conn.prepare(sql).map_err(query_error)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let column_count = columns.len();

        let mut rows = stmt.query([]).map_err(query_error)?;
        let mut collected = Vec::new();
        let mut truncated = false;

        while let Some(row) = rows.next().map_err(query_error)? {
            if collected.len() == limit {
                truncated = true;
                break;
            }
            let mut cells = Vec::with_capacity(column_count);
            for i in 0..column_count {
                cells.push(render_value(row.get_ref(i).map_err(query_error)?));
            }
            collected.push(cells);
        }

        Ok(RowSet {
            columns,
            rows: collected,
            truncated,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub not_null: bool,
    pub primary_key: bool,
}

/// Rows returned by a query, already rendered to text.
#[derive(Debug, Clone, PartialEq)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub truncated: bool,
}

impl RowSet {
    pub fn to_text(&self) -> String {
        if self.rows.is_empty() {
            return format!("{}\n(no rows)", self.columns.join(" | "));
        }

        let mut out = self.columns.join(" | ");
        for row in &self.rows {
            out.push('\n');
            out.push_str(&row.join(" | "));
        }
        if self.truncated {
            out.push_str(&format!(
                "\n(showing the first {} rows only)",
                self.rows.len()
            ));
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableInfo {
    pub name: String,
    pub row_count: i64,
}

#[derive(Debug, Clone)]
pub struct DatabaseInfo {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub tables: Vec<TableInfo>,
}

impl DatabaseInfo {
    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / (1024.0 * 1024.0)
    }

    /// Path shown to the user, relative to `base` when possible.
    pub fn display_path(&self, base: &Path) -> String {
        self.path
            .strip_prefix(base)
            .unwrap_or(&self.path)
            .display()
            .to_string()
    }
}

pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn render_value(value: ValueRef<'_>) -> String {
    let text = match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        ValueRef::Blob(bytes) => format!("<blob {} bytes>", bytes.len()),
    };

    if text.chars().count() > MAX_CELL_CHARS {
        let cut: String = text.chars().take(MAX_CELL_CHARS).collect();
        format!("{}...", cut)
    } else {
        text
    }
}

fn query_error(err: rusqlite::Error) -> AgentError {
    match err.sqlite_error_code() {
        Some(ErrorCode::NotADatabase | ErrorCode::CannotOpen | ErrorCode::DatabaseCorrupt) => {
            AgentError::DatabaseUnavailable(err.to_string())
        }
        _ => AgentError::InvalidQuery(err.to_string()),
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::Database;
    use rusqlite::Connection;
    use tempfile::TempDir;

    /// A small shop database in a temp directory; keep the `TempDir` alive for the test.
    pub fn shop_database() -> (TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shop.sqlite");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, email TEXT);
             CREATE TABLE orders (id INTEGER PRIMARY KEY, user_id INTEGER, total REAL);
             INSERT INTO users (name, email) VALUES
                ('Ada', 'ada@example.com'),
                ('Brian', NULL),
                ('Chen', 'chen@example.com');
             INSERT INTO orders (user_id, total) VALUES (1, 19.5), (1, 5.25), (3, 100.0);",
        )
        .unwrap();
        drop(conn);
        (dir, Database::open(path))
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::shop_database;
    use super::*;

    #[test]
    fn test_missing_file_is_unavailable() {
        let db = Database::open("/definitely/not/here.sqlite");
        let err = db.with_cursor(|c| c.table_names()).unwrap_err();
        assert!(matches!(err, AgentError::DatabaseUnavailable(_)));
    }

    #[test]
    fn test_not_a_database_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.sqlite");
        std::fs::write(&path, "plain text, not sqlite\n".repeat(200)).unwrap();

        let err = Database::open(&path)
            .with_cursor(|c| c.table_names())
            .unwrap_err();
        assert!(matches!(err, AgentError::DatabaseUnavailable(_)));
    }

    #[test]
    fn test_table_introspection() {
        let (_dir, db) = shop_database();
        db.with_cursor(|cursor| {
            assert_eq!(cursor.table_names()?, vec!["orders", "users"]);
            assert!(cursor.table_exists("users")?);
            assert!(!cursor.table_exists("payments")?);
            assert_eq!(cursor.count_rows("users")?, 3);

            let columns = cursor.columns("users")?;
            assert_eq!(columns.len(), 3);
            assert!(columns[0].primary_key);
            assert!(columns[1].not_null);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_query_renders_rows_and_truncates() {
        let (_dir, db) = shop_database();
        let rows = db
            .with_cursor(|c| c.query("SELECT name, email FROM users ORDER BY id", 2))
            .unwrap();
        assert_eq!(rows.columns, vec!["name", "email"]);
        assert_eq!(rows.rows[1], vec!["Brian", "NULL"]);
        assert!(rows.truncated);

        let text = rows.to_text();
        assert!(text.starts_with("name | email\nAda | ada@example.com"));
        assert!(text.contains("first 2 rows"));
    }

    #[test]
    fn test_connection_is_read_only() {
        let (_dir, db) = shop_database();
        let err = db
            .with_cursor(|c| c.query("DELETE FROM users", 10))
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidQuery(_)));
        assert_eq!(db.with_cursor(|c| c.count_rows("users")).unwrap(), 3);
    }

    #[test]
    fn test_write_statement_is_not_read_only() {
        let (_dir, db) = shop_database();
        let result = db.with_cursor(|c| c.ensure_read_only("UPDATE users SET name = 'x'"));
        assert!(matches!(result, Err(AgentError::InvalidQuery(_))));
        assert!(db
            .with_cursor(|c| c.ensure_read_only("SELECT * FROM users"))
            .is_ok());
    }

    #[test]
    fn test_database_info() {
        let (dir, db) = shop_database();
        let info = db.info().unwrap();
        assert!(info.size_bytes > 0);
        assert_eq!(
            info.tables,
            vec![
                TableInfo { name: "orders".into(), row_count: 3 },
                TableInfo { name: "users".into(), row_count: 3 },
            ]
        );
        assert_eq!(info.display_path(dir.path()), "shop.sqlite");
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("users"), "\"users\"");
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }
}
