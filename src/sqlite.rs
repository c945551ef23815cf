//! A table of a SQLite database exposed as a datasource.
//!
//! The schema is read from the table once at construction. Query parts are
//! translated into SQL, and every statement is bounded by the timeout through
//! SQLite's progress handler.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, ErrorCode, OpenFlags, params_from_iter};
use tracing::trace;

use crate::dataset::{OtherHasher, QueryResultsList, Results, Row, Schema, no_results};
use crate::datasource::{Datasource, Deadline};
use crate::error::{Result, TributaryError};
use crate::query::{Matcher, QueryPart};
use crate::ram::{KEY_SEPARATOR, RamDataset, compose_key};
use crate::registry::SourceDesc;

// the progress handler is consulted every this many virtual machine instructions
const PROGRESS_STEPS: i32 = 1000;

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn escape_like(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());
    for c in literal.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// The SQL condition and its bound argument for one part.
fn condition(part: &QueryPart) -> (String, String) {
    let column = quote(part.column());
    match part.matcher() {
        Matcher::Exact(s) => (format!("lower({}) = lower(?)", column), s),
        Matcher::Prefix(s) => (format!("lower({}) LIKE ? ESCAPE '\\'", column), format!("{}%", escape_like(&s))),
        Matcher::Suffix(s) => (format!("lower({}) LIKE ? ESCAPE '\\'", column), format!("%{}", escape_like(&s))),
        Matcher::Contains(s) => (format!("lower({}) LIKE ? ESCAPE '\\'", column), format!("%{}%", escape_like(&s))),
    }
}

fn text(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(r) => Some(r.to_string()),
        ValueRef::Text(t) => Some(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Some(String::from_utf8_lossy(b).into_owned()),
    }
}

pub struct SqliteDatasource {
    name: String,
    table: String,
    schema: Arc<Schema>,
    keys: Vec<String>,
    connection: Mutex<Connection>,
}

impl SqliteDatasource {
    /// Opens the database file read-only.
    pub fn open(name: &str, path: &str, table: &str, keys: Vec<String>) -> Result<Self> {
        // a read-only in-memory database is always empty
        if path.is_empty() || path == ":memory:" || path.contains("mode=memory") {
            return Err(TributaryError::config(
                name,
                format!("PATH \"{}\" does not name a database file", path),
            ));
        }
        let connection = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| TributaryError::config(name, format!("Cannot open \"{}\": {}", path, e)))?;
        Self::from_connection(name, connection, table, keys)
    }

    pub fn from_connection(name: &str, connection: Connection, table: &str, keys: Vec<String>) -> Result<Self> {
        let columns = {
            let mut statement = connection
                .prepare(&format!("PRAGMA table_info({})", quote(table)))
                .map_err(|e| TributaryError::config(name, e.to_string()))?;
            let names = statement
                .query_map([], |row| row.get::<_, String>(1))
                .map_err(|e| TributaryError::config(name, e.to_string()))?;
            names
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| TributaryError::config(name, e.to_string()))?
        };
        if columns.is_empty() {
            return Err(TributaryError::config(name, format!("Table \"{}\" does not exist or has no columns", table)));
        }
        let schema = Schema::new(name, columns)?;
        if keys.is_empty() {
            return Err(TributaryError::config(name, "KEYS specification is missing or empty"));
        }
        if let Some(bad) = keys.iter().find(|k| !schema.contains(k)) {
            return Err(TributaryError::config(name, format!("Key column \"{}\" is not in the schema", bad)));
        }
        Ok(Self {
            name: name.to_string(),
            table: table.to_string(),
            schema: Arc::new(schema),
            keys,
            connection: Mutex::new(connection),
        })
    }

    pub fn from_desc(desc: &SourceDesc) -> Result<Self> {
        let name = desc.name()?;
        let path = desc.require(&desc.path, "PATH")?;
        let table = desc.require(&desc.table, "TABLE")?;
        Self::open(name, path, table, desc.keys.clone())
    }

    fn select(&self) -> String {
        let columns: Vec<String> = self.schema.iter().map(|c| quote(c)).collect();
        format!("SELECT {} FROM {}", columns.join(", "), quote(&self.table))
    }

    /// Runs `sql` under the deadline and turns every result row into a dataset.
    fn query(&self, sql: &str, args: &[String], timeout: Duration, operation: &'static str) -> Result<Vec<Row>> {
        let deadline = Deadline::after(timeout);
        if deadline.expired() {
            return Err(TributaryError::timeout(&self.name, operation));
        }
        let connection = self
            .connection
            .lock()
            .map_err(|_| TributaryError::backend(&self.name, "connection lock poisoned"))?;
        connection.progress_handler(PROGRESS_STEPS, Some(move || deadline.expired()));
        trace!(datasource = %self.name, sql, "sqlite query");
        let outcome = self.collect(&connection, sql, args);
        connection.progress_handler(0, None::<fn() -> bool>);
        outcome.map_err(|e| match e.sqlite_error_code() {
            Some(ErrorCode::OperationInterrupted) => TributaryError::timeout(&self.name, operation),
            _ => TributaryError::backend(&self.name, e.to_string()),
        })
    }

    fn collect(&self, connection: &Connection, sql: &str, args: &[String]) -> rusqlite::Result<Vec<Row>> {
        let mut statement = connection.prepare(sql)?;
        let mut rows = statement.query(params_from_iter(args.iter()))?;
        let mut datasets: Vec<Row> = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = HashMap::<String, String, OtherHasher>::default();
            for (index, column) in self.schema.iter().enumerate() {
                if let Some(value) = text(row.get_ref(index)?) {
                    values.insert(column.clone(), value);
                }
            }
            let key = compose_key(&self.keys, |c| values.get(c).cloned());
            datasets.push(Arc::new(
                RamDataset::new(Arc::clone(&self.schema), key, values).with_producer("sqlite"),
            ));
        }
        Ok(datasets)
    }
}

impl Datasource for SqliteDatasource {
    fn name(&self) -> &str {
        &self.name
    }
    fn schema(&self) -> &Schema {
        &self.schema
    }
    fn find(&self, query: &[QueryPart], timeout: Duration) -> Result<Results> {
        if query.is_empty() || query.iter().any(|p| !self.schema.contains(p.column())) {
            return Ok(no_results());
        }
        let (conditions, args): (Vec<String>, Vec<String>) = query.iter().map(condition).unzip();
        let sql = format!("{} WHERE {}", self.select(), conditions.join(" AND "));
        let rows = self.query(&sql, &args, timeout, "find")?;
        Ok(QueryResultsList::new(rows).boxed())
    }
    fn datasets_by_key(&self, keys: &[String], timeout: Duration) -> Result<Results> {
        let mut conditions = Vec::new();
        let mut args = Vec::new();
        for key in keys {
            let values: Vec<&str> = key.split(KEY_SEPARATOR).collect();
            if values.len() != self.keys.len() {
                continue;
            }
            let equalities: Vec<String> = self
                .keys
                .iter()
                .map(|c| format!("coalesce(CAST({} AS TEXT), '') = ?", quote(c)))
                .collect();
            conditions.push(format!("({})", equalities.join(" AND ")));
            args.extend(values.into_iter().map(String::from));
        }
        if conditions.is_empty() {
            return Ok(no_results());
        }
        let sql = format!("{} WHERE {}", self.select(), conditions.join(" OR "));
        let rows = self.query(&sql, &args, timeout, "datasets_by_key")?;
        Ok(QueryResultsList::new(rows).boxed())
    }
    fn contents(&self, timeout: Duration) -> Result<Results> {
        let rows = self.query(&self.select(), &[], timeout, "contents")?;
        Ok(QueryResultsList::new(rows).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("50%_a\\b"), "50\\%\\_a\\\\b");
    }

    #[test]
    fn parts_become_conditions() {
        let (sql, arg) = condition(&QueryPart::new("Name", "Mül*"));
        assert_eq!(sql, "lower(\"Name\") LIKE ? ESCAPE '\\'");
        assert_eq!(arg, "mül%");
        let (sql, arg) = condition(&QueryPart::new("Name", "Anna"));
        assert_eq!(sql, "lower(\"Name\") = lower(?)");
        assert_eq!(arg, "anna");
    }
}
