use crate::{
    api::registry::Tool,
    errors::{AppError, AppResult},
    guard::PathGuard,
    tools::{blocking, parse_params, write_output},
};
use async_trait::async_trait;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::{json, Value};
use std::{path::Path, time::Duration};
use tracing::info;

pub type Row = Vec<Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    Sqlite,
    DuckDb,
}

impl Engine {
    /// `.db` files are SQLite, anything else goes to DuckDB.
    pub fn for_path(db_path: &str) -> Self {
        if db_path.ends_with(".db") { Engine::Sqlite } else { Engine::DuckDb }
    }

    fn execute(self, db_path: &str, query: &str) -> AppResult<Vec<Row>> {
        match self {
            Engine::Sqlite => query_sqlite(db_path, query),
            Engine::DuckDb => query_duckdb(db_path, query),
        }
    }
}

/// Runs `query` against the database at `db_path` and writes the rows, as JSON
/// text, to `output_path`. Both paths are checked before the database is opened.
pub async fn run_query(guard: &PathGuard, db_path: &str, query: &str, output_path: &str) -> AppResult<Vec<Row>> {
    guard.require(&[db_path, output_path], "db_path and output_path")?;
    let engine = Engine::for_path(db_path);
    // SQLite files are never created implicitly; DuckDB opens or creates.
    if engine == Engine::Sqlite && !Path::new(db_path).exists() {
        return Err(AppError::NotFound(db_path.to_string()));
    }

    let (db, sql) = (db_path.to_string(), query.to_string());
    let rows = blocking(move || engine.execute(&db, &sql)).await?;

    let rendered = serde_json::to_string(&rows).map_err(|e| AppError::Internal(e.to_string()))?;
    write_output(output_path, rendered).await?;
    info!(db_path, ?engine, rows = rows.len(), output_path, "query executed");
    Ok(rows)
}

fn sql_err(e: impl ToString) -> AppError {
    AppError::external("sql query", e)
}

fn query_sqlite(db_path: &str, query: &str) -> AppResult<Vec<Row>> {
    use rusqlite::{types::ValueRef, Connection, OpenFlags};

    let conn = Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| AppError::external("open database", e))?;
    conn.busy_timeout(Duration::from_secs(5)).map_err(sql_err)?;

    let mut stmt = conn.prepare(query).map_err(sql_err)?;
    let columns = stmt.column_count();
    let mut rows = stmt.query([]).map_err(sql_err)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(sql_err)? {
        let mut values = Vec::with_capacity(columns);
        for i in 0..columns {
            let value = match row.get_ref(i).map_err(sql_err)? {
                ValueRef::Null => Value::Null,
                ValueRef::Integer(n) => json!(n),
                ValueRef::Real(f) => json!(f),
                ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
                ValueRef::Blob(b) => Value::String(base64::engine::general_purpose::STANDARD.encode(b)),
            };
            values.push(value);
        }
        out.push(values);
    }
    Ok(out)
}

#[cfg(feature = "duckdb")]
fn query_duckdb(db_path: &str, query: &str) -> AppResult<Vec<Row>> {
    use duckdb::{types::Value as Duck, Connection};

    let conn = Connection::open(db_path).map_err(|e| AppError::external("open database", e))?;
    let mut stmt = conn.prepare(query).map_err(sql_err)?;
    let mut rows = stmt.query([]).map_err(sql_err)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(sql_err)? {
        let columns = row.as_ref().column_count();
        let mut values = Vec::with_capacity(columns);
        for i in 0..columns {
            let value = match row.get::<_, Duck>(i).map_err(sql_err)? {
                Duck::Null => Value::Null,
                Duck::Boolean(b) => json!(b),
                Duck::TinyInt(n) => json!(n),
                Duck::SmallInt(n) => json!(n),
                Duck::Int(n) => json!(n),
                Duck::BigInt(n) => json!(n),
                Duck::UTinyInt(n) => json!(n),
                Duck::USmallInt(n) => json!(n),
                Duck::UInt(n) => json!(n),
                Duck::UBigInt(n) => json!(n),
                Duck::Float(f) => json!(f),
                Duck::Double(f) => json!(f),
                Duck::Text(s) => Value::String(s),
                Duck::Blob(b) => Value::String(base64::engine::general_purpose::STANDARD.encode(b)),
                other => Value::String(format!("{other:?}")),
            };
            values.push(value);
        }
        out.push(values);
    }
    Ok(out)
}

#[cfg(not(feature = "duckdb"))]
fn query_duckdb(db_path: &str, _query: &str) -> AppResult<Vec<Row>> {
    Err(AppError::external(
        "open database",
        format!("{db_path} needs the duckdb engine, which this build was compiled without (feature `duckdb`)"),
    ))
}

pub struct QueryTool {
    guard: PathGuard,
}

impl QueryTool {
    pub fn new(guard: PathGuard) -> Self { Self { guard } }
}

#[derive(Debug, Deserialize)]
struct QueryParams {
    db_path: String,
    query: String,
    output_path: String,
}

#[async_trait]
impl Tool for QueryTool {
    fn name(&self) -> &'static str { "sql_query" }
    fn description(&self) -> &'static str { "Run a SQL query on a SQLite (.db) or DuckDB database and save the rows." }
    fn capabilities(&self) -> serde_json::Value {
        json!({"input": {"type":"object","required":["db_path","query","output_path"],"properties": {"db_path": {"type":"string"},"query":{"type":"string"},"output_path":{"type":"string"}}}, "output": {"type":"object","properties": {"rows":{"type":"array","items":{"type":"array"}}}}})
    }
    async fn call(&self, params: serde_json::Value) -> AppResult<serde_json::Value> {
        let p: QueryParams = parse_params(params)?;
        let rows = run_query(&self.guard, &p.db_path, &p.query, &p.output_path).await?;
        Ok(json!({"rows": rows}))
    }
}
