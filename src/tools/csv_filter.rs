use crate::{
    api::registry::Tool,
    errors::{AppError, AppResult},
    guard::PathGuard,
    tools::{parse_params, read_input},
};
use async_trait::async_trait;
use csv::StringRecord;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::info;

/// One CSV row keyed by header, in file column order.
pub type Record = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Integer,
    Float,
    Text,
}

impl ColumnKind {
    /// Empty cells do not affect the inferred kind.
    fn infer<'a>(cells: impl Iterator<Item = &'a str>) -> Self {
        let mut kind = ColumnKind::Integer;
        for cell in cells.map(str::trim).filter(|c| !c.is_empty()) {
            if kind == ColumnKind::Integer && cell.parse::<i64>().is_err() {
                kind = ColumnKind::Float;
            }
            if kind == ColumnKind::Float && cell.parse::<f64>().is_err() {
                return ColumnKind::Text;
            }
        }
        kind
    }

    fn value(self, cell: &str) -> Value {
        let trimmed = cell.trim();
        if trimmed.is_empty() {
            return Value::Null;
        }
        match self {
            ColumnKind::Integer => trimmed.parse::<i64>().map(Value::from).unwrap_or_else(|_| Value::String(cell.to_string())),
            ColumnKind::Float => trimmed.parse::<f64>().map(|f| json!(f)).unwrap_or_else(|_| Value::String(cell.to_string())),
            ColumnKind::Text => Value::String(cell.to_string()),
        }
    }
}

/// A string filter matches the raw cell text; a number matches numerically in numeric columns.
fn cell_matches(kind: ColumnKind, cell: &str, wanted: &Value) -> bool {
    match wanted {
        Value::String(s) => cell == s,
        Value::Number(n) => kind != ColumnKind::Text && cell.trim().parse::<f64>().ok() == n.as_f64(),
        Value::Bool(b) => cell.trim().eq_ignore_ascii_case(if *b { "true" } else { "false" }),
        Value::Null => cell.trim().is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

/// Returns the rows of `raw` whose `column` equals `wanted`, in file order.
pub fn filter_records(raw: &[u8], column: &str, wanted: &Value) -> AppResult<Vec<Record>> {
    let mut reader = csv::Reader::from_reader(raw);
    let headers = reader.headers().map_err(|e| AppError::external("parse csv", e))?.clone();
    let idx = headers
        .iter()
        .position(|h| h == column)
        .ok_or_else(|| AppError::InvalidInput(format!("unknown column '{column}'")))?;
    let rows = reader
        .records()
        .collect::<Result<Vec<StringRecord>, _>>()
        .map_err(|e| AppError::external("parse csv", e))?;
    let kinds: Vec<ColumnKind> = (0..headers.len())
        .map(|i| ColumnKind::infer(rows.iter().map(|r| r.get(i).unwrap_or(""))))
        .collect();

    Ok(rows
        .iter()
        .filter(|r| cell_matches(kinds[idx], r.get(idx).unwrap_or(""), wanted))
        .map(|r| {
            headers
                .iter()
                .zip(&kinds)
                .enumerate()
                .map(|(i, (h, kind))| (h.to_string(), kind.value(r.get(i).unwrap_or(""))))
                .collect()
        })
        .collect())
}

pub async fn filter_csv(guard: &PathGuard, csv_path: &str, column: &str, wanted: &Value) -> AppResult<Vec<Record>> {
    guard.require(&[csv_path], "csv_path")?;
    let raw = read_input(csv_path).await?;
    let records = filter_records(&raw, column, wanted)?;
    info!(csv_path, column, matched = records.len(), "csv filtered");
    Ok(records)
}

pub struct CsvFilterTool {
    guard: PathGuard,
}

impl CsvFilterTool {
    pub fn new(guard: PathGuard) -> Self { Self { guard } }
}

#[derive(Debug, Deserialize)]
struct CsvFilterParams {
    csv_path: String,
    filter_column: String,
    filter_value: Value,
}

#[async_trait]
impl Tool for CsvFilterTool {
    fn name(&self) -> &'static str { "csv_filter" }
    fn description(&self) -> &'static str { "Filter CSV rows where a column equals a value and return them as records." }
    fn capabilities(&self) -> serde_json::Value {
        json!({"input": {"type":"object","required":["csv_path","filter_column","filter_value"],"properties": {"csv_path": {"type":"string"},"filter_column":{"type":"string"},"filter_value":{}}}, "output": {"type":"object","properties": {"records":{"type":"array","items":{"type":"object"}}}}})
    }
    async fn call(&self, params: serde_json::Value) -> AppResult<serde_json::Value> {
        let p: CsvFilterParams = parse_params(params)?;
        let records = filter_csv(&self.guard, &p.csv_path, &p.filter_column, &p.filter_value).await?;
        Ok(json!({"records": records}))
    }
}
