use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::client::{METHOD_DATA_CHUNK, METHOD_DELETE, METHOD_LIST_VIEW, METHOD_NUM_ROWS};
use crate::wire::{ChunkRequest, ColumnSpec, RowId};
use crate::{RpcError, RpcResult, RpcTransport};

/// Column whose cell carries `[rowId, canEdit, canDelete]`.
const ROWINFO: &str = "ROWINFO";

/// A seeded table served by [`MemoryTransport`].
#[derive(Debug, Clone)]
pub struct MemoryTable {
    pub table_id: String,
    pub columns: Vec<ColumnSpec>,
    pub rows: Vec<Vec<Value>>,
}

impl MemoryTable {
    pub fn new(table_id: impl Into<String>, columns: Vec<ColumnSpec>) -> Self {
        Self {
            table_id: table_id.into(),
            columns,
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<Value>) {
        self.rows.push(row);
    }

    fn column_index(&self, id: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.id == id)
    }

    fn row_id(&self, row: &[Value]) -> Option<RowId> {
        let cell = match self.column_index(ROWINFO) {
            Some(idx) => row.get(idx)?.get(0)?,
            None => row.first()?,
        };
        RowId::from_value(cell)
    }

    /// Equality filter: an object of `column: value` pairs, every pair must
    /// match. Anything else selects all rows.
    fn matches(&self, row: &[Value], filter: &Value) -> bool {
        let Value::Object(terms) = filter else {
            return true;
        };
        terms.iter().all(|(column, expected)| {
            self.column_index(column)
                .and_then(|idx| row.get(idx))
                .is_some_and(|cell| cell == expected)
        })
    }

    fn filtered(&self, filter: &Value) -> Vec<&Vec<Value>> {
        self.rows
            .iter()
            .filter(|row| self.matches(row, filter))
            .collect()
    }
}

/// One call observed by [`MemoryTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: String,
    pub params: Vec<Value>,
}

/// In-memory table service for tests and early wiring. Serves the four
/// table methods from seeded tables and records every call it receives.
#[derive(Default)]
pub struct MemoryTransport {
    tables: Mutex<HashMap<String, MemoryTable>>,
    calls: Mutex<Vec<RecordedCall>>,
    failures: Mutex<HashMap<String, usize>>,
}

impl MemoryTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert_table(&self, table: MemoryTable) {
        self.tables.lock().insert(table.table_id.clone(), table);
    }

    /// Makes the next `times` calls of `method` fail with a transport error.
    pub fn fail_next(&self, method: &str, times: usize) {
        *self.failures.lock().entry(method.to_string()).or_default() += times;
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, method: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.method == method).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn rows(&self, table_id: &str) -> Vec<Vec<Value>> {
        self.tables
            .lock()
            .get(table_id)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    fn take_failure(&self, method: &str) -> bool {
        let mut failures = self.failures.lock();
        match failures.get_mut(method) {
            Some(left) if *left > 0 => {
                *left -= 1;
                true
            }
            _ => false,
        }
    }

    fn dispatch(&self, method: &str, params: &[Value]) -> RpcResult<Value> {
        let table_id = param_handle(params, 0)?;
        let mut tables = self.tables.lock();
        let table = tables.get_mut(&table_id).ok_or_else(|| RpcError::Server {
            code: 404,
            message: format!("unknown table {table_id}"),
        })?;

        match method {
            METHOD_LIST_VIEW => Ok(json!({
                "tableId": table.table_id,
                "columns": table.columns,
            })),
            METHOD_NUM_ROWS => {
                let filter = params.get(1).cloned().unwrap_or(Value::Null);
                Ok(Value::from(table.filtered(&filter).len()))
            }
            METHOD_DATA_CHUNK => {
                let first = param_index(params, 1)?;
                let last = param_index(params, 2)?;
                let request: ChunkRequest =
                    serde_json::from_value(params.get(3).cloned().unwrap_or(Value::Null))
                        .map_err(|err| RpcError::Transport(format!("bad chunk request: {err}")))?;
                let filter = request
                    .filter
                    .as_ref()
                    .map(|f| f.0.clone())
                    .unwrap_or(Value::Null);
                let mut rows = table.filtered(&filter);
                if let Some(column) = &request.sort_column {
                    if let Some(idx) = table.column_index(column) {
                        rows.sort_by(|a, b| compare_cells(a.get(idx), b.get(idx)));
                    }
                    if request.sort_desc {
                        rows.reverse();
                    }
                }
                let window: Vec<Value> = rows
                    .into_iter()
                    .skip(first)
                    .take(last.saturating_sub(first))
                    .map(|row| Value::Array(row.clone()))
                    .collect();
                Ok(Value::Array(window))
            }
            METHOD_DELETE => {
                let target = params
                    .get(1)
                    .and_then(RowId::from_value)
                    .ok_or_else(|| RpcError::Transport("missing row id".into()))?;
                let position = table
                    .rows
                    .iter()
                    .position(|row| table.row_id(row).as_ref() == Some(&target))
                    .ok_or_else(|| RpcError::Server {
                        code: 404,
                        message: format!("no row {target} in {table_id}"),
                    })?;
                table.rows.remove(position);
                Ok(Value::Bool(true))
            }
            other => Err(RpcError::Server {
                code: 501,
                message: format!("unknown method {other}"),
            }),
        }
    }
}

#[async_trait]
impl RpcTransport for MemoryTransport {
    async fn call(&self, method: &str, params: Vec<Value>) -> RpcResult<Value> {
        self.calls.lock().push(RecordedCall {
            method: method.to_string(),
            params: params.clone(),
        });
        if self.take_failure(method) {
            return Err(RpcError::Transport(format!("injected failure for {method}")));
        }
        self.dispatch(method, &params)
    }
}

fn param_handle(params: &[Value], idx: usize) -> RpcResult<String> {
    match params.get(idx) {
        Some(Value::String(text)) => Ok(text.clone()),
        Some(Value::Number(num)) => Ok(num.to_string()),
        other => Err(RpcError::Transport(format!(
            "parameter {idx} must be a table handle, got {other:?}"
        ))),
    }
}

fn param_index(params: &[Value], idx: usize) -> RpcResult<usize> {
    params
        .get(idx)
        .and_then(Value::as_u64)
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| RpcError::Transport(format!("parameter {idx} must be a row index")))
}

fn compare_cells(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
