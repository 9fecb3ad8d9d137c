use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::wire::{ChunkRequest, FilterSpec, ListView, RowId};
use crate::{RpcError, RpcResult, RpcTransport};

pub const METHOD_NUM_ROWS: &str = "getNumRows";
pub const METHOD_DATA_CHUNK: &str = "getTableDataChunk";
pub const METHOD_LIST_VIEW: &str = "getListView";
pub const METHOD_DELETE: &str = "deleteTableData";

/// Typed wrapper around the four table-service operations.
#[derive(Clone)]
pub struct DbClient {
    transport: Arc<dyn RpcTransport>,
}

impl DbClient {
    pub fn new(transport: Arc<dyn RpcTransport>) -> Self {
        Self { transport }
    }

    pub async fn get_num_rows(
        &self,
        table_id: &str,
        filter: Option<&FilterSpec>,
    ) -> RpcResult<usize> {
        let filter = filter.map(|f| f.0.clone()).unwrap_or(Value::Null);
        let raw = self
            .transport
            .call(METHOD_NUM_ROWS, vec![Value::from(table_id), filter])
            .await?;
        count_from_value(&raw).ok_or_else(|| {
            RpcError::decode(METHOD_NUM_ROWS, format!("expected a row count, got {raw}"))
        })
    }

    /// Fetches rows `[first_row, last_row)` as positional cell arrays in
    /// the column order of the table's list view.
    pub async fn get_table_data_chunk(
        &self,
        table_id: &str,
        first_row: usize,
        last_row: usize,
        request: &ChunkRequest,
    ) -> RpcResult<Vec<Vec<Value>>> {
        let request = serde_json::to_value(request)
            .map_err(|err| RpcError::decode(METHOD_DATA_CHUNK, err.to_string()))?;
        self.call(
            METHOD_DATA_CHUNK,
            vec![
                Value::from(table_id),
                Value::from(first_row),
                Value::from(last_row),
                request,
            ],
        )
        .await
    }

    pub async fn get_list_view(&self, table_id: &str) -> RpcResult<ListView> {
        self.call(METHOD_LIST_VIEW, vec![Value::from(table_id)])
            .await
    }

    pub async fn delete_table_data(&self, table_id: &str, row_id: &RowId) -> RpcResult<Value> {
        self.transport
            .call(
                METHOD_DELETE,
                vec![Value::from(table_id), row_id.to_value()],
            )
            .await
    }

    async fn call<T>(&self, method: &str, params: Vec<Value>) -> RpcResult<T>
    where
        T: DeserializeOwned,
    {
        debug!(target = "dbtoria.rpc", method, params = params.len(), "rpc call");
        let raw = self.transport.call(method, params).await?;
        serde_json::from_value(raw).map_err(|err| RpcError::decode(method, err.to_string()))
    }
}

fn count_from_value(value: &Value) -> Option<usize> {
    match value {
        Value::Number(num) => num
            .as_u64()
            .or_else(|| num.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64))
            .and_then(|n| usize::try_from(n).ok()),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}
