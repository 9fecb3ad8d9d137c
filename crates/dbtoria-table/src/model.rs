use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;

use dbtoria_rpc::{ChunkRequest, DbClient, FilterSpec, SortSpec};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::config::ModelConfig;
use crate::descriptor::TableDescriptor;
use crate::row::{reshape_rows, Row};
use crate::{TableError, TableResult};

/// Notifications for the grid that renders the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelEvent {
    RowCountChanged(usize),
    /// Rows `[first, last)` were (re)loaded or invalidated.
    DataChanged { first: usize, last: usize },
    RowRemoved(usize),
}

/// Rows delivered for one window request, in server order.
#[derive(Debug, Clone, PartialEq)]
pub struct RowWindow {
    pub first: usize,
    pub rows: Vec<Row>,
}

impl RowWindow {
    /// Exclusive end of the rows actually delivered.
    pub fn last(&self) -> usize {
        self.first + self.rows.len()
    }
}

#[derive(Default)]
struct ModelState {
    filter: Option<FilterSpec>,
    sort: Option<SortSpec>,
    row_count: Option<usize>,
    rows: BTreeMap<usize, Row>,
    viewport: Option<Range<usize>>,
}

/// Sortable, filterable row source backed by `getNumRows` and
/// `getTableDataChunk`.
///
/// All operations take `&self` and never hold the state lock across a
/// server call, so requests can overlap. There is no de-duplication: when
/// two requests race, whichever reply lands last is what stays cached.
pub struct RemotePagedModel {
    client: DbClient,
    descriptor: Arc<TableDescriptor>,
    config: ModelConfig,
    state: Mutex<ModelState>,
    events: broadcast::Sender<ModelEvent>,
}

impl RemotePagedModel {
    pub fn new(client: DbClient, descriptor: Arc<TableDescriptor>, config: ModelConfig) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            client,
            descriptor,
            config,
            state: Mutex::new(ModelState::default()),
            events,
        }
    }

    /// Loads the descriptor for `table_id` and builds a model over it.
    pub async fn open(client: DbClient, table_id: &str, config: ModelConfig) -> TableResult<Self> {
        let descriptor = TableDescriptor::load(&client, table_id).await?;
        Ok(Self::new(client, Arc::new(descriptor), config))
    }

    pub fn client(&self) -> &DbClient {
        &self.client
    }

    pub fn descriptor(&self) -> &Arc<TableDescriptor> {
        &self.descriptor
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ModelEvent> {
        self.events.subscribe()
    }

    /// Last successfully loaded row count.
    pub fn row_count(&self) -> Option<usize> {
        self.state.lock().row_count
    }

    pub fn filter(&self) -> Option<FilterSpec> {
        self.state.lock().filter.clone()
    }

    pub fn sort(&self) -> Option<SortSpec> {
        self.state.lock().sort.clone()
    }

    pub fn viewport(&self) -> Option<Range<usize>> {
        self.state.lock().viewport.clone()
    }

    pub fn cached_rows(&self) -> usize {
        self.state.lock().rows.len()
    }

    /// Cached row at `index`, without going to the server.
    pub fn row(&self, index: usize) -> Option<Row> {
        self.state.lock().rows.get(&index).cloned()
    }

    pub async fn request_row_count(&self) -> TableResult<usize> {
        let count = self.load_row_count().await?;
        self.state.lock().row_count = Some(count);
        let _ = self.events.send(ModelEvent::RowCountChanged(count));
        Ok(count)
    }

    /// Loads rows `[first_row, last_row)` for the grid's viewport.
    pub async fn request_row_window(
        &self,
        first_row: usize,
        last_row: usize,
    ) -> TableResult<RowWindow> {
        if first_row > last_row {
            return Err(TableError::InvalidWindow {
                first: first_row,
                last: last_row,
            });
        }
        self.state.lock().viewport = Some(first_row..last_row);
        self.fetch_window(first_row, last_row).await
    }

    /// Records the rows the grid shows without fetching them; the next
    /// reload fetches exactly this range.
    pub fn set_viewport(&self, first_row: usize, last_row: usize) -> TableResult<()> {
        if first_row > last_row {
            return Err(TableError::InvalidWindow {
                first: first_row,
                last: last_row,
            });
        }
        self.state.lock().viewport = Some(first_row..last_row);
        Ok(())
    }

    /// Replaces the filter and reloads count and viewport from scratch.
    /// Rows cached under the old filter are dropped even if the reload fails.
    pub async fn set_filter(&self, filter: Option<FilterSpec>) -> TableResult<RowWindow> {
        {
            let mut state = self.state.lock();
            state.filter = filter;
            state.row_count = None;
            state.rows.clear();
        }
        self.reload().await
    }

    /// Changes the sort order. Cached rows are dropped; nothing is fetched
    /// until the grid asks for its window again.
    pub fn set_sort(&self, sort: Option<SortSpec>) {
        let last = {
            let mut state = self.state.lock();
            state.sort = sort;
            state.rows.clear();
            state.row_count.unwrap_or(0)
        };
        let _ = self.events.send(ModelEvent::DataChanged { first: 0, last });
    }

    /// Fetches a fresh count and the current viewport, then replaces the
    /// cached count and rows with them. When either request fails the
    /// previous cache stays as it was.
    pub async fn reload(&self) -> TableResult<RowWindow> {
        let viewport = self.viewport().unwrap_or(0..self.config.block_size);
        debug!(
            target = "dbtoria.model",
            table_id = self.descriptor.table_id(),
            first = viewport.start,
            last = viewport.end,
            "reloading"
        );
        let count = self.load_row_count().await?;
        let rows = self.load_window(viewport.start, viewport.end).await?;

        let previous = {
            let mut state = self.state.lock();
            let previous = state.row_count.unwrap_or(0);
            state.row_count = Some(count);
            state.rows.clear();
            previous
        };
        let _ = self.events.send(ModelEvent::RowCountChanged(count));
        let _ = self.events.send(ModelEvent::DataChanged {
            first: 0,
            last: previous.max(count),
        });
        Ok(self.store_window(viewport.start, rows))
    }

    /// Row at `index`, fetching the block around it when it is not cached.
    /// `None` once `index` is past the end of the table.
    pub async fn row_at(&self, index: usize) -> TableResult<Option<Row>> {
        if let Some(row) = self.row(index) {
            return Ok(Some(row));
        }
        let count = match self.row_count() {
            Some(count) => count,
            None => self.request_row_count().await?,
        };
        if index >= count {
            return Ok(None);
        }
        let block = self.config.block_size.max(1);
        let first = index / block * block;
        let last = (first + block).min(count);
        let window = self.fetch_window(first, last).await?;
        Ok(window.rows.into_iter().nth(index - first))
    }

    /// Drops the row at `index` from the local cache, shifting later rows up
    /// by one. Used after a confirmed server-side delete, where the new
    /// state is known without another round trip. Nothing is announced when
    /// the cache held nothing to change.
    pub fn remove_row(&self, index: usize) -> Option<Row> {
        let (removed, count, changed) = {
            let mut state = self.state.lock();
            if state.row_count.is_some_and(|count| index >= count) {
                return None;
            }
            let removed = state.rows.remove(&index);
            let tail = state.rows.split_off(&index);
            let shifted = !tail.is_empty();
            state
                .rows
                .extend(tail.into_iter().map(|(idx, row)| (idx - 1, row)));
            if let Some(count) = state.row_count.as_mut() {
                *count = count.saturating_sub(1);
            }
            let changed = removed.is_some() || shifted || state.row_count.is_some();
            (removed, state.row_count, changed)
        };
        if !changed {
            return None;
        }
        let _ = self.events.send(ModelEvent::RowRemoved(index));
        if let Some(count) = count {
            let _ = self.events.send(ModelEvent::RowCountChanged(count));
        }
        removed
    }

    async fn load_row_count(&self) -> TableResult<usize> {
        let filter = self.state.lock().filter.clone();
        let table_id = self.descriptor.table_id();
        match self.client.get_num_rows(table_id, filter.as_ref()).await {
            Ok(count) => {
                debug!(target = "dbtoria.model", table_id, count, "row count loaded");
                Ok(count)
            }
            Err(err) => {
                warn!(target = "dbtoria.model", table_id, error = %err, "row count request failed");
                Err(err.into())
            }
        }
    }

    async fn load_window(&self, first_row: usize, last_row: usize) -> TableResult<Vec<Row>> {
        let request = {
            let state = self.state.lock();
            ChunkRequest::new(state.filter.clone(), state.sort.as_ref())
        };
        let table_id = self.descriptor.table_id();
        let raw = match self
            .client
            .get_table_data_chunk(table_id, first_row, last_row, &request)
            .await
        {
            Ok(raw) => raw,
            Err(err) => {
                warn!(
                    target = "dbtoria.model",
                    table_id,
                    first = first_row,
                    last = last_row,
                    error = %err,
                    "row window request failed"
                );
                return Err(err.into());
            }
        };
        Ok(reshape_rows(self.descriptor.column_ids(), raw)
            .into_iter()
            .map(Row::from_record)
            .collect())
    }

    async fn fetch_window(&self, first_row: usize, last_row: usize) -> TableResult<RowWindow> {
        let rows = self.load_window(first_row, last_row).await?;
        Ok(self.store_window(first_row, rows))
    }

    fn store_window(&self, first_row: usize, rows: Vec<Row>) -> RowWindow {
        let window = RowWindow {
            first: first_row,
            rows,
        };
        {
            let mut state = self.state.lock();
            for (offset, row) in window.rows.iter().enumerate() {
                state.rows.insert(first_row + offset, row.clone());
            }
            evict(&mut state.rows, first_row..window.last(), self.config.max_cached_rows);
        }
        debug!(
            target = "dbtoria.model",
            table_id = self.descriptor.table_id(),
            first = first_row,
            delivered = window.rows.len(),
            "row window loaded"
        );
        let _ = self.events.send(ModelEvent::DataChanged {
            first: first_row,
            last: window.last(),
        });
        window
    }
}

/// Trims the cache to `limit` rows, dropping those farthest from `keep`
/// first. Rows inside `keep` are never dropped, so a window larger than
/// `limit` stays whole.
fn evict(rows: &mut BTreeMap<usize, Row>, keep: Range<usize>, limit: usize) {
    let limit = limit.max(keep.len());
    if rows.len() <= limit {
        return;
    }
    let distance = |idx: usize| {
        if idx < keep.start {
            keep.start - idx
        } else {
            idx + 1 - keep.end
        }
    };
    let mut outside: Vec<usize> = rows
        .keys()
        .copied()
        .filter(|idx| !keep.contains(idx))
        .collect();
    outside.sort_by_key(|idx| std::cmp::Reverse(distance(*idx)));
    let excess = rows.len() - limit;
    for idx in outside.into_iter().take(excess) {
        rows.remove(&idx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ROWINFO_COLUMN;
    use dbtoria_rpc::client::{METHOD_DATA_CHUNK, METHOD_NUM_ROWS};
    use dbtoria_rpc::{ColumnSpec, MemoryTable, MemoryTransport, RowId};
    use serde_json::{json, Value};

    fn seeded(rows: usize) -> Arc<MemoryTransport> {
        let transport = MemoryTransport::new();
        let mut table = MemoryTable::new(
            "items",
            vec![
                ColumnSpec::new(ROWINFO_COLUMN, ""),
                ColumnSpec::new("name", "Name"),
                ColumnSpec::new("kind", "Kind"),
            ],
        );
        for id in 0..rows {
            let kind = if id % 2 == 0 { "even" } else { "odd" };
            table.push_row(vec![
                json!([id, true, true]),
                json!(format!("item-{id:03}")),
                json!(kind),
            ]);
        }
        transport.insert_table(table);
        transport
    }

    async fn model(transport: &Arc<MemoryTransport>, config: ModelConfig) -> RemotePagedModel {
        let model = RemotePagedModel::open(DbClient::new(transport.clone()), "items", config)
            .await
            .expect("open");
        transport.clear_calls();
        model
    }

    fn ids(window: &RowWindow) -> Vec<RowId> {
        window.rows.iter().filter_map(|r| r.id().cloned()).collect()
    }

    #[tokio::test]
    async fn window_rows_are_keyed_in_column_order() {
        let transport = seeded(5);
        let model = model(&transport, ModelConfig::default()).await;
        let window = model.request_row_window(1, 3).await.unwrap();

        assert_eq!(window.first, 1);
        assert_eq!(window.last(), 3);
        assert_eq!(ids(&window), vec![RowId::Int(1), RowId::Int(2)]);
        let keys: Vec<&String> = window.rows[0].record.keys().collect();
        assert_eq!(keys, vec![ROWINFO_COLUMN, "name", "kind"]);
        assert_eq!(window.rows[0].get("name"), Some(&json!("item-001")));
        assert_eq!(model.cached_rows(), 2);
    }

    #[tokio::test]
    async fn rejects_inverted_windows() {
        let transport = seeded(2);
        let model = model(&transport, ModelConfig::default()).await;
        let err = model.request_row_window(3, 1).await.unwrap_err();
        assert!(matches!(err, TableError::InvalidWindow { first: 3, last: 1 }));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn sort_fields_follow_current_sort() {
        let transport = seeded(4);
        let model = model(&transport, ModelConfig::default()).await;

        model.request_row_window(0, 2).await.unwrap();
        model.set_sort(Some(SortSpec::ascending("name")));
        model.request_row_window(0, 2).await.unwrap();
        model.set_sort(Some(SortSpec::descending("name")));
        let window = model.request_row_window(0, 2).await.unwrap();

        let requests: Vec<Value> = transport
            .calls()
            .into_iter()
            .filter(|c| c.method == METHOD_DATA_CHUNK)
            .map(|c| c.params[3].clone())
            .collect();
        assert_eq!(requests[0], json!({ "filter": null }));
        assert_eq!(requests[1], json!({ "filter": null, "sortColumn": "name" }));
        assert_eq!(
            requests[2],
            json!({ "filter": null, "sortColumn": "name", "sortDesc": true })
        );
        assert_eq!(ids(&window), vec![RowId::Int(3), RowId::Int(2)]);
    }

    #[tokio::test]
    async fn set_filter_refetches_count_and_viewport_once() {
        let transport = seeded(6);
        let model = model(&transport, ModelConfig::default()).await;
        model.request_row_count().await.unwrap();
        model.request_row_window(0, 4).await.unwrap();
        assert_eq!(model.row_count(), Some(6));
        transport.clear_calls();

        let filter = FilterSpec::new(json!({ "kind": "odd" }));
        model.set_filter(Some(filter.clone())).await.unwrap();

        assert_eq!(transport.calls_to(METHOD_NUM_ROWS), 1);
        assert_eq!(transport.calls_to(METHOD_DATA_CHUNK), 1);
        let calls = transport.calls();
        assert_eq!(calls[0].params[1], json!({ "kind": "odd" }));
        assert_eq!(calls[1].params[1..3], [json!(0), json!(4)]);
        assert_eq!(calls[1].params[3]["filter"], json!({ "kind": "odd" }));

        assert_eq!(model.row_count(), Some(3));
        assert_eq!(model.cached_rows(), 3);
        assert_eq!(model.row(3), None);
        assert_eq!(model.row(0).unwrap().id(), Some(&RowId::Int(1)));
        assert_eq!(model.filter(), Some(filter));
    }

    #[tokio::test]
    async fn failed_count_keeps_previous_value() {
        let transport = seeded(3);
        let model = model(&transport, ModelConfig::default()).await;
        model.request_row_count().await.unwrap();
        transport.fail_next(METHOD_NUM_ROWS, 1);
        assert!(model.request_row_count().await.is_err());
        assert_eq!(model.row_count(), Some(3));
    }

    #[tokio::test]
    async fn failed_window_keeps_cached_rows() {
        let transport = seeded(3);
        let model = model(&transport, ModelConfig::default()).await;
        model.request_row_window(0, 3).await.unwrap();
        transport.fail_next(METHOD_DATA_CHUNK, 1);
        assert!(model.request_row_window(0, 3).await.is_err());
        assert_eq!(model.cached_rows(), 3);
    }

    #[tokio::test]
    async fn row_at_fetches_the_enclosing_block() {
        let transport = seeded(12);
        let config = ModelConfig {
            block_size: 5,
            max_cached_rows: 50,
        };
        let model = model(&transport, config).await;

        let row = model.row_at(7).await.unwrap().unwrap();
        assert_eq!(row.id(), Some(&RowId::Int(7)));
        let chunk = transport
            .calls()
            .into_iter()
            .find(|c| c.method == METHOD_DATA_CHUNK)
            .unwrap();
        assert_eq!(chunk.params[1..3], [json!(5), json!(10)]);

        assert!(model.row_at(12).await.unwrap().is_none());
        assert_eq!(transport.calls_to(METHOD_DATA_CHUNK), 1);
    }

    #[tokio::test]
    async fn remove_row_shifts_later_rows() {
        let transport = seeded(4);
        let model = model(&transport, ModelConfig::default()).await;
        model.request_row_count().await.unwrap();
        model.request_row_window(0, 4).await.unwrap();
        let mut events = model.subscribe();

        let removed = model.remove_row(1).unwrap();
        assert_eq!(removed.id(), Some(&RowId::Int(1)));
        let remaining: Vec<RowId> = (0..3)
            .filter_map(|i| model.row(i).and_then(|r| r.id().cloned()))
            .collect();
        assert_eq!(remaining, vec![RowId::Int(0), RowId::Int(2), RowId::Int(3)]);
        assert_eq!(model.row(3), None);
        assert_eq!(model.row_count(), Some(3));
        assert_eq!(events.recv().await.unwrap(), ModelEvent::RowRemoved(1));
        assert_eq!(events.recv().await.unwrap(), ModelEvent::RowCountChanged(3));
    }

    #[tokio::test]
    async fn cache_is_bounded_around_latest_window() {
        let transport = seeded(30);
        let config = ModelConfig {
            block_size: 10,
            max_cached_rows: 15,
        };
        let model = model(&transport, config).await;
        model.request_row_window(0, 10).await.unwrap();
        model.request_row_window(20, 30).await.unwrap();

        assert_eq!(model.cached_rows(), 15);
        assert!(model.row(0).is_none());
        assert!(model.row(9).is_some());
        assert!(model.row(20).is_some());
        assert!(model.row(29).is_some());
    }

    #[tokio::test]
    async fn reload_without_viewport_uses_first_block() {
        let transport = seeded(3);
        let config = ModelConfig {
            block_size: 20,
            max_cached_rows: 100,
        };
        let model = model(&transport, config).await;
        model.reload().await.unwrap();
        let chunk = transport
            .calls()
            .into_iter()
            .find(|c| c.method == METHOD_DATA_CHUNK)
            .unwrap();
        assert_eq!(chunk.params[1..3], [json!(0), json!(20)]);
        assert_eq!(model.cached_rows(), 3);
    }

    #[tokio::test]
    async fn preset_viewport_is_fetched_on_reload() {
        let transport = seeded(8);
        let model = model(&transport, ModelConfig::default()).await;
        model.set_viewport(4, 6).unwrap();
        assert!(transport.calls().is_empty());

        model.reload().await.unwrap();
        let chunk = transport
            .calls()
            .into_iter()
            .find(|c| c.method == METHOD_DATA_CHUNK)
            .unwrap();
        assert_eq!(chunk.params[1..3], [json!(4), json!(6)]);
        assert_eq!(model.row(4).and_then(|r| r.id().cloned()), Some(RowId::Int(4)));
        assert!(model.set_viewport(2, 1).is_err());
    }

    #[tokio::test]
    async fn failed_reload_keeps_previous_cache() {
        let transport = seeded(6);
        let model = model(&transport, ModelConfig::default()).await;
        model.request_row_count().await.unwrap();
        model.request_row_window(0, 6).await.unwrap();

        transport.fail_next(METHOD_NUM_ROWS, 1);
        assert!(model.reload().await.is_err());
        assert_eq!(model.row_count(), Some(6));
        assert_eq!(model.cached_rows(), 6);

        transport.fail_next(METHOD_DATA_CHUNK, 1);
        assert!(model.reload().await.is_err());
        assert_eq!(model.row_count(), Some(6));
        assert_eq!(model.cached_rows(), 6);
        assert_eq!(model.row(5).and_then(|r| r.id().cloned()), Some(RowId::Int(5)));
    }

    #[tokio::test]
    async fn reload_keeps_a_viewport_larger_than_the_cache_bound() {
        let transport = seeded(20);
        let config = ModelConfig {
            block_size: 5,
            max_cached_rows: 10,
        };
        let model = model(&transport, config).await;
        model.set_viewport(0, 20).unwrap();

        let window = model.set_filter(None).await.unwrap();
        assert_eq!(window.rows.len(), 20);
        assert_eq!(model.row_count(), Some(20));
        assert_eq!(model.cached_rows(), 20);
        assert!((0..20).all(|i| model.row(i).is_some()));

        model.request_row_window(0, 5).await.unwrap();
        assert_eq!(model.cached_rows(), 10);
        assert!(model.row(0).is_some());
        assert!(model.row(9).is_some());
        assert!(model.row(10).is_none());
    }

    #[tokio::test]
    async fn removing_an_unknown_row_is_silent() {
        let transport = seeded(4);
        let model = model(&transport, ModelConfig::default()).await;
        let mut events = model.subscribe();

        assert!(model.remove_row(2).is_none());
        assert_eq!(model.row_count(), None);
        assert!(events.try_recv().is_err());

        model.request_row_count().await.unwrap();
        assert_eq!(events.recv().await.unwrap(), ModelEvent::RowCountChanged(4));
        assert!(model.remove_row(9).is_none());
        assert_eq!(model.row_count(), Some(4));
        assert!(events.try_recv().is_err());
    }
}
