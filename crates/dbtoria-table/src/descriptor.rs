use std::collections::HashMap;

use dbtoria_rpc::{DbClient, ListView};
use tracing::debug;

use crate::TableResult;

/// Reserved pseudo-column carrying each row's [`crate::RowInfo`].
pub const ROWINFO_COLUMN: &str = "ROWINFO";

/// Server-defined shape of one table. Built once when the table is opened
/// and never changed afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDescriptor {
    table_id: String,
    column_ids: Vec<String>,
    labels: HashMap<String, String>,
}

impl TableDescriptor {
    pub fn new(
        table_id: impl Into<String>,
        column_ids: Vec<String>,
        labels: HashMap<String, String>,
    ) -> Self {
        Self {
            table_id: table_id.into(),
            column_ids,
            labels,
        }
    }

    /// Asks the server for the list view of `table_id`. The handle in the
    /// reply replaces the one used for the request.
    pub async fn load(client: &DbClient, table_id: &str) -> TableResult<Self> {
        let view = client.get_list_view(table_id).await?;
        debug!(
            target = "dbtoria.model",
            requested = table_id,
            table_id = %view.table_id,
            columns = view.columns.len(),
            "loaded list view"
        );
        Ok(Self::from(view))
    }

    pub fn table_id(&self) -> &str {
        &self.table_id
    }

    /// Column order used to key positional row cells, reserved column
    /// included.
    pub fn column_ids(&self) -> &[String] {
        &self.column_ids
    }

    /// Columns a grid should render.
    pub fn visible_columns(&self) -> impl Iterator<Item = &str> {
        self.column_ids
            .iter()
            .map(String::as_str)
            .filter(|id| *id != ROWINFO_COLUMN)
    }

    pub fn label(&self, column_id: &str) -> Option<&str> {
        self.labels.get(column_id).map(String::as_str)
    }

    pub fn has_row_info(&self) -> bool {
        self.column_ids.iter().any(|id| id == ROWINFO_COLUMN)
    }
}

impl From<ListView> for TableDescriptor {
    fn from(view: ListView) -> Self {
        let mut column_ids = Vec::with_capacity(view.columns.len());
        let mut labels = HashMap::with_capacity(view.columns.len());
        for column in view.columns {
            labels.insert(column.id.clone(), column.name);
            column_ids.push(column.id);
        }
        Self::new(view.table_id, column_ids, labels)
    }
}
