use serde_json::{Map, Value};
use tracing::warn;

use crate::descriptor::ROWINFO_COLUMN;
use crate::RowId;

/// A row keyed by column identifier, in table column order.
pub type Record = Map<String, Value>;

/// Identifier and permission flags the server attaches to every row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowInfo {
    pub row_id: RowId,
    pub can_edit: bool,
    pub can_delete: bool,
}

impl RowInfo {
    /// Decodes the `[rowId, canEdit, canDelete]` cell. Flags use the
    /// server's loose truthiness (`1`, `"1"`, `true`); a missing flag reads
    /// as not permitted.
    pub fn decode(cell: &Value) -> Option<RowInfo> {
        let parts = cell.as_array()?;
        let row_id = RowId::from_value(parts.first()?)?;
        Some(RowInfo {
            row_id,
            can_edit: parts.get(1).is_some_and(truthy),
            can_delete: parts.get(2).is_some_and(truthy),
        })
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(num) => num.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty() && text != "0",
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// `None` when the row carried no readable row-info cell; such a row
    /// never enables edit, clone or delete.
    pub info: Option<RowInfo>,
    pub record: Record,
}

impl Row {
    pub fn from_record(record: Record) -> Self {
        let info = record.get(ROWINFO_COLUMN).and_then(RowInfo::decode);
        Self { info, record }
    }

    pub fn id(&self) -> Option<&RowId> {
        self.info.as_ref().map(|info| &info.row_id)
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.record.get(column)
    }
}

/// Zips one positional row against the column order. Short rows are padded
/// with nulls; surplus trailing cells have no column to land in and are
/// dropped.
pub fn reshape_row(columns: &[String], cells: Vec<Value>) -> Record {
    if cells.len() > columns.len() {
        warn!(
            target = "dbtoria.model",
            cells = cells.len(),
            columns = columns.len(),
            "row has more cells than columns"
        );
    }
    let mut cells = cells.into_iter();
    columns
        .iter()
        .map(|column| (column.clone(), cells.next().unwrap_or(Value::Null)))
        .collect()
}

pub fn reshape_rows(columns: &[String], rows: Vec<Vec<Value>>) -> Vec<Record> {
    rows.into_iter()
        .map(|cells| reshape_row(columns, cells))
        .collect()
}
