use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Persistent identifier of a table row as handed out by the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RowId {
    Int(i64),
    Text(String),
}

impl RowId {
    /// Reads an identifier out of a raw cell. Integral floats are accepted
    /// because some backends hand out numeric keys as doubles.
    pub fn from_value(value: &Value) -> Option<RowId> {
        match value {
            Value::Number(num) => num.as_i64().map(RowId::Int).or_else(|| {
                num.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                    .map(|f| RowId::Int(f as i64))
            }),
            Value::String(text) => Some(RowId::Text(text.clone())),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            RowId::Int(id) => Value::from(*id),
            RowId::Text(id) => Value::from(id.as_str()),
        }
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowId::Int(id) => write!(f, "{id}"),
            RowId::Text(id) => f.write_str(id),
        }
    }
}

impl From<i64> for RowId {
    fn from(value: i64) -> Self {
        RowId::Int(value)
    }
}

impl From<&str> for RowId {
    fn from(value: &str) -> Self {
        RowId::Text(value.to_string())
    }
}

impl FromStr for RowId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(s.parse::<i64>()
            .map(RowId::Int)
            .unwrap_or_else(|_| RowId::Text(s.to_string())))
    }
}

/// Filter produced by the filter editor. The model never looks inside it; it
/// travels verbatim with every count and chunk request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterSpec(pub Value);

impl FilterSpec {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

/// Sorted column and direction, read fresh for each chunk request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub column: String,
    pub ascending: bool,
}

impl SortSpec {
    pub fn ascending(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: true,
        }
    }

    pub fn descending(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: false,
        }
    }
}

/// Fourth argument of `getTableDataChunk`.
///
/// `sortColumn` is absent in natural order and `sortDesc` is only ever sent
/// as `true`; the server distinguishes a missing key from a null one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRequest {
    pub filter: Option<FilterSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_column: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub sort_desc: bool,
}

impl ChunkRequest {
    pub fn new(filter: Option<FilterSpec>, sort: Option<&SortSpec>) -> Self {
        Self {
            filter,
            sort_column: sort.map(|s| s.column.clone()),
            sort_desc: sort.is_some_and(|s| !s.ascending),
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Reply of `getListView`: the handle to use from now on plus the ordered
/// column list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListView {
    #[serde(deserialize_with = "handle_from_value")]
    pub table_id: String,
    pub columns: Vec<ColumnSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub id: String,
    pub name: String,
}

impl ColumnSpec {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

fn handle_from_value<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::String(text) => Ok(text),
        Value::Number(num) => Ok(num.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "table handle must be a string or number, got {other}"
        ))),
    }
}
