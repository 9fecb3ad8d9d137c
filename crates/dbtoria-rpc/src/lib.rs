//! RPC plumbing for the DbToRia table service.
//!
//! Every server interaction is a single asynchronous call keyed by a method
//! name and positional JSON arguments, answered by exactly one value or one
//! error. [`RpcTransport`] is that seam; [`DbClient`] layers the typed table
//! operations on top of it. Transports are always injected, never looked up
//! from process-wide state.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub mod client;
pub mod http;
pub mod memory;
pub mod wire;

pub use client::DbClient;
pub use http::HttpTransport;
pub use memory::{MemoryTable, MemoryTransport, RecordedCall};
pub use wire::{ChunkRequest, ColumnSpec, FilterSpec, ListView, RowId, SortSpec};

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status: {status} body={body}")]
    UnexpectedStatus {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("server error {code}: {message}")]
    Server { code: i64, message: String },
    #[error("failed to decode {method} reply: {reason}")]
    Decode { method: String, reason: String },
    #[error("rpc transport error: {0}")]
    Transport(String),
}

impl RpcError {
    pub(crate) fn decode(method: &str, reason: impl Into<String>) -> Self {
        RpcError::Decode {
            method: method.to_string(),
            reason: reason.into(),
        }
    }
}

pub type RpcResult<T> = Result<T, RpcError>;

/// Minimal contract a transport must satisfy to carry table-service calls.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn call(&self, method: &str, params: Vec<Value>) -> RpcResult<Value>;
}
