use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::{RpcError, RpcResult, RpcTransport};

/// JSON-RPC over HTTP POST using the qooxdoo envelope
/// (`{service, method, id, params}` answered by `{id, result}` or
/// `{id, error}`).
pub struct HttpTransport {
    http: Client,
    endpoint: Url,
    service: String,
    next_id: AtomicU64,
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    service: &'a str,
    method: &'a str,
    id: u64,
    params: &'a [Value],
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcFault>,
}

#[derive(Deserialize)]
struct RpcFault {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

impl HttpTransport {
    pub fn new(endpoint: Url, service: impl Into<String>) -> Self {
        Self::with_client(Client::new(), endpoint, service)
    }

    /// Builds a transport whose requests give up after `timeout`. Without one
    /// a hung server call stays pending for as long as the server holds it.
    pub fn with_timeout(
        endpoint: Url,
        service: impl Into<String>,
        timeout: Duration,
    ) -> RpcResult<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(http, endpoint, service))
    }

    pub fn with_client(http: Client, endpoint: Url, service: impl Into<String>) -> Self {
        Self {
            http,
            endpoint,
            service: service.into(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn call(&self, method: &str, params: Vec<Value>) -> RpcResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = RpcRequest {
            service: &self.service,
            method,
            id,
            params: &params,
        };
        debug!(target = "dbtoria.rpc", %method, id, endpoint = %self.endpoint, "posting rpc request");
        let res = self
            .http
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            warn!(target = "dbtoria.rpc", %method, id, %status, "rpc request rejected");
            return Err(RpcError::UnexpectedStatus { status, body });
        }

        let reply: RpcResponse = res
            .json()
            .await
            .map_err(|err| RpcError::decode(method, err.to_string()))?;
        if let Some(fault) = reply.error {
            warn!(
                target = "dbtoria.rpc",
                %method,
                id,
                code = fault.code,
                message = %fault.message,
                "rpc call failed on server"
            );
            return Err(RpcError::Server {
                code: fault.code,
                message: fault.message,
            });
        }
        Ok(reply.result.unwrap_or(Value::Null))
    }
}
