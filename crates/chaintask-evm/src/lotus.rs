//! Lotus full-node client over the Ethereum-compatible JSON-RPC API.
//!
//! Accepts the address forms Lotus prints as "API info":
//! - `http://127.0.0.1:1234/rpc/v1`
//! - `/ip4/127.0.0.1/tcp/1234/http` (multiaddr)
//! - either of the above prefixed with `TOKEN:`

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use chaintask_core::context::RunContext;
use chaintask_core::error::NodeError;
use chaintask_core::node::{NodeConnector, NodeSession};

// ─── Address parsing ──────────────────────────────────────────────────────────

/// A resolved Lotus endpoint and its optional bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiInfo {
    pub url: String,
    pub token: Option<String>,
}

fn is_endpoint(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://") || s.starts_with('/')
}

impl ApiInfo {
    pub fn parse(addr: &str) -> Result<Self, NodeError> {
        let addr = addr.trim();
        if addr.is_empty() {
            return Err(NodeError::Connect("empty node address".into()));
        }

        let (token, endpoint) = if is_endpoint(addr) {
            (None, addr)
        } else {
            match addr.split_once(':') {
                Some((token, rest)) if !token.is_empty() && is_endpoint(rest) => {
                    (Some(token.to_string()), rest)
                }
                _ => {
                    return Err(NodeError::Connect(format!(
                        "unsupported node address {addr:?}"
                    )))
                }
            }
        };

        let url = if endpoint.starts_with('/') {
            multiaddr_to_url(endpoint)?
        } else {
            endpoint.to_string()
        };
        Ok(Self { url, token })
    }
}

/// Convert `/ip4/<host>/tcp/<port>/http` style multiaddrs to an RPC URL.
fn multiaddr_to_url(ma: &str) -> Result<String, NodeError> {
    let unsupported = || NodeError::Connect(format!("unsupported multiaddr {ma:?}"));
    let parts: Vec<&str> = ma.trim_start_matches('/').split('/').collect();

    let [proto, host, "tcp", port, rest @ ..] = parts.as_slice() else {
        return Err(unsupported());
    };
    let scheme = match rest {
        [] | ["http"] | ["ws"] => "http",
        ["https"] | ["wss"] => "https",
        _ => return Err(unsupported()),
    };
    let host = match *proto {
        "ip4" | "dns" | "dns4" | "dns6" => host.to_string(),
        "ip6" => format!("[{host}]"),
        _ => return Err(unsupported()),
    };
    let port: u16 = port.parse().map_err(|_| unsupported())?;
    Ok(format!("{scheme}://{host}:{port}/rpc/v1"))
}

// ─── JSON-RPC wire types ──────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Vec<Value>,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    fn into_result(self) -> Result<Value, NodeError> {
        match self.error {
            Some(err) => Err(NodeError::Rpc {
                code: err.code,
                message: err.message,
            }),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Pull the transaction list out of an `eth_getBlockByHash` result.
///
/// `null` means the node does not know the block.
pub fn transactions_from_block(block: Value) -> Result<Option<Vec<Value>>, NodeError> {
    match block {
        Value::Null => Ok(None),
        Value::Object(mut map) => match map.remove("transactions") {
            Some(Value::Array(txs)) => Ok(Some(txs)),
            Some(other) => Err(NodeError::Malformed(format!(
                "block transactions is not an array: {other}"
            ))),
            None => Err(NodeError::Malformed(
                "block has no transactions field".into(),
            )),
        },
        other => Err(NodeError::Malformed(format!(
            "block is not an object: {other}"
        ))),
    }
}

// ─── Connector / session ──────────────────────────────────────────────────────

/// Opens HTTP JSON-RPC sessions against a Lotus node.
#[derive(Debug, Clone)]
pub struct LotusConnector {
    request_timeout: Duration,
}

impl LotusConnector {
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }
}

impl Default for LotusConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl NodeConnector for LotusConnector {
    async fn connect(
        &self,
        ctx: &RunContext,
        addr: &str,
    ) -> Result<Box<dyn NodeSession>, NodeError> {
        ctx.check()?;
        let info = ApiInfo::parse(addr)?;
        let http = reqwest::Client::builder()
            .timeout(self.request_timeout)
            .build()
            .map_err(|e| NodeError::Connect(e.to_string()))?;

        tracing::debug!(url = %info.url, auth = info.token.is_some(), "lotus session opened");
        Ok(Box::new(LotusSession {
            url: info.url,
            token: info.token,
            http,
            next_id: AtomicU64::new(1),
        }))
    }
}

/// One HTTP JSON-RPC session. The underlying connection pool is released on drop.
pub struct LotusSession {
    url: String,
    token: Option<String>,
    http: reqwest::Client,
    next_id: AtomicU64,
}

impl LotusSession {
    async fn call(
        &self,
        ctx: &RunContext,
        method: &str,
        params: Vec<Value>,
    ) -> Result<Value, NodeError> {
        let req = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };

        let mut builder = self.http.post(&self.url).json(&req);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }

        let resp = ctx
            .guard(builder.send())
            .await?
            .map_err(|e| NodeError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = ctx.guard(resp.text()).await?.unwrap_or_default();
            return Err(NodeError::Http(format!("HTTP {status}: {body}")));
        }

        let body: JsonRpcResponse = ctx
            .guard(resp.json())
            .await?
            .map_err(|e| NodeError::Malformed(e.to_string()))?;
        body.into_result()
    }
}

impl Drop for LotusSession {
    fn drop(&mut self) {
        tracing::trace!(url = %self.url, "lotus session closed");
    }
}

#[async_trait]
impl NodeSession for LotusSession {
    async fn block_transactions(
        &self,
        ctx: &RunContext,
        block_hash: &str,
    ) -> Result<Option<Vec<Value>>, NodeError> {
        let block = self
            .call(
                ctx,
                "Filecoin.EthGetBlockByHash",
                vec![json!(block_hash), json!(true)],
            )
            .await?;
        transactions_from_block(block)
    }
}
