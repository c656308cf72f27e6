use std::time::Duration;

use async_trait::async_trait;
use eyre::{Result, WrapErr};
use reqwest::{Client, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};

use super::{parse_quantity, EthereumSource, JwtSecret, JSONRPC_VERSION, STATIC_ID};

const ETH_BLOCK_NUMBER: &str = "eth_blockNumber";
const ETH_GET_BALANCE: &str = "eth_getBalance";

/// An Ethereum JSON-RPC client
#[derive(Debug, Clone)]
pub struct EthereumClient {
    /// Request url
    url: Url,
    /// HTTP Client
    client: Client,
    /// Secret used to authenticate requests, if any
    jwt: Option<JwtSecret>,
}

/// JSON-RPC request body
#[derive(Debug, Serialize)]
struct Request<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Value,
    id: u64,
}

/// JSON-RPC response body
#[derive(Debug, Deserialize)]
struct Response<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

/// JSON-RPC error object
#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

impl EthereumClient {
    /// Creates a new client. Every request is bounded by `timeout`.
    pub fn new(url: &str, jwt: Option<JwtSecret>, timeout: Duration) -> Result<Self> {
        let url = Url::parse(url).wrap_err_with(|| format!("invalid ethereum rpc url {url}"))?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { url, client, jwt })
    }

    /// Sends a JSON-RPC request and decodes its result.
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let body = Request {
            jsonrpc: JSONRPC_VERSION,
            method,
            params,
            id: STATIC_ID,
        };
        tracing::trace!(target: "exporter::ethereum", method, "sending request");

        let mut req = self.client.post(self.url.clone()).json(&body);
        if let Some(jwt) = &self.jwt {
            req = req.bearer_auth(jwt.token()?);
        }

        let res = req.send().await?;
        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            eyre::bail!("HTTP {}: {}", status, text);
        }

        let res = res.json::<Response<T>>().await?;
        decode(method, res)
    }
}

fn decode<T>(method: &str, res: Response<T>) -> Result<T> {
    if let Some(err) = res.error {
        eyre::bail!("{} failed with code {}: {}", method, err.code, err.message);
    }

    res.result
        .ok_or_else(|| eyre::eyre!("{} returned no result", method))
}

#[async_trait]
impl EthereumSource for EthereumClient {
    async fn block_number(&self) -> Result<u64> {
        let raw: String = self.call(ETH_BLOCK_NUMBER, json!([])).await?;
        let number = parse_quantity(&raw)?;
        u64::try_from(number).wrap_err("block number out of range")
    }

    async fn balance(&self, address: &str) -> Result<u128> {
        let raw: String = self.call(ETH_GET_BALANCE, json!([address, "latest"])).await?;
        parse_quantity(&raw)
    }
}
