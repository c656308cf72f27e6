use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eyre::{Result, WrapErr};
use reqwest::{Client, Url};
use serde::{de::DeserializeOwned, Deserialize};

use super::{Block, BlockSource, NodeStatus, NodeStatusSource, SignatureRecord};

/// A CometBFT JSON-RPC client over HTTP GET.
#[derive(Debug, Clone)]
pub struct RpcClient {
    /// Base url of the node's rpc endpoint
    base_url: Url,
    /// HTTP Client
    client: Client,
}

impl RpcClient {
    /// Creates a new client. Every request is bounded by `timeout`.
    /// Errors if the url is invalid.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut base_url =
            Url::parse(base_url).wrap_err_with(|| format!("invalid rpc url {base_url}"))?;

        // Endpoint paths are joined relative to the base path
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { base_url, client })
    }

    /// Sends a GET request to `path` and decodes the `result` field.
    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = self.base_url.join(path)?;
        tracing::trace!(target: "exporter::cosmos", %url, "sending request");

        let res = self.client.get(url).query(query).send().await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            eyre::bail!("HTTP {}: {}", status, body);
        }

        let envelope = res.json::<Envelope<T>>().await?;
        Ok(envelope.result)
    }
}

#[async_trait]
impl NodeStatusSource for RpcClient {
    async fn status(&self) -> Result<NodeStatus> {
        let res: StatusResult = self.get("status", &[]).await?;
        res.try_into()
    }
}

#[async_trait]
impl BlockSource for RpcClient {
    async fn block(&self, height: u64) -> Result<Block> {
        let query = match height {
            0 => Vec::new(),
            height => vec![("height", height.to_string())],
        };

        let res: BlockResult = self.get("block", &query).await?;
        res.try_into()
    }
}

/// JSON-RPC response envelope
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct StatusResult {
    sync_info: SyncInfo,
}

#[derive(Debug, Deserialize)]
struct SyncInfo {
    latest_block_height: String,
    #[serde(default)]
    latest_block_time: Option<String>,
    #[serde(default)]
    catching_up: bool,
}

impl TryFrom<StatusResult> for NodeStatus {
    type Error = eyre::Report;

    fn try_from(res: StatusResult) -> Result<Self> {
        let sync_info = res.sync_info;
        let latest_height = sync_info
            .latest_block_height
            .parse()
            .wrap_err_with(|| format!("malformed height {:?}", sync_info.latest_block_height))?;

        // An unparsable time only loses the header time
        let latest_block_time = sync_info
            .latest_block_time
            .and_then(|time| DateTime::parse_from_rfc3339(&time).ok())
            .map(|time| time.with_timezone(&Utc));

        Ok(NodeStatus {
            latest_height,
            latest_block_time,
            catching_up: sync_info.catching_up,
        })
    }
}

#[derive(Debug, Deserialize)]
struct BlockResult {
    block: RawBlock,
}

#[derive(Debug, Deserialize)]
struct RawBlock {
    header: RawHeader,
    #[serde(default)]
    last_commit: Option<RawCommit>,
}

#[derive(Debug, Deserialize)]
struct RawHeader {
    height: String,
    proposer_address: String,
}

#[derive(Debug, Deserialize)]
struct RawCommit {
    #[serde(default)]
    signatures: Vec<SignatureRecord>,
}

impl TryFrom<BlockResult> for Block {
    type Error = eyre::Report;

    fn try_from(res: BlockResult) -> Result<Self> {
        let RawBlock {
            header,
            last_commit,
        } = res.block;

        let height = header
            .height
            .parse()
            .wrap_err_with(|| format!("malformed height {:?}", header.height))?;

        Ok(Block {
            height,
            proposer_address: header.proposer_address,
            signatures: last_commit.map(|c| c.signatures).unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cosmos::BlockIdFlag;

    #[test]
    fn decodes_status() {
        let raw = r#"{
            "jsonrpc": "2.0",
            "id": -1,
            "result": {
                "node_info": { "network": "0g-galileo-testnet" },
                "sync_info": {
                    "latest_block_hash": "5B6E",
                    "latest_block_height": "4231877",
                    "latest_block_time": "2025-07-01T09:12:44.123456789Z",
                    "catching_up": false
                }
            }
        }"#;

        let envelope: Envelope<StatusResult> = serde_json::from_str(raw).unwrap();
        let status = NodeStatus::try_from(envelope.result).unwrap();
        assert_eq!(status.latest_height, 4231877);
        assert!(status.latest_block_time.is_some());
        assert!(!status.catching_up);
    }

    #[test]
    fn rejects_malformed_height() {
        let raw = r#"{ "result": { "sync_info": { "latest_block_height": "n/a" } } }"#;
        let envelope: Envelope<StatusResult> = serde_json::from_str(raw).unwrap();
        assert!(NodeStatus::try_from(envelope.result).is_err());
    }

    #[test]
    fn decodes_block() {
        let raw = r#"{
            "result": {
                "block_id": { "hash": "AB12" },
                "block": {
                    "header": {
                        "chain_id": "0g-galileo-testnet",
                        "height": "100",
                        "time": "2025-07-01T09:12:44Z",
                        "proposer_address": "30535EF0D596876C5DBFCF825D64134550AB4945"
                    },
                    "last_commit": {
                        "height": "99",
                        "signatures": [
                            {
                                "block_id_flag": 4,
                                "validator_address": "30535EF0D596876C5DBFCF825D64134550AB4945",
                                "timestamp": "2025-07-01T09:12:43Z",
                                "signature": "c2ln"
                            },
                            {
                                "block_id_flag": 5,
                                "validator_address": "00092F31B30461501CA6311FC225F8F1DDFBE67E",
                                "timestamp": "0001-01-01T00:00:00Z",
                                "signature": null
                            }
                        ]
                    }
                }
            }
        }"#;

        let envelope: Envelope<BlockResult> = serde_json::from_str(raw).unwrap();
        let block = Block::try_from(envelope.result).unwrap();
        assert_eq!(block.height, 100);
        assert_eq!(block.signatures.len(), 2);
        assert_eq!(block.signatures[0].flag, BlockIdFlag::Commit);
        assert_eq!(block.signatures[1].flag, BlockIdFlag::Absent);
    }

    #[test]
    fn tolerates_missing_last_commit() {
        let raw = r#"{ "result": { "block": {
            "header": { "height": "1", "proposer_address": "AA" },
            "last_commit": null
        } } }"#;

        let envelope: Envelope<BlockResult> = serde_json::from_str(raw).unwrap();
        let block = Block::try_from(envelope.result).unwrap();
        assert!(block.signatures.is_empty());
    }

    #[test]
    fn rejects_invalid_url() {
        assert!(RpcClient::new("not a url", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn keeps_base_path_prefix() {
        let client = RpcClient::new("https://rpc.example.org/cosmos", Duration::from_secs(1)).unwrap();
        let url = client.base_url.join("status").unwrap();
        assert_eq!(url.as_str(), "https://rpc.example.org/cosmos/status");
    }
}
