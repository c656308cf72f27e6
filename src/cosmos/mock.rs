use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eyre::Result;

use super::{Block, BlockIdFlag, BlockSource, NodeStatus, NodeStatusSource, SignatureRecord};

/// In-memory chain serving preset status and blocks.
///
/// Heights without a preset block fail to fetch, as does the status while the
/// latest height is zero.
#[derive(Debug, Default)]
pub struct MockChain {
    /// Reported latest height, zero when unreachable
    latest_height: AtomicU64,
    /// Blocks by height
    pub blocks: HashMap<u64, Block>,
    /// Reported header time of the latest block
    pub latest_block_time: Option<DateTime<Utc>>,
    /// Delay applied to every request
    pub delay: Option<Duration>,
    /// Number of block requests served or failed
    block_requests: AtomicUsize,
}

impl MockChain {
    /// Creates a chain whose status reports `latest_height`.
    pub fn new(latest_height: u64) -> Self {
        Self {
            latest_height: AtomicU64::new(latest_height),
            ..Default::default()
        }
    }

    /// Creates a chain whose every request fails.
    pub fn unreachable() -> Self {
        Self::default()
    }

    /// Adds a block at `height` proposed by `proposer` with the given signatures.
    pub fn with_block(mut self, height: u64, proposer: &str, signatures: &[(&str, BlockIdFlag)]) -> Self {
        let block = Block {
            height,
            proposer_address: proposer.to_string(),
            signatures: signatures
                .iter()
                .map(|(address, flag)| SignatureRecord::new(*address, *flag))
                .collect(),
        };
        self.blocks.insert(height, block);
        self
    }

    /// Reports `time` as the latest block's header time.
    pub fn with_latest_block_time(mut self, time: DateTime<Utc>) -> Self {
        self.latest_block_time = Some(time);
        self
    }

    /// Delays every request by `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Moves the chain tip to `height`.
    pub fn set_latest_height(&self, height: u64) {
        self.latest_height.store(height, Ordering::SeqCst);
    }

    /// The reported latest height, if reachable.
    pub fn latest_height(&self) -> Option<u64> {
        match self.latest_height.load(Ordering::SeqCst) {
            0 => None,
            height => Some(height),
        }
    }

    /// Number of block requests received so far.
    pub fn block_requests(&self) -> usize {
        self.block_requests.load(Ordering::SeqCst)
    }

    async fn wait(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl NodeStatusSource for MockChain {
    async fn status(&self) -> Result<NodeStatus> {
        self.wait().await;
        let latest_height = self
            .latest_height()
            .ok_or(eyre::eyre!("connection refused"))?;

        Ok(NodeStatus {
            latest_height,
            latest_block_time: self.latest_block_time,
            catching_up: false,
        })
    }
}

#[async_trait]
impl BlockSource for MockChain {
    async fn block(&self, height: u64) -> Result<Block> {
        self.block_requests.fetch_add(1, Ordering::SeqCst);
        self.wait().await;

        let height = match (height, self.latest_height()) {
            (0, Some(latest)) => latest,
            (height, _) => height,
        };

        self.blocks
            .get(&height)
            .cloned()
            .ok_or(eyre::eyre!("block {} not found", height))
    }
}
