//! Cosmos (CometBFT) data sources.
//!
//! The liveness and block time computations only see the typed values defined
//! here. [RpcClient] fetches them from a node's JSON-RPC endpoint; tests use
//! [MockChain].

use async_trait::async_trait;
use eyre::Result;

mod client;
pub use client::RpcClient;

mod types;
pub use types::{Block, BlockIdFlag, NodeStatus, SignatureRecord};

#[cfg(any(test, feature = "test-utils"))]
mod mock;
#[cfg(any(test, feature = "test-utils"))]
pub use mock::MockChain;

/// Provides the node's view of the chain tip.
#[async_trait]
pub trait NodeStatusSource: Send + Sync {
    /// Fetches the node status.
    async fn status(&self) -> Result<NodeStatus>;
}

/// Provides blocks by height.
#[async_trait]
pub trait BlockSource: Send + Sync {
    /// Fetches the block at `height`. A height of `0` fetches the latest block.
    async fn block(&self, height: u64) -> Result<Block>;
}
