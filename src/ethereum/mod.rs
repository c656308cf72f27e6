//! Ethereum JSON-RPC data sources for the EVM side of the chain.

use async_trait::async_trait;
use eyre::Result;

mod auth;
pub use auth::JwtSecret;

mod client;
pub use client::EthereumClient;

#[cfg(any(test, feature = "test-utils"))]
mod mock;
#[cfg(any(test, feature = "test-utils"))]
pub use mock::MockEthereum;

/// The JSON-RPC version
pub const JSONRPC_VERSION: &str = "2.0";

/// Static id sent with every request
pub const STATIC_ID: u64 = 1;

/// Queries against an Ethereum execution endpoint.
#[async_trait]
pub trait EthereumSource: Send + Sync {
    /// Returns the latest block number.
    async fn block_number(&self) -> Result<u64>;

    /// Returns the balance of `address` in wei at the latest block.
    async fn balance(&self, address: &str) -> Result<u128>;
}

/// Parses a `0x`-prefixed hex quantity.
pub fn parse_quantity(value: &str) -> Result<u128> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .ok_or_else(|| eyre::eyre!("quantity {:?} is missing the 0x prefix", value))?;

    if digits.is_empty() {
        eyre::bail!("empty quantity");
    }

    u128::from_str_radix(digits, 16).map_err(|e| eyre::eyre!("malformed quantity {:?}: {}", value, e))
}
