use std::collections::HashMap;

use async_trait::async_trait;
use eyre::Result;

use super::EthereumSource;

/// Ethereum source returning preset responses. Unset values fail.
#[derive(Debug, Clone, Default)]
pub struct MockEthereum {
    /// Block number response
    pub block_number: Option<u64>,
    /// Balance responses by address
    pub balances: HashMap<String, u128>,
}

impl MockEthereum {
    /// Creates a source reporting `block_number`.
    pub fn new(block_number: u64) -> Self {
        Self {
            block_number: Some(block_number),
            ..Default::default()
        }
    }

    /// Creates a source whose every request fails.
    pub fn unreachable() -> Self {
        Self::default()
    }

    /// Sets the balance of `address`.
    pub fn with_balance(mut self, address: &str, balance: u128) -> Self {
        self.balances.insert(address.to_string(), balance);
        self
    }
}

#[async_trait]
impl EthereumSource for MockEthereum {
    async fn block_number(&self) -> Result<u64> {
        self.block_number.ok_or(eyre::eyre!("connection refused"))
    }

    async fn balance(&self, address: &str) -> Result<u128> {
        self.balances
            .get(address)
            .copied()
            .ok_or(eyre::eyre!("no balance for {}", address))
    }
}
