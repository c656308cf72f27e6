use eyre::Result;

use crate::{
    config::EthereumConfig,
    ethereum::EthereumSource,
    telemetry::{metrics::*, MetricSink},
};

use super::{chain_labels, emit};

/// Collects block number, staking contract and balance metrics from the EVM
/// endpoint of the designated network.
#[derive(Debug)]
pub struct EthereumPath<E> {
    source: E,
    config: EthereumConfig,
}

impl<E: EthereumSource> EthereumPath<E> {
    /// Creates a new path.
    pub fn new(source: E, config: EthereumConfig) -> Self {
        Self { source, config }
    }

    /// Whether the path runs for `chain_id`.
    pub fn applies_to(&self, chain_id: &str) -> bool {
        self.config.network == chain_id
    }

    /// Runs one collection pass. A failed query only skips its own metric;
    /// the pass fails when every query failed.
    pub async fn collect(&self, chain_id: &str, sink: &dyn MetricSink) -> Result<()> {
        let mut succeeded = 0usize;
        let mut last_error = None;

        match self.source.block_number().await {
            Ok(block_number) => {
                emit(sink, ETH_BLOCK_NUMBER, block_number as f64, chain_labels(chain_id));
                succeeded += 1;
            }
            Err(err) => {
                tracing::warn!(target: "exporter::collector", chain_id, "failed to fetch ethereum block number: {:?}", err);
                last_error = Some(err.wrap_err("failed to fetch ethereum block number"));
            }
        }

        if let Some(contract) = &self.config.staking_contract {
            let reachable = match self.source.balance(contract).await {
                Ok(_) => {
                    succeeded += 1;
                    1.0
                }
                Err(err) => {
                    tracing::warn!(target: "exporter::collector", chain_id, contract = %contract, "staking contract unreachable: {:?}", err);
                    last_error = Some(err.wrap_err(format!("staking contract {contract} unreachable")));
                    0.0
                }
            };
            let mut labels = chain_labels(chain_id);
            labels.push(("contract", contract.clone()));
            emit(sink, ETH_STAKING_CONTRACT, reachable, labels);
        }

        for entry in &self.config.addresses {
            match self.source.balance(&entry.address).await {
                Ok(balance) => {
                    let mut labels = chain_labels(chain_id);
                    labels.push(("address", entry.address.clone()));
                    labels.push(("name", entry.name.clone()));
                    emit(sink, ETH_ADDRESS_BALANCE, balance as f64, labels);
                    succeeded += 1;
                }
                Err(err) => {
                    tracing::warn!(target: "exporter::collector", chain_id, address = %entry.address, "failed to fetch balance: {:?}", err);
                    last_error = Some(err.wrap_err(format!("failed to fetch balance of {}", entry.address)));
                }
            }
        }

        match last_error {
            Some(err) if succeeded == 0 => Err(err),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EthereumAddress;
    use crate::ethereum::MockEthereum;
    use crate::telemetry::MemorySink;

    const STAKING: &str = "0xea224dBB52F57752044c0C86aD50930091F561B9";
    const FUNDED: &str = "0x00092f31B30461501CA6311Fc225f8f1ddFbE67e";
    const UNKNOWN: &str = "0x0000000000000000000000000000000000000001";

    fn config() -> EthereumConfig {
        EthereumConfig {
            rpc_url: "http://localhost:8545".into(),
            jwt_secret: None,
            staking_contract: Some(STAKING.into()),
            network: "0g-galileo-testnet".into(),
            addresses: vec![
                EthereumAddress {
                    address: FUNDED.into(),
                    name: "validator".into(),
                },
                EthereumAddress {
                    address: UNKNOWN.into(),
                    name: "unknown".into(),
                },
            ],
        }
    }

    #[test]
    fn gates_on_network() {
        let path = EthereumPath::new(MockEthereum::new(1), config());
        assert!(path.applies_to("0g-galileo-testnet"));
        assert!(!path.applies_to("0g-newton-testnet"));
    }

    #[tokio::test]
    async fn skips_failed_balances() {
        let source = MockEthereum::new(1_234).with_balance(FUNDED, 2_000_000_000_000_000_000);
        let path = EthereumPath::new(source, config());
        let sink = MemorySink::new();

        path.collect("0g-galileo-testnet", &sink).await.unwrap();

        assert_eq!(sink.get("eth_block_number", &[]), Some(1_234.0));
        assert_eq!(sink.get("eth_staking_contract", &[("contract", STAKING)]), Some(0.0));
        assert_eq!(
            sink.get("eth_address_balance", &[("name", "validator")]),
            Some(2e18)
        );
        assert_eq!(sink.get("eth_address_balance", &[("address", UNKNOWN)]), None);
    }

    #[tokio::test]
    async fn balances_survive_block_number_failure() {
        let source = MockEthereum {
            block_number: None,
            ..Default::default()
        }
        .with_balance(FUNDED, 7)
        .with_balance(STAKING, 0);
        let path = EthereumPath::new(source, config());
        let sink = MemorySink::new();

        path.collect("0g-galileo-testnet", &sink).await.unwrap();

        assert!(!sink.contains("eth_block_number"));
        assert_eq!(sink.get("eth_staking_contract", &[("contract", STAKING)]), Some(1.0));
        assert_eq!(sink.get("eth_address_balance", &[("address", FUNDED)]), Some(7.0));
    }

    #[tokio::test]
    async fn fails_when_every_query_fails() {
        let path = EthereumPath::new(MockEthereum::unreachable(), config());
        let sink = MemorySink::new();

        assert!(path.collect("0g-galileo-testnet", &sink).await.is_err());
        assert!(!sink.contains("eth_block_number"));
        assert_eq!(sink.get("eth_staking_contract", &[("contract", STAKING)]), Some(0.0));
        assert!(!sink.contains("eth_address_balance"));
    }
}
