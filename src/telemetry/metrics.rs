//! Prometheus Metrics Module.
//!
//! Names and help texts of every metric the exporter emits. Values reach
//! Prometheus through a [MetricSink](super::MetricSink).

use std::net::SocketAddr;

use eyre::{Result, WrapErr};
use prometheus_exporter::start;

/// A metric name with its help text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Metric {
    /// Metric name
    pub name: &'static str,
    /// Help text
    pub help: &'static str,
}

macro_rules! metrics {
    ($($(#[$doc:meta])* $ident:ident => $name:literal, $help:literal;)*) => {
        $(
            $(#[$doc])*
            pub const $ident: Metric = Metric { name: $name, help: $help };
        )*
    };
}

metrics! {
    /// Unix time of the scrape that observed the latest height
    BLOCK_TIME => "cosmos_block_time", "Unix time of the last scrape";
    /// Latest height reported by the node
    NODE_HEIGHT => "cosmos_node_height", "Latest block height reported by the node";
    /// Whether the node is syncing
    NODE_CATCHING_UP => "cosmos_node_catching_up", "1 if the node is catching up";
    /// Header time of the latest block, when the node reports it
    LATEST_BLOCK_TIME => "cosmos_chain_latest_block_time", "Unix time of the latest block header";
    AVG_BLOCK_TIME => "cosmos_avg_block_time", "Average block time in seconds";
    TIME_SINCE_LAST_BLOCK => "cosmos_time_since_last_block", "Latest observed block interval in seconds";
    MIN_BLOCK_TIME => "cosmos_block_time_min", "Shortest block interval in the history in seconds";
    MAX_BLOCK_TIME => "cosmos_block_time_max", "Longest block interval in the history in seconds";
    BLOCK_TIME_STABLE => "cosmos_block_time_stable", "1 if the block time is stable";
    BLOCK_TIME_SAMPLES => "cosmos_block_time_samples", "Number of block intervals in the history";
    VALIDATORS_TOTAL => "cosmos_validators_total", "Signature slots in the latest block";
    VALIDATORS_ACTIVE => "cosmos_validators_active", "Committed signatures in the latest block";
    VALIDATORS_INACTIVE => "cosmos_validators_inactive", "Absent signatures in the latest block";
    VALIDATORS_BONDED_RATIO => "cosmos_validators_bonded_ratio", "Share of active signature slots in the latest block";
    /// Heights that contributed to the liveness counters
    LIVENESS_WINDOW_BLOCKS => "cosmos_liveness_window_blocks", "Blocks scanned in the liveness window";
    VALIDATOR_SIGNED_BLOCKS => "cosmos_validator_signed_blocks", "Blocks signed in the liveness window";
    VALIDATOR_MISSED_BLOCKS => "cosmos_validator_missed_blocks", "Blocks missed in the liveness window";
    VALIDATOR_CONSECUTIVE_MISSED => "cosmos_validator_consecutive_missed", "Current miss streak";
    VALIDATOR_MAX_CONSECUTIVE_MISSED => "cosmos_validator_max_consecutive_missed", "Longest miss streak in the liveness window";
    VALIDATOR_PROPOSALS => "cosmos_validator_proposals", "Blocks proposed in the liveness window";
    VALIDATOR_ACTIVE => "cosmos_validator_active", "1 if the validator signed the latest block";
    ETH_BLOCK_NUMBER => "eth_block_number", "Ethereum block number";
    ETH_STAKING_CONTRACT => "eth_staking_contract", "1 if the staking contract is reachable";
    ETH_ADDRESS_BALANCE => "eth_address_balance", "Balance of an Ethereum address in wei";
    SCRAPE_DURATION => "exporter_scrape_duration_seconds", "Duration of the last scrape in seconds";
    /// Outcome of a collection path, `1` when it completed
    SCRAPE_PATH_UP => "exporter_scrape_path_up", "1 if the collection path completed in the last scrape";
}

/// Starts the metrics server on `listen_address`.
pub fn init(listen_address: &str) -> Result<()> {
    let addr: SocketAddr = listen_address
        .parse()
        .wrap_err_with(|| format!("invalid listen address {listen_address}"))?;

    start(addr).wrap_err_with(|| format!("failed to serve metrics on {addr}"))?;
    Ok(())
}
