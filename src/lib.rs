/// Block time estimation from observed heights
pub mod block_time;

/// Validator liveness over a trailing block window
pub mod liveness;

/// Cosmos node data sources
pub mod cosmos;

/// Ethereum JSON-RPC data sources
pub mod ethereum;

/// Scrape coordination across collection paths
pub mod collector;

/// Configuration management
pub mod config;

/// Logging and metrics exposition
pub mod telemetry;

/// A module to run the scrape loop
pub mod runner;
