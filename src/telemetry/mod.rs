//! Telemetry module
//!
//! This module encompasses logging and metrics exposition.
//! Core components are described below.
//!
//! ### Logging
//!
//! Logging is constructed using the [tracing](https://crates.io/crates/tracing) crate.
//! Use [crate::telemetry::init] to install the global subscriber built from the
//! logging section of the config. This function will return an error if a logger
//! has already been initialized.
//!
//! ### Metrics
//!
//! Metrics are exposed with the [prometheus](https://crates.io/crates/prometheus) crate.
//! Collection paths submit [Observation]s to a [MetricSink]: [PrometheusSink] feeds the
//! server started by [init_metrics], [MemorySink] keeps values in memory.

pub mod logging;
pub use logging::{
    get_rolling_file_appender, get_rotation_strategy, init, AnsiTermLayer, AnsiVisitor,
    DEFAULT_ROTATION, LOG_FILE_NAME_PREFIX,
};

pub mod metrics;
pub use metrics::{init as init_metrics, Metric};

mod sink;
pub use sink::{Labels, MemorySink, MetricSink, Observation, PrometheusSink, CHAIN_LABEL};
