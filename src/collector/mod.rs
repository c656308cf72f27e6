//! Scrape coordination.
//!
//! A [Collector] scrapes one chain. Each scrape runs the Cosmos path and the
//! Ethereum path concurrently under a shared deadline. Both paths write to the
//! same [MetricSink] as they go, so whatever was collected before a failure or
//! the deadline stays visible. Series a scrape did not refresh are expired
//! when it ends. A scrape never fails; its [ScrapeReport] tells how each path
//! ended.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::{
    config::{BlockTracking, ChainConfig, EthereumConfig},
    cosmos::{BlockSource, NodeStatusSource},
    ethereum::{EthereumClient, EthereumSource},
    telemetry::{
        metrics::{Metric, SCRAPE_DURATION, SCRAPE_PATH_UP},
        Labels, MetricSink, Observation, CHAIN_LABEL,
    },
};

mod cosmos;
pub use cosmos::CosmosPath;

mod ethereum;
pub use ethereum::EthereumPath;

/// Deadline of a scrape unless configured otherwise.
pub const DEFAULT_SCRAPE_TIMEOUT: Duration = Duration::from_secs(5);

/// How a collection path ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathOutcome {
    /// Ran to the end
    Completed,
    /// Not applicable to this chain
    Skipped,
    /// Stopped with an error
    Failed(String),
    /// Still running when the deadline expired
    TimedOut,
}

impl PathOutcome {
    /// Value of the path's `up` gauge. Skipped paths have none.
    fn as_gauge(&self) -> Option<f64> {
        match self {
            PathOutcome::Completed => Some(1.0),
            PathOutcome::Failed(_) | PathOutcome::TimedOut => Some(0.0),
            PathOutcome::Skipped => None,
        }
    }
}

impl fmt::Display for PathOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathOutcome::Completed => write!(f, "completed"),
            PathOutcome::Skipped => write!(f, "skipped"),
            PathOutcome::Failed(err) => write!(f, "failed: {err}"),
            PathOutcome::TimedOut => write!(f, "timed out"),
        }
    }
}

/// Summary of one scrape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeReport {
    /// Scraped chain
    pub chain_id: String,
    /// Outcome of the Cosmos path
    pub cosmos: PathOutcome,
    /// Outcome of the Ethereum path
    pub ethereum: PathOutcome,
    /// Time until both paths ended or the deadline expired
    pub elapsed: Duration,
}

impl ScrapeReport {
    /// Whether no path failed or timed out.
    pub fn is_complete(&self) -> bool {
        [&self.cosmos, &self.ethereum]
            .iter()
            .all(|outcome| matches!(outcome, PathOutcome::Completed | PathOutcome::Skipped))
    }
}

/// Scrapes one chain into a sink.
pub struct Collector<C, E = EthereumClient> {
    chain_id: String,
    cosmos: CosmosPath<C>,
    ethereum: Option<EthereumPath<E>>,
    sink: Arc<dyn MetricSink>,
    deadline: Duration,
}

impl<C, E> fmt::Debug for Collector<C, E>
where
    C: fmt::Debug,
    E: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collector")
            .field("chain_id", &self.chain_id)
            .field("cosmos", &self.cosmos)
            .field("ethereum", &self.ethereum)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

impl<C, E> Collector<C, E>
where
    C: NodeStatusSource + BlockSource,
    E: EthereumSource,
{
    /// Creates a collector for `chain` without an Ethereum endpoint.
    pub fn new(
        chain: &ChainConfig,
        tracking: &BlockTracking,
        source: C,
        sink: Arc<dyn MetricSink>,
    ) -> Self {
        Self {
            chain_id: chain.chain_id.clone(),
            cosmos: CosmosPath::new(chain, tracking, source),
            ethereum: None,
            sink,
            deadline: DEFAULT_SCRAPE_TIMEOUT,
        }
    }

    /// Adds the Ethereum endpoint.
    pub fn with_ethereum(mut self, source: E, config: EthereumConfig) -> Self {
        self.ethereum = Some(EthereumPath::new(source, config));
        self
    }

    /// Sets the deadline shared by both paths.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// The scraped chain id.
    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    /// The Cosmos path, holding the chain's block time estimator.
    pub fn cosmos(&self) -> &CosmosPath<C> {
        &self.cosmos
    }

    /// Runs both collection paths until they end or the deadline expires.
    pub async fn scrape(&mut self) -> ScrapeReport {
        let start = Instant::now();
        let Self {
            ref chain_id,
            ref mut cosmos,
            ref ethereum,
            ref sink,
            deadline,
        } = *self;
        let chain_id: &str = chain_id;
        let sink: &dyn MetricSink = &**sink;

        let ethereum = ethereum.as_ref().filter(|path| path.applies_to(chain_id));
        let mut cosmos_outcome = None;
        let mut ethereum_outcome = ethereum.is_none().then_some(PathOutcome::Skipped);

        let paths = async {
            tokio::join!(
                async {
                    cosmos_outcome = Some(into_outcome(cosmos.collect(sink).await));
                },
                async {
                    if let Some(path) = ethereum {
                        ethereum_outcome = Some(into_outcome(path.collect(chain_id, sink).await));
                    }
                },
            )
        };

        if tokio::time::timeout(deadline, paths).await.is_err() {
            tracing::warn!(target: "exporter::collector", chain_id, "scrape deadline of {:?} expired", deadline);
        }

        let report = ScrapeReport {
            chain_id: chain_id.to_string(),
            cosmos: cosmos_outcome.unwrap_or(PathOutcome::TimedOut),
            ethereum: ethereum_outcome.unwrap_or(PathOutcome::TimedOut),
            elapsed: start.elapsed(),
        };
        record(&report, sink);
        if let Err(err) = sink.expire(chain_id) {
            tracing::warn!(target: "exporter::collector", chain_id, "failed to expire stale series: {:?}", err);
        }

        report
    }
}

fn into_outcome(result: eyre::Result<()>) -> PathOutcome {
    match result {
        Ok(()) => PathOutcome::Completed,
        Err(err) => PathOutcome::Failed(format!("{err:#}")),
    }
}

/// Logs path failures and emits the scrape bookkeeping gauges.
fn record(report: &ScrapeReport, sink: &dyn MetricSink) {
    let chain_id = report.chain_id.as_str();
    for (path, outcome) in [("cosmos", &report.cosmos), ("ethereum", &report.ethereum)] {
        match outcome {
            PathOutcome::Failed(err) => {
                tracing::error!(target: "exporter::collector", chain_id, path, "collection failed: {}", err);
            }
            PathOutcome::TimedOut => {
                tracing::error!(target: "exporter::collector", chain_id, path, "collection timed out");
            }
            _ => {}
        }

        if let Some(up) = outcome.as_gauge() {
            let mut labels = chain_labels(chain_id);
            labels.push(("path", path.to_string()));
            emit(sink, SCRAPE_PATH_UP, up, labels);
        }
    }

    emit(sink, SCRAPE_DURATION, report.elapsed.as_secs_f64(), chain_labels(chain_id));
    tracing::debug!(
        target: "exporter::collector",
        chain_id,
        cosmos = %report.cosmos,
        ethereum = %report.ethereum,
        "scrape finished in {:?}",
        report.elapsed
    );
}

/// Labels shared by every observation of a chain.
pub(crate) fn chain_labels(chain_id: &str) -> Labels {
    vec![(CHAIN_LABEL, chain_id.to_string())]
}

/// Submits an observation, logging a rejected one.
pub(crate) fn emit(sink: &dyn MetricSink, metric: Metric, value: f64, labels: Labels) {
    if let Err(err) = sink.submit(Observation::new(metric, value, labels)) {
        tracing::warn!(target: "exporter::collector", metric = metric.name, "failed to record metric: {:?}", err);
    }
}
