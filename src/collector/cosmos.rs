use std::time::Duration;

use chrono::Utc;
use eyre::{Result, WrapErr};

use crate::{
    block_time::IntervalEstimator,
    config::{BlockTracking, ChainConfig},
    cosmos::{Block, BlockSource, NodeStatusSource},
    liveness::{Activity, AggregateSnapshot, LivenessReport, LivenessWindowAnalyzer},
    telemetry::{metrics::*, Labels, MetricSink},
};

use super::{chain_labels, emit};

/// Collects block time, aggregate and liveness metrics of one Cosmos chain.
///
/// Owns the chain's [IntervalEstimator], so block time statistics accumulate
/// across scrapes.
#[derive(Debug)]
pub struct CosmosPath<C> {
    chain_id: String,
    source: C,
    validators: Vec<String>,
    window: u64,
    tracking_enabled: bool,
    max_consecutive_missed: u64,
    estimator: IntervalEstimator,
}

impl<C: NodeStatusSource + BlockSource> CosmosPath<C> {
    /// Creates the path for `chain`.
    pub fn new(chain: &ChainConfig, tracking: &BlockTracking, source: C) -> Self {
        let mut estimator = IntervalEstimator::new(tracking.history_size);
        if let Some(interval) = tracking
            .initial_block_time
            .filter(|secs| *secs > 0.0)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        {
            estimator.seed(interval);
        }

        Self {
            chain_id: chain.chain_id.clone(),
            source,
            validators: chain.validators.clone(),
            window: tracking.window,
            tracking_enabled: tracking.enabled,
            max_consecutive_missed: tracking.max_consecutive_missed,
            estimator,
        }
    }

    /// The chain's block time estimator.
    pub fn estimator(&self) -> &IntervalEstimator {
        &self.estimator
    }

    /// The underlying chain source.
    pub fn source(&self) -> &C {
        &self.source
    }

    /// Runs one collection pass. Fails only when the node status is unavailable;
    /// every later step degrades on its own.
    pub async fn collect(&mut self, sink: &dyn MetricSink) -> Result<()> {
        let status = self
            .source
            .status()
            .await
            .wrap_err("failed to fetch node status")?;
        let height = status.latest_height;
        let labels = chain_labels(&self.chain_id);

        emit(sink, BLOCK_TIME, Utc::now().timestamp() as f64, labels.clone());
        emit(sink, NODE_HEIGHT, height as f64, labels.clone());
        emit(sink, NODE_CATCHING_UP, bool_gauge(status.catching_up), labels.clone());
        if let Some(time) = status.latest_block_time {
            emit(sink, LATEST_BLOCK_TIME, time.timestamp() as f64, labels.clone());
        }

        self.observe_height(height, sink);

        let latest = match self.source.block(height).await {
            Ok(block) => Some(block),
            Err(err) => {
                tracing::warn!(target: "exporter::collector", chain_id = %self.chain_id, height, "failed to fetch latest block: {:?}", err);
                None
            }
        };

        if let Some(block) = &latest {
            let snapshot = AggregateSnapshot::from(block);
            emit(sink, VALIDATORS_TOTAL, snapshot.total_validators as f64, labels.clone());
            emit(sink, VALIDATORS_ACTIVE, snapshot.active_validators as f64, labels.clone());
            emit(sink, VALIDATORS_INACTIVE, snapshot.inactive_validators as f64, labels.clone());
            emit(sink, VALIDATORS_BONDED_RATIO, snapshot.bonded_ratio, labels.clone());

            for address in &self.validators {
                let activity = Activity::of(block, address);
                emit(sink, VALIDATOR_ACTIVE, activity.as_gauge(), self.validator_labels(address));
            }
        }

        if !self.tracking_enabled || self.validators.is_empty() {
            return Ok(());
        }

        let analyzer = LivenessWindowAnalyzer::new(&self.source, self.window);
        let mut report = analyzer
            .analyze_with_latest(height, latest.as_ref(), &self.validators)
            .await;
        tracing::debug!(
            target: "exporter::collector",
            chain_id = %self.chain_id,
            height,
            scanned = report.scanned,
            failed = report.failed(),
            "liveness window scanned"
        );

        self.warn_on_streaks(&report);
        if let Some(block) = &latest {
            report.suppress_inactive(block);
        }
        self.emit_liveness(&report, latest.as_ref(), sink);

        Ok(())
    }

    fn observe_height(&mut self, height: u64, sink: &dyn MetricSink) {
        let now = tokio::time::Instant::now().into_std();
        if let Some(interval) = self.estimator.update(height, now) {
            tracing::trace!(target: "exporter::collector", chain_id = %self.chain_id, height, "block interval {:?}", interval);
        }

        let labels = chain_labels(&self.chain_id);
        let stats = self.estimator.stats();
        emit(sink, AVG_BLOCK_TIME, stats.average.as_secs_f64(), labels.clone());
        emit(sink, TIME_SINCE_LAST_BLOCK, self.estimator.latest_interval().as_secs_f64(), labels.clone());
        emit(sink, MIN_BLOCK_TIME, stats.min.as_secs_f64(), labels.clone());
        emit(sink, MAX_BLOCK_TIME, stats.max.as_secs_f64(), labels.clone());
        emit(sink, BLOCK_TIME_STABLE, bool_gauge(self.estimator.is_stable()), labels.clone());
        emit(sink, BLOCK_TIME_SAMPLES, self.estimator.len() as f64, labels);
    }

    fn warn_on_streaks(&self, report: &LivenessReport) {
        if self.max_consecutive_missed == 0 {
            return;
        }

        for stat in report.validators.values() {
            if stat.consecutive_missed >= self.max_consecutive_missed {
                tracing::warn!(
                    target: "exporter::collector",
                    chain_id = %self.chain_id,
                    address = %stat.address,
                    consecutive_missed = stat.consecutive_missed,
                    "validator is missing blocks"
                );
            }
        }
    }

    fn emit_liveness(&self, report: &LivenessReport, latest: Option<&Block>, sink: &dyn MetricSink) {
        emit(sink, LIVENESS_WINDOW_BLOCKS, report.scanned as f64, chain_labels(&self.chain_id));

        for stat in report.validators.values() {
            let labels = self.validator_labels(&stat.address);
            emit(sink, VALIDATOR_SIGNED_BLOCKS, stat.signed as f64, labels.clone());
            emit(sink, VALIDATOR_MISSED_BLOCKS, stat.missed as f64, labels.clone());
            emit(sink, VALIDATOR_CONSECUTIVE_MISSED, stat.consecutive_missed as f64, labels.clone());
            emit(sink, VALIDATOR_MAX_CONSECUTIVE_MISSED, stat.max_consecutive_missed as f64, labels.clone());
            emit(sink, VALIDATOR_PROPOSALS, stat.proposals as f64, labels);
        }

        if latest.is_none() {
            tracing::debug!(target: "exporter::collector", chain_id = %self.chain_id, "latest block unavailable, miss counters unsuppressed");
        }
    }

    fn validator_labels(&self, address: &str) -> Labels {
        let mut labels = chain_labels(&self.chain_id);
        labels.push(("address", address.to_string()));
        labels
    }
}

fn bool_gauge(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use crate::cosmos::{BlockIdFlag, MockChain};
    use crate::telemetry::MemorySink;

    const V: &str = "30535EF0D596876C5DBFCF825D64134550AB4945";

    fn chain() -> ChainConfig {
        ChainConfig {
            chain_id: "0g".into(),
            name: String::new(),
            rpc: "http://localhost:26657".into(),
            validators: vec![V.to_string()],
        }
    }

    #[test]
    fn seeds_estimator() {
        let tracking = BlockTracking {
            initial_block_time: Some(2.5),
            ..Default::default()
        };
        let path = CosmosPath::new(&chain(), &tracking, MockChain::new(1));
        assert_eq!(path.estimator().len(), 1);
        assert_eq!(path.estimator().average_interval(), Duration::from_millis(2500));

        let tracking = BlockTracking {
            initial_block_time: Some(-1.0),
            ..Default::default()
        };
        let path = CosmosPath::new(&chain(), &tracking, MockChain::new(1));
        assert!(path.estimator().is_empty());
    }

    #[tokio::test]
    async fn skips_window_when_tracking_disabled() {
        let tracking = BlockTracking {
            enabled: false,
            ..Default::default()
        };
        let source = MockChain::new(3).with_block(3, V, &[(V, BlockIdFlag::Commit)]);
        let mut path = CosmosPath::new(&chain(), &tracking, source);
        let sink = MemorySink::new();

        path.collect(&sink).await.unwrap();

        assert_eq!(path.source().block_requests(), 1);
        assert_eq!(sink.get("cosmos_validators_active", &[]), Some(1.0));
        assert_eq!(sink.get("cosmos_validator_active", &[("address", V)]), Some(1.0));
        assert!(!sink.contains("cosmos_validator_signed_blocks"));
    }

    #[tokio::test]
    async fn skips_aggregate_without_latest_block() {
        let source = MockChain::new(2).with_block(1, V, &[(V, BlockIdFlag::Absent)]);
        let mut path = CosmosPath::new(&chain(), &BlockTracking::default(), source);
        let sink = MemorySink::new();

        path.collect(&sink).await.unwrap();

        assert_eq!(path.source().block_requests(), 2);
        assert!(!sink.contains("cosmos_validators_total"));
        assert!(!sink.contains("cosmos_validator_active"));
        assert_eq!(sink.get("cosmos_liveness_window_blocks", &[]), Some(1.0));
        // no suppression without the latest block
        assert_eq!(sink.get("cosmos_validator_missed_blocks", &[("address", V)]), Some(1.0));
    }

    #[tokio::test]
    async fn fetches_each_height_once() {
        let source = MockChain::new(3)
            .with_block(3, V, &[(V, BlockIdFlag::Commit)])
            .with_block(2, V, &[(V, BlockIdFlag::Absent)])
            .with_block(1, V, &[(V, BlockIdFlag::Commit)]);
        let tracking = BlockTracking {
            window: 3,
            ..Default::default()
        };
        let mut path = CosmosPath::new(&chain(), &tracking, source);
        let sink = MemorySink::new();

        path.collect(&sink).await.unwrap();

        assert_eq!(path.source().block_requests(), 3);
        assert_eq!(sink.get("cosmos_liveness_window_blocks", &[]), Some(3.0));
        assert_eq!(sink.get("cosmos_validator_signed_blocks", &[("address", V)]), Some(2.0));
        assert_eq!(sink.get("cosmos_validator_proposals", &[("address", V)]), Some(3.0));
    }

    #[tokio::test]
    async fn emits_latest_block_time() {
        let time = Utc.with_ymd_and_hms(2025, 7, 1, 9, 12, 44).unwrap();
        let source = MockChain::new(3).with_latest_block_time(time);
        let mut path = CosmosPath::new(&chain(), &BlockTracking::default(), source);
        let sink = MemorySink::new();

        path.collect(&sink).await.unwrap();

        assert_eq!(
            sink.get("cosmos_chain_latest_block_time", &[("chain_id", "0g")]),
            Some(time.timestamp() as f64)
        );

        let mut path = CosmosPath::new(&chain(), &BlockTracking::default(), MockChain::new(3));
        let sink = MemorySink::new();
        path.collect(&sink).await.unwrap();
        assert!(!sink.contains("cosmos_chain_latest_block_time"));
    }

    #[tokio::test]
    async fn fails_without_status() {
        let mut path = CosmosPath::new(&chain(), &BlockTracking::default(), MockChain::unreachable());
        let sink = MemorySink::new();

        assert!(path.collect(&sink).await.is_err());
        assert!(sink.is_empty());
    }
}
