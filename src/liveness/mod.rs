//! Validator liveness over a trailing window of blocks.
//!
//! [LivenessWindowAnalyzer] walks the most recent heights in descending order
//! and counts, per tracked validator, signed and missed blocks, the current and
//! longest miss streak, and proposals. Every scan starts from zeroed counters.
//! The network-wide view of the latest block lives in [aggregate].

use std::collections::{BTreeMap, HashMap};

use crate::cosmos::{Block, BlockIdFlag, BlockSource};

pub mod aggregate;
pub use aggregate::AggregateSnapshot;

/// Default number of heights scanned per liveness pass.
pub const DEFAULT_WINDOW: u64 = 100;

/// Liveness counters for one validator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatorStat {
    /// Consensus address
    pub address: String,
    /// Heights with a COMMIT signature
    pub signed: u64,
    /// Heights without a COMMIT signature
    pub missed: u64,
    /// Misses since the last signed height, in scan order
    pub consecutive_missed: u64,
    /// Longest miss streak seen in the window
    pub max_consecutive_missed: u64,
    /// Blocks proposed
    pub proposals: u64,
}

impl ValidatorStat {
    /// Creates zeroed counters for `address`.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }

    fn record_signed(&mut self) {
        self.signed += 1;
        self.consecutive_missed = 0;
    }

    fn record_missed(&mut self) {
        self.missed += 1;
        self.consecutive_missed += 1;
        self.max_consecutive_missed = self.max_consecutive_missed.max(self.consecutive_missed);
    }

    /// Number of heights this validator was evaluated at.
    pub fn observed(&self) -> u64 {
        self.signed + self.missed
    }
}

/// A validator's state at the latest block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    /// Signed the latest block
    Active,
    /// Absent from, or not signing, the latest block
    Inactive,
}

impl Activity {
    /// Derives the activity of `address` from `block`'s signatures. A missing
    /// signature counts as inactive.
    pub fn of(block: &Block, address: &str) -> Self {
        match block.signature_of(address) {
            Some(BlockIdFlag::Commit) => Activity::Active,
            _ => Activity::Inactive,
        }
    }

    /// Gauge value, `1` when active.
    pub fn as_gauge(self) -> f64 {
        match self {
            Activity::Active => 1.0,
            Activity::Inactive => 0.0,
        }
    }
}

/// Result of a liveness scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LivenessReport {
    /// Height the scan started from
    pub height: u64,
    /// Heights attempted
    pub attempted: u64,
    /// Heights successfully fetched and counted
    pub scanned: u64,
    /// Per-validator counters keyed by address
    pub validators: BTreeMap<String, ValidatorStat>,
}

impl LivenessReport {
    fn empty(height: u64, validators: &[String]) -> Self {
        Self {
            height,
            validators: validators
                .iter()
                .map(|address| (address.clone(), ValidatorStat::new(address.clone())))
                .collect(),
            ..Default::default()
        }
    }

    /// Heights that could not be fetched.
    pub fn failed(&self) -> u64 {
        self.attempted - self.scanned
    }

    /// Returns the counters of `address`.
    pub fn get(&self, address: &str) -> Option<&ValidatorStat> {
        self.validators.get(address)
    }

    /// Zeroes `missed` and `max_consecutive_missed` of every validator that
    /// is inactive in `latest`.
    ///
    /// This is a display policy: a validator that is currently down would
    /// otherwise report its whole outage as missed history. The real miss
    /// history is discarded for such validators; `consecutive_missed` and the
    /// activity gauge still show the outage.
    pub fn suppress_inactive(&mut self, latest: &Block) {
        for stat in self.validators.values_mut() {
            if Activity::of(latest, &stat.address) == Activity::Inactive {
                stat.missed = 0;
                stat.max_consecutive_missed = 0;
            }
        }
    }
}

/// Scans a trailing window of blocks for validator participation.
#[derive(Debug)]
pub struct LivenessWindowAnalyzer<'a, B: ?Sized> {
    /// Block source
    source: &'a B,
    /// Number of heights to scan
    window: u64,
}

impl<'a, B: BlockSource + ?Sized> LivenessWindowAnalyzer<'a, B> {
    /// Creates an analyzer over `window` heights.
    pub fn new(source: &'a B, window: u64) -> Self {
        Self { source, window }
    }

    /// Scans heights `height` down to `height - window + 1`, stopping before
    /// height zero, for the given validator addresses.
    ///
    /// Blocks are fetched one at a time in descending order. A height that
    /// fails to fetch is skipped and contributes to no counter.
    pub async fn analyze(&self, height: u64, validators: &[String]) -> LivenessReport {
        let mut report = LivenessReport::empty(height, validators);
        self.scan(&mut report, height, self.window).await;
        report
    }

    /// Same as [Self::analyze] when the block at `height` was already
    /// requested by the caller. `latest` is that block, `None` if the request
    /// failed; either way `height` is not fetched again.
    pub async fn analyze_with_latest(
        &self,
        height: u64,
        latest: Option<&Block>,
        validators: &[String],
    ) -> LivenessReport {
        let mut report = LivenessReport::empty(height, validators);
        if self.window == 0 || height == 0 {
            return report;
        }

        report.attempted += 1;
        if let Some(block) = latest {
            tally(&mut report.validators, block);
            report.scanned += 1;
        }

        self.scan(&mut report, height - 1, self.window - 1).await;
        report
    }

    async fn scan(&self, report: &mut LivenessReport, from: u64, count: u64) {
        for offset in 0..count {
            let current = match from.checked_sub(offset) {
                Some(current) if current > 0 => current,
                _ => break,
            };

            report.attempted += 1;
            match self.source.block(current).await {
                Ok(block) => {
                    tally(&mut report.validators, &block);
                    report.scanned += 1;
                }
                Err(err) => {
                    tracing::debug!(target: "exporter::liveness", height = current, "skipping block: {:?}", err);
                }
            }
        }
    }
}

/// Applies one block to the counters.
fn tally(validators: &mut BTreeMap<String, ValidatorStat>, block: &Block) {
    if let Some(proposer) = validators.get_mut(&block.proposer_address) {
        proposer.proposals += 1;
    }

    // a COMMIT entry wins over duplicates of the same address
    let mut flags: HashMap<&str, BlockIdFlag> = HashMap::with_capacity(block.signatures.len());
    for sig in &block.signatures {
        flags
            .entry(sig.validator_address.as_str())
            .and_modify(|flag| {
                if sig.flag == BlockIdFlag::Commit {
                    *flag = BlockIdFlag::Commit;
                }
            })
            .or_insert(sig.flag);
    }

    for (address, stat) in validators.iter_mut() {
        match flags.get(address.as_str()) {
            Some(BlockIdFlag::Commit) => stat.record_signed(),
            _ => stat.record_missed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cosmos::{BlockIdFlag::*, MockChain};

    const V: &str = "30535EF0D596876C5DBFCF825D64134550AB4945";
    const W: &str = "00092F31B30461501CA6311FC225F8F1DDFBE67E";

    fn tracked() -> Vec<String> {
        vec![V.to_string(), W.to_string()]
    }

    #[tokio::test]
    async fn counts_signed_missed_and_proposals() {
        let chain = MockChain::new(3)
            .with_block(3, V, &[(V, Commit), (W, Absent)])
            .with_block(2, W, &[(V, Commit), (W, Commit)])
            .with_block(1, V, &[(V, Absent), (W, Commit)]);

        let report = LivenessWindowAnalyzer::new(&chain, 10).analyze(3, &tracked()).await;

        let v = report.get(V).unwrap();
        assert_eq!((v.signed, v.missed, v.proposals), (2, 1, 2));
        assert_eq!(v.max_consecutive_missed, 1);

        let w = report.get(W).unwrap();
        assert_eq!((w.signed, w.missed, w.proposals), (2, 1, 1));
        assert_eq!(w.consecutive_missed, 0);
    }

    #[tokio::test]
    async fn stops_before_height_zero() {
        let chain = MockChain::new(2)
            .with_block(2, V, &[(V, Commit)])
            .with_block(1, V, &[(V, Commit)]);

        let report = LivenessWindowAnalyzer::new(&chain, DEFAULT_WINDOW)
            .analyze(2, &tracked())
            .await;

        assert_eq!(report.attempted, 2);
        assert_eq!(chain.block_requests(), 2);
        assert_eq!(report.get(V).unwrap().signed, 2);
    }

    #[tokio::test]
    async fn unsigned_other_flag_and_missing_entries_count_as_missed() {
        let chain = MockChain::new(2)
            .with_block(2, W, &[(V, Other(3))])
            .with_block(1, W, &[]);

        let report = LivenessWindowAnalyzer::new(&chain, 2).analyze(2, &tracked()).await;

        let v = report.get(V).unwrap();
        assert_eq!(v.missed, 2);
        assert_eq!(v.consecutive_missed, 2);
        assert_eq!(v.observed(), report.scanned);
    }

    #[tokio::test]
    async fn fetch_failures_are_skipped() {
        let chain = MockChain::new(5)
            .with_block(5, W, &[(V, Commit)])
            .with_block(3, W, &[(V, Absent)]);

        let report = LivenessWindowAnalyzer::new(&chain, 5).analyze(5, &tracked()).await;

        assert_eq!(report.attempted, 5);
        assert_eq!(report.scanned, 2);
        assert_eq!(report.failed(), 3);
        let v = report.get(V).unwrap();
        assert_eq!(v.observed(), 2);
    }

    #[tokio::test]
    async fn commit_wins_over_duplicate_entries() {
        let chain = MockChain::new(2)
            .with_block(2, W, &[(V, Absent), (V, Commit), (W, Commit)])
            .with_block(1, W, &[(V, Commit), (V, Absent), (W, Absent), (W, Absent)]);

        let report = LivenessWindowAnalyzer::new(&chain, 2).analyze(2, &tracked()).await;

        assert_eq!(report.get(V).unwrap().signed, 2);
        let w = report.get(W).unwrap();
        assert_eq!((w.signed, w.missed), (1, 1));
    }

    #[tokio::test]
    async fn reuses_prefetched_latest_block() {
        let chain = MockChain::new(3)
            .with_block(3, V, &[(V, Absent)])
            .with_block(2, V, &[(V, Commit)])
            .with_block(1, V, &[(V, Commit)]);
        let latest = chain.blocks.get(&3).cloned().unwrap();

        let analyzer = LivenessWindowAnalyzer::new(&chain, 3);
        let report = analyzer.analyze_with_latest(3, Some(&latest), &tracked()).await;

        assert_eq!(chain.block_requests(), 2);
        assert_eq!((report.attempted, report.scanned), (3, 3));
        let v = report.get(V).unwrap();
        assert_eq!((v.signed, v.missed, v.proposals), (2, 1, 3));
    }

    #[tokio::test]
    async fn failed_latest_block_is_not_refetched() {
        let chain = MockChain::new(3).with_block(2, V, &[(V, Commit)]);

        let analyzer = LivenessWindowAnalyzer::new(&chain, 2);
        let report = analyzer.analyze_with_latest(3, None, &tracked()).await;

        assert_eq!(chain.block_requests(), 1);
        assert_eq!((report.attempted, report.scanned, report.failed()), (2, 1, 1));
        assert_eq!(report.get(V).unwrap().signed, 1);
    }

    #[test]
    fn suppression_keeps_active_validators() {
        let latest = Block {
            height: 10,
            proposer_address: V.into(),
            signatures: vec![
                crate::cosmos::SignatureRecord::new(V, Commit),
                crate::cosmos::SignatureRecord::new(W, Absent),
            ],
        };

        let mut report = LivenessReport::default();
        for address in [V, W] {
            let mut stat = ValidatorStat::new(address);
            stat.record_missed();
            stat.record_missed();
            report.validators.insert(address.to_string(), stat);
        }

        report.suppress_inactive(&latest);

        let v = report.get(V).unwrap();
        assert_eq!((v.missed, v.max_consecutive_missed), (2, 2));
        let w = report.get(W).unwrap();
        assert_eq!((w.missed, w.max_consecutive_missed), (0, 0));
        assert_eq!(w.consecutive_missed, 2);
    }
}
