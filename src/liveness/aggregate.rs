//! Network-wide participation of a single block.

use crate::cosmos::{Block, BlockIdFlag, SignatureRecord};

/// Active and inactive signature slots of the latest block.
///
/// Counts every slot in the commit, not only tracked validators, so it may
/// disagree with the per-validator window counters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AggregateSnapshot {
    /// All signature slots
    pub total_validators: u64,
    /// Slots with a COMMIT signature
    pub active_validators: u64,
    /// Slots with an ABSENT signature
    pub inactive_validators: u64,
    /// `active / total`, zero without slots
    pub bonded_ratio: f64,
}

impl AggregateSnapshot {
    /// Computes the snapshot over a signature list.
    pub fn compute(signatures: &[SignatureRecord]) -> Self {
        let mut snapshot = signatures
            .iter()
            .fold(AggregateSnapshot::default(), |mut acc, sig| {
                acc.total_validators += 1;
                match sig.flag {
                    BlockIdFlag::Commit => acc.active_validators += 1,
                    BlockIdFlag::Absent => acc.inactive_validators += 1,
                    BlockIdFlag::Other(_) => {}
                }
                acc
            });

        if snapshot.total_validators > 0 {
            snapshot.bonded_ratio =
                snapshot.active_validators as f64 / snapshot.total_validators as f64;
        }

        snapshot
    }
}

impl From<&Block> for AggregateSnapshot {
    fn from(block: &Block) -> Self {
        Self::compute(&block.signatures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signatures(flags: &[BlockIdFlag]) -> Vec<SignatureRecord> {
        flags
            .iter()
            .enumerate()
            .map(|(i, flag)| SignatureRecord::new(format!("{i:040X}"), *flag))
            .collect()
    }

    #[test]
    fn counts_commit_and_absent_slots() {
        let mut flags = vec![BlockIdFlag::Commit; 7];
        flags.extend([BlockIdFlag::Absent; 3]);

        let snapshot = AggregateSnapshot::compute(&signatures(&flags));
        assert_eq!(snapshot.total_validators, 10);
        assert_eq!(snapshot.active_validators, 7);
        assert_eq!(snapshot.inactive_validators, 3);
        assert!((snapshot.bonded_ratio - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn other_flags_only_count_towards_total() {
        let flags = [BlockIdFlag::Commit, BlockIdFlag::Other(1), BlockIdFlag::Other(3)];

        let snapshot = AggregateSnapshot::compute(&signatures(&flags));
        assert_eq!(snapshot.total_validators, 3);
        assert_eq!(snapshot.active_validators, 1);
        assert_eq!(snapshot.inactive_validators, 0);
    }

    #[test]
    fn empty_block_has_zero_ratio() {
        let snapshot = AggregateSnapshot::from(&Block::default());
        assert_eq!(snapshot, AggregateSnapshot::default());
        assert_eq!(snapshot.bonded_ratio, 0.0);
    }
}
