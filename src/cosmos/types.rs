use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wire value of a commit signature whose vote was included.
const FLAG_COMMIT: u8 = 4;
/// Wire value of a missing commit signature.
const FLAG_ABSENT: u8 = 5;

/// Node status as reported by the `/status` endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStatus {
    /// Latest block height known to the node
    pub latest_height: u64,
    /// Header time of the latest block, if reported
    pub latest_block_time: Option<DateTime<Utc>>,
    /// Whether the node is still syncing
    pub catching_up: bool,
}

/// Outcome of a validator's vote in a block's last commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum BlockIdFlag {
    /// The signature was included
    Commit,
    /// No signature was recorded
    Absent,
    /// Any other flag, kept verbatim
    Other(u8),
}

impl From<u8> for BlockIdFlag {
    fn from(value: u8) -> Self {
        match value {
            FLAG_COMMIT => BlockIdFlag::Commit,
            FLAG_ABSENT => BlockIdFlag::Absent,
            other => BlockIdFlag::Other(other),
        }
    }
}

impl From<BlockIdFlag> for u8 {
    fn from(flag: BlockIdFlag) -> Self {
        match flag {
            BlockIdFlag::Commit => FLAG_COMMIT,
            BlockIdFlag::Absent => FLAG_ABSENT,
            BlockIdFlag::Other(other) => other,
        }
    }
}

/// A single entry of a block's last-commit signature list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureRecord {
    /// Consensus address of the validator
    pub validator_address: String,
    /// Vote outcome
    #[serde(rename = "block_id_flag")]
    pub flag: BlockIdFlag,
}

impl SignatureRecord {
    /// Creates a new signature record.
    pub fn new(validator_address: impl Into<String>, flag: BlockIdFlag) -> Self {
        Self {
            validator_address: validator_address.into(),
            flag,
        }
    }
}

/// The parts of a block needed for liveness tracking.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Block {
    /// Block height
    pub height: u64,
    /// Consensus address of the proposer
    pub proposer_address: String,
    /// Signatures of the last commit
    pub signatures: Vec<SignatureRecord>,
}

impl Block {
    /// Returns the flag recorded for `address`, if any. When the address
    /// appears more than once a COMMIT entry wins, else the first one.
    pub fn signature_of(&self, address: &str) -> Option<BlockIdFlag> {
        let mut flags = self
            .signatures
            .iter()
            .filter(|sig| sig.validator_address == address)
            .map(|sig| sig.flag);

        let first = flags.next()?;
        if first == BlockIdFlag::Commit || flags.any(|flag| flag == BlockIdFlag::Commit) {
            return Some(BlockIdFlag::Commit);
        }
        Some(first)
    }
}
