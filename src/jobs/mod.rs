//! Escrow job records and the two services that touch them.

pub mod create;
pub mod query;

use std::fmt;

use alloy_primitives::{Address, TxHash, U256};
use chrono::{DateTime, FixedOffset};

pub use create::JobCreationService;
pub use query::JobQueryService;

/// Snapshot of one escrow record as read from the chain.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Job {
    pub owner: Address,
    pub dev: Address,
    /// Escrowed amount in base units.
    pub amount: U256,
    pub deadline_epoch_seconds: u64,
}

impl Job {
    /// A record whose owner is the zero address was never created.
    pub fn exists(&self) -> bool {
        self.owner != Address::ZERO
    }
}

/// A found job together with its display strings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobDetails {
    pub job_id: u64,
    pub job: Job,
    pub amount_display: String,
    pub deadline_display: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobLookup {
    Found(JobDetails),
    NotFound { job_id: u64, reason: String },
    QueryFailed { job_id: u64, reason: String },
}

impl JobLookup {
    pub fn job_id(&self) -> u64 {
        match self {
            Self::Found(details) => details.job_id,
            Self::NotFound { job_id, .. } | Self::QueryFailed { job_id, .. } => *job_id,
        }
    }
}

/// Result of a creation attempt. `Submitted` only means the wallet accepted the
/// transaction; `Confirmed` means it was mined successfully.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CreationOutcome {
    Submitted(TxHash),
    Confirmed { tx_hash: TxHash, block_number: u64 },
    Failed(String),
}

impl fmt::Display for CreationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Submitted(tx_hash) => write!(f, "Success! TX Hash: {}", format_tx_hash(tx_hash)),
            Self::Confirmed {
                tx_hash,
                block_number,
            } => write!(
                f,
                "Confirmed in block {block_number}. TX Hash: {}",
                format_tx_hash(tx_hash)
            ),
            Self::Failed(message) => write!(f, "Error! {message}"),
        }
    }
}

pub fn format_tx_hash(hash: &TxHash) -> String {
    format!("0x{:x}", hash)
}

/// User input for a new job, with the deadline already parsed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobDraft {
    pub dev_address: String,
    pub deadline: DateTime<FixedOffset>,
    /// Amount in display units, e.g. `0.5`.
    pub amount: String,
}

impl JobDraft {
    pub fn deadline_epoch_seconds(&self) -> i64 {
        self.deadline.timestamp()
    }
}
