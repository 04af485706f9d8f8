use crate::ledger::TxHash;
use thiserror::Error;

/// Failures surfaced by the round-driving API. A lost round is not an error;
/// it is reported as an outcome and an event.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("sequencing conflict from provider: {detail}")]
    NonceConflict { detail: String },
    #[error("submission rejected: {detail}")]
    Submission { detail: String },
    #[error("transaction {tx} not included before the wait cap")]
    InclusionTimeout { tx: TxHash },
    #[error("ledger query failed: {detail}")]
    Query { detail: String },
    #[error("receipt for {tx} carried no recognizable outcome and the follow-up query failed")]
    AmbiguousReceipt { tx: TxHash },
    #[error("a recovery decision is pending; resolve it before further actions")]
    RecoveryPending,
    #[error("the account already has an active round")]
    RoundAlreadyActive,
    #[error("no active round")]
    NoActiveRound,
    #[error("another submission for this round is still in flight")]
    ActionInFlight,
    #[error("the round's randomness is not ready")]
    NotReady,
    #[error("cash out requires at least one confirmed advance")]
    NothingToSecure,
}

impl ClientError {
    /// Providers word sequencing conflicts inconsistently; everything that
    /// means "this nonce will never land" is retried the same way.
    pub fn is_sequencing_conflict(&self) -> bool {
        match self {
            ClientError::NonceConflict { .. } => true,
            ClientError::Submission { detail } => {
                let lowered = detail.to_ascii_lowercase();
                lowered.contains("nonce too low")
                    || lowered.contains("nonce already used")
                    || lowered.contains("underpriced")
                    || lowered.contains("already known")
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
