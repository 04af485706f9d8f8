use crate::{
    calls::CallEncoder,
    ledger::{
        ContractCall,
        RoundId,
        RoundSnapshot,
    },
};
use async_trait::async_trait;
use chrono::{
    DateTime,
    Utc,
};
use serde::Serialize;

/// The ledger-side call that ends an orphaned or stuck round. Which one is
/// honored depends on on-chain elapsed time and confirmed progress.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
pub enum Termination {
    /// Past the ledger's inactivity window; the ledger computes a
    /// timeout-based payout.
    Timeout,
    /// Inside the window with no confirmed progress; stake refund only.
    Refund,
    /// Inside the window with progress; pays out at the last confirmed stage.
    Emergency,
}

/// Pure selection: `elapsed` is ledger block time minus the round's
/// last-activity timestamp, never client wall-clock, which skews.
pub fn select_termination(elapsed: u64, threshold: u64, stage: u32) -> Termination {
    if elapsed >= threshold {
        Termination::Timeout
    } else if stage == 0 {
        Termination::Refund
    } else {
        Termination::Emergency
    }
}

impl Termination {
    pub fn encode(self, encoder: &CallEncoder, round: RoundId) -> ContractCall {
        match self {
            Termination::Timeout => encoder.timeout_round(round),
            Termination::Refund => encoder.refund_round(round),
            Termination::Emergency => encoder.secure_round(round),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
pub enum RecoveryReason {
    /// An active round was discovered at session start.
    StaleAtStartup,
    /// The proactive inactivity timer found the round still active.
    InactivityTimeout,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
pub enum RecoveryChoice {
    Resume,
    EndRound,
    Cancel,
}

/// What the user is asked to decide on.
#[derive(Clone, Debug)]
pub struct RecoveryOffer {
    pub snapshot: RoundSnapshot,
    pub elapsed: u64,
    pub can_resume: bool,
    pub reason: RecoveryReason,
}

/// One answered prompt; consumed by the session when it executes the choice.
#[derive(Clone, Debug)]
pub struct RecoveryDecision {
    pub choice: RecoveryChoice,
    pub offered_at: DateTime<Utc>,
}

/// The host's decision surface (a dialog, a CLI prompt). Awaited inline, so
/// game actions stay blocked until the user answers.
#[async_trait]
pub trait RecoveryPrompt: Send + Sync {
    async fn decide(&self, offer: &RecoveryOffer) -> RecoveryChoice;
}
