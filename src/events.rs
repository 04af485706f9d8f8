use crate::recovery::RecoveryChoice;
use serde::Serialize;
use std::sync::Mutex;
use tokio::sync::mpsc::{
    UnboundedReceiver,
    UnboundedSender,
    unbounded_channel,
};

/// Outward notifications of round-state transitions. Hosts subscribe via
/// [`EventHub::subscribe`]; rendering and audio live entirely behind this
/// channel.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum RoundEvent {
    WagerAccepted {
        round_id: u64,
        wager: u64,
        tier_index: u8,
    },
    RandomnessReady {
        round_id: u64,
    },
    AdvanceConfirmed {
        round_id: u64,
        stage: u32,
        multiplier_bps: u64,
    },
    RoundLost {
        round_id: Option<u64>,
        stage: u32,
    },
    CashedOut {
        round_id: u64,
        stage: u32,
        multiplier_bps: u64,
    },
    /// The randomness provider exhausted the polling budget; the round is
    /// stalled, not aborted.
    ProviderSlow {
        round_id: u64,
    },
    InactivityDetected {
        round_id: u64,
        elapsed: u64,
    },
    StaleRoundDiscovered {
        round_id: u64,
        stage: u32,
        elapsed: u64,
    },
    RecoveryResolved {
        choice: RecoveryChoice,
    },
    RoundCleared,
}

/// Fan-out of round events to any number of subscribers. Senders whose
/// receivers have been dropped are pruned on the next publish.
#[derive(Default)]
pub struct EventHub {
    senders: Mutex<Vec<UnboundedSender<RoundEvent>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> UnboundedReceiver<RoundEvent> {
        let (tx, rx) = unbounded_channel();
        self.senders.lock().unwrap().push(tx);
        rx
    }

    pub fn publish(&self, event: RoundEvent) {
        let mut senders = self.senders.lock().unwrap();
        senders.retain(|sender| sender.send(event.clone()).is_ok());
    }
}
