use crate::{
    events::{
        EventHub,
        RoundEvent,
    },
    ledger::{
        LedgerReader,
        RoundId,
    },
    round::RoundMachine,
};
use std::{
    sync::{
        Arc,
        Mutex,
    },
    time::Duration,
};
use tokio::{
    task::JoinHandle,
    time,
};
use tracing::{
    debug,
    warn,
};

/// Polls the ledger until the round's randomness source is ready, then flips
/// the state machine and notifies subscribers. Bounded: after `attempts`
/// queries it reports the provider as slow and stops; the round stays
/// stalled for recovery to pick up, it is not aborted. Query errors are
/// logged and consume an attempt.
pub fn spawn_readiness_poller(
    reader: Arc<dyn LedgerReader>,
    round: RoundId,
    machine: Arc<Mutex<RoundMachine>>,
    hub: Arc<EventHub>,
    interval: Duration,
    attempts: u32,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        for attempt in 0..attempts {
            ticker.tick().await;
            match reader.randomness_ready(round).await {
                Ok(true) => {
                    let flipped = machine.lock().unwrap().randomness_ready();
                    if flipped {
                        debug!(%round, attempt, "randomness ready");
                        hub.publish(RoundEvent::RandomnessReady { round_id: round.0 });
                    }
                    return;
                }
                Ok(false) => {}
                Err(err) => {
                    warn!(%round, attempt, error = %err, "readiness query failed");
                }
            }
        }
        warn!(%round, attempts, "randomness provider exhausted the polling budget");
        hub.publish(RoundEvent::ProviderSlow { round_id: round.0 });
    })
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::{
        ledger::in_memory::InMemoryLedger,
        round::{
            Difficulty,
            RoundPhase,
        },
    };

    fn active_machine(round: RoundId) -> Arc<Mutex<RoundMachine>> {
        let mut machine = RoundMachine::new();
        machine.wager_submitted(Difficulty::Easy, 2).unwrap();
        machine.wager_confirmed(round).unwrap();
        Arc::new(Mutex::new(machine))
    }

    #[tokio::test(start_paused = true)]
    async fn poller__flips_the_machine_once_the_provider_is_ready() {
        // given a round whose randomness needs two polls
        let ledger = InMemoryLedger::new();
        let owner = ledger.funded_account(10);
        let round =
            ledger.seed_active_round(owner, Difficulty::Easy, 2, 0, false, 0);
        ledger.delay_randomness(round, 2);
        let machine = active_machine(round);
        let hub = Arc::new(EventHub::new());
        let mut events = hub.subscribe();

        // when
        spawn_readiness_poller(
            Arc::new(ledger),
            round,
            machine.clone(),
            hub.clone(),
            Duration::from_secs(1),
            60,
        )
        .await
        .unwrap();

        // then
        assert_eq!(machine.lock().unwrap().phase(), RoundPhase::ReadyToAdvance);
        assert_eq!(
            events.try_recv().unwrap(),
            RoundEvent::RandomnessReady { round_id: round.0 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn poller__reports_a_slow_provider_after_exhausting_attempts() {
        // given a round whose randomness never arrives
        let ledger = InMemoryLedger::new();
        let owner = ledger.funded_account(10);
        let round =
            ledger.seed_active_round(owner, Difficulty::Easy, 2, 0, false, 0);
        let machine = active_machine(round);
        let hub = Arc::new(EventHub::new());
        let mut events = hub.subscribe();

        // when
        spawn_readiness_poller(
            Arc::new(ledger),
            round,
            machine.clone(),
            hub.clone(),
            Duration::from_secs(1),
            5,
        )
        .await
        .unwrap();

        // then the round is stalled, not aborted
        assert_eq!(
            events.try_recv().unwrap(),
            RoundEvent::ProviderSlow { round_id: round.0 }
        );
        assert_eq!(machine.lock().unwrap().phase(), RoundPhase::Active);
    }
}
