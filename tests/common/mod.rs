#![allow(dead_code)]

use rungs_client::{
    Address,
    GameSession,
    RecoveryChoice,
    SessionConfig,
    SessionHandles,
    ledger::in_memory::{
        InMemoryLedger,
        ScriptedPrompt,
    },
};
use std::{
    sync::Arc,
    time::Duration,
};

pub const CONTRACT: Address = Address([0xFE; 32]);

/// One player against a fresh in-memory ledger, with a scripted recovery
/// prompt shared between the session and the test's assertions.
pub struct TestContext {
    pub ledger: InMemoryLedger,
    pub account: Address,
    pub prompt: ScriptedPrompt,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_choices([])
    }

    pub fn with_choices(choices: impl IntoIterator<Item = RecoveryChoice>) -> Self {
        let ledger = InMemoryLedger::new();
        let account = ledger.funded_account(1_000);
        Self {
            ledger,
            account,
            prompt: ScriptedPrompt::new(choices),
        }
    }

    pub fn handles(&self) -> SessionHandles {
        SessionHandles {
            reader: Arc::new(self.ledger.clone()),
            receipts: Arc::new(self.ledger.clone()),
            strategies: vec![Box::new(self.ledger.strategy_for(self.account))],
            prompt: Arc::new(self.prompt.clone()),
        }
    }

    pub async fn attach(&self) -> GameSession {
        self.try_attach().await.expect("session attach failed")
    }

    pub async fn try_attach(&self) -> rungs_client::Result<GameSession> {
        GameSession::attach(
            self.account,
            CONTRACT,
            self.handles(),
            SessionConfig::default(),
        )
        .await
    }
}

/// Let the readiness poller run until it flips the round, bounded well past
/// its own attempt budget.
pub async fn wait_until_ready(session: &GameSession) {
    for _ in 0..120 {
        if session.is_randomness_ready() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("randomness never became ready");
}
