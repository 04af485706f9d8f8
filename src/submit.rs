use crate::{
    error::{
        ClientError,
        Result,
    },
    ledger::{
        Address,
        ContractCall,
        LedgerReader,
        SubmissionStrategy,
        TxHash,
    },
    nonce::NonceMirror,
};
use std::{
    sync::Arc,
    time::Duration,
};
use tokio::time::{
    Instant,
    sleep,
};
use tracing::{
    debug,
    warn,
};

/// Signs and submits contract calls through an ordered chain of strategies,
/// spacing submissions by a cooldown and retrying exactly once on sequencing
/// conflicts with a freshly resynchronized nonce.
pub struct SubmissionPipeline {
    strategies: Vec<Box<dyn SubmissionStrategy>>,
    mirror: NonceMirror,
    reader: Arc<dyn LedgerReader>,
    cooldown: Duration,
    last_submit: Option<Instant>,
}

impl SubmissionPipeline {
    pub fn new(
        account: Address,
        strategies: Vec<Box<dyn SubmissionStrategy>>,
        reader: Arc<dyn LedgerReader>,
        cooldown: Duration,
    ) -> Self {
        Self {
            strategies,
            mirror: NonceMirror::new(account),
            reader,
            cooldown,
            last_submit: None,
        }
    }

    pub fn mirror(&self) -> &NonceMirror {
        &self.mirror
    }

    pub async fn refresh_mirror(&mut self) -> Result<()> {
        self.mirror.reset(self.reader.as_ref()).await
    }

    /// Submit `call`, waiting out the cooldown if the previous submission was
    /// too recent. The nonce mirror stays advanced past every attempted value
    /// whatever the outcome; gaps are cheaper than reuse.
    pub async fn submit(&mut self, call: &ContractCall) -> Result<TxHash> {
        if self.strategies.is_empty() {
            return Err(ClientError::Submission {
                detail: "no submission strategies configured".to_string(),
            });
        }
        self.wait_cooldown().await;

        // Advisory only; the configured budget still rides on the call.
        match self.reader.fee_quote(call).await {
            Ok(fee) => debug!(fee, budget = call.budget, "fee quoted"),
            Err(err) => warn!(error = %err, "fee quote unavailable"),
        }

        let nonce = self.mirror.next_and_advance(self.reader.as_ref()).await?;
        self.last_submit = Some(Instant::now());
        match self.try_chain(call, nonce).await {
            Ok(hash) => Ok(hash),
            Err(err) if err.is_sequencing_conflict() => {
                warn!(
                    nonce,
                    error = %err,
                    "sequencing conflict; resynchronizing nonce for one retry"
                );
                self.mirror.reset(self.reader.as_ref()).await?;
                let retry_nonce =
                    self.mirror.next_and_advance(self.reader.as_ref()).await?;
                self.last_submit = Some(Instant::now());
                self.try_chain(call, retry_nonce).await
            }
            Err(err) => Err(err),
        }
    }

    /// One pass over the strategy chain. A sequencing conflict aborts the
    /// pass immediately: the nonce is burned and every later strategy would
    /// collide on it too.
    async fn try_chain(&self, call: &ContractCall, nonce: u64) -> Result<TxHash> {
        let mut last_error: Option<ClientError> = None;
        for strategy in &self.strategies {
            match strategy.sign_and_submit(call, nonce).await {
                Ok(hash) => {
                    debug!(
                        strategy = strategy.kind().as_str(),
                        nonce,
                        tx = %hash,
                        "submission accepted"
                    );
                    return Ok(hash);
                }
                Err(err) if err.is_sequencing_conflict() => return Err(err),
                Err(err) => {
                    warn!(
                        strategy = strategy.kind().as_str(),
                        nonce,
                        error = %err,
                        "submission strategy failed; trying next"
                    );
                    last_error = Some(err);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| ClientError::Submission {
            detail: "all submission strategies failed".to_string(),
        }))
    }

    async fn wait_cooldown(&self) {
        if let Some(last) = self.last_submit {
            let since = last.elapsed();
            if since < self.cooldown {
                sleep(self.cooldown - since).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::ledger::{
        StrategyKind,
        in_memory::InMemoryLedger,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{
        AtomicU32,
        Ordering,
    };

    const COOLDOWN: Duration = Duration::from_secs(2);

    struct RefusingStrategy {
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl SubmissionStrategy for RefusingStrategy {
        fn kind(&self) -> StrategyKind {
            StrategyKind::SessionKey
        }

        async fn sign_and_submit(
            &self,
            _call: &ContractCall,
            _nonce: u64,
        ) -> Result<TxHash> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ClientError::Submission {
                detail: "signer unavailable".to_string(),
            })
        }
    }

    fn pipeline_with(
        ledger: &InMemoryLedger,
        account: Address,
        strategies: Vec<Box<dyn SubmissionStrategy>>,
    ) -> SubmissionPipeline {
        SubmissionPipeline::new(
            account,
            strategies,
            Arc::new(ledger.clone()),
            COOLDOWN,
        )
    }

    fn call() -> ContractCall {
        ContractCall {
            target: Address([0xCC; 32]),
            payload: vec![1, 2, 3, 4],
            value: 0,
            budget: 1_000_000,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn submit__spaces_consecutive_submissions_by_the_cooldown() {
        // given
        let ledger = InMemoryLedger::new();
        let account = ledger.funded_account(100);
        let mut pipeline =
            pipeline_with(&ledger, account, vec![Box::new(ledger.strategy_for(account))]);

        // when
        pipeline.submit(&call()).await.unwrap();
        let before_second = Instant::now();
        pipeline.submit(&call()).await.unwrap();

        // then the second call was delayed, not rejected
        assert!(before_second.elapsed() >= COOLDOWN);
        assert_eq!(ledger.accepted_nonces(), vec![0, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn submit__falls_through_to_the_next_strategy_on_plain_failure() {
        // given
        let ledger = InMemoryLedger::new();
        let account = ledger.funded_account(100);
        let refusals = Arc::new(AtomicU32::new(0));
        let mut pipeline = pipeline_with(
            &ledger,
            account,
            vec![
                Box::new(RefusingStrategy {
                    calls: refusals.clone(),
                }),
                Box::new(ledger.strategy_for(account)),
            ],
        );

        // when
        let hash = pipeline.submit(&call()).await;

        // then
        assert!(hash.is_ok());
        assert_eq!(refusals.load(Ordering::SeqCst), 1);
        assert_eq!(ledger.accepted_nonces(), vec![0]);
    }

    #[tokio::test(start_paused = true)]
    async fn submit__one_conflict_triggers_exactly_one_retry_with_fresh_nonce() {
        // given a ledger that rejects the next submission as a conflict
        let ledger = InMemoryLedger::new();
        let account = ledger.funded_account(100);
        ledger.conflict_next_submissions(1);
        ledger.set_next_nonce(account, 5);
        let mut pipeline =
            pipeline_with(&ledger, account, vec![Box::new(ledger.strategy_for(account))]);

        // when
        let hash = pipeline.submit(&call()).await;

        // then both attempts drew a nonce, and the retry resynchronized first
        assert!(hash.is_ok());
        assert_eq!(ledger.attempted_nonces(), vec![5, 6]);
        assert_eq!(pipeline.mirror().cached_next_nonce(), Some(7));
    }

    #[tokio::test(start_paused = true)]
    async fn submit__two_consecutive_conflicts_are_terminal() {
        // given
        let ledger = InMemoryLedger::new();
        let account = ledger.funded_account(100);
        ledger.conflict_next_submissions(2);
        let mut pipeline =
            pipeline_with(&ledger, account, vec![Box::new(ledger.strategy_for(account))]);

        // when
        let result = pipeline.submit(&call()).await;

        // then no third attempt was made
        assert!(matches!(result, Err(ClientError::NonceConflict { .. })));
        assert_eq!(ledger.attempted_nonces().len(), 2);
    }

    #[tokio::test]
    async fn submit__without_strategies_fails_without_touching_the_mirror() {
        // given
        let ledger = InMemoryLedger::new();
        let account = ledger.funded_account(100);
        let mut pipeline = pipeline_with(&ledger, account, Vec::new());

        // when
        let result = pipeline.submit(&call()).await;

        // then
        assert!(matches!(result, Err(ClientError::Submission { .. })));
        assert!(!pipeline.mirror().is_initialized());
    }
}
