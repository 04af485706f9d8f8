use crate::{
    calls::CallEncoder,
    config::SessionConfig,
    error::{
        ClientError,
        Result,
    },
    events::{
        EventHub,
        RoundEvent,
    },
    ledger::{
        Address,
        LedgerReader,
        ReceiptSource,
        RoundId,
        RoundSnapshot,
        SubmissionStrategy,
        TxHash,
    },
    readiness::spawn_readiness_poller,
    receipt::{
        Outcome,
        ReceiptReconciler,
        round_id_from_receipt,
    },
    recovery::{
        RecoveryChoice,
        RecoveryDecision,
        RecoveryOffer,
        RecoveryPrompt,
        RecoveryReason,
        select_termination,
    },
    round::{
        Difficulty,
        RoundMachine,
    },
    submit::SubmissionPipeline,
};
use chrono::Utc;
use std::sync::{
    Arc,
    Mutex,
    atomic::{
        AtomicBool,
        Ordering,
    },
};
use tokio::{
    sync::mpsc::UnboundedReceiver,
    task::JoinHandle,
    time,
};
use tracing::{
    info,
    warn,
};

/// The injected capabilities a session runs on. Everything ledger-flavoured
/// lives behind these; the session never sees keys or sockets.
pub struct SessionHandles {
    pub reader: Arc<dyn LedgerReader>,
    pub receipts: Arc<dyn ReceiptSource>,
    pub strategies: Vec<Box<dyn SubmissionStrategy>>,
    pub prompt: Arc<dyn RecoveryPrompt>,
}

#[derive(Clone, Debug)]
pub struct StartOutcome {
    pub tx: TxHash,
    pub round_id: RoundId,
}

#[derive(Clone, Debug)]
pub enum AdvanceResult {
    Advanced { stage: u32, multiplier_bps: u64 },
    RoundOver { failed: bool },
}

#[derive(Clone, Debug)]
pub struct AdvanceOutcome {
    pub tx: TxHash,
    pub result: AdvanceResult,
}

#[derive(Clone, Debug)]
pub enum CashOutResult {
    Secured { stage: u32, multiplier_bps: u64 },
    RoundLost,
}

#[derive(Clone, Debug)]
pub struct CashOutOutcome {
    pub tx: TxHash,
    pub result: CashOutResult,
}

/// One player session against the game contract: owns the nonce mirror (via
/// the pipeline), the round state machine, the readiness poller and the
/// inactivity timer. Nothing here is global; hosts own the session and drive
/// it from one task.
pub struct GameSession {
    account: Address,
    encoder: CallEncoder,
    config: SessionConfig,
    reader: Arc<dyn LedgerReader>,
    prompt: Arc<dyn RecoveryPrompt>,
    pipeline: SubmissionPipeline,
    reconciler: ReceiptReconciler,
    machine: Arc<Mutex<RoundMachine>>,
    hub: Arc<EventHub>,
    poller: Option<JoinHandle<()>>,
    inactivity_timer: Option<JoinHandle<()>>,
    recovery_pending: Arc<AtomicBool>,
}

impl GameSession {
    /// Build a session and run the reactive recovery check: if the ledger
    /// already holds an active round for this account (a reload, a crashed
    /// client), the user decides its fate before any new wager is allowed.
    pub async fn attach(
        account: Address,
        contract: Address,
        handles: SessionHandles,
        config: SessionConfig,
    ) -> Result<Self> {
        let SessionHandles {
            reader,
            receipts,
            strategies,
            prompt,
        } = handles;
        let encoder = CallEncoder::new(contract, config.default_call_budget);
        let pipeline = SubmissionPipeline::new(
            account,
            strategies,
            reader.clone(),
            config.submit_cooldown(),
        );
        let reconciler = ReceiptReconciler::new(
            receipts,
            reader.clone(),
            config.receipt_poll_interval(),
            config.receipt_wait_cap(),
        );
        let mut session = Self {
            account,
            encoder,
            config,
            reader,
            prompt,
            pipeline,
            reconciler,
            machine: Arc::new(Mutex::new(RoundMachine::new())),
            hub: Arc::new(EventHub::new()),
            poller: None,
            inactivity_timer: None,
            recovery_pending: Arc::new(AtomicBool::new(false)),
        };

        if let Some(snapshot) = session.reader.active_round(account).await? {
            info!(
                round = %snapshot.id,
                stage = snapshot.stage,
                "active round discovered at session start"
            );
            session
                .offer_recovery(snapshot, RecoveryReason::StaleAtStartup)
                .await?;
        }
        Ok(session)
    }

    pub fn subscribe(&self) -> UnboundedReceiver<RoundEvent> {
        self.hub.subscribe()
    }

    pub fn is_round_active(&self) -> bool {
        self.machine.lock().unwrap().is_active()
    }

    pub fn is_randomness_ready(&self) -> bool {
        self.machine.lock().unwrap().is_randomness_ready()
    }

    pub fn round_id(&self) -> Option<RoundId> {
        self.machine.lock().unwrap().round_id()
    }

    pub fn current_stage(&self) -> u32 {
        self.machine.lock().unwrap().current_stage()
    }

    pub fn cached_balance(&self) -> Option<u128> {
        self.pipeline.mirror().cached_balance()
    }

    /// Place a wager. Fails while a recovery decision is owed, while a round
    /// is active locally, or while the ledger still holds one.
    pub async fn start_round(
        &mut self,
        tier: Difficulty,
        wager: u64,
    ) -> Result<StartOutcome> {
        self.ensure_no_pending_recovery()?;
        if self.machine.lock().unwrap().is_active() {
            return Err(ClientError::RoundAlreadyActive);
        }
        if let Some(snapshot) = self.reader.active_round(self.account).await? {
            self.offer_recovery(snapshot, RecoveryReason::StaleAtStartup)
                .await?;
            if self.machine.lock().unwrap().is_active() {
                return Err(ClientError::RoundAlreadyActive);
            }
            if self.reader.active_round(self.account).await?.is_some() {
                return Err(ClientError::RoundAlreadyActive);
            }
        }

        self.machine.lock().unwrap().wager_submitted(tier, wager)?;
        let call = self.encoder.start_round(tier, wager);
        let tx = match self.pipeline.submit(&call).await {
            Ok(tx) => tx,
            Err(err) => {
                self.machine.lock().unwrap().start_failed();
                return Err(err);
            }
        };
        let (receipt, outcome) =
            match self.reconciler.await_and_classify(tx, self.account).await {
                Ok(pair) => pair,
                Err(err) => {
                    // The wager may still land later; the reactive check will
                    // rediscover it as a stale round.
                    self.machine.lock().unwrap().start_failed();
                    return Err(err);
                }
            };

        let round_id = match (round_id_from_receipt(&receipt), outcome) {
            (Some(id), _) => id,
            (None, Outcome::RoundActive(snapshot)) => snapshot.id,
            (None, _) => {
                self.machine.lock().unwrap().start_failed();
                return Err(ClientError::Submission {
                    detail: "wager was not accepted by the ledger".to_string(),
                });
            }
        };

        self.machine.lock().unwrap().wager_confirmed(round_id)?;
        self.hub.publish(RoundEvent::WagerAccepted {
            round_id: round_id.0,
            wager,
            tier_index: tier.as_index(),
        });
        self.start_readiness_poller(round_id);
        self.arm_inactivity_timer(round_id);
        Ok(StartOutcome { tx, round_id })
    }

    /// Request the risky in-round step. Legal only while randomness is ready
    /// and nothing else is in flight; the ledger decides success or failure.
    pub async fn advance(&mut self) -> Result<AdvanceOutcome> {
        self.ensure_no_pending_recovery()?;
        let round_id = {
            let mut machine = self.machine.lock().unwrap();
            machine.advance_submitted()?;
            machine.round_id().ok_or(ClientError::NoActiveRound)?
        };

        let call = self.encoder.advance(round_id);
        let tx = match self.pipeline.submit(&call).await {
            Ok(tx) => tx,
            Err(err) => {
                self.machine.lock().unwrap().advance_failed();
                return Err(err);
            }
        };
        let outcome = match self.reconciler.await_and_classify(tx, self.account).await {
            Ok((_, outcome)) => outcome,
            Err(err) => {
                self.machine.lock().unwrap().advance_failed();
                return Err(err);
            }
        };

        match outcome {
            Outcome::Advanced => {
                let (stage, multiplier_bps) = {
                    let mut machine = self.machine.lock().unwrap();
                    let stage = machine.advanced()?;
                    (stage, machine.multiplier_bps())
                };
                self.hub.publish(RoundEvent::AdvanceConfirmed {
                    round_id: round_id.0,
                    stage,
                    multiplier_bps,
                });
                self.arm_inactivity_timer(round_id);
                Ok(AdvanceOutcome {
                    tx,
                    result: AdvanceResult::Advanced {
                        stage,
                        multiplier_bps,
                    },
                })
            }
            Outcome::RoundEnded { failed } => {
                let stage = self.machine.lock().unwrap().current_stage();
                self.finish_round();
                if failed {
                    self.hub.publish(RoundEvent::RoundLost {
                        round_id: Some(round_id.0),
                        stage,
                    });
                } else {
                    self.hub.publish(RoundEvent::RoundCleared);
                }
                Ok(AdvanceOutcome {
                    tx,
                    result: AdvanceResult::RoundOver { failed },
                })
            }
            Outcome::RoundActive(_) => {
                self.machine.lock().unwrap().advance_failed();
                Err(ClientError::Submission {
                    detail: "advance was not recognized by the ledger; round unchanged"
                        .to_string(),
                })
            }
        }
    }

    /// Bank the round at the last confirmed stage.
    pub async fn cash_out(&mut self) -> Result<CashOutOutcome> {
        self.ensure_no_pending_recovery()?;
        let (round_id, stage, multiplier_bps) = {
            let mut machine = self.machine.lock().unwrap();
            machine.cash_out_submitted()?;
            (
                machine.round_id().ok_or(ClientError::NoActiveRound)?,
                machine.current_stage(),
                machine.multiplier_bps(),
            )
        };

        let call = self.encoder.cash_out(round_id);
        let tx = match self.pipeline.submit(&call).await {
            Ok(tx) => tx,
            Err(err) => {
                self.machine.lock().unwrap().cash_out_failed();
                return Err(err);
            }
        };
        let outcome = match self.reconciler.await_and_classify(tx, self.account).await {
            Ok((_, outcome)) => outcome,
            Err(err) => {
                self.machine.lock().unwrap().cash_out_failed();
                return Err(err);
            }
        };

        match outcome {
            Outcome::RoundEnded { failed: false } => {
                self.machine.lock().unwrap().cashed_out()?;
                self.cancel_tasks();
                self.hub.publish(RoundEvent::CashedOut {
                    round_id: round_id.0,
                    stage,
                    multiplier_bps,
                });
                Ok(CashOutOutcome {
                    tx,
                    result: CashOutResult::Secured {
                        stage,
                        multiplier_bps,
                    },
                })
            }
            Outcome::RoundEnded { failed: true } => {
                self.finish_round();
                self.hub.publish(RoundEvent::RoundLost {
                    round_id: Some(round_id.0),
                    stage,
                });
                Ok(CashOutOutcome {
                    tx,
                    result: CashOutResult::RoundLost,
                })
            }
            Outcome::Advanced | Outcome::RoundActive(_) => {
                self.machine.lock().unwrap().cash_out_failed();
                Err(ClientError::Submission {
                    detail: "cash out was not recognized by the ledger; round unchanged"
                        .to_string(),
                })
            }
        }
    }

    /// Resolve an owed recovery decision (after `InactivityDetected`), or
    /// re-run the reactive check on demand. Returns the user's choice, or
    /// None when no round needed recovering.
    pub async fn run_recovery(&mut self) -> Result<Option<RecoveryChoice>> {
        let was_proactive = self.recovery_pending.load(Ordering::SeqCst);
        let Some(snapshot) = self.reader.active_round(self.account).await? else {
            self.recovery_pending.store(false, Ordering::SeqCst);
            if self.machine.lock().unwrap().is_active() {
                // The ledger closed the round behind our back.
                self.finish_round();
                self.hub.publish(RoundEvent::RoundCleared);
            }
            return Ok(None);
        };
        let reason = if was_proactive {
            RecoveryReason::InactivityTimeout
        } else {
            RecoveryReason::StaleAtStartup
        };
        let choice = self.offer_recovery(snapshot, reason).await?;
        Ok(Some(choice))
    }

    fn ensure_no_pending_recovery(&self) -> Result<()> {
        if self.recovery_pending.load(Ordering::SeqCst) {
            return Err(ClientError::RecoveryPending);
        }
        Ok(())
    }

    async fn offer_recovery(
        &mut self,
        snapshot: RoundSnapshot,
        reason: RecoveryReason,
    ) -> Result<RecoveryChoice> {
        let now = self.reader.block_timestamp().await?;
        let elapsed = now.saturating_sub(snapshot.last_activity);
        let threshold = self.config.termination_elapsed_threshold_secs;
        let can_resume = elapsed < threshold;
        self.hub.publish(RoundEvent::StaleRoundDiscovered {
            round_id: snapshot.id.0,
            stage: snapshot.stage,
            elapsed,
        });

        let offer = RecoveryOffer {
            snapshot: snapshot.clone(),
            elapsed,
            can_resume,
            reason,
        };
        let choice = self.prompt.decide(&offer).await;
        let decision = RecoveryDecision {
            choice,
            offered_at: Utc::now(),
        };
        info!(
            round = %snapshot.id,
            choice = ?decision.choice,
            offered_at = %decision.offered_at,
            elapsed,
            "recovery decision taken"
        );

        match decision.choice {
            RecoveryChoice::Resume if can_resume => {
                let already_mirrored =
                    self.machine.lock().unwrap().round_id() == Some(snapshot.id);
                if !already_mirrored {
                    self.cancel_tasks();
                    self.machine.lock().unwrap().adopt(&snapshot)?;
                    if !snapshot.randomness_ready {
                        self.start_readiness_poller(snapshot.id);
                    }
                }
                self.arm_inactivity_timer(snapshot.id);
            }
            RecoveryChoice::Resume => {
                // Past the ledger's window the round cannot continue; treat
                // the answer as declining to decide.
                warn!(round = %snapshot.id, "resume chosen past the inactivity window; ignoring");
            }
            RecoveryChoice::EndRound => {
                let termination = select_termination(elapsed, threshold, snapshot.stage);
                info!(round = %snapshot.id, ?termination, elapsed, stage = snapshot.stage, "ending round");
                let call = termination.encode(&self.encoder, snapshot.id);
                let tx = self.pipeline.submit(&call).await?;
                let (_, outcome) =
                    self.reconciler.await_and_classify(tx, self.account).await?;
                match outcome {
                    Outcome::RoundEnded { failed } => {
                        self.finish_round();
                        if failed {
                            self.hub.publish(RoundEvent::RoundLost {
                                round_id: Some(snapshot.id.0),
                                stage: snapshot.stage,
                            });
                        } else {
                            self.hub.publish(RoundEvent::RoundCleared);
                        }
                    }
                    Outcome::Advanced | Outcome::RoundActive(_) => {
                        return Err(ClientError::Submission {
                            detail: "termination call was not honored by the ledger"
                                .to_string(),
                        });
                    }
                }
            }
            RecoveryChoice::Cancel => {}
        }

        self.recovery_pending.store(false, Ordering::SeqCst);
        self.hub.publish(RoundEvent::RecoveryResolved {
            choice: decision.choice,
        });
        Ok(decision.choice)
    }

    fn start_readiness_poller(&mut self, round_id: RoundId) {
        if let Some(handle) = self.poller.take() {
            handle.abort();
        }
        self.poller = Some(spawn_readiness_poller(
            self.reader.clone(),
            round_id,
            self.machine.clone(),
            self.hub.clone(),
            self.config.readiness_interval(),
            self.config.readiness_attempts,
        ));
    }

    /// (Re)arm the proactive inactivity timer. If the round is still active
    /// on the ledger when it fires, game actions are blocked until the host
    /// runs recovery.
    fn arm_inactivity_timer(&mut self, round_id: RoundId) {
        if let Some(handle) = self.inactivity_timer.take() {
            handle.abort();
        }
        let reader = self.reader.clone();
        let hub = self.hub.clone();
        let pending = self.recovery_pending.clone();
        let account = self.account;
        let window = self.config.inactivity_window();
        self.inactivity_timer = Some(tokio::spawn(async move {
            time::sleep(window).await;
            match reader.active_round(account).await {
                Ok(Some(snapshot)) if snapshot.id == round_id => {
                    let elapsed = match reader.block_timestamp().await {
                        Ok(now) => now.saturating_sub(snapshot.last_activity),
                        Err(_) => 0,
                    };
                    warn!(
                        round = %round_id,
                        elapsed,
                        "round inactive past the recovery window"
                    );
                    pending.store(true, Ordering::SeqCst);
                    hub.publish(RoundEvent::InactivityDetected {
                        round_id: round_id.0,
                        elapsed,
                    });
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(round = %round_id, error = %err, "inactivity check failed");
                }
            }
        }));
    }

    fn finish_round(&mut self) {
        self.cancel_tasks();
        self.machine.lock().unwrap().round_over();
    }

    fn cancel_tasks(&mut self) {
        if let Some(handle) = self.poller.take() {
            handle.abort();
        }
        if let Some(handle) = self.inactivity_timer.take() {
            handle.abort();
        }
    }
}

impl Drop for GameSession {
    fn drop(&mut self) {
        self.cancel_tasks();
    }
}
