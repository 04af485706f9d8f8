use crate::{
    error::{
        ClientError,
        Result,
    },
    ledger::{
        Address,
        ContractCall,
        LedgerReader,
        LogEntry,
        Receipt,
        ReceiptSource,
        RoundId,
        RoundSnapshot,
        StrategyKind,
        SubmissionStrategy,
        TxHash,
        round_ended_topic,
        round_started_topic,
        stage_advanced_topic,
    },
    recovery::{
        RecoveryChoice,
        RecoveryOffer,
        RecoveryPrompt,
    },
    round::Difficulty,
};
use async_trait::async_trait;
use std::{
    collections::{
        HashMap,
        VecDeque,
    },
    sync::{
        Arc,
        Mutex,
    },
};
use tokio::sync::oneshot;

const GENESIS_TIMESTAMP: u64 = 1_000_000;
const FLAT_FEE_QUOTE: u64 = 100;

#[derive(Clone, Debug)]
struct AccountState {
    balance: u128,
    next_nonce: u64,
}

#[derive(Clone, Debug)]
struct SimRound {
    id: RoundId,
    owner: Address,
    wager: u64,
    tier: Difficulty,
    stage: u32,
    /// Readiness queries still answered `false` before the source is ready.
    ready_after: u32,
    last_activity: u64,
}

#[derive(Default)]
struct Inner {
    accounts: HashMap<Address, AccountState>,
    rounds: HashMap<u64, SimRound>,
    active_by_owner: HashMap<Address, u64>,
    receipts: HashMap<TxHash, Receipt>,
    attempted_nonces: Vec<u64>,
    accepted_nonces: Vec<u64>,
    terminations: Vec<&'static str>,
    advance_script: VecDeque<bool>,
    next_round_id: u64,
    next_tx: u64,
    next_account: u8,
    clock: u64,
    query_failures: u32,
    conflicts: u32,
    rejections: u32,
    receipt_delay_polls: u32,
    drop_receipts: bool,
    push_enabled: bool,
}

/// A complete game ledger in memory: accounts, rounds, receipts and the
/// randomness flag, with scriptable faults (sequencing conflicts, rejected
/// submissions, failed queries, dropped or delayed receipts). Backs the
/// integration tests and the local demo driver.
#[derive(Clone)]
pub struct InMemoryLedger {
    inner: Arc<Mutex<Inner>>,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedger {
    pub fn new() -> Self {
        let inner = Inner {
            clock: GENESIS_TIMESTAMP,
            ..Inner::default()
        };
        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    pub fn funded_account(&self, balance: u128) -> Address {
        let mut inner = self.inner.lock().unwrap();
        inner.next_account += 1;
        let address = Address([inner.next_account; 32]);
        inner.accounts.insert(
            address,
            AccountState {
                balance,
                next_nonce: 0,
            },
        );
        address
    }

    /// A strategy handle bound to `account`; submitted game calls are
    /// executed on that account's behalf.
    pub fn strategy_for(&self, account: Address) -> InMemoryStrategy {
        InMemoryStrategy {
            ledger: self.clone(),
            owner: account,
        }
    }

    /// An unbound strategy for transport-level tests.
    pub fn strategy(&self) -> InMemoryStrategy {
        InMemoryStrategy {
            ledger: self.clone(),
            owner: Address([0u8; 32]),
        }
    }

    // --- fault injection ------------------------------------------------

    pub fn fail_next_queries(&self, count: u32) {
        self.inner.lock().unwrap().query_failures = count;
    }

    pub fn conflict_next_submissions(&self, count: u32) {
        self.inner.lock().unwrap().conflicts = count;
    }

    pub fn reject_next_submissions(&self, count: u32) {
        self.inner.lock().unwrap().rejections = count;
    }

    pub fn drop_receipts(&self, drop: bool) {
        self.inner.lock().unwrap().drop_receipts = drop;
    }

    pub fn delay_receipt_polls(&self, polls: u32) {
        self.inner.lock().unwrap().receipt_delay_polls = polls;
    }

    pub fn enable_push_receipts(&self, enabled: bool) {
        self.inner.lock().unwrap().push_enabled = enabled;
    }

    /// Queue win/lose outcomes for upcoming advances (unscripted ⇒ win).
    pub fn script_advances(&self, outcomes: impl IntoIterator<Item = bool>) {
        self.inner
            .lock()
            .unwrap()
            .advance_script
            .extend(outcomes);
    }

    pub fn delay_randomness(&self, round: RoundId, queries: u32) {
        if let Some(sim) = self.inner.lock().unwrap().rounds.get_mut(&round.0) {
            sim.ready_after = queries;
        }
    }

    pub fn advance_time(&self, secs: u64) {
        self.inner.lock().unwrap().clock += secs;
    }

    // --- direct state access for scenario setup -------------------------

    pub fn set_next_nonce(&self, account: Address, nonce: u64) {
        if let Some(state) = self.inner.lock().unwrap().accounts.get_mut(&account) {
            state.next_nonce = nonce;
        }
    }

    /// Seed an already-running round, as a restarted client would find it.
    /// `age_secs` backdates its last activity against the ledger clock.
    pub fn seed_active_round(
        &self,
        owner: Address,
        tier: Difficulty,
        wager: u64,
        stage: u32,
        randomness_ready: bool,
        age_secs: u64,
    ) -> RoundId {
        let mut inner = self.inner.lock().unwrap();
        inner.next_round_id += 1;
        let id = RoundId(inner.next_round_id);
        let last_activity = inner.clock.saturating_sub(age_secs);
        inner.rounds.insert(
            id.0,
            SimRound {
                id,
                owner,
                wager,
                tier,
                stage,
                ready_after: if randomness_ready { 0 } else { u32::MAX },
                last_activity,
            },
        );
        inner.active_by_owner.insert(owner, id.0);
        id
    }

    // --- inspection -----------------------------------------------------

    pub fn attempted_nonces(&self) -> Vec<u64> {
        self.inner.lock().unwrap().attempted_nonces.clone()
    }

    pub fn accepted_nonces(&self) -> Vec<u64> {
        self.inner.lock().unwrap().accepted_nonces.clone()
    }

    pub fn terminations(&self) -> Vec<&'static str> {
        self.inner.lock().unwrap().terminations.clone()
    }

    pub fn has_active_round(&self, owner: Address) -> bool {
        self.inner
            .lock()
            .unwrap()
            .active_by_owner
            .contains_key(&owner)
    }

    pub fn next_nonce_of(&self, account: Address) -> u64 {
        self.inner
            .lock()
            .unwrap()
            .accounts
            .get(&account)
            .map(|s| s.next_nonce)
            .unwrap_or(0)
    }

    // --- execution ------------------------------------------------------

    fn submit(&self, call: &ContractCall, nonce: u64, owner: Address) -> Result<TxHash> {
        let mut inner = self.inner.lock().unwrap();
        if inner.conflicts > 0 {
            inner.conflicts -= 1;
            inner.attempted_nonces.push(nonce);
            // A conflicting nonce was consumed by someone else; the true next
            // nonce moves past it, which is what a resync will observe.
            if let Some(state) = inner.accounts.get_mut(&owner) {
                state.next_nonce = state.next_nonce.max(nonce + 1);
            }
            return Err(ClientError::NonceConflict {
                detail: "nonce already used".to_string(),
            });
        }
        if inner.rejections > 0 {
            inner.rejections -= 1;
            inner.attempted_nonces.push(nonce);
            return Err(ClientError::Submission {
                detail: "execution reverted".to_string(),
            });
        }
        inner.attempted_nonces.push(nonce);
        inner.accepted_nonces.push(nonce);
        if let Some(state) = inner.accounts.get_mut(&owner) {
            state.next_nonce = state.next_nonce.max(nonce + 1);
        }

        inner.next_tx += 1;
        let mut hash = [0u8; 32];
        hash[..8].copy_from_slice(&inner.next_tx.to_le_bytes());
        let tx = TxHash(hash);

        inner.clock += 1;
        let logs = Self::execute(&mut inner, call, owner);
        if !inner.drop_receipts {
            let receipt = Receipt {
                tx,
                logs,
                block_timestamp: inner.clock,
            };
            inner.receipts.insert(tx, receipt);
        }
        Ok(tx)
    }

    fn execute(inner: &mut Inner, call: &ContractCall, owner: Address) -> Vec<LogEntry> {
        let selector: [u8; 4] = match call.payload.get(..4).and_then(|s| s.try_into().ok())
        {
            Some(sel) => sel,
            None => return Vec::new(),
        };
        if selector == crate::calls::selector("start_round(uint8)") {
            return Self::execute_start(inner, call, owner);
        }
        let round_id = call
            .payload
            .get(4..12)
            .and_then(|bytes| bytes.try_into().ok())
            .map(u64::from_le_bytes);
        let Some(round_id) = round_id else {
            return Vec::new();
        };
        if selector == crate::calls::selector("advance(uint64)") {
            Self::execute_advance(inner, round_id)
        } else if selector == crate::calls::selector("cash_out(uint64)") {
            Self::end_round(inner, round_id, false, None)
        } else if selector == crate::calls::selector("timeout_round(uint64)") {
            Self::end_round(inner, round_id, false, Some("timeout_round"))
        } else if selector == crate::calls::selector("refund_round(uint64)") {
            Self::end_round(inner, round_id, false, Some("refund_round"))
        } else if selector == crate::calls::selector("secure_round(uint64)") {
            Self::end_round(inner, round_id, false, Some("secure_round"))
        } else {
            Vec::new()
        }
    }

    fn execute_start(
        inner: &mut Inner,
        call: &ContractCall,
        owner: Address,
    ) -> Vec<LogEntry> {
        if inner.active_by_owner.contains_key(&owner) {
            // One active round per account; the call lands but does nothing.
            return Vec::new();
        }
        let tier = match call.payload.get(4).copied() {
            Some(0) => Difficulty::Easy,
            Some(1) => Difficulty::Medium,
            Some(2) => Difficulty::Hard,
            Some(3) => Difficulty::Expert,
            _ => return Vec::new(),
        };
        if let Some(state) = inner.accounts.get_mut(&owner) {
            state.balance = state.balance.saturating_sub(call.value as u128);
        }
        inner.next_round_id += 1;
        let id = RoundId(inner.next_round_id);
        let clock = inner.clock;
        inner.rounds.insert(
            id.0,
            SimRound {
                id,
                owner,
                wager: call.value,
                tier,
                stage: 0,
                ready_after: 1,
                last_activity: clock,
            },
        );
        inner.active_by_owner.insert(owner, id.0);
        vec![LogEntry {
            topics: vec![round_started_topic()],
            data: id.0.to_le_bytes().to_vec(),
        }]
    }

    fn execute_advance(inner: &mut Inner, round_id: u64) -> Vec<LogEntry> {
        let won = inner.advance_script.pop_front().unwrap_or(true);
        if !won {
            return Self::end_round(inner, round_id, true, None);
        }
        let clock = inner.clock;
        match inner.rounds.get_mut(&round_id) {
            Some(sim) => {
                sim.stage += 1;
                sim.last_activity = clock;
                vec![LogEntry {
                    topics: vec![stage_advanced_topic()],
                    data: sim.stage.to_le_bytes().to_vec(),
                }]
            }
            None => Vec::new(),
        }
    }

    fn end_round(
        inner: &mut Inner,
        round_id: u64,
        failed: bool,
        termination: Option<&'static str>,
    ) -> Vec<LogEntry> {
        let Some(sim) = inner.rounds.remove(&round_id) else {
            return Vec::new();
        };
        inner.active_by_owner.remove(&sim.owner);
        if let Some(name) = termination {
            inner.terminations.push(name);
        }
        vec![LogEntry {
            topics: vec![round_ended_topic()],
            data: vec![u8::from(failed)],
        }]
    }

    fn take_query_failure(&self) -> Option<ClientError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.query_failures > 0 {
            inner.query_failures -= 1;
            Some(ClientError::Query {
                detail: "injected query failure".to_string(),
            })
        } else {
            None
        }
    }
}

#[async_trait]
impl LedgerReader for InMemoryLedger {
    async fn next_nonce(&self, account: Address) -> Result<u64> {
        if let Some(err) = self.take_query_failure() {
            return Err(err);
        }
        Ok(self.next_nonce_of(account))
    }

    async fn balance(&self, account: Address) -> Result<u128> {
        if let Some(err) = self.take_query_failure() {
            return Err(err);
        }
        Ok(self
            .inner
            .lock()
            .unwrap()
            .accounts
            .get(&account)
            .map(|s| s.balance)
            .unwrap_or(0))
    }

    async fn active_round(&self, account: Address) -> Result<Option<RoundSnapshot>> {
        if let Some(err) = self.take_query_failure() {
            return Err(err);
        }
        let inner = self.inner.lock().unwrap();
        let snapshot = inner
            .active_by_owner
            .get(&account)
            .and_then(|id| inner.rounds.get(id))
            .map(|sim| RoundSnapshot {
                id: sim.id,
                owner: sim.owner,
                wager: sim.wager,
                tier: sim.tier,
                stage: sim.stage,
                randomness_ready: sim.ready_after == 0,
                last_activity: sim.last_activity,
            });
        Ok(snapshot)
    }

    async fn randomness_ready(&self, round: RoundId) -> Result<bool> {
        if let Some(err) = self.take_query_failure() {
            return Err(err);
        }
        let mut inner = self.inner.lock().unwrap();
        match inner.rounds.get_mut(&round.0) {
            Some(sim) if sim.ready_after == 0 => Ok(true),
            Some(sim) => {
                if sim.ready_after != u32::MAX {
                    sim.ready_after -= 1;
                }
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn block_timestamp(&self) -> Result<u64> {
        if let Some(err) = self.take_query_failure() {
            return Err(err);
        }
        Ok(self.inner.lock().unwrap().clock)
    }

    async fn fee_quote(&self, _call: &ContractCall) -> Result<u64> {
        if let Some(err) = self.take_query_failure() {
            return Err(err);
        }
        Ok(FLAT_FEE_QUOTE)
    }
}

#[async_trait]
impl ReceiptSource for InMemoryLedger {
    async fn subscribe(&self, tx: TxHash) -> Option<oneshot::Receiver<Receipt>> {
        let inner = self.inner.lock().unwrap();
        if !inner.push_enabled {
            return None;
        }
        let receipt = inner.receipts.get(&tx).cloned()?;
        let (sender, receiver) = oneshot::channel();
        let _ = sender.send(receipt);
        Some(receiver)
    }

    async fn poll(&self, tx: TxHash) -> Result<Option<Receipt>> {
        let mut inner = self.inner.lock().unwrap();
        if inner.receipt_delay_polls > 0 {
            inner.receipt_delay_polls -= 1;
            return Ok(None);
        }
        Ok(inner.receipts.get(&tx).cloned())
    }
}

/// Strategy handle over the in-memory ledger.
#[derive(Clone)]
pub struct InMemoryStrategy {
    ledger: InMemoryLedger,
    owner: Address,
}

#[async_trait]
impl SubmissionStrategy for InMemoryStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Keystore
    }

    async fn sign_and_submit(&self, call: &ContractCall, nonce: u64) -> Result<TxHash> {
        self.ledger.submit(call, nonce, self.owner)
    }
}

/// Recovery prompt answering from a prepared queue; records every offer it
/// was shown. Unscripted prompts answer Cancel.
#[derive(Clone, Default)]
pub struct ScriptedPrompt {
    choices: Arc<Mutex<VecDeque<RecoveryChoice>>>,
    seen: Arc<Mutex<Vec<RecoveryOffer>>>,
}

impl ScriptedPrompt {
    pub fn new(choices: impl IntoIterator<Item = RecoveryChoice>) -> Self {
        Self {
            choices: Arc::new(Mutex::new(choices.into_iter().collect())),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn offers_seen(&self) -> Vec<RecoveryOffer> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecoveryPrompt for ScriptedPrompt {
    async fn decide(&self, offer: &RecoveryOffer) -> RecoveryChoice {
        self.seen.lock().unwrap().push(offer.clone());
        self.choices
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(RecoveryChoice::Cancel)
    }
}
