use crate::{
    error::Result,
    round::Difficulty,
};
use async_trait::async_trait;
use sha2::{
    Digest,
    Sha256,
};
use std::fmt;
use tokio::sync::oneshot;

pub mod in_memory;

/// Account identifier on the ledger, rendered as 0x-prefixed hex.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct Address(pub [u8; 32]);

/// Hash identifying a submitted transaction.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct TxHash(pub [u8; 32]);

/// One emitted log topic; the ledger tags events with these.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct Topic(pub [u8; 32]);

/// Opaque ledger handle for one round.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub struct RoundId(pub u64);

macro_rules! hex_display {
    ($ty:ty) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}(0x{})", stringify!($ty), hex::encode(&self.0[..8]))
            }
        }
    };
}

hex_display!(Address);
hex_display!(TxHash);
hex_display!(Topic);

impl Address {
    pub fn from_hex(raw: &str) -> Option<Self> {
        let trimmed = raw.trim_start_matches("0x");
        let bytes = hex::decode(trimmed).ok()?;
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(arr))
    }
}

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A state-changing call bound for the game contract.
#[derive(Clone, Debug)]
pub struct ContractCall {
    pub target: Address,
    pub payload: Vec<u8>,
    /// Funds attached to the call (the wager rides on the start call).
    pub value: u64,
    /// Execution resource budget the submitter is willing to meter.
    pub budget: u64,
}

#[derive(Clone, Debug)]
pub struct LogEntry {
    pub topics: Vec<Topic>,
    pub data: Vec<u8>,
}

/// Inclusion proof for a submitted call, as delivered by the transport.
#[derive(Clone, Debug)]
pub struct Receipt {
    pub tx: TxHash,
    pub logs: Vec<LogEntry>,
    pub block_timestamp: u64,
}

impl Receipt {
    pub fn has_topic(&self, topic: Topic) -> bool {
        self.logs.iter().any(|log| log.topics.contains(&topic))
    }

    pub fn log_with_topic(&self, topic: Topic) -> Option<&LogEntry> {
        self.logs.iter().find(|log| log.topics.contains(&topic))
    }
}

/// Ledger-side view of an account's round, as returned by the active-round
/// query. `last_activity` is the ledger timestamp of the round's most recent
/// accepted call, the only clock recovery decisions trust.
#[derive(Clone, Debug)]
pub struct RoundSnapshot {
    pub id: RoundId,
    pub owner: Address,
    pub wager: u64,
    pub tier: Difficulty,
    pub stage: u32,
    pub randomness_ready: bool,
    pub last_activity: u64,
}

/// Topic for an event signature: the first 32 bytes of its digest.
pub fn event_topic(signature: &str) -> Topic {
    let mut hasher = Sha256::new();
    hasher.update(signature.as_bytes());
    Topic(hasher.finalize().into())
}

pub fn round_started_topic() -> Topic {
    event_topic("RoundStarted(address,uint64)")
}

pub fn stage_advanced_topic() -> Topic {
    event_topic("StageAdvanced(uint64,uint32)")
}

pub fn round_ended_topic() -> Topic {
    event_topic("RoundEnded(uint64,bool)")
}

/// Read-only ledger queries the core depends on.
#[async_trait]
pub trait LedgerReader: Send + Sync {
    async fn next_nonce(&self, account: Address) -> Result<u64>;
    async fn balance(&self, account: Address) -> Result<u128>;
    async fn active_round(&self, account: Address) -> Result<Option<RoundSnapshot>>;
    async fn randomness_ready(&self, round: RoundId) -> Result<bool>;
    async fn block_timestamp(&self) -> Result<u64>;
    async fn fee_quote(&self, call: &ContractCall) -> Result<u64>;
}

/// Tag for one signing/submission backend, used for ordering and logging.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StrategyKind {
    SessionKey,
    Keystore,
    RemoteSigner,
}

impl StrategyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::SessionKey => "session-key",
            StrategyKind::Keystore => "keystore",
            StrategyKind::RemoteSigner => "remote-signer",
        }
    }
}

/// One way of producing a signed, ledger-bound transaction and handing it to
/// the network. Strategies are tried in declared order; see the pipeline.
#[async_trait]
pub trait SubmissionStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;
    async fn sign_and_submit(&self, call: &ContractCall, nonce: u64) -> Result<TxHash>;
}

/// Delivery of inclusion receipts: push where the transport supports it,
/// polling otherwise.
#[async_trait]
pub trait ReceiptSource: Send + Sync {
    /// Some(receiver) when the transport can push the receipt for this hash.
    async fn subscribe(&self, tx: TxHash) -> Option<oneshot::Receiver<Receipt>>;
    async fn poll(&self, tx: TxHash) -> Result<Option<Receipt>>;
}
