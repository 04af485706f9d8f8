use crate::{
    error::Result,
    ledger::{
        Address,
        LedgerReader,
    },
};
use tracing::debug;

#[derive(Copy, Clone, Debug)]
struct MirrorState {
    next_nonce: u64,
    balance: u128,
}

/// Cache of the account's next sequence number and balance. The nonce
/// advances optimistically on every draw; a sequencing conflict upstream is
/// the signal to [`reset`](NonceMirror::reset) from the ledger's truth.
#[derive(Debug)]
pub struct NonceMirror {
    account: Address,
    state: Option<MirrorState>,
}

impl NonceMirror {
    pub fn new(account: Address) -> Self {
        Self {
            account,
            state: None,
        }
    }

    pub fn account(&self) -> Address {
        self.account
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    pub fn cached_balance(&self) -> Option<u128> {
        self.state.map(|s| s.balance)
    }

    pub fn cached_next_nonce(&self) -> Option<u64> {
        self.state.map(|s| s.next_nonce)
    }

    /// Overwrite the cache with the ledger's truth. On failure the cache is
    /// left unset so no caller can draw a guessed nonce.
    pub async fn reset(&mut self, reader: &dyn LedgerReader) -> Result<()> {
        self.state = None;
        let next_nonce = reader.next_nonce(self.account).await?;
        let balance = reader.balance(self.account).await?;
        debug!(account = %self.account, next_nonce, "nonce mirror reset");
        self.state = Some(MirrorState {
            next_nonce,
            balance,
        });
        Ok(())
    }

    /// Return the cached nonce and advance it. Read and increment happen in
    /// one synchronous step; the only await is the initial fill.
    pub async fn next_and_advance(&mut self, reader: &dyn LedgerReader) -> Result<u64> {
        if self.state.is_none() {
            self.reset(reader).await?;
        }
        let state = self.state.as_mut().expect("reset just filled the cache");
        let drawn = state.next_nonce;
        state.next_nonce += 1;
        Ok(drawn)
    }

    pub fn clear(&mut self) {
        self.state = None;
    }
}
