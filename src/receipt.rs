use crate::{
    error::{
        ClientError,
        Result,
    },
    ledger::{
        Address,
        LedgerReader,
        Receipt,
        ReceiptSource,
        RoundId,
        RoundSnapshot,
        TxHash,
        round_ended_topic,
        round_started_topic,
        stage_advanced_topic,
    },
};
use std::{
    sync::Arc,
    time::Duration,
};
use tokio::time::{
    Instant,
    sleep_until,
    timeout_at,
};
use tracing::warn;

/// Authoritative outcome of a submitted call, as decided by the ledger's
/// emitted log topics, never by bare transaction success.
#[derive(Clone, Debug)]
pub enum Outcome {
    Advanced,
    RoundEnded { failed: bool },
    /// No recognizable topic; the explicit active-round query says the
    /// account's round still stands (carries the ledger's view of it).
    RoundActive(RoundSnapshot),
}

/// Waits for inclusion of a submitted call and classifies what the ledger
/// decided. Push delivery is preferred; fixed-interval polling is the
/// fallback; both share one wait cap.
pub struct ReceiptReconciler {
    source: Arc<dyn ReceiptSource>,
    reader: Arc<dyn LedgerReader>,
    poll_interval: Duration,
    wait_cap: Duration,
}

impl ReceiptReconciler {
    pub fn new(
        source: Arc<dyn ReceiptSource>,
        reader: Arc<dyn LedgerReader>,
        poll_interval: Duration,
        wait_cap: Duration,
    ) -> Self {
        Self {
            source,
            reader,
            poll_interval,
            wait_cap,
        }
    }

    pub async fn await_and_classify(
        &self,
        tx: TxHash,
        account: Address,
    ) -> Result<(Receipt, Outcome)> {
        let receipt = self.await_receipt(tx).await?;
        let outcome = self.classify(&receipt, account).await?;
        Ok((receipt, outcome))
    }

    pub async fn await_receipt(&self, tx: TxHash) -> Result<Receipt> {
        let deadline = Instant::now() + self.wait_cap;
        if let Some(push) = self.source.subscribe(tx).await {
            match timeout_at(deadline, push).await {
                Ok(Ok(receipt)) => return Ok(receipt),
                Ok(Err(_)) => {
                    warn!(%tx, "receipt subscription dropped; falling back to polling");
                }
                Err(_) => return Err(ClientError::InclusionTimeout { tx }),
            }
        }
        self.poll_until(tx, deadline).await
    }

    async fn poll_until(&self, tx: TxHash, deadline: Instant) -> Result<Receipt> {
        loop {
            if let Some(receipt) = self.source.poll(tx).await? {
                return Ok(receipt);
            }
            let next = Instant::now() + self.poll_interval;
            if next > deadline {
                return Err(ClientError::InclusionTimeout { tx });
            }
            sleep_until(next).await;
        }
    }

    pub async fn classify(&self, receipt: &Receipt, account: Address) -> Result<Outcome> {
        let advanced = receipt.has_topic(stage_advanced_topic());
        let ended = receipt.log_with_topic(round_ended_topic());

        if let Some(log) = ended {
            if advanced {
                // Should be impossible by the contract's own rules; the end
                // event is what the payout path trusts, so prefer it.
                warn!(
                    tx = %receipt.tx,
                    "receipt carries both advance and round-end topics; trusting round end"
                );
            }
            let failed = log.data.first().map(|b| *b != 0).unwrap_or(false);
            return Ok(Outcome::RoundEnded { failed });
        }
        if advanced {
            return Ok(Outcome::Advanced);
        }

        // Ambiguous receipt: ask the ledger instead of guessing.
        match self.reader.active_round(account).await {
            Ok(Some(snapshot)) => Ok(Outcome::RoundActive(snapshot)),
            Ok(None) => Ok(Outcome::RoundEnded { failed: false }),
            Err(err) => {
                warn!(tx = %receipt.tx, error = %err, "ambiguity follow-up query failed");
                Err(ClientError::AmbiguousReceipt { tx: receipt.tx })
            }
        }
    }
}

/// Round id announced by the start event, when present in the receipt.
pub fn round_id_from_receipt(receipt: &Receipt) -> Option<RoundId> {
    let log = receipt.log_with_topic(round_started_topic())?;
    let bytes: [u8; 8] = log.data.get(..8)?.try_into().ok()?;
    Some(RoundId(u64::from_le_bytes(bytes)))
}
