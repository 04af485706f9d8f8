use crate::{
    error::{
        ClientError,
        Result,
    },
    ledger::{
        RoundId,
        RoundSnapshot,
    },
};
use serde::{
    Deserialize,
    Serialize,
};

pub const BASE_MULTIPLIER_BPS: u64 = 10_000;

/// Payout schedule the ledger applies per tier; mirrored here for display
/// and event payloads. The ledger remains authoritative for actual payouts.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    Expert,
}

impl Difficulty {
    pub fn max_stage(self) -> u32 {
        match self {
            Difficulty::Easy => 8,
            Difficulty::Medium => 10,
            Difficulty::Hard => 12,
            Difficulty::Expert => 15,
        }
    }

    /// Per-stage compounding factor, basis points.
    pub fn growth_bps(self) -> u64 {
        match self {
            Difficulty::Easy => 12_500,
            Difficulty::Medium => 15_000,
            Difficulty::Hard => 20_000,
            Difficulty::Expert => 30_000,
        }
    }

    /// Cumulative multiplier after `stage` confirmed advances, basis points.
    pub fn multiplier_after_bps(self, stage: u32) -> u64 {
        let mut acc: u128 = BASE_MULTIPLIER_BPS as u128;
        for _ in 0..stage.min(self.max_stage()) {
            acc = acc.saturating_mul(self.growth_bps() as u128) / BASE_MULTIPLIER_BPS as u128;
        }
        acc.min(u64::MAX as u128) as u64
    }

    pub fn as_index(self) -> u8 {
        match self {
            Difficulty::Easy => 0,
            Difficulty::Medium => 1,
            Difficulty::Hard => 2,
            Difficulty::Expert => 3,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
pub enum RoundPhase {
    /// No round; a new wager may be placed.
    Idle,
    /// Wager submitted, not yet confirmed by the ledger.
    Starting,
    /// Wager confirmed; waiting on the randomness provider.
    Active,
    /// Randomness ready; an advance may be requested.
    ReadyToAdvance,
    /// Advance in flight; no other action accepted.
    Advancing,
    /// Cash-out in flight; no other action accepted.
    CashingOut,
}

#[derive(Clone, Debug)]
pub struct Round {
    pub id: Option<RoundId>,
    pub wager: u64,
    pub tier: Difficulty,
    pub stage: u32,
    pub multiplier_bps: u64,
    pub randomness_ready: bool,
}

/// Client-local mirror of round progress. Transitions are driven by user
/// actions and by reconciled receipt outcomes; the guards here are what make
/// illegal actions fail fast instead of reaching the ledger.
#[derive(Debug, Default)]
pub struct RoundMachine {
    phase: RoundPhase,
    round: Option<Round>,
}

impl Default for RoundPhase {
    fn default() -> Self {
        RoundPhase::Idle
    }
}

impl RoundMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.phase, RoundPhase::Idle)
    }

    pub fn round_id(&self) -> Option<RoundId> {
        self.round.as_ref().and_then(|r| r.id)
    }

    pub fn current_stage(&self) -> u32 {
        self.round.as_ref().map(|r| r.stage).unwrap_or(0)
    }

    pub fn multiplier_bps(&self) -> u64 {
        self.round
            .as_ref()
            .map(|r| r.multiplier_bps)
            .unwrap_or(BASE_MULTIPLIER_BPS)
    }

    pub fn is_randomness_ready(&self) -> bool {
        self.round
            .as_ref()
            .map(|r| r.randomness_ready)
            .unwrap_or(false)
    }

    pub fn tier(&self) -> Option<Difficulty> {
        self.round.as_ref().map(|r| r.tier)
    }

    pub fn wager(&self) -> Option<u64> {
        self.round.as_ref().map(|r| r.wager)
    }

    pub fn wager_submitted(&mut self, tier: Difficulty, wager: u64) -> Result<()> {
        match self.phase {
            RoundPhase::Idle => {
                self.phase = RoundPhase::Starting;
                self.round = Some(Round {
                    id: None,
                    wager,
                    tier,
                    stage: 0,
                    multiplier_bps: BASE_MULTIPLIER_BPS,
                    randomness_ready: false,
                });
                Ok(())
            }
            RoundPhase::Starting => Err(ClientError::ActionInFlight),
            _ => Err(ClientError::RoundAlreadyActive),
        }
    }

    pub fn wager_confirmed(&mut self, id: RoundId) -> Result<()> {
        match self.phase {
            RoundPhase::Starting => {
                if let Some(round) = self.round.as_mut() {
                    round.id = Some(id);
                }
                self.phase = RoundPhase::Active;
                Ok(())
            }
            _ => Err(ClientError::NoActiveRound),
        }
    }

    pub fn start_failed(&mut self) {
        if matches!(self.phase, RoundPhase::Starting) {
            self.reset();
        }
    }

    /// Called by the readiness poller; a no-op outside `Active` so a late
    /// poll result never corrupts a round that has already moved on.
    pub fn randomness_ready(&mut self) -> bool {
        if !matches!(self.phase, RoundPhase::Active) {
            return false;
        }
        if let Some(round) = self.round.as_mut() {
            round.randomness_ready = true;
        }
        self.phase = RoundPhase::ReadyToAdvance;
        true
    }

    pub fn advance_submitted(&mut self) -> Result<()> {
        match self.phase {
            RoundPhase::ReadyToAdvance => {
                self.phase = RoundPhase::Advancing;
                Ok(())
            }
            RoundPhase::Advancing | RoundPhase::CashingOut => {
                Err(ClientError::ActionInFlight)
            }
            RoundPhase::Active => Err(ClientError::NotReady),
            RoundPhase::Idle | RoundPhase::Starting => Err(ClientError::NoActiveRound),
        }
    }

    pub fn advanced(&mut self) -> Result<u32> {
        match self.phase {
            RoundPhase::Advancing => {
                let round = self
                    .round
                    .as_mut()
                    .ok_or(ClientError::NoActiveRound)?;
                round.stage += 1;
                round.multiplier_bps = round.tier.multiplier_after_bps(round.stage);
                self.phase = RoundPhase::ReadyToAdvance;
                Ok(round.stage)
            }
            _ => Err(ClientError::NoActiveRound),
        }
    }

    pub fn advance_failed(&mut self) {
        if matches!(self.phase, RoundPhase::Advancing) {
            self.phase = RoundPhase::ReadyToAdvance;
        }
    }

    /// Ledger reported the round over (a lost advance or a termination call
    /// confirming). Resets to Idle; the caller reads stage/wager first for
    /// its notification.
    pub fn round_over(&mut self) {
        self.reset();
    }

    pub fn cash_out_submitted(&mut self) -> Result<()> {
        match self.phase {
            RoundPhase::ReadyToAdvance | RoundPhase::Active => {
                if self.current_stage() == 0 {
                    return Err(ClientError::NothingToSecure);
                }
                self.phase = RoundPhase::CashingOut;
                Ok(())
            }
            RoundPhase::Advancing | RoundPhase::CashingOut => {
                Err(ClientError::ActionInFlight)
            }
            RoundPhase::Idle | RoundPhase::Starting => Err(ClientError::NoActiveRound),
        }
    }

    pub fn cash_out_failed(&mut self) {
        if matches!(self.phase, RoundPhase::CashingOut) {
            self.phase = if self.is_randomness_ready() {
                RoundPhase::ReadyToAdvance
            } else {
                RoundPhase::Active
            };
        }
    }

    pub fn cashed_out(&mut self) -> Result<()> {
        match self.phase {
            RoundPhase::CashingOut => {
                self.reset();
                Ok(())
            }
            _ => Err(ClientError::NoActiveRound),
        }
    }

    /// Adopt a round rediscovered on the ledger (recovery Resume).
    pub fn adopt(&mut self, snapshot: &RoundSnapshot) -> Result<()> {
        if self.is_active() {
            return Err(ClientError::RoundAlreadyActive);
        }
        self.round = Some(Round {
            id: Some(snapshot.id),
            wager: snapshot.wager,
            tier: snapshot.tier,
            stage: snapshot.stage,
            multiplier_bps: snapshot.tier.multiplier_after_bps(snapshot.stage),
            randomness_ready: snapshot.randomness_ready,
        });
        self.phase = if snapshot.randomness_ready {
            RoundPhase::ReadyToAdvance
        } else {
            RoundPhase::Active
        };
        Ok(())
    }

    pub fn clear(&mut self) {
        self.reset();
    }

    fn reset(&mut self) {
        self.phase = RoundPhase::Idle;
        self.round = None;
    }
}
