use crate::{
    ledger::{
        Address,
        ContractCall,
        RoundId,
    },
    round::Difficulty,
};
use sha2::{
    Digest,
    Sha256,
};

/// Builds payloads for the game contract's entry points: a 4-byte selector
/// (digest prefix of the signature string) followed by little-endian
/// arguments.
#[derive(Clone, Debug)]
pub struct CallEncoder {
    contract: Address,
    default_budget: u64,
}

pub(crate) fn selector(signature: &str) -> [u8; 4] {
    let mut hasher = Sha256::new();
    hasher.update(signature.as_bytes());
    let digest = hasher.finalize();
    [digest[0], digest[1], digest[2], digest[3]]
}

fn payload(signature: &str, args: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + args.iter().map(|a| a.len()).sum::<usize>());
    out.extend_from_slice(&selector(signature));
    for arg in args {
        out.extend_from_slice(arg);
    }
    out
}

impl CallEncoder {
    pub fn new(contract: Address, default_budget: u64) -> Self {
        Self {
            contract,
            default_budget,
        }
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    /// The wager rides along as the call value.
    pub fn start_round(&self, tier: Difficulty, wager: u64) -> ContractCall {
        ContractCall {
            target: self.contract,
            payload: payload("start_round(uint8)", &[&[tier.as_index()]]),
            value: wager,
            budget: self.default_budget,
        }
    }

    pub fn advance(&self, round: RoundId) -> ContractCall {
        self.round_call("advance(uint64)", round)
    }

    pub fn cash_out(&self, round: RoundId) -> ContractCall {
        self.round_call("cash_out(uint64)", round)
    }

    /// Termination once the ledger-side inactivity window has elapsed; the
    /// ledger computes a timeout-based payout.
    pub fn timeout_round(&self, round: RoundId) -> ContractCall {
        self.round_call("timeout_round(uint64)", round)
    }

    /// Termination for a round with no confirmed progress; stake refund only.
    pub fn refund_round(&self, round: RoundId) -> ContractCall {
        self.round_call("refund_round(uint64)", round)
    }

    /// Termination that pays out at the last confirmed stage.
    pub fn secure_round(&self, round: RoundId) -> ContractCall {
        self.round_call("secure_round(uint64)", round)
    }

    fn round_call(&self, signature: &str, round: RoundId) -> ContractCall {
        ContractCall {
            target: self.contract,
            payload: payload(signature, &[&round.0.to_le_bytes()]),
            value: 0,
            budget: self.default_budget,
        }
    }
}
