pub mod calls;
pub mod config;
pub mod error;
pub mod events;
pub mod ledger;
pub mod nonce;
pub mod readiness;
pub mod receipt;
pub mod recovery;
pub mod round;
pub mod session;
pub mod submit;

pub use config::SessionConfig;
pub use error::{
    ClientError,
    Result,
};
pub use events::RoundEvent;
pub use ledger::{
    Address,
    RoundId,
    TxHash,
};
pub use recovery::{
    RecoveryChoice,
    RecoveryOffer,
    RecoveryPrompt,
    Termination,
    select_termination,
};
pub use round::Difficulty;
pub use session::{
    AdvanceOutcome,
    AdvanceResult,
    CashOutOutcome,
    CashOutResult,
    GameSession,
    SessionHandles,
    StartOutcome,
};

pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
