use color_eyre::eyre::{
    Result,
    WrapErr,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fs,
    path::Path,
    time::Duration,
};

const DEFAULT_SUBMIT_COOLDOWN_MS: u64 = 2_000;
const DEFAULT_RECEIPT_POLL_INTERVAL_MS: u64 = 750;
const DEFAULT_RECEIPT_WAIT_CAP_MS: u64 = 90_000;
const DEFAULT_READINESS_INTERVAL_MS: u64 = 1_000;
const DEFAULT_READINESS_ATTEMPTS: u32 = 60;
const DEFAULT_INACTIVITY_WINDOW_SECS: u64 = 300;
const DEFAULT_ELAPSED_THRESHOLD_SECS: u64 = 300;
const DEFAULT_CALL_BUDGET: u64 = 29_000_000;

/// Session tunables. Defaults match the deployed game's parameters; hosts
/// override them for test networks via a JSON file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_submit_cooldown_ms")]
    pub submit_cooldown_ms: u64,
    #[serde(default = "default_receipt_poll_interval_ms")]
    pub receipt_poll_interval_ms: u64,
    #[serde(default = "default_receipt_wait_cap_ms")]
    pub receipt_wait_cap_ms: u64,
    #[serde(default = "default_readiness_interval_ms")]
    pub readiness_interval_ms: u64,
    #[serde(default = "default_readiness_attempts")]
    pub readiness_attempts: u32,
    #[serde(default = "default_inactivity_window_secs")]
    pub inactivity_window_secs: u64,
    /// Ledger-side elapsed time at which the timeout termination becomes the
    /// only honored call; must match the contract's window.
    #[serde(default = "default_elapsed_threshold_secs")]
    pub termination_elapsed_threshold_secs: u64,
    #[serde(default = "default_call_budget")]
    pub default_call_budget: u64,
}

fn default_submit_cooldown_ms() -> u64 {
    DEFAULT_SUBMIT_COOLDOWN_MS
}
fn default_receipt_poll_interval_ms() -> u64 {
    DEFAULT_RECEIPT_POLL_INTERVAL_MS
}
fn default_receipt_wait_cap_ms() -> u64 {
    DEFAULT_RECEIPT_WAIT_CAP_MS
}
fn default_readiness_interval_ms() -> u64 {
    DEFAULT_READINESS_INTERVAL_MS
}
fn default_readiness_attempts() -> u32 {
    DEFAULT_READINESS_ATTEMPTS
}
fn default_inactivity_window_secs() -> u64 {
    DEFAULT_INACTIVITY_WINDOW_SECS
}
fn default_elapsed_threshold_secs() -> u64 {
    DEFAULT_ELAPSED_THRESHOLD_SECS
}
fn default_call_budget() -> u64 {
    DEFAULT_CALL_BUDGET
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            submit_cooldown_ms: DEFAULT_SUBMIT_COOLDOWN_MS,
            receipt_poll_interval_ms: DEFAULT_RECEIPT_POLL_INTERVAL_MS,
            receipt_wait_cap_ms: DEFAULT_RECEIPT_WAIT_CAP_MS,
            readiness_interval_ms: DEFAULT_READINESS_INTERVAL_MS,
            readiness_attempts: DEFAULT_READINESS_ATTEMPTS,
            inactivity_window_secs: DEFAULT_INACTIVITY_WINDOW_SECS,
            termination_elapsed_threshold_secs: DEFAULT_ELAPSED_THRESHOLD_SECS,
            default_call_budget: DEFAULT_CALL_BUDGET,
        }
    }
}

impl SessionConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path)
            .wrap_err_with(|| format!("Failed to read session config at {}", path.display()))?;
        let config = serde_json::from_slice::<SessionConfig>(&data)
            .wrap_err("Failed to parse session config JSON")?;
        Ok(config)
    }

    pub fn submit_cooldown(&self) -> Duration {
        Duration::from_millis(self.submit_cooldown_ms)
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_interval_ms)
    }

    pub fn receipt_wait_cap(&self) -> Duration {
        Duration::from_millis(self.receipt_wait_cap_ms)
    }

    pub fn readiness_interval(&self) -> Duration {
        Duration::from_millis(self.readiness_interval_ms)
    }

    pub fn inactivity_window(&self) -> Duration {
        Duration::from_secs(self.inactivity_window_secs)
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[test]
    fn deserialize__fills_defaults_for_missing_fields() {
        // given
        let json = r#"{ "submit_cooldown_ms": 10 }"#;

        // when
        let config: SessionConfig = serde_json::from_str(json).unwrap();

        // then
        assert_eq!(config.submit_cooldown_ms, 10);
        assert_eq!(config.readiness_attempts, 60);
        assert_eq!(config.termination_elapsed_threshold_secs, 300);
    }
}
