//! Engine configuration.
//!
//! Every timing constant and trust decision of the reconciliation engine lives here so that
//! a deployment can tune it from a JSON file without touching the engine itself.

use crate::error::{PaymentError, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// How an explicit "yes, I paid" answer from the user is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationPolicy {
    /// The answer sets `success` unless an authoritative signal arrived while the prompt was open.
    #[default]
    AcceptAsSuccess,
    /// The answer only triggers a manual verification against the backend.
    VerifyFirst,
}

/// Enable toggles for the heuristic collectors. All of them are advisory, so any
/// combination is valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CollectorToggles {
    pub visibility: bool,
    pub idle_return: bool,
    pub interaction_tally: bool,
    pub frame_geometry: bool,
}

impl Default for CollectorToggles {
    fn default() -> Self {
        Self {
            visibility: true,
            idle_return: true,
            interaction_tally: true,
            frame_geometry: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Origin prefixes of the payment provider whose messages are accepted.
    pub trusted_origins: Vec<String>,
    /// Own origin announced to the embedded content in the `PARENT_READY` handshake.
    pub host_origin: String,
    /// Navigation target once the payment succeeded.
    pub proposal_path: String,
    pub redirect_delay_ms: u64,
    pub verification_retry_delay_ms: u64,
    pub visibility_debounce_ms: u64,
    pub idle_threshold_secs: u64,
    pub idle_poll_interval_ms: u64,
    pub probe_interval_ms: u64,
    pub prompt_window_secs: u64,
    pub prompt_cooldown_secs: u64,
    /// Combined clicks and focus events after which the tally reports elevated confidence.
    pub interaction_threshold: u32,
    pub confirmation_policy: ConfirmationPolicy,
    pub collectors: CollectorToggles,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            trusted_origins: vec![
                "https://checkout.stripe.com".to_string(),
                "https://js.stripe.com".to_string(),
                "https://pay.example".to_string(),
            ],
            host_origin: "https://app.example".to_string(),
            proposal_path: "/proposal".to_string(),
            redirect_delay_ms: 2_000,
            verification_retry_delay_ms: 1_500,
            visibility_debounce_ms: 1_000,
            idle_threshold_secs: 120,
            idle_poll_interval_ms: 5_000,
            probe_interval_ms: 2_000,
            prompt_window_secs: 60,
            prompt_cooldown_secs: 30,
            interaction_threshold: 3,
            confirmation_policy: ConfirmationPolicy::default(),
            collectors: CollectorToggles::default(),
        }
    }
}

impl EngineConfig {
    /// Loads a configuration from a JSON file. Missing fields fall back to their defaults.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.trusted_origins.iter().all(|o| o.trim().is_empty()) {
            return Err(PaymentError::ConfigError(
                "trusted_origins must name at least one provider origin".to_string(),
            ));
        }
        let intervals = [
            ("idle_poll_interval_ms", self.idle_poll_interval_ms),
            ("probe_interval_ms", self.probe_interval_ms),
            ("prompt_window_secs", self.prompt_window_secs),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, v)| *v == 0) {
            return Err(PaymentError::ConfigError(format!("{name} must be non-zero")));
        }
        Ok(())
    }

    pub fn redirect_delay(&self) -> Duration {
        Duration::from_millis(self.redirect_delay_ms)
    }

    pub fn verification_retry_delay(&self) -> Duration {
        Duration::from_millis(self.verification_retry_delay_ms)
    }

    pub fn visibility_debounce(&self) -> Duration {
        Duration::from_millis(self.visibility_debounce_ms)
    }

    pub fn idle_threshold(&self) -> Duration {
        Duration::from_secs(self.idle_threshold_secs)
    }

    pub fn idle_poll_interval(&self) -> Duration {
        Duration::from_millis(self.idle_poll_interval_ms)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn prompt_window(&self) -> Duration {
        Duration::from_secs(self.prompt_window_secs)
    }

    pub fn prompt_cooldown(&self) -> Duration {
        Duration::from_secs(self.prompt_cooldown_secs)
    }
}
