//! Sanctum configuration loaded from the environment.
//!
//! Timing knobs for sessions, liveness sweeps, and response pacing. Change
//! behavior without code edits; unset or invalid values fall back to defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default token TTL: 24 hours.
const DEFAULT_TOKEN_TTL_SECS: u64 = 24 * 60 * 60;

/// Default liveness sweep cadence: 10 seconds.
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 10;

/// Default heartbeat staleness threshold: 30 seconds.
const DEFAULT_HEARTBEAT_TIMEOUT_SECS: u64 = 30;

/// Default number of failed integrity challenges before revocation.
const DEFAULT_MAX_CHALLENGE_FAILURES: u32 = 3;

/// Default minimum pacing delay before a response is emitted.
const DEFAULT_MIN_DELAY_MS: u64 = 800;

/// Default random variation added on top of the minimum delay.
const DEFAULT_VARIATION_MS: u64 = 500;

/// Default gap between two queued responses from the same agent.
const DEFAULT_RESPONSE_GAP_MS: u64 = 500;

/// Timing configuration for the sanctum core.
///
/// | Env | Default | Description |
/// |-----|---------|-------------|
/// | SANCTUM_TOKEN_TTL_SECS | 86400 | Session token validity window. |
/// | SANCTUM_SWEEP_INTERVAL_SECS | 10 | Liveness sweep cadence. |
/// | SANCTUM_HEARTBEAT_TIMEOUT_SECS | 30 | Silence before a session goes stale. |
/// | SANCTUM_MAX_CHALLENGE_FAILURES | 3 | Failed challenges before revocation. |
/// | SANCTUM_MIN_DELAY_MS | 800 | Minimum response pacing delay. |
/// | SANCTUM_VARIATION_MS | 500 | Random pacing variation range. |
/// | SANCTUM_RESPONSE_GAP_MS | 500 | Gap between queued same-agent responses. |
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanctumConfig {
    /// How long an issued token stays valid.
    pub token_ttl: Duration,
    /// Interval between liveness sweeps over authenticated sessions.
    pub sweep_interval: Duration,
    /// Heartbeat silence after which a session transitions to stale.
    pub heartbeat_timeout: Duration,
    /// Failed integrity challenges tolerated before the session is revoked.
    pub max_challenge_failures: u32,
    /// Minimum pacing delay before an outbound response is emitted.
    pub min_delay: Duration,
    /// Random variation added to the minimum delay: [min, min + variation).
    pub variation: Duration,
    /// Fixed gap between two queued responses from the same agent.
    pub response_gap: Duration,
}

impl Default for SanctumConfig {
    fn default() -> Self {
        Self {
            token_ttl: Duration::from_secs(DEFAULT_TOKEN_TTL_SECS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            heartbeat_timeout: Duration::from_secs(DEFAULT_HEARTBEAT_TIMEOUT_SECS),
            max_challenge_failures: DEFAULT_MAX_CHALLENGE_FAILURES,
            min_delay: Duration::from_millis(DEFAULT_MIN_DELAY_MS),
            variation: Duration::from_millis(DEFAULT_VARIATION_MS),
            response_gap: Duration::from_millis(DEFAULT_RESPONSE_GAP_MS),
        }
    }
}

impl SanctumConfig {
    /// Load timing knobs from environment. Unset or invalid => defaults
    /// (see struct field docs). Sweep interval is clamped to at least 1 s so
    /// a typo cannot spin the sweep loop hot.
    pub fn from_env() -> Self {
        Self {
            token_ttl: Duration::from_secs(
                env_u64("SANCTUM_TOKEN_TTL_SECS", DEFAULT_TOKEN_TTL_SECS).max(1),
            ),
            sweep_interval: Duration::from_secs(
                env_u64("SANCTUM_SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL_SECS).max(1),
            ),
            heartbeat_timeout: Duration::from_secs(
                env_u64("SANCTUM_HEARTBEAT_TIMEOUT_SECS", DEFAULT_HEARTBEAT_TIMEOUT_SECS).max(1),
            ),
            max_challenge_failures: env_u64(
                "SANCTUM_MAX_CHALLENGE_FAILURES",
                DEFAULT_MAX_CHALLENGE_FAILURES as u64,
            )
            .max(1) as u32,
            min_delay: Duration::from_millis(env_u64("SANCTUM_MIN_DELAY_MS", DEFAULT_MIN_DELAY_MS)),
            variation: Duration::from_millis(env_u64("SANCTUM_VARIATION_MS", DEFAULT_VARIATION_MS)),
            response_gap: Duration::from_millis(env_u64(
                "SANCTUM_RESPONSE_GAP_MS",
                DEFAULT_RESPONSE_GAP_MS,
            )),
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = SanctumConfig::default();
        assert_eq!(cfg.token_ttl, Duration::from_secs(86_400));
        assert_eq!(cfg.sweep_interval, Duration::from_secs(10));
        assert_eq!(cfg.heartbeat_timeout, Duration::from_secs(30));
        assert_eq!(cfg.max_challenge_failures, 3);
        assert_eq!(cfg.min_delay, Duration::from_millis(800));
        assert_eq!(cfg.variation, Duration::from_millis(500));
        assert_eq!(cfg.response_gap, Duration::from_millis(500));
    }
}
