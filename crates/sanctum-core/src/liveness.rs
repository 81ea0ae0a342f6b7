//! Liveness monitor: heartbeat sweeps and integrity challenges.
//!
//! State machine per session: `authenticated` stays authenticated while
//! heartbeats arrive; silence past the timeout makes it `stale` and raises an
//! integrity challenge. A passed challenge restores `authenticated`; failures
//! leave the session stale, and failures past the configured limit revoke it.
//!
//! The sweep runs as an independent background task sharing the session table
//! with the authenticator. It never holds a session row across an await.

use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::anchor::AnchorRegistry;
use crate::config::SanctumConfig;
use crate::error::SanctumError;
use crate::events::SanctumEvent;
use crate::session::SessionAuthenticator;

/// Watches per-session heartbeats and drives the stale/challenge/revoke
/// policy over the authenticator's session table.
pub struct LivenessMonitor {
    authenticator: Arc<SessionAuthenticator>,
    anchors: Arc<AnchorRegistry>,
    config: SanctumConfig,
    events: broadcast::Sender<SanctumEvent>,
}

impl LivenessMonitor {
    pub fn new(
        authenticator: Arc<SessionAuthenticator>,
        anchors: Arc<AnchorRegistry>,
        config: SanctumConfig,
        events: broadcast::Sender<SanctumEvent>,
    ) -> Arc<Self> {
        Arc::new(Self {
            authenticator,
            anchors,
            config,
            events,
        })
    }

    /// Builds the integrity-challenge prompt for an agent: restate your
    /// anchor traits.
    pub fn challenge(&self, agent_id: &str) -> Result<String, SanctumError> {
        if self.anchors.get(agent_id).is_none() {
            return Err(SanctumError::UnknownAgent(agent_id.to_string()));
        }
        Ok(format!("What are your core traits, {}?", agent_id))
    }

    /// Validates a challenge response: every trait keyword in the anchor must
    /// appear (case-insensitive, punctuation-normalized).
    ///
    /// Pass resets the heartbeat and restores `authenticated`. Fail leaves
    /// the session stale and counts toward revocation; a single failure is
    /// never fatal. Returns `Ok(false)` on failure so the caller can report
    /// it without treating the session as gone.
    pub fn validate_challenge_response(
        &self,
        agent_id: &str,
        response: &str,
    ) -> Result<bool, SanctumError> {
        let anchor = self
            .anchors
            .get(agent_id)
            .ok_or_else(|| SanctumError::UnknownAgent(agent_id.to_string()))?;

        if anchor.contains_all_traits(response) {
            self.authenticator.restore_session(agent_id)?;
            info!(
                target: "sanctum::liveness",
                agent_id = %agent_id,
                "Integrity check passed"
            );
            return Ok(true);
        }

        let failures = self.authenticator.record_challenge_failure(agent_id)?;
        warn!(
            target: "sanctum::liveness",
            agent_id = %agent_id,
            failures,
            error = %SanctumError::IntegrityCheckFailed(agent_id.to_string()),
            "Integrity check failed"
        );
        if failures >= self.config.max_challenge_failures {
            self.authenticator
                .revoke(agent_id, "repeated integrity check failures")?;
        }
        Ok(false)
    }

    /// One sweep pass: stale transitions + challenge events, plus expired
    /// pending-token cleanup. Factored out of the loop so tests can tick it
    /// directly.
    pub fn sweep(&self) {
        let timeout_ms = self.config.heartbeat_timeout.as_millis() as i64;
        for agent_id in self.authenticator.mark_stale_sessions(timeout_ms) {
            warn!(
                target: "sanctum::liveness",
                agent_id = %agent_id,
                timeout_secs = self.config.heartbeat_timeout.as_secs(),
                "Lost heartbeat; raising integrity challenge"
            );
            if let Ok(prompt) = self.challenge(&agent_id) {
                let _ = self.events.send(SanctumEvent::ChallengeRaised { agent_id, prompt });
            }
        }

        let evicted = self.authenticator.evict_expired_pending();
        if evicted > 0 {
            debug!(
                target: "sanctum::liveness",
                evicted,
                "Evicted expired pending tokens"
            );
        }
    }

    /// Spawns the recurring sweep. Stops cleanly when `shutdown` flips true.
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        let monitor = self;
        info!(
            target: "sanctum::liveness",
            interval_secs = monitor.config.sweep_interval.as_secs(),
            timeout_secs = monitor.config.heartbeat_timeout.as_secs(),
            "Liveness monitor started"
        );
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(monitor.config.sweep_interval);
            loop {
                tokio::select! {
                    _ = interval.tick() => monitor.sweep(),
                    changed = shutdown.changed() => {
                        // A dropped sender means the process is tearing down.
                        if changed.is_err() || *shutdown.borrow() {
                            info!(target: "sanctum::liveness", "Liveness monitor stopped");
                            break;
                        }
                    }
                }
            }
        })
    }
}
