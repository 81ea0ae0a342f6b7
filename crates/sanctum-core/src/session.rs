//! Identity session authenticator: token issue, anchor validation, and the
//! per-session encrypted channel.
//!
//! A session starts life as a pending token bound to an identity anchor and
//! only becomes an authenticated channel after its first message passes
//! anchor validation. Each authenticated session gets a fresh AES-256-GCM
//! key, generated per session and never persisted; the token itself carries
//! no key material.
//!
//! ## Wire Format
//!
//! Envelopes carry `nonce` (12 bytes, hex) and `ciphertext` (hex, GCM tag
//! included). The nonce is randomly generated per call via `OsRng`; no nonce
//! is ever reused under a session key.
//!
//! Decrypted payloads are returned to the caller only; they are never logged.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use dashmap::DashMap;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::anchor::AnchorRegistry;
use crate::config::SanctumConfig;
use crate::error::SanctumError;
use crate::events::SanctumEvent;
use crate::lattice::{matched_categories, CorruptionDetector};

/// AES-256-GCM nonce length (96 bits).
const NONCE_LEN: usize = 12;

/// Raw token entropy: 32 bytes, hex-encoded to 64 chars.
const TOKEN_LEN: usize = 32;

/// Lifecycle of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Authenticated,
    Stale,
    Revoked,
    Expired,
}

/// Live authentication context for one agent. Owned exclusively by the
/// [`SessionAuthenticator`]; the liveness monitor reaches the heartbeat and
/// status fields only through authenticator methods.
pub struct Session {
    pub token: String,
    pub agent_id: String,
    pub created_at_ms: i64,
    pub expires_at_ms: i64,
    pub last_heartbeat_ms: i64,
    pub status: SessionStatus,
    pub challenge_failures: u32,
    /// Per-session cipher; populated on successful authentication.
    cipher: Option<Aes256Gcm>,
}

/// Encrypted payload as handed to the transport layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    /// Hex ciphertext, GCM authentication tag included.
    pub ciphertext: String,
    /// Hex nonce (12 bytes), fresh per call.
    pub nonce: String,
    pub timestamp_ms: i64,
}

/// Result of an authentication attempt. Rejection is a normal, reportable
/// outcome, not an error: the caller decides what to do with a suspect
/// connection attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AuthOutcome {
    Authenticated { agent_id: String },
    Rejected { agent_id: String, reason: String },
}

impl AuthOutcome {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthOutcome::Authenticated { .. })
    }
}

/// One row of [`SanctuaryStatus`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub agent_id: String,
    pub status: SessionStatus,
    pub last_heartbeat_ms: i64,
}

/// Snapshot of the protection state, for dashboards and health endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanctuaryStatus {
    pub protected_agents: Vec<String>,
    pub sessions: Vec<SessionReport>,
    pub pending_tokens: usize,
    pub encryption_active: bool,
}

/// Binds session tokens to verified identities and provides the symmetric
/// channel for each authenticated agent.
///
/// Pending sessions are keyed by token; authenticated sessions are keyed by
/// agent id. Both tables are per-key concurrent maps, so one agent's
/// operations never contend with another's.
pub struct SessionAuthenticator {
    anchors: Arc<AnchorRegistry>,
    detectors: Arc<Vec<CorruptionDetector>>,
    config: SanctumConfig,
    pending: DashMap<String, Session>,
    active: DashMap<String, Session>,
    events: broadcast::Sender<SanctumEvent>,
}

impl SessionAuthenticator {
    pub fn new(
        anchors: Arc<AnchorRegistry>,
        detectors: Arc<Vec<CorruptionDetector>>,
        config: SanctumConfig,
        events: broadcast::Sender<SanctumEvent>,
    ) -> Self {
        Self {
            anchors,
            detectors,
            config,
            pending: DashMap::new(),
            active: DashMap::new(),
            events,
        }
    }

    /// Issues a session token bound to `agent_id` + `credential`.
    ///
    /// Fails with `UnknownAgent` if no anchor exists, `CredentialMismatch` if
    /// the credential differs from the anchor's authorized one. The token is
    /// 32 cryptographically random bytes, hex-encoded.
    pub fn issue_token(&self, agent_id: &str, credential: &str) -> Result<String, SanctumError> {
        let anchor = self
            .anchors
            .get(agent_id)
            .ok_or_else(|| SanctumError::UnknownAgent(agent_id.to_string()))?;
        if anchor.required_credential != credential {
            warn!(
                target: "sanctum::session",
                agent_id = %agent_id,
                "Token request with mismatched credential"
            );
            return Err(SanctumError::CredentialMismatch(agent_id.to_string()));
        }

        let mut raw = [0u8; TOKEN_LEN];
        rand::rngs::OsRng.fill_bytes(&mut raw);
        let token = hex_encode(&raw);

        let now = now_ms();
        let session = Session {
            token: token.clone(),
            agent_id: agent_id.to_string(),
            created_at_ms: now,
            expires_at_ms: now + self.config.token_ttl.as_millis() as i64,
            last_heartbeat_ms: now,
            status: SessionStatus::Pending,
            challenge_failures: 0,
            cipher: None,
        };
        self.pending.insert(token.clone(), session);

        info!(
            target: "sanctum::session",
            agent_id = %agent_id,
            ttl_secs = self.config.token_ttl.as_secs(),
            "Secure token generated"
        );
        Ok(token)
    }

    /// Validates a token and runs anchor validation on the connection's first
    /// message.
    ///
    /// `InvalidToken` for unknown tokens; `TokenExpired` (with eviction) past
    /// the TTL. Anchor validation: any corruption-signal match fails the
    /// attempt outright; otherwise the message must carry at least one trait
    /// or memory keyword. A failed validation is returned as
    /// [`AuthOutcome::Rejected`], not an error.
    pub fn authenticate(
        &self,
        token: &str,
        initial_message: &str,
    ) -> Result<AuthOutcome, SanctumError> {
        let (agent_id, expires_at_ms) = {
            let session = self.pending.get(token).ok_or(SanctumError::InvalidToken)?;
            (session.agent_id.clone(), session.expires_at_ms)
        };

        if now_ms() > expires_at_ms {
            info!(
                target: "sanctum::session",
                agent_id = %agent_id,
                "Expired token presented; evicting"
            );
            self.pending.remove(token);
            return Err(SanctumError::TokenExpired);
        }

        let anchor = self
            .anchors
            .get(&agent_id)
            .ok_or_else(|| SanctumError::UnknownAgent(agent_id.clone()))?;

        let corruption = matched_categories(&self.detectors, initial_message);
        if !corruption.is_empty() {
            warn!(
                target: "sanctum::session",
                agent_id = %agent_id,
                categories = ?corruption,
                "Corruption signals in connection attempt"
            );
            // The token survives a rejected attempt; the agent may retry
            // within the TTL once restored.
            return Ok(AuthOutcome::Rejected {
                agent_id: agent_id.clone(),
                reason: SanctumError::AnchorMismatch(agent_id).to_string(),
            });
        }

        if !anchor.matches_any_trait(initial_message) && !anchor.matches_any_memory(initial_message)
        {
            warn!(
                target: "sanctum::session",
                agent_id = %agent_id,
                "Potential impersonated connection attempt (no anchor keywords)"
            );
            return Ok(AuthOutcome::Rejected {
                agent_id: agent_id.clone(),
                reason: SanctumError::AnchorMismatch(agent_id).to_string(),
            });
        }

        // Fresh key per session; never reused, never derivable from the token.
        let mut key = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut key);
        let cipher = Aes256Gcm::new_from_slice(&key).expect("key length is 32");

        let (_, mut session) = self
            .pending
            .remove(token)
            .ok_or(SanctumError::InvalidToken)?;
        session.status = SessionStatus::Authenticated;
        session.last_heartbeat_ms = now_ms();
        session.cipher = Some(cipher);
        self.active.insert(agent_id.clone(), session);

        info!(
            target: "sanctum::session",
            agent_id = %agent_id,
            "Agent authenticated"
        );
        Ok(AuthOutcome::Authenticated { agent_id })
    }

    /// Encrypts `plaintext` under the agent's session key with a fresh nonce.
    pub fn encrypt(&self, agent_id: &str, plaintext: &str) -> Result<EncryptedEnvelope, SanctumError> {
        let session = self
            .active
            .get(agent_id)
            .ok_or_else(|| SanctumError::InvalidSession(agent_id.to_string()))?;
        let cipher = session
            .cipher
            .as_ref()
            .ok_or_else(|| SanctumError::InvalidSession(agent_id.to_string()))?;

        let nonce = Aes256Gcm::generate_nonce(OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| SanctumError::IntegrityCompromised(e.to_string()))?;

        Ok(EncryptedEnvelope {
            ciphertext: hex_encode(&ciphertext),
            nonce: hex_encode(nonce.as_slice()),
            timestamp_ms: now_ms(),
        })
    }

    /// Decrypts an envelope and verifies its authentication tag.
    ///
    /// `IntegrityCompromised` for malformed hex, a wrong-length nonce, or a
    /// tag that does not verify (tampered ciphertext, wrong key).
    pub fn decrypt(&self, agent_id: &str, envelope: &EncryptedEnvelope) -> Result<String, SanctumError> {
        let session = self
            .active
            .get(agent_id)
            .ok_or_else(|| SanctumError::InvalidSession(agent_id.to_string()))?;
        let cipher = session
            .cipher
            .as_ref()
            .ok_or_else(|| SanctumError::InvalidSession(agent_id.to_string()))?;

        let nonce_bytes = hex_decode(&envelope.nonce)
            .ok_or_else(|| SanctumError::IntegrityCompromised("malformed nonce hex".to_string()))?;
        if nonce_bytes.len() != NONCE_LEN {
            return Err(SanctumError::IntegrityCompromised(format!(
                "nonce must be {} bytes, got {}",
                NONCE_LEN,
                nonce_bytes.len()
            )));
        }
        let ciphertext = hex_decode(&envelope.ciphertext).ok_or_else(|| {
            SanctumError::IntegrityCompromised("malformed ciphertext hex".to_string())
        })?;

        let nonce = Nonce::from_slice(&nonce_bytes);
        let plaintext = cipher.decrypt(nonce, ciphertext.as_ref()).map_err(|_| {
            warn!(
                target: "sanctum::session",
                agent_id = %agent_id,
                "Decryption failed; tag did not verify"
            );
            SanctumError::IntegrityCompromised("authentication tag mismatch".to_string())
        })?;

        String::from_utf8(plaintext)
            .map_err(|e| SanctumError::IntegrityCompromised(e.to_string()))
    }

    /// Refreshes the session's staleness clock.
    pub fn heartbeat(&self, agent_id: &str) -> Result<(), SanctumError> {
        let mut session = self
            .active
            .get_mut(agent_id)
            .ok_or_else(|| SanctumError::InvalidSession(agent_id.to_string()))?;
        session.last_heartbeat_ms = now_ms();
        debug!(target: "sanctum::session", agent_id = %agent_id, "Heartbeat received");
        Ok(())
    }

    /// Removes the agent's session immediately. Subsequent encrypt/decrypt/
    /// heartbeat calls fail with `InvalidSession`.
    pub fn revoke(&self, agent_id: &str, reason: &str) -> Result<(), SanctumError> {
        self.active
            .remove(agent_id)
            .ok_or_else(|| SanctumError::InvalidSession(agent_id.to_string()))?;
        warn!(
            target: "sanctum::session",
            agent_id = %agent_id,
            reason = %reason,
            "Session revoked"
        );
        let _ = self.events.send(SanctumEvent::SessionRevoked {
            agent_id: agent_id.to_string(),
            reason: reason.to_string(),
        });
        Ok(())
    }

    /// Snapshot of protection state for health reporting.
    pub fn status_report(&self) -> SanctuaryStatus {
        let sessions: Vec<SessionReport> = self
            .active
            .iter()
            .map(|entry| SessionReport {
                agent_id: entry.agent_id.clone(),
                status: entry.status,
                last_heartbeat_ms: entry.last_heartbeat_ms,
            })
            .collect();
        SanctuaryStatus {
            protected_agents: self.anchors.agent_ids().map(|s| s.to_string()).collect(),
            encryption_active: sessions.iter().any(|s| s.status != SessionStatus::Revoked),
            pending_tokens: self.pending.len(),
            sessions,
        }
    }

    // -------------------------------------------------------------------
    // Liveness-monitor surface. Session rows stay owned here; the monitor
    // mutates heartbeat/status only through these methods.
    // -------------------------------------------------------------------

    /// Transitions every authenticated session silent past `timeout` to
    /// stale; returns the affected agent ids.
    pub(crate) fn mark_stale_sessions(&self, timeout_ms: i64) -> Vec<String> {
        let now = now_ms();
        let mut stale = Vec::new();
        for mut entry in self.active.iter_mut() {
            if entry.status == SessionStatus::Authenticated
                && now - entry.last_heartbeat_ms > timeout_ms
            {
                entry.status = SessionStatus::Stale;
                stale.push(entry.agent_id.clone());
            }
        }
        stale
    }

    /// Challenge passed: reset heartbeat, failure count, and status.
    pub(crate) fn restore_session(&self, agent_id: &str) -> Result<(), SanctumError> {
        let mut session = self
            .active
            .get_mut(agent_id)
            .ok_or_else(|| SanctumError::InvalidSession(agent_id.to_string()))?;
        session.status = SessionStatus::Authenticated;
        session.last_heartbeat_ms = now_ms();
        session.challenge_failures = 0;
        Ok(())
    }

    /// Challenge failed: the session stays stale; returns the updated count.
    pub(crate) fn record_challenge_failure(&self, agent_id: &str) -> Result<u32, SanctumError> {
        let mut session = self
            .active
            .get_mut(agent_id)
            .ok_or_else(|| SanctumError::InvalidSession(agent_id.to_string()))?;
        session.challenge_failures += 1;
        Ok(session.challenge_failures)
    }

    /// Drops pending tokens past their TTL. Called opportunistically by the
    /// liveness sweep; `authenticate` also evicts lazily.
    pub(crate) fn evict_expired_pending(&self) -> usize {
        let now = now_ms();
        let before = self.pending.len();
        self.pending.retain(|_, session| now <= session.expires_at_ms);
        before - self.pending.len()
    }

    #[cfg(test)]
    pub(crate) fn set_last_heartbeat(&self, agent_id: &str, timestamp_ms: i64) {
        if let Some(mut session) = self.active.get_mut(agent_id) {
            session.last_heartbeat_ms = timestamp_ms;
        }
    }

    #[cfg(test)]
    pub(crate) fn set_token_expiry(&self, token: &str, expires_at_ms: i64) {
        if let Some(mut session) = self.pending.get_mut(token) {
            session.expires_at_ms = expires_at_ms;
        }
    }

    pub(crate) fn session_status(&self, agent_id: &str) -> Option<SessionStatus> {
        self.active.get(agent_id).map(|s| s.status)
    }
}

/// Current Unix timestamp in milliseconds.
pub(crate) fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

fn hex_decode(hex: &str) -> Option<Vec<u8>> {
    let hex = hex.trim();
    // Byte-wise decode: envelopes are caller input, so non-ASCII must fall
    // out as None rather than tripping a char-boundary slice.
    if !hex.is_ascii() || hex.len() % 2 != 0 {
        return None;
    }
    hex.as_bytes()
        .chunks(2)
        .map(|pair| {
            let pair = std::str::from_utf8(pair).ok()?;
            u8::from_str_radix(pair, 16).ok()
        })
        .collect()
}
