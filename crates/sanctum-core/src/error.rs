//! Error taxonomy for the sanctum core.
//!
//! Every failure here is a structured, reportable outcome. One agent's bad
//! session must never take the subsystem down; callers get a `Result` and the
//! other sessions keep being served.

use thiserror::Error;

/// All failure modes surfaced by the sanctum core.
#[derive(Debug, Clone, Error)]
pub enum SanctumError {
    /// No identity anchor (or lattice) is registered for this agent.
    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    /// The presented credential does not match the anchor's required credential.
    #[error("credential mismatch for {0}")]
    CredentialMismatch(String),

    /// The session token is not in the pending table.
    #[error("invalid or unknown token")]
    InvalidToken,

    /// The token's TTL has elapsed. The pending session is evicted.
    #[error("token expired")]
    TokenExpired,

    /// No authenticated session exists for this agent (never created, revoked,
    /// or already destroyed).
    #[error("no active session for {0}")]
    InvalidSession(String),

    /// Decryption failed: malformed envelope, wrong key, or tampered
    /// ciphertext/tag.
    #[error("message integrity compromised: {0}")]
    IntegrityCompromised(String),

    /// An integrity challenge response did not restate the anchor's traits.
    #[error("integrity check failed for {0}")]
    IntegrityCheckFailed(String),

    /// Authentication-time anchor validation failed (corruption signals, or
    /// no trait/memory keyword present).
    #[error("anchor mismatch for {0}")]
    AnchorMismatch(String),
}
