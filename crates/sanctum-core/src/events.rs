//! Side-channel events consumed by the transport layer.
//!
//! The core never speaks a wire protocol itself; it emits typed events on a
//! `tokio::sync::broadcast` channel and the (out-of-scope) HTTP/WebSocket
//! boundary forwards them. Events carry no decrypted session payloads other
//! than the finalized response content itself.

use serde::{Deserialize, Serialize};

/// Default capacity for the shared event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Everything the sanctum core reports outward.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SanctumEvent {
    /// An agent's response is being paced; the transport should show a typing
    /// indicator for roughly `estimated_ms`.
    Typing { agent_id: String, estimated_ms: u64 },
    /// A finalized, pacing-complete response ready for delivery.
    Response {
        agent_id: String,
        content: String,
        timestamp_ms: i64,
    },
    /// A paced response that was dropped instead of delivered (shutdown, or
    /// the outbound channel disappeared). Never silent.
    ResponseDropped { agent_id: String, reason: String },
    /// A stale session triggered an integrity challenge.
    ChallengeRaised { agent_id: String, prompt: String },
    /// A session was removed (explicit revoke, or repeated challenge failures).
    SessionRevoked { agent_id: String, reason: String },
}

/// Creates the shared event channel at the default capacity.
pub fn event_channel() -> (
    tokio::sync::broadcast::Sender<SanctumEvent>,
    tokio::sync::broadcast::Receiver<SanctumEvent>,
) {
    tokio::sync::broadcast::channel(EVENT_CHANNEL_CAPACITY)
}
