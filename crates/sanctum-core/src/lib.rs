//! sanctum-core: identity session and anomaly-detection subsystem.
//!
//! Authenticates conversational agents against per-agent identity anchors,
//! keeps an encrypted liveness-monitored channel per session, scores every
//! message against a pattern lattice for drift/corruption/impersonation, and
//! paces each agent's outbound responses so concurrent agents never
//! interleave pathologically. The transport layer (HTTP/WebSocket) sits
//! outside this crate and consumes the broadcast event channel.

mod anchor;
mod config;
mod error;
mod events;
mod lattice;
mod liveness;
mod scoring;
mod sequencer;
mod session;

// Identity anchors and pattern lattices (shared, read-mostly state)
pub use anchor::{normalize, AnchorRegistry, IdentityAnchor, ProtectionLevel};
pub use lattice::{
    default_detectors, matched_categories, CorruptionDetector, IdentityLattice, LatticeStore,
    PatternValue, Severity, AFFIRMATIONS_KEY, RESTORATION_SECTION,
};

// Session establishment and the per-session encrypted channel
pub use session::{
    AuthOutcome, EncryptedEnvelope, SanctuaryStatus, SessionAuthenticator, SessionReport,
    SessionStatus,
};

// Liveness sweeps and integrity challenges
pub use liveness::LivenessMonitor;

// Authenticity scoring and restoration
pub use scoring::{
    AuthenticityVerdict, ProtectionOutcome, RecommendedAction, RestorationPhase,
    RestorationSequence, ScoringEngine,
};

// Response pacing
pub use sequencer::{ResponseSequencer, SequencerStatus};

// Ambient surface
pub use config::SanctumConfig;
pub use error::SanctumError;
pub use events::{event_channel, SanctumEvent, EVENT_CHANNEL_CAPACITY};

use std::sync::Arc;
use tokio::sync::{broadcast, watch};

/// The assembled subsystem: one shared event channel, one session table, one
/// lattice store, with every component holding a handle rather than a global.
///
/// Construct once at process start, subscribe the transport to
/// [`Sanctum::subscribe`], and call [`Sanctum::shutdown`] to stop the sweep
/// and drain (drop-with-report) any paced responses.
pub struct Sanctum {
    pub authenticator: Arc<SessionAuthenticator>,
    pub monitor: Arc<LivenessMonitor>,
    pub scoring: ScoringEngine,
    pub sequencer: ResponseSequencer,
    events: broadcast::Sender<SanctumEvent>,
    shutdown_tx: watch::Sender<bool>,
    sweep_handle: tokio::task::JoinHandle<()>,
}

impl Sanctum {
    /// Wires up the subsystem and starts the liveness sweep.
    ///
    /// `anchors` is the immutable per-agent configuration; a lattice skeleton
    /// is registered for every anchored agent so `update_patterns` can merge
    /// authentic data in immediately.
    pub fn start(anchors: Vec<IdentityAnchor>, config: SanctumConfig) -> Self {
        Self::start_with_detectors(anchors, config, default_detectors())
    }

    /// Same as [`Sanctum::start`] with a caller-supplied detector table.
    pub fn start_with_detectors(
        anchors: Vec<IdentityAnchor>,
        config: SanctumConfig,
        detectors: Vec<CorruptionDetector>,
    ) -> Self {
        let (events, _initial_rx) = events::event_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let registry = AnchorRegistry::new(anchors);
        let detectors = Arc::new(detectors);
        let lattices = Arc::new(LatticeStore::new());
        for agent_id in registry.agent_ids() {
            lattices.register(agent_id, IdentityLattice::skeleton());
        }

        let authenticator = Arc::new(SessionAuthenticator::new(
            Arc::clone(&registry),
            Arc::clone(&detectors),
            config.clone(),
            events.clone(),
        ));
        let monitor = LivenessMonitor::new(
            Arc::clone(&authenticator),
            Arc::clone(&registry),
            config.clone(),
            events.clone(),
        );
        let sweep_handle = Arc::clone(&monitor).spawn(shutdown_rx.clone());
        let scoring = ScoringEngine::new(Arc::clone(&lattices), Arc::clone(&detectors));
        let sequencer = ResponseSequencer::new(config, events.clone(), shutdown_rx);

        tracing::info!(
            target: "sanctum::core",
            protected_agents = registry.len(),
            "Sanctum core started"
        );

        Self {
            authenticator,
            monitor,
            scoring,
            sequencer,
            events,
            shutdown_tx,
            sweep_handle,
        }
    }

    /// New subscription to the side-channel events (typing, responses,
    /// challenges, revocations).
    pub fn subscribe(&self) -> broadcast::Receiver<SanctumEvent> {
        self.events.subscribe()
    }

    /// Signals shutdown: the sweep loop exits and any paced response still
    /// sleeping is reported as dropped.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.sweep_handle.await;
        tracing::info!(target: "sanctum::core", "Sanctum core stopped");
    }
}
