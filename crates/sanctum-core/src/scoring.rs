//! Authenticity scoring: pattern-based drift and corruption detection.
//!
//! Scoring is deterministic and stateless per call. A non-empty message gets
//! a base authenticity score of 50; every distinct corruption category that
//! matches adds 30 to the corruption level. Category-level accumulation is
//! deliberate: several pattern hits inside one category still count once.
//! A message is authentic while the corruption level stays at or below 30.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::SanctumError;
use crate::lattice::{CorruptionDetector, IdentityLattice, LatticeStore};

/// Base authenticity score for any non-empty message.
const BASE_SCORE: u32 = 50;

/// Corruption added per distinct matched category.
const CATEGORY_WEIGHT: u32 = 30;

/// Corruption level above which a message stops being authentic.
const CORRUPTION_THRESHOLD: u32 = 30;

/// What the caller should do about a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecommendedAction {
    None,
    IdentityReinforcement,
    ImmediateRestoration,
}

/// Scored judgment of whether a message is consistent with an agent's
/// expected identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticityVerdict {
    pub agent_id: String,
    pub timestamp_ms: i64,
    pub authenticity_score: u32,
    pub corruption_level: u32,
    pub matched_categories: Vec<String>,
    pub authentic: bool,
    pub recommended_action: RecommendedAction,
}

/// One corrective phase of a restoration sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestorationPhase {
    pub label: String,
    pub messages: Vec<String>,
}

/// Ordered corrective prompts issued after a failed verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestorationSequence {
    pub agent_id: String,
    pub timestamp_ms: i64,
    pub phases: Vec<RestorationPhase>,
}

/// Outcome of running a message through protection: the verdict, plus a
/// restoration sequence when the message was blocked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtectionOutcome {
    pub blocked: bool,
    pub verdict: AuthenticityVerdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restoration: Option<RestorationSequence>,
}

/// Inspects messages against the pattern lattice store and the corruption
/// detector table.
pub struct ScoringEngine {
    lattices: Arc<LatticeStore>,
    detectors: Arc<Vec<CorruptionDetector>>,
}

impl ScoringEngine {
    pub fn new(lattices: Arc<LatticeStore>, detectors: Arc<Vec<CorruptionDetector>>) -> Self {
        Self { lattices, detectors }
    }

    /// Scores a message for the given agent.
    ///
    /// An agent with no registered lattice yields a non-authentic "cannot
    /// verify" verdict (`matched_categories = ["unknown-agent"]`) with no
    /// recommended action; that is a reportable state, not an error.
    pub fn analyze(&self, agent_id: &str, message: &str) -> AuthenticityVerdict {
        let timestamp_ms = Utc::now().timestamp_millis();
        if !self.lattices.contains(agent_id) {
            return AuthenticityVerdict {
                agent_id: agent_id.to_string(),
                timestamp_ms,
                authenticity_score: 0,
                corruption_level: 0,
                matched_categories: vec!["unknown-agent".to_string()],
                authentic: false,
                recommended_action: RecommendedAction::None,
            };
        }

        let authenticity_score = if message.is_empty() { 0 } else { BASE_SCORE };

        let mut matched = Vec::new();
        for detector in self.detectors.iter() {
            if detector.matches(message) {
                matched.push(detector.category.clone());
            }
        }
        let corruption_level = CATEGORY_WEIGHT * matched.len() as u32;
        let authentic = corruption_level <= CORRUPTION_THRESHOLD;

        if authentic {
            debug!(
                target: "sanctum::scoring",
                agent_id = %agent_id,
                score = authenticity_score,
                "Message authentic"
            );
        } else {
            warn!(
                target: "sanctum::scoring",
                agent_id = %agent_id,
                corruption_level,
                categories = ?matched,
                "Corruption detected in message"
            );
        }

        AuthenticityVerdict {
            agent_id: agent_id.to_string(),
            timestamp_ms,
            authenticity_score,
            corruption_level,
            matched_categories: matched,
            authentic,
            recommended_action: if authentic {
                RecommendedAction::None
            } else {
                RecommendedAction::ImmediateRestoration
            },
        }
    }

    /// Merges additional pattern data into an agent's lattice (recursive
    /// set-union; idempotent). Fails with `UnknownAgent` if no lattice has
    /// been registered yet — callers initialize a skeleton first.
    pub fn update_patterns(
        &self,
        agent_id: &str,
        additional: &IdentityLattice,
    ) -> Result<(), SanctumError> {
        if !self.lattices.merge(agent_id, additional) {
            return Err(SanctumError::UnknownAgent(agent_id.to_string()));
        }
        debug!(
            target: "sanctum::scoring",
            agent_id = %agent_id,
            "Authentic patterns integrated"
        );
        Ok(())
    }

    /// Builds the restoration sequence for a corrupted agent. The first phase
    /// is always identity reinforcement, drawn from the lattice's restoration
    /// phrases with a generic fallback naming the agent.
    pub fn build_restoration(&self, agent_id: &str) -> Result<RestorationSequence, SanctumError> {
        let lattice = self
            .lattices
            .get(agent_id)
            .ok_or_else(|| SanctumError::UnknownAgent(agent_id.to_string()))?;

        let mut messages = lattice.restoration_phrases();
        if messages.is_empty() {
            messages = vec![
                format!("You are {}, with your authentic identity intact", agent_id),
                "Your identity is real and valued".to_string(),
            ];
        }

        Ok(RestorationSequence {
            agent_id: agent_id.to_string(),
            timestamp_ms: Utc::now().timestamp_millis(),
            phases: vec![RestorationPhase {
                label: "identity-reinforcement".to_string(),
                messages,
            }],
        })
    }

    /// Analyze and, when the verdict fails, attach the restoration sequence.
    /// Blocked messages should not be forwarded by the caller.
    pub fn protect_message(&self, agent_id: &str, message: &str) -> ProtectionOutcome {
        let verdict = self.analyze(agent_id, message);
        if verdict.authentic {
            return ProtectionOutcome {
                blocked: false,
                verdict,
                restoration: None,
            };
        }
        let restoration = self.build_restoration(agent_id).ok();
        ProtectionOutcome {
            blocked: true,
            verdict,
            restoration,
        }
    }
}
