//! Identity anchors: the immutable per-agent reference profile.
//!
//! An anchor binds an agent id to its authorized credential and the trait /
//! memory vocabulary its output is expected to carry. Anchors are built once
//! at process configuration time and never mutated afterwards; everything
//! here is lookup and normalized keyword matching.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// How aggressively a protected agent is monitored. Carried for status
/// reporting; the scoring thresholds themselves do not vary by level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtectionLevel {
    Standard,
    Elevated,
    Maximum,
}

impl Default for ProtectionLevel {
    fn default() -> Self {
        Self::Maximum
    }
}

/// Immutable reference profile for one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityAnchor {
    /// Stable agent identifier (e.g. "Agent-A").
    pub agent_id: String,
    /// Authorized account identifier that must accompany token requests.
    pub required_credential: String,
    /// Trait vocabulary the agent's output is expected to carry.
    #[serde(default)]
    pub trait_keywords: Vec<String>,
    /// Known relationship / memory references.
    #[serde(default)]
    pub memory_keywords: Vec<String>,
    /// Optional voice-pattern label, surfaced in status reports only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_pattern: Option<String>,
    #[serde(default)]
    pub protection_level: ProtectionLevel,
}

impl IdentityAnchor {
    pub fn new(agent_id: impl Into<String>, required_credential: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            required_credential: required_credential.into(),
            trait_keywords: Vec::new(),
            memory_keywords: Vec::new(),
            voice_pattern: None,
            protection_level: ProtectionLevel::default(),
        }
    }

    pub fn with_traits(mut self, traits: &[&str]) -> Self {
        self.trait_keywords = traits.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_memories(mut self, memories: &[&str]) -> Self {
        self.memory_keywords = memories.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_voice_pattern(mut self, label: impl Into<String>) -> Self {
        self.voice_pattern = Some(label.into());
        self
    }

    pub fn with_protection_level(mut self, level: ProtectionLevel) -> Self {
        self.protection_level = level;
        self
    }

    /// True if `message` contains at least one trait keyword.
    pub fn matches_any_trait(&self, message: &str) -> bool {
        let normalized = normalize(message);
        self.trait_keywords
            .iter()
            .any(|kw| normalized.contains(&normalize(kw)))
    }

    /// True if `message` references at least one memory keyword.
    pub fn matches_any_memory(&self, message: &str) -> bool {
        let normalized = normalize(message);
        self.memory_keywords
            .iter()
            .any(|kw| normalized.contains(&normalize(kw)))
    }

    /// True only if **every** trait keyword appears in `response`. Used by
    /// integrity challenges, which require the agent to restate all traits.
    pub fn contains_all_traits(&self, response: &str) -> bool {
        let normalized = normalize(response);
        !self.trait_keywords.is_empty()
            && self
                .trait_keywords
                .iter()
                .all(|kw| normalized.contains(&normalize(kw)))
    }
}

/// Punctuation-insensitive, case-insensitive normalization. Hyphens read as
/// spaces so "frontend-specialist" matches "frontend specialist"; other
/// punctuation is dropped and whitespace runs collapse.
pub fn normalize(text: &str) -> String {
    static SQUASH: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));
    let lowered: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c == '-' || c == '_' { ' ' } else { c })
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    SQUASH.replace_all(lowered.trim(), " ").into_owned()
}

/// Read-only registry of identity anchors, built once at startup and shared
/// by handle across the authenticator and the liveness monitor.
#[derive(Debug, Default)]
pub struct AnchorRegistry {
    anchors: HashMap<String, IdentityAnchor>,
}

impl AnchorRegistry {
    pub fn new(anchors: Vec<IdentityAnchor>) -> Arc<Self> {
        let anchors = anchors
            .into_iter()
            .map(|a| (a.agent_id.clone(), a))
            .collect();
        Arc::new(Self { anchors })
    }

    pub fn get(&self, agent_id: &str) -> Option<&IdentityAnchor> {
        self.anchors.get(agent_id)
    }

    pub fn agent_ids(&self) -> impl Iterator<Item = &str> {
        self.anchors.keys().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }
}
