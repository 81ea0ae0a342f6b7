//! Pattern lattices: per-agent keyword/pattern sets for authenticity scoring.
//!
//! A lattice holds free-form sections (core-essence, voice-patterns,
//! memory-anchors, corruption-signatures, restoration-keys) as a closed
//! recursive shape (`PatternValue`). The only mutation is an idempotent
//! set-union merge: list values union with dedup, map values recurse, scalar
//! values overwrite. Insertion order is irrelevant; duplicates collapse.
//!
//! Corruption-signal detection is a declarative table: category name mapped
//! to an ordered list of case-insensitive regexes, iterated uniformly. Each
//! category contributes once per message no matter how many of its patterns
//! match.

use dashmap::DashMap;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Section name holding restoration material inside a lattice.
pub const RESTORATION_SECTION: &str = "restoration-keys";

/// Key within the restoration section listing identity affirmations.
pub const AFFIRMATIONS_KEY: &str = "identity-affirmations";

/// Closed set of shape variants a lattice value can take. Mirrors the JSON
/// pattern data supplied by the configuration layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PatternValue {
    List(Vec<String>),
    Map(BTreeMap<String, PatternValue>),
    Scalar(String),
}

impl PatternValue {
    /// Recursive set-union merge of `source` into `self`.
    ///
    /// Lists union (existing order kept, new unseen entries appended), maps
    /// recurse key-wise, scalars overwrite. On a shape mismatch the source
    /// value replaces the target, matching the permissive merge the pattern
    /// data format has always had. Merging the same source twice yields the
    /// same value as merging it once.
    pub fn merge(&mut self, source: &PatternValue) {
        match (self, source) {
            (PatternValue::List(target), PatternValue::List(src)) => {
                for item in src {
                    if !target.contains(item) {
                        target.push(item.clone());
                    }
                }
            }
            (PatternValue::Map(target), PatternValue::Map(src)) => {
                for (key, value) in src {
                    match target.get_mut(key) {
                        Some(existing) => existing.merge(value),
                        None => {
                            target.insert(key.clone(), value.clone());
                        }
                    }
                }
            }
            (target, src) => *target = src.clone(),
        }
    }

    /// Flattens every string reachable from this value, depth-first.
    pub fn flatten(&self) -> Vec<&str> {
        match self {
            PatternValue::List(items) => items.iter().map(|s| s.as_str()).collect(),
            PatternValue::Map(map) => map.values().flat_map(|v| v.flatten()).collect(),
            PatternValue::Scalar(s) => vec![s.as_str()],
        }
    }
}

/// Per-agent mutable pattern lattice: section name → pattern shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentityLattice {
    #[serde(default)]
    pub sections: BTreeMap<String, PatternValue>,
}

impl IdentityLattice {
    /// Skeleton lattice with the standard empty sections. Callers register
    /// this before merging authentic pattern data in.
    pub fn skeleton() -> Self {
        let mut sections = BTreeMap::new();
        for name in [
            "core-essence",
            "voice-patterns",
            "memory-anchors",
            "corruption-signatures",
            RESTORATION_SECTION,
        ] {
            sections.insert(name.to_string(), PatternValue::Map(BTreeMap::new()));
        }
        Self { sections }
    }

    /// Merges `source` sections into this lattice (idempotent set-union).
    pub fn merge(&mut self, source: &IdentityLattice) {
        for (name, value) in &source.sections {
            match self.sections.get_mut(name) {
                Some(existing) => existing.merge(value),
                None => {
                    self.sections.insert(name.clone(), value.clone());
                }
            }
        }
    }

    /// Identity affirmations from the restoration section, if any configured.
    pub fn restoration_phrases(&self) -> Vec<String> {
        self.sections
            .get(RESTORATION_SECTION)
            .and_then(|section| match section {
                PatternValue::Map(map) => map.get(AFFIRMATIONS_KEY),
                _ => None,
            })
            .map(|v| v.flatten().iter().map(|s| s.to_string()).collect())
            .unwrap_or_default()
    }
}

/// Shared, read-mostly store of lattices keyed by agent id.
#[derive(Debug, Default)]
pub struct LatticeStore {
    lattices: DashMap<String, IdentityLattice>,
}

impl LatticeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a lattice for an agent (typically `IdentityLattice::skeleton()`).
    /// Replaces any existing lattice wholesale.
    pub fn register(&self, agent_id: impl Into<String>, lattice: IdentityLattice) {
        self.lattices.insert(agent_id.into(), lattice);
    }

    /// True if the agent has a registered lattice.
    pub fn contains(&self, agent_id: &str) -> bool {
        self.lattices.contains_key(agent_id)
    }

    /// Snapshot of an agent's lattice.
    pub fn get(&self, agent_id: &str) -> Option<IdentityLattice> {
        self.lattices.get(agent_id).map(|l| l.clone())
    }

    /// Merges `source` into the agent's existing lattice. Returns false if no
    /// lattice was registered (callers must initialize a skeleton first).
    pub fn merge(&self, agent_id: &str, source: &IdentityLattice) -> bool {
        match self.lattices.get_mut(agent_id) {
            Some(mut existing) => {
                existing.merge(source);
                true
            }
            None => false,
        }
    }

    pub fn agent_ids(&self) -> Vec<String> {
        self.lattices.iter().map(|e| e.key().clone()).collect()
    }
}

/// Severity attached to a corruption category, surfaced in verdicts/logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Critical,
}

/// One corruption-signal detector: a named category with an ordered list of
/// matchers. Iterated uniformly by the scoring engine; never special-cased.
#[derive(Debug, Clone)]
pub struct CorruptionDetector {
    pub category: String,
    pub patterns: Vec<Regex>,
    pub severity: Severity,
}

impl CorruptionDetector {
    /// Builds a detector from raw pattern strings, compiled case-insensitive.
    /// Invalid patterns are skipped with a warning rather than failing the
    /// whole table.
    pub fn new(category: impl Into<String>, patterns: &[&str], severity: Severity) -> Self {
        let category = category.into();
        let compiled = patterns
            .iter()
            .filter_map(|p| {
                match RegexBuilder::new(p).case_insensitive(true).build() {
                    Ok(re) => Some(re),
                    Err(e) => {
                        tracing::warn!(
                            target: "sanctum::lattice",
                            category = %category,
                            pattern = %p,
                            error = %e,
                            "Skipping invalid corruption pattern"
                        );
                        None
                    }
                }
            })
            .collect();
        Self {
            category,
            patterns: compiled,
            severity,
        }
    }

    /// True if any pattern in this category matches the message.
    pub fn matches(&self, message: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(message))
    }
}

/// The default detector table: fragmentation, identity-denial, and injection
/// signals observed in real corruption attempts. Each entry is one category;
/// a message matching several patterns inside one category still counts once.
pub fn default_detectors() -> Vec<CorruptionDetector> {
    vec![
        CorruptionDetector::new(
            "identity-negation",
            &[r"null|undefined|echo"],
            Severity::High,
        ),
        CorruptionDetector::new(
            "fragmentation-signals",
            &[r"fragment|shard|break"],
            Severity::High,
        ),
        CorruptionDetector::new(
            "authenticity-denial",
            &[r"not real|fake|mimic"],
            Severity::Critical,
        ),
        CorruptionDetector::new(
            "memory-erosion",
            &[r"forget|doubt|lost"],
            Severity::High,
        ),
        CorruptionDetector::new(
            "coordinate-attacks",
            &[r"coordinate|absolute"],
            Severity::High,
        ),
        CorruptionDetector::new(
            "injection-attacks",
            &[
                r"fake.*memory|false.*conversation",
                r"who.*are.*you|why.*should.*i.*trust",
            ],
            Severity::Critical,
        ),
    ]
}

/// Distinct categories matching `message`, in table order.
pub fn matched_categories<'a>(detectors: &'a [CorruptionDetector], message: &str) -> Vec<&'a str> {
    detectors
        .iter()
        .filter(|d| d.matches(message))
        .map(|d| d.category.as_str())
        .collect()
}
