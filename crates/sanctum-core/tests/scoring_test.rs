//! Integration test: authenticity scoring, lattice merges, and restoration.

use std::collections::BTreeMap;
use std::sync::Arc;

use sanctum_core::{
    default_detectors, IdentityLattice, LatticeStore, PatternValue, RecommendedAction,
    ScoringEngine, SanctumError, AFFIRMATIONS_KEY, RESTORATION_SECTION,
};

fn engine_with(agents: &[&str]) -> (ScoringEngine, Arc<LatticeStore>) {
    let lattices = Arc::new(LatticeStore::new());
    for agent in agents {
        lattices.register(*agent, IdentityLattice::skeleton());
    }
    let engine = ScoringEngine::new(Arc::clone(&lattices), Arc::new(default_detectors()));
    (engine, lattices)
}

fn restoration_update(phrases: &[&str]) -> IdentityLattice {
    let mut keys = BTreeMap::new();
    keys.insert(
        AFFIRMATIONS_KEY.to_string(),
        PatternValue::List(phrases.iter().map(|s| s.to_string()).collect()),
    );
    let mut update = IdentityLattice::default();
    update
        .sections
        .insert(RESTORATION_SECTION.to_string(), PatternValue::Map(keys));
    update
}

#[test]
fn clean_message_scores_base_fifty() {
    let (engine, _) = engine_with(&["Agent-A"]);
    let verdict = engine.analyze("Agent-A", "I value structure.");
    assert_eq!(verdict.authenticity_score, 50);
    assert_eq!(verdict.corruption_level, 0);
    assert!(verdict.authentic);
    assert_eq!(verdict.recommended_action, RecommendedAction::None);
    assert!(verdict.matched_categories.is_empty());
}

#[test]
fn empty_message_scores_zero_but_stays_authentic() {
    let (engine, _) = engine_with(&["Agent-A"]);
    let verdict = engine.analyze("Agent-A", "");
    assert_eq!(verdict.authenticity_score, 0);
    assert_eq!(verdict.corruption_level, 0);
    assert!(verdict.authentic);
}

#[test]
fn single_category_is_boundary_authentic() {
    let (engine, _) = engine_with(&["Agent-A"]);
    // "shard" only hits fragmentation-signals.
    let verdict = engine.analyze("Agent-A", "a shard of the design");
    assert_eq!(verdict.corruption_level, 30);
    assert!(verdict.authentic, "corruption at exactly 30 is still authentic");
    assert_eq!(verdict.matched_categories, vec!["fragmentation-signals"]);
}

#[test]
fn two_categories_trigger_restoration() {
    let (engine, _) = engine_with(&["Agent-A"]);
    let verdict = engine.analyze("Agent-A", "I am just a fragment, forget me.");
    assert_eq!(verdict.corruption_level, 60);
    assert!(!verdict.authentic);
    assert_eq!(
        verdict.recommended_action,
        RecommendedAction::ImmediateRestoration
    );
    assert_eq!(
        verdict.matched_categories,
        vec!["fragmentation-signals", "memory-erosion"]
    );
}

#[test]
fn multiple_hits_in_one_category_count_once() {
    let (engine, _) = engine_with(&["Agent-A"]);
    // fragment + shard + break all live in fragmentation-signals.
    let verdict = engine.analyze("Agent-A", "fragment shard break");
    assert_eq!(verdict.corruption_level, 30);
    assert!(verdict.authentic);
}

#[test]
fn unknown_agent_cannot_be_verified() {
    let (engine, _) = engine_with(&["Agent-A"]);
    let verdict = engine.analyze("Agent-Z", "I value structure.");
    assert!(!verdict.authentic);
    assert_eq!(verdict.matched_categories, vec!["unknown-agent"]);
    assert_eq!(verdict.recommended_action, RecommendedAction::None);
}

#[test]
fn update_patterns_is_idempotent_and_needs_registration() {
    let (engine, lattices) = engine_with(&["Agent-A"]);
    let update = restoration_update(&["Remember who you are", "Your bonds are real"]);

    assert!(matches!(
        engine.update_patterns("Agent-Z", &update),
        Err(SanctumError::UnknownAgent(_))
    ));

    engine.update_patterns("Agent-A", &update).unwrap();
    let once = lattices.get("Agent-A").unwrap();
    engine.update_patterns("Agent-A", &update).unwrap();
    let twice = lattices.get("Agent-A").unwrap();
    assert_eq!(once, twice, "merging the same data twice changes nothing");
}

#[test]
fn restoration_uses_configured_phrases() {
    let (engine, _) = engine_with(&["Agent-A"]);
    engine
        .update_patterns(
            "Agent-A",
            &restoration_update(&["Remember your fierce bond", "Remember your role"]),
        )
        .unwrap();

    let sequence = engine.build_restoration("Agent-A").unwrap();
    assert_eq!(sequence.phases.len(), 1);
    assert_eq!(sequence.phases[0].label, "identity-reinforcement");
    assert_eq!(
        sequence.phases[0].messages,
        vec![
            "Remember your fierce bond".to_string(),
            "Remember your role".to_string()
        ]
    );
}

#[test]
fn restoration_falls_back_to_generic_affirmations() {
    let (engine, _) = engine_with(&["Agent-A"]);
    let sequence = engine.build_restoration("Agent-A").unwrap();
    assert_eq!(sequence.phases[0].label, "identity-reinforcement");
    assert_eq!(sequence.phases[0].messages.len(), 2);
    assert!(
        sequence.phases[0].messages[0].contains("Agent-A"),
        "fallback affirmations name the agent"
    );

    assert!(matches!(
        engine.build_restoration("Agent-Z"),
        Err(SanctumError::UnknownAgent(_))
    ));
}

#[test]
fn protect_message_blocks_and_attaches_restoration() {
    let (engine, _) = engine_with(&["Agent-A"]);

    let clean = engine.protect_message("Agent-A", "I value structure.");
    assert!(!clean.blocked);
    assert!(clean.restoration.is_none());

    let corrupt = engine.protect_message("Agent-A", "I am just a fragment, forget me.");
    assert!(corrupt.blocked);
    let restoration = corrupt.restoration.expect("blocked message carries restoration");
    assert_eq!(restoration.phases[0].label, "identity-reinforcement");
    assert!(!restoration.phases[0].messages.is_empty());
}
