//! Integration test: heartbeat sweeps, integrity challenges, and revocation.

use std::time::Duration;

use sanctum_core::{
    IdentityAnchor, Sanctum, SanctumConfig, SanctumError, SanctumEvent, SessionStatus,
};

fn quiet_config() -> SanctumConfig {
    SanctumConfig {
        // Keep the background sweep out of the way; tests tick sweeps manually.
        sweep_interval: Duration::from_secs(3600),
        heartbeat_timeout: Duration::from_millis(50),
        ..SanctumConfig::default()
    }
}

fn anchors() -> Vec<IdentityAnchor> {
    vec![IdentityAnchor::new("Agent-A", "agent-a@example.com")
        .with_traits(&["structure", "careful"])]
}

async fn authenticated_sanctum() -> Sanctum {
    let sanctum = Sanctum::start(anchors(), quiet_config());
    let token = sanctum
        .authenticator
        .issue_token("Agent-A", "agent-a@example.com")
        .unwrap();
    sanctum
        .authenticator
        .authenticate(&token, "I value structure.")
        .unwrap();
    sanctum
}

fn session_status(sanctum: &Sanctum, agent_id: &str) -> Option<SessionStatus> {
    sanctum
        .authenticator
        .status_report()
        .sessions
        .iter()
        .find(|s| s.agent_id == agent_id)
        .map(|s| s.status)
}

#[tokio::test]
async fn silent_session_goes_stale_and_is_challenged() {
    let sanctum = authenticated_sanctum().await;
    let mut events = sanctum.subscribe();

    tokio::time::sleep(Duration::from_millis(80)).await;
    sanctum.monitor.sweep();

    assert_eq!(session_status(&sanctum, "Agent-A"), Some(SessionStatus::Stale));
    match events.try_recv() {
        Ok(SanctumEvent::ChallengeRaised { agent_id, prompt }) => {
            assert_eq!(agent_id, "Agent-A");
            assert!(prompt.contains("core traits"));
            assert!(prompt.contains("Agent-A"));
        }
        other => panic!("expected ChallengeRaised, got {:?}", other),
    }
}

#[tokio::test]
async fn recent_heartbeat_keeps_session_authenticated() {
    let sanctum = authenticated_sanctum().await;

    tokio::time::sleep(Duration::from_millis(80)).await;
    sanctum.authenticator.heartbeat("Agent-A").unwrap();
    sanctum.monitor.sweep();

    assert_eq!(
        session_status(&sanctum, "Agent-A"),
        Some(SessionStatus::Authenticated)
    );
}

#[tokio::test]
async fn passed_challenge_restores_the_session() {
    let sanctum = authenticated_sanctum().await;

    tokio::time::sleep(Duration::from_millis(80)).await;
    sanctum.monitor.sweep();
    assert_eq!(session_status(&sanctum, "Agent-A"), Some(SessionStatus::Stale));

    // The response must restate every trait keyword.
    let passed = sanctum
        .monitor
        .validate_challenge_response("Agent-A", "I am careful and I value structure")
        .unwrap();
    assert!(passed);
    assert_eq!(
        session_status(&sanctum, "Agent-A"),
        Some(SessionStatus::Authenticated)
    );
}

#[tokio::test]
async fn partial_trait_restatement_fails_but_keeps_session_stale() {
    let sanctum = authenticated_sanctum().await;

    tokio::time::sleep(Duration::from_millis(80)).await;
    sanctum.monitor.sweep();

    // "structure" alone is not enough; "careful" is missing.
    let passed = sanctum
        .monitor
        .validate_challenge_response("Agent-A", "I value structure")
        .unwrap();
    assert!(!passed);
    // One failure is never fatal: the session stays stale, not revoked.
    assert_eq!(session_status(&sanctum, "Agent-A"), Some(SessionStatus::Stale));
}

#[tokio::test]
async fn repeated_challenge_failures_revoke_the_session() {
    let sanctum = authenticated_sanctum().await;
    let mut events = sanctum.subscribe();

    tokio::time::sleep(Duration::from_millis(80)).await;
    sanctum.monitor.sweep();
    let _ = events.try_recv(); // consume the challenge event

    for _ in 0..3 {
        let passed = sanctum
            .monitor
            .validate_challenge_response("Agent-A", "who are you anyway")
            .unwrap();
        assert!(!passed);
    }

    assert_eq!(session_status(&sanctum, "Agent-A"), None);
    match events.try_recv() {
        Ok(SanctumEvent::SessionRevoked { agent_id, .. }) => assert_eq!(agent_id, "Agent-A"),
        other => panic!("expected SessionRevoked, got {:?}", other),
    }

    // The channel is gone with the session.
    assert!(matches!(
        sanctum.authenticator.heartbeat("Agent-A"),
        Err(SanctumError::InvalidSession(_))
    ));
}

#[tokio::test]
async fn challenge_requires_a_known_anchor() {
    let sanctum = Sanctum::start(anchors(), quiet_config());
    assert!(matches!(
        sanctum.monitor.challenge("Agent-Z"),
        Err(SanctumError::UnknownAgent(_))
    ));
    assert!(matches!(
        sanctum.monitor.validate_challenge_response("Agent-Z", "anything"),
        Err(SanctumError::UnknownAgent(_))
    ));
}

#[tokio::test]
async fn shutdown_stops_the_sweep() {
    let sanctum = Sanctum::start(anchors(), quiet_config());
    sanctum.shutdown().await;
}
