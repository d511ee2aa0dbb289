mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::FakeBackend;
use deskpilot::errors::DeskPilotError;
use deskpilot::sandbox::manager::SessionManager;
use deskpilot::sandbox::session::SessionStatus;
use deskpilot::sandbox::types::{Credential, Resolution, SandboxConfig};

fn manager(backend: &Arc<FakeBackend>) -> SessionManager {
    SessionManager::new(backend.clone(), Credential::new("test-key")).unwrap()
}

fn sandbox_config() -> SandboxConfig {
    SandboxConfig {
        template: "desktop".into(),
        resolution: Resolution { width: 800, height: 600 },
        dpi: 96,
        auth_enabled: false,
        initial_timeout: Duration::from_secs(300),
    }
}

#[test]
fn missing_credential_is_config_error() {
    let backend = Arc::new(FakeBackend::default());
    let err = SessionManager::new(backend, Credential::new("")).unwrap_err();
    assert!(matches!(err, DeskPilotError::Config(_)));
}

#[tokio::test]
async fn create_leaves_exactly_one_running_session() {
    let backend = Arc::new(FakeBackend::default());
    let stale_a = backend.seed_running("stale-a");
    let stale_b = backend.seed_running("stale-b");
    let sessions = manager(&backend);

    let first = sessions.create(&sandbox_config()).await.unwrap();
    assert!(!stale_a.is_alive() && !stale_b.is_alive());
    assert_eq!(sessions.list_active().await.len(), 1);

    let second = sessions.create(&sandbox_config()).await.unwrap();
    let running: Vec<String> = sessions.list_active().await.into_iter().map(|r| r.id).collect();
    assert_eq!(running, vec![second.id.clone()]);

    assert_eq!(
        sessions.session(&first.id).await.unwrap().status,
        SessionStatus::Terminated
    );
    assert_eq!(
        sessions.session(&second.id).await.unwrap().status,
        SessionStatus::Active
    );
    assert_eq!(sessions.active().await.unwrap().id, second.id);
    assert_eq!(second.resolution, Resolution { width: 800, height: 600 });
}

#[tokio::test]
async fn listing_failure_does_not_block_create() {
    let backend = Arc::new(FakeBackend::default());
    backend.list_fails.store(true, Ordering::SeqCst);
    let sessions = manager(&backend);

    assert!(sessions.list_active().await.is_empty());
    let handle = sessions.create(&sandbox_config()).await.unwrap();
    assert!(backend.desktop(&handle.id).unwrap().is_alive());
}

#[tokio::test]
async fn extend_resets_instead_of_accumulating() {
    let backend = Arc::new(FakeBackend::default());
    let sessions = manager(&backend);
    let handle = sessions.create(&sandbox_config()).await.unwrap();

    let long = sessions.extend(&handle, Duration::from_secs(600)).await.unwrap();
    let short = sessions.extend(&handle, Duration::from_secs(60)).await.unwrap();
    assert!(short.expires_at < long.expires_at);

    let remaining = (short.expires_at - Utc::now()).num_seconds();
    assert!((55..=60).contains(&remaining), "remaining {remaining}s");

    let desktop = backend.desktop(&handle.id).unwrap();
    assert_eq!(
        *desktop.timeouts.lock().unwrap(),
        vec![Duration::from_secs(600), Duration::from_secs(60)]
    );
    let countdown = sessions.countdown().remaining_secs().unwrap();
    assert!((55..=60).contains(&countdown));
}

#[tokio::test]
async fn extend_after_expiry_is_session_gone() {
    let backend = Arc::new(FakeBackend::default());
    let sessions = manager(&backend);
    let handle = sessions.create(&sandbox_config()).await.unwrap();

    backend.desktop(&handle.id).unwrap().expire();
    let err = sessions.extend(&handle, Duration::from_secs(60)).await.unwrap_err();
    assert!(err.is_session_gone());
    assert_eq!(
        sessions.session(&handle.id).await.unwrap().status,
        SessionStatus::Expired
    );
    assert!(sessions.active().await.is_none());

    // Known dead: no second round trip.
    let err = sessions.extend(&handle, Duration::from_secs(60)).await.unwrap_err();
    assert!(err.is_session_gone());
}

#[tokio::test]
async fn terminate_is_idempotent() {
    let backend = Arc::new(FakeBackend::default());
    let sessions = manager(&backend);
    let handle = sessions.create(&sandbox_config()).await.unwrap();

    sessions.terminate(&handle).await.unwrap();
    sessions.terminate(&handle).await.unwrap();

    let desktop = backend.desktop(&handle.id).unwrap();
    assert_eq!(desktop.kills.load(Ordering::SeqCst), 1);
    assert!(sessions.active().await.is_none());
    assert!(sessions.countdown().deadline().is_none());
}

#[tokio::test]
async fn terminate_of_externally_expired_session_is_not_an_error() {
    let backend = Arc::new(FakeBackend::default());
    let sessions = manager(&backend);
    let handle = sessions.create(&sandbox_config()).await.unwrap();

    backend.desktop(&handle.id).unwrap().expire();
    sessions.terminate(&handle).await.unwrap();
    assert_eq!(
        sessions.session(&handle.id).await.unwrap().status,
        SessionStatus::Terminated
    );
}

#[tokio::test]
async fn connect_keeps_expiry_and_rejects_unknown_ids() {
    let backend = Arc::new(FakeBackend::default());
    let other = backend.seed_running("external-1");
    let sessions = manager(&backend);

    let handle = sessions.connect("external-1").await.unwrap();
    assert_eq!(handle.id, "external-1");
    assert!(other.timeouts.lock().unwrap().is_empty());
    assert_eq!(sessions.active().await.unwrap().id, "external-1");

    let err = sessions.connect("nope").await.unwrap_err();
    assert!(matches!(err, DeskPilotError::NotFound(_)));
}

#[tokio::test]
async fn resolve_refuses_known_dead_sessions() {
    let backend = Arc::new(FakeBackend::default());
    let sessions = manager(&backend);
    let handle = sessions.create(&sandbox_config()).await.unwrap();
    sessions.terminate(&handle).await.unwrap();

    let err = sessions.resolve(&handle.id).await.unwrap_err();
    assert!(err.is_session_gone());
}
