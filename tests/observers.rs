mod common;

use std::sync::Arc;

use common::{app, test_config, FakeBackend, Reply, ScriptedProvider};
use deskpilot::agent_engine::event_bus::ObserverEvent;
use tokio::sync::broadcast::Receiver;

async fn next_frame(rx: &mut Receiver<ObserverEvent>) -> String {
    loop {
        if let ObserverEvent::FrameCaptured { session_id, .. } = rx.recv().await.unwrap() {
            return session_id;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn observers_follow_the_session_lifecycle() {
    let backend = Arc::new(FakeBackend::default());
    let provider = Arc::new(ScriptedProvider::new(vec![], Reply::Text("x".into())));
    let app = app(test_config(30, 0), backend, provider, None);
    let mut rx = app.bus().subscribe();

    let session = app.start_session().await.unwrap();
    match rx.recv().await.unwrap() {
        ObserverEvent::SessionStarted { session_id, expires_at } => {
            assert_eq!(session_id, session.id);
            assert_eq!(expires_at, session.expires_at);
        }
        other => panic!("unexpected first event {other:?}"),
    }
    assert_eq!(next_frame(&mut rx).await, session.id);
    // A second frame arrives on the next interval.
    assert_eq!(next_frame(&mut rx).await, session.id);

    let extended = app.extend_session(&session.id).await.unwrap();
    loop {
        match rx.recv().await.unwrap() {
            ObserverEvent::SessionExtended { session_id, expires_at } => {
                assert_eq!(session_id, session.id);
                assert_eq!(expires_at, extended.expires_at);
                break;
            }
            _ => continue,
        }
    }

    app.stop_session().await.unwrap();
    loop {
        if let ObserverEvent::SessionTerminated { session_id } = rx.recv().await.unwrap() {
            assert_eq!(session_id, session.id);
            break;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn failed_captures_do_not_stop_the_live_view() {
    let backend = Arc::new(FakeBackend::default());
    let provider = Arc::new(ScriptedProvider::new(vec![], Reply::Text("x".into())));
    let app = app(test_config(30, 0), backend.clone(), provider, None);
    let mut rx = app.bus().subscribe();
    let session = app.start_session().await.unwrap();
    next_frame(&mut rx).await;

    let desktop = backend.desktop(&session.id).unwrap();
    desktop.expire();
    tokio::time::sleep(std::time::Duration::from_secs(12)).await;
    let mut frames = 0;
    while let Ok(event) = rx.try_recv() {
        if matches!(event, ObserverEvent::FrameCaptured { .. }) {
            frames += 1;
        }
    }
    assert_eq!(frames, 0);
    assert!(!desktop.is_alive());

    // Stopping still joins the poller and ticker cleanly.
    app.stop_session().await.unwrap();
}
