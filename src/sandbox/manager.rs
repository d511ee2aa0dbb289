use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;

use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::sandbox::backend::SandboxBackend;
use crate::sandbox::countdown::ExpiryCountdown;
use crate::sandbox::session::{Session, SessionHandle, SessionStatus};
use crate::sandbox::types::{Credential, Resolution, SandboxConfig, SessionRef};

#[derive(Default)]
struct Registry {
    sessions: HashMap<String, Session>,
    active: Option<SessionHandle>,
}

/// Owns the (at most one) active remote desktop of this process.
///
/// Cleanup before `create` is best-effort: `create` calls are serialized
/// inside this process, but another process using the same credential can
/// still race us and leave two sandboxes alive.
pub struct SessionManager {
    backend: Arc<dyn SandboxBackend>,
    credential: Credential,
    registry: Mutex<Registry>,
    create_lock: Mutex<()>,
    countdown: ExpiryCountdown,
}

impl SessionManager {
    pub fn new(backend: Arc<dyn SandboxBackend>, credential: Credential) -> DeskPilotResult<Self> {
        if credential.is_empty() {
            return Err(DeskPilotError::Config("sandbox API key not found".into()));
        }
        Ok(Self {
            backend,
            credential,
            registry: Mutex::new(Registry::default()),
            create_lock: Mutex::new(()),
            countdown: ExpiryCountdown::new(),
        })
    }

    pub fn countdown(&self) -> &ExpiryCountdown {
        &self.countdown
    }

    /// Sandboxes visible under our credential. Listing failures degrade to an
    /// empty list.
    pub async fn list_active(&self) -> Vec<SessionRef> {
        match self.backend.list(&self.credential).await {
            Ok(list) => list,
            Err(e) => {
                tracing::warn!(error = %e, "listing running sandboxes failed, assuming none");
                Vec::new()
            }
        }
    }

    pub async fn create(&self, config: &SandboxConfig) -> DeskPilotResult<SessionHandle> {
        let _guard = self.create_lock.lock().await;

        let running = self.list_active().await;
        let tracked = self.registry.lock().await.active.take();

        for info in &running {
            let result = match tracked.as_ref().filter(|h| h.id == info.id) {
                Some(handle) => handle.desktop.kill().await,
                None => match self.backend.connect(&self.credential, &info.id).await {
                    Ok(desktop) => desktop.kill().await,
                    Err(e) => Err(e),
                },
            };
            match result {
                Ok(()) => tracing::info!(session = %info.id, "killed running sandbox"),
                Err(e) => {
                    tracing::warn!(session = %info.id, error = %e, "failed to kill running sandbox")
                }
            }
            self.mark(&info.id, SessionStatus::Terminated).await;
        }

        if let Some(handle) = tracked.filter(|h| !running.iter().any(|r| r.id == h.id)) {
            if let Err(e) = handle.desktop.kill().await {
                tracing::warn!(session = %handle.id, error = %e, "failed to kill tracked sandbox");
            }
            self.mark(&handle.id, SessionStatus::Terminated).await;
        }
        self.countdown.clear();

        tracing::info!(
            resolution = %config.resolution,
            dpi = config.dpi,
            timeout_secs = config.initial_timeout.as_secs(),
            "starting a new sandbox"
        );
        let desktop = self.backend.create(&self.credential, config).await?;
        let id = desktop.id().to_string();
        let created_at = Utc::now();
        let expires_at = created_at
            + chrono::Duration::from_std(config.initial_timeout)
                .unwrap_or_else(|_| chrono::Duration::zero());

        self.registry.lock().await.sessions.insert(
            id.clone(),
            Session {
                id: id.clone(),
                created_at,
                expires_at,
                resolution: config.resolution,
                status: SessionStatus::Pending,
            },
        );

        match desktop.start_stream().await {
            Ok(url) => tracing::info!(session = %id, url = %url, "observer stream started"),
            Err(e) => tracing::warn!(session = %id, error = %e, "failed to start observer stream"),
        }

        let handle = SessionHandle {
            id: id.clone(),
            resolution: config.resolution,
            desktop,
        };
        {
            let mut reg = self.registry.lock().await;
            if let Some(session) = reg.sessions.get_mut(&id) {
                session.status = SessionStatus::Active;
            }
            reg.active = Some(handle.clone());
        }
        self.countdown.reset(config.initial_timeout);
        tracing::info!(session = %id, "sandbox active");
        Ok(handle)
    }

    /// Attaches to an existing sandbox without touching its expiry.
    pub async fn connect(&self, id: &str) -> DeskPilotResult<SessionHandle> {
        let desktop = self.backend.connect(&self.credential, id).await?;
        let known = self.registry.lock().await.sessions.get(id).cloned();

        let session = match known {
            Some(mut session) => {
                session.status = SessionStatus::Active;
                session
            }
            None => {
                let now = Utc::now();
                let listed = self.list_active().await.into_iter().find(|r| r.id == id);
                let expires_at = listed.as_ref().and_then(|r| r.end_at).unwrap_or(now);
                Session {
                    id: id.to_string(),
                    created_at: listed.and_then(|r| r.started_at).unwrap_or(now),
                    expires_at,
                    resolution: Resolution::default(),
                    status: SessionStatus::Active,
                }
            }
        };

        let handle = SessionHandle {
            id: id.to_string(),
            resolution: session.resolution,
            desktop,
        };
        let mut reg = self.registry.lock().await;
        if let Some(prev) = reg.active.as_ref().filter(|h| h.id != id) {
            tracing::warn!(previous = %prev.id, session = %id, "connect replaces active session");
        }
        if session.expires_at > Utc::now() {
            self.countdown.reset(
                (session.expires_at - Utc::now())
                    .to_std()
                    .unwrap_or_default(),
            );
        }
        reg.sessions.insert(id.to_string(), session);
        reg.active = Some(handle.clone());
        tracing::info!(session = %id, "connected to sandbox");
        Ok(handle)
    }

    /// Resets the expiry to `duration` from now. Repeated calls restart the
    /// countdown; they never add up.
    pub async fn extend(&self, handle: &SessionHandle, duration: Duration) -> DeskPilotResult<Session> {
        // The local countdown is advisory; only a known-dead status short-circuits.
        if self.session(&handle.id).await.is_some_and(|s| !s.is_live()) {
            return Err(DeskPilotError::SessionGone(handle.id.clone()));
        }

        match handle.desktop.set_timeout(duration).await {
            Ok(()) => {}
            Err(DeskPilotError::SessionGone(_)) | Err(DeskPilotError::NotFound(_)) => {
                self.mark_gone(&handle.id).await;
                return Err(DeskPilotError::SessionGone(handle.id.clone()));
            }
            Err(e) => return Err(e),
        }

        let now = Utc::now();
        let expires_at =
            now + chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero());
        let mut reg = self.registry.lock().await;
        let session = reg
            .sessions
            .entry(handle.id.clone())
            .or_insert_with(|| Session {
                id: handle.id.clone(),
                created_at: now,
                expires_at,
                resolution: handle.resolution,
                status: SessionStatus::Active,
            });
        session.expires_at = expires_at;
        let snapshot = session.clone();

        if reg.active.as_ref().is_some_and(|h| h.id == handle.id) {
            self.countdown.reset(duration);
        }
        tracing::info!(session = %handle.id, secs = duration.as_secs(), "session extended");
        Ok(snapshot)
    }

    /// Idempotent: a session that is already gone is not an error.
    pub async fn terminate(&self, handle: &SessionHandle) -> DeskPilotResult<()> {
        if self
            .session(&handle.id)
            .await
            .is_some_and(|s| s.status == SessionStatus::Terminated)
        {
            tracing::debug!(session = %handle.id, "terminate: already terminated");
            return Ok(());
        }

        match handle.desktop.kill().await {
            Ok(()) => tracing::info!(session = %handle.id, "sandbox terminated"),
            Err(DeskPilotError::SessionGone(_)) | Err(DeskPilotError::NotFound(_)) => {
                tracing::debug!(session = %handle.id, "terminate: sandbox already gone");
            }
            Err(e) => return Err(e),
        }
        self.mark(&handle.id, SessionStatus::Terminated).await;
        Ok(())
    }

    /// Records that the sandbox reported the session as expired or killed.
    pub async fn mark_gone(&self, id: &str) {
        self.mark(id, SessionStatus::Expired).await;
    }

    pub async fn active(&self) -> Option<SessionHandle> {
        self.registry.lock().await.active.clone()
    }

    pub async fn session(&self, id: &str) -> Option<Session> {
        self.registry.lock().await.sessions.get(id).cloned()
    }

    /// Handle for `id`: the active session if it matches, otherwise a fresh
    /// connection.
    pub async fn resolve(&self, id: &str) -> DeskPilotResult<SessionHandle> {
        if let Some(handle) = self.active().await.filter(|h| h.id == id) {
            return Ok(handle);
        }
        if self.session(id).await.is_some_and(|s| !s.is_live()) {
            return Err(DeskPilotError::SessionGone(id.to_string()));
        }
        self.connect(id).await
    }

    async fn mark(&self, id: &str, status: SessionStatus) {
        let mut reg = self.registry.lock().await;
        if let Some(session) = reg.sessions.get_mut(id) {
            session.status = status;
        }
        if status != SessionStatus::Active && reg.active.as_ref().is_some_and(|h| h.id == id) {
            reg.active = None;
            self.countdown.clear();
        }
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("credential", &self.credential)
            .finish_non_exhaustive()
    }
}

