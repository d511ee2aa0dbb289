//! Request surface for a UI or server layer: session control plus one chat
//! entry point returning a live event stream.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::agent_engine::conversation::Conversation;
use crate::agent_engine::engine::AgentEngine;
use crate::agent_engine::event_bus::{EventBus, ObserverEvent};
use crate::agent_engine::state::{AgentEvent, FailureKind, TurnOutcome, TurnReport};
use crate::config::AppConfig;
use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::executor::dispatcher::Dispatcher;
use crate::llm::capabilities::{self, ModelInfo};
use crate::llm::registry::ProviderRegistry;
use crate::perception::grounding::GroundingClient;
use crate::perception::live_view::LiveView;
use crate::perception::traits::VisualLocator;
use crate::sandbox::backend::SandboxBackend;
use crate::sandbox::manager::SessionManager;
use crate::sandbox::session::Session;
use crate::sandbox::types::{Credential, SandboxConfig};

const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub conversation: Conversation,
    pub model_id: String,
    pub session_id: String,
}

/// A running turn: its event stream and, once it ends, its report.
pub struct TurnHandle {
    pub events: mpsc::Receiver<AgentEvent>,
    pub report: JoinHandle<DeskPilotResult<TurnReport>>,
}

/// Control handles of the turn most recently started.
struct RunningTurn {
    cancel: CancellationToken,
    /// Cancelled once the turn task has returned.
    finished: CancellationToken,
}

impl RunningTurn {
    /// Cancels and waits until the turn, including an action it was
    /// dispatching, has ended.
    async fn stop(&self) {
        self.cancel.cancel();
        self.finished.cancelled().await;
    }
}

/// Background observers tied to the active session.
struct Observers {
    live_view: LiveView,
    ticker_stop: CancellationToken,
    ticker: JoinHandle<()>,
}

impl Observers {
    async fn stop(self) {
        self.ticker_stop.cancel();
        if let Err(e) = self.ticker.await {
            tracing::warn!(error = %e, "countdown ticker ended abnormally");
        }
        self.live_view.stop().await;
    }
}

pub struct AppState {
    config: AppConfig,
    sessions: Arc<SessionManager>,
    engine: Arc<AgentEngine>,
    bus: EventBus,
    turn: Mutex<Option<RunningTurn>>,
    observers: Mutex<Option<Observers>>,
}

impl AppState {
    /// Fails with `Config` when no sandbox credential is configured.
    pub fn new(
        config: AppConfig,
        backend: Arc<dyn SandboxBackend>,
        registry: ProviderRegistry,
        locator: Option<Arc<dyn VisualLocator>>,
    ) -> DeskPilotResult<Self> {
        let api_key = config
            .sandbox
            .resolve_api_key()
            .ok_or_else(|| DeskPilotError::Config("sandbox API key not found".into()))?;
        let sessions = SessionManager::new(backend, Credential::new(api_key))?;
        let dispatcher = Dispatcher::new(&config.agent, &config.safety, locator)?;
        let engine = AgentEngine::new(registry, dispatcher, &config.agent);
        Ok(Self {
            config,
            sessions: Arc::new(sessions),
            engine: Arc::new(engine),
            bus: EventBus::new(),
            turn: Mutex::new(None),
            observers: Mutex::new(None),
        })
    }

    /// Wires providers and the optional grounding client from `config`.
    pub fn from_config(config: AppConfig, backend: Arc<dyn SandboxBackend>) -> DeskPilotResult<Self> {
        let registry = ProviderRegistry::from_config(&config);
        let locator = config
            .grounding
            .as_ref()
            .map(|g| Arc::new(GroundingClient::from_config(g)) as Arc<dyn VisualLocator>);
        if locator.is_none() {
            tracing::warn!("no [grounding] configured; locate_item will report an error");
        }
        Self::new(config, backend, registry, locator)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn models(&self) -> &'static [ModelInfo] {
        capabilities::models()
    }

    /// Creates a fresh session (killing any other) and starts its observers.
    pub async fn start_session(&self) -> DeskPilotResult<Session> {
        let sandbox_cfg = SandboxConfig::from_settings(&self.config.sandbox);
        let handle = self.sessions.create(&sandbox_cfg).await?;
        let session = self
            .sessions
            .session(&handle.id)
            .await
            .ok_or_else(|| DeskPilotError::SessionUnavailable(handle.id.clone()))?;

        let ticker_stop = CancellationToken::new();
        let observers = Observers {
            live_view: LiveView::spawn(
                handle.desktop.clone(),
                Duration::from_secs(self.config.agent.live_view_interval_secs),
                self.bus.clone(),
            ),
            ticker: self.sessions.countdown().spawn_ticker(
                Duration::from_secs(self.config.sandbox.countdown_poll_secs),
                self.bus.clone(),
                ticker_stop.clone(),
            ),
            ticker_stop,
        };
        if let Some(previous) = self.observers.lock().await.replace(observers) {
            previous.stop().await;
        }

        self.bus.publish(ObserverEvent::SessionStarted {
            session_id: session.id.clone(),
            expires_at: session.expires_at,
        });
        Ok(session)
    }

    /// Starts a turn. A turn already running is cancelled and allowed to
    /// finish its in-flight action first.
    pub async fn chat(&self, request: ChatRequest) -> DeskPilotResult<TurnHandle> {
        // Surface an unusable model before touching the session.
        self.engine.registry().resolve(&request.model_id)?;

        let mut slot = self.turn.lock().await;
        if let Some(previous) = slot.take() {
            if !previous.finished.is_cancelled() {
                tracing::info!("cancelling previous turn before starting a new one");
            }
            previous.stop().await;
        }
        let handle = self.sessions.resolve(&request.session_id).await?;

        let running = RunningTurn {
            cancel: CancellationToken::new(),
            finished: CancellationToken::new(),
        };
        let cancel = running.cancel.clone();
        let finished = running.finished.clone();
        *slot = Some(running);
        drop(slot);

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let engine = Arc::clone(&self.engine);
        let sessions = Arc::clone(&self.sessions);
        let ChatRequest {
            conversation,
            model_id,
            ..
        } = request;
        let report = tokio::spawn(async move {
            let _done = finished.drop_guard();
            let report = engine
                .run_turn(&handle, &model_id, conversation, tx, cancel)
                .await?;
            if matches!(
                report.outcome,
                TurnOutcome::Errored {
                    kind: FailureKind::SessionGone
                }
            ) {
                sessions.mark_gone(&handle.id).await;
            }
            Ok(report)
        });
        Ok(TurnHandle { events: rx, report })
    }

    /// Stops issuing model calls for the running turn. The action being
    /// dispatched, if any, still completes. `false` when no turn is running.
    pub async fn cancel_turn(&self) -> bool {
        match self.turn.lock().await.as_ref() {
            Some(turn) if !turn.cancel.is_cancelled() && !turn.finished.is_cancelled() => {
                tracing::info!("turn cancellation requested");
                turn.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Resets the session's expiry to the configured extension from now.
    pub async fn extend_session(&self, session_id: &str) -> DeskPilotResult<Session> {
        let handle = self.sessions.resolve(session_id).await?;
        let session = self
            .sessions
            .extend(
                &handle,
                Duration::from_secs(self.config.sandbox.extend_timeout_secs),
            )
            .await?;
        self.bus.publish(ObserverEvent::SessionExtended {
            session_id: session.id.clone(),
            expires_at: session.expires_at,
        });
        Ok(session)
    }

    /// Cancels the turn and waits for it, then terminates the active session
    /// and stops observers.
    /// Safe to call when nothing is running.
    pub async fn stop_session(&self) -> DeskPilotResult<()> {
        if let Some(turn) = self.turn.lock().await.take() {
            turn.stop().await;
        }
        if let Some(observers) = self.observers.lock().await.take() {
            observers.stop().await;
        }
        if let Some(handle) = self.sessions.active().await {
            self.sessions.terminate(&handle).await?;
            self.bus.publish(ObserverEvent::SessionTerminated {
                session_id: handle.id.clone(),
            });
        }
        Ok(())
    }
}
