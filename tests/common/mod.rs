//! In-memory fakes of the sandbox, model provider and visual locator.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use deskpilot::config::{AppConfig, ModelEntry};
use deskpilot::errors::{DeskPilotError, DeskPilotResult};
use deskpilot::llm::provider::{LlmProvider, ModelStream};
use deskpilot::llm::registry::ProviderRegistry;
use deskpilot::llm::types::{
    CallConfig, ChatMessage, ContentPart, FinishReason, FunctionCall, MessageContent, ModelEvent,
    ToolCall, ToolDef,
};
use deskpilot::perception::screenshot::Screenshot;
use deskpilot::perception::traits::VisualLocator;
use deskpilot::perception::types::Point;
use deskpilot::sandbox::backend::{Desktop, SandboxBackend};
use deskpilot::sandbox::types::{
    ClickKind, CommandOutput, Credential, Resolution, SandboxConfig, ScrollDirection, SessionRef,
};
use deskpilot::AppState;
use serde_json::Value;
use tokio::sync::mpsc;

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::new(width, height);
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png)
        .expect("png fixture");
    out.into_inner()
}

// ── sandbox ────────────────────────────────────────────────────────────────

pub struct FakeDesktop {
    id: String,
    resolution: Resolution,
    alive: AtomicBool,
    pub log: Mutex<Vec<String>>,
    pub timeouts: Mutex<Vec<Duration>>,
    pub kills: AtomicUsize,
}

impl FakeDesktop {
    pub fn new(id: &str, resolution: Resolution) -> Self {
        Self {
            id: id.to_string(),
            resolution,
            alive: AtomicBool::new(true),
            log: Mutex::new(Vec::new()),
            timeouts: Mutex::new(Vec::new()),
            kills: AtomicUsize::new(0),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// The sandbox expiring on the server side.
    pub fn expire(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn check(&self) -> DeskPilotResult<()> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(DeskPilotError::SessionGone(self.id.clone()))
        }
    }

    fn record(&self, entry: String) -> DeskPilotResult<()> {
        self.check()?;
        self.log.lock().unwrap().push(entry);
        Ok(())
    }
}

#[async_trait]
impl Desktop for FakeDesktop {
    fn id(&self) -> &str {
        &self.id
    }

    async fn screenshot(&self) -> DeskPilotResult<Vec<u8>> {
        self.check()?;
        Ok(png(self.resolution.width, self.resolution.height))
    }

    async fn move_mouse(&self, x: i32, y: i32) -> DeskPilotResult<()> {
        self.record(format!("move {x},{y}"))
    }

    async fn click(&self, kind: ClickKind) -> DeskPilotResult<()> {
        self.record(format!("click {kind:?}"))
    }

    async fn write(&self, text: &str) -> DeskPilotResult<()> {
        self.record(format!("write {text}"))
    }

    async fn hotkey(&self, combo: &str) -> DeskPilotResult<()> {
        self.record(format!("key {combo}"))
    }

    async fn scroll(&self, direction: ScrollDirection, amount: u32) -> DeskPilotResult<()> {
        self.record(format!("scroll {} {amount}", direction.as_str()))
    }

    async fn cursor_position(&self) -> DeskPilotResult<(i32, i32)> {
        self.check()?;
        Ok((10, 20))
    }

    async fn run_command(&self, cmd: &str, _background: bool) -> DeskPilotResult<CommandOutput> {
        self.record(format!("run {cmd}"))?;
        Ok(CommandOutput {
            stdout: "ok".into(),
            ..Default::default()
        })
    }

    async fn set_timeout(&self, timeout: Duration) -> DeskPilotResult<()> {
        self.check()?;
        self.timeouts.lock().unwrap().push(timeout);
        Ok(())
    }

    async fn kill(&self) -> DeskPilotResult<()> {
        self.check()?;
        self.kills.fetch_add(1, Ordering::SeqCst);
        self.alive.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn start_stream(&self) -> DeskPilotResult<String> {
        self.check()?;
        Ok(format!("https://stream.invalid/{}", self.id))
    }
}

#[derive(Default)]
pub struct FakeBackend {
    desktops: Mutex<Vec<Arc<FakeDesktop>>>,
    next_id: AtomicUsize,
    pub list_fails: AtomicBool,
}

impl FakeBackend {
    /// A sandbox left running by someone else under the same credential.
    pub fn seed_running(&self, id: &str) -> Arc<FakeDesktop> {
        let desktop = Arc::new(FakeDesktop::new(id, Resolution::default()));
        self.desktops.lock().unwrap().push(desktop.clone());
        desktop
    }

    pub fn desktop(&self, id: &str) -> Option<Arc<FakeDesktop>> {
        self.desktops
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.id == id)
            .cloned()
    }

    pub fn alive_ids(&self) -> Vec<String> {
        self.desktops
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.is_alive())
            .map(|d| d.id.clone())
            .collect()
    }
}

#[async_trait]
impl SandboxBackend for FakeBackend {
    async fn list(&self, _credential: &Credential) -> DeskPilotResult<Vec<SessionRef>> {
        if self.list_fails.load(Ordering::SeqCst) {
            return Err(DeskPilotError::SessionUnavailable("list failed".into()));
        }
        Ok(self
            .alive_ids()
            .into_iter()
            .map(|id| SessionRef {
                id,
                started_at: None,
                end_at: None,
            })
            .collect())
    }

    async fn create(
        &self,
        _credential: &Credential,
        config: &SandboxConfig,
    ) -> DeskPilotResult<Arc<dyn Desktop>> {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let desktop = Arc::new(FakeDesktop::new(&format!("sbx-{n}"), config.resolution));
        self.desktops.lock().unwrap().push(desktop.clone());
        Ok(desktop as Arc<dyn Desktop>)
    }

    async fn connect(&self, _credential: &Credential, id: &str) -> DeskPilotResult<Arc<dyn Desktop>> {
        match self.desktop(id).filter(|d| d.is_alive()) {
            Some(d) => Ok(d as Arc<dyn Desktop>),
            None => Err(DeskPilotError::NotFound(id.to_string())),
        }
    }
}

// ── model provider ─────────────────────────────────────────────────────────

/// What the fake model does on one invocation.
#[derive(Clone)]
pub enum Reply {
    Text(String),
    Call(Value),
    Calls(Vec<Value>),
    RateLimited,
    /// Never finishes streaming.
    Hang,
}

pub struct ScriptedProvider {
    script: Mutex<VecDeque<Reply>>,
    /// Used once the script runs out.
    fallback: Reply,
    pub invocations: AtomicUsize,
    pub requests: Mutex<Vec<(Vec<ChatMessage>, Vec<ToolDef>)>>,
    hanging: Mutex<Vec<mpsc::Sender<DeskPilotResult<ModelEvent>>>>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Reply>, fallback: Reply) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            invocations: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            hanging: Mutex::new(Vec::new()),
        }
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    /// Image parts carried by each request, in order.
    pub fn images_per_request(&self) -> Vec<usize> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(messages, _)| {
                messages
                    .iter()
                    .filter_map(|m| match &m.content {
                        MessageContent::Parts(parts) => Some(parts),
                        MessageContent::Text(_) => None,
                    })
                    .flatten()
                    .filter(|p| matches!(p, ContentPart::ImageUrl { .. }))
                    .count()
            })
            .collect()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
        tools: Vec<ToolDef>,
        _cfg: &CallConfig,
    ) -> DeskPilotResult<ModelStream> {
        let n = self.invocations.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().unwrap().push((messages, tools));
        let reply = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        let (tx, rx) = mpsc::channel(16);
        let calls = match reply {
            Reply::RateLimited => {
                return Err(DeskPilotError::ProviderRateLimited("429 Too Many Requests".into()))
            }
            Reply::Hang => {
                self.hanging.lock().unwrap().push(tx);
                return Ok(rx);
            }
            Reply::Text(text) => {
                tx.send(Ok(ModelEvent::TextDelta(text))).await.ok();
                Vec::new()
            }
            Reply::Call(args) => vec![args],
            Reply::Calls(args) => args,
        };
        let finish = if calls.is_empty() {
            FinishReason::Stop
        } else {
            FinishReason::ToolCalls
        };
        for (i, args) in calls.into_iter().enumerate() {
            let call = ToolCall {
                id: format!("call_{n}_{i}"),
                call_type: "function".into(),
                function: FunctionCall {
                    name: "computer".into(),
                    arguments: args.to_string(),
                },
            };
            tx.send(Ok(ModelEvent::ToolCall(call))).await.ok();
        }
        tx.send(Ok(ModelEvent::Finished(finish))).await.ok();
        Ok(rx)
    }
}

// ── visual locator ─────────────────────────────────────────────────────────

pub struct FakeLocator {
    answer: Option<Point>,
    pub calls: AtomicUsize,
}

impl FakeLocator {
    pub fn new(answer: Option<Point>) -> Self {
        Self {
            answer,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl VisualLocator for FakeLocator {
    async fn locate(&self, _description: &str, frame: &Screenshot) -> DeskPilotResult<Option<Point>> {
        assert!(frame.meta.is_some(), "locator needs frame dimensions");
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.answer)
    }
}

// ── wiring ─────────────────────────────────────────────────────────────────

pub fn test_config(max_steps: u32, action_delay_ms: u64) -> AppConfig {
    let mut config = AppConfig::default();
    config.sandbox.api_key = Some("test-key".into());
    config.agent.max_steps = max_steps;
    config.agent.action_delay_ms = action_delay_ms;
    config
}

pub fn registry_with(provider: Arc<ScriptedProvider>) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new(0.0);
    registry.register(provider as Arc<dyn LlmProvider>);
    for id in ["sonnet", "gpt4o", "gemini"] {
        registry.map_model(
            id,
            ModelEntry {
                provider: "scripted".into(),
                model: format!("{id}-test"),
            },
        );
    }
    registry
}

pub fn app(
    config: AppConfig,
    backend: Arc<FakeBackend>,
    provider: Arc<ScriptedProvider>,
    locator: Option<Arc<FakeLocator>>,
) -> AppState {
    AppState::new(
        config,
        backend,
        registry_with(provider),
        locator.map(|l| l as Arc<dyn VisualLocator>),
    )
    .expect("app state")
}
